use crate::dedup::DedupOutput;
use crate::matcher::Selection;
use crate::model::{AveragedRecord, QualityReport, ReconSummary, TableRow};
use crate::store::RecordStore;

/// Compute summary statistics for a finished run.
pub fn compute_summary(
    store: &RecordStore,
    dedup: &DedupOutput,
    selection: &Selection,
    kept: &[TableRow],
    averaged: &[AveragedRecord],
    diagnostics: &[QualityReport],
) -> ReconSummary {
    let placeholder_rows = averaged.iter().filter(|r| r.is_placeholder()).count();

    ReconSummary {
        records_ingested: store.len(),
        special_rows: store.special_count(),
        duplicates_removed: dedup.removed.len(),
        subjects: diagnostics.len(),
        averaged_rows: averaged.len() - placeholder_rows,
        placeholder_rows,
        subjects_flagged: diagnostics.iter().filter(|d| !d.passed()).count(),
        kept_records: kept.len(),
        manual_overrides_accepted: selection.overrides_accepted,
        manual_overrides_rejected: selection.overrides_rejected.len(),
    }
}
