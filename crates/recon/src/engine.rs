use std::collections::BTreeSet;

use log::info;

use crate::average::{averaged_record, placeholder_record};
use crate::config::ReconConfig;
use crate::dedup::{deduplicate, DedupOutput};
use crate::evidence::compute_summary;
use crate::group::{group_by_subject, Grouping};
use crate::matcher::{kept_records, select_pairs, ManualOverrides, Selection};
use crate::model::{
    AveragedRecord, MeasurementRecord, Pair, QualityReport, ReconMeta, ReconResult, RecordId, TableRow,
};
use crate::quality::check_all;
use crate::review::{candidates, ReviewCandidate, ReviewDecision};
use crate::store::RecordStore;

/// Reconciliation pipeline for one configuration.
///
/// Work is split around the manual review: [`Pipeline::prepare`] does
/// everything that does not depend on the reviewer, [`PreparedRun::finish`]
/// applies the decision and builds the tables.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: ReconConfig,
}

impl Pipeline {
    pub fn new(config: ReconConfig) -> Self {
        Self { config }
    }

    /// Deduplicate, group and pick automatic pairs.
    pub fn prepare(&self, records: Vec<MeasurementRecord>) -> PreparedRun {
        let (store, dedup, grouping) = stage(records);

        let mode = self.config.mode;
        let automatic = select_pairs(&store, &grouping.groups, mode, &ManualOverrides::new());
        let candidates = candidates(
            &store,
            &grouping.groups,
            &automatic.pairs,
            mode,
            self.config.review.min_records,
        );

        info!(
            "prepared {} record(s): {} duplicate(s), {} subject(s), {} review candidate(s)",
            store.len(),
            dedup.removed.len(),
            grouping.groups.len(),
            candidates.len()
        );

        PreparedRun {
            config: self.config.clone(),
            store,
            dedup,
            grouping,
            automatic,
            candidates,
        }
    }
}

/// State between preparation and the reviewer's decision.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    config: ReconConfig,
    store: RecordStore,
    dedup: DedupOutput,
    grouping: Grouping,
    automatic: Selection,
    candidates: Vec<ReviewCandidate>,
}

impl PreparedRun {
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn candidates(&self) -> &[ReviewCandidate] {
        &self.candidates
    }

    pub fn automatic_pairs(&self) -> impl Iterator<Item = (&str, &Pair)> {
        self.automatic.pairs.iter().map(|(s, p)| (s.as_str(), p))
    }

    /// Apply the review decision and build every output table.
    pub fn finish(self, decision: ReviewDecision) -> ReconResult {
        let overrides = decision.into_overrides();
        let selection = if overrides.is_empty() {
            self.automatic
        } else {
            select_pairs(&self.store, &self.grouping.groups, self.config.mode, &overrides)
        };
        assemble(&self.config, &self.store, &self.dedup, &self.grouping, selection)
    }
}

/// One-shot run without a review pause. Overrides are applied in the single
/// selection pass; review candidates are not computed.
pub fn run(config: &ReconConfig, records: Vec<MeasurementRecord>, overrides: ManualOverrides) -> ReconResult {
    let (store, dedup, grouping) = stage(records);
    let selection = select_pairs(&store, &grouping.groups, config.mode, &overrides);
    info!(
        "selected pairs for {} subject(s), {} manual override(s)",
        grouping.groups.len(),
        overrides.len()
    );
    assemble(config, &store, &dedup, &grouping, selection)
}

fn stage(records: Vec<MeasurementRecord>) -> (RecordStore, DedupOutput, Grouping) {
    let store = RecordStore::new(records);
    let dedup = deduplicate(&store, &store.sorted_ids());
    let grouping = group_by_subject(&store, &dedup.kept);
    (store, dedup, grouping)
}

fn assemble(
    config: &ReconConfig,
    store: &RecordStore,
    dedup: &DedupOutput,
    grouping: &Grouping,
    selection: Selection,
) -> ReconResult {
    let kept_ids = kept_records(selection.pairs.values());
    let all = table_rows(store, &dedup.kept, grouping, &kept_ids);
    let kept: Vec<TableRow> = all.iter().filter(|r| r.kept).cloned().collect();

    let diagnostics = check_all(
        store,
        &dedup.kept,
        grouping,
        &selection.pairs,
        config.quality.max_pressure_delta,
    );
    let averaged = averaged_rows(store, &selection, &diagnostics, config);

    let summary = compute_summary(store, dedup, &selection, &kept, &averaged, &diagnostics);
    info!(
        "finished: {} averaged row(s), {} placeholder(s), {} subject(s) flagged",
        summary.averaged_rows, summary.placeholder_rows, summary.subjects_flagged
    );

    ReconResult {
        meta: ReconMeta {
            config_name: config.name.clone(),
            mode: config.mode,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        summary,
        all,
        kept,
        averaged,
        pairs: selection.pairs,
        diagnostics,
    }
}

fn table_rows(
    store: &RecordStore,
    ids: &[RecordId],
    grouping: &Grouping,
    kept: &BTreeSet<RecordId>,
) -> Vec<TableRow> {
    ids.iter()
        .map(|&id| TableRow {
            id,
            recording_number: grouping.recording_number(id),
            kept: kept.contains(&id),
            record: store.record(id).clone(),
        })
        .collect()
}

/// Pair rows and single-record placeholders, ascending by subject.
fn averaged_rows(
    store: &RecordStore,
    selection: &Selection,
    diagnostics: &[QualityReport],
    config: &ReconConfig,
) -> Vec<AveragedRecord> {
    diagnostics
        .iter()
        .filter_map(|report| {
            let subject = report.subject_id.as_str();
            match selection.pairs.get(subject) {
                Some(pair) => Some(averaged_record(store, subject, pair, report.diagnostic())),
                None if report.single_record => Some(placeholder_record(
                    subject,
                    report.diagnostic(),
                    &config.quality.unavailable_marker,
                )),
                None => None,
            }
        })
        .collect()
}
