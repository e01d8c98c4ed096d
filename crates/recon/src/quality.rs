//! Per-subject data-integrity checks.
//!
//! Four independent checks, each contributing at most one finding (the
//! disagreement check one per offending field):
//! - single record: only one regular scan was uploaded for the subject
//! - clinical report: a clinical summary was uploaded instead of a detailed report
//! - scan dates: the paired scans were taken on different days
//! - disagreement: a cross-checked pressure differs by more than the threshold

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Field, Pair, QualityFinding, QualityReport, RecordId, ReportKind};
use crate::group::Grouping;
use crate::store::RecordStore;

/// Pressures compared between the two scans of a pair.
pub const CROSS_CHECK_FIELDS: [Field; 4] = [
    Field::PeripheralSystolic,
    Field::PeripheralDiastolic,
    Field::AorticSystolic,
    Field::AorticDiastolic,
];

/// Subjects (by file-name prefix) that had a clinical report uploaded.
/// Reports without a usable file name cannot be attributed and are skipped.
pub fn clinical_subjects(store: &RecordStore, ids: &[RecordId]) -> BTreeSet<String> {
    ids.iter()
        .map(|id| store.record(*id))
        .filter(|r| r.report == ReportKind::Clinical)
        .map(|r| r.origin_subject())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Findings for a chosen pair: scan dates and pressure disagreement.
pub fn check_pair(store: &RecordStore, pair: &Pair, threshold: f64) -> Vec<QualityFinding> {
    let (a, b) = (store.record(pair.first), store.record(pair.second));
    let mut findings = Vec::new();

    if let (Some(first), Some(second)) = (a.scan_date, b.scan_date) {
        if first != second {
            findings.push(QualityFinding::ScanDateMismatch { first, second });
        }
    }

    for field in CROSS_CHECK_FIELDS {
        if let (Some(x), Some(y)) = (a.number(field), b.number(field)) {
            let delta = (x - y).abs();
            if delta > threshold {
                findings.push(QualityFinding::ExcessiveDisagreement {
                    field,
                    delta,
                    threshold,
                });
            }
        }
    }

    findings
}

/// Quality report for one subject.
///
/// `group_size` counts the subject's regular records after deduplication.
pub fn check_subject(
    store: &RecordStore,
    subject_id: &str,
    group_size: usize,
    pair: Option<&Pair>,
    clinical: &BTreeSet<String>,
    threshold: f64,
) -> QualityReport {
    let single_record = group_size == 1;
    let mut findings = Vec::new();

    if single_record {
        findings.push(QualityFinding::SingleRecord);
    }
    if clinical.contains(subject_id) {
        findings.push(QualityFinding::ClinicalReport);
    }
    if let Some(pair) = pair {
        findings.extend(check_pair(store, pair, threshold));
    }

    QualityReport {
        subject_id: subject_id.to_string(),
        single_record,
        findings,
    }
}

/// Reports for every subject with regular records or a clinical report,
/// ascending by subject id.
pub fn check_all(
    store: &RecordStore,
    ids: &[RecordId],
    grouping: &Grouping,
    pairs: &BTreeMap<String, Pair>,
    threshold: f64,
) -> Vec<QualityReport> {
    let clinical = clinical_subjects(store, ids);

    let subjects: BTreeSet<&str> = grouping
        .groups
        .iter()
        .map(|g| g.subject_id.as_str())
        .chain(clinical.iter().map(String::as_str))
        .collect();

    subjects
        .into_iter()
        .map(|subject| {
            let group_size = grouping.group(subject).map_or(0, |g| g.records.len());
            check_subject(store, subject, group_size, pairs.get(subject), &clinical, threshold)
        })
        .collect()
}
