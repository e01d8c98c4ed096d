//! Manual review boundary.
//!
//! Subjects with many scans are offered to a reviewer together with the
//! automatic choice. The reviewer answers with a [`ReviewDecision`]; the
//! engine does no work while waiting for it.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::AnalysisMode;
use crate::matcher::{eligible_records, ManualOverrides};
use crate::model::{Pair, RecordId, SubjectGroup};
use crate::store::RecordStore;

/// A subject offered for manual pair selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewCandidate {
    pub subject_id: String,
    /// All regular records of the subject, chronological.
    pub records: Vec<RecordId>,
    /// Records a manual pair may be chosen from.
    pub eligible: Vec<RecordId>,
    pub automatic: Option<Pair>,
}

/// Reviewer's answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ReviewDecision {
    /// Keep the automatic pairs.
    #[default]
    Automatic,
    /// Use these pairs where valid; automatic elsewhere.
    Manual(ManualOverrides),
    /// Review was closed without an answer; same as `Automatic`.
    Abandoned,
}

impl ReviewDecision {
    pub fn into_overrides(self) -> ManualOverrides {
        match self {
            Self::Manual(overrides) => overrides,
            Self::Automatic | Self::Abandoned => ManualOverrides::new(),
        }
    }
}

/// Subjects with at least `min_records` regular records, ascending by id.
pub fn candidates(
    store: &RecordStore,
    groups: &[SubjectGroup],
    automatic: &BTreeMap<String, Pair>,
    mode: AnalysisMode,
    min_records: usize,
) -> Vec<ReviewCandidate> {
    groups
        .iter()
        .filter(|g| g.records.len() >= min_records)
        .map(|g| ReviewCandidate {
            subject_id: g.subject_id.clone(),
            records: g.records.clone(),
            eligible: eligible_records(store, g, mode),
            automatic: automatic.get(&g.subject_id).copied(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Field, FieldValue, MeasurementRecord, PairSource};

    fn with_sys(subject: &str, sys: Option<f64>) -> MeasurementRecord {
        let mut r = MeasurementRecord::new(subject, format!("{subject}.pdf"));
        if let Some(v) = sys {
            r.values.insert(Field::PeripheralSystolic, FieldValue::Number(v));
        }
        r
    }

    #[test]
    fn only_large_groups_are_candidates() {
        let store = RecordStore::new(vec![
            with_sys("A", Some(120.0)),
            with_sys("A", Some(122.0)),
            with_sys("B", Some(120.0)),
            with_sys("B", None),
            with_sys("B", Some(121.0)),
        ]);
        let groups = vec![
            SubjectGroup { subject_id: "A".into(), records: vec![RecordId(0), RecordId(1)] },
            SubjectGroup {
                subject_id: "B".into(),
                records: vec![RecordId(2), RecordId(3), RecordId(4)],
            },
        ];
        let auto_pair = Pair { first: RecordId(2), second: RecordId(4), source: PairSource::Automatic };
        let automatic = BTreeMap::from([("B".to_string(), auto_pair)]);

        let found = candidates(&store, &groups, &automatic, AnalysisMode::SystolicOnly, 3);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].subject_id, "B");
        assert_eq!(found[0].eligible, vec![RecordId(2), RecordId(4)]);
        assert_eq!(found[0].automatic, Some(auto_pair));
    }

    #[test]
    fn abandoned_review_means_no_overrides() {
        let manual = ManualOverrides::from([("B".into(), vec![RecordId(2), RecordId(3)])]);
        assert!(ReviewDecision::Abandoned.into_overrides().is_empty());
        assert!(ReviewDecision::Automatic.into_overrides().is_empty());
        assert_eq!(ReviewDecision::Manual(manual.clone()).into_overrides(), manual);
    }
}
