use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use crate::config::AnalysisMode;
use crate::model::{Field, Pair, PairSource, RecordId, SubjectGroup};
use crate::store::RecordStore;

/// Caller-supplied pair choices, keyed by subject id.
///
/// Kept as a list so a wrong number of ids can be detected and rejected
/// instead of silently truncated.
pub type ManualOverrides = BTreeMap<String, Vec<RecordId>>;

#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Chosen pair per subject; subjects without a pair are absent.
    pub pairs: BTreeMap<String, Pair>,
    pub overrides_accepted: usize,
    /// Subjects whose override was ignored (unknown subject, wrong count,
    /// ids outside the eligible set).
    pub overrides_rejected: Vec<String>,
}

/// Records of `group` with a numeric value in every field of `mode`,
/// ascending by id.
pub fn eligible_records(store: &RecordStore, group: &SubjectGroup, mode: AnalysisMode) -> Vec<RecordId> {
    let mut eligible: Vec<RecordId> = group
        .records
        .iter()
        .copied()
        .filter(|id| {
            let record = store.record(*id);
            mode.fields().iter().all(|f| record.number(*f).is_some())
        })
        .collect();
    eligible.sort();
    eligible
}

fn distance(store: &RecordStore, a: RecordId, b: RecordId, fields: &[Field]) -> f64 {
    let (ra, rb) = (store.record(a), store.record(b));
    fields
        .iter()
        .map(|f| match (ra.number(*f), rb.number(*f)) {
            (Some(x), Some(y)) => (x - y).powi(2),
            _ => f64::INFINITY,
        })
        .sum::<f64>()
        .sqrt()
}

fn diastolic_gap(store: &RecordStore, a: RecordId, b: RecordId) -> f64 {
    let (ra, rb) = (store.record(a), store.record(b));
    match (
        ra.number(Field::PeripheralDiastolic),
        rb.number(Field::PeripheralDiastolic),
    ) {
        (Some(x), Some(y)) => (x - y).abs(),
        _ => f64::INFINITY,
    }
}

/// Nearest pair among `eligible` by Euclidean distance over the mode's fields.
///
/// Pairs are enumerated `(i, j)` with `i < j` in the order of `eligible`; a
/// later pair only wins on a strictly smaller distance, or, in systolic-only
/// mode, an equal distance with a strictly smaller diastolic gap.
pub fn closest_pair(store: &RecordStore, eligible: &[RecordId], mode: AnalysisMode) -> Option<Pair> {
    if eligible.len() < 2 {
        return None;
    }

    let fields = mode.fields();
    let tie_break = mode.breaks_ties_on_diastolic();
    let mut best: Option<(RecordId, RecordId, f64, f64)> = None;

    for (i, &a) in eligible.iter().enumerate() {
        for &b in &eligible[i + 1..] {
            let dist = distance(store, a, b, fields);
            let gap = if tie_break {
                diastolic_gap(store, a, b)
            } else {
                f64::INFINITY
            };

            let better = match best {
                None => true,
                Some((_, _, best_dist, best_gap)) => {
                    dist < best_dist || (tie_break && dist == best_dist && gap < best_gap)
                }
            };
            if better {
                best = Some((a, b, dist, gap));
            }
        }
    }

    best.map(|(first, second, _, _)| Pair {
        first,
        second,
        source: PairSource::Automatic,
    })
}

/// Accept a manual choice only if it names exactly two distinct eligible ids.
pub fn validate_override(eligible: &[RecordId], ids: &[RecordId]) -> Option<Pair> {
    match ids {
        [first, second] if first != second && eligible.contains(first) && eligible.contains(second) => {
            Some(Pair {
                first: *first,
                second: *second,
                source: PairSource::Manual,
            })
        }
        _ => None,
    }
}

/// Choose at most one pair per subject group.
///
/// A valid override wins and skips the automatic search for that subject;
/// an invalid one falls back to automatic selection for that subject only.
pub fn select_pairs(
    store: &RecordStore,
    groups: &[SubjectGroup],
    mode: AnalysisMode,
    overrides: &ManualOverrides,
) -> Selection {
    let mut selection = Selection::default();

    for group in groups {
        let eligible = eligible_records(store, group, mode);

        let manual = overrides.get(&group.subject_id).and_then(|ids| {
            let pair = validate_override(&eligible, ids);
            if pair.is_none() {
                warn!(
                    "manual pair {ids:?} for subject {} is not two distinct eligible records; using automatic selection",
                    group.subject_id
                );
                selection.overrides_rejected.push(group.subject_id.clone());
            }
            pair
        });

        let pair = match manual {
            Some(pair) => {
                selection.overrides_accepted += 1;
                Some(pair)
            }
            None => closest_pair(store, &eligible, mode),
        };

        match pair {
            Some(pair) => {
                debug!(
                    "subject {}: pair ({}, {}) [{:?}]",
                    group.subject_id, pair.first, pair.second, pair.source
                );
                selection.pairs.insert(group.subject_id.clone(), pair);
            }
            None => debug!(
                "subject {}: {} eligible record(s), no pair",
                group.subject_id,
                eligible.len()
            ),
        }
    }

    for subject in overrides.keys() {
        if !groups.iter().any(|g| &g.subject_id == subject) {
            warn!("manual pair for unknown subject {subject} ignored");
            selection.overrides_rejected.push(subject.clone());
        }
    }
    selection.overrides_rejected.sort();

    selection
}

/// Every record that takes part in a chosen pair.
pub fn kept_records<'a>(pairs: impl IntoIterator<Item = &'a Pair>) -> BTreeSet<RecordId> {
    pairs.into_iter().flat_map(|p| p.ids()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldValue, MeasurementRecord};

    fn bp(subject: &str, sys: Option<f64>, dia: Option<f64>, mean: Option<f64>) -> MeasurementRecord {
        let mut r = MeasurementRecord::new(subject, format!("{subject}.pdf"));
        for (field, value) in [
            (Field::PeripheralSystolic, sys),
            (Field::PeripheralDiastolic, dia),
            (Field::PeripheralMean, mean),
        ] {
            if let Some(v) = value {
                r.values.insert(field, FieldValue::Number(v));
            }
        }
        r
    }

    fn single_group(store: &RecordStore) -> Vec<SubjectGroup> {
        vec![SubjectGroup {
            subject_id: "S1".into(),
            records: store.ids().collect(),
        }]
    }

    fn auto(records: Vec<MeasurementRecord>, mode: AnalysisMode) -> Option<Pair> {
        let store = RecordStore::new(records);
        let groups = single_group(&store);
        let eligible = eligible_records(&store, &groups[0], mode);
        closest_pair(&store, &eligible, mode)
    }

    #[test]
    fn systolic_only_picks_closest_values() {
        let pair = auto(
            vec![
                bp("S1", Some(120.0), None, None),
                bp("S1", Some(150.0), None, None),
                bp("S1", Some(121.0), None, None),
            ],
            AnalysisMode::SystolicOnly,
        )
        .unwrap();
        assert_eq!(pair.ids(), [RecordId(0), RecordId(2)]);
        assert_eq!(pair.source, PairSource::Automatic);
    }

    #[test]
    fn systolic_tie_broken_by_diastolic_gap() {
        // (0,1) and (1,2) both 2 apart on systolic; (1,2) has closer diastolic
        let pair = auto(
            vec![
                bp("S1", Some(118.0), Some(70.0), None),
                bp("S1", Some(120.0), Some(80.0), None),
                bp("S1", Some(122.0), Some(79.0), None),
            ],
            AnalysisMode::SystolicOnly,
        )
        .unwrap();
        assert_eq!(pair.ids(), [RecordId(1), RecordId(2)]);
    }

    #[test]
    fn missing_diastolic_never_preferred_in_tie() {
        let pair = auto(
            vec![
                bp("S1", Some(118.0), None, None),
                bp("S1", Some(120.0), Some(80.0), None),
                bp("S1", Some(122.0), Some(90.0), None),
            ],
            AnalysisMode::SystolicOnly,
        )
        .unwrap();
        assert_eq!(pair.ids(), [RecordId(1), RecordId(2)]);
    }

    #[test]
    fn remaining_ties_go_to_first_enumerated() {
        let pair = auto(
            vec![
                bp("S1", Some(118.0), Some(80.0), None),
                bp("S1", Some(120.0), Some(80.0), None),
                bp("S1", Some(122.0), Some(80.0), None),
            ],
            AnalysisMode::SystolicOnly,
        )
        .unwrap();
        assert_eq!(pair.ids(), [RecordId(0), RecordId(1)]);
    }

    #[test]
    fn triplet_mode_uses_all_three_fields() {
        // systolic alone would pick (0,1); the triplet distance picks (0,2)
        let pair = auto(
            vec![
                bp("S1", Some(120.0), Some(80.0), Some(95.0)),
                bp("S1", Some(121.0), Some(60.0), Some(80.0)),
                bp("S1", Some(123.0), Some(81.0), Some(96.0)),
            ],
            AnalysisMode::PeripheralTriplet,
        )
        .unwrap();
        assert_eq!(pair.ids(), [RecordId(0), RecordId(2)]);
    }

    #[test]
    fn triplet_ties_resolved_by_enumeration_only() {
        // (0,1) and (1,2) are both 2 apart; (1,2) has the smaller diastolic
        // gap but triplet mode does not look at it
        let pair = auto(
            vec![
                bp("S1", Some(120.0), Some(80.0), Some(90.0)),
                bp("S1", Some(120.0), Some(82.0), Some(90.0)),
                bp("S1", Some(122.0), Some(82.0), Some(90.0)),
            ],
            AnalysisMode::PeripheralTriplet,
        );
        assert_eq!(pair.unwrap().ids(), [RecordId(0), RecordId(1)]);
    }

    #[test]
    fn ineligible_records_are_skipped() {
        let pair = auto(
            vec![
                bp("S1", Some(120.0), Some(80.0), None),
                bp("S1", Some(120.0), Some(80.0), Some(90.0)),
                bp("S1", Some(140.0), Some(85.0), Some(99.0)),
            ],
            AnalysisMode::PeripheralTriplet,
        )
        .unwrap();
        assert_eq!(pair.ids(), [RecordId(1), RecordId(2)]);
    }

    #[test]
    fn fewer_than_two_eligible_means_no_pair() {
        assert!(auto(
            vec![bp("S1", Some(120.0), None, None), bp("S1", None, Some(80.0), None)],
            AnalysisMode::SystolicOnly,
        )
        .is_none());
    }

    #[test]
    fn text_numbers_are_eligible() {
        let mut text = MeasurementRecord::new("S1", "S1.pdf");
        text.values
            .insert(Field::PeripheralSystolic, FieldValue::Text("121".into()));
        let pair = auto(
            vec![bp("S1", Some(120.0), None, None), text, bp("S1", Some(140.0), None, None)],
            AnalysisMode::SystolicOnly,
        )
        .unwrap();
        assert_eq!(pair.ids(), [RecordId(0), RecordId(1)]);
    }

    #[test]
    fn valid_override_wins() {
        let store = RecordStore::new(vec![
            bp("S1", Some(120.0), None, None),
            bp("S1", Some(121.0), None, None),
            bp("S1", Some(150.0), None, None),
        ]);
        let groups = single_group(&store);
        let overrides = ManualOverrides::from([("S1".into(), vec![RecordId(2), RecordId(0)])]);
        let sel = select_pairs(&store, &groups, AnalysisMode::SystolicOnly, &overrides);
        let pair = sel.pairs["S1"];
        assert_eq!(pair.ids(), [RecordId(2), RecordId(0)]);
        assert_eq!(pair.source, PairSource::Manual);
        assert_eq!(sel.overrides_accepted, 1);
        assert!(sel.overrides_rejected.is_empty());
    }

    #[test]
    fn invalid_overrides_fall_back_to_automatic() {
        let store = RecordStore::new(vec![
            bp("S1", Some(120.0), None, None),
            bp("S1", Some(121.0), None, None),
            bp("S1", None, None, None),
        ]);
        let groups = single_group(&store);
        for bad in [
            vec![RecordId(0)],
            vec![RecordId(0), RecordId(0)],
            vec![RecordId(0), RecordId(1), RecordId(2)],
            vec![RecordId(0), RecordId(2)],
            vec![RecordId(0), RecordId(99)],
        ] {
            let overrides = ManualOverrides::from([("S1".into(), bad.clone())]);
            let sel = select_pairs(&store, &groups, AnalysisMode::SystolicOnly, &overrides);
            let pair = sel.pairs["S1"];
            assert_eq!(pair.ids(), [RecordId(0), RecordId(1)], "override {bad:?}");
            assert_eq!(pair.source, PairSource::Automatic);
            assert_eq!(sel.overrides_rejected, vec!["S1".to_string()]);
        }
    }

    #[test]
    fn override_for_unknown_subject_is_ignored() {
        let store = RecordStore::new(vec![
            bp("S1", Some(120.0), None, None),
            bp("S1", Some(121.0), None, None),
        ]);
        let groups = single_group(&store);
        let overrides = ManualOverrides::from([("S9".into(), vec![RecordId(0), RecordId(1)])]);
        let sel = select_pairs(&store, &groups, AnalysisMode::SystolicOnly, &overrides);
        assert_eq!(sel.pairs.len(), 1);
        assert_eq!(sel.pairs["S1"].source, PairSource::Automatic);
        assert_eq!(sel.overrides_rejected, vec!["S9".to_string()]);
    }

    #[test]
    fn kept_is_union_of_pairs() {
        let pairs = [
            Pair { first: RecordId(3), second: RecordId(1), source: PairSource::Automatic },
            Pair { first: RecordId(7), second: RecordId(4), source: PairSource::Manual },
        ];
        let kept: Vec<RecordId> = kept_records(&pairs).into_iter().collect();
        assert_eq!(kept, vec![RecordId(1), RecordId(3), RecordId(4), RecordId(7)]);
    }
}
