use std::collections::HashSet;

use chrono::NaiveTime;
use log::debug;

use crate::model::{Field, FieldValue, MeasurementRecord, RecordId};
use crate::store::RecordStore;

/// Result of deduplicating an id view of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupOutput {
    /// Surviving ids in table order.
    pub kept: Vec<RecordId>,
    /// Dropped ids, in the order they were encountered.
    pub removed: Vec<RecordId>,
}

/// Identity of a scan: `(subject_id, scan_time, PTI diastolic)`.
#[derive(Debug, PartialEq, Eq, Hash)]
struct DedupKey<'a> {
    subject_id: &'a str,
    scan_time: NaiveTime,
    pti_diastolic: ValueKey<'a>,
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum ValueKey<'a> {
    Number(u64),
    Text(&'a str),
}

fn dedup_key(record: &MeasurementRecord) -> Option<DedupKey<'_>> {
    let scan_time = record.scan_time?;
    let pti_diastolic = match record.value(Field::PtiDiastolic)? {
        FieldValue::Number(n) if n.is_nan() => return None,
        // -0.0 and 0.0 are the same reading
        FieldValue::Number(n) => ValueKey::Number(if *n == 0.0 { 0f64.to_bits() } else { n.to_bits() }),
        FieldValue::Text(s) => ValueKey::Text(s),
    };
    Some(DedupKey {
        subject_id: &record.subject_id,
        scan_time,
        pti_diastolic,
    })
}

/// Drop regular records whose key repeats an earlier record in table order.
///
/// Records with any null key component are always kept, and special rows
/// are never compared against anything. The output is in table order.
pub fn deduplicate(store: &RecordStore, ids: &[RecordId]) -> DedupOutput {
    let mut sorted = ids.to_vec();
    store.sort_ids(&mut sorted);

    let mut seen: HashSet<DedupKey<'_>> = HashSet::new();
    let mut kept = Vec::with_capacity(sorted.len());
    let mut removed = Vec::new();

    for id in sorted {
        let record = store.record(id);
        if record.is_special() {
            kept.push(id);
            continue;
        }
        match dedup_key(record) {
            Some(key) => {
                if seen.insert(key) {
                    kept.push(id);
                } else {
                    debug!(
                        "dropping duplicate scan {id} ({}) for subject {}",
                        record.source_file, record.subject_id
                    );
                    removed.push(id);
                }
            }
            None => kept.push(id),
        }
    }

    store.sort_ids(&mut kept);
    DedupOutput { kept, removed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReportKind;
    use chrono::NaiveDate;

    fn scan(subject: &str, time: Option<(u32, u32)>, pti: Option<f64>) -> MeasurementRecord {
        let mut r = MeasurementRecord::new(subject, format!("{subject}.pdf"));
        r.scan_date = NaiveDate::from_ymd_opt(2025, 5, 1);
        r.scan_time = time.and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0));
        if let Some(p) = pti {
            r.values.insert(Field::PtiDiastolic, FieldValue::Number(p));
        }
        r
    }

    fn run(records: Vec<MeasurementRecord>) -> DedupOutput {
        let store = RecordStore::new(records);
        let ids: Vec<RecordId> = store.ids().collect();
        deduplicate(&store, &ids)
    }

    #[test]
    fn exact_duplicate_keeps_first() {
        let out = run(vec![
            scan("A", Some((9, 0)), Some(2100.0)),
            scan("A", Some((9, 0)), Some(2100.0)),
            scan("A", Some((9, 5)), Some(2100.0)),
        ]);
        assert_eq!(out.kept, vec![RecordId(0), RecordId(2)]);
        assert_eq!(out.removed, vec![RecordId(1)]);
    }

    #[test]
    fn every_repeat_after_the_first_is_removed() {
        let out = run(vec![
            scan("A", Some((9, 0)), Some(2100.0)),
            scan("A", Some((9, 0)), Some(2100.0)),
            scan("B", Some((9, 0)), Some(2100.0)),
            scan("A", Some((9, 0)), Some(2100.0)),
        ]);
        assert_eq!(out.kept, vec![RecordId(0), RecordId(2)]);
        assert_eq!(out.removed, vec![RecordId(1), RecordId(3)]);
    }

    #[test]
    fn different_subjects_never_collide() {
        let out = run(vec![
            scan("A", Some((9, 0)), Some(2100.0)),
            scan("B", Some((9, 0)), Some(2100.0)),
        ]);
        assert!(out.removed.is_empty());
    }

    #[test]
    fn null_key_components_are_unique() {
        let out = run(vec![
            scan("A", None, Some(2100.0)),
            scan("A", None, Some(2100.0)),
            scan("A", Some((9, 0)), None),
            scan("A", Some((9, 0)), None),
        ]);
        assert_eq!(out.kept.len(), 4);
        assert!(out.removed.is_empty());
    }

    #[test]
    fn special_rows_are_never_deduplicated() {
        let out = run(vec![
            MeasurementRecord::special(ReportKind::Clinical, "A_1.pdf"),
            MeasurementRecord::special(ReportKind::Clinical, "A_1.pdf"),
            scan("A", Some((9, 0)), Some(1.0)),
        ]);
        assert_eq!(out.kept, vec![RecordId(2), RecordId(0), RecordId(1)]);
    }

    #[test]
    fn text_and_number_keys_differ() {
        let mut text = scan("A", Some((9, 0)), None);
        text.values
            .insert(Field::PtiDiastolic, FieldValue::Text("2100".into()));
        let out = run(vec![scan("A", Some((9, 0)), Some(2100.0)), text]);
        assert!(out.removed.is_empty());
    }

    #[test]
    fn idempotent_on_own_output() {
        let store = RecordStore::new(vec![
            scan("A", Some((9, 0)), Some(2100.0)),
            scan("A", Some((9, 0)), Some(2100.0)),
            scan("B", Some((9, 0)), Some(1.0)),
        ]);
        let ids: Vec<RecordId> = store.ids().collect();
        let once = deduplicate(&store, &ids);
        let twice = deduplicate(&store, &once.kept);
        assert_eq!(twice.kept, once.kept);
        assert!(twice.removed.is_empty());
    }
}
