//! Record arena. Records are addressed by the [`RecordId`] handed out at
//! ingestion; every later stage works on id lists, never on positions.

use std::cmp::Ordering;

use crate::model::{MeasurementRecord, RecordId};

#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: Vec<MeasurementRecord>,
}

impl RecordStore {
    /// Take ownership of records in arrival order; record `i` gets `RecordId(i)`.
    ///
    /// Special rows are normalized here so that no later stage can see
    /// measurement values on them.
    pub fn new(records: Vec<MeasurementRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|mut r| {
                if r.is_special() {
                    r.clear_measurements();
                }
                r
            })
            .collect();
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record behind a handle this store issued.
    ///
    /// # Panics
    /// If `id` was not issued by this store.
    pub fn record(&self, id: RecordId) -> &MeasurementRecord {
        &self.records[id.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        (0..self.records.len()).map(RecordId)
    }

    pub fn special_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_special()).count()
    }

    /// Sort ids into table order: regular rows before special rows, then
    /// subject id, scan date, scan time (nulls last). Stable, so equal keys
    /// keep their relative order.
    pub fn sort_ids(&self, ids: &mut [RecordId]) {
        ids.sort_by(|a, b| table_order(self.record(*a), self.record(*b)));
    }

    pub fn sorted_ids(&self) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = self.ids().collect();
        self.sort_ids(&mut ids);
        ids
    }
}

/// `(is_special, subject_id, scan_date, scan_time)` with nulls last.
pub fn table_order(a: &MeasurementRecord, b: &MeasurementRecord) -> Ordering {
    a.is_special()
        .cmp(&b.is_special())
        .then_with(|| a.subject_id.cmp(&b.subject_id))
        .then_with(|| chronological(a, b))
}

/// `(scan_date, scan_time)` with nulls last.
pub fn chronological(a: &MeasurementRecord, b: &MeasurementRecord) -> Ordering {
    nulls_last(&a.scan_date, &b.scan_date).then_with(|| nulls_last(&a.scan_time, &b.scan_time))
}

fn nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
