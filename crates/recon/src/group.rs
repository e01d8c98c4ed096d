use std::collections::{BTreeMap, HashMap};

use crate::model::{RecordId, SubjectGroup};
use crate::store::{chronological, RecordStore};

#[derive(Debug, Clone, Default)]
pub struct Grouping {
    /// One group per subject, ascending subject id.
    pub groups: Vec<SubjectGroup>,
    /// 1-based position of each regular record inside its subject's group.
    pub recording_numbers: HashMap<RecordId, u32>,
}

impl Grouping {
    pub fn group(&self, subject_id: &str) -> Option<&SubjectGroup> {
        self.groups
            .binary_search_by(|g| g.subject_id.as_str().cmp(subject_id))
            .ok()
            .map(|i| &self.groups[i])
    }

    pub fn recording_number(&self, id: RecordId) -> Option<u32> {
        self.recording_numbers.get(&id).copied()
    }
}

/// Partition the regular records of `ids` by subject, chronological within
/// each subject. Special rows are skipped and get no recording number.
pub fn group_by_subject(store: &RecordStore, ids: &[RecordId]) -> Grouping {
    let mut by_subject: BTreeMap<&str, Vec<RecordId>> = BTreeMap::new();
    for &id in ids {
        let record = store.record(id);
        if record.is_special() {
            continue;
        }
        by_subject.entry(record.subject_id.as_str()).or_default().push(id);
    }

    let mut recording_numbers = HashMap::new();
    let groups = by_subject
        .into_iter()
        .map(|(subject_id, mut records)| {
            records.sort_by(|a, b| chronological(store.record(*a), store.record(*b)));
            for (n, id) in records.iter().enumerate() {
                recording_numbers.insert(*id, n as u32 + 1);
            }
            SubjectGroup {
                subject_id: subject_id.to_string(),
                records,
            }
        })
        .collect();

    Grouping {
        groups,
        recording_numbers,
    }
}
