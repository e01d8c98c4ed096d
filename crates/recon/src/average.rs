use std::collections::BTreeMap;

use crate::model::{AveragedRecord, AveragedValue, Field, FieldValue, Pair};
use crate::store::RecordStore;

/// Combine one field of the two records of a pair.
///
/// Numeric values are averaged with missing ones dropped (never counted as
/// zero). Without any numeric value, the first present raw value in pair
/// order is carried over.
pub fn average_field(first: Option<&FieldValue>, second: Option<&FieldValue>) -> AveragedValue {
    let numbers: Vec<f64> = [first, second]
        .into_iter()
        .flatten()
        .filter_map(FieldValue::as_number)
        .collect();

    if !numbers.is_empty() {
        return AveragedValue::Number(numbers.iter().sum::<f64>() / numbers.len() as f64);
    }

    match first.or(second) {
        Some(FieldValue::Text(s)) => AveragedValue::Text(s.clone()),
        Some(FieldValue::Number(n)) => AveragedValue::Number(*n),
        None => AveragedValue::Missing,
    }
}

/// Field-by-field average of a pair.
pub fn average_pair(store: &RecordStore, pair: &Pair) -> BTreeMap<Field, AveragedValue> {
    let (a, b) = (store.record(pair.first), store.record(pair.second));
    Field::ALL
        .iter()
        .map(|&f| (f, average_field(a.value(f), b.value(f))))
        .collect()
}

/// Averaged-table row for a subject with a pair.
pub fn averaged_record(
    store: &RecordStore,
    subject_id: &str,
    pair: &Pair,
    diagnostic: String,
) -> AveragedRecord {
    AveragedRecord {
        subject_id: subject_id.to_string(),
        diagnostic,
        pair: Some(*pair),
        values: average_pair(store, pair),
    }
}

/// Averaged-table row for a subject that could not be paired: every field
/// carries the unavailable marker.
pub fn placeholder_record(subject_id: &str, diagnostic: String, marker: &str) -> AveragedRecord {
    AveragedRecord {
        subject_id: subject_id.to_string(),
        diagnostic,
        pair: None,
        values: Field::ALL
            .iter()
            .map(|&f| (f, AveragedValue::Unavailable(marker.to_string())))
            .collect(),
    }
}
