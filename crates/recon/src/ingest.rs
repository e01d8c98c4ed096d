//! Ingestion boundary: raw extractor mappings → [`MeasurementRecord`]s.
//!
//! Rows are keyed by the column headers of the exported tables. Values may
//! be JSON numbers or strings; plain decimal strings become numbers. Keys
//! that are neither a bookkeeping column nor a [`Field`] label are ignored.

use chrono::{NaiveDate, NaiveTime};
use log::{debug, warn};
use serde_json::{Map, Value};

use crate::error::ReconError;
use crate::matcher::ManualOverrides;
use crate::model::{
    parse_decimal, Field, FieldValue, MeasurementRecord, ReportKind, CLINICAL_REPORT_MESSAGE,
    UNRECOGNIZED_REPORT_MESSAGE,
};

pub type RawRecord = Map<String, Value>;

pub const SUBJECT_COLUMN: &str = "Patient ID";
pub const SCANNED_ID_COLUMN: &str = "Scanned ID";
pub const SCAN_DATE_COLUMN: &str = "Scan Date";
pub const SCAN_TIME_COLUMN: &str = "Scan Time";
pub const SOURCE_FILE_COLUMN: &str = "Source File";
pub const SOURCE_PATH_COLUMN: &str = "Source Path";
pub const REPORT_TYPE_COLUMN: &str = "Report Type";
pub const SPECIAL_ROW_COLUMN: &str = "Special Row";

/// Columns produced by a previous run; recomputed, so ignored on input.
const DERIVED_COLUMNS: [&str; 4] = ["Recording #", "Analyed", "Analyzed", "Kept"];

const BOOKKEEPING_COLUMNS: [&str; 8] = [
    SUBJECT_COLUMN,
    SCANNED_ID_COLUMN,
    SCAN_DATE_COLUMN,
    SCAN_TIME_COLUMN,
    SOURCE_FILE_COLUMN,
    SOURCE_PATH_COLUMN,
    REPORT_TYPE_COLUMN,
    SPECIAL_ROW_COLUMN,
];

/// Parse a JSON array of row objects.
pub fn load_json_records(input: &str) -> Result<Vec<MeasurementRecord>, ReconError> {
    let rows: Vec<RawRecord> = serde_json::from_str(input)?;
    ingest(rows)
}

/// Parse a headed CSV table. Empty cells are null.
pub fn load_csv_records(input: &str) -> Result<Vec<MeasurementRecord>, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut raw = RawRecord::new();
        for (i, h) in headers.iter().enumerate() {
            let cell = record.get(i).unwrap_or("").trim();
            let value = if cell.is_empty() {
                Value::Null
            } else {
                Value::String(cell.to_string())
            };
            raw.insert(h.clone(), value);
        }
        rows.push(raw);
    }

    ingest(rows)
}

/// Parse manual pair choices: `{ "<subject>": [<record id>, <record id>] }`.
pub fn load_overrides_json(input: &str) -> Result<ManualOverrides, ReconError> {
    Ok(serde_json::from_str(input)?)
}

/// Convert raw rows in arrival order.
pub fn ingest(rows: Vec<RawRecord>) -> Result<Vec<MeasurementRecord>, ReconError> {
    let records = rows
        .into_iter()
        .enumerate()
        .map(|(index, raw)| ingest_one(index, &raw))
        .collect::<Result<Vec<_>, _>>()?;
    debug!("ingested {} record(s)", records.len());
    Ok(records)
}

fn ingest_one(index: usize, raw: &RawRecord) -> Result<MeasurementRecord, ReconError> {
    let subject = text(index, raw, SUBJECT_COLUMN)?;
    let report = report_kind(index, raw, subject.as_deref())?;
    let source_file = text(index, raw, SOURCE_FILE_COLUMN)?.unwrap_or_default();

    if report.is_special() {
        let mut record = MeasurementRecord::special(report, source_file);
        record.source_path = text(index, raw, SOURCE_PATH_COLUMN)?;
        return Ok(record);
    }

    let subject = subject.ok_or_else(|| ReconError::MissingColumn {
        index,
        column: SUBJECT_COLUMN.into(),
    })?;

    let mut record = MeasurementRecord::new(subject, source_file);
    record.source_path = text(index, raw, SOURCE_PATH_COLUMN)?;
    record.scanned_id = text(index, raw, SCANNED_ID_COLUMN)?;

    if let Some(date) = text(index, raw, SCAN_DATE_COLUMN)? {
        record.scan_date = parse_scan_date(&date);
        if record.scan_date.is_none() {
            warn!("record {index}: unparseable scan date '{date}'");
        }
    }
    if let Some(time) = text(index, raw, SCAN_TIME_COLUMN)? {
        record.scan_time = parse_scan_time(&time);
        if record.scan_time.is_none() {
            warn!("record {index}: unparseable scan time '{time}'");
        }
    }

    for (key, value) in raw {
        match Field::from_label(key) {
            Some(field) => {
                if let Some(v) = field_value(index, key, value)? {
                    record.values.insert(field, v);
                }
            }
            None if BOOKKEEPING_COLUMNS.contains(&key.as_str())
                || DERIVED_COLUMNS.contains(&key.as_str()) => {}
            None => debug!("record {index}: ignoring unknown column '{key}'"),
        }
    }

    Ok(record)
}

fn report_kind(index: usize, raw: &RawRecord, subject: Option<&str>) -> Result<ReportKind, ReconError> {
    if let Some(kind) = text(index, raw, REPORT_TYPE_COLUMN)? {
        return match kind.to_ascii_lowercase().as_str() {
            "detailed" => Ok(ReportKind::Detailed),
            "clinical" => Ok(ReportKind::Clinical),
            "unrecognized" => Ok(ReportKind::Unrecognized),
            other => Err(ReconError::InvalidRecord {
                index,
                reason: format!("unknown report type '{other}'"),
            }),
        };
    }

    // Extractor convention: special rows carry their message as the subject
    match subject {
        Some(CLINICAL_REPORT_MESSAGE) => return Ok(ReportKind::Clinical),
        Some(UNRECOGNIZED_REPORT_MESSAGE) => return Ok(ReportKind::Unrecognized),
        _ => {}
    }

    let special = match raw.get(SPECIAL_ROW_COLUMN) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    };
    Ok(if special {
        ReportKind::Unrecognized
    } else {
        ReportKind::Detailed
    })
}

/// Scalar as trimmed text; blank strings are null.
fn text(index: usize, raw: &RawRecord, column: &str) -> Result<Option<String>, ReconError> {
    match raw.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(_) => Err(ReconError::InvalidRecord {
            index,
            reason: format!("column '{column}' must be a scalar"),
        }),
    }
}

fn field_value(index: usize, column: &str, value: &Value) -> Result<Option<FieldValue>, ReconError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64().map(FieldValue::Number)),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else if let Some(n) = parse_decimal(s) {
                Ok(Some(FieldValue::Number(n)))
            } else {
                Ok(Some(FieldValue::Text(s.to_string())))
            }
        }
        Value::Bool(b) => Ok(Some(FieldValue::Text(b.to_string()))),
        Value::Array(_) | Value::Object(_) => Err(ReconError::InvalidRecord {
            index,
            reason: format!("column '{column}' must be a scalar"),
        }),
    }
}

/// Scan dates as printed on reports (`dd/mm/yyyy`) or ISO `yyyy-mm-dd`.
pub fn parse_scan_date(input: &str) -> Option<NaiveDate> {
    let s = input.trim();
    ["%d/%m/%Y", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// `HH:MM:SS` or `HH:MM`.
pub fn parse_scan_time(input: &str) -> Option<NaiveTime> {
    let s = input.trim();
    ["%H:%M:%S", "%H:%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}
