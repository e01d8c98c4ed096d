use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize, Serializer};

use crate::config::AnalysisMode;

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// The closed set of per-scan value columns, in export column order.
///
/// Bookkeeping columns (source file, scanned id, scan date/time, recording
/// number, kept flag, source path) live on [`MeasurementRecord`] itself and
/// are deliberately not `Field`s: they have no meaningful average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    DateOfBirth,
    Age,
    Gender,
    HeightM,
    PulseCount,
    PulseHeight,
    PulseHeightVariation,
    DiastolicVariation,
    ShapeDeviation,
    PulseLengthVariation,
    OverallQuality,
    PeripheralSystolic,
    PeripheralDiastolic,
    PeripheralPulsePressure,
    PeripheralMean,
    AorticSystolic,
    AorticDiastolic,
    AorticPulsePressure,
    HeartRate,
    PulsePressureAmplification,
    Period,
    EjectionDurationMs,
    EjectionDurationPct,
    AorticT2,
    P1Height,
    AorticAugmentation,
    AorticAixApPp,
    AorticAixP2P1,
    AorticAixApPpHr75,
    BuckbergSevr,
    PtiSystolic,
    PtiDiastolic,
    EndSystolicPressure,
    MapSystolic,
    MapDiastolic,
}

impl Field {
    pub const ALL: [Field; 35] = [
        Self::DateOfBirth,
        Self::Age,
        Self::Gender,
        Self::HeightM,
        Self::PulseCount,
        Self::PulseHeight,
        Self::PulseHeightVariation,
        Self::DiastolicVariation,
        Self::ShapeDeviation,
        Self::PulseLengthVariation,
        Self::OverallQuality,
        Self::PeripheralSystolic,
        Self::PeripheralDiastolic,
        Self::PeripheralPulsePressure,
        Self::PeripheralMean,
        Self::AorticSystolic,
        Self::AorticDiastolic,
        Self::AorticPulsePressure,
        Self::HeartRate,
        Self::PulsePressureAmplification,
        Self::Period,
        Self::EjectionDurationMs,
        Self::EjectionDurationPct,
        Self::AorticT2,
        Self::P1Height,
        Self::AorticAugmentation,
        Self::AorticAixApPp,
        Self::AorticAixP2P1,
        Self::AorticAixApPpHr75,
        Self::BuckbergSevr,
        Self::PtiSystolic,
        Self::PtiDiastolic,
        Self::EndSystolicPressure,
        Self::MapSystolic,
        Self::MapDiastolic,
    ];

    /// Column header as printed in exported tables.
    pub fn label(&self) -> &'static str {
        match self {
            Self::DateOfBirth => "Date of Birth",
            Self::Age => "Age",
            Self::Gender => "Gender",
            Self::HeightM => "Height (m)",
            Self::PulseCount => "# of Pulses",
            Self::PulseHeight => "Pulse Height",
            Self::PulseHeightVariation => "Pulse Height Variation (%)",
            Self::DiastolicVariation => "Diastolic Variation (%)",
            Self::ShapeDeviation => "Shape Deviation (%)",
            Self::PulseLengthVariation => "Pulse Length Variation (%)",
            Self::OverallQuality => "Overall Quality (%)",
            Self::PeripheralSystolic => "Peripheral Systolic Pressure (mmHg)",
            Self::PeripheralDiastolic => "Peripheral Diastolic Pressure (mmHg)",
            Self::PeripheralPulsePressure => "Peripheral Pulse Pressure (mmHg)",
            Self::PeripheralMean => "Peripheral Mean Pressure (mmHg)",
            Self::AorticSystolic => "Aortic Systolic Pressure (mmHg)",
            Self::AorticDiastolic => "Aortic Diastolic Pressure (mmHg)",
            Self::AorticPulsePressure => "Aortic Pulse Pressure (mmHg)",
            Self::HeartRate => "Heart Rate (bpm)",
            Self::PulsePressureAmplification => "Pulse Pressure Amplification (%)",
            Self::Period => "Period (ms)",
            Self::EjectionDurationMs => "Ejection Duration (ms)",
            Self::EjectionDurationPct => "Ejection Duration (%)",
            Self::AorticT2 => "Aortic T2 (ms)",
            Self::P1Height => "P1 Height (mmHg)",
            Self::AorticAugmentation => "Aortic Augmentation (mmHg)",
            Self::AorticAixApPp => "Aortic AIx AP/PP(%)",
            Self::AorticAixP2P1 => "Aortic AIx P2/P1(%)",
            Self::AorticAixApPpHr75 => "Aortic AIx AP/PP @ HR75 (%)",
            Self::BuckbergSevr => "Buckberg SEVR (%)",
            Self::PtiSystolic => "PTI Systolic (mmHg.s/min)",
            Self::PtiDiastolic => "PTI Diastolic (mmHg.s/min)",
            Self::EndSystolicPressure => "End Systolic Pressure (mmHg)",
            Self::MapSystolic => "MAP Systolic (mmHg)",
            Self::MapDiastolic => "MAP Diastolic (mmHg)",
        }
    }

    /// Look a field up by its column header (exact match).
    pub fn from_label(label: &str) -> Option<Field> {
        Self::ALL.iter().copied().find(|f| f.label() == label)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A present (non-null) field value as delivered by the extractor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Numeric view of the value. Text counts when it is a plain decimal
    /// literal; NaN never counts.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) if !n.is_nan() => Some(*n),
            Self::Number(_) => None,
            Self::Text(s) => parse_decimal(s),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Parse `[+-]?digits[.digits]`, surrounding whitespace allowed.
pub fn parse_decimal(input: &str) -> Option<f64> {
    let s = input.trim();
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };
    let digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    if !digits(int_part) || frac_part.is_some_and(|f| !digits(f)) {
        return None;
    }
    s.parse().ok()
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Stable handle of a record, assigned once at ingestion (arrival order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub usize);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub const CLINICAL_REPORT_MESSAGE: &str =
    "Recognized as a Clinical Report, only upload the Detailed Reports";
pub const UNRECOGNIZED_REPORT_MESSAGE: &str = "Not recognized as a PWA Detailed Report";

/// Document classification made by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Detailed,
    Clinical,
    Unrecognized,
}

impl ReportKind {
    /// Anything but a detailed report is a special row.
    pub fn is_special(&self) -> bool {
        !matches!(self, Self::Detailed)
    }

    /// Reviewer-facing text shown in place of the subject id for special rows.
    pub fn message(&self) -> Option<&'static str> {
        match self {
            Self::Detailed => None,
            Self::Clinical => Some(CLINICAL_REPORT_MESSAGE),
            Self::Unrecognized => Some(UNRECOGNIZED_REPORT_MESSAGE),
        }
    }
}

/// One parsed scan.
#[derive(Debug, Clone, Serialize)]
pub struct MeasurementRecord {
    pub subject_id: String,
    pub scanned_id: Option<String>,
    pub scan_date: Option<NaiveDate>,
    pub scan_time: Option<NaiveTime>,
    pub source_file: String,
    pub source_path: Option<String>,
    pub report: ReportKind,
    pub values: BTreeMap<Field, FieldValue>,
}

impl MeasurementRecord {
    /// A detailed-report record with no values yet.
    pub fn new(subject_id: impl Into<String>, source_file: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            scanned_id: None,
            scan_date: None,
            scan_time: None,
            source_file: source_file.into(),
            source_path: None,
            report: ReportKind::Detailed,
            values: BTreeMap::new(),
        }
    }

    /// A special row: every measurement and scan column is null.
    pub fn special(report: ReportKind, source_file: impl Into<String>) -> Self {
        let mut record = Self::new(report.message().unwrap_or_default(), source_file);
        record.report = report;
        record
    }

    pub fn is_special(&self) -> bool {
        self.report.is_special()
    }

    pub fn value(&self, field: Field) -> Option<&FieldValue> {
        self.values.get(&field)
    }

    pub fn number(&self, field: Field) -> Option<f64> {
        self.value(field).and_then(FieldValue::as_number)
    }

    /// Subject the source document belongs to, derived from its file name
    /// (`<subject>_<anything>.pdf` → `<subject>`).
    pub fn origin_subject(&self) -> &str {
        let name = self
            .source_file
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.source_file);
        let stem = match name.rfind('.') {
            Some(dot) if dot > 0 => &name[..dot],
            _ => name,
        };
        stem.split('_').next().unwrap_or(stem)
    }

    /// Text for the subject column: the id, or the classification message
    /// for special rows.
    pub fn display_subject(&self) -> &str {
        self.report.message().unwrap_or(&self.subject_id)
    }

    /// Drop everything a special row must not carry.
    pub(crate) fn clear_measurements(&mut self) {
        self.scanned_id = None;
        self.scan_date = None;
        self.scan_time = None;
        self.values.clear();
    }
}

// ---------------------------------------------------------------------------
// Grouping + pairing
// ---------------------------------------------------------------------------

/// Non-special records of one subject, chronological.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectGroup {
    pub subject_id: String,
    pub records: Vec<RecordId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairSource {
    Automatic,
    Manual,
}

/// Two distinct records of the same subject, in declared order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pair {
    pub first: RecordId,
    pub second: RecordId,
    pub source: PairSource,
}

impl Pair {
    pub fn ids(&self) -> [RecordId; 2] {
        [self.first, self.second]
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.first == id || self.second == id
    }
}

// ---------------------------------------------------------------------------
// Quality
// ---------------------------------------------------------------------------

pub const SINGLE_RECORD_MESSAGE: &str = "Only one file was uploaded for this participant.";
pub const CLINICAL_CONTAMINATION_MESSAGE: &str =
    "A Clinical Report was uploaded for this participant; only Detailed Reports were used.";
pub const SCAN_DATE_MISMATCH_MESSAGE: &str = "The averaged files have different scan dates.";
pub const PASS: &str = "Pass";
pub const DIAGNOSTIC_SEPARATOR: &str = "//";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum QualityFinding {
    SingleRecord,
    ClinicalReport,
    ScanDateMismatch {
        first: NaiveDate,
        second: NaiveDate,
    },
    ExcessiveDisagreement {
        field: Field,
        delta: f64,
        threshold: f64,
    },
}

impl fmt::Display for QualityFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleRecord => f.write_str(SINGLE_RECORD_MESSAGE),
            Self::ClinicalReport => f.write_str(CLINICAL_CONTAMINATION_MESSAGE),
            Self::ScanDateMismatch { .. } => f.write_str(SCAN_DATE_MISMATCH_MESSAGE),
            Self::ExcessiveDisagreement { field, threshold, .. } => write!(
                f,
                "{} differs by more than {threshold} mmHg between the averaged files.",
                field.label()
            ),
        }
    }
}

/// Quality-check outcome for one subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub subject_id: String,
    pub single_record: bool,
    pub findings: Vec<QualityFinding>,
}

impl QualityReport {
    pub fn passed(&self) -> bool {
        self.findings.is_empty()
    }

    /// `Pass`, or every finding message joined with `//`.
    pub fn diagnostic(&self) -> String {
        if self.findings.is_empty() {
            return PASS.to_string();
        }
        self.findings
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(DIAGNOSTIC_SEPARATOR)
    }
}

// ---------------------------------------------------------------------------
// Output tables
// ---------------------------------------------------------------------------

/// A cell of the averaged table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AveragedValue {
    Number(f64),
    Text(String),
    /// Sentinel written into placeholder rows.
    Unavailable(String),
    Missing,
}

impl AveragedValue {
    pub fn render(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) | Self::Unavailable(s) => s.clone(),
            Self::Missing => String::new(),
        }
    }
}

/// One row of the averaged table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AveragedRecord {
    pub subject_id: String,
    pub diagnostic: String,
    /// `None` for single-record placeholder rows.
    pub pair: Option<Pair>,
    pub values: BTreeMap<Field, AveragedValue>,
}

static MISSING: AveragedValue = AveragedValue::Missing;

impl AveragedRecord {
    pub fn is_placeholder(&self) -> bool {
        self.pair.is_none()
    }

    pub fn value(&self, field: Field) -> &AveragedValue {
        self.values.get(&field).unwrap_or(&MISSING)
    }

    /// Header row: subject id, diagnostic, then every field.
    pub fn columns() -> Vec<&'static str> {
        let mut cols = vec!["Patient ID", "Quality Check"];
        cols.extend(Field::ALL.iter().map(Field::label));
        cols
    }
}

/// One row of the `all` / `kept` tables.
#[derive(Debug, Clone, Serialize)]
pub struct TableRow {
    pub id: RecordId,
    pub recording_number: Option<u32>,
    pub kept: bool,
    pub record: MeasurementRecord,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconSummary {
    pub records_ingested: usize,
    pub special_rows: usize,
    pub duplicates_removed: usize,
    pub subjects: usize,
    pub averaged_rows: usize,
    pub placeholder_rows: usize,
    pub subjects_flagged: usize,
    pub kept_records: usize,
    pub manual_overrides_accepted: usize,
    pub manual_overrides_rejected: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub mode: AnalysisMode,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub summary: ReconSummary,
    pub all: Vec<TableRow>,
    pub kept: Vec<TableRow>,
    pub averaged: Vec<AveragedRecord>,
    pub pairs: BTreeMap<String, Pair>,
    pub diagnostics: Vec<QualityReport>,
}
