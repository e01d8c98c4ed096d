//! `pwa-recon`: pulse wave analysis record reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded measurement records, returns
//! deduplicated, paired and averaged tables with per-subject quality checks.
//! No CLI or filesystem dependencies.

pub mod average;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod group;
pub mod ingest;
pub mod matcher;
pub mod model;
pub mod quality;
pub mod review;
pub mod store;

pub use config::{AnalysisMode, ReconConfig};
pub use engine::{run, Pipeline, PreparedRun};
pub use error::ReconError;
pub use matcher::ManualOverrides;
pub use model::{
    AveragedRecord, AveragedValue, Field, FieldValue, MeasurementRecord, Pair, QualityReport, ReconResult,
    RecordId, ReportKind, TableRow,
};
pub use review::{ReviewCandidate, ReviewDecision};
