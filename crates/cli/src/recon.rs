//! `pwarecon run | review | validate`: reconcile repeated scans per subject.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveTime};
use clap::{Subcommand, ValueEnum};
use log::{info, warn};
use serde::Serialize;

use pwa_recon::ingest::{load_csv_records, load_json_records, load_overrides_json};
use pwa_recon::model::{Field, MeasurementRecord, RecordId};
use pwa_recon::store::RecordStore;
use pwa_recon::{AnalysisMode, Pipeline, ReconConfig, ReviewCandidate, ReviewDecision};

use crate::exit_codes::EXIT_QUALITY_FLAGGED;
use crate::export::write_tables;
use crate::CliError;

#[derive(Subcommand)]
pub enum ReconCommands {
    /// Reconcile a table of extracted scan records
    #[command(after_help = "\
Examples:
  pwarecon run scans.json
  pwarecon run scans.csv --config baseline.recon.toml --out-dir results/
  pwarecon run scans.json --overrides pairs.json --json
  pwarecon run scans.json --mode peripheral-triplet --output result.json")]
    Run {
        /// Records file (.json array of rows or headed .csv)
        records: PathBuf,

        /// Path to a .recon.toml config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the analysis mode from the config
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Records file format (default: from the file extension)
        #[arg(long, value_enum)]
        format: Option<RecordsFormat>,

        /// Manual pair choices: JSON object of subject id → [record id, record id]
        #[arg(long)]
        overrides: Option<PathBuf>,

        /// Write all.csv, kept.csv and averaged.csv into this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Exit non-zero when any subject fails the quality checks
        #[arg(long)]
        strict: bool,
    },

    /// List subjects offered for manual pair selection, as JSON
    #[command(after_help = "\
Examples:
  pwarecon review scans.json > candidates.json
  pwarecon review scans.csv --config baseline.recon.toml")]
    Review {
        /// Records file (.json array of rows or headed .csv)
        records: PathBuf,

        /// Path to a .recon.toml config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the analysis mode from the config
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Records file format (default: from the file extension)
        #[arg(long, value_enum)]
        format: Option<RecordsFormat>,
    },

    /// Validate a recon config without running
    #[command(after_help = "\
Examples:
  pwarecon validate baseline.recon.toml")]
    Validate {
        /// Path to the .recon.toml config file
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    PeripheralTriplet,
    SystolicOnly,
}

impl From<ModeArg> for AnalysisMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::PeripheralTriplet => AnalysisMode::PeripheralTriplet,
            ModeArg::SystolicOnly => AnalysisMode::SystolicOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecordsFormat {
    Json,
    Csv,
}

impl RecordsFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

pub fn cmd_recon(cmd: ReconCommands) -> Result<(), CliError> {
    match cmd {
        ReconCommands::Run {
            records,
            config,
            mode,
            format,
            overrides,
            out_dir,
            json,
            output,
            strict,
        } => cmd_recon_run(RunArgs {
            records,
            config,
            mode,
            format,
            overrides,
            out_dir,
            json,
            output,
            strict,
        }),
        ReconCommands::Review { records, config, mode, format } => {
            cmd_recon_review(records, config, mode, format)
        }
        ReconCommands::Validate { config } => cmd_recon_validate(config),
    }
}

struct RunArgs {
    records: PathBuf,
    config: Option<PathBuf>,
    mode: Option<ModeArg>,
    format: Option<RecordsFormat>,
    overrides: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    json: bool,
    output: Option<PathBuf>,
    strict: bool,
}

fn read_file(path: &Path, what: &str) -> Result<String, CliError> {
    std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("cannot read {what} {}: {e}", path.display())))
}

fn load_config(path: Option<&Path>, mode: Option<ModeArg>) -> Result<ReconConfig, CliError> {
    let config = match path {
        Some(path) => ReconConfig::from_toml(&read_file(path, "config")?)?,
        None => ReconConfig::default(),
    };
    Ok(match mode {
        Some(mode) => config.with_mode(mode.into()),
        None => config,
    })
}

fn load_records(path: &Path, format: Option<RecordsFormat>) -> Result<Vec<MeasurementRecord>, CliError> {
    let format = format.or_else(|| RecordsFormat::from_path(path)).ok_or_else(|| {
        CliError::args(format!("cannot infer records format of {}", path.display()))
            .with_hint("use --format json or --format csv")
    })?;

    let input = read_file(path, "records")?;
    let records = match format {
        RecordsFormat::Json => load_json_records(&input)?,
        RecordsFormat::Csv => load_csv_records(&input)?,
    };
    info!("loaded {} record(s) from {}", records.len(), path.display());
    Ok(records)
}

fn cmd_recon_run(args: RunArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref(), args.mode)?;
    let records = load_records(&args.records, args.format)?;

    let decision = match args.overrides {
        Some(ref path) => ReviewDecision::Manual(load_overrides_json(&read_file(path, "overrides")?)?),
        None => ReviewDecision::Automatic,
    };

    let result = Pipeline::new(config).prepare(records).finish(decision);

    if let Some(ref dir) = args.out_dir {
        for path in write_tables(dir, &result)? {
            eprintln!("wrote {}", path.display());
        }
    }

    let wants_json = args.json || args.output.is_some();
    if wants_json {
        let json_str = serde_json::to_string_pretty(&result)
            .map_err(|e| CliError::other(format!("JSON serialization error: {e}")))?;

        if let Some(ref path) = args.output {
            std::fs::write(path, &json_str)
                .map_err(|e| CliError::io(format!("cannot write output: {e}")))?;
            eprintln!("wrote {}", path.display());
        }
        if args.json {
            println!("{json_str}");
        }
    }

    // Human summary to stderr
    let s = &result.summary;
    eprintln!(
        "{} mode: {} records ({} duplicates, {} special), {} subjects, {} averaged, {} single-record, {} flagged",
        result.meta.mode,
        s.records_ingested,
        s.duplicates_removed,
        s.special_rows,
        s.subjects,
        s.averaged_rows,
        s.placeholder_rows,
        s.subjects_flagged,
    );
    if s.manual_overrides_accepted + s.manual_overrides_rejected > 0 {
        eprintln!(
            "manual pairs: {} applied, {} ignored",
            s.manual_overrides_accepted, s.manual_overrides_rejected
        );
    }

    if !args.json {
        for report in result.diagnostics.iter().filter(|d| !d.passed()) {
            eprintln!("  {}: {}", report.subject_id, report.diagnostic());
        }
    }

    if args.strict && s.subjects_flagged > 0 {
        return Err(CliError::new(
            EXIT_QUALITY_FLAGGED,
            format!("{} subject(s) failed quality checks", s.subjects_flagged),
        ));
    }

    Ok(())
}

// ----------------------------------------------------------------------------
// review
// ----------------------------------------------------------------------------

#[derive(Serialize)]
struct ReviewOutput<'a> {
    mode: AnalysisMode,
    candidates: Vec<CandidateView<'a>>,
}

#[derive(Serialize)]
struct CandidateView<'a> {
    subject_id: &'a str,
    automatic: Option<[RecordId; 2]>,
    records: Vec<RecordView<'a>>,
}

#[derive(Serialize)]
struct RecordView<'a> {
    id: RecordId,
    source_file: &'a str,
    scan_date: Option<NaiveDate>,
    scan_time: Option<NaiveTime>,
    eligible: bool,
    values: BTreeMap<&'static str, Option<f64>>,
}

fn candidate_view<'a>(store: &'a RecordStore, candidate: &'a ReviewCandidate, fields: &[Field]) -> CandidateView<'a> {
    let records = candidate
        .records
        .iter()
        .map(|&id| {
            let record = store.record(id);
            RecordView {
                id,
                source_file: &record.source_file,
                scan_date: record.scan_date,
                scan_time: record.scan_time,
                eligible: candidate.eligible.contains(&id),
                values: fields.iter().map(|f| (f.label(), record.number(*f))).collect(),
            }
        })
        .collect();

    CandidateView {
        subject_id: &candidate.subject_id,
        automatic: candidate.automatic.map(|p| p.ids()),
        records,
    }
}

fn cmd_recon_review(
    records_path: PathBuf,
    config_path: Option<PathBuf>,
    mode: Option<ModeArg>,
    format: Option<RecordsFormat>,
) -> Result<(), CliError> {
    let config = load_config(config_path.as_deref(), mode)?;
    let records = load_records(&records_path, format)?;
    let mode = config.mode;

    let prepared = Pipeline::new(config).prepare(records);
    let output = ReviewOutput {
        mode,
        candidates: prepared
            .candidates()
            .iter()
            .map(|c| candidate_view(prepared.store(), c, mode.fields()))
            .collect(),
    };

    let json_str = serde_json::to_string_pretty(&output)
        .map_err(|e| CliError::other(format!("JSON serialization error: {e}")))?;
    println!("{json_str}");

    if output.candidates.is_empty() {
        warn!("no subject has enough records for manual review");
    }
    eprintln!("{} subject(s) offered for review", output.candidates.len());
    Ok(())
}

// ----------------------------------------------------------------------------
// validate
// ----------------------------------------------------------------------------

fn cmd_recon_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = ReconConfig::from_toml(&read_file(&config_path, "config")?)?;
    eprintln!(
        "valid: \"{}\" ({} mode, max delta {} mmHg, review from {} records)",
        config.name, config.mode, config.quality.max_pressure_delta, config.review.min_records
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension() {
        assert_eq!(RecordsFormat::from_path(Path::new("a/scans.JSON")), Some(RecordsFormat::Json));
        assert_eq!(RecordsFormat::from_path(Path::new("scans.csv")), Some(RecordsFormat::Csv));
        assert_eq!(RecordsFormat::from_path(Path::new("scans.xlsx")), None);
        assert_eq!(RecordsFormat::from_path(Path::new("scans")), None);
    }

    #[test]
    fn mode_flag_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.recon.toml");
        std::fs::write(&path, "name = \"x\"\nmode = \"systolic_only\"\n").unwrap();

        let config = load_config(Some(&path), Some(ModeArg::PeripheralTriplet)).unwrap();
        assert_eq!(config.mode, AnalysisMode::PeripheralTriplet);
        assert_eq!(config.name, "x");

        let config = load_config(None, None).unwrap();
        assert_eq!(config.mode, AnalysisMode::SystolicOnly);
    }

    #[test]
    fn invalid_config_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.recon.toml");
        std::fs::write(&path, "[quality]\nmax_pressure_delta = -1.0\n").unwrap();
        let err = load_config(Some(&path), None).unwrap_err();
        assert_eq!(err.code, crate::exit_codes::EXIT_INVALID_CONFIG);
    }

    #[test]
    fn unknown_extension_needs_format() {
        let err = load_records(Path::new("scans.xlsx"), None).unwrap_err();
        assert_eq!(err.code, crate::exit_codes::EXIT_USAGE);
        assert!(err.hint.is_some());
    }

    #[test]
    fn review_view_lists_mode_values() {
        let json = r#"[
            {"Patient ID": "S1", "Source File": "S1_a.pdf", "Scan Time": "09:00", "Peripheral Systolic Pressure (mmHg)": 118},
            {"Patient ID": "S1", "Source File": "S1_b.pdf", "Scan Time": "09:05", "Peripheral Systolic Pressure (mmHg)": 120},
            {"Patient ID": "S1", "Source File": "S1_c.pdf", "Scan Time": "09:10"}
        ]"#;
        let prepared = Pipeline::new(ReconConfig::default()).prepare(load_json_records(json).unwrap());
        let candidate = &prepared.candidates()[0];
        let view = candidate_view(prepared.store(), candidate, AnalysisMode::SystolicOnly.fields());

        assert_eq!(view.automatic, Some([RecordId(0), RecordId(1)]));
        assert_eq!(view.records.len(), 3);
        assert!(!view.records[2].eligible);
        assert_eq!(view.records[0].values["Peripheral Systolic Pressure (mmHg)"], Some(118.0));
    }
}
