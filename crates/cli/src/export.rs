//! CSV export of the three result tables.
//!
//! - `all.csv`      every deduplicated record, with recording number and kept flag
//! - `kept.csv`     records used in a pair
//! - `averaged.csv` one row per paired subject plus single-record placeholders

use std::io;
use std::path::{Path, PathBuf};

use pwa_recon::model::{AveragedRecord, Field, TableRow};
use pwa_recon::ReconResult;

use crate::CliError;

pub const ALL_FILE: &str = "all.csv";
pub const KEPT_FILE: &str = "kept.csv";
pub const AVERAGED_FILE: &str = "averaged.csv";

const LEADING_COLUMNS: [&str; 7] = [
    "Source File",
    "Patient ID",
    "Scanned ID",
    "Scan Date",
    "Scan Time",
    "Recording #",
    "Analyzed",
];

/// Write all three tables into `dir`, creating it if needed.
pub fn write_tables(dir: &Path, result: &ReconResult) -> Result<Vec<PathBuf>, CliError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| CliError::io(format!("cannot create {}: {e}", dir.display())))?;

    let all = dir.join(ALL_FILE);
    write_file(&all, |w| write_record_table(w, &result.all))?;
    let kept = dir.join(KEPT_FILE);
    write_file(&kept, |w| write_record_table(w, &result.kept))?;
    let averaged = dir.join(AVERAGED_FILE);
    write_file(&averaged, |w| write_averaged_table(w, &result.averaged))?;

    Ok(vec![all, kept, averaged])
}

fn write_file(
    path: &Path,
    write: impl FnOnce(&mut std::fs::File) -> Result<(), csv::Error>,
) -> Result<(), CliError> {
    let mut file = std::fs::File::create(path)
        .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))?;
    write(&mut file).map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))
}

pub fn write_record_table<W: io::Write>(writer: W, rows: &[TableRow]) -> Result<(), csv::Error> {
    let mut w = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = LEADING_COLUMNS.to_vec();
    header.extend(Field::ALL.iter().map(Field::label));
    w.write_record(&header)?;

    for row in rows {
        w.write_record(record_cells(row))?;
    }
    w.flush()?;
    Ok(())
}

fn record_cells(row: &TableRow) -> Vec<String> {
    let r = &row.record;
    let mut cells = vec![
        r.source_file.clone(),
        r.display_subject().to_string(),
        r.scanned_id.clone().unwrap_or_default(),
        r.scan_date.map(|d| d.format("%d/%m/%Y").to_string()).unwrap_or_default(),
        r.scan_time.map(|t| t.format("%H:%M:%S").to_string()).unwrap_or_default(),
        row.recording_number.map(|n| n.to_string()).unwrap_or_default(),
        if row.kept { "Yes" } else { "No" }.to_string(),
    ];
    cells.extend(
        Field::ALL
            .iter()
            .map(|f| r.value(*f).map(|v| v.to_string()).unwrap_or_default()),
    );
    cells
}

pub fn write_averaged_table<W: io::Write>(writer: W, rows: &[AveragedRecord]) -> Result<(), csv::Error> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(AveragedRecord::columns())?;

    for row in rows {
        let mut cells = vec![row.subject_id.clone(), row.diagnostic.clone()];
        cells.extend(Field::ALL.iter().map(|f| row.value(*f).render()));
        w.write_record(&cells)?;
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use pwa_recon::model::{FieldValue, MeasurementRecord, RecordId, ReportKind};
    use pwa_recon::{run, ManualOverrides, ReconConfig};

    fn scan(subject: &str, minute: u32, sys: f64) -> MeasurementRecord {
        let mut r = MeasurementRecord::new(subject, format!("{subject}_{minute}.pdf"));
        r.scan_date = NaiveDate::from_ymd_opt(2025, 2, 3);
        r.scan_time = NaiveTime::from_hms_opt(9, minute, 0);
        r.values.insert(Field::PeripheralSystolic, FieldValue::Number(sys));
        r
    }

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn record_row_rendering() {
        let row = TableRow {
            id: RecordId(0),
            recording_number: Some(2),
            kept: true,
            record: scan("S1", 5, 121.5),
        };
        let cells = record_cells(&row);
        assert_eq!(&cells[..7], ["S1_5.pdf", "S1", "", "03/02/2025", "09:05:00", "2", "Yes"]);
        let sys = LEADING_COLUMNS.len() + Field::ALL.iter().position(|f| *f == Field::PeripheralSystolic).unwrap();
        assert_eq!(cells[sys], "121.5");
    }

    #[test]
    fn special_row_shows_message() {
        let row = TableRow {
            id: RecordId(3),
            recording_number: None,
            kept: false,
            record: MeasurementRecord::special(ReportKind::Unrecognized, "notes.pdf"),
        };
        let cells = record_cells(&row);
        assert_eq!(cells[1], "Not recognized as a PWA Detailed Report");
        assert_eq!(cells[5], "");
        assert_eq!(cells[6], "No");
    }

    #[test]
    fn writes_three_tables() {
        let records = vec![scan("S1", 1, 118.0), scan("S1", 2, 120.0), scan("S1", 3, 200.0), scan("S2", 4, 125.0)];
        let result = run(&ReconConfig::default(), records, ManualOverrides::new());

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let written = write_tables(&out, &result).unwrap();
        assert_eq!(written.len(), 3);

        let all = read_rows(&out.join(ALL_FILE));
        assert_eq!(all.len(), 5);
        assert_eq!(all[0][6], "Analyzed");
        let flags: Vec<&str> = all[1..].iter().map(|r| r[6].as_str()).collect();
        assert_eq!(flags, vec!["Yes", "Yes", "No", "No"]);

        let kept = read_rows(&out.join(KEPT_FILE));
        assert_eq!(kept.len(), 3);

        let averaged = read_rows(&out.join(AVERAGED_FILE));
        assert_eq!(averaged.len(), 3);
        assert_eq!(averaged[0][..2], ["Patient ID", "Quality Check"]);
        assert_eq!(averaged[1][..2], ["S1", "Pass"]);
        assert_eq!(averaged[2][0], "S2");
        assert_eq!(averaged[2][1], "Only one file was uploaded for this participant.");
        assert!(averaged[2][2..].iter().all(|c| c == "N/A"));

        let sys = 2 + Field::ALL.iter().position(|f| *f == Field::PeripheralSystolic).unwrap();
        assert_eq!(averaged[1][sys], "119");
    }
}
