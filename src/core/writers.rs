//! Writers for processed survey data.
//!
//! Exports cover the space-delimited `.xyz` interchange format, a peak table
//! as CSV, and an append-only xlsx log that accumulates one sheet per
//! processed survey.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Data, Reader, Xlsx};
use log::debug;
use rust_xlsxwriter::Workbook;
use thiserror::Error;

use super::loaders::DATETIME_FORMAT;
use crate::processors::assembly::AssembledSensor;
use crate::processors::identity::IdentityMap;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Failed to create directory: {path}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create file: {path}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("workbook {path} already has a sheet named '{sheet}'")]
    SheetExists { sheet: String, path: PathBuf },

    #[error("xlsx error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("failed to read workbook: {0}")]
    Workbook(#[from] calamine::XlsxError),
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| WriteError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    Ok(())
}

/// Write an assembled sensor as a space-delimited `.xyz` file.
///
/// The first line names the columns; every following line is one row with
/// missing cells written as `*`, which the loaders parse back as missing.
///
/// # Errors
///
/// Returns an error if the file or a parent directory cannot be created or
/// written.
pub fn write_sensor_xyz<P: AsRef<Path>>(path: P, sensor: &AssembledSensor) -> Result<()> {
    let path = path.as_ref();
    ensure_parent_dirs(path)?;

    let file = File::create(path).map_err(|source| WriteError::CreateFile {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);

    let write_err = |source| WriteError::WriteFile {
        path: path.to_path_buf(),
        source,
    };

    writeln!(writer, "{}", sensor.columns.join(" ")).map_err(write_err)?;
    for row in 0..sensor.num_rows() {
        let mut line = String::new();
        for (i, column) in sensor.data.iter().enumerate() {
            if i > 0 {
                line.push(' ');
            }
            line.push_str(&column[row].to_string());
        }
        writeln!(writer, "{line}").map_err(write_err)?;
    }
    writer.flush().map_err(write_err)?;

    debug!("Wrote {} rows to {}", sensor.num_rows(), path.display());
    Ok(())
}

const PEAK_HEADERS: [&str; 4] = ["SENSOR", "GROUPNUM", "CH_1", "DATETIME"];

/// Write the resolved peak table as CSV.
///
/// One record per sensor in firing order, with the 1-based group number, the
/// calibration peak amplitude, and the peak timestamp.
///
/// # Errors
///
/// Returns an error if the file cannot be created or a record cannot be
/// serialized.
pub fn write_peak_table_csv<P: AsRef<Path>>(path: P, identities: &IdentityMap) -> Result<()> {
    let path = path.as_ref();
    ensure_parent_dirs(path)?;

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(PEAK_HEADERS)?;
    for assignment in identities.assignments() {
        writer.write_record([
            assignment.sensor.clone(),
            (assignment.group_index + 1).to_string(),
            assignment.peak_value.to_string(),
            assignment.peak_time.format(DATETIME_FORMAT).to_string(),
        ])?;
    }
    writer.flush().map_err(|source| WriteError::WriteFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Append the resolved peak table to a workbook as a new named sheet.
///
/// If the workbook exists its sheets are read and carried over; the new
/// sheet is refused when a sheet of that name is already present, so a
/// survey cannot be logged twice under the same label.
///
/// # Errors
///
/// Returns an error if the existing workbook cannot be read, the sheet name
/// is taken, or the workbook cannot be written back.
pub fn append_peak_sheet_xlsx<P: AsRef<Path>>(
    path: P,
    sheet: &str,
    identities: &IdentityMap,
) -> Result<()> {
    let path = path.as_ref();
    ensure_parent_dirs(path)?;

    let existing = if path.exists() {
        read_all_sheets(path)?
    } else {
        Vec::new()
    };
    if existing.iter().any(|(name, _)| name == sheet) {
        return Err(WriteError::SheetExists {
            sheet: sheet.to_string(),
            path: path.to_path_buf(),
        });
    }

    let mut workbook = Workbook::new();

    for (name, rows) in &existing {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(name)?;
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                match cell {
                    SheetCell::Number(v) => {
                        worksheet.write_number(r as u32, c as u16, *v)?;
                    }
                    SheetCell::Text(v) => {
                        worksheet.write_string(r as u32, c as u16, v)?;
                    }
                    SheetCell::Empty => {}
                }
            }
        }
    }

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet)?;
    for (c, header) in PEAK_HEADERS.iter().enumerate() {
        worksheet.write_string(0, c as u16, *header)?;
    }
    for (r, assignment) in identities.assignments().iter().enumerate() {
        let row = r as u32 + 1;
        worksheet.write_string(row, 0, &assignment.sensor)?;
        worksheet.write_number(row, 1, (assignment.group_index + 1) as f64)?;
        worksheet.write_number(row, 2, assignment.peak_value)?;
        worksheet.write_string(
            row,
            3,
            &assignment.peak_time.format(DATETIME_FORMAT).to_string(),
        )?;
    }

    workbook.save(path)?;
    debug!("Appended sheet '{sheet}' to {}", path.display());
    Ok(())
}

enum SheetCell {
    Number(f64),
    Text(String),
    Empty,
}

fn read_all_sheets(path: &Path) -> Result<Vec<(String, Vec<Vec<SheetCell>>)>> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let names = workbook.sheet_names().to_vec();

    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook.worksheet_range(&name)?;
        let rows = range
            .rows()
            .map(|row| {
                row.iter()
                    .map(|cell| match cell {
                        Data::Float(v) => SheetCell::Number(*v),
                        Data::Int(v) => SheetCell::Number(*v as f64),
                        Data::Empty => SheetCell::Empty,
                        other => SheetCell::Text(other.to_string()),
                    })
                    .collect()
            })
            .collect();
        sheets.push((name, rows));
    }
    Ok(sheets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::{load_survey_table, Field};
    use chrono::NaiveDate;
    use crate::processors::identity::resolve_identities;
    use crate::processors::grouping::SensorGroup;
    use tempfile::tempdir;

    fn sample_sensor() -> AssembledSensor {
        AssembledSensor {
            columns: vec!["X".to_string(), "CH_1".to_string(), "MARK".to_string()],
            data: vec![
                vec![Field::Number(431_250.5), Field::Number(431_251.0)],
                vec![Field::Number(120.25), Field::Missing],
                vec![Field::Text("fid".to_string()), Field::Text("fid".to_string())],
            ],
            datetime: vec![None, None],
        }
    }

    fn sample_identities() -> IdentityMap {
        let base = NaiveDate::from_ymd_opt(2024, 5, 14).unwrap();
        let mut primary = vec![0.0; 10];
        primary[4] = 300.0;
        let group = SensorGroup {
            group_index: 0,
            columns: vec!["CH_1".to_string()],
            data: vec![primary.iter().map(|&v| Field::Number(v)).collect()],
            primary,
            origin_rows: (0..10).collect(),
            datetime: (0..10)
                .map(|i| base.and_hms_opt(9, 0, i).map(Some))
                .collect::<Option<Vec<_>>>()
                .unwrap(),
            dropped_rows: 0,
        };
        resolve_identities(&[group], 800, 100.0, &["C".to_string()]).unwrap()
    }

    #[test]
    fn test_xyz_round_trips_through_loader() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("survey.xyz");
        let sensor = sample_sensor();

        write_sensor_xyz(&path, &sensor).unwrap();

        let table = load_survey_table(&path, &sensor.columns).unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(
            table.column("X").unwrap()[0].as_number(),
            Some(431_250.5)
        );
        assert!(table.column("CH_1").unwrap()[1].is_missing());
        assert_eq!(table.column("MARK").unwrap()[0].as_text(), Some("fid"));
    }

    #[test]
    fn test_xyz_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out/deeper/survey.xyz");

        write_sensor_xyz(&path, &sample_sensor()).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_peak_table_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("peaks.csv");

        write_peak_table_csv(&path, &sample_identities()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("SENSOR,GROUPNUM,CH_1,DATETIME"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("C,1,300,"), "row was {row}");
    }

    #[test]
    fn test_xlsx_append_preserves_sheets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("peaks.xlsx");
        let identities = sample_identities();

        append_peak_sheet_xlsx(&path, "0514", &identities).unwrap();
        append_peak_sheet_xlsx(&path, "0515", &identities).unwrap();

        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        assert_eq!(workbook.sheet_names().to_vec(), vec!["0514", "0515"]);
        let range = workbook.worksheet_range("0514").unwrap();
        assert_eq!(range.get_value((0, 0)), Some(&Data::String("SENSOR".to_string())));
        assert_eq!(range.get_value((1, 2)), Some(&Data::Float(300.0)));
    }

    #[test]
    fn test_xlsx_duplicate_sheet_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("peaks.xlsx");
        let identities = sample_identities();

        append_peak_sheet_xlsx(&path, "0514", &identities).unwrap();
        let err = append_peak_sheet_xlsx(&path, "0514", &identities).unwrap_err();

        assert!(matches!(err, WriteError::SheetExists { sheet, .. } if sheet == "0514"));
    }
}
