//! Loaders for whitespace-delimited EM61 instrument files.
//!
//! This module provides parsers for:
//! - Multi-coil survey logs (fixed wide schema, interleaved sensor groups)
//! - Five-coil-system IVS files (column names taken from the file header)
//! - Standard EM61 IVS files (fixed 8-column layout)
//!
//! All loaders produce a [`RecordTable`] in document order. Row order is
//! significant: it encodes the acquisition sequence and downstream positional
//! joins rely on it.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

/// Timestamp layout of the instrument DATE + TIME columns.
pub const DATETIME_FORMAT: &str = "%m/%d/%y %H:%M:%S%.f";

/// Timestamp layout of TIME-only files.
const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing header line in {0}")]
    MissingHeader(PathBuf),

    #[error("{path}: row {row} has {found} fields, schema expects at most {expected}")]
    ColumnCountMismatch {
        path: PathBuf,
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Unknown column: {0}")]
    UnknownColumn(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// A single cell of a record table.
///
/// Instrument files mark absent readings with `*` (or leave trailing fields
/// off short rows); those become [`Field::Missing`], never zero.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Number(f64),
    Text(String),
    Missing,
}

impl Field {
    /// Parse one whitespace-delimited token.
    pub fn parse(token: &str) -> Field {
        if token.is_empty() || token == "*" || token.eq_ignore_ascii_case("nan") {
            return Field::Missing;
        }
        match token.parse::<f64>() {
            Ok(v) if v.is_nan() => Field::Missing,
            Ok(v) => Field::Number(v),
            Err(_) => Field::Text(token.to_string()),
        }
    }

    /// Numeric value, if this field holds one.
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Field::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Text value, if this field holds one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Field::Text(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn is_missing(&self) -> bool {
        matches!(self, Field::Missing)
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Number(v) => write!(f, "{}", v),
            Field::Text(s) => write!(f, "{}", s),
            Field::Missing => write!(f, "*"),
        }
    }
}

/// Column-major table of instrument records.
///
/// Each row keeps its document-order position; the parsed timestamp lane
/// (built from DATE + TIME where present) is aligned with the rows.
#[derive(Debug, Clone)]
pub struct RecordTable {
    /// Column names in schema order.
    pub columns: Vec<String>,
    /// Cell data, column-major: `data[col][row]`.
    pub data: Vec<Vec<Field>>,
    /// Parsed per-row timestamps, `None` where DATE/TIME were absent or bad.
    pub datetime: Vec<Option<NaiveDateTime>>,
}

impl RecordTable {
    /// Creates an empty table with the given column names.
    pub fn new(columns: Vec<String>) -> Self {
        let data = columns.iter().map(|_| Vec::new()).collect();
        Self {
            columns,
            data,
            datetime: Vec::new(),
        }
    }

    /// Returns the number of rows.
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.data.first().map_or(0, |col| col.len())
    }

    /// Returns the number of columns.
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cell data of a named column.
    pub fn column(&self, name: &str) -> Result<&[Field]> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| LoaderError::UnknownColumn(name.to_string()))?;
        Ok(&self.data[idx])
    }

    /// Numeric view of a named column, `None` for non-numeric cells.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<Option<f64>>> {
        Ok(self.column(name)?.iter().map(Field::as_number).collect())
    }

    /// Appends a column; its length must match the current row count.
    pub fn push_column(&mut self, name: String, values: Vec<Field>) {
        debug_assert_eq!(values.len(), self.num_rows());
        self.columns.push(name);
        self.data.push(values);
    }

    /// Appends a parsed row of fields (padding with `Missing` is the
    /// caller's job; lengths must match the column count).
    fn push_row(&mut self, fields: Vec<Field>) {
        debug_assert_eq!(fields.len(), self.columns.len());
        for (col, field) in self.data.iter_mut().zip(fields) {
            col.push(field);
        }
    }

    /// Survey date string taken from the first data row's DATE column with
    /// the slashes removed, e.g. `"01/31/24"` becomes `"013124"`. Used to
    /// prefix export file names.
    pub fn survey_date(&self) -> Option<String> {
        let date = self.column("DATE").ok()?;
        date.iter()
            .find_map(|f| f.as_text())
            .map(|s| s.replace('/', ""))
    }

    /// Builds the timestamp lane from DATE + TIME columns (or TIME alone,
    /// in which case rows get a fixed epoch date so ordering still works).
    fn attach_datetime(&mut self) {
        let time_idx = self.column_index("TIME");
        let date_idx = self.column_index("DATE");
        let rows = self.num_rows();

        self.datetime = match (date_idx, time_idx) {
            (Some(d), Some(t)) => (0..rows)
                .map(|row| {
                    let date = self.data[d][row].as_text()?;
                    let time = self.data[t][row].as_text()?;
                    NaiveDateTime::parse_from_str(&format!("{} {}", date, time), DATETIME_FORMAT)
                        .ok()
                })
                .collect(),
            (None, Some(t)) => {
                let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
                (0..rows)
                    .map(|row| {
                        let time = self.data[t][row].as_text()?;
                        NaiveTime::parse_from_str(time, TIME_FORMAT)
                            .ok()
                            .map(|time| epoch.and_time(time))
                    })
                    .collect()
            }
            _ => vec![None; rows],
        };
    }
}

/// Load a multi-coil survey log with an explicit column schema.
///
/// The first line of the file is an instrument banner and is skipped. Data
/// rows are whitespace-delimited; rows shorter than the schema are padded
/// with missing values (the interleaved groups leave trailing blocks off),
/// rows longer than the schema are a schema mismatch.
///
/// # Arguments
///
/// * `path` - Path to the `.xyz` survey file
/// * `colnames` - Full ordered column list (see
///   [`PipelineConfig::survey_column_names`](crate::config::PipelineConfig::survey_column_names))
///
/// # Errors
///
/// Returns an error if the file cannot be read, contains no data rows, or a
/// row has more fields than the schema allows.
pub fn load_survey_table<P: AsRef<Path>>(path: P, colnames: &[String]) -> Result<RecordTable> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();

    // Skip the instrument banner line.
    if lines.next().is_none() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    let mut table = RecordTable::new(colnames.to_vec());
    read_rows(path, lines, &mut table, 1)?;

    if table.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    table.attach_datetime();
    Ok(table)
}

/// Load a five-coil-system IVS file whose column names come from its header.
///
/// The first line holds the column names; a leading `/` (instrument comment
/// marker) is stripped before splitting.
///
/// # Errors
///
/// Returns an error if the file cannot be read, has no header line, or
/// contains no data rows.
pub fn load_ivs_table<P: AsRef<Path>>(path: P) -> Result<RecordTable> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();

    let header = lines
        .next()
        .ok_or_else(|| LoaderError::MissingHeader(path.to_path_buf()))??;
    let header = header.trim().trim_start_matches('/');
    let colnames: Vec<String> = header.split_whitespace().map(str::to_string).collect();
    if colnames.is_empty() {
        return Err(LoaderError::MissingHeader(path.to_path_buf()));
    }

    let mut table = RecordTable::new(colnames);
    read_rows(path, lines, &mut table, 1)?;

    if table.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    table.attach_datetime();
    Ok(table)
}

/// Column layout of a standard EM61 IVS export.
pub fn standard_ivs_columns() -> Vec<String> {
    [
        "EAST",
        "NORTH",
        "STD-4-1",
        "STD-4-2",
        "STD-4-3",
        "STD-4-4",
        "GPS_CORRECTION",
        "TIME",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Load a standard EM61 IVS file (fixed 8 columns, two banner lines).
///
/// These files carry TIME only; timestamps are given a fixed epoch date so
/// ordering and plotting still work.
pub fn load_standard_ivs_table<P: AsRef<Path>>(path: P) -> Result<RecordTable> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();

    // Two banner lines precede the data.
    for _ in 0..2 {
        if lines.next().is_none() {
            return Err(LoaderError::EmptyFile(path.to_path_buf()));
        }
    }

    let mut table = RecordTable::new(standard_ivs_columns());
    read_rows(path, lines, &mut table, 2)?;

    if table.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    table.attach_datetime();
    Ok(table)
}

/// Tokenize and append the remaining lines to `table`.
fn read_rows<B: BufRead>(
    path: &Path,
    lines: std::io::Lines<B>,
    table: &mut RecordTable,
    skipped: usize,
) -> Result<()> {
    let expected = table.num_columns();

    for (i, line) in lines.enumerate() {
        let line = line?;
        let tokens: Vec<&str> = line.split_whitespace().collect();

        if tokens.is_empty() {
            continue;
        }
        if tokens.len() > expected {
            return Err(LoaderError::ColumnCountMismatch {
                path: path.to_path_buf(),
                row: skipped + i + 1,
                expected,
                found: tokens.len(),
            });
        }

        let mut fields: Vec<Field> = tokens.iter().map(|t| Field::parse(t)).collect();
        // Short rows leave trailing group blocks off; pad them as missing.
        fields.resize(expected, Field::Missing);
        table.push_row(fields);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_field_parse() {
        assert_eq!(Field::parse("1.5"), Field::Number(1.5));
        assert_eq!(Field::parse("-20"), Field::Number(-20.0));
        assert_eq!(Field::parse("*"), Field::Missing);
        assert_eq!(Field::parse("NaN"), Field::Missing);
        assert_eq!(Field::parse("01/31/24"), Field::Text("01/31/24".to_string()));
    }

    #[test]
    fn test_load_survey_table_pads_short_rows() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "/ EM61 banner").unwrap();
        writeln!(file, "1.0 2.0 3.0").unwrap();
        writeln!(file, "4.0 5.0").unwrap();
        file.flush().unwrap();

        let cols = names(&["A", "B", "C"]);
        let table = load_survey_table(file.path(), &cols).unwrap();

        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.column("C").unwrap()[0], Field::Number(3.0));
        assert!(table.column("C").unwrap()[1].is_missing());
    }

    #[test]
    fn test_load_survey_table_rejects_wide_rows() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "banner").unwrap();
        writeln!(file, "1 2 3 4").unwrap();
        file.flush().unwrap();

        let cols = names(&["A", "B"]);
        let result = load_survey_table(file.path(), &cols);

        match result {
            Err(LoaderError::ColumnCountMismatch {
                expected, found, ..
            }) => {
                assert_eq!(expected, 2);
                assert_eq!(found, 4);
            }
            other => panic!("expected ColumnCountMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_datetime_lane_from_date_and_time() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "banner").unwrap();
        writeln!(file, "10.5 09:15:02.250 01/31/24").unwrap();
        writeln!(file, "11.0 09:15:03 01/31/24").unwrap();
        file.flush().unwrap();

        let cols = names(&["CH_1", "TIME", "DATE"]);
        let table = load_survey_table(file.path(), &cols).unwrap();

        let first = table.datetime[0].unwrap();
        assert_eq!(first.format("%m/%d/%y %H:%M:%S%.3f").to_string(),
                   "01/31/24 09:15:02.250");
        // Fractional seconds are optional.
        assert!(table.datetime[1].is_some());
    }

    #[test]
    fn test_survey_date() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "banner").unwrap();
        writeln!(file, "1.0 09:15:02.0 01/31/24").unwrap();
        file.flush().unwrap();

        let cols = names(&["CH_1", "TIME", "DATE"]);
        let table = load_survey_table(file.path(), &cols).unwrap();

        assert_eq!(table.survey_date().as_deref(), Some("013124"));
    }

    #[test]
    fn test_load_ivs_table_header_slash() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "/CH_1 CH_2 TIME DATE").unwrap();
        writeln!(file, "100.0 5.0 09:00:00.0 01/31/24").unwrap();
        file.flush().unwrap();

        let table = load_ivs_table(file.path()).unwrap();

        assert_eq!(table.columns, names(&["CH_1", "CH_2", "TIME", "DATE"]));
        assert_eq!(table.num_rows(), 1);
        assert!(table.datetime[0].is_some());
    }

    #[test]
    fn test_load_standard_ivs_table() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "banner one").unwrap();
        writeln!(file, "banner two").unwrap();
        writeln!(file, "-111.9 40.7 1 120.5 3 4 0 09:00:00.50").unwrap();
        file.flush().unwrap();

        let table = load_standard_ivs_table(file.path()).unwrap();

        assert_eq!(table.num_columns(), 8);
        assert_eq!(
            table.column("STD-4-2").unwrap()[0],
            Field::Number(120.5)
        );
        // TIME-only timestamps land on the epoch date.
        let dt = table.datetime[0].unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S%.2f").to_string(),
                   "1970-01-01 09:00:00.50");
    }

    #[test]
    fn test_empty_file_errors() {
        let file = NamedTempFile::new().unwrap();
        let cols = names(&["A"]);
        assert!(matches!(
            load_survey_table(file.path(), &cols),
            Err(LoaderError::EmptyFile(_))
        ));
    }

    #[test]
    fn test_missing_readings_stay_missing() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "banner").unwrap();
        writeln!(file, "1.0 * 3.0").unwrap();
        file.flush().unwrap();

        let cols = names(&["A", "B", "C"]);
        let table = load_survey_table(file.path(), &cols).unwrap();

        let b = table.numeric_column("B").unwrap();
        assert_eq!(b, vec![None]);
    }
}
