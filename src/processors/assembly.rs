//! Reattaching shared survey columns to a resolved sensor group.
//!
//! Coil coordinates, time, and date live once in the wide table while the
//! channel readings were split per group with rows dropped independently.
//! Assembly joins the two back together through the origin row indices the
//! splitter recorded, never by row position in the shrunken group.

use chrono::NaiveDateTime;
use thiserror::Error;

use super::grouping::SensorGroup;
use crate::core::loaders::{Field, RecordTable};

/// Errors that can occur during sensor assembly.
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("source table has no column named '{column}'")]
    MissingColumn { column: String },

    #[error("origin row {row} outside source table of {rows} rows")]
    OriginOutOfRange { row: usize, rows: usize },
}

/// Result type for assembly operations.
pub type Result<T> = std::result::Result<T, AssemblyError>;

/// Export-ready table for one physical sensor.
#[derive(Debug, Clone)]
pub struct AssembledSensor {
    /// Column names, auxiliary and group columns interleaved in export order.
    pub columns: Vec<String>,
    /// Cell data, column-major, one entry per retained group row.
    pub data: Vec<Vec<Field>>,
    /// Timestamps aligned with the rows.
    pub datetime: Vec<Option<NaiveDateTime>>,
}

impl AssembledSensor {
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }
}

/// Join a sensor group back with auxiliary columns from the source table.
///
/// `leading_aux` columns (typically the sensor's coil coordinates) come
/// first, then the group's own columns, then `trailing_aux` (typically TIME
/// and DATE). Auxiliary cells are taken at the group's origin rows, so each
/// reading ends up next to the position and time recorded on its own source
/// row.
///
/// # Errors
///
/// Returns an error if an auxiliary column does not exist in the source
/// table, or if an origin row index falls outside it (the group was split
/// from a different table).
pub fn assemble_sensor(
    group: &SensorGroup,
    source: &RecordTable,
    leading_aux: &[String],
    trailing_aux: &[String],
) -> Result<AssembledSensor> {
    let num_rows = source.num_rows();
    if let Some(&row) = group.origin_rows.iter().find(|&&r| r >= num_rows) {
        return Err(AssemblyError::OriginOutOfRange { row, rows: num_rows });
    }

    let gather = |name: &String| -> Result<Vec<Field>> {
        let idx = source
            .column_index(name)
            .ok_or_else(|| AssemblyError::MissingColumn {
                column: name.clone(),
            })?;
        Ok(group
            .origin_rows
            .iter()
            .map(|&row| source.data[idx][row].clone())
            .collect())
    };

    let mut columns = Vec::new();
    let mut data = Vec::new();

    for name in leading_aux {
        columns.push(name.clone());
        data.push(gather(name)?);
    }
    for (name, cells) in group.columns.iter().zip(group.data.iter()) {
        columns.push(name.clone());
        data.push(cells.clone());
    }
    for name in trailing_aux {
        columns.push(name.clone());
        data.push(gather(name)?);
    }

    Ok(AssembledSensor {
        columns,
        data,
        datetime: group.datetime.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: f64) -> Field {
        Field::Number(v)
    }

    fn source() -> RecordTable {
        let mut t = RecordTable::new(vec![
            "C_coil_X".to_string(),
            "C_coil_Y".to_string(),
            "CH_1.2".to_string(),
            "TIME".to_string(),
        ]);
        t.data = vec![
            vec![num(100.0), num(101.0), num(102.0), num(103.0)],
            vec![num(200.0), num(201.0), num(202.0), num(203.0)],
            vec![num(1.0), Field::Missing, num(3.0), num(4.0)],
            (0..4)
                .map(|i| Field::Text(format!("09:00:0{i}")))
                .collect(),
        ];
        t.datetime = vec![None; 4];
        t
    }

    fn group() -> SensorGroup {
        // Rows 1 already dropped: retained origin rows are 0, 2, 3.
        SensorGroup {
            group_index: 2,
            columns: vec!["CH_1".to_string()],
            data: vec![vec![num(1.0), num(3.0), num(4.0)]],
            primary: vec![1.0, 3.0, 4.0],
            origin_rows: vec![0, 2, 3],
            datetime: vec![None; 3],
            dropped_rows: 1,
        }
    }

    #[test]
    fn test_join_uses_origin_rows() {
        // With rows dropped at irregular positions, each auxiliary value must
        // come from the reading's own source row, not its position in the
        // shrunken group.
        let assembled = assemble_sensor(
            &group(),
            &source(),
            &["C_coil_X".to_string(), "C_coil_Y".to_string()],
            &["TIME".to_string()],
        )
        .unwrap();

        assert_eq!(
            assembled.columns,
            vec!["C_coil_X", "C_coil_Y", "CH_1", "TIME"]
        );
        assert_eq!(assembled.data[0], vec![num(100.0), num(102.0), num(103.0)]);
        assert_eq!(assembled.data[1], vec![num(200.0), num(202.0), num(203.0)]);
        assert_eq!(assembled.data[2], vec![num(1.0), num(3.0), num(4.0)]);
        assert_eq!(
            assembled.data[3],
            vec![
                Field::Text("09:00:00".to_string()),
                Field::Text("09:00:02".to_string()),
                Field::Text("09:00:03".to_string()),
            ]
        );
        assert_eq!(assembled.num_rows(), 3);
    }

    #[test]
    fn test_missing_aux_column() {
        let err = assemble_sensor(&group(), &source(), &["R9_coil_X".to_string()], &[])
            .unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::MissingColumn { column } if column == "R9_coil_X"
        ));
    }

    #[test]
    fn test_origin_out_of_range() {
        let mut g = group();
        g.origin_rows = vec![0, 2, 17];

        let err = assemble_sensor(&g, &source(), &[], &[]).unwrap_err();

        assert!(matches!(
            err,
            AssemblyError::OriginOutOfRange { row: 17, rows: 4 }
        ));
    }
}
