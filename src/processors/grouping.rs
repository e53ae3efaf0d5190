//! Splitting the wide multiplexed record into per-sensor column groups.
//!
//! The survey log interleaves five structurally identical column blocks, one
//! per coil, distinguished only by duplicate-name suffixes (`CH_1`,
//! `CH_1.1`, ...). Splitting extracts each block under a canonical schema so
//! every downstream stage treats the groups uniformly, drops the rows where
//! the block's primary channel holds no reading, and records each retained
//! row's position in the source table for the positional join later.

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::config::{suffixed, PipelineConfig};
use crate::core::loaders::{Field, RecordTable};

/// Errors that can occur during group splitting.
#[derive(Error, Debug)]
pub enum GroupError {
    #[error("group {} is missing required columns: {}", .group, .columns.join(", "))]
    MissingColumns { group: usize, columns: Vec<String> },
}

/// Result type for group operations.
pub type Result<T> = std::result::Result<T, GroupError>;

/// Column schema of one sensor group: source names in the wide table paired
/// with their canonical cross-group names. The primary channel comes first.
#[derive(Debug, Clone)]
pub struct GroupSchema {
    /// `(source, canonical)` column name pairs.
    pub columns: Vec<(String, String)>,
}

impl GroupSchema {
    /// Source name of the group's primary channel.
    pub fn primary_source(&self) -> &str {
        &self.columns[0].0
    }

    /// Build the schemas for every group of the configured survey layout.
    ///
    /// Group `g` takes the channel and reading columns with duplicate suffix
    /// `.g` plus the shared trailing columns, renamed back to their base
    /// names.
    pub fn for_survey(config: &PipelineConfig) -> Vec<GroupSchema> {
        let num_groups = config.detection.sensor_names.len();

        (0..num_groups)
            .map(|group| {
                let mut columns = Vec::new();
                for base in config
                    .schema
                    .channel_columns
                    .iter()
                    .chain(config.schema.reading_columns.iter())
                {
                    columns.push((suffixed(base, group), base.clone()));
                }
                for shared in &config.schema.shared_columns {
                    columns.push((shared.clone(), shared.clone()));
                }
                GroupSchema { columns }
            })
            .collect()
    }
}

/// One physical sensor's readings extracted from the wide record.
#[derive(Debug, Clone)]
pub struct SensorGroup {
    /// 0-based position of this group in the schema list.
    pub group_index: usize,
    /// Canonical column names.
    pub columns: Vec<String>,
    /// Cell data, column-major, retained rows only.
    pub data: Vec<Vec<Field>>,
    /// Primary channel values per retained row (guaranteed numeric).
    pub primary: Vec<f64>,
    /// For each retained row, its row index in the source table.
    pub origin_rows: Vec<usize>,
    /// Timestamps aligned with the retained rows.
    pub datetime: Vec<Option<NaiveDateTime>>,
    /// Rows dropped because the primary channel held no reading.
    pub dropped_rows: usize,
}

impl SensorGroup {
    /// Number of retained rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.origin_rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.origin_rows.is_empty()
    }

    /// Primary channel restricted to the first `window` rows.
    pub fn windowed_primary(&self, window: usize) -> &[f64] {
        &self.primary[..window.min(self.primary.len())]
    }

    /// Timestamps restricted to the first `window` rows.
    pub fn windowed_datetime(&self, window: usize) -> &[Option<NaiveDateTime>] {
        &self.datetime[..window.min(self.datetime.len())]
    }
}

/// Partition a record table into per-sensor groups.
///
/// For each schema the named source columns are extracted in original row
/// order and renamed canonically. Rows whose primary channel is missing are
/// dropped per group (groups end up independently sized); the surviving
/// rows keep their source-table indices in `origin_rows`, which is what the
/// assembler's positional join runs on.
///
/// # Errors
///
/// Returns a schema mismatch error naming the absent columns if any group
/// schema references columns the table does not have. Group numbers in the
/// error are 1-based to match the instrument documentation.
pub fn split_groups(table: &RecordTable, schemas: &[GroupSchema]) -> Result<Vec<SensorGroup>> {
    let mut groups = Vec::with_capacity(schemas.len());

    for (group_index, schema) in schemas.iter().enumerate() {
        let mut indices = Vec::with_capacity(schema.columns.len());
        let mut absent = Vec::new();

        for (source, _) in &schema.columns {
            match table.column_index(source) {
                Some(idx) => indices.push(idx),
                None => absent.push(source.clone()),
            }
        }

        if !absent.is_empty() {
            return Err(GroupError::MissingColumns {
                group: group_index + 1,
                columns: absent,
            });
        }

        let primary_idx = indices[0];
        let num_rows = table.num_rows();

        let mut data: Vec<Vec<Field>> = schema.columns.iter().map(|_| Vec::new()).collect();
        let mut primary = Vec::new();
        let mut origin_rows = Vec::new();
        let mut datetime = Vec::new();

        for row in 0..num_rows {
            let value = match table.data[primary_idx][row].as_number() {
                Some(v) => v,
                None => continue,
            };

            for (col, &src_idx) in data.iter_mut().zip(indices.iter()) {
                col.push(table.data[src_idx][row].clone());
            }
            primary.push(value);
            origin_rows.push(row);
            datetime.push(table.datetime.get(row).copied().flatten());
        }

        let retained = origin_rows.len();
        groups.push(SensorGroup {
            group_index,
            columns: schema.columns.iter().map(|(_, c)| c.clone()).collect(),
            data,
            primary,
            origin_rows,
            datetime,
            dropped_rows: num_rows - retained,
        });
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(cols: &[(&str, &str)]) -> GroupSchema {
        GroupSchema {
            columns: cols
                .iter()
                .map(|(s, c)| (s.to_string(), c.to_string()))
                .collect(),
        }
    }

    fn table(columns: &[(&str, Vec<Field>)]) -> RecordTable {
        let mut t = RecordTable::new(columns.iter().map(|(n, _)| n.to_string()).collect());
        t.data = columns.iter().map(|(_, v)| v.clone()).collect();
        t.datetime = vec![None; t.num_rows()];
        t
    }

    fn num(v: f64) -> Field {
        Field::Number(v)
    }

    #[test]
    fn test_split_renames_and_filters() {
        let t = table(&[
            (
                "CH_1",
                vec![num(1.0), Field::Missing, num(3.0), num(4.0)],
            ),
            ("CH_2", vec![num(10.0), num(20.0), num(30.0), num(40.0)]),
            (
                "CH_1.1",
                vec![Field::Missing, num(2.5), Field::Missing, num(4.5)],
            ),
            ("CH_2.1", vec![num(11.0), num(21.0), num(31.0), num(41.0)]),
        ]);

        let schemas = vec![
            schema(&[("CH_1", "CH_1"), ("CH_2", "CH_2")]),
            schema(&[("CH_1.1", "CH_1"), ("CH_2.1", "CH_2")]),
        ];

        let groups = split_groups(&t, &schemas).unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].columns, vec!["CH_1", "CH_2"]);
        assert_eq!(groups[1].columns, vec!["CH_1", "CH_2"]);

        assert_eq!(groups[0].primary, vec![1.0, 3.0, 4.0]);
        assert_eq!(groups[0].origin_rows, vec![0, 2, 3]);
        assert_eq!(groups[0].dropped_rows, 1);

        assert_eq!(groups[1].primary, vec![2.5, 4.5]);
        assert_eq!(groups[1].origin_rows, vec![1, 3]);
        assert_eq!(groups[1].data[1], vec![num(21.0), num(41.0)]);
    }

    #[test]
    fn test_split_row_count_invariant() {
        // dropped + retained == rows(source) for every group.
        let t = table(&[
            ("CH_1", vec![num(1.0), Field::Missing, num(3.0)]),
            ("CH_1.1", vec![Field::Missing, Field::Missing, num(9.0)]),
        ]);

        let schemas = vec![
            schema(&[("CH_1", "CH_1")]),
            schema(&[("CH_1.1", "CH_1")]),
        ];

        let groups = split_groups(&t, &schemas).unwrap();
        let rows = t.num_rows();

        for group in &groups {
            assert_eq!(group.len() + group.dropped_rows, rows);
        }
        let total: usize = groups.iter().map(|g| g.len() + g.dropped_rows).sum();
        assert_eq!(total, rows * schemas.len());
    }

    #[test]
    fn test_missing_columns_named() {
        let t = table(&[("CH_1", vec![num(1.0)])]);
        let schemas = vec![schema(&[
            ("CH_1", "CH_1"),
            ("CH_2", "CH_2"),
            ("EM61_VOLT", "EM61_VOLT"),
        ])];

        let err = split_groups(&t, &schemas).unwrap_err();
        let GroupError::MissingColumns { group, columns } = err;

        assert_eq!(group, 1);
        assert_eq!(columns, vec!["CH_2", "EM61_VOLT"]);
    }

    #[test]
    fn test_for_survey_schemas() {
        let config = PipelineConfig::default();
        let schemas = GroupSchema::for_survey(&config);

        assert_eq!(schemas.len(), 5);
        assert_eq!(schemas[0].primary_source(), "CH_1");
        assert_eq!(schemas[2].primary_source(), "CH_1.2");

        // Every group renames to the same canonical layout.
        let canonical: Vec<&String> = schemas[0].columns.iter().map(|(_, c)| c).collect();
        for s in &schemas[1..] {
            let c: Vec<&String> = s.columns.iter().map(|(_, c)| c).collect();
            assert_eq!(c, canonical);
        }
        assert_eq!(
            schemas[4].columns[6].0, "EM61_DELAY.4",
            "readings carry the group suffix"
        );
        assert_eq!(schemas[4].columns[7].0, "LINE", "shared columns do not");
    }

    #[test]
    fn test_empty_group_allowed() {
        let t = table(&[("CH_1", vec![Field::Missing, Field::Missing])]);
        let schemas = vec![schema(&[("CH_1", "CH_1")])];

        let groups = split_groups(&t, &schemas).unwrap();

        assert!(groups[0].is_empty());
        assert_eq!(groups[0].dropped_rows, 2);
    }
}
