//! Coordinate and signal transforms.
//!
//! Transforms never mutate their input table; each one returns a new table
//! with the derived columns appended, so a failed stage leaves nothing
//! half-rewritten.

use rayon::prelude::*;
use thiserror::Error;

use super::loaders::{Field, RecordTable};

/// Errors that can occur during transforms.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("table needs at least two columns (longitude, latitude), found {0}")]
    TooFewColumns(usize),

    #[error("UTM zone {0} outside 1..=60")]
    InvalidZone(u8),

    #[error("window size must be odd and non-zero, got {0}")]
    InvalidWindow(usize),
}

/// Result type for transform operations.
pub type Result<T> = std::result::Result<T, TransformError>;

/// Project geographic coordinates to UTM and append them as `X`/`Y` columns.
///
/// The table's first column is taken as WGS84 longitude and the second as
/// latitude, matching the GPS log layout. Rows where either coordinate is
/// missing get missing `X`/`Y`.
///
/// # Errors
///
/// Returns an error if the table has fewer than two columns or the zone is
/// not a valid UTM zone.
pub fn with_projected_coords(table: &RecordTable, zone: u8) -> Result<RecordTable> {
    if table.num_columns() < 2 {
        return Err(TransformError::TooFewColumns(table.num_columns()));
    }
    if zone == 0 || zone > 60 {
        return Err(TransformError::InvalidZone(zone));
    }

    let lon = &table.data[0];
    let lat = &table.data[1];

    let projected: Vec<(Field, Field)> = lon
        .par_iter()
        .zip(lat.par_iter())
        .map(|(lon, lat)| match (lon.as_number(), lat.as_number()) {
            (Some(lon), Some(lat)) => {
                let (northing, easting, _) = utm::to_utm_wgs84(lat, lon, zone);
                (Field::Number(easting), Field::Number(northing))
            }
            _ => (Field::Missing, Field::Missing),
        })
        .collect();

    let (x, y): (Vec<Field>, Vec<Field>) = projected.into_iter().unzip();

    let mut out = table.clone();
    out.push_column("X".to_string(), x);
    out.push_column("Y".to_string(), y);
    Ok(out)
}

/// Centered rolling median.
///
/// The window shrinks at the edges and missing samples inside a window are
/// skipped, so every output position with at least one present neighbour
/// gets a value.
///
/// # Errors
///
/// Returns an error if the window size is zero or even.
pub fn rolling_median(values: &[Option<f64>], window: usize) -> Result<Vec<Option<f64>>> {
    if window == 0 || window % 2 == 0 {
        return Err(TransformError::InvalidWindow(window));
    }
    let half = window / 2;
    let n = values.len();

    let out = (0..n)
        .into_par_iter()
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            let mut present: Vec<f64> = values[lo..hi].iter().filter_map(|v| *v).collect();
            if present.is_empty() {
                return None;
            }
            present.sort_by(|a, b| a.total_cmp(b));
            let mid = present.len() / 2;
            if present.len() % 2 == 1 {
                Some(present[mid])
            } else {
                Some((present[mid - 1] + present[mid]) / 2.0)
            }
        })
        .collect();

    Ok(out)
}

/// Subtract the rolling median from a channel, removing slow background
/// drift while leaving short anomalies intact.
pub fn demedian(values: &[Option<f64>], window: usize) -> Result<Vec<Option<f64>>> {
    let medians = rolling_median(values, window)?;
    Ok(values
        .iter()
        .zip(medians)
        .map(|(v, m)| match (v, m) {
            (Some(v), Some(m)) => Some(v - m),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord_table(coords: &[(f64, f64)]) -> RecordTable {
        let mut t = RecordTable::new(vec!["LON".to_string(), "LAT".to_string()]);
        t.data = vec![
            coords.iter().map(|&(lon, _)| Field::Number(lon)).collect(),
            coords.iter().map(|&(_, lat)| Field::Number(lat)).collect(),
        ];
        t.datetime = vec![None; coords.len()];
        t
    }

    #[test]
    fn test_projection_appends_xy() {
        // Longitude -111 is the central meridian of zone 12, so easting must
        // land on the 500 km false easting.
        let t = coord_table(&[(-111.0, 40.0)]);

        let out = with_projected_coords(&t, 12).unwrap();

        assert_eq!(out.columns.last().map(String::as_str), Some("Y"));
        let x = out.column("X").unwrap()[0].as_number().unwrap();
        let y = out.column("Y").unwrap()[0].as_number().unwrap();
        assert!((x - 500_000.0).abs() < 1.0, "easting {x}");
        assert!((4_420_000.0..4_435_000.0).contains(&y), "northing {y}");
        // Input untouched.
        assert_eq!(t.num_columns(), 2);
    }

    #[test]
    fn test_projection_propagates_missing() {
        let mut t = coord_table(&[(-111.0, 40.0), (-111.0, 40.0)]);
        t.data[1][1] = Field::Missing;

        let out = with_projected_coords(&t, 12).unwrap();

        assert!(out.column("X").unwrap()[1].is_missing());
        assert!(out.column("Y").unwrap()[1].is_missing());
        assert!(!out.column("X").unwrap()[0].is_missing());
    }

    #[test]
    fn test_projection_rejects_bad_zone() {
        let t = coord_table(&[(-111.0, 40.0)]);
        assert!(matches!(
            with_projected_coords(&t, 61).unwrap_err(),
            TransformError::InvalidZone(61)
        ));
    }

    #[test]
    fn test_rolling_median_shrinks_at_edges() {
        let values: Vec<Option<f64>> = vec![Some(1.0), Some(2.0), Some(9.0), Some(4.0), Some(5.0)];

        let medians = rolling_median(&values, 3).unwrap();

        // First window is [1, 2], median 1.5; middle windows are full.
        assert_eq!(medians[0], Some(1.5));
        assert_eq!(medians[1], Some(2.0));
        assert_eq!(medians[2], Some(4.0));
        assert_eq!(medians[4], Some(4.5));
    }

    #[test]
    fn test_rolling_median_skips_missing() {
        let values = vec![Some(1.0), None, Some(3.0)];
        let medians = rolling_median(&values, 3).unwrap();
        assert_eq!(medians[1], Some(2.0));
    }

    #[test]
    fn test_demedian_removes_baseline() {
        // Constant baseline with one spike: after demedian the baseline is
        // zero and the spike keeps its height.
        let mut values: Vec<Option<f64>> = vec![Some(40.0); 21];
        values[10] = Some(240.0);

        let out = demedian(&values, 7).unwrap();

        assert_eq!(out[0], Some(0.0));
        assert_eq!(out[10], Some(200.0));
        assert_eq!(out[20], Some(0.0));
    }

    #[test]
    fn test_even_window_rejected() {
        assert!(matches!(
            rolling_median(&[Some(1.0)], 4).unwrap_err(),
            TransformError::InvalidWindow(4)
        ));
    }
}
