//! Resolving which physical sensor produced which column group.
//!
//! At the start of a survey each coil is pulled over a calibration target one
//! at a time, in a fixed cart order. Each column group therefore shows exactly
//! one prominent response in the opening window, and ordering those responses
//! by timestamp recovers the firing order. Matching that order against the
//! configured sensor names pins every group to a physical sensor.

use chrono::NaiveDateTime;
use log::debug;
use thiserror::Error;

use super::grouping::SensorGroup;
use super::peaks::{self, PeakError};

/// Errors that can occur during identity resolution.
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("expected {sensors} column groups for {sensors} sensors, found {groups}")]
    GroupCountMismatch { groups: usize, sensors: usize },

    #[error(
        "ambiguous calibration window: groups without a peak {missing:?}, \
         groups with multiple peaks {extra:?} (group, count)"
    )]
    AmbiguousPeaks {
        /// 1-based numbers of groups where no peak was found.
        missing: Vec<usize>,
        /// 1-based group number and peak count for groups with several peaks.
        extra: Vec<(usize, usize)>,
    },

    #[error("pooled {found} calibration peaks for {expected} sensors")]
    PeakCountMismatch { expected: usize, found: usize },

    #[error("group {group} has no timestamp at calibration row {row}")]
    MissingTimestamp { group: usize, row: usize },

    #[error(transparent)]
    Peaks(#[from] PeakError),
}

/// Result type for identity resolution.
pub type Result<T> = std::result::Result<T, IdentityError>;

/// One resolved sensor: its name bound to a column group, with the
/// calibration response that established the binding.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorAssignment {
    pub sensor: String,
    /// 0-based index of the column group this sensor maps to.
    pub group_index: usize,
    /// Primary channel value at the calibration peak.
    pub peak_value: f64,
    /// Timestamp of the calibration peak.
    pub peak_time: NaiveDateTime,
}

/// Complete mapping between sensor names and column groups.
///
/// Assignments are held in firing order (ascending peak time).
#[derive(Debug, Clone)]
pub struct IdentityMap {
    assignments: Vec<SensorAssignment>,
}

impl IdentityMap {
    /// Assignments in firing order.
    pub fn assignments(&self) -> &[SensorAssignment] {
        &self.assignments
    }

    /// Sensor name bound to the given group, if any.
    pub fn sensor_for_group(&self, group_index: usize) -> Option<&str> {
        self.assignments
            .iter()
            .find(|a| a.group_index == group_index)
            .map(|a| a.sensor.as_str())
    }

    /// Group index bound to the given sensor name, if any.
    pub fn group_for_sensor(&self, sensor: &str) -> Option<usize> {
        self.assignments
            .iter()
            .find(|a| a.sensor == sensor)
            .map(|a| a.group_index)
    }
}

/// Resolve sensor identities from calibration responses.
///
/// Runs peak detection on each group's primary channel restricted to the
/// first `window` rows, then pools the single peak of every group, sorts the
/// pool by timestamp, and assigns `sensor_names` positionally: the earliest
/// peak gets the first name. The result does not depend on the order the
/// groups are passed in.
///
/// # Errors
///
/// Resolution is all or nothing. If any group yields zero or several peaks
/// the whole call fails with an error listing every offending group, so a
/// miscounted window cannot silently mislabel the remaining sensors. Peak
/// rows must carry timestamps.
pub fn resolve_identities(
    groups: &[SensorGroup],
    window: usize,
    prominence: f64,
    sensor_names: &[String],
) -> Result<IdentityMap> {
    if groups.len() != sensor_names.len() {
        return Err(IdentityError::GroupCountMismatch {
            groups: groups.len(),
            sensors: sensor_names.len(),
        });
    }

    let mut pooled: Vec<(&SensorGroup, usize)> = Vec::with_capacity(groups.len());
    let mut missing = Vec::new();
    let mut extra = Vec::new();

    for group in groups {
        let channel = group.windowed_primary(window);
        let peaks = if channel.is_empty() {
            Vec::new()
        } else {
            peaks::find_peaks(channel, prominence)?
        };

        match peaks.as_slice() {
            [single] => pooled.push((group, *single)),
            [] => missing.push(group.group_index + 1),
            many => extra.push((group.group_index + 1, many.len())),
        }
    }

    missing.sort_unstable();
    extra.sort_unstable();
    if !missing.is_empty() || !extra.is_empty() {
        return Err(IdentityError::AmbiguousPeaks { missing, extra });
    }
    if pooled.len() != sensor_names.len() {
        return Err(IdentityError::PeakCountMismatch {
            expected: sensor_names.len(),
            found: pooled.len(),
        });
    }

    let mut timed: Vec<(NaiveDateTime, &SensorGroup, usize)> =
        Vec::with_capacity(pooled.len());
    for (group, row) in pooled {
        let time = group.datetime[row].ok_or(IdentityError::MissingTimestamp {
            group: group.group_index + 1,
            row,
        })?;
        timed.push((time, group, row));
    }
    timed.sort_by_key(|(time, group, _)| (*time, group.group_index));
    for (time, group, row) in &timed {
        debug!(
            "Calibration peak: group {} row {} at {}",
            group.group_index + 1,
            row,
            time
        );
    }

    let assignments = sensor_names
        .iter()
        .zip(timed)
        .map(|(sensor, (peak_time, group, row))| SensorAssignment {
            sensor: sensor.clone(),
            group_index: group.group_index,
            peak_value: group.primary[row],
            peak_time,
        })
        .collect();

    Ok(IdentityMap { assignments })
}
