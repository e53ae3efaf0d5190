//! Configuration types for the EM61 pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for peak detection and sensor identity resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Physical sensor names in their IVS firing order.
    #[serde(default = "default_sensor_names")]
    pub sensor_names: Vec<String>,

    /// Number of leading rows searched for the IVS calibration peak.
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Minimum topographic prominence for a peak to count.
    #[serde(default = "default_prominence")]
    pub prominence: f64,

    /// Rolling median window for IVS channel smoothing (odd, centered).
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,
}

fn default_sensor_names() -> Vec<String> {
    ["L1", "L2", "C", "R1", "R2"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_window_size() -> usize {
    800
}

fn default_prominence() -> f64 {
    100.0
}

fn default_smoothing_window() -> usize {
    301
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            sensor_names: default_sensor_names(),
            window_size: default_window_size(),
            prominence: default_prominence(),
            smoothing_window: default_smoothing_window(),
        }
    }
}

/// Column layout of the wide multiplexed survey record.
///
/// The full column list is derived, not stored: coil X/Y pairs per sensor,
/// the fixed positional columns, one structurally identical column block per
/// group (duplicates suffixed `.1`, `.2`, ... like the instrument export),
/// then the shared trailing columns and the raw TIME/DATE pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Measurement channels repeated in every group; the first is the
    /// primary channel used for peak detection.
    #[serde(default = "default_channel_columns")]
    pub channel_columns: Vec<String>,

    /// Instrument readings repeated in every group.
    #[serde(default = "default_reading_columns")]
    pub reading_columns: Vec<String>,

    /// Positional/quality columns appearing once, after the coil pairs.
    #[serde(default = "default_position_columns")]
    pub position_columns: Vec<String>,

    /// Trailing columns shared by every group.
    #[serde(default = "default_shared_columns")]
    pub shared_columns: Vec<String>,
}

fn default_channel_columns() -> Vec<String> {
    ["CH_1", "CH_2", "CH_3", "CH_4"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_reading_columns() -> Vec<String> {
    ["EM61_CURRENT", "EM61_VOLT", "EM61_DELAY"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_position_columns() -> Vec<String> {
    ["QUAL_IND", "DOP", "HEIGHT"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_shared_columns() -> Vec<String> {
    ["LINE", "MARK"].iter().map(|s| s.to_string()).collect()
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            channel_columns: default_channel_columns(),
            reading_columns: default_reading_columns(),
            position_columns: default_position_columns(),
            shared_columns: default_shared_columns(),
        }
    }
}

impl SchemaConfig {
    /// Name of the primary channel used for peak detection and NaN filtering.
    pub fn primary_channel(&self) -> &str {
        self.channel_columns
            .first()
            .map(String::as_str)
            .unwrap_or("CH_1")
    }
}

/// Configuration for the coordinate reprojection step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    /// UTM zone the WGS84 coordinates are projected into.
    #[serde(default = "default_utm_zone")]
    pub utm_zone: u8,
}

fn default_utm_zone() -> u8 {
    12
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            utm_zone: default_utm_zone(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub schema: SchemaConfig,

    #[serde(default)]
    pub transform: TransformConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Coil position column pair for a sensor, e.g. `("C_coil_X", "C_coil_Y")`.
    pub fn coil_columns(&self, sensor: &str) -> (String, String) {
        (format!("{}_coil_X", sensor), format!("{}_coil_Y", sensor))
    }

    /// Full ordered column list of the wide multiplexed survey record.
    ///
    /// Matches the instrument export layout: coil X/Y per sensor, positional
    /// columns, one channel/reading block per group with `.N` duplicate
    /// suffixes, shared columns, then TIME and DATE.
    pub fn survey_column_names(&self) -> Vec<String> {
        let num_groups = self.detection.sensor_names.len();
        let block_len = self.schema.channel_columns.len() + self.schema.reading_columns.len();
        let mut names = Vec::with_capacity(
            2 * num_groups
                + self.schema.position_columns.len()
                + num_groups * block_len
                + self.schema.shared_columns.len()
                + 2,
        );

        for sensor in &self.detection.sensor_names {
            let (x, y) = self.coil_columns(sensor);
            names.push(x);
            names.push(y);
        }

        names.extend(self.schema.position_columns.iter().cloned());

        for group in 0..num_groups {
            for base in self
                .schema
                .channel_columns
                .iter()
                .chain(self.schema.reading_columns.iter())
            {
                names.push(suffixed(base, group));
            }
        }

        names.extend(self.schema.shared_columns.iter().cloned());
        names.push("TIME".to_string());
        names.push("DATE".to_string());

        names
    }
}

/// Duplicate-column name for group `group` (0-based): `CH_1`, `CH_1.1`, ...
pub(crate) fn suffixed(base: &str, group: usize) -> String {
    if group == 0 {
        base.to_string()
    } else {
        format!("{}.{}", base, group)
    }
}
