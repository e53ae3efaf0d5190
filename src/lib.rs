//! EM61 electromagnetic survey log processing pipeline.
//!
//! This crate provides tools for:
//! - Loading whitespace-delimited EM61 instrument files (multi-coil survey
//!   logs and single-sensor IVS files)
//! - Prominence-based signal peak detection per channel
//! - Splitting interleaved five-coil records into per-sensor groups and
//!   recovering sensor identities from the timing order of IVS peaks
//! - Reassembling per-sensor tables with positional coil columns for export
//!
//! # Example
//!
//! ```no_run
//! use em61_pipeline::config::PipelineConfig;
//! use em61_pipeline::core::loaders::load_survey_table;
//! use em61_pipeline::processors::grouping::{split_groups, GroupSchema};
//! use em61_pipeline::processors::identity::resolve_identities;
//!
//! let config = PipelineConfig::default();
//! let table = load_survey_table("survey.xyz", &config.survey_column_names()).unwrap();
//! let groups = split_groups(&table, &GroupSchema::for_survey(&config)).unwrap();
//! let identities = resolve_identities(
//!     &groups,
//!     config.detection.window_size,
//!     config.detection.prominence,
//!     &config.detection.sensor_names,
//! )
//! .unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{DetectionConfig, PipelineConfig, SchemaConfig, TransformConfig};
pub use crate::core::loaders::{Field, RecordTable};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
