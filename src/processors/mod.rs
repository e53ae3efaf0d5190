//! Signal processing stages of the pipeline.
//!
//! Data flows loader -> grouping -> peaks -> identity -> assembly; every
//! stage consumes one table and produces a new one.

pub mod assembly;
pub mod grouping;
pub mod identity;
pub mod peaks;

pub use assembly::{assemble_sensor, AssembledSensor, AssemblyError};
pub use grouping::{split_groups, GroupError, GroupSchema, SensorGroup};
pub use identity::{resolve_identities, IdentityError, IdentityMap, SensorAssignment};
pub use peaks::{find_peaks, PeakError};
