//! Core data model, loaders, transforms, and writers.

pub mod loaders;
pub mod transforms;
pub mod writers;

pub use loaders::{Field, RecordTable};
