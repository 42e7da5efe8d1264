//! Shared building blocks for the vehicle-sensor ETL.
//!
//! Error types, settings, the per-modality row models and their alias
//! tables, value coercion, and the tabular containers used by every layer.

pub mod data_processors;
pub mod error;
pub mod models;
pub mod settings;
pub mod table;

pub use error::{EtlError, Result};
