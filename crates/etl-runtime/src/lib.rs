//! Runtime layer for the vehicle telemetry ETL.
//!
//! Sequences the extract, transform and metrics stages over one shared
//! [`etl_core::settings::Settings`].

pub mod pipeline;

pub use etl_core as core;
pub use etl_data as data;
