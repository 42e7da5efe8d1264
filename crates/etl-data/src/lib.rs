//! Data layers for the vehicle telemetry pipeline.
//!
//! Pulls raw records from a dataset source into the RAW JSONL file, splits
//! them into per-modality SILVER tables, and reduces those to daily GOLD KPI
//! views.

pub mod aggregator;
pub mod ingest;
pub mod normalizer;
pub mod raw;
pub mod source;

pub use etl_core as core;
