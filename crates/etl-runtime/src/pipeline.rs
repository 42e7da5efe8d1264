//! Stage driver: extract → RAW, transform(RAW) → SILVER, metrics(SILVER) → GOLD.
//!
//! Every stage reads its input from disk and writes its full output before
//! returning, so each can be rerun on its own after a failure further down.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use etl_core::error::Result;
use etl_core::models::Modality;
use etl_core::settings::Settings;
use etl_data::aggregator::{
    write_gold, GoldTables, SilverFrames, VW_ACCEL_EVENTS, VW_GNSS_QUALITY, VW_SPEED_SUMMARY,
};
use etl_data::ingest;
use etl_data::normalizer::{write_silver, NormalizeStats, Normalizer};
use etl_data::raw::{read_jsonl, RawWriter};
use etl_data::source::RecordSource;
use tracing::info;

// ── Reports ───────────────────────────────────────────────────────────────────

/// Result of [`Pipeline::extract`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExtractReport {
    pub raw_path: PathBuf,
    pub records: u64,
    pub elapsed_seconds: f64,
}

/// Result of [`Pipeline::transform`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct TransformReport {
    pub raw_path: PathBuf,
    pub silver: BTreeMap<Modality, PathBuf>,
    pub stats: NormalizeStats,
    pub elapsed_seconds: f64,
}

/// Result of [`Pipeline::metrics`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsReport {
    pub gold: BTreeMap<&'static str, PathBuf>,
    /// Days per view, keyed like `gold`.
    pub days: BTreeMap<&'static str, usize>,
    pub elapsed_seconds: f64,
}

/// Result of [`Pipeline::run_all`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunReport {
    pub extract: ExtractReport,
    pub transform: TransformReport,
    pub metrics: MetricsReport,
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Runs the stages against one [`Settings`].
pub struct Pipeline<'a> {
    settings: &'a Settings,
}

impl<'a> Pipeline<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        self.settings
    }

    /// Stream records from `source` into the RAW file.
    ///
    /// `on_record` is called with the running count after each record is
    /// written. The RAW file is truncated first, so a failed run leaves only
    /// the records written before the failure.
    pub fn extract<F>(&self, source: &dyn RecordSource, mut on_record: F) -> Result<ExtractReport>
    where
        F: FnMut(u64),
    {
        let s = self.settings;
        let start = Instant::now();
        info!(
            "[extract] dataset={} split={} limit={}",
            s.dataset, s.split, s.limit
        );

        let records = ingest::stream(source, &s.dataset, &s.split, s.limit.get(), s.projection())?;
        let mut writer = RawWriter::create(&s.raw_path)?;
        for record in records {
            writer.append(&record?)?;
            on_record(writer.count());
        }
        let records = writer.finish()?;

        info!("[extract] wrote {} records -> {}", records, s.raw_path.display());
        Ok(ExtractReport {
            raw_path: s.raw_path.clone(),
            records,
            elapsed_seconds: start.elapsed().as_secs_f64(),
        })
    }

    /// Split the RAW file into the four SILVER tables.
    pub fn transform(&self) -> Result<TransformReport> {
        let s = self.settings;
        let start = Instant::now();
        info!("[transform] reading {}", s.raw_path.display());

        let reader = read_jsonl(&s.raw_path)?;
        let (tables, stats) = Normalizer::new(s.null_row_policy).classify(reader)?;
        let silver = write_silver(&tables, &s.silver_dir)?;

        info!(
            "[transform] {} records -> {} (gnss={} imu={} can={} pose={})",
            stats.records,
            s.silver_dir.display(),
            tables.gnss.len(),
            tables.imu.len(),
            tables.can.len(),
            tables.pose.len()
        );
        Ok(TransformReport {
            raw_path: s.raw_path.clone(),
            silver,
            stats,
            elapsed_seconds: start.elapsed().as_secs_f64(),
        })
    }

    /// Compute the daily KPI views from SILVER.
    pub fn metrics(&self) -> Result<MetricsReport> {
        let s = self.settings;
        let start = Instant::now();
        info!("[metrics] reading {}", s.silver_dir.display());

        let silver = SilverFrames::read(&s.silver_dir)?;
        let gold = GoldTables::compute(&silver, s.accel_threshold);
        let paths = write_gold(&gold, &s.gold_dir)?;

        let days = BTreeMap::from([
            (VW_SPEED_SUMMARY, gold.speed_summary.len()),
            (VW_GNSS_QUALITY, gold.gnss_quality.len()),
            (VW_ACCEL_EVENTS, gold.accel_events.len()),
        ]);

        info!("[metrics] wrote {} views -> {}", paths.len(), s.gold_dir.display());
        Ok(MetricsReport {
            gold: paths,
            days,
            elapsed_seconds: start.elapsed().as_secs_f64(),
        })
    }

    /// Extract, transform and compute metrics in order. Stops at the first
    /// failing stage.
    pub fn run_all<F>(&self, source: &dyn RecordSource, on_record: F) -> Result<RunReport>
    where
        F: FnMut(u64),
    {
        let extract = self.extract(source, on_record)?;
        let transform = self.transform()?;
        let metrics = self.metrics()?;
        Ok(RunReport {
            extract,
            transform,
            metrics,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
