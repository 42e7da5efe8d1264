//! SILVER → GOLD: daily KPI views.
//!
//! Inputs are read back from CSV as [`Frame`]s, so each KPI checks for the
//! columns it needs and returns an empty (but fully typed) result when they
//! are missing. Rows whose `time` does not parse belong to no day and are
//! ignored.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use etl_core::data_processors::{NumericCoercer, TimestampProcessor};
use etl_core::error::Result;
use etl_core::models::{AccelEventsRow, GnssQualityRow, Modality, SpeedSummaryRow};
use etl_core::table::{group_by, write_csv, Frame, Reduce};
use tracing::{debug, info};

use crate::normalizer::silver_path;

pub const VW_SPEED_SUMMARY: &str = "vw_speed_summary";
pub const VW_GNSS_QUALITY: &str = "vw_gnss_quality";
pub const VW_ACCEL_EVENTS: &str = "vw_accel_events";

/// GNSS fix codes at or above this value are 3D fixes.
pub const FIX_3D: f64 = 3.0;

// ── SILVER input ──────────────────────────────────────────────────────────────

/// The SILVER tables the KPIs are computed from.
#[derive(Debug, Clone, Default)]
pub struct SilverFrames {
    pub can: Frame,
    pub gnss: Frame,
    pub imu: Frame,
}

impl SilverFrames {
    /// Read `can`, `gnss` and `imu` CSVs from `silver_dir`. Missing files
    /// read as empty frames.
    pub fn read(silver_dir: &Path) -> Result<Self> {
        Ok(Self {
            can: Frame::read_csv(&silver_path(silver_dir, Modality::Can))?,
            gnss: Frame::read_csv(&silver_path(silver_dir, Modality::Gnss))?,
            imu: Frame::read_csv(&silver_path(silver_dir, Modality::Imu))?,
        })
    }
}

// ── Row helpers ───────────────────────────────────────────────────────────────

/// UTC calendar date per row; all `None` when there is no `time` column.
fn row_dates(frame: &Frame) -> Vec<Option<NaiveDate>> {
    match frame.column("time") {
        Some(cells) => cells
            .into_iter()
            .map(|c| TimestampProcessor::parse_str(c).map(|dt| TimestampProcessor::utc_date(&dt)))
            .collect(),
        None => vec![None; frame.len()],
    }
}

fn numeric(cells: &[&str]) -> Vec<Option<f64>> {
    cells.iter().map(|c| NumericCoercer::coerce_str(c)).collect()
}

// ── KPIs ──────────────────────────────────────────────────────────────────────

/// Average and max `vehicle_speed_kph` per day.
pub fn kpi_speed_summary(can: &Frame) -> Vec<SpeedSummaryRow> {
    let Some(speed_cells) = can.column("vehicle_speed_kph") else {
        debug!("speed summary: no vehicle_speed_kph column");
        return Vec::new();
    };
    let speeds = numeric(&speed_cells);

    let groups = group_by(row_dates(can).into_iter().zip(speeds), |(date, _)| *date);
    groups
        .into_iter()
        .map(|(ts_date, rows)| SpeedSummaryRow {
            ts_date,
            avg_speed_kph: Reduce::mean(rows.iter().map(|(_, v)| *v)),
            max_speed_kph: Reduce::max(rows.iter().map(|(_, v)| *v)),
        })
        .collect()
}

/// Average satellite count and share of 3D fixes per day.
///
/// `pct_3d_fix` is `None` for every day when the frame has no `fix` column;
/// otherwise a non-numeric fix counts as not being a 3D fix.
pub fn kpi_gnss_quality(gnss: &Frame) -> Vec<GnssQualityRow> {
    let Some(sats_cells) = gnss.column("num_sats") else {
        debug!("GNSS quality: no num_sats column");
        return Vec::new();
    };
    let sats = numeric(&sats_cells);
    let fixes: Option<Vec<Option<f64>>> = gnss.column("fix").map(|cells| numeric(&cells));
    let has_fix = fixes.is_some();
    let fixes = fixes.unwrap_or_else(|| vec![None; gnss.len()]);

    let rows = row_dates(gnss).into_iter().zip(sats).zip(fixes);
    let groups = group_by(rows, |((date, _), _)| *date);
    groups
        .into_iter()
        .map(|(ts_date, rows)| GnssQualityRow {
            ts_date,
            avg_sats: Reduce::mean(rows.iter().map(|((_, s), _)| *s)),
            pct_3d_fix: if has_fix {
                Reduce::fraction_where(rows.iter().map(|(_, f)| *f), |f| f >= FIX_3D)
            } else {
                None
            },
        })
        .collect()
}

/// Hard acceleration (`ax > threshold`) and braking (`ax < -threshold`)
/// counts per day. Non-numeric `ax` counts towards neither.
pub fn kpi_accel_events(imu: &Frame, threshold: f64) -> Vec<AccelEventsRow> {
    let Some(ax_cells) = imu.column("ax") else {
        debug!("accel events: no ax column");
        return Vec::new();
    };
    let ax = numeric(&ax_cells);

    let groups = group_by(row_dates(imu).into_iter().zip(ax), |(date, _)| *date);
    groups
        .into_iter()
        .map(|(ts_date, rows)| AccelEventsRow {
            ts_date,
            hard_accel_events: Reduce::count_where(rows.iter().map(|(_, v)| *v), |v| v > threshold),
            hard_brake_events: Reduce::count_where(rows.iter().map(|(_, v)| *v), |v| v < -threshold),
        })
        .collect()
}

// ── GOLD output ───────────────────────────────────────────────────────────────

/// The three KPI views.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoldTables {
    pub speed_summary: Vec<SpeedSummaryRow>,
    pub gnss_quality: Vec<GnssQualityRow>,
    pub accel_events: Vec<AccelEventsRow>,
}

impl GoldTables {
    /// Compute every KPI from `silver`.
    pub fn compute(silver: &SilverFrames, accel_threshold: f64) -> Self {
        Self {
            speed_summary: kpi_speed_summary(&silver.can),
            gnss_quality: kpi_gnss_quality(&silver.gnss),
            accel_events: kpi_accel_events(&silver.imu, accel_threshold),
        }
    }
}

/// Write each view to `<gold_dir>/<view>.csv`, header always present.
pub fn write_gold(gold: &GoldTables, gold_dir: &Path) -> Result<BTreeMap<&'static str, PathBuf>> {
    let mut paths = BTreeMap::new();

    let path = gold_dir.join(format!("{}.csv", VW_SPEED_SUMMARY));
    write_csv(&gold.speed_summary, &path)?;
    info!("GOLD {}: {} days -> {}", VW_SPEED_SUMMARY, gold.speed_summary.len(), path.display());
    paths.insert(VW_SPEED_SUMMARY, path);

    let path = gold_dir.join(format!("{}.csv", VW_GNSS_QUALITY));
    write_csv(&gold.gnss_quality, &path)?;
    info!("GOLD {}: {} days -> {}", VW_GNSS_QUALITY, gold.gnss_quality.len(), path.display());
    paths.insert(VW_GNSS_QUALITY, path);

    let path = gold_dir.join(format!("{}.csv", VW_ACCEL_EVENTS));
    write_csv(&gold.accel_events, &path)?;
    info!("GOLD {}: {} days -> {}", VW_ACCEL_EVENTS, gold.accel_events.len(), path.display());
    paths.insert(VW_ACCEL_EVENTS, path);

    Ok(paths)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
