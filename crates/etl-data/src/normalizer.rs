//! RAW → SILVER: split each raw record into per-modality rows.
//!
//! Every record is checked for all four modality payloads. A present,
//! non-empty payload becomes one typed row whose fields are resolved through
//! the alias tables in [`etl_core::models::aliases`]. Absent payloads produce
//! no row at all.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use etl_core::error::Result;
use etl_core::models::{
    CanRow, GnssRow, ImuRow, Modality, NullRowPolicy, PoseRow, RawRecord, SensorRow,
};
use etl_core::table::{write_csv, ModalityTable};
use tracing::{debug, info};

// ── ModalityTables ────────────────────────────────────────────────────────────

/// The four SILVER tables. Each always exists, possibly empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModalityTables {
    pub gnss: ModalityTable<GnssRow>,
    pub imu: ModalityTable<ImuRow>,
    pub can: ModalityTable<CanRow>,
    pub pose: ModalityTable<PoseRow>,
}

impl ModalityTables {
    /// Append one row per modality present in `record`. Returns how many
    /// modalities were found.
    pub fn absorb(&mut self, record: &RawRecord) -> usize {
        let mut found = 0;
        for modality in Modality::ALL {
            let Some(payload) = modality.payload(record) else {
                continue;
            };
            match modality {
                Modality::Gnss => self.gnss.push(GnssRow::from_payload(payload)),
                Modality::Imu => self.imu.push(ImuRow::from_payload(payload)),
                Modality::Can => self.can.push(CanRow::from_payload(payload)),
                Modality::Pose => self.pose.push(PoseRow::from_payload(payload)),
            }
            found += 1;
        }
        found
    }

    /// Row count of one modality.
    pub fn len(&self, modality: Modality) -> usize {
        match modality {
            Modality::Gnss => self.gnss.len(),
            Modality::Imu => self.imu.len(),
            Modality::Can => self.can.len(),
            Modality::Pose => self.pose.len(),
        }
    }

    fn drop_null_rows(&mut self, modality: Modality, policy: NullRowPolicy) -> usize {
        match modality {
            Modality::Gnss => self.gnss.drop_null_rows(policy),
            Modality::Imu => self.imu.drop_null_rows(policy),
            Modality::Can => self.can.drop_null_rows(policy),
            Modality::Pose => self.pose.drop_null_rows(policy),
        }
    }
}

// ── NormalizeStats ────────────────────────────────────────────────────────────

/// Counters reported after a normalization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct NormalizeStats {
    /// Raw records read.
    pub records: u64,
    /// Records that carried none of the four modalities.
    pub records_without_modality: u64,
    /// Rows kept per modality.
    pub rows: BTreeMap<Modality, usize>,
    /// Rows discarded as all-null per modality.
    pub dropped: BTreeMap<Modality, usize>,
}

// ── Normalizer ────────────────────────────────────────────────────────────────

/// Classifies raw records into modality tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    policy: NullRowPolicy,
}

impl Normalizer {
    pub fn new(policy: NullRowPolicy) -> Self {
        Self { policy }
    }

    /// Consume `records` and build the four SILVER tables.
    ///
    /// The first `Err` item aborts the pass; sparse payloads never do.
    pub fn classify<I>(&self, records: I) -> Result<(ModalityTables, NormalizeStats)>
    where
        I: IntoIterator<Item = Result<RawRecord>>,
    {
        let mut tables = ModalityTables::default();
        let mut stats = NormalizeStats::default();

        for record in records {
            let record = record?;
            stats.records += 1;
            if tables.absorb(&record) == 0 {
                stats.records_without_modality += 1;
            }
        }

        for modality in Modality::ALL {
            let dropped = tables.drop_null_rows(modality, self.policy);
            let kept = tables.len(modality);
            if dropped > 0 {
                debug!("{}: dropped {} all-null rows", modality, dropped);
            }
            stats.rows.insert(modality, kept);
            stats.dropped.insert(modality, dropped);
        }

        debug!(
            "Normalized {} records ({} without any modality)",
            stats.records, stats.records_without_modality
        );
        Ok((tables, stats))
    }
}

// ── SILVER output ─────────────────────────────────────────────────────────────

/// Path of a modality's SILVER file under `silver_dir`.
pub fn silver_path(silver_dir: &Path, modality: Modality) -> PathBuf {
    silver_dir.join(format!("{}.csv", modality.name()))
}

/// Write every modality table to `<silver_dir>/<modality>.csv`.
pub fn write_silver(tables: &ModalityTables, silver_dir: &Path) -> Result<BTreeMap<Modality, PathBuf>> {
    let mut paths = BTreeMap::new();
    for modality in Modality::ALL {
        let path = silver_path(silver_dir, modality);
        match modality {
            Modality::Gnss => write_csv(tables.gnss.rows(), &path)?,
            Modality::Imu => write_csv(tables.imu.rows(), &path)?,
            Modality::Can => write_csv(tables.can.rows(), &path)?,
            Modality::Pose => write_csv(tables.pose.rows(), &path)?,
        };
        info!("SILVER {}: {} rows -> {}", modality, tables.len(modality), path.display());
        paths.insert(modality, path);
    }
    Ok(paths)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
