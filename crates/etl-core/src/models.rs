use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use crate::data_processors::{FieldResolver, TimestampProcessor};

/// One streamed sample: an arbitrarily shaped JSON object.
pub type RawRecord = Map<String, Value>;

/// GNSS speed conversion factor, metres per second to kilometres per hour.
pub const MPS_TO_KPH: f64 = 3.6;

// ── Alias tables ──────────────────────────────────────────────────────────────

/// Candidate source keys per target field, in priority order.
pub mod aliases {
    pub const TIME: &[&str] = &["time", "timestamp"];

    pub const LAT: &[&str] = &["lat", "latitude"];
    pub const LON: &[&str] = &["lon", "longitude"];
    pub const ALT: &[&str] = &["alt"];
    pub const SPEED_MPS: &[&str] = &["speed_mps", "speed"];
    pub const FIX: &[&str] = &["fix"];
    pub const NUM_SATS: &[&str] = &["num_sats", "satellites"];

    pub const VEHICLE_SPEED_KPH: &[&str] = &["vehicle_speed_kph", "speed_kph"];
    pub const STEERING_ANGLE_DEG: &[&str] = &["steering_angle_deg", "steer_angle_deg"];
    pub const THROTTLE_PCT: &[&str] = &["throttle_pct"];
    pub const BRAKE_PCT: &[&str] = &["brake_pct"];
}

// ── Modality ──────────────────────────────────────────────────────────────────

/// One of the four sensor categories carried by a raw record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Gnss,
    Imu,
    Can,
    Pose,
}

impl Modality {
    /// Every modality, in SILVER write order.
    pub const ALL: [Modality; 4] = [Modality::Gnss, Modality::Imu, Modality::Can, Modality::Pose];

    /// Lowercase key, also the SILVER file stem.
    pub fn name(self) -> &'static str {
        match self {
            Modality::Gnss => "gnss",
            Modality::Imu => "imu",
            Modality::Can => "can",
            Modality::Pose => "pose",
        }
    }

    /// Uppercase fallback key.
    pub fn upper_name(self) -> &'static str {
        match self {
            Modality::Gnss => "GNSS",
            Modality::Imu => "IMU",
            Modality::Can => "CAN",
            Modality::Pose => "POSE",
        }
    }

    /// Fixed SILVER column schema.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Modality::Gnss => GnssRow::COLUMNS,
            Modality::Imu => ImuRow::COLUMNS,
            Modality::Can => CanRow::COLUMNS,
            Modality::Pose => PoseRow::COLUMNS,
        }
    }

    /// Locate this modality's payload inside a raw record.
    ///
    /// Checks the lowercase key first, then the uppercase key. A value that is
    /// missing, not an object, or an empty object does not count.
    pub fn payload(self, record: &RawRecord) -> Option<&Map<String, Value>> {
        [self.name(), self.upper_name()]
            .into_iter()
            .filter_map(|key| record.get(key))
            .filter_map(Value::as_object)
            .find(|payload| !payload.is_empty())
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── NullRowPolicy ─────────────────────────────────────────────────────────────

/// Which cells must all be null for a SILVER row to be dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum NullRowPolicy {
    /// Drop only when the timestamp and every sensor field are null.
    #[default]
    AllColumns,
    /// Drop when every sensor field is null, even if the timestamp parsed.
    SensorColumns,
}

// ── Row traits ────────────────────────────────────────────────────────────────

/// A row type with a fixed, ordered column schema.
///
/// `COLUMNS` must list the serialized field names in declaration order.
pub trait TableSchema: Serialize {
    const COLUMNS: &'static [&'static str];
}

/// A SILVER row built from one modality payload.
pub trait SensorRow: TableSchema + Sized {
    const MODALITY: Modality;

    /// Resolve every field through its alias list.
    fn from_payload(payload: &Map<String, Value>) -> Self;

    fn time(&self) -> Option<DateTime<Utc>>;

    /// Sensor fields (everything except `time`), in column order.
    fn sensor_values(&self) -> Vec<Option<f64>>;

    /// Whether this row should be discarded under `policy`.
    fn is_null_under(&self, policy: NullRowPolicy) -> bool {
        let sensors_null = self.sensor_values().iter().all(Option::is_none);
        match policy {
            NullRowPolicy::AllColumns => sensors_null && self.time().is_none(),
            NullRowPolicy::SensorColumns => sensors_null,
        }
    }
}

fn serialize_timestamp<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(dt) => serializer.serialize_str(&TimestampProcessor::format(dt)),
        None => serializer.serialize_none(),
    }
}

// ── GnssRow ───────────────────────────────────────────────────────────────────

/// Satellite positioning sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GnssRow {
    #[serde(serialize_with = "serialize_timestamp")]
    pub time: Option<DateTime<Utc>>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    pub speed_mps: Option<f64>,
    /// Solution quality code; 3 or more is a 3D fix.
    pub fix: Option<f64>,
    pub num_sats: Option<f64>,
    /// Derived from `speed_mps`.
    pub speed_kph: Option<f64>,
}

impl TableSchema for GnssRow {
    const COLUMNS: &'static [&'static str] = &[
        "time",
        "lat",
        "lon",
        "alt",
        "speed_mps",
        "fix",
        "num_sats",
        "speed_kph",
    ];
}

impl SensorRow for GnssRow {
    const MODALITY: Modality = Modality::Gnss;

    fn from_payload(payload: &Map<String, Value>) -> Self {
        let speed_mps = FieldResolver::number(payload, aliases::SPEED_MPS);
        Self {
            time: FieldResolver::timestamp(payload, aliases::TIME),
            lat: FieldResolver::number(payload, aliases::LAT),
            lon: FieldResolver::number(payload, aliases::LON),
            alt: FieldResolver::number(payload, aliases::ALT),
            speed_mps,
            fix: FieldResolver::number(payload, aliases::FIX),
            num_sats: FieldResolver::number(payload, aliases::NUM_SATS),
            speed_kph: speed_mps.map(|v| v * MPS_TO_KPH),
        }
    }

    fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }

    fn sensor_values(&self) -> Vec<Option<f64>> {
        vec![
            self.lat,
            self.lon,
            self.alt,
            self.speed_mps,
            self.fix,
            self.num_sats,
            self.speed_kph,
        ]
    }
}

// ── ImuRow ────────────────────────────────────────────────────────────────────

/// Accelerometer (m/s²) and gyroscope sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImuRow {
    #[serde(serialize_with = "serialize_timestamp")]
    pub time: Option<DateTime<Utc>>,
    pub ax: Option<f64>,
    pub ay: Option<f64>,
    pub az: Option<f64>,
    pub gx: Option<f64>,
    pub gy: Option<f64>,
    pub gz: Option<f64>,
}

impl TableSchema for ImuRow {
    const COLUMNS: &'static [&'static str] = &["time", "ax", "ay", "az", "gx", "gy", "gz"];
}

impl SensorRow for ImuRow {
    const MODALITY: Modality = Modality::Imu;

    fn from_payload(payload: &Map<String, Value>) -> Self {
        Self {
            time: FieldResolver::timestamp(payload, aliases::TIME),
            ax: FieldResolver::number(payload, &["ax"]),
            ay: FieldResolver::number(payload, &["ay"]),
            az: FieldResolver::number(payload, &["az"]),
            gx: FieldResolver::number(payload, &["gx"]),
            gy: FieldResolver::number(payload, &["gy"]),
            gz: FieldResolver::number(payload, &["gz"]),
        }
    }

    fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }

    fn sensor_values(&self) -> Vec<Option<f64>> {
        vec![self.ax, self.ay, self.az, self.gx, self.gy, self.gz]
    }
}

// ── CanRow ────────────────────────────────────────────────────────────────────

/// Vehicle bus sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CanRow {
    #[serde(serialize_with = "serialize_timestamp")]
    pub time: Option<DateTime<Utc>>,
    pub vehicle_speed_kph: Option<f64>,
    pub steering_angle_deg: Option<f64>,
    pub throttle_pct: Option<f64>,
    pub brake_pct: Option<f64>,
}

impl TableSchema for CanRow {
    const COLUMNS: &'static [&'static str] = &[
        "time",
        "vehicle_speed_kph",
        "steering_angle_deg",
        "throttle_pct",
        "brake_pct",
    ];
}

impl SensorRow for CanRow {
    const MODALITY: Modality = Modality::Can;

    fn from_payload(payload: &Map<String, Value>) -> Self {
        Self {
            time: FieldResolver::timestamp(payload, aliases::TIME),
            vehicle_speed_kph: FieldResolver::number(payload, aliases::VEHICLE_SPEED_KPH),
            steering_angle_deg: FieldResolver::number(payload, aliases::STEERING_ANGLE_DEG),
            throttle_pct: FieldResolver::number(payload, aliases::THROTTLE_PCT),
            brake_pct: FieldResolver::number(payload, aliases::BRAKE_PCT),
        }
    }

    fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }

    fn sensor_values(&self) -> Vec<Option<f64>> {
        vec![
            self.vehicle_speed_kph,
            self.steering_angle_deg,
            self.throttle_pct,
            self.brake_pct,
        ]
    }
}

// ── PoseRow ───────────────────────────────────────────────────────────────────

/// Position and orientation estimate.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoseRow {
    #[serde(serialize_with = "serialize_timestamp")]
    pub time: Option<DateTime<Utc>>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub roll: Option<f64>,
    pub pitch: Option<f64>,
    pub yaw: Option<f64>,
}

impl TableSchema for PoseRow {
    const COLUMNS: &'static [&'static str] = &["time", "x", "y", "z", "roll", "pitch", "yaw"];
}

impl SensorRow for PoseRow {
    const MODALITY: Modality = Modality::Pose;

    fn from_payload(payload: &Map<String, Value>) -> Self {
        Self {
            time: FieldResolver::timestamp(payload, aliases::TIME),
            x: FieldResolver::number(payload, &["x"]),
            y: FieldResolver::number(payload, &["y"]),
            z: FieldResolver::number(payload, &["z"]),
            roll: FieldResolver::number(payload, &["roll"]),
            pitch: FieldResolver::number(payload, &["pitch"]),
            yaw: FieldResolver::number(payload, &["yaw"]),
        }
    }

    fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }

    fn sensor_values(&self) -> Vec<Option<f64>> {
        vec![self.x, self.y, self.z, self.roll, self.pitch, self.yaw]
    }
}

// ── KPI rows ──────────────────────────────────────────────────────────────────

/// Daily CAN speed statistics (`vw_speed_summary`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedSummaryRow {
    pub ts_date: NaiveDate,
    pub avg_speed_kph: Option<f64>,
    pub max_speed_kph: Option<f64>,
}

impl TableSchema for SpeedSummaryRow {
    const COLUMNS: &'static [&'static str] = &["ts_date", "avg_speed_kph", "max_speed_kph"];
}

/// Daily GNSS reception quality (`vw_gnss_quality`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GnssQualityRow {
    pub ts_date: NaiveDate,
    pub avg_sats: Option<f64>,
    /// Fraction in `[0, 1]`; `None` when the source had no `fix` column.
    pub pct_3d_fix: Option<f64>,
}

impl TableSchema for GnssQualityRow {
    const COLUMNS: &'static [&'static str] = &["ts_date", "avg_sats", "pct_3d_fix"];
}

/// Daily hard acceleration / braking counts (`vw_accel_events`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccelEventsRow {
    pub ts_date: NaiveDate,
    pub hard_accel_events: u64,
    pub hard_brake_events: u64,
}

impl TableSchema for AccelEventsRow {
    const COLUMNS: &'static [&'static str] =
        &["ts_date", "hard_accel_events", "hard_brake_events"];
}
