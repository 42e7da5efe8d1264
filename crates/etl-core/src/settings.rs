use clap::{Args, Parser, Subcommand};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::models::NullRowPolicy;

// ── Defaults ──────────────────────────────────────────────────────────────────

pub const DEFAULT_DATASET: &str = "commaai/comma2k19";
pub const DEFAULT_SPLIT: &str = "train";
pub const DEFAULT_DATASET_CONFIG: &str = "default";
pub const DEFAULT_EXTRACT_LIMIT: u64 = 2000;
pub const DEFAULT_RAW_PATH: &str = "data/raw/comma2k19_raw.jsonl";
pub const DEFAULT_SILVER_DIR: &str = "data/processed/silver";
pub const DEFAULT_GOLD_DIR: &str = "data/processed/gold";
pub const DEFAULT_DATASETS_SERVER_URL: &str = "https://datasets-server.huggingface.co";
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_ACCEL_THRESHOLD: f64 = 1.5;

// ── RecordLimit ───────────────────────────────────────────────────────────────

/// Cap on extracted records; `None` means read the source to exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLimit(pub Option<u64>);

impl RecordLimit {
    pub const UNBOUNDED: RecordLimit = RecordLimit(None);

    pub fn get(self) -> Option<u64> {
        self.0
    }
}

impl Default for RecordLimit {
    fn default() -> Self {
        RecordLimit(Some(DEFAULT_EXTRACT_LIMIT))
    }
}

impl FromStr for RecordLimit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "unbounded" | "all" => Ok(RecordLimit::UNBOUNDED),
            other => other
                .parse::<u64>()
                .map(|n| RecordLimit(Some(n)))
                .map_err(|_| {
                    format!(
                        "invalid limit \"{}\": expected a non-negative integer or \"none\"",
                        s
                    )
                }),
        }
    }
}

impl fmt::Display for RecordLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(n) => write!(f, "{}", n),
            None => f.write_str("none"),
        }
    }
}

// ── Settings ──────────────────────────────────────────────────────────────────

/// Pipeline configuration, built once at process start.
///
/// Every field reads its environment variable first; an explicit flag wins.
/// All flags are global, so they may appear before or after the subcommand.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct Settings {
    /// Source identifier: a Hugging Face dataset name or a local JSONL path
    #[arg(long = "dataset", env = "DATASET_NAME", default_value = DEFAULT_DATASET, global = true)]
    pub dataset: String,

    /// Dataset split
    #[arg(long, env = "SPLIT", default_value = DEFAULT_SPLIT, global = true)]
    pub split: String,

    /// Dataset configuration name used by the datasets-server API
    #[arg(long, env = "DATASET_CONFIG", default_value = DEFAULT_DATASET_CONFIG, global = true)]
    pub dataset_config: String,

    /// Maximum number of records to extract ("none" for no cap)
    #[arg(long, env = "EXTRACT_LIMIT", default_value = "2000", global = true)]
    pub limit: RecordLimit,

    /// Top-level keys to keep per record (comma-separated; empty keeps all)
    #[arg(long, env = "EXTRACT_COLUMNS", value_delimiter = ',', global = true)]
    pub columns: Vec<String>,

    /// RAW layer JSONL path
    #[arg(long = "raw", env = "RAW_PATH", default_value = DEFAULT_RAW_PATH, global = true)]
    pub raw_path: PathBuf,

    /// SILVER layer output directory
    #[arg(long, env = "SILVER_DIR", default_value = DEFAULT_SILVER_DIR, global = true)]
    pub silver_dir: PathBuf,

    /// GOLD layer output directory
    #[arg(long, env = "GOLD_DIR", default_value = DEFAULT_GOLD_DIR, global = true)]
    pub gold_dir: PathBuf,

    /// Base URL of the datasets-server rows API
    #[arg(long, env = "DATASETS_SERVER_URL", default_value = DEFAULT_DATASETS_SERVER_URL, global = true)]
    pub datasets_server_url: String,

    /// Rows requested per page from the datasets-server (1-100)
    #[arg(long, env = "PAGE_SIZE", default_value = "100", value_parser = clap::value_parser!(u32).range(1..=100), global = true)]
    pub page_size: u32,

    /// |ax| above which an IMU sample counts as a hard accel/brake event
    #[arg(long, env = "ACCEL_THRESHOLD", default_value = "1.5", global = true)]
    pub accel_threshold: f64,

    /// Which cells must be null for a SILVER row to be dropped
    #[arg(long, env = "NULL_ROW_POLICY", value_enum, default_value = "all-columns", global = true)]
    pub null_row_policy: NullRowPolicy,

    /// Logging level
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dataset: DEFAULT_DATASET.to_string(),
            split: DEFAULT_SPLIT.to_string(),
            dataset_config: DEFAULT_DATASET_CONFIG.to_string(),
            limit: RecordLimit::default(),
            columns: Vec::new(),
            raw_path: PathBuf::from(DEFAULT_RAW_PATH),
            silver_dir: PathBuf::from(DEFAULT_SILVER_DIR),
            gold_dir: PathBuf::from(DEFAULT_GOLD_DIR),
            datasets_server_url: DEFAULT_DATASETS_SERVER_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            accel_threshold: DEFAULT_ACCEL_THRESHOLD,
            null_row_policy: NullRowPolicy::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Column projection for the ingestor, `None` when every key is kept.
    pub fn projection(&self) -> Option<&[String]> {
        if self.columns.is_empty() {
            None
        } else {
            Some(&self.columns)
        }
    }

    /// Place the RAW file and both output directories under `root`, keeping
    /// the default relative layout.
    pub fn rooted_at(mut self, root: &std::path::Path) -> Self {
        self.raw_path = root.join(DEFAULT_RAW_PATH);
        self.silver_dir = root.join(DEFAULT_SILVER_DIR);
        self.gold_dir = root.join(DEFAULT_GOLD_DIR);
        self
    }
}

// ── CLI ───────────────────────────────────────────────────────────────────────

/// ETL for public vehicle sensors: RAW JSONL → SILVER CSV → GOLD KPIs
#[derive(Parser, Debug, Clone)]
#[command(
    name = "vehicle-etl",
    about = "ETL for public vehicle sensor datasets (comma2k19)",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Stream public data to RAW JSONL
    Extract,
    /// RAW JSONL -> SILVER CSVs
    Transform,
    /// Compute GOLD KPIs from SILVER
    Metrics,
    /// Run extract -> transform -> metrics
    All,
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── RecordLimit ───────────────────────────────────────────────────────────

    #[test]
    fn test_record_limit_parse() {
        assert_eq!("5".parse::<RecordLimit>(), Ok(RecordLimit(Some(5))));
        assert_eq!("0".parse::<RecordLimit>(), Ok(RecordLimit(Some(0))));
        assert_eq!("none".parse::<RecordLimit>(), Ok(RecordLimit::UNBOUNDED));
        assert_eq!("Unbounded".parse::<RecordLimit>(), Ok(RecordLimit::UNBOUNDED));
        assert!("-1".parse::<RecordLimit>().is_err());
        assert!("lots".parse::<RecordLimit>().is_err());
    }

    #[test]
    fn test_record_limit_display() {
        assert_eq!(RecordLimit(Some(42)).to_string(), "42");
        assert_eq!(RecordLimit::UNBOUNDED.to_string(), "none");
    }

    // ── Cli parsing ───────────────────────────────────────────────────────────

    #[test]
    fn test_cli_extract_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "vehicle-etl",
            "extract",
            "--limit",
            "25",
            "--dataset",
            "someone/drives",
            "--split",
            "validation",
        ]);
        assert_eq!(cli.command, Command::Extract);
        assert_eq!(cli.settings.limit, RecordLimit(Some(25)));
        assert_eq!(cli.settings.dataset, "someone/drives");
        assert_eq!(cli.settings.split, "validation");
    }

    #[test]
    fn test_cli_transform_raw_override() {
        let cli = Cli::parse_from(["vehicle-etl", "transform", "--raw", "/tmp/in.jsonl"]);
        assert_eq!(cli.command, Command::Transform);
        assert_eq!(cli.settings.raw_path, PathBuf::from("/tmp/in.jsonl"));
    }

    #[test]
    fn test_cli_columns_are_comma_separated() {
        let cli = Cli::parse_from(["vehicle-etl", "extract", "--columns", "gnss,imu"]);
        assert_eq!(
            cli.settings.projection(),
            Some(&["gnss".to_string(), "imu".to_string()][..])
        );
    }

    #[test]
    fn test_cli_rejects_page_size_out_of_range() {
        let result = Cli::try_parse_from(["vehicle-etl", "all", "--page-size", "500"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_null_row_policy() {
        let cli = Cli::parse_from([
            "vehicle-etl",
            "transform",
            "--null-row-policy",
            "sensor-columns",
        ]);
        assert_eq!(cli.settings.null_row_policy, NullRowPolicy::SensorColumns);
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["vehicle-etl"]).is_err());
    }

    // ── Settings ──────────────────────────────────────────────────────────────

    #[test]
    fn test_settings_default_values() {
        let s = Settings::default();
        assert_eq!(s.dataset, "commaai/comma2k19");
        assert_eq!(s.split, "train");
        assert_eq!(s.limit, RecordLimit(Some(2000)));
        assert_eq!(s.raw_path, PathBuf::from("data/raw/comma2k19_raw.jsonl"));
        assert_eq!(s.page_size, 100);
        assert!((s.accel_threshold - 1.5).abs() < f64::EPSILON);
        assert_eq!(s.null_row_policy, NullRowPolicy::AllColumns);
        assert!(s.projection().is_none());
    }

    #[test]
    fn test_settings_rooted_at() {
        let s = Settings::default().rooted_at(std::path::Path::new("/work"));
        assert_eq!(
            s.raw_path,
            PathBuf::from("/work/data/raw/comma2k19_raw.jsonl")
        );
        assert_eq!(s.silver_dir, PathBuf::from("/work/data/processed/silver"));
        assert_eq!(s.gold_dir, PathBuf::from("/work/data/processed/gold"));
    }
}
