//! RAW layer: newline-delimited JSON, one record object per line.
//!
//! Writing truncates the target once and then appends record by record.
//! Reading is lazy; a line that is not a JSON object aborts the read.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use etl_core::error::{EtlError, Result};
use etl_core::models::RawRecord;
use serde_json::Value;
use tracing::{debug, warn};

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Find all `.jsonl` files recursively under `data_path`, sorted by path.
pub fn find_jsonl_files(data_path: &Path) -> Vec<PathBuf> {
    if !data_path.exists() {
        warn!("Data path does not exist: {}", data_path.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(data_path)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext == "jsonl")
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

// ── RawWriter ─────────────────────────────────────────────────────────────────

/// Append-only JSONL writer for the RAW layer.
pub struct RawWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    count: u64,
}

impl RawWriter {
    /// Create (or truncate) `path`, creating parent directories as needed.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| EtlError::FileWrite {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = File::create(path).map_err(|source| EtlError::FileWrite {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            count: 0,
        })
    }

    /// Serialize `record` as one line.
    pub fn append(&mut self, record: &RawRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record).map_err(|e| EtlError::FileWrite {
            path: self.path.clone(),
            source: e.into(),
        })?;
        self.writer
            .write_all(b"\n")
            .map_err(|source| EtlError::FileWrite {
                path: self.path.clone(),
                source,
            })?;
        self.count += 1;
        Ok(())
    }

    /// Records written so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Flush buffered lines and return the number of records written.
    pub fn finish(mut self) -> Result<u64> {
        self.writer.flush().map_err(|source| EtlError::FileWrite {
            path: self.path.clone(),
            source,
        })?;
        debug!("RAW: wrote {} records to {}", self.count, self.path.display());
        Ok(self.count)
    }
}

/// Write every record in `records` to a fresh JSONL file at `out_path`.
pub fn write_jsonl<I>(records: I, out_path: &Path) -> Result<u64>
where
    I: IntoIterator<Item = RawRecord>,
{
    let mut writer = RawWriter::create(out_path)?;
    for record in records {
        writer.append(&record)?;
    }
    writer.finish()
}

// ── RawReader ─────────────────────────────────────────────────────────────────

/// Lazy reader yielding one [`RawRecord`] per non-blank line.
///
/// Stops after the first error.
pub struct RawReader {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    failed: bool,
}

impl RawReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| EtlError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
            line_no: 0,
            failed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse_line(&self, line: &str) -> Result<RawRecord> {
        let value: Value = serde_json::from_str(line).map_err(|e| EtlError::MalformedRaw {
            path: self.path.clone(),
            line: self.line_no,
            reason: e.to_string(),
        })?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(EtlError::MalformedRaw {
                path: self.path.clone(),
                line: self.line_no,
                reason: format!("expected a JSON object, found {}", json_kind(&other)),
            }),
        }
    }
}

impl Iterator for RawReader {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let line = match self.lines.next()? {
                Ok(l) => l,
                Err(source) => {
                    self.failed = true;
                    return Some(Err(EtlError::FileRead {
                        path: self.path.clone(),
                        source,
                    }));
                }
            };
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let parsed = self.parse_line(trimmed);
            if parsed.is_err() {
                self.failed = true;
            }
            return Some(parsed);
        }
    }
}

/// Open `in_path` for lazy record-by-record reading.
pub fn read_jsonl(in_path: &Path) -> Result<RawReader> {
    RawReader::open(in_path)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(v: Value) -> RawRecord {
        v.as_object().cloned().unwrap()
    }

    fn write_lines(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    // ── find_jsonl_files ──────────────────────────────────────────────────────

    #[test]
    fn test_find_jsonl_files_recursive_and_sorted() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("chunk_2");
        std::fs::create_dir_all(&sub).unwrap();
        write_lines(dir.path(), "b.jsonl", &["{}"]);
        write_lines(dir.path(), "a.jsonl", &["{}"]);
        write_lines(&sub, "c.jsonl", &["{}"]);
        write_lines(dir.path(), "notes.txt", &["x"]);

        let files = find_jsonl_files(dir.path());
        assert_eq!(files.len(), 3);
        assert!(files.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_find_jsonl_files_nonexistent_path() {
        let files = find_jsonl_files(Path::new("/tmp/does-not-exist-vehicle-etl-xyz"));
        assert!(files.is_empty());
    }

    // ── Round trip ────────────────────────────────────────────────────────────

    #[test]
    fn test_write_then_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("raw").join("out.jsonl");
        let records = vec![
            record(json!({"gnss": {"lat": 37.4, "lon": -122.1}, "id": 1})),
            record(json!({"IMU": {"ax": 2.0, "note": "ünïcode"}})),
            record(json!({"can": {"speed_kph": null}, "tags": [1, 2, 3]})),
        ];

        let written = write_jsonl(records.clone(), &path).unwrap();
        assert_eq!(written, 3);

        let back: Vec<RawRecord> = read_jsonl(&path)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn test_round_trip_preserves_full_precision_floats() {
        // Deterministic LCG spread over [-180, 180), the range of lat/lon.
        let mut state: u64 = 0x2545_F491_4F6C_DD1D;
        let mut values = vec![-116.83361554809613, 37.77492912345678, 1e-300, f64::MAX];
        for _ in 0..20_000 {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            let unit = (state >> 11) as f64 / (1u64 << 53) as f64;
            values.push(unit * 360.0 - 180.0);
        }

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("floats.jsonl");
        let records: Vec<RawRecord> = values.iter().map(|v| record(json!({"v": v}))).collect();
        write_jsonl(records.clone(), &path).unwrap();

        let back: Vec<RawRecord> = read_jsonl(&path).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(back.len(), records.len());
        for (wrote, read) in records.iter().zip(&back) {
            assert_eq!(wrote, read);
            assert_eq!(
                wrote["v"].as_f64().unwrap().to_bits(),
                read["v"].as_f64().unwrap().to_bits()
            );
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_failure_reports_file_write() {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        let mut writer = RawWriter::create(full).unwrap();
        // Larger than the BufWriter capacity, so serialization itself hits the device.
        let big = record(json!({"blob": "x".repeat(64 * 1024)}));

        let err = match writer.append(&big) {
            Err(e) => e,
            Ok(()) => writer.finish().unwrap_err(),
        };
        match err {
            EtlError::FileWrite { path, .. } => assert_eq!(path, full),
            other => panic!("expected FileWrite, got {:?}", other),
        }
    }

    #[test]
    fn test_write_truncates_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = write_lines(dir.path(), "raw.jsonl", &["{\"old\": true}", "{\"old\": true}"]);

        write_jsonl(vec![record(json!({"new": 1}))], &path).unwrap();

        let back: Vec<RawRecord> = read_jsonl(&path).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(back, vec![record(json!({"new": 1}))]);
    }

    #[test]
    fn test_writer_counts_records() {
        let dir = TempDir::new().unwrap();
        let mut writer = RawWriter::create(&dir.path().join("w.jsonl")).unwrap();
        writer.append(&record(json!({"a": 1}))).unwrap();
        writer.append(&record(json!({"b": 2}))).unwrap();
        assert_eq!(writer.count(), 2);
        assert_eq!(writer.finish().unwrap(), 2);
    }

    // ── Reading ───────────────────────────────────────────────────────────────

    #[test]
    fn test_read_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = write_lines(dir.path(), "raw.jsonl", &["{\"a\": 1}", "", "   ", "{\"b\": 2}"]);
        let back: Vec<RawRecord> = read_jsonl(&path).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn test_read_malformed_line_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write_lines(dir.path(), "raw.jsonl", &["{\"a\": 1}", "{not json", "{\"b\": 2}"]);

        let results: Vec<Result<RawRecord>> = read_jsonl(&path).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        match &results[1] {
            Err(EtlError::MalformedRaw { line, .. }) => assert_eq!(*line, 2),
            other => panic!("expected MalformedRaw, got {:?}", other),
        }
    }

    #[test]
    fn test_read_non_object_line_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write_lines(dir.path(), "raw.jsonl", &["[1, 2, 3]"]);
        let err = read_jsonl(&path).unwrap().next().unwrap().unwrap_err();
        assert!(err.to_string().contains("expected a JSON object, found an array"));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_jsonl(&dir.path().join("absent.jsonl")).err().unwrap();
        assert!(matches!(err, EtlError::FileRead { .. }));
    }
}
