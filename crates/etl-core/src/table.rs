//! In-memory tabular containers and CSV persistence.
//!
//! [`ModalityTable`] is the typed, fixed-schema container built during
//! normalization. [`Frame`] is the schema-on-read view used when a stage reads
//! a persisted CSV back and cannot assume which columns exist.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{EtlError, Result};
use crate::models::{NullRowPolicy, SensorRow, TableSchema};

// ── ModalityTable ─────────────────────────────────────────────────────────────

/// Ordered rows of a single modality.
#[derive(Debug, Clone, PartialEq)]
pub struct ModalityTable<R> {
    rows: Vec<R>,
}

impl<R> Default for ModalityTable<R> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<R: SensorRow> ModalityTable<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: R) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column schema, present even when the table has no rows.
    pub fn columns(&self) -> &'static [&'static str] {
        R::COLUMNS
    }

    /// Remove rows that are null under `policy`, returning how many were dropped.
    pub fn drop_null_rows(&mut self, policy: NullRowPolicy) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| !row.is_null_under(policy));
        before - self.rows.len()
    }
}

impl<R> FromIterator<R> for ModalityTable<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

// ── Grouping and reduction ────────────────────────────────────────────────────

/// Group `items` by `key_fn`, skipping items for which it returns `None`.
///
/// Groups come back ordered by key; items keep their input order within a group.
pub fn group_by<T, K, I, F>(items: I, key_fn: F) -> BTreeMap<K, Vec<T>>
where
    I: IntoIterator<Item = T>,
    K: Ord,
    F: Fn(&T) -> Option<K>,
{
    let mut groups: BTreeMap<K, Vec<T>> = BTreeMap::new();
    for item in items {
        if let Some(key) = key_fn(&item) {
            groups.entry(key).or_default().push(item);
        }
    }
    groups
}

/// Named reductions over a column of nullable numbers.
///
/// Nulls are skipped by `mean` and `max`.
pub struct Reduce;

impl Reduce {
    /// Arithmetic mean of the non-null values, `None` if there are none.
    pub fn mean<I: IntoIterator<Item = Option<f64>>>(values: I) -> Option<f64> {
        let (sum, count) = values
            .into_iter()
            .flatten()
            .fold((0.0_f64, 0u64), |(sum, count), v| (sum + v, count + 1));
        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }

    /// Largest non-null value.
    pub fn max<I: IntoIterator<Item = Option<f64>>>(values: I) -> Option<f64> {
        values.into_iter().flatten().reduce(f64::max)
    }

    /// Number of non-null values satisfying `pred`.
    pub fn count_where<I, P>(values: I, pred: P) -> u64
    where
        I: IntoIterator<Item = Option<f64>>,
        P: Fn(f64) -> bool,
    {
        values.into_iter().flatten().filter(|v| pred(*v)).count() as u64
    }

    /// Share of *all* values (nulls included, counted as failing) satisfying
    /// `pred`. `None` for an empty input.
    pub fn fraction_where<I, P>(values: I, pred: P) -> Option<f64>
    where
        I: IntoIterator<Item = Option<f64>>,
        P: Fn(f64) -> bool,
    {
        let (hits, total) = values.into_iter().fold((0u64, 0u64), |(hits, total), v| {
            let hit = v.map(&pred).unwrap_or(false);
            (hits + u64::from(hit), total + 1)
        });
        if total == 0 {
            None
        } else {
            Some(hits as f64 / total as f64)
        }
    }
}

// ── Frame ─────────────────────────────────────────────────────────────────────

/// A CSV table read without an expected schema. Every cell is text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Frame {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Build from string slices (handy for tests and fixtures).
    pub fn from_strs(columns: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    /// Read a CSV file with a header row. A missing file reads as an empty
    /// frame with no columns.
    pub fn read_csv(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Frame: {} does not exist, using empty frame", path.display());
            return Ok(Self::default());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cells of column `name`, one per row. Short rows yield `""`.
    /// `None` when the column does not exist.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }
}

// ── CSV writing ───────────────────────────────────────────────────────────────

/// Write `rows` as CSV with a header row taken from `R::COLUMNS`.
///
/// The header is written even for an empty slice, so downstream readers always
/// see the full schema. Parent directories are created as needed.
pub fn write_csv<R: TableSchema>(rows: &[R], path: &Path) -> Result<PathBuf> {
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

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::new(file));

    writer.write_record(R::COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|source| EtlError::FileWrite {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(path.to_path_buf())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
