//! Streaming record sources.
//!
//! A [`RecordSource`] opens a lazy, possibly unbounded sequence of raw
//! records for a `(source_id, split)` pair. Nothing is materialized up front:
//! the HTTP source fetches one page at a time and the local source reads one
//! line at a time.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use etl_core::error::{EtlError, Result};
use etl_core::models::RawRecord;
use etl_core::settings::Settings;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::raw::{find_jsonl_files, RawReader};

/// Boxed lazy record sequence.
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<RawRecord>> + 'a>;

/// Anything that can stream raw records for a dataset split.
pub trait RecordSource {
    fn open_stream(&self, source_id: &str, split: &str) -> Result<RecordStream<'_>>;
}

/// Pick a source for `settings.dataset`: an existing local path is read as
/// JSONL, anything else is treated as a datasets-server dataset name.
pub fn open_source(settings: &Settings) -> Result<Box<dyn RecordSource>> {
    if Path::new(&settings.dataset).exists() {
        info!("Using local JSONL source at {}", settings.dataset);
        Ok(Box::new(JsonlDirSource))
    } else {
        Ok(Box::new(DatasetsServerSource::new(
            &settings.datasets_server_url,
            &settings.dataset_config,
            settings.page_size,
        )?))
    }
}

// ── DatasetsServerSource ──────────────────────────────────────────────────────

/// Upper bound the datasets-server accepts for `length`.
pub const MAX_PAGE_SIZE: u32 = 100;

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Pages through the Hugging Face datasets-server `/rows` endpoint.
pub struct DatasetsServerSource {
    client: reqwest::blocking::Client,
    base_url: String,
    config: String,
    page_size: u32,
}

/// One page of the `/rows` response. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
pub struct RowsPage {
    #[serde(default)]
    pub rows: Vec<PageRow>,
    pub num_rows_total: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PageRow {
    pub row_idx: Option<u64>,
    pub row: Value,
}

impl DatasetsServerSource {
    pub fn new(base_url: &str, config: &str, page_size: u32) -> Result<Self> {
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(EtlError::Config(format!(
                "page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, page_size
            )));
        }
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("vehicle-etl/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| EtlError::SourceUnavailable(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            config: config.to_string(),
            page_size,
        })
    }

    fn rows_url(&self) -> String {
        format!("{}/rows", self.base_url)
    }

    fn fetch_page(&self, dataset: &str, split: &str, offset: u64) -> Result<RowsPage> {
        let url = self.rows_url();
        debug!(
            "Fetching {} dataset={} split={} offset={} length={}",
            url, dataset, split, offset, self.page_size
        );

        let offset_param = offset.to_string();
        let length_param = self.page_size.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("dataset", dataset),
                ("config", self.config.as_str()),
                ("split", split),
                ("offset", offset_param.as_str()),
                ("length", length_param.as_str()),
            ])
            .send()
            .map_err(|e| EtlError::SourceUnavailable(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EtlError::SourceUnavailable(format!(
                "GET {} returned HTTP {}",
                url, status
            )));
        }

        let body = response
            .text()
            .map_err(|e| EtlError::SourceUnavailable(format!("reading {}: {}", url, e)))?;
        parse_page(&body)
    }
}

/// Decode a `/rows` response body.
pub fn parse_page(body: &str) -> Result<RowsPage> {
    serde_json::from_str(body)
        .map_err(|e| EtlError::SourceUnavailable(format!("undecodable rows page: {}", e)))
}

impl RecordSource for DatasetsServerSource {
    fn open_stream(&self, source_id: &str, split: &str) -> Result<RecordStream<'_>> {
        info!(
            "Streaming {} (config={}, split={}) from {}",
            source_id, self.config, split, self.base_url
        );
        Ok(Box::new(RowsPager {
            source: self,
            dataset: source_id.to_string(),
            split: split.to_string(),
            offset: 0,
            total: None,
            buffer: VecDeque::new(),
            done: false,
        }))
    }
}

/// Lazy page-by-page iterator over a datasets-server split.
struct RowsPager<'a> {
    source: &'a DatasetsServerSource,
    dataset: String,
    split: String,
    offset: u64,
    total: Option<u64>,
    buffer: VecDeque<RawRecord>,
    done: bool,
}

impl RowsPager<'_> {
    fn exhausted(&self) -> bool {
        matches!(self.total, Some(total) if self.offset >= total)
    }

    fn refill(&mut self) -> Result<()> {
        let page = self
            .source
            .fetch_page(&self.dataset, &self.split, self.offset)?;
        if page.num_rows_total.is_some() {
            self.total = page.num_rows_total;
        }
        if page.rows.is_empty() {
            self.done = true;
            return Ok(());
        }

        self.offset += page.rows.len() as u64;
        for PageRow { row_idx, row } in page.rows {
            match row {
                Value::Object(map) => self.buffer.push_back(map),
                _ => warn!("Skipping non-object row {:?} in {}", row_idx, self.dataset),
            }
        }
        Ok(())
    }
}

impl Iterator for RowsPager<'_> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(Ok(record));
            }
            if self.done || self.exhausted() {
                return None;
            }
            if let Err(e) = self.refill() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}

// ── JsonlDirSource ────────────────────────────────────────────────────────────

/// Reads records from local JSONL files.
///
/// `source_id` is a path. A file is read as-is. For a directory the split
/// resolves to `<dir>/<split>.jsonl`, falling back to every `*.jsonl` file
/// under `<dir>/<split>/`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonlDirSource;

impl JsonlDirSource {
    pub fn resolve_files(source_id: &str, split: &str) -> Result<Vec<PathBuf>> {
        let root = PathBuf::from(source_id);
        if root.is_file() {
            return Ok(vec![root]);
        }
        if !root.is_dir() {
            return Err(EtlError::SourceUnavailable(format!(
                "local source {} does not exist",
                root.display()
            )));
        }

        let split_file = root.join(format!("{}.jsonl", split));
        if split_file.is_file() {
            return Ok(vec![split_file]);
        }

        let files = find_jsonl_files(&root.join(split));
        if files.is_empty() {
            return Err(EtlError::SourceUnavailable(format!(
                "no JSONL data for split \"{}\" under {}",
                split,
                root.display()
            )));
        }
        Ok(files)
    }
}

impl RecordSource for JsonlDirSource {
    fn open_stream(&self, source_id: &str, split: &str) -> Result<RecordStream<'_>> {
        let files = Self::resolve_files(source_id, split)?;
        debug!("JsonlDirSource: {} file(s) for split {}", files.len(), split);
        Ok(Box::new(JsonlFiles {
            pending: files.into(),
            current: None,
        }))
    }
}

/// Chains [`RawReader`]s over several files, opening each only when needed.
struct JsonlFiles {
    pending: VecDeque<PathBuf>,
    current: Option<RawReader>,
}

impl Iterator for JsonlFiles {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(reader) = self.current.as_mut() {
                match reader.next() {
                    Some(Ok(record)) => return Some(Ok(record)),
                    Some(Err(e)) => {
                        self.pending.clear();
                        self.current = None;
                        return Some(Err(EtlError::SourceUnavailable(e.to_string())));
                    }
                    None => self.current = None,
                }
            }

            let path = self.pending.pop_front()?;
            match RawReader::open(&path) {
                Ok(reader) => self.current = Some(reader),
                Err(e) => {
                    self.pending.clear();
                    return Some(Err(EtlError::SourceUnavailable(e.to_string())));
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
