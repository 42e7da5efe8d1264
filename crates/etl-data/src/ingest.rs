//! Bounded, projected streaming on top of a [`RecordSource`].

use etl_core::error::Result;
use etl_core::models::RawRecord;

use crate::source::RecordSource;

/// Stream records for `(source_id, split)`.
///
/// * `limit` – stop after this many records; `None` exhausts the source.
/// * `columns` – keep only these top-level keys. Keys requested but missing
///   from a sample are skipped, never null-filled.
///
/// Source failures surface as `Err` items (or an `Err` return when the source
/// cannot be opened at all). Nothing is retried here.
pub fn stream<'a>(
    source: &'a dyn RecordSource,
    source_id: &str,
    split: &str,
    limit: Option<u64>,
    columns: Option<&'a [String]>,
) -> Result<impl Iterator<Item = Result<RawRecord>> + 'a> {
    let inner = source.open_stream(source_id, split)?;
    let cap = limit
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);

    Ok(inner
        .map(move |item| item.map(|record| project(record, columns)))
        .take(cap))
}

/// Keep only the requested keys that are present in `record`.
///
/// `None` and an empty list both keep the whole record.
pub fn project(record: RawRecord, columns: Option<&[String]>) -> RawRecord {
    match columns {
        None => record,
        Some(cols) if cols.is_empty() => record,
        Some(cols) => {
            let mut record = record;
            cols.iter()
                .filter_map(|key| record.remove_entry(key.as_str()))
                .collect()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
