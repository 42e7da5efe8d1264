use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the ETL pipeline.
///
/// Only structural failures live here. Sparse or malformed sensor payloads
/// never produce an error; they degrade to null cells instead.
#[derive(Error, Debug)]
pub enum EtlError {
    /// The streaming source could not be reached or failed mid-stream.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file or directory could not be created or written.
    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A RAW layer line is not a JSON object.
    #[error("Malformed RAW record at {path}:{line}: {reason}")]
    MalformedRaw {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// A CSV document could not be read or written.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A JSON document could not be parsed or serialized.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the ETL crates.
pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_source_unavailable() {
        let err = EtlError::SourceUnavailable("HTTP 429 Too Many Requests".to_string());
        assert_eq!(
            err.to_string(),
            "Source unavailable: HTTP 429 Too Many Requests"
        );
    }

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = EtlError::FileRead {
            path: PathBuf::from("/data/raw/comma2k19_raw.jsonl"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/data/raw/comma2k19_raw.jsonl"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_error_display_file_write() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = EtlError::FileWrite {
            path: PathBuf::from("/readonly/gnss.csv"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to write file /readonly/gnss.csv"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_error_display_malformed_raw() {
        let err = EtlError::MalformedRaw {
            path: PathBuf::from("raw.jsonl"),
            line: 7,
            reason: "expected value at line 1 column 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed RAW record at raw.jsonl:7: expected value at line 1 column 1"
        );
    }

    #[test]
    fn test_error_display_config() {
        let err = EtlError::Config("page size must be between 1 and 100".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: page size must be between 1 and 100"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: EtlError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: EtlError = json_err.into();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}
