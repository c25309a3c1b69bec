//! Error types for account database parsing.
//!
//! Every parse error names the source it came from and the 1-based line
//! number, so a corrupted `/etc/group` can be fixed without guessing.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or parsing host account sources.
#[derive(Debug, Error)]
pub enum Error {
    /// A record has the wrong number of colon-separated fields
    #[error("{source_name}:{line}: expected {expected} fields, found {found}")]
    FieldCount {
        /// Logical name of the source (e.g. "passwd")
        source_name: &'static str,
        /// Line number of the malformed record (1-indexed)
        line: usize,
        /// Number of fields the record format requires
        expected: usize,
        /// Number of fields actually present
        found: usize,
    },

    /// A numeric field could not be parsed
    #[error("{source_name}:{line}: invalid {field} '{value}'")]
    InvalidNumber {
        /// Logical name of the source
        source_name: &'static str,
        /// Line number of the malformed record (1-indexed)
        line: usize,
        /// Name of the field that failed to parse
        field: &'static str,
        /// Raw value found in the record
        value: String,
    },

    /// A row of a quota report could not be understood
    #[error("quota report line {line}: {message}")]
    QuotaReport {
        /// Line number in the report output (1-indexed)
        line: usize,
        /// What was wrong with the row
        message: String,
    },

    /// A human-readable size string did not match the expected grammar
    #[error("invalid size string: {0}")]
    InvalidSize(String),

    /// A size string is well-formed but does not fit in 64 bits
    #[error("size string out of range: {0}")]
    SizeOverflow(String),

    /// IO error while reading a source
    #[error("failed to read {path}: {source}")]
    Io {
        /// File or directory that could not be read
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Wrap an IO error with the path that produced it.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error came from a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Result type for account database operations.
pub type Result<T> = std::result::Result<T, Error>;
