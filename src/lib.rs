//! # Papertray
//!
//! A document intake pipeline.
//!
//! Papertray watches a drop folder, waits for files to settle, reads identity
//! metadata from their filenames, extracts text through a pluggable backend,
//! tags them by content, and stores each one exactly once as a document record
//! with its original bytes (optionally encrypted at rest).
//!
//! ## Pipeline
//!
//! ```text
//! StabilityWatcher ─▶ ContentHasher ─▶ dedup ─▶ BackendRegistry ─▶ Extractor
//!                                                                     │
//!        observers ◀─ disposal ◀─ DocumentStore + BlobStore ◀─ matching ◀─ FilenameParser
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use papertray::config::PapertrayConfig;
//! use papertray::services::Consumer;
//! use papertray::watcher::WatchState;
//!
//! let config = PapertrayConfig::load_default();
//! let consumer = Consumer::from_config(&config)?;
//!
//! let mut state = WatchState::default();
//! loop {
//!     let (summary, next) = consumer.run_cycle(state)?;
//!     state = next;
//!     std::thread::sleep(config.poll_interval);
//! }
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;
use thiserror::Error as ThisError;

// Module declarations
pub mod backends;
pub mod config;
pub mod filename;
pub mod matching;
pub mod models;
pub mod observability;
pub mod security;
pub mod services;
pub mod storage;
pub mod watcher;

// Re-exports for convenience
pub use backends::{BackendCapability, BackendRegistry, Extractor};
pub use config::{DisposalPolicy, PapertrayConfig};
pub use filename::FilenameParser;
pub use matching::match_entities;
pub use models::{
    Correspondent, Document, DocumentId, ExtractedMetadata, MatchRule, MatchingAlgorithm,
    StorageMode, Tag,
};
pub use observability::{ConsumptionObserver, EventBus};
pub use services::{Consumer, ContentHasher};
pub use storage::{BlobStore, DocumentStore, SqliteDocumentStore};
pub use watcher::{StabilityWatcher, WatchState};

/// Error type for papertray operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When | Scope |
/// |---------|-------------|-------|
/// | `Configuration` | No intake directory, no backends, bad transform or match rule | Fatal at startup |
/// | `Extraction` | A backend fails to produce text, thumbnail, date or page count | One file |
/// | `NoBackend` | No registered capability accepts the file | One file |
/// | `Duplicate` | The checksum of the original bytes is already stored | One file, never retried |
/// | `Disposal` | Moving or deleting the source after success fails | Logged only |
/// | `UnrecognizedFilename` | No filename grammar matches the basename | One file |
/// | `OperationFailed` | Store, filesystem or crypto failures | Caller decides |
/// | `InvalidInput` | Malformed input such as truncated ciphertext | Caller decides |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid configuration.
    ///
    /// Raised when:
    /// - The consumption directory is unset or does not exist
    /// - No extraction backend is registered
    /// - A filename transform is not a valid regular expression
    /// - A match rule uses an unsupported algorithm code or an invalid regex
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A backend failed to extract data from a file.
    #[error("extraction with '{backend}' failed: {cause}")]
    Extraction {
        /// Backend name.
        backend: String,
        /// The underlying cause.
        cause: String,
    },

    /// No backend accepted the file.
    #[error("no backend can handle {}", path.display())]
    NoBackend {
        /// The rejected file.
        path: PathBuf,
    },

    /// The file content was already ingested.
    #[error("duplicate of an existing document (checksum {checksum})")]
    Duplicate {
        /// Checksum of the original bytes.
        checksum: String,
    },

    /// The source file could not be moved or deleted after a successful ingestion.
    #[error("could not dispose of {}: {cause}", path.display())]
    Disposal {
        /// The source file.
        path: PathBuf,
        /// The underlying cause.
        cause: String,
    },

    /// The filename matched none of the known grammars.
    #[error("unrecognized filename: {0}")]
    UnrecognizedFilename(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` statements or transactions fail
    /// - Filesystem I/O errors occur
    /// - Encryption or decryption fails
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Returns true for failures confined to the file being ingested.
    ///
    /// These never abort a watch cycle; the file is skipped and the loop moves on.
    #[must_use]
    pub const fn is_per_file(&self) -> bool {
        matches!(
            self,
            Self::Extraction { .. }
                | Self::NoBackend { .. }
                | Self::Duplicate { .. }
                | Self::Disposal { .. }
                | Self::UnrecognizedFilename(_)
                | Self::OperationFailed { .. }
                | Self::InvalidInput(_)
        )
    }

    /// Short label used for log fields and metric dimensions.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Extraction { .. } => "extraction",
            Self::NoBackend { .. } => "no_backend",
            Self::Duplicate { .. } => "duplicate",
            Self::Disposal { .. } => "disposal",
            Self::UnrecognizedFilename(_) => "unrecognized_filename",
            Self::OperationFailed { .. } => "operation_failed",
            Self::InvalidInput(_) => "invalid_input",
        }
    }

    /// Builds an `OperationFailed` from an I/O error.
    pub(crate) fn io(operation: &str, path: &std::path::Path, err: &std::io::Error) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: format!("{}: {err}", path.display()),
        }
    }
}

/// Result type alias for papertray operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Configuration("no backends".to_string());
        assert_eq!(err.to_string(), "configuration error: no backends");

        let err = Error::Extraction {
            backend: "text".to_string(),
            cause: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "extraction with 'text' failed: boom");

        let err = Error::NoBackend {
            path: PathBuf::from("/in/a.xyz"),
        };
        assert_eq!(err.to_string(), "no backend can handle /in/a.xyz");

        let err = Error::Duplicate {
            checksum: "abc".to_string(),
        };
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_configuration_is_not_per_file() {
        assert!(!Error::Configuration("x".into()).is_per_file());
        assert!(Error::UnrecognizedFilename("x".into()).is_per_file());
        assert!(
            Error::Duplicate {
                checksum: "c".into()
            }
            .is_per_file()
        );
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(
            Error::NoBackend {
                path: PathBuf::new()
            }
            .reason(),
            "no_backend"
        );
        assert_eq!(Error::InvalidInput(String::new()).reason(), "invalid_input");
    }
}
