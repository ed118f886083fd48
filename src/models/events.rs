//! Consumption event types for observers and audit.

use super::DocumentId;
use crate::current_timestamp;
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

/// Shared event metadata required for observability.
#[derive(Debug, Clone, Serialize)]
pub struct EventMeta {
    /// Unique identifier for this event.
    pub event_id: String,
    /// Correlation identifier of the ingestion attempt.
    pub correlation_id: Option<String>,
    /// Event source component.
    pub source: &'static str,
    /// Timestamp (Unix epoch seconds).
    pub timestamp: u64,
}

impl EventMeta {
    /// Creates new event metadata using the current timestamp.
    #[must_use]
    pub fn new(source: &'static str, correlation_id: Option<String>) -> Self {
        Self::with_timestamp(source, correlation_id, current_timestamp())
    }

    /// Creates new event metadata with a specified timestamp.
    #[must_use]
    pub fn with_timestamp(
        source: &'static str,
        correlation_id: Option<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            correlation_id,
            source,
            timestamp,
        }
    }
}

/// Events emitted while files move through the pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConsumptionEvent {
    /// Ingestion of a stable file began.
    Started {
        /// Event metadata.
        meta: EventMeta,
        /// The source file.
        path: PathBuf,
    },
    /// A document was stored.
    Finished {
        /// Event metadata.
        meta: EventMeta,
        /// The new document.
        document_id: DocumentId,
        /// Checksum of the original bytes.
        checksum: String,
        /// Title from the filename.
        title: Option<String>,
    },
    /// Ingestion of a file failed and the file was skipped.
    Failed {
        /// Event metadata.
        meta: EventMeta,
        /// The source file.
        path: PathBuf,
        /// Short failure label (`duplicate`, `no_backend`, ...).
        reason: &'static str,
    },
}

impl ConsumptionEvent {
    /// Returns the event type name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "consumption.started",
            Self::Finished { .. } => "consumption.finished",
            Self::Failed { .. } => "consumption.failed",
        }
    }

    /// Returns the event metadata.
    #[must_use]
    pub const fn meta(&self) -> &EventMeta {
        match self {
            Self::Started { meta, .. }
            | Self::Finished { meta, .. }
            | Self::Failed { meta, .. } => meta,
        }
    }

    /// Returns the timestamp of the event.
    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.meta().timestamp
    }
}
