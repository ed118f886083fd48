//! Document records and identifiers.

use super::EntityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned key of a document record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(i64);

impl DocumentId {
    /// Creates a document ID from a raw store key.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw store key.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Returns the zero-padded stem used for blob file names (`0000042`).
    #[must_use]
    pub fn file_stem(self) -> String {
        format!("{:07}", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the original and thumbnail blobs are written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Blobs are stored as-is.
    #[default]
    Plain,
    /// Blobs are encrypted before they reach disk.
    Encrypted,
}

impl StorageMode {
    /// Returns the persisted string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "unencrypted",
            Self::Encrypted => "encrypted",
        }
    }

    /// Parses the persisted string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unencrypted" | "plain" => Some(Self::Plain),
            "encrypted" | "gpg" => Some(Self::Encrypted),
            _ => None,
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted document.
///
/// Owned by the store once created. The pipeline never modifies a record
/// after handing it over, and the tag set is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned key.
    pub id: DocumentId,
    /// SHA-256 of the untouched original bytes (hex). Unique across all documents.
    pub checksum: String,
    /// Title from the filename, if any.
    pub title: Option<String>,
    /// Extracted text.
    pub content: String,
    /// Normalized file extension (`pdf`, `jpg`, `tiff`, ...).
    pub file_type: String,
    /// Assigned correspondent.
    pub correspondent: Option<EntityId>,
    /// Assigned tags, sorted by ID.
    pub tags: Vec<EntityId>,
    /// Creation date of the document itself.
    pub created: DateTime<Utc>,
    /// When the record was stored.
    pub added: DateTime<Utc>,
    /// Storage mode of the blobs.
    pub storage_mode: StorageMode,
    /// Page count reported by the backend.
    pub page_count: Option<u32>,
    /// SHA-256 of the archived rendition (hex), if the backend produced one.
    pub archive_checksum: Option<String>,
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let created = self.created.format("%Y%m%d%H%M%S");
        match &self.title {
            Some(title) => write!(f, "{created}: {title}"),
            None => write!(f, "{created}"),
        }
    }
}

/// A document that has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewDocument {
    /// SHA-256 of the original bytes.
    pub checksum: String,
    /// Title from the filename.
    pub title: Option<String>,
    /// Extracted text.
    pub content: String,
    /// Normalized extension.
    pub file_type: String,
    /// Correspondent to link.
    pub correspondent: Option<EntityId>,
    /// Tags to link in the same transaction as the record.
    pub tags: Vec<EntityId>,
    /// Resolved creation date.
    pub created: DateTime<Utc>,
    /// Storage mode of the blobs.
    pub storage_mode: StorageMode,
    /// Page count reported by the backend.
    pub page_count: Option<u32>,
    /// SHA-256 of the archived rendition, if any.
    pub archive_checksum: Option<String>,
}
