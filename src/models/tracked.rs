//! File identities tracked across watch cycles.

use std::path::PathBuf;
use std::time::SystemTime;

/// Identity of a file on disk: any change to path, mtime or size is a new identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    /// Absolute path.
    pub path: PathBuf,
    /// Last modification time.
    pub modified: SystemTime,
    /// Size in bytes.
    pub size: u64,
}

/// Where a file stands in the stability lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackState {
    /// First seen, or changed since the previous cycle.
    New,
    /// Unchanged since the previous cycle; safe to ingest.
    Candidate,
    /// A previous attempt failed; skipped until the identity changes.
    Ignored,
}

/// A file observed during a watch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    /// The file's identity at scan time.
    pub identity: FileIdentity,
    /// Lifecycle state assigned by the scan.
    pub state: TrackState,
}

impl TrackedFile {
    /// Returns the file path.
    #[must_use]
    pub const fn path(&self) -> &PathBuf {
        &self.identity.path
    }
}
