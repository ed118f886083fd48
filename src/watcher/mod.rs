//! Stability watcher.
//!
//! A file is only handed to the pipeline once it has been seen with the same
//! identity (path, mtime, size) on two consecutive cycles. Each cycle takes the
//! previous [`WatchState`] and returns the next one, so the watcher itself
//! holds no mutable state.
//!
//! | Seen before as | Same identity now | Result |
//! |----------------|-------------------|--------|
//! | nothing        | -                 | pending |
//! | pending        | yes               | candidate (attempt now) |
//! | ignored        | yes               | ignored (skip) |
//! | anything       | no                | pending |

use crate::models::{FileIdentity, TrackState, TrackedFile};
use crate::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The intake directory and its reserved holding areas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeLayout {
    /// Watched directory.
    pub root: PathBuf,
    /// Sources of ingested documents under the `move` policy.
    pub processed: PathBuf,
    /// Files that failed ingestion.
    pub ignored: PathBuf,
    /// Files whose content was already stored.
    pub duplicate: PathBuf,
}

impl IntakeLayout {
    /// Derives the layout for an intake directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            processed: root.join("processed"),
            ignored: root.join("ignored"),
            duplicate: root.join("duplicate"),
            root,
        }
    }

    /// Returns true for the reserved holding areas.
    #[must_use]
    pub fn is_reserved(&self, path: &Path) -> bool {
        [&self.processed, &self.ignored, &self.duplicate]
            .iter()
            .any(|reserved| path.starts_with(reserved))
    }

    /// Creates the reserved holding areas.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn ensure(&self) -> Result<()> {
        for dir in [&self.processed, &self.ignored, &self.duplicate] {
            fs::create_dir_all(dir).map_err(|e| Error::io("create_intake_dir", dir, &e))?;
        }
        Ok(())
    }
}

/// Identities carried from one cycle to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchState {
    pending: HashSet<FileIdentity>,
    ignored: HashSet<FileIdentity>,
}

impl WatchState {
    /// Moves a failed candidate into the ignore set.
    ///
    /// The identity stays ignored until the file changes or disappears.
    pub fn mark_failed(&mut self, identity: &FileIdentity) {
        self.pending.remove(identity);
        self.ignored.insert(identity.clone());
    }

    /// Returns true if the identity is in the ignore set.
    #[must_use]
    pub fn is_ignored(&self, identity: &FileIdentity) -> bool {
        self.ignored.contains(identity)
    }

    /// Identities awaiting a stability check or an attempt.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Identities that failed and are being skipped.
    #[must_use]
    pub fn ignored_len(&self) -> usize {
        self.ignored.len()
    }
}

/// Partition of one directory scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Stable files to attempt now, oldest modification time first.
    pub candidates: Vec<TrackedFile>,
    /// New or changed files.
    pub pending: Vec<TrackedFile>,
    /// Files skipped because the same identity failed before.
    pub ignored: Vec<TrackedFile>,
}

impl CycleReport {
    /// Number of files seen by the scan.
    #[must_use]
    pub fn total(&self) -> usize {
        self.candidates.len() + self.pending.len() + self.ignored.len()
    }
}

/// Lists the intake directory and applies the stability rule.
#[derive(Debug, Clone)]
pub struct StabilityWatcher {
    layout: IntakeLayout,
}

impl StabilityWatcher {
    /// Creates a watcher for the given layout.
    #[must_use]
    pub const fn new(layout: IntakeLayout) -> Self {
        Self { layout }
    }

    /// Returns the intake layout.
    #[must_use]
    pub const fn layout(&self) -> &IntakeLayout {
        &self.layout
    }

    /// Scans the intake directory once.
    ///
    /// # Errors
    ///
    /// Returns an error if the intake directory itself cannot be listed.
    /// Problems with single entries are logged and the entry is skipped.
    pub fn scan(&self, previous: &WatchState) -> Result<(CycleReport, WatchState)> {
        let entries = self.list()?;
        Ok(partition(entries, previous))
    }

    fn list(&self) -> Result<Vec<FileIdentity>> {
        let root = &self.layout.root;
        let read_dir = fs::read_dir(root).map_err(|e| Error::io("scan_intake", root, &e))?;

        let mut identities = Vec::new();
        for entry in read_dir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(dir = %root.display(), error = %e, "Skipping unreadable entry");
                    continue;
                },
            };
            let path = entry.path();
            if self.layout.is_reserved(&path) || is_hidden(&path) {
                continue;
            }
            if let Some(identity) = identify(&path) {
                identities.push(identity);
            }
        }
        Ok(identities)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Reads the identity of one entry; `None` means skip it this cycle.
fn identify(path: &Path) -> Option<FileIdentity> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Entry vanished during scan");
            return None;
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot stat entry, skipping");
            return None;
        },
    };

    if !metadata.is_file() {
        tracing::warn!(path = %path.display(), "Not a regular file, skipping");
        return None;
    }
    if metadata.len() == 0 {
        tracing::debug!(path = %path.display(), "Zero-byte file, waiting for content");
        return None;
    }

    let modified = match metadata.modified() {
        Ok(modified) => modified,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "No modification time, skipping");
            return None;
        },
    };

    Some(FileIdentity {
        path: path.to_path_buf(),
        modified,
        size: metadata.len(),
    })
}

/// Applies the stability rule to a listing.
///
/// Every listed identity lands in exactly one of the three report lists.
/// The next state remembers candidates and pending files as pending, and
/// keeps only ignored identities that are still present.
#[must_use]
pub fn partition(entries: Vec<FileIdentity>, previous: &WatchState) -> (CycleReport, WatchState) {
    let mut report = CycleReport::default();
    let mut next = WatchState::default();

    for identity in entries {
        let state = if previous.ignored.contains(&identity) {
            TrackState::Ignored
        } else if previous.pending.contains(&identity) {
            TrackState::Candidate
        } else {
            TrackState::New
        };

        match state {
            TrackState::Ignored => {
                next.ignored.insert(identity.clone());
            },
            TrackState::Candidate | TrackState::New => {
                next.pending.insert(identity.clone());
            },
        }

        let tracked = TrackedFile { identity, state };
        match state {
            TrackState::Ignored => report.ignored.push(tracked),
            TrackState::Candidate => report.candidates.push(tracked),
            TrackState::New => report.pending.push(tracked),
        }
    }

    report.candidates.sort_by(|a, b| {
        a.identity
            .modified
            .cmp(&b.identity.modified)
            .then_with(|| a.identity.path.cmp(&b.identity.path))
    });

    (report, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn identity(name: &str, secs: u64, size: u64) -> FileIdentity {
        FileIdentity {
            path: PathBuf::from("/in").join(name),
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
            size,
        }
    }

    #[test]
    fn test_new_file_becomes_candidate_after_one_cycle() {
        let a = identity("a.pdf", 10, 100);

        let (report, state) = partition(vec![a.clone()], &WatchState::default());
        assert_eq!(report.pending.len(), 1);
        assert!(report.candidates.is_empty());

        let (report, _) = partition(vec![a.clone()], &state);
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].identity, a);
        assert_eq!(report.candidates[0].state, TrackState::Candidate);
    }

    #[test]
    fn test_changed_size_resets_to_pending() {
        let (_, state) = partition(vec![identity("a.pdf", 10, 100)], &WatchState::default());
        let (report, _) = partition(vec![identity("a.pdf", 10, 200)], &state);
        assert_eq!(report.pending.len(), 1);
        assert!(report.candidates.is_empty());
    }

    #[test]
    fn test_failed_identity_stays_ignored_until_changed() {
        let a = identity("a.pdf", 10, 100);
        let (_, mut state) = partition(vec![a.clone()], &WatchState::default());
        state.mark_failed(&a);
        assert!(state.is_ignored(&a));
        assert_eq!(state.pending_len(), 0);

        let (report, state) = partition(vec![a.clone()], &state);
        assert_eq!(report.ignored.len(), 1);
        let (report, state) = partition(vec![a], &state);
        assert_eq!(report.ignored.len(), 1);

        let edited = identity("a.pdf", 20, 100);
        let (report, _) = partition(vec![edited], &state);
        assert_eq!(report.pending.len(), 1);
        assert!(report.ignored.is_empty());
    }

    #[test]
    fn test_vanished_identity_is_forgotten() {
        let a = identity("a.pdf", 10, 100);
        let (_, mut state) = partition(vec![a.clone()], &WatchState::default());
        state.mark_failed(&a);

        let (_, state) = partition(Vec::new(), &state);
        assert_eq!(state.ignored_len(), 0);

        let (report, _) = partition(vec![a], &state);
        assert_eq!(report.pending.len(), 1);
    }

    #[test]
    fn test_candidates_sorted_oldest_first() {
        let files = vec![
            identity("c.pdf", 30, 1),
            identity("a.pdf", 10, 1),
            identity("b.pdf", 20, 1),
        ];
        let (_, state) = partition(files.clone(), &WatchState::default());
        let (report, _) = partition(files, &state);
        let names: Vec<_> = report
            .candidates
            .iter()
            .map(|t| t.path().file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.pdf", "b.pdf", "c.pdf"]);
    }

    #[test]
    fn test_scan_skips_reserved_hidden_empty_and_dirs() {
        let dir = TempDir::new().unwrap();
        let layout = IntakeLayout::new(dir.path());
        layout.ensure().unwrap();
        fs::write(dir.path().join("doc.txt"), "hello").unwrap();
        fs::write(dir.path().join(".partial.txt"), "hello").unwrap();
        fs::write(dir.path().join("empty.txt"), "").unwrap();
        fs::write(layout.processed.join("old.txt"), "done").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let watcher = StabilityWatcher::new(layout);
        let (report, state) = watcher.scan(&WatchState::default()).unwrap();
        assert_eq!(report.total(), 1);
        assert_eq!(report.pending[0].path(), &dir.path().join("doc.txt"));
        assert_eq!(state.pending_len(), 1);

        let (report, _) = watcher.scan(&state).unwrap();
        assert_eq!(report.candidates.len(), 1);
    }

    #[test]
    fn test_scan_missing_root_is_error() {
        let watcher = StabilityWatcher::new(IntakeLayout::new("/definitely/not/here"));
        assert!(watcher.scan(&WatchState::default()).is_err());
    }

    #[test]
    fn test_reserved_paths() {
        let layout = IntakeLayout::new("/in");
        assert!(layout.is_reserved(Path::new("/in/processed/a.pdf")));
        assert!(layout.is_reserved(Path::new("/in/duplicate")));
        assert!(!layout.is_reserved(Path::new("/in/processed-a.pdf")));
    }
}
