//! Removing sources from the intake directory.

use crate::config::DisposalPolicy;
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

const MAX_SUFFIX: u32 = 10_000;

/// Moves `source` into `target_dir` by copying and then deleting it.
///
/// Copy-then-delete works across filesystems. If a file with the same name is
/// already in `target_dir`, a numeric suffix is added (`scan_1.pdf`).
/// Returns the new path.
///
/// # Errors
///
/// Returns [`Error::Disposal`] if the copy or the delete fails. When the
/// delete fails, the copy is removed again so the file exists only once.
pub fn safe_move(source: &Path, target_dir: &Path) -> Result<PathBuf> {
    let fail = |cause: String| Error::Disposal {
        path: source.to_path_buf(),
        cause,
    };

    fs::create_dir_all(target_dir)
        .map_err(|e| fail(format!("create {}: {e}", target_dir.display())))?;
    let target = free_target(source, target_dir)
        .ok_or_else(|| fail(format!("no free name in {}", target_dir.display())))?;

    fs::copy(source, &target).map_err(|e| fail(format!("copy to {}: {e}", target.display())))?;
    if let Err(e) = fs::remove_file(source) {
        let _ = fs::remove_file(&target);
        return Err(fail(format!("remove source: {e}")));
    }

    tracing::debug!(
        from = %source.display(),
        to = %target.display(),
        "Moved file"
    );
    Ok(target)
}

fn free_target(source: &Path, target_dir: &Path) -> Option<PathBuf> {
    let name = source.file_name()?;
    let direct = target_dir.join(name);
    if !direct.exists() {
        return Some(direct);
    }

    let stem = source.file_stem()?.to_string_lossy();
    let ext = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (1..=MAX_SUFFIX)
        .map(|n| target_dir.join(format!("{stem}_{n}{ext}")))
        .find(|candidate| !candidate.exists())
}

/// Applies the disposal policy to an ingested source.
///
/// Returns the new location under [`DisposalPolicy::Move`], `None` after a delete.
///
/// # Errors
///
/// Returns [`Error::Disposal`] if the source cannot be moved or deleted.
pub fn dispose(source: &Path, policy: DisposalPolicy, processed: &Path) -> Result<Option<PathBuf>> {
    match policy {
        DisposalPolicy::Move => safe_move(source, processed).map(Some),
        DisposalPolicy::Delete => {
            fs::remove_file(source).map_err(|e| Error::Disposal {
                path: source.to_path_buf(),
                cause: e.to_string(),
            })?;
            tracing::debug!(path = %source.display(), "Deleted source");
            Ok(None)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_safe_move_copies_then_deletes() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("scan.pdf");
        fs::write(&source, b"pdf").unwrap();

        let target = safe_move(&source, &dir.path().join("processed")).unwrap();
        assert!(!source.exists());
        assert_eq!(fs::read(target).unwrap(), b"pdf");
    }

    #[test]
    fn test_safe_move_suffixes_clashing_names() {
        let dir = TempDir::new().unwrap();
        let processed = dir.path().join("processed");
        fs::create_dir(&processed).unwrap();
        fs::write(processed.join("scan.pdf"), b"old").unwrap();
        fs::write(processed.join("scan_1.pdf"), b"older").unwrap();
        let source = dir.path().join("scan.pdf");
        fs::write(&source, b"new").unwrap();

        let target = safe_move(&source, &processed).unwrap();
        assert_eq!(target, processed.join("scan_2.pdf"));
        assert_eq!(fs::read(processed.join("scan.pdf")).unwrap(), b"old");
    }

    #[test]
    fn test_missing_source_is_disposal_error() {
        let dir = TempDir::new().unwrap();
        let err = safe_move(&dir.path().join("gone.pdf"), dir.path()).unwrap_err();
        assert!(matches!(err, Error::Disposal { .. }));

        let err = dispose(
            &dir.path().join("gone.pdf"),
            DisposalPolicy::Delete,
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Disposal { .. }));
    }

    #[test]
    fn test_dispose_delete() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, b"a").unwrap();
        assert_eq!(
            dispose(&source, DisposalPolicy::Delete, dir.path()).unwrap(),
            None
        );
        assert!(!source.exists());
    }
}
