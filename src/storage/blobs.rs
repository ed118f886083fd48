//! Original, thumbnail and archive blob files under the media root.

use crate::models::{Document, DocumentId, StorageMode};
use crate::security::Crypto;
use crate::storage::sqlite::timed;
use crate::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const BACKEND: &str = "filesystem";
const ENCRYPTED_SUFFIX: &str = "enc";
const AREAS: [&str; 3] = ["originals", "thumbnails", "archive"];
const ARCHIVE_EXTENSION: &str = "pdf";

/// Paths of the blobs written for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlobs {
    /// The original file.
    pub original: PathBuf,
    /// The thumbnail.
    pub thumbnail: PathBuf,
    /// The archived rendition, if one was written.
    pub archive: Option<PathBuf>,
}

/// Writes document blobs to `originals/`, `thumbnails/` and `archive/`.
///
/// Every write goes to a temporary file in the target directory and is then
/// renamed into place. In encrypted mode the bytes are encrypted in memory
/// first, so plaintext never touches the media root.
pub struct BlobStore {
    root: PathBuf,
    crypto: Option<Arc<dyn Crypto>>,
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("root", &self.root)
            .field("encrypted", &self.crypto.is_some())
            .finish()
    }
}

impl BlobStore {
    /// Creates a blob store rooted at `root`, creating its directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn new(root: impl Into<PathBuf>, crypto: Option<Arc<dyn Crypto>>) -> Result<Self> {
        let root = root.into();
        for dir in AREAS.map(|area| root.join(area)) {
            fs::create_dir_all(&dir).map_err(|e| Error::io("create_media_dir", &dir, &e))?;
        }
        Ok(Self { root, crypto })
    }

    /// Returns the storage mode new documents should be written with.
    #[must_use]
    pub const fn storage_mode(&self) -> StorageMode {
        if self.crypto.is_some() {
            StorageMode::Encrypted
        } else {
            StorageMode::Plain
        }
    }

    /// Returns the media root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a document's original.
    #[must_use]
    pub fn original_path(&self, document: &Document) -> PathBuf {
        self.blob_path(
            "originals",
            document.id,
            &document.file_type,
            document.storage_mode,
        )
    }

    /// Path of a document's archived rendition.
    #[must_use]
    pub fn archive_path(&self, document: &Document) -> PathBuf {
        self.blob_path("archive", document.id, ARCHIVE_EXTENSION, document.storage_mode)
    }

    fn blob_path(&self, area: &str, id: DocumentId, ext: &str, mode: StorageMode) -> PathBuf {
        let mut name = format!("{}.{ext}", id.file_stem());
        if mode == StorageMode::Encrypted {
            name.push('.');
            name.push_str(ENCRYPTED_SUFFIX);
        }
        self.root.join(area).join(name)
    }

    /// Writes the original bytes, the thumbnail file and, if given, the
    /// archived rendition for `document`.
    ///
    /// Either every blob is written or none is left behind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the document is marked encrypted
    /// but no crypto is configured, or an error if reading, encrypting or
    /// writing fails.
    pub fn write(
        &self,
        document: &Document,
        original: &[u8],
        thumbnail: &Path,
        archive: Option<&Path>,
    ) -> Result<StoredBlobs> {
        timed(BACKEND, "write_blobs", || {
            let thumb_bytes =
                fs::read(thumbnail).map_err(|e| Error::io("read_thumbnail", thumbnail, &e))?;
            let archive_bytes = archive
                .map(|path| {
                    fs::read(path)
                        .map_err(|e| Error::io("read_archive", path, &e))
                        .and_then(|bytes| self.seal(document.storage_mode, &bytes))
                })
                .transpose()?;
            let thumb_ext = thumbnail
                .extension()
                .and_then(|e| e.to_str())
                .map_or_else(|| "png".to_string(), str::to_lowercase);

            let original_bytes = self.seal(document.storage_mode, original)?;
            let thumb_bytes = self.seal(document.storage_mode, &thumb_bytes)?;

            let original_path = self.original_path(document);
            let thumbnail_path =
                self.blob_path("thumbnails", document.id, &thumb_ext, document.storage_mode);

            let archive_path = archive_bytes.as_ref().map(|_| self.archive_path(document));

            let mut writes = vec![
                (original_path.clone(), original_bytes),
                (thumbnail_path.clone(), thumb_bytes),
            ];
            if let (Some(path), Some(bytes)) = (&archive_path, archive_bytes) {
                writes.push((path.clone(), bytes));
            }

            let mut written: Vec<&Path> = Vec::with_capacity(writes.len());
            for (path, bytes) in &writes {
                if let Err(err) = write_atomic(path, bytes) {
                    for done in written {
                        let _ = fs::remove_file(done);
                    }
                    return Err(err);
                }
                written.push(path);
            }

            tracing::debug!(
                document.id = %document.id,
                original = %original_path.display(),
                thumbnail = %thumbnail_path.display(),
                archived = archive_path.is_some(),
                "Stored blobs"
            );

            Ok(StoredBlobs {
                original: original_path,
                thumbnail: thumbnail_path,
                archive: archive_path,
            })
        })
    }

    fn seal(&self, mode: StorageMode, bytes: &[u8]) -> Result<Vec<u8>> {
        match (mode, &self.crypto) {
            (StorageMode::Plain, _) => Ok(bytes.to_vec()),
            (StorageMode::Encrypted, Some(crypto)) => crypto.encrypt(bytes),
            (StorageMode::Encrypted, None) => Err(Error::Configuration(
                "encrypted storage requested without a passphrase".to_string(),
            )),
        }
    }

    /// Reads back a document's original, decrypting it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decrypted.
    pub fn read_original(&self, document: &Document) -> Result<Vec<u8>> {
        self.open(document.storage_mode, &self.original_path(document), "read_original")
    }

    /// Reads back a document's archived rendition, decrypting it if needed.
    /// Returns `None` if the document has no archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decrypted.
    pub fn read_archive(&self, document: &Document) -> Result<Option<Vec<u8>>> {
        if document.archive_checksum.is_none() {
            return Ok(None);
        }
        self.open(document.storage_mode, &self.archive_path(document), "read_archive")
            .map(Some)
    }

    fn open(&self, mode: StorageMode, path: &Path, operation: &str) -> Result<Vec<u8>> {
        let bytes = fs::read(path).map_err(|e| Error::io(operation, path, &e))?;
        match (mode, &self.crypto) {
            (StorageMode::Plain, _) => Ok(bytes),
            (StorageMode::Encrypted, Some(crypto)) => crypto.decrypt(&bytes),
            (StorageMode::Encrypted, None) => Err(Error::Configuration(
                "cannot read encrypted blob without a passphrase".to_string(),
            )),
        }
    }

    /// Removes every blob belonging to `id`. Missing files are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be listed or a file cannot be removed.
    pub fn remove(&self, id: DocumentId) -> Result<usize> {
        let prefix = format!("{}.", id.file_stem());
        let mut removed = 0;
        for area in AREAS {
            let dir = self.root.join(area);
            let entries = fs::read_dir(&dir).map_err(|e| Error::io("list_blobs", &dir, &e))?;
            for entry in entries.flatten() {
                if entry.file_name().to_string_lossy().starts_with(&prefix) {
                    let path = entry.path();
                    fs::remove_file(&path).map_err(|e| Error::io("remove_blob", &path, &e))?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io("create_temp_blob", dir, &e))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| Error::io("write_temp_blob", tmp.path(), &e))?;
    tmp.persist(target)
        .map_err(|e| Error::io("persist_blob", target, &e.error))?;
    Ok(())
}
