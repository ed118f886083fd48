//! Storage traits.
//!
//! The pipeline talks to the document store only through [`DocumentStore`],
//! so the `SQLite` implementation can be swapped for another backend.

use crate::Result;
use crate::models::{Correspondent, Document, DocumentId, NewDocument, NewEntity, Tag};

/// Hook run inside the store transaction after the record and its tag links
/// are written and before they become visible.
pub type Finalize<'a> = dyn FnMut(&Document) -> Result<()> + 'a;

/// Persistent store of documents, tags and correspondents.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait DocumentStore: Send + Sync {
    /// Returns true if a document with this checksum already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn checksum_exists(&self, checksum: &str) -> Result<bool>;

    /// Lists every tag, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored rule is invalid.
    fn tags(&self) -> Result<Vec<Tag>>;

    /// Lists every correspondent, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored rule is invalid.
    fn correspondents(&self) -> Result<Vec<Correspondent>>;

    /// Creates a tag.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] for an invalid match rule and
    /// an operation error if the name or slug is taken.
    fn create_tag(&self, tag: &NewEntity) -> Result<Tag>;

    /// Creates a correspondent.
    ///
    /// # Errors
    ///
    /// Same as [`DocumentStore::create_tag`].
    fn create_correspondent(&self, correspondent: &NewEntity) -> Result<Correspondent>;

    /// Returns the tag whose slug matches `name`, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup or insert fails.
    fn tag_for_name(&self, name: &str) -> Result<Tag>;

    /// Returns the correspondent whose slug matches `name`, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup or insert fails.
    fn correspondent_for_name(&self, name: &str) -> Result<Correspondent>;

    /// Inserts a document and its tag links in one transaction.
    ///
    /// `finalize` runs before commit; if it fails, nothing is persisted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Duplicate`] if the checksum already exists,
    /// the error from `finalize`, or an operation error.
    fn insert_document(&self, document: &NewDocument, finalize: &mut Finalize<'_>)
    -> Result<Document>;

    /// Loads a document by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_document(&self, id: DocumentId) -> Result<Option<Document>>;

    /// Returns the number of stored documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn document_count(&self) -> Result<usize>;
}
