//! Document persistence.
//!
//! - [`DocumentStore`]: records, tags and correspondents ([`SqliteDocumentStore`])
//! - [`BlobStore`]: originals and thumbnails on disk, optionally encrypted

pub mod blobs;
pub mod sqlite;
pub mod traits;

pub use blobs::{BlobStore, StoredBlobs};
pub use sqlite::SqliteDocumentStore;
pub use traits::{DocumentStore, Finalize};
