//! Resolution of filename metadata against the store.

use super::slugify;
use crate::Result;
use crate::models::{ExtractedMetadata, ResolvedMetadata, Tag};
use crate::observability::current_correlation_id;
use crate::storage::DocumentStore;
use std::sync::Arc;
use tracing::instrument;

/// Turns candidate names from a filename into stored entities.
pub trait MetadataResolver: Send + Sync {
    /// Resolves the correspondent and tags named in `metadata`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lookup fails.
    fn resolve(&self, metadata: &ExtractedMetadata) -> Result<ResolvedMetadata>;
}

/// Resolves names by slug, creating missing tags and correspondents.
///
/// Entities are created outside the document transaction, so a file whose
/// ingestion later fails can leave newly created, unused entities behind.
pub struct StoreResolver {
    store: Arc<dyn DocumentStore>,
}

impl StoreResolver {
    /// Creates a resolver backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

impl MetadataResolver for StoreResolver {
    #[instrument(skip(self, metadata), fields(correlation_id = tracing::field::Empty, tags = metadata.tags.len()))]
    fn resolve(&self, metadata: &ExtractedMetadata) -> Result<ResolvedMetadata> {
        if let Some(correlation_id) = current_correlation_id() {
            tracing::Span::current().record("correlation_id", correlation_id.as_str());
        }
        let correspondent = metadata
            .correspondent
            .as_deref()
            .filter(|name| {
                let usable = !slugify(name).is_empty();
                if !usable {
                    tracing::debug!(name, "Correspondent name has no usable characters, ignoring");
                }
                usable
            })
            .map(|name| self.store.correspondent_for_name(name))
            .transpose()?;

        let mut tags = Vec::with_capacity(metadata.tags.len());
        for name in &metadata.tags {
            if slugify(name).is_empty() {
                tracing::debug!(name = %name, "Tag name has no usable characters, ignoring");
                continue;
            }
            let tag = self.store.tag_for_name(name)?;
            if !tags.iter().any(|t: &Tag| t.id == tag.id) {
                tags.push(tag);
            }
        }

        Ok(ResolvedMetadata { correspondent, tags })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteDocumentStore;

    #[test]
    fn test_resolves_and_creates() {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let existing = store.tag_for_name("Bills").unwrap();
        let resolver = StoreResolver::new(Arc::clone(&store));

        let resolved = resolver
            .resolve(&ExtractedMetadata {
                correspondent: Some("ACME".into()),
                tags: vec!["bills".into(), "tax".into(), "BILLS".into()],
                ..ExtractedMetadata::default()
            })
            .unwrap();

        assert_eq!(resolved.correspondent.unwrap().slug, "acme");
        let ids: Vec<_> = resolved.tags.iter().map(|t| t.id).collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], existing.id);
        assert_eq!(store.tags().unwrap().len(), 2);
    }

    #[test]
    fn test_names_without_slug_are_skipped() {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let resolved = StoreResolver::new(Arc::clone(&store))
            .resolve(&ExtractedMetadata {
                correspondent: Some("###".into()),
                tags: vec!["---".into(), "tax".into()],
                ..ExtractedMetadata::default()
            })
            .unwrap();

        assert!(resolved.correspondent.is_none());
        assert_eq!(resolved.tags.len(), 1);
        assert_eq!(resolved.tags[0].slug, "tax");
        assert!(store.correspondents().unwrap().is_empty());
    }

    #[test]
    fn test_resolves_inside_correlation_context() {
        use crate::observability::{CorrelationContext, enter_correlation_context};

        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let context = CorrelationContext::new();
        let id = context.correlation_id().to_string();
        let _guard = enter_correlation_context(context);

        let resolved = StoreResolver::new(store)
            .resolve(&ExtractedMetadata {
                correspondent: Some("ACME".into()),
                ..ExtractedMetadata::default()
            })
            .unwrap();

        assert_eq!(resolved.correspondent.unwrap().slug, "acme");
        assert_eq!(current_correlation_id().as_deref(), Some(id.as_str()));
    }

    #[test]
    fn test_empty_metadata_resolves_to_nothing() {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let resolved = StoreResolver::new(store)
            .resolve(&ExtractedMetadata::default())
            .unwrap();
        assert!(resolved.correspondent.is_none());
        assert!(resolved.tags.is_empty());
    }
}
