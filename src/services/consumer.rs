//! The ingestion transaction.
//!
//! [`Consumer::try_consume`] takes one stable file through the whole pipeline:
//!
//! 1. Filename grammar check
//! 2. Checksum of the untouched bytes
//! 3. Duplicate check
//! 4. Backend selection
//! 5. `on_consumption_started`
//! 6. Extraction (text, thumbnail, date, page count, archived rendition)
//! 7. Filename resolution and content matching
//! 8. Record, tag links and blobs committed together
//! 9. Disposal of the source, then `on_consumption_finished`
//!
//! A failure anywhere before the commit leaves no record and no blobs, and the
//! source stays where it is.

use super::ContentHasher;
use super::disposal::{dispose, safe_move};
use crate::backends::BackendRegistry;
use crate::config::{DisposalPolicy, PapertrayConfig};
use crate::filename::{FilenameParser, MetadataResolver, StoreResolver};
use crate::matching::match_entities;
use crate::models::{Document, DocumentId, EntityId, NewDocument, Tag};
use crate::observability::{
    ConsumptionObserver, CorrelationContext, enter_correlation_context,
};
use crate::security::{Crypto, Encryptor};
use crate::storage::{BlobStore, DocumentStore, SqliteDocumentStore};
use crate::watcher::{IntakeLayout, StabilityWatcher, WatchState};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Outcome counts of one watch cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Files seen by the scan.
    pub seen: usize,
    /// New or changed files waiting for the next cycle.
    pub pending: usize,
    /// Stable files attempted.
    pub attempted: usize,
    /// Documents stored this cycle.
    pub consumed: Vec<DocumentId>,
    /// Attempts that failed.
    pub failed: usize,
    /// Previously failed files skipped.
    pub ignored: usize,
}

/// Runs watch cycles and ingests stable files.
pub struct Consumer {
    watcher: StabilityWatcher,
    parser: FilenameParser,
    resolver: Arc<dyn MetadataResolver>,
    registry: BackendRegistry,
    store: Arc<dyn DocumentStore>,
    blobs: BlobStore,
    observers: Vec<Arc<dyn ConsumptionObserver>>,
    disposal: DisposalPolicy,
    scratch_dir: PathBuf,
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("intake", &self.watcher.layout().root)
            .field("registry", &self.registry)
            .field("blobs", &self.blobs)
            .field("observers", &self.observers.len())
            .field("disposal", &self.disposal)
            .finish_non_exhaustive()
    }
}

impl Consumer {
    /// Creates a consumer with the default parser and a store-backed resolver.
    ///
    /// # Errors
    ///
    /// Returns an error if the intake holding areas cannot be created.
    pub fn new(
        layout: IntakeLayout,
        registry: BackendRegistry,
        store: Arc<dyn DocumentStore>,
        blobs: BlobStore,
    ) -> Result<Self> {
        layout.ensure()?;
        Ok(Self {
            watcher: StabilityWatcher::new(layout),
            parser: FilenameParser::default(),
            resolver: Arc::new(StoreResolver::new(Arc::clone(&store))),
            registry,
            store,
            blobs,
            observers: Vec::new(),
            disposal: DisposalPolicy::default(),
            scratch_dir: std::env::temp_dir().join("papertray"),
        })
    }

    /// Wires a consumer from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for invalid settings, or an error if
    /// the store, media root or scratch directory cannot be opened.
    pub fn from_config(config: &PapertrayConfig) -> Result<Self> {
        config.validate()?;
        let Some(intake) = &config.consumption_dir else {
            return Err(Error::Configuration(
                "no consumption directory configured".to_string(),
            ));
        };

        let store: Arc<dyn DocumentStore> =
            Arc::new(SqliteDocumentStore::new(config.database_path())?);
        let crypto = config
            .passphrase
            .as_ref()
            .map(|p| Encryptor::from_passphrase(p).map(|e| Arc::new(e) as Arc<dyn Crypto>))
            .transpose()?;
        let blobs = BlobStore::new(config.media_dir(), crypto)?;
        let registry = BackendRegistry::from_config(config)?;

        tracing::info!(
            intake = %intake.display(),
            backends = registry.len(),
            storage_mode = %blobs.storage_mode(),
            disposal = config.disposal.as_str(),
            "Consumer configured"
        );

        Ok(Self::new(IntakeLayout::new(intake), registry, store, blobs)?
            .with_parser(FilenameParser::from_settings(&config.filename_transforms)?)
            .with_disposal(config.disposal)
            .with_scratch_dir(config.scratch_dir()))
    }

    /// Replaces the filename parser.
    #[must_use]
    pub fn with_parser(mut self, parser: FilenameParser) -> Self {
        self.parser = parser;
        self
    }

    /// Replaces the metadata resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn MetadataResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Adds an observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ConsumptionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Sets the disposal policy.
    #[must_use]
    pub const fn with_disposal(mut self, disposal: DisposalPolicy) -> Self {
        self.disposal = disposal;
        self
    }

    /// Sets the parent of per-file scratch directories.
    #[must_use]
    pub fn with_scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir.into();
        self
    }

    /// The document store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// The blob store.
    #[must_use]
    pub const fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// The intake layout.
    #[must_use]
    pub const fn layout(&self) -> &IntakeLayout {
        self.watcher.layout()
    }

    /// Runs one watch cycle and returns the state for the next one.
    ///
    /// Candidates are attempted one at a time, oldest first. A failed
    /// candidate is ignored until it changes. Under [`DisposalPolicy::Move`]
    /// files ignored by an earlier cycle are moved to `ignored/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the intake directory cannot be listed or an
    /// attempt fails with an error that is not confined to one file.
    pub fn run_cycle(&self, state: WatchState) -> Result<(CycleSummary, WatchState)> {
        let (report, mut next) = self.watcher.scan(&state)?;
        let mut summary = CycleSummary {
            seen: report.total(),
            pending: report.pending.len(),
            attempted: report.candidates.len(),
            ignored: report.ignored.len(),
            ..CycleSummary::default()
        };

        if self.disposal == DisposalPolicy::Move {
            for tracked in &report.ignored {
                tracing::info!(path = %tracked.path().display(), "Moving ignored file");
                if let Err(e) = safe_move(tracked.path(), &self.layout().ignored) {
                    tracing::warn!(error = %e, "Could not move ignored file");
                }
            }
        }

        for candidate in &report.candidates {
            tracing::info!(
                path = %candidate.path().display(),
                size = candidate.identity.size,
                "Candidate file"
            );
            match self.try_consume(candidate.path()) {
                Ok(document) => {
                    summary.consumed.push(document.id);
                    if candidate.path().exists() {
                        next.mark_failed(&candidate.identity);
                    }
                },
                Err(e) if e.is_per_file() => {
                    summary.failed += 1;
                    next.mark_failed(&candidate.identity);
                },
                Err(e) => return Err(e),
            }
        }

        if summary.attempted > 0 || summary.pending > 0 {
            tracing::info!(
                seen = summary.seen,
                pending = summary.pending,
                consumed = summary.consumed.len(),
                failed = summary.failed,
                ignored = summary.ignored,
                "Watch cycle finished"
            );
        }
        Ok((summary, next))
    }

    /// Ingests one file, bypassing the stability check.
    ///
    /// # Errors
    ///
    /// Returns the first error of the pipeline. Disposal errors are logged
    /// and do not fail the call once the document is committed.
    pub fn try_consume(&self, path: &Path) -> Result<Document> {
        let context = CorrelationContext::new();
        let correlation_id = context.correlation_id().to_string();
        let _guard = enter_correlation_context(context);
        let span = tracing::info_span!(
            "consume",
            path = %path.display(),
            correlation_id = %correlation_id
        );
        let _entered = span.enter();

        let start = Instant::now();
        metrics::counter!("consumption_attempts_total").increment(1);

        let result = self.consume(path, &correlation_id);

        match &result {
            Ok(document) => {
                metrics::counter!("documents_consumed_total").increment(1);
                tracing::info!(document.id = %document.id, document = %document, "Document consumption finished");
            },
            Err(Error::Duplicate { checksum }) => {
                metrics::counter!("duplicates_skipped_total").increment(1);
                metrics::counter!("consumption_failures_total", "reason" => "duplicate").increment(1);
                tracing::info!(checksum = %checksum, "Skipping duplicate");
            },
            Err(e) => {
                metrics::counter!("consumption_failures_total", "reason" => e.reason()).increment(1);
                tracing::error!(error = %e, reason = e.reason(), "Consumption failed");
            },
        }
        metrics::histogram!("consumption_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);

        result
    }

    fn consume(&self, path: &Path, correlation_id: &str) -> Result<Document> {
        let metadata = self.parser.parse(path)?;

        let original = fs::read(path).map_err(|e| Error::io("read_source", path, &e))?;
        let checksum = ContentHasher::checksum(&original);
        if self.store.checksum_exists(&checksum)? {
            self.set_aside_duplicate(path);
            return Err(Error::Duplicate { checksum });
        }

        let selection = self.registry.select(path)?;
        tracing::info!(backend = selection.name(), weight = selection.weight(), "Consuming");

        for observer in &self.observers {
            observer.on_consumption_started(path, correlation_id);
        }

        let stored = self
            .extract_and_store(path, &original, checksum, &metadata, &selection)
            .inspect_err(|e| {
                for observer in &self.observers {
                    observer.on_consumption_failed(path, e.reason(), correlation_id);
                }
            })?;

        if let Err(e) = dispose(path, self.disposal, &self.layout().processed) {
            metrics::counter!("disposal_failures_total").increment(1);
            tracing::warn!(error = %e, "Document stored but source not disposed of");
        }

        for observer in &self.observers {
            observer.on_consumption_finished(&stored, correlation_id);
        }
        Ok(stored)
    }

    fn extract_and_store(
        &self,
        path: &Path,
        original: &[u8],
        checksum: String,
        metadata: &crate::models::ExtractedMetadata,
        selection: &crate::backends::Selection,
    ) -> Result<Document> {
        let mut extractor = selection.create(path, &self.scratch_dir)?;
        let content = extractor.text()?;
        let thumbnail = extractor.thumbnail()?;
        let backend_date = match metadata.created {
            Some(_) => None,
            None => extractor.date()?,
        };
        let page_count = extractor.page_count()?;
        let archive = extractor.archive()?;
        let archive_checksum = archive
            .as_deref()
            .map(ContentHasher::checksum_file)
            .transpose()?;

        let resolved = self.resolver.resolve(metadata)?;
        let tags = self.store.tags()?;
        let matched_tags = match_entities(&tags, &content)?;
        let correspondent = match resolved.correspondent {
            Some(correspondent) => Some(correspondent.id),
            None => {
                let correspondents = self.store.correspondents()?;
                let matched = match_entities(&correspondents, &content)?;
                matched.first().map(|c| c.id)
            },
        };

        let created = match metadata.created.or(backend_date) {
            Some(created) => created,
            None => modified_time(path)?,
        };

        let new = NewDocument {
            checksum,
            title: metadata.title.clone(),
            content,
            file_type: metadata.extension.clone(),
            correspondent,
            tags: union_tag_ids(&resolved.tags, &matched_tags),
            created,
            storage_mode: self.blobs.storage_mode(),
            page_count,
            archive_checksum,
        };

        let mut written: Option<DocumentId> = None;
        let mut write_blobs = |document: &Document| -> Result<()> {
            written = Some(document.id);
            self.blobs
                .write(document, original, &thumbnail, archive.as_deref())
                .map(|_| ())
        };
        let result = self.store.insert_document(&new, &mut write_blobs);

        if let Err(e) = &result {
            if matches!(e, Error::Duplicate { .. }) {
                self.set_aside_duplicate(path);
            }
            if let Some(id) = written {
                match self.blobs.remove(id) {
                    Ok(removed) => tracing::debug!(document.id = %id, removed, "Removed blobs of rolled back document"),
                    Err(e) => tracing::warn!(document.id = %id, error = %e, "Could not remove blobs of rolled back document"),
                }
            }
        }
        let document = result?;

        drop(extractor);
        Ok(document)
    }

    fn set_aside_duplicate(&self, path: &Path) {
        if self.disposal != DisposalPolicy::Move {
            return;
        }
        tracing::info!(
            to = %self.layout().duplicate.display(),
            "Moving duplicate"
        );
        if let Err(e) = safe_move(path, &self.layout().duplicate) {
            tracing::warn!(error = %e, "Could not move duplicate");
        }
    }
}

/// Filename tags first, then content-matched tags, without repeats.
fn union_tag_ids(from_filename: &[Tag], matched: &[&Tag]) -> Vec<EntityId> {
    let mut ids: Vec<EntityId> = Vec::with_capacity(from_filename.len() + matched.len());
    for id in from_filename.iter().map(|t| t.id).chain(matched.iter().map(|t| t.id)) {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

fn modified_time(path: &Path) -> Result<DateTime<Utc>> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| Error::io("read_mtime", path, &e))?;
    Ok(DateTime::<Utc>::from(modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendCapability, Extractor, TextBackend};
    use crate::models::{Correspondent, MatchRule, MatchingAlgorithm, NewEntity};
    use crate::storage::Finalize;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Fixture {
        intake: TempDir,
        media: TempDir,
        store: Arc<SqliteDocumentStore>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                intake: TempDir::new().unwrap(),
                media: TempDir::new().unwrap(),
                store: Arc::new(SqliteDocumentStore::in_memory().unwrap()),
            }
        }

        fn consumer(&self, backends: Vec<Arc<dyn BackendCapability>>) -> Consumer {
            let store: Arc<dyn DocumentStore> = Arc::clone(&self.store) as Arc<dyn DocumentStore>;
            Consumer::new(
                IntakeLayout::new(self.intake.path()),
                BackendRegistry::new(backends).unwrap(),
                store,
                BlobStore::new(self.media.path(), None).unwrap(),
            )
            .unwrap()
            .with_scratch_dir(self.media.path().join("scratch"))
        }

        fn text_consumer(&self) -> Consumer {
            self.consumer(vec![Arc::new(TextBackend::new(10))])
        }

        fn drop_file(&self, name: &str, content: &str) -> PathBuf {
            let path = self.intake.path().join(name);
            fs::write(&path, content).unwrap();
            path
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ConsumptionObserver for Recorder {
        fn on_consumption_started(&self, _path: &Path, correlation_id: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("started:{correlation_id}"));
        }

        fn on_consumption_finished(&self, _document: &Document, correlation_id: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("finished:{correlation_id}"));
        }

        fn on_consumption_failed(&self, _path: &Path, reason: &'static str, _id: &str) {
            self.events.lock().unwrap().push(format!("failed:{reason}"));
        }
    }

    struct FailingText {
        cleanups: Arc<AtomicUsize>,
    }

    impl Extractor for FailingText {
        fn text(&mut self) -> Result<String> {
            Err(Error::Extraction {
                backend: "broken".into(),
                cause: "unreadable".into(),
            })
        }
        fn thumbnail(&mut self) -> Result<PathBuf> {
            unreachable!("text fails first")
        }
        fn date(&mut self) -> Result<Option<DateTime<Utc>>> {
            Ok(None)
        }
        fn page_count(&mut self) -> Result<Option<u32>> {
            Ok(None)
        }
        fn cleanup(&mut self) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Broken {
        cleanups: Arc<AtomicUsize>,
    }

    impl BackendCapability for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn offer(&self, _path: &Path) -> Option<i32> {
            Some(100)
        }
        fn create(&self, _path: &Path, _scratch: &Path) -> Result<Box<dyn Extractor>> {
            Ok(Box::new(FailingText {
                cleanups: Arc::clone(&self.cleanups),
            }))
        }
    }

    #[test]
    fn test_consumes_with_filename_metadata_and_matching() {
        let fx = Fixture::new();
        fx.store
            .create_tag(&NewEntity::new(
                "Insurance",
                MatchRule::new("policy", MatchingAlgorithm::Any),
            ))
            .unwrap();
        let consumer = fx.text_consumer();
        let path = fx.drop_file(
            "20180213Z - ACME - Invoice 42 - bills.txt",
            "Your policy renewal\nDue 01.03.2018",
        );

        let doc = consumer.try_consume(&path).unwrap();

        assert_eq!(doc.title.as_deref(), Some("Invoice 42"));
        assert_eq!(doc.file_type, "txt");
        assert_eq!(doc.created.format("%Y-%m-%d").to_string(), "2018-02-13");
        assert_eq!(doc.tags.len(), 2);
        let acme = fx.store.correspondent_for_name("acme").unwrap();
        assert_eq!(doc.correspondent, Some(acme.id));
        assert!(!path.exists());
        assert!(fx.intake.path().join("processed").join(path.file_name().unwrap()).exists());
        assert_eq!(
            consumer.blobs().read_original(&doc).unwrap(),
            b"Your policy renewal\nDue 01.03.2018"
        );
    }

    #[test]
    fn test_backend_date_used_when_filename_has_none() {
        let fx = Fixture::new();
        let path = fx.drop_file("Letter.txt", "Signed on 2019-07-04 in Boston");
        let doc = fx.text_consumer().try_consume(&path).unwrap();
        assert_eq!(doc.created.format("%Y-%m-%d").to_string(), "2019-07-04");
    }

    #[test]
    fn test_content_matched_correspondent_fills_gap() {
        let fx = Fixture::new();
        let bank = fx
            .store
            .create_correspondent(&NewEntity::new(
                "Big Bank",
                MatchRule::new("big bank", MatchingAlgorithm::Literal),
            ))
            .unwrap();
        let path = fx.drop_file("Statement.txt", "Statement from BIG BANK plc");
        let doc = fx.text_consumer().try_consume(&path).unwrap();
        assert_eq!(doc.correspondent, Some(bank.id));
    }

    #[test]
    fn test_duplicate_moved_aside_and_not_stored() {
        let fx = Fixture::new();
        let consumer = fx.text_consumer();
        let first = fx.drop_file("One.txt", "same bytes");
        consumer.try_consume(&first).unwrap();

        let second = fx.drop_file("Renamed copy.txt", "same bytes");
        let err = consumer.try_consume(&second).unwrap_err();
        assert!(matches!(err, Error::Duplicate { .. }));
        assert_eq!(fx.store.document_count().unwrap(), 1);
        assert!(fx.intake.path().join("duplicate").join("Renamed copy.txt").exists());
    }

    #[test]
    fn test_duplicate_left_in_place_under_delete() {
        let fx = Fixture::new();
        let consumer = fx.text_consumer().with_disposal(DisposalPolicy::Delete);
        let first = fx.drop_file("One.txt", "same bytes");
        consumer.try_consume(&first).unwrap();
        assert!(!first.exists());

        let second = fx.drop_file("Two.txt", "same bytes");
        assert!(consumer.try_consume(&second).is_err());
        assert!(second.exists());
    }

    /// Store that never reports a checksum as known, so a second copy only
    /// trips the UNIQUE constraint on insert.
    struct BlindChecksums(SqliteDocumentStore);

    impl DocumentStore for BlindChecksums {
        fn checksum_exists(&self, _checksum: &str) -> Result<bool> {
            Ok(false)
        }
        fn tags(&self) -> Result<Vec<Tag>> {
            self.0.tags()
        }
        fn correspondents(&self) -> Result<Vec<Correspondent>> {
            self.0.correspondents()
        }
        fn create_tag(&self, entity: &NewEntity) -> Result<Tag> {
            self.0.create_tag(entity)
        }
        fn create_correspondent(&self, entity: &NewEntity) -> Result<Correspondent> {
            self.0.create_correspondent(entity)
        }
        fn tag_for_name(&self, name: &str) -> Result<Tag> {
            self.0.tag_for_name(name)
        }
        fn correspondent_for_name(&self, name: &str) -> Result<Correspondent> {
            self.0.correspondent_for_name(name)
        }
        fn insert_document(
            &self,
            new: &NewDocument,
            finalize: &mut Finalize<'_>,
        ) -> Result<Document> {
            self.0.insert_document(new, finalize)
        }
        fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
            self.0.get_document(id)
        }
        fn document_count(&self) -> Result<usize> {
            self.0.document_count()
        }
    }

    #[test]
    fn test_duplicate_caught_on_insert_is_moved_aside() {
        let fx = Fixture::new();
        let store = Arc::new(BlindChecksums(SqliteDocumentStore::in_memory().unwrap()));
        let consumer = Consumer::new(
            IntakeLayout::new(fx.intake.path()),
            BackendRegistry::new(vec![Arc::new(TextBackend::new(10))]).unwrap(),
            Arc::clone(&store) as Arc<dyn DocumentStore>,
            BlobStore::new(fx.media.path(), None).unwrap(),
        )
        .unwrap()
        .with_scratch_dir(fx.media.path().join("scratch"));

        consumer.try_consume(&fx.drop_file("One.txt", "same bytes")).unwrap();
        let second = fx.drop_file("Two.txt", "same bytes");
        let err = consumer.try_consume(&second).unwrap_err();

        assert!(matches!(err, Error::Duplicate { .. }));
        assert_eq!(store.document_count().unwrap(), 1);
        assert!(!second.exists());
        assert!(fx.intake.path().join("duplicate").join("Two.txt").exists());
        assert_eq!(fs::read_dir(fx.media.path().join("originals")).unwrap().count(), 1);
    }

    #[test]
    fn test_filename_without_usable_correspondent_still_consumed() {
        let fx = Fixture::new();
        let path = fx.drop_file("### - Invoice.txt", "Invoice body");

        let doc = fx.text_consumer().try_consume(&path).unwrap();

        assert_eq!(doc.title.as_deref(), Some("Invoice"));
        assert_eq!(doc.correspondent, None);
        assert!(fx.store.correspondents().unwrap().is_empty());
    }

    struct ArchivingExtraction {
        scratch: TempDir,
    }

    impl Extractor for ArchivingExtraction {
        fn text(&mut self) -> Result<String> {
            Ok("Scanned letter".to_string())
        }
        fn thumbnail(&mut self) -> Result<PathBuf> {
            let path = self.scratch.path().join("thumb.png");
            fs::write(&path, b"png").unwrap();
            Ok(path)
        }
        fn date(&mut self) -> Result<Option<DateTime<Utc>>> {
            Ok(None)
        }
        fn page_count(&mut self) -> Result<Option<u32>> {
            Ok(Some(1))
        }
        fn archive(&mut self) -> Result<Option<PathBuf>> {
            let path = self.scratch.path().join("archive.pdf");
            fs::write(&path, b"%PDF-1.7 archived").unwrap();
            Ok(Some(path))
        }
        fn cleanup(&mut self) {}
    }

    struct Archiving;

    impl BackendCapability for Archiving {
        fn name(&self) -> &str {
            "archiving"
        }
        fn offer(&self, path: &Path) -> Option<i32> {
            (path.extension()? == "tiff").then_some(10)
        }
        fn create(&self, _path: &Path, scratch: &Path) -> Result<Box<dyn Extractor>> {
            fs::create_dir_all(scratch).unwrap();
            Ok(Box::new(ArchivingExtraction {
                scratch: TempDir::new_in(scratch).unwrap(),
            }))
        }
    }

    #[test]
    fn test_archived_rendition_stored_next_to_original() {
        let fx = Fixture::new();
        let consumer = fx.consumer(vec![Arc::new(Archiving)]);
        let path = fx.drop_file("Letter.tiff", "raw scan");

        let doc = consumer.try_consume(&path).unwrap();

        assert_eq!(
            doc.archive_checksum.as_deref(),
            Some(ContentHasher::checksum(b"%PDF-1.7 archived").as_str())
        );
        assert_eq!(
            fs::read(fx.media.path().join("archive").join("0000001.pdf")).unwrap(),
            b"%PDF-1.7 archived"
        );
        assert_eq!(
            consumer.blobs().read_archive(&doc).unwrap().as_deref(),
            Some(&b"%PDF-1.7 archived"[..])
        );
        let stored = fx.store.get_document(doc.id).unwrap().unwrap();
        assert_eq!(stored.archive_checksum, doc.archive_checksum);
    }

    #[test]
    fn test_plain_backend_has_no_archive() {
        let fx = Fixture::new();
        let consumer = fx.text_consumer();
        let doc = consumer.try_consume(&fx.drop_file("Memo.txt", "memo")).unwrap();
        assert_eq!(doc.archive_checksum, None);
        assert_eq!(consumer.blobs().read_archive(&doc).unwrap(), None);
        assert_eq!(fs::read_dir(fx.media.path().join("archive")).unwrap().count(), 0);
    }

    #[test]
    fn test_extraction_failure_leaves_nothing_and_cleans_up_once() {
        let fx = Fixture::new();
        let cleanups = Arc::new(AtomicUsize::new(0));
        let recorder = Arc::new(Recorder::default());
        let consumer = fx
            .consumer(vec![Arc::new(Broken {
                cleanups: Arc::clone(&cleanups),
            })])
            .with_observer(Arc::clone(&recorder) as Arc<dyn ConsumptionObserver>);
        let path = fx.drop_file("Scan.txt", "text");

        let err = consumer.try_consume(&path).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(fx.store.document_count().unwrap(), 0);
        assert!(path.exists());

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].starts_with("started:"));
        assert_eq!(events[1], "failed:extraction");
    }

    #[test]
    fn test_observers_share_correlation_id() {
        let fx = Fixture::new();
        let recorder = Arc::new(Recorder::default());
        let consumer = fx
            .text_consumer()
            .with_observer(Arc::clone(&recorder) as Arc<dyn ConsumptionObserver>);
        consumer.try_consume(&fx.drop_file("Note.txt", "hi")).unwrap();

        let events = recorder.events.lock().unwrap();
        let started = events[0].strip_prefix("started:").unwrap();
        let finished = events[1].strip_prefix("finished:").unwrap();
        assert_eq!(started, finished);
    }

    #[test]
    fn test_no_backend_and_unrecognized_filename() {
        let fx = Fixture::new();
        let consumer = fx.text_consumer();

        let err = consumer
            .try_consume(&fx.drop_file("photo.heic", "bytes"))
            .unwrap_err();
        assert!(matches!(err, Error::NoBackend { .. }));

        let err = consumer
            .try_consume(&fx.drop_file("README", "bytes"))
            .unwrap_err();
        assert!(matches!(err, Error::UnrecognizedFilename(_)));
    }

    #[test]
    fn test_run_cycle_waits_for_stability_then_ignores_failures() {
        let fx = Fixture::new();
        let consumer = fx.text_consumer();
        fx.drop_file("Good.txt", "good");
        fx.drop_file("Bad.xyz", "bad");

        let (summary, state) = consumer.run_cycle(WatchState::default()).unwrap();
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.attempted, 0);

        let (summary, state) = consumer.run_cycle(state).unwrap();
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.consumed.len(), 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(state.ignored_len(), 1);

        let (summary, state) = consumer.run_cycle(state).unwrap();
        assert_eq!(summary.ignored, 1);
        assert!(fx.intake.path().join("ignored").join("Bad.xyz").exists());

        let (summary, _) = consumer.run_cycle(state).unwrap();
        assert_eq!(summary.seen, 0);
    }

    #[test]
    fn test_stored_document_not_retried_when_disposal_fails() {
        let fx = Fixture::new();
        let consumer = fx.text_consumer();
        let processed = fx.intake.path().join("processed");
        fs::remove_dir_all(&processed).unwrap();
        fs::write(&processed, "not a directory").unwrap();
        let source = fx.drop_file("Receipt.txt", "receipt");

        let (summary, state) = consumer.run_cycle(WatchState::default()).unwrap();
        assert_eq!(summary.pending, 1);

        let (summary, state) = consumer.run_cycle(state).unwrap();
        assert_eq!(summary.consumed.len(), 1);
        assert_eq!(summary.failed, 0);
        assert!(source.exists());
        assert_eq!(fx.store.document_count().unwrap(), 1);

        let (summary, _) = consumer.run_cycle(state).unwrap();
        assert_eq!(summary.ignored, 1);
        assert_eq!(summary.attempted, 0);
        assert!(summary.consumed.is_empty());
        assert_eq!(fx.store.document_count().unwrap(), 1);
    }

    #[test]
    fn test_union_tag_ids_dedups_in_order() {
        let tag = |id: i64| Tag {
            id: EntityId::new(id),
            name: format!("t{id}"),
            slug: format!("t{id}"),
            rule: MatchRule::default(),
            colour: 1,
        };
        let (a, b, c) = (tag(1), tag(2), tag(3));
        let ids = union_tag_ids(&[b.clone(), a.clone()], &[&a, &c]);
        assert_eq!(ids, [EntityId::new(2), EntityId::new(1), EntityId::new(3)]);
    }
}
