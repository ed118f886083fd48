//! Extraction backends.
//!
//! A [`BackendCapability`] inspects a file and either declines it or offers
//! to handle it with a weight. The [`BackendRegistry`] asks every registered
//! capability and picks the highest offer; ties go to the capability that was
//! registered first. The winner's factory then builds a per-file
//! [`Extractor`], wrapped in a [`ScopedExtractor`] so its scratch space is
//! released exactly once whatever happens during ingestion.
//!
//! Concrete backends:
//!
//! - [`TextBackend`]: plain text, markdown and CSV
//! - [`CommandBackend`]: external tools declared in configuration

pub mod command;
pub mod dates;
pub mod text;

pub use command::CommandBackend;
pub use text::TextBackend;

use crate::config::PapertrayConfig;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Per-file extraction handle produced by a backend factory.
///
/// Every method may block on external tools and may fail with
/// [`Error::Extraction`].
pub trait Extractor: Send {
    /// Extracted text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extraction`] if the text cannot be produced.
    fn text(&mut self) -> Result<String>;

    /// Path of a thumbnail image inside the extractor's scratch space.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extraction`] if the thumbnail cannot be produced.
    fn thumbnail(&mut self) -> Result<PathBuf>;

    /// Document date detected by the backend, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extraction`] if detection itself fails.
    fn date(&mut self) -> Result<Option<DateTime<Utc>>>;

    /// Number of pages, if the format has pages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extraction`] if counting fails.
    fn page_count(&mut self) -> Result<Option<u32>>;

    /// Path of an archived PDF rendition inside the extractor's scratch
    /// space, for backends that convert the original.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extraction`] if the conversion fails.
    fn archive(&mut self) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    /// Releases scratch resources. Must tolerate partial initialization.
    fn cleanup(&mut self);
}

/// A backend that may handle some files.
pub trait BackendCapability: Send + Sync {
    /// Backend name for logs and errors.
    fn name(&self) -> &str;

    /// Returns a weight if this backend can handle `path`, `None` otherwise.
    fn offer(&self, path: &Path) -> Option<i32>;

    /// Creates an extractor for `path` with scratch space under `scratch`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extraction`] if the extractor cannot be set up.
    fn create(&self, path: &Path, scratch: &Path) -> Result<Box<dyn Extractor>>;
}

/// The winning offer for one file.
#[derive(Clone)]
pub struct Selection {
    backend: Arc<dyn BackendCapability>,
    weight: i32,
}

impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("backend", &self.backend.name())
            .field("weight", &self.weight)
            .finish()
    }
}

impl Selection {
    /// Name of the selected backend.
    #[must_use]
    pub fn name(&self) -> &str {
        self.backend.name()
    }

    /// The winning weight.
    #[must_use]
    pub const fn weight(&self) -> i32 {
        self.weight
    }

    /// Builds a scoped extractor for `path`.
    ///
    /// # Errors
    ///
    /// Returns the factory's error.
    pub fn create(&self, path: &Path, scratch: &Path) -> Result<ScopedExtractor> {
        self.backend
            .create(path, scratch)
            .map(|inner| ScopedExtractor::new(self.backend.name(), inner))
    }
}

/// Immutable set of backends, loaded once at startup.
pub struct BackendRegistry {
    backends: Vec<Arc<dyn BackendCapability>>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.backends.iter().map(|b| b.name()))
            .finish()
    }
}

impl BackendRegistry {
    /// Creates a registry. Registration order breaks weight ties.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `backends` is empty.
    pub fn new(backends: Vec<Arc<dyn BackendCapability>>) -> Result<Self> {
        if backends.is_empty() {
            return Err(Error::Configuration(
                "no extraction backends registered".to_string(),
            ));
        }
        Ok(Self { backends })
    }

    /// Builds the configured text and command backends.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a command backend is invalid or
    /// nothing is enabled.
    pub fn from_config(config: &PapertrayConfig) -> Result<Self> {
        let mut backends: Vec<Arc<dyn BackendCapability>> = Vec::new();
        for settings in &config.command_backends {
            backends.push(Arc::new(CommandBackend::from_settings(settings)?));
        }
        if config.text_backend.enabled {
            backends.push(Arc::new(TextBackend::new(config.text_backend.weight)));
        }
        let registry = Self::new(backends)?;
        tracing::info!(backends = ?registry, "Loaded extraction backends");
        Ok(registry)
    }

    /// Number of registered backends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Always false; an empty registry cannot be built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Picks the highest-weight backend for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoBackend`] if every backend declines.
    pub fn select(&self, path: &Path) -> Result<Selection> {
        let mut best: Option<Selection> = None;
        for backend in &self.backends {
            let Some(weight) = backend.offer(path) else {
                continue;
            };
            tracing::trace!(backend = backend.name(), weight, "Backend offer");
            if best.as_ref().is_none_or(|b| weight > b.weight) {
                best = Some(Selection {
                    backend: Arc::clone(backend),
                    weight,
                });
            }
        }

        let selection = best.ok_or_else(|| Error::NoBackend {
            path: path.to_path_buf(),
        })?;
        tracing::debug!(
            backend = selection.name(),
            weight = selection.weight,
            path = %path.display(),
            "Selected backend"
        );
        Ok(selection)
    }
}

/// Extractor wrapper that calls [`Extractor::cleanup`] exactly once, on drop.
pub struct ScopedExtractor {
    backend: String,
    inner: Box<dyn Extractor>,
}

impl ScopedExtractor {
    /// Wraps an extractor produced by `backend`.
    #[must_use]
    pub fn new(backend: &str, inner: Box<dyn Extractor>) -> Self {
        Self {
            backend: backend.to_string(),
            inner,
        }
    }

    /// Name of the backend that produced the extractor.
    #[must_use]
    pub fn backend(&self) -> &str {
        &self.backend
    }
}

impl Deref for ScopedExtractor {
    type Target = dyn Extractor;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for ScopedExtractor {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for ScopedExtractor {
    fn drop(&mut self) {
        tracing::trace!(backend = %self.backend, "Cleaning up extractor");
        self.inner.cleanup();
    }
}

/// Builds an [`Error::Extraction`] for `backend`.
pub(crate) fn extraction_error(backend: &str, cause: impl std::fmt::Display) -> Error {
    Error::Extraction {
        backend: backend.to_string(),
        cause: cause.to_string(),
    }
}
