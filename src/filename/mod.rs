//! Filename metadata extraction.
//!
//! Files dropped into the intake directory may carry their own metadata in
//! the basename:
//!
//! ```text
//! <date> - <correspondent> - <title> - <tags>.<ext>
//! ```
//!
//! Seven grammars are tried in order and the first match wins:
//!
//! | Grammar | Example |
//! |---------|---------|
//! | `created-correspondent-title-tags` | `20180102Z - ACME - Invoice - bills,tax.pdf` |
//! | `created-title-tags` | `20180102Z - Invoice - bills,tax.pdf` |
//! | `created-correspondent-title` | `20180102Z - ACME - Invoice.pdf` |
//! | `created-title` | `20180102Z - Invoice.pdf` |
//! | `correspondent-title-tags` | `ACME - Invoice - bills,tax.pdf` |
//! | `correspondent-title` | `ACME - Invoice.pdf` |
//! | `title` | `Invoice.pdf` |
//!
//! Matching is case-insensitive. Titles that themselves contain ` - ` are
//! ambiguous: the greedy correspondent field takes everything up to the last
//! separator that still lets the rest of the grammar match.
//!
//! Parsing is pure; resolving names against the store is [`MetadataResolver`]'s job.

mod resolve;
mod slug;

pub use resolve::{MetadataResolver, StoreResolver};
pub use slug::slugify;

use crate::config::FilenameTransformSetting;
use crate::models::ExtractedMetadata;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

const DATE: &str = r"(?P<created>\d{8}(?:\d{6})?Z)";
const TAGS: &str = r"(?P<tags>[a-z0-9\-,]*)";
const EXT: &str = r"\.(?P<extension>[a-z0-9]+)$";

fn grammar(parts: &[&str]) -> Regex {
    let pattern = format!("(?i)^{}{EXT}", parts.join(" - "));
    Regex::new(&pattern).unwrap_or_else(|_| unreachable!())
}

/// The filename grammars, most specific first.
static GRAMMARS: LazyLock<[(&'static str, Regex); 7]> = LazyLock::new(|| {
    let correspondent = r"(?P<correspondent>.*)";
    let title = r"(?P<title>.*)";
    [
        (
            "created-correspondent-title-tags",
            grammar(&[DATE, correspondent, title, TAGS]),
        ),
        ("created-title-tags", grammar(&[DATE, title, TAGS])),
        (
            "created-correspondent-title",
            grammar(&[DATE, correspondent, title]),
        ),
        ("created-title", grammar(&[DATE, title])),
        (
            "correspondent-title-tags",
            grammar(&[correspondent, title, TAGS]),
        ),
        ("correspondent-title", grammar(&[correspondent, title])),
        ("title", grammar(&[title])),
    ]
});

/// A compiled filename rewrite applied before the grammars.
#[derive(Debug, Clone)]
pub struct FilenameTransform {
    pattern: Regex,
    replacement: String,
}

impl FilenameTransform {
    /// Compiles a transform. The replacement uses `$1` / `${name}` group syntax.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the pattern is not a valid regex.
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            Error::Configuration(format!("invalid filename transform '{pattern}': {e}"))
        })?;
        Ok(Self {
            pattern,
            replacement: replacement.into(),
        })
    }
}

/// Parses metadata out of filenames.
#[derive(Debug, Clone, Default)]
pub struct FilenameParser {
    transforms: Vec<FilenameTransform>,
}

impl FilenameParser {
    /// Creates a parser with an ordered list of transforms.
    #[must_use]
    pub const fn new(transforms: Vec<FilenameTransform>) -> Self {
        Self { transforms }
    }

    /// Compiles transforms from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for the first invalid pattern.
    pub fn from_settings(settings: &[FilenameTransformSetting]) -> Result<Self> {
        let transforms = settings
            .iter()
            .map(|s| FilenameTransform::new(&s.pattern, s.replacement.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(transforms))
    }

    /// Applies at most one transform: the first whose pattern matches.
    #[must_use]
    pub fn transform(&self, basename: &str) -> String {
        self.transforms
            .iter()
            .find(|t| t.pattern.is_match(basename))
            .map_or_else(
                || basename.to_string(),
                |t| {
                    t.pattern
                        .replace_all(basename, t.replacement.as_str())
                        .into_owned()
                },
            )
    }

    /// Extracts metadata from the basename of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnrecognizedFilename`] if no grammar matches, for
    /// example when the name has no extension.
    pub fn parse(&self, path: &Path) -> Result<ExtractedMetadata> {
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::UnrecognizedFilename(path.display().to_string()))?;
        let name = self.transform(&basename);

        let (grammar, caps) = GRAMMARS
            .iter()
            .find_map(|(grammar, re)| re.captures(&name).map(|caps| (*grammar, caps)))
            .ok_or_else(|| Error::UnrecognizedFilename(basename.clone()))?;

        let field = |key: &str| {
            caps.name(key)
                .map(|m| m.as_str().trim())
                .filter(|s| !s.is_empty())
        };

        let metadata = ExtractedMetadata {
            correspondent: field("correspondent").map(str::to_string),
            title: field("title").map(str::to_string),
            tags: field("tags").map(split_tags).unwrap_or_default(),
            created: field("created").and_then(parse_created),
            extension: field("extension")
                .map(normalize_extension)
                .unwrap_or_default(),
            grammar,
        };

        tracing::debug!(
            file = %basename,
            grammar,
            correspondent = ?metadata.correspondent,
            title = ?metadata.title,
            tags = ?metadata.tags,
            "Parsed filename"
        );
        Ok(metadata)
    }
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `YYYYMMDD[HHMMSS]Z`, right-padding the digits with zeros.
fn parse_created(raw: &str) -> Option<DateTime<Utc>> {
    let digits = raw.strip_suffix(['Z', 'z']).unwrap_or(raw);
    let padded = format!("{digits:0<14}");
    NaiveDateTime::parse_from_str(&padded, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Lowercases an extension and maps aliases (`jpeg` to `jpg`, `tif` to `tiff`).
#[must_use]
pub fn normalize_extension(ext: &str) -> String {
    match ext.to_lowercase().as_str() {
        "jpeg" => "jpg".to_string(),
        "tif" => "tiff".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(name: &str) -> ExtractedMetadata {
        FilenameParser::default()
            .parse(Path::new("/consume").join(name).as_path())
            .unwrap()
    }

    #[test]
    fn test_full_grammar() {
        let meta = parse("20150102030405Z - Sender Name - Title Here - tag1,tag2,tag3.pdf");
        assert_eq!(meta.grammar, "created-correspondent-title-tags");
        assert_eq!(meta.correspondent.as_deref(), Some("Sender Name"));
        assert_eq!(meta.title.as_deref(), Some("Title Here"));
        assert_eq!(meta.tags, ["tag1", "tag2", "tag3"]);
        assert_eq!(
            meta.created,
            Some(Utc.with_ymd_and_hms(2015, 1, 2, 3, 4, 5).unwrap())
        );
        assert_eq!(meta.extension, "pdf");
    }

    #[test]
    fn test_short_date_is_padded() {
        let meta = parse("20150102Z - Title.pdf");
        assert_eq!(meta.grammar, "created-title");
        assert_eq!(
            meta.created,
            Some(Utc.with_ymd_and_hms(2015, 1, 2, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_invalid_date_is_none() {
        let meta = parse("20151302Z - Title.pdf");
        assert_eq!(meta.grammar, "created-title");
        assert_eq!(meta.created, None);
    }

    #[test]
    fn test_title_only() {
        let meta = parse("Just a title.JPEG");
        assert_eq!(meta.grammar, "title");
        assert_eq!(meta.title.as_deref(), Some("Just a title"));
        assert_eq!(meta.correspondent, None);
        assert!(meta.tags.is_empty());
        assert_eq!(meta.extension, "jpg");
    }

    #[test]
    fn test_no_extension_is_unrecognized() {
        let err = FilenameParser::default()
            .parse(Path::new("no-extension"))
            .unwrap_err();
        assert!(matches!(err, Error::UnrecognizedFilename(name) if name == "no-extension"));
    }

    #[test]
    fn test_first_matching_transform_only() {
        let parser = FilenameParser::new(vec![
            FilenameTransform::new(r"^scan_(\d+)\.pdf$", "Scanner - Scan $1.pdf").unwrap(),
            FilenameTransform::new(r"^scan", "never").unwrap(),
        ]);
        let meta = parser.parse(Path::new("scan_0042.pdf")).unwrap();
        assert_eq!(meta.grammar, "correspondent-title");
        assert_eq!(meta.correspondent.as_deref(), Some("Scanner"));
        assert_eq!(meta.title.as_deref(), Some("Scan 0042"));
    }

    #[test]
    fn test_invalid_transform_is_configuration_error() {
        let err = FilenameTransform::new("(", "x").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
