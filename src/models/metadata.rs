//! Metadata read from filenames.

use super::{Correspondent, Tag};
use chrono::{DateTime, Utc};

/// Candidate metadata parsed from a filename.
///
/// Pure output of the filename grammar: names are not yet resolved against
/// the store. Produced per file and consumed once.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractedMetadata {
    /// Correspondent name, if the grammar carried one.
    pub correspondent: Option<String>,
    /// Title, if non-empty.
    pub title: Option<String>,
    /// Tag names in filename order.
    pub tags: Vec<String>,
    /// Creation date embedded in the filename.
    pub created: Option<DateTime<Utc>>,
    /// Normalized extension.
    pub extension: String,
    /// Name of the grammar that matched.
    pub grammar: &'static str,
}

/// Filename metadata after resolution against the store.
#[derive(Debug, Clone, Default)]
pub struct ResolvedMetadata {
    /// Resolved (possibly newly created) correspondent.
    pub correspondent: Option<Correspondent>,
    /// Resolved (possibly newly created) tags.
    pub tags: Vec<Tag>,
}
