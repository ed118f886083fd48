//! Tags, correspondents and the match rules they own.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned key of a tag or correspondent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(i64);

impl EntityId {
    /// Creates an entity ID from a raw store key.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw store key.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Algorithm used to evaluate a [`MatchRule`].
///
/// The discriminants are the persisted codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchingAlgorithm {
    /// At least one token must occur as a whole word.
    #[default]
    Any = 1,
    /// Every token must occur as a whole word, in any order.
    All = 2,
    /// The whole pattern must occur as a whole-word phrase.
    Literal = 3,
    /// The pattern is a regular expression.
    Regex = 4,
    /// Partial fuzzy similarity of at least 90.
    Fuzzy = 5,
}

impl MatchingAlgorithm {
    /// Decodes a persisted algorithm code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for any code outside the five defined
    /// algorithms. An unknown algorithm is never treated as "no match".
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(Self::Any),
            2 => Ok(Self::All),
            3 => Ok(Self::Literal),
            4 => Ok(Self::Regex),
            5 => Ok(Self::Fuzzy),
            other => Err(Error::Configuration(format!(
                "unsupported matching algorithm code {other}"
            ))),
        }
    }

    /// Returns the persisted code.
    #[must_use]
    pub const fn code(self) -> i64 {
        self as i64
    }

    /// Parses a configuration name (`any`, `all`, `literal`, `regex`, `fuzzy`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for unknown names.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "any" => Ok(Self::Any),
            "all" => Ok(Self::All),
            "literal" => Ok(Self::Literal),
            "regex" | "regular expression" => Ok(Self::Regex),
            "fuzzy" => Ok(Self::Fuzzy),
            other => Err(Error::Configuration(format!(
                "unsupported matching algorithm '{other}'"
            ))),
        }
    }

    /// Returns the display name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::All => "all",
            Self::Literal => "literal",
            Self::Regex => "regex",
            Self::Fuzzy => "fuzzy",
        }
    }
}

/// A rule for recognizing an entity in document text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchRule {
    /// The rule pattern. Empty patterns never match.
    pub pattern: String,
    /// Evaluation algorithm.
    pub algorithm: MatchingAlgorithm,
    /// Whether case must match exactly.
    pub case_sensitive: bool,
}

impl MatchRule {
    /// Creates a case-insensitive rule.
    #[must_use]
    pub fn new(pattern: impl Into<String>, algorithm: MatchingAlgorithm) -> Self {
        Self {
            pattern: pattern.into(),
            algorithm,
            case_sensitive: false,
        }
    }

    /// Makes the rule case-sensitive.
    #[must_use]
    pub const fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    /// Returns true if the pattern is empty or whitespace.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pattern.trim().is_empty()
    }
}

/// A classification label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Store key.
    pub id: EntityId,
    /// Unique display name.
    pub name: String,
    /// Unique slug used for filename resolution.
    pub slug: String,
    /// Auto-assignment rule.
    pub rule: MatchRule,
    /// Palette index (1-13).
    pub colour: u8,
}

/// The sender or origin of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correspondent {
    /// Store key.
    pub id: EntityId,
    /// Unique display name.
    pub name: String,
    /// Unique slug used for filename resolution.
    pub slug: String,
    /// Auto-assignment rule.
    pub rule: MatchRule,
}

/// Fields needed to create a tag or correspondent.
#[derive(Debug, Clone, Default)]
pub struct NewEntity {
    /// Display name.
    pub name: String,
    /// Auto-assignment rule.
    pub rule: MatchRule,
}

impl NewEntity {
    /// Creates an entity definition with the given name and rule.
    #[must_use]
    pub fn new(name: impl Into<String>, rule: MatchRule) -> Self {
        Self {
            name: name.into(),
            rule,
        }
    }

    /// Creates an entity definition without an auto-assignment rule.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, MatchRule::default())
    }
}

/// Something that can be matched against document text.
pub trait Matchable {
    /// Display name; matching order is by this name.
    fn name(&self) -> &str;
    /// The entity's rule.
    fn rule(&self) -> &MatchRule;
    /// Store key.
    fn id(&self) -> EntityId;
}

impl Matchable for Tag {
    fn name(&self) -> &str {
        &self.name
    }

    fn rule(&self) -> &MatchRule {
        &self.rule
    }

    fn id(&self) -> EntityId {
        self.id
    }
}

impl Matchable for Correspondent {
    fn name(&self) -> &str {
        &self.name
    }

    fn rule(&self) -> &MatchRule {
        &self.rule
    }

    fn id(&self) -> EntityId {
        self.id
    }
}
