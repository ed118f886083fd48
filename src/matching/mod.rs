//! Content matching of tags and correspondents.
//!
//! Each entity owns a [`MatchRule`]; a rule is compiled once into a
//! [`CompiledRule`] and evaluated against the extracted text.
//!
//! | Algorithm | Passes when |
//! |-----------|-------------|
//! | `Any` | at least one term occurs as a whole word |
//! | `All` | every term occurs as a whole word, in any order |
//! | `Literal` | the whole pattern occurs as a whole-word phrase |
//! | `Regex` | the pattern, as a regular expression, finds a match |
//! | `Fuzzy` | [`partial_ratio`] of the punctuation-stripped texts is at least 90 |
//!
//! Terms are whitespace-separated words or `"quoted phrases"`; whitespace
//! inside a phrase matches any run of whitespace in the text. Terms and
//! literal patterns are escaped, so `c++` or `(draft)` match verbatim.

mod fuzzy;

pub use fuzzy::{FUZZY_THRESHOLD, fuzzy_matches, partial_ratio, strip_punctuation};

use crate::models::{Matchable, MatchRule, MatchingAlgorithm};
use crate::{Error, Result};
use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

static TERMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)"|(\S+)"#).unwrap_or_else(|_| unreachable!()));

/// Splits a rule pattern into terms.
///
/// Quoted spans stay together, internal whitespace is collapsed to a single
/// space, and empty terms are dropped.
///
/// ```
/// use papertray::matching::split_terms;
///
/// assert_eq!(split_terms(r#"bank  "tax   return" 2019"#), ["bank", "tax return", "2019"]);
/// ```
#[must_use]
pub fn split_terms(pattern: &str) -> Vec<String> {
    TERMS
        .captures_iter(pattern)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Regex source for a whole-word occurrence of `term`.
///
/// A word boundary is only required at an edge that is itself a word
/// character; `(net)` would otherwise need letters on both sides.
fn word_pattern(term: &str) -> String {
    let term = term.trim();
    let body = term
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    let lead = if term.chars().next().is_some_and(is_word_char) { r"\b" } else { "" };
    let tail = if term.chars().last().is_some_and(is_word_char) { r"\b" } else { "" };
    format!("{lead}{body}{tail}")
}

/// A [`MatchRule`] compiled for repeated evaluation.
#[derive(Debug, Clone)]
pub enum CompiledRule {
    /// The pattern is empty; never matches.
    Never,
    /// Whole-word terms; `require_all` distinguishes `All` from `Any`.
    Terms {
        /// One regex per term.
        terms: Vec<Regex>,
        /// Whether every term must match.
        require_all: bool,
    },
    /// A single regex (`Literal` or `Regex`).
    Pattern(Regex),
    /// Fuzzy comparison.
    Fuzzy {
        /// The raw pattern.
        pattern: String,
        /// Whether case must match.
        case_sensitive: bool,
    },
}

impl CompiledRule {
    /// Evaluates the rule against `text`.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Never => false,
            Self::Terms { terms, require_all } => {
                if *require_all {
                    terms.iter().all(|re| re.is_match(text))
                } else {
                    terms.iter().any(|re| re.is_match(text))
                }
            },
            Self::Pattern(re) => re.is_match(text),
            Self::Fuzzy {
                pattern,
                case_sensitive,
            } => fuzzy_matches(pattern, text, *case_sensitive),
        }
    }
}

fn build(source: &str, rule: &MatchRule) -> Result<Regex> {
    RegexBuilder::new(source)
        .case_insensitive(!rule.case_sensitive)
        .build()
        .map_err(|e| {
            Error::Configuration(format!(
                "invalid {} match rule '{}': {e}",
                rule.algorithm.as_str(),
                rule.pattern
            ))
        })
}

impl MatchRule {
    /// Compiles the rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a regex rule does not compile.
    pub fn compile(&self) -> Result<CompiledRule> {
        if self.is_empty() {
            return Ok(CompiledRule::Never);
        }
        match self.algorithm {
            MatchingAlgorithm::Any | MatchingAlgorithm::All => {
                let terms = split_terms(&self.pattern)
                    .iter()
                    .map(|t| build(&word_pattern(t), self))
                    .collect::<Result<Vec<_>>>()?;
                Ok(CompiledRule::Terms {
                    terms,
                    require_all: self.algorithm == MatchingAlgorithm::All,
                })
            },
            MatchingAlgorithm::Literal => {
                build(&word_pattern(&self.pattern), self).map(CompiledRule::Pattern)
            },
            MatchingAlgorithm::Regex => build(&self.pattern, self).map(CompiledRule::Pattern),
            MatchingAlgorithm::Fuzzy => Ok(CompiledRule::Fuzzy {
                pattern: self.pattern.clone(),
                case_sensitive: self.case_sensitive,
            }),
        }
    }

    /// Returns true if the rule matches `text`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the rule does not compile.
    pub fn matches(&self, text: &str) -> Result<bool> {
        Ok(self.compile()?.is_match(text))
    }
}

/// Checks that a rule compiles.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if it does not.
pub fn validate_rule(rule: &MatchRule) -> Result<()> {
    rule.compile().map(|_| ())
}

/// Returns every entity whose rule matches `text`, in name order.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if any rule does not compile.
pub fn match_entities<'a, E: Matchable>(entities: &'a [E], text: &str) -> Result<Vec<&'a E>> {
    let mut ordered: Vec<&E> = entities.iter().collect();
    ordered.sort_by(|a, b| a.name().cmp(b.name()));

    let mut matched = Vec::new();
    for entity in ordered {
        if entity.rule().matches(text)? {
            tracing::trace!(entity = entity.name(), "Content rule matched");
            matched.push(entity);
        }
    }
    Ok(matched)
}
