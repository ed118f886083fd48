//! Consumption pipeline settings.

use serde::{Deserialize, Serialize};

/// What happens to a source file after it has been ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisposalPolicy {
    /// Copy into `processed/`, then delete the source.
    #[default]
    Move,
    /// Delete the source.
    Delete,
}

impl DisposalPolicy {
    /// Parses a policy name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "move" => Some(Self::Move),
            "delete" | "remove" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Returns the configuration name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Delete => "delete",
        }
    }
}

/// A filename rewrite applied before grammar matching.
///
/// `replacement` uses `$1` / `${name}` group references.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilenameTransformSetting {
    /// Regular expression matched against the basename.
    pub pattern: String,
    /// Replacement text.
    pub replacement: String,
}

/// Settings of the built-in plain text backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextBackendSettings {
    /// Whether the backend is registered.
    pub enabled: bool,
    /// Weight offered for supported files.
    pub weight: i32,
}

impl Default for TextBackendSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: 10,
        }
    }
}

/// A backend that shells out to external tools.
///
/// Command vectors are argv lists; `{input}` and `{output}` are substituted
/// with the source path and a scratch output path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandBackendSettings {
    /// Backend name used in logs and errors.
    pub name: String,
    /// Handled extensions, with or without a leading dot.
    pub extensions: Vec<String>,
    /// Weight offered for handled files.
    pub weight: i32,
    /// Produces the document text.
    pub text_command: Vec<String>,
    /// Produces a thumbnail at `{output}`.
    pub thumbnail_command: Option<Vec<String>>,
    /// Extension of the produced thumbnail.
    pub thumbnail_extension: String,
    /// Prints the page count on stdout.
    pub page_count_command: Option<Vec<String>>,
    /// Produces an archived PDF rendition at `{output}` (or on stdout).
    pub archive_command: Option<Vec<String>>,
    /// Kills a command running longer than this.
    pub timeout_secs: Option<u64>,
}

impl Default for CommandBackendSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            extensions: Vec::new(),
            weight: 0,
            text_command: Vec::new(),
            thumbnail_command: None,
            thumbnail_extension: "png".to_string(),
            page_count_command: None,
            archive_command: None,
            timeout_secs: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposal_policy_parse() {
        assert_eq!(DisposalPolicy::parse("Move"), Some(DisposalPolicy::Move));
        assert_eq!(DisposalPolicy::parse(" delete "), Some(DisposalPolicy::Delete));
        assert_eq!(DisposalPolicy::parse("shred"), None);
        assert_eq!(DisposalPolicy::default(), DisposalPolicy::Move);
    }

    #[test]
    fn test_command_backend_defaults_from_toml() {
        let settings: CommandBackendSettings = toml::from_str(
            r#"
            name = "ocr"
            extensions = ["pdf"]
            text_command = ["ocr", "{input}"]
            "#,
        )
        .unwrap();
        assert_eq!(settings.thumbnail_extension, "png");
        assert_eq!(settings.weight, 0);
        assert!(settings.timeout_secs.is_none());
        assert!(settings.archive_command.is_none());
    }
}
