//! Configuration management.

mod consumption;

pub use consumption::{
    CommandBackendSettings, DisposalPolicy, FilenameTransformSetting, TextBackendSettings,
};

use crate::backends::CommandBackend;
use crate::filename::FilenameParser;
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "papertray";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_METRICS_PORT: u16 = 9090;

/// Main configuration for papertray.
#[derive(Debug, Clone)]
pub struct PapertrayConfig {
    /// Intake directory that is watched for new files.
    pub consumption_dir: Option<PathBuf>,
    /// Root for the database and media.
    pub data_dir: PathBuf,
    /// Blob root; defaults to `<data_dir>/media`.
    pub media_dir: Option<PathBuf>,
    /// Database file; defaults to `<data_dir>/papertray.db`.
    pub database_path: Option<PathBuf>,
    /// Parent of per-file extractor scratch directories.
    pub scratch_dir: Option<PathBuf>,
    /// Delay between watch cycles.
    pub poll_interval: Duration,
    /// What happens to sources after ingestion.
    pub disposal: DisposalPolicy,
    /// Passphrase for encryption at rest. Blobs are stored plain when unset.
    pub passphrase: Option<SecretString>,
    /// Ordered filename rewrites.
    pub filename_transforms: Vec<FilenameTransformSetting>,
    /// Built-in text backend.
    pub text_backend: TextBackendSettings,
    /// External command backends, in registration order.
    pub command_backends: Vec<CommandBackendSettings>,
    /// Log output.
    pub logging: LoggingSettings,
    /// Prometheus exporter.
    pub metrics: MetricsSettings,
}

/// Log output settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
    /// `EnvFilter` directive, e.g. `papertray=debug`.
    pub filter: Option<String>,
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Whether the exporter is installed.
    pub enabled: bool,
    /// HTTP listener port.
    pub port: u16,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: DEFAULT_METRICS_PORT,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Deserialize, Default)]
pub struct ConfigFile {
    /// Intake directory.
    pub consumption_dir: Option<String>,
    /// Data directory.
    pub data_dir: Option<String>,
    /// Media directory.
    pub media_dir: Option<String>,
    /// Database path.
    pub database_path: Option<String>,
    /// Scratch directory.
    pub scratch_dir: Option<String>,
    /// Seconds between watch cycles.
    pub poll_interval_secs: Option<u64>,
    /// `move` or `delete`.
    pub disposal: Option<String>,
    /// Encryption passphrase.
    pub passphrase: Option<String>,
    /// Filename rewrites.
    pub filename_transforms: Option<Vec<FilenameTransformSetting>>,
    /// Text backend section.
    pub text_backend: Option<TextBackendSettings>,
    /// Command backend sections.
    pub command_backends: Option<Vec<CommandBackendSettings>>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Metrics section.
    pub metrics: Option<MetricsSettings>,
}

impl Default for PapertrayConfig {
    fn default() -> Self {
        Self {
            consumption_dir: None,
            data_dir: default_data_dir(),
            media_dir: None,
            database_path: None,
            scratch_dir: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            disposal: DisposalPolicy::default(),
            passphrase: None,
            filename_transforms: Vec::new(),
            text_backend: TextBackendSettings::default(),
            command_backends: Vec::new(),
            logging: LoggingSettings::default(),
            metrics: MetricsSettings::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".papertray"),
        |dirs| dirs.data_dir().join(APP_DIR),
    )
}

impl PapertrayConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or names an
    /// unknown disposal policy.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/papertray/` on macOS)
    /// 2. XDG config dir (`~/.config/papertray/`)
    ///
    /// Returns default configuration if no readable config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join(APP_DIR).join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join(APP_DIR)
                .join("config.toml"),
        ];

        for path in candidates.iter().filter(|p| p.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                },
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `PapertrayConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = file.consumption_dir {
            config.consumption_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = file.data_dir {
            config.data_dir = PathBuf::from(dir);
        }
        config.media_dir = file.media_dir.map(PathBuf::from);
        config.database_path = file.database_path.map(PathBuf::from);
        config.scratch_dir = file.scratch_dir.map(PathBuf::from);
        if let Some(secs) = file.poll_interval_secs {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(disposal) = file.disposal {
            config.disposal = DisposalPolicy::parse(&disposal).ok_or_else(|| {
                Error::Configuration(format!("unknown disposal policy '{disposal}'"))
            })?;
        }
        config.passphrase = file.passphrase.map(SecretString::from);
        if let Some(transforms) = file.filename_transforms {
            config.filename_transforms = transforms;
        }
        if let Some(text) = file.text_backend {
            config.text_backend = text;
        }
        if let Some(backends) = file.command_backends {
            config.command_backends = backends;
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }
        if let Some(metrics) = file.metrics {
            config.metrics = metrics;
        }

        Ok(config)
    }

    /// Applies `PAPERTRAY_*` overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_env_overrides(|key| std::env::var(key).ok());
        self
    }

    /// Applies `PAPERTRAY_*` overrides read through `lookup`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = lookup("PAPERTRAY_CONSUME") {
            self.consumption_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup("PAPERTRAY_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(passphrase) = lookup("PAPERTRAY_PASSPHRASE") {
            self.passphrase = Some(SecretString::from(passphrase));
        }
        if let Some(format) = lookup("PAPERTRAY_LOG_FORMAT") {
            self.logging.format = Some(format);
        }
        if let Some(file) = lookup("PAPERTRAY_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(file));
        }
        if let Some(value) = lookup("PAPERTRAY_METRICS_ENABLED") {
            match parse_bool(&value) {
                Some(enabled) => self.metrics.enabled = enabled,
                None => tracing::warn!(value = %value, "Ignoring invalid PAPERTRAY_METRICS_ENABLED"),
            }
        }
    }

    /// Sets the intake directory.
    #[must_use]
    pub fn with_consumption_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.consumption_dir = Some(path.into());
        self
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Sets the encryption passphrase.
    #[must_use]
    pub fn with_passphrase(mut self, passphrase: SecretString) -> Self {
        self.passphrase = Some(passphrase);
        self
    }

    /// Blob root.
    #[must_use]
    pub fn media_dir(&self) -> PathBuf {
        self.media_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("media"))
    }

    /// Database file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("papertray.db"))
    }

    /// Parent directory for extractor scratch space.
    #[must_use]
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR))
    }

    /// Checks for problems that must stop startup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the intake directory is unset or
    /// missing, the poll interval is zero, no backend is enabled, a backend
    /// or filename transform is invalid, or the passphrase is empty.
    pub fn validate(&self) -> Result<()> {
        let Some(dir) = &self.consumption_dir else {
            return Err(Error::Configuration(
                "no consumption directory configured".to_string(),
            ));
        };
        if !dir.is_dir() {
            return Err(Error::Configuration(format!(
                "consumption directory {} does not exist",
                dir.display()
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Configuration(
                "poll interval must be at least one second".to_string(),
            ));
        }
        if !self.text_backend.enabled && self.command_backends.is_empty() {
            return Err(Error::Configuration(
                "no extraction backends enabled".to_string(),
            ));
        }
        for settings in &self.command_backends {
            CommandBackend::from_settings(settings)?;
        }
        FilenameParser::from_settings(&self.filename_transforms)?;
        if self
            .passphrase
            .as_ref()
            .is_some_and(|p| p.expose_secret().is_empty())
        {
            return Err(Error::Configuration("passphrase is empty".to_string()));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_from_file_merges_onto_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
            consumption_dir = "/srv/inbox"
            data_dir = "/srv/papertray"
            poll_interval_secs = 3
            disposal = "delete"

            [[filename_transforms]]
            pattern = '^scan_(\d+)\.pdf$'
            replacement = "Scanner - scan $1.pdf"

            [text_backend]
            weight = 5

            [[command_backends]]
            name = "pdftotext"
            extensions = ["pdf"]
            weight = 20
            text_command = ["pdftotext", "{input}", "-"]
            "#,
        );

        let config = PapertrayConfig::load_from_file(&path).unwrap();
        assert_eq!(config.consumption_dir, Some(PathBuf::from("/srv/inbox")));
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.disposal, DisposalPolicy::Delete);
        assert_eq!(config.filename_transforms.len(), 1);
        assert!(config.text_backend.enabled);
        assert_eq!(config.text_backend.weight, 5);
        assert_eq!(config.command_backends[0].name, "pdftotext");
        assert_eq!(config.media_dir(), PathBuf::from("/srv/papertray/media"));
        assert_eq!(
            config.database_path(),
            PathBuf::from("/srv/papertray/papertray.db")
        );
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.port, 9090);
    }

    #[test]
    fn test_unknown_disposal_policy_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, r#"disposal = "shred""#);
        let err = PapertrayConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_parse_error_is_operation_failed() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "poll_interval_secs = \"soon\"");
        let err = PapertrayConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, Error::OperationFailed { ref operation, .. } if operation == "parse_config_file"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PAPERTRAY_CONSUME", "/tmp/in"),
            ("PAPERTRAY_PASSPHRASE", "hunter2"),
            ("PAPERTRAY_LOG_FORMAT", "json"),
            ("PAPERTRAY_METRICS_ENABLED", "yes"),
            ("PAPERTRAY_DATA_DIR", ""),
        ]
        .into_iter()
        .collect();
        let mut config = PapertrayConfig::new().with_data_dir("/data");
        config.apply_env_overrides(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.consumption_dir, Some(PathBuf::from("/tmp/in")));
        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(
            config.passphrase.as_ref().map(|p| p.expose_secret().to_string()),
            Some("hunter2".to_string())
        );
        assert_eq!(config.logging.format.as_deref(), Some("json"));
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_passphrase_is_not_debug_printed() {
        let config = PapertrayConfig::new().with_passphrase(SecretString::from("hunter2"));
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_validate_requires_consumption_dir() {
        let err = PapertrayConfig::new().validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let missing = PapertrayConfig::new().with_consumption_dir("/definitely/not/here");
        assert!(missing.validate().is_err());

        let dir = TempDir::new().unwrap();
        assert!(PapertrayConfig::new().with_consumption_dir(dir.path()).validate().is_ok());
    }

    #[test]
    fn test_validate_requires_a_backend() {
        let dir = TempDir::new().unwrap();
        let mut config = PapertrayConfig::new().with_consumption_dir(dir.path());
        config.text_backend.enabled = false;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("no extraction backends"));
    }

    #[test]
    fn test_validate_rejects_bad_transform() {
        let dir = TempDir::new().unwrap();
        let mut config = PapertrayConfig::new().with_consumption_dir(dir.path());
        config.filename_transforms.push(FilenameTransformSetting {
            pattern: "(unclosed".to_string(),
            replacement: String::new(),
        });
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_empty_passphrase() {
        let dir = TempDir::new().unwrap();
        let config = PapertrayConfig::new()
            .with_consumption_dir(dir.path())
            .with_passphrase(SecretString::from(""));
        assert!(config.validate().is_err());
    }
}
