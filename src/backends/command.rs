//! Backends that drive external programs.
//!
//! Each command is an argument vector; `{input}` is replaced with the source
//! file and `{output}` with a file in the extractor's scratch directory. A
//! command without `{output}` is read from its standard output.
//!
//! ```toml
//! [[command_backends]]
//! name = "pdftotext"
//! extensions = ["pdf"]
//! weight = 20
//! text_command = ["pdftotext", "-layout", "{input}", "{output}"]
//! # pdftoppm appends the extension itself, so hand it the path without one
//! thumbnail_command = ["sh", "-c", "pdftoppm -png -singlefile -f 1 \"$0\" \"${1%.png}\"", "{input}", "{output}"]
//! archive_command = ["ocrmypdf", "--skip-text", "{input}", "{output}"]
//! page_count_command = ["sh", "-c", "pdfinfo \"$0\" | awk '/^Pages:/ {print $2}'", "{input}"]
//! timeout_secs = 120
//! ```

use super::{BackendCapability, Extractor, dates, extraction_error, text};
use crate::config::CommandBackendSettings;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const INPUT: &str = "{input}";
const OUTPUT: &str = "{output}";
const POLL_INTERVAL: Duration = Duration::from_millis(25);
const STDERR_TAIL: usize = 512;

/// A backend configured from `[[command_backends]]`.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    name: String,
    extensions: Vec<String>,
    weight: i32,
    text_command: Vec<String>,
    thumbnail_command: Option<Vec<String>>,
    thumbnail_extension: String,
    page_count_command: Option<Vec<String>>,
    archive_command: Option<Vec<String>>,
    timeout: Option<Duration>,
}

impl CommandBackend {
    /// Builds a backend from its settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the name, extensions or text
    /// command are missing.
    pub fn from_settings(settings: &CommandBackendSettings) -> Result<Self> {
        if settings.name.trim().is_empty() {
            return Err(Error::Configuration(
                "command backend without a name".to_string(),
            ));
        }
        if settings.extensions.is_empty() {
            return Err(Error::Configuration(format!(
                "command backend '{}' handles no extensions",
                settings.name
            )));
        }
        if settings.text_command.is_empty() {
            return Err(Error::Configuration(format!(
                "command backend '{}' has no text_command",
                settings.name
            )));
        }

        Ok(Self {
            name: settings.name.clone(),
            extensions: settings
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            weight: settings.weight,
            text_command: settings.text_command.clone(),
            thumbnail_command: settings
                .thumbnail_command
                .clone()
                .filter(|c| !c.is_empty()),
            thumbnail_extension: settings.thumbnail_extension.clone(),
            page_count_command: settings
                .page_count_command
                .clone()
                .filter(|c| !c.is_empty()),
            archive_command: settings
                .archive_command
                .clone()
                .filter(|c| !c.is_empty()),
            timeout: settings
                .timeout_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
        })
    }
}

impl BackendCapability for CommandBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn offer(&self, path: &Path) -> Option<i32> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        self.extensions.contains(&ext).then_some(self.weight)
    }

    fn create(&self, path: &Path, scratch: &Path) -> Result<Box<dyn Extractor>> {
        fs::create_dir_all(scratch).map_err(|e| extraction_error(&self.name, e))?;
        let tempdir = tempfile::Builder::new()
            .prefix("papertray-cmd-")
            .tempdir_in(scratch)
            .map_err(|e| extraction_error(&self.name, e))?;
        Ok(Box::new(CommandExtractor {
            backend: self.clone(),
            input: path.to_path_buf(),
            tempdir: Some(tempdir),
            text: None,
        }))
    }
}

struct CommandExtractor {
    backend: CommandBackend,
    input: PathBuf,
    tempdir: Option<TempDir>,
    text: Option<String>,
}

impl CommandExtractor {
    fn error(&self, cause: impl std::fmt::Display) -> Error {
        extraction_error(&self.backend.name, cause)
    }

    fn scratch(&self) -> Result<PathBuf> {
        self.tempdir
            .as_ref()
            .map(|d| d.path().to_path_buf())
            .ok_or_else(|| self.error("extractor already cleaned up"))
    }

    /// Runs `argv` and returns its standard output.
    fn run(&self, label: &str, argv: &[String], output: &Path) -> Result<Vec<u8>> {
        let scratch = self.scratch()?;
        let input = self.input.to_string_lossy();
        let output_str = output.to_string_lossy();
        let args: Vec<String> = argv
            .iter()
            .map(|a| a.replace(INPUT, &input).replace(OUTPUT, &output_str))
            .collect();
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| self.error(format!("empty {label} command")))?;

        let stdout_path = scratch.join(format!("{label}.stdout"));
        let stderr_path = scratch.join(format!("{label}.stderr"));
        let stdout = File::create(&stdout_path).map_err(|e| self.error(e))?;
        let stderr = File::create(&stderr_path).map_err(|e| self.error(e))?;

        tracing::debug!(backend = %self.backend.name, label, program = %program, "Running command");
        let mut child = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| self.error(format!("cannot run '{program}': {e}")))?;

        let status = self.wait(&mut child, label)?;
        if !status.success() {
            let stderr = fs::read(&stderr_path).unwrap_or_default();
            let tail = &stderr[stderr.len().saturating_sub(STDERR_TAIL)..];
            return Err(self.error(format!(
                "{label} command exited with {status}: {}",
                String::from_utf8_lossy(tail).trim()
            )));
        }

        fs::read(&stdout_path).map_err(|e| self.error(e))
    }

    fn wait(&self, child: &mut std::process::Child, label: &str) -> Result<ExitStatus> {
        let Some(limit) = self.backend.timeout else {
            return child.wait().map_err(|e| self.error(e));
        };

        let deadline = Instant::now() + limit;
        loop {
            if let Some(status) = child.try_wait().map_err(|e| self.error(e))? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(self.error(format!(
                    "{label} command timed out after {}s",
                    limit.as_secs()
                )));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Extractor for CommandExtractor {
    fn text(&mut self) -> Result<String> {
        if let Some(text) = &self.text {
            return Ok(text.clone());
        }
        let output = self.scratch()?.join("text.out");
        let argv = self.backend.text_command.clone();
        let stdout = self.run("text", &argv, &output)?;
        let raw = if argv.iter().any(|a| a.contains(OUTPUT)) {
            fs::read(&output).map_err(|e| self.error(format!("no text output: {e}")))?
        } else {
            stdout
        };
        let text = text::strip_excess_whitespace(&String::from_utf8_lossy(&raw));
        self.text = Some(text.clone());
        Ok(text)
    }

    fn thumbnail(&mut self) -> Result<PathBuf> {
        let scratch = self.scratch()?;
        let Some(argv) = self.backend.thumbnail_command.clone() else {
            let out = scratch.join("thumbnail.svg");
            let rendered = text::render_svg(&self.text()?);
            fs::write(&out, rendered).map_err(|e| self.error(e))?;
            return Ok(out);
        };

        let out = scratch.join(format!("thumbnail.{}", self.backend.thumbnail_extension));
        let stdout = self.run("thumbnail", &argv, &out)?;
        if !argv.iter().any(|a| a.contains(OUTPUT)) {
            fs::write(&out, stdout).map_err(|e| self.error(e))?;
        }
        if !out.is_file() {
            return Err(self.error("thumbnail command produced no file"));
        }
        Ok(out)
    }

    fn date(&mut self) -> Result<Option<DateTime<Utc>>> {
        Ok(dates::first_date(&self.text()?))
    }

    fn page_count(&mut self) -> Result<Option<u32>> {
        let Some(argv) = self.backend.page_count_command.clone() else {
            return Ok(None);
        };
        let out = self.scratch()?.join("pages.out");
        let stdout = self.run("page_count", &argv, &out)?;
        let raw = String::from_utf8_lossy(&stdout);
        raw.trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|e| self.error(format!("invalid page count '{}': {e}", raw.trim())))
    }

    fn archive(&mut self) -> Result<Option<PathBuf>> {
        let Some(argv) = self.backend.archive_command.clone() else {
            return Ok(None);
        };
        let out = self.scratch()?.join("archive.pdf");
        let stdout = self.run("archive", &argv, &out)?;
        if !argv.iter().any(|a| a.contains(OUTPUT)) {
            fs::write(&out, stdout).map_err(|e| self.error(e))?;
        }
        match fs::metadata(&out) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(Some(out)),
            _ => Err(self.error("archive command produced no file")),
        }
    }

    fn cleanup(&mut self) {
        if let Some(dir) = self.tempdir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!(
                    backend = %self.backend.name,
                    path = %path.display(),
                    error = %e,
                    "Failed to remove scratch directory"
                );
            }
        }
    }
}
