//! Plain-text backend.

use super::{BackendCapability, Extractor, dates, extraction_error};
use crate::Result;
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const NAME: &str = "text";
const EXTENSIONS: &[&str] = &["txt", "text", "md", "csv"];
const THUMBNAIL_LINES: usize = 50;
const THUMBNAIL_COLUMNS: usize = 80;

/// Collapses runs of spaces and tabs, trims every line and drops trailing
/// blank lines. Line breaks are kept.
#[must_use]
pub fn strip_excess_whitespace(text: &str) -> String {
    let lines: Vec<String> = text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();
    lines.join("\n").trim_end().to_string()
}

/// Handles `txt`, `text`, `md` and `csv` files by reading them directly.
#[derive(Debug, Clone)]
pub struct TextBackend {
    weight: i32,
}

impl TextBackend {
    /// Creates the backend with the given offer weight.
    #[must_use]
    pub const fn new(weight: i32) -> Self {
        Self { weight }
    }
}

impl BackendCapability for TextBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn offer(&self, path: &Path) -> Option<i32> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        EXTENSIONS.contains(&ext.as_str()).then_some(self.weight)
    }

    fn create(&self, path: &Path, scratch: &Path) -> Result<Box<dyn Extractor>> {
        fs::create_dir_all(scratch).map_err(|e| extraction_error(NAME, e))?;
        let tempdir = tempfile::Builder::new()
            .prefix("papertray-text-")
            .tempdir_in(scratch)
            .map_err(|e| extraction_error(NAME, e))?;
        Ok(Box::new(TextExtractor {
            path: path.to_path_buf(),
            tempdir: Some(tempdir),
            text: None,
        }))
    }
}

struct TextExtractor {
    path: PathBuf,
    tempdir: Option<TempDir>,
    text: Option<String>,
}

impl TextExtractor {
    fn scratch(&self) -> Result<&Path> {
        self.tempdir
            .as_ref()
            .map(TempDir::path)
            .ok_or_else(|| extraction_error(NAME, "extractor already cleaned up"))
    }
}

impl Extractor for TextExtractor {
    fn text(&mut self) -> Result<String> {
        if let Some(text) = &self.text {
            return Ok(text.clone());
        }
        let bytes = fs::read(&self.path)
            .map_err(|e| extraction_error(NAME, format!("{}: {e}", self.path.display())))?;
        let text = strip_excess_whitespace(&String::from_utf8_lossy(&bytes));
        self.text = Some(text.clone());
        Ok(text)
    }

    fn thumbnail(&mut self) -> Result<PathBuf> {
        let text = self.text()?;
        let out = self.scratch()?.join("thumbnail.svg");
        fs::write(&out, render_svg(&text)).map_err(|e| extraction_error(NAME, e))?;
        Ok(out)
    }

    fn date(&mut self) -> Result<Option<DateTime<Utc>>> {
        Ok(dates::first_date(&self.text()?))
    }

    fn page_count(&mut self) -> Result<Option<u32>> {
        Ok(None)
    }

    fn cleanup(&mut self) {
        if let Some(dir) = self.tempdir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch directory");
            }
        }
    }
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c if c.is_control() => {},
            c => out.push(c),
        }
    }
    out
}

/// Renders the first lines of `text` onto a letter-shaped page.
pub(crate) fn render_svg(text: &str) -> String {
    let mut svg = String::from(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"500\" height=\"647\">\
         <rect width=\"500\" height=\"647\" rx=\"50\" fill=\"white\"/>\
         <g font-family=\"monospace\" font-size=\"10\" fill=\"black\">",
    );
    for (i, line) in text.lines().take(THUMBNAIL_LINES).enumerate() {
        let line: String = line.chars().take(THUMBNAIL_COLUMNS).collect();
        let y = 20 + i * 12;
        let _ = write!(svg, "<text x=\"10\" y=\"{y}\">{}</text>", escape_xml(&line));
    }
    svg.push_str("</g></svg>");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_offers_text_extensions_only() {
        let backend = TextBackend::new(10);
        assert_eq!(backend.offer(Path::new("a.TXT")), Some(10));
        assert_eq!(backend.offer(Path::new("notes.md")), Some(10));
        assert_eq!(backend.offer(Path::new("a.pdf")), None);
        assert_eq!(backend.offer(Path::new("README")), None);
    }

    #[test]
    fn test_strip_excess_whitespace() {
        assert_eq!(
            strip_excess_whitespace("  a \t b\n    c   d  \n\n   e   "),
            "a b\nc d\n\ne"
        );
    }

    #[test]
    fn test_extracts_text_thumbnail_and_date() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("letter.txt");
        fs::write(&file, "Dear   customer,\n  invoice <42> dated 13.02.2018\n").unwrap();
        let scratch = dir.path().join("scratch");

        let mut extractor = TextBackend::new(10).create(&file, &scratch).unwrap();
        assert_eq!(
            extractor.text().unwrap(),
            "Dear customer,\ninvoice <42> dated 13.02.2018"
        );
        assert_eq!(
            extractor.date().unwrap(),
            Some(Utc.with_ymd_and_hms(2018, 2, 13, 0, 0, 0).unwrap())
        );

        let thumb = extractor.thumbnail().unwrap();
        let svg = fs::read_to_string(&thumb).unwrap();
        assert!(svg.contains("invoice &lt;42&gt;"));
        assert_eq!(extractor.page_count().unwrap(), None);

        extractor.cleanup();
        assert!(!thumb.exists());
        extractor.cleanup();
    }

    #[test]
    fn test_missing_file_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut extractor = TextBackend::new(10)
            .create(&dir.path().join("gone.txt"), dir.path())
            .unwrap();
        assert!(matches!(
            extractor.text(),
            Err(crate::Error::Extraction { .. })
        ));
    }
}
