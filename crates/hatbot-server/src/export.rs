//! Writes generated proposals to disk as HTML and Markdown.

use std::path::{Path, PathBuf};

use pulldown_cmark::{html, Options, Parser};
use tracing::{debug, error};
use uuid::Uuid;

use hatbot_core::{Error, Result};

/// Downloadable document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Html,
    Markdown,
}

impl ExportFormat {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "html" => Some(Self::Html),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Markdown => "md",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Html => "text/html; charset=utf-8",
            Self::Markdown => "text/markdown; charset=utf-8",
        }
    }
}

pub struct DocumentExporter {
    dir: PathBuf,
}

impl DocumentExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the exported document for `session_id`.
    pub fn path(&self, session_id: &str, format: ExportFormat) -> Result<PathBuf> {
        let id = Uuid::parse_str(session_id)
            .map_err(|_| Error::InvalidConfig(format!("invalid session id '{}'", session_id)))?;
        Ok(self
            .dir
            .join(format!("proposal-{}.{}", id, format.extension())))
    }

    /// Write both formats. Failures are logged and otherwise ignored.
    pub fn export(&self, markdown: &str, session_id: &str) {
        if let Err(e) = self.try_export(markdown, session_id) {
            error!("Failed to export document for session {}: {}", session_id, e);
        }
    }

    fn try_export(&self, markdown: &str, session_id: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let md_path = self.path(session_id, ExportFormat::Markdown)?;
        std::fs::write(&md_path, markdown)?;

        let html_path = self.path(session_id, ExportFormat::Html)?;
        std::fs::write(&html_path, render_html(markdown, "Sales Proposal"))?;

        debug!("Exported {} and {}", md_path.display(), html_path.display());
        Ok(())
    }

    pub fn read(&self, session_id: &str, format: ExportFormat) -> Result<Vec<u8>> {
        let path = self.path(session_id, format)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("document for session {}", session_id)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Markdown rendered into a standalone HTML page.
pub fn render_html(markdown: &str, title: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut body = String::new();
    html::push_html(&mut body, Parser::new_ext(markdown, options));

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}</body>\n</html>\n",
        title, body
    )
}
