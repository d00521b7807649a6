//! File type detection and text extraction.

use std::path::Path;

use hatbot_core::Result;

/// File types the ingester understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    PlainText,
    Markdown,
    Unsupported,
}

impl FileType {
    /// Detect file type from extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "txt" | "text" | "rst" | "adoc" => Self::PlainText,
            "md" | "markdown" | "mdx" => Self::Markdown,
            _ => Self::Unsupported,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unsupported)
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

/// Read the text of a supported file. `None` for unsupported or empty files.
pub fn extract_text(path: &Path) -> Result<Option<String>> {
    if !FileType::from_path(path).is_supported() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(content))
}
