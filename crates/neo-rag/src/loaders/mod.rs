//! Document loader registry.
//!
//! Maps file extensions (and a few reserved file names) to a parsing strategy
//! and turns one source file into one [`Document`]. Loaders that rely on an
//! optional capability fail fast with [`RagError::MissingDependency`] when the
//! matching cargo feature is compiled out.

mod archive;
pub mod chat;
pub mod html;
mod office;
mod pdf;
pub mod text;
pub mod web;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::IngestionConfig;
use crate::error::{RagError, Result};
use crate::types::Document;

/// Parsing strategy selected for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaderKind {
    Text,
    Json,
    Csv,
    Tsv,
    Email,
    Html,
    Pdf,
    Docx,
    Pptx,
    Spreadsheet,
    Epub,
    LegacyOffice,
    Archive,
    UrlList,
    Chat,
    Code,
}

const DOCUMENT_EXTENSIONS: &[(&str, LoaderKind)] = &[
    ("pdf", LoaderKind::Pdf),
    ("txt", LoaderKind::Text),
    ("md", LoaderKind::Text),
    ("csv", LoaderKind::Csv),
    ("tsv", LoaderKind::Tsv),
    ("html", LoaderKind::Html),
    ("htm", LoaderKind::Html),
    ("eml", LoaderKind::Email),
    ("epub", LoaderKind::Epub),
    ("xls", LoaderKind::Spreadsheet),
    ("xlsx", LoaderKind::Spreadsheet),
    ("ppt", LoaderKind::LegacyOffice),
    ("pptx", LoaderKind::Pptx),
    ("doc", LoaderKind::LegacyOffice),
    ("docx", LoaderKind::Docx),
    ("json", LoaderKind::Json),
    ("zip", LoaderKind::Archive),
];

/// Source-code extensions loaded verbatim with encoding detection.
pub const CODE_EXTENSIONS: &[&str] = &[
    "rs", "py", "go", "java", "kt", "js", "ts", "cpp", "c", "h", "cs", "php", "proto", "rst",
    "rb", "scala", "swift", "sol", "cob", "tex", "markdown",
];

pub struct LoaderRegistry {
    reserved_file_names: Vec<String>,
    url_timeout: Duration,
    archive_depth: usize,
    scratch_dir: Option<PathBuf>,
}

impl LoaderRegistry {
    pub fn new(config: &IngestionConfig) -> Self {
        Self {
            reserved_file_names: config.reserved_file_names.clone(),
            url_timeout: Duration::from_secs(config.url_timeout_secs),
            archive_depth: config.archive_depth,
            scratch_dir: None,
        }
    }

    /// Extract archives under `dir` instead of the system temp directory.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Resolve the loader for `path`, or `None` when the type is unsupported.
    pub fn kind_for(&self, path: &Path) -> Option<LoaderKind> {
        let file_name = path.file_name()?.to_string_lossy();
        if self.reserved_file_names.iter().any(|n| n == file_name.as_ref()) {
            return Some(LoaderKind::UrlList);
        }

        let extension = extension_of(path);
        if extension == "txt" && chat::is_chat_export(path) {
            return Some(LoaderKind::Chat);
        }

        DOCUMENT_EXTENSIONS
            .iter()
            .find(|(ext, _)| *ext == extension)
            .map(|(_, kind)| *kind)
            .or_else(|| {
                CODE_EXTENSIONS
                    .contains(&extension.as_str())
                    .then_some(LoaderKind::Code)
            })
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.kind_for(path).is_some()
    }

    /// Load one file into a [`Document`], dispatching on its extension.
    pub fn load(&self, path: &Path) -> Result<Document> {
        self.load_at_depth(path, 0)
    }

    pub(crate) fn load_at_depth(&self, path: &Path, depth: usize) -> Result<Document> {
        let kind = self
            .kind_for(path)
            .ok_or_else(|| RagError::UnsupportedDocumentType {
                path: path.to_path_buf(),
                extension: extension_of(path),
            })?;
        tracing::debug!(path = %path.display(), ?kind, "loading document");

        match kind {
            LoaderKind::Text | LoaderKind::Code => text::load_text(path),
            LoaderKind::Json => text::load_json(path),
            LoaderKind::Csv => text::load_delimited(path, b','),
            LoaderKind::Tsv => text::load_delimited(path, b'\t'),
            LoaderKind::Email => text::load_email(path),
            LoaderKind::Html => html::load_html(path),
            LoaderKind::Pdf => pdf::load_pdf(path),
            LoaderKind::Docx => office::load_docx(path),
            LoaderKind::Pptx => office::load_pptx(path),
            LoaderKind::Spreadsheet => office::load_spreadsheet(path),
            LoaderKind::Epub => office::load_epub(path),
            LoaderKind::LegacyOffice => Err(RagError::MissingDependency {
                capability: "legacy binary Office documents (.doc/.ppt)",
                hint: "convert the file to .docx or .pptx",
            }),
            LoaderKind::Archive => archive::load_archive(self, path, depth),
            LoaderKind::UrlList => web::load_url_list(path, self.url_timeout),
            LoaderKind::Chat => chat::load_chat(path),
        }
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new(&IngestionConfig::default())
    }
}

pub(crate) fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Reject content that carries no text once whitespace is removed.
pub(crate) fn non_empty(path: &Path, content: String) -> Result<String> {
    if content.trim().is_empty() {
        return Err(RagError::load(path, "no extractable text"));
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_table() {
        let registry = LoaderRegistry::default();
        assert_eq!(registry.kind_for(Path::new("a/report.PDF")), Some(LoaderKind::Pdf));
        assert_eq!(registry.kind_for(Path::new("notes.md")), Some(LoaderKind::Text));
        assert_eq!(registry.kind_for(Path::new("table.tsv")), Some(LoaderKind::Tsv));
        assert_eq!(registry.kind_for(Path::new("book.epub")), Some(LoaderKind::Epub));
        assert_eq!(registry.kind_for(Path::new("main.rs")), Some(LoaderKind::Code));
        assert_eq!(registry.kind_for(Path::new("photo.png")), None);
        assert_eq!(registry.kind_for(Path::new("Makefile")), None);
    }

    #[test]
    fn test_reserved_name_routes_to_url_loader() {
        let registry = LoaderRegistry::default();
        assert_eq!(registry.kind_for(Path::new("dir/builder.url")), Some(LoaderKind::UrlList));
    }

    #[test]
    fn test_chat_naming_convention() {
        let registry = LoaderRegistry::default();
        assert_eq!(
            registry.kind_for(Path::new("whatsapp_chat_family.txt")),
            Some(LoaderKind::Chat)
        );
        assert_eq!(registry.kind_for(Path::new("chat_notes.txt")), Some(LoaderKind::Chat));
        assert_eq!(registry.kind_for(Path::new("my_chat.txt")), Some(LoaderKind::Text));
    }

    #[test]
    fn test_unknown_extension_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.bmp");
        std::fs::write(&path, b"BM").unwrap();

        let err = LoaderRegistry::default().load(&path).unwrap_err();
        match err {
            RagError::UnsupportedDocumentType { extension, .. } => assert_eq!(extension, "bmp"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_legacy_office_reports_missing_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.doc");
        std::fs::write(&path, b"\xD0\xCF\x11\xE0").unwrap();
        assert!(matches!(
            LoaderRegistry::default().load(&path),
            Err(RagError::MissingDependency { .. })
        ));
    }
}
