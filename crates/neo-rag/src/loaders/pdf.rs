use std::path::Path;

use crate::error::{RagError, Result};
use crate::types::Document;

#[cfg(feature = "pdf")]
pub(crate) fn load_pdf(path: &Path) -> Result<Document> {
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(RagError::load(path, "PDF file is empty"));
    }

    // Layer 1: pdf_extract for fast text extraction. It panics on some malformed inputs.
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&bytes));
    match extracted {
        Ok(Ok(text)) => {
            let cleaned = clean_lines(&text);
            if !cleaned.is_empty() {
                return Ok(pdf_document(cleaned, path, "pdf-extract"));
            }
        }
        Ok(Err(e)) => {
            tracing::debug!(path = %path.display(), error = %e, "pdf-extract failed, trying lopdf");
        }
        Err(_) => {
            tracing::warn!(path = %path.display(), "pdf-extract panicked, trying lopdf");
        }
    }

    // Layer 2: lopdf content stream parsing
    let document = lopdf::Document::load_mem(&bytes)
        .map_err(|e| RagError::load(path, format!("not a readable PDF: {}", e)))?;
    let pages: Vec<u32> = document.get_pages().keys().copied().collect();
    let text = document
        .extract_text(&pages)
        .map_err(|e| RagError::load(path, format!("PDF text extraction failed: {}", e)))?;

    let cleaned = clean_lines(&text);
    if cleaned.is_empty() {
        return Err(RagError::load(
            path,
            "PDF contains no extractable text (scanned/image-based)",
        ));
    }
    Ok(pdf_document(cleaned, path, "lopdf").with_extra("pages", pages.len().to_string()))
}

#[cfg(not(feature = "pdf"))]
pub(crate) fn load_pdf(_path: &Path) -> Result<Document> {
    Err(RagError::MissingDependency {
        capability: "PDF text extraction",
        hint: "rebuild with `--features pdf`",
    })
}

#[cfg(feature = "pdf")]
fn pdf_document(content: String, path: &Path, extractor: &str) -> Document {
    Document::new(content, path).with_extra("extractor", extractor)
}

#[cfg_attr(not(feature = "pdf"), allow(dead_code))]
fn clean_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_lines_drops_blank_lines() {
        assert_eq!(clean_lines("  a \n\n\n b\n  "), "a\nb");
    }

    #[test]
    fn test_garbage_pdf_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\nthis is not really a pdf").unwrap();
        assert!(load_pdf(&path).is_err());
    }

    #[cfg(not(feature = "pdf"))]
    #[test]
    fn test_missing_feature_is_reported() {
        let err = load_pdf(Path::new("x.pdf")).unwrap_err();
        assert!(matches!(err, RagError::MissingDependency { .. }));
    }
}
