//! OOXML (docx/pptx), spreadsheet and EPUB loaders. All of these are zip containers
//! except legacy `.xls`, which calamine reads directly.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::{html, non_empty};
use crate::error::{RagError, Result};
use crate::types::Document;

type Archive = zip::ZipArchive<File>;

fn open_zip(path: &Path, what: &str) -> Result<Archive> {
    let file = File::open(path)?;
    zip::ZipArchive::new(file)
        .map_err(|e| RagError::load(path, format!("failed to read {} as zip: {}", what, e)))
}

fn read_entry(archive: &mut Archive, name: &str) -> Option<String> {
    let mut entry = archive.by_name(name).ok()?;
    let mut content = String::new();
    entry.read_to_string(&mut content).ok()?;
    Some(content)
}

pub(crate) fn load_docx(path: &Path) -> Result<Document> {
    let mut archive = open_zip(path, "DOCX")?;
    let xml = read_entry(&mut archive, "word/document.xml")
        .ok_or_else(|| RagError::load(path, "DOCX missing word/document.xml"))?;

    let text = non_empty(path, extract_run_text(&xml, "w"))?;
    Ok(Document::new(text, path))
}

/// Parse PPTX by extracting text from each slide's XML.
pub(crate) fn load_pptx(path: &Path) -> Result<Document> {
    let mut archive = open_zip(path, "PPTX")?;
    let mut slides: Vec<(usize, String)> = Vec::new();

    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(e) => e,
            Err(_) => continue,
        };

        let name = entry.name().to_string();
        // Slide XML files: ppt/slides/slide1.xml, slide2.xml, ...
        if !name.starts_with("ppt/slides/slide") || !name.ends_with(".xml") {
            continue;
        }

        let slide_num = name
            .trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<usize>()
            .unwrap_or(0);

        let mut xml = String::new();
        if entry.read_to_string(&mut xml).is_ok() {
            let text = extract_run_text(&xml, "a");
            if !text.is_empty() {
                slides.push((slide_num, text));
            }
        }
    }

    if slides.is_empty() {
        return Err(RagError::load(path, "PPTX contains no extractable text"));
    }

    slides.sort_by_key(|(num, _)| *num);
    let slide_count = slides.len();
    let text = slides
        .into_iter()
        .map(|(num, text)| format!("--- Slide {} ---\n{}", num, text))
        .collect::<Vec<_>>()
        .join("\n\n");

    Ok(Document::new(text, path).with_extra("slides", slide_count.to_string()))
}

/// Collect `<ns:t>` runs, one output line per `<ns:p>` paragraph.
///
/// Word uses the `w` namespace, DrawingML slides use `a`.
pub fn extract_run_text(xml: &str, ns: &str) -> String {
    let p_open = format!("<{}:p", ns);
    let p_close = format!("</{}:p>", ns);
    let t_open = format!("<{}:t", ns);
    let t_close = format!("</{}:t>", ns);

    let mut result = String::new();
    let mut pos = 0;

    while let Some(p_start) = xml[pos..].find(&p_open) {
        let abs_p_start = pos + p_start;
        // <w:pPr>, <w:proofErr> and friends are not paragraphs
        if !is_tag_boundary(&xml[abs_p_start + p_open.len()..]) {
            pos = abs_p_start + p_open.len();
            continue;
        }
        let p_end = xml[abs_p_start..]
            .find(&p_close)
            .map(|e| abs_p_start + e + p_close.len())
            .unwrap_or(xml.len());

        let paragraph = &xml[abs_p_start..p_end];
        let mut para_text = String::new();
        let mut t_pos = 0;

        while let Some(t_start) = paragraph[t_pos..].find(&t_open) {
            let abs_t_start = t_pos + t_start;
            let after_tag = abs_t_start + t_open.len();
            // skip lookalikes such as <w:tab/> or <a:tbl>
            if !is_tag_boundary(&paragraph[after_tag..]) {
                t_pos = after_tag;
                continue;
            }
            let Some(tag_end) = paragraph[abs_t_start..].find('>') else {
                break;
            };
            let content_start = abs_t_start + tag_end + 1;
            match paragraph[content_start..].find(&t_close) {
                Some(t_end) => {
                    para_text.push_str(&paragraph[content_start..content_start + t_end]);
                    t_pos = content_start + t_end + t_close.len();
                }
                None => t_pos = content_start,
            }
        }

        if !para_text.is_empty() {
            if !result.is_empty() {
                result.push('\n');
            }
            result.push_str(&html::decode_entities(&para_text));
        }

        pos = p_end;
    }

    result
}

fn is_tag_boundary(rest: &str) -> bool {
    matches!(rest.chars().next(), Some('>') | Some(' '))
}

#[cfg(feature = "office")]
pub(crate) fn load_spreadsheet(path: &Path) -> Result<Document> {
    use calamine::{open_workbook_auto, Reader};

    let mut workbook = open_workbook_auto(path)
        .map_err(|e| RagError::load(path, format!("failed to open spreadsheet: {}", e)))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err(RagError::load(path, "spreadsheet has no sheets"));
    }

    let mut all_text = String::new();
    let mut total_rows = 0usize;

    for sheet_name in &sheet_names {
        let range = match workbook.worksheet_range(sheet_name) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(sheet = %sheet_name, error = %e, "skipping unreadable sheet");
                continue;
            }
        };

        if range.is_empty() {
            continue;
        }

        if sheet_names.len() > 1 {
            all_text.push_str(&format!("\n--- Sheet: {} ---\n", sheet_name));
        }

        for row in range.rows() {
            let cells: Vec<String> = row.iter().map(cell_to_string).collect();
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            all_text.push_str(&cells.join(" | "));
            all_text.push('\n');
            total_rows += 1;
        }
    }

    let text = non_empty(path, all_text)?;
    Ok(Document::new(text.trim().to_string(), path)
        .with_extra("sheets", sheet_names.len().to_string())
        .with_extra("rows", total_rows.to_string()))
}

#[cfg(not(feature = "office"))]
pub(crate) fn load_spreadsheet(_path: &Path) -> Result<Document> {
    Err(RagError::MissingDependency {
        capability: "spreadsheet reading",
        hint: "rebuild with `--features office`",
    })
}

/// Convert a calamine cell to a clean string representation.
#[cfg(feature = "office")]
fn cell_to_string(cell: &calamine::Data) -> String {
    use calamine::Data;

    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            // Use integer display when the float is a whole number (e.g. 1500.0 → "1500")
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                (*f as i64).to_string()
            } else {
                format!("{:.4}", f).trim_end_matches('0').trim_end_matches('.').to_string()
            }
        }
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => format!("#ERR:{:?}", e),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}

static ROOTFILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"full-path="([^"]+)""#).expect("rootfile regex is valid"));
static MANIFEST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(?:opf:)?item\b[^>]*>").expect("manifest regex is valid"));
static ITEMREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(?:opf:)?itemref\b[^>]*idref="([^"]+)""#).expect("itemref regex is valid")
});

fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!(" {}=\"", name);
    let start = tag.find(&needle)? + needle.len();
    let end = start + tag[start..].find('"')?;
    Some(&tag[start..end])
}

/// Chapters in spine order, falling back to archive order when the package
/// document cannot be resolved.
pub(crate) fn load_epub(path: &Path) -> Result<Document> {
    let mut archive = open_zip(path, "EPUB")?;
    let chapters = spine_order(&mut archive).unwrap_or_else(|| {
        let mut names: Vec<String> = archive
            .file_names()
            .filter(|n| n.ends_with(".xhtml") || n.ends_with(".html") || n.ends_with(".htm"))
            .map(str::to_string)
            .collect();
        names.sort();
        names
    });

    let mut sections = Vec::new();
    for name in &chapters {
        match read_entry(&mut archive, name) {
            Some(markup) => {
                let text = html::strip_html(&markup);
                if !text.trim().is_empty() {
                    sections.push(text);
                }
            }
            None => tracing::debug!(entry = %name, "EPUB chapter missing from archive"),
        }
    }

    let text = non_empty(path, sections.join("\n\n"))?;
    Ok(Document::new(text, path).with_extra("chapters", sections.len().to_string()))
}

fn spine_order(archive: &mut Archive) -> Option<Vec<String>> {
    let container = read_entry(archive, "META-INF/container.xml")?;
    let opf_path = ROOTFILE_RE.captures(&container)?.get(1)?.as_str().to_string();
    let opf = read_entry(archive, &opf_path)?;
    let base = match opf_path.rfind('/') {
        Some(idx) => &opf_path[..=idx],
        None => "",
    };

    let manifest: Vec<(&str, &str)> = MANIFEST_ITEM_RE
        .find_iter(&opf)
        .filter_map(|m| Some((attribute(m.as_str(), "id")?, attribute(m.as_str(), "href")?)))
        .collect();

    let order: Vec<String> = ITEMREF_RE
        .captures_iter(&opf)
        .filter_map(|caps| {
            let idref = caps.get(1)?.as_str();
            manifest
                .iter()
                .find(|(id, _)| *id == idref)
                .map(|(_, href)| format!("{}{}", base, href))
        })
        .collect();

    (!order.is_empty()).then_some(order)
}
