//! Plain-text family loaders: text, source code, JSON, CSV/TSV and email.

use std::path::Path;

use serde_json::Value;

use super::{html, non_empty};
use crate::error::{RagError, Result};
use crate::types::Document;

/// Decode raw bytes, reporting the encoding that was used.
///
/// Honors UTF-8 and UTF-16 byte-order marks, then tries strict UTF-8 and
/// finally falls back to Latin-1, which maps every byte to a code point.
pub fn decode_text(bytes: &[u8]) -> (String, &'static str) {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return (String::from_utf8_lossy(rest).into_owned(), "utf-8-sig");
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return (decode_utf16(rest, u16::from_le_bytes), "utf-16-le");
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return (decode_utf16(rest, u16::from_be_bytes), "utf-16-be");
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), "utf-8"),
        Err(_) => (bytes.iter().map(|&b| b as char).collect(), "iso-8859-1"),
    }
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

pub(crate) fn read_decoded(path: &Path) -> Result<(String, &'static str)> {
    let bytes = std::fs::read(path)?;
    Ok(decode_text(&bytes))
}

pub(crate) fn load_text(path: &Path) -> Result<Document> {
    let (content, encoding) = read_decoded(path)?;
    let content = non_empty(path, content)?;
    Ok(Document::new(content, path).with_encoding(encoding))
}

pub(crate) fn load_json(path: &Path) -> Result<Document> {
    let (raw, encoding) = read_decoded(path)?;
    let value: Value = serde_json::from_str(&raw)
        .map_err(|e| RagError::load(path, format!("invalid JSON: {}", e)))?;

    let mut lines = Vec::new();
    flatten_json(&value, String::new(), &mut lines);
    let content = non_empty(path, lines.join("\n"))?;
    Ok(Document::new(content, path).with_encoding(encoding))
}

/// Render a JSON value as `path: value` lines, one per leaf.
pub fn flatten_json(value: &Value, prefix: String, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_json(child, path, out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten_json(child, format!("{}[{}]", prefix, i), out);
            }
        }
        Value::Null => {}
        Value::String(s) if prefix.is_empty() => out.push(s.clone()),
        Value::String(s) => out.push(format!("{}: {}", prefix, s)),
        other if prefix.is_empty() => out.push(other.to_string()),
        other => out.push(format!("{}: {}", prefix, other)),
    }
}

/// One block per record, one `header: value` line per non-empty cell.
pub(crate) fn load_delimited(path: &Path, delimiter: u8) -> Result<Document> {
    let (raw, encoding) = read_decoded(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| RagError::load(path, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| RagError::load(path, e))?;
        let lines: Vec<String> = record
            .iter()
            .enumerate()
            .filter(|(_, cell)| !cell.trim().is_empty())
            .map(|(i, cell)| match headers.get(i) {
                Some(h) if !h.is_empty() => format!("{}: {}", h, cell.trim()),
                _ => cell.trim().to_string(),
            })
            .collect();
        if !lines.is_empty() {
            rows.push(lines.join("\n"));
        }
    }

    if rows.is_empty() {
        return Err(RagError::load(path, "table contains no data rows"));
    }
    Ok(Document::new(rows.join("\n\n"), path)
        .with_encoding(encoding)
        .with_extra("rows", rows.len().to_string()))
}

const EMAIL_HEADERS: &[&str] = &["subject", "from", "to", "date"];

pub(crate) fn load_email(path: &Path) -> Result<Document> {
    let (raw, encoding) = read_decoded(path)?;
    let message = parse_email(&raw);
    if message.body.trim().is_empty() && message.headers.is_empty() {
        return Err(RagError::load(path, "no headers or body found"));
    }

    let mut content = String::new();
    for (name, value) in &message.headers {
        if EMAIL_HEADERS.contains(&name.as_str()) {
            content.push_str(&format!("{}: {}\n", capitalize(name), value));
        }
    }
    content.push('\n');
    content.push_str(message.body.trim());

    let mut document = Document::new(content, path).with_encoding(encoding);
    if let Some(subject) = message.header("subject") {
        document = document.with_extra("title", subject);
    }
    Ok(document)
}

#[derive(Debug, Default)]
pub struct EmailMessage {
    /// Header names lowercased, in file order.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl EmailMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Minimal RFC 822 parser: unfolded headers, and the text body of
/// single-part or multipart messages.
pub fn parse_email(raw: &str) -> EmailMessage {
    let raw = raw.replace("\r\n", "\n");
    let (head, body) = raw.split_once("\n\n").unwrap_or((raw.as_str(), ""));
    let headers = parse_headers(head);

    let content_type = find_header(&headers, "content-type").unwrap_or_default();
    let transfer = find_header(&headers, "content-transfer-encoding").unwrap_or_default();

    let body = match boundary_of(&content_type) {
        Some(boundary) => multipart_text(body, &boundary),
        None => decode_part(body, &content_type, &transfer).unwrap_or_default(),
    };

    EmailMessage { headers, body }
}

fn parse_headers(head: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();
    for line in head.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_lowercase(), value.trim().to_string()));
        }
    }
    headers
}

fn find_header(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.clone())
}

fn boundary_of(content_type: &str) -> Option<String> {
    if !content_type.to_lowercase().starts_with("multipart/") {
        return None;
    }
    let idx = content_type.to_lowercase().find("boundary=")?;
    let value = content_type.get(idx + "boundary=".len()..)?;
    let value = value.split(';').next().unwrap_or(value);
    Some(value.trim().trim_matches('"').to_string())
}

/// Prefer text/plain parts; fall back to stripped text/html.
fn multipart_text(body: &str, boundary: &str) -> String {
    let delimiter = format!("--{}", boundary);
    let mut plain = Vec::new();
    let mut html_parts = Vec::new();

    for part in body.split(delimiter.as_str()).skip(1) {
        if part.starts_with("--") {
            break;
        }
        let part = part.trim_start_matches('\n');
        let (head, content) = part.split_once("\n\n").unwrap_or((part, ""));
        let headers = parse_headers(head);
        let content_type =
            find_header(&headers, "content-type").unwrap_or_else(|| "text/plain".into());
        let transfer = find_header(&headers, "content-transfer-encoding").unwrap_or_default();

        if let Some(nested) = boundary_of(&content_type) {
            plain.push(multipart_text(content, &nested));
            continue;
        }
        let lowered = content_type.to_lowercase();
        if let Some(text) = decode_part(content, &content_type, &transfer) {
            if lowered.starts_with("text/html") {
                html_parts.push(text);
            } else {
                plain.push(text);
            }
        }
    }

    if plain.iter().any(|p| !p.trim().is_empty()) {
        plain.join("\n")
    } else {
        html_parts.join("\n")
    }
}

/// Decode one text part; non-text parts and base64 payloads are skipped.
fn decode_part(content: &str, content_type: &str, transfer: &str) -> Option<String> {
    let content_type = content_type.to_lowercase();
    if !content_type.is_empty() && !content_type.starts_with("text/") {
        return None;
    }
    let decoded = match transfer.to_lowercase().as_str() {
        "quoted-printable" => decode_quoted_printable(content),
        "base64" => return None,
        _ => content.to_string(),
    };
    if content_type.starts_with("text/html") {
        Some(html::strip_html(&decoded))
    } else {
        Some(decoded)
    }
}

pub fn decode_quoted_printable(input: &str) -> String {
    let joined = input.replace("=\n", "");
    let bytes = joined.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'=' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    decode_text(&out).0
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_detects_encodings() {
        assert_eq!(decode_text(b"plain").1, "utf-8");
        assert_eq!(decode_text(b"\xEF\xBB\xBFbom").0, "bom");
        assert_eq!(decode_text(&[0xFF, 0xFE, b'h', 0, b'i', 0]), ("hi".to_string(), "utf-16-le"));

        let (latin, encoding) = decode_text(b"caf\xE9");
        assert_eq!(latin, "café");
        assert_eq!(encoding, "iso-8859-1");
    }

    #[test]
    fn test_code_file_records_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.py");
        std::fs::write(&path, b"print('h\xE9llo')\n").unwrap();

        let doc = load_text(&path).unwrap();
        assert_eq!(doc.metadata.encoding.as_deref(), Some("iso-8859-1"));
        assert!(doc.content.contains("héllo"));
    }

    #[test]
    fn test_empty_text_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(load_text(&path), Err(RagError::Load { .. })));
    }

    #[test]
    fn test_json_is_flattened() {
        let value: Value = serde_json::from_str(
            r#"{"city": "Paris", "facts": {"country": "France", "tags": ["capital", 1]}, "none": null}"#,
        )
        .unwrap();
        let mut lines = Vec::new();
        flatten_json(&value, String::new(), &mut lines);
        assert!(lines.contains(&"city: Paris".to_string()));
        assert!(lines.contains(&"facts.country: France".to_string()));
        assert!(lines.contains(&"facts.tags[0]: capital".to_string()));
        assert!(lines.contains(&"facts.tags[1]: 1".to_string()));
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_tsv_rows_render_with_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities.tsv");
        std::fs::write(&path, "city\tcountry\nParis\tFrance\nRome\tItaly\n").unwrap();

        let doc = load_delimited(&path, b'\t').unwrap();
        assert!(doc.content.contains("city: Paris\ncountry: France"));
        assert!(doc.content.contains("city: Rome"));
        assert_eq!(doc.metadata.extra.get("rows").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_header_only_csv_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "a,b\n").unwrap();
        assert!(load_delimited(&path, b',').is_err());
    }

    #[test]
    fn test_email_multipart_prefers_plain_text() {
        let raw = "From: alice@example.com\r\nTo: bob@example.com\r\nSubject: Quarterly\r\n report\r\n\
Content-Type: multipart/alternative; boundary=\"XYZ\"\r\n\r\n\
--XYZ\r\nContent-Type: text/plain\r\nContent-Transfer-Encoding: quoted-printable\r\n\r\n\
Revenue grew =3D 12%.\r\n--XYZ\r\nContent-Type: text/html\r\n\r\n<p>Revenue grew</p>\r\n--XYZ--\r\n";

        let message = parse_email(raw);
        assert_eq!(message.header("subject"), Some("Quarterly report"));
        assert!(message.body.contains("Revenue grew = 12%."));
        assert!(!message.body.contains("<p>"));
    }

    #[test]
    fn test_email_document_lists_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.eml");
        std::fs::write(
            &path,
            "Subject: Hello\nFrom: a@b.c\nX-Spam: no\n\nSee you at noon.\n",
        )
        .unwrap();

        let doc = load_email(&path).unwrap();
        assert!(doc.content.starts_with("Subject: Hello\nFrom: a@b.c\n"));
        assert!(!doc.content.contains("X-Spam"));
        assert!(doc.content.ends_with("See you at noon."));
        assert_eq!(doc.metadata.extra.get("title").map(String::as_str), Some("Hello"));
    }
}
