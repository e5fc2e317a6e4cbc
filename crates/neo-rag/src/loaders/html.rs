use std::path::Path;

use super::{non_empty, text::read_decoded};
use crate::error::Result;
use crate::types::Document;

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "h1", "h2", "h3", "h4", "h5", "h6", "li", "tr", "section", "article",
    "header", "footer", "blockquote", "pre", "title",
];

pub(crate) fn load_html(path: &Path) -> Result<Document> {
    let (raw, encoding) = read_decoded(path)?;
    let mut document =
        Document::new(non_empty(path, strip_html(&raw))?, path).with_encoding(encoding);
    if let Some(title) = extract_title(&raw) {
        document = document.with_extra("title", title);
    }
    Ok(document)
}

/// Contents of the first `<title>` element, entity-decoded.
pub fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;
    let title = decode_entities(html[start..end].trim());
    (!title.is_empty()).then_some(title)
}

/// Strip HTML tags and decode common entities, returning visible text content.
pub fn strip_html(html: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `html`.
    let lower = html.to_ascii_lowercase();
    let mut result = String::with_capacity(html.len() / 2);
    let mut last_was_whitespace = false;
    let mut pos = 0;

    while pos < html.len() {
        let rest = &lower[pos..];

        if rest.starts_with("<script") || rest.starts_with("<style") {
            let closing = if rest.starts_with("<script") { "</script>" } else { "</style>" };
            pos = match rest.find(closing) {
                Some(end) => pos + end + closing.len(),
                None => html.len(),
            };
            continue;
        }
        if rest.starts_with("<!--") {
            pos = match rest.find("-->") {
                Some(end) => pos + end + 3,
                None => html.len(),
            };
            continue;
        }

        if rest.starts_with('<') {
            let tag_end = rest.find('>').map(|e| pos + e + 1).unwrap_or(html.len());
            let name = tag_name(&lower[pos..tag_end]);

            if BLOCK_TAGS.contains(&name) && !result.is_empty() && !result.ends_with('\n') {
                result.push('\n');
                last_was_whitespace = true;
            }
            // <td> / <th> get a tab separator
            if (name == "td" || name == "th")
                && !rest.starts_with("</")
                && !result.is_empty()
                && !result.ends_with('\n')
                && !result.ends_with('\t')
            {
                result.push('\t');
            }

            pos = tag_end;
            continue;
        }

        let text_end = rest.find('<').map(|e| pos + e).unwrap_or(html.len());
        for ch in decode_entities(&html[pos..text_end]).chars() {
            if ch.is_whitespace() {
                if !last_was_whitespace && !result.is_empty() {
                    result.push(if ch == '\n' { '\n' } else { ' ' });
                    last_was_whitespace = true;
                }
            } else {
                result.push(ch);
                last_was_whitespace = false;
            }
        }
        pos = text_end;
    }

    // Clean up excessive blank lines
    let mut cleaned = String::with_capacity(result.len());
    let mut blank_lines = 0;
    for line in result.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            blank_lines += 1;
            if blank_lines <= 1 && !cleaned.is_empty() {
                cleaned.push('\n');
            }
        } else {
            blank_lines = 0;
            if !cleaned.is_empty() && !cleaned.ends_with('\n') {
                cleaned.push('\n');
            }
            cleaned.push_str(trimmed);
        }
    }

    cleaned.trim_end().to_string()
}

fn tag_name(tag: &str) -> &str {
    tag.trim_start_matches('<')
        .trim_start_matches('/')
        .split(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .next()
        .unwrap_or("")
}

pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
