//! WhatsApp text-export loader.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::text::read_decoded;
use crate::error::{RagError, Result};
use crate::types::Document;

static CHAT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(chat_|_chat|whatsapp_|whatsapp_chat|whatsapp_chat_|whatsapp_)")
        .expect("chat name regex is valid")
});

// "[12/03/2024, 09:15:02] Alice: hi" or "12/03/24, 9:15 PM - Alice: hi"
static MESSAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[?\d{1,4}[/.\-]\d{1,2}[/.\-]\d{1,4},?\s+\d{1,2}:\d{2}(?::\d{2})?(?:\s?[APap]\.?[Mm]\.?)?\]?\s*(?:-\s*)?([^:]+?):\s?(.*)$",
    )
    .expect("message regex is valid")
});

static SYSTEM_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[?\d{1,4}[/.\-]\d{1,2}[/.\-]\d{1,4},?\s+\d{1,2}:\d{2}")
        .expect("system line regex is valid")
});

/// Whether the file name follows the chat-export naming convention.
pub fn is_chat_export(path: &Path) -> bool {
    path.file_stem()
        .map(|stem| CHAT_NAME_RE.is_match(&stem.to_string_lossy()))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: String,
    pub content: String,
}

/// Parse an export into messages, merging consecutive runs from one sender.
pub fn parse_whatsapp(raw: &str) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = Vec::new();
    let mut last_was_system = false;

    for line in raw.lines() {
        let line = line
            .trim_start_matches(|c: char| c == '\u{200e}' || c == '\u{feff}')
            .trim_end();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = MESSAGE_RE.captures(line) {
            let sender = caps[1].trim().to_string();
            let content = caps[2].trim().to_string();
            last_was_system = false;
            match messages.last_mut() {
                Some(prev) if prev.sender == sender => {
                    prev.content.push('\n');
                    prev.content.push_str(&content);
                }
                _ => messages.push(ChatMessage { sender, content }),
            }
        } else if SYSTEM_LINE_RE.is_match(line) {
            last_was_system = true;
        } else if !last_was_system {
            // multi-line message continuation
            if let Some(prev) = messages.last_mut() {
                prev.content.push('\n');
                prev.content.push_str(line);
            }
        }
    }

    messages
}

pub(crate) fn load_chat(path: &Path) -> Result<Document> {
    let (raw, encoding) = read_decoded(path)?;
    let messages = parse_whatsapp(&raw);
    if messages.is_empty() {
        return Err(RagError::load(path, "no chat messages found"));
    }

    let mut participants: Vec<&str> = messages.iter().map(|m| m.sender.as_str()).collect();
    participants.sort_unstable();
    participants.dedup();

    let content = messages
        .iter()
        .map(|m| format!("{}: {}", m.sender, m.content))
        .collect::<Vec<_>>()
        .join("\n");

    Ok(Document::new(content, path)
        .with_encoding(encoding)
        .with_extra("type", "chat-whatsapp")
        .with_extra("participants", participants.join(", ")))
}
