//! URL-list loader: a reserved file of newline-separated URLs, each fetched with
//! a bounded timeout. One failing URL is logged and skipped.
//!
//! Video links are loaded as caption transcripts: the watch page is fetched for
//! its title and first caption track, then the timedtext XML is flattened.

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use super::html;
use crate::error::{RagError, Result};
use crate::types::Document;

static CAPTION_TRACK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""captionTracks":\[\{"baseUrl":"((?:[^"\\]|\\.)*)""#)
        .expect("caption track regex is valid")
});

static TRANSCRIPT_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<text\b[^>]*>(.*?)</text>").expect("transcript line regex is valid")
});

/// URLs from a list file, skipping blank lines and `#` comments.
pub fn parse_url_list(raw: &str) -> Vec<&str> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

pub fn is_video_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.contains("youtube.com/watch")
        || lower.contains("youtu.be/")
        || lower.contains("youtube.com/shorts")
}

/// Timedtext URL of the first caption track listed in a watch page.
pub fn caption_track_url(watch_page: &str) -> Option<String> {
    let raw = CAPTION_TRACK_RE.captures(watch_page)?.get(1)?.as_str();
    // embedded as a JSON string literal with \u0026 escapes
    serde_json::from_str::<String>(&format!("\"{}\"", raw)).ok()
}

/// Flatten a timedtext transcript into one caption per line.
pub fn transcript_text(xml: &str) -> String {
    TRANSCRIPT_LINE_RE
        .captures_iter(xml)
        .filter_map(|caps| caps.get(1))
        .map(|text| {
            // caption text arrives double-escaped (`&amp;#39;`)
            let decoded = html::decode_entities(&html::decode_entities(text.as_str()));
            decoded.split_whitespace().collect::<Vec<_>>().join(" ")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Watch-page title without the site suffix.
pub fn video_title(watch_page: &str) -> Option<String> {
    let title = html::extract_title(watch_page)?;
    let title = title.strip_suffix("- YouTube").unwrap_or(&title).trim();
    (!title.is_empty()).then(|| title.to_string())
}

#[cfg(feature = "web")]
pub(crate) fn load_url_list(path: &Path, timeout: Duration) -> Result<Document> {
    let raw = std::fs::read_to_string(path)?;
    let urls = parse_url_list(&raw);
    if urls.is_empty() {
        return Err(RagError::load(path, "URL list is empty"));
    }

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("neo-rag/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| RagError::load(path, format!("failed to build HTTP client: {}", e)))?;

    let mut sections = Vec::new();
    let mut video_titles = Vec::new();
    let mut last_failure: Option<(String, String)> = None;

    for url in &urls {
        let fetched = if is_video_url(url) {
            fetch_transcript(&client, url).map(|(title, transcript)| {
                let header = match &title {
                    Some(title) => format!("--- {} ({}) ---", url, title),
                    None => format!("--- {} ---", url),
                };
                video_titles.push(title.unwrap_or_else(|| url.to_string()));
                format!("{}\n{}", header, transcript)
            })
        } else {
            fetch_page(&client, url).map(|text| format!("--- {} ---\n{}", url, text))
        };

        match fetched {
            Ok(section) => sections.push(section),
            Err(reason) => {
                tracing::warn!(url = %url, error = %reason, "skipping URL");
                last_failure = Some((url.to_string(), reason));
            }
        }
    }

    if sections.is_empty() {
        let (url, reason) = last_failure.unwrap_or_default();
        return Err(RagError::Fetch {
            url,
            reason: format!("all {} URLs failed, last error: {}", urls.len(), reason),
        });
    }

    tracing::info!(
        list = %path.display(),
        fetched = sections.len(),
        videos = video_titles.len(),
        failed = urls.len() - sections.len(),
        "URL list loaded"
    );

    let fetched = sections.len();
    let mut document = Document::new(sections.join("\n\n"), path)
        .with_extra("type", if video_titles.is_empty() { "web" } else { "video" })
        .with_extra("urls", fetched.to_string());
    if !video_titles.is_empty() {
        document = document
            .with_extra("videos", video_titles.len().to_string())
            .with_extra("titles", video_titles.join(" | "));
    }
    Ok(document)
}

#[cfg(feature = "web")]
fn get_text(
    client: &reqwest::blocking::Client,
    url: &str,
) -> std::result::Result<(String, bool), String> {
    let response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| e.to_string())?;

    let is_html = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("html"))
        .unwrap_or(true);

    let body = response.text().map_err(|e| e.to_string())?;
    Ok((body, is_html))
}

#[cfg(feature = "web")]
fn fetch_page(
    client: &reqwest::blocking::Client,
    url: &str,
) -> std::result::Result<String, String> {
    let (body, is_html) = get_text(client, url)?;
    let text = if is_html {
        html::strip_html(&body)
    } else {
        body.trim().to_string()
    };

    if text.is_empty() {
        return Err("page has no text content".to_string());
    }
    Ok(text)
}

#[cfg(feature = "web")]
fn fetch_transcript(
    client: &reqwest::blocking::Client,
    url: &str,
) -> std::result::Result<(Option<String>, String), String> {
    let (page, _) = get_text(client, url)?;
    let title = video_title(&page);
    let track =
        caption_track_url(&page).ok_or_else(|| "video has no caption track".to_string())?;

    let (xml, _) = get_text(client, &track)?;
    let transcript = transcript_text(&xml);
    if transcript.is_empty() {
        return Err("caption track is empty".to_string());
    }
    Ok((title, transcript))
}

#[cfg(not(feature = "web"))]
pub(crate) fn load_url_list(_path: &Path, _timeout: Duration) -> Result<Document> {
    Err(RagError::MissingDependency {
        capability: "web page fetching",
        hint: "rebuild with `--features web`",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_list_skips_comments() {
        let raw = "# research links\nhttps://example.com/a\n\n  https://example.com/b  \n#https://skipped";
        assert_eq!(
            parse_url_list(raw),
            vec!["https://example.com/a", "https://example.com/b"]
        );
    }

    #[test]
    fn test_video_detection() {
        assert!(is_video_url("https://www.youtube.com/watch?v=abc"));
        assert!(is_video_url("https://youtu.be/abc"));
        assert!(!is_video_url("https://example.com/youtube"));
    }

    #[test]
    fn test_caption_track_url_unescapes_json() {
        let page = r#"<script>var ytInitialPlayerResponse = {"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[{"baseUrl":"https://www.youtube.com/api/timedtext?v=abc&lang=en","name":{"simpleText":"English"}}]}}};</script>"#;
        assert_eq!(
            caption_track_url(page).as_deref(),
            Some("https://www.youtube.com/api/timedtext?v=abc&lang=en")
        );
        assert_eq!(caption_track_url("<html>no captions</html>"), None);
    }

    #[test]
    fn test_transcript_text_decodes_captions() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?><transcript><text start="0.5" dur="2.1">Paris is the
capital</text><text start="2.6" dur="1.9">of France &amp;amp; it&amp;#39;s lovely</text><text start="4.5" dur="1"> </text></transcript>"#;
        assert_eq!(
            transcript_text(xml),
            "Paris is the capital\nof France & it's lovely"
        );
    }

    #[test]
    fn test_video_title_drops_site_suffix() {
        let page = "<html><head><title>Touring Paris - YouTube</title></head></html>";
        assert_eq!(video_title(page).as_deref(), Some("Touring Paris"));
        assert_eq!(video_title("<title> - YouTube</title>"), None);
    }

    #[cfg(feature = "web")]
    #[test]
    fn test_all_urls_failing_is_a_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("builder.url");
        // nothing listens on the discard port
        std::fs::write(&path, "http://127.0.0.1:9/\n").unwrap();

        let err = load_url_list(&path, Duration::from_secs(2)).unwrap_err();
        match err {
            RagError::Fetch { url, .. } => assert_eq!(url, "http://127.0.0.1:9/"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(feature = "web")]
    #[test]
    fn test_one_failing_url_is_skipped() {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let live = format!("http://{}/", listener.local_addr().unwrap());
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let body = "<html><body><p>Paris is the capital of France</p></body></html>";
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            )
            .unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("builder.url");
        std::fs::write(&path, format!("http://127.0.0.1:9/\n{}\n", live)).unwrap();

        let document = load_url_list(&path, Duration::from_secs(5)).unwrap();
        server.join().unwrap();

        assert_eq!(
            document.content,
            format!("--- {} ---\nParis is the capital of France", live)
        );
        assert_eq!(document.metadata.extra["type"], "web");
        assert_eq!(document.metadata.extra["urls"], "1");
    }

    #[test]
    fn test_empty_list_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("builder.url");
        std::fs::write(&path, "# nothing yet\n").unwrap();
        assert!(load_url_list(&path, Duration::from_secs(1)).is_err());
    }
}
