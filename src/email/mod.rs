//! Email header extraction from message files.
//!
//! Only the header section is parsed, and only from the first
//! [`HEADER_READ_LIMIT`] bytes of the file. The result feeds message
//! correlation (thread reconstruction by `Message-ID` / `In-Reply-To` /
//! `References`), so values are normalized but otherwise untouched.

mod encoded_word;

pub use encoded_word::decode_encoded_words;

use std::collections::HashMap;
use std::path::Path;

use chrono::DateTime;
use serde::Serialize;
use tokio::io::AsyncReadExt;

use crate::outcome::{Failure, Outcome};

/// Bytes read from the start of a message.
pub const HEADER_READ_LIMIT: usize = 65_536;

/// Normalized header fields of one message.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailHeaders {
    /// `Message-ID`.
    pub message_id: Option<String>,
    /// `In-Reply-To`.
    pub in_reply_to: Option<String>,
    /// `<...>` identifiers from `References`, in order.
    pub references: Vec<String>,
    /// `Subject`, encoded words decoded.
    pub subject: Option<String>,
    /// `From`.
    pub from: Option<String>,
    /// `To`.
    pub to: Option<String>,
    /// `Cc`.
    pub cc: Option<String>,
    /// `Date` as written.
    pub date: Option<String>,
    /// `Date` as RFC 3339, when it parses.
    pub date_iso: Option<String>,
}

/// Read and parse the headers of the message at `path`.
pub async fn parse_headers(path: &Path) -> Outcome<EmailHeaders> {
    match read_head(path).await {
        Ok(buf) => Outcome::Success(parse_header_bytes(&buf)),
        Err(e) => {
            let kind = if e.kind() == std::io::ErrorKind::NotFound {
                "not_found"
            } else {
                "io"
            };
            tracing::info!(path = %path.display(), error = %e, "cannot read message file");
            Outcome::Failure(
                Failure::new(kind, format!("cannot read {}: {e}", path.display()))
                    .with("path", path.display().to_string()),
            )
        }
    }
}

async fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = tokio::fs::File::open(path).await?;
    let mut buf = Vec::with_capacity(8 * 1024);
    file.take(HEADER_READ_LIMIT as u64)
        .read_to_end(&mut buf)
        .await?;
    Ok(buf)
}

/// Parse headers from the start of a raw message.
///
/// The header section ends at the first blank line (`\r\n\r\n` or `\n\n`,
/// whichever comes first). Without one the whole buffer is treated as
/// headers.
pub fn parse_header_bytes(buf: &[u8]) -> EmailHeaders {
    let end = [find(buf, b"\r\n\r\n"), find(buf, b"\n\n")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(buf.len());
    let text = String::from_utf8_lossy(&buf[..end]).replace("\r\n", "\n");

    let headers = collect_headers(&text);
    let get = |name: &str| headers.get(name).cloned();

    let date = get("date");
    let date_iso = date.as_deref().and_then(|d| {
        DateTime::parse_from_rfc2822(d.trim())
            .ok()
            .map(|d| d.to_rfc3339())
    });

    EmailHeaders {
        message_id: get("message-id"),
        in_reply_to: get("in-reply-to"),
        references: headers
            .get("references")
            .map(|r| split_message_ids(r))
            .unwrap_or_default(),
        subject: get("subject"),
        from: get("from"),
        to: get("to"),
        cc: get("cc"),
        date,
        date_iso,
    }
}

/// Unfold, merge and decode every header, keyed by lowercase name.
fn collect_headers(text: &str) -> HashMap<String, String> {
    let mut occurrences: Vec<(String, String)> = Vec::new();
    for line in text.split('\n') {
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = occurrences.last_mut() {
                value.push('\n');
                value.push_str(line);
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if !name.is_empty() {
                occurrences.push((name.to_ascii_lowercase(), value.to_string()));
            }
        }
    }

    let mut merged: HashMap<String, String> = HashMap::new();
    for (name, value) in occurrences {
        let value = collapse_folds(&value);
        merged
            .entry(name)
            .and_modify(|existing| {
                existing.push('\n');
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    merged
        .into_iter()
        .map(|(name, value)| (name, decode_encoded_words(&value)))
        .collect()
}

/// Join folded lines with single spaces.
fn collapse_folds(value: &str) -> String {
    value
        .split('\n')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Every `<...>` span, brackets included.
fn split_message_ids(value: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut rest = value;
    while let Some(open) = rest.find('<') {
        let tail = &rest[open..];
        let Some(close) = tail[1..].find(['<', '>']).map(|i| i + 1) else {
            break;
        };
        if tail.as_bytes()[close] == b'>' {
            ids.push(tail[..=close].to_string());
            rest = &tail[close + 1..];
        } else {
            // `<` reopened before closing; restart there
            rest = &tail[close..];
        }
    }
    ids
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
