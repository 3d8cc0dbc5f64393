//! Message normalization
//!
//! Turns the raw RFC 5322 source fetched from the server into a
//! [`MessageSummary`] ready to be rendered by a mail client.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use mail_parser::{Address, MessageParser, PartType};
use serde::{Deserialize, Serialize};

/// Maximum length of [`MessageSummary::preview`], in characters.
pub const PREVIEW_LEN: usize = 100;

// Wide enough that html2text does not wrap a preview-sized paragraph.
const MARKUP_WRAP_WIDTH: usize = 1_000;

/// A message as it came off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Sequence number within the selected folder.
    pub seq: u32,
    pub uid: Option<u32>,
    /// Full message source (headers and body).
    pub source: Vec<u8>,
}

/// Display-ready view of one message.
///
/// Built once by [`normalize`] and never mutated; fetching again yields a
/// new summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    uid: u32,
    subject: String,
    from: String,
    date: Option<DateTime<Utc>>,
    text: Option<String>,
    html: Option<String>,
    preview: String,
}

impl MessageSummary {
    #[must_use]
    pub const fn uid(&self) -> u32 {
        self.uid
    }

    /// Subject line, empty when the header is missing.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Sender as free display text, e.g. `Alice <alice@example.com>`.
    #[must_use]
    pub fn from(&self) -> &str {
        &self.from
    }

    #[must_use]
    pub const fn date(&self) -> Option<DateTime<Utc>> {
        self.date
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    #[must_use]
    pub fn html(&self) -> Option<&str> {
        self.html.as_deref()
    }

    #[must_use]
    pub fn preview(&self) -> &str {
        &self.preview
    }
}

/// Normalize a fetched message.
///
/// Missing headers become empty values. The UID falls back to the sequence
/// number when the server did not report one.
///
/// # Errors
///
/// Returns [`Error::MalformedMessage`] when the source is empty or cannot
/// be parsed as a message at all.
pub fn normalize(raw: &RawMessage) -> Result<MessageSummary> {
    let uid = raw.uid.unwrap_or(raw.seq);

    if raw.source.iter().all(u8::is_ascii_whitespace) {
        return Err(Error::MalformedMessage(format!("empty source for UID {uid}")));
    }

    let message = MessageParser::default()
        .parse(&raw.source[..])
        .ok_or_else(|| Error::MalformedMessage(format!("unparseable source for UID {uid}")))?;

    let text = message.text_part(0).and_then(|part| match &part.body {
        PartType::Text(body) => Some(body.to_string()),
        _ => None,
    });
    let html = message.html_part(0).and_then(|part| match &part.body {
        PartType::Html(body) => Some(body.to_string()),
        _ => None,
    });

    let preview = derive_preview(text.as_deref(), html.as_deref());

    Ok(MessageSummary {
        uid,
        subject: message.subject().unwrap_or_default().to_string(),
        from: message.from().map(display_address).unwrap_or_default(),
        date: message
            .date()
            .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0)),
        text,
        html,
        preview,
    })
}

/// Render an address header the way mail clients show it.
fn display_address(address: &Address<'_>) -> String {
    address
        .iter()
        .filter_map(|addr| {
            let email = addr.address.as_deref().filter(|a| !a.is_empty());
            match (addr.name.as_deref().filter(|n| !n.is_empty()), email) {
                (Some(name), Some(email)) => Some(format!("{name} <{email}>")),
                (Some(name), None) => Some(name.to_string()),
                (None, Some(email)) => Some(email.to_string()),
                (None, None) => None,
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Markup-derived text wins over the plain body when both exist.
fn derive_preview(text: Option<&str>, html: Option<&str>) -> String {
    html.and_then(markup_to_text)
        .or_else(|| text.map(str::to_string))
        .map(|body| truncate_chars(&body, PREVIEW_LEN))
        .unwrap_or_default()
}

fn markup_to_text(html: &str) -> Option<String> {
    let rendered = html2text::from_read(html.as_bytes(), MARKUP_WRAP_WIDTH).ok()?;
    let collapsed = rendered.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
