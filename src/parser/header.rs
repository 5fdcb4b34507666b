//! Header field decoding: folded values, contact lists, dates and id lists.

use std::io::{Read, Seek};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::DateFallback;
use crate::error::{MboxError, Result};
use crate::model::contact::{Contact, ContactRegistry};
use crate::parser::chunked::{decode_text, ChunkedReader};

/// `Date:` layout, e.g. `Thu, 4 Jan 2024 10:00:00 +0000`.
const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Structured headers recognized by the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderName {
    Cc,
    Date,
    From,
    MessageId,
    References,
    Subject,
    To,
}

impl HeaderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cc => "Cc",
            Self::Date => "Date",
            Self::From => "From",
            Self::MessageId => "Message-Id",
            Self::References => "References",
            Self::Subject => "Subject",
            Self::To => "To",
        }
    }
}

impl std::fmt::Display for HeaderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header names with their colon, as they appear on the wire (case-sensitive).
///
/// Names sharing a first byte must have the same length.
pub(crate) const HEADER_NAMES: &[(&[u8], HeaderName)] = &[
    (b"Cc:", HeaderName::Cc),
    (b"Date:", HeaderName::Date),
    (b"From:", HeaderName::From),
    (b"Message-Id:", HeaderName::MessageId),
    (b"Message-ID:", HeaderName::MessageId),
    (b"Message-id:", HeaderName::MessageId),
    (b"References:", HeaderName::References),
    (b"Subject:", HeaderName::Subject),
    (b"To:", HeaderName::To),
];

/// Turns raw header values into typed fields.
///
/// Contacts are resolved through the injected [`ContactRegistry`].
pub struct HeaderFieldDecoder<'a> {
    registry: &'a ContactRegistry,
    date_fallback: DateFallback,
}

impl<'a> HeaderFieldDecoder<'a> {
    pub fn new(registry: &'a ContactRegistry, date_fallback: DateFallback) -> Self {
        Self {
            registry,
            date_fallback,
        }
    }

    /// Read an unfolded header value starting right after the colon.
    ///
    /// Leading and trailing blanks are dropped. A CR LF followed by SP or HT
    /// continues the value; the line break and the continuation's leading
    /// blanks become a single space. The value ends at a CR LF followed by
    /// anything else (that byte is left unread) or at end of stream.
    pub fn read_folded_value<R: Read + Seek>(reader: &mut ChunkedReader<R>) -> Result<String> {
        let mut raw: Vec<u8> = Vec::with_capacity(128);

        let mut next = reader.get()?;
        while matches!(next, Some(b' ' | b'\t')) {
            next = reader.get()?;
        }

        while let Some(b) = next {
            if b != b'\r' {
                raw.push(b);
                next = reader.get()?;
                continue;
            }
            match reader.get()? {
                Some(b'\n') => match reader.get()? {
                    Some(b' ' | b'\t') => {
                        let mut c = reader.get()?;
                        while matches!(c, Some(b' ' | b'\t')) {
                            c = reader.get()?;
                        }
                        raw.push(b' ');
                        next = c;
                    }
                    Some(_) => {
                        reader.rewind(1)?;
                        break;
                    }
                    None => break,
                },
                // Stray CR inside a value
                other => next = other,
            }
        }

        let text = decode_text(&raw);
        Ok(text.trim().to_string())
    }

    /// Resolve a single member such as `Jane Doe <jane@example.com>`.
    ///
    /// Without angle brackets the whole string is both display name and
    /// address. Returns `None` for blank or unusable input.
    pub fn parse_contact(&self, raw: &str) -> Option<Arc<Contact>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let result = match split_display_address(raw) {
            Some((display, address)) => {
                let mut display = strip_quotes(display);
                if display.is_empty() {
                    display = address.trim().to_string();
                }
                let (first, last) = display.split_once(' ').unwrap_or(("", ""));
                self.registry.intern(first, last, &display, address)
            }
            None => self.registry.intern("", "", raw, raw),
        };

        match result {
            Ok(contact) => Some(contact),
            Err(e) => {
                warn!(value = raw, error = %e, "Skipping unusable contact");
                None
            }
        }
    }

    /// Resolve every member of a `To:`/`Cc:` style list.
    pub fn parse_contacts(&self, raw: &str) -> Vec<Arc<Contact>> {
        split_members(raw)
            .into_iter()
            .filter_map(|member| self.parse_contact(member))
            .collect()
    }

    /// Timestamp substituted for an undecodable `Date:` header.
    pub fn fallback_date(&self) -> DateTime<Utc> {
        match self.date_fallback {
            DateFallback::Epoch => DateTime::UNIX_EPOCH,
            DateFallback::Now => Utc::now(),
        }
    }
}

/// Split a list header into members.
///
/// A comma immediately followed by an ASCII word character starts a new
/// member; the word character stays with it. Commas followed by blanks or
/// inside quoted names are not split points.
pub fn split_members(raw: &str) -> Vec<&str> {
    let bytes = raw.as_bytes();
    let mut members = Vec::new();
    let mut start = 0;
    for i in 0..bytes.len() {
        if bytes[i] == b',' && bytes.get(i + 1).is_some_and(|&b| is_word_byte(b)) {
            members.push(&raw[start..i]);
            start = i + 1;
        }
    }
    members.push(&raw[start..]);
    members
        .into_iter()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .collect()
}

/// Split a `References:` value with the list heuristic.
pub fn parse_references(raw: &str) -> Vec<String> {
    split_members(raw).into_iter().map(str::to_string).collect()
}

/// Parse a `Date:` value.
///
/// A trailing comment such as `(PST)` is ignored.
pub fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    let mut trimmed = raw.trim();
    if trimmed.ends_with(')') {
        if let Some(open) = trimmed.rfind('(') {
            trimmed = trimmed[..open].trim_end();
        }
    }

    DateTime::parse_from_str(trimmed, DATE_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc2822(trimmed))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| MboxError::InvalidDate {
            value: raw.trim().to_string(),
        })
}

/// Match `Display Name <address>`: the shortest non-empty display prefix
/// followed by ` <`, then an address without `>`, closing the string.
fn split_display_address(s: &str) -> Option<(&str, &str)> {
    let inner = s.strip_suffix('>')?;
    for (i, _) in inner.match_indices(" <") {
        if i == 0 {
            continue;
        }
        let address = &inner[i + 2..];
        if !address.is_empty() && !address.contains('>') {
            return Some((&s[..i], address));
        }
    }
    None
}

/// Strip surrounding double-quotes and trim whitespace.
fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

#[inline]
fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
