//! Streaming MBOX indexer.
//!
//! Walks a mailbox file once through a [`ChunkedReader`], recording for every
//! message its starting byte offset and the few headers the model needs.
//! Bodies are never read here; [`locate_body`] finds a body span later by
//! replaying the same header walk from a recorded offset.

use std::fs::File;
use std::io::{Read, Seek};
use std::ops::Range;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{MboxError, Result};
use crate::model::message::MessageHeaders;
use crate::parser::chunked::{decode_text, ChunkedReader};
use crate::parser::header::{
    parse_date, parse_references, HeaderFieldDecoder, HeaderName, HEADER_NAMES,
};

/// Record separator: CR LF followed by `From `.
pub const SEPARATOR: &[u8] = b"\r\nFrom ";

/// Longest header name (with colon) in [`HEADER_NAMES`].
const MAX_NAME_LEN: usize = 16;

/// Progress is reported every 4 MB.
const PROGRESS_INTERVAL: u64 = 4 * 1024 * 1024;

/// Output record for one message: where it starts and what its headers say.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedMessage {
    /// Absolute offset of the first header byte.
    pub offset: u64,
    pub headers: MessageHeaders,
}

/// A header that could not be decoded and was replaced by a default.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexWarning {
    /// Offset of the message carrying the header.
    pub offset: u64,
    pub header: HeaderName,
    pub message: String,
}

impl std::fmt::Display for IndexWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "message at offset {}: {} header: {}",
            self.offset, self.header, self.message
        )
    }
}

/// Result of a full indexing pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageIndex {
    /// Messages in file order; offsets strictly increase.
    pub messages: Vec<IndexedMessage>,
    pub warnings: Vec<IndexWarning>,
}

/// Header/boundary state machine driving a [`ChunkedReader`].
pub struct MessageIndexer<'a, R> {
    reader: ChunkedReader<R>,
    decoder: HeaderFieldDecoder<'a>,
    warnings: Vec<IndexWarning>,
    total_bytes: u64,
}

impl<'a> MessageIndexer<'a, File> {
    /// Open an mbox file for indexing.
    pub fn open(
        path: impl AsRef<Path>,
        chunk_size: usize,
        decoder: HeaderFieldDecoder<'a>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| MboxError::open(path, e))?;
        let reader = ChunkedReader::open(path, chunk_size)?;
        Ok(Self::new(reader, decoder).with_total_bytes(metadata.len()))
    }
}

impl<'a, R: Read + Seek> MessageIndexer<'a, R> {
    pub fn new(reader: ChunkedReader<R>, decoder: HeaderFieldDecoder<'a>) -> Self {
        Self {
            reader,
            decoder,
            warnings: Vec::new(),
            total_bytes: 0,
        }
    }

    /// Size announced to progress callbacks.
    pub fn with_total_bytes(mut self, total_bytes: u64) -> Self {
        self.total_bytes = total_bytes;
        self
    }

    /// Index every message from the reader's current position to end of stream.
    ///
    /// `progress` receives `(bytes_scanned, total_bytes)`.
    pub fn index_all(&mut self, progress: Option<&dyn Fn(u64, u64)>) -> Result<MessageIndex> {
        let mut messages: Vec<IndexedMessage> = Vec::new();
        let mut last_progress: u64 = 0;

        if !self.reader.at_end()? {
            loop {
                let offset = self.reader.position();
                let (headers, blank_line) = self.read_header_block(offset)?;
                let found = scan_after_headers(&mut self.reader, blank_line)?;
                messages.push(IndexedMessage { offset, headers });

                if let Some(cb) = progress {
                    let scanned = self.reader.position();
                    if scanned - last_progress >= PROGRESS_INTERVAL {
                        cb(scanned, self.total_bytes.max(scanned));
                        last_progress = scanned;
                    }
                }

                if !found {
                    break;
                }
            }
        }

        let end = self.reader.position();
        if let Some(cb) = progress {
            cb(end, self.total_bytes.max(end));
        }
        debug!(
            source = %self.reader.source().display(),
            count = messages.len(),
            bytes = end,
            "Indexed mailbox"
        );

        Ok(MessageIndex {
            messages,
            warnings: std::mem::take(&mut self.warnings),
        })
    }

    /// Decode the header block starting at the current position.
    ///
    /// `offset` is the message start, used to label warnings. The flag tells
    /// whether the block ended on a blank line.
    fn read_header_block(&mut self, offset: u64) -> Result<(MessageHeaders, bool)> {
        let mut headers = MessageHeaders::default();
        let Self {
            reader,
            decoder,
            warnings,
            ..
        } = self;

        let blank_line = walk_header_block(
            reader,
            Some(&mut |name, reader| {
                let value = HeaderFieldDecoder::read_folded_value(reader)?;
                store_field(decoder, warnings, &mut headers, offset, name, value);
                Ok(())
            }),
        )?;

        Ok((headers, blank_line))
    }
}

/// Store one decoded header on the message under construction.
fn store_field(
    decoder: &HeaderFieldDecoder<'_>,
    warnings: &mut Vec<IndexWarning>,
    headers: &mut MessageHeaders,
    offset: u64,
    name: HeaderName,
    value: String,
) {
    match name {
        HeaderName::Cc => headers.cc = Some(decoder.parse_contacts(&value)),
        HeaderName::To => headers.to = Some(decoder.parse_contacts(&value)),
        HeaderName::From => headers.from = decoder.parse_contact(&value),
        HeaderName::Subject => headers.subject = value,
        HeaderName::MessageId => headers.id = Some(value),
        HeaderName::References => headers.references = Some(parse_references(&value)),
        HeaderName::Date => {
            headers.date = match parse_date(&value) {
                Ok(date) => date,
                Err(e) => {
                    warn!(offset, value = %value, "Unparseable Date header, using fallback");
                    warnings.push(IndexWarning {
                        offset,
                        header: name,
                        message: e.to_string(),
                    });
                    decoder.fallback_date()
                }
            }
        }
    }
}

type FieldHandler<'h, R> = &'h mut dyn FnMut(HeaderName, &mut ChunkedReader<R>) -> Result<()>;

/// Walk one header block, stopping after the blank CR LF line or at end of stream.
///
/// Each line is dispatched on its first byte. With a handler, a recognized
/// header name hands the reader to it positioned right after the colon;
/// without one every line is skipped. Returns `true` if the block ended on
/// the blank line.
fn walk_header_block<R: Read + Seek>(
    reader: &mut ChunkedReader<R>,
    mut on_field: Option<FieldHandler<'_, R>>,
) -> Result<bool> {
    loop {
        let Some(first) = reader.get()? else {
            return Ok(false);
        };
        match first {
            b'\r' => match reader.get()? {
                Some(b'\n') => return Ok(true),
                None => return Ok(false),
                Some(_) => reader.rewind(1)?,
            },
            b'\n' => {}
            _ => {
                let Some(handler) = on_field.as_deref_mut() else {
                    reader.skip_line()?;
                    continue;
                };
                if let Some(name) = match_header_name(reader, first)? {
                    handler(name, reader)?;
                }
            }
        }
    }
}

/// Compare the rest of a header name after its dispatch byte.
///
/// On a mismatch the consumed bytes are given back and the line is skipped,
/// so nothing is reinterpreted as the start of another header.
fn match_header_name<R: Read + Seek>(
    reader: &mut ChunkedReader<R>,
    first: u8,
) -> Result<Option<HeaderName>> {
    let mut candidates = HEADER_NAMES.iter().filter(|(name, _)| name[0] == first);
    let Some(&(candidate, _)) = candidates.clone().next() else {
        reader.skip_line()?;
        return Ok(None);
    };

    let rest_len = candidate.len() - 1;
    let mut rest = [0u8; MAX_NAME_LEN];
    let got = reader.read(&mut rest[..rest_len])?;
    if got == rest_len {
        if let Some(&(_, header)) = candidates.find(|(name, _)| name[1..] == rest[..rest_len]) {
            return Ok(Some(header));
        }
    }

    reader.rewind(got as u64)?;
    reader.skip_line()?;
    Ok(None)
}

/// Scan forward for [`SEPARATOR`].
///
/// Returns `true` with the reader positioned just past it (the next message's
/// offset), or `false` at end of stream.
pub fn scan_to_next_message<R: Read + Seek>(reader: &mut ChunkedReader<R>) -> Result<bool> {
    let mut matched = 0;
    while let Some(b) = reader.get()? {
        if b == SEPARATOR[matched] {
            matched += 1;
            if matched == SEPARATOR.len() {
                return Ok(true);
            }
        } else if b == SEPARATOR[0] {
            matched = 1;
        } else {
            matched = 0;
        }
    }
    Ok(false)
}

/// Boundary scan following a header block.
///
/// After a blank line the scan starts on that line's CR LF, so a separator
/// right after the headers (empty body) still counts.
fn scan_after_headers<R: Read + Seek>(
    reader: &mut ChunkedReader<R>,
    blank_line: bool,
) -> Result<bool> {
    if blank_line {
        reader.rewind(2)?;
    }
    scan_to_next_message(reader)
}

/// Byte span of the body of the message starting at `offset`.
///
/// The span runs from just after the header block to the next separator
/// (excluded) or to end of stream.
pub fn locate_body<R: Read + Seek>(reader: &mut ChunkedReader<R>, offset: u64) -> Result<Range<u64>> {
    reader.set_position(offset)?;
    let blank_line = walk_header_block(reader, None)?;
    let start = reader.position();
    let end = if scan_after_headers(reader, blank_line)? {
        reader.position() - SEPARATOR.len() as u64
    } else {
        reader.position()
    };
    Ok(start..end.max(start))
}

/// Read and decode the body of the message starting at `offset`.
pub fn read_body<R: Read + Seek>(reader: &mut ChunkedReader<R>, offset: u64) -> Result<String> {
    let span = locate_body(reader, offset)?;
    reader.set_position(span.start)?;
    let mut bytes = vec![0u8; (span.end - span.start) as usize];
    let n = reader.read(&mut bytes)?;
    bytes.truncate(n);
    Ok(decode_text(&bytes))
}
