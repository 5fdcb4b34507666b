//! Buffered, seekable byte reader with bounded rewind.
//!
//! The reader keeps a single fixed-size window over the underlying stream.
//! Sequential reads refill the window as it drains; small backward moves stay
//! inside the window, larger ones reseek the stream. Absolute offsets are
//! tracked exactly so callers can come back to any byte later.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use encoding_rs::{CoderResult, Decoder, Encoding, UTF_8};
use tracing::trace;

use crate::error::{MboxError, Result};

/// Charset used for every piece of text extracted from a mailbox.
pub const TEXT_ENCODING: &Encoding = UTF_8;

/// Default window size (64 KB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Chunked reader over any seekable byte stream.
///
/// The stream must be positioned at offset 0 when handed to [`ChunkedReader::new`];
/// all positions reported by the reader are absolute from there.
pub struct ChunkedReader<R> {
    inner: R,
    source: PathBuf,
    buf: Box<[u8]>,
    /// Cursor inside `buf`.
    pos: usize,
    /// Number of valid bytes in `buf`.
    len: usize,
    /// Absolute offset of `buf[0]`.
    window_start: u64,
    at_end: bool,
}

impl ChunkedReader<File> {
    /// Open a file for chunked reading.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| MboxError::open(path, e))?;
        Ok(Self::new(file, capacity).with_source(path))
    }
}

impl<R: Read + Seek> ChunkedReader<R> {
    /// Wrap a stream with a window of `capacity` bytes (at least one).
    pub fn new(inner: R, capacity: usize) -> Self {
        Self {
            inner,
            source: PathBuf::from("<stream>"),
            buf: vec![0u8; capacity.max(1)].into_boxed_slice(),
            pos: 0,
            len: 0,
            window_start: 0,
            at_end: false,
        }
    }

    /// Label used in I/O errors.
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = source.into();
        self
    }

    /// Path (or label) of the underlying stream.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Next byte, or `None` at end of stream.
    pub fn get(&mut self) -> Result<Option<u8>> {
        if self.pos == self.len && !self.fill()? {
            return Ok(None);
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(Some(b))
    }

    /// Copy up to `out.len()` bytes, refilling between fragments.
    ///
    /// Returns the number of bytes copied, which is short only at end of stream.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut copied = 0;
        while copied < out.len() {
            if self.pos == self.len && !self.fill()? {
                break;
            }
            let n = (self.len - self.pos).min(out.len() - copied);
            out[copied..copied + n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
            self.pos += n;
            copied += n;
        }
        Ok(copied)
    }

    /// Move the logical position back by `delta` bytes.
    ///
    /// Stays inside the current window when possible, otherwise reseeks.
    /// Asking for more bytes than the absolute position is an error.
    pub fn rewind(&mut self, delta: u64) -> Result<()> {
        if delta <= self.pos as u64 {
            self.pos -= delta as usize;
            return Ok(());
        }
        let position = self.position();
        let target = position
            .checked_sub(delta)
            .ok_or(MboxError::RewindOutOfRange {
                requested: delta,
                available: position,
            })?;
        trace!(from = position, to = target, "Rewind outside window, reseeking");
        self.set_position(target)
    }

    /// `true` once a refill attempt has produced no bytes.
    pub fn at_end(&mut self) -> Result<bool> {
        if !self.at_end && self.pos == self.len {
            self.fill()?;
        }
        Ok(self.at_end)
    }

    /// Discard the window, seek to `position` and refill.
    pub fn set_position(&mut self, position: u64) -> Result<()> {
        self.inner
            .seek(SeekFrom::Start(position))
            .map_err(|e| MboxError::io(&self.source, e))?;
        self.window_start = position;
        self.pos = 0;
        self.len = 0;
        self.at_end = false;
        self.fill()?;
        Ok(())
    }

    /// Absolute offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.window_start + self.pos as u64
    }

    /// Decode text up to (not including) the next `separator` byte.
    ///
    /// The separator is consumed. One decoder instance spans every refill, so
    /// multi-byte sequences cut by the window boundary decode correctly.
    /// End of stream terminates the string.
    pub fn read_string(&mut self, separator: u8) -> Result<String> {
        let mut decoder = TEXT_ENCODING.new_decoder_without_bom_handling();
        let mut text = String::new();
        loop {
            if self.pos == self.len && !self.fill()? {
                break;
            }
            let window = &self.buf[self.pos..self.len];
            match window.iter().position(|&b| b == separator) {
                Some(i) => {
                    decode_into(&mut decoder, &window[..i], &mut text, true);
                    self.pos += i + 1;
                    return Ok(text);
                }
                None => {
                    decode_into(&mut decoder, window, &mut text, false);
                    self.pos = self.len;
                }
            }
        }
        decode_into(&mut decoder, &[], &mut text, true);
        Ok(text)
    }

    /// Consume bytes through the next `\n`. Returns `false` at end of stream.
    pub fn skip_line(&mut self) -> Result<bool> {
        loop {
            if self.pos == self.len && !self.fill()? {
                return Ok(false);
            }
            let window = &self.buf[self.pos..self.len];
            match window.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    self.pos += i + 1;
                    return Ok(true);
                }
                None => self.pos = self.len,
            }
        }
    }

    /// Replace the window with the next chunk of the stream.
    fn fill(&mut self) -> Result<bool> {
        self.window_start += self.len as u64;
        self.pos = 0;
        self.len = 0;
        let n = loop {
            match self.inner.read(&mut self.buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(MboxError::io(&self.source, e)),
            }
        };
        self.len = n;
        self.at_end = n == 0;
        Ok(n > 0)
    }
}

/// Feed `src` to a streaming decoder, growing `dst` as needed.
fn decode_into(decoder: &mut Decoder, mut src: &[u8], dst: &mut String, last: bool) {
    loop {
        let needed = decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or(src.len() * 3 + 16);
        dst.reserve(needed);
        let (result, read, _) = decoder.decode_to_string(src, dst, last);
        src = &src[read..];
        match result {
            CoderResult::InputEmpty => return,
            CoderResult::OutputFull => continue,
        }
    }
}

/// Decode a complete byte span with [`TEXT_ENCODING`], replacing malformed sequences.
pub fn decode_text(bytes: &[u8]) -> String {
    let (text, _) = TEXT_ENCODING.decode_without_bom_handling(bytes);
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(data: &[u8], capacity: usize) -> ChunkedReader<Cursor<Vec<u8>>> {
        ChunkedReader::new(Cursor::new(data.to_vec()), capacity)
    }

    #[test]
    fn test_get_across_refills() {
        let mut r = reader(b"abcdefg", 3);
        let mut out = Vec::new();
        while let Some(b) = r.get().unwrap() {
            out.push(b);
        }
        assert_eq!(out, b"abcdefg");
        assert_eq!(r.position(), 7);
        assert!(r.at_end().unwrap());
    }

    #[test]
    fn test_read_short_at_end() {
        let mut r = reader(b"hello world", 4);
        let mut buf = [0u8; 8];
        assert_eq!(r.read(&mut buf).unwrap(), 8);
        assert_eq!(&buf, b"hello wo");
        assert_eq!(r.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"rld");
        assert_eq!(r.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_rewind_inside_window() {
        let mut r = reader(b"abcdef", 16);
        r.get().unwrap();
        r.get().unwrap();
        r.get().unwrap();
        r.rewind(2).unwrap();
        assert_eq!(r.position(), 1);
        assert_eq!(r.get().unwrap(), Some(b'b'));
    }

    #[test]
    fn test_rewind_across_refill_reseeks() {
        let mut r = reader(b"0123456789", 3);
        let mut buf = [0u8; 7];
        assert_eq!(r.read(&mut buf).unwrap(), 7);
        r.rewind(5).unwrap();
        assert_eq!(r.position(), 2);
        assert_eq!(r.get().unwrap(), Some(b'2'));
    }

    #[test]
    fn test_rewind_after_end_of_stream() {
        let mut r = reader(b"xyz", 2);
        while r.get().unwrap().is_some() {}
        assert!(r.at_end().unwrap());
        r.rewind(1).unwrap();
        assert_eq!(r.get().unwrap(), Some(b'z'));
    }

    #[test]
    fn test_rewind_past_start_is_error() {
        let mut r = reader(b"abc", 2);
        r.get().unwrap();
        let err = r.rewind(4).unwrap_err();
        assert!(matches!(
            err,
            MboxError::RewindOutOfRange {
                requested: 4,
                available: 1
            }
        ));
    }

    #[test]
    fn test_at_end_empty_stream() {
        let mut r = reader(b"", 8);
        assert!(r.at_end().unwrap());
        assert_eq!(r.get().unwrap(), None);
    }

    #[test]
    fn test_at_end_not_set_before_refill() {
        let mut r = reader(b"ab", 2);
        assert!(!r.at_end().unwrap());
        r.get().unwrap();
        r.get().unwrap();
        assert!(r.at_end().unwrap());
    }

    #[test]
    fn test_set_position() {
        let mut r = reader(b"0123456789", 4);
        r.set_position(6).unwrap();
        assert_eq!(r.position(), 6);
        assert_eq!(r.get().unwrap(), Some(b'6'));
        r.set_position(1).unwrap();
        assert_eq!(r.get().unwrap(), Some(b'1'));
    }

    #[test]
    fn test_read_string_multibyte_across_boundary() {
        let text = "héllo wörld ✓";
        let mut data = text.as_bytes().to_vec();
        data.push(b'\n');
        data.extend_from_slice(b"rest");
        for capacity in 1..8 {
            let mut r = reader(&data, capacity);
            assert_eq!(r.read_string(b'\n').unwrap(), text, "capacity {capacity}");
            assert_eq!(r.get().unwrap(), Some(b'r'));
        }
    }

    #[test]
    fn test_read_string_separator_next() {
        let mut r = reader(b":abc", 4);
        assert_eq!(r.read_string(b':').unwrap(), "");
        assert_eq!(r.position(), 1);
    }

    #[test]
    fn test_read_string_until_end() {
        let mut r = reader(b"no separator", 5);
        assert_eq!(r.read_string(b'\n').unwrap(), "no separator");
        assert!(r.at_end().unwrap());
    }

    #[test]
    fn test_skip_line() {
        let mut r = reader(b"first line\nsecond", 3);
        assert!(r.skip_line().unwrap());
        assert_eq!(r.position(), 11);
        assert!(!r.skip_line().unwrap());
    }

    #[test]
    fn test_open_missing_file() {
        let err = ChunkedReader::open("/definitely/not/here.mbox", 16)
            .err()
            .unwrap();
        assert!(matches!(err, MboxError::FileNotFound(_)));
    }
}
