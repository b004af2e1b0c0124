//! In-memory character cache
//!
//! Character payloads are held as an immutable string and are never spooled
//! to disk. As bytes, the content is its UTF-8 encoding; `length` and
//! `position` count bytes, [`ReaderCache::char_count`] counts characters.

use crate::errors::{CacheError, Result};
use crate::traits::StreamCache;
use std::fmt;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// Cache over an immutable, shared string
#[derive(Debug, Clone)]
pub struct ReaderCache {
    text: Arc<str>,
    position: usize,
}

impl ReaderCache {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self {
            text: text.into(),
            position: 0,
        }
    }

    /// Drain a UTF-8 reader into a new cache
    pub fn from_reader(reader: &mut dyn Read) -> Result<Self> {
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|e| CacheError::io(PathBuf::from("<reader>"), "read character source", e))?;
        Ok(Self::new(text))
    }

    /// The full cached text, independent of the read cursor
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Write the text from the current position into a character sink
    ///
    /// Positions that fall inside a multi-byte character resume at the next
    /// character boundary.
    pub fn write_chars_to(&mut self, sink: &mut dyn fmt::Write) -> Result<u64> {
        let mut start = self.position;
        while !self.text.is_char_boundary(start) {
            start += 1;
        }
        let remaining = &self.text[start..];
        let result = sink.write_str(remaining);
        self.position = 0;

        result.map_err(|_| {
            CacheError::io(
                PathBuf::from("<reader>"),
                "write cached characters",
                io::Error::other("character sink rejected write"),
            )
        })?;
        Ok(remaining.len() as u64)
    }
}

impl Read for ReaderCache {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.text.as_bytes()[self.position..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}

impl StreamCache for ReaderCache {
    fn reset(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn write_to(&mut self, sink: &mut dyn Write) -> Result<u64> {
        let remaining = &self.text.as_bytes()[self.position..];
        let written = remaining.len() as u64;
        let result = sink.write_all(remaining);
        self.position = 0;

        result
            .map_err(|e| CacheError::io(PathBuf::from("<reader>"), "write cached characters", e))?;
        Ok(written)
    }

    fn in_memory(&self) -> bool {
        true
    }

    fn length(&self) -> u64 {
        self.text.len() as u64
    }

    fn position(&self) -> u64 {
        self.position as u64
    }

    fn duplicate(&self) -> Result<Box<dyn StreamCache>> {
        Ok(Box::new(Self::new(self.text.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_reader_round_trip() {
        let mut source = io::Cursor::new("grüße".as_bytes().to_vec());
        let mut cache = ReaderCache::from_reader(&mut source).unwrap();

        assert_eq!(cache.as_str(), "grüße");
        assert_eq!(cache.char_count(), 5);
        assert_eq!(cache.length(), "grüße".len() as u64);

        let mut text = String::new();
        cache.write_chars_to(&mut text).unwrap();
        assert_eq!(text, "grüße");
    }

    #[test]
    fn test_invalid_utf8_is_io_error() {
        let mut source = io::Cursor::new(vec![0xff, 0xfe]);
        let err = ReaderCache::from_reader(&mut source).unwrap_err();
        assert!(matches!(err, CacheError::Io { .. }));
    }

    #[test]
    fn test_reset_after_exhausting() {
        let mut cache = ReaderCache::new("abc");
        let mut all = String::new();
        cache.read_to_string(&mut all).unwrap();
        assert_eq!(cache.read(&mut [0u8; 4]).unwrap(), 0);

        cache.reset().unwrap();
        let mut out = Vec::new();
        cache.write_to(&mut out).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn test_duplicate_independent() {
        let mut cache = ReaderCache::new("hello");
        let mut dup = cache.duplicate().unwrap();
        let mut two = [0u8; 2];
        dup.read_exact(&mut two).unwrap();

        let mut text = String::new();
        cache.write_chars_to(&mut text).unwrap();
        assert_eq!(text, "hello");
        assert_eq!(dup.position(), 2);
    }

    #[test]
    fn test_write_chars_skips_partial_character() {
        let mut cache = ReaderCache::new("ü!");
        let mut one = [0u8; 1];
        cache.read_exact(&mut one).unwrap();

        let mut text = String::new();
        cache.write_chars_to(&mut text).unwrap();
        assert_eq!(text, "!");
    }
}
