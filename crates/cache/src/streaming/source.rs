//! Caching of structured payload sources
//!
//! A payload source is either a byte stream, a character stream, or text that
//! is already in memory. Byte streams go through a [`SpoolingWriter`] and may
//! end up on disk; character content always stays in memory.

use crate::errors::Result;
use crate::traits::StreamCache;
use std::fmt;
use std::io::{self, Read, Write};

use super::{ReaderCache, SpoolingWriter};

/// Content of a structured payload
pub enum Source {
    /// Raw bytes
    Bytes(Box<dyn Read + Send>),
    /// UTF-8 encoded characters
    Chars(Box<dyn Read + Send>),
    /// Characters already held as a string
    Text(String),
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(_) => f.write_str("Source::Bytes(..)"),
            Self::Chars(_) => f.write_str("Source::Chars(..)"),
            Self::Text(text) => write!(f, "Source::Text({} bytes)", text.len()),
        }
    }
}

/// A payload source together with its optional system identifier
#[derive(Debug)]
pub struct SourcePayload {
    pub system_id: Option<String>,
    pub source: Source,
}

impl SourcePayload {
    pub fn bytes(reader: impl Read + Send + 'static) -> Self {
        Self {
            system_id: None,
            source: Source::Bytes(Box::new(reader)),
        }
    }

    pub fn chars(reader: impl Read + Send + 'static) -> Self {
        Self {
            system_id: None,
            source: Source::Chars(Box::new(reader)),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            system_id: None,
            source: Source::Text(text.into()),
        }
    }

    pub fn with_system_id(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = Some(system_id.into());
        self
    }
}

/// Cache over a structured payload, delegating to the cache of its content
pub struct SourceCache {
    system_id: Option<String>,
    inner: Box<dyn StreamCache>,
}

impl SourceCache {
    pub fn new(system_id: Option<String>, inner: Box<dyn StreamCache>) -> Self {
        Self { system_id, inner }
    }

    /// Drain `payload` into a cache
    ///
    /// Byte content is written through a writer obtained from `writer`, which
    /// is closed afterwards. Character content is read into memory and
    /// `writer` is never called.
    pub fn from_payload<F>(payload: SourcePayload, writer: F) -> Result<Self>
    where
        F: FnOnce() -> Result<SpoolingWriter>,
    {
        let SourcePayload { system_id, source } = payload;

        let inner: Box<dyn StreamCache> = match source {
            Source::Bytes(mut reader) => {
                let mut writer = writer()?;
                writer.drain_from(&mut reader)?;
                writer.into_cache()?
            }
            Source::Chars(mut reader) => Box::new(ReaderCache::from_reader(&mut reader)?),
            Source::Text(text) => Box::new(ReaderCache::new(text)),
        };

        Ok(Self::new(system_id, inner))
    }

    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    pub fn inner(&self) -> &dyn StreamCache {
        self.inner.as_ref()
    }

    pub fn into_inner(self) -> Box<dyn StreamCache> {
        self.inner
    }
}

impl Read for SourceCache {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl StreamCache for SourceCache {
    fn reset(&mut self) -> Result<()> {
        self.inner.reset()
    }

    fn write_to(&mut self, sink: &mut dyn Write) -> Result<u64> {
        self.inner.write_to(sink)
    }

    fn in_memory(&self) -> bool {
        self.inner.in_memory()
    }

    fn length(&self) -> u64 {
        self.inner.length()
    }

    fn position(&self) -> u64 {
        self.inner.position()
    }

    fn duplicate(&self) -> Result<Box<dyn StreamCache>> {
        Ok(Box::new(Self::new(
            self.system_id.clone(),
            self.inner.duplicate()?,
        )))
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

impl fmt::Debug for SourceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCache")
            .field("system_id", &self.system_id)
            .field("inner", &self.inner)
            .finish()
    }
}
