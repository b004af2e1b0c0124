//! In-memory byte cache

use crate::errors::{CacheError, Result};
use crate::traits::StreamCache;
use bytes::Bytes;
use std::io::{self, Read, Write};
use std::path::PathBuf;

/// Cache over an immutable, shared byte buffer
#[derive(Debug, Clone)]
pub struct ByteArrayCache {
    data: Bytes,
    position: usize,
}

impl ByteArrayCache {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            position: 0,
        }
    }

    /// The full cached content, independent of the read cursor
    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }

    fn remaining(&self) -> &[u8] {
        &self.data[self.position..]
    }
}

impl Read for ByteArrayCache {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}

impl StreamCache for ByteArrayCache {
    fn reset(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn write_to(&mut self, sink: &mut dyn Write) -> Result<u64> {
        let remaining = self.remaining();
        let written = remaining.len() as u64;
        let result = sink.write_all(remaining);
        self.position = 0;

        result.map_err(|e| CacheError::io(PathBuf::from("<memory>"), "write cached bytes", e))?;
        Ok(written)
    }

    fn in_memory(&self) -> bool {
        true
    }

    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    fn position(&self) -> u64 {
        self.position as u64
    }

    fn duplicate(&self) -> Result<Box<dyn StreamCache>> {
        Ok(Box::new(Self::new(self.data.clone())))
    }
}
