//! The rewindable cache contract

use crate::errors::Result;
use std::fmt;
use std::io::{Read, Write};

/// Buffered payload content that can be read any number of times
///
/// Implementations expose a read cursor through [`Read`]. `reset` moves the
/// cursor back to the start, and `duplicate` creates an independent view over
/// the same content whose cursor never affects this one.
pub trait StreamCache: Read + Send + fmt::Debug {
    /// Rewind to the start of the content
    fn reset(&mut self) -> Result<()>;

    /// Write everything from the current position to the end into `sink`
    ///
    /// Returns the number of bytes written. Afterwards the cache is positioned
    /// at the start again, so repeated calls write the full content.
    fn write_to(&mut self, sink: &mut dyn Write) -> Result<u64>;

    /// Whether the content is held in memory
    fn in_memory(&self) -> bool;

    /// Exact length of the content in bytes
    fn length(&self) -> u64;

    /// Bytes consumed by the read cursor so far
    fn position(&self) -> u64;

    /// Create an independent view over the same content
    fn duplicate(&self) -> Result<Box<dyn StreamCache>>;

    /// Release resources held by this view
    ///
    /// Safe to call more than once.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
