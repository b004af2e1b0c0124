//! Rewindable stream caches
//!
//! Payloads are written once through a [`SpoolingWriter`], which keeps them in
//! memory until the spool rules decide they are large enough for disk. The
//! writer then hands out [`StreamCache`](crate::traits::StreamCache) views:
//!
//! - [`ByteArrayCache`] over an in-memory buffer
//! - [`FileStreamCache`] over a spool file, reference counted through a
//!   [`TempFileManager`](crate::cleanup::TempFileManager)
//! - [`ReaderCache`] over character content, which is never spooled
//! - [`SourceCache`] over a structured payload, delegating to one of the above

mod file;
mod memory;
mod reader_cache;
mod source;
mod writer;

#[cfg(test)]
mod tests;

pub use file::FileStreamCache;
pub use memory::ByteArrayCache;
pub use reader_cache::ReaderCache;
pub use source::{Source, SourceCache, SourcePayload};
pub use writer::SpoolingWriter;
