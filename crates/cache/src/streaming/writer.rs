//! Spooling writer: buffers in memory, migrates to a spool file once the
//! spool rules say so, and hands out rewindable caches of what was written.

use crate::cleanup::{ReaderLease, TempFileManager};
use crate::config::{SpoolConfig, SpoolFailurePolicy};
use crate::errors::{CacheError, RecoveryHint, Result};
use crate::statistics::StreamCachingStatistics;
use crate::traits::StreamCache;
use crate::unit_of_work::UnitOfWork;
use bytes::Bytes;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ByteArrayCache, FileStreamCache};

/// Where written bytes currently live
enum Sink {
    /// Accumulating in memory
    Memory(Vec<u8>),
    /// In memory and shared with caches handed out by `as_cache`
    Frozen(Bytes),
    /// Spooled to disk
    File(FileSink),
}

struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
    lease: Option<ReaderLease>,
}

/// Single-producer sink that spools to disk past a threshold
///
/// Every `write` adds the chunk length to the running total first; while the
/// writer is still in memory it then asks the spool rules whether that total
/// warrants spooling, and only afterwards appends the chunk. With a fixed
/// threshold of `n` bytes, a payload of exactly `n` bytes stays in memory and
/// byte `n + 1` lands in the spool file. Migration happens at most once.
pub struct SpoolingWriter {
    config: SpoolConfig,
    manager: TempFileManager,
    sink: Sink,
    total_length: u64,
    spooling_disabled: bool,
    closed: bool,
    statistics: Option<Arc<StreamCachingStatistics>>,
    advisory: Option<CacheError>,
    advisory_reported: bool,
}

impl SpoolingWriter {
    /// Create a writer with its own, unbound temp file manager
    pub fn new(config: SpoolConfig) -> Self {
        Self::with_manager(config, TempFileManager::new())
    }

    /// Create a writer whose spool file lives until `unit_of_work` completes
    /// and every cache over it is closed
    pub fn for_unit_of_work(config: SpoolConfig, unit_of_work: &dyn UnitOfWork) -> Self {
        let manager = TempFileManager::new();
        manager.bind_to_transaction(unit_of_work);
        Self::with_manager(config, manager)
    }

    pub fn with_manager(config: SpoolConfig, manager: TempFileManager) -> Self {
        let capacity = config.buffer_size;
        Self {
            config,
            manager,
            sink: Sink::Memory(Vec::with_capacity(capacity)),
            total_length: 0,
            spooling_disabled: false,
            closed: false,
            statistics: None,
            advisory: None,
            advisory_reported: false,
        }
    }

    /// Record memory/spool statistics when the writer closes
    pub fn with_statistics(mut self, statistics: Arc<StreamCachingStatistics>) -> Self {
        self.statistics = Some(statistics);
        self
    }

    /// Whether everything written so far is held in memory
    pub fn in_memory(&self) -> bool {
        !matches!(self.sink, Sink::File(_))
    }

    /// Total bytes written
    pub fn length(&self) -> u64 {
        self.total_length
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether a failed migration switched this writer to memory-only buffering
    pub fn is_spooling_disabled(&self) -> bool {
        self.spooling_disabled
    }

    /// Path of the spool file, once spooled
    pub fn spool_path(&self) -> Option<&Path> {
        match &self.sink {
            Sink::File(file) => Some(&file.path),
            _ => None,
        }
    }

    pub fn temp_file_manager(&self) -> &TempFileManager {
        &self.manager
    }

    /// Take the pending advisory, if the in-memory buffer outgrew its ceiling
    pub fn take_advisory(&mut self) -> Option<CacheError> {
        self.advisory.take()
    }

    /// Append a chunk, spooling to disk first if the rules require it
    pub fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        if self.closed {
            return Err(CacheError::io(
                self.spool_path().map(Path::to_path_buf).unwrap_or_default(),
                "write to closed spooling writer",
                io::Error::new(io::ErrorKind::BrokenPipe, "writer is closed"),
            ));
        }
        if chunk.is_empty() {
            return Ok(());
        }

        let previous = self.total_length;
        self.total_length += chunk.len() as u64;

        if self.in_memory()
            && !self.spooling_disabled
            && self.config.rules.should_spool(self.total_length)
        {
            if let Err(err) = self.spool() {
                match self.config.failure_policy {
                    SpoolFailurePolicy::Propagate => {
                        self.total_length = previous;
                        return Err(err);
                    }
                    SpoolFailurePolicy::StayInMemory => {
                        tracing::warn!(
                            error = %err,
                            length = self.total_length,
                            "spooling failed, continuing in memory"
                        );
                        self.spooling_disabled = true;
                    }
                }
            }
        }

        let appended = match &mut self.sink {
            Sink::Memory(buffer) => {
                buffer.extend_from_slice(chunk);
                Ok(())
            }
            Sink::Frozen(bytes) => {
                let mut buffer = Vec::from(mem::take(bytes));
                buffer.extend_from_slice(chunk);
                self.sink = Sink::Memory(buffer);
                Ok(())
            }
            Sink::File(file) => file
                .writer
                .write_all(chunk)
                .map_err(|e| CacheError::io(file.path.clone(), "write spool file", e)),
        };

        if let Err(err) = appended {
            self.total_length = previous;
            return Err(err);
        }

        self.check_growth();
        Ok(())
    }

    /// Copy `reader` to exhaustion in `buffer_size` chunks
    pub fn drain_from(&mut self, reader: &mut dyn Read) -> Result<u64> {
        let mut chunk = vec![0u8; self.config.buffer_size.max(1)];
        let mut copied = 0u64;
        loop {
            let n = match reader.read(&mut chunk) {
                Ok(0) => return Ok(copied),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(CacheError::io(PathBuf::from("<source>"), "read payload", e)),
            };
            self.write_chunk(&chunk[..n])?;
            copied += n as u64;
        }
    }

    /// One-time migration of the in-memory buffer into the spool file
    fn spool(&mut self) -> Result<()> {
        let path = self.manager.create_backing_file(&self.config)?;

        let accumulated: &[u8] = match &self.sink {
            Sink::Memory(buffer) => buffer,
            Sink::Frozen(bytes) => bytes,
            Sink::File(_) => return Ok(()),
        };

        let mut writer = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .map(|file| BufWriter::with_capacity(self.config.buffer_size, file))
            .map_err(|e| CacheError::io(path.clone(), "open spool file", e))?;

        writer
            .write_all(accumulated)
            .map_err(|e| CacheError::io(path.clone(), "copy buffer to spool file", e))?;

        let lease = self.manager.register_reader()?;

        tracing::debug!(
            path = %path.display(),
            length = self.total_length,
            buffered = accumulated.len(),
            "spooled stream cache to disk"
        );

        self.sink = Sink::File(FileSink {
            path,
            writer,
            lease: Some(lease),
        });
        Ok(())
    }

    fn check_growth(&mut self) {
        if self.advisory_reported || !self.in_memory() {
            return;
        }
        let Some(ceiling) = self.config.max_in_memory_bytes else {
            return;
        };

        if self.total_length > ceiling {
            tracing::warn!(
                in_memory_bytes = self.total_length,
                ceiling,
                "in-memory stream cache exceeds its ceiling"
            );
            self.advisory = Some(CacheError::UnboundedGrowth {
                in_memory_bytes: self.total_length,
                ceiling,
                recovery_hint: RecoveryHint::CheckDiskSpace,
            });
            self.advisory_reported = true;
            if let Some(statistics) = &self.statistics {
                statistics.record_advisory();
            }
        }
    }

    fn flush_sink(&mut self) -> Result<()> {
        if let Sink::File(file) = &mut self.sink {
            file.writer
                .flush()
                .map_err(|e| CacheError::io(file.path.clone(), "flush spool file", e))?;
        }
        Ok(())
    }

    /// Create a new cache over everything written so far
    ///
    /// In memory this shares the buffer; once spooled every call registers a
    /// new reader on the temp file manager, and each returned cache must be
    /// closed (or dropped) independently.
    pub fn as_cache(&mut self) -> Result<Box<dyn StreamCache>> {
        if let Sink::Memory(buffer) = &mut self.sink {
            self.sink = Sink::Frozen(Bytes::from(mem::take(buffer)));
        }

        if let Sink::Frozen(bytes) = &self.sink {
            return Ok(Box::new(ByteArrayCache::new(bytes.clone())));
        }

        self.flush_sink()?;
        let cache = FileStreamCache::open(&self.manager, self.total_length)?;
        Ok(Box::new(cache))
    }

    /// Create a cache over everything written, then close the writer
    pub fn into_cache(mut self) -> Result<Box<dyn StreamCache>> {
        let cache = self.as_cache()?;
        self.close()?;
        Ok(cache)
    }

    /// Flush and release the writer's reference on the spool file
    ///
    /// In-memory content is kept so `as_cache` keeps working. A spooled file
    /// with no outstanding caches and no bound unit of work is deleted here.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let flushed = self.flush_sink();

        if let Sink::File(file) = &mut self.sink {
            if let Some(lease) = file.lease.take() {
                self.manager.release_reader(&lease);
            }
        }

        if let Some(statistics) = &self.statistics {
            if self.in_memory() {
                statistics.record_memory(self.total_length);
            } else {
                statistics.record_spool(self.total_length);
            }
        }

        flushed
    }
}

impl Write for SpoolingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_chunk(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_sink()?;
        Ok(())
    }
}

impl Drop for SpoolingWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::debug!(error = %e, "closing spooling writer on drop failed");
        }
    }
}

impl fmt::Debug for SpoolingWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpoolingWriter")
            .field("length", &self.total_length)
            .field("in_memory", &self.in_memory())
            .field("spool_path", &self.spool_path())
            .field("spooling_disabled", &self.spooling_disabled)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit_of_work::UnitOfWorkHandle;
    use tempfile::TempDir;

    fn writer(dir: &TempDir, threshold: i64) -> SpoolingWriter {
        SpoolingWriter::new(SpoolConfig::new(dir.path()).with_threshold(threshold))
    }

    fn drain(cache: &mut Box<dyn StreamCache>) -> Vec<u8> {
        let mut out = Vec::new();
        cache.write_to(&mut out).unwrap();
        out
    }

    #[test]
    fn test_threshold_boundary() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir, 16);

        w.write_all(&[7u8; 16]).unwrap();
        assert!(w.in_memory());

        w.write_all(&[7u8; 1]).unwrap();
        assert!(!w.in_memory());
        assert_eq!(w.length(), 17);
    }

    #[test]
    fn test_threshold_scenario() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir, 10);

        w.write_all(b"abcde").unwrap();
        w.write_all(b"fghij").unwrap();
        assert!(w.in_memory());
        assert_eq!(w.length(), 10);
        let mut cache = w.as_cache().unwrap();
        assert_eq!(drain(&mut cache), b"abcdefghij");

        w.write_all(b"k").unwrap();
        assert!(!w.in_memory());
        assert_eq!(w.length(), 11);
        let mut cache = w.as_cache().unwrap();
        assert_eq!(cache.length(), 11);
        assert_eq!(drain(&mut cache), b"abcdefghijk");
    }

    #[test]
    fn test_chunk_crossing_threshold_lands_in_file() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir, 4);
        w.write_all(b"abc").unwrap();
        w.write_all(b"defgh").unwrap();

        let path = w.spool_path().unwrap().to_path_buf();
        w.flush().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"abcdefgh");
    }

    #[test]
    fn test_each_as_cache_registers_a_reader() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir, 1);
        w.write_all(b"spooled").unwrap();

        let first = w.as_cache().unwrap();
        let second = w.as_cache().unwrap();
        let manager = w.temp_file_manager().clone();
        let path = manager.file_path().unwrap();
        assert_eq!(manager.open_readers(), 3);

        w.close().unwrap();
        drop(first);
        assert!(path.exists());
        drop(second);
        assert!(!path.exists());
    }

    #[test]
    fn test_close_without_readers_deletes_unbound_file() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir, 1);
        w.write_all(b"gone").unwrap();
        let path = w.spool_path().unwrap().to_path_buf();

        w.close().unwrap();
        assert!(!path.exists());
        assert!(w.as_cache().unwrap_err().is_lifecycle_violation());
    }

    #[test]
    fn test_memory_cache_survives_close() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir, 1024);
        w.write_all(b"small").unwrap();
        w.close().unwrap();

        let mut cache = w.as_cache().unwrap();
        assert!(cache.in_memory());
        assert_eq!(drain(&mut cache), b"small");
        assert!(w.write_all(b"more").is_err());
    }

    #[test]
    fn test_write_after_as_cache_keeps_shared_bytes() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir, 1024);
        w.write_all(b"first").unwrap();
        let mut before = w.as_cache().unwrap();
        w.write_all(b"-second").unwrap();
        let mut after = w.as_cache().unwrap();

        assert_eq!(drain(&mut before), b"first");
        assert_eq!(drain(&mut after), b"first-second");
    }

    #[test]
    fn test_bound_writer_keeps_file_until_completion() {
        let dir = TempDir::new().unwrap();
        let uow = UnitOfWorkHandle::new();
        let mut w = SpoolingWriter::for_unit_of_work(
            SpoolConfig::new(dir.path()).with_threshold(2),
            &uow,
        );
        w.write_all(b"payload").unwrap();
        let path = w.spool_path().unwrap().to_path_buf();

        let mut cache = w.into_cache().unwrap();
        let mut out = String::new();
        cache.read_to_string(&mut out).unwrap();
        assert_eq!(out, "payload");

        cache.close().unwrap();
        assert!(path.exists());
        uow.complete();
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_spool_propagates_and_keeps_memory() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-directory");
        std::fs::write(&blocker, b"file").unwrap();

        let mut w = SpoolingWriter::new(SpoolConfig::new(blocker.join("spool")).with_threshold(4));
        w.write_all(b"abcd").unwrap();

        let err = w.write_chunk(b"efgh").unwrap_err();
        assert!(matches!(err, CacheError::Io { .. }));
        assert!(w.in_memory());
        assert_eq!(w.length(), 4);

        let mut cache = w.as_cache().unwrap();
        assert_eq!(drain(&mut cache), b"abcd");
    }

    #[test]
    fn test_failed_spool_can_stay_in_memory() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-directory");
        std::fs::write(&blocker, b"file").unwrap();

        let config = SpoolConfig::new(blocker.join("spool"))
            .with_threshold(4)
            .with_failure_policy(SpoolFailurePolicy::StayInMemory)
            .with_max_in_memory_bytes(8);
        let mut w = SpoolingWriter::new(config);

        w.write_all(b"abcdef").unwrap();
        assert!(w.in_memory());
        assert!(w.is_spooling_disabled());
        assert!(w.take_advisory().is_none());

        w.write_all(b"ghij").unwrap();
        let advisory = w.take_advisory().unwrap();
        assert!(advisory.is_advisory());
        assert!(w.take_advisory().is_none());

        let mut cache = w.into_cache().unwrap();
        assert_eq!(drain(&mut cache), b"abcdefghij");
    }

    #[test]
    fn test_statistics_recorded_on_close() {
        let dir = TempDir::new().unwrap();
        let stats = Arc::new(StreamCachingStatistics::new(true));

        let mut small = writer(&dir, 100).with_statistics(stats.clone());
        small.write_all(b"tiny").unwrap();
        small.close().unwrap();
        small.close().unwrap();

        let mut large = writer(&dir, 2).with_statistics(stats.clone());
        large.write_all(b"larger").unwrap();
        drop(large);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.memory_counter, 1);
        assert_eq!(snapshot.memory_size, 4);
        assert_eq!(snapshot.spool_counter, 1);
        assert_eq!(snapshot.spool_size, 6);
    }
}
