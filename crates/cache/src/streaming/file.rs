//! File-backed byte cache over a spool file

use crate::cleanup::{ReaderLease, TempFileManager};
use crate::errors::{CacheError, Result};
use crate::traits::StreamCache;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Cache reading a spool file owned by a [`TempFileManager`]
///
/// The read handle is opened lazily and dropped by `reset`, so every view
/// holds its own handle and cursor. Closing (or dropping) the cache releases
/// its lease on the manager exactly once.
pub struct FileStreamCache {
    path: PathBuf,
    length: u64,
    handle: Option<File>,
    position: u64,
    manager: TempFileManager,
    lease: Option<ReaderLease>,
}

impl FileStreamCache {
    /// Create a view holding `lease` on `manager`
    pub fn new(path: PathBuf, length: u64, manager: TempFileManager, lease: ReaderLease) -> Self {
        Self {
            path,
            length,
            handle: None,
            position: 0,
            manager,
            lease: Some(lease),
        }
    }

    /// Register a new lease on `manager` and create a view over its file
    pub fn open(manager: &TempFileManager, length: u64) -> Result<Self> {
        let lease = manager.register_reader()?;
        let Some(path) = manager.file_path() else {
            manager.release_reader(&lease);
            return Err(CacheError::expired(PathBuf::new(), "open file cache"));
        };
        Ok(Self::new(path, length, manager.clone(), lease))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.lease.is_none()
    }

    fn ensure_open(&mut self, operation: &'static str) -> Result<&mut File> {
        if self.is_closed() {
            return Err(CacheError::expired(self.path.clone(), operation));
        }

        if self.handle.is_none() {
            let file = File::open(&self.path).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => CacheError::expired(self.path.clone(), operation),
                _ => CacheError::io(self.path.clone(), operation, e),
            })?;
            self.handle = Some(file);
            self.position = 0;
        }

        match self.handle.as_mut() {
            Some(file) => Ok(file),
            None => Err(CacheError::expired(self.path.clone(), operation)),
        }
    }

    /// Copy the rest of the file into `sink`
    ///
    /// With a concrete sink such as a `File` or `TcpStream`, `std::io::copy`
    /// uses `copy_file_range`/`sendfile` on Linux.
    pub fn copy_to<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<u64> {
        let file = self.ensure_open("write file cache")?;
        let result = io::copy(file, sink);
        self.handle = None;
        self.position = 0;

        result.map_err(|e| CacheError::io(self.path.clone(), "write file cache", e))
    }
}

impl Read for FileStreamCache {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let file = self.ensure_open("read file cache")?;
        let n = file.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl StreamCache for FileStreamCache {
    fn reset(&mut self) -> Result<()> {
        self.handle = None;
        self.position = 0;

        if self.is_closed() {
            return Err(CacheError::expired(self.path.clone(), "reset file cache"));
        }
        if !self.path.exists() {
            return Err(CacheError::expired(self.path.clone(), "reset file cache"));
        }
        Ok(())
    }

    fn write_to(&mut self, sink: &mut dyn Write) -> Result<u64> {
        self.copy_to(sink)
    }

    fn in_memory(&self) -> bool {
        false
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn duplicate(&self) -> Result<Box<dyn StreamCache>> {
        if self.is_closed() {
            return Err(CacheError::expired(self.path.clone(), "duplicate file cache"));
        }
        let lease = self.manager.register_reader()?;
        Ok(Box::new(Self::new(
            self.path.clone(),
            self.length,
            self.manager.clone(),
            lease,
        )))
    }

    fn close(&mut self) -> Result<()> {
        self.handle = None;
        if let Some(lease) = self.lease.take() {
            self.manager.release_reader(&lease);
        }
        Ok(())
    }
}

impl Drop for FileStreamCache {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for FileStreamCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStreamCache")
            .field("path", &self.path)
            .field("length", &self.length)
            .field("position", &self.position)
            .field("open", &self.handle.is_some())
            .field("closed", &self.is_closed())
            .finish()
    }
}
