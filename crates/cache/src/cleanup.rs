//! Temporary spool file lifecycle
//!
//! A [`TempFileManager`] owns at most one spool file. Readers (and the writer
//! that filled the file) hold [`ReaderLease`]s; the file is removed exactly
//! once, when no lease is outstanding and the bound unit of work, if any, has
//! completed. Removal is best effort: failures are logged, never returned.

use crate::config::SpoolConfig;
use crate::errors::{CacheError, Result};
use crate::unit_of_work::UnitOfWork;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Prefix of spool file names
pub const SPOOL_FILE_PREFIX: &str = "cos";

/// Suffix of spool file names
pub const SPOOL_FILE_SUFFIX: &str = ".tmp";

#[derive(Default)]
struct ManagerState {
    file_path: Option<PathBuf>,
    open_readers: u32,
    live_leases: HashSet<u64>,
    next_lease: u64,
    bound: bool,
    transaction_complete: bool,
    deleted: bool,
}

impl ManagerState {
    fn can_delete(&self) -> bool {
        self.open_readers == 0 && (!self.bound || self.transaction_complete)
    }

    // Caller holds the manager lock, which makes compare-and-delete atomic
    fn delete_if_unreferenced(&mut self) {
        if self.deleted || !self.can_delete() {
            return;
        }

        if let Some(path) = &self.file_path {
            remove_file_best_effort(path);
            self.deleted = true;
        }
    }
}

impl Drop for ManagerState {
    fn drop(&mut self) {
        if let (Some(path), false) = (&self.file_path, self.deleted) {
            tracing::debug!(path = %path.display(), "removing spool file of dropped manager");
            remove_file_best_effort(path);
        }
    }
}

/// Reference-counted owner of a spool file
#[derive(Clone, Default)]
pub struct TempFileManager {
    state: Arc<Mutex<ManagerState>>,
}

/// Proof of one outstanding reference on a [`TempFileManager`]
///
/// Leases are released through [`TempFileManager::release_reader`]; releasing
/// the same lease twice is a no-op.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ReaderLease {
    id: u64,
    manager: usize,
}

impl TempFileManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.state) as usize
    }

    /// Delay deletion until `unit_of_work` completes
    pub fn bind_to_transaction(&self, unit_of_work: &dyn UnitOfWork) {
        {
            let mut state = self.state.lock();
            if state.bound {
                tracing::debug!("temp file manager already bound to a unit of work");
                return;
            }
            state.bound = true;
        }

        let manager = self.clone();
        unit_of_work.on_completion(Box::new(move || manager.on_transaction_complete()));
    }

    /// Create the spool file under `config.directory`, or return the existing one
    pub fn create_backing_file(&self, config: &SpoolConfig) -> Result<PathBuf> {
        let mut state = self.state.lock();

        if let Some(path) = &state.file_path {
            if state.deleted {
                return Err(CacheError::expired(path.clone(), "create spool file"));
            }
            return Ok(path.clone());
        }

        std::fs::create_dir_all(&config.directory)
            .map_err(|e| CacheError::io(&config.directory, "create spool directory", e))?;

        let temp = tempfile::Builder::new()
            .prefix(SPOOL_FILE_PREFIX)
            .suffix(SPOOL_FILE_SUFFIX)
            .tempfile_in(&config.directory)
            .map_err(|e| CacheError::io(&config.directory, "create spool file", e))?;

        let path = temp
            .into_temp_path()
            .keep()
            .map_err(|e| CacheError::io(&config.directory, "keep spool file", e.error))?;

        tracing::debug!(path = %path.display(), "created spool file");
        state.file_path = Some(path.clone());
        Ok(path)
    }

    /// Register a reference that keeps the spool file alive
    ///
    /// Fails with [`CacheError::CacheExpired`] once the file has been deleted.
    pub fn register_reader(&self) -> Result<ReaderLease> {
        let mut state = self.state.lock();

        if state.deleted {
            let path = state.file_path.clone().unwrap_or_default();
            return Err(CacheError::expired(path, "register reader"));
        }

        let id = state.next_lease;
        state.next_lease += 1;
        state.live_leases.insert(id);
        state.open_readers += 1;

        tracing::trace!(lease = id, open_readers = state.open_readers, "registered reader");
        Ok(ReaderLease {
            id,
            manager: self.id(),
        })
    }

    /// Release a reference, deleting the file if it was the last one
    pub fn release_reader(&self, lease: &ReaderLease) {
        let mut state = self.state.lock();

        if lease.manager != self.id() || !state.live_leases.remove(&lease.id) {
            tracing::debug!(lease = lease.id, "ignoring release of unknown or released lease");
            return;
        }

        state.open_readers -= 1;
        tracing::trace!(lease = lease.id, open_readers = state.open_readers, "released reader");
        state.delete_if_unreferenced();
    }

    /// Mark the bound unit of work complete, deleting the file if unreferenced
    pub fn on_transaction_complete(&self) {
        let mut state = self.state.lock();
        if state.transaction_complete {
            return;
        }
        state.transaction_complete = true;
        state.delete_if_unreferenced();
    }

    pub fn file_path(&self) -> Option<PathBuf> {
        self.state.lock().file_path.clone()
    }

    pub fn open_readers(&self) -> u32 {
        self.state.lock().open_readers
    }

    pub fn is_bound(&self) -> bool {
        self.state.lock().bound
    }

    pub fn is_deleted(&self) -> bool {
        self.state.lock().deleted
    }
}

impl fmt::Debug for TempFileManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TempFileManager")
            .field("file_path", &state.file_path)
            .field("open_readers", &state.open_readers)
            .field("bound", &state.bound)
            .field("transaction_complete", &state.transaction_complete)
            .field("deleted", &state.deleted)
            .finish()
    }
}

/// Remove a file, logging anything other than success or absence
///
/// Returns whether the file is gone afterwards.
pub fn remove_file_best_effort(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "deleted spool file");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            tracing::warn!("Failed to remove spool file {}: {}", path.display(), e);
            false
        }
    }
}

/// Remove a directory tree, logging anything other than success or absence
///
/// Returns whether the directory is gone afterwards.
pub fn remove_dir_best_effort(path: &Path) -> bool {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed spool directory");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            tracing::warn!("Failed to remove spool directory {}: {}", path.display(), e);
            false
        }
    }
}
