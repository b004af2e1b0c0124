//! Shared utilities for the rewind workspace
//!
//! Small helpers used by the stream cache and its tests: tracing
//! initialization, platform directory resolution and system memory snapshots.

pub mod logging;
pub mod memory;
pub mod xdg;

pub use logging::init as init_tracing;
pub use memory::MemorySnapshot;
pub use xdg::RewindPaths;
