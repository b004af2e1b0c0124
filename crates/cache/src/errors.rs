//! Error handling for the stream cache
//!
//! Every error carries a recovery hint so callers can tell transient disk
//! trouble apart from lifecycle bugs such as reading an expired cache.

mod conversions;
mod display;
mod recovery;
mod types;

pub use types::*;
