//! Named cache stores for offline support.
//!
//! This module provides the storage side of the offline controller:
//! - Named stores mapping request URLs to stored responses
//! - At most one entry per URL per store (puts overwrite by key)
//! - Store-level listing and deletion, driving version rollover sweeps

mod storage;
mod traits;

pub use storage::{MemoryStorage, SqliteStorage};
pub use traits::{CacheStorage, CachedEntry};
