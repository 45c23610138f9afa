//! Disk-based cache store
//!
//! One flat directory, one file per asset named `<sha256>[.<ext>]`.
//! Writes go through `<root>/.tmp/` and are renamed into place on
//! completion, which is the only synchronization readers rely on.

pub use self::disk_cache::{DiskCacheStore, OpenedEntry, StoreStats};

mod disk_cache;
mod utils;
