// Cache module
//
// Content-addressed keys, entry metadata and the flat disk store that owns
// every cached asset.

pub mod config;
pub mod disk;
pub mod entry;
pub mod error;
pub mod key;

pub use config::CacheConfig;
pub use disk::{DiskCacheStore, OpenedEntry, StoreStats};
pub use entry::{content_type_for, CacheEntry};
pub use error::CacheStoreError;
pub use key::{CacheKey, ContentAddressResolver};
