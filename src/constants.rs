// Constants module - centralized default values for configuration
//
// All defaults used by the config layer live here so the YAML
// deserializers and the tests agree on the same numbers.

// =============================================================================
// Server defaults
// =============================================================================

/// Default listen address
pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default number of worker threads
pub const DEFAULT_THREADS: usize = 4;

// =============================================================================
// Cache defaults
// =============================================================================

/// Default cache directory
pub const DEFAULT_CACHE_DIR: &str = "/var/cache/reelcache";

/// Default cache capacity in megabytes (20 GB)
pub const DEFAULT_MAX_CACHE_SIZE_MB: u64 = 20 * 1024;

/// Default `Cache-Control: max-age` for served assets (1 day)
pub const DEFAULT_CACHE_CONTROL_MAX_AGE_SECS: u64 = 86_400;

/// Name of the scratch directory (inside the cache dir) holding in-progress writes
pub const TEMP_DIR_NAME: &str = ".tmp";

/// Directory (inside the cache dir) holding origin content types that the
/// file extension alone would not reproduce
pub const META_DIR_NAME: &str = ".meta";

/// Chunk size used when streaming cached files to clients (64 KB)
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

// =============================================================================
// Origin defaults
// =============================================================================

/// Default origin request timeout in seconds
pub const DEFAULT_ORIGIN_TIMEOUT_SECS: u64 = 30;

/// Default bucket for video assets
pub const DEFAULT_VIDEO_BUCKET: &str = "videos";

/// Default bucket for image assets
pub const DEFAULT_IMAGE_BUCKET: &str = "images";

/// Filename prefix whose origin objects are historically stored with spaces
pub const DEFAULT_SPACE_SUBSTITUTION_PREFIX: &str = "gallery_";

// =============================================================================
// Retry defaults
// =============================================================================

/// Default attempts for a network-failed origin fetch (initial attempt + one retry)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Default initial backoff in milliseconds
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 250;

/// Default maximum backoff in milliseconds
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 2000;

// =============================================================================
// Logging defaults
// =============================================================================

/// Default log level when RUST_LOG is unset
pub const DEFAULT_LOG_LEVEL: &str = "info";
