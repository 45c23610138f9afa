// Reelcache library
//
// Disk-backed caching range proxy for video and image assets held in
// Supabase Storage.

pub mod cache;
pub mod config;
pub mod constants;
pub mod logging;
pub mod metrics;
pub mod origin;
pub mod proxy;
pub mod range;
pub mod request_coalescing;
pub mod retry;
