// Per-request context carried through the Pingora hooks

use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    started: Instant,
    route: &'static str,
    status: u16,
    bytes_sent: u64,
}

impl RequestContext {
    /// Fresh context with a UUID v4 request id
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            started: Instant::now(),
            route: "unknown",
            status: 0,
            bytes_sent: 0,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn route(&self) -> &'static str {
        self.route
    }

    pub fn set_route(&mut self, route: &'static str) {
        self.route = route;
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn add_bytes_sent(&mut self, bytes: u64) {
        self.bytes_sent += bytes;
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
