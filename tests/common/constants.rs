//! Shared constants for end-to-end tests

/// Subject exported in most tests
pub const SUBJECT_ID: i64 = 42;

/// Base URL the directory publisher builds public URLs from
pub const PUBLIC_BASE_URL: &str = "https://cdn.example.com/exports";

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Interval between server readiness checks (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;

/// Default timeout for HTTP requests in tests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Staleness window for export status polls in tests (seconds)
pub const STATUS_TIMEOUT_SECS: u64 = 60;
