//! Constants for the download module (timeouts, limits, schedule).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Largest accepted response body (10 MiB).
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Maximum number of content or fallback redirects followed per download.
pub const MAX_REDIRECTS: u32 = 5;

/// Delay before the first scheduled check after start (1 minute).
pub const INITIAL_DELAY: Duration = Duration::from_secs(60);

/// Interval between scheduled checks (1 hour).
pub const CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Download counts above this are reported as `4+`.
pub const DOWNLOAD_COUNT_CAP: u32 = 4;
