// Fundamental protocol constants
use std::time::Duration;

/// How long a correlated request waits for its response before failing.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Generous upper bound on inbound frame size (raw map payloads are large).
pub const MAX_FRAME_SIZE: usize = 1_000_000_000;

// Rate limiter defaults. The server enforces two independent limits:
// one per companion connection and one per account.
pub const CONNECTION_BUCKET_CAPACITY: f64 = 25.0;
pub const CONNECTION_BUCKET_REFRESH_AMOUNT: f64 = 3.0;
pub const ACCOUNT_BUCKET_CAPACITY: f64 = 50.0;
pub const ACCOUNT_BUCKET_REFRESH_AMOUNT: f64 = 15.0;
pub const BUCKET_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// How long a fetched relay-proxy version value stays fresh.
pub const PROXY_VERSION_MAX_AGE: Duration = Duration::from_secs(600);

/// Sentinel version sent when the proxy version endpoint is unreachable.
pub const PROXY_VERSION_FALLBACK: u64 = 9_999_999_999_999;
