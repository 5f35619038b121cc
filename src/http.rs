//! Shared reqwest client construction.

use std::time::Duration;

/// Build an HTTP client whose built-in bound covers connection setup only.
///
/// Streamed bodies can legitimately outlive any fixed deadline, so callers
/// bound individual requests (or the wait for response headers) themselves.
pub(crate) fn build_http_client(connect_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
