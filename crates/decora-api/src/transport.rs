// Shared transport configuration for building reqwest::Client instances.
//
// The cloud rejects requests without the header set the official app
// sends, so every client is built with those defaults baked in.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

/// Production REST endpoint.
pub const BASE_URL: &str = "https://my.leviton.com/api/";

/// Production WebSocket endpoint.
pub const STREAM_URL: &str = "wss://socket.cloud.leviton.com/";

pub(crate) const ORIGIN: &str = "https://myapp.leviton.com";
pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.2 Safari/605.1.15";

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` carrying the default header set the
    /// cloud expects (Origin/Referer/Accept, app user agent).
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(reqwest::header::ORIGIN, HeaderValue::from_static(ORIGIN));
        headers.insert(
            reqwest::header::REFERER,
            HeaderValue::from_static("https://myapp.leviton.com/"),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );

        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(crate::error::Error::Transport)
    }
}
