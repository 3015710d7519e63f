// Bridge configuration.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use decora_api::session::LoginPayload;
use decora_api::transport::TransportConfig;

/// Interactive account credentials.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
    /// Two-factor code, when the account demands one.
    pub code: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .field("code", &self.code.as_deref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Configuration for a [`Bridge`](crate::Bridge).
///
/// Authentication prefers a stored payload (no network round trip, no
/// password on disk needed) and falls back to interactive credentials.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub credentials: Option<Credentials>,

    /// A login payload saved from a previous session. When set, the
    /// bridge restores from it instead of logging in.
    pub stored_payload: Option<LoginPayload>,

    /// Poll fallback interval. Zero disables periodic refresh.
    pub refresh_interval: Duration,

    /// Whether to run the push stream alongside polling.
    pub stream_enabled: bool,

    pub transport: TransportConfig,

    /// REST endpoint override (tests). `None` means production.
    pub base_url: Option<Url>,

    /// Stream endpoint override (tests). `None` means production.
    pub stream_url: Option<Url>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            stored_payload: None,
            // Matches the cloud app's own refresh cadence.
            refresh_interval: Duration::from_secs(30),
            stream_enabled: true,
            transport: TransportConfig::default(),
            base_url: None,
            stream_url: None,
        }
    }
}

impl BridgeConfig {
    pub fn with_credentials(email: impl Into<String>, password: SecretString) -> Self {
        Self {
            credentials: Some(Credentials {
                email: email.into(),
                password,
                code: None,
            }),
            ..Self::default()
        }
    }

    pub fn with_stored_payload(payload: LoginPayload) -> Self {
        Self {
            stored_payload: Some(payload),
            ..Self::default()
        }
    }
}
