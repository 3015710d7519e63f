use thiserror::Error;

/// Top-level error type for the `decora-api` crate.
///
/// Covers every failure mode across both API surfaces: authentication,
/// authorized HTTP calls, directory resolution, and the WebSocket stream.
/// `decora-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login failed (wrong credentials, malformed login response, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The server asked for a second-factor code and none was supplied.
    #[error("Two-factor authentication code required")]
    TwoFactorRequired,

    /// The token expired and cannot be refreshed silently — either no
    /// credentials are stored or the re-login itself needs a 2FA code.
    /// Must surface to the operator; retrying will not help.
    #[error("Token expired -- re-authentication required")]
    ReauthenticationRequired,

    /// An authorized call was attempted before any login or restore.
    #[error("Not authenticated")]
    NotAuthenticated,

    // ── Directory resolution ────────────────────────────────────────
    /// The user has no residential permissions (empty list or missing
    /// account field on the first entry).
    #[error("No residential permissions found for this account")]
    NoPermissions,

    /// No primary residence and the residence list is empty.
    #[error("No residences found for this account")]
    NoResidences,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Non-success response from the cloud API.
    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connect or mid-stream failure. Always retried by the
    /// stream's backoff loop, never surfaced as fatal.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error means the operator must re-enter
    /// credentials — retrying without user interaction cannot succeed.
    pub fn needs_user_action(&self) -> bool {
        matches!(
            self,
            Self::TwoFactorRequired | Self::ReauthenticationRequired | Self::NotAuthenticated
        )
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::WebSocketConnect(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
