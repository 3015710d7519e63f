// Error types for the core crate.

use thiserror::Error;

/// Errors surfaced by [`Bridge`](crate::Bridge) operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("bridge is not connected")]
    NotConnected,

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The account requires a two-factor code; reconnect with one.
    #[error("a two-factor authentication code is required")]
    TwoFactorRequired,

    /// The stored session is no longer valid and cannot be refreshed
    /// silently; the operator must log in again.
    #[error("session expired; a fresh login is required")]
    ReauthenticationRequired,

    #[error("no device permissions on this account")]
    NoPermissions,

    #[error("account has no residences")]
    NoResidences,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Api(decora_api::Error),
}

impl From<decora_api::Error> for CoreError {
    fn from(e: decora_api::Error) -> Self {
        match e {
            decora_api::Error::TwoFactorRequired => Self::TwoFactorRequired,
            decora_api::Error::ReauthenticationRequired => Self::ReauthenticationRequired,
            decora_api::Error::NoPermissions => Self::NoPermissions,
            decora_api::Error::NoResidences => Self::NoResidences,
            decora_api::Error::NotAuthenticated => Self::NotConnected,
            other => Self::Api(other),
        }
    }
}

impl CoreError {
    /// True when only a fresh interactive login can resolve this error.
    pub fn needs_login(&self) -> bool {
        matches!(self, Self::TwoFactorRequired | Self::ReauthenticationRequired)
    }
}
