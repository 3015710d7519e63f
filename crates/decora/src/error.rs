//! CLI error type and exit codes.

use thiserror::Error;

use decora_core::CoreError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("not logged in -- run `decora login` first")]
    NotLoggedIn,

    #[error("session expired -- run `decora login` again")]
    SessionExpired,

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error(transparent)]
    Core(CoreError),

    #[error("could not access {path}: {source}")]
    State {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("input error: {0}")]
    Input(#[from] std::io::Error),
}

impl From<CoreError> for CliError {
    fn from(e: CoreError) -> Self {
        if matches!(e, CoreError::ReauthenticationRequired) {
            Self::SessionExpired
        } else {
            Self::Core(e)
        }
    }
}

impl CliError {
    /// Exit code for scripting: 2 usage, 3 auth, 1 everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } => 2,
            Self::NotLoggedIn | Self::SessionExpired => 3,
            Self::Core(e) if e.needs_login() => 3,
            _ => 1,
        }
    }
}
