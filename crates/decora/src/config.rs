//! CLI-owned session persistence.
//!
//! Stores the account email and the verbatim login payload as JSON in
//! the platform config directory. The payload is what the stream
//! handshake replays, so it is kept exactly as the server sent it.

use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use decora_api::session::LoginPayload;

use crate::error::CliError;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub email: Option<String>,

    /// Full login response document from the last successful login.
    pub payload: Option<LoginPayload>,
}

/// Path of the session state file.
pub fn state_path() -> PathBuf {
    ProjectDirs::from("", "", "decora").map_or_else(
        || PathBuf::from(".decora-session.json"),
        |dirs| dirs.config_dir().join("session.json"),
    )
}

/// Load the stored session, or an empty one when the file is missing
/// or unreadable.
pub fn load() -> SessionState {
    let path = state_path();
    match fs::read_to_string(&path) {
        Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "session file unreadable, ignoring");
            SessionState::default()
        }),
        Err(_) => SessionState::default(),
    }
}

pub fn save(state: &SessionState) -> Result<(), CliError> {
    let path = state_path();
    let wrap = |source| CliError::State {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(wrap)?;
    }

    let text = serde_json::to_string_pretty(state).unwrap_or_default();
    fs::write(&path, text).map_err(wrap)?;

    // The payload is a bearer credential; keep it owner-readable only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).map_err(wrap)?;
    }

    Ok(())
}

/// Delete the stored session, ignoring a missing file.
pub fn clear() -> Result<(), CliError> {
    let path = state_path();
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CliError::State {
            path: path.display().to_string(),
            source,
        }),
    }
}
