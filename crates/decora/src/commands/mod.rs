//! Command handlers.

pub mod control;
pub mod devices;
pub mod login;
pub mod watch;

use std::future::Future;
use std::time::Duration;

use decora_api::transport::TransportConfig;
use decora_core::{Bridge, BridgeConfig};

use crate::cli::{Command, GlobalOpts};
use crate::config;
use crate::error::CliError;

pub async fn dispatch(command: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match command {
        Command::Login(args) => login::handle(args, global).await,
        Command::Logout => login::logout(global),
        Command::Devices => devices::list(global).await,
        Command::Get(args) => devices::get(&args, global).await,
        Command::Set(args) => control::handle(&args, global).await,
        Command::Watch => watch::handle(global).await,
    }
}

/// Bridge configuration restored from the stored session.
pub(crate) fn restored_config(global: &GlobalOpts) -> Result<BridgeConfig, CliError> {
    let state = config::load();
    let payload = state.payload.ok_or(CliError::NotLoggedIn)?;

    let mut cfg = BridgeConfig::with_stored_payload(payload);
    cfg.transport = TransportConfig {
        timeout: Duration::from_secs(global.timeout),
    };
    Ok(cfg)
}

/// One-shot: connect a poll-only bridge, run the closure, disconnect.
///
/// The stream and periodic refresh are disabled since a single
/// request-response cycle is all these commands need.
pub(crate) async fn oneshot<F, Fut, T>(global: &GlobalOpts, f: F) -> Result<T, CliError>
where
    F: FnOnce(Bridge) -> Fut,
    Fut: Future<Output = Result<T, CliError>>,
{
    let mut cfg = restored_config(global)?;
    cfg.stream_enabled = false;
    cfg.refresh_interval = Duration::ZERO;

    let bridge = Bridge::new(cfg)?;
    bridge.connect().await?;
    let result = f(bridge.clone()).await;
    bridge.disconnect().await;
    result
}
