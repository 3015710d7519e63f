//! Device cache and bridge lifecycle for My Leviton cloud devices.
//!
//! [`Bridge`] is the main entry point: it authenticates, resolves the
//! account's residence, loads the device list into a reactive cache,
//! and keeps that cache fresh through the push stream plus a periodic
//! poll fallback.

pub mod bridge;
pub mod cache;
pub mod config;
pub mod error;
pub mod model;

pub use bridge::{Bridge, BridgeState};
pub use cache::DeviceCache;
pub use config::{BridgeConfig, Credentials};
pub use error::CoreError;
pub use model::DeviceKind;
