// decora-api: Async Rust client for the My Leviton cloud (HTTP + WebSocket stream)

pub mod client;
pub mod error;
pub mod models;
pub mod session;
pub mod stream;
pub mod transport;

pub use client::ApiClient;
pub use error::Error;
pub use models::{AttributePatch, Device, StateUpdate};
pub use session::{LoginPayload, Session};
pub use stream::{StreamClient, StreamHandle, StreamState};
