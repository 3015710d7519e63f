//! WebSocket update stream with auto-reconnect.
//!
//! Connects to the My Leviton stream endpoint, performs the
//! challenge/authenticate handshake with the verbatim login payload,
//! subscribes to a fixed set of device identifiers, and forwards
//! projected notification patches through a bounded channel. Handles
//! reconnection with capped exponential backoff automatically.
//!
//! # Example
//!
//! ```rust,ignore
//! use decora_api::stream::StreamClient;
//!
//! let client = StreamClient::new(login_payload, vec!["123".into(), "456".into()]);
//! let (handle, mut updates) = client.start();
//!
//! while let Some(update) = updates.recv().await {
//!     println!("{}: {:?}", update.device_id, update.fields);
//! }
//!
//! handle.stop().await;
//! ```

use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::models::StateUpdate;
use crate::session::LoginPayload;
use crate::transport::{ORIGIN, STREAM_URL, USER_AGENT};

// ── Tuning ───────────────────────────────────────────────────────────

/// Bounded buffer between the read loop and the consumer. Overflow
/// drops the event with a warning; the periodic refresh reconverges.
const UPDATE_CHANNEL_CAPACITY: usize = 64;

const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Attribute keys forwarded from notification data. Anything else the
/// cloud sends on the wire is intentionally dropped.
const PROJECTED_FIELDS: [&str; 6] = [
    "power",
    "brightness",
    "fanSpeed",
    "occupancy",
    "motion",
    "connected",
];

// ── StreamState ──────────────────────────────────────────────────────

/// Connection lifecycle, observable through [`StreamHandle::state`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState {
    Stopped,
    Connecting,
    /// Connected; proactive auth sent, waiting for the server's
    /// challenge or ready signal.
    AwaitingChallenge,
    Subscribing,
    Streaming,
    Disconnected,
}

// ── StreamClient ─────────────────────────────────────────────────────

/// Configuration for one logical stream connection: the verbatim login
/// payload and the fixed subscription set. Adding devices after start
/// is not supported — restart with the new set instead.
pub struct StreamClient {
    url: Url,
    payload: LoginPayload,
    device_ids: Vec<String>,
}

impl StreamClient {
    /// Build a client against the production stream endpoint.
    pub fn new(payload: LoginPayload, device_ids: Vec<String>) -> Self {
        Self {
            // The constant is valid; parse cannot fail.
            url: Url::parse(STREAM_URL).expect("invalid stream URL constant"),
            payload,
            device_ids,
        }
    }

    /// Override the endpoint (tests).
    pub fn endpoint(mut self, url: Url) -> Self {
        self.url = url;
        self
    }

    /// Spawn the supervising reconnect loop. Non-blocking; returns the
    /// control handle and the single consumer's update receiver.
    pub fn start(self) -> (StreamHandle, mpsc::Receiver<StateUpdate>) {
        let (update_tx, update_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(StreamState::Stopped);
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            stream_loop(&self, &update_tx, &state_tx, &task_cancel).await;
        });

        (
            StreamHandle {
                cancel,
                state_rx,
                task,
            },
            update_rx,
        )
    }
}

// ── StreamHandle ─────────────────────────────────────────────────────

/// Handle to a running stream task.
pub struct StreamHandle {
    cancel: CancellationToken,
    state_rx: watch::Receiver<StreamState>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// Observe connection state changes.
    pub fn state(&self) -> watch::Receiver<StreamState> {
        self.state_rx.clone()
    }

    /// Stop the stream: cancel the loop, close any live connection,
    /// and wait for the task to finish. No updates are delivered after
    /// this returns.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
        tracing::info!("stream client stopped");
    }
}

// ── Supervising reconnect loop ───────────────────────────────────────

/// Main loop: connect → handshake → read; on any failure, back off and
/// retry forever until cancelled.
async fn stream_loop(
    client: &StreamClient,
    update_tx: &mpsc::Sender<StateUpdate>,
    state_tx: &watch::Sender<StreamState>,
    cancel: &CancellationToken,
) {
    let mut retry_delay = INITIAL_RETRY_DELAY;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let _ = state_tx.send(StreamState::Connecting);

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            r = run_connection(client, update_tx, state_tx, cancel) => r,
        };

        // A connection only counts as proven-good once it reached the
        // streaming state; connect success alone does not reset backoff.
        let reached_streaming = matches!(*state_tx.borrow(), StreamState::Streaming);
        let _ = state_tx.send(StreamState::Disconnected);

        match result {
            Ok(()) => tracing::info!("stream disconnected"),
            Err(e) => tracing::warn!(error = %e, "stream connection error"),
        }

        if cancel.is_cancelled() {
            break;
        }
        if reached_streaming {
            retry_delay = INITIAL_RETRY_DELAY;
        }

        tracing::info!(
            delay_secs = retry_delay.as_secs(),
            "waiting before reconnect"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(retry_delay) => {}
        }
        retry_delay = next_retry_delay(retry_delay);
    }

    let _ = state_tx.send(StreamState::Stopped);
    tracing::debug!("stream loop exiting");
}

/// Doubling backoff, capped.
fn next_retry_delay(current: Duration) -> Duration {
    (current * 2).min(MAX_RETRY_DELAY)
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one connection, run the handshake, read until it drops.
async fn run_connection(
    client: &StreamClient,
    update_tx: &mpsc::Sender<StateUpdate>,
    state_tx: &watch::Sender<StreamState>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    tracing::debug!(url = %client.url, "connecting to stream endpoint");

    let uri: tungstenite::http::Uri = client
        .url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let request = ClientRequestBuilder::new(uri)
        .with_header("Origin", ORIGIN)
        .with_header("User-Agent", USER_AGENT)
        .with_header("Authorization", client.payload.id.clone());

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("stream connected");

    let (mut write, mut read) = ws_stream.split();

    // Proactive auth before any server prompt: the raw payload under a
    // "token" key, no type field. The server may still send a
    // challenge; both paths answer with the same verbatim payload.
    send_json(&mut write, &json!({ "token": &client.payload })).await?;
    let _ = state_tx.send(StreamState::AwaitingChallenge);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(tungstenite::Message::Close(None)).await;
                return Ok(());
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        handle_frame(text.as_str(), client, &mut write, update_tx, state_tx)
                            .await?;
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite answers pongs automatically
                        tracing::trace!("stream ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "stream close frame");
                        } else {
                            tracing::info!("stream close frame (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("stream ended without close frame");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Inbound message handling ─────────────────────────────────────────

enum Inbound {
    Challenge,
    Status { status: Option<String> },
    Notification(Value),
    Other,
}

/// Route one inbound text frame. Send failures tear down the
/// connection; everything else is contained here.
async fn handle_frame<S>(
    text: &str,
    client: &StreamClient,
    write: &mut S,
    update_tx: &mpsc::Sender<StateUpdate>,
    state_tx: &watch::Sender<StreamState>,
) -> Result<(), Error>
where
    S: Sink<tungstenite::Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let Some(inbound) = parse_inbound(text) else {
        return Ok(());
    };

    match inbound {
        Inbound::Challenge => {
            tracing::info!("stream challenge received, authenticating");
            send_json(
                write,
                &json!({ "type": "authenticate", "token": &client.payload }),
            )
            .await?;
        }
        Inbound::Status { status } => {
            tracing::info!(status = status.as_deref().unwrap_or(""), "stream status");
            if status.as_deref() == Some("ready") {
                let _ = state_tx.send(StreamState::Subscribing);
                subscribe_all(client, write).await?;
                let _ = state_tx.send(StreamState::Streaming);
            }
        }
        Inbound::Notification(data) => {
            if let Some(update) = project_notification(&data) {
                if !client.device_ids.contains(&update.device_id) {
                    // Forwarded anyway -- the consumer owns filtering.
                    tracing::debug!(
                        device_id = %update.device_id,
                        "notification for untracked device"
                    );
                }
                forward_update(update, update_tx);
            }
        }
        Inbound::Other => {}
    }

    Ok(())
}

/// Parse a raw frame into a routed message. Returns `None` for empty or
/// malformed frames — those are dropped without touching the connection.
fn parse_inbound(text: &str) -> Option<Inbound> {
    // Frames may carry trailing NUL terminator bytes.
    let text = text.trim_matches('\0').trim();
    if text.is_empty() {
        return None;
    }

    let data: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "dropping malformed stream message");
            return None;
        }
    };

    match data.get("type").and_then(Value::as_str) {
        Some("challenge") => Some(Inbound::Challenge),
        Some("status") => Some(Inbound::Status {
            status: data
                .get("status")
                .and_then(Value::as_str)
                .map(str::to_owned),
        }),
        Some("notification") => Some(Inbound::Notification(data)),
        other => {
            // Unrecognized types are never errors -- forward compatible.
            tracing::trace!(msg_type = other.unwrap_or(""), "ignoring stream message");
            Some(Inbound::Other)
        }
    }
}

/// Extract `{id, ...projected fields}` from a notification document.
/// Missing `modelId` or `data` drops the message; unknown attribute
/// keys are not forwarded.
fn project_notification(data: &Value) -> Option<StateUpdate> {
    let notification = data.get("notification")?;

    let device_id = match notification.get("modelId")? {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return None,
    };

    let event_data = notification.get("data")?.as_object()?;
    if event_data.is_empty() {
        return None;
    }

    let mut fields = serde_json::Map::new();
    for key in PROJECTED_FIELDS {
        if let Some(value) = event_data.get(key) {
            fields.insert(key.to_owned(), value.clone());
        }
    }

    Some(StateUpdate { device_id, fields })
}

/// Hand an update to the consumer without blocking the read loop.
fn forward_update(update: StateUpdate, update_tx: &mpsc::Sender<StateUpdate>) {
    match update_tx.try_send(update) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(update)) => {
            tracing::warn!(
                device_id = %update.device_id,
                "update channel full, dropping event"
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!("update receiver dropped");
        }
    }
}

// ── Subscriptions ────────────────────────────────────────────────────

/// Send one subscription per recorded device id. A non-numeric id is
/// logged and skipped; it never aborts the connection.
async fn subscribe_all<S>(client: &StreamClient, write: &mut S) -> Result<(), Error>
where
    S: Sink<tungstenite::Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let mut sent = 0usize;

    for id in &client.device_ids {
        let Some(msg) = subscription_message(id) else {
            tracing::warn!(device_id = %id, "device id is not numeric, skipping subscription");
            continue;
        };
        send_json(write, &msg).await?;
        sent += 1;
    }

    tracing::info!(subscribed = sent, "subscriptions sent");
    Ok(())
}

/// Build a subscription message, coercing the identifier to the integer
/// form the server expects. `None` if the id is not numeric.
fn subscription_message(device_id: &str) -> Option<Value> {
    let model_id: i64 = device_id.trim().parse().ok()?;
    Some(json!({
        "type": "subscribe",
        "subscription": { "modelName": "IotSwitch", "modelId": model_id }
    }))
}

async fn send_json<S>(write: &mut S, value: &Value) -> Result<(), Error>
where
    S: Sink<tungstenite::Message> + Unpin,
    S::Error: std::fmt::Display,
{
    write
        .send(tungstenite::Message::Text(value.to_string().into()))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_and_caps() {
        let mut delay = INITIAL_RETRY_DELAY;
        let mut observed = Vec::new();
        for _ in 0..8 {
            observed.push(delay.as_secs());
            delay = next_retry_delay(delay);
        }
        assert_eq!(observed, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn subscription_coerces_id_to_integer() {
        let msg = subscription_message("123").unwrap();
        assert_eq!(msg["type"], "subscribe");
        assert_eq!(msg["subscription"]["modelName"], "IotSwitch");
        assert_eq!(msg["subscription"]["modelId"], 123);
    }

    #[test]
    fn subscription_rejects_non_numeric_id() {
        assert!(subscription_message("garage-door").is_none());
        assert!(subscription_message("").is_none());
    }

    #[test]
    fn parse_strips_terminator_bytes() {
        let raw = "{\"type\":\"challenge\"}\0\0";
        assert!(matches!(parse_inbound(raw), Some(Inbound::Challenge)));
    }

    #[test]
    fn parse_drops_malformed_frames() {
        assert!(parse_inbound("not json at all").is_none());
        assert!(parse_inbound("\0\0").is_none());
        assert!(parse_inbound("").is_none());
    }

    #[test]
    fn parse_ignores_unknown_types() {
        let raw = r#"{ "type": "heartbeat", "seq": 7 }"#;
        assert!(matches!(parse_inbound(raw), Some(Inbound::Other)));
        // No type field at all is also just ignored.
        assert!(matches!(parse_inbound(r#"{"a":1}"#), Some(Inbound::Other)));
    }

    #[test]
    fn parse_status_extracts_value() {
        let raw = r#"{ "type": "status", "status": "ready", "connectionId": "c1" }"#;
        match parse_inbound(raw) {
            Some(Inbound::Status { status }) => assert_eq!(status.as_deref(), Some("ready")),
            _ => panic!("expected status message"),
        }
    }

    #[test]
    fn projection_keeps_known_fields_only() {
        let data = serde_json::json!({
            "type": "notification",
            "notification": {
                "modelId": 123,
                "data": { "power": "ON", "brightness": 50, "unknownField": "x" }
            }
        });

        let update = project_notification(&data).unwrap();
        assert_eq!(update.device_id, "123");
        assert_eq!(update.power(), Some("ON"));
        assert_eq!(update.brightness(), Some(50));
        assert!(!update.fields.contains_key("unknownField"));
    }

    #[test]
    fn projection_requires_model_id_and_data() {
        let no_model = serde_json::json!({
            "type": "notification",
            "notification": { "data": { "power": "ON" } }
        });
        assert!(project_notification(&no_model).is_none());

        let no_data = serde_json::json!({
            "type": "notification",
            "notification": { "modelId": 123 }
        });
        assert!(project_notification(&no_data).is_none());

        let empty_data = serde_json::json!({
            "type": "notification",
            "notification": { "modelId": 123, "data": {} }
        });
        assert!(project_notification(&empty_data).is_none());
    }

    #[test]
    fn projection_accepts_string_model_id() {
        let data = serde_json::json!({
            "type": "notification",
            "notification": { "modelId": "456", "data": { "motion": true } }
        });

        let update = project_notification(&data).unwrap();
        assert_eq!(update.device_id, "456");
        assert_eq!(update.fields["motion"], true);
    }
}
