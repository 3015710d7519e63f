// Bridge lifecycle.
//
// Owns the API client, the device cache, and the background tasks that
// keep the cache fresh: the push stream consumer and a periodic poll
// fallback. Consumers read the cache; they never talk to the cloud
// directly.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use decora_api::ApiClient;
use decora_api::models::{AttributePatch, Device, StateUpdate};
use decora_api::session::LoginPayload;
use decora_api::stream::{StreamClient, StreamHandle, StreamState};

use crate::cache::DeviceCache;
use crate::config::BridgeConfig;
use crate::error::CoreError;

// ── BridgeState ──────────────────────────────────────────────────────

/// Bridge state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeState {
    Disconnected,
    Connecting,
    Connected,
    /// The session expired and silent refresh is impossible; only a
    /// fresh interactive login recovers from here.
    AuthExpired,
}

// ── Bridge ───────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc`. [`connect`](Self::connect)
/// authenticates, resolves the residence, loads the device list, and
/// spawns the background tasks; [`disconnect`](Self::disconnect) tears
/// everything down and waits for the tasks to finish.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    config: BridgeConfig,
    api: ApiClient,
    cache: Arc<DeviceCache>,
    state: watch::Sender<BridgeState>,
    cancel: CancellationToken,
    /// Child token for the current connection — cancelled on
    /// disconnect, replaced on reconnect.
    cancel_child: Mutex<CancellationToken>,
    residence_id: Mutex<Option<String>>,
    stream: Mutex<Option<StreamHandle>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Bridge {
    /// Create a bridge from configuration. Does not connect — call
    /// [`connect`](Self::connect) to authenticate and start tasks.
    pub fn new(config: BridgeConfig) -> Result<Self, CoreError> {
        let api = match &config.base_url {
            Some(base) => {
                let http = config.transport.build_client().map_err(CoreError::from)?;
                ApiClient::with_client(http, base.clone())
            }
            None => ApiClient::new(&config.transport).map_err(CoreError::from)?,
        };

        let (state, _) = watch::channel(BridgeState::Disconnected);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Ok(Self {
            inner: Arc::new(BridgeInner {
                config,
                api,
                cache: Arc::new(DeviceCache::new()),
                state,
                cancel,
                cancel_child: Mutex::new(cancel_child),
                residence_id: Mutex::new(None),
                stream: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &Arc<DeviceCache> {
        &self.inner.cache
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Authenticate, resolve the residence, load the device list, and
    /// spawn the stream consumer and periodic refresh tasks.
    ///
    /// Calling this on an already-connected bridge tears the previous
    /// connection down first; the old stream and tasks are fully
    /// stopped before the new ones start.
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.shutdown_tasks().await;

        let _ = self.inner.state.send(BridgeState::Connecting);

        // Fresh child token for this connection.
        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();

        let config = &self.inner.config;
        let session = self.inner.api.session();

        // A stored payload wins over credentials: it restores without a
        // network round trip and without keeping a password around.
        if let Some(payload) = config.stored_payload.clone() {
            session.restore(payload);
            debug!("session restored from stored payload");
        } else if let Some(creds) = &config.credentials {
            session
                .login(&creds.email, &creds.password, creds.code.as_deref())
                .await?;
        } else {
            let _ = self.inner.state.send(BridgeState::Disconnected);
            return Err(CoreError::Config(
                "neither credentials nor a stored session payload given".into(),
            ));
        }

        // Directory walk: permissions → account → residence → devices.
        let result: Result<(), CoreError> = async {
            let account_id = self.inner.api.residential_account_id().await?;
            let residence_id = self.inner.api.primary_residence_id(&account_id).await?;
            info!(account_id, residence_id, "resolved residence");

            let devices = self.inner.api.devices(&residence_id).await?;
            self.inner.cache.apply_snapshot(devices);

            *self.inner.residence_id.lock().await = Some(residence_id);
            Ok(())
        }
        .await;
        if let Err(e) = result {
            let _ = self.inner.state.send(BridgeState::Disconnected);
            return Err(e);
        }

        let mut tasks = self.inner.tasks.lock().await;

        if !self.inner.config.refresh_interval.is_zero() {
            let bridge = self.clone();
            let cancel = child.clone();
            tasks.push(tokio::spawn(refresh_task(bridge, cancel)));
        }

        if self.inner.config.stream_enabled {
            self.spawn_stream(&child, &mut tasks).await?;
        }
        drop(tasks);

        let _ = self.inner.state.send(BridgeState::Connected);
        info!(devices = self.inner.cache.len(), "bridge connected");
        Ok(())
    }

    /// Start the push stream and the consumer task feeding the cache.
    async fn spawn_stream(
        &self,
        cancel: &CancellationToken,
        tasks: &mut Vec<JoinHandle<()>>,
    ) -> Result<(), CoreError> {
        let payload = self
            .inner
            .api
            .session()
            .login_payload()
            .ok_or(CoreError::NotConnected)?;

        let mut client = StreamClient::new(payload, self.inner.cache.device_ids());
        if let Some(url) = &self.inner.config.stream_url {
            client = client.endpoint(url.clone());
        }

        let (handle, updates) = client.start();
        *self.inner.stream.lock().await = Some(handle);

        let cache = Arc::clone(&self.inner.cache);
        let consumer_cancel = cancel.child_token();
        tasks.push(tokio::spawn(stream_consumer_task(
            cache,
            updates,
            consumer_cancel,
        )));

        debug!("push stream spawned");
        Ok(())
    }

    /// Cancel background tasks, stop the stream, and wait for all of it
    /// to finish. The cache keeps its last contents.
    pub async fn disconnect(&self) {
        self.shutdown_tasks().await;

        *self.inner.residence_id.lock().await = None;
        let _ = self.inner.state.send(BridgeState::Disconnected);
        debug!("bridge disconnected");
    }

    /// Stop the stream and join every background task. The stream
    /// handle owns its own cancellation; dropping it would leave the
    /// task running, so it must be stopped explicitly.
    async fn shutdown_tasks(&self) {
        self.inner.cancel_child.lock().await.cancel();

        if let Some(handle) = self.inner.stream.lock().await.take() {
            handle.stop().await;
        }

        let mut tasks = self.inner.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
    }

    /// Re-fetch the full device list and replace the cache contents.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        let residence_id = self
            .inner
            .residence_id
            .lock()
            .await
            .clone()
            .ok_or(CoreError::NotConnected)?;

        let devices = self.inner.api.devices(&residence_id).await?;
        self.inner.cache.apply_snapshot(devices);
        Ok(())
    }

    // ── Device control ───────────────────────────────────────────────

    pub async fn set_power(&self, device_id: &str, on: bool) -> Result<(), CoreError> {
        self.apply(device_id, AttributePatch::default().power(on))
            .await
    }

    pub async fn set_brightness(&self, device_id: &str, level: i64) -> Result<(), CoreError> {
        if !(0..=100).contains(&level) {
            return Err(CoreError::Config(format!(
                "brightness must be 0-100, got {level}"
            )));
        }
        // Setting a level also turns the device on, matching the
        // physical dimmer behavior.
        self.apply(
            device_id,
            AttributePatch::default().power(true).brightness(level),
        )
        .await
    }

    pub async fn set_fan_speed(&self, device_id: &str, speed: i64) -> Result<(), CoreError> {
        // Same percentage scale as brightness; the device quantizes to
        // its own step count.
        if !(0..=100).contains(&speed) {
            return Err(CoreError::Config(format!(
                "fan speed must be 0-100, got {speed}"
            )));
        }
        self.apply(
            device_id,
            AttributePatch::default().power(true).fan_speed(speed),
        )
        .await
    }

    /// Send a partial attribute update, then patch the cache
    /// optimistically; the stream notification confirms shortly after.
    async fn apply(&self, device_id: &str, patch: AttributePatch) -> Result<(), CoreError> {
        if self.inner.cache.get(device_id).is_none() {
            return Err(CoreError::DeviceNotFound(device_id.to_owned()));
        }

        self.inner
            .api
            .set_attributes(device_id, &patch)
            .await
            .map_err(CoreError::from)?;

        if let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(&patch) {
            self.inner.cache.apply_update(&StateUpdate {
                device_id: device_id.to_owned(),
                fields,
            });
        }
        Ok(())
    }

    // ── State observation & accessors ────────────────────────────────

    /// Subscribe to bridge state changes.
    pub fn state(&self) -> watch::Receiver<BridgeState> {
        self.inner.state.subscribe()
    }

    /// Current stream connection state, when the stream is running.
    pub async fn stream_state(&self) -> Option<StreamState> {
        self.inner
            .stream
            .lock()
            .await
            .as_ref()
            .map(|h| h.state().borrow().clone())
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.inner.cache.snapshot()
    }

    pub fn device(&self, device_id: &str) -> Result<Arc<Device>, CoreError> {
        self.inner
            .cache
            .get(device_id)
            .ok_or_else(|| CoreError::DeviceNotFound(device_id.to_owned()))
    }

    /// The login payload of the active session, for persisting across
    /// runs. `None` before a successful login or restore.
    pub fn login_payload(&self) -> Option<LoginPayload> {
        self.inner.api.session().login_payload()
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Periodic full refresh. Transient failures are logged and retried on
/// the next tick; an expired session stops the task and flags the
/// bridge.
async fn refresh_task(bridge: Bridge, cancel: CancellationToken) {
    let interval = bridge.inner.config.refresh_interval;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }

        match bridge.refresh().await {
            Ok(()) => debug!(devices = bridge.inner.cache.len(), "periodic refresh"),
            Err(e) if e.needs_login() => {
                warn!(error = %e, "session expired, stopping periodic refresh");
                let _ = bridge.inner.state.send(BridgeState::AuthExpired);
                break;
            }
            Err(e) => warn!(error = %e, "periodic refresh failed"),
        }
    }
}

/// Applies stream updates to the cache. Updates for devices the cache
/// does not know are dropped; the next full refresh reconverges.
async fn stream_consumer_task(
    cache: Arc<DeviceCache>,
    mut updates: mpsc::Receiver<StateUpdate>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            update = updates.recv() => {
                match update {
                    Some(update) => {
                        if cache.apply_update(&update) {
                            debug!(device_id = %update.device_id, "stream update applied");
                        }
                    }
                    None => break,
                }
            }
        }
    }
    debug!("stream consumer exiting");
}
