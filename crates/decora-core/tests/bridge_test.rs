// End-to-end bridge tests: mocked REST directory plus an in-process
// WebSocket stream server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use decora_core::{Bridge, BridgeConfig, BridgeState, CoreError};

const WAIT: Duration = Duration::from_secs(5);

// ── Helpers ─────────────────────────────────────────────────────────

async fn mock_directory(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/Person/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "tok-1",
            "userId": "user-9",
            "ttl": 1209600,
            "user": { "email": "a@b.c" }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Person/user-9/residentialPermissions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([ { "residentialAccountId": 42 } ])),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ResidentialAccounts/42"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": 42, "primaryResidenceId": 7 })),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Residences/7/iotSwitches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": 123,
                "name": "Kitchen Dimmer",
                "model": "DW6HD",
                "power": "ON",
                "brightness": 75,
                "status": "online"
            },
            {
                "id": 456,
                "name": "Porch Switch",
                "model": "DW15S",
                "power": "OFF",
                "status": "online"
            }
        ])))
        .mount(server)
        .await;
}

fn poll_only_config(server: &MockServer) -> BridgeConfig {
    let mut config = BridgeConfig::with_credentials("a@b.c", SecretString::from("hunter2"));
    config.base_url = Some(url::Url::parse(&server.uri()).unwrap());
    config.stream_enabled = false;
    config.refresh_interval = Duration::ZERO;
    config
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_loads_devices() {
    let server = MockServer::start().await;
    mock_directory(&server).await;

    let bridge = Bridge::new(poll_only_config(&server)).unwrap();
    bridge.connect().await.unwrap();

    assert_eq!(*bridge.state().borrow(), BridgeState::Connected);
    assert_eq!(bridge.devices_snapshot().len(), 2);

    let dimmer = bridge.device("123").unwrap();
    assert_eq!(dimmer.name.as_deref(), Some("Kitchen Dimmer"));
    assert_eq!(dimmer.brightness, Some(75));

    // The payload is available for persisting across runs.
    assert_eq!(bridge.login_payload().unwrap().id, "tok-1");

    bridge.disconnect().await;
    assert_eq!(*bridge.state().borrow(), BridgeState::Disconnected);
}

#[tokio::test]
async fn test_connect_without_credentials_fails() {
    let bridge = Bridge::new(BridgeConfig::default()).unwrap();
    let result = bridge.connect().await;

    assert!(matches!(result, Err(CoreError::Config(_))));
    assert_eq!(*bridge.state().borrow(), BridgeState::Disconnected);
}

#[tokio::test]
async fn test_connect_maps_directory_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Person/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "tok-1",
            "userId": "user-9"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Person/user-9/residentialPermissions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let bridge = Bridge::new(poll_only_config(&server)).unwrap();
    let result = bridge.connect().await;

    assert!(matches!(result, Err(CoreError::NoPermissions)));
    assert_eq!(*bridge.state().borrow(), BridgeState::Disconnected);
}

#[tokio::test]
async fn test_set_power_updates_cloud_and_cache() {
    let server = MockServer::start().await;
    mock_directory(&server).await;

    Mock::given(method("PUT"))
        .and(path("/IotSwitches/456"))
        .and(body_json(json!({ "power": "ON" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 456 })))
        .expect(1)
        .mount(&server)
        .await;

    let bridge = Bridge::new(poll_only_config(&server)).unwrap();
    bridge.connect().await.unwrap();

    bridge.set_power("456", true).await.unwrap();

    // Optimistic cache update, ahead of any stream confirmation.
    assert_eq!(bridge.device("456").unwrap().power.as_deref(), Some("ON"));

    bridge.disconnect().await;
    server.verify().await;
}

#[tokio::test]
async fn test_set_brightness_validates_range() {
    let server = MockServer::start().await;
    mock_directory(&server).await;

    let bridge = Bridge::new(poll_only_config(&server)).unwrap();
    bridge.connect().await.unwrap();

    let result = bridge.set_brightness("123", 150).await;
    assert!(matches!(result, Err(CoreError::Config(_))));

    let result = bridge.set_fan_speed("123", 150).await;
    assert!(matches!(result, Err(CoreError::Config(_))));

    let result = bridge.set_power("does-not-exist", true).await;
    assert!(matches!(result, Err(CoreError::DeviceNotFound(_))));

    bridge.disconnect().await;
}

#[tokio::test]
async fn test_reconnect_replaces_the_previous_connection() {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    let server = MockServer::start().await;
    mock_directory(&server).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stream_url = url::Url::parse(&format!("ws://{addr}/")).unwrap();

    // Accept every stream connection and keep counts of how many were
    // seen and how many are still open.
    let seen = Arc::new(AtomicUsize::new(0));
    let open = Arc::new(AtomicUsize::new(0));
    {
        let seen = Arc::clone(&seen);
        let open = Arc::clone(&open);
        tokio::spawn(async move {
            loop {
                let (tcp, _) = listener.accept().await.unwrap();
                seen.fetch_add(1, Ordering::SeqCst);
                let open = Arc::clone(&open);
                tokio::spawn(async move {
                    let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
                    open.fetch_add(1, Ordering::SeqCst);
                    while ws.next().await.is_some() {}
                    open.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });
    }

    async fn wait_until(what: &str, cond: impl Fn() -> bool) {
        timeout(WAIT, async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
    }

    let mut config = poll_only_config(&server);
    config.stream_enabled = true;
    config.stream_url = Some(stream_url);

    let bridge = Bridge::new(config).unwrap();

    bridge.connect().await.unwrap();
    wait_until("first stream connection", || open.load(Ordering::SeqCst) == 1).await;

    // A second connect must fully tear down the first connection's
    // stream and tasks before starting its own.
    bridge.connect().await.unwrap();
    wait_until("old connection closed, new one open", || {
        seen.load(Ordering::SeqCst) == 2 && open.load(Ordering::SeqCst) == 1
    })
    .await;

    // No orphaned tasks left behind: disconnect joins everything and
    // returns promptly.
    timeout(WAIT, bridge.disconnect()).await.unwrap();
    assert_eq!(*bridge.state().borrow(), BridgeState::Disconnected);
    wait_until("all connections closed", || open.load(Ordering::SeqCst) == 0).await;
}

#[tokio::test]
async fn test_stream_updates_reach_the_cache() {
    let server = MockServer::start().await;
    mock_directory(&server).await;

    // In-process stream endpoint speaking the handshake protocol.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stream_url = url::Url::parse(&format!("ws://{addr}/")).unwrap();

    let ws_server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

        // auth frame
        let _ = ws.next().await;
        ws.send(Message::Text(
            json!({ "type": "status", "status": "ready" }).to_string().into(),
        ))
        .await
        .unwrap();

        // one subscription per cached device
        let mut subscribed = Vec::new();
        for _ in 0..2 {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let v: Value = serde_json::from_str(text.as_str()).unwrap();
                subscribed.push(v["subscription"]["modelId"].as_i64().unwrap());
            }
        }
        subscribed.sort_unstable();
        assert_eq!(subscribed, vec![123, 456]);

        ws.send(Message::Text(
            json!({
                "type": "notification",
                "notification": { "modelId": 123, "data": { "brightness": 20 } }
            })
            .to_string()
            .into(),
        ))
        .await
        .unwrap();

        while ws.next().await.is_some() {}
    });

    let mut config = poll_only_config(&server);
    config.stream_enabled = true;
    config.stream_url = Some(stream_url);

    let bridge = Bridge::new(config).unwrap();
    bridge.connect().await.unwrap();

    // Wait for the pushed update to land in the cache.
    let cache = bridge.cache();
    let mut versions = cache.subscribe_version();
    timeout(WAIT, async {
        while bridge.device("123").unwrap().brightness != Some(20) {
            versions.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    bridge.disconnect().await;
    ws_server.await.unwrap();
}
