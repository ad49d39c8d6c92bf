//! Integration tests for the request router
//!
//! Drives the full facade against minimal in-process JSON-RPC stub
//! servers, covering routing, failover, non-retryable short-circuiting,
//! capability isolation, and the transport adapter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ethers::providers::{Middleware, Provider};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use folio_rpc::{
    Capability, ProviderConfig, RouterConfig, RouterError, RouterSettings, RouterTransport,
    RpcProviderManager,
};

/// Canned reply for a stub server
#[derive(Clone)]
enum StubReply {
    Result(Value),
    RpcError { code: i64, message: String },
}

/// Spawn a stub JSON-RPC server that answers every request with `reply`
/// after `delay`, echoing the request id. Returns the endpoint URL.
async fn spawn_stub(reply: StubReply, delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let reply = reply.clone();
            tokio::spawn(async move {
                handle_connection(socket, reply, delay).await;
            });
        }
    });

    format!("http://{}", addr)
}

async fn handle_connection(mut socket: TcpStream, reply: StubReply, delay: Duration) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let request_id = loop {
        let Ok(n) = socket.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(split) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            if let Ok(request) = serde_json::from_slice::<Value>(&buf[split + 4..]) {
                break request["id"].clone();
            }
        }
    };

    tokio::time::sleep(delay).await;

    let body = match reply {
        StubReply::Result(result) => {
            json!({ "jsonrpc": "2.0", "id": request_id, "result": result })
        }
        StubReply::RpcError { code, message } => {
            json!({ "jsonrpc": "2.0", "id": request_id, "error": { "code": code, "message": message } })
        }
    }
    .to_string();

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// An endpoint that refuses connections
async fn dead_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn provider(name: &str, url: &str, priority: i32) -> ProviderConfig {
    ProviderConfig {
        name: name.to_string(),
        http_url: url.to_string(),
        calls_per_second: 100.0,
        calls_per_day: None,
        priority,
        enabled: true,
        capabilities: HashMap::new(),
    }
}

fn manager_with(
    providers: Vec<ProviderConfig>,
    settings: RouterSettings,
) -> RpcProviderManager {
    RpcProviderManager::new(RouterConfig {
        providers,
        settings,
    })
    .unwrap()
}

#[tokio::test]
async fn test_send_routes_to_provider() {
    let url = spawn_stub(StubReply::Result(json!("0x10")), Duration::ZERO).await;
    let manager = manager_with(
        vec![provider("live", &url, 0)],
        RouterSettings::default(),
    );

    let result = manager.send("eth_blockNumber", json!([])).await.unwrap();
    assert_eq!(result, json!("0x10"));

    let metrics = manager.get_metrics().await;
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.successful_requests, 1);
}

#[tokio::test]
async fn test_failover_to_next_provider() {
    let dead = dead_endpoint().await;
    let live = spawn_stub(StubReply::Result(json!("0x2a")), Duration::ZERO).await;

    let manager = manager_with(
        vec![provider("dead", &dead, 10), provider("live", &live, 1)],
        RouterSettings::default(),
    );

    let result = manager.send("eth_blockNumber", json!([])).await.unwrap();
    assert_eq!(result, json!("0x2a"));

    let status = manager.get_status().await;
    let dead_status = status.iter().find(|s| s.name == "dead").unwrap();
    let live_status = status.iter().find(|s| s.name == "live").unwrap();
    assert!(dead_status.consecutive_errors >= 1);
    assert_eq!(live_status.consecutive_errors, 0);
    assert!(live_status.healthy);
}

#[tokio::test]
async fn test_exhaustion_wraps_last_error() {
    let dead = dead_endpoint().await;
    let manager = manager_with(
        vec![provider("dead", &dead, 0)],
        RouterSettings::default(),
    );

    let err = manager
        .send("eth_blockNumber", json!([]))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::AllProvidersExhausted { .. }));
}

#[tokio::test]
async fn test_non_retryable_error_short_circuits() {
    let url = spawn_stub(
        StubReply::RpcError {
            code: -32602,
            message: "invalid argument 0: hex string without 0x prefix".to_string(),
        },
        Duration::ZERO,
    )
    .await;

    let manager = manager_with(
        vec![provider("a", &url, 10), provider("b", &url, 1)],
        RouterSettings::default(),
    );

    let err = manager
        .send("eth_getBalance", json!(["deadbeef", "latest"]))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::NonRetryableCall(_)));

    // No failover happened and neither provider took a strike
    for snapshot in manager.get_status().await {
        assert_eq!(snapshot.consecutive_errors, 0);
        assert!(snapshot.healthy);
    }
}

#[tokio::test]
async fn test_capability_routing_bypasses_load_balancing() {
    let plain_url = spawn_stub(StubReply::Result(json!("0xa")), Duration::ZERO).await;
    let scan_url = spawn_stub(StubReply::Result(json!("0xb")), Duration::ZERO).await;

    let mut scanner = provider("scanner", &scan_url, 1);
    scanner
        .capabilities
        .insert("large_block_scans".to_string(), true);

    let manager = manager_with(
        vec![provider("plain", &plain_url, 10), scanner],
        RouterSettings::default(),
    );

    let client = manager
        .get_capable_provider(Capability::LargeBlockScans)
        .await
        .expect("scanner qualifies");

    // The lower-priority flagged provider answers, not the top-ranked one
    let result: Value = client.request("eth_blockNumber", ()).await.unwrap();
    assert_eq!(result, json!("0xb"));
}

#[tokio::test]
async fn test_queue_backpressure_surfaces_to_caller() {
    let slow = spawn_stub(StubReply::Result(json!("0x1")), Duration::from_millis(500)).await;

    let mut settings = RouterSettings::default();
    settings.max_queue_size = 1;
    settings.max_concurrency = 1;

    let manager = Arc::new(manager_with(vec![provider("slow", &slow, 0)], settings));

    let first = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.send("eth_blockNumber", json!([])).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.send("eth_blockNumber", json!([])).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = manager
        .send("eth_blockNumber", json!([]))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::QueueFull { limit: 1 }));

    // The admitted calls still complete
    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_adapter_satisfies_provider_interface() {
    let url = spawn_stub(StubReply::Result(json!("0x10")), Duration::ZERO).await;
    let manager = Arc::new(manager_with(
        vec![provider("live", &url, 0)],
        RouterSettings::default(),
    ));

    let provider = Provider::new(RouterTransport::new(manager));
    let block = provider.get_block_number().await.unwrap();
    assert_eq!(block.as_u64(), 16);
}
