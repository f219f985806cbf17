//! Dispatch server integration tests
//!
//! Drives a started server over real HTTP with reqwest, with the local
//! worker pool and with hand-rolled remote actors on the framed socket.

use std::sync::Arc;
use std::time::Duration;

use rpcpool_common::protocol::{ActorReply, DispatchRecord};
use rpcpool_common::transport::{connect, framed};
use rpcpool_server::{start, RunningServer, ServerConfig};
use rpcpool_worker::{builtin_registry, PoolConfig, WorkerPool};
use serde_json::{json, Value};

// ============================================================================
// Helpers
// ============================================================================

fn config() -> ServerConfig {
    ServerConfig {
        http_addr: "127.0.0.1:0".to_string(),
        actor_addr: "127.0.0.1:0".to_string(),
        reply_timeout: Some(Duration::from_secs(5)),
        infos: json!({"threads": 2, "strategy": "roundrobin"}),
    }
}

fn local_pool() -> Arc<WorkerPool> {
    let config = PoolConfig::default().with_size(2);
    Arc::new(WorkerPool::new(config, Arc::new(builtin_registry())).unwrap())
}

async fn get(running: &RunningServer, path: &str) -> (u16, Value) {
    let url = format!("http://{}{}", running.http_addr, path);
    let response = reqwest::get(&url).await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

async fn wait_for_actors(running: &RunningServer, count: usize) {
    for _ in 0..200 {
        if running.server.actors().len() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("actor pool never reached {}", count);
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_empty_actor_pool_returns_503() {
    let running = start(config(), None).await.unwrap();

    let (status, body) = get(&running, "/worker/hello-world/a").await;
    assert_eq!(status, 503);
    assert_eq!(body["id"], Value::Null);
    assert_eq!(body["error"]["message"], json!("Service Unavailable: EMPTY ACTOR POOL"));
    assert_eq!(
        body["error"]["data"]["description"],
        json!("No actors available to handle requests.")
    );
    assert!(running.server.pending().is_empty());
    running.shutdown();
}

#[tokio::test]
async fn test_unknown_destination_returns_400() {
    let running = start(config(), Some(local_pool())).await.unwrap();

    let (status, body) = get(&running, "/nowhere/a/b").await;
    assert_eq!(status, 400);
    assert_eq!(
        body["error"]["message"],
        json!("Bad Request: UNIMPLEMENTED DESTINATION: nowhere")
    );
    running.shutdown();
}

#[tokio::test]
async fn test_local_actor_hello_world() {
    let running = start(config(), Some(local_pool())).await.unwrap();

    let (status, body) = get(&running, "/worker/hello-world/a/b?ignored=true").await;
    assert_eq!(status, 200);
    assert_eq!(body["jsonrpc"], json!("2.0"));
    assert_eq!(body["result"]["echo"], json!(["a", "b"]));
    assert!(body["performance"].as_f64().unwrap() >= 0.0);
    assert_eq!(body["actorTracking"], json!(1));
    running.shutdown();
}

#[tokio::test]
async fn test_post_is_routed_like_get() {
    let running = start(config(), Some(local_pool())).await.unwrap();

    let url = format!("http://{}/worker/hello-world/x", running.http_addr);
    let response = reqwest::Client::new()
        .post(&url)
        .body("ignored body")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["echo"], json!(["x"]));
    running.shutdown();
}

#[tokio::test]
async fn test_unknown_command_is_method_not_found() {
    let running = start(config(), Some(local_pool())).await.unwrap();

    let (status, body) = get(&running, "/worker/missing").await;
    assert_eq!(status, 200);
    assert_eq!(body["error"]["code"], json!(-32601));
    running.shutdown();
}

#[tokio::test]
async fn test_server_infos() {
    let running = start(config(), Some(local_pool())).await.unwrap();

    let (status, body) = get(&running, "/server/infos").await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["config"]["threads"], json!(2));
    assert_eq!(body["result"]["actors"], json!(1));

    let (status, body) = get(&running, "/server/restart").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["message"], json!("Bad Request: restart"));
    running.shutdown();
}

#[tokio::test]
async fn test_health() {
    let running = start(config(), None).await.unwrap();

    let url = format!("http://{}/__health", running.http_addr);
    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");
    running.shutdown();
}

#[tokio::test]
async fn test_remote_actor_over_socket() {
    let running = start(config(), None).await.unwrap();

    let stream = connect(&running.actor_addr.to_string()).await.unwrap();
    let (mut reader, mut writer) = framed(stream);
    wait_for_actors(&running, 1).await;

    tokio::spawn(async move {
        while let Ok(Some(batch)) = reader.next_batch::<DispatchRecord>().await {
            for record in batch.into_iter().flatten() {
                let reply = ActorReply::new(
                    record.message_seq,
                    Ok(json!(record.args)),
                    "test actor",
                    0.25,
                );
                if writer.send(&reply).await.is_err() {
                    return;
                }
            }
        }
    });

    let (status, body) = get(&running, "/worker/anything/1/2/3").await;
    assert_eq!(status, 200);
    assert_eq!(body["result"], json!(["1", "2", "3"]));
    assert_eq!(body["pid"], json!("test actor"));
    assert!(running.server.pending().is_empty());
    running.shutdown();
}

#[tokio::test]
async fn test_silent_remote_actor_returns_504() {
    let running = start(
        ServerConfig {
            reply_timeout: Some(Duration::from_millis(100)),
            ..config()
        },
        None,
    )
    .await
    .unwrap();

    let _silent = connect(&running.actor_addr.to_string()).await.unwrap();
    wait_for_actors(&running, 1).await;

    let (status, body) = get(&running, "/worker/hello-world").await;
    assert_eq!(status, 504);
    assert_eq!(
        body["error"]["message"],
        json!("Gateway Timeout: ACTOR REPLY TIMEOUT")
    );
    assert!(running.server.pending().is_empty());
    running.shutdown();
}

#[tokio::test]
async fn test_concurrent_requests_all_complete() {
    let running = start(config(), Some(local_pool())).await.unwrap();

    let requests = (0..50).map(|i| {
        let url = format!("http://{}/worker/hello-world/{}", running.http_addr, i);
        async move {
            let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
            (i, body)
        }
    });
    for (i, body) in futures_util::future::join_all(requests).await {
        assert_eq!(body["result"]["echo"], json!([i.to_string()]));
    }
    assert!(running.server.pending().is_empty());
    running.shutdown();
}
