//! End-to-end tests: configuration file to HTTP responses.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bulwark_config::LoadOptions;
use bulwark_core::SystemClock;
use bulwark_gateway::{AppState, REQUEST_ID_HEADER, build_router, serve};
use bulwark_storage::MemoryDocumentStore;
use bulwark_test::{setup_test_logging_default, test_file};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const CONFIG: &str = r#"
[storage]
kv_namespace = "e2e"

[quota.plans.basic]
daily_limit = 3
global_threshold = 100
"#;

struct Gateway {
    addr: SocketAddr,
    client: reqwest::Client,
    _shutdown: oneshot::Sender<()>,
}

impl Gateway {
    async fn start() -> Self {
        setup_test_logging_default();
        let file = test_file(CONFIG);
        let env = HashMap::from([("BULWARK_RATE_LIMIT_BURST".to_string(), "2".to_string())]);
        let resolved = bulwark_config::loader::load(&LoadOptions::isolated(Some(file.path()), env))
            .unwrap();
        let config = resolved.config;
        assert_eq!(config.rate_limits.default_burst, 2);

        let state = AppState::build(
            &config,
            Arc::new(MemoryDocumentStore::new()),
            SystemClock::shared(),
        )
        .unwrap();
        let router = build_router(state, config.gateway.request_body_limit);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(serve(listener, router, async {
            let _ = rx.await;
        }));
        Self {
            addr,
            client: reqwest::Client::new(),
            _shutdown: tx,
        }
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("http://{}{path}", self.addr))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self
            .client
            .get(format!("http://{}{path}", self.addr))
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

#[tokio::test]
async fn test_configured_quota_plan() {
    let gw = Gateway::start().await;
    let body = json!({ "principalId": "acct-7", "plan": "basic" });
    for remaining in [2, 1, 0] {
        let (status, decision) = gw.post("/quota/consume", body.clone()).await;
        assert_eq!(status, 200);
        assert_eq!(decision["allowed"], true);
        assert_eq!(decision["remainingPrincipal"], remaining);
    }
    let (status, denied) = gw.post("/quota/consume", body).await;
    assert_eq!(status, 200);
    assert_eq!(denied["allowed"], false);
    assert_eq!(denied["reason"], "daily_limit_exceeded");

    let (_, status) = gw.get("/quota/status?principalId=acct-7&plan=basic").await;
    assert_eq!(status["used"], 3);
    assert_eq!(status["globalCeiling"], 50_000);
}

#[tokio::test]
async fn test_rate_defaults_from_environment() {
    let gw = Gateway::start().await;
    let body = json!({ "plan": { "limitPerMinute": 30 }, "nowMs": 5_000, "bucket": "feed" });
    let (_, first) = gw.post("/rate-limit/consume", body.clone()).await;
    let (_, second) = gw.post("/rate-limit/consume", body.clone()).await;
    let (_, third) = gw.post("/rate-limit/consume", body).await;
    assert_eq!(first["allowed"], true);
    assert_eq!(second["allowed"], true);
    assert_eq!(third["allowed"], false);
    assert_eq!(third["limit"], 30);
    assert_eq!(third["resetMs"], 2_000);
}

#[tokio::test]
async fn test_health_and_request_ids() {
    let gw = Gateway::start().await;
    let resp = gw
        .client
        .get(format!("http://{}/health", gw.addr))
        .header("x-correlation-id", "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let id = resp.headers().get(REQUEST_ID_HEADER).unwrap().to_str().unwrap().to_string();
    assert_eq!(id.len(), 36);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["failover"]["tripped"], false);
    assert!(body["failover"]["reason"].is_null());
}

#[tokio::test]
async fn test_unknown_route_and_bad_input() {
    let gw = Gateway::start().await;
    let missing = gw
        .client
        .get(format!("http://{}/nope", gw.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    let (status, body) = gw
        .post("/quota/consume", json!({ "principalId": "a", "plan": "platinum" }))
        .await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("platinum"));
}
