//! Route table, request tracing and the serve loop.

use std::future::Future;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use bulwark_telemetry::RequestContext;
use tokio::net::TcpListener;
use tracing::Instrument;

use crate::error::GatewayResult;
use crate::handlers;
use crate::state::AppState;

/// Response header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request header whose UUID value becomes the correlation id.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Build the route table over `state`.
#[must_use]
pub fn build_router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/rate-limit/consume", post(handlers::rate_limit_consume))
        .route("/quota/consume", post(handlers::quota_consume))
        .route("/quota/status", get(handlers::quota_status))
        .route("/quota/summary", get(handlers::quota_summary))
        .route("/kv", get(handlers::kv_list))
        .route(
            "/kv/{key}",
            get(handlers::kv_get)
                .put(handlers::kv_put)
                .delete(handlers::kv_delete),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(trace_request))
        .with_state(state)
}

async fn trace_request(request: Request, next: Next) -> Response {
    let ctx = RequestContext::new(request.method().as_str(), request.uri().path())
        .with_correlation_header(
            request
                .headers()
                .get(CORRELATION_HEADER)
                .and_then(|v| v.to_str().ok()),
        );
    let span = ctx.span();

    let mut response = next.run(request).instrument(span.clone()).await;
    span.in_scope(|| ctx.finish(response.status().as_u16()));

    if let Ok(value) = HeaderValue::from_str(&ctx.request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Serve `router` on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the accept loop fails.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> GatewayResult<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "Gateway listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("Gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use bulwark_config::Config;
    use serde_json::{Value, json};
    use tokio::sync::oneshot;

    use super::*;

    struct TestServer {
        addr: SocketAddr,
        client: reqwest::Client,
        _shutdown: oneshot::Sender<()>,
    }

    impl TestServer {
        async fn start() -> Self {
            let config = Config::default();
            let state = AppState::in_memory(&config).unwrap();
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

        fn url(&self, path: &str) -> String {
            format!("http://{}{path}", self.addr)
        }
    }

    #[tokio::test]
    async fn test_health_reports_failover() {
        let server = TestServer::start().await;
        let resp = server.client.get(server.url("/health")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        assert!(resp.headers().contains_key(REQUEST_ID_HEADER));
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["failover"]["tripped"], false);
    }

    #[tokio::test]
    async fn test_rate_limit_consume_until_denied() {
        let server = TestServer::start().await;
        let body = json!({
            "plan": { "limitPerMinute": 60, "burst": 2 },
            "nowMs": 1_000,
            "bucket": "client-a",
        });
        for expected in [1, 0] {
            let decision: Value = server
                .client
                .post(server.url("/rate-limit/consume"))
                .json(&body)
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            assert_eq!(decision["allowed"], true);
            assert_eq!(decision["remaining"], expected);
        }
        let denied: Value = server
            .client
            .post(server.url("/rate-limit/consume"))
            .json(&body)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(denied["allowed"], false);
        assert_eq!(denied["limit"], 60);
        assert_eq!(denied["resetMs"], 1_000);
    }

    #[tokio::test]
    async fn test_rate_limit_bucket_header_and_plan_defaults() {
        let server = TestServer::start().await;
        let decision: Value = server
            .client
            .post(server.url("/rate-limit/consume"))
            .header("x-bucket", "from-header")
            .json(&json!({ "plan": {}, "nowMs": 0 }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(decision["allowed"], true);
        assert_eq!(decision["limit"], 60);
        assert_eq!(decision["remaining"], 9);
    }

    #[tokio::test]
    async fn test_rate_limit_missing_plan_is_bad_request() {
        let server = TestServer::start().await;
        let resp = server
            .client
            .post(server.url("/rate-limit/consume"))
            .json(&json!({ "cost": 1 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "plan is required");
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let server = TestServer::start().await;
        let resp = server
            .client
            .post(server.url("/quota/consume"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn test_quota_consume_status_summary() {
        let server = TestServer::start().await;
        let decision: Value = server
            .client
            .post(server.url("/quota/consume"))
            .json(&json!({ "principalId": "alice", "plan": "free", "sessionHash": "s1" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(decision["allowed"], true);
        assert_eq!(decision["remainingPrincipal"], 49);

        let status: Value = server
            .client
            .get(server.url("/quota/status?principalId=alice&plan=free"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["used"], 1);
        assert_eq!(status["dailyLimit"], 50);

        let summary: Value = server
            .client
            .get(server.url("/quota/summary"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(summary["globalUsed"], 1);
        assert_eq!(summary["uniqueSessions"], 1);
        assert_eq!(summary["topPrincipals"][0]["principalId"], "alice");
    }

    #[tokio::test]
    async fn test_quota_rejects_missing_and_unknown_plan() {
        let server = TestServer::start().await;
        let missing = server
            .client
            .post(server.url("/quota/consume"))
            .json(&json!({ "principalId": "alice" }))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 400);

        let unknown = server
            .client
            .post(server.url("/quota/consume"))
            .json(&json!({ "principalId": "alice", "plan": "gold" }))
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), 400);

        let status = server
            .client
            .get(server.url("/quota/status?plan=free"))
            .send()
            .await
            .unwrap();
        assert_eq!(status.status(), 400);
    }

    #[tokio::test]
    async fn test_kv_routes() {
        let server = TestServer::start().await;
        let put = server
            .client
            .put(server.url("/kv/greeting?ttl=60"))
            .body("hello")
            .send()
            .await
            .unwrap();
        assert_eq!(put.status(), 204);

        let got = server.client.get(server.url("/kv/greeting")).send().await.unwrap();
        assert_eq!(got.status(), 200);
        assert_eq!(got.text().await.unwrap(), "hello");

        let listed: Value = server
            .client
            .get(server.url("/kv?prefix=gr"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed["keys"][0]["name"], "greeting");
        assert_eq!(listed["listComplete"], true);

        let deleted = server
            .client
            .delete(server.url("/kv/greeting"))
            .send()
            .await
            .unwrap();
        assert_eq!(deleted.status(), 204);
        let missing = server.client.get(server.url("/kv/greeting")).send().await.unwrap();
        assert_eq!(missing.status(), 404);
    }

    #[tokio::test]
    async fn test_kv_zero_ttl_is_bad_request() {
        let server = TestServer::start().await;
        let resp = server
            .client
            .put(server.url("/kv/k?ttl=0"))
            .body("v")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }
}
