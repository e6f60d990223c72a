//! Primary store access.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FailoverError, FailoverResult, PrimaryError};
use crate::operation::{PrimaryResponse, WriteOperation};

/// A store writes are sent to first.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Execute one write.
    async fn execute(&self, operation: &WriteOperation) -> Result<PrimaryResponse, PrimaryError>;
}

// ---------------------------------------------------------------------------
// Limit classification
// ---------------------------------------------------------------------------

/// Decides whether a primary failure is a limit failure.
///
/// HTTP 429 always is. Any other failure is when its message contains one of
/// the markers, ignoring ASCII case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitClassifier {
    markers: Vec<String>,
}

impl Default for LimitClassifier {
    fn default() -> Self {
        Self::new(["rate limit", "too many requests", "limit exceeded", "quota"])
    }
}

impl LimitClassifier {
    /// Classifier with the given markers.
    #[must_use]
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.into().to_ascii_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Whether `message` mentions a limit.
    #[must_use]
    pub fn mentions_limit(&self, message: &str) -> bool {
        let lowered = message.to_ascii_lowercase();
        self.markers.iter().any(|m| lowered.contains(m.as_str()))
    }

    /// Build the error for a failed response.
    #[must_use]
    pub fn classify(&self, status: u16, message: String) -> PrimaryError {
        if status == StatusCode::TOO_MANY_REQUESTS.as_u16() || self.mentions_limit(&message) {
            PrimaryError::Limited { status, message }
        } else {
            PrimaryError::Api { status, message }
        }
    }
}

// ---------------------------------------------------------------------------
// REST client
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct QueryRequest<'a> {
    sql: &'a str,
    params: &'a [Value],
}

#[derive(Debug, Default, Deserialize)]
struct QueryEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<EnvelopeMessage>,
    #[serde(default)]
    result: Vec<EnvelopeResult>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeMessage {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct EnvelopeResult {
    #[serde(default)]
    meta: EnvelopeMeta,
}

#[derive(Debug, Default, Deserialize)]
struct EnvelopeMeta {
    #[serde(default)]
    changes: u64,
    #[serde(default)]
    last_row_id: Option<Value>,
}

impl QueryEnvelope {
    fn error_message(&self) -> String {
        let joined = self
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .filter(|m| !m.is_empty())
            .collect::<Vec<_>>()
            .join("; ");
        if joined.is_empty() {
            "request failed".to_string()
        } else {
            joined
        }
    }

    fn into_response(self) -> PrimaryResponse {
        let meta = self.result.into_iter().next().map(|r| r.meta).unwrap_or_default();
        PrimaryResponse {
            changes: meta.changes,
            last_row_id: meta.last_row_id.and_then(|id| match id {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
        }
    }
}

/// Settings for [`RestPrimaryClient`].
#[derive(Clone)]
pub struct RestPrimaryConfig {
    /// Query endpoint (`POST`).
    pub endpoint: String,
    /// Bearer token.
    pub api_token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Limit classification.
    pub classifier: LimitClassifier,
}

impl std::fmt::Debug for RestPrimaryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestPrimaryConfig")
            .field("endpoint", &self.endpoint)
            .field("has_api_token", &self.api_token.is_some())
            .field("timeout", &self.timeout)
            .field("classifier", &self.classifier)
            .finish()
    }
}

impl RestPrimaryConfig {
    /// Defaults: no token, 10 second timeout, standard markers.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_token: None,
            timeout: Duration::from_secs(10),
            classifier: LimitClassifier::default(),
        }
    }

    /// Set the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the limit classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: LimitClassifier) -> Self {
        self.classifier = classifier;
        self
    }
}

/// Primary reached over a JSON query endpoint.
///
/// Sends `{ "sql", "params" }` and expects
/// `{ success, errors: [{ message }], result: [{ meta: { changes, last_row_id } }] }`.
pub struct RestPrimaryClient {
    client: reqwest::Client,
    endpoint: url::Url,
    api_token: Option<String>,
    classifier: LimitClassifier,
}

impl std::fmt::Debug for RestPrimaryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestPrimaryClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("has_api_token", &self.api_token.is_some())
            .finish_non_exhaustive()
    }
}

impl RestPrimaryClient {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns [`FailoverError::Config`] for a malformed or non-HTTP
    /// endpoint, or if the HTTP client cannot be built.
    pub fn new(config: RestPrimaryConfig) -> FailoverResult<Self> {
        let endpoint = url::Url::parse(&config.endpoint)
            .map_err(|e| FailoverError::Config(format!("{}: {e}", config.endpoint)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(FailoverError::Config(format!(
                "{}: endpoint must be http or https",
                config.endpoint
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FailoverError::Config(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            api_token: config.api_token,
            classifier: config.classifier,
        })
    }
}

#[async_trait]
impl PrimaryStore for RestPrimaryClient {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "rest"
    }

    async fn execute(&self, operation: &WriteOperation) -> Result<PrimaryResponse, PrimaryError> {
        let mut request = self.client.post(self.endpoint.clone()).json(&QueryRequest {
            sql: &operation.sql,
            params: &operation.params,
        });
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PrimaryError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PrimaryError::Transport(e.to_string()))?;
        let envelope = serde_json::from_str::<QueryEnvelope>(&body);

        if !status.is_success() {
            let message = match &envelope {
                Ok(env) => env.error_message(),
                Err(_) if body.trim().is_empty() => status.to_string(),
                Err(_) => body.trim().to_string(),
            };
            tracing::debug!(status = status.as_u16(), %message, "Primary rejected write");
            return Err(self.classifier.classify(status.as_u16(), message));
        }

        let envelope = envelope.map_err(|e| PrimaryError::InvalidResponse(e.to_string()))?;
        if !envelope.success {
            let message = envelope.error_message();
            tracing::debug!(%message, "Primary reported failure");
            return Err(self.classifier.classify(status.as_u16(), message));
        }
        Ok(envelope.into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::post;
    use serde_json::json;

    async fn serve(app: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/query")
    }

    fn client(endpoint: String) -> RestPrimaryClient {
        RestPrimaryClient::new(RestPrimaryConfig::new(endpoint).with_token("t0k")).unwrap()
    }

    #[test]
    fn test_classifier() {
        let c = LimitClassifier::default();
        assert!(c.classify(429, "slow down".into()).is_limit());
        assert!(c.classify(400, "Daily QUOTA exhausted".into()).is_limit());
        assert!(!c.classify(400, "syntax error".into()).is_limit());
        assert!(!LimitClassifier::new(Vec::<String>::new()).mentions_limit("quota"));
    }

    #[test]
    fn test_rejects_non_http_endpoint() {
        assert!(RestPrimaryClient::new(RestPrimaryConfig::new("ftp://x")).is_err());
        assert!(RestPrimaryClient::new(RestPrimaryConfig::new("nope")).is_err());
    }

    #[tokio::test]
    async fn test_success_envelope() {
        let app = axum::Router::new().route(
            "/query",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some("Bearer t0k");
                assert!(authorized);
                assert_eq!(body["params"], json!(["u1"]));
                Json(json!({
                    "success": true,
                    "errors": [],
                    "result": [{ "meta": { "changes": 1, "last_row_id": 42 } }]
                }))
            }),
        );
        let primary = client(serve(app).await);
        let response = primary
            .execute(&WriteOperation::new("INSERT INTO users (id) VALUES (?)", ["u1"]))
            .await
            .unwrap();
        assert_eq!(response.changes, 1);
        assert_eq!(response.last_row_id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_429_is_limit() {
        let app = axum::Router::new().route(
            "/query",
            post(|| async { (AxumStatus::TOO_MANY_REQUESTS, "busy") }),
        );
        let err = client(serve(app).await)
            .execute(&WriteOperation::new("DELETE FROM t", Vec::<Value>::new()))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PrimaryError::Limited {
                status: 429,
                message: "busy".into()
            }
        );
    }

    #[tokio::test]
    async fn test_limit_text_in_error_body() {
        let app = axum::Router::new().route(
            "/query",
            post(|| async {
                (
                    AxumStatus::BAD_REQUEST,
                    Json(json!({ "success": false, "errors": [{ "message": "Rate limit reached" }] })),
                )
            }),
        );
        let err = client(serve(app).await)
            .execute(&WriteOperation::new("DELETE FROM t", Vec::<Value>::new()))
            .await
            .unwrap_err();
        assert!(err.is_limit());
    }

    #[tokio::test]
    async fn test_other_failures_are_not_limits() {
        let app = axum::Router::new().route(
            "/query",
            post(|| async {
                Json(json!({ "success": false, "errors": [{ "message": "no such table: t" }] }))
            }),
        );
        let err = client(serve(app).await)
            .execute(&WriteOperation::new("DELETE FROM t", Vec::<Value>::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, PrimaryError::Api { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_is_transport() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = client(format!("http://{addr}/query"))
            .execute(&WriteOperation::new("DELETE FROM t", Vec::<Value>::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, PrimaryError::Transport(_)));
    }
}
