//! Per-request correlation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifiers and timing for one inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Unique to this request.
    pub request_id: Uuid,
    /// Shared by related requests. Defaults to `request_id`.
    pub correlation_id: Uuid,
    /// HTTP method or other verb.
    pub method: String,
    /// Route or operation name.
    pub path: String,
    /// When handling began.
    pub started_at: DateTime<Utc>,
}

impl RequestContext {
    /// Start a context now.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            request_id: id,
            correlation_id: id,
            method: method.into(),
            path: path.into(),
            started_at: Utc::now(),
        }
    }

    /// Adopt a caller-supplied correlation id when it parses as a UUID.
    #[must_use]
    pub fn with_correlation_header(mut self, header: Option<&str>) -> Self {
        if let Some(id) = header.and_then(|h| Uuid::parse_str(h.trim()).ok()) {
            self.correlation_id = id;
        }
        self
    }

    /// Milliseconds since the request started. Never negative.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .max(0)
    }

    /// Span that log lines for this request are recorded under.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            correlation_id = %self.correlation_id,
            method = %self.method,
            path = %self.path,
        )
    }

    /// Log completion with the response status.
    pub fn finish(&self, status: u16) {
        let elapsed_ms = self.elapsed_ms();
        if status >= 500 {
            tracing::warn!(status, elapsed_ms, "Request failed");
        } else {
            tracing::debug!(status, elapsed_ms, "Request completed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_correlates_to_itself() {
        let ctx = RequestContext::new("GET", "/health");
        assert_eq!(ctx.request_id, ctx.correlation_id);
        assert!(ctx.elapsed_ms() >= 0);
    }

    #[test]
    fn test_correlation_header() {
        let upstream = Uuid::new_v4();
        let ctx = RequestContext::new("POST", "/quota/consume")
            .with_correlation_header(Some(&upstream.to_string()));
        assert_eq!(ctx.correlation_id, upstream);
        assert_ne!(ctx.request_id, upstream);

        let ignored = RequestContext::new("POST", "/x").with_correlation_header(Some("nope"));
        assert_eq!(ignored.correlation_id, ignored.request_id);
    }

    #[test]
    fn test_span_is_named_request() {
        let ctx = RequestContext::new("GET", "/quota/summary");
        let span = ctx.span();
        if let Some(meta) = span.metadata() {
            assert_eq!(meta.name(), "request");
        }
    }
}
