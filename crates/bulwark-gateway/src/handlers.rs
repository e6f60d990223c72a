//! Route handlers.
//!
//! Request bodies are decoded into all-optional structs so that a missing
//! required field is answered with `400` and a message naming it.

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bulwark_admission::{
    ConsumeRequest, QuotaDecision, QuotaStatus, QuotaSummary, RateDecision, RatePlan,
};
use bulwark_storage::{ListOptions, ListResult, PutOptions};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::AppState;

/// Header naming the rate-limit bucket when the body does not.
pub const BUCKET_HEADER: &str = "x-bucket";

/// Bucket used when neither body nor header names one.
pub const DEFAULT_BUCKET: &str = "global";

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(state): State<AppState>) -> Json<Value> {
    let failover = state.failover.state();
    Json(json!({
        "status": "ok",
        "failover": {
            "tripped": failover.is_tripped(),
            "reason": failover.reason(),
            "trippedAt": failover.tripped_at(),
        },
    }))
}

// ---------------------------------------------------------------------------
// Rate limiter
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanBody {
    limit_per_minute: Option<u32>,
    burst: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RateConsumeBody {
    plan: Option<PlanBody>,
    cost: Option<u32>,
    now_ms: Option<i64>,
    bucket: Option<String>,
}

pub(crate) async fn rate_limit_consume(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<RateConsumeBody>, JsonRejection>,
) -> Result<Json<RateDecision>, ApiError> {
    let Json(body) = body?;
    let plan = body
        .plan
        .ok_or_else(|| ApiError::bad_request("plan is required"))?;
    let plan = RatePlan::new(
        plan.limit_per_minute
            .unwrap_or(state.rate_defaults.limit_per_minute),
        plan.burst.unwrap_or(state.rate_defaults.burst),
    );
    let bucket = body
        .bucket
        .filter(|b| !b.is_empty())
        .or_else(|| {
            headers
                .get(BUCKET_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|b| !b.is_empty())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| DEFAULT_BUCKET.to_owned());

    let decision = state
        .rate_limiter
        .consume(&bucket, plan, body.cost.unwrap_or(1), body.now_ms)
        .await?;
    Ok(Json(decision))
}

// ---------------------------------------------------------------------------
// Quota
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuotaConsumeBody {
    principal_id: Option<String>,
    plan: Option<String>,
    cost: Option<u64>,
    session_hash: Option<String>,
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{name} is required")))
}

pub(crate) async fn quota_consume(
    State(state): State<AppState>,
    body: Result<Json<QuotaConsumeBody>, JsonRejection>,
) -> Result<Json<QuotaDecision>, ApiError> {
    let Json(body) = body?;
    let mut request = ConsumeRequest::new(
        required(body.principal_id, "principalId")?,
        required(body.plan, "plan")?,
    );
    if let Some(cost) = body.cost {
        request = request.with_cost(cost);
    }
    if let Some(hash) = body.session_hash {
        request = request.with_session(hash);
    }
    Ok(Json(state.quota.consume(&request).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusParams {
    principal_id: Option<String>,
    plan: Option<String>,
}

pub(crate) async fn quota_status(
    State(state): State<AppState>,
    params: Result<Query<StatusParams>, QueryRejection>,
) -> Result<Json<QuotaStatus>, ApiError> {
    let Query(params) = params?;
    let principal = required(params.principal_id, "principalId")?;
    let plan = required(params.plan, "plan")?;
    Ok(Json(state.quota.status(&principal, &plan).await?))
}

pub(crate) async fn quota_summary(
    State(state): State<AppState>,
) -> Result<Json<QuotaSummary>, ApiError> {
    Ok(Json(state.quota.summary().await?))
}

// ---------------------------------------------------------------------------
// Key-value
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub(crate) struct KvPutParams {
    ttl: Option<u64>,
    expiration: Option<i64>,
}

pub(crate) async fn kv_get(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    match state.kv.get(&key).await? {
        Some(value) => Ok(value.into_response()),
        None => Err(ApiError::not_found(format!("key not found: {key}"))),
    }
}

pub(crate) async fn kv_put(
    State(state): State<AppState>,
    Path(key): Path<String>,
    params: Result<Query<KvPutParams>, QueryRejection>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let Query(params) = params?;
    let value = std::str::from_utf8(&body)
        .map_err(|_| ApiError::bad_request("value must be UTF-8"))?;
    let options = PutOptions {
        expiration_ttl: params.ttl,
        expiration: params.expiration,
        metadata: None,
    };
    state.kv.put(&key, value, options).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn kv_delete(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.kv.delete(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn kv_list(
    State(state): State<AppState>,
    params: Result<Query<ListOptions>, QueryRejection>,
) -> Result<Json<ListResult>, ApiError> {
    let Query(options) = params?;
    Ok(Json(state.kv.list(options).await?))
}
