use crate::error::ApiError;
use crate::rate_limit::RateLimiter;
use axum::{
    extract::{Query, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// `[security]` settings of the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_rps")]
    pub max_requests_per_second: f64,
    #[serde(default = "default_burst")]
    pub max_burst: f64,
    /// API keys allowed to call the API. Empty = no auth required.
    #[serde(default)]
    pub api_keys: Vec<String>,
}

fn default_rps() -> f64 {
    10.0
}

fn default_burst() -> f64 {
    50.0
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_requests_per_second: default_rps(),
            max_burst: default_burst(),
            api_keys: Vec::new(),
        }
    }
}

impl SecurityConfig {
    pub fn auth_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }
}

/// Shared middleware state.
pub struct MiddlewareState {
    pub rate_limiter: RateLimiter,
    pub api_keys: Vec<String>,
}

impl MiddlewareState {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            rate_limiter: RateLimiter::new(config.max_burst, config.max_requests_per_second),
            api_keys: config.api_keys.clone(),
        }
    }
}

#[derive(Deserialize, Default)]
pub struct AuthQuery {
    pub api_key: Option<String>,
}

/// `Authorization: Bearer <key>` first, then `?api_key=<key>`.
fn presented_key(headers: &HeaderMap, query: &AuthQuery) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .or_else(|| query.api_key.clone())
}

/// Auth middleware: validates the API key. With no keys configured every
/// request is allowed.
pub async fn auth_middleware(
    State(state): State<Arc<MiddlewareState>>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
    request: Request,
    next: Next,
) -> Response {
    if state.api_keys.is_empty() {
        return next.run(request).await;
    }

    match presented_key(&headers, &query) {
        Some(k) if state.api_keys.contains(&k) => next.run(request).await,
        Some(_) => {
            warn!(path = %request.uri().path(), "Rejected request: invalid API key");
            ApiError::Unauthorized("Invalid API key".into()).into_response()
        }
        None => {
            warn!(path = %request.uri().path(), "Rejected request: missing API key");
            ApiError::Unauthorized("API key required".into()).into_response()
        }
    }
}

/// Rate limiting middleware, one bucket per presented API key.
pub async fn rate_limit_middleware(
    State(state): State<Arc<MiddlewareState>>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
    request: Request,
    next: Next,
) -> Response {
    let client = presented_key(&headers, &query).unwrap_or_else(|| "anonymous".to_string());

    if let Err(wait) = state.rate_limiter.admit(&client) {
        warn!(path = %request.uri().path(), retry_after_ms = wait.as_millis() as u64, "Rate limited request");
        return ApiError::RateLimited {
            retry_after_secs: wait.as_secs().saturating_add(1),
        }
        .into_response();
    }

    next.run(request).await
}
