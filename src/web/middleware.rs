//! Rate limiting (§4.1, §5) and CORS (§4.1, §9).
//!
//! The status and metadata endpoints are exempt by construction: no layer
//! from this module is ever attached to their routes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tokio::sync::Mutex;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::CorsConfig;
use crate::errors::{AppError, PipelineError};

use super::extractors::RequestContext;
use super::AppState;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A per-key token bucket. Capacity is `burst`; refill rate is
/// `per_minute / 60` tokens/second, so a sustained caller settles at the
/// configured per-minute rate while still allowing short bursts.
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<String, Bucket>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self { buckets: Arc::new(Mutex::new(HashMap::new())) }
    }

    async fn allow(&self, key: &str, per_minute: u32, burst: u32) -> bool {
        let capacity = burst.max(1) as f64;
        let refill_rate = per_minute as f64 / 60.0;
        let now = Instant::now();

        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(key.to_string()).or_insert_with(|| Bucket { tokens: capacity, last_refill: now });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * refill_rate).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

async fn enforce(state: &AppState, ctx: &RequestContext, per_minute: u32, req: Request, next: Next) -> Response {
    let key = ctx.real_ip.clone().unwrap_or_else(|| "unknown".to_string());
    if state.rate_limiter.allow(&key, per_minute, state.config.rate_limit.burst).await {
        next.run(req).await
    } else {
        let retry_after_s = (60 / per_minute.max(1)).max(1) as u64;
        axum::response::IntoResponse::into_response(AppError::Pipeline(PipelineError::RateLimited { retry_after_s }))
    }
}

/// Applied to `/remote`, `/upload`, `/download-only` submit routes and the
/// edit-operation routes (§4.1 "a stricter limit").
pub async fn rate_limit_submit(State(state): State<AppState>, ctx: RequestContext, req: Request, next: Next) -> Response {
    enforce(&state, &ctx, state.config.rate_limit.submit_per_minute, req, next).await
}

/// Applied only to `/download-only`, which runs a shorter pipeline and is
/// given a higher ceiling than the other submit routes.
pub async fn rate_limit_download_only(State(state): State<AppState>, ctx: RequestContext, req: Request, next: Next) -> Response {
    enforce(&state, &ctx, state.config.rate_limit.download_only_per_minute, req, next).await
}

/// Applied to the download-delegation routes; status and metadata routes
/// remain unlayered entirely.
pub async fn rate_limit_default(State(state): State<AppState>, ctx: RequestContext, req: Request, next: Next) -> Response {
    enforce(&state, &ctx, state.config.rate_limit.default_per_minute, req, next).await
}

/// Builds the CORS layer from configuration (§9: wildcard origin MUST NOT
/// be combined with credentials; `Config::load` and `CorsConfig::is_valid`
/// are responsible for rejecting that combination before this runs).
pub fn build_cors_layer(cfg: &CorsConfig) -> CorsLayer {
    let mut layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if cfg.allowed_origins.iter().any(|o| o == "*") {
        layer = layer.allow_origin(AllowOrigin::any());
    } else if !cfg.allowed_origins.is_empty() {
        let origins: Vec<HeaderValue> = cfg.allowed_origins.iter().filter_map(|o| o.parse().ok()).collect();
        layer = layer.allow_origin(origins);
    }

    if cfg.allow_credentials {
        layer = layer.allow_credentials(true);
    }

    layer
}
