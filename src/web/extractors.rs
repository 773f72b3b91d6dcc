//! Request-scoped extractors shared across handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

/// Client identity derived from proxy headers, used as the rate-limiter key
/// and logged alongside each request. `x-real-ip` is trusted first since
/// that's what the front proxy (§9) is expected to set; `x-forwarded-for`
/// is a fallback for deployments without one, taking only the first hop.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub real_ip: Option<String>,
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let real_ip = parts
            .headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| {
                parts
                    .headers
                    .get("x-forwarded-for")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.split(',').next())
                    .map(|v| v.trim().to_string())
            });

        Ok(Self { real_ip })
    }
}
