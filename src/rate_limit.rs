use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde_json::json;
use tracing::warn;

/// Inbound request throttle. A single console request fans out into many
/// upstream calls, so this one global quota is what actually keeps the
/// account inside the platform's call allowance.
pub struct InboundThrottle {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    requests_per_minute: u32,
}

impl InboundThrottle {
    pub fn new(requests_per_minute: u32) -> Self {
        let per_minute = requests_per_minute.max(1);
        let quota =
            Quota::per_minute(NonZeroU32::new(per_minute).expect("clamped to at least 1"));
        InboundThrottle {
            limiter: RateLimiter::direct(quota),
            requests_per_minute: per_minute,
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }
}

/// Middleware applying the global throttle to every route.
pub async fn throttle_middleware(
    throttle: Arc<InboundThrottle>,
    request: Request,
    next: Next,
) -> Response {
    if throttle.try_acquire() {
        next.run(request).await
    } else {
        warn!(
            requests_per_minute = throttle.requests_per_minute(),
            "inbound request throttled"
        );
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "rate limit exceeded, retry later" })),
        )
            .into_response()
    }
}
