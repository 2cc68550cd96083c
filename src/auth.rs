use std::collections::HashSet;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::warn;

/// Operator bearer keys guarding the control endpoints.
///
/// An empty key set disables the guard with a loud warning instead of
/// refusing to boot: the console is routinely deployed behind an
/// already-authenticated reverse proxy, and a hard failure there has
/// caused outages before this guard existed.
pub struct OperatorAuth {
    keys: HashSet<String>,
}

impl OperatorAuth {
    pub fn new(keys: HashSet<String>) -> Self {
        OperatorAuth { keys }
    }

    /// Build from the comma-separated `CONSOLE_API_KEYS` variable.
    pub fn from_env() -> Self {
        let keys: HashSet<String> = std::env::var("CONSOLE_API_KEYS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if keys.is_empty() {
            warn!(
                "CONSOLE_API_KEYS is not set; control endpoints are UNPROTECTED. \
                 Set CONSOLE_API_KEYS to a comma-separated list of keys to enable auth."
            );
        } else {
            tracing::info!("operator auth enabled with {} key(s)", keys.len());
        }
        OperatorAuth { keys }
    }

    pub fn disabled(&self) -> bool {
        self.keys.is_empty()
    }

    fn accepts(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn bearer_key<'a>(&self, request: &'a Request) -> Option<&'a str> {
        request
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|auth| auth.strip_prefix("Bearer "))
    }
}

/// Middleware for the control endpoints: requires a configured bearer
/// key, or passes everything when the guard is disabled.
pub async fn operator_auth_middleware(
    auth: std::sync::Arc<OperatorAuth>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth.disabled() {
        return Ok(next.run(request).await);
    }

    match auth.bearer_key(&request) {
        Some(key) if auth.accepts(key) => Ok(next.run(request).await),
        Some(_) => {
            warn!("rejected request with unknown operator key");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            warn!("rejected request without bearer key");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
