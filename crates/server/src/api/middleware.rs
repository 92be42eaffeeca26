//! Privilege resolution and metrics middleware.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use audiograb_core::{AuthRequest, Authenticator, Privilege};

use crate::metrics::{
    normalize_path, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION,
};
use crate::state::AppState;

/// Metrics middleware that tracks HTTP request duration and counts.
///
/// This middleware records:
/// - Request duration (histogram)
/// - Request count (counter)
/// - Requests in flight (gauge)
///
/// For progress streams the duration covers only the time to open the
/// stream, not its lifetime.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();

    let response = next.run(request).await;

    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

/// Build an [`AuthRequest`] from request headers.
pub fn auth_request(headers: &HeaderMap) -> AuthRequest {
    let headers: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();
    AuthRequest { headers }
}

/// Resolves the caller's privilege from the session cookie.
///
/// Never rejects: callers without a valid login are simply anonymous.
pub async fn privilege_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth_request = auth_request(request.headers());
    let privilege = state.authenticator().privilege(&auth_request).await;
    request.extensions_mut().insert(privilege);
    next.run(request).await
}

/// Extractor for the caller's privilege.
///
/// Falls back to anonymous if the privilege middleware did not run.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Privilege);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let privilege = parts
            .extensions
            .get::<Privilege>()
            .copied()
            .unwrap_or_default();
        std::future::ready(Ok(Caller(privilege)))
    }
}
