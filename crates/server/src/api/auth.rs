//! Admin login endpoints.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use audiograb_core::SESSION_COOKIE;

use super::middleware::auth_request;
use crate::metrics::AUTH_FAILURES_TOTAL;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct CheckLoginResponse {
    #[serde(rename = "loggedIn")]
    pub logged_in: bool,
}

fn session_cookie(token: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, token
    )
}

fn expired_session_cookie() -> String {
    format!(
        "{}=; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
        SESSION_COOKIE
    )
}

/// POST /login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Response {
    let username = request.username.unwrap_or_default();
    let password = request.password.unwrap_or_default();

    match state.sessions().login(&username, &password).await {
        Ok(token) => (
            [(header::SET_COOKIE, session_cookie(&token))],
            Json(SuccessResponse { success: true }),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(username = %username, "Login rejected: {}", e);
            AUTH_FAILURES_TOTAL
                .with_label_values(&["invalid_credentials"])
                .inc();
            (
                StatusCode::UNAUTHORIZED,
                Json(SuccessResponse { success: false }),
            )
                .into_response()
        }
    }
}

/// POST /logout
pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(token) = auth_request(&headers).session_token() {
        state.sessions().logout(token).await;
    }

    (
        [(header::SET_COOKIE, expired_session_cookie())],
        Json(SuccessResponse { success: true }),
    )
        .into_response()
}

/// GET /check-login
pub async fn check_login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<CheckLoginResponse> {
    let logged_in = match auth_request(&headers).session_token() {
        Some(token) => state.sessions().is_logged_in(token).await,
        None => false,
    };
    Json(CheckLoginResponse { logged_in })
}
