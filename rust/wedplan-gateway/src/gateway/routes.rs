//! Session endpoints served next to the gate.

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;

use super::cookies::append_set_cookies;
use super::gate::{current_caller, redirect, GateError};
use crate::identity::{Caller, SessionCookies};
use crate::AppState;

/// Gateway-specific routes.
pub fn router(state: &AppState) -> Router<AppState> {
    let logout_path = state.config.gate.logout_path.as_str();
    Router::new()
        .route("/api/v1/session", get(get_session))
        .route(logout_path, get(logout).post(logout))
}

/// Session response.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    pub user: Caller,
}

/// Error body for session endpoints.
#[derive(Debug, Serialize)]
pub struct SessionError {
    pub error: String,
    pub message: String,
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(self)).into_response()
    }
}

/// Report the caller resolved by the gate.
pub async fn get_session(req: Request<Body>) -> Result<Json<SessionResponse>, SessionError> {
    match current_caller(&req) {
        Some(caller) => Ok(Json(SessionResponse {
            authenticated: true,
            user: caller.clone(),
        })),
        None => Err(SessionError {
            error: "unauthenticated".to_string(),
            message: "No active session".to_string(),
        }),
    }
}

/// End the session and send the caller to the login page.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Result<Response, GateError> {
    let mutations = match state.identity.sign_out(&jar).await {
        Ok(mutations) => mutations,
        Err(e) => {
            tracing::warn!(error = %e, "Sign-out failed, clearing session cookies locally");
            SessionCookies::from_config(&state.config.identity).remove_all()
        }
    };

    let mut response = redirect(&state.config.gate.login_path)?;
    append_set_cookies(response.headers_mut(), &mutations)?;
    Ok(response)
}
