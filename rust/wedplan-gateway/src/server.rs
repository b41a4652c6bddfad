//! HTTP server setup and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, response::IntoResponse, Json, Router};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::api;
use crate::config::AppConfig;
use crate::gateway::{self, session_gate, RequestGate};
use crate::identity::{self, IdentityProvider};
use crate::logging::OpTimer;
use crate::{log_banner, log_init_step, log_init_warning, log_success, AppState};

/// Gateway version (from Cargo.toml).
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create the application with the identity provider selected in `config`.
pub fn create_app(config: AppConfig) -> anyhow::Result<Router> {
    let timer = OpTimer::new("identity", "build_provider");
    let identity = identity::build_provider(&config.identity);
    timer.finish_with_result(identity.as_ref());

    Ok(create_app_with_routes(config, identity?, Router::new()))
}

/// Create the application around `routes`, guarded by the session gate.
///
/// `routes` are the host application's pages and data endpoints. The gate
/// runs in front of them and in front of the built-in session and health
/// endpoints.
pub fn create_app_with_routes(
    config: AppConfig,
    identity: Arc<dyn IdentityProvider>,
    routes: Router<AppState>,
) -> Router {
    let overall_timer = OpTimer::new("server", "create_app");

    log_banner!(
        format!("💍 Wedplan Gateway v{VERSION}"),
        format!(
            "Identity: {} | Login: {} | Home: {}",
            config.identity.provider, config.gate.login_path, config.gate.home_path
        )
    );

    // [1/3] Session gate
    let gate = Arc::new(RequestGate::new(&config.gate, Arc::clone(&identity)));
    log_init_step!(
        1,
        3,
        "Session Gate",
        format!(
            "🔐 {} public rules, lookup bound {}ms",
            gate.rules().public_rules().len(),
            config.gate.identity_timeout_ms
        )
    );

    if !config.identity.cookie_secure {
        log_init_warning!("Session cookies are not marked Secure; use only over plain HTTP in development");
    }

    // [2/3] State
    let state = AppState {
        config: Arc::new(config.clone()),
        identity,
    };
    log_init_step!(2, 3, "State", "📦 Shared state ready");

    // [3/3] Router with middleware
    let app = Router::new()
        .merge(api::create_router())
        .merge(gateway::create_router(&state))
        .merge(routes)
        .fallback(not_found)
        .layer(axum::middleware::from_fn_with_state(gate, session_gate))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.server.timeout_secs),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state);
    log_init_step!(3, 3, "Router", "🌐 Routes + middleware configured");

    overall_timer.finish();
    log_success!("Wedplan gateway created successfully");

    app
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "not_found",
            "message": "No route for this path"
        })),
    )
}
