//! Gateway functionality - session gate, path rules, session endpoints.
//!
//! - [`paths`]: path classification and bypass rules
//! - [`gate`]: the middleware deciding pass-through vs redirect
//! - [`cookies`]: relaying identity cookie mutations onto headers
//! - [`routes`]: session inspection and logout endpoints

pub mod cookies;
pub mod gate;
pub mod paths;
pub mod routes;

pub use gate::{decide, session_gate, GateDecision, GateError, RequestGate};
pub use paths::{BypassRules, PathClass, PathRule, PathRules};

use axum::Router;

use crate::AppState;

/// Create the gateway router with all gateway-specific routes.
pub fn create_router(state: &AppState) -> Router<AppState> {
    Router::new().merge(routes::router(state))
}
