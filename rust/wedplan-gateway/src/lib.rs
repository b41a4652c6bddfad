//! Wedplan Gateway - session and authorization gate
//!
//! Every page of the wedding planner (guests, budget, vendors, seating,
//! tasks, RSVPs) sits behind this gate. For each request it:
//!
//! - resolves the caller from the session cookies through an
//!   [`identity::IdentityProvider`], renewing expiring credentials on the way
//! - classifies the path as public, auth-entry or protected
//! - forwards the request, or redirects to the login page or the dashboard
//!
//! # Architecture
//!
//! - [`config`]: Configuration loading and validation
//! - [`gateway`]: Path rules, the gate middleware, session endpoints
//! - [`identity`]: Identity provider port plus JWT and hosted implementations
//! - [`api`]: Health endpoints
//! - [`server`]: Router assembly
//!
//! # Example
//!
//! ```rust,ignore
//! use wedplan_gateway::{config::AppConfig, server::create_app};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     let app = create_app(config)?;
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod api;
pub mod config;
pub mod gateway;
pub mod identity;
pub mod logging;
pub mod server;

use std::sync::Arc;

use config::AppConfig;
use identity::IdentityProvider;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Identity provider resolving session cookies.
    pub identity: Arc<dyn IdentityProvider>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"AppConfig")
            .field("identity", &self.config.identity.provider)
            .finish()
    }
}
