//! Configuration management for the wedplan gateway.
//!
//! Configuration is layered from defaults, optional config files and
//! environment variables, then checked by [`ConfigValidator`]:
//!
//! ```rust,ignore
//! use wedplan_gateway::config::{AppConfig, ConfigValidator};
//!
//! let config = AppConfig::load_unchecked()?;
//! ConfigValidator::validate(&config)?;
//! ```

pub mod error;
pub mod validator;

pub use error::{ConfigResult, ConfigurationError};
pub use validator::ConfigValidator;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gateway::paths::PathRule;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Session gate configuration (path rules, redirect targets).
    #[serde(default)]
    pub gate: GateConfig,
    /// Identity provider configuration.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment and config files.
    ///
    /// Sources, lowest precedence first:
    /// 1. Default values
    /// 2. Config files (`config/wedplan-gateway.*`)
    /// 3. `WEDPLAN__*` environment variables
    /// 4. `JWT_SECRET`, `IDENTITY_URL`, `IDENTITY_API_KEY`
    ///
    /// The result is validated; use [`Self::load_unchecked`] to skip that.
    pub fn load() -> anyhow::Result<Self> {
        let config = Self::load_unchecked()?;
        config.validated()
    }

    /// Load configuration from an explicit file, then environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let builder = config::Config::builder().add_source(config::File::from(path).required(true));
        let config = Self::build(builder)?;
        config.validated()
    }

    /// Load configuration without validation.
    pub fn load_unchecked() -> anyhow::Result<Self> {
        let builder = config::Config::builder().add_source(
            config::File::with_name("config/wedplan-gateway").required(false),
        );
        Self::build(builder)
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let config = builder
            .add_source(
                config::Environment::with_prefix("WEDPLAN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app_config: AppConfig = config.try_deserialize()?;

        if let Ok(secret) = std::env::var("JWT_SECRET") {
            app_config.identity.jwt_secret = Some(secret);
        }
        if let Ok(url) = std::env::var("IDENTITY_URL") {
            app_config.identity.remote_url = Some(url);
        }
        if let Ok(key) = std::env::var("IDENTITY_API_KEY") {
            app_config.identity.remote_api_key = Some(key);
        }

        Ok(app_config)
    }

    fn validated(self) -> anyhow::Result<Self> {
        ConfigValidator::validate(&self)
            .map_err(|e| anyhow::anyhow!("Configuration validation failed:\n\n{e}"))?;
        Ok(self)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Session gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Where unauthenticated callers are sent from protected paths.
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Where authenticated callers are sent from auth-entry paths.
    #[serde(default = "default_home_path")]
    pub home_path: String,
    /// Namespace holding the unauthenticated flows.
    #[serde(default = "default_auth_namespace")]
    pub auth_namespace: String,
    /// Logout endpoint; exempt from the auth-entry redirect.
    #[serde(default = "default_logout_path")]
    pub logout_path: String,
    /// Paths reachable without a credential.
    #[serde(default = "PathRule::default_public")]
    pub public_paths: Vec<PathRule>,
    /// Path prefixes the gate never runs on.
    #[serde(default = "default_bypass_prefixes")]
    pub bypass_prefixes: Vec<String>,
    /// File extensions the gate never runs on.
    #[serde(default = "default_bypass_extensions")]
    pub bypass_extensions: Vec<String>,
    /// Upper bound on the identity lookup, in milliseconds.
    #[serde(default = "default_identity_timeout")]
    pub identity_timeout_ms: u64,
    /// Query parameter carrying the original path on login redirects.
    #[serde(default)]
    pub return_to_param: Option<String>,
}

fn default_login_path() -> String {
    "/auth/login".to_string()
}

fn default_home_path() -> String {
    "/dashboard".to_string()
}

fn default_auth_namespace() -> String {
    "/auth".to_string()
}

fn default_logout_path() -> String {
    "/auth/logout".to_string()
}

fn default_bypass_prefixes() -> Vec<String> {
    ["/_next/static", "/_next/image", "/favicon.ico", "/static", "/health", "/ready"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_bypass_extensions() -> Vec<String> {
    ["svg", "png", "jpg", "jpeg", "gif", "webp", "ico", "css", "js", "map", "woff2"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_identity_timeout() -> u64 {
    5000
}

impl GateConfig {
    /// Identity lookup bound as a [`Duration`].
    pub fn identity_timeout(&self) -> Duration {
        Duration::from_millis(self.identity_timeout_ms)
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            login_path: default_login_path(),
            home_path: default_home_path(),
            auth_namespace: default_auth_namespace(),
            logout_path: default_logout_path(),
            public_paths: PathRule::default_public(),
            bypass_prefixes: default_bypass_prefixes(),
            bypass_extensions: default_bypass_extensions(),
            identity_timeout_ms: default_identity_timeout(),
            return_to_param: None,
        }
    }
}

/// Which identity collaborator resolves session cookies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityProviderKind {
    /// Locally signed JWT access/refresh tokens.
    #[default]
    Jwt,
    /// Hosted identity service over HTTP.
    Remote,
}

impl std::fmt::Display for IdentityProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Jwt => f.write_str("jwt"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

/// Identity provider and session cookie configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Provider backing the gate.
    #[serde(default)]
    pub provider: IdentityProviderKind,
    /// JWT secret for token signing/validation.
    pub jwt_secret: Option<String>,
    /// Access token lifetime in seconds.
    #[serde(default = "default_access_ttl")]
    pub access_ttl_secs: u64,
    /// Refresh token lifetime in seconds.
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_secs: u64,
    /// Renew access tokens expiring within this many seconds.
    #[serde(default = "default_refresh_threshold")]
    pub refresh_threshold_secs: u64,
    /// Cookie holding the access token.
    #[serde(default = "default_access_cookie")]
    pub access_cookie: String,
    /// Cookie holding the refresh token.
    #[serde(default = "default_refresh_cookie")]
    pub refresh_cookie: String,
    /// Mark session cookies `Secure`.
    #[serde(default = "default_true")]
    pub cookie_secure: bool,
    /// Optional cookie `Domain` attribute.
    pub cookie_domain: Option<String>,
    /// Base URL of the hosted identity service.
    pub remote_url: Option<String>,
    /// API key sent to the hosted identity service.
    pub remote_api_key: Option<String>,
}

fn default_access_ttl() -> u64 {
    3600
}

fn default_refresh_ttl() -> u64 {
    86400 * 30
}

fn default_refresh_threshold() -> u64 {
    60
}

fn default_access_cookie() -> String {
    "wp-access-token".to_string()
}

fn default_refresh_cookie() -> String {
    "wp-refresh-token".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            provider: IdentityProviderKind::default(),
            jwt_secret: None,
            access_ttl_secs: default_access_ttl(),
            refresh_ttl_secs: default_refresh_ttl(),
            refresh_threshold_secs: default_refresh_threshold(),
            access_cookie: default_access_cookie(),
            refresh_cookie: default_refresh_cookie(),
            cookie_secure: true,
            cookie_domain: None,
            remote_url: None,
            remote_api_key: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to use JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults_match_planner_routes() {
        let config = AppConfig::default();
        assert_eq!(config.gate.login_path, "/auth/login");
        assert_eq!(config.gate.home_path, "/dashboard");
        assert_eq!(config.gate.logout_path, "/auth/logout");
        assert_eq!(config.gate.identity_timeout(), Duration::from_secs(5));
        assert!(config.gate.public_paths.contains(&PathRule::Exact("/".into())));
        assert_eq!(config.identity.provider, IdentityProviderKind::Jwt);
    }

    #[test]
    #[serial]
    fn test_load_from_file_with_env_override() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp config file");
        writeln!(
            file,
            r#"
[gate]
home_path = "/planner"
identity_timeout_ms = 750
public_paths = [{{ exact = "/" }}, {{ prefix = "/rsvp" }}]

[identity]
jwt_secret = "file-secret"
cookie_secure = false
"#
        )
        .expect("write config");

        // SAFETY: serialized with the other env-mutating tests.
        unsafe { std::env::set_var("WEDPLAN__SERVER__PORT", "9191") };
        let config = AppConfig::load_from(file.path());
        unsafe { std::env::remove_var("WEDPLAN__SERVER__PORT") };

        let config = config.expect("config loads");
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.gate.home_path, "/planner");
        assert_eq!(config.gate.identity_timeout_ms, 750);
        assert_eq!(
            config.gate.public_paths,
            vec![PathRule::Exact("/".into()), PathRule::Prefix("/rsvp".into())]
        );
        assert!(!config.identity.cookie_secure);
        assert_eq!(config.gate.login_path, "/auth/login");
    }

    #[test]
    #[serial]
    fn test_jwt_secret_env_override() {
        // SAFETY: serialized with the other env-mutating tests.
        unsafe { std::env::set_var("JWT_SECRET", "env-secret") };
        let config = AppConfig::load_unchecked();
        unsafe { std::env::remove_var("JWT_SECRET") };

        let config = config.expect("config loads");
        assert_eq!(config.identity.jwt_secret.as_deref(), Some("env-secret"));
    }
}
