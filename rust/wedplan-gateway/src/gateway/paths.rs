//! Path classification rules for the session gate.
//!
//! A request path lands in exactly one [`PathClass`]. Rules are evaluated in
//! a fixed order so the classes never overlap:
//!
//! 1. the logout path (and anything below it) is [`PathClass::Public`];
//! 2. anything under the auth namespace is [`PathClass::AuthEntry`];
//! 3. anything matching a public rule is [`PathClass::Public`];
//! 4. everything else is [`PathClass::Protected`].
//!
//! Prefix rules match on whole path segments: `/invite` covers `/invite` and
//! `/invite/abc`, never `/invitees`.

use serde::{Deserialize, Serialize};

use crate::config::GateConfig;

/// Access class of a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathClass {
    /// Reachable without a credential.
    Public,
    /// Only meant for unauthenticated flows (login form, registration).
    AuthEntry,
    /// Requires an authenticated caller.
    Protected,
}

impl std::fmt::Display for PathClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Public => "public",
            Self::AuthEntry => "auth_entry",
            Self::Protected => "protected",
        };
        f.write_str(name)
    }
}

/// A single path-match rule.
///
/// Deserializes from `{ exact = "/" }` or `{ prefix = "/api" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathRule {
    /// Matches only this exact path.
    Exact(String),
    /// Matches this path and every path below it.
    Prefix(String),
}

impl PathRule {
    /// Check whether `path` is covered by this rule.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(exact) => path == exact,
            Self::Prefix(prefix) => matches_segment_prefix(path, prefix),
        }
    }

    /// Public paths of the wedding planner: home, login, registration,
    /// error, logout, password reset, invitation links and the API namespace.
    pub fn default_public() -> Vec<Self> {
        vec![
            Self::Exact("/".to_string()),
            Self::Prefix("/auth/login".to_string()),
            Self::Prefix("/auth/register".to_string()),
            Self::Prefix("/auth/error".to_string()),
            Self::Prefix("/auth/logout".to_string()),
            Self::Prefix("/auth/reset-password".to_string()),
            Self::Prefix("/invite".to_string()),
            Self::Prefix("/api".to_string()),
        ]
    }
}

/// Segment-aware prefix match.
fn matches_segment_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return path.starts_with('/');
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Injected classification rules.
#[derive(Debug, Clone)]
pub struct PathRules {
    auth_namespace: String,
    logout_path: String,
    public: Vec<PathRule>,
}

impl PathRules {
    /// Build a rule set from explicit parts.
    pub fn new(
        auth_namespace: impl Into<String>,
        logout_path: impl Into<String>,
        public: Vec<PathRule>,
    ) -> Self {
        Self {
            auth_namespace: auth_namespace.into(),
            logout_path: logout_path.into(),
            public,
        }
    }

    /// Build the rule set described by the gate configuration.
    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(
            config.auth_namespace.clone(),
            config.logout_path.clone(),
            config.public_paths.clone(),
        )
    }

    /// Classify a request path.
    pub fn classify(&self, path: &str) -> PathClass {
        if self.is_logout(path) {
            return PathClass::Public;
        }
        if matches_segment_prefix(path, &self.auth_namespace) {
            return PathClass::AuthEntry;
        }
        if self.public.iter().any(|rule| rule.matches(path)) {
            return PathClass::Public;
        }
        PathClass::Protected
    }

    /// Whether `path` is the logout endpoint.
    pub fn is_logout(&self, path: &str) -> bool {
        matches_segment_prefix(path, &self.logout_path)
    }

    /// The configured public rules.
    pub fn public_rules(&self) -> &[PathRule] {
        &self.public
    }
}

impl Default for PathRules {
    fn default() -> Self {
        Self::new("/auth", "/auth/logout", PathRule::default_public())
    }
}

/// Requests the gate never sees: static assets and probes.
#[derive(Debug, Clone, Default)]
pub struct BypassRules {
    prefixes: Vec<String>,
    extensions: Vec<String>,
}

impl BypassRules {
    /// Build bypass rules from path prefixes and file extensions.
    pub fn new(prefixes: Vec<String>, extensions: Vec<String>) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Self {
            prefixes,
            extensions,
        }
    }

    /// Build the bypass rules described by the gate configuration.
    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(
            config.bypass_prefixes.clone(),
            config.bypass_extensions.clone(),
        )
    }

    /// Whether the gate should be skipped for `path`.
    pub fn matches(&self, path: &str) -> bool {
        if self
            .prefixes
            .iter()
            .any(|prefix| matches_segment_prefix(path, prefix))
        {
            return true;
        }

        let last_segment = path.rsplit('/').next().unwrap_or_default();
        match last_segment.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            }
            _ => false,
        }
    }
}
