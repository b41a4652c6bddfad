//! Identity collaborator port.
//!
//! The gate never talks to an auth backend directly. It hands the incoming
//! cookie jar to an [`IdentityProvider`] and gets back a [`SessionLookup`]:
//! the resolved caller (if any) plus the cookie mutations the provider wants
//! written, e.g. a rotated token pair after a refresh.

#[cfg(feature = "remote-identity")]
pub mod remote;
pub mod jwt;

pub use jwt::JwtIdentityProvider;
#[cfg(feature = "remote-identity")]
pub use remote::RemoteIdentityProvider;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};

use crate::config::{IdentityConfig, IdentityProviderKind};

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Stable user identifier.
    pub user_id: String,
    /// Email address, when the provider knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Role claim, when the provider knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Caller {
    /// Create a caller with only a user id.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            role: None,
        }
    }

    /// Attach an email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// A change to the client's cookie set.
#[derive(Debug, Clone)]
pub enum CookieMutation {
    /// Create or overwrite the cookie.
    Set(Cookie<'static>),
    /// Expire the cookie. The path and domain must match the original.
    Remove(Cookie<'static>),
}

impl CookieMutation {
    /// Name of the affected cookie.
    pub fn name(&self) -> &str {
        match self {
            Self::Set(cookie) | Self::Remove(cookie) => cookie.name(),
        }
    }

    /// Whether this mutation expires the cookie.
    pub fn is_removal(&self) -> bool {
        matches!(self, Self::Remove(_))
    }

    /// Render as a `Set-Cookie` header value.
    pub fn to_set_cookie(&self) -> String {
        match self {
            Self::Set(cookie) => cookie.to_string(),
            Self::Remove(cookie) => {
                let mut cookie = cookie.clone();
                cookie.make_removal();
                cookie.to_string()
            }
        }
    }

    /// Apply this mutation to a jar holding the request's cookies.
    pub fn apply(&self, jar: CookieJar) -> CookieJar {
        match self {
            Self::Set(cookie) => jar.add(cookie.clone()),
            Self::Remove(cookie) => jar.remove(Cookie::from(cookie.name().to_owned())),
        }
    }
}

/// Result of resolving the session cookies of one request.
#[derive(Debug, Clone, Default)]
pub struct SessionLookup {
    /// The authenticated caller, if the credential was valid.
    pub caller: Option<Caller>,
    /// Cookie changes produced while resolving (refresh, cleanup).
    pub mutations: Vec<CookieMutation>,
}

impl SessionLookup {
    /// No credential, nothing to write.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A valid credential that needs no renewal.
    pub fn authenticated(caller: Caller) -> Self {
        Self {
            caller: Some(caller),
            mutations: Vec::new(),
        }
    }

    /// Whether a caller was resolved.
    pub fn is_authenticated(&self) -> bool {
        self.caller.is_some()
    }
}

/// Identity lookup errors.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The identity backend could not be reached.
    #[error("identity service unavailable: {0}")]
    Unavailable(String),

    /// The identity backend answered with an unexpected status.
    #[error("identity service returned {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The identity backend answered with a body we could not read.
    #[error("malformed identity response: {0}")]
    Malformed(String),

    /// A token could not be verified.
    #[error("invalid session token: {0}")]
    InvalidToken(String),

    /// A token could not be signed.
    #[error("failed to sign session token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Resolves session cookies to a caller.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the caller behind `cookies`, renewing the credential when it
    /// is expired or about to expire.
    async fn current_caller(&self, cookies: &CookieJar) -> Result<SessionLookup, IdentityError>;

    /// End the session behind `cookies` and return the cookie removals.
    async fn sign_out(&self, cookies: &CookieJar) -> Result<Vec<CookieMutation>, IdentityError>;
}

/// Session cookie names and attributes.
#[derive(Debug, Clone)]
pub struct SessionCookies {
    access: String,
    refresh: String,
    secure: bool,
    domain: Option<String>,
}

impl SessionCookies {
    /// Build from identity configuration.
    pub fn from_config(config: &IdentityConfig) -> Self {
        Self {
            access: config.access_cookie.clone(),
            refresh: config.refresh_cookie.clone(),
            secure: config.cookie_secure,
            domain: config.cookie_domain.clone(),
        }
    }

    /// The access token carried by the request.
    pub fn access_token<'a>(&self, jar: &'a CookieJar) -> Option<&'a str> {
        non_empty(jar, &self.access)
    }

    /// The refresh token carried by the request.
    pub fn refresh_token<'a>(&self, jar: &'a CookieJar) -> Option<&'a str> {
        non_empty(jar, &self.refresh)
    }

    /// Mutations writing a fresh token pair.
    pub fn issue(
        &self,
        access_token: String,
        access_ttl: Duration,
        refresh_token: String,
        refresh_ttl: Duration,
    ) -> Vec<CookieMutation> {
        vec![
            CookieMutation::Set(self.build(self.access.clone(), access_token, Some(access_ttl))),
            CookieMutation::Set(self.build(self.refresh.clone(), refresh_token, Some(refresh_ttl))),
        ]
    }

    /// Mutations expiring both session cookies.
    pub fn remove_all(&self) -> Vec<CookieMutation> {
        vec![
            CookieMutation::Remove(self.build(self.access.clone(), String::new(), None)),
            CookieMutation::Remove(self.build(self.refresh.clone(), String::new(), None)),
        ]
    }

    fn build(&self, name: String, value: String, max_age: Option<Duration>) -> Cookie<'static> {
        let mut cookie = Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .build();
        if let Some(max_age) = max_age {
            let secs = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
            cookie.set_max_age(time::Duration::seconds(secs));
        }
        if let Some(domain) = &self.domain {
            cookie.set_domain(domain.clone());
        }
        cookie
    }
}

fn non_empty<'a>(jar: &'a CookieJar, name: &str) -> Option<&'a str> {
    jar.get(name).map(Cookie::value).filter(|v| !v.is_empty())
}

/// Build the provider selected in configuration.
pub fn build_provider(config: &IdentityConfig) -> anyhow::Result<Arc<dyn IdentityProvider>> {
    match config.provider {
        IdentityProviderKind::Jwt => Ok(Arc::new(JwtIdentityProvider::from_config(config)?)),
        #[cfg(feature = "remote-identity")]
        IdentityProviderKind::Remote => Ok(Arc::new(RemoteIdentityProvider::from_config(config)?)),
        #[cfg(not(feature = "remote-identity"))]
        IdentityProviderKind::Remote => Err(anyhow::anyhow!(
            "Remote identity provider requires 'remote-identity' feature"
        )),
    }
}
