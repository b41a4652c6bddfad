//! Locally signed session tokens.
//!
//! Sessions are an HS256 access/refresh token pair kept in two cookies. The
//! access token is short lived; once it has expired, or will expire within
//! the refresh threshold, a valid refresh token rotates both tokens and the
//! new pair is handed back as cookie mutations.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Caller, CookieMutation, IdentityError, IdentityProvider, SessionCookies, SessionLookup};
use crate::config::IdentityConfig;

/// Which half of the token pair a JWT is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims carried by session tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID).
    pub sub: String,
    /// Email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Token kind.
    pub typ: TokenKind,
    /// Unique token id.
    pub jti: String,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
}

impl SessionClaims {
    fn caller(&self) -> Caller {
        Caller {
            user_id: self.sub.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
        }
    }
}

/// Identity provider backed by locally signed JWTs.
pub struct JwtIdentityProvider {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
    refresh_threshold: Duration,
    cookies: SessionCookies,
}

impl std::fmt::Debug for JwtIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtIdentityProvider")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("refresh_threshold", &self.refresh_threshold)
            .field("cookies", &self.cookies)
            .finish_non_exhaustive()
    }
}

impl JwtIdentityProvider {
    /// Create a provider signing with `secret`.
    pub fn new(secret: &str, config: &IdentityConfig) -> Self {
        let mut validation = Validation::default();
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl: Duration::from_secs(config.access_ttl_secs),
            refresh_ttl: Duration::from_secs(config.refresh_ttl_secs),
            refresh_threshold: Duration::from_secs(config.refresh_threshold_secs),
            cookies: SessionCookies::from_config(config),
        }
    }

    /// Create a provider from configuration; requires `jwt_secret`.
    pub fn from_config(config: &IdentityConfig) -> anyhow::Result<Self> {
        let secret = config
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .context("JWT secret not configured")?;
        Ok(Self::new(secret, config))
    }

    /// Issue a new session for `caller` as cookie mutations.
    pub fn issue_session(&self, caller: &Caller) -> Result<Vec<CookieMutation>, IdentityError> {
        let access = self.mint(caller, TokenKind::Access, ttl_secs(self.access_ttl))?;
        let refresh = self.mint(caller, TokenKind::Refresh, ttl_secs(self.refresh_ttl))?;
        Ok(self
            .cookies
            .issue(access, self.access_ttl, refresh, self.refresh_ttl))
    }

    /// Verify a token of the expected kind.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<SessionClaims, IdentityError> {
        let claims = decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?
            .claims;
        if claims.typ != kind {
            return Err(IdentityError::InvalidToken(format!(
                "expected {kind:?} token, got {:?}",
                claims.typ
            )));
        }
        Ok(claims)
    }

    fn mint(&self, caller: &Caller, kind: TokenKind, ttl_secs: i64) -> Result<String, IdentityError> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: caller.user_id.clone(),
            email: caller.email.clone(),
            role: caller.role.clone(),
            typ: kind,
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now.saturating_add(ttl_secs),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    fn expiring_soon(&self, claims: &SessionClaims) -> bool {
        claims.exp - Utc::now().timestamp() <= ttl_secs(self.refresh_threshold)
    }
}

fn ttl_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn current_caller(&self, cookies: &CookieJar) -> Result<SessionLookup, IdentityError> {
        let access = self.cookies.access_token(cookies);
        let refresh = self.cookies.refresh_token(cookies);

        if access.is_none() && refresh.is_none() {
            return Ok(SessionLookup::anonymous());
        }

        let mut still_valid = None;
        if let Some(token) = access {
            match self.verify(token, TokenKind::Access) {
                Ok(claims) if refresh.is_none() || !self.expiring_soon(&claims) => {
                    return Ok(SessionLookup::authenticated(claims.caller()));
                }
                Ok(claims) => {
                    tracing::debug!(user_id = %claims.sub, "Access token expiring soon, renewing");
                    still_valid = Some(claims);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Access token rejected");
                }
            }
        }

        let Some(refresh) = refresh else {
            return Ok(SessionLookup {
                caller: None,
                mutations: self.cookies.remove_all(),
            });
        };

        match self.verify(refresh, TokenKind::Refresh) {
            Ok(claims) => {
                let caller = claims.caller();
                let mutations = self.issue_session(&caller)?;
                tracing::debug!(user_id = %caller.user_id, "Session renewed");
                Ok(SessionLookup {
                    caller: Some(caller),
                    mutations,
                })
            }
            Err(e) => {
                tracing::debug!(error = %e, "Refresh token rejected");
                if let Some(claims) = still_valid {
                    return Ok(SessionLookup::authenticated(claims.caller()));
                }
                Ok(SessionLookup {
                    caller: None,
                    mutations: self.cookies.remove_all(),
                })
            }
        }
    }

    async fn sign_out(&self, _cookies: &CookieJar) -> Result<Vec<CookieMutation>, IdentityError> {
        Ok(self.cookies.remove_all())
    }
}
