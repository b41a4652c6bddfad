//! Hosted identity service client.
//!
//! Talks to a GoTrue-style REST API:
//!
//! - `GET  /auth/v1/user` resolves an access token to a user
//! - `POST /auth/v1/token?grant_type=refresh_token` rotates the token pair
//! - `POST /auth/v1/logout` revokes the session
//!
//! Tokens are opaque here, so renewal happens when the service rejects the
//! access token rather than ahead of expiry.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use axum_extra::extract::cookie::CookieJar;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use super::{Caller, CookieMutation, IdentityError, IdentityProvider, SessionCookies, SessionLookup};
use crate::config::IdentityConfig;

/// User record returned by the identity service.
#[derive(Debug, Deserialize)]
struct RemoteUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

impl From<RemoteUser> for Caller {
    fn from(user: RemoteUser) -> Self {
        Self {
            user_id: user.id,
            email: user.email.filter(|e| !e.is_empty()),
            role: user.role.filter(|r| !r.is_empty()),
        }
    }
}

/// Token grant returned by the refresh endpoint.
#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    refresh_token: String,
    expires_in: u64,
    user: RemoteUser,
}

/// Identity provider backed by a hosted identity service.
#[derive(Debug, Clone)]
pub struct RemoteIdentityProvider {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    refresh_ttl: Duration,
    cookies: SessionCookies,
}

impl RemoteIdentityProvider {
    /// Create a provider from configuration; requires `remote_url`.
    pub fn from_config(config: &IdentityConfig) -> anyhow::Result<Self> {
        let raw = config
            .remote_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .context("Identity service URL not configured")?;
        let mut base_url =
            Url::parse(raw).with_context(|| format!("Invalid identity URL: {raw}"))?;
        // Endpoints are joined relative to the base, which drops a last segment without '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("wedplan-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build identity HTTP client")?;

        Ok(Self {
            client,
            base_url,
            api_key: config.remote_api_key.clone(),
            refresh_ttl: Duration::from_secs(config.refresh_ttl_secs),
            cookies: SessionCookies::from_config(config),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, IdentityError> {
        self.base_url
            .join(path)
            .map_err(|e| IdentityError::Unavailable(format!("bad endpoint {path}: {e}")))
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("apikey", key),
            None => builder,
        }
    }

    /// Resolve an access token. `Ok(None)` means the service rejected it.
    async fn fetch_user(&self, access_token: &str) -> Result<Option<Caller>, IdentityError> {
        let url = self.endpoint("auth/v1/user")?;
        let response = self
            .request(self.client.get(url).bearer_auth(access_token))
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let user: RemoteUser = response
                    .json()
                    .await
                    .map_err(|e| IdentityError::Malformed(e.to_string()))?;
                Ok(Some(user.into()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status => Err(rejected(status, response).await),
        }
    }

    /// Rotate the token pair. `Ok(None)` means the refresh token is dead.
    async fn refresh(&self, refresh_token: &str) -> Result<Option<TokenGrant>, IdentityError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");

        let response = self
            .request(self.client.post(url))
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let grant = response
                    .json()
                    .await
                    .map_err(|e| IdentityError::Malformed(e.to_string()))?;
                Ok(Some(grant))
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status => Err(rejected(status, response).await),
        }
    }
}

async fn rejected(status: StatusCode, response: reqwest::Response) -> IdentityError {
    let message = response.text().await.unwrap_or_default();
    IdentityError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl IdentityProvider for RemoteIdentityProvider {
    async fn current_caller(&self, cookies: &CookieJar) -> Result<SessionLookup, IdentityError> {
        let access = self.cookies.access_token(cookies);
        let refresh = self.cookies.refresh_token(cookies);

        if access.is_none() && refresh.is_none() {
            return Ok(SessionLookup::anonymous());
        }

        if let Some(token) = access {
            if let Some(caller) = self.fetch_user(token).await? {
                return Ok(SessionLookup::authenticated(caller));
            }
            tracing::debug!("Identity service rejected access token");
        }

        let Some(refresh) = refresh else {
            return Ok(SessionLookup {
                caller: None,
                mutations: self.cookies.remove_all(),
            });
        };

        match self.refresh(refresh).await? {
            Some(grant) => {
                let caller = Caller::from(grant.user);
                let mutations = self.cookies.issue(
                    grant.access_token,
                    Duration::from_secs(grant.expires_in),
                    grant.refresh_token,
                    self.refresh_ttl,
                );
                tracing::debug!(user_id = %caller.user_id, "Session renewed by identity service");
                Ok(SessionLookup {
                    caller: Some(caller),
                    mutations,
                })
            }
            None => {
                tracing::debug!("Identity service rejected refresh token");
                Ok(SessionLookup {
                    caller: None,
                    mutations: self.cookies.remove_all(),
                })
            }
        }
    }

    async fn sign_out(&self, cookies: &CookieJar) -> Result<Vec<CookieMutation>, IdentityError> {
        if let Some(token) = self.cookies.access_token(cookies) {
            let url = self.endpoint("auth/v1/logout")?;
            let result = self
                .request(self.client.post(url).bearer_auth(token))
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    tracing::warn!(status = %response.status(), "Identity service refused logout");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Identity service logout failed");
                }
            }
        }
        Ok(self.cookies.remove_all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_url() {
        assert!(RemoteIdentityProvider::from_config(&IdentityConfig::default()).is_err());
    }

    #[test]
    fn test_from_config_rejects_bad_url() {
        let config = IdentityConfig {
            remote_url: Some("not a url".to_string()),
            ..IdentityConfig::default()
        };
        assert!(RemoteIdentityProvider::from_config(&config).is_err());
    }

    #[test]
    fn test_endpoints_join_base() {
        let config = IdentityConfig {
            remote_url: Some("https://id.example.com/".to_string()),
            ..IdentityConfig::default()
        };
        let provider = RemoteIdentityProvider::from_config(&config).unwrap();
        assert_eq!(
            provider.endpoint("auth/v1/user").unwrap().as_str(),
            "https://id.example.com/auth/v1/user"
        );
    }

    #[test]
    fn test_endpoints_keep_base_path() {
        let config = IdentityConfig {
            remote_url: Some("https://host.example/identity".to_string()),
            ..IdentityConfig::default()
        };
        let provider = RemoteIdentityProvider::from_config(&config).unwrap();
        assert_eq!(
            provider.endpoint("auth/v1/token").unwrap().as_str(),
            "https://host.example/identity/auth/v1/token"
        );
    }

    #[test]
    fn test_remote_user_drops_empty_fields() {
        let user: RemoteUser =
            serde_json::from_str(r#"{"id":"u1","email":"","role":"authenticated"}"#).unwrap();
        let caller = Caller::from(user);
        assert_eq!(caller.user_id, "u1");
        assert!(caller.email.is_none());
        assert_eq!(caller.role.as_deref(), Some("authenticated"));
    }
}
