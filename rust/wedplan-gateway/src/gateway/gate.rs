//! Session gate middleware.
//!
//! Runs on every request that is not bypassed. It resolves the caller via the
//! identity provider, classifies the path, and either forwards the request or
//! answers with a `302 Found` redirect:
//!
//! | caller | path class  | action                  |
//! |--------|-------------|-------------------------|
//! | none   | protected   | redirect to login       |
//! | none   | public      | pass through            |
//! | none   | auth-entry  | pass through            |
//! | some   | auth-entry  | redirect to home        |
//! | some   | protected   | pass through            |
//! | some   | public      | pass through            |
//!
//! Cookie mutations from the provider are written on both outcomes, unless
//! the downstream handler sets the same cookie itself (logout does).

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::LOCATION, header::InvalidHeaderValue, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;

use super::cookies::{append_set_cookies, forward_request_cookies, without_downstream_overrides};
use super::paths::{BypassRules, PathClass, PathRules};
use crate::config::GateConfig;
use crate::identity::{Caller, IdentityProvider, SessionLookup};

/// What the gate does with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Forward to the downstream handler.
    Proceed,
    /// Unauthenticated caller on a protected path.
    RedirectToLogin,
    /// Authenticated caller on an auth-entry path.
    RedirectToHome,
}

/// Decide the fate of a request from the caller state and path class.
pub fn decide(authenticated: bool, class: PathClass) -> GateDecision {
    match (authenticated, class) {
        (false, PathClass::Protected) => GateDecision::RedirectToLogin,
        (true, PathClass::AuthEntry) => GateDecision::RedirectToHome,
        _ => GateDecision::Proceed,
    }
}

/// Faults the gate cannot recover from.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// A cookie mutation could not be encoded as a header.
    #[error("failed to write cookie '{name}': {source}")]
    CookieWrite {
        name: String,
        #[source]
        source: InvalidHeaderValue,
    },

    /// The redirect response could not be built.
    #[error("failed to build redirect: {0}")]
    Redirect(#[from] axum::http::Error),
}

/// Gate error response body.
#[derive(Debug, Serialize)]
struct GateErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Session gate fault");
        let error = match self {
            Self::CookieWrite { .. } => "cookie_write_failed",
            Self::Redirect(_) => "redirect_failed",
        };
        let body = Json(GateErrorBody {
            error,
            message: self.to_string(),
        });
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// The request gate.
pub struct RequestGate {
    rules: PathRules,
    bypass: BypassRules,
    identity: Arc<dyn IdentityProvider>,
    login_path: String,
    home_path: String,
    return_to_param: Option<String>,
    lookup_timeout: Duration,
}

impl std::fmt::Debug for RequestGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGate")
            .field("rules", &self.rules)
            .field("bypass", &self.bypass)
            .field("login_path", &self.login_path)
            .field("home_path", &self.home_path)
            .field("return_to_param", &self.return_to_param)
            .field("lookup_timeout", &self.lookup_timeout)
            .finish_non_exhaustive()
    }
}

impl RequestGate {
    /// Create a gate from configuration and an identity provider.
    pub fn new(config: &GateConfig, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            rules: PathRules::from_config(config),
            bypass: BypassRules::from_config(config),
            identity,
            login_path: config.login_path.clone(),
            home_path: config.home_path.clone(),
            return_to_param: config.return_to_param.clone(),
            lookup_timeout: config.identity_timeout(),
        }
    }

    /// The classification rules in effect.
    pub fn rules(&self) -> &PathRules {
        &self.rules
    }

    /// Resolve the caller within the lookup bound.
    ///
    /// Provider errors and timeouts both come back as an anonymous lookup.
    pub async fn lookup(&self, jar: &CookieJar) -> SessionLookup {
        match tokio::time::timeout(self.lookup_timeout, self.identity.current_caller(jar)).await {
            Ok(Ok(lookup)) => lookup,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Identity lookup failed, treating request as unauthenticated");
                SessionLookup::anonymous()
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = u64::try_from(self.lookup_timeout.as_millis()).unwrap_or(u64::MAX),
                    "Identity lookup timed out, treating request as unauthenticated"
                );
                SessionLookup::anonymous()
            }
        }
    }

    /// Run the gate for one request.
    pub async fn handle(&self, mut req: Request<Body>, next: Next) -> Result<Response, GateError> {
        let path = req.uri().path().to_owned();
        if self.bypass.matches(&path) {
            return Ok(next.run(req).await);
        }

        let jar = CookieJar::from_headers(req.headers());
        let SessionLookup { caller, mutations } = self.lookup(&jar).await;
        let class = self.rules.classify(&path);
        let decision = decide(caller.is_some(), class);

        tracing::debug!(
            path = %path,
            class = %class,
            authenticated = caller.is_some(),
            decision = ?decision,
            cookie_mutations = mutations.len(),
            "Session gate decision"
        );

        let mut response = match decision {
            GateDecision::Proceed => {
                forward_request_cookies(req.headers_mut(), &jar, &mutations)?;
                if let Some(caller) = caller {
                    req.extensions_mut().insert(caller);
                }
                next.run(req).await
            }
            GateDecision::RedirectToLogin => redirect(&self.login_target(req.uri()))?,
            GateDecision::RedirectToHome => redirect(&self.home_path)?,
        };

        let mutations = without_downstream_overrides(response.headers(), mutations);
        append_set_cookies(response.headers_mut(), &mutations)?;
        Ok(response)
    }

    fn login_target(&self, uri: &Uri) -> String {
        match &self.return_to_param {
            Some(param) => {
                let original = uri.path_and_query().map_or_else(|| uri.path(), |pq| pq.as_str());
                let encoded: String = url::form_urlencoded::byte_serialize(original.as_bytes()).collect();
                format!("{}?{param}={encoded}", self.login_path)
            }
            None => self.login_path.clone(),
        }
    }
}

/// Build a `302 Found` redirect to a same-origin path.
pub fn redirect(location: &str) -> Result<Response, GateError> {
    Ok(Response::builder()
        .status(StatusCode::FOUND)
        .header(LOCATION, location)
        .body(Body::empty())?)
}

/// Axum middleware entry point.
pub async fn session_gate(
    State(gate): State<Arc<RequestGate>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, GateError> {
    gate.handle(req, next).await
}

/// The caller the gate resolved for this request, if any.
pub fn current_caller(req: &Request<Body>) -> Option<&Caller> {
    req.extensions().get::<Caller>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_table() {
        use GateDecision::{Proceed, RedirectToHome, RedirectToLogin};
        use PathClass::{AuthEntry, Protected, Public};

        assert_eq!(decide(false, Protected), RedirectToLogin);
        assert_eq!(decide(false, Public), Proceed);
        assert_eq!(decide(false, AuthEntry), Proceed);
        assert_eq!(decide(true, AuthEntry), RedirectToHome);
        assert_eq!(decide(true, Protected), Proceed);
        assert_eq!(decide(true, Public), Proceed);
    }

    #[test]
    fn test_redirect_is_302_with_location() {
        let response = redirect("/auth/login").unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/auth/login");
    }

    #[test]
    fn test_gate_error_is_500() {
        let source = axum::http::HeaderValue::from_str("a\nb").unwrap_err();
        let err = GateError::CookieWrite {
            name: "wp-access-token".into(),
            source,
        };
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
