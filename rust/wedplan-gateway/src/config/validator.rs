//! Configuration validation for the wedplan gateway.
//!
//! Rejects settings that would make the gate misbehave at request time:
//! redirect targets that are not same-origin absolute paths, and path rules
//! under which the gate would redirect a caller back to where it came from.

use super::error::{ConfigResult, ConfigurationError};
use super::{AppConfig, GateConfig, IdentityConfig, IdentityProviderKind};
use crate::gateway::paths::{PathClass, PathRules};

/// Configuration validator that checks for valid configuration combinations.
///
/// | Setting                     | Rule                                   |
/// |-----------------------------|----------------------------------------|
/// | `gate.login_path`           | absolute, not classified protected     |
/// | `gate.home_path`            | absolute, not classified auth-entry    |
/// | `gate.identity_timeout_ms`  | greater than zero                      |
/// | `identity.provider = jwt`   | `jwt_secret` set and non-empty         |
/// | `identity.provider = remote`| `remote_url` set, feature compiled in  |
#[derive(Debug)]
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the entire application configuration.
    ///
    /// Returns `Ok(())` if valid, or a `ConfigurationError` with all issues.
    pub fn validate(config: &AppConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();
        for result in [
            Self::validate_gate(&config.gate),
            Self::validate_identity(&config.identity),
        ] {
            if let Err(e) = result {
                errors.extend(e.into_errors());
            }
        }
        ConfigurationError::collect(errors)
    }

    /// Validate redirect targets and path rules.
    pub fn validate_gate(gate: &GateConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();

        for (setting, value) in [
            ("gate.login_path", &gate.login_path),
            ("gate.home_path", &gate.home_path),
            ("gate.auth_namespace", &gate.auth_namespace),
            ("gate.logout_path", &gate.logout_path),
        ] {
            if !is_same_origin_path(value) {
                errors.push(ConfigurationError::Invalid {
                    setting,
                    value: value.clone(),
                    problem: "is not an absolute same-origin path",
                });
            }
        }

        if gate.identity_timeout_ms == 0 {
            errors.push(ConfigurationError::Invalid {
                setting: "gate.identity_timeout_ms",
                value: "0".to_string(),
                problem: "would time out every identity lookup",
            });
        }

        let rules = PathRules::from_config(gate);
        let login_class = rules.classify(&gate.login_path);
        if login_class == PathClass::Protected {
            errors.push(ConfigurationError::RedirectLoop {
                setting: "gate.login_path",
                path: gate.login_path.clone(),
                class: login_class,
            });
        }
        let home_class = rules.classify(&gate.home_path);
        if home_class == PathClass::AuthEntry {
            errors.push(ConfigurationError::RedirectLoop {
                setting: "gate.home_path",
                path: gate.home_path.clone(),
                class: home_class,
            });
        }

        ConfigurationError::collect(errors)
    }

    /// Validate the identity provider settings.
    pub fn validate_identity(identity: &IdentityConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();

        match identity.provider {
            IdentityProviderKind::Jwt => {
                if identity.jwt_secret.as_ref().is_none_or(String::is_empty) {
                    errors.push(ConfigurationError::Missing {
                        setting: "identity.jwt_secret",
                        provider: identity.provider,
                    });
                }
            }
            IdentityProviderKind::Remote => {
                if !cfg!(feature = "remote-identity") {
                    errors.push(ConfigurationError::ProviderUnavailable(identity.provider));
                }
                if identity.remote_url.as_ref().is_none_or(String::is_empty) {
                    errors.push(ConfigurationError::Missing {
                        setting: "identity.remote_url",
                        provider: identity.provider,
                    });
                }
            }
        }

        if identity.access_cookie == identity.refresh_cookie {
            errors.push(ConfigurationError::CookieNameClash(
                identity.access_cookie.clone(),
            ));
        }

        ConfigurationError::collect(errors)
    }
}

/// Absolute path on the same origin: one leading slash, no scheme or authority.
fn is_same_origin_path(value: &str) -> bool {
    value.starts_with('/') && !value.starts_with("//") && !value.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::paths::PathRule;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.identity.jwt_secret = Some("secret".to_string());
        config
    }

    #[test]
    fn test_default_gate_with_secret_is_valid() {
        assert!(ConfigValidator::validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_jwt_secret() {
        let config = AppConfig::default();
        let err = ConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn test_protected_login_path_is_rejected() {
        let mut config = valid_config();
        config.gate.login_path = "/members/login".to_string();
        let err = ConfigValidator::validate(&config).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::RedirectLoop { setting: "gate.login_path", .. }
        ));
        assert!(err.to_string().contains("/members/login"));
    }

    #[test]
    fn test_public_login_path_outside_namespace_is_accepted() {
        let mut config = valid_config();
        config.gate.login_path = "/signin".to_string();
        config.gate.public_paths.push(PathRule::Exact("/signin".to_string()));
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_home_inside_auth_namespace_is_rejected() {
        let mut config = valid_config();
        config.gate.home_path = "/auth/welcome".to_string();
        let err = ConfigValidator::validate_gate(&config.gate).unwrap_err();
        assert!(err.to_string().contains("/auth/welcome"));
    }

    #[test]
    fn test_offsite_redirect_target_is_rejected() {
        let mut config = valid_config();
        config.gate.home_path = "https://evil.example/dashboard".to_string();
        let err = ConfigValidator::validate_gate(&config.gate).unwrap_err();
        assert!(err.to_string().contains("gate.home_path"));

        config.gate.home_path = "//evil.example".to_string();
        assert!(ConfigValidator::validate_gate(&config.gate).is_err());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let mut config = valid_config();
        config.gate.identity_timeout_ms = 0;
        let err = ConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("identity_timeout_ms"));
    }

    #[test]
    fn test_remote_provider_requires_url() {
        let mut config = valid_config();
        config.identity.provider = IdentityProviderKind::Remote;
        assert!(ConfigValidator::validate(&config).is_err());

        config.identity.remote_url = Some("https://id.example".to_string());
        assert_eq!(
            ConfigValidator::validate(&config).is_ok(),
            cfg!(feature = "remote-identity")
        );
    }

    #[test]
    fn test_errors_are_collected() {
        let mut config = AppConfig::default();
        config.gate.identity_timeout_ms = 0;
        config.gate.login_path = "auth/login".to_string();
        let err = ConfigValidator::validate(&config).unwrap_err();
        assert!(err.count() >= 3);
    }

    #[test]
    fn test_shared_cookie_name_is_rejected() {
        let mut config = valid_config();
        config.identity.refresh_cookie = config.identity.access_cookie.clone();
        let err = ConfigValidator::validate(&config).unwrap_err();
        assert!(matches!(err, ConfigurationError::CookieNameClash(ref name) if name == "wp-access-token"));
    }
}
