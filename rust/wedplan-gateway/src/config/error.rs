//! Configuration errors reported at startup.
//!
//! Each variant names the offending setting by its dotted path
//! (`gate.home_path`) and renders the `WEDPLAN__*` key that overrides it.

use crate::config::IdentityProviderKind;
use crate::gateway::paths::PathClass;

/// A setting the gate refuses to start with.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigurationError {
    /// A value that can never work.
    #[error("{setting} = '{value}' {problem} (override with {})", env_key(.setting))]
    Invalid {
        setting: &'static str,
        value: String,
        problem: &'static str,
    },

    /// A redirect target the gate would send callers back to forever.
    #[error(
        "{setting} = '{path}' is classified {class}, so the gate would redirect to it forever \
         (adjust gate.public_paths or gate.auth_namespace)"
    )]
    RedirectLoop {
        setting: &'static str,
        path: String,
        class: PathClass,
    },

    /// A setting the selected identity provider cannot run without.
    #[error("{setting} is required by the {provider} identity provider (set {})", env_key(.setting))]
    Missing {
        setting: &'static str,
        provider: IdentityProviderKind,
    },

    /// The selected identity provider is not compiled into this build.
    #[error(
        "the {0} identity provider needs the 'remote-identity' feature \
         (rebuild with it or set WEDPLAN__IDENTITY__PROVIDER=jwt)"
    )]
    ProviderUnavailable(IdentityProviderKind),

    /// Access and refresh tokens would overwrite each other.
    #[error("identity.access_cookie and identity.refresh_cookie are both '{0}'")]
    CookieNameClash(String),

    /// Several of the above.
    #[error("{} configuration errors:{}", .0.len(), render_list(.0))]
    Multiple(Vec<ConfigurationError>),
}

/// Result type for configuration checks.
pub type ConfigResult<T> = Result<T, ConfigurationError>;

impl ConfigurationError {
    /// Collapse collected errors: none is `Ok`, one is itself, more are `Multiple`.
    pub fn collect(mut errors: Vec<Self>) -> ConfigResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }

    /// Number of individual errors, looking through `Multiple`.
    pub fn count(&self) -> usize {
        match self {
            Self::Multiple(errors) => errors.iter().map(Self::count).sum(),
            _ => 1,
        }
    }

    /// The individual errors, looking through `Multiple`.
    pub fn into_errors(self) -> Vec<Self> {
        match self {
            Self::Multiple(errors) => errors.into_iter().flat_map(Self::into_errors).collect(),
            e => vec![e],
        }
    }
}

/// `gate.home_path` -> `WEDPLAN__GATE__HOME_PATH`.
pub fn env_key(setting: &str) -> String {
    format!("WEDPLAN__{}", setting.replace('.', "__").to_ascii_uppercase())
}

fn render_list(errors: &[ConfigurationError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, e)| format!("\n  {}. {e}", i + 1))
        .collect()
}
