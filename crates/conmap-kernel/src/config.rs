//! Resolver configuration.
//!
//! ```toml
//! diamond_policy = "reject"
//! preflight_on_seal = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// How to settle a name that two sibling refined concepts implement
/// differently and that no higher-precedence source has already bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiamondPolicy {
    /// The earlier-declared refined concept wins.
    #[default]
    FirstDeclared,
    /// Fail the build with `AmbiguousOperation`.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    pub diamond_policy: DiamondPolicy,
    /// Resolve every registered map while sealing and fail on the first
    /// rejection. On by default; `false` defers each check to first use.
    pub preflight_on_seal: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            diamond_policy: DiamondPolicy::default(),
            preflight_on_seal: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid toml at {path}: {source}")]
    ParseToml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl ResolverConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse(text, "<inline>")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    fn parse(text: &str, path: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::ParseToml {
            path: path.to_string(),
            source,
        })
    }
}
