//! The two deployment environments and their probed status.
//!
//! # Data Flow
//! ```text
//! config (addresses, active side)
//!     → Environment + Upstream (validated identities/addresses)
//!     → store (Deployment snapshot + EnvironmentStatus records)
//!
//! health monitor
//!     → EnvironmentStatus (healthy / version / last_checked)
//! ```
//!
//! # Design Decisions
//! - Exactly two identities; the only transition is `other()`
//! - Labels are interchangeable, `blue` is the default-active side
//! - Status records are replaced whole, never field by field

pub mod upstream;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use upstream::{AddressError, Upstream};

/// Version label reported when a backend's version cannot be obtained.
pub const UNKNOWN_VERSION: &str = "unknown";

/// One of the two interchangeable deployment environments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Primary side, active by default.
    #[default]
    #[serde(alias = "primary")]
    Blue,
    /// Secondary side.
    #[serde(alias = "secondary")]
    Green,
}

impl Environment {
    /// Both environments, in a stable order.
    pub const ALL: [Environment; 2] = [Environment::Blue, Environment::Green];

    /// The environment that is not `self`.
    pub fn other(self) -> Self {
        match self {
            Environment::Blue => Environment::Green,
            Environment::Green => Environment::Blue,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Blue => "blue",
            Environment::Green => "green",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Environment::Blue => 0,
            Environment::Green => 1,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an environment name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown environment {0:?} (expected blue or green)")]
pub struct UnknownEnvironment(pub String);

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blue" | "primary" => Ok(Environment::Blue),
            "green" | "secondary" => Ok(Environment::Green),
            _ => Err(UnknownEnvironment(s.to_string())),
        }
    }
}

/// Last known probe result for one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentStatus {
    /// Health endpoint answered with a success status on the last probe.
    pub healthy: bool,
    /// Version label, or [`UNKNOWN_VERSION`].
    pub version: String,
    /// Start time of the last probe attempt, successful or not.
    pub last_checked: Option<DateTime<Utc>>,
}

impl EnvironmentStatus {
    /// Status of an environment that has never been probed.
    pub fn unprobed() -> Self {
        Self {
            healthy: false,
            version: UNKNOWN_VERSION.to_string(),
            last_checked: None,
        }
    }
}

impl Default for EnvironmentStatus {
    fn default() -> Self {
        Self::unprobed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_is_an_involution() {
        for env in Environment::ALL {
            assert_ne!(env.other(), env);
            assert_eq!(env.other().other(), env);
        }
    }

    #[test]
    fn test_parse_names_and_aliases() {
        assert_eq!("blue".parse::<Environment>().unwrap(), Environment::Blue);
        assert_eq!(" GREEN ".parse::<Environment>().unwrap(), Environment::Green);
        assert_eq!("primary".parse::<Environment>().unwrap(), Environment::Blue);
        assert_eq!("secondary".parse::<Environment>().unwrap(), Environment::Green);
        assert!("red".parse::<Environment>().is_err());
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Environment::Green).unwrap(), "\"green\"");
        let env: Environment = serde_json::from_str("\"secondary\"").unwrap();
        assert_eq!(env, Environment::Green);
    }

    #[test]
    fn test_unprobed_status() {
        let status = EnvironmentStatus::unprobed();
        assert!(!status.healthy);
        assert_eq!(status.version, UNKNOWN_VERSION);
        assert!(status.last_checked.is_none());
    }
}
