//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Both environment addresses parse as forwardable upstreams
//! - Validate value ranges (interval and timeouts > 0)
//! - Probe timeouts fit inside one probe interval
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SwitchConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;
use crate::config::schema::SwitchConfig;
use crate::environment::{AddressError, Environment, Upstream};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Address { environment: Environment, error: AddressError },
    BindAddress(String),
    MetricsAddress(String),
    ZeroValue(&'static str),
    ProbeTimeoutTooLong { timeout_ms: u64, interval_secs: u64 },
    ProbePath(&'static str, String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Address { environment, error } => {
                write!(f, "{} address: {}", environment, error)
            }
            ValidationError::BindAddress(addr) => write!(f, "invalid listener.bind_address {:?}", addr),
            ValidationError::MetricsAddress(addr) => {
                write!(f, "invalid observability.metrics_address {:?}", addr)
            }
            ValidationError::ZeroValue(field) => write!(f, "{} must be greater than zero", field),
            ValidationError::ProbeTimeoutTooLong { timeout_ms, interval_secs } => write!(
                f,
                "probe timeout {}ms must be shorter than the {}s probe interval",
                timeout_ms, interval_secs
            ),
            ValidationError::ProbePath(field, path) => {
                write!(f, "{} {:?} must start with '/'", field, path)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &SwitchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for env in Environment::ALL {
        if let Err(error) = Upstream::parse(config.environments.address(env)) {
            errors.push(ValidationError::Address { environment: env, error });
        }
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    let health = &config.health_check;
    if health.interval_secs == 0 {
        errors.push(ValidationError::ZeroValue("health_check.interval_secs"));
    }
    if health.health_timeout_ms == 0 {
        errors.push(ValidationError::ZeroValue("health_check.health_timeout_ms"));
    }
    if health.version_timeout_ms == 0 {
        errors.push(ValidationError::ZeroValue("health_check.version_timeout_ms"));
    }
    if health.interval_secs > 0 {
        let longest = health.health_timeout_ms.max(health.version_timeout_ms);
        if longest >= health.interval_secs.saturating_mul(1000) {
            errors.push(ValidationError::ProbeTimeoutTooLong {
                timeout_ms: longest,
                interval_secs: health.interval_secs,
            });
        }
    }
    if !health.health_path.starts_with('/') {
        errors.push(ValidationError::ProbePath("health_check.health_path", health.health_path.clone()));
    }
    if !health.version_path.starts_with('/') {
        errors.push(ValidationError::ProbePath("health_check.version_path", health.version_path.clone()));
    }

    if config.proxy.upstream_timeout_secs == 0 {
        errors.push(ValidationError::ZeroValue("proxy.upstream_timeout_secs"));
    }
    if config.proxy.connect_timeout_ms == 0 {
        errors.push(ValidationError::ZeroValue("proxy.connect_timeout_ms"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&SwitchConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = SwitchConfig::default();
        config.environments.blue = String::new();
        config.environments.green = "https://green:443".into();
        config.listener.bind_address = "not-an-addr".into();
        config.proxy.upstream_timeout_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4, "{:?}", errors);
        assert!(errors.contains(&ValidationError::Address {
            environment: Environment::Blue,
            error: AddressError::Empty,
        }));
        assert!(errors.contains(&ValidationError::ZeroValue("proxy.upstream_timeout_secs")));
    }

    #[test]
    fn test_probe_timeout_must_fit_in_interval() {
        let mut config = SwitchConfig::default();
        config.health_check.interval_secs = 2;
        config.health_check.health_timeout_ms = 2000;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::ProbeTimeoutTooLong { timeout_ms: 2000, interval_secs: 2 }]
        );
    }

    #[test]
    fn test_metrics_address_only_checked_when_enabled() {
        let mut config = SwitchConfig::default();
        config.observability.metrics_address = "nope".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
