//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the switch.
//! All types derive Serde traits for (de)serialization to the TOML file,
//! which is also the file rewritten after every switch or address update.

use serde::{Deserialize, Serialize};
use crate::environment::Environment;

/// Root configuration for the blue-green traffic switch.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SwitchConfig {
    /// Human-readable name of the service behind the switch.
    pub service_name: String,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Backend addresses and the active side.
    pub environments: EnvironmentsConfig,

    /// Health/version probe settings.
    pub health_check: HealthCheckConfig,

    /// Forwarding settings.
    pub proxy: ProxySettings,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Administrative API settings.
    pub admin: AdminConfig,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            service_name: "Frontend Application".to_string(),
            listener: ListenerConfig::default(),
            environments: EnvironmentsConfig::default(),
            health_check: HealthCheckConfig::default(),
            proxy: ProxySettings::default(),
            observability: ObservabilityConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// The two environments and which one receives traffic.
///
/// Addresses are kept as text here; they are parsed into
/// [`Upstream`](crate::environment::Upstream) by validation and the store.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvironmentsConfig {
    /// Environment currently receiving traffic.
    pub active: Environment,

    /// Address of the blue (primary) environment.
    pub blue: String,

    /// Address of the green (secondary) environment.
    pub green: String,
}

impl EnvironmentsConfig {
    pub fn address(&self, env: Environment) -> &str {
        match env {
            Environment::Blue => &self.blue,
            Environment::Green => &self.green,
        }
    }

    pub fn address_mut(&mut self, env: Environment) -> &mut String {
        match env {
            Environment::Blue => &mut self.blue,
            Environment::Green => &mut self.green,
        }
    }
}

impl Default for EnvironmentsConfig {
    fn default() -> Self {
        Self {
            active: Environment::Blue,
            blue: port_address("5176"),
            green: port_address("5177"),
        }
    }
}

/// Address convention for environments configured by port only:
/// each environment runs as host `app-<port>` listening on `<port>`.
pub fn port_address(port: &str) -> String {
    format!("app-{}:{}", port, port)
}

/// Health check configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Probe interval in seconds.
    pub interval_secs: u64,

    /// Timeout of the health request in milliseconds.
    pub health_timeout_ms: u64,

    /// Timeout of the version request in milliseconds.
    pub version_timeout_ms: u64,

    /// Path answering with a success status when the backend is ready.
    pub health_path: String,

    /// Path answering with `{"version": "..."}`.
    pub version_path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            health_timeout_ms: 3000,
            version_timeout_ms: 2000,
            health_path: "/health".to_string(),
            version_path: "/version".to_string(),
        }
    }
}

/// Forwarding configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Time allowed for the upstream to answer with response headers.
    pub upstream_timeout_secs: u64,

    /// TCP connect timeout towards an upstream, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            upstream_timeout_secs: 30,
            connect_timeout_ms: 2000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Administrative API configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer token required by mutating endpoints. Open when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}
