//! Configuration loading from disk and the process environment.

use std::path::Path;
use std::fs;
use crate::config::schema::{port_address, SwitchConfig};
use crate::config::validation::{validate_config, ValidationError};
use crate::environment::{Environment, UnknownEnvironment};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { var: &'static str, error: UnknownEnvironment },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { var, error } => write!(f, "Invalid {}: {}", var, error),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load configuration from a TOML file, apply process environment
/// overrides and validate the result.
///
/// A missing file is not an error: the built-in defaults are used and the
/// file is created on the first switch or address update.
pub fn load_config(path: &Path) -> Result<SwitchConfig, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// [`load_config`] with an explicit variable lookup.
pub fn load_config_with<F>(path: &Path, lookup: F) -> Result<SwitchConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    read_config(path, lookup).map(|(config, _)| config)
}

/// Where the loaded configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    File,
    /// The file did not exist; built-in defaults were used.
    Defaults,
}

/// Load like [`load_config_with`] and also report whether the file existed.
///
/// Nothing is logged here: this runs before the subscriber is installed.
pub fn read_config<F>(path: &Path, lookup: F) -> Result<(SwitchConfig, ConfigSource), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let (mut config, source) = match fs::read_to_string(path) {
        Ok(content) => (toml::from_str(&content).map_err(ConfigError::Parse)?, ConfigSource::File),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            (SwitchConfig::default(), ConfigSource::Defaults)
        }
        Err(e) => return Err(ConfigError::Io(e)),
    };

    apply_env_overrides(&mut config, lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok((config, source))
}

/// Apply `BLUE_PORT`, `GREEN_PORT`, `BLUE_ADDRESS`, `GREEN_ADDRESS`,
/// `PROXY_PORT`, `SERVICE_NAME` and `ACTIVE_ENV`.
///
/// Explicit addresses win over the port shorthand. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut SwitchConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    for (env, port_var, addr_var) in [
        (Environment::Blue, "BLUE_PORT", "BLUE_ADDRESS"),
        (Environment::Green, "GREEN_PORT", "GREEN_ADDRESS"),
    ] {
        if let Some(port) = get(port_var) {
            *config.environments.address_mut(env) = port_address(port.trim());
        }
        if let Some(addr) = get(addr_var) {
            *config.environments.address_mut(env) = addr.trim().to_string();
        }
    }

    if let Some(port) = get("PROXY_PORT") {
        config.listener.bind_address = format!("0.0.0.0:{}", port.trim());
    }
    if let Some(name) = get("SERVICE_NAME") {
        config.service_name = name;
    }
    if let Some(active) = get("ACTIVE_ENV") {
        config.environments.active = active
            .parse()
            .map_err(|error| ConfigError::Env { var: "ACTIVE_ENV", error })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("bluegreen-{}-{}.toml", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config_with(&temp_path("missing"), vars(&[])).unwrap();
        assert_eq!(config, SwitchConfig::default());
    }

    #[test]
    fn test_source_reports_whether_file_existed() {
        let path = temp_path("source");
        let (_, source) = read_config(&path, vars(&[])).unwrap();
        assert_eq!(source, ConfigSource::Defaults);

        fs::write(&path, "service_name = \"checkout\"\n").unwrap();
        let (config, source) = read_config(&path, vars(&[])).unwrap();
        assert_eq!(source, ConfigSource::File);
        assert_eq!(config.service_name, "checkout");

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_port_overrides_follow_host_convention() {
        let config = load_config_with(
            &temp_path("ports"),
            vars(&[("BLUE_PORT", "6000"), ("GREEN_PORT", "6001"), ("PROXY_PORT", "9999")]),
        )
        .unwrap();

        assert_eq!(config.environments.blue, "app-6000:6000");
        assert_eq!(config.environments.green, "app-6001:6001");
        assert_eq!(config.listener.bind_address, "0.0.0.0:9999");
    }

    #[test]
    fn test_explicit_address_wins_over_port() {
        let config = load_config_with(
            &temp_path("addr"),
            vars(&[("GREEN_PORT", "6001"), ("GREEN_ADDRESS", "http://10.1.1.1:80"), ("SERVICE_NAME", "shop")]),
        )
        .unwrap();

        assert_eq!(config.environments.green, "http://10.1.1.1:80");
        assert_eq!(config.service_name, "shop");
    }

    #[test]
    fn test_file_values_then_env_override() {
        let path = temp_path("file");
        fs::write(
            &path,
            "[environments]\nactive = \"green\"\nblue = \"10.0.0.1:80\"\n",
        )
        .unwrap();

        let config = load_config_with(&path, vars(&[("ACTIVE_ENV", "blue")])).unwrap();
        assert_eq!(config.environments.active, Environment::Blue);
        assert_eq!(config.environments.blue, "10.0.0.1:80");

        let config = load_config_with(&path, vars(&[])).unwrap();
        assert_eq!(config.environments.active, Environment::Green);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_bad_active_env_is_rejected() {
        let err = load_config_with(&temp_path("bad"), vars(&[("ACTIVE_ENV", "purple")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "ACTIVE_ENV", .. }));
    }

    #[test]
    fn test_unparsable_file_is_an_error() {
        let path = temp_path("garbage");
        fs::write(&path, "this is = = not toml").unwrap();

        let err = load_config_with(&path, vars(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_invalid_override_fails_validation() {
        let err = load_config_with(&temp_path("invalid"), vars(&[("BLUE_ADDRESS", "ftp://x:1")])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
    }
}
