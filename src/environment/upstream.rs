//! Validated backend addresses.

use axum::http::uri::Authority;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Errors produced while parsing a backend address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("invalid address {0:?}: {1}")]
    Invalid(String, String),

    #[error("unsupported scheme {scheme:?} in {address:?} (only http is forwarded)")]
    UnsupportedScheme { address: String, scheme: String },

    #[error("address {0:?} must not carry a path, query or credentials")]
    Extraneous(String),
}

/// A backend address the proxy forwards to and probes.
///
/// Accepts `host:port` or `http://host:port`; the original text is kept
/// for display and persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    raw: String,
    authority: Authority,
}

impl Upstream {
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(AddressError::Empty);
        }

        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{}", raw)
        };

        let url = Url::parse(&with_scheme)
            .map_err(|e| AddressError::Invalid(raw.to_string(), e.to_string()))?;

        if url.scheme() != "http" {
            return Err(AddressError::UnsupportedScheme {
                address: raw.to_string(),
                scheme: url.scheme().to_string(),
            });
        }
        if url.path() != "/" || url.query().is_some() || url.fragment().is_some()
            || !url.username().is_empty() || url.password().is_some()
        {
            return Err(AddressError::Extraneous(raw.to_string()));
        }

        let host = url
            .host_str()
            .ok_or_else(|| AddressError::Invalid(raw.to_string(), "missing host".into()))?;
        let authority_str = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let authority = Authority::from_str(&authority_str)
            .map_err(|e| AddressError::Invalid(raw.to_string(), e.to_string()))?;

        Ok(Self {
            raw: raw.to_string(),
            authority,
        })
    }

    /// Address as configured.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `host[:port]` used for the outbound URI and `Host` header.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Absolute URI for `path` on this backend.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("http://{}{}", self.authority, path)
        } else {
            format!("http://{}/{}", self.authority, path)
        }
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Upstream {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Upstream::parse(s)
    }
}

impl Serialize for Upstream {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Upstream {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Upstream::parse(&raw).map_err(serde::de::Error::custom)
    }
}
