//! Health and version probes against one environment.
//!
//! # Responsibilities
//! - Issue the health request (healthy iff a success status arrives in time)
//! - Issue the version request (`{"version": "..."}`, else `"unknown"`)
//! - Stamp the result with the probe start time
//!
//! # Design Decisions
//! - Both requests run concurrently, each under its own timeout
//! - Failures are typed internally and absorbed into the status record;
//!   nothing here returns an error to the caller
//! - A version failure never changes the health verdict

use std::time::Duration;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use chrono::Utc;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::environment::{EnvironmentStatus, Upstream, UNKNOWN_VERSION};

/// Upper bound on a version response body.
const MAX_VERSION_BODY: usize = 64 * 1024;

const USER_AGENT: &str = "bluegreen-proxy-health-check";

/// Why a single probe request did not produce a usable answer.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    #[error("failed to build request: {0}")]
    Build(#[from] axum::http::Error),

    #[error("connection error: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("non-success status {0}")]
    Status(StatusCode),

    #[error("failed to read body: {0}")]
    Body(#[from] axum::Error),

    #[error("malformed version body: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("empty version label")]
    EmptyVersion,
}

#[derive(Deserialize)]
struct VersionBody {
    version: String,
}

/// Timeouts and paths used by the probes.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub health_path: String,
    pub version_path: String,
    pub health_timeout: Duration,
    pub version_timeout: Duration,
}

impl From<&HealthCheckConfig> for ProbeSettings {
    fn from(config: &HealthCheckConfig) -> Self {
        Self {
            health_path: config.health_path.clone(),
            version_path: config.version_path.clone(),
            health_timeout: Duration::from_millis(config.health_timeout_ms),
            version_timeout: Duration::from_millis(config.version_timeout_ms),
        }
    }
}

/// Issues probes; cheap to clone and share across probe tasks.
#[derive(Clone)]
pub struct Prober {
    client: Client<HttpConnector, Body>,
    settings: ProbeSettings,
}

impl Prober {
    pub fn new(settings: ProbeSettings) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(settings.health_timeout.max(settings.version_timeout)));

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .build(connector);

        Self { client, settings }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Probe `upstream` once. Never fails: problems degrade the result to
    /// `healthy=false` and/or `version="unknown"`.
    pub async fn probe(&self, upstream: &Upstream) -> EnvironmentStatus {
        let started = Utc::now();

        let (health, version) = tokio::join!(
            self.check_health(upstream),
            self.fetch_version(upstream),
        );

        let healthy = match health {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(address = %upstream, error = %e, "Health probe failed");
                false
            }
        };
        let version = match version {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(address = %upstream, error = %e, "Version probe failed");
                UNKNOWN_VERSION.to_string()
            }
        };

        EnvironmentStatus {
            healthy,
            version,
            last_checked: Some(started),
        }
    }

    async fn check_health(&self, upstream: &Upstream) -> Result<(), ProbeFailure> {
        let timeout = self.settings.health_timeout;
        let request = build_request(upstream, &self.settings.health_path)?;

        let response = time::timeout(timeout, self.client.request(request))
            .await
            .map_err(|_| ProbeFailure::Timeout(timeout))??;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProbeFailure::Status(response.status()))
        }
    }

    async fn fetch_version(&self, upstream: &Upstream) -> Result<String, ProbeFailure> {
        let timeout = self.settings.version_timeout;
        let request = build_request(upstream, &self.settings.version_path)?;

        let fetch = async {
            let response = self.client.request(request).await?;
            if !response.status().is_success() {
                return Err(ProbeFailure::Status(response.status()));
            }
            let body = axum::body::to_bytes(Body::new(response.into_body()), MAX_VERSION_BODY).await?;
            let parsed: VersionBody = serde_json::from_slice(&body)?;
            Ok::<_, ProbeFailure>(parsed.version)
        };

        let version = time::timeout(timeout, fetch)
            .await
            .map_err(|_| ProbeFailure::Timeout(timeout))??;

        let version = version.trim();
        if version.is_empty() {
            Err(ProbeFailure::EmptyVersion)
        } else {
            Ok(version.to_string())
        }
    }
}

fn build_request(upstream: &Upstream, path: &str) -> Result<Request<Body>, ProbeFailure> {
    Ok(Request::builder()
        .method(Method::GET)
        .uri(upstream.url_for(path))
        .header(header::USER_AGENT, USER_AGENT)
        .body(Body::empty())?)
}
