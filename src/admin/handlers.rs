use axum::{
    body::Bytes,
    extract::State,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Write as _;
use crate::config::schema::port_address;
use crate::environment::{Environment, Upstream};
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::store::EnvironmentView;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchRequest {
    /// Only switch if this environment is still the active one.
    pub expected_active: Option<Environment>,
}

#[derive(Debug, Serialize)]
pub struct SwitchResponse {
    pub status: &'static str,
    pub old: Environment,
    pub current: Environment,
}

#[derive(Debug, Serialize)]
pub struct EnvironmentsReport {
    pub blue: EnvironmentView,
    pub green: EnvironmentView,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub service_name: String,
    pub active: Environment,
    pub environments: EnvironmentsReport,
}

#[derive(Debug, Serialize)]
pub struct ConfigView {
    pub service_name: String,
    pub active: Environment,
    pub blue: String,
    pub green: String,
}

/// New addresses, either in full or as `blue_port`/`green_port` following
/// the `app-<port>:<port>` convention. A full address wins over a port.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default, alias = "primary")]
    pub blue: Option<String>,
    #[serde(default, alias = "secondary")]
    pub green: Option<String>,
    #[serde(default)]
    pub blue_port: Option<PortValue>,
    #[serde(default)]
    pub green_port: Option<PortValue>,
}

/// A port given as a JSON string or number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u64),
    Text(String),
}

impl PortValue {
    fn parse(&self) -> Option<u16> {
        match self {
            PortValue::Number(n) => u16::try_from(*n).ok(),
            PortValue::Text(t) => t.trim().parse().ok(),
        }
        .filter(|port| *port != 0)
    }
}

impl ConfigUpdate {
    fn upstream(&self, env: Environment) -> Result<Upstream, String> {
        let (address, port) = match env {
            Environment::Blue => (&self.blue, &self.blue_port),
            Environment::Green => (&self.green, &self.green_port),
        };
        let address = match (address, port) {
            (Some(address), _) => address.clone(),
            (None, Some(port)) => match port.parse() {
                Some(port) => port_address(&port.to_string()),
                None => return Err(format!("{} port: not a valid port", env)),
            },
            (None, None) => return Err(format!("{} address: missing", env)),
        };
        Upstream::parse(&address).map_err(|e| format!("{} address: {}", env, e))
    }
}

/// Plain-text overview at `/`.
pub async fn dashboard(State(state): State<AppState>) -> String {
    let snapshot = state.store.snapshot();
    let mut out = String::new();

    let _ = writeln!(out, "{} - blue-green deployment", state.service_name);
    let _ = writeln!(out, "active: {}", snapshot.active);
    for env in Environment::ALL {
        let view = snapshot.environment(env);
        let _ = writeln!(
            out,
            "{:<5} [{}] {}  {}  version {}  checked {}",
            env,
            if view.active { "ACTIVE " } else { "standby" },
            view.address,
            if view.status.healthy { "healthy" } else { "unhealthy" },
            view.status.version,
            view.status
                .last_checked
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
        );
    }
    out
}

/// `POST /api/switch`: promote the inactive environment.
pub async fn switch(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SwitchResponse>, ApiError> {
    let request: SwitchRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SwitchRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("invalid switch request: {}", e)))?
    };

    let outcome = match request.expected_active {
        Some(expected) => state.switch.promote_from(expected).await?,
        None => state.switch.switch().await?,
    };

    Ok(Json(SwitchResponse {
        status: "success",
        old: outcome.previous,
        current: outcome.current,
    }))
}

/// `GET /api/status`: active side plus both status records.
pub async fn get_status(State(state): State<AppState>) -> Json<StatusReport> {
    let snapshot = state.store.snapshot();
    Json(StatusReport {
        service_name: state.service_name.to_string(),
        active: snapshot.active,
        environments: EnvironmentsReport {
            blue: snapshot.blue,
            green: snapshot.green,
        },
    })
}

/// `GET /api/config`: current addresses.
pub async fn get_config(State(state): State<AppState>) -> Json<ConfigView> {
    let deployment = state.store.deployment();
    Json(ConfigView {
        service_name: state.service_name.to_string(),
        active: deployment.active,
        blue: deployment.blue.as_str().to_string(),
        green: deployment.green.as_str().to_string(),
    })
}

/// `POST /api/config`: replace both addresses, all or nothing.
pub async fn update_config(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let update: ConfigUpdate = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid configuration: {}", e)))?;

    let (blue, green) = match (
        update.upstream(Environment::Blue),
        update.upstream(Environment::Green),
    ) {
        (Ok(blue), Ok(green)) => (blue, green),
        (blue, green) => {
            let problems: Vec<String> = [blue.err(), green.err()].into_iter().flatten().collect();
            return Err(ApiError::bad_request(format!(
                "invalid configuration: {}",
                problems.join("; ")
            )));
        }
    };

    let deployment = state
        .store
        .update_addresses(blue, green)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to persist configuration update");
            ApiError::internal(e.to_string())
        })?;

    tracing::info!(blue = %deployment.blue, green = %deployment.green, "Environment addresses updated");

    Ok(Json(json!({
        "status": "success",
        "message": "Configuration updated",
    })))
}

/// `POST /api/deploy`: deployments happen outside this process.
pub async fn deploy() -> Json<Value> {
    Json(json!({
        "status": "success",
        "message": "No deployment hook configured: deploy to the inactive environment, then switch",
    }))
}
