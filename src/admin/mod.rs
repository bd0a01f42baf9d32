pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use crate::http::server::AppState;
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Administrative paths. They are answered here (405 on a wrong method)
/// and never reach the traffic router.
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard))
        .route("/api/switch", post(switch))
        .route("/api/status", get(get_status))
        .route("/api/config", get(get_config).post(update_config))
        .route("/api/deploy", post(deploy))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
