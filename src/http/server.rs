//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with administrative routes and the proxy fallback
//! - Wire up middleware (request ID, tracing)
//! - Bind server to listener
//! - Run the health monitor alongside the server
//! - Graceful shutdown of both

use axum::{
    body::Body,
    http::Request,
    Router,
};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin;
use crate::config::{AdminConfig, Persistence, SwitchConfig};
use crate::environment::AddressError;
use crate::health::HealthMonitor;
use crate::http::proxy::proxy_handler;
use crate::http::request::{request_id, UuidRequestId, X_REQUEST_ID};
use crate::lifecycle::shutdown::signalled;
use crate::observability::metrics;
use crate::store::DescriptorStore;
use crate::switch::SwitchController;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DescriptorStore>,
    pub switch: SwitchController,
    pub client: Client<HttpConnector, Body>,
    pub upstream_timeout: Duration,
    pub service_name: Arc<str>,
    pub admin: Arc<AdminConfig>,
}

impl AppState {
    pub fn new(config: &SwitchConfig, store: Arc<DescriptorStore>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_millis(config.proxy.connect_timeout_ms)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            switch: SwitchController::new(store.clone()),
            store,
            client,
            upstream_timeout: Duration::from_secs(config.proxy.upstream_timeout_secs),
            service_name: Arc::from(config.service_name.as_str()),
            admin: Arc::new(config.admin.clone()),
        }
    }
}

/// HTTP server for the blue-green switch.
pub struct HttpServer {
    router: Router,
    config: SwitchConfig,
    store: Arc<DescriptorStore>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: SwitchConfig, persistence: Persistence) -> Result<Self, AddressError> {
        let store = Arc::new(DescriptorStore::from_config(&config, persistence)?);
        Ok(Self::with_store(config, store))
    }

    /// Create a server around an existing store.
    pub fn with_store(config: SwitchConfig, store: Arc<DescriptorStore>) -> Self {
        let state = AppState::new(&config, store.clone());
        let router = build_router(state);
        metrics::record_active(store.active());

        Self {
            router,
            config,
            store,
        }
    }

    pub fn store(&self) -> Arc<DescriptorStore> {
        self.store.clone()
    }

    /// The fully layered router, for serving or for in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &SwitchConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires, probing both
    /// environments in the background.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let active = self.store.active();
        tracing::info!(
            address = %addr,
            service = %self.config.service_name,
            active = %active,
            upstream = %self.store.deployment().active_upstream(),
            "HTTP server starting"
        );

        let monitor = HealthMonitor::new(self.store.clone(), &self.config.health_check);
        let monitor_task = tokio::spawn(monitor.run(shutdown.resubscribe()));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(signalled(shutdown))
            .await;

        // The monitor saw the same signal; this only matters if serving failed.
        monitor_task.abort();

        served?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Administrative routes, the proxy fallback and the middleware stack.
pub fn build_router(state: AppState) -> Router {
    admin::routes(state.clone())
        .fallback(proxy_handler)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id(request.headers()),
                    )
                }))
                .layer(PropagateRequestIdLayer::new(X_REQUEST_ID)),
        )
}
