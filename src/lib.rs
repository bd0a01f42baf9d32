//! Blue-green traffic switch.
//!
//! Keeps two deployments of one service side by side, probes both, routes
//! all traffic to the active one and promotes the other on request once it
//! is healthy.

// Core state
pub mod environment;
pub mod store;
pub mod switch;

// Traffic and administration
pub mod admin;
pub mod http;

// Background work
pub mod health;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::schema::SwitchConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use store::DescriptorStore;
pub use switch::SwitchController;
