//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, or defaults)
//!     → loader.rs (BLUE_PORT / GREEN_ADDRESS / ... overrides)
//!     → validation.rs (semantic checks)
//!     → SwitchConfig (validated)
//!     → store seeded from `environments`
//!
//! On switch or address update:
//!     store commit path
//!     → persist.rs (merge deployment into config, write tmp, rename)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - The file doubles as the durable record of the active environment

pub mod loader;
pub mod persist;
pub mod schema;
pub mod validation;

pub use schema::SwitchConfig;
pub use schema::ListenerConfig;
pub use schema::EnvironmentsConfig;
pub use schema::HealthCheckConfig;
pub use schema::ProxySettings;
pub use schema::ObservabilityConfig;
pub use schema::AdminConfig;
pub use schema::LogFormat;
pub use loader::{load_config, read_config, ConfigError, ConfigSource};
pub use persist::{ConfigPersister, PersistError, Persistence};
