//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe each environment (probe.rs)
//!     → Replace its status record in the store
//!
//! Probes (probe.rs):
//!     GET health path  → healthy iff success status within timeout
//!     GET version path → {"version": "..."} or "unknown"
//! ```
//!
//! # Design Decisions
//! - A single probe decides health; there is no hysteresis, so a switch
//!   is only ever validated against the latest observation
//! - Probe failures never leave this module as errors
//! - Health state is per-environment, independent of which side is active

pub mod active;
pub mod probe;

pub use active::HealthMonitor;
pub use probe::{ProbeFailure, ProbeSettings, Prober};
