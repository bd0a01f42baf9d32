//! Switch controller: promote the inactive environment.
//!
//! # State Machine
//! ```text
//! ActiveBlue ──promote (green healthy)──▶ ActiveGreen
//! ActiveGreen ──promote (blue healthy)──▶ ActiveBlue
//! ```
//!
//! # Design Decisions
//! - Health of the target is read first, the commit is a CAS on the side
//!   that was observed active; a lost race is reported, never retried
//! - No automatic switch-back when the active side degrades; demotion is
//!   always an operator action
//! - Persistence happens inside the store's commit, before success returns

use std::sync::Arc;
use serde::Serialize;
use thiserror::Error;

use crate::config::PersistError;
use crate::environment::Environment;
use crate::observability::metrics;
use crate::store::DescriptorStore;

/// Reasons a switch is refused.
#[derive(Debug, Error)]
pub enum SwitchError {
    /// The environment that would receive traffic is not healthy.
    #[error("target environment {target} is not healthy")]
    TargetUnhealthy { target: Environment },

    /// The active environment changed before the commit.
    #[error("active environment is no longer {expected}; re-check state and retry")]
    ConcurrentModification { expected: Environment },

    /// The new state could not be made durable; nothing changed.
    #[error("switch not committed: {0}")]
    Persistence(#[from] PersistError),
}

impl SwitchError {
    fn outcome(&self) -> &'static str {
        match self {
            SwitchError::TargetUnhealthy { .. } => "target_unhealthy",
            SwitchError::ConcurrentModification { .. } => "concurrent_modification",
            SwitchError::Persistence(_) => "persistence_error",
        }
    }
}

/// A committed switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SwitchOutcome {
    pub previous: Environment,
    pub current: Environment,
}

/// Owns the only state transition of the system.
#[derive(Debug, Clone)]
pub struct SwitchController {
    store: Arc<DescriptorStore>,
}

impl SwitchController {
    pub fn new(store: Arc<DescriptorStore>) -> Self {
        Self { store }
    }

    /// Promote whichever environment is currently inactive.
    pub async fn switch(&self) -> Result<SwitchOutcome, SwitchError> {
        let current = self.store.active();
        self.promote_from(current).await
    }

    /// Promote the other side of `expected`, provided `expected` is still
    /// the active environment when the commit happens.
    pub async fn promote_from(&self, expected: Environment) -> Result<SwitchOutcome, SwitchError> {
        let result = self.try_promote(expected).await;

        match &result {
            Ok(outcome) => {
                tracing::info!(from = %outcome.previous, to = %outcome.current, "Switched active environment");
                metrics::record_switch("success");
                metrics::record_active(outcome.current);
            }
            Err(e) => {
                tracing::warn!(expected = %expected, error = %e, "Switch refused");
                metrics::record_switch(e.outcome());
            }
        }

        result
    }

    async fn try_promote(&self, expected: Environment) -> Result<SwitchOutcome, SwitchError> {
        let target = expected.other();

        if !self.store.status(target).healthy {
            return Err(SwitchError::TargetUnhealthy { target });
        }

        if self.store.try_switch_active(expected, target).await? {
            Ok(SwitchOutcome {
                previous: expected,
                current: target,
            })
        } else {
            Err(SwitchError::ConcurrentModification { expected })
        }
    }
}
