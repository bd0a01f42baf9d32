//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe both environments
//! - Replace each environment's status record with the result
//! - Log health and version transitions
//!
//! # Design Decisions
//! - Each environment is probed in its own task; one stalled backend never
//!   delays the other or the ticker
//! - A cycle still running at the next tick is abandoned, not awaited;
//!   an environment whose probe was abandoned is recorded unhealthy
//! - Addresses are read from the store at the start of every cycle, and a
//!   result for an address that changed meanwhile is dropped

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::environment::{Environment, EnvironmentStatus, Upstream, UNKNOWN_VERSION};
use crate::health::probe::{ProbeSettings, Prober};
use crate::observability::metrics;
use crate::store::DescriptorStore;

/// A probe task of the current cycle.
struct PendingProbe {
    env: Environment,
    upstream: Upstream,
    started: DateTime<Utc>,
    handle: AbortHandle,
}

pub struct HealthMonitor {
    store: Arc<DescriptorStore>,
    prober: Prober,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(store: Arc<DescriptorStore>, config: &HealthCheckConfig) -> Self {
        Self {
            store,
            prober: Prober::new(ProbeSettings::from(config)),
            interval: Duration::from_secs(config.interval_secs),
        }
    }

    /// Override the probe interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Probe on every tick until shutdown is signalled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval = ?self.interval,
            health_path = %self.prober.settings().health_path,
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight = JoinSet::new();
        let mut cycle: Vec<PendingProbe> = Vec::with_capacity(Environment::ALL.len());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    abandon_unfinished(&self.store, &mut cycle);

                    let deployment = self.store.deployment();
                    for env in Environment::ALL {
                        let upstream = deployment.upstream(env).clone();
                        let store = self.store.clone();
                        let prober = self.prober.clone();
                        let probed = upstream.clone();
                        let handle = in_flight.spawn(async move {
                            check_environment(&store, &prober, env, &probed).await;
                        });
                        cycle.push(PendingProbe { env, upstream, started: Utc::now(), handle });
                    }
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(error = %e, "Probe task panicked");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    in_flight.abort_all();
                    break;
                }
            }
        }
    }

    /// Run one probe cycle for both environments and wait for it.
    pub async fn check_all(&self) {
        let deployment = self.store.deployment();
        tokio::join!(
            check_environment(&self.store, &self.prober, Environment::Blue, &deployment.blue),
            check_environment(&self.store, &self.prober, Environment::Green, &deployment.green),
        );
    }
}

async fn check_environment(
    store: &DescriptorStore,
    prober: &Prober,
    env: Environment,
    upstream: &Upstream,
) {
    let start = Instant::now();
    let status = prober.probe(upstream).await;
    let previous = store.status(env);

    if status.healthy != previous.healthy {
        if status.healthy {
            tracing::info!(environment = %env, address = %upstream, version = %status.version, "Environment became healthy");
        } else {
            tracing::warn!(environment = %env, address = %upstream, "Environment became unhealthy");
        }
    }
    if status.version != previous.version {
        tracing::info!(
            environment = %env,
            from = %previous.version,
            to = %status.version,
            "Environment version changed"
        );
    }

    let healthy = status.healthy;
    if store.record_probe(env, upstream, status) {
        metrics::record_environment_health(env, healthy, start);
    } else {
        tracing::debug!(environment = %env, address = %upstream, "Address changed during probe, result dropped");
    }
}

/// Abort probes of the previous cycle that are still running and record
/// their environments as unhealthy.
fn abandon_unfinished(store: &DescriptorStore, cycle: &mut Vec<PendingProbe>) {
    for pending in cycle.drain(..) {
        if pending.handle.is_finished() {
            continue;
        }
        pending.handle.abort();
        tracing::warn!(
            environment = %pending.env,
            address = %pending.upstream,
            "Probe still running at next tick, abandoning it"
        );

        let status = EnvironmentStatus {
            healthy: false,
            version: UNKNOWN_VERSION.to_string(),
            last_checked: Some(pending.started),
        };
        if store.record_probe(pending.env, &pending.upstream, status) {
            metrics::record_probe_abandoned(pending.env);
        }
    }
}
