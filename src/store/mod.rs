//! Environment descriptor store.
//!
//! # Data Flow
//! ```text
//! traffic router ──load──▶ ArcSwap<Deployment> ◀──CAS + persist── switch controller
//!                                   ▲                                       │
//!                                   └──────── update_addresses ◀── admin API │
//!                                                                           ▼
//! health monitor ──set_status──▶ ArcSwap<EnvironmentStatus> x2 ──status──▶ (reads target)
//! ```
//!
//! # Design Decisions
//! - Readers never lock: a request loads one immutable `Deployment` snapshot
//! - Every writer of the deployment holds `commit_lock`, which makes the
//!   compare-and-set real and serializes writes to the persisted file
//! - Persist first, publish second: a reported success is always on disk,
//!   and a failed write leaves the published state untouched
//! - Status records are independent of each other and remember the address
//!   they were measured at; a record for an old address reads as never probed

use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::{PersistError, Persistence, SwitchConfig};
use crate::environment::{AddressError, Environment, EnvironmentStatus, Upstream};

/// Which environment is active and where both environments live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub active: Environment,
    pub blue: Upstream,
    pub green: Upstream,
}

impl Deployment {
    /// Build from the `[environments]` section.
    pub fn from_config(config: &SwitchConfig) -> Result<Self, AddressError> {
        Ok(Self {
            active: config.environments.active,
            blue: Upstream::parse(&config.environments.blue)?,
            green: Upstream::parse(&config.environments.green)?,
        })
    }

    pub fn upstream(&self, env: Environment) -> &Upstream {
        match env {
            Environment::Blue => &self.blue,
            Environment::Green => &self.green,
        }
    }

    /// Address of the environment currently receiving traffic.
    pub fn active_upstream(&self) -> &Upstream {
        self.upstream(self.active)
    }
}

/// Point-in-time view of one environment, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentView {
    pub address: String,
    pub active: bool,
    #[serde(flatten)]
    pub status: EnvironmentStatus,
}

/// Point-in-time view of the whole store, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct StoreSnapshot {
    pub active: Environment,
    pub blue: EnvironmentView,
    pub green: EnvironmentView,
}

impl StoreSnapshot {
    pub fn environment(&self, env: Environment) -> &EnvironmentView {
        match env {
            Environment::Blue => &self.blue,
            Environment::Green => &self.green,
        }
    }
}

/// A status record and the address it was measured at.
struct ProbeRecord {
    address: Upstream,
    status: EnvironmentStatus,
}

impl ProbeRecord {
    fn unprobed(address: &Upstream) -> Arc<Self> {
        Arc::new(Self {
            address: address.clone(),
            status: EnvironmentStatus::unprobed(),
        })
    }
}

/// Shared state of the switch: the deployment and both status records.
pub struct DescriptorStore {
    deployment: ArcSwap<Deployment>,
    status: [ArcSwap<ProbeRecord>; 2],
    commit_lock: Mutex<()>,
    persistence: Persistence,
}

impl DescriptorStore {
    pub fn new(deployment: Deployment, persistence: Persistence) -> Self {
        Self {
            status: [
                ArcSwap::new(ProbeRecord::unprobed(&deployment.blue)),
                ArcSwap::new(ProbeRecord::unprobed(&deployment.green)),
            ],
            deployment: ArcSwap::from_pointee(deployment),
            commit_lock: Mutex::new(()),
            persistence,
        }
    }

    pub fn from_config(config: &SwitchConfig, persistence: Persistence) -> Result<Self, AddressError> {
        Ok(Self::new(Deployment::from_config(config)?, persistence))
    }

    /// Environment currently receiving traffic.
    pub fn active(&self) -> Environment {
        self.deployment.load().active
    }

    /// Current deployment snapshot. Stays valid and unchanged for as long as
    /// the caller holds it, whatever commits afterwards.
    pub fn deployment(&self) -> Arc<Deployment> {
        self.deployment.load_full()
    }

    /// Last recorded status of `env` at its current address. A record taken
    /// at an address the environment no longer has reads as never probed.
    pub fn status(&self, env: Environment) -> EnvironmentStatus {
        self.status_at(&self.deployment.load(), env)
    }

    fn status_at(&self, deployment: &Deployment, env: Environment) -> EnvironmentStatus {
        let record = self.status[env.index()].load();
        if record.address == *deployment.upstream(env) {
            record.status.clone()
        } else {
            EnvironmentStatus::unprobed()
        }
    }

    /// Replace the whole status record of `env`, for its current address.
    pub fn set_status(&self, env: Environment, status: EnvironmentStatus) {
        let address = self.deployment.load().upstream(env).clone();
        self.status[env.index()].store(Arc::new(ProbeRecord { address, status }));
    }

    /// Record a probe of `env` taken at `address`.
    ///
    /// Returns `false` and records nothing when `env` has moved to another
    /// address since the probe started.
    pub fn record_probe(&self, env: Environment, address: &Upstream, status: EnvironmentStatus) -> bool {
        if self.deployment.load().upstream(env) != address {
            return false;
        }
        self.status[env.index()].store(Arc::new(ProbeRecord {
            address: address.clone(),
            status,
        }));
        true
    }

    /// Make `new_active` active if `expected` is still active.
    ///
    /// Returns `Ok(false)` without touching anything when another commit got
    /// there first. The new state is persisted before it is published.
    pub async fn try_switch_active(
        &self,
        expected: Environment,
        new_active: Environment,
    ) -> Result<bool, PersistError> {
        let _guard = self.commit_lock.lock().await;

        let current = self.deployment.load_full();
        if current.active != expected {
            return Ok(false);
        }
        if current.active == new_active {
            return Ok(true);
        }

        let next = Deployment {
            active: new_active,
            ..Deployment::clone(&current)
        };
        self.persistence.persist(&next).await?;
        self.deployment.store(Arc::new(next));
        Ok(true)
    }

    /// Replace both addresses together, keeping the active side. Status of
    /// every environment whose address changed resets to never probed.
    pub async fn update_addresses(
        &self,
        blue: Upstream,
        green: Upstream,
    ) -> Result<Arc<Deployment>, PersistError> {
        let _guard = self.commit_lock.lock().await;

        let current = self.deployment.load_full();
        let next = Arc::new(Deployment {
            active: current.active,
            blue,
            green,
        });
        self.persistence.persist(&next).await?;
        self.deployment.store(next.clone());

        // A moved environment must be probed again before it counts as healthy.
        for env in Environment::ALL {
            if current.upstream(env) != next.upstream(env) {
                self.status[env.index()].store(ProbeRecord::unprobed(next.upstream(env)));
            }
        }
        Ok(next)
    }

    /// Consistent report of the deployment and both statuses.
    pub fn snapshot(&self) -> StoreSnapshot {
        let deployment = self.deployment();
        let view = |env: Environment| EnvironmentView {
            address: deployment.upstream(env).as_str().to_string(),
            active: deployment.active == env,
            status: self.status_at(&deployment, env),
        };
        StoreSnapshot {
            active: deployment.active,
            blue: view(Environment::Blue),
            green: view(Environment::Green),
        }
    }
}

impl std::fmt::Debug for DescriptorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorStore")
            .field("deployment", &self.deployment())
            .field("persistence", &self.persistence)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn store() -> DescriptorStore {
        DescriptorStore::from_config(&SwitchConfig::default(), Persistence::Disabled).unwrap()
    }

    fn healthy(version: &str) -> EnvironmentStatus {
        EnvironmentStatus {
            healthy: true,
            version: version.to_string(),
            last_checked: Some(Utc::now()),
        }
    }

    #[test]
    fn test_starts_with_configured_active_and_unprobed_status() {
        let store = store();
        assert_eq!(store.active(), Environment::Blue);
        for env in Environment::ALL {
            assert_eq!(store.status(env), EnvironmentStatus::unprobed());
        }
    }

    #[test]
    fn test_set_status_only_touches_one_record() {
        let store = store();
        store.set_status(Environment::Green, healthy("2.0.0"));

        assert_eq!(store.status(Environment::Green).version, "2.0.0");
        assert_eq!(store.status(Environment::Blue), EnvironmentStatus::unprobed());
        assert_eq!(store.active(), Environment::Blue);
    }

    #[tokio::test]
    async fn test_cas_fails_on_stale_expectation() {
        let store = store();
        assert!(!store.try_switch_active(Environment::Green, Environment::Blue).await.unwrap());
        assert_eq!(store.active(), Environment::Blue);

        assert!(store.try_switch_active(Environment::Blue, Environment::Green).await.unwrap());
        assert_eq!(store.active(), Environment::Green);

        assert!(!store.try_switch_active(Environment::Blue, Environment::Green).await.unwrap());
        assert_eq!(store.active(), Environment::Green);
    }

    #[tokio::test]
    async fn test_concurrent_cas_from_same_value_has_one_winner() {
        let store = Arc::new(store());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.try_switch_active(Environment::Blue, Environment::Green).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.active(), Environment::Green);
    }

    #[tokio::test]
    async fn test_interleaved_switches_serialize() {
        let store = Arc::new(store());

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            let expected = if i % 2 == 0 { Environment::Blue } else { Environment::Green };
            handles.push(tokio::spawn(async move {
                store.try_switch_active(expected, expected.other()).await.unwrap()
            }));
        }

        let mut active = Environment::Blue;
        let mut committed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                committed += 1;
            }
        }
        // Every successful CAS flips the side exactly once.
        if committed % 2 == 1 {
            active = active.other();
        }
        assert_eq!(store.active(), active);
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_state_unchanged() {
        let path = std::env::temp_dir()
            .join(format!("bluegreen-nodir-{}", uuid::Uuid::new_v4()))
            .join("state.toml");
        let config = SwitchConfig::default();
        let store = DescriptorStore::from_config(&config, Persistence::file(path, config.clone())).unwrap();

        let result = store.try_switch_active(Environment::Blue, Environment::Green).await;
        assert!(result.is_err());
        assert_eq!(store.active(), Environment::Blue);

        let result = store
            .update_addresses(
                Upstream::parse("a:1").unwrap(),
                Upstream::parse("b:2").unwrap(),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(store.deployment().blue.as_str(), "app-5176:5176");
    }

    #[tokio::test]
    async fn test_switch_is_written_through() {
        let path = std::env::temp_dir().join(format!("bluegreen-store-{}.toml", uuid::Uuid::new_v4()));
        let config = SwitchConfig::default();
        let store = DescriptorStore::from_config(&config, Persistence::file(&path, config.clone())).unwrap();

        assert!(store.try_switch_active(Environment::Blue, Environment::Green).await.unwrap());

        let on_disk = crate::config::loader::load_config_with(&path, |_| None).unwrap();
        assert_eq!(on_disk.environments.active, Environment::Green);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_held_snapshot_survives_commits() {
        let store = store();
        let before = store.deployment();

        store
            .update_addresses(
                Upstream::parse("10.9.9.9:1").unwrap(),
                Upstream::parse("10.9.9.9:2").unwrap(),
            )
            .await
            .unwrap();
        store.try_switch_active(Environment::Blue, Environment::Green).await.unwrap();

        assert_eq!(before.active, Environment::Blue);
        assert_eq!(before.active_upstream().as_str(), "app-5176:5176");

        let after = store.deployment();
        assert_eq!(after.active, Environment::Green);
        assert_eq!(after.active_upstream().as_str(), "10.9.9.9:2");
    }

    #[tokio::test]
    async fn test_address_change_resets_only_moved_environment() {
        let store = store();
        store.set_status(Environment::Blue, healthy("1.0.0"));
        store.set_status(Environment::Green, healthy("2.0.0"));

        let blue = store.deployment().blue.clone();
        store
            .update_addresses(blue, Upstream::parse("10.0.0.9:5177").unwrap())
            .await
            .unwrap();

        assert_eq!(store.status(Environment::Blue).version, "1.0.0");
        assert!(store.status(Environment::Blue).healthy);
        assert_eq!(store.status(Environment::Green), EnvironmentStatus::unprobed());
        assert_eq!(store.snapshot().green.status, EnvironmentStatus::unprobed());
    }

    #[tokio::test]
    async fn test_result_from_old_address_is_dropped() {
        let store = store();
        let old_green = store.deployment().green.clone();
        let blue = store.deployment().blue.clone();
        store
            .update_addresses(blue, Upstream::parse("10.0.0.9:5177").unwrap())
            .await
            .unwrap();

        assert!(!store.record_probe(Environment::Green, &old_green, healthy("2.0.0")));
        assert!(!store.status(Environment::Green).healthy);

        let new_green = store.deployment().green.clone();
        assert!(store.record_probe(Environment::Green, &new_green, healthy("2.1.0")));
        assert_eq!(store.status(Environment::Green).version, "2.1.0");
    }

    #[test]
    fn test_snapshot_reports_both_environments() {
        let store = store();
        store.set_status(Environment::Green, healthy("2.1.0"));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.active, Environment::Blue);
        assert!(snapshot.blue.active);
        assert!(!snapshot.green.active);
        assert_eq!(snapshot.environment(Environment::Green).status.version, "2.1.0");
        assert_eq!(snapshot.green.address, "app-5177:5177");
    }
}
