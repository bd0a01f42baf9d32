//! Write-through persistence of the deployment state.
//!
//! The whole [`SwitchConfig`] is rewritten with the current active side and
//! addresses merged in, so a restart resumes from the last committed state.
//! Callers serialize writes; see [`DescriptorStore`](crate::store::DescriptorStore).

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use crate::config::schema::SwitchConfig;
use crate::store::Deployment;

/// Errors that can occur while persisting state.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where committed state goes.
#[derive(Debug, Clone)]
pub enum Persistence {
    /// Keep state in memory only.
    Disabled,
    /// Rewrite a TOML file after every commit.
    File(ConfigPersister),
}

impl Persistence {
    /// File persistence rooted at `path`, carrying the non-deployment
    /// sections of `base` along on every write.
    pub fn file(path: impl Into<PathBuf>, base: SwitchConfig) -> Self {
        Persistence::File(ConfigPersister::new(path, base))
    }

    pub async fn persist(&self, deployment: &Deployment) -> Result<(), PersistError> {
        match self {
            Persistence::Disabled => Ok(()),
            Persistence::File(persister) => persister.write(deployment).await,
        }
    }
}

/// Atomically rewrites the configuration file.
#[derive(Debug, Clone)]
pub struct ConfigPersister {
    path: PathBuf,
    base: SwitchConfig,
}

impl ConfigPersister {
    pub fn new(path: impl Into<PathBuf>, base: SwitchConfig) -> Self {
        Self {
            path: path.into(),
            base,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    /// Render the file contents for `deployment`.
    pub fn render(&self, deployment: &Deployment) -> Result<String, PersistError> {
        let mut config = self.base.clone();
        config.environments.active = deployment.active;
        config.environments.blue = deployment.blue.as_str().to_string();
        config.environments.green = deployment.green.as_str().to_string();
        Ok(toml::to_string_pretty(&config)?)
    }

    /// Write and flush a sibling temporary file, rename it over the target,
    /// then flush the directory so the rename itself is durable.
    pub async fn write(&self, deployment: &Deployment) -> Result<(), PersistError> {
        let content = self.render(deployment)?;
        let tmp = self.tmp_path();

        let io_err = |source: std::io::Error| PersistError::Io {
            path: self.path.clone(),
            source,
        };

        let mut file = File::create(&tmp).await.map_err(io_err)?;
        file.write_all(content.as_bytes()).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        sync_parent(&self.path).await.map_err(io_err)?;

        tracing::debug!(path = %self.path.display(), active = %deployment.active, "Deployment state persisted");
        Ok(())
    }
}

#[cfg(unix)]
async fn sync_parent(path: &Path) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    File::open(parent).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
