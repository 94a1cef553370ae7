//! File-backed settings.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use courier_core::{MemoryStore, Scope, SettingsStore, StoreResult, StoreSnapshot};
use tracing::{debug, info};

/// A [`SettingsStore`] kept in memory and written to a JSON file after every
/// change.
///
/// Writes go to a sibling temporary file first and are renamed into place, so
/// a crash never leaves a half-written file behind.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    memory: MemoryStore,
    // Held while snapshotting and writing so the last write carries the
    // newest state.
    write: tokio::sync::Mutex<()>,
}

impl FileStore {
    /// Opens the store at `path`, creating parent directories. A missing file
    /// starts an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<StoreSnapshot>(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreSnapshot::default(),
            Err(err) => return Err(err.into()),
        };
        info!(
            path = %path.display(),
            tenants = snapshot.settings.len().max(snapshot.components.len()),
            "Opened settings file"
        );

        Ok(Self {
            path,
            memory: MemoryStore::from_snapshot(snapshot),
            write: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.memory.snapshot()
    }

    async fn persist(&self) -> StoreResult<()> {
        let _guard = self.write.lock().await;
        let bytes = serde_json::to_vec_pretty(&self.memory.snapshot())?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), "Settings written");
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for FileStore {
    async fn values(&self, scope: &Scope, key: &str) -> StoreResult<Vec<String>> {
        Ok(self.memory.values_now(scope, key))
    }

    async fn set_values(&self, scope: &Scope, key: &str, values: Vec<String>) -> StoreResult<()> {
        self.memory.set_values_now(scope, key, values);
        self.persist().await
    }

    async fn add_value(&self, scope: &Scope, key: &str, value: &str) -> StoreResult<bool> {
        let added = self.memory.add_value_now(scope, key, value);
        if added {
            self.persist().await?;
        }
        Ok(added)
    }

    async fn remove_value(&self, scope: &Scope, key: &str, value: &str) -> StoreResult<bool> {
        let removed = self.memory.remove_value_now(scope, key, value);
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn component_enabled(&self, tenant: &str, component: &str) -> StoreResult<Option<bool>> {
        Ok(self.memory.component_enabled_now(tenant, component))
    }

    async fn set_component_enabled(&self, tenant: &str, component: &str, enabled: bool) -> StoreResult<()> {
        self.memory.set_component_enabled_now(tenant, component, enabled);
        self.persist().await
    }
}
