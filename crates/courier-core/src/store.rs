//! Persistent settings.
//!
//! Settings are string values keyed by `(tenant, component, key)`; a key may
//! hold several values. Component enablement is stored alongside them.
//! [`SettingsStore`] is the backend interface, [`Settings`] is the accessor a
//! component holds, already bound to its [`Scope`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::event::TenantId;

/// The `(tenant, component)` pair settings are scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub tenant: TenantId,
    pub component: String,
}

impl Scope {
    pub fn new(tenant: impl Into<TenantId>, component: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            component: component.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.component)
    }
}

/// Backend for settings and component enablement.
///
/// Multi-value mutations are single calls so each one is atomic with respect
/// to other writers of the same key.
#[async_trait]
pub trait SettingsStore: Send + Sync + 'static {
    /// All values under `key`, in insertion order. Empty if unset.
    async fn values(&self, scope: &Scope, key: &str) -> StoreResult<Vec<String>>;

    /// Replaces the values under `key`. An empty list removes the key.
    async fn set_values(&self, scope: &Scope, key: &str, values: Vec<String>) -> StoreResult<()>;

    /// Appends `value` unless already present. Returns `true` if appended.
    async fn add_value(&self, scope: &Scope, key: &str, value: &str) -> StoreResult<bool>;

    /// Removes `value` if present. Returns `true` if removed.
    async fn remove_value(&self, scope: &Scope, key: &str, value: &str) -> StoreResult<bool>;

    /// Persisted enablement. `None` if never toggled.
    async fn component_enabled(&self, tenant: &str, component: &str) -> StoreResult<Option<bool>>;

    async fn set_component_enabled(&self, tenant: &str, component: &str, enabled: bool) -> StoreResult<()>;
}

// =============================================================================
// Settings accessor
// =============================================================================

/// A component's view of the store, bound to its scope.
#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn SettingsStore>,
    scope: Scope,
}

impl Settings {
    pub fn new(store: Arc<dyn SettingsStore>, scope: Scope) -> Self {
        Self { store, scope }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The first value under `key`.
    pub async fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.store.values(&self.scope, key).await?.into_iter().next())
    }

    pub async fn get_setting_or(&self, key: &str, default: &str) -> StoreResult<String> {
        Ok(self
            .get_setting(key)
            .await?
            .unwrap_or_else(|| default.to_string()))
    }

    /// Sets `key` to a single value.
    pub async fn set_setting(&self, key: &str, value: impl Into<String>) -> StoreResult<()> {
        self.store
            .set_values(&self.scope, key, vec![value.into()])
            .await
    }

    pub async fn get_settings(&self, key: &str) -> StoreResult<Vec<String>> {
        self.store.values(&self.scope, key).await
    }

    pub async fn add_setting(&self, key: &str, value: &str) -> StoreResult<bool> {
        self.store.add_value(&self.scope, key, value).await
    }

    /// Removes every value under `key`.
    pub async fn remove_setting(&self, key: &str) -> StoreResult<()> {
        self.store.set_values(&self.scope, key, Vec::new()).await
    }

    pub async fn remove_setting_value(&self, key: &str, value: &str) -> StoreResult<bool> {
        self.store.remove_value(&self.scope, key, value).await
    }

    pub async fn is_component_enabled(&self) -> StoreResult<bool> {
        Ok(self
            .store
            .component_enabled(&self.scope.tenant, &self.scope.component)
            .await?
            .unwrap_or(false))
    }

    pub async fn toggle_component(&self, enabled: bool) -> StoreResult<()> {
        self.store
            .set_component_enabled(&self.scope.tenant, &self.scope.component, enabled)
            .await
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings").field("scope", &self.scope).finish()
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// The full contents of a store, as persisted by file-backed stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// tenant → component → key → values
    #[serde(default)]
    pub settings: BTreeMap<TenantId, BTreeMap<String, BTreeMap<String, Vec<String>>>>,
    /// tenant → component → enabled
    #[serde(default)]
    pub components: BTreeMap<TenantId, BTreeMap<String, bool>>,
}

impl StoreSnapshot {
    fn values(&self, scope: &Scope, key: &str) -> Vec<String> {
        self.settings
            .get(&scope.tenant)
            .and_then(|c| c.get(&scope.component))
            .and_then(|k| k.get(key))
            .cloned()
            .unwrap_or_default()
    }

    fn set_values(&mut self, scope: &Scope, key: &str, values: Vec<String>) {
        if values.is_empty() {
            if let Some(keys) = self
                .settings
                .get_mut(&scope.tenant)
                .and_then(|c| c.get_mut(&scope.component))
            {
                keys.remove(key);
            }
            return;
        }
        self.entry(scope).insert(key.to_string(), values);
    }

    fn entry(&mut self, scope: &Scope) -> &mut BTreeMap<String, Vec<String>> {
        self.settings
            .entry(scope.tenant.clone())
            .or_default()
            .entry(scope.component.clone())
            .or_default()
    }
}

/// An in-memory [`SettingsStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<StoreSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            data: Mutex::new(snapshot),
        }
    }

    /// A copy of the current contents.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.data.lock().clone()
    }

    // Synchronous cores, shared with file-backed stores that persist after
    // each mutation.

    pub fn values_now(&self, scope: &Scope, key: &str) -> Vec<String> {
        self.data.lock().values(scope, key)
    }

    pub fn set_values_now(&self, scope: &Scope, key: &str, values: Vec<String>) {
        self.data.lock().set_values(scope, key, values);
    }

    pub fn add_value_now(&self, scope: &Scope, key: &str, value: &str) -> bool {
        let mut data = self.data.lock();
        let values = data.entry(scope).entry(key.to_string()).or_default();
        if values.iter().any(|v| v == value) {
            return false;
        }
        values.push(value.to_string());
        true
    }

    pub fn remove_value_now(&self, scope: &Scope, key: &str, value: &str) -> bool {
        let mut data = self.data.lock();
        let mut values = data.values(scope, key);
        let before = values.len();
        values.retain(|v| v != value);
        if values.len() == before {
            return false;
        }
        data.set_values(scope, key, values);
        true
    }

    pub fn component_enabled_now(&self, tenant: &str, component: &str) -> Option<bool> {
        self.data
            .lock()
            .components
            .get(tenant)
            .and_then(|c| c.get(component))
            .copied()
    }

    pub fn set_component_enabled_now(&self, tenant: &str, component: &str, enabled: bool) {
        self.data
            .lock()
            .components
            .entry(tenant.to_string())
            .or_default()
            .insert(component.to_string(), enabled);
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn values(&self, scope: &Scope, key: &str) -> StoreResult<Vec<String>> {
        Ok(self.values_now(scope, key))
    }

    async fn set_values(&self, scope: &Scope, key: &str, values: Vec<String>) -> StoreResult<()> {
        self.set_values_now(scope, key, values);
        Ok(())
    }

    async fn add_value(&self, scope: &Scope, key: &str, value: &str) -> StoreResult<bool> {
        Ok(self.add_value_now(scope, key, value))
    }

    async fn remove_value(&self, scope: &Scope, key: &str, value: &str) -> StoreResult<bool> {
        Ok(self.remove_value_now(scope, key, value))
    }

    async fn component_enabled(&self, tenant: &str, component: &str) -> StoreResult<Option<bool>> {
        Ok(self.component_enabled_now(tenant, component))
    }

    async fn set_component_enabled(&self, tenant: &str, component: &str, enabled: bool) -> StoreResult<()> {
        self.set_component_enabled_now(tenant, component, enabled);
        Ok(())
    }
}
