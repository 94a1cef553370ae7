//! Live tenants.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use courier_core::{Platform, SettingsStore, TenantId};
use courier_framework::{Tenant, TenantDirectory};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::catalog::{ComponentCatalog, Installed};

/// Creates, tracks and tears down tenants as the bot joins and leaves them.
pub struct TenantRegistry {
    platform: Arc<dyn Platform>,
    store: Arc<dyn SettingsStore>,
    catalog: ComponentCatalog,
    tenants: RwLock<HashMap<TenantId, Arc<Tenant>>>,
}

impl TenantRegistry {
    pub fn new(
        platform: Arc<dyn Platform>,
        store: Arc<dyn SettingsStore>,
        catalog: ComponentCatalog,
    ) -> Self {
        Self {
            platform,
            store,
            catalog,
            tenants: RwLock::new(HashMap::new()),
        }
    }

    /// Sets up a tenant and installs the catalog into it.
    ///
    /// A tenant that is already live only has its name refreshed; nothing is
    /// installed twice.
    pub async fn setup(&self, id: &str, name: &str) -> (Arc<Tenant>, Installed) {
        let tenant = match self.tenants.write().entry(id.to_string()) {
            Entry::Occupied(existing) => {
                let tenant = Arc::clone(existing.get());
                tenant.set_name(name);
                debug!(tenant = id, name, "Tenant already set up");
                return (tenant, Installed::default());
            }
            Entry::Vacant(slot) => {
                let tenant = Tenant::new(id, name, Arc::clone(&self.platform), Arc::clone(&self.store));
                slot.insert(Arc::clone(&tenant));
                tenant
            }
        };

        let installed = self.catalog.install_into(&tenant).await;
        info!(tenant = id, name, components = installed.components.len(), "Tenant ready");
        (tenant, installed)
    }

    /// Forgets a tenant the bot left.
    pub fn remove(&self, id: &str) -> Option<Arc<Tenant>> {
        let tenant = self.tenants.write().remove(id)?;
        tenant.shutdown();
        info!(tenant = id, "Tenant removed");
        Some(tenant)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Tenant>> {
        self.tenants.read().get(id).cloned()
    }

    /// Ids of all live tenants, sorted.
    pub fn ids(&self) -> Vec<TenantId> {
        let mut ids: Vec<_> = self.tenants.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.tenants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.read().is_empty()
    }

    pub fn catalog(&self) -> &ComponentCatalog {
        &self.catalog
    }
}

impl TenantDirectory for TenantRegistry {
    fn tenant(&self, id: &str) -> Option<Arc<Tenant>> {
        self.get(id)
    }
}

impl std::fmt::Debug for TenantRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantRegistry")
            .field("tenants", &self.ids())
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use courier_core::MemoryStore;
    use courier_core::testing::FakePlatform;

    use super::*;

    fn registry() -> (Arc<FakePlatform>, Arc<MemoryStore>, TenantRegistry) {
        let platform = Arc::new(FakePlatform::new());
        let store = Arc::new(MemoryStore::new());
        let registry = TenantRegistry::new(platform.clone(), store.clone(), ComponentCatalog::standard());
        (platform, store, registry)
    }

    #[tokio::test]
    async fn test_setup_is_idempotent() {
        let (_platform, _store, registry) = registry();
        let (first, installed) = registry.setup("t1", "Alpha").await;
        assert_eq!(installed.components.len(), 3);

        let (second, installed) = registry.setup("t1", "Alpha Renamed").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert!(installed.components.is_empty());
        assert_eq!(second.name(), "Alpha Renamed");
        assert_eq!(second.components().len(), 3);
        assert_eq!(registry.ids(), vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn test_setup_restores_persisted_state() {
        let (_platform, store, registry) = registry();
        store.set_component_enabled_now("t1", "feedback", true);

        let (tenant, installed) = registry.setup("t1", "Alpha").await;
        installed.settled().await;
        assert!(tenant.component("feedback").unwrap().base().is_enabled());
        assert!(tenant.commands().contains("feedback"));
        assert!(!tenant.component("modmail").unwrap().base().is_enabled());
    }

    #[tokio::test]
    async fn test_remove_shuts_tenant_down() {
        let (_platform, _store, registry) = registry();
        let (tenant, installed) = registry.setup("t1", "Alpha").await;
        installed.settled().await;
        assert!(tenant.commands().contains("enable"));

        let removed = registry.remove("t1").unwrap();
        assert!(Arc::ptr_eq(&tenant, &removed));
        assert!(registry.get("t1").is_none());
        assert!(tenant.commands().is_empty());
        assert!(tenant.remote_ids().is_empty());
        assert!(registry.remove("t1").is_none());
    }

    #[tokio::test]
    async fn test_directory_resolves_live_tenants() {
        let (_platform, _store, registry) = registry();
        registry.setup("t1", "Alpha").await;
        assert!(TenantDirectory::tenant(&registry, "t1").is_some());
        assert!(TenantDirectory::tenant(&registry, "t2").is_none());
    }
}
