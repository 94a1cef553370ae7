//! The components every tenant gets.
//!
//! Factories are registered explicitly, in install order. A factory that
//! fails is logged and skipped so one broken component does not keep a
//! tenant from coming up.

use std::sync::Arc;

use courier_core::BotResult;
use courier_framework::components::{Feedback, Manager, ModMail};
use courier_framework::{Component, SyncHandle, Tenant};
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, error};

/// Builds one component for a tenant.
pub type ComponentFactory = fn(Arc<Tenant>) -> BoxFuture<'static, BotResult<Arc<dyn Component>>>;

/// An ordered set of named component factories.
#[derive(Clone, Default)]
pub struct ComponentCatalog {
    entries: Vec<(&'static str, ComponentFactory)>,
}

impl ComponentCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager, Feedback and ModMail.
    pub fn standard() -> Self {
        Self::new()
            .register("manager", manager)
            .register("feedback", feedback)
            .register("modmail", modmail)
    }

    /// Adds `factory` under `name`, replacing an entry with the same name in
    /// place.
    pub fn register(mut self, name: &'static str, factory: ComponentFactory) -> Self {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = factory,
            None => self.entries.push((name, factory)),
        }
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(name, _)| *name).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds and installs every component into `tenant`.
    pub async fn install_into(&self, tenant: &Arc<Tenant>) -> Installed {
        let mut installed = Installed::default();
        for (name, factory) in &self.entries {
            let result = match factory(Arc::clone(tenant)).await {
                Ok(component) => tenant.install(component).await,
                Err(err) => Err(err),
            };
            match result {
                Ok(sync) => {
                    installed.components.push(name.to_string());
                    installed.sync.push(sync);
                }
                Err(err) => {
                    error!(tenant = tenant.id(), component = *name, error = %err, "Failed to install component");
                }
            }
        }
        debug!(tenant = tenant.id(), components = ?installed.components, "Installed catalog");
        installed
    }
}

impl std::fmt::Debug for ComponentCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// The outcome of [`ComponentCatalog::install_into`].
#[derive(Debug, Default)]
pub struct Installed {
    /// Catalog names that installed successfully.
    pub components: Vec<String>,
    sync: Vec<SyncHandle>,
}

impl Installed {
    /// Waits for the command registrations started by the installs.
    pub async fn settled(self) {
        for sync in self.sync {
            sync.settled().await;
        }
    }
}

fn manager(tenant: Arc<Tenant>) -> BoxFuture<'static, BotResult<Arc<dyn Component>>> {
    async move {
        let component: Arc<dyn Component> = Manager::new(&tenant);
        Ok(component)
    }
    .boxed()
}

fn feedback(tenant: Arc<Tenant>) -> BoxFuture<'static, BotResult<Arc<dyn Component>>> {
    async move {
        let component: Arc<dyn Component> = Feedback::load(&tenant).await?;
        Ok(component)
    }
    .boxed()
}

fn modmail(tenant: Arc<Tenant>) -> BoxFuture<'static, BotResult<Arc<dyn Component>>> {
    async move {
        let component: Arc<dyn Component> = ModMail::load(&tenant).await?;
        Ok(component)
    }
    .boxed()
}
