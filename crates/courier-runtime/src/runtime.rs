//! The event loop.
//!
//! A platform gateway pushes [`InboundEvent`]s into the channel returned by
//! [`CourierRuntime::sender`]; the runtime routes them one at a time until
//! shut down.
//!
//! ```rust,ignore
//! use courier_runtime::CourierRuntime;
//!
//! let runtime = CourierRuntime::builder()
//!     .config_file("config/courier.toml")
//!     .build(platform)
//!     .await?;
//!
//! let events = runtime.sender();
//! tokio::spawn(gateway.forward_into(events));
//!
//! runtime.run().await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use courier_core::{InboundEvent, MemoryStore, Platform, SettingsStore};
use courier_framework::{Relay, TenantDirectory};
use parking_lot::Mutex;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::ComponentCatalog;
use crate::config::{ConfigLoader, CourierConfig, StorageBackend};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::router::{Routed, Router};
use crate::store::FileStore;
use crate::tenants::TenantRegistry;

/// Owns the tenants, the relay and the inbound event channel.
pub struct CourierRuntime {
    config: CourierConfig,
    store: Arc<dyn SettingsStore>,
    tenants: Arc<TenantRegistry>,
    relay: Arc<Relay>,
    router: Router,
    sender: mpsc::Sender<InboundEvent>,
    receiver: Mutex<Option<mpsc::Receiver<InboundEvent>>>,
    shutdown: CancellationToken,
}

impl CourierRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration, initializing logging and opening
    /// the configured settings backend.
    pub async fn from_config(
        config: CourierConfig,
        platform: Arc<dyn Platform>,
        catalog: ComponentCatalog,
    ) -> RuntimeResult<Self> {
        logging::init_from_config(&config.logging);

        let store: Arc<dyn SettingsStore> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::File => Arc::new(FileStore::open(config.storage.path()).await?),
        };

        info!(
            log_level = %config.logging.level,
            storage = ?config.storage.backend,
            components = ?catalog.names(),
            "Runtime initialized from configuration"
        );
        Ok(Self::with_store(config, platform, store, catalog))
    }

    /// Creates a runtime over an already opened store.
    pub fn with_store(
        config: CourierConfig,
        platform: Arc<dyn Platform>,
        store: Arc<dyn SettingsStore>,
        catalog: ComponentCatalog,
    ) -> Self {
        let tenants = Arc::new(TenantRegistry::new(
            Arc::clone(&platform),
            Arc::clone(&store),
            catalog,
        ));
        let directory: Arc<dyn TenantDirectory> = tenants.clone();
        let relay = Relay::new(platform, directory, config.relay.max_workers);
        let router = Router::new(Arc::clone(&tenants), Arc::clone(&relay));
        let (sender, receiver) = mpsc::channel(config.runtime.event_buffer.max(1));

        Self {
            config,
            store,
            tenants,
            relay,
            router,
            sender,
            receiver: Mutex::new(Some(receiver)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SettingsStore> {
        &self.store
    }

    pub fn tenants(&self) -> &Arc<TenantRegistry> {
        &self.tenants
    }

    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Where the platform gateway sends inbound events.
    pub fn sender(&self) -> mpsc::Sender<InboundEvent> {
        self.sender.clone()
    }

    /// Routes one event immediately, bypassing the channel.
    pub async fn dispatch(&self, event: InboundEvent) -> Routed {
        self.router.route(event).await
    }

    /// Cancelled when the runtime shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Asks the event loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Runs until Ctrl+C, SIGTERM or [`shutdown`](Self::shutdown).
    pub async fn run(&self) -> RuntimeResult<()> {
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = wait_for_signal() => token.cancel(),
                _ = token.cancelled() => {}
            }
        });
        self.run_until_cancelled().await
    }

    /// Runs until [`shutdown`](Self::shutdown) or until every sender is gone.
    ///
    /// The loop can only run once.
    pub async fn run_until_cancelled(&self) -> RuntimeResult<()> {
        let mut receiver = self.receiver.lock().take().ok_or(RuntimeError::AlreadyRunning)?;
        info!("Courier runtime is now running");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!("Shutdown requested");
                    break;
                }
                event = receiver.recv() => match event {
                    Some(event) => {
                        let kind = event.kind();
                        let routed = self.router.route(event).await;
                        debug!(kind, routed = ?routed, "Event routed");
                    }
                    None => {
                        debug!("Event channel closed");
                        break;
                    }
                },
            }
        }

        self.relay.workers().close();
        info!(tenants = self.tenants.len(), "Courier runtime stopped");
        Ok(())
    }
}

impl std::fmt::Debug for CourierRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourierRuntime")
            .field("tenants", &self.tenants)
            .field("cancelled", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(err) => warn!(error = %err, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(err) => {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`CourierRuntime`] with custom configuration.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<CourierConfig>,
    catalog: ComponentCatalog,
    store: Option<Arc<dyn SettingsStore>>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            config: None,
            catalog: ComponentCatalog::standard(),
            store: None,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Layers `config` under files and the environment.
    pub fn merge(mut self, config: CourierConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Uses `config` as is, skipping file and environment loading.
    pub fn config(mut self, config: CourierConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replaces the standard component catalog.
    pub fn catalog(mut self, catalog: ComponentCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Uses `store` instead of the configured backend.
    pub fn store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn build(self, platform: Arc<dyn Platform>) -> RuntimeResult<CourierRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_loader.load()?,
        };
        match self.store {
            Some(store) => {
                logging::init_from_config(&config.logging);
                Ok(CourierRuntime::with_store(config, platform, store, self.catalog))
            }
            None => CourierRuntime::from_config(config, platform, self.catalog).await,
        }
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use courier_core::testing::FakePlatform;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn memory_config() -> CourierConfig {
        let mut config = CourierConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config
    }

    async fn runtime() -> Arc<CourierRuntime> {
        let runtime = CourierRuntime::builder()
            .config(memory_config())
            .build(Arc::new(FakePlatform::new()))
            .await;
        Arc::new(assert_ok!(runtime))
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_loop_routes_until_shutdown() {
        let runtime = runtime().await;
        let events = runtime.sender();
        let running = tokio::spawn({
            let runtime = Arc::clone(&runtime);
            async move { runtime.run_until_cancelled().await }
        });

        events
            .send(InboundEvent::TenantAvailable {
                tenant_id: "t1".into(),
                name: "Alpha".into(),
            })
            .await
            .unwrap();
        eventually(|| runtime.tenants().get("t1").is_some()).await;

        runtime.shutdown();
        assert_ok!(running.await.unwrap());
        assert!(runtime.shutdown_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_loop_runs_once() {
        let runtime = runtime().await;
        runtime.shutdown();
        assert_ok!(runtime.run_until_cancelled().await);

        let err = assert_err!(runtime.run_until_cancelled().await);
        assert!(matches!(err, RuntimeError::AlreadyRunning));
    }

    #[tokio::test]
    async fn test_file_backend_opens_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CourierConfig::default();
        config.storage.data_dir = dir.path().join("state");

        let runtime = assert_ok!(
            CourierRuntime::from_config(config, Arc::new(FakePlatform::new()), ComponentCatalog::standard()).await
        );
        runtime
            .dispatch(InboundEvent::TenantAvailable {
                tenant_id: "t1".into(),
                name: "Alpha".into(),
            })
            .await;
        let tenant = runtime.tenants().get("t1").unwrap();
        assert_ok!(tenant.enable_component("feedback").await).settled().await;

        assert!(dir.path().join("state").join("settings.json").exists());
    }
}
