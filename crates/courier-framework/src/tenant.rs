//! Tenants and the component lifecycle.
//!
//! A [`Tenant`] owns its installed components, one [`HandlerRegistry`] per
//! event kind and the map from command name to the id the platform assigned
//! it. Enabling a component persists the flag, then registers its listeners
//! locally and upserts its commands remotely; disabling undoes both.
//!
//! # Command sync
//!
//! Upserts run on spawned tasks and are confirmed asynchronously. Each
//! component carries an epoch that every enable and disable bumps. A
//! confirmation is recorded only if the component is still at the epoch the
//! upsert was started in, and the check and the insert happen under the same
//! lock that disable drains.
//!
//! A stale confirmation is resolved under the lifecycle lock. If the
//! component is enabled again, the newer activation upserts the same command
//! and owns the remote id, so the stale one is dropped. If it is disabled,
//! the remote object is an orphan and is deleted before any later enable can
//! run.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use courier_core::{
    BotError, BotResult, ButtonEvent, CommandEvent, CommandSpec, Dispatch, HandlerRegistry,
    InteractionEvent, MessageEvent, Permission, Platform, RemoteId, Replier, Scope, SelectEvent,
    Settings, SettingsStore, TenantId,
};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::component::{Component, ComponentBase, ROLE_SETTING};
use crate::context::{
    ButtonContext, CommandContext, Context, InteractionContext, MessageContext, SelectContext,
};

/// Remote work started by a lifecycle transition.
///
/// Dropping the handle does not cancel anything; awaiting
/// [`settled`](SyncHandle::settled) waits for every upsert or deletion to
/// finish.
#[derive(Debug, Default)]
pub struct SyncHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl SyncHandle {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for all remote calls to settle.
    pub async fn settled(self) {
        for result in join_all(self.tasks).await {
            if let Err(err) = result {
                warn!(error = %err, "Command sync task failed");
            }
        }
    }
}

/// One server the bot is a member of.
pub struct Tenant {
    id: TenantId,
    name: RwLock<String>,
    platform: Arc<dyn Platform>,
    store: Arc<dyn SettingsStore>,
    replier: Replier,
    components: RwLock<Vec<Arc<dyn Component>>>,
    remote_ids: Mutex<HashMap<String, RemoteId>>,
    // Serialises enable, disable and permission changes.
    lifecycle: tokio::sync::Mutex<()>,
    commands: HandlerRegistry<CommandContext>,
    interactions: HandlerRegistry<InteractionContext>,
    buttons: HandlerRegistry<ButtonContext>,
    menus: HandlerRegistry<SelectContext>,
    messages: HandlerRegistry<MessageContext>,
    direct: HandlerRegistry<MessageContext>,
}

impl Tenant {
    pub fn new(
        id: impl Into<TenantId>,
        name: impl Into<String>,
        platform: Arc<dyn Platform>,
        store: Arc<dyn SettingsStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            name: RwLock::new(name.into()),
            replier: Replier::new(Arc::clone(&platform)),
            platform,
            store,
            components: RwLock::new(Vec::new()),
            remote_ids: Mutex::new(HashMap::new()),
            lifecycle: tokio::sync::Mutex::new(()),
            commands: HandlerRegistry::new("commands"),
            interactions: HandlerRegistry::new("interactions"),
            buttons: HandlerRegistry::new("buttons"),
            menus: HandlerRegistry::new("menus"),
            messages: HandlerRegistry::new("messages"),
            direct: HandlerRegistry::new("direct"),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write() = name.into();
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    pub fn replier(&self) -> &Replier {
        &self.replier
    }

    /// A settings accessor scoped to this tenant and `component`.
    pub fn settings_for(&self, component: &str) -> Settings {
        Settings::new(
            Arc::clone(&self.store),
            Scope::new(self.id.clone(), component.to_lowercase()),
        )
    }

    // -------------------------------------------------------------------------
    // Registries
    // -------------------------------------------------------------------------

    pub fn commands(&self) -> &HandlerRegistry<CommandContext> {
        &self.commands
    }

    pub fn interactions(&self) -> &HandlerRegistry<InteractionContext> {
        &self.interactions
    }

    pub fn buttons(&self) -> &HandlerRegistry<ButtonContext> {
        &self.buttons
    }

    pub fn menus(&self) -> &HandlerRegistry<SelectContext> {
        &self.menus
    }

    /// Plain tenant messages, keyed by channel id.
    pub fn messages(&self) -> &HandlerRegistry<MessageContext> {
        &self.messages
    }

    /// Relayed direct messages, keyed by component key.
    pub fn direct(&self) -> &HandlerRegistry<MessageContext> {
        &self.direct
    }

    fn remove_owned(&self, owner: &str) -> usize {
        self.commands.remove_by_owner(owner)
            + self.interactions.remove_by_owner(owner)
            + self.buttons.remove_by_owner(owner)
            + self.menus.remove_by_owner(owner)
            + self.messages.remove_by_owner(owner)
            + self.direct.remove_by_owner(owner)
    }

    // -------------------------------------------------------------------------
    // Components
    // -------------------------------------------------------------------------

    /// Looks up a component by name, ignoring case.
    pub fn component(&self, name: &str) -> Option<Arc<dyn Component>> {
        let key = name.to_lowercase();
        self.components
            .read()
            .iter()
            .find(|c| c.base().key() == key)
            .cloned()
    }

    /// Installed components, in install order.
    pub fn components(&self) -> Vec<Arc<dyn Component>> {
        self.components.read().clone()
    }

    /// The remote id recorded for a command or message action.
    pub fn remote_id(&self, name: &str) -> Option<RemoteId> {
        self.remote_ids.lock().get(name).cloned()
    }

    /// All recorded remote ids, sorted by name.
    pub fn remote_ids(&self) -> BTreeMap<String, RemoteId> {
        self.remote_ids
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn require(&self, name: &str) -> BotResult<Arc<dyn Component>> {
        self.component(name)
            .ok_or_else(|| BotError::error(format!("There is no component named `{name}`")))
    }

    /// Installs a component.
    ///
    /// Restores the persisted permission override, activates the component if
    /// it is always enabled or persisted as enabled, then runs its
    /// [`installed`](Component::installed) hook.
    pub async fn install(self: &Arc<Self>, component: Arc<dyn Component>) -> BotResult<SyncHandle> {
        let base = component.base();
        {
            let mut components = self.components.write();
            if components.iter().any(|c| c.base().key() == base.key()) {
                return Err(BotError::error(format!(
                    "A component named `{}` is already installed",
                    base.name()
                )));
            }
            components.push(Arc::clone(&component));
        }

        if let Some(role) = base.settings().get_setting(ROLE_SETTING).await? {
            base.set_permission_override(Some(Permission::role_override(role)));
        }

        let activate = base.is_always_enabled() || base.settings().is_component_enabled().await?;
        let sync = if activate && base.transition(true) {
            self.activate(&component)
        } else {
            SyncHandle::default()
        };

        if let Err(err) = component.installed(self).await {
            warn!(
                tenant = %self.id,
                component = base.key(),
                error = %err,
                "Component setup hook failed"
            );
        }

        debug!(tenant = %self.id, component = base.key(), active = activate, "Installed component");
        Ok(sync)
    }

    /// Enables a component and starts registering its commands.
    pub async fn enable_component(self: &Arc<Self>, name: &str) -> BotResult<SyncHandle> {
        let component = self.require(name)?;
        let base = component.base();
        let _guard = self.lifecycle.lock().await;

        if base.is_always_enabled() {
            return Err(BotError::warning(format!("{} is always enabled", base.name())));
        }
        if base.is_enabled() {
            return Err(BotError::warning(format!("{} is already enabled", base.name())));
        }

        base.settings().toggle_component(true).await?;
        if !base.transition(true) {
            return Err(BotError::warning(format!("{} is already enabled", base.name())));
        }
        let sync = self.activate(&component);

        info!(tenant = %self.id, component = base.key(), "Component enabled");
        Ok(sync)
    }

    /// Disables a component, removing its listeners and remote commands.
    ///
    /// Remote deletions are best-effort: failures are logged, never returned.
    pub async fn disable_component(self: &Arc<Self>, name: &str) -> BotResult<SyncHandle> {
        let component = self.require(name)?;
        let base = component.base();
        let _guard = self.lifecycle.lock().await;

        if base.is_always_enabled() {
            return Err(BotError::warning(format!(
                "{} is always enabled and cannot be disabled",
                base.name()
            )));
        }
        if !base.is_enabled() {
            return Err(BotError::warning(format!("{} is already disabled", base.name())));
        }

        base.settings().toggle_component(false).await?;
        if !base.transition(false) {
            return Err(BotError::warning(format!("{} is already disabled", base.name())));
        }
        base.bump_epoch();
        let removed = self.remove_owned(base.key());

        if let Err(err) = component.disabling(self).await {
            warn!(
                tenant = %self.id,
                component = base.key(),
                error = %err,
                "Component disable hook failed"
            );
        }

        let sync = self.retract(base);
        info!(
            tenant = %self.id,
            component = base.key(),
            listeners = removed,
            remote = sync.len(),
            "Component disabled"
        );
        Ok(sync)
    }

    /// Lets holders of `role` use a component, in addition to administrators.
    pub async fn grant_role(&self, name: &str, role: &str) -> BotResult<()> {
        let component = self.require(name)?;
        let base = component.base();
        let _guard = self.lifecycle.lock().await;

        base.settings().set_setting(ROLE_SETTING, role).await?;
        self.apply_permission(base, Some(Permission::role_override(role)));
        Ok(())
    }

    /// Drops any granted role, putting every command back under the predicate
    /// it was declared with.
    pub async fn revoke_roles(&self, name: &str) -> BotResult<()> {
        let component = self.require(name)?;
        let base = component.base();
        let _guard = self.lifecycle.lock().await;

        base.settings().remove_setting(ROLE_SETTING).await?;
        self.apply_permission(base, None);
        Ok(())
    }

    fn apply_permission(&self, base: &ComponentBase, permission: Option<Permission>) {
        base.set_permission_override(permission);

        let commands = self.commands.keys_owned_by(base.key());
        let interactions = self.interactions.keys_owned_by(base.key());
        let mut updated = 0;
        for command in base.commands() {
            if commands.iter().any(|k| k == command.name()) {
                let effective = base.effective_permission(command.default_permission());
                updated += usize::from(self.commands.set_permission(command.name(), effective));
            }
        }
        for interaction in base.interactions() {
            if interactions.iter().any(|k| k == interaction.name()) {
                let effective = base.effective_permission(interaction.default_permission());
                updated += usize::from(self.interactions.set_permission(interaction.name(), effective));
            }
        }

        debug!(
            tenant = %self.id,
            component = base.key(),
            overridden = base.permission_override().is_some(),
            listeners = updated,
            "Updated component permission"
        );
    }

    fn activate(self: &Arc<Self>, component: &Arc<dyn Component>) -> SyncHandle {
        let base = component.base();
        let epoch = base.bump_epoch();
        let mut specs = Vec::new();

        for command in base.commands() {
            let permission = base.effective_permission(command.default_permission());
            self.commands.register(command.listener(base.key(), permission));
            specs.push(command.spec());
        }
        for interaction in base.interactions() {
            let permission = base.effective_permission(interaction.default_permission());
            self.interactions
                .register(interaction.listener(base.key(), permission));
            specs.push(interaction.spec());
        }

        let tasks = specs
            .into_iter()
            .map(|spec| {
                let tenant = Arc::clone(self);
                let component = Arc::clone(component);
                tokio::spawn(async move { tenant.sync_command(component, spec, epoch).await })
            })
            .collect();

        SyncHandle { tasks }
    }

    async fn sync_command(&self, component: Arc<dyn Component>, spec: CommandSpec, epoch: u64) {
        let remote_id = match self.platform.upsert_command(&self.id, &spec).await {
            Ok(id) => id,
            Err(err) => {
                warn!(tenant = %self.id, command = %spec.name, error = %err, "Failed to register command");
                return;
            }
        };

        let base = component.base();
        let current = {
            let mut remote_ids = self.remote_ids.lock();
            let current = base.epoch() == epoch;
            if current {
                remote_ids.insert(spec.name.clone(), remote_id.clone());
            }
            current
        };

        if current {
            debug!(tenant = %self.id, command = %spec.name, remote_id = %remote_id, "Registered command");
            return;
        }

        let _guard = self.lifecycle.lock().await;
        if base.is_enabled() {
            debug!(tenant = %self.id, command = %spec.name, "Superseded command registration");
            return;
        }

        debug!(tenant = %self.id, command = %spec.name, "Discarding late command registration");
        if let Err(err) = self.platform.delete_command(&self.id, &remote_id).await {
            warn!(tenant = %self.id, command = %spec.name, error = %err, "Failed to delete command");
        }
    }

    fn retract(&self, base: &ComponentBase) -> SyncHandle {
        let drained: Vec<(String, RemoteId)> = {
            let mut remote_ids = self.remote_ids.lock();
            base.remote_names()
                .filter_map(|name| remote_ids.remove_entry(name))
                .collect()
        };

        let tasks = drained
            .into_iter()
            .map(|(name, remote_id)| {
                let platform = Arc::clone(&self.platform);
                let tenant = self.id.clone();
                tokio::spawn(async move {
                    if let Err(err) = platform.delete_command(&tenant, &remote_id).await {
                        warn!(tenant = %tenant, command = %name, error = %err, "Failed to delete command");
                    }
                })
            })
            .collect();

        SyncHandle { tasks }
    }

    /// Forgets every listener and remote id after the bot left the tenant.
    pub fn shutdown(&self) {
        for component in self.components.read().iter() {
            let base = component.base();
            base.bump_epoch();
            self.remove_owned(base.key());
        }
        self.remote_ids.lock().clear();
        debug!(tenant = %self.id, "Tenant shut down");
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    pub async fn handle_command(self: &Arc<Self>, event: CommandEvent) -> Dispatch {
        let key = event.name.clone();
        self.commands
            .handle(&key, Context::new(event, Arc::clone(self)), &self.replier)
            .await
    }

    pub async fn handle_interaction(self: &Arc<Self>, event: InteractionEvent) -> Dispatch {
        let key = event.name.clone();
        self.interactions
            .handle(&key, Context::new(event, Arc::clone(self)), &self.replier)
            .await
    }

    pub async fn handle_button(self: &Arc<Self>, event: ButtonEvent) -> Dispatch {
        let key = event.button_id.clone();
        self.buttons
            .handle(&key, Context::new(event, Arc::clone(self)), &self.replier)
            .await
    }

    pub async fn handle_select(self: &Arc<Self>, event: SelectEvent) -> Dispatch {
        let key = event.menu_id.clone();
        self.menus
            .handle(&key, Context::new(event, Arc::clone(self)), &self.replier)
            .await
    }

    pub async fn handle_message(self: &Arc<Self>, event: MessageEvent) -> Dispatch {
        let key = event.channel_id.clone();
        self.messages
            .handle(&key, Context::new(event, Arc::clone(self)), &self.replier)
            .await
    }
}

impl fmt::Debug for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tenant")
            .field("id", &self.id)
            .field("name", &*self.name.read())
            .field("components", &self.components.read().len())
            .finish_non_exhaustive()
    }
}
