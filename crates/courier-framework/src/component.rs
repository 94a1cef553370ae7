//! Components: independently enablable feature units.
//!
//! Every component embeds a [`ComponentBase`] holding the state the tenant
//! lifecycle needs: the enabled flag, the commands and message actions to
//! register, the settings accessor and the role override that replaces the
//! commands' own predicates while it is set. The
//! [`Component`] trait adds optional hooks on top.
//!
//! ```text
//!            enable_component()
//!  Disabled ─────────────────────▶ Enabled
//!     ▲                              │
//!     └──────────────────────────────┘
//!            disable_component()
//! ```
//!
//! Always-enabled components skip the toggle and are activated at install.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use courier_core::{BotResult, Permission, Settings};
use parking_lot::RwLock;

use crate::command::{Command, Interaction};
use crate::tenant::Tenant;

/// Settings key holding the role granted access to a component.
pub const ROLE_SETTING: &str = "role";

/// Lifecycle state shared by every component.
pub struct ComponentBase {
    name: String,
    key: String,
    help: String,
    always_enabled: bool,
    enabled: AtomicBool,
    epoch: AtomicU64,
    commands: Vec<Arc<Command>>,
    interactions: Vec<Arc<Interaction>>,
    permission_override: RwLock<Option<Permission>>,
    settings: Settings,
}

impl ComponentBase {
    /// Starts building a component named `name`. Its key is the lower-cased name.
    pub fn builder(name: impl Into<String>, settings: Settings) -> ComponentBaseBuilder {
        ComponentBaseBuilder {
            name: name.into(),
            help: String::new(),
            always_enabled: false,
            commands: Vec::new(),
            interactions: Vec::new(),
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lower-cased name. Used as owner tag, settings scope and relay key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn is_always_enabled(&self) -> bool {
        self.always_enabled
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Atomically moves the enabled flag to `enabled`. Returns `false` if it
    /// already had that value.
    pub(crate) fn transition(&self, enabled: bool) -> bool {
        self.enabled
            .compare_exchange(!enabled, enabled, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// The current sync generation.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Starts a new sync generation and returns it.
    pub(crate) fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn commands(&self) -> &[Arc<Command>] {
        &self.commands
    }

    pub fn interactions(&self) -> &[Arc<Interaction>] {
        &self.interactions
    }

    /// Names of everything this component registers remotely.
    pub fn remote_names(&self) -> impl Iterator<Item = &str> {
        self.commands
            .iter()
            .map(|c| c.name())
            .chain(self.interactions.iter().map(|i| i.name()))
    }

    /// The predicate replacing every command's own, if a role was granted.
    pub fn permission_override(&self) -> Option<Permission> {
        self.permission_override.read().clone()
    }

    pub(crate) fn set_permission_override(&self, permission: Option<Permission>) {
        *self.permission_override.write() = permission;
    }

    /// The predicate a listener declared with `declared` runs under.
    pub fn effective_permission(&self, declared: &Permission) -> Permission {
        self.permission_override
            .read()
            .clone()
            .unwrap_or_else(|| declared.clone())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

impl fmt::Debug for ComponentBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentBase")
            .field("name", &self.name)
            .field("enabled", &self.is_enabled())
            .field("always_enabled", &self.always_enabled)
            .field("epoch", &self.epoch())
            .field("permission_override", &*self.permission_override.read())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ComponentBase`].
pub struct ComponentBaseBuilder {
    name: String,
    help: String,
    always_enabled: bool,
    commands: Vec<Arc<Command>>,
    interactions: Vec<Arc<Interaction>>,
    settings: Settings,
}

impl ComponentBaseBuilder {
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    /// Marks the component as impossible to disable.
    pub fn always_enabled(mut self) -> Self {
        self.always_enabled = true;
        self
    }

    pub fn command(mut self, command: Command) -> Self {
        self.commands.push(Arc::new(command));
        self
    }

    pub fn interaction(mut self, interaction: Interaction) -> Self {
        self.interactions.push(Arc::new(interaction));
        self
    }

    pub fn build(self) -> ComponentBase {
        ComponentBase {
            key: self.name.to_lowercase(),
            name: self.name,
            help: self.help,
            always_enabled: self.always_enabled,
            enabled: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            commands: self.commands,
            interactions: self.interactions,
            permission_override: RwLock::new(None),
            settings: self.settings,
        }
    }
}

/// A feature unit installed in a tenant.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    fn base(&self) -> &ComponentBase;

    fn name(&self) -> &str {
        self.base().name()
    }

    /// Runs once after the component is installed and, if persisted as
    /// enabled, activated.
    async fn installed(&self, _tenant: &Arc<Tenant>) -> BotResult<()> {
        Ok(())
    }

    /// Runs during disable, after the component's listeners are removed.
    async fn disabling(&self, _tenant: &Tenant) -> BotResult<()> {
        Ok(())
    }
}

impl fmt::Debug for dyn Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.base().fmt(f)
    }
}
