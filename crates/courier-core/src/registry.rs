//! Keyed listener registry.
//!
//! [`HandlerRegistry`] is the one dispatch table used for every inbound event
//! kind: commands, message actions, buttons, selection menus, plain tenant
//! messages and relayed direct messages. Each [`Listener`] is stored under a
//! string key together with a [`Permission`] and an optional owner tag, so
//! a component can later remove or re-permission exactly what it registered.
//!
//! Registering a key that already exists replaces the previous listener.
//!
//! ```rust,ignore
//! let registry = HandlerRegistry::<CommandEvent>::new("commands");
//!
//! registry.register(
//!     Listener::new("ping", |event: CommandEvent| async move { Ok(()) })
//!         .permission(Permission::Administrator)
//!         .owner("manager"),
//! );
//!
//! registry.handle("ping", event, &replier).await;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{BotError, BotResult};
use crate::event::Invocation;
use crate::permission::Permission;
use crate::reply::Replier;

/// A type-erased listener action.
pub type Action<E> = Arc<dyn Fn(E) -> BoxFuture<'static, BotResult<()>> + Send + Sync>;

/// Outcome of a successful dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// No listener is registered under the key.
    Ignored,
    /// A listener ran to completion.
    Handled,
}

// =============================================================================
// Listener
// =============================================================================

/// A listener waiting to be registered.
pub struct Listener<E> {
    key: String,
    action: Action<E>,
    permission: Permission,
    owner: Option<String>,
}

impl<E: Invocation> Listener<E> {
    /// Creates a listener for `key` that everyone may trigger.
    pub fn new<F, Fut>(key: impl Into<String>, action: F) -> Self
    where
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BotResult<()>> + Send + 'static,
    {
        Self {
            key: key.into(),
            action: Arc::new(move |event: E| -> BoxFuture<'static, BotResult<()>> {
                Box::pin(action(event))
            }),
            permission: Permission::Always,
            owner: None,
        }
    }

    /// Creates a listener from an already erased action.
    pub fn from_action(key: impl Into<String>, action: Action<E>) -> Self {
        Self {
            key: key.into(),
            action,
            permission: Permission::Always,
            owner: None,
        }
    }

    /// Sets the authorization predicate.
    pub fn permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }

    /// Tags the listener with its owning component.
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// The key this listener will be registered under.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<E> fmt::Debug for Listener<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("key", &self.key)
            .field("permission", &self.permission)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

struct Entry<E> {
    action: Action<E>,
    permission: Permission,
    owner: Option<String>,
}

// =============================================================================
// HandlerRegistry
// =============================================================================

/// A keyed table of listeners for one event kind.
///
/// Lookups take a read lock only long enough to clone the action, so
/// listeners never run while the table is locked.
pub struct HandlerRegistry<E> {
    name: &'static str,
    entries: RwLock<HashMap<String, Entry<E>>>,
}

impl<E: Invocation> HandlerRegistry<E> {
    /// Creates an empty registry. `name` only appears in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a listener, replacing any listener already under its key.
    pub fn register(&self, listener: Listener<E>) {
        let Listener {
            key,
            action,
            permission,
            owner,
        } = listener;

        let previous = self.entries.write().insert(
            key.clone(),
            Entry {
                action,
                permission,
                owner,
            },
        );

        if previous.is_some() {
            debug!(registry = self.name, key = %key, "Replaced existing listener");
        } else {
            trace!(registry = self.name, key = %key, "Registered listener");
        }
    }

    /// Resolves `key`, checks authorization and runs the listener.
    ///
    /// A missing key is not an error; it yields [`Dispatch::Ignored`].
    pub async fn dispatch(&self, key: &str, event: E) -> BotResult<Dispatch> {
        let action = {
            let entries = self.entries.read();
            let Some(entry) = entries.get(key) else {
                trace!(registry = self.name, key, "No listener for key");
                return Ok(Dispatch::Ignored);
            };
            if !entry.permission.allows(event.actor()) {
                debug!(
                    registry = self.name,
                    key,
                    user = %event.actor().id,
                    "Permission denied"
                );
                return Err(BotError::PermissionDenied);
            }
            Arc::clone(&entry.action)
        };

        action(event).await?;
        Ok(Dispatch::Handled)
    }

    /// Dispatches and reports any error to the invoking channel.
    pub async fn handle(&self, key: &str, event: E, replier: &Replier) -> Dispatch {
        let channel = event.channel_id().to_string();
        match self.dispatch(key, event).await {
            Ok(outcome) => outcome,
            Err(err) => {
                replier.report(&channel, &err).await;
                Dispatch::Handled
            }
        }
    }

    /// Removes the listener under `key`. Returns `true` if one was present.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Removes every listener tagged with `owner` and returns how many.
    pub fn remove_by_owner(&self, owner: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.owner.as_deref() != Some(owner));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(registry = self.name, owner, removed, "Removed owned listeners");
        }
        removed
    }

    /// Replaces the predicate of the listener under `key`.
    pub fn set_permission(&self, key: &str, permission: Permission) -> bool {
        match self.entries.write().get_mut(key) {
            Some(entry) => {
                entry.permission = permission;
                true
            }
            None => false,
        }
    }

    /// Replaces the predicate of every listener tagged with `owner`.
    pub fn set_permission_by_owner(&self, owner: &str, permission: &Permission) -> usize {
        let mut count = 0;
        for entry in self.entries.write().values_mut() {
            if entry.owner.as_deref() == Some(owner) {
                entry.permission = permission.clone();
                count += 1;
            }
        }
        count
    }

    /// Returns the predicate guarding `key`.
    pub fn permission(&self, key: &str) -> Option<Permission> {
        self.entries.read().get(key).map(|e| e.permission.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Keys registered by `owner`, sorted.
    pub fn keys_owned_by(&self, owner: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, e)| e.owner.as_deref() == Some(owner))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<E> fmt::Debug for HandlerRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("name", &self.name)
            .field("listeners", &self.entries.read().len())
            .finish()
    }
}
