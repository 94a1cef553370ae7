//! Command and message-action definitions.
//!
//! A [`Command`] is both the definition pushed to the platform
//! ([`spec`](Command::spec)) and the listener that runs when it is invoked
//! ([`listener`](Command::listener)). Commands default to administrator-only;
//! subcommands add no restriction of their own unless given one.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use courier_core::{
    Action, BotError, BotResult, CommandKind, CommandSpec, Invocation, Listener, OptionSpec,
    Permission,
};
use futures::future::BoxFuture;
use tracing::debug;

use crate::context::{CommandContext, InteractionContext};

fn erase<C, F, Fut>(action: F) -> Action<C>
where
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BotResult<()>> + Send + 'static,
{
    Arc::new(move |ctx: C| -> BoxFuture<'static, BotResult<()>> { Box::pin(action(ctx)) })
}

// =============================================================================
// Subcommand
// =============================================================================

pub struct Subcommand {
    name: String,
    description: String,
    options: Vec<OptionSpec>,
    action: Action<CommandContext>,
    permission: Permission,
}

impl Subcommand {
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, action: F) -> Self
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BotResult<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            options: Vec::new(),
            action: erase(action),
            permission: Permission::Always,
        }
    }

    pub fn option(mut self, option: OptionSpec) -> Self {
        self.options.push(option);
        self
    }

    /// Adds a restriction on top of the parent command's.
    pub fn permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> CommandSpec {
        CommandSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            kind: CommandKind::Slash,
            options: self.options.clone(),
            subcommands: Vec::new(),
        }
    }
}

// =============================================================================
// Command
// =============================================================================

/// A slash command, optionally split into subcommands.
pub struct Command {
    name: String,
    description: String,
    options: Vec<OptionSpec>,
    subcommands: Vec<Subcommand>,
    action: Option<Action<CommandContext>>,
    permission: Permission,
}

impl Command {
    /// Creates an administrator-only command with no action.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            options: Vec::new(),
            subcommands: Vec::new(),
            action: None,
            permission: Permission::Administrator,
        }
    }

    pub fn option(mut self, option: OptionSpec) -> Self {
        self.options.push(option);
        self
    }

    pub fn subcommand(mut self, subcommand: Subcommand) -> Self {
        self.subcommands.push(subcommand);
        self
    }

    /// Sets the action run when the command is invoked without a subcommand.
    pub fn action<F, Fut>(mut self, action: F) -> Self
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BotResult<()>> + Send + 'static,
    {
        self.action = Some(erase(action));
        self
    }

    /// Overrides the default predicate.
    pub fn permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The predicate this command was declared with.
    pub fn default_permission(&self) -> &Permission {
        &self.permission
    }

    pub fn subcommands(&self) -> &[Subcommand] {
        &self.subcommands
    }

    /// The definition registered with the platform.
    pub fn spec(&self) -> CommandSpec {
        CommandSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            kind: CommandKind::Slash,
            options: self.options.clone(),
            subcommands: self.subcommands.iter().map(Subcommand::spec).collect(),
        }
    }

    /// Runs the command, resolving the selected subcommand if any.
    pub async fn invoke(&self, ctx: CommandContext) -> BotResult<()> {
        match ctx.subcommand.as_deref() {
            Some(name) => {
                let Some(sub) = self.subcommands.iter().find(|s| s.name == name) else {
                    return Err(BotError::error(format!(
                        "Unknown subcommand `{name}` for /{}",
                        self.name
                    )));
                };
                if !sub.permission.allows(ctx.actor()) {
                    return Err(BotError::PermissionDenied);
                }
                debug!(command = %self.name, subcommand = name, "Invoking subcommand");
                (sub.action)(ctx).await
            }
            None => match &self.action {
                Some(action) => action(ctx).await,
                None => Err(BotError::error(format!("/{} needs a subcommand", self.name))),
            },
        }
    }

    /// The registry listener for this command.
    pub fn listener(self: &Arc<Self>, owner: &str, permission: Permission) -> Listener<CommandContext> {
        let command = Arc::clone(self);
        Listener::new(self.name.clone(), move |ctx: CommandContext| {
            let command = Arc::clone(&command);
            async move { command.invoke(ctx).await }
        })
        .permission(permission)
        .owner(owner)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("permission", &self.permission)
            .field(
                "subcommands",
                &self.subcommands.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Interaction
// =============================================================================

/// A message action, shown in the context menu of a message.
pub struct Interaction {
    name: String,
    action: Action<InteractionContext>,
    permission: Permission,
}

impl Interaction {
    /// Creates an administrator-only message action.
    pub fn new<F, Fut>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(InteractionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BotResult<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            action: erase(action),
            permission: Permission::Administrator,
        }
    }

    pub fn permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_permission(&self) -> &Permission {
        &self.permission
    }

    pub fn spec(&self) -> CommandSpec {
        CommandSpec {
            name: self.name.clone(),
            kind: CommandKind::MessageAction,
            ..CommandSpec::default()
        }
    }

    pub fn listener(&self, owner: &str, permission: Permission) -> Listener<InteractionContext> {
        Listener::from_action(self.name.clone(), Arc::clone(&self.action))
            .permission(permission)
            .owner(owner)
    }
}

impl fmt::Debug for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interaction")
            .field("name", &self.name)
            .field("permission", &self.permission)
            .finish_non_exhaustive()
    }
}
