//! Inbound platform events.
//!
//! The platform client delivers events that are already parsed; this module
//! only defines their shape. Every event that can trigger a listener carries
//! an [`Actor`] and therefore implements [`Invocation`], which is what the
//! authorization layer evaluates.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque tenant (server) identifier.
pub type TenantId = String;
/// Opaque user identifier.
pub type UserId = String;
/// Opaque channel identifier.
pub type ChannelId = String;
/// Opaque message identifier.
pub type MessageId = String;
/// Opaque role identifier.
pub type RoleId = String;
/// Identifier the platform assigns to a registered command.
pub type RemoteId = String;

// =============================================================================
// Actor
// =============================================================================

/// The user that triggered an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// The user id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Whether the user holds the administrator capability in the tenant the
    /// event originated from. Always `false` in direct channels.
    #[serde(default)]
    pub administrator: bool,
    /// Whether the user is itself a bot account.
    #[serde(default)]
    pub bot: bool,
    /// Roles held in the originating tenant.
    #[serde(default)]
    pub roles: BTreeSet<RoleId>,
}

impl Actor {
    /// Creates a plain member with no roles.
    pub fn new(id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Marks the actor as an administrator.
    pub fn administrator(mut self) -> Self {
        self.administrator = true;
        self
    }

    /// Adds a role.
    pub fn with_role(mut self, role: impl Into<RoleId>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Returns `true` if the actor holds the given role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Platform mention markup for this user.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

// =============================================================================
// Command Options
// =============================================================================

/// A typed option value supplied with a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    User(UserId),
    Channel(ChannelId),
    Role(RoleId),
}

impl OptionValue {
    /// Returns the string payload, if this is a string option.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the user id, if this is a user option.
    pub fn as_user(&self) -> Option<&str> {
        match self {
            Self::User(id) => Some(id),
            _ => None,
        }
    }

    /// Returns the channel id, if this is a channel option.
    pub fn as_channel(&self) -> Option<&str> {
        match self {
            Self::Channel(id) => Some(id),
            _ => None,
        }
    }

    /// Returns the role id, if this is a role option.
    pub fn as_role(&self) -> Option<&str> {
        match self {
            Self::Role(id) => Some(id),
            _ => None,
        }
    }
}

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
}

// =============================================================================
// Events
// =============================================================================

/// A slash command invocation inside a tenant.
#[derive(Debug, Clone)]
pub struct CommandEvent {
    pub tenant_id: TenantId,
    pub channel_id: ChannelId,
    pub actor: Actor,
    /// Top-level command name.
    pub name: String,
    /// Selected subcommand, if the command has any.
    pub subcommand: Option<String>,
    pub options: HashMap<String, OptionValue>,
}

impl CommandEvent {
    /// Returns the named option.
    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        self.options.get(name)
    }

    /// Returns the named string option.
    pub fn string(&self, name: &str) -> Option<&str> {
        self.option(name).and_then(OptionValue::as_str)
    }

    /// Returns the named user option.
    pub fn user(&self, name: &str) -> Option<&str> {
        self.option(name).and_then(OptionValue::as_user)
    }

    /// Returns the named channel option.
    pub fn channel(&self, name: &str) -> Option<&str> {
        self.option(name).and_then(OptionValue::as_channel)
    }

    /// Returns the named role option.
    pub fn role(&self, name: &str) -> Option<&str> {
        self.option(name).and_then(OptionValue::as_role)
    }
}

/// A message action (context menu) invoked on a target message.
#[derive(Debug, Clone)]
pub struct InteractionEvent {
    pub tenant_id: TenantId,
    pub channel_id: ChannelId,
    pub actor: Actor,
    pub name: String,
    /// The message the action was invoked on.
    pub target: MessageEvent,
}

/// A plain message, either in a tenant channel or in a direct channel.
#[derive(Debug, Clone, Default)]
pub struct MessageEvent {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    /// `None` for direct messages.
    pub tenant_id: Option<TenantId>,
    pub author: Actor,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

impl MessageEvent {
    /// Returns `true` if the message was sent in a direct channel.
    pub fn is_direct(&self) -> bool {
        self.tenant_id.is_none()
    }
}

/// A button click.
#[derive(Debug, Clone)]
pub struct ButtonEvent {
    pub tenant_id: Option<TenantId>,
    pub channel_id: ChannelId,
    /// The message carrying the button.
    pub message_id: MessageId,
    pub actor: Actor,
    pub button_id: String,
}

/// A selection menu choice.
#[derive(Debug, Clone)]
pub struct SelectEvent {
    pub tenant_id: Option<TenantId>,
    pub channel_id: ChannelId,
    /// The message carrying the menu.
    pub message_id: MessageId,
    pub actor: Actor,
    pub menu_id: String,
    /// The chosen option value.
    pub option: String,
}

/// Everything the platform client can deliver to the runtime.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Command(CommandEvent),
    Interaction(InteractionEvent),
    Message(MessageEvent),
    Button(ButtonEvent),
    Select(SelectEvent),
    /// The bot joined a tenant, or the tenant became available after connect.
    TenantAvailable { tenant_id: TenantId, name: String },
    /// The bot left a tenant.
    TenantRemoved { tenant_id: TenantId },
}

impl InboundEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Interaction(_) => "interaction",
            Self::Message(_) => "message",
            Self::Button(_) => "button",
            Self::Select(_) => "select",
            Self::TenantAvailable { .. } => "tenant_available",
            Self::TenantRemoved { .. } => "tenant_removed",
        }
    }
}

// =============================================================================
// Invocation
// =============================================================================

/// An event that was triggered by a user and can be authorized.
pub trait Invocation: Send + Sync + 'static {
    /// The user that triggered the event.
    fn actor(&self) -> &Actor;

    /// The channel replies should go to.
    fn channel_id(&self) -> &str;
}

impl Invocation for CommandEvent {
    fn actor(&self) -> &Actor {
        &self.actor
    }

    fn channel_id(&self) -> &str {
        &self.channel_id
    }
}

impl Invocation for InteractionEvent {
    fn actor(&self) -> &Actor {
        &self.actor
    }

    fn channel_id(&self) -> &str {
        &self.channel_id
    }
}

impl Invocation for MessageEvent {
    fn actor(&self) -> &Actor {
        &self.author
    }

    fn channel_id(&self) -> &str {
        &self.channel_id
    }
}

impl Invocation for ButtonEvent {
    fn actor(&self) -> &Actor {
        &self.actor
    }

    fn channel_id(&self) -> &str {
        &self.channel_id
    }
}

impl Invocation for SelectEvent {
    fn actor(&self) -> &Actor {
        &self.actor
    }

    fn channel_id(&self) -> &str {
        &self.channel_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_builder() {
        let actor = Actor::new("1", "alice").administrator().with_role("mods");
        assert!(actor.administrator);
        assert!(actor.has_role("mods"));
        assert!(!actor.has_role("admins"));
        assert_eq!(actor.mention(), "<@1>");
    }

    #[test]
    fn test_command_option_accessors() {
        let mut options = HashMap::new();
        options.insert("channel".to_string(), OptionValue::Channel("42".into()));
        options.insert("component".to_string(), OptionValue::String("feedback".into()));

        let event = CommandEvent {
            tenant_id: "t".into(),
            channel_id: "c".into(),
            actor: Actor::new("1", "alice"),
            name: "manager".into(),
            subcommand: Some("enable".into()),
            options,
        };

        assert_eq!(event.channel("channel"), Some("42"));
        assert_eq!(event.string("component"), Some("feedback"));
        assert_eq!(event.string("channel"), None);
        assert_eq!(event.user("user"), None);
    }
}
