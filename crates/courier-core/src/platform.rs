//! The remote chat platform collaborator.
//!
//! Everything the bot asks of the platform goes through [`Platform`]. The
//! gateway connection, wire format and rate limiting live behind it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PlatformResult;
use crate::event::{ChannelId, MessageId, RemoteId, TenantId};
use crate::message::OutboundMessage;

// =============================================================================
// Command Definitions
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// A typed slash command.
    #[default]
    Slash,
    /// A context-menu action on a message.
    MessageAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    String,
    Integer,
    Boolean,
    User,
    Channel,
    Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionChoice {
    pub name: String,
    pub value: String,
}

/// One typed option of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSpec {
    pub name: String,
    pub description: String,
    pub kind: OptionKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<OptionChoice>,
}

impl OptionSpec {
    /// An optional option.
    pub fn new(name: impl Into<String>, description: impl Into<String>, kind: OptionKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            required: false,
            choices: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn choice(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.choices.push(OptionChoice {
            name: name.into(),
            value: value.into(),
        });
        self
    }
}

/// The definition pushed to the platform when a command is registered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: CommandKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subcommands: Vec<CommandSpec>,
}

// =============================================================================
// Lookups
// =============================================================================

/// A tenant the bot and a user are both members of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantInfo {
    pub id: TenantId,
    pub name: String,
}

impl TenantInfo {
    pub fn new(id: impl Into<TenantId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    Voice,
    Category,
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub kind: ChannelKind,
    /// Whether the bot may post embeds in the channel.
    pub can_embed: bool,
}

impl ChannelInfo {
    /// A text channel where the bot may post embeds.
    pub fn text(id: impl Into<ChannelId>) -> Self {
        Self {
            id: id.into(),
            kind: ChannelKind::Text,
            can_embed: true,
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == ChannelKind::Text
    }
}

// =============================================================================
// Platform
// =============================================================================

/// Client for the remote chat platform.
#[async_trait]
pub trait Platform: Send + Sync + 'static {
    /// Creates or overwrites a command in a tenant and returns its remote id.
    async fn upsert_command(&self, tenant: &str, spec: &CommandSpec) -> PlatformResult<RemoteId>;

    /// Deletes a previously registered command.
    async fn delete_command(&self, tenant: &str, remote_id: &str) -> PlatformResult<()>;

    async fn send_message(&self, channel: &str, message: OutboundMessage) -> PlatformResult<MessageId>;

    async fn edit_message(
        &self,
        channel: &str,
        message_id: &str,
        message: OutboundMessage,
    ) -> PlatformResult<()>;

    async fn delete_message(&self, channel: &str, message_id: &str) -> PlatformResult<()>;

    /// Tenants that both the bot and `user` are members of.
    async fn mutual_tenants(&self, user: &str) -> PlatformResult<Vec<TenantInfo>>;

    /// Looks up a channel. `None` if it does not exist or is not visible.
    async fn channel(&self, channel: &str) -> PlatformResult<Option<ChannelInfo>>;
}
