//! Replies to the user.

use std::sync::Arc;

use tracing::{error, warn};

use crate::error::{BotError, BotResult, ErrorKind};
use crate::event::MessageId;
use crate::message::{Embed, OutboundMessage};
use crate::platform::Platform;

const GENERIC_FAILURE: &str = "Something went wrong";

/// Sends messages through the platform and converts listener errors into
/// user-facing replies.
#[derive(Clone)]
pub struct Replier {
    platform: Arc<dyn Platform>,
}

impl Replier {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    pub async fn send(&self, channel: &str, message: OutboundMessage) -> BotResult<MessageId> {
        Ok(self.platform.send_message(channel, message).await?)
    }

    pub async fn text(&self, channel: &str, content: impl Into<String>) -> BotResult<MessageId> {
        self.send(channel, OutboundMessage::text(content)).await
    }

    pub async fn embed(&self, channel: &str, embed: Embed) -> BotResult<MessageId> {
        self.send(channel, OutboundMessage::embed(embed)).await
    }

    /// Sends a success-toned confirmation.
    pub async fn ok(&self, channel: &str, description: impl Into<String>) -> BotResult<MessageId> {
        self.embed(channel, Embed::success(description)).await
    }

    pub async fn edit(&self, channel: &str, message_id: &str, message: OutboundMessage) -> BotResult<()> {
        Ok(self.platform.edit_message(channel, message_id, message).await?)
    }

    pub async fn delete(&self, channel: &str, message_id: &str) -> BotResult<()> {
        Ok(self.platform.delete_message(channel, message_id).await?)
    }

    /// Answers `err` in `channel`.
    ///
    /// Warnings and errors are shown verbatim. Faults are logged and answered
    /// with a generic message. Failing to deliver the report is only logged.
    pub async fn report(&self, channel: &str, err: &BotError) {
        let embed = match err.kind() {
            ErrorKind::Warning => Embed::caution(err.to_string()),
            ErrorKind::Error => Embed::error(err.to_string()),
            ErrorKind::Fault => {
                error!(channel, error = %err, "Listener failed");
                Embed::error(GENERIC_FAILURE)
            }
        };

        if let Err(send_err) = self.embed(channel, embed).await {
            warn!(channel, error = %send_err, "Failed to deliver error reply");
        }
    }
}

impl std::fmt::Debug for Replier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replier").finish_non_exhaustive()
    }
}
