//! Member feedback inbox.

use std::sync::Arc;

use async_trait::async_trait;
use courier_core::{BotResult, Embed, OutboundMessage};

use crate::context::MessageContext;
use crate::direct::{DirectComponent, DirectHandler, DirectOptions};
use crate::tenant::Tenant;

/// Forwards relayed messages as feedback. Resumes after a restart.
pub struct Feedback;

impl Feedback {
    pub async fn load(tenant: &Arc<Tenant>) -> BotResult<Arc<DirectComponent>> {
        DirectComponent::load(
            tenant,
            DirectOptions {
                name: "Feedback".into(),
                description: "Configure the feedback inbox".into(),
                help: "Lets members send feedback to a channel through direct messages".into(),
                auto_run: true,
            },
            Feedback,
        )
        .await
    }
}

#[async_trait]
impl DirectHandler for Feedback {
    async fn handle(&self, _component: &DirectComponent, destination: &str, ctx: MessageContext) -> BotResult<()> {
        let mut embed = Embed::info(ctx.content.clone())
            .title(format!("Feedback from {}", ctx.author.name))
            .footer(format!("User ID: {}", ctx.author.id));
        if !ctx.attachments.is_empty() {
            let urls: Vec<&str> = ctx.attachments.iter().map(|a| a.url.as_str()).collect();
            embed = embed.field("Attachments", urls.join("\n"), false);
        }

        ctx.replier()
            .send(destination, OutboundMessage::embed(embed))
            .await?;
        ctx.replier()
            .ok(&ctx.channel_id, "Your feedback has been sent")
            .await?;
        Ok(())
    }
}
