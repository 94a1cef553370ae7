//! Private line to the moderators.

use std::sync::Arc;

use async_trait::async_trait;
use courier_core::{BotResult, Embed, OutboundMessage};

use crate::context::MessageContext;
use crate::direct::{DirectComponent, DirectHandler, DirectOptions};
use crate::tenant::Tenant;

/// Forwards relayed messages to the moderators. Must be started again after
/// a restart.
pub struct ModMail;

impl ModMail {
    pub async fn load(tenant: &Arc<Tenant>) -> BotResult<Arc<DirectComponent>> {
        DirectComponent::load(
            tenant,
            DirectOptions {
                name: "ModMail".into(),
                description: "Configure mod mail".into(),
                help: "Lets members message the moderators privately".into(),
                auto_run: false,
            },
            ModMail,
        )
        .await
    }
}

#[async_trait]
impl DirectHandler for ModMail {
    async fn handle(&self, _component: &DirectComponent, destination: &str, ctx: MessageContext) -> BotResult<()> {
        let embed = Embed::info(ctx.content.clone())
            .title("New mod mail")
            .field("From", format!("{} ({})", ctx.author.mention(), ctx.author.name), true)
            .footer(format!("User ID: {}", ctx.author.id));
        let mut message = OutboundMessage::embed(embed);
        for attachment in &ctx.attachments {
            message = message.with_embed(
                Embed::info(attachment.url.clone()).title(attachment.filename.clone()),
            );
        }

        ctx.replier().send(destination, message).await?;
        ctx.replier()
            .ok(&ctx.channel_id, "Your message has been sent to the moderators")
            .await?;
        Ok(())
    }
}
