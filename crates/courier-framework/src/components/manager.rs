//! The always-enabled component that manages all others.

use std::sync::Arc;
use std::time::Instant;

use courier_core::{BotResult, Embed, OptionKind, OptionSpec, OutboundMessage};

use crate::command::Command;
use crate::component::{Component, ComponentBase};
use crate::context::CommandContext;
use crate::tenant::Tenant;

fn component_option() -> OptionSpec {
    OptionSpec::new("component", "The component", OptionKind::String).required()
}

fn component_name(ctx: &CommandContext) -> String {
    ctx.string("component").unwrap_or_default().to_string()
}

/// Enables, disables and grants access to components.
pub struct Manager {
    base: ComponentBase,
}

impl Manager {
    pub fn new(tenant: &Tenant) -> Arc<Self> {
        let base = ComponentBase::builder("Manager", tenant.settings_for("manager"))
            .help("Enable, disable and grant access to components")
            .always_enabled()
            .command(
                Command::new("enable", "Enable a component")
                    .option(component_option())
                    .action(enable),
            )
            .command(
                Command::new("disable", "Disable a component")
                    .option(component_option())
                    .action(disable),
            )
            .command(
                Command::new("permission", "Let a role use a component")
                    .option(component_option())
                    .option(OptionSpec::new("role", "The role", OptionKind::Role).required())
                    .action(permission),
            )
            .command(
                Command::new("revoke", "Restrict a component to administrators")
                    .option(component_option())
                    .action(revoke),
            )
            .command(Command::new("components", "List components").action(components))
            .command(Command::new("ping", "Check the bot's latency").action(ping))
            .build();

        Arc::new(Self { base })
    }
}

impl Component for Manager {
    fn base(&self) -> &ComponentBase {
        &self.base
    }
}

async fn enable(ctx: CommandContext) -> BotResult<()> {
    let name = component_name(&ctx);
    // Remote registration finishes in the background.
    let _sync = ctx.tenant().enable_component(&name).await?;
    ctx.replier()
        .ok(&ctx.channel_id, format!("Enabled {name}"))
        .await?;
    Ok(())
}

async fn disable(ctx: CommandContext) -> BotResult<()> {
    let name = component_name(&ctx);
    let _sync = ctx.tenant().disable_component(&name).await?;
    ctx.replier()
        .ok(&ctx.channel_id, format!("Disabled {name}"))
        .await?;
    Ok(())
}

async fn permission(ctx: CommandContext) -> BotResult<()> {
    let name = component_name(&ctx);
    let role = ctx.role("role").unwrap_or_default().to_string();
    ctx.tenant().grant_role(&name, &role).await?;
    ctx.replier()
        .ok(&ctx.channel_id, format!("<@&{role}> can now use {name}"))
        .await?;
    Ok(())
}

async fn revoke(ctx: CommandContext) -> BotResult<()> {
    let name = component_name(&ctx);
    ctx.tenant().revoke_roles(&name).await?;
    ctx.replier()
        .ok(&ctx.channel_id, format!("{name} is restricted to administrators"))
        .await?;
    Ok(())
}

async fn components(ctx: CommandContext) -> BotResult<()> {
    let embed = ctx
        .tenant()
        .components()
        .iter()
        .fold(Embed::info("").title("Components"), |embed, component| {
            let base = component.base();
            let state = if base.is_always_enabled() {
                "always enabled"
            } else if base.is_enabled() {
                "enabled"
            } else {
                "disabled"
            };
            embed.field(
                format!("{} ({state})", base.name()),
                base.help().to_string(),
                false,
            )
        });
    ctx.replier().embed(&ctx.channel_id, embed).await?;
    Ok(())
}

async fn ping(ctx: CommandContext) -> BotResult<()> {
    let started = Instant::now();
    let message_id = ctx.replier().text(&ctx.channel_id, "Pong!").await?;
    let elapsed = started.elapsed().as_millis();
    ctx.replier()
        .edit(
            &ctx.channel_id,
            &message_id,
            OutboundMessage::text(format!("Pong! {elapsed} ms")),
        )
        .await
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use courier_core::testing::FakePlatform;
    use courier_core::{Actor, CommandEvent, Dispatch, MemoryStore, OptionValue, Tone};

    use super::*;
    use crate::components::Feedback;

    async fn setup() -> (Arc<FakePlatform>, Arc<Tenant>) {
        let platform = Arc::new(FakePlatform::new());
        let tenant = Tenant::new("t1", "Alpha", platform.clone(), Arc::new(MemoryStore::new()));
        tenant.install(Manager::new(&tenant)).await.unwrap().settled().await;
        let feedback = Feedback::load(&tenant).await.unwrap();
        tenant.install(feedback).await.unwrap();
        (platform, tenant)
    }

    fn invoke(name: &str, options: &[(&str, OptionValue)]) -> CommandEvent {
        CommandEvent {
            tenant_id: "t1".into(),
            channel_id: "admin".into(),
            actor: Actor::new("1", "owner").administrator(),
            name: name.into(),
            subcommand: None,
            options: options
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[tokio::test]
    async fn test_enable_and_disable_through_commands() {
        let (platform, tenant) = setup().await;
        let feedback = || [("component", OptionValue::String("feedback".into()))];

        assert_eq!(tenant.handle_command(invoke("enable", &feedback())).await, Dispatch::Handled);
        assert!(tenant.component("feedback").unwrap().base().is_enabled());
        assert!(tenant.commands().contains("feedback"));

        tenant.handle_command(invoke("enable", &feedback())).await;
        let last = platform.sent_to("admin").pop().unwrap();
        assert_eq!(last.embeds[0].tone, Tone::Caution);

        tenant.handle_command(invoke("disable", &feedback())).await;
        assert!(!tenant.component("feedback").unwrap().base().is_enabled());
        assert!(!tenant.commands().contains("feedback"));
    }

    #[tokio::test]
    async fn test_manager_cannot_be_disabled() {
        let (platform, tenant) = setup().await;
        tenant
            .handle_command(invoke(
                "disable",
                &[("component", OptionValue::String("Manager".into()))],
            ))
            .await;

        let last = platform.sent_to("admin").pop().unwrap();
        assert_eq!(last.embeds[0].tone, Tone::Caution);
        assert!(tenant.commands().contains("disable"));
    }

    #[tokio::test]
    async fn test_ping_edits_reply() {
        let (platform, tenant) = setup().await;
        tenant.handle_command(invoke("ping", &[])).await;

        let (id, _) = platform.visible_in("admin").pop().unwrap();
        let edits = platform.edits();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].0, id);
        assert!(edits[0].1.content.as_deref().unwrap().starts_with("Pong! "));
    }

    #[tokio::test]
    async fn test_non_admin_is_denied() {
        let (platform, tenant) = setup().await;
        let mut event = invoke("components", &[]);
        event.actor = Actor::new("2", "member");
        tenant.handle_command(event).await;

        let last = platform.sent_to("admin").pop().unwrap();
        assert_eq!(last.summary(), "You do not have permission to do that");
    }

    #[tokio::test]
    async fn test_components_lists_state() {
        let (platform, tenant) = setup().await;
        tenant.handle_command(invoke("components", &[])).await;

        let listing = platform.sent_to("admin").pop().unwrap();
        let names: Vec<_> = listing.embeds[0].fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Manager (always enabled)", "Feedback (disabled)"]);
    }
}
