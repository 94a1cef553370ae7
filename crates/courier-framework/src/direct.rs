//! Components that receive relayed direct messages.
//!
//! A [`DirectComponent`] forwards direct messages into a destination channel
//! of its tenant. While running, it listens in the tenant's direct registry
//! under its key; the relay dispatches there once a user picked it. The
//! forwarding itself is delegated to a [`DirectHandler`].
//!
//! Its command, named after the component, manages it:
//!
//! | Subcommand                                   | Effect                                  |
//! |----------------------------------------------|-----------------------------------------|
//! | `start [channel]`                            | set destination if needed, then listen  |
//! | `stop`                                       | stop listening                          |
//! | `destination [channel]`                      | change the destination                  |
//! | `blocklist <add\|remove\|show\|clear> [user]` | manage users who may not send           |

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use courier_core::{
    BotError, BotResult, ChannelId, Embed, Listener, OptionKind, OptionSpec, Permission, Settings,
};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::command::{Command, Subcommand};
use crate::component::{Component, ComponentBase};
use crate::context::{CommandContext, MessageContext};
use crate::tenant::Tenant;

pub const DESTINATION_SETTING: &str = "destination";
pub const RUNNING_SETTING: &str = "running";
pub const BLOCKLIST_SETTING: &str = "blocklist";

/// Business logic of a [`DirectComponent`].
#[async_trait]
pub trait DirectHandler: Send + Sync + 'static {
    /// Handles a relayed message. `destination` is the configured channel and
    /// the author has already been checked against the block list.
    async fn handle(&self, component: &DirectComponent, destination: &str, ctx: MessageContext) -> BotResult<()>;
}

/// Options for [`DirectComponent::load`].
pub struct DirectOptions {
    pub name: String,
    pub description: String,
    pub help: String,
    /// Persist the running flag and resume after a restart.
    pub auto_run: bool,
}

/// A component forwarding relayed direct messages to a channel.
pub struct DirectComponent {
    base: ComponentBase,
    auto_run: bool,
    running: AtomicBool,
    destination: RwLock<Option<ChannelId>>,
    handler: Box<dyn DirectHandler>,
    this: Weak<DirectComponent>,
}

impl DirectComponent {
    /// Builds the component, loading its destination from the store.
    pub async fn load(
        tenant: &Arc<Tenant>,
        options: DirectOptions,
        handler: impl DirectHandler,
    ) -> BotResult<Arc<Self>> {
        let settings = tenant.settings_for(&options.name);
        let destination = settings.get_setting(DESTINATION_SETTING).await?;

        Ok(Arc::new_cyclic(|this: &Weak<Self>| {
            let command = Self::command(this, &options);
            Self {
                base: ComponentBase::builder(options.name, settings)
                    .help(options.help)
                    .command(command)
                    .build(),
                auto_run: options.auto_run,
                running: AtomicBool::new(false),
                destination: RwLock::new(destination),
                handler: Box::new(handler),
                this: this.clone(),
            }
        }))
    }

    fn command(this: &Weak<Self>, options: &DirectOptions) -> Command {
        let key = options.name.to_lowercase();
        let channel = || OptionSpec::new("channel", "Destination channel", OptionKind::Channel);

        Command::new(key, options.description.clone())
            .subcommand(
                Subcommand::new("start", "Start receiving messages", bind(this, Self::on_start))
                    .option(channel()),
            )
            .subcommand(Subcommand::new(
                "stop",
                "Stop receiving messages",
                bind(this, Self::on_stop),
            ))
            .subcommand(
                Subcommand::new(
                    "destination",
                    "Set where messages are sent",
                    bind(this, Self::on_destination),
                )
                .option(channel()),
            )
            .subcommand(
                Subcommand::new(
                    "blocklist",
                    "Manage users who may not send messages",
                    bind(this, Self::on_blocklist),
                )
                .option(
                    OptionSpec::new("action", "What to do", OptionKind::String)
                        .required()
                        .choice("add", "add")
                        .choice("remove", "remove")
                        .choice("show", "show")
                        .choice("clear", "clear"),
                )
                .option(OptionSpec::new("user", "The user", OptionKind::User)),
            )
    }

    pub fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn settings(&self) -> &Settings {
        self.base.settings()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn auto_run(&self) -> bool {
        self.auto_run
    }

    pub fn destination(&self) -> Option<ChannelId> {
        self.destination.read().clone()
    }

    // -------------------------------------------------------------------------
    // Running state
    // -------------------------------------------------------------------------

    /// Starts listening for relayed messages.
    ///
    /// With auto-run, the running flag is persisted first; if that fails the
    /// component stays stopped.
    pub async fn start(&self, tenant: &Tenant) -> BotResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(BotError::warning(format!("{} is already running", self.base.name())));
        }
        if self.auto_run {
            if let Err(err) = self.settings().set_setting(RUNNING_SETTING, "true").await {
                self.running.store(false, Ordering::SeqCst);
                return Err(err.into());
            }
        }

        let this = self.this.clone();
        tenant.direct().register(
            Listener::new(self.base.key(), move |ctx: MessageContext| {
                let this = this.clone();
                async move {
                    match this.upgrade() {
                        Some(component) => component.receive(ctx).await,
                        None => Err(BotError::internal("direct component dropped")),
                    }
                }
            })
            .permission(Permission::Always)
            .owner(self.base.key()),
        );
        info!(tenant = tenant.id(), component = self.base.key(), "Direct component started");
        Ok(())
    }

    /// Stops listening for relayed messages.
    pub async fn stop(&self, tenant: &Tenant) -> BotResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(BotError::warning(format!("{} is not running", self.base.name())));
        }
        if self.auto_run {
            if let Err(err) = self.settings().remove_setting(RUNNING_SETTING).await {
                self.running.store(true, Ordering::SeqCst);
                return Err(err.into());
            }
        }

        tenant.direct().remove(self.base.key());
        info!(tenant = tenant.id(), component = self.base.key(), "Direct component stopped");
        Ok(())
    }

    async fn receive(&self, ctx: MessageContext) -> BotResult<()> {
        let Some(destination) = self.destination() else {
            return Err(BotError::error(format!(
                "{} has no destination channel",
                self.base.name()
            )));
        };
        if self.is_blocked(&ctx.author.id).await? {
            debug!(component = self.base.key(), user = %ctx.author.id, "Rejected blocked user");
            return Err(BotError::warning("You are not allowed to send messages at the moment"));
        }
        self.handler.handle(self, &destination, ctx).await
    }

    // -------------------------------------------------------------------------
    // Destination and block list
    // -------------------------------------------------------------------------

    /// Validates and persists a new destination channel.
    pub async fn set_destination(&self, tenant: &Tenant, channel: &str) -> BotResult<()> {
        let Some(info) = tenant.platform().channel(channel).await? else {
            return Err(BotError::error("That channel does not exist"));
        };
        if !info.is_text() {
            return Err(BotError::error("Can only send to a text channel"));
        }
        if !info.can_embed {
            return Err(BotError::error(format!("I cannot send embeds in <#{channel}>")));
        }

        self.settings().set_setting(DESTINATION_SETTING, channel).await?;
        *self.destination.write() = Some(channel.to_string());
        Ok(())
    }

    pub async fn is_blocked(&self, user: &str) -> BotResult<bool> {
        Ok(self
            .settings()
            .get_settings(BLOCKLIST_SETTING)
            .await?
            .iter()
            .any(|u| u == user))
    }

    pub async fn blocklist(&self) -> BotResult<Vec<String>> {
        Ok(self.settings().get_settings(BLOCKLIST_SETTING).await?)
    }

    pub async fn block(&self, user: &str) -> BotResult<()> {
        if !self.settings().add_setting(BLOCKLIST_SETTING, user).await? {
            return Err(BotError::warning(format!("<@{user}> is already blocked")));
        }
        Ok(())
    }

    pub async fn unblock(&self, user: &str) -> BotResult<()> {
        if !self
            .settings()
            .remove_setting_value(BLOCKLIST_SETTING, user)
            .await?
        {
            return Err(BotError::warning(format!("<@{user}> is not blocked")));
        }
        Ok(())
    }

    pub async fn clear_blocklist(&self) -> BotResult<()> {
        if self.blocklist().await?.is_empty() {
            return Err(BotError::warning("The block list is already empty"));
        }
        self.settings().remove_setting(BLOCKLIST_SETTING).await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Subcommands
    // -------------------------------------------------------------------------

    async fn on_start(self: Arc<Self>, ctx: CommandContext) -> BotResult<()> {
        if self.is_running() {
            return Err(BotError::warning(format!("{} is already running", self.base.name())));
        }
        let tenant = ctx.tenant();
        let current = self.destination();
        let target = match ctx.channel("channel").map(str::to_string).or_else(|| current.clone()) {
            Some(channel) => channel,
            None => {
                let invoking = tenant.platform().channel(&ctx.channel_id).await?;
                if !invoking.is_some_and(|c| c.is_text()) {
                    return Err(BotError::error("Can only start in a text channel"));
                }
                ctx.channel_id.clone()
            }
        };

        if current.as_deref() != Some(target.as_str()) {
            self.set_destination(tenant, &target).await?;
            ctx.replier()
                .ok(&ctx.channel_id, format!("Destination set to <#{target}>"))
                .await?;
        }

        self.start(tenant).await?;
        ctx.replier()
            .ok(&ctx.channel_id, format!("{} started", self.base.name()))
            .await?;
        Ok(())
    }

    async fn on_stop(self: Arc<Self>, ctx: CommandContext) -> BotResult<()> {
        self.stop(ctx.tenant()).await?;
        ctx.replier()
            .ok(&ctx.channel_id, format!("{} stopped", self.base.name()))
            .await?;
        Ok(())
    }

    async fn on_destination(self: Arc<Self>, ctx: CommandContext) -> BotResult<()> {
        let target = ctx
            .channel("channel")
            .map(str::to_string)
            .unwrap_or_else(|| ctx.channel_id.clone());
        self.set_destination(ctx.tenant(), &target).await?;
        ctx.replier()
            .ok(&ctx.channel_id, format!("Destination set to <#{target}>"))
            .await?;
        Ok(())
    }

    async fn on_blocklist(self: Arc<Self>, ctx: CommandContext) -> BotResult<()> {
        let user = ctx.user("user").map(str::to_string);
        let require_user = || user.clone().ok_or_else(|| BotError::error("Specify a user"));

        match ctx.string("action").unwrap_or_default() {
            "add" => {
                let user = require_user()?;
                self.block(&user).await?;
                ctx.replier().ok(&ctx.channel_id, format!("Blocked <@{user}>")).await?;
            }
            "remove" => {
                let user = require_user()?;
                self.unblock(&user).await?;
                ctx.replier().ok(&ctx.channel_id, format!("Unblocked <@{user}>")).await?;
            }
            "show" => {
                let blocked = self.blocklist().await?;
                if blocked.is_empty() {
                    return Err(BotError::warning("The block list is empty"));
                }
                let list: Vec<String> = blocked.iter().map(|u| format!("<@{u}>")).collect();
                ctx.replier()
                    .embed(
                        &ctx.channel_id,
                        Embed::info(list.join("\n")).title("Blocked users"),
                    )
                    .await?;
            }
            "clear" => {
                self.clear_blocklist().await?;
                ctx.replier().ok(&ctx.channel_id, "Block list cleared").await?;
            }
            other => {
                return Err(BotError::error(format!("Unknown block list action `{other}`")));
            }
        }
        Ok(())
    }
}

/// Adapts a subcommand method into an action holding only a weak reference.
fn bind<F, Fut>(
    this: &Weak<DirectComponent>,
    method: F,
) -> impl Fn(CommandContext) -> BoxFuture<'static, BotResult<()>> + Send + Sync + 'static
where
    F: Fn(Arc<DirectComponent>, CommandContext) -> Fut + Send + Sync + Copy + 'static,
    Fut: Future<Output = BotResult<()>> + Send + 'static,
{
    let this = this.clone();
    move |ctx: CommandContext| -> BoxFuture<'static, BotResult<()>> {
        let this = this.clone();
        Box::pin(async move {
            let component = this
                .upgrade()
                .ok_or_else(|| BotError::internal("direct component dropped"))?;
            method(component, ctx).await
        })
    }
}

#[async_trait]
impl Component for DirectComponent {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    async fn installed(&self, tenant: &Arc<Tenant>) -> BotResult<()> {
        if !self.auto_run || !self.base.is_enabled() {
            return Ok(());
        }
        let resume = self.settings().get_setting_or(RUNNING_SETTING, "false").await?;
        if resume == "true" {
            debug!(tenant = tenant.id(), component = self.base.key(), "Resuming direct component");
            self.start(tenant).await?;
        }
        Ok(())
    }

    async fn disabling(&self, tenant: &Tenant) -> BotResult<()> {
        if self.is_running() {
            if let Err(err) = self.stop(tenant).await {
                // The tenant already dropped the listener.
                self.running.store(false, Ordering::SeqCst);
                warn!(component = self.base.key(), error = %err, "Failed to stop on disable");
                return Err(err);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for DirectComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectComponent")
            .field("base", &self.base)
            .field("auto_run", &self.auto_run)
            .field("running", &self.is_running())
            .field("destination", &self.destination())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use courier_core::testing::{FakePlatform, FlakyStore};
    use courier_core::{
        Actor, ChannelInfo, ChannelKind, CommandEvent, MemoryStore, MessageEvent, OptionValue,
        Scope, Tone,
    };
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::context::Context;

    struct Sink;

    #[async_trait]
    impl DirectHandler for Sink {
        async fn handle(&self, _component: &DirectComponent, destination: &str, ctx: MessageContext) -> BotResult<()> {
            ctx.replier().text(destination, ctx.content.clone()).await?;
            Ok(())
        }
    }

    async fn setup(auto_run: bool) -> (Arc<FakePlatform>, Arc<MemoryStore>, Arc<Tenant>, Arc<DirectComponent>) {
        let platform = Arc::new(FakePlatform::new());
        let store = Arc::new(MemoryStore::new());
        let tenant = Tenant::new("t1", "Alpha", platform.clone(), store.clone());
        let component = DirectComponent::load(
            &tenant,
            DirectOptions {
                name: "Inbox".into(),
                description: "Inbox".into(),
                help: String::new(),
                auto_run,
            },
            Sink,
        )
        .await
        .unwrap();
        tenant.install(component.clone()).await.unwrap();
        tenant.enable_component("inbox").await.unwrap().settled().await;
        (platform, store, tenant, component)
    }

    fn command(tenant: &Arc<Tenant>, sub: &str, options: &[(&str, OptionValue)]) -> CommandEvent {
        CommandEvent {
            tenant_id: tenant.id().to_string(),
            channel_id: "here".into(),
            actor: Actor::new("1", "admin").administrator(),
            name: "inbox".into(),
            subcommand: Some(sub.into()),
            options: options
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<HashMap<_, _>>(),
        }
    }

    fn dm(author: &str) -> MessageEvent {
        MessageEvent {
            message_id: "m".into(),
            channel_id: "dm".into(),
            tenant_id: None,
            author: Actor::new(author, author),
            content: "hi".into(),
            attachments: Vec::new(),
        }
    }

    fn last_tone(platform: &FakePlatform) -> Tone {
        platform.sent_to("here").pop().unwrap().embeds[0].tone
    }

    #[tokio::test]
    async fn test_start_defaults_to_invoking_channel() {
        let (platform, store, tenant, component) = setup(true).await;
        tenant.handle_command(command(&tenant, "start", &[])).await;

        assert!(component.is_running());
        assert_eq!(component.destination().as_deref(), Some("here"));
        assert!(tenant.direct().contains("inbox"));
        assert_eq!(
            store.values_now(&Scope::new("t1", "inbox"), RUNNING_SETTING),
            vec!["true"]
        );
        let replies: Vec<_> = platform
            .sent_to("here")
            .iter()
            .map(|m| m.summary().to_string())
            .collect();
        assert_eq!(replies, vec!["Destination set to <#here>", "Inbox started"]);

        tenant.handle_command(command(&tenant, "start", &[])).await;
        assert_eq!(last_tone(&platform), Tone::Caution);
    }

    #[tokio::test]
    async fn test_start_rejects_non_text_channel() {
        let (platform, _store, tenant, component) = setup(false).await;
        platform.add_channel(
            "here",
            Some(ChannelInfo {
                id: "here".into(),
                kind: ChannelKind::Voice,
                can_embed: true,
            }),
        );
        tenant.handle_command(command(&tenant, "start", &[])).await;

        assert!(!component.is_running());
        let reply = platform.sent_to("here").pop().unwrap();
        assert_eq!(reply.summary(), "Can only start in a text channel");
    }

    #[tokio::test]
    async fn test_destination_requires_embeds() {
        let (platform, _store, tenant, component) = setup(false).await;
        platform.add_channel(
            "quiet",
            Some(ChannelInfo {
                id: "quiet".into(),
                kind: ChannelKind::Text,
                can_embed: false,
            }),
        );
        let options = [("channel", OptionValue::Channel("quiet".into()))];
        tenant.handle_command(command(&tenant, "destination", &options)).await;

        assert_eq!(last_tone(&platform), Tone::Error);
        assert_eq!(component.destination(), None);
    }

    #[tokio::test]
    async fn test_blocklist_edge_cases() {
        let (platform, store, tenant, _component) = setup(false).await;
        let scope = Scope::new("t1", "inbox");
        let action = |a: &str| ("action", OptionValue::String(a.into()));
        let user = ("user", OptionValue::User("9".into()));

        tenant.handle_command(command(&tenant, "blocklist", &[action("show")])).await;
        assert_eq!(last_tone(&platform), Tone::Caution);
        tenant.handle_command(command(&tenant, "blocklist", &[action("clear")])).await;
        assert_eq!(last_tone(&platform), Tone::Caution);
        tenant.handle_command(command(&tenant, "blocklist", &[action("remove"), user.clone()])).await;
        assert_eq!(last_tone(&platform), Tone::Caution);
        tenant.handle_command(command(&tenant, "blocklist", &[action("add")])).await;
        assert_eq!(last_tone(&platform), Tone::Error);
        assert!(store.values_now(&scope, BLOCKLIST_SETTING).is_empty());

        tenant.handle_command(command(&tenant, "blocklist", &[action("add"), user.clone()])).await;
        assert_eq!(last_tone(&platform), Tone::Success);
        tenant.handle_command(command(&tenant, "blocklist", &[action("add"), user.clone()])).await;
        assert_eq!(last_tone(&platform), Tone::Caution);
        assert_eq!(store.values_now(&scope, BLOCKLIST_SETTING), vec!["9"]);

        tenant.handle_command(command(&tenant, "blocklist", &[action("clear")])).await;
        assert_eq!(last_tone(&platform), Tone::Success);
        assert!(store.values_now(&scope, BLOCKLIST_SETTING).is_empty());
    }

    #[tokio::test]
    async fn test_blocked_user_is_rejected_before_handler() {
        let (platform, _store, tenant, component) = setup(false).await;
        assert_ok!(component.set_destination(&tenant, "inbox").await);
        assert_ok!(component.start(&tenant).await);
        assert_ok!(component.block("9").await);

        let err = assert_err!(
            tenant
                .direct()
                .dispatch("inbox", Context::new(dm("9"), Arc::clone(&tenant)))
                .await
        );
        assert_eq!(err.to_string(), "You are not allowed to send messages at the moment");
        assert!(platform.sent_to("inbox").is_empty());

        assert_ok!(
            tenant
                .direct()
                .dispatch("inbox", Context::new(dm("8"), Arc::clone(&tenant)))
                .await
        );
        assert_eq!(platform.sent_to("inbox").len(), 1);
    }

    #[tokio::test]
    async fn test_missing_destination_is_an_error() {
        let (_platform, _store, tenant, component) = setup(false).await;
        assert_ok!(component.start(&tenant).await);

        let err = assert_err!(
            tenant
                .direct()
                .dispatch("inbox", Context::new(dm("8"), Arc::clone(&tenant)))
                .await
        );
        assert!(matches!(err, BotError::Error(_)));
    }

    #[tokio::test]
    async fn test_disable_stops_running_component() {
        let (_platform, store, tenant, component) = setup(true).await;
        assert_ok!(component.set_destination(&tenant, "inbox").await);
        assert_ok!(component.start(&tenant).await);

        assert_ok!(tenant.disable_component("inbox").await).settled().await;

        assert!(!component.is_running());
        assert!(!tenant.direct().contains("inbox"));
        assert!(!tenant.commands().contains("inbox"));
        assert!(
            store
                .values_now(&Scope::new("t1", "inbox"), RUNNING_SETTING)
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_stop_when_not_running_warns() {
        let (platform, _store, tenant, _component) = setup(false).await;
        tenant.handle_command(command(&tenant, "stop", &[])).await;
        assert_eq!(last_tone(&platform), Tone::Caution);
    }

    #[tokio::test]
    async fn test_start_rolls_back_when_persist_fails() {
        let platform = Arc::new(FakePlatform::new());
        let store = Arc::new(FlakyStore::new());
        let tenant = Tenant::new("t1", "Alpha", platform, store.clone());
        let component = DirectComponent::load(
            &tenant,
            DirectOptions {
                name: "Inbox".into(),
                description: "Inbox".into(),
                help: String::new(),
                auto_run: true,
            },
            Sink,
        )
        .await
        .unwrap();
        tenant.install(component.clone()).await.unwrap();
        tenant.enable_component("inbox").await.unwrap().settled().await;

        store.fail_writes(true);
        let err = assert_err!(component.start(&tenant).await);
        assert!(matches!(err, BotError::Store(_)));
        assert!(!component.is_running());
        assert!(!tenant.direct().contains("inbox"));

        store.fail_writes(false);
        assert_ok!(component.start(&tenant).await);
        store.fail_writes(true);
        assert_err!(component.stop(&tenant).await);
        assert!(component.is_running());
        assert!(tenant.direct().contains("inbox"));
    }
}
