//! The direct-message relay.
//!
//! A user writing to the bot privately is walked through choosing where the
//! message should go: first the server (skipped when only one is shared),
//! then the component. The chosen tenant's direct registry receives the
//! captured message.
//!
//! ```text
//!                 direct message
//!  Idle ─────────────────────────────▶ AwaitingServerChoice
//!   │  (one mutual tenant)                     │ menu "server"
//!   └──────────────────────▶ AwaitingComponentChoice ◀┘
//!                                    │ menu "component"
//!                                    ▼
//!                                Delivered
//!
//!  button "cancel" from any waiting state ──▶ Cancelled
//! ```
//!
//! A user has at most one pending session. Direct messages arriving while one
//! is pending, or from users sharing no tenant with the bot, are dropped.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::{Arc, Weak};

use courier_core::{
    BotError, BotResult, Button, ButtonEvent, ButtonStyle, Dispatch, Embed, HandlerRegistry,
    Listener, MessageEvent, OutboundMessage, Platform, Replier, SelectEvent, SelectMenu,
    TenantId, TenantInfo, UserId, WorkerPool,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::tenant::Tenant;

pub const SERVER_MENU: &str = "server";
pub const COMPONENT_MENU: &str = "component";
pub const CANCEL_BUTTON: &str = "cancel";

const NO_PENDING: &str = "There is no message waiting to be sent";

/// Resolves tenant ids to live tenants.
pub trait TenantDirectory: Send + Sync + 'static {
    fn tenant(&self, id: &str) -> Option<Arc<Tenant>>;
}

/// Where a pending session is waiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStage {
    AwaitingServerChoice,
    AwaitingComponentChoice { tenant: TenantId },
}

#[derive(Debug)]
struct RelaySession {
    message: MessageEvent,
    stage: SessionStage,
    prompt: Option<String>,
}

/// Routes direct messages to tenant components.
pub struct Relay {
    platform: Arc<dyn Platform>,
    replier: Replier,
    directory: Arc<dyn TenantDirectory>,
    workers: WorkerPool,
    sessions: Mutex<HashMap<UserId, RelaySession>>,
    menus: HandlerRegistry<SelectEvent>,
    buttons: HandlerRegistry<ButtonEvent>,
}

impl Relay {
    /// Creates a relay running at most `max_workers` session setups at once.
    pub fn new(
        platform: Arc<dyn Platform>,
        directory: Arc<dyn TenantDirectory>,
        max_workers: usize,
    ) -> Arc<Self> {
        let replier = Replier::new(Arc::clone(&platform));
        Arc::new_cyclic(|this: &Weak<Self>| {
            let menus = HandlerRegistry::new("relay-menus");
            let buttons = HandlerRegistry::new("relay-buttons");

            let relay = this.clone();
            menus.register(Listener::new(SERVER_MENU, move |event: SelectEvent| {
                let relay = relay.clone();
                async move { upgrade(&relay)?.choose_server(event).await }
            }));
            let relay = this.clone();
            menus.register(Listener::new(COMPONENT_MENU, move |event: SelectEvent| {
                let relay = relay.clone();
                async move { upgrade(&relay)?.choose_component(event).await }
            }));
            let relay = this.clone();
            buttons.register(Listener::new(CANCEL_BUTTON, move |event: ButtonEvent| {
                let relay = relay.clone();
                async move { upgrade(&relay)?.cancel(event).await }
            }));

            Self {
                workers: WorkerPool::new(max_workers, replier.clone()),
                platform,
                replier,
                directory,
                sessions: Mutex::new(HashMap::new()),
                menus,
                buttons,
            }
        })
    }

    /// The stage of `user`'s pending session, if any.
    pub fn pending(&self, user: &str) -> Option<SessionStage> {
        self.sessions.lock().get(user).map(|s| s.stage.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    // -------------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------------

    /// Starts a session for a direct message on a worker task.
    pub fn on_direct_message(self: &Arc<Self>, message: MessageEvent) -> JoinHandle<()> {
        let channel = message.channel_id.clone();
        let relay = Arc::clone(self);
        self.workers
            .spawn("relay", channel, async move { relay.begin(message).await })
    }

    /// Handles a selection made in a direct channel.
    pub async fn handle_select(&self, event: SelectEvent) -> Dispatch {
        let key = event.menu_id.clone();
        self.menus.handle(&key, event, &self.replier).await
    }

    /// Handles a button clicked in a direct channel.
    pub async fn handle_button(&self, event: ButtonEvent) -> Dispatch {
        let key = event.button_id.clone();
        self.buttons.handle(&key, event, &self.replier).await
    }

    async fn begin(&self, message: MessageEvent) -> BotResult<()> {
        let user = message.author.id.clone();
        if self.sessions.lock().contains_key(&user) {
            debug!(user = %user, "Session already pending, dropping message");
            return Ok(());
        }

        let tenants = self.platform.mutual_tenants(&user).await?;
        if tenants.is_empty() {
            debug!(user = %user, "No mutual tenants, dropping message");
            return Ok(());
        }

        let channel = message.channel_id.clone();
        match self.sessions.lock().entry(user.clone()) {
            Entry::Occupied(_) => {
                debug!(user = %user, "Session already pending, dropping message");
                return Ok(());
            }
            Entry::Vacant(slot) => {
                slot.insert(RelaySession {
                    message,
                    stage: SessionStage::AwaitingServerChoice,
                    prompt: None,
                });
            }
        }
        info!(user = %user, tenants = tenants.len(), "Relay session started");

        let offered = match tenants.as_slice() {
            [only] => self.offer_components(&user, &channel, &only.id).await,
            _ => self.offer_servers(&user, &channel, &tenants).await,
        };
        if offered.is_err() {
            self.sessions.lock().remove(&user);
        }
        offered
    }

    // -------------------------------------------------------------------------
    // Prompts
    // -------------------------------------------------------------------------

    async fn offer_servers(&self, user: &str, channel: &str, tenants: &[TenantInfo]) -> BotResult<()> {
        let menu = tenants.iter().fold(
            SelectMenu::new(SERVER_MENU, "Choose a server"),
            |menu, t| menu.option(t.name.clone(), t.id.clone()),
        );
        let prompt = OutboundMessage::embed(Embed::info(
            "Which server should receive your message?",
        ))
        .with_select(menu)
        .with_buttons(vec![cancel_button()]);

        let prompt_id = self.replier.send(channel, prompt).await?;
        self.attach_prompt(user, channel, prompt_id).await;
        Ok(())
    }

    async fn offer_components(&self, user: &str, channel: &str, tenant_id: &str) -> BotResult<()> {
        let Some(tenant) = self.directory.tenant(tenant_id) else {
            self.sessions.lock().remove(user);
            return Err(BotError::error("That server is not available"));
        };

        let keys = tenant.direct().keys();
        if keys.is_empty() {
            self.sessions.lock().remove(user);
            debug!(user, tenant = tenant_id, "Tenant has no direct listeners, abandoning session");
            return Err(BotError::warning(
                "The server does not handle any messages at the moment",
            ));
        }

        match self.sessions.lock().get_mut(user) {
            Some(session) => {
                session.stage = SessionStage::AwaitingComponentChoice {
                    tenant: tenant_id.to_string(),
                };
            }
            None => return Ok(()),
        }

        let menu = keys.iter().fold(
            SelectMenu::new(COMPONENT_MENU, "Choose where to send it"),
            |menu, key| menu.option(capitalize(key), format!("{tenant_id}-{key}")),
        );
        let prompt = OutboundMessage::embed(Embed::info(format!(
            "Where in {} should your message go?",
            tenant.name()
        )))
        .with_select(menu)
        .with_buttons(vec![cancel_button()]);

        let prompt_id = self.replier.send(channel, prompt).await?;
        self.attach_prompt(user, channel, prompt_id).await;
        Ok(())
    }

    /// Records the prompt on the session, or deletes it if the session ended
    /// while the prompt was being sent.
    async fn attach_prompt(&self, user: &str, channel: &str, prompt_id: String) {
        let orphaned = match self.sessions.lock().get_mut(user) {
            Some(session) => {
                session.prompt = Some(prompt_id);
                None
            }
            None => Some(prompt_id),
        };
        if let Some(prompt_id) = orphaned {
            self.delete_prompt(channel, &prompt_id).await;
        }
    }

    async fn delete_prompt(&self, channel: &str, message_id: &str) {
        if let Err(err) = self.replier.delete(channel, message_id).await {
            warn!(channel, message = message_id, error = %err, "Failed to delete relay prompt");
        }
    }

    // -------------------------------------------------------------------------
    // Choices
    // -------------------------------------------------------------------------

    async fn choose_server(&self, event: SelectEvent) -> BotResult<()> {
        let user = &event.actor.id;
        self.delete_prompt(&event.channel_id, &event.message_id).await;

        let waiting = match self.sessions.lock().get_mut(user.as_str()) {
            Some(session) if session.stage == SessionStage::AwaitingServerChoice => {
                session.prompt = None;
                true
            }
            _ => false,
        };
        if !waiting {
            return Err(BotError::warning(NO_PENDING));
        }

        self.offer_components(user, &event.channel_id, &event.option).await
    }

    async fn choose_component(&self, event: SelectEvent) -> BotResult<()> {
        self.delete_prompt(&event.channel_id, &event.message_id).await;

        let Some((tenant_id, key)) = event.option.split_once('-') else {
            return Err(BotError::error("Could not send to the given service, try again"));
        };

        // Only a session waiting on a component of this very tenant may be consumed.
        let session = {
            let mut sessions = self.sessions.lock();
            let expected = SessionStage::AwaitingComponentChoice {
                tenant: tenant_id.to_string(),
            };
            match sessions.get(event.actor.id.as_str()) {
                Some(session) if session.stage == expected => {
                    sessions.remove(event.actor.id.as_str())
                }
                _ => None,
            }
        };
        let Some(session) = session else {
            debug!(user = %event.actor.id, option = %event.option, "Component choice without a matching session");
            return Err(BotError::warning(NO_PENDING));
        };

        let Some(tenant) = self.directory.tenant(tenant_id) else {
            return Err(BotError::error("That server is not available"));
        };

        let ctx = Context::new(session.message, Arc::clone(&tenant));
        match tenant.direct().dispatch(key, ctx).await? {
            Dispatch::Handled => {
                info!(user = %event.actor.id, tenant = tenant_id, component = key, "Relayed message");
                Ok(())
            }
            Dispatch::Ignored => Err(BotError::error(
                "Could not send to the given service, try again",
            )),
        }
    }

    async fn cancel(&self, event: ButtonEvent) -> BotResult<()> {
        self.delete_prompt(&event.channel_id, &event.message_id).await;
        let removed = self.sessions.lock().remove(event.actor.id.as_str());
        debug!(user = %event.actor.id, pending = removed.is_some(), "Relay session cancelled");

        self.replier
            .embed(&event.channel_id, Embed::info("Successfully cancelled"))
            .await?;
        Ok(())
    }
}

fn upgrade(relay: &Weak<Relay>) -> BotResult<Arc<Relay>> {
    relay
        .upgrade()
        .ok_or_else(|| BotError::internal("relay dropped"))
}

fn cancel_button() -> Button {
    Button::new(CANCEL_BUTTON, "Cancel", ButtonStyle::Danger)
}

/// Upper-cases the first character only.
fn capitalize(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("sessions", &self.session_count())
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use courier_core::testing::FakePlatform;
    use courier_core::{Actor, MemoryStore, Tone};
    use parking_lot::RwLock;

    use super::*;
    use crate::context::MessageContext;
    use crate::direct::{DirectComponent, DirectHandler, DirectOptions};

    #[derive(Default)]
    struct Directory(RwLock<HashMap<String, Arc<Tenant>>>);

    impl TenantDirectory for Directory {
        fn tenant(&self, id: &str) -> Option<Arc<Tenant>> {
            self.0.read().get(id).cloned()
        }
    }

    struct Forward;

    #[async_trait]
    impl DirectHandler for Forward {
        async fn handle(&self, _component: &DirectComponent, destination: &str, ctx: MessageContext) -> BotResult<()> {
            ctx.replier()
                .text(destination, format!("{}: {}", ctx.author.name, ctx.content))
                .await?;
            Ok(())
        }
    }

    struct Harness {
        platform: Arc<FakePlatform>,
        directory: Arc<Directory>,
        relay: Arc<Relay>,
    }

    impl Harness {
        fn new() -> Self {
            let platform = Arc::new(FakePlatform::new());
            let directory = Arc::new(Directory::default());
            let relay = Relay::new(platform.clone(), directory.clone(), 4);
            Self {
                platform,
                directory,
                relay,
            }
        }

        async fn tenant(&self, id: &str, name: &str, running: &[&str]) -> Arc<Tenant> {
            let tenant = Tenant::new(id, name, self.platform.clone(), Arc::new(MemoryStore::new()));
            for component in running {
                let direct = DirectComponent::load(
                    &tenant,
                    DirectOptions {
                        name: component.to_string(),
                        description: String::new(),
                        help: String::new(),
                        auto_run: false,
                    },
                    Forward,
                )
                .await
                .unwrap();
                direct.set_destination(&tenant, &format!("{id}-inbox")).await.unwrap();
                direct.start(&tenant).await.unwrap();
                tenant.install(direct).await.unwrap();
            }
            self.directory.0.write().insert(id.to_string(), tenant.clone());
            tenant
        }

        fn dm(&self, user: &str, content: &str) -> MessageEvent {
            MessageEvent {
                message_id: format!("dm-{content}"),
                channel_id: format!("dm-{user}"),
                tenant_id: None,
                author: Actor::new(user, user),
                content: content.into(),
                attachments: Vec::new(),
            }
        }

        fn last_prompt(&self, user: &str) -> (String, SelectMenu) {
            let (id, message) = self
                .platform
                .visible_in(&format!("dm-{user}"))
                .into_iter()
                .rev()
                .find(|(_, m)| m.select_menu().is_some())
                .expect("no prompt visible");
            (id, message.select_menu().cloned().unwrap())
        }

        fn select(&self, user: &str, menu: &str, option: &str) -> SelectEvent {
            let (message_id, _) = self.last_prompt(user);
            SelectEvent {
                tenant_id: None,
                channel_id: format!("dm-{user}"),
                message_id,
                actor: Actor::new(user, user),
                menu_id: menu.into(),
                option: option.into(),
            }
        }
    }

    #[tokio::test]
    async fn test_single_tenant_goes_straight_to_components() {
        let h = Harness::new();
        h.tenant("1", "Alpha", &["Feedback", "ModMail"]).await;
        h.platform.set_mutual("u", vec![TenantInfo::new("1", "Alpha")]);

        h.relay.on_direct_message(h.dm("u", "hello")).await.unwrap();

        assert_eq!(
            h.relay.pending("u"),
            Some(SessionStage::AwaitingComponentChoice { tenant: "1".into() })
        );
        let (_, menu) = h.last_prompt("u");
        assert_eq!(menu.id, COMPONENT_MENU);
        let labels: Vec<_> = menu.options.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["Feedback", "Modmail"]);
        assert_eq!(menu.options[0].value, "1-feedback");

        h.relay.handle_select(h.select("u", COMPONENT_MENU, "1-feedback")).await;

        assert_eq!(h.relay.pending("u"), None);
        assert_eq!(h.platform.sent_to("1-inbox")[0].content.as_deref(), Some("u: hello"));
        assert!(h.platform.visible_in("dm-u").is_empty());
    }

    #[tokio::test]
    async fn test_no_mutual_tenant_is_dropped() {
        let h = Harness::new();
        h.relay.on_direct_message(h.dm("u", "hello")).await.unwrap();

        assert_eq!(h.relay.session_count(), 0);
        assert!(h.platform.sent().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_messages_create_one_session() {
        let h = Harness::new();
        h.tenant("1", "Alpha", &["Feedback"]).await;
        h.tenant("2", "Beta", &["Feedback"]).await;
        h.platform.set_mutual(
            "u",
            vec![TenantInfo::new("1", "Alpha"), TenantInfo::new("2", "Beta")],
        );
        h.platform.set_lookup_delay(Duration::from_millis(20));

        let handles: Vec<_> = (0..8)
            .map(|i| h.relay.on_direct_message(h.dm("u", &format!("m{i}"))))
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(h.relay.session_count(), 1);
        assert_eq!(h.platform.sent_to("dm-u").len(), 1);
    }

    #[tokio::test]
    async fn test_tenant_without_direct_listeners_abandons() {
        let h = Harness::new();
        h.tenant("1", "Alpha", &[]).await;
        h.tenant("2", "Beta", &["Feedback"]).await;
        h.platform.set_mutual(
            "u",
            vec![TenantInfo::new("1", "Alpha"), TenantInfo::new("2", "Beta")],
        );

        h.relay.on_direct_message(h.dm("u", "hello")).await.unwrap();
        h.relay.handle_select(h.select("u", SERVER_MENU, "1")).await;

        assert_eq!(h.relay.pending("u"), None);
        let last = h.platform.sent_to("dm-u").pop().unwrap();
        assert_eq!(last.embeds[0].tone, Tone::Caution);
        assert_eq!(last.summary(), "The server does not handle any messages at the moment");
    }

    #[tokio::test]
    async fn test_component_stopped_before_choice() {
        let h = Harness::new();
        let tenant = h.tenant("1", "Alpha", &["Feedback"]).await;
        h.platform.set_mutual("u", vec![TenantInfo::new("1", "Alpha")]);

        h.relay.on_direct_message(h.dm("u", "hello")).await.unwrap();
        tenant.direct().remove("feedback");
        h.relay.handle_select(h.select("u", COMPONENT_MENU, "1-feedback")).await;

        assert_eq!(h.relay.pending("u"), None);
        let last = h.platform.sent_to("dm-u").pop().unwrap();
        assert_eq!(last.embeds[0].tone, Tone::Error);
        assert_eq!(last.summary(), "Could not send to the given service, try again");
        assert!(h.platform.sent_to("1-inbox").is_empty());
    }

    #[tokio::test]
    async fn test_cancel_and_stale_choices() {
        let h = Harness::new();
        h.tenant("1", "Alpha", &["Feedback"]).await;
        h.platform.set_mutual("u", vec![TenantInfo::new("1", "Alpha")]);

        h.relay.on_direct_message(h.dm("u", "hello")).await.unwrap();
        let (prompt, _) = h.last_prompt("u");
        h.relay
            .handle_button(ButtonEvent {
                tenant_id: None,
                channel_id: "dm-u".into(),
                message_id: prompt.clone(),
                actor: Actor::new("u", "u"),
                button_id: CANCEL_BUTTON.into(),
            })
            .await;

        assert_eq!(h.relay.pending("u"), None);
        assert!(h.platform.deleted_messages().contains(&prompt));
        assert_eq!(
            h.platform.sent_to("dm-u").last().unwrap().summary(),
            "Successfully cancelled"
        );

        let stale = SelectEvent {
            tenant_id: None,
            channel_id: "dm-u".into(),
            message_id: prompt,
            actor: Actor::new("u", "u"),
            menu_id: COMPONENT_MENU.into(),
            option: "1-feedback".into(),
        };
        h.relay.handle_select(stale).await;
        let last = h.platform.sent_to("dm-u").pop().unwrap();
        assert_eq!(last.summary(), NO_PENDING);
        assert!(h.platform.sent_to("1-inbox").is_empty());
    }

    #[tokio::test]
    async fn test_component_choice_must_match_session() {
        let h = Harness::new();
        h.tenant("1", "Alpha", &["Feedback"]).await;
        h.tenant("2", "Beta", &["Feedback"]).await;
        h.platform.set_mutual(
            "u",
            vec![TenantInfo::new("1", "Alpha"), TenantInfo::new("2", "Beta")],
        );
        let forged = |option: &str| SelectEvent {
            tenant_id: None,
            channel_id: "dm-u".into(),
            message_id: "old-menu".into(),
            actor: Actor::new("u", "u"),
            menu_id: COMPONENT_MENU.into(),
            option: option.into(),
        };

        h.relay.on_direct_message(h.dm("u", "hello")).await.unwrap();
        h.relay.handle_select(forged("2-feedback")).await;
        assert_eq!(h.relay.pending("u"), Some(SessionStage::AwaitingServerChoice));
        assert_eq!(h.platform.sent_to("dm-u").pop().unwrap().summary(), NO_PENDING);

        h.relay.handle_select(h.select("u", SERVER_MENU, "1")).await;
        h.relay.handle_select(forged("2-feedback")).await;
        assert_eq!(
            h.relay.pending("u"),
            Some(SessionStage::AwaitingComponentChoice { tenant: "1".into() })
        );
        assert!(h.platform.sent_to("2-inbox").is_empty());

        h.relay.handle_select(h.select("u", COMPONENT_MENU, "1-feedback")).await;
        assert_eq!(h.relay.pending("u"), None);
        assert_eq!(h.platform.sent_to("1-inbox").len(), 1);
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("modmail"), "Modmail");
        assert_eq!(capitalize("feedback"), "Feedback");
        assert_eq!(capitalize(""), "");
    }
}
