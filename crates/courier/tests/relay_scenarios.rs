//! End-to-end relay and lifecycle scenarios through the runtime router.

use std::collections::HashMap;
use std::sync::Arc;

use courier::core::testing::FakePlatform;
use courier::core::{
    Actor, ButtonEvent, CommandEvent, Dispatch, InboundEvent, MessageEvent, OptionValue,
    OutboundMessage, SelectEvent, TenantInfo, Tone,
};
use courier::framework::relay::{CANCEL_BUTTON, COMPONENT_MENU, SERVER_MENU, SessionStage};
use courier::runtime::config::StorageBackend;
use courier::runtime::{CourierConfig, CourierRuntime, Routed};
use tokio_test::assert_ok;

const MEMBER: &str = "500";
const DM: &str = "dm-500";

struct World {
    platform: Arc<FakePlatform>,
    runtime: CourierRuntime,
}

impl World {
    async fn new() -> Self {
        let mut config = CourierConfig::default();
        config.storage.backend = StorageBackend::Memory;

        let platform = Arc::new(FakePlatform::new());
        let runtime = assert_ok!(
            CourierRuntime::builder()
                .config(config)
                .build(platform.clone())
                .await
        );
        Self { platform, runtime }
    }

    async fn join(&self, id: &str, name: &str) {
        let routed = self
            .runtime
            .dispatch(InboundEvent::TenantAvailable {
                tenant_id: id.into(),
                name: name.into(),
            })
            .await;
        assert!(matches!(routed, Routed::Lifecycle));
    }

    async fn admin(&self, tenant: &str, name: &str, subcommand: Option<&str>, options: &[(&str, OptionValue)]) -> Routed {
        self.runtime
            .dispatch(InboundEvent::Command(CommandEvent {
                tenant_id: tenant.into(),
                channel_id: format!("{tenant}-admin"),
                actor: Actor::new("1", "owner").administrator(),
                name: name.into(),
                subcommand: subcommand.map(str::to_string),
                options: options
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect::<HashMap<_, _>>(),
            }))
            .await
    }

    /// Enables Feedback in `tenant` and starts it in `<tenant>-inbox`.
    async fn open_feedback(&self, tenant: &str) {
        let component = [("component", OptionValue::String("feedback".into()))];
        assert!(self.admin(tenant, "enable", None, &component).await.is_handled());

        let channel = [("channel", OptionValue::Channel(format!("{tenant}-inbox")))];
        assert!(self.admin(tenant, "feedback", Some("start"), &channel).await.is_handled());
        let reply = self.platform.sent_to(&format!("{tenant}-admin")).pop().unwrap();
        assert_eq!(reply.summary(), "Feedback started");
    }

    async fn direct_message(&self, content: &str) {
        let routed = self
            .runtime
            .dispatch(InboundEvent::Message(MessageEvent {
                message_id: format!("msg-{content}"),
                channel_id: DM.into(),
                tenant_id: None,
                author: Actor::new(MEMBER, "member"),
                content: content.into(),
                attachments: Vec::new(),
            }))
            .await;
        let Routed::Offloaded(worker) = routed else {
            panic!("direct messages are handled on a worker");
        };
        worker.await.unwrap();
    }

    /// The newest prompt still visible in the member's direct channel.
    fn prompt(&self) -> (String, OutboundMessage) {
        self.platform.visible_in(DM).pop().unwrap()
    }

    async fn choose(&self, menu: &str, option: &str) -> Routed {
        let (message_id, _) = self.prompt();
        self.runtime
            .dispatch(InboundEvent::Select(SelectEvent {
                tenant_id: None,
                channel_id: DM.into(),
                message_id,
                actor: Actor::new(MEMBER, "member"),
                menu_id: menu.into(),
                option: option.into(),
            }))
            .await
    }

    fn options(message: &OutboundMessage) -> Vec<(String, String)> {
        message
            .select_menu()
            .unwrap()
            .options
            .iter()
            .map(|o| (o.label.clone(), o.value.clone()))
            .collect()
    }
}

#[tokio::test]
async fn test_single_tenant_delivers_after_component_choice() {
    let world = World::new().await;
    world.join("t1", "Alpha").await;
    world.open_feedback("t1").await;
    world.platform.set_mutual(MEMBER, vec![TenantInfo::new("t1", "Alpha")]);

    world.direct_message("the stairs are broken").await;
    let relay = world.runtime.relay();
    assert_eq!(
        relay.pending(MEMBER),
        Some(SessionStage::AwaitingComponentChoice { tenant: "t1".into() })
    );

    let (_, prompt) = world.prompt();
    assert_eq!(
        World::options(&prompt),
        vec![("Feedback".to_string(), "t1-feedback".to_string())]
    );

    assert!(world.choose(COMPONENT_MENU, "t1-feedback").await.is_handled());
    assert_eq!(relay.pending(MEMBER), None);

    let delivered = world.platform.sent_to("t1-inbox");
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].embeds[0].description, "the stairs are broken");
    assert_eq!(delivered[0].embeds[0].title.as_deref(), Some("Feedback from member"));

    let visible = world.platform.visible_in(DM);
    assert_eq!(visible.len(), 1, "prompt is deleted after the choice");
    assert_eq!(visible[0].1.summary(), "Your feedback has been sent");
}

#[tokio::test]
async fn test_two_tenants_choose_server_then_component() {
    let world = World::new().await;
    world.join("t1", "Alpha").await;
    world.join("t2", "Beta").await;
    world.open_feedback("t2").await;
    world.platform.set_mutual(
        MEMBER,
        vec![TenantInfo::new("t1", "Alpha"), TenantInfo::new("t2", "Beta")],
    );

    world.direct_message("hello beta").await;
    assert_eq!(
        world.runtime.relay().pending(MEMBER),
        Some(SessionStage::AwaitingServerChoice)
    );
    let (_, servers) = world.prompt();
    assert_eq!(
        World::options(&servers),
        vec![
            ("Alpha".to_string(), "t1".to_string()),
            ("Beta".to_string(), "t2".to_string()),
        ]
    );

    assert!(world.choose(SERVER_MENU, "t2").await.is_handled());
    let (_, components) = world.prompt();
    assert_eq!(
        World::options(&components),
        vec![("Feedback".to_string(), "t2-feedback".to_string())]
    );

    assert!(world.choose(COMPONENT_MENU, "t2-feedback").await.is_handled());
    assert_eq!(world.platform.sent_to("t2-inbox").len(), 1);
    assert!(world.platform.sent_to("t1-inbox").is_empty());
}

#[tokio::test]
async fn test_second_message_while_pending_is_dropped() {
    let world = World::new().await;
    world.join("t1", "Alpha").await;
    world.open_feedback("t1").await;
    world.platform.set_mutual(MEMBER, vec![TenantInfo::new("t1", "Alpha")]);

    world.direct_message("first").await;
    let prompts = world.platform.sent_to(DM).len();

    world.direct_message("second").await;
    assert_eq!(world.platform.sent_to(DM).len(), prompts);
    assert_eq!(world.runtime.relay().session_count(), 1);

    world.choose(COMPONENT_MENU, "t1-feedback").await;
    let delivered = world.platform.sent_to("t1-inbox");
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].embeds[0].description, "first");
}

#[tokio::test]
async fn test_disabling_always_enabled_component_warns() {
    let world = World::new().await;
    world.join("t1", "Alpha").await;

    let manager = [("component", OptionValue::String("manager".into()))];
    let routed = world.admin("t1", "disable", None, &manager).await;
    assert!(matches!(routed, Routed::Dispatched(Dispatch::Handled)));

    let reply = world.platform.sent_to("t1-admin").pop().unwrap();
    assert_eq!(reply.embeds[0].tone, Tone::Caution);

    let tenant = world.runtime.tenants().get("t1").unwrap();
    assert!(tenant.component("manager").unwrap().base().is_enabled());
    assert!(tenant.commands().contains("disable"));
}

#[tokio::test]
async fn test_cancel_ends_the_session() {
    let world = World::new().await;
    world.join("t1", "Alpha").await;
    world.open_feedback("t1").await;
    world.platform.set_mutual(MEMBER, vec![TenantInfo::new("t1", "Alpha")]);

    world.direct_message("never mind").await;
    let (prompt_id, _) = world.prompt();
    let routed = world
        .runtime
        .dispatch(InboundEvent::Button(ButtonEvent {
            tenant_id: None,
            channel_id: DM.into(),
            message_id: prompt_id.clone(),
            actor: Actor::new(MEMBER, "member"),
            button_id: CANCEL_BUTTON.into(),
        }))
        .await;

    assert!(routed.is_handled());
    assert_eq!(world.runtime.relay().pending(MEMBER), None);
    assert!(world.platform.deleted_messages().contains(&prompt_id));
    assert_eq!(world.prompt().1.summary(), "Successfully cancelled");
    assert!(world.platform.sent_to("t1-inbox").is_empty());
}

#[tokio::test]
async fn test_blocked_member_is_turned_away() {
    let world = World::new().await;
    world.join("t1", "Alpha").await;
    world.open_feedback("t1").await;
    world.platform.set_mutual(MEMBER, vec![TenantInfo::new("t1", "Alpha")]);

    let block = [
        ("action", OptionValue::String("add".into())),
        ("user", OptionValue::User(MEMBER.into())),
    ];
    assert!(world.admin("t1", "feedback", Some("blocklist"), &block).await.is_handled());

    world.direct_message("let me in").await;
    world.choose(COMPONENT_MENU, "t1-feedback").await;

    let reply = world.platform.sent_to(DM).pop().unwrap();
    assert_eq!(reply.embeds[0].tone, Tone::Caution);
    assert_eq!(reply.summary(), "You are not allowed to send messages at the moment");
    assert!(world.platform.sent_to("t1-inbox").is_empty());
}

#[tokio::test]
async fn test_disable_stops_delivery() {
    let world = World::new().await;
    world.join("t1", "Alpha").await;
    world.open_feedback("t1").await;

    let component = [("component", OptionValue::String("feedback".into()))];
    assert!(world.admin("t1", "disable", None, &component).await.is_handled());

    let tenant = world.runtime.tenants().get("t1").unwrap();
    assert!(tenant.direct().is_empty());
    assert!(!tenant.commands().contains("feedback"));

    world.platform.set_mutual(MEMBER, vec![TenantInfo::new("t1", "Alpha")]);
    world.direct_message("anyone there?").await;
    assert_eq!(world.runtime.relay().pending(MEMBER), None);
    let reply = world.platform.sent_to(DM).pop().unwrap();
    assert_eq!(reply.embeds[0].tone, Tone::Caution);
}
