//! Classifies inbound events and hands them to a tenant or the relay.

use std::sync::Arc;

use courier_core::{Dispatch, InboundEvent, MessageEvent};
use courier_framework::{Relay, Tenant};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, debug_span};

use crate::tenants::TenantRegistry;

/// What became of a routed event.
#[derive(Debug)]
pub enum Routed {
    /// Handled inline by a registry.
    Dispatched(Dispatch),
    /// Moved to a relay worker.
    Offloaded(JoinHandle<()>),
    /// Not meant for anyone: a bot author or an unknown tenant.
    Dropped,
    /// A tenant was set up or removed.
    Lifecycle,
}

impl Routed {
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Dispatched(Dispatch::Handled))
    }
}

/// Routes every [`InboundEvent`] to where it belongs.
pub struct Router {
    tenants: Arc<TenantRegistry>,
    relay: Arc<Relay>,
}

impl Router {
    pub fn new(tenants: Arc<TenantRegistry>, relay: Arc<Relay>) -> Self {
        Self { tenants, relay }
    }

    pub async fn route(&self, event: InboundEvent) -> Routed {
        let span = debug_span!("route", kind = event.kind());
        self.route_inner(event).instrument(span).await
    }

    async fn route_inner(&self, event: InboundEvent) -> Routed {
        match event {
            InboundEvent::Command(event) => match self.tenant(&event.tenant_id) {
                Some(tenant) => Routed::Dispatched(tenant.handle_command(event).await),
                None => Routed::Dropped,
            },
            InboundEvent::Interaction(event) => match self.tenant(&event.tenant_id) {
                Some(tenant) => Routed::Dispatched(tenant.handle_interaction(event).await),
                None => Routed::Dropped,
            },
            InboundEvent::Message(message) => self.route_message(message).await,
            InboundEvent::Button(event) => match event.tenant_id.clone() {
                None => Routed::Dispatched(self.relay.handle_button(event).await),
                Some(id) => match self.tenant(&id) {
                    Some(tenant) => Routed::Dispatched(tenant.handle_button(event).await),
                    None => Routed::Dropped,
                },
            },
            InboundEvent::Select(event) => match event.tenant_id.clone() {
                None => Routed::Dispatched(self.relay.handle_select(event).await),
                Some(id) => match self.tenant(&id) {
                    Some(tenant) => Routed::Dispatched(tenant.handle_select(event).await),
                    None => Routed::Dropped,
                },
            },
            InboundEvent::TenantAvailable { tenant_id, name } => {
                // Command registration finishes in the background.
                let _installed = self.tenants.setup(&tenant_id, &name).await;
                Routed::Lifecycle
            }
            InboundEvent::TenantRemoved { tenant_id } => {
                self.tenants.remove(&tenant_id);
                Routed::Lifecycle
            }
        }
    }

    async fn route_message(&self, message: MessageEvent) -> Routed {
        if message.author.bot {
            return Routed::Dropped;
        }
        match message.tenant_id.clone() {
            None => Routed::Offloaded(self.relay.on_direct_message(message)),
            Some(id) => match self.tenant(&id) {
                Some(tenant) => Routed::Dispatched(tenant.handle_message(message).await),
                None => Routed::Dropped,
            },
        }
    }

    fn tenant(&self, id: &str) -> Option<Arc<Tenant>> {
        let tenant = self.tenants.get(id);
        if tenant.is_none() {
            debug!(tenant = id, "Event for unknown tenant");
        }
        tenant
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use courier_core::testing::FakePlatform;
    use courier_core::{Actor, CommandEvent, MemoryStore, SelectEvent, TenantInfo, Tone};

    use super::*;
    use crate::catalog::ComponentCatalog;

    struct Harness {
        platform: Arc<FakePlatform>,
        tenants: Arc<TenantRegistry>,
        router: Router,
    }

    fn harness() -> Harness {
        let platform = Arc::new(FakePlatform::new());
        let tenants = Arc::new(TenantRegistry::new(
            platform.clone(),
            Arc::new(MemoryStore::new()),
            ComponentCatalog::standard(),
        ));
        let relay = Relay::new(platform.clone(), tenants.clone(), 2);
        let router = Router::new(tenants.clone(), relay);
        Harness {
            platform,
            tenants,
            router,
        }
    }

    fn dm(author: Actor) -> MessageEvent {
        MessageEvent {
            message_id: "m1".into(),
            channel_id: format!("dm-{}", author.id),
            tenant_id: None,
            author,
            content: "hello".into(),
            attachments: Vec::new(),
        }
    }

    fn ping(tenant: &str) -> InboundEvent {
        InboundEvent::Command(CommandEvent {
            tenant_id: tenant.into(),
            channel_id: "general".into(),
            actor: Actor::new("1", "owner").administrator(),
            name: "ping".into(),
            subcommand: None,
            options: HashMap::new(),
        })
    }

    #[tokio::test]
    async fn test_lifecycle_events_manage_tenants() {
        let h = harness();
        let routed = h
            .router
            .route(InboundEvent::TenantAvailable {
                tenant_id: "t1".into(),
                name: "Alpha".into(),
            })
            .await;
        assert!(matches!(routed, Routed::Lifecycle));
        assert!(h.tenants.get("t1").is_some());

        let routed = h
            .router
            .route(InboundEvent::TenantRemoved { tenant_id: "t1".into() })
            .await;
        assert!(matches!(routed, Routed::Lifecycle));
        assert!(h.tenants.is_empty());
    }

    #[tokio::test]
    async fn test_commands_reach_their_tenant() {
        let h = harness();
        h.tenants.setup("t1", "Alpha").await;

        assert!(h.router.route(ping("t1")).await.is_handled());
        assert!(matches!(h.router.route(ping("t2")).await, Routed::Dropped));
        assert!(!h.platform.sent_to("general").is_empty());
    }

    #[tokio::test]
    async fn test_bot_messages_are_dropped() {
        let h = harness();
        let mut author = Actor::new("9", "other-bot");
        author.bot = true;

        let routed = h.router.route(InboundEvent::Message(dm(author))).await;
        assert!(matches!(routed, Routed::Dropped));
        assert!(h.platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_direct_messages_are_offloaded() {
        let h = harness();
        h.tenants.setup("t1", "Alpha").await;
        h.platform.set_mutual("5", vec![TenantInfo::new("t1", "Alpha")]);

        let routed = h.router.route(InboundEvent::Message(dm(Actor::new("5", "member")))).await;
        let Routed::Offloaded(worker) = routed else {
            panic!("expected the message to be offloaded");
        };
        worker.await.unwrap();

        // No component is running, so the relay has nothing to offer.
        let reply = h.platform.sent_to("dm-5").pop().unwrap();
        assert_eq!(reply.embeds[0].tone, Tone::Caution);
    }

    #[tokio::test]
    async fn test_direct_selections_go_to_the_relay() {
        let h = harness();
        let routed = h
            .router
            .route(InboundEvent::Select(SelectEvent {
                tenant_id: None,
                channel_id: "dm-5".into(),
                message_id: "prompt".into(),
                actor: Actor::new("5", "member"),
                menu_id: "component".into(),
                option: "t1-feedback".into(),
            }))
            .await;

        assert!(routed.is_handled());
        let reply = h.platform.sent_to("dm-5").pop().unwrap();
        assert_eq!(reply.summary(), "There is no message waiting to be sent");
    }
}
