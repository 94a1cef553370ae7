//! Dispatch contexts.
//!
//! A [`Context`] pairs an inbound event with the [`Tenant`] it is being
//! dispatched in. Listeners receive it by value; it dereferences to the event,
//! so `ctx.channel_id` and `ctx.actor` read naturally.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use courier_core::{
    Actor, ButtonEvent, CommandEvent, InteractionEvent, Invocation, MessageEvent, Replier,
    SelectEvent,
};

use crate::tenant::Tenant;

/// An event being dispatched inside a tenant.
pub struct Context<E> {
    event: E,
    tenant: Arc<Tenant>,
}

impl<E> Context<E> {
    pub fn new(event: E, tenant: Arc<Tenant>) -> Self {
        Self { event, tenant }
    }

    pub fn event(&self) -> &E {
        &self.event
    }

    pub fn tenant(&self) -> &Arc<Tenant> {
        &self.tenant
    }

    pub fn replier(&self) -> &Replier {
        self.tenant.replier()
    }

    pub fn into_event(self) -> E {
        self.event
    }
}

impl<E> Deref for Context<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.event
    }
}

impl<E: Invocation> Invocation for Context<E> {
    fn actor(&self) -> &Actor {
        self.event.actor()
    }

    fn channel_id(&self) -> &str {
        self.event.channel_id()
    }
}

impl<E: fmt::Debug> fmt::Debug for Context<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("tenant", &self.tenant.id())
            .field("event", &self.event)
            .finish()
    }
}

pub type CommandContext = Context<CommandEvent>;
pub type InteractionContext = Context<InteractionEvent>;
pub type ButtonContext = Context<ButtonEvent>;
pub type SelectContext = Context<SelectEvent>;
/// A plain tenant message, or a direct message relayed into a tenant.
pub type MessageContext = Context<MessageEvent>;
