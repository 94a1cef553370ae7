//! # Courier Core
//!
//! The dispatch primitives shared by every layer of the Courier bot backend.
//!
//! ## Layout
//!
//! - **Events**: already-parsed inbound platform events ([`InboundEvent`]) and
//!   the [`Actor`] that triggered them.
//! - **Authorization**: composable [`Permission`] values evaluated against an
//!   actor.
//! - **Dispatch**: the generic keyed [`HandlerRegistry`] used for every event
//!   kind, and the [`Replier`] that turns outcomes into platform messages.
//! - **Collaborators**: the [`Platform`] and [`SettingsStore`] traits that the
//!   rest of the system is written against, plus an in-memory store.
//! - **Workers**: [`WorkerPool`], a bounded, supervised way to move slow work
//!   off the dispatch path.
//!
//! ```text
//! ┌──────────┐   InboundEvent   ┌─────────────────┐   Listener   ┌──────────┐
//! │ Platform │ ───────────────▶ │ HandlerRegistry │ ───────────▶ │  Action  │
//! └──────────┘                  └─────────────────┘              └──────────┘
//!       ▲                                 │ BotError                  │
//!       └──────────── Replier ◀───────────┴───────────────────────────┘
//! ```

pub mod error;
pub mod event;
pub mod message;
pub mod permission;
pub mod platform;
pub mod registry;
pub mod reply;
pub mod store;
pub mod task;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{BotError, BotResult, ErrorKind, PlatformError, PlatformResult, StoreError, StoreResult};
pub use event::{
    Actor, Attachment, ButtonEvent, ChannelId, CommandEvent, InboundEvent, InteractionEvent,
    Invocation, MessageEvent, MessageId, OptionValue, RemoteId, RoleId, SelectEvent, TenantId,
    UserId,
};
pub use message::{
    ActionRow, Button, ButtonStyle, Embed, EmbedField, OutboundMessage, SelectMenu, SelectOption,
    Tone,
};
pub use permission::Permission;
pub use platform::{
    ChannelInfo, ChannelKind, CommandKind, CommandSpec, OptionChoice, OptionKind, OptionSpec,
    Platform, TenantInfo,
};
pub use registry::{Action, Dispatch, HandlerRegistry, Listener};
pub use reply::Replier;
pub use store::{MemoryStore, Scope, Settings, SettingsStore, StoreSnapshot};
pub use task::WorkerPool;

/// Prelude for common imports.
pub mod prelude {
    pub use super::error::{BotError, BotResult};
    pub use super::event::{Actor, Invocation, MessageEvent};
    pub use super::message::{Embed, OutboundMessage, Tone};
    pub use super::permission::Permission;
    pub use super::registry::{Dispatch, HandlerRegistry, Listener};
    pub use super::reply::Replier;
}
