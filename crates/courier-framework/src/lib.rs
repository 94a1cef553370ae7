//! # Courier Framework
//!
//! Tenants, their components and the direct-message relay.
//!
//! - [`Tenant`]: one server, with its installed [`Component`]s, per-kind
//!   listener registries and the command sync against the platform.
//! - [`Command`] / [`Interaction`]: definitions a component registers.
//! - [`DirectComponent`]: a component receiving relayed direct messages,
//!   with destination, running state and block list.
//! - [`Relay`]: the per-user session that routes a direct message to a
//!   tenant component.
//! - [`components`]: the built-in [`Manager`](components::Manager),
//!   [`Feedback`](components::Feedback) and [`ModMail`](components::ModMail).

pub mod command;
pub mod component;
pub mod components;
pub mod context;
pub mod direct;
pub mod relay;
pub mod tenant;

pub use command::{Command, Interaction, Subcommand};
pub use component::{Component, ComponentBase, ComponentBaseBuilder, ROLE_SETTING};
pub use context::{
    ButtonContext, CommandContext, Context, InteractionContext, MessageContext, SelectContext,
};
pub use direct::{
    BLOCKLIST_SETTING, DESTINATION_SETTING, DirectComponent, DirectHandler, DirectOptions,
    RUNNING_SETTING,
};
pub use relay::{
    CANCEL_BUTTON, COMPONENT_MENU, Relay, SERVER_MENU, SessionStage, TenantDirectory,
};
pub use tenant::{SyncHandle, Tenant};
