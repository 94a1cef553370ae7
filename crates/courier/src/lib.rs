//! # Courier
//!
//! A multi-tenant chat bot backend. Each server the bot is in (a tenant)
//! gets a set of independently enabled components; members reach those
//! components privately through the direct-message relay.
//!
//! ```text
//! ┌──────────┐    ┌────────┐    ┌─────────────────────────────────────┐
//! │ Platform │───▶│ Router │───▶│ Tenant "t1": commands, buttons, ... │──▶ components
//! │ gateway  │    │        │───▶│ Tenant "t2": ...                    │──▶ components
//! └──────────┘    └────────┘    └─────────────────────────────────────┘
//!                     │                     ▲
//!                     └──▶ Relay ───────────┘  (direct messages)
//! ```
//!
//! - **Runtime**: configuration, logging, storage and the event loop
//! - **Framework**: tenants, components, command sync and the relay
//! - **Core**: events, permissions, listener registries and collaborator traits
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = CourierRuntime::builder().build(platform).await?;
//!     gateway.forward_into(runtime.sender());
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)* / `yaml-config`: config file formats
//! - `json-log`: JSON log output
//! - `testing`: the in-process `FakePlatform`

pub use courier_core as core;
pub use courier_framework as framework;
pub use courier_runtime as runtime;

/// Prelude module for convenient imports.
pub mod prelude {
    // Runtime - main entry point
    pub use courier_runtime::{ComponentCatalog, CourierConfig, CourierRuntime, Routed};

    // Components
    pub use courier_framework::components::{Feedback, Manager, ModMail};
    pub use courier_framework::{
        Command, CommandContext, Component, ComponentBase, DirectComponent, DirectHandler,
        DirectOptions, Interaction, MessageContext, Subcommand, Tenant,
    };

    // Events, replies and errors
    pub use courier_core::{
        Actor, BotError, BotResult, Dispatch, Embed, InboundEvent, MessageEvent, OutboundMessage,
        Permission, Platform, Replier, SettingsStore, Tone,
    };
}
