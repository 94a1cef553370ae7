//! Courier Runtime - the process around the component layer.
//!
//! This crate provides:
//! - Configuration loading (`ConfigLoader`, figment based)
//! - Logging setup (`LoggingBuilder`)
//! - A JSON file settings backend (`FileStore`)
//! - The explicit list of components each tenant gets (`ComponentCatalog`)
//! - Tenant bookkeeping (`TenantRegistry`) and event routing (`Router`)
//! - The inbound event loop (`CourierRuntime`)
//!
//! ```ignore
//! use courier_runtime::CourierRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = CourierRuntime::builder().build(platform).await?;
//!     gateway.forward_into(runtime.sender());
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod router;
pub mod runtime;
pub mod store;
pub mod tenants;

pub use catalog::{ComponentCatalog, ComponentFactory, Installed};
pub use config::{ConfigError, ConfigLoader, ConfigResult, CourierConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use router::{Routed, Router};
pub use runtime::{CourierRuntime, RuntimeBuilder};
pub use store::FileStore;
pub use tenants::TenantRegistry;

pub use tracing;

/// Logging macros for downstream crates.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
