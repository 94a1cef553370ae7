//! Configuration for the Courier runtime.
//!
//! Settings are layered by [`ConfigLoader`] from built-in defaults, an
//! optional `courier.toml` / `courier.yaml` file and `COURIER_*` environment
//! variables, then checked by [`validate_config`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, load_config, load_config_from_file};
pub use schema::{
    CourierConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, RelayConfig,
    RuntimeConfig, SpanEventConfig, StorageBackend, StorageConfig,
};
pub use validation::validate_config;
