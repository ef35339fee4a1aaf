//! # Configuration System
//!
//! TOML configuration for the repeater: the packet listener, the outbound
//! transport and destinations, and logging.
//!
//! ## Example Configuration
//!
//! ```toml
//! [listener]
//! address = "0.0.0.0"
//! port = 8125
//!
//! [repeater]
//! transport = "udp4"
//! debug = false
//!
//! [[repeater.destinations]]
//! host = "127.0.0.1"
//! port = 8127
//! rules = ["^foo\\."]
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

mod error;
mod loader;
mod types;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::{
    Config, DestinationConfig, ListenerConfig, LogFormat, LogLevel, LogOutput, LoggingConfig,
    RepeaterSettings, TransportMode,
};
pub use validation::{
    BasicValidator, RuleValidator, ValidationError, ValidationResult, ValidationSeverity,
    Validator, MAX_POOL_SIZE,
};
