//! The node-side view of autoconf: the config file sections that accept
//! `"auto"`, their expansion and the checks run before startup.
pub mod config;
pub mod duration;
pub mod error;
pub mod expand;
pub mod repo;
pub mod validation;

pub use config::{AutoConfSection, Config, Dns, Ipns, MIN_REFRESH_INTERVAL, Routing};
pub use duration::{DurationError, format_duration, parse_duration};
pub use error::{ConfigError, ValidationError};
pub use expand::{AutoConfField, ExpandedValue, resolve_document};
pub use repo::{CONFIG_FILE, Repo};
pub use validation::{fields_with_auto, private_network_marker, validate_startup};
