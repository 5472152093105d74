pub mod config;
pub mod error;
pub mod types;

pub use config::{CacheBackendKind, Config};
pub use error::ConfigError;
pub use types::*;
