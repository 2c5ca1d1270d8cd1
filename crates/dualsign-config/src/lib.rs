//! Core configuration, filesystem paths and logging for dualsign.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, FederatedConfig, DEFAULT_FEDERATED_PROVIDER, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, LogFormat};
pub use paths::Paths;
