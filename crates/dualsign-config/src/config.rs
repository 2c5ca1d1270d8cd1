//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Provider name used when only a client id is supplied.
pub const DEFAULT_FEDERATED_PROVIDER: &str = "google";

/// Settings for the federated identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedConfig {
    /// Provider name, e.g. "google".
    #[serde(default = "default_provider")]
    pub provider: String,
    /// OAuth client id issued by the provider.
    pub client_id: String,
}

fn default_provider() -> String {
    DEFAULT_FEDERATED_PROVIDER.to_string()
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Federated provider settings. `None` means the provider is unconfigured.
    #[serde(default)]
    pub federated: Option<FederatedConfig>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            federated: None,
        }
    }
}

impl Config {
    /// Load configuration from `paths`, falling back to defaults, then apply
    /// environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override settings from environment variables.
    ///
    /// - `DUALSIGN_LOG_LEVEL` replaces the log level.
    /// - `DUALSIGN_GOOGLE_CLIENT_ID` (non-empty) configures the google provider.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("DUALSIGN_LOG_LEVEL").and_then(non_empty) {
            self.log_level = level;
        }

        if let Some(client_id) = lookup("DUALSIGN_GOOGLE_CLIENT_ID").and_then(non_empty) {
            self.federated = Some(FederatedConfig {
                provider: DEFAULT_FEDERATED_PROVIDER.to_string(),
                client_id,
            });
        }
    }

    /// Reject settings that cannot be acted on.
    pub fn validate(&self) -> CoreResult<()> {
        if self.log_level.trim().is_empty() {
            return Err(CoreError::Config("log_level must not be empty".to_string()));
        }
        if let Some(federated) = &self.federated {
            if federated.provider.trim().is_empty() {
                return Err(CoreError::Config(
                    "federated.provider must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Returns the federated settings if they are usable.
    pub fn federated(&self) -> Option<&FederatedConfig> {
        self.federated
            .as_ref()
            .filter(|f| !f.client_id.trim().is_empty())
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
