//! Shared configuration used by the core and the gateway.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default GitHub REST API base URL.
pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";

/// Global application configuration (Gateway + GitHub bridge). Load from TOML or env.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Display name used in logs.
    pub app_name: String,
    /// Bind address for the gateway.
    pub host: String,
    /// HTTP port for the gateway.
    pub port: u16,
    /// `owner/name` of the repository whose workflow runs feed the `github_actions` component.
    #[serde(default)]
    pub github_repository: Option<String>,
    /// Optional token sent as a bearer credential to the GitHub API.
    #[serde(default)]
    pub github_token: Option<String>,
    #[serde(default = "default_github_api_base")]
    pub github_api_base: String,
}

fn default_github_api_base() -> String {
    DEFAULT_GITHUB_API_BASE.to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            app_name: "BDI Telemetry Gateway".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8001,
            github_repository: None,
            github_token: None,
            github_api_base: default_github_api_base(),
        }
    }
}

impl CoreConfig {
    /// Repository name with surrounding whitespace removed; `None` when unset or blank.
    pub fn repository(&self) -> Option<&str> {
        self.github_repository
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Load config from file and environment. Precedence: `BDI__*` env > file named by
    /// `BDI_CONFIG` (default `config/gateway.toml`) > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("BDI_CONFIG").unwrap_or_else(|_| "config/gateway.toml".to_string());
        let builder = config::Config::builder()
            .set_default("app_name", "BDI Telemetry Gateway")?
            .set_default("host", "127.0.0.1")?
            .set_default("port", 8001_i64)?
            .set_default("github_api_base", DEFAULT_GITHUB_API_BASE)?;

        let path = Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("BDI").separator("__"))
            .build()?;

        built.try_deserialize()
    }
}
