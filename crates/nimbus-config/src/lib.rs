//! Configuration management for the nimbus CLI

pub mod error;
pub mod logging;

pub use error::{ConfigError, ConfigResult};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file inside the nimbus home directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Plugin subsystem configuration
    #[serde(default)]
    pub plugins: PluginsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Plugin subsystem configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Directory holding installed plugin binaries and the registry file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<PathBuf>,
    /// How long a plugin has to print its RPC address after spawn
    pub startup_timeout_ms: u64,
    /// How long a plugin has to answer a metadata query
    pub metadata_timeout_ms: u64,
    /// How long to wait for a plugin to exit on its own before killing it
    pub shutdown_grace_ms: u64,
    /// Upper bound for a single `run` call; unbounded when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_timeout_ms: Option<u64>,
}

/// Log output format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format for development
    #[default]
    Pretty,
    /// Structured JSON format
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            home: None,
            startup_timeout_ms: 10_000,
            metadata_timeout_ms: 10_000,
            shutdown_grace_ms: 5_000,
            run_timeout_ms: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        // The CLI's stdout/stderr belong to the user; keep logs quiet by default
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl PluginsConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }
}

/// Root directory for nimbus state (`NIMBUS_HOME`, else `~/.nimbus`)
pub fn nimbus_home() -> PathBuf {
    std::env::var_os("NIMBUS_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".nimbus")))
        .unwrap_or_else(|| PathBuf::from(".nimbus"))
}

impl AppConfig {
    /// Load configuration from `<nimbus_home>/config.toml` and the environment
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&nimbus_home().join(CONFIG_FILE_NAME))
    }

    /// Load configuration from an explicit file path
    ///
    /// Configuration is merged in the following priority order (highest to lowest):
    /// 1. `NIMBUS_PLUGIN_HOME` (plugin home only)
    /// 2. Environment variables (`NIMBUS__PLUGINS__STARTUP_TIMEOUT_MS=...`)
    /// 3. The TOML file, if it exists
    /// 4. Default values
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Toml},
            Figment,
        };

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        if path.exists() {
            tracing::debug!(path = %path.display(), "Loading TOML configuration");
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("NIMBUS__").split("__"));

        let mut config: AppConfig = figment
            .extract()
            .map_err(|e| ConfigError::invalid(format!("Failed to load configuration: {}", e)))?;

        if let Some(plugin_home) = std::env::var_os("NIMBUS_PLUGIN_HOME") {
            config.plugins.home = Some(PathBuf::from(plugin_home));
        }

        config.validate()?;

        tracing::debug!(
            plugin_home = %config.plugin_home().display(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration as TOML, creating the parent directory if needed
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid(format!("Failed to serialize configuration: {}", e)))?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Directory holding installed plugins and the plugin registry
    pub fn plugin_home(&self) -> PathBuf {
        self.plugins
            .home
            .clone()
            .unwrap_or_else(|| nimbus_home().join("plugins"))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.plugins.startup_timeout_ms == 0 {
            return Err(ConfigError::invalid("Plugin startup timeout cannot be 0"));
        }

        if self.plugins.metadata_timeout_ms == 0 {
            return Err(ConfigError::invalid("Plugin metadata timeout cannot be 0"));
        }

        if self.plugins.run_timeout_ms == Some(0) {
            return Err(ConfigError::invalid(
                "Plugin run timeout cannot be 0; omit it to disable the timeout",
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::invalid(format!(
                "Invalid log level '{}', must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }
}
