//! Plugin system error types

use nimbus_plugin_api::PluginVersion;
use std::path::Path;
use thiserror::Error;

/// Result type for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;

/// First violation found while validating a candidate plugin
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    /// Missing name or no commands
    #[error("Plugin metadata must include a name and at least one command")]
    InvalidPlugin,

    #[error("Plugin {plugin_name} v{plugin_version} could not be installed as it contains commands with names that are already used: {command_name}.")]
    CommandConflict {
        plugin_name: String,
        plugin_version: PluginVersion,
        command_name: String,
    },

    #[error("Plugin {plugin_name} v{plugin_version} could not be installed as it contains commands with aliases that are already used: {command_alias}.")]
    AliasConflict {
        plugin_name: String,
        plugin_version: PluginVersion,
        command_alias: String,
    },

    #[error("Plugin {name} {version} could not be installed. A plugin with that name is already installed.")]
    AlreadyInstalled {
        name: String,
        version: PluginVersion,
    },
}

/// Plugin system error types
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum PluginError {
    /// Candidate binary reported metadata without a name or without commands
    #[error("File {path} is not a valid nimbus plugin binary.")]
    InvalidPlugin { path: String },

    /// Candidate collides with native commands or installed plugins
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("File not found locally, make sure the file exists at given path {path}")]
    FileNotFound { path: String },

    /// The user declined the installation prompt
    #[error("Plugin installation cancelled")]
    InstallationCancelled,

    #[error("Plugin {name} does not exist.")]
    NotInstalled { name: String },

    /// No installed plugin provides this command name or alias
    #[error("'{command}' is not a registered command. See 'nimbus help'.")]
    UnknownCommand { command: String },

    /// Metadata query failed
    #[error("Could not read plugin metadata from {path}: {message}")]
    Metadata { path: String, message: String },

    /// Spawn failure, handshake timeout, or exit before the address line
    #[error("Plugin {plugin} failed to start: {message}")]
    PluginStartup { plugin: String, message: String },

    /// The RPC channel broke while a call was in flight
    #[error("Plugin {plugin} stopped unexpectedly: {message}")]
    PluginTransport { plugin: String, message: String },

    /// `run` exceeded the configured run timeout
    #[error("Plugin {plugin} did not finish within {timeout_ms}ms")]
    RunTimeout { plugin: String, timeout_ms: u128 },

    /// Logical failure reported by the plugin itself
    #[error("{message}")]
    Reported { plugin: String, message: String },

    #[error("Plugin registry error: {message}")]
    Registry { message: String },

    /// Peer sent something that does not follow the wire protocol
    #[error("Plugin protocol error: {message}")]
    Protocol { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl PluginError {
    pub fn invalid_plugin(path: &Path) -> Self {
        Self::InvalidPlugin {
            path: path.display().to_string(),
        }
    }

    pub fn file_not_found(path: &Path) -> Self {
        Self::FileNotFound {
            path: path.display().to_string(),
        }
    }

    pub fn not_installed(name: impl Into<String>) -> Self {
        Self::NotInstalled { name: name.into() }
    }

    pub fn unknown_command(command: impl Into<String>) -> Self {
        Self::UnknownCommand {
            command: command.into(),
        }
    }

    pub fn metadata(path: &Path, message: impl Into<String>) -> Self {
        Self::Metadata {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    pub fn startup(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PluginStartup {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    pub fn transport(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PluginTransport {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    pub fn reported(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Reported {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// True for failures of the plugin process or its RPC channel, as opposed
    /// to validation, installation, or plugin-reported errors
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            Self::PluginStartup { .. }
                | Self::PluginTransport { .. }
                | Self::RunTimeout { .. }
                | Self::Protocol { .. }
        )
    }
}

impl From<std::io::Error> for PluginError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
