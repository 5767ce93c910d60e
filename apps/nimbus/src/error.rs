use nimbus_config::ConfigError;
use nimbus_plugin_system::PluginError;
use std::path::Path;
use thiserror::Error;

/// Errors surfaced by CLI commands; every one ends the process with exit code 1
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Same-named plugin present and `-f` not given
    #[error("{message}\nTIP: Use 'nimbus install-plugin {path} -f' to force a reinstall.")]
    AlreadyInstalled { message: String, path: String },

    #[error("Failed to get confirmation: {0}")]
    Prompt(String),
}

impl CliError {
    pub fn already_installed(error: &PluginError, path: &Path) -> Self {
        Self::AlreadyInstalled {
            message: error.to_string(),
            path: path.display().to_string(),
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
