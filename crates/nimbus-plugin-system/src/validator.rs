//! Install-time conflict validation
//!
//! Checks run in a fixed order and stop at the first violation:
//!
//! 1. the candidate has a name and at least one command
//! 2. for each candidate command, in declaration order:
//!    native command names, then native aliases, then every installed plugin's
//!    commands in registry order
//! 3. no installed plugin already uses the candidate's name
//!
//! Error values always name the candidate plugin, never the plugin it
//! collides with.

use crate::error::ConflictError;
use crate::native::NativeCommandTable;
use crate::registry::PluginRegistry;
use nimbus_plugin_api::{PluginCommand, PluginMetadata};
use tracing::debug;

/// Check `candidate` against the native command table and the installed plugins
pub fn validate(
    candidate: &PluginMetadata,
    native: &dyn NativeCommandTable,
    registry: &PluginRegistry,
) -> Result<(), ConflictError> {
    if !candidate.is_valid() {
        return Err(ConflictError::InvalidPlugin);
    }

    for command in &candidate.commands {
        check_command(candidate, command, native, registry)?;
    }

    if registry.contains(&candidate.name) {
        return Err(ConflictError::AlreadyInstalled {
            name: candidate.name.clone(),
            version: candidate.version,
        });
    }

    debug!(plugin = %candidate.name, version = %candidate.version, "Plugin passed conflict validation");
    Ok(())
}

fn check_command(
    candidate: &PluginMetadata,
    command: &PluginCommand,
    native: &dyn NativeCommandTable,
    registry: &PluginRegistry,
) -> Result<(), ConflictError> {
    if native.has_command(&command.name) {
        return Err(command_conflict(candidate, command));
    }

    if !command.alias.is_empty() && native.has_alias(&command.alias) {
        return Err(alias_conflict(candidate, command));
    }

    for installed in registry.entries() {
        for installed_command in &installed.metadata.commands {
            if installed_command.name == command.name {
                return Err(command_conflict(candidate, command));
            }

            if !command.alias.is_empty() && installed_command.alias == command.alias {
                return Err(alias_conflict(candidate, command));
            }
        }
    }

    Ok(())
}

fn command_conflict(candidate: &PluginMetadata, command: &PluginCommand) -> ConflictError {
    ConflictError::CommandConflict {
        plugin_name: candidate.name.clone(),
        plugin_version: candidate.version,
        command_name: command.name.clone(),
    }
}

fn alias_conflict(candidate: &PluginMetadata, command: &PluginCommand) -> ConflictError {
    ConflictError::AliasConflict {
        plugin_name: candidate.name.clone(),
        plugin_version: candidate.version,
        command_alias: command.alias.clone(),
    }
}
