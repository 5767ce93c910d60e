//! `nimbus install-plugin`

use crate::error::{CliError, CliResult};
use crate::ui::Ui;
use nimbus_plugin_system::{ConflictError, NativeCommandTable, PluginActor, PluginError};
use std::path::Path;
use tracing::info;

pub async fn execute(
    actor: &mut PluginActor,
    native: &dyn NativeCommandTable,
    ui: &dyn Ui,
    path: &Path,
    force: bool,
) -> CliResult<()> {
    if !actor.file_exists(path) {
        return Err(PluginError::file_not_found(path).into());
    }

    ui.warn("Attention: Plugins are binaries written by potentially untrusted authors.");
    ui.warn("Install and use plugins at your own risk.");

    if !force {
        let prompt = format!("Do you want to install the plugin {}?", path.display());
        if !ui.confirm(&prompt, false)? {
            return Err(PluginError::InstallationCancelled.into());
        }
    }

    let metadata = actor.fetch_metadata(path).await?;
    match actor.validate(path, &metadata, native) {
        Ok(()) => {}
        Err(err @ PluginError::Conflict(ConflictError::AlreadyInstalled { .. })) => {
            if !force {
                return Err(CliError::already_installed(&err, path));
            }

            let installed_version = actor
                .registry()
                .get(&metadata.name)
                .map(|entry| entry.metadata.version)
                .unwrap_or(metadata.version);
            ui.say(&format!(
                "Plugin {} {} is already installed. Uninstalling existing plugin...",
                metadata.name, installed_version
            ));
            actor.uninstall_plugin_for_replacement(&metadata.name, path)?;
            ui.ok();
            ui.say(&format!("Plugin {} successfully uninstalled.", metadata.name));
        }
        Err(err) => return Err(err.into()),
    }

    ui.say(&format!("Installing plugin {}...", metadata.name));
    let destination = actor.install_plugin(path, metadata.clone())?;
    info!(
        plugin = %metadata.name,
        version = %metadata.version,
        destination = %destination.display(),
        "Plugin installed"
    );

    ui.ok();
    ui.say(&format!(
        "Plugin {} {} successfully installed.",
        metadata.name, metadata.version
    ));
    Ok(())
}
