//! `nimbus plugins` and `nimbus uninstall-plugin`

use crate::error::CliResult;
use crate::ui::Ui;
use nimbus_plugin_system::PluginActor;

const HEADERS: [&str; 4] = ["plugin name", "version", "command name", "command help"];
const USAGE_HEADER: &str = "command usage";

/// One row per command of every installed plugin, in install order
pub fn list(actor: &PluginActor, ui: &dyn Ui, show_usage: bool) {
    ui.say("Listing installed plugins...");
    ui.say("");

    let rows: Vec<Vec<String>> = actor
        .registry()
        .entries()
        .flat_map(|entry| {
            entry.metadata.commands.iter().map(move |command| {
                let name = if command.alias.is_empty() {
                    command.name.clone()
                } else {
                    format!("{}, {}", command.name, command.alias)
                };
                let mut row = vec![
                    entry.name().to_string(),
                    entry.metadata.version.to_string(),
                    name,
                    command.help_text.clone(),
                ];
                if show_usage {
                    row.push(command.usage.clone());
                }
                row
            })
        })
        .collect();

    let mut headers = HEADERS.to_vec();
    if show_usage {
        headers.push(USAGE_HEADER);
    }

    if rows.is_empty() {
        ui.say("No plugins installed.");
    } else {
        ui.table(&headers, &rows);
    }
}

pub fn uninstall(actor: &mut PluginActor, ui: &dyn Ui, name: &str) -> CliResult<()> {
    ui.say(&format!("Uninstalling plugin {}...", name));
    actor.uninstall_plugin(name)?;
    ui.ok();
    ui.say(&format!("Plugin {} successfully uninstalled.", name));
    Ok(())
}
