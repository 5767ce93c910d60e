//! The CLI's own commands as seen by the plugin system

use async_trait::async_trait;
use nimbus_plugin_system::{NativeCommandTable, NativeInvoker, StaticCommandTable};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Names and aliases of every native subcommand, plus `help`
pub fn command_table(command: &clap::Command) -> StaticCommandTable {
    command
        .get_subcommands()
        .fold(
            StaticCommandTable::new().with_command("help"),
            |table, subcommand| {
                let table = table.with_command(subcommand.get_name());
                subcommand
                    .get_all_aliases()
                    .fold(table, |table, alias| table.with_alias(alias))
            },
        )
}

/// Runs native commands for plugins by re-executing the CLI binary
pub struct SelfExecInvoker {
    executable: PathBuf,
    plugin_home: PathBuf,
    table: StaticCommandTable,
}

impl SelfExecInvoker {
    pub fn new(executable: PathBuf, plugin_home: PathBuf, table: StaticCommandTable) -> Self {
        Self {
            executable,
            plugin_home,
            table,
        }
    }
}

#[async_trait]
impl NativeInvoker for SelfExecInvoker {
    async fn invoke(&self, args: Vec<String>) -> Result<Vec<String>, String> {
        let name = args
            .first()
            .ok_or_else(|| "No native command given".to_string())?;
        if !self.table.has_command(name) && !self.table.has_alias(name) {
            return Err(format!("'{}' is not a native nimbus command", name));
        }

        debug!(args = ?args, "Running native command for plugin");
        let output = Command::new(&self.executable)
            .arg("--plugin-home")
            .arg(&self.plugin_home)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("Failed to run '{}': {}", name, e))?;

        let lines = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect();

        if output.status.success() {
            Ok(lines)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!("'{}' failed: {}", name, stderr.trim()))
        }
    }
}
