//! Command line parsing and dispatch

mod install;
mod plugins;

use crate::error::{CliError, CliResult};
use crate::native::{command_table, SelfExecInvoker};
use crate::ui::{TerminalUi, Ui};
use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use nimbus_config::AppConfig;
use nimbus_plugin_system::{NativeInvoker, NoNativeCommands, OutputRelay, PluginActor};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, warn};

/// Command line client for the Nimbus cloud platform
#[derive(Parser, Debug)]
#[command(name = "nimbus")]
#[command(version)]
pub struct Cli {
    /// Directory holding installed plugins
    #[arg(long, global = true, value_name = "DIR")]
    pub plugin_home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install a CLI plugin from a local binary
    InstallPlugin {
        /// Path to the plugin binary
        path: PathBuf,
        /// Force install of plugin without confirmation
        #[arg(short, long)]
        force: bool,
    },
    /// Uninstall a CLI plugin
    UninstallPlugin {
        /// Name of the installed plugin
        name: String,
    },
    /// List commands of installed plugins
    Plugins {
        /// Also show each command's usage
        #[arg(short, long)]
        usage: bool,
    },
    /// Print the version
    #[command(alias = "v")]
    Version,
    /// Commands provided by installed plugins
    #[command(external_subcommand)]
    External(Vec<String>),
}

/// Main CLI entry point
pub async fn run() -> ExitCode {
    let cli = Cli::parse();
    let ui = TerminalUi::new();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            ui.failed(&format!("{:#}", e));
            return ExitCode::FAILURE;
        }
    };
    nimbus_config::logging::initialize(&config.logging);

    match execute(cli.command, &config, &ui).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!(error = ?e, "Command failed");
            ui.failed(&e.to_string());
            if let CliError::Plugin(err) = &e {
                if err.is_execution_failure() {
                    ui.say("Run with LOG_LEVEL=debug to see the plugin handshake and RPC traffic.");
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load().context("Failed to load nimbus configuration")?;
    if let Some(plugin_home) = &cli.plugin_home {
        config.plugins.home = Some(plugin_home.clone());
    }
    Ok(config)
}

async fn execute(command: Commands, config: &AppConfig, ui: &dyn Ui) -> CliResult<()> {
    if let Commands::Version = command {
        ui.say(&format!("nimbus version {}", env!("CARGO_PKG_VERSION")));
        return Ok(());
    }

    let native = command_table(&Cli::command());
    let invoker: Arc<dyn NativeInvoker> = match std::env::current_exe() {
        Ok(executable) => Arc::new(SelfExecInvoker::new(
            executable,
            config.plugin_home(),
            native.clone(),
        )),
        Err(e) => {
            warn!(error = %e, "Cannot locate the nimbus executable, native commands unavailable to plugins");
            Arc::new(NoNativeCommands)
        }
    };
    let mut actor = PluginActor::from_config(config, invoker)?;

    match command {
        Commands::InstallPlugin { path, force } => {
            install::execute(&mut actor, &native, ui, &path, force).await
        }
        Commands::UninstallPlugin { name } => plugins::uninstall(&mut actor, ui, &name),
        Commands::Plugins { usage } => {
            plugins::list(&actor, ui, usage);
            Ok(())
        }
        Commands::External(args) => {
            debug!(plugin_api = nimbus_plugin_api::PLUGIN_API_VERSION, "Dispatching plugin command");
            Ok(actor
                .run_plugin_command(args, OutputRelay::stdout())
                .await?)
        }
        Commands::Version => Ok(()),
    }
}
