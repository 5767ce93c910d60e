//! Fixture plugins driven by the end-to-end tests
//!
//! Each binary under `src/bin` wraps one of these plugins so the tests can
//! install and run real plugin processes.

use async_trait::async_trait;
use nimbus_plugin_api::{
    Plugin, PluginCommand, PluginContext, PluginMetadata, PluginVersion, METADATA_MODE_ARG,
};
use std::io::Write;

/// Message returned by the greeter's `fail` command
pub const FAILURE_MESSAGE: &str = "something went wrong";

/// Exit code used by fixtures that die on purpose
pub const CRASH_EXIT_CODE: i32 = 3;

/// Well-behaved plugin exercising every callback
pub struct Greeter;

#[async_trait]
impl Plugin for Greeter {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new("fixture-greeter", PluginVersion::new(1, 0, 0))
            .with_command(
                PluginCommand::new("hello")
                    .with_alias("hi")
                    .with_help_text("Print a greeting"),
            )
            .with_command(PluginCommand::new("fail").with_help_text("Greet, then fail"))
            .with_command(PluginCommand::new("raw-stdout").with_help_text("Write to stdout"))
            .with_command(PluginCommand::new("crash").with_help_text("Exit mid-run"))
            .with_command(
                PluginCommand::new("native-version").with_help_text("Call a native command"),
            )
    }

    async fn run(&self, ctx: &PluginContext, args: Vec<String>) -> Result<(), String> {
        let command = args.first().map(String::as_str).unwrap_or_default();
        match command {
            "hello" | "hi" => {
                let name = args.get(1).map(String::as_str).unwrap_or("world");
                ctx.println(&format!("hello {}", name))
                    .await
                    .map_err(|e| e.to_string())
            }
            "fail" => {
                ctx.print("hello").await.map_err(|e| e.to_string())?;
                Err(FAILURE_MESSAGE.to_string())
            }
            "raw-stdout" => {
                let mut stdout = std::io::stdout();
                stdout
                    .write_all(b"straight to stdout\n")
                    .and_then(|_| stdout.flush())
                    .map_err(|e| e.to_string())
            }
            "crash" => {
                ctx.println("about to crash")
                    .await
                    .map_err(|e| e.to_string())?;
                std::process::exit(CRASH_EXIT_CODE);
            }
            "native-version" => {
                let result = ctx
                    .call_native(&["version"])
                    .await
                    .map_err(|e| e.to_string())?;
                if let Some(error) = result.error {
                    return Err(error);
                }
                ctx.println(&format!("native said: {}", result.lines.join(" | ")))
                    .await
                    .map_err(|e| e.to_string())
            }
            other => Err(format!("unknown command '{}'", other)),
        }
    }
}

/// Reports metadata without any commands
pub struct Invalid;

#[async_trait]
impl Plugin for Invalid {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new("fixture-invalid", PluginVersion::new(0, 0, 1))
    }

    async fn run(&self, _ctx: &PluginContext, _args: Vec<String>) -> Result<(), String> {
        Err("this plugin has no commands".to_string())
    }
}

/// Metadata for fixtures that misbehave in RPC mode
pub fn misbehaving_metadata(name: &str) -> PluginMetadata {
    PluginMetadata::new(name, PluginVersion::new(0, 1, 0))
        .with_command(PluginCommand::new(format!("{}-run", name)))
}

/// True when the process was started in metadata mode
pub fn metadata_requested() -> bool {
    std::env::args().nth(1).as_deref() == Some(METADATA_MODE_ARG)
}

/// Print metadata the way the SDK does in metadata mode
pub fn print_metadata(metadata: &PluginMetadata) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "{}", serde_json::to_string(metadata)?)?;
    stdout.flush()?;
    Ok(())
}
