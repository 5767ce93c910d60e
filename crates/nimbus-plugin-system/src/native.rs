//! Host capabilities the plugin system depends on

use async_trait::async_trait;
use std::collections::HashSet;

/// Read-only view of the CLI's built-in commands
#[cfg_attr(test, mockall::automock)]
pub trait NativeCommandTable: Send + Sync {
    /// True if a native command is named `name`
    fn has_command(&self, name: &str) -> bool;

    /// True if a native command has the alias `alias`
    fn has_alias(&self, alias: &str) -> bool;
}

/// Runs native commands on behalf of a plugin (`call_native`)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NativeInvoker: Send + Sync {
    /// Run the native command in `args` and return its output lines
    async fn invoke(&self, args: Vec<String>) -> Result<Vec<String>, String>;
}

/// Fixed set of native command names and aliases
#[derive(Debug, Clone, Default)]
pub struct StaticCommandTable {
    commands: HashSet<String>,
    aliases: HashSet<String>,
}

impl StaticCommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command(mut self, name: impl Into<String>) -> Self {
        self.commands.insert(name.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }
}

impl NativeCommandTable for StaticCommandTable {
    fn has_command(&self, name: &str) -> bool {
        self.commands.contains(name)
    }

    fn has_alias(&self, alias: &str) -> bool {
        self.aliases.contains(alias)
    }
}

/// Invoker for hosts that do not expose native commands to plugins
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNativeCommands;

#[async_trait]
impl NativeInvoker for NoNativeCommands {
    async fn invoke(&self, args: Vec<String>) -> Result<Vec<String>, String> {
        Err(format!(
            "Native command '{}' is not available to plugins",
            args.join(" ")
        ))
    }
}
