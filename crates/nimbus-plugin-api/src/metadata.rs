//! Plugin self-description

use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic version reported by a plugin (`major.minor.build`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}

impl PluginVersion {
    pub fn new(major: u32, minor: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            build,
        }
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// A single command contributed by a plugin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginCommand {
    /// Command name, unique within the plugin
    pub name: String,
    /// Optional short alias; empty when the command has none
    #[serde(default)]
    pub alias: String,
    /// One-line description shown by `nimbus plugins`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub help_text: String,
    /// Usage string shown in command help
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub usage: String,
}

impl PluginCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn with_help_text(mut self, help_text: impl Into<String>) -> Self {
        self.help_text = help_text.into();
        self
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    /// True if `token` is this command's name or its (non-empty) alias
    pub fn answers_to(&self, token: &str) -> bool {
        self.name == token || (!self.alias.is_empty() && self.alias == token)
    }
}

/// Metadata a plugin binary reports when queried in metadata mode
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: PluginVersion,
    #[serde(default)]
    pub commands: Vec<PluginCommand>,
}

impl PluginMetadata {
    pub fn new(name: impl Into<String>, version: PluginVersion) -> Self {
        Self {
            name: name.into(),
            version,
            commands: Vec::new(),
        }
    }

    pub fn with_command(mut self, command: PluginCommand) -> Self {
        self.commands.push(command);
        self
    }

    /// A plugin needs a name and at least one command to be installable
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && !self.commands.is_empty()
    }

    /// Find the command answering to `token` by name or alias
    pub fn find_command(&self, token: &str) -> Option<&PluginCommand> {
        self.commands.iter().find(|command| command.answers_to(token))
    }
}
