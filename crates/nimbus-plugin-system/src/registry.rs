//! Installed-plugin registry and its on-disk form
//!
//! The registry lives in `<plugin_home>/config.json`:
//!
//! ```json
//! {
//!   "plugins": {
//!     "greeter": {
//!       "location": "/home/me/.nimbus/plugins/greeter",
//!       "version": { "major": 1, "minor": 0, "build": 0 },
//!       "commands": [{ "name": "hello", "alias": "hi" }]
//!     }
//!   }
//! }
//! ```
//!
//! Entries keep insertion order, which is also the order conflict validation
//! scans them in.

use crate::error::{PluginError, PluginResult};
use indexmap::IndexMap;
use nimbus_plugin_api::{PluginCommand, PluginMetadata, PluginVersion};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the registry file inside the plugin home
pub const REGISTRY_FILE_NAME: &str = "config.json";

/// An installed plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub metadata: PluginMetadata,
    /// Location of the installed copy of the binary
    pub binary_path: PathBuf,
}

impl RegistryEntry {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    plugins: IndexMap<String, StoredPlugin>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredPlugin {
    location: PathBuf,
    #[serde(default)]
    version: PluginVersion,
    #[serde(default)]
    commands: Vec<PluginCommand>,
}

/// Installed plugins keyed by name, backed by a JSON file
#[derive(Debug, Clone)]
pub struct PluginRegistry {
    path: PathBuf,
    entries: IndexMap<String, RegistryEntry>,
}

impl PluginRegistry {
    /// Empty registry that persists to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: IndexMap::new(),
        }
    }

    /// Registry stored in `<plugin_home>/config.json`
    pub fn in_plugin_home(plugin_home: &Path) -> PluginResult<Self> {
        Self::load(plugin_home.join(REGISTRY_FILE_NAME))
    }

    /// Load from `path`; a missing file yields an empty registry
    pub fn load(path: impl Into<PathBuf>) -> PluginResult<Self> {
        let path = path.into();
        if !path.exists() {
            debug!(path = %path.display(), "No plugin registry yet");
            return Ok(Self::new(path));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            PluginError::registry(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let file: RegistryFile = serde_json::from_str(&content).map_err(|e| {
            PluginError::registry(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        let entries = file
            .plugins
            .into_iter()
            .map(|(name, stored)| {
                let entry = RegistryEntry {
                    metadata: PluginMetadata {
                        name: name.clone(),
                        version: stored.version,
                        commands: stored.commands,
                    },
                    binary_path: stored.location,
                };
                (name, entry)
            })
            .collect::<IndexMap<_, _>>();

        debug!(path = %path.display(), plugins = entries.len(), "Loaded plugin registry");
        Ok(Self { path, entries })
    }

    /// Write the registry to its file, creating the parent directory if needed
    pub fn save(&self) -> PluginResult<()> {
        let file = RegistryFile {
            plugins: self
                .entries
                .iter()
                .map(|(name, entry)| {
                    let stored = StoredPlugin {
                        location: entry.binary_path.clone(),
                        version: entry.metadata.version,
                        commands: entry.metadata.commands.clone(),
                    };
                    (name.clone(), stored)
                })
                .collect(),
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PluginError::registry(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let content = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, content).map_err(|e| {
            PluginError::registry(format!("Failed to write {}: {}", self.path.display(), e))
        })?;

        debug!(path = %self.path.display(), plugins = self.entries.len(), "Saved plugin registry");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add or replace the entry for `metadata.name`
    pub fn add(&mut self, metadata: PluginMetadata, binary_path: PathBuf) {
        let name = metadata.name.clone();
        self.entries.insert(
            name,
            RegistryEntry {
                metadata,
                binary_path,
            },
        );
    }

    /// Remove an entry, keeping the order of the others
    pub fn remove(&mut self, name: &str) -> Option<RegistryEntry> {
        self.entries.shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Entries in installation order
    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the plugin and command answering to `token` by name or alias
    pub fn find_command(&self, token: &str) -> Option<(&RegistryEntry, &PluginCommand)> {
        self.entries().find_map(|entry| {
            entry
                .metadata
                .find_command(token)
                .map(|command| (entry, command))
        })
    }
}
