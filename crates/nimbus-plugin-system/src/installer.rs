//! Copying plugin binaries into the plugin home

use crate::error::{PluginError, PluginResult};
use crate::registry::{PluginRegistry, RegistryEntry};
use nimbus_plugin_api::PluginMetadata;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Mode of every installed plugin binary
pub const INSTALLED_MODE: u32 = 0o700;

/// Installs and removes plugin binaries under a plugin home directory
#[derive(Debug, Clone)]
pub struct Installer {
    plugin_home: PathBuf,
}

impl Installer {
    pub fn new(plugin_home: impl Into<PathBuf>) -> Self {
        Self {
            plugin_home: plugin_home.into(),
        }
    }

    pub fn plugin_home(&self) -> &Path {
        &self.plugin_home
    }

    /// Copy `source` into the plugin home, then record and persist the entry.
    ///
    /// The registry is only touched once the copy has succeeded. If persisting
    /// fails the in-memory registry already holds the new entry.
    pub fn install(
        &self,
        registry: &mut PluginRegistry,
        source: &Path,
        metadata: PluginMetadata,
    ) -> PluginResult<PathBuf> {
        let file_name = source
            .file_name()
            .ok_or_else(|| PluginError::invalid_plugin(source))?;
        let destination = self.plugin_home.join(file_name);

        self.copy_executable(source, &destination)?;

        let name = metadata.name.clone();
        let version = metadata.version;
        registry.add(metadata, destination.clone());
        registry.save()?;

        info!(
            plugin = %name,
            version = %version,
            path = %destination.display(),
            "Plugin installed"
        );
        Ok(destination)
    }

    /// Delete the installed binary and drop the registry entry
    pub fn uninstall(&self, registry: &mut PluginRegistry, name: &str) -> PluginResult<RegistryEntry> {
        self.remove_entry(registry, name, None)
    }

    /// Uninstall `name` ahead of installing `replacement` under the same name.
    ///
    /// When `replacement` is the installed binary itself the file is kept, so
    /// the following install still has something to copy.
    pub fn uninstall_replacing(
        &self,
        registry: &mut PluginRegistry,
        name: &str,
        replacement: &Path,
    ) -> PluginResult<RegistryEntry> {
        self.remove_entry(registry, name, Some(replacement))
    }

    fn remove_entry(
        &self,
        registry: &mut PluginRegistry,
        name: &str,
        keep: Option<&Path>,
    ) -> PluginResult<RegistryEntry> {
        let entry = registry
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::not_installed(name))?;

        if keep.is_some_and(|keep| is_same_file(keep, &entry.binary_path)) {
            debug!(
                plugin = %name,
                path = %entry.binary_path.display(),
                "Keeping installed binary, it is the replacement source"
            );
        } else {
            match std::fs::remove_file(&entry.binary_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(
                        plugin = %name,
                        path = %entry.binary_path.display(),
                        "Installed binary already missing"
                    );
                }
                Err(e) => {
                    return Err(PluginError::io(format!(
                        "Failed to remove {}: {}",
                        entry.binary_path.display(),
                        e
                    )))
                }
            }
        }

        registry.remove(name);
        registry.save()?;

        info!(plugin = %name, "Plugin uninstalled");
        Ok(entry)
    }

    fn copy_executable(&self, source: &Path, destination: &Path) -> PluginResult<()> {
        std::fs::create_dir_all(&self.plugin_home).map_err(|e| {
            PluginError::io(format!(
                "Failed to create plugin directory {}: {}",
                self.plugin_home.display(),
                e
            ))
        })?;

        // Copying a file onto itself would truncate it
        if !is_same_file(source, destination) {
            std::fs::copy(source, destination).map_err(|e| {
                PluginError::io(format!(
                    "Failed to copy {} to {}: {}",
                    source.display(),
                    destination.display(),
                    e
                ))
            })?;
        }

        set_executable(destination)?;
        debug!(
            source = %source.display(),
            destination = %destination.display(),
            "Copied plugin binary"
        );
        Ok(())
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> PluginResult<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(INSTALLED_MODE)).map_err(|e| {
        PluginError::io(format!(
            "Failed to set permissions on {}: {}",
            path.display(),
            e
        ))
    })
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> PluginResult<()> {
    Ok(())
}
