//! Plugin operations behind the CLI commands

use crate::error::{ConflictError, PluginError, PluginResult};
use crate::installer::Installer;
use crate::metadata::{BinaryMetadataProvider, MetadataProvider};
use crate::native::{NativeCommandTable, NativeInvoker};
use crate::registry::{PluginRegistry, RegistryEntry};
use crate::relay::OutputRelay;
use crate::supervisor::{PluginSupervisor, SessionOptions};
use crate::validator::validate;
use nimbus_config::AppConfig;
use nimbus_plugin_api::PluginMetadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Install, uninstall, list, and run plugins
pub struct PluginActor {
    registry: PluginRegistry,
    installer: Installer,
    metadata: Arc<dyn MetadataProvider>,
    supervisor: PluginSupervisor,
}

impl PluginActor {
    pub fn new(
        registry: PluginRegistry,
        installer: Installer,
        metadata: Arc<dyn MetadataProvider>,
        supervisor: PluginSupervisor,
    ) -> Self {
        Self {
            registry,
            installer,
            metadata,
            supervisor,
        }
    }

    /// Actor over the configured plugin home
    pub fn from_config(config: &AppConfig, native: Arc<dyn NativeInvoker>) -> PluginResult<Self> {
        let plugin_home = config.plugin_home();
        debug!(plugin_home = %plugin_home.display(), "Opening plugin home");

        Ok(Self::new(
            PluginRegistry::in_plugin_home(&plugin_home)?,
            Installer::new(plugin_home),
            Arc::new(BinaryMetadataProvider::new(config.plugins.metadata_timeout())),
            PluginSupervisor::new(SessionOptions::from(&config.plugins), native),
        ))
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Ask the binary for its metadata
    pub async fn fetch_metadata(&self, path: &Path) -> PluginResult<PluginMetadata> {
        self.metadata.metadata(path).await
    }

    /// Validate metadata read from the binary at `path`
    pub fn validate(
        &self,
        path: &Path,
        metadata: &PluginMetadata,
        native: &dyn NativeCommandTable,
    ) -> PluginResult<()> {
        validate(metadata, native, &self.registry).map_err(|err| match err {
            ConflictError::InvalidPlugin => PluginError::invalid_plugin(path),
            other => other.into(),
        })
    }

    /// Fetch and validate the metadata of the binary at `path`
    pub async fn validate_plugin(
        &self,
        path: &Path,
        native: &dyn NativeCommandTable,
    ) -> PluginResult<PluginMetadata> {
        let metadata = self.fetch_metadata(path).await?;
        self.validate(path, &metadata, native)?;
        Ok(metadata)
    }

    pub fn install_plugin(&mut self, path: &Path, metadata: PluginMetadata) -> PluginResult<PathBuf> {
        self.installer.install(&mut self.registry, path, metadata)
    }

    pub fn uninstall_plugin(&mut self, name: &str) -> PluginResult<RegistryEntry> {
        self.installer.uninstall(&mut self.registry, name)
    }

    /// Uninstall `name` so that the binary at `replacement` can take its place
    pub fn uninstall_plugin_for_replacement(
        &mut self,
        name: &str,
        replacement: &Path,
    ) -> PluginResult<RegistryEntry> {
        self.installer
            .uninstall_replacing(&mut self.registry, name, replacement)
    }

    /// Dispatch `args` to the plugin that owns `args[0]`
    pub async fn run_plugin_command(&self, args: Vec<String>, relay: OutputRelay) -> PluginResult<()> {
        let token = args.first().map(String::as_str).unwrap_or_default();
        let (entry, command) = self
            .registry
            .find_command(token)
            .ok_or_else(|| PluginError::unknown_command(token))?;
        debug!(plugin = %entry.name(), command = %command.name, "Dispatching to plugin");

        self.supervisor
            .invoke(entry.name(), &entry.binary_path, args, relay)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MockMetadataProvider;
    use crate::native::{NoNativeCommands, StaticCommandTable};
    use crate::relay::CaptureBuffer;
    use nimbus_plugin_api::{PluginCommand, PluginVersion};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn actor_with(plugin_home: &Path, metadata: MockMetadataProvider) -> PluginActor {
        PluginActor::new(
            PluginRegistry::in_plugin_home(plugin_home).unwrap(),
            Installer::new(plugin_home),
            Arc::new(metadata),
            PluginSupervisor::new(SessionOptions::default(), Arc::new(NoNativeCommands)),
        )
    }

    fn greeter() -> PluginMetadata {
        PluginMetadata::new("greeter", PluginVersion::new(1, 0, 0))
            .with_command(PluginCommand::new("hello").with_alias("hi"))
    }

    #[tokio::test]
    async fn test_invalid_metadata_names_the_file() {
        let plugin_home = TempDir::new().unwrap();
        let mut provider = MockMetadataProvider::new();
        provider
            .expect_metadata()
            .times(1)
            .returning(|_| Ok(PluginMetadata::new("nameless-commands", PluginVersion::default())));

        let actor = actor_with(plugin_home.path(), provider);
        let err = actor
            .validate_plugin(Path::new("/tmp/some-plugin"), &StaticCommandTable::new())
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "File /tmp/some-plugin is not a valid nimbus plugin binary."
        );
    }

    #[tokio::test]
    async fn test_nameless_metadata_document_is_invalid_plugin() {
        let plugin_home = TempDir::new().unwrap();
        let mut provider = MockMetadataProvider::new();
        provider.expect_metadata().times(1).returning(|_| {
            Ok(serde_json::from_str(
                r#"{"version":{"major":1,"minor":0,"build":0},"commands":[{"name":"hello","alias":"hi"}]}"#,
            )
            .unwrap())
        });

        let actor = actor_with(plugin_home.path(), provider);
        let err = actor
            .validate_plugin(Path::new("/tmp/nameless"), &StaticCommandTable::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PluginError::InvalidPlugin { .. }));
        assert_eq!(
            err.to_string(),
            "File /tmp/nameless is not a valid nimbus plugin binary."
        );
    }

    #[tokio::test]
    async fn test_metadata_error_is_returned() {
        let plugin_home = TempDir::new().unwrap();
        let mut provider = MockMetadataProvider::new();
        provider
            .expect_metadata()
            .returning(|path| Err(PluginError::metadata(path, "boom")));

        let actor = actor_with(plugin_home.path(), provider);
        let err = actor
            .validate_plugin(Path::new("/tmp/some-plugin"), &StaticCommandTable::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PluginError::Metadata { .. }));
    }

    #[tokio::test]
    async fn test_validate_install_and_lookup() {
        let plugin_home = TempDir::new().unwrap();
        let source_dir = TempDir::new().unwrap();
        let source = source_dir.path().join("greeter-bin");
        std::fs::write(&source, b"binary").unwrap();

        let mut provider = MockMetadataProvider::new();
        provider.expect_metadata().returning(|_| Ok(greeter()));
        let mut actor = actor_with(plugin_home.path(), provider);

        let metadata = actor
            .validate_plugin(&source, &StaticCommandTable::new())
            .await
            .unwrap();
        actor.install_plugin(&source, metadata).unwrap();
        assert!(actor.registry().find_command("hi").is_some());

        // Same name, new commands: the name check is the only violation left
        let err = actor
            .validate(
                &source,
                &PluginMetadata::new("greeter", PluginVersion::new(2, 0, 0))
                    .with_command(PluginCommand::new("wave")),
                &StaticCommandTable::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            PluginError::Conflict(ConflictError::AlreadyInstalled { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_command_is_not_dispatched() {
        let plugin_home = TempDir::new().unwrap();
        let actor = actor_with(plugin_home.path(), MockMetadataProvider::new());

        let err = actor
            .run_plugin_command(
                vec!["frobnicate".to_string()],
                OutputRelay::new(CaptureBuffer::new()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PluginError::UnknownCommand { .. }));
    }

    #[test]
    fn test_file_exists() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plugin");
        std::fs::write(&file, b"").unwrap();

        let actor = actor_with(dir.path(), MockMetadataProvider::new());
        assert!(actor.file_exists(&file));
        assert!(!actor.file_exists(&dir.path().join("missing")));
        assert!(!actor.file_exists(dir.path()));
    }
}
