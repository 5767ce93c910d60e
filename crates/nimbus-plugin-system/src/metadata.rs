//! Interrogating a candidate binary for its metadata

use crate::error::{PluginError, PluginResult};
use async_trait::async_trait;
use nimbus_plugin_api::{PluginMetadata, METADATA_MODE_ARG};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Source of plugin metadata for a binary on disk
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn metadata(&self, binary: &Path) -> PluginResult<PluginMetadata>;
}

/// Runs the binary in metadata mode and parses the JSON document it prints
#[derive(Debug, Clone)]
pub struct BinaryMetadataProvider {
    timeout: Duration,
}

impl BinaryMetadataProvider {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl MetadataProvider for BinaryMetadataProvider {
    async fn metadata(&self, binary: &Path) -> PluginResult<PluginMetadata> {
        debug!(binary = %binary.display(), "Querying plugin metadata");

        let child = Command::new(binary)
            .arg(METADATA_MODE_ARG)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PluginError::metadata(binary, format!("failed to execute: {}", e)))?;

        // On timeout the child is dropped and killed
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                PluginError::metadata(
                    binary,
                    format!("no response within {}ms", self.timeout.as_millis()),
                )
            })?
            .map_err(|e| PluginError::metadata(binary, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PluginError::metadata(
                binary,
                format!("exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        parse_metadata(&output.stdout).map_err(|message| PluginError::metadata(binary, message))
    }
}

/// Parse the first non-empty line of metadata-mode output
fn parse_metadata(stdout: &[u8]) -> Result<PluginMetadata, String> {
    let text = String::from_utf8_lossy(stdout);
    let document = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| "printed no metadata".to_string())?;

    serde_json::from_str(document).map_err(|e| format!("printed malformed metadata: {}", e))
}
