//! Running plugin commands out of process

use crate::error::{PluginError, PluginResult};
use crate::native::NativeInvoker;
use crate::relay::OutputRelay;
use crate::session::InvocationSession;
use nimbus_config::logging::invocation_span;
use nimbus_config::PluginsConfig;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, Instrument};

/// Timing limits for a plugin session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Time the plugin has to print its RPC address
    pub startup_timeout: Duration,
    /// Time the plugin has to exit on its own before it is killed
    pub shutdown_grace: Duration,
    /// Upper bound for `run`; unbounded when `None`
    pub run_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&PluginsConfig::default())
    }
}

impl From<&PluginsConfig> for SessionOptions {
    fn from(config: &PluginsConfig) -> Self {
        Self {
            startup_timeout: config.startup_timeout(),
            shutdown_grace: config.shutdown_grace(),
            run_timeout: config.run_timeout(),
        }
    }
}

/// Starts a fresh plugin process for every invocation and tears it down afterwards
#[derive(Clone)]
pub struct PluginSupervisor {
    options: SessionOptions,
    native: Arc<dyn NativeInvoker>,
}

impl PluginSupervisor {
    pub fn new(options: SessionOptions, native: Arc<dyn NativeInvoker>) -> Self {
        Self { options, native }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Run `args` (`args[0]` is the command token) in the plugin at `binary`.
    ///
    /// Output is relayed while the plugin runs. A failure the plugin reports is
    /// returned as [`PluginError::Reported`] with the plugin's message.
    pub async fn invoke(
        &self,
        plugin: &str,
        binary: &Path,
        args: Vec<String>,
        relay: OutputRelay,
    ) -> PluginResult<()> {
        let command = args.first().cloned().unwrap_or_default();
        let span = invocation_span(plugin, &command);

        async move {
            let mut session = InvocationSession::start(
                plugin,
                binary,
                relay,
                self.native.clone(),
                self.options.clone(),
            )
            .await?;

            let outcome = session.run(args).await;
            let status = session.shutdown().await;
            debug!(?status, "Plugin session finished");

            let result = outcome.map_err(|err| match (err, status) {
                (PluginError::PluginTransport { plugin, message }, Some(status)) => {
                    PluginError::PluginTransport {
                        plugin,
                        message: format!("{} ({})", message, status),
                    }
                }
                (err, _) => err,
            })?;

            match result.error {
                None => Ok(()),
                Some(message) => Err(PluginError::reported(plugin, message)),
            }
        }
        .instrument(span)
        .await
    }
}
