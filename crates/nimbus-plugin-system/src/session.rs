//! One plugin process serving one command invocation

use crate::error::{PluginError, PluginResult};
use crate::native::NativeInvoker;
use crate::relay::OutputRelay;
use crate::rpc::{CallbackServer, PluginRunClient};
use crate::supervisor::SessionOptions;
use nimbus_plugin_api::{RunResult, RPC_MODE_ARG};
use std::net::SocketAddr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

/// Callback server task plus the signal that stops it
struct CallbackHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl CallbackHandle {
    async fn stop(&mut self, grace: Duration) {
        let _ = self.shutdown.send(true);
        if let Some(mut task) = self.task.take() {
            if timeout(grace, &mut task).await.is_err() {
                warn!("Callback server did not stop in time");
                task.abort();
            }
        }
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// A running plugin process with both RPC endpoints established.
///
/// Created by [`InvocationSession::start`], used for a single `run`, then
/// consumed by [`InvocationSession::shutdown`]. Dropping a session that was not
/// shut down kills the process.
pub struct InvocationSession {
    plugin: String,
    child: Child,
    address: SocketAddr,
    options: SessionOptions,
    callback: CallbackHandle,
    stdout_task: Option<JoinHandle<()>>,
    closed: bool,
}

impl InvocationSession {
    /// Spawn the plugin and complete the startup handshake
    pub async fn start(
        plugin: &str,
        binary: &Path,
        relay: OutputRelay,
        native: Arc<dyn NativeInvoker>,
        options: SessionOptions,
    ) -> PluginResult<Self> {
        let token = Uuid::new_v4().to_string();
        let server = CallbackServer::bind(token.clone(), relay.clone(), native)
            .await
            .map_err(|e| {
                PluginError::startup(plugin, format!("could not open callback endpoint: {}", e))
            })?;
        let callback_addr = server
            .local_addr()
            .map_err(|e| PluginError::startup(plugin, e.to_string()))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let callback = CallbackHandle {
            shutdown: shutdown_tx,
            task: Some(server.spawn(shutdown_rx)),
        };

        let mut child = Command::new(binary)
            .arg(RPC_MODE_ARG)
            .arg(&token)
            .arg(callback_addr.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PluginError::startup(
                    plugin,
                    format!("could not execute {}: {}", binary.display(), e),
                )
            })?;

        let pid = child.id();
        tracing::Span::current().record("pid", pid);
        debug!(?pid, binary = %binary.display(), %callback_addr, "Plugin process spawned");

        let Some(stdout) = child.stdout.take() else {
            stop_child(&mut child, Duration::ZERO).await;
            return Err(PluginError::startup(plugin, "stdout was not captured"));
        };
        let mut stdout = BufReader::new(stdout);

        let address = match read_address(&mut stdout, options.startup_timeout).await {
            Ok(address) => address,
            Err(message) => {
                stop_child(&mut child, Duration::ZERO).await;
                return Err(PluginError::startup(plugin, message));
            }
        };
        debug!(%address, "Plugin reported its RPC address");

        let stdout_task = tokio::spawn(forward_stdout(stdout, relay));

        Ok(Self {
            plugin: plugin.to_string(),
            child,
            address,
            options,
            callback,
            stdout_task: Some(stdout_task),
            closed: false,
        })
    }

    /// Address the plugin is serving `run` on
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Issue the single `run` call of this session
    pub async fn run(&mut self, args: Vec<String>) -> PluginResult<RunResult> {
        let mut client =
            PluginRunClient::connect(&self.plugin, self.address, self.options.startup_timeout)
                .await?;

        match self.options.run_timeout {
            None => client.run(args).await,
            Some(limit) => timeout(limit, client.run(args)).await.map_err(|_| {
                PluginError::RunTimeout {
                    plugin: self.plugin.clone(),
                    timeout_ms: limit.as_millis(),
                }
            })?,
        }
    }

    /// Wait for the plugin to exit (killing it after the grace period), then
    /// release the output forwarder and the callback endpoint
    pub async fn shutdown(mut self) -> Option<ExitStatus> {
        self.closed = true;
        let grace = self.options.shutdown_grace;

        let status = stop_child(&mut self.child, grace).await;

        if let Some(mut task) = self.stdout_task.take() {
            // Descendants of the plugin may still hold its stdout open
            if timeout(grace, &mut task).await.is_err() {
                warn!(plugin = %self.plugin, "Plugin stdout still open after exit");
                task.abort();
            }
        }

        self.callback.stop(grace).await;
        status
    }
}

impl Drop for InvocationSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!(plugin = %self.plugin, "Plugin session dropped without shutdown, killing process");
            if let Err(e) = self.child.start_kill() {
                debug!(error = %e, "Plugin process already gone");
            }
        }
        if let Some(task) = self.stdout_task.take() {
            task.abort();
        }
    }
}

/// Read the first stdout line and parse it as the plugin's RPC address
pub(crate) async fn read_address<R>(reader: &mut R, limit: Duration) -> Result<SocketAddr, String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    match timeout(limit, reader.read_line(&mut line)).await {
        Err(_) => Err(format!(
            "no RPC address reported within {}ms",
            limit.as_millis()
        )),
        Ok(Err(e)) => Err(format!("could not read RPC address: {}", e)),
        Ok(Ok(0)) => Err("exited before reporting its RPC address".to_string()),
        Ok(Ok(_)) => {
            let line = line.trim();
            let address: SocketAddr = line
                .parse()
                .map_err(|_| format!("reported an invalid RPC address '{}'", line))?;
            if !address.ip().is_loopback() {
                return Err(format!("reported a non-loopback RPC address '{}'", address));
            }
            Ok(address)
        }
    }
}

/// Copy everything after the handshake line to the relay until EOF
async fn forward_stdout<R>(mut reader: R, relay: OutputRelay)
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let chunk = match reader.fill_buf().await {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, "Failed to read plugin stdout");
                break;
            }
        };
        if chunk.is_empty() {
            break;
        }

        let len = chunk.len();
        if let Err(e) = relay.relay(chunk) {
            warn!(error = %e, "Failed to relay plugin stdout");
        }
        reader.consume(len);
    }
    debug!("Plugin stdout closed");
}

async fn stop_child(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(%status, "Plugin process exited");
            Some(status)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Failed to wait for plugin process");
            None
        }
        Err(_) => {
            if !grace.is_zero() {
                warn!(grace_ms = grace.as_millis() as u64, "Plugin did not exit in time, killing it");
            }
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill plugin process");
            }
            None
        }
    }
}
