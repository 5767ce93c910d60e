//! Host-side endpoint the plugin calls back into

use crate::native::NativeInvoker;
use crate::relay::OutputRelay;
use nimbus_plugin_api::protocol::{
    error_codes, methods, read_frame, write_frame, Ack, CallNativeParams, CallNativeResult,
    OutputParams, RegisterOutputParams,
};
use nimbus_plugin_api::{RpcError, RpcRequest, RpcResponse};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, warn};

struct CallbackState {
    token: String,
    relay: OutputRelay,
    native: Arc<dyn NativeInvoker>,
}

/// Loopback server accepting plugin callback connections for one session
pub struct CallbackServer {
    listener: TcpListener,
    state: Arc<CallbackState>,
}

impl CallbackServer {
    /// Bind to an ephemeral loopback port
    pub async fn bind(
        token: impl Into<String>,
        relay: OutputRelay,
        native: Arc<dyn NativeInvoker>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        debug!(address = %listener.local_addr()?, "Callback server bound");

        Ok(Self {
            listener,
            state: Arc::new(CallbackState {
                token: token.into(),
                relay,
                native,
            }),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve on a background task until `shutdown` changes or its sender drops
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Accept loop; each connection is served on its own task
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "Plugin callback connection accepted");
                        let state = self.state.clone();
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, state).await {
                                warn!(error = %e, "Callback connection failed");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept callback connection");
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        // Dropping the set aborts connections the plugin left open
        debug!(open = connections.len(), "Callback server stopped");
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<CallbackState>) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut registered = false;

    loop {
        let request: RpcRequest = match read_frame(&mut reader).await {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                let error = RpcError::new(error_codes::PARSE_ERROR, format!("Parse error: {}", e));
                write_frame(&mut writer, &RpcResponse::failure(0, error)).await?;
                continue;
            }
            Err(e) => return Err(e),
        };

        if !registered {
            if let Err(error) = authorize(&request, &state.token) {
                warn!(method = %request.method, "Rejected unauthorized callback connection");
                write_frame(&mut writer, &RpcResponse::failure(request.id, error)).await?;
                return Ok(());
            }
            registered = true;
            debug!("Plugin output bucket registered");
            write_frame(&mut writer, &RpcResponse::success(request.id, &Ack {})?).await?;
            continue;
        }

        let response = state.dispatch(request).await?;
        write_frame(&mut writer, &response).await?;
    }

    debug!("Plugin callback connection closed");
    Ok(())
}

/// The first call on a connection must register the output bucket with the session token
fn authorize(request: &RpcRequest, token: &str) -> Result<(), RpcError> {
    if request.method != methods::REGISTER_OUTPUT {
        return Err(RpcError::new(
            error_codes::UNAUTHORIZED,
            format!(
                "'{}' must be the first call, got '{}'",
                methods::REGISTER_OUTPUT,
                request.method
            ),
        ));
    }

    let params: RegisterOutputParams = request.parse_params()?;
    if params.token != token {
        return Err(RpcError::new(
            error_codes::UNAUTHORIZED,
            "Invalid session token",
        ));
    }

    Ok(())
}

impl CallbackState {
    async fn dispatch(&self, request: RpcRequest) -> io::Result<RpcResponse> {
        let id = request.id;
        let outcome = match request.method.as_str() {
            methods::OUTPUT => self.output(&request),
            methods::CALL_NATIVE => self.call_native(&request).await,
            methods::REGISTER_OUTPUT => {
                authorize(&request, &self.token).and_then(|()| to_value(&Ack {}))
            }
            other => Err(RpcError::new(
                error_codes::METHOD_NOT_FOUND,
                format!("Unknown method '{}'", other),
            )),
        };

        match outcome {
            Ok(result) => RpcResponse::success(id, &result),
            Err(error) => Ok(RpcResponse::failure(id, error)),
        }
    }

    fn output(&self, request: &RpcRequest) -> Result<serde_json::Value, RpcError> {
        let params: OutputParams = request.parse_params()?;
        let bytes = params.decode().map_err(|e| {
            RpcError::new(
                error_codes::INVALID_PARAMS,
                format!("Output is not valid base64: {}", e),
            )
        })?;

        // Acknowledge only once the bytes are in the sink
        self.relay.relay(&bytes).map_err(|e| {
            RpcError::new(
                error_codes::INTERNAL_ERROR,
                format!("Failed to write output: {}", e),
            )
        })?;

        to_value(&Ack {})
    }

    async fn call_native(&self, request: &RpcRequest) -> Result<serde_json::Value, RpcError> {
        let params: CallNativeParams = request.parse_params()?;
        debug!(args = ?params.args, "Plugin invoked native command");

        let result = match self.native.invoke(params.args).await {
            Ok(lines) => {
                if let Err(e) = self.relay.relay_lines(&lines) {
                    warn!(error = %e, "Failed to relay native command output");
                }
                CallNativeResult { lines, error: None }
            }
            Err(message) => CallNativeResult {
                lines: Vec::new(),
                error: Some(message),
            },
        };

        to_value(&result)
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, RpcError> {
    serde_json::to_value(value)
        .map_err(|e| RpcError::new(error_codes::INTERNAL_ERROR, e.to_string()))
}
