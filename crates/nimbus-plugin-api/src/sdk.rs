//! Plugin-side runtime
//!
//! A plugin binary calls [`serve`] from `main`. Depending on its arguments the
//! binary either prints its metadata (metadata mode) or runs the RPC handshake
//! and serves a single `run` request (RPC mode):
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use nimbus_plugin_api::{Plugin, PluginCommand, PluginContext, PluginMetadata, PluginVersion};
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl Plugin for Greeter {
//!     fn metadata(&self) -> PluginMetadata {
//!         PluginMetadata::new("greeter", PluginVersion::new(1, 0, 0))
//!             .with_command(PluginCommand::new("hello").with_alias("hi"))
//!     }
//!
//!     async fn run(&self, ctx: &PluginContext, _args: Vec<String>) -> Result<(), String> {
//!         ctx.println("hello").await.map_err(|e| e.to_string())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), nimbus_plugin_api::SdkError> {
//!     nimbus_plugin_api::serve(Greeter).await
//! }
//! ```

use crate::metadata::PluginMetadata;
use crate::protocol::{
    error_codes, methods, read_frame, write_frame, Ack, CallNativeParams, CallNativeResult,
    OutputParams, RegisterOutputParams, RpcError, RpcRequest, RpcResponse, RunParams, RunResult,
};
use crate::{METADATA_MODE_ARG, RPC_MODE_ARG};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::debug;

/// Errors raised by the plugin-side runtime
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SdkError {
    #[error(
        "Unexpected arguments {args:?}: this binary is a nimbus plugin, install it with 'nimbus install-plugin'"
    )]
    Usage { args: Vec<String> },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Host rejected request: {0}")]
    Rpc(RpcError),

    #[error("Host closed the callback connection")]
    Disconnected,
}

/// Implemented by every plugin
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Metadata reported in metadata mode
    fn metadata(&self) -> PluginMetadata;

    /// Execute a command; `args[0]` is the command name or alias the user typed.
    ///
    /// `Err` is the plugin's own logical failure and is shown to the user as-is.
    async fn run(&self, ctx: &PluginContext, args: Vec<String>) -> Result<(), String>;
}

#[derive(Debug, PartialEq, Eq)]
enum Invocation {
    Metadata,
    Rpc {
        token: String,
        callback_addr: String,
    },
}

impl Invocation {
    fn from_args(args: &[String]) -> Result<Self, SdkError> {
        match args {
            [mode] if mode == METADATA_MODE_ARG => Ok(Self::Metadata),
            [mode, token, callback_addr] if mode == RPC_MODE_ARG => Ok(Self::Rpc {
                token: token.clone(),
                callback_addr: callback_addr.clone(),
            }),
            _ => Err(SdkError::Usage {
                args: args.to_vec(),
            }),
        }
    }
}

/// Run the plugin using the process arguments
pub async fn serve<P: Plugin>(plugin: P) -> Result<(), SdkError> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    serve_with_args(plugin, &args).await
}

/// Run the plugin using explicit arguments (without the program name)
pub async fn serve_with_args<P: Plugin>(plugin: P, args: &[String]) -> Result<(), SdkError> {
    match Invocation::from_args(args)? {
        Invocation::Metadata => {
            let json = serde_json::to_string(&plugin.metadata())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(json.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
            Ok(())
        }
        Invocation::Rpc {
            token,
            callback_addr,
        } => serve_rpc(&plugin, &token, &callback_addr).await,
    }
}

async fn serve_rpc<P: Plugin>(
    plugin: &P,
    token: &str,
    callback_addr: &str,
) -> Result<(), SdkError> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let address = listener.local_addr()?;

    // The address line must be the first thing on stdout
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("{}\n", address).as_bytes())
        .await?;
    stdout.flush().await?;

    let (stream, _) = listener.accept().await?;
    drop(listener);
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    while let Some(request) = read_frame::<_, RpcRequest>(&mut reader).await? {
        if request.method != methods::RUN {
            let error = RpcError::new(
                error_codes::METHOD_NOT_FOUND,
                format!("Unknown method '{}'", request.method),
            );
            write_frame(&mut writer, &RpcResponse::failure(request.id, error)).await?;
            continue;
        }

        let params: RunParams = match request.parse_params() {
            Ok(params) => params,
            Err(error) => {
                write_frame(&mut writer, &RpcResponse::failure(request.id, error)).await?;
                continue;
            }
        };

        debug!(args = ?params.args, "Running plugin command");
        let ctx = PluginContext::connect(callback_addr, token).await?;
        let result = match plugin.run(&ctx, params.args).await {
            Ok(()) => RunResult::ok(),
            Err(message) => RunResult::failed(message),
        };
        write_frame(&mut writer, &RpcResponse::success(request.id, &result)?).await?;
        return Ok(());
    }

    Ok(())
}

struct CallbackConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_id: u64,
}

impl CallbackConnection {
    async fn call<P, R>(&mut self, method: &str, params: &P) -> Result<R, SdkError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.next_id += 1;
        let id = self.next_id;
        write_frame(&mut self.writer, &RpcRequest::new(id, method, params)?).await?;

        let response: RpcResponse = read_frame(&mut self.reader)
            .await?
            .ok_or(SdkError::Disconnected)?;
        if response.id != id {
            return Err(SdkError::Rpc(RpcError::new(
                error_codes::INTERNAL_ERROR,
                format!("Expected response {} but got {}", id, response.id),
            )));
        }
        response.into_result().map_err(SdkError::Rpc)
    }
}

/// Handle a plugin uses to talk back to the host during `run`
pub struct PluginContext {
    connection: Mutex<CallbackConnection>,
}

impl PluginContext {
    /// Dial the host callback endpoint and register the output bucket
    pub async fn connect(callback_addr: &str, token: &str) -> Result<Self, SdkError> {
        let stream = TcpStream::connect(callback_addr).await?;
        let (reader, writer) = stream.into_split();
        let mut connection = CallbackConnection {
            reader: BufReader::new(reader),
            writer,
            next_id: 0,
        };

        let _: Ack = connection
            .call(
                methods::REGISTER_OUTPUT,
                &RegisterOutputParams {
                    token: token.to_string(),
                },
            )
            .await?;

        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    /// Send raw bytes to the host's output; returns once the host has written them
    pub async fn write(&self, bytes: &[u8]) -> Result<(), SdkError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut connection = self.connection.lock().await;
        let _: Ack = connection
            .call(methods::OUTPUT, &OutputParams::from_bytes(bytes))
            .await?;
        Ok(())
    }

    pub async fn print(&self, text: &str) -> Result<(), SdkError> {
        self.write(text.as_bytes()).await
    }

    pub async fn println(&self, line: &str) -> Result<(), SdkError> {
        self.write(format!("{}\n", line).as_bytes()).await
    }

    /// Ask the host to run one of its native commands
    pub async fn call_native(&self, args: &[&str]) -> Result<CallNativeResult, SdkError> {
        let params = CallNativeParams {
            args: args.iter().map(|arg| arg.to_string()).collect(),
        };
        let mut connection = self.connection.lock().await;
        connection.call(methods::CALL_NATIVE, &params).await
    }
}
