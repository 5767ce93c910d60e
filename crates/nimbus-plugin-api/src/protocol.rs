//! Wire protocol between the host CLI and a plugin process
//!
//! Every message is a single JSON object terminated by `\n`. Requests carry an
//! `id` that the matching response echoes. Two independent connections exist
//! per session:
//!
//! - host -> plugin: one `run` request on the address the plugin printed
//! - plugin -> host: `register_output`, `output`, and `call_native` requests on
//!   the callback address the host passed at spawn time

use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub const JSONRPC_VERSION: &str = "2.0";

/// Method names
pub mod methods {
    /// host -> plugin: execute a command
    pub const RUN: &str = "run";
    /// plugin -> host: register the output bucket for this session
    pub const REGISTER_OUTPUT: &str = "register_output";
    /// plugin -> host: relay raw output bytes
    pub const OUTPUT: &str = "output";
    /// plugin -> host: run a native CLI command
    pub const CALL_NATIVE: &str = "call_native";
}

/// Error codes used in `RpcError`
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Callback connection did not register with the session token
    pub const UNAUTHORIZED: i64 = -32001;
}

fn jsonrpc_version() -> String {
    JSONRPC_VERSION.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new<P: Serialize>(id: u64, method: &str, params: &P) -> io::Result<Self> {
        Ok(Self {
            jsonrpc: jsonrpc_version(),
            id,
            method: method.to_string(),
            params: serde_json::to_value(params).map_err(invalid_data)?,
        })
    }

    /// Deserialize the params into the method's parameter type
    pub fn parse_params<P: DeserializeOwned>(&self) -> Result<P, RpcError> {
        serde_json::from_value(self.params.clone()).map_err(|e| {
            RpcError::new(
                error_codes::INVALID_PARAMS,
                format!("Invalid params for '{}': {}", self.method, e),
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success<R: Serialize>(id: u64, result: &R) -> io::Result<Self> {
        Ok(Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: Some(serde_json::to_value(result).map_err(invalid_data)?),
            error: None,
        })
    }

    pub fn failure(id: u64, error: RpcError) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Convert into the typed result, surfacing a remote error as `Err`
    pub fn into_result<R: DeserializeOwned>(self) -> Result<R, RpcError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let value = self.result.unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| {
            RpcError::new(
                error_codes::PARSE_ERROR,
                format!("Malformed result: {}", e),
            )
        })
    }
}

/// Params of `run`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParams {
    pub args: Vec<String>,
}

/// Result of `run`: `error` is the plugin's own logical error, if any
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    #[serde(default)]
    pub error: Option<String>,
}

impl RunResult {
    pub fn ok() -> Self {
        Self { error: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
        }
    }
}

/// Params of `register_output`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterOutputParams {
    pub token: String,
}

/// Params of `output`: raw bytes, base64 encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputParams {
    pub data: String,
}

impl OutputParams {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.data)
    }
}

/// Params of `call_native`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallNativeParams {
    pub args: Vec<String>,
}

/// Result of `call_native`: the command's output lines and its error, if any
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallNativeResult {
    #[serde(default)]
    pub lines: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Acknowledgement with no payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {}

fn invalid_data(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// Write one message followed by a newline and flush
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(message).map_err(invalid_data)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

/// Read the next message; `Ok(None)` means the peer closed the connection
pub async fn read_frame<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        return serde_json::from_str(trimmed).map(Some).map_err(invalid_data);
    }
}
