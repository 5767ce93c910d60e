//! Plugin API for nimbus CLI plugins
//!
//! This crate is shared by the host CLI and by plugin authors:
//! - `metadata`: the self-description a plugin reports (name, version, commands)
//! - `protocol`: the newline-delimited JSON-RPC messages exchanged with the host
//! - `sdk`: a small runtime that implements the plugin side of both contracts

pub mod metadata;
pub mod protocol;
pub mod sdk;

pub use metadata::{PluginCommand, PluginMetadata, PluginVersion};
pub use protocol::{RpcError, RpcRequest, RpcResponse, RunResult};
pub use sdk::{serve, Plugin, PluginContext, SdkError};

/// Argument that asks a plugin binary to print its metadata and exit.
pub const METADATA_MODE_ARG: &str = "SendMetadata";

/// Argument that starts a plugin binary in RPC mode.
///
/// Full argument vector: `[RPC_MODE_ARG, <session token>, <host callback address>]`.
pub const RPC_MODE_ARG: &str = "RunRpc";

/// Plugin API version, reported in host diagnostics
pub const PLUGIN_API_VERSION: &str = env!("CARGO_PKG_VERSION");
