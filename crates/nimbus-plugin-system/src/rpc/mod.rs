//! RPC bridge between the host and a running plugin
//!
//! Two independent loopback connections exist per session: the host dials the
//! plugin to issue `run` ([`PluginRunClient`]), and the plugin dials the host to
//! stream output and delegate native commands ([`CallbackServer`]).

pub mod callback;
pub mod client;

pub use callback::CallbackServer;
pub use client::PluginRunClient;
