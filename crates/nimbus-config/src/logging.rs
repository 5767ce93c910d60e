//! Centralized logging initialization with environment variable support

use crate::{LogFormat, LoggingConfig};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber
///
/// Environment variables (in priority order):
/// - `RUST_LOG`: Standard Rust log filter (takes precedence over all)
/// - `LOG_LEVEL`: Set log level (trace, debug, info, warn, error)
/// - `LOG_FORMAT`: Override format (json, pretty)
///
/// # Examples
///
/// ```bash
/// # See the plugin handshake and RPC traffic
/// LOG_LEVEL=debug nimbus my-plugin-command
///
/// # Module-specific filtering
/// RUST_LOG=nimbus_plugin_system::supervisor=trace nimbus my-plugin-command
/// ```
pub fn initialize(config: &LoggingConfig) {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| config.level.clone());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let format = std::env::var("LOG_FORMAT")
        .ok()
        .and_then(|f| match f.to_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "pretty" | "human" => Some(LogFormat::Pretty),
            _ => None,
        })
        .unwrap_or_else(|| config.format.clone());

    // Always write to stderr: stdout carries user output and relayed plugin output
    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "Tracing subscriber already initialized");
    }
}

/// Span wrapping one plugin command invocation
///
/// ```rust
/// let span = nimbus_config::logging::invocation_span("greeter", "hello");
/// let _enter = span.enter();
/// tracing::info!("Starting plugin");
/// ```
pub fn invocation_span(plugin: &str, command: &str) -> tracing::Span {
    tracing::info_span!(
        "invocation",
        plugin = %plugin,
        command = %command,
        pid = tracing::field::Empty
    )
}
