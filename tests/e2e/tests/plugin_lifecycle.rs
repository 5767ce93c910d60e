//! Install and run real plugin processes end to end

use async_trait::async_trait;
use nimbus_config::{AppConfig, PluginsConfig};
use nimbus_plugin_system::{
    CaptureBuffer, NativeInvoker, NoNativeCommands, OutputRelay, PluginActor, PluginError,
    PluginRegistry, PluginSupervisor, SessionOptions, StaticCommandTable,
};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const GREETER: &str = env!("CARGO_BIN_EXE_fixture-greeter");
const CRASH: &str = env!("CARGO_BIN_EXE_fixture-crash");
const SILENT: &str = env!("CARGO_BIN_EXE_fixture-silent");
const INVALID: &str = env!("CARGO_BIN_EXE_fixture-invalid");

fn options() -> SessionOptions {
    SessionOptions {
        startup_timeout: Duration::from_secs(5),
        shutdown_grace: Duration::from_secs(2),
        run_timeout: Some(Duration::from_secs(20)),
    }
}

fn supervisor() -> PluginSupervisor {
    PluginSupervisor::new(options(), Arc::new(NoNativeCommands))
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

async fn invoke(
    supervisor: &PluginSupervisor,
    binary: &str,
    command: &[&str],
) -> (Result<(), PluginError>, String) {
    let capture = CaptureBuffer::new();
    let result = supervisor
        .invoke(
            "fixture",
            Path::new(binary),
            args(command),
            OutputRelay::new(capture.clone()),
        )
        .await;
    (result, capture.to_string_lossy())
}

/// Native command stand-in answering `version`
struct FakeVersion;

#[async_trait]
impl NativeInvoker for FakeVersion {
    async fn invoke(&self, args: Vec<String>) -> Result<Vec<String>, String> {
        match args.first().map(String::as_str) {
            Some("version") => Ok(vec!["nimbus version 9.9.9".to_string()]),
            other => Err(format!("unexpected native command {:?}", other)),
        }
    }
}

#[tokio::test]
#[serial]
async fn test_plugin_output_is_relayed() {
    let (result, output) = invoke(&supervisor(), GREETER, &["hello", "nimbus"]).await;

    result.unwrap();
    assert_eq!(output, "hello nimbus\n");
}

#[tokio::test]
#[serial]
async fn test_output_precedes_reported_failure() {
    let (result, output) = invoke(&supervisor(), GREETER, &["fail"]).await;

    assert_eq!(output, "hello");
    match result.unwrap_err() {
        PluginError::Reported { plugin, message } => {
            assert_eq!(plugin, "fixture");
            assert_eq!(message, e2e::FAILURE_MESSAGE);
        }
        other => panic!("expected a reported failure, got {:?}", other),
    }
}

#[tokio::test]
#[serial]
async fn test_raw_stdout_is_forwarded() {
    let (result, output) = invoke(&supervisor(), GREETER, &["raw-stdout"]).await;

    result.unwrap();
    assert_eq!(output, "straight to stdout\n");
}

#[tokio::test]
#[serial]
async fn test_native_command_from_plugin() {
    let supervisor = PluginSupervisor::new(options(), Arc::new(FakeVersion));

    let (result, output) = invoke(&supervisor, GREETER, &["native-version"]).await;

    result.unwrap();
    assert_eq!(
        output,
        "nimbus version 9.9.9\nnative said: nimbus version 9.9.9\n"
    );
}

#[tokio::test]
#[serial]
async fn test_native_command_unavailable() {
    let (result, _) = invoke(&supervisor(), GREETER, &["native-version"]).await;

    assert!(matches!(result.unwrap_err(), PluginError::Reported { .. }));
}

#[tokio::test]
#[serial]
async fn test_crash_before_handshake_fails_startup() {
    let started = Instant::now();

    let (result, output) = invoke(&supervisor(), CRASH, &["fixture-crash-run"]).await;

    let err = result.unwrap_err();
    assert!(
        matches!(err, PluginError::PluginStartup { .. }),
        "unexpected error {:?}",
        err
    );
    assert!(err.to_string().contains("failed to start"));
    assert!(started.elapsed() < options().startup_timeout);
    assert!(output.is_empty());
}

#[tokio::test]
#[serial]
async fn test_silent_plugin_times_out() {
    let supervisor = PluginSupervisor::new(
        SessionOptions {
            startup_timeout: Duration::from_millis(300),
            ..options()
        },
        Arc::new(NoNativeCommands),
    );
    let started = Instant::now();

    let (result, _) = invoke(&supervisor, SILENT, &["fixture-silent-run"]).await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("no RPC address reported within 300ms"));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
#[serial]
async fn test_plugin_dying_mid_run() {
    let (result, output) = invoke(&supervisor(), GREETER, &["crash"]).await;

    let err = result.unwrap_err();
    assert!(
        matches!(err, PluginError::PluginTransport { .. }),
        "unexpected error {:?}",
        err
    );
    assert_eq!(output, "about to crash\n");
}

struct Home {
    _dir: TempDir,
    plugin_home: PathBuf,
    config: AppConfig,
}

impl Home {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let plugin_home = dir.path().join("plugins");
        let config = AppConfig {
            plugins: PluginsConfig {
                home: Some(plugin_home.clone()),
                startup_timeout_ms: 5_000,
                shutdown_grace_ms: 2_000,
                ..PluginsConfig::default()
            },
            ..AppConfig::default()
        };
        Self {
            _dir: dir,
            plugin_home,
            config,
        }
    }

    fn actor(&self) -> PluginActor {
        PluginActor::from_config(&self.config, Arc::new(NoNativeCommands)).unwrap()
    }
}

fn natives() -> StaticCommandTable {
    StaticCommandTable::new()
        .with_command("install-plugin")
        .with_command("plugins")
        .with_command("version")
        .with_alias("v")
}

#[tokio::test]
#[serial]
async fn test_install_and_dispatch_by_alias() {
    let home = Home::new();
    let mut actor = home.actor();
    let source = Path::new(GREETER);

    let metadata = actor.validate_plugin(source, &natives()).await.unwrap();
    assert_eq!(metadata.name, "fixture-greeter");
    let installed = actor.install_plugin(source, metadata).unwrap();
    assert_eq!(installed, home.plugin_home.join("fixture-greeter"));

    // A fresh actor sees the persisted registry
    let actor = home.actor();
    let reloaded = PluginRegistry::in_plugin_home(&home.plugin_home).unwrap();
    assert_eq!(
        reloaded.get("fixture-greeter").map(|e| e.binary_path.clone()),
        Some(installed)
    );

    let capture = CaptureBuffer::new();
    actor
        .run_plugin_command(args(&["hi", "there"]), OutputRelay::new(capture.clone()))
        .await
        .unwrap();
    assert_eq!(capture.to_string_lossy(), "hello there\n");
}

#[tokio::test]
#[serial]
async fn test_plugin_without_commands_is_rejected() {
    let home = Home::new();
    let actor = home.actor();

    let err = actor
        .validate_plugin(Path::new(INVALID), &natives())
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        format!("File {} is not a valid nimbus plugin binary.", INVALID)
    );
}

#[tokio::test]
#[serial]
async fn test_reinstalling_same_commands_conflicts() {
    let home = Home::new();
    let mut actor = home.actor();
    let metadata = actor
        .validate_plugin(Path::new(GREETER), &natives())
        .await
        .unwrap();
    actor.install_plugin(Path::new(GREETER), metadata).unwrap();

    let err = actor
        .validate_plugin(Path::new(GREETER), &natives())
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Plugin fixture-greeter v1.0.0 could not be installed as it contains commands with names that are already used: hello."
    );
}
