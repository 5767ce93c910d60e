//! Plugin extension subsystem for the nimbus CLI
//!
//! Plugins are standalone executables. At install time their metadata is
//! validated against the native commands and the already-installed plugins;
//! at invocation time a fresh process is started per command and driven over
//! a loopback RPC channel while its output is relayed to the terminal.

pub mod actor;
pub mod error;
pub mod installer;
pub mod metadata;
pub mod native;
pub mod registry;
pub mod relay;
pub mod rpc;
pub mod session;
pub mod supervisor;
pub mod validator;

pub use actor::PluginActor;
pub use error::{ConflictError, PluginError, PluginResult};
pub use installer::{Installer, INSTALLED_MODE};
pub use metadata::{BinaryMetadataProvider, MetadataProvider};
pub use native::{NativeCommandTable, NativeInvoker, NoNativeCommands, StaticCommandTable};
pub use registry::{PluginRegistry, RegistryEntry, REGISTRY_FILE_NAME};
pub use relay::{CaptureBuffer, OutputRelay};
pub use session::InvocationSession;
pub use supervisor::{PluginSupervisor, SessionOptions};
pub use validator::validate;
