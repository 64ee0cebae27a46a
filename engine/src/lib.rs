pub mod app;
pub mod builtin;
pub mod config;
pub mod error;
pub mod host;
pub mod node;
pub mod plugin;
pub mod render;
pub mod script;
pub mod session;
pub mod util;

pub use app::{
    AppInstance, AppServices, CloseOutcome, CommandLineArgs, RenderLaunch, SessionRegistry,
    WriterArg,
};
pub use config::EngineSettings;
pub use error::{EngineError, Result};
pub use host::{HeadlessHost, HostCallbacks};
pub use node::{CreationRequest, LoadRequest, Node, NodeCollection, NodeSnapshot};
pub use plugin::{PluginDescriptor, PluginManager, VersionRequest};
pub use render::{BatchReport, RenderError, RenderRequest, RenderTarget, RenderWork};
pub use session::{SessionFlag, SessionState};
