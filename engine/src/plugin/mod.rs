pub mod descriptor;
pub mod manager;
pub mod repository;
pub mod traits;

pub use descriptor::{PluginDescriptor, PluginKind, VersionRequest};
pub use manager::PluginManager;
pub use traits::{FrameContext, HostCapabilities, NodePlugin, ScriptedGroupPlugin};
