//! Plugins shipped with the engine.

pub mod utility;
pub mod write_frames;

use std::sync::Arc;

use crate::plugin::PluginManager;

pub use utility::UtilityPlugin;
pub use write_frames::{WriteFramesPlugin, format_frame_tokens};

pub const WRITE_FRAMES_ID: &str = "net.engine.WriteFrames";
pub const DOT_ID: &str = "net.engine.Dot";
pub const CONSTANT_ID: &str = "net.engine.Constant";
pub const GROUP_ID: &str = "net.engine.Group";

pub fn register_builtin_plugins(manager: &PluginManager) {
    manager.register(Arc::new(WriteFramesPlugin::new()));
    manager.register(Arc::new(UtilityPlugin::dot()));
    manager.register(Arc::new(UtilityPlugin::constant()));
    manager.register(Arc::new(UtilityPlugin::group()));
}
