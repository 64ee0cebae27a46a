//! Core plugin traits.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::node::params::{ParamDefinition, ParamSet};
use crate::plugin::PluginDescriptor;

/// Capabilities the running host offers to plugins (e.g. "gpu", "ocio").
#[derive(Debug, Clone, Default)]
pub struct HostCapabilities {
    capabilities: HashSet<String>,
}

impl HostCapabilities {
    pub fn new<I, S>(capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            capabilities: capabilities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// Everything a writer sees while rendering one frame.
pub struct FrameContext<'a> {
    pub node_name: &'a str,
    pub params: &'a ParamSet,
    pub frame: i32,
    /// Labels of the upstream nodes, nearest first.
    pub upstream: &'a [String],
    /// Directory relative output paths are resolved against.
    pub output_dir: &'a Path,
}

/// Installed plugin: the registry's unit of resolution.
pub trait NodePlugin: Send + Sync {
    fn descriptor(&self) -> &Arc<PluginDescriptor>;

    fn parameters(&self) -> Vec<ParamDefinition> {
        Vec::new()
    }

    fn input_count(&self) -> usize {
        1
    }

    /// Nodes without an output (pure sinks) are never auto-connection sources.
    fn has_output(&self) -> bool {
        !self.descriptor().is_writer
    }

    /// Called before a node is built; an error rejects the instantiation.
    fn check_instantiation(&self, host: &HostCapabilities) -> Result<(), String> {
        let missing: Vec<&str> = self
            .descriptor()
            .required_capabilities
            .iter()
            .filter(|c| !host.has(c))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("host lacks capabilities: {}", missing.join(", ")))
        }
    }

    fn render_frame(&self, ctx: &FrameContext<'_>) -> Result<(), String> {
        Err(format!(
            "'{}' is not a writer and cannot render frame {}",
            ctx.node_name, ctx.frame
        ))
    }
}

/// Registry entry for script-backed groups. All behavior comes from the
/// script, so this only carries the descriptor.
pub struct ScriptedGroupPlugin {
    descriptor: Arc<PluginDescriptor>,
}

impl ScriptedGroupPlugin {
    pub fn new(descriptor: PluginDescriptor) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
        }
    }
}

impl NodePlugin for ScriptedGroupPlugin {
    fn descriptor(&self) -> &Arc<PluginDescriptor> {
        &self.descriptor
    }
}
