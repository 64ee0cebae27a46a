//! Serialized form of a node, produced on save and consumed by `load_node`.

use serde::{Deserialize, Serialize};

use crate::node::params::ParamSet;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

fn default_format_version() -> u32 {
    SNAPSHOT_FORMAT_VERSION
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NodeSnapshot {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub plugin_id: String,
    pub plugin_major: u32,
    pub plugin_minor: u32,
    pub script_name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub params: ParamSet,
    /// Upstream script names, one per input slot.
    #[serde(default)]
    pub inputs: Vec<Option<String>>,
    #[serde(default)]
    pub position: Option<(f64, f64)>,
    #[serde(default)]
    pub multi_instance_parent: Option<String>,
    /// Version declared by the group script, for scripted groups. The
    /// plugin fields keep the registered descriptor so loading resolves it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_version: Option<u32>,
    /// Content of group nodes.
    #[serde(default)]
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    pub fn new(plugin_id: &str, plugin_major: u32, plugin_minor: u32, script_name: &str) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            plugin_id: plugin_id.to_string(),
            plugin_major,
            plugin_minor,
            script_name: script_name.to_string(),
            label: script_name.to_string(),
            params: ParamSet::new(),
            inputs: Vec::new(),
            position: None,
            multi_instance_parent: None,
            script_version: None,
            children: Vec::new(),
        }
    }
}
