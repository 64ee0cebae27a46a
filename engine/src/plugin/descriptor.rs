//! Plugin descriptors and version requests.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How a plugin builds its nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginKind {
    /// Compiled plugin: the node is fully described by the plugin object.
    Native,
    /// Container node with an internal sub-graph filled by the user or a snapshot.
    Group,
    /// Group backed by a script file that populates the group's sub-graph.
    ScriptedGroup { script: PathBuf },
}

/// Immutable description of one installed plugin version.
///
/// Descriptors are owned by the registry and handed out as `Arc`s; callers
/// never get a mutable copy.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    /// Unique identifier (e.g. "net.engine.WriteFrames")
    pub id: String,
    /// Human-readable name, also the base for generated node names
    pub label: String,
    /// Menu grouping (e.g. "Image/Writers")
    pub grouping: String,
    pub major: u32,
    pub minor: u32,
    pub kind: PluginKind,
    /// Writers are the only nodes the render dispatcher accepts.
    pub is_writer: bool,
    /// Writer must be rendered in a separate process.
    pub requires_clean_host: bool,
    /// Host capabilities the plugin needs to instantiate.
    pub required_capabilities: Vec<String>,
}

impl PluginDescriptor {
    pub fn new(id: &str, label: &str, major: u32, minor: u32) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            grouping: String::new(),
            major,
            minor,
            kind: PluginKind::Native,
            is_writer: false,
            requires_clean_host: false,
            required_capabilities: Vec::new(),
        }
    }

    pub fn with_grouping(mut self, grouping: &str) -> Self {
        self.grouping = grouping.to_string();
        self
    }

    pub fn writer(mut self) -> Self {
        self.is_writer = true;
        self
    }

    pub fn with_clean_host(mut self) -> Self {
        self.requires_clean_host = true;
        self
    }

    pub fn with_capability(mut self, capability: &str) -> Self {
        self.required_capabilities.push(capability.to_string());
        self
    }

    pub fn scripted_group(mut self, script: impl Into<PathBuf>) -> Self {
        self.kind = PluginKind::ScriptedGroup {
            script: script.into(),
        };
        self
    }

    pub fn group(mut self) -> Self {
        self.kind = PluginKind::Group;
        self
    }

    /// Nodes of this plugin own a sub-graph.
    pub fn is_group(&self) -> bool {
        !matches!(self.kind, PluginKind::Native)
    }

    pub fn version(&self) -> (u32, u32) {
        (self.major, self.minor)
    }
}

/// Requested major or minor version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VersionRequest {
    #[default]
    Latest,
    Exact(u32),
}

impl VersionRequest {
    /// Maps the conventional "-1 means latest" encoding.
    pub fn from_signed(value: i32) -> Self {
        if value < 0 {
            VersionRequest::Latest
        } else {
            VersionRequest::Exact(value as u32)
        }
    }
}

impl From<u32> for VersionRequest {
    fn from(value: u32) -> Self {
        VersionRequest::Exact(value)
    }
}

impl From<Option<u32>> for VersionRequest {
    fn from(value: Option<u32>) -> Self {
        value.map_or(VersionRequest::Latest, VersionRequest::Exact)
    }
}

impl fmt::Display for VersionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRequest::Latest => write!(f, "latest"),
            VersionRequest::Exact(v) => write!(f, "{}", v),
        }
    }
}
