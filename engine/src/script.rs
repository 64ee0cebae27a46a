//! Call contract of the embedded scripting runtime.
//!
//! The engine only names an entry point, passes positional string arguments
//! and checks whether the call raised. Scripted groups additionally get a
//! [`ScriptHost`] through which the script builds the group's sub-graph.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::node::params::ParamValue;

/// Entry point a group script must define. Arguments, in order:
/// script path, application id string, fully specified group name.
pub const CREATE_INSTANCE_ENTRY_POINT: &str = "createInstance";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("no scripting runtime available to run '{0}'")]
    Unavailable(String),
    #[error("'{entry_point}' raised: {message}")]
    Raised {
        entry_point: String,
        message: String,
    },
    #[error("cannot read group metadata from {}: {message}", path.display())]
    Metadata { path: PathBuf, message: String },
}

/// Values a group script declares about itself.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMetadata {
    pub id: String,
    pub label: String,
    pub version: u32,
    pub grouping: String,
}

/// Graph operations exposed to a running group script. Nodes are addressed by
/// their script name inside the group.
pub trait ScriptHost {
    /// Creates a node and returns the name it was given.
    fn create_node(&mut self, plugin_id: &str, name: Option<&str>) -> Result<String, String>;
    fn connect(&mut self, upstream: &str, downstream: &str, input: usize) -> Result<(), String>;
    fn set_param(&mut self, node: &str, param: &str, value: ParamValue) -> Result<(), String>;
}

pub trait ScriptRunner: Send + Sync {
    fn group_metadata(&self, script: &Path) -> Result<GroupMetadata, ScriptError>;

    fn call(
        &self,
        entry_point: &str,
        args: &[String],
        host: Option<&mut dyn ScriptHost>,
    ) -> Result<(), ScriptError>;
}

/// Headless runner for sessions without a scripting runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoScripting;

impl ScriptRunner for NoScripting {
    fn group_metadata(&self, script: &Path) -> Result<GroupMetadata, ScriptError> {
        Err(ScriptError::Unavailable(script.display().to_string()))
    }

    fn call(
        &self,
        entry_point: &str,
        _args: &[String],
        _host: Option<&mut dyn ScriptHost>,
    ) -> Result<(), ScriptError> {
        Err(ScriptError::Unavailable(entry_point.to_string()))
    }
}
