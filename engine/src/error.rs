use std::path::PathBuf;

use thiserror::Error;

use crate::plugin::VersionRequest;
use crate::render::RenderError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Plugin '{id}' is not installed")]
    PluginNotFound { id: String },
    #[error("Plugin '{id}' has no installed version matching {major}.{minor}")]
    VersionNotFound {
        id: String,
        major: VersionRequest,
        minor: VersionRequest,
    },
    #[error("Plugin '{plugin_id}' refused to instantiate: {reason}")]
    Construction { plugin_id: String, reason: String },
    #[error("No writer named '{0}' in the project")]
    UnknownWriter(String),
    #[error("Writer '{writer}': frame range {first}..{last} is inconsistent with step {step}")]
    InvalidFrameRange {
        writer: String,
        first: i32,
        last: i32,
        step: i32,
    },
    #[error("A render batch is already running on this instance")]
    DispatchBusy,
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("Failed to load project {}: {reason}", path.display())]
    ProjectLoad { path: PathBuf, reason: String },
    #[error("Script error: {0}")]
    Script(#[from] crate::script::ScriptError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl EngineError {
    pub fn construction(plugin_id: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Construction {
            plugin_id: plugin_id.into(),
            reason: reason.into(),
        }
    }

    pub fn project_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        EngineError::ProjectLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        EngineError::Runtime(message.into())
    }

    /// True for the two resolution failures of the plugin registry.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            EngineError::PluginNotFound { .. } | EngineError::VersionNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
