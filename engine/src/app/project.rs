//! Project metadata and its JSON document.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::app::timeline::Timeline;
use crate::node::{NodeCollection, NodeSnapshot};

pub const PROJECT_FORMAT_VERSION: u32 = 1;

pub const DEFAULT_PROJECT_NAME: &str = "Untitled";

fn default_frame_rate() -> f64 {
    24.0
}

fn default_first_frame() -> i32 {
    1
}

fn default_last_frame() -> i32 {
    100
}

/// On-disk form of a project. Documents without `format_version` predate the
/// versioned format and are treated as using lower-case plugin ids.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProjectDocument {
    #[serde(default)]
    pub format_version: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,
    #[serde(default = "default_first_frame")]
    pub first_frame: i32,
    #[serde(default = "default_last_frame")]
    pub last_frame: i32,
    #[serde(default)]
    pub current_frame: i32,
    #[serde(default)]
    pub legacy_lowercase_ids: bool,
    /// Script entry point run after a successful load.
    #[serde(default)]
    pub on_project_loaded: Option<String>,
    /// Script entry point run when a new instance starts.
    #[serde(default)]
    pub on_project_created: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeSnapshot>,
}

impl ProjectDocument {
    pub fn load(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }

    pub fn save(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn uses_legacy_ids(&self) -> bool {
        self.legacy_lowercase_ids || self.format_version == 0
    }

    /// Current state of an instance, ready to be written.
    pub fn capture(project: &Project, timeline: &Timeline, nodes: &NodeCollection) -> Self {
        Self {
            format_version: PROJECT_FORMAT_VERSION,
            name: project.name.clone(),
            frame_rate: project.frame_rate,
            first_frame: timeline.first_frame(),
            last_frame: timeline.last_frame(),
            current_frame: timeline.current_frame(),
            legacy_lowercase_ids: project.created_with_legacy_ids,
            on_project_loaded: project.on_project_loaded.clone(),
            on_project_created: project.on_project_created.clone(),
            nodes: nodes.snapshot(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub name: String,
    /// File the project was loaded from or last saved to.
    pub path: Option<PathBuf>,
    pub frame_rate: f64,
    pub created_with_legacy_ids: bool,
    pub on_project_loaded: Option<String>,
    pub on_project_created: Option<String>,
    pub dirty: bool,
}

impl Project {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: None,
            frame_rate: default_frame_rate(),
            created_with_legacy_ids: false,
            on_project_loaded: None,
            on_project_created: None,
            dirty: false,
        }
    }

    pub fn from_document(document: &ProjectDocument, path: &Path) -> Self {
        let name = if document.name.is_empty() {
            name_from_path(path)
        } else {
            document.name.clone()
        };
        Self {
            name,
            path: Some(path.to_path_buf()),
            frame_rate: document.frame_rate,
            created_with_legacy_ids: document.uses_legacy_ids(),
            on_project_loaded: document.on_project_loaded.clone(),
            on_project_created: document.on_project_created.clone(),
            dirty: false,
        }
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new(DEFAULT_PROJECT_NAME)
    }
}

pub fn name_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string())
}
