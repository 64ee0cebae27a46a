//! Engine settings stored as TOML in the user's config directory.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use log::{error, warn};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

pub const DEFAULT_WRITER_ID: &str = "net.engine.WriteFrames";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// In-process batch pool size; all logical cores when unset.
    pub render_workers: Option<usize>,
    /// Renderer binary used for external render processes. External rendering
    /// is disabled when unset.
    pub renderer_executable: Option<PathBuf>,
    pub autosave_dir: Option<PathBuf>,
    /// Plugin created by `create_writer`.
    pub default_writer: String,
    pub host_capabilities: Vec<String>,
    /// Script entry point run for new instances whose project names none.
    pub on_project_created: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            render_workers: None,
            renderer_executable: None,
            autosave_dir: None,
            default_writer: DEFAULT_WRITER_ID.to_string(),
            host_capabilities: Vec::new(),
            on_project_created: None,
        }
    }
}

impl EngineSettings {
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Reads an explicit settings file. Unlike `load_settings`, errors are returned.
    pub fn from_file(path: &Path) -> Result<Self> {
        let toml_str = fs::read_to_string(path)?;
        Self::from_toml_str(&toml_str)
    }

    pub fn worker_count(&self) -> usize {
        match self.render_workers {
            Some(count) => count.max(1),
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

pub fn get_config_path() -> Option<PathBuf> {
    let proj_dirs = ProjectDirs::from("net", "engine", "engine")?;
    let config_dir = proj_dirs.config_dir();
    if !config_dir.exists() {
        if let Err(e) = fs::create_dir_all(config_dir) {
            error!("Failed to create config directory: {}", e);
            return None;
        }
    }
    Some(config_dir.join("engine.toml"))
}

/// Settings from the user config file, or defaults when it is missing or broken.
pub fn load_settings() -> EngineSettings {
    if let Some(path) = get_config_path() {
        if path.exists() {
            match EngineSettings::from_file(&path) {
                Ok(settings) => return settings,
                Err(e) => warn!("Failed to load {}, using defaults: {}", path.display(), e),
            }
        }
    }
    EngineSettings::default()
}
