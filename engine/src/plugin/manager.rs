//! Plugin manager for registering and resolving plugins.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::debug;

use crate::error::{EngineError, Result};
use crate::plugin::repository::{LookupMiss, PluginRepository};
use crate::plugin::traits::{NodePlugin, ScriptedGroupPlugin};
use crate::plugin::{PluginDescriptor, VersionRequest};

/// Main plugin manager. Shared between the factory and the render processes.
pub struct PluginManager {
    inner: RwLock<PluginRepository>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(PluginRepository::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, PluginRepository> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, PluginRepository> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, plugin: Arc<dyn NodePlugin>) {
        debug!(
            "PluginManager: registering {} v{}.{}",
            plugin.descriptor().id,
            plugin.descriptor().major,
            plugin.descriptor().minor
        );
        self.write().register(plugin);
    }

    /// Register a group whose content is produced by a script.
    pub fn register_scripted_group(&self, descriptor: PluginDescriptor) {
        self.register(Arc::new(ScriptedGroupPlugin::new(descriptor)));
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.read().contains(id)
    }

    pub fn plugin_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().ids().cloned().collect();
        ids.sort();
        ids
    }

    pub fn versions_of(&self, id: &str) -> Vec<(u32, u32)> {
        self.read().versions(id)
    }

    /// Resolve an identifier and version request to an installed plugin.
    ///
    /// With `legacy_ids` set, an unknown identifier is retried once against the
    /// lower-cased ids of the installed plugins.
    pub fn resolve(
        &self,
        id: &str,
        major: VersionRequest,
        minor: VersionRequest,
        legacy_ids: bool,
    ) -> Result<Arc<dyn NodePlugin>> {
        let repo = self.read();
        let miss = match repo.lookup(id, major, minor) {
            Ok(plugin) => return Ok(plugin),
            Err(miss) => miss,
        };

        if miss == LookupMiss::UnknownId && legacy_ids {
            if let Some(canonical) = repo.canonical_lowercase_id(id) {
                debug!("PluginManager: legacy id '{}' retried as '{}'", id, canonical);
                return repo
                    .lookup(canonical, major, minor)
                    .map_err(|miss| Self::miss_error(canonical, major, minor, miss));
            }
        }

        Err(Self::miss_error(id, major, minor, miss))
    }

    pub fn resolve_descriptor(
        &self,
        id: &str,
        major: VersionRequest,
        minor: VersionRequest,
        legacy_ids: bool,
    ) -> Result<Arc<PluginDescriptor>> {
        self.resolve(id, major, minor, legacy_ids)
            .map(|p| Arc::clone(p.descriptor()))
    }

    fn miss_error(
        id: &str,
        major: VersionRequest,
        minor: VersionRequest,
        miss: LookupMiss,
    ) -> EngineError {
        match miss {
            LookupMiss::UnknownId => EngineError::PluginNotFound { id: id.to_string() },
            LookupMiss::NoMatchingVersion => EngineError::VersionNotFound {
                id: id.to_string(),
                major,
                minor,
            },
        }
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}
