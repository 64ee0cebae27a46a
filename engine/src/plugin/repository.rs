//! Versioned plugin repository.

use std::collections::HashMap;
use std::sync::Arc;

use log::warn;

use crate::plugin::VersionRequest;
use crate::plugin::traits::NodePlugin;

/// Outcome of a lookup that did not produce a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMiss {
    UnknownId,
    NoMatchingVersion,
}

/// All installed versions of every plugin, keyed by identifier.
pub struct PluginRepository {
    /// Versions sorted ascending by (major, minor).
    plugins: HashMap<String, Vec<Arc<dyn NodePlugin>>>,
    /// Lower-cased id -> registered id, for projects saved with lower-case ids.
    lowercase_ids: HashMap<String, String>,
}

impl PluginRepository {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
            lowercase_ids: HashMap::new(),
        }
    }

    pub fn register(&mut self, plugin: Arc<dyn NodePlugin>) {
        let descriptor = Arc::clone(plugin.descriptor());
        let versions = self.plugins.entry(descriptor.id.clone()).or_default();
        if let Some(pos) = versions
            .iter()
            .position(|p| p.descriptor().version() == descriptor.version())
        {
            warn!(
                "Plugin {} v{}.{} registered twice, replacing the earlier entry",
                descriptor.id, descriptor.major, descriptor.minor
            );
            versions[pos] = plugin;
        } else {
            versions.push(plugin);
            versions.sort_by_key(|p| p.descriptor().version());
        }
        self.lowercase_ids
            .insert(descriptor.id.to_lowercase(), descriptor.id.clone());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.plugins.keys()
    }

    pub fn versions(&self, id: &str) -> Vec<(u32, u32)> {
        self.plugins
            .get(id)
            .map(|v| v.iter().map(|p| p.descriptor().version()).collect())
            .unwrap_or_default()
    }

    /// Registered id whose lower-cased form equals `id` lower-cased.
    pub fn canonical_lowercase_id(&self, id: &str) -> Option<&str> {
        self.lowercase_ids
            .get(&id.to_lowercase())
            .map(String::as_str)
    }

    pub fn lookup(
        &self,
        id: &str,
        major: VersionRequest,
        minor: VersionRequest,
    ) -> Result<Arc<dyn NodePlugin>, LookupMiss> {
        let versions = self.plugins.get(id).ok_or(LookupMiss::UnknownId)?;
        let installed: Vec<(u32, u32)> =
            versions.iter().map(|p| p.descriptor().version()).collect();
        let index = select_version(&installed, major, minor).ok_or(LookupMiss::NoMatchingVersion)?;
        Ok(Arc::clone(&versions[index]))
    }
}

impl Default for PluginRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Picks an index into `installed` (sorted ascending) for the request.
///
/// Major: latest picks the highest installed major, an exact major must match.
/// Minor: latest picks the highest minor of that major, an exact minor picks the
/// smallest installed minor that is not lower than the requested one.
pub fn select_version(
    installed: &[(u32, u32)],
    major: VersionRequest,
    minor: VersionRequest,
) -> Option<usize> {
    let chosen_major = match major {
        VersionRequest::Latest => installed.iter().map(|(maj, _)| *maj).max()?,
        VersionRequest::Exact(m) => m,
    };

    let candidates = installed
        .iter()
        .enumerate()
        .filter(|(_, (maj, _))| *maj == chosen_major);

    match minor {
        VersionRequest::Latest => candidates.max_by_key(|(_, (_, min))| *min).map(|(i, _)| i),
        VersionRequest::Exact(requested) => candidates
            .filter(|(_, (_, min))| *min >= requested)
            .min_by_key(|(_, (_, min))| *min)
            .map(|(i, _)| i),
    }
}
