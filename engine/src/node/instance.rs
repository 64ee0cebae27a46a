//! Live node instances.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use crate::node::collection::NodeCollection;
use crate::node::params::{ParamSet, ParamValue};
use crate::node::snapshot::NodeSnapshot;
use crate::plugin::{NodePlugin, PluginDescriptor};
use crate::script::GroupMetadata;

/// Mutable part of a node. Guarded by the node's lock.
#[derive(Debug, Clone)]
pub struct NodeState {
    /// Unique inside the owning collection.
    pub script_name: String,
    pub label: String,
    pub params: ParamSet,
    /// One slot per plugin input, holding the upstream node id.
    pub inputs: Vec<Option<Uuid>>,
    pub position: Option<(f64, f64)>,
    pub multi_instance_parent: Option<String>,
}

/// A plugin instance living in exactly one [`NodeCollection`].
///
/// Shared as `Arc<Node>`; the collection holds the owning reference and render
/// work only keeps `Weak` handles.
pub struct Node {
    id: Uuid,
    plugin: Arc<dyn NodePlugin>,
    state: RwLock<NodeState>,
    /// Internal graph of group nodes.
    sub_graph: Option<NodeCollection>,
    /// Values declared by the script of a scripted group.
    script_metadata: Option<GroupMetadata>,
}

impl Node {
    pub fn new(
        plugin: Arc<dyn NodePlugin>,
        state: NodeState,
        sub_graph: Option<NodeCollection>,
        script_metadata: Option<GroupMetadata>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            plugin,
            state: RwLock::new(state),
            sub_graph,
            script_metadata,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn plugin(&self) -> &Arc<dyn NodePlugin> {
        &self.plugin
    }

    pub fn descriptor(&self) -> &Arc<PluginDescriptor> {
        self.plugin.descriptor()
    }

    pub fn plugin_id(&self) -> &str {
        &self.descriptor().id
    }

    pub fn is_writer(&self) -> bool {
        self.descriptor().is_writer
    }

    pub fn sub_graph(&self) -> Option<&NodeCollection> {
        self.sub_graph.as_ref()
    }

    pub fn script_metadata(&self) -> Option<&GroupMetadata> {
        self.script_metadata.as_ref()
    }

    pub fn state(&self) -> RwLockReadGuard<'_, NodeState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state_mut(&self) -> RwLockWriteGuard<'_, NodeState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn script_name(&self) -> String {
        self.state().script_name.clone()
    }

    pub fn label(&self) -> String {
        self.state().label.clone()
    }

    pub fn params(&self) -> ParamSet {
        self.state().params.clone()
    }

    pub fn param(&self, name: &str) -> Option<ParamValue> {
        self.state().params.get(name).cloned()
    }

    pub fn set_param(&self, name: &str, value: ParamValue) {
        self.state_mut().params.set(name, value);
    }

    pub fn inputs(&self) -> Vec<Option<Uuid>> {
        self.state().inputs.clone()
    }

    pub fn input(&self, index: usize) -> Option<Uuid> {
        self.state().inputs.get(index).copied().flatten()
    }

    /// Returns false when the plugin has no input at `index`.
    pub fn connect_input(&self, index: usize, upstream: Option<Uuid>) -> bool {
        let mut state = self.state_mut();
        match state.inputs.get_mut(index) {
            Some(slot) => {
                *slot = upstream;
                true
            }
            None => false,
        }
    }

    /// Clears every input slot that points at `upstream`.
    pub fn disconnect_from(&self, upstream: Uuid) {
        let mut state = self.state_mut();
        for slot in state.inputs.iter_mut() {
            if *slot == Some(upstream) {
                *slot = None;
            }
        }
    }

    /// Serializable record of the node. `names` maps node ids of the owning
    /// collection to script names so inputs are stored by name.
    pub fn snapshot(&self, names: &HashMap<Uuid, String>) -> NodeSnapshot {
        let state = self.state();
        let descriptor = self.descriptor();
        NodeSnapshot {
            format_version: crate::node::snapshot::SNAPSHOT_FORMAT_VERSION,
            plugin_id: descriptor.id.clone(),
            plugin_major: descriptor.major,
            plugin_minor: descriptor.minor,
            script_name: state.script_name.clone(),
            label: state.label.clone(),
            params: state.params.clone(),
            inputs: state
                .inputs
                .iter()
                .map(|slot| slot.and_then(|id| names.get(&id).cloned()))
                .collect(),
            position: state.position,
            multi_instance_parent: state.multi_instance_parent.clone(),
            script_version: self.script_metadata.as_ref().map(|m| m.version),
            children: self
                .sub_graph
                .as_ref()
                .map(NodeCollection::snapshot)
                .unwrap_or_default(),
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("plugin", &self.descriptor().id)
            .field("script_name", &state.script_name)
            .field("label", &state.label)
            .finish()
    }
}
