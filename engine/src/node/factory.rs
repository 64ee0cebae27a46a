//! Node construction: fresh creation, snapshot loading and scripted groups.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};

use crate::error::{EngineError, Result};
use crate::host::{HostCallbacks, NodeGuiRequest};
use crate::node::collection::NodeCollection;
use crate::node::instance::{Node, NodeState};
use crate::node::params::{
    FILENAME_PARAM, FIRST_FRAME_PARAM, LAST_FRAME_PARAM, ParamAssignment, ParamSet, ParamValue,
};
use crate::node::snapshot::NodeSnapshot;
use crate::plugin::{HostCapabilities, NodePlugin, PluginKind, PluginManager, VersionRequest};
use crate::script::{CREATE_INSTANCE_ENTRY_POINT, ScriptHost, ScriptRunner};
use crate::session::{SessionFlag, SessionState};

/// Parameters of one `create_node` call.
#[derive(Debug, Clone)]
pub struct CreationRequest {
    pub plugin_id: String,
    pub major: VersionRequest,
    pub minor: VersionRequest,
    /// Target collection; the top-level graph when `None`.
    pub collection: Option<NodeCollection>,
    pub fixed_name: Option<String>,
    pub multi_instance_parent: Option<String>,
    pub position: Option<(f64, f64)>,
    /// Applied in order after the plugin defaults.
    pub defaults: Vec<ParamAssignment>,
    pub auto_connect: bool,
    pub push_undo: bool,
    pub user_edited: bool,
    pub add_to_project: bool,
    pub create_gui: bool,
}

impl CreationRequest {
    pub fn new(plugin_id: &str) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            major: VersionRequest::Latest,
            minor: VersionRequest::Latest,
            collection: None,
            fixed_name: None,
            multi_instance_parent: None,
            position: None,
            defaults: Vec::new(),
            auto_connect: true,
            push_undo: true,
            user_edited: false,
            add_to_project: true,
            create_gui: true,
        }
    }

    pub fn with_version(
        mut self,
        major: impl Into<VersionRequest>,
        minor: impl Into<VersionRequest>,
    ) -> Self {
        self.major = major.into();
        self.minor = minor.into();
        self
    }

    pub fn in_collection(mut self, collection: &NodeCollection) -> Self {
        self.collection = Some(collection.clone());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.fixed_name = Some(name.to_string());
        self
    }

    pub fn with_multi_instance_parent(mut self, parent: &str) -> Self {
        self.multi_instance_parent = Some(parent.to_string());
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some((x, y));
        self
    }

    pub fn with_default(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.defaults.push(ParamAssignment::new(name, value));
        self
    }

    pub fn without_auto_connect(mut self) -> Self {
        self.auto_connect = false;
        self
    }

    pub fn without_undo(mut self) -> Self {
        self.push_undo = false;
        self
    }

    pub fn user_edited(mut self) -> Self {
        self.user_edited = true;
        self
    }

    /// Build the node without inserting it anywhere.
    pub fn detached(mut self) -> Self {
        self.add_to_project = false;
        self
    }

    pub fn without_gui(mut self) -> Self {
        self.create_gui = false;
        self
    }
}

/// Parameters of one `load_node` call. The snapshot is only read.
#[derive(Debug, Clone)]
pub struct LoadRequest<'a> {
    pub plugin_id: String,
    pub major: VersionRequest,
    pub minor: VersionRequest,
    pub snapshot: &'a NodeSnapshot,
    pub collection: Option<NodeCollection>,
    /// Generate a fresh name instead of the serialized one (duplication).
    pub dont_load_name: bool,
}

impl<'a> LoadRequest<'a> {
    /// Binds the plugin the snapshot was saved with: same major, that minor or newer.
    pub fn from_snapshot(snapshot: &'a NodeSnapshot) -> Self {
        Self {
            plugin_id: snapshot.plugin_id.clone(),
            major: VersionRequest::Exact(snapshot.plugin_major),
            minor: VersionRequest::Exact(snapshot.plugin_minor),
            snapshot,
            collection: None,
            dont_load_name: false,
        }
    }

    pub fn in_collection(mut self, collection: &NodeCollection) -> Self {
        self.collection = Some(collection.clone());
        self
    }

    pub fn dont_load_name(mut self, value: bool) -> Self {
        self.dont_load_name = value;
        self
    }
}

enum Origin<'a> {
    Fresh(&'a CreationRequest),
    Loaded {
        snapshot: &'a NodeSnapshot,
        dont_load_name: bool,
    },
}

impl Origin<'_> {
    fn was_loaded(&self) -> bool {
        matches!(self, Origin::Loaded { .. })
    }
}

/// Builds node instances bound to resolved plugins.
pub struct NodeFactory {
    plugins: Arc<PluginManager>,
    flags: Arc<SessionState>,
    host: Arc<dyn HostCallbacks>,
    scripts: Arc<dyn ScriptRunner>,
    root: NodeCollection,
    capabilities: HostCapabilities,
    app_id: String,
    default_writer: String,
}

impl NodeFactory {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        plugins: Arc<PluginManager>,
        flags: Arc<SessionState>,
        host: Arc<dyn HostCallbacks>,
        scripts: Arc<dyn ScriptRunner>,
        root: NodeCollection,
        capabilities: HostCapabilities,
        app_id: &str,
        default_writer: &str,
    ) -> Self {
        Self {
            plugins,
            flags,
            host,
            scripts,
            root,
            capabilities,
            app_id: app_id.to_string(),
            default_writer: default_writer.to_string(),
        }
    }

    pub fn plugins(&self) -> &Arc<PluginManager> {
        &self.plugins
    }

    pub fn root(&self) -> &NodeCollection {
        &self.root
    }

    pub fn create_node(&self, request: CreationRequest) -> Result<Arc<Node>> {
        let collection = request.collection.clone().unwrap_or_else(|| self.root.clone());
        self.construct(
            &request.plugin_id,
            request.major,
            request.minor,
            &collection,
            Origin::Fresh(&request),
        )
    }

    /// Same construction path as `create_node`, restored from the snapshot.
    /// Inputs are left empty; `load_tree` reconnects them once every node exists.
    pub fn load_node(&self, request: LoadRequest<'_>) -> Result<Arc<Node>> {
        let collection = request.collection.clone().unwrap_or_else(|| self.root.clone());
        self.construct(
            &request.plugin_id,
            request.major,
            request.minor,
            &collection,
            Origin::Loaded {
                snapshot: request.snapshot,
                dont_load_name: request.dont_load_name,
            },
        )
    }

    /// Loads a list of snapshots under the node-tree flag and restores their
    /// connections. On failure the nodes loaded so far are removed again.
    pub fn load_tree(
        &self,
        collection: &NodeCollection,
        snapshots: &[NodeSnapshot],
        dont_load_name: bool,
    ) -> Result<Vec<Arc<Node>>> {
        let _tree = self.flags.enter(SessionFlag::CreatingNodeTree);

        let mut loaded: Vec<(&NodeSnapshot, Arc<Node>)> = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            let request = LoadRequest::from_snapshot(snapshot)
                .in_collection(collection)
                .dont_load_name(dont_load_name);
            match self.load_node(request) {
                Ok(node) => loaded.push((snapshot, node)),
                Err(e) => {
                    for (_, node) in &loaded {
                        collection.remove(node.id());
                    }
                    return Err(e);
                }
            }
        }

        restore_connections(collection, &loaded);
        Ok(loaded.into_iter().map(|(_, node)| node).collect())
    }

    /// Creates the configured default writer with its output path and range set.
    pub fn create_writer(
        &self,
        filename: &str,
        collection: Option<&NodeCollection>,
        user_edited: bool,
        first_frame: Option<i32>,
        last_frame: Option<i32>,
    ) -> Result<Arc<Node>> {
        let mut request = CreationRequest::new(&self.default_writer)
            .with_default(FILENAME_PARAM, filename)
            .without_auto_connect();
        if let Some(collection) = collection {
            request = request.in_collection(collection);
        }
        if let Some(first) = first_frame {
            request = request.with_default(FIRST_FRAME_PARAM, first);
        }
        if let Some(last) = last_frame {
            request = request.with_default(LAST_FRAME_PARAM, last);
        }
        request.user_edited = user_edited;
        self.create_node(request)
    }

    fn construct(
        &self,
        plugin_id: &str,
        major: VersionRequest,
        minor: VersionRequest,
        collection: &NodeCollection,
        origin: Origin<'_>,
    ) -> Result<Arc<Node>> {
        let _creating = self.flags.enter(SessionFlag::CreatingNode);

        let plugin = self.plugins.resolve(
            plugin_id,
            major,
            minor,
            self.flags.was_created_with_legacy_ids(),
        )?;
        let descriptor = Arc::clone(plugin.descriptor());
        plugin
            .check_instantiation(&self.capabilities)
            .map_err(|reason| EngineError::construction(&descriptor.id, reason))?;

        if let Origin::Fresh(request) = &origin {
            if let Some(parent) = &request.multi_instance_parent {
                if !collection.contains_name(parent) {
                    return Err(EngineError::construction(
                        &descriptor.id,
                        format!("multi-instance parent '{}' is not in the graph", parent),
                    ));
                }
            }
        }

        let script_metadata = match &descriptor.kind {
            PluginKind::ScriptedGroup { script } => match self.scripts.group_metadata(script) {
                Ok(metadata) => Some(metadata),
                Err(e) if origin.was_loaded() => {
                    warn!("Group script of {} unreadable, using descriptor: {}", descriptor.id, e);
                    None
                }
                Err(e) => return Err(EngineError::construction(&descriptor.id, e.to_string())),
            },
            _ => None,
        };
        if let Some(metadata) = &script_metadata {
            if metadata.id != descriptor.id {
                warn!(
                    "Group script of {} declares id {}, keeping the registered id",
                    descriptor.id, metadata.id
                );
            }
            if let Origin::Loaded { snapshot, .. } = &origin {
                if let Some(saved) = snapshot.script_version.filter(|v| *v != metadata.version) {
                    warn!(
                        "{} was saved with script version {}, script is now version {}",
                        snapshot.script_name, saved, metadata.version
                    );
                }
            }
        }

        let plugin_label = script_metadata
            .as_ref()
            .map(|m| m.label.clone())
            .unwrap_or_else(|| descriptor.label.clone());

        let mut params = ParamSet::from_definitions(&plugin.parameters());
        let state = match &origin {
            Origin::Fresh(request) => {
                params.apply(&request.defaults);
                let script_name = match &request.fixed_name {
                    Some(name) if !collection.contains_name(name) => name.clone(),
                    Some(name) => collection.unique_name(name),
                    None => collection.unique_name(&plugin_label),
                };
                NodeState {
                    label: script_name.clone(),
                    script_name,
                    params,
                    inputs: vec![None; plugin.input_count()],
                    position: request.position,
                    multi_instance_parent: request.multi_instance_parent.clone(),
                }
            }
            Origin::Loaded {
                snapshot,
                dont_load_name,
            } => {
                for (name, value) in snapshot.params.iter() {
                    params.set(name, value.clone());
                }
                let keep_name = !*dont_load_name
                    && !snapshot.script_name.is_empty()
                    && !collection.contains_name(&snapshot.script_name);
                let script_name = if keep_name {
                    snapshot.script_name.clone()
                } else {
                    collection.unique_name(&plugin_label)
                };
                let label = if keep_name && !snapshot.label.is_empty() {
                    snapshot.label.clone()
                } else {
                    script_name.clone()
                };
                NodeState {
                    script_name,
                    label,
                    params,
                    inputs: vec![None; plugin.input_count()],
                    position: snapshot.position,
                    multi_instance_parent: snapshot.multi_instance_parent.clone(),
                }
            }
        };

        let sub_graph = descriptor.is_group().then(|| {
            NodeCollection::for_group(&collection.fully_specified_name(&state.script_name))
        });
        let node = Arc::new(Node::new(
            Arc::clone(&plugin),
            state,
            sub_graph,
            script_metadata,
        ));

        self.populate_group(&node, &descriptor.kind, &origin)?;

        let add_to_project = match &origin {
            Origin::Fresh(request) => request.add_to_project,
            Origin::Loaded { .. } => true,
        };
        if add_to_project {
            collection.insert(Arc::clone(&node));
        }

        if let Origin::Fresh(request) = &origin {
            if add_to_project && request.auto_connect && !self.flags.is_creating_node_tree() {
                self.auto_connect(collection, &node, plugin.as_ref());
                collection.select_only(node.id());
            }
        }

        let (gui, user_edited) = match &origin {
            Origin::Fresh(request) => (
                request.create_gui.then_some(NodeGuiRequest {
                    position: request.position,
                    push_undo: request.push_undo,
                    auto_connect: request.auto_connect,
                    user_edited: request.user_edited,
                    was_loaded: false,
                }),
                request.user_edited,
            ),
            Origin::Loaded { snapshot, .. } => (
                Some(NodeGuiRequest {
                    position: snapshot.position,
                    push_undo: false,
                    auto_connect: false,
                    user_edited: false,
                    was_loaded: true,
                }),
                false,
            ),
        };
        if let Some(gui) = gui {
            self.host.create_node_gui(&node, &gui);
        }

        debug!(
            "NodeFactory: {} {} as {} ({} v{}.{})",
            if origin.was_loaded() { "loaded" } else { "created" },
            descriptor.label,
            collection.fully_specified_name(&node.script_name()),
            descriptor.id,
            descriptor.major,
            descriptor.minor
        );
        self.host
            .on_node_created(&node, origin.was_loaded(), user_edited);
        Ok(node)
    }

    /// Fills the sub-graph of a group: from the snapshot when loading, by
    /// running the group script when a scripted group is created fresh.
    fn populate_group(
        &self,
        node: &Arc<Node>,
        kind: &PluginKind,
        origin: &Origin<'_>,
    ) -> Result<()> {
        let Some(sub_graph) = node.sub_graph() else {
            return Ok(());
        };

        match (origin, kind) {
            (Origin::Loaded { snapshot, .. }, _) => {
                if !snapshot.children.is_empty() {
                    self.load_tree(sub_graph, &snapshot.children, false)?;
                }
                Ok(())
            }
            (Origin::Fresh(_), PluginKind::ScriptedGroup { script }) => {
                let _scripted = self.flags.enter(SessionFlag::CreatingScriptedGroup);
                let group_name = sub_graph.owner().unwrap_or_default().to_string();
                let args = [
                    script.display().to_string(),
                    self.app_id.clone(),
                    group_name,
                ];
                let mut builder = GroupBuilder {
                    factory: self,
                    collection: sub_graph.clone(),
                };
                let outcome = self
                    .scripts
                    .call(CREATE_INSTANCE_ENTRY_POINT, &args, Some(&mut builder));
                if let Err(e) = outcome {
                    sub_graph.clear();
                    return Err(EngineError::construction(node.plugin_id(), e.to_string()));
                }
                Ok(())
            }
            (Origin::Fresh(_), _) => Ok(()),
        }
    }

    /// Connects input 0 to the first selected node that has an output.
    fn auto_connect(&self, collection: &NodeCollection, node: &Arc<Node>, plugin: &dyn NodePlugin) {
        if plugin.input_count() == 0 {
            return;
        }
        let upstream = collection
            .selection()
            .into_iter()
            .find(|candidate| candidate.id() != node.id() && candidate.plugin().has_output());
        if let Some(upstream) = upstream {
            node.connect_input(0, Some(upstream.id()));
            debug!(
                "NodeFactory: auto-connected {} -> {}",
                upstream.script_name(),
                node.script_name()
            );
        }
    }
}

/// Reconnects freshly loaded nodes using the upstream names recorded in their
/// snapshots. Names are looked up among the loaded nodes first (they may have
/// been renamed), then in the collection.
pub fn restore_connections(collection: &NodeCollection, loaded: &[(&NodeSnapshot, Arc<Node>)]) {
    let by_saved_name: HashMap<&str, &Arc<Node>> = loaded
        .iter()
        .map(|(snapshot, node)| (snapshot.script_name.as_str(), node))
        .collect();

    for (snapshot, node) in loaded {
        for (index, upstream) in snapshot.inputs.iter().enumerate() {
            let Some(upstream) = upstream else { continue };
            let target = by_saved_name
                .get(upstream.as_str())
                .map(|n| n.id())
                .or_else(|| collection.find_by_name(upstream).map(|n| n.id()));
            match target {
                Some(id) => {
                    if !node.connect_input(index, Some(id)) {
                        warn!(
                            "{}: input {} no longer exists, dropping link from {}",
                            node.script_name(),
                            index,
                            upstream
                        );
                    }
                }
                None => warn!(
                    "{}: upstream node {} not found, input {} left empty",
                    node.script_name(),
                    upstream,
                    index
                ),
            }
        }

        if let Some(parent) = &snapshot.multi_instance_parent {
            if let Some(renamed) = by_saved_name.get(parent.as_str()) {
                node.state_mut().multi_instance_parent = Some(renamed.script_name());
            }
        }
    }
}

/// `ScriptHost` handed to a group script: builds nodes inside the group.
struct GroupBuilder<'a> {
    factory: &'a NodeFactory,
    collection: NodeCollection,
}

impl GroupBuilder<'_> {
    fn node(&self, name: &str) -> std::result::Result<Arc<Node>, String> {
        self.collection
            .find_by_name(name)
            .ok_or_else(|| format!("no node named '{}' in the group", name))
    }
}

impl ScriptHost for GroupBuilder<'_> {
    fn create_node(
        &mut self,
        plugin_id: &str,
        name: Option<&str>,
    ) -> std::result::Result<String, String> {
        let mut request = CreationRequest::new(plugin_id)
            .in_collection(&self.collection)
            .without_auto_connect()
            .without_undo();
        if let Some(name) = name {
            request = request.with_name(name);
        }
        self.factory
            .create_node(request)
            .map(|node| node.script_name())
            .map_err(|e| e.to_string())
    }

    fn connect(
        &mut self,
        upstream: &str,
        downstream: &str,
        input: usize,
    ) -> std::result::Result<(), String> {
        let upstream = self.node(upstream)?;
        let downstream = self.node(downstream)?;
        if downstream.connect_input(input, Some(upstream.id())) {
            Ok(())
        } else {
            Err(format!(
                "'{}' has no input {}",
                downstream.script_name(),
                input
            ))
        }
    }

    fn set_param(
        &mut self,
        node: &str,
        param: &str,
        value: ParamValue,
    ) -> std::result::Result<(), String> {
        self.node(node)?.set_param(param, value);
        Ok(())
    }
}
