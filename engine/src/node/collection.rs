//! Ordered node containers (top-level graph and group sub-graphs).

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use crate::node::instance::Node;
use crate::node::snapshot::NodeSnapshot;

#[derive(Default)]
struct CollectionContent {
    nodes: Vec<Arc<Node>>,
    selection: Vec<Uuid>,
}

struct CollectionShared {
    /// Fully specified name of the owning group, `None` for the top level.
    owner: Option<String>,
    content: RwLock<CollectionContent>,
}

/// Shared handle to a node container. Cloning the handle shares the content.
#[derive(Clone)]
pub struct NodeCollection {
    shared: Arc<CollectionShared>,
}

impl NodeCollection {
    pub fn new() -> Self {
        Self::with_owner(None)
    }

    /// Sub-graph of the group with the given fully specified name.
    pub fn for_group(owner: &str) -> Self {
        Self::with_owner(Some(owner.to_string()))
    }

    fn with_owner(owner: Option<String>) -> Self {
        Self {
            shared: Arc::new(CollectionShared {
                owner,
                content: RwLock::new(CollectionContent::default()),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CollectionContent> {
        self.shared.content.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CollectionContent> {
        self.shared.content.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn ptr_eq(&self, other: &NodeCollection) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn owner(&self) -> Option<&str> {
        self.shared.owner.as_deref()
    }

    pub fn fully_specified_name(&self, script_name: &str) -> String {
        match self.owner() {
            Some(owner) => format!("{}.{}", owner, script_name),
            None => script_name.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().nodes.is_empty()
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.read().nodes.clone()
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Node>> {
        self.read().nodes.iter().find(|n| n.id() == id).cloned()
    }

    pub fn find_by_name(&self, script_name: &str) -> Option<Arc<Node>> {
        self.read()
            .nodes
            .iter()
            .find(|n| n.state().script_name == script_name)
            .cloned()
    }

    pub fn contains_name(&self, script_name: &str) -> bool {
        self.find_by_name(script_name).is_some()
    }

    /// Looks up `Group1.Inner.Blur1` by walking group sub-graphs.
    pub fn find_by_fully_specified_name(&self, name: &str) -> Option<Arc<Node>> {
        let mut parts = name.split('.');
        let mut current = self.find_by_name(parts.next()?)?;
        for part in parts {
            let next = current.sub_graph()?.find_by_name(part)?;
            current = next;
        }
        Some(current)
    }

    /// Writer nodes at this level, in order.
    pub fn writers(&self) -> Vec<Arc<Node>> {
        self.read()
            .nodes
            .iter()
            .filter(|n| n.is_writer())
            .cloned()
            .collect()
    }

    /// First free name of the form `<base><n>`, n starting at 1.
    pub fn unique_name(&self, base: &str) -> String {
        let base = sanitize_name(base);
        let content = self.read();
        let taken = |candidate: &str| {
            content
                .nodes
                .iter()
                .any(|n| n.state().script_name == candidate)
        };
        let mut index = 1usize;
        loop {
            let candidate = format!("{}{}", base, index);
            if !taken(&candidate) {
                return candidate;
            }
            index += 1;
        }
    }

    pub fn insert(&self, node: Arc<Node>) {
        self.write().nodes.push(node);
    }

    /// Detaches the node: drops it from the selection, disconnects every node
    /// that reads from it and empties its own sub-graph.
    pub fn remove(&self, id: Uuid) -> Option<Arc<Node>> {
        let (removed, remaining) = {
            let mut content = self.write();
            let index = content.nodes.iter().position(|n| n.id() == id)?;
            let removed = content.nodes.remove(index);
            content.selection.retain(|s| *s != id);
            (removed, content.nodes.clone())
        };

        for node in &remaining {
            node.disconnect_from(id);
        }
        if let Some(sub_graph) = removed.sub_graph() {
            sub_graph.clear();
        }
        Some(removed)
    }

    /// Removes every node, returning them in order.
    pub fn clear(&self) -> Vec<Arc<Node>> {
        let removed = {
            let mut content = self.write();
            content.selection.clear();
            std::mem::take(&mut content.nodes)
        };
        for node in &removed {
            if let Some(sub_graph) = node.sub_graph() {
                sub_graph.clear();
            }
        }
        removed
    }

    /// Moves the content of `staged` into this collection in one step.
    /// Readers see either the old graph or the new one, never a mix.
    pub fn replace_contents(&self, staged: &NodeCollection) -> Vec<Arc<Node>> {
        let incoming = std::mem::take(&mut *staged.write());
        let previous = std::mem::replace(&mut *self.write(), incoming);
        previous.nodes
    }

    pub fn select_only(&self, id: Uuid) {
        let mut content = self.write();
        content.selection.clear();
        if content.nodes.iter().any(|n| n.id() == id) {
            content.selection.push(id);
        }
    }

    /// Selected nodes in selection order.
    pub fn selection(&self) -> Vec<Arc<Node>> {
        let content = self.read();
        content
            .selection
            .iter()
            .filter_map(|id| content.nodes.iter().find(|n| n.id() == *id).cloned())
            .collect()
    }

    /// Id to script name for every node at this level.
    pub fn name_index(&self) -> HashMap<Uuid, String> {
        self.read()
            .nodes
            .iter()
            .map(|n| (n.id(), n.script_name()))
            .collect()
    }

    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        let names = self.name_index();
        self.nodes().iter().map(|n| n.snapshot(&names)).collect()
    }
}

impl Default for NodeCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NodeCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCollection")
            .field("owner", &self.shared.owner)
            .field("len", &self.len())
            .finish()
    }
}

/// Keeps ASCII alphanumerics and underscores; script names must be identifiers.
pub fn sanitize_name(label: &str) -> String {
    let mut name: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        name.push_str("Node");
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}
