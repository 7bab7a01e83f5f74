//! Append-only graph store using petgraph::StableDiGraph with custom NodeId/EdgeId

use crate::model::*;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

/// Nodes and typed edges. Nothing is ever removed, so ids stay dense and
/// sorting by id recovers insertion order.
#[derive(Clone)]
pub struct GraphStore {
    inner: StableDiGraph<GraphNode, GraphEdge>,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .finish()
    }
}

impl GraphStore {
    pub fn new() -> Self {
        GraphStore {
            inner: StableDiGraph::new(),
        }
    }

    /// Add a node. Returns assigned NodeId.
    pub fn add_node(&mut self, kind: NodeKind, label: impl Into<String>) -> NodeId {
        self.add_node_with_payload(kind, label, NodePayload::None)
    }

    /// Add a node carrying kind-specific data.
    pub fn add_node_with_payload(
        &mut self,
        kind: NodeKind,
        label: impl Into<String>,
        payload: NodePayload,
    ) -> NodeId {
        let idx = self.inner.add_node(GraphNode {
            id: NodeId::default(),
            kind,
            label: label.into(),
            payload,
        });
        let id = NodeId(idx.index() as u64);
        if let Some(node) = self.inner.node_weight_mut(idx) {
            node.id = id;
        }
        id
    }

    /// Add an edge. Returns assigned EdgeId.
    ///
    /// Panics if either endpoint is not in this store; handles from another
    /// store are a caller bug, not an input error.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, spec: EdgeSpec) -> EdgeId {
        assert!(
            self.node(source).is_some() && self.node(target).is_some(),
            "edge endpoints {source} -> {target} are not part of this graph"
        );
        let idx = self.inner.add_edge(
            Self::index(source),
            Self::index(target),
            GraphEdge {
                id: EdgeId::default(),
                source,
                target,
                kind: spec.kind,
                directional: spec.directional,
                name: spec.name,
                attrs: spec.attrs,
            },
        );
        let id = EdgeId(idx.index() as u64);
        if let Some(edge) = self.inner.edge_weight_mut(idx) {
            edge.id = id;
        }
        id
    }

    /// Get a node by ID.
    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.inner.node_weight(Self::index(id))
    }

    /// Get an edge by ID.
    pub fn edge(&self, id: EdgeId) -> Option<&GraphEdge> {
        self.inner.edge_weight(EdgeIndex::new(id.0 as usize))
    }

    /// Label of a node, or `""` for a foreign id.
    pub fn label(&self, id: NodeId) -> &str {
        self.node(id).map_or("", |n| n.label.as_str())
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Iterate over all nodes in insertion order.
    pub fn all_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.inner
            .node_indices()
            .filter_map(move |idx| self.inner.node_weight(idx))
    }

    /// Iterate over all edges in insertion order.
    pub fn all_edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.inner
            .edge_indices()
            .filter_map(move |idx| self.inner.edge_weight(idx))
    }

    /// Outgoing edges of `source`, oldest first.
    pub fn edges_from(&self, source: NodeId) -> Vec<&GraphEdge> {
        self.edges_directed(source, Direction::Outgoing)
    }

    /// Incoming edges of `target`, oldest first.
    pub fn edges_to(&self, target: NodeId) -> Vec<&GraphEdge> {
        self.edges_directed(target, Direction::Incoming)
    }

    /// Outgoing edges of one kind, oldest first.
    pub fn edges_from_of_kind(&self, source: NodeId, kind: EdgeKind) -> Vec<&GraphEdge> {
        let mut edges = self.edges_from(source);
        edges.retain(|e| e.kind == kind);
        edges
    }

    /// Incoming edges of one kind, oldest first.
    pub fn edges_to_of_kind(&self, target: NodeId, kind: EdgeKind) -> Vec<&GraphEdge> {
        let mut edges = self.edges_to(target);
        edges.retain(|e| e.kind == kind);
        edges
    }

    /// Edges of the given kinds that can be followed away from `node`:
    /// every outgoing edge, plus incoming edges that are undirected.
    /// Returned oldest first, each paired with the far endpoint.
    pub fn traversable(&self, node: NodeId, kinds: &[EdgeKind]) -> Vec<(&GraphEdge, NodeId)> {
        let idx = Self::index(node);
        let mut out: Vec<(&GraphEdge, NodeId)> = self
            .inner
            .edges_directed(idx, Direction::Outgoing)
            .chain(self.inner.edges_directed(idx, Direction::Incoming))
            .filter_map(|edge_ref| self.inner.edge_weight(edge_ref.id()))
            .filter(|e| kinds.contains(&e.kind))
            .filter_map(|e| {
                if e.source == node {
                    Some((e, e.target))
                } else if !e.directional {
                    Some((e, e.source))
                } else {
                    None
                }
            })
            .collect();
        out.sort_by_key(|(e, _)| e.id);
        // A self-loop shows up in both directions.
        out.dedup_by_key(|(e, _)| e.id);
        out
    }

    /// Check if an edge of a specific kind exists between two nodes.
    /// Undirected edges match in either orientation.
    pub fn has_edge_between(&self, a: NodeId, b: NodeId, kind: EdgeKind) -> bool {
        self.traversable(a, &[kind]).iter().any(|(_, other)| *other == b)
    }

    /// Get all nodes of a specific kind, in insertion order.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = NodeId> + '_ {
        self.all_nodes().filter(move |n| n.kind == kind).map(|n| n.id)
    }

    fn edges_directed(&self, node: NodeId, direction: Direction) -> Vec<&GraphEdge> {
        let mut edges: Vec<&GraphEdge> = self
            .inner
            .edges_directed(Self::index(node), direction)
            .filter_map(|edge_ref| self.inner.edge_weight(edge_ref.id()))
            .collect();
        edges.sort_by_key(|e| e.id);
        edges
    }

    fn index(id: NodeId) -> NodeIndex {
        NodeIndex::new(id.0 as usize)
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}
