//! Core data structures for the graph store

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier for a node. Assigned in insertion order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct NodeId(pub u64);

/// Stable identifier for an edge. Assigned in insertion order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct EdgeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Discriminates what a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    // ── Type level ──────────────────────────────────────────
    Type,
    MakeChild,
    TypeReference,
    Reference,
    MakeLink,
    Trait,

    // ── Instance level ──────────────────────────────────────
    Instance,
}

/// What kind of relationship an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    // ── Structure ───────────────────────────────────────────
    /// Parent owns child. Forms a forest on instance nodes.
    Composition,

    // ── Links (traversable by the pathfinder) ───────────────
    /// Interface to interface connection.
    Connection,
    /// Indirect relation, e.g. a pull resistor or buffer reference.
    Pointer,

    // ── Type graph bookkeeping ──────────────────────────────
    /// TypeReference to the TypeNode it currently points at.
    Resolution,
    /// TypeNode to the descriptors it owns.
    Descriptor,
    /// MakeLink to its `lhs` / `rhs` references.
    Operand,
    /// TypeNode to an attached trait.
    Trait,
    /// Derived type to the parent it was flattened from.
    Inherits,
}

impl EdgeKind {
    /// Edge kinds that describe connectivity rather than structure.
    pub fn is_link(self) -> bool {
        matches!(self, EdgeKind::Connection | EdgeKind::Pointer)
    }
}

/// A scalar attribute value carried on edges and descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(v) => write!(f, "{v}"),
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::Str(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

/// Ordered so that dumps and renders are reproducible.
pub type Attributes = BTreeMap<String, AttrValue>;

/// Shape of an edge before insertion. Also stored on `MakeLink` descriptors,
/// which materialize into exactly this edge at instantiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub kind: EdgeKind,
    pub directional: bool,
    pub name: Option<String>,
    pub attrs: Attributes,
}

impl EdgeSpec {
    /// A directional, unnamed edge of the given kind.
    pub fn new(kind: EdgeKind) -> Self {
        EdgeSpec {
            kind,
            directional: true,
            name: None,
            attrs: Attributes::new(),
        }
    }

    /// An undirected interface connection.
    pub fn connection() -> Self {
        EdgeSpec::new(EdgeKind::Connection).undirected()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn undirected(mut self) -> Self {
        self.directional = false;
        self
    }

    pub fn directional(mut self, directional: bool) -> Self {
        self.directional = directional;
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs.extend(attrs);
        self
    }
}

/// Kind-specific data attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodePayload {
    None,
    /// The edge a `MakeLink` descriptor materializes into.
    Link(EdgeSpec),
    /// The type an instance node was expanded from.
    Instance { backing: NodeId },
}

/// A single node in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Identifier, reference path or type name, depending on `kind`.
    pub label: String,
    pub payload: NodePayload,
}

/// A single edge in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    /// Undirected edges are visible from both endpoints.
    pub directional: bool,
    pub name: Option<String>,
    pub attrs: Attributes,
}

impl GraphEdge {
    /// The endpoint opposite `node`, if `node` is on this edge.
    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        if self.source == node {
            Some(self.target)
        } else if self.target == node {
            Some(self.source)
        } else {
            None
        }
    }
}
