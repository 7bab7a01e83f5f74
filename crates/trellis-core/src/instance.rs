//! Instance forest materialized from a sealed or unsealed type graph

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{GraphError, GraphResult};
use crate::graph::GraphStore;
use crate::model::*;
use crate::typegraph::{TypeGraph, TypeNode};

handle!(
    /// A concrete node in an instance tree.
    InstanceNode
);

/// Owns the instance nodes produced by one or more instantiations.
///
/// Composition edges form a forest; each tree is rooted at one
/// [`Instantiator::instantiate`] call. Link edges (connections, pointers)
/// may cross between any two instances in the same tree.
#[derive(Debug, Clone, Default)]
pub struct InstanceGraph {
    store: GraphStore,
    roots: Vec<InstanceNode>,
}

impl InstanceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn roots(&self) -> &[InstanceNode] {
        &self.roots
    }

    pub fn instance(&self, id: NodeId) -> Option<InstanceNode> {
        self.store
            .node(id)
            .filter(|n| n.kind == NodeKind::Instance)
            .map(|n| InstanceNode(n.id))
    }

    pub fn backing_type(&self, node: InstanceNode) -> Option<TypeNode> {
        match self.store.node(node.0).map(|n| &n.payload) {
            Some(NodePayload::Instance { backing }) => Some(TypeNode(*backing)),
            _ => None,
        }
    }

    pub fn identifier(&self, node: InstanceNode) -> &str {
        self.store.label(node.0)
    }

    pub fn parent(&self, node: InstanceNode) -> Option<InstanceNode> {
        self.store
            .edges_to_of_kind(node.0, EdgeKind::Composition)
            .first()
            .map(|e| InstanceNode(e.source))
    }

    /// Children in the order their fields were declared.
    pub fn children(&self, node: InstanceNode) -> Vec<(&str, InstanceNode)> {
        self.store
            .edges_from_of_kind(node.0, EdgeKind::Composition)
            .into_iter()
            .map(|e| (e.name.as_deref().unwrap_or(""), InstanceNode(e.target)))
            .collect()
    }

    pub fn child(&self, node: InstanceNode, name: &str) -> Option<InstanceNode> {
        self.children(node)
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| c)
    }

    /// Walk child names from `node`. An empty path is `node` itself.
    pub fn descendant<S: AsRef<str>>(&self, node: InstanceNode, path: &[S]) -> Option<InstanceNode> {
        path.iter()
            .try_fold(node, |current, segment| self.child(current, segment.as_ref()))
    }

    /// Identifiers from the root down to `node`.
    pub fn path(&self, node: InstanceNode) -> Vec<&str> {
        let mut segments = vec![self.identifier(node)];
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            segments.push(self.identifier(parent));
            current = parent;
        }
        segments.reverse();
        segments
    }

    /// Dotted name from the root, e.g. `App.mcu.i2c.scl`.
    pub fn full_name(&self, node: InstanceNode) -> String {
        self.path(node).join(".")
    }

    pub fn root_of(&self, node: InstanceNode) -> InstanceNode {
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// `node` and everything below it, parents before children.
    pub fn subtree(&self, node: InstanceNode) -> Vec<InstanceNode> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            out.push(current);
            let children = self.children(current);
            stack.extend(children.into_iter().rev().map(|(_, c)| c));
        }
        out
    }

    /// Link edges leaving `node` in creation order, with the far endpoint.
    pub fn links(&self, node: InstanceNode) -> Vec<(&GraphEdge, InstanceNode)> {
        self.store
            .traversable(node.0, &[EdgeKind::Connection, EdgeKind::Pointer])
            .into_iter()
            .map(|(e, other)| (e, InstanceNode(other)))
            .collect()
    }

    pub fn is_connected(&self, a: InstanceNode, b: InstanceNode) -> bool {
        self.store.has_edge_between(a.0, b.0, EdgeKind::Connection)
    }

    /// Structured dump of the tree under `node`, including link edges.
    pub fn dump(&self, node: InstanceNode, types: &TypeGraph) -> Value {
        let children: BTreeMap<String, Value> = self
            .children(node)
            .into_iter()
            .map(|(name, child)| (name.to_string(), self.dump(child, types)))
            .collect();
        let links: Vec<Value> = self
            .links(node)
            .into_iter()
            .filter(|(e, _)| e.source == node.0)
            .map(|(e, other)| {
                json!({
                    "to": self.full_name(other),
                    "kind": e.kind,
                    "name": e.name,
                    "directional": e.directional,
                })
            })
            .collect();
        json!({
            "type": self.backing_type(node).map(|t| types.type_identifier(t)),
            "children": children,
            "links": links,
        })
    }

    fn add_instance(
        &mut self,
        ty: TypeNode,
        identifier: &str,
        parent: Option<InstanceNode>,
    ) -> InstanceNode {
        let id = self.store.add_node_with_payload(
            NodeKind::Instance,
            identifier,
            NodePayload::Instance { backing: ty.0 },
        );
        if let Some(parent) = parent {
            self.store.add_edge(
                parent.0,
                id,
                EdgeSpec::new(EdgeKind::Composition).named(identifier),
            );
        }
        InstanceNode(id)
    }

    /// Insert a link between two instances.
    pub fn add_link(&mut self, lhs: InstanceNode, rhs: InstanceNode, spec: EdgeSpec) -> EdgeId {
        self.store.add_edge(lhs.0, rhs.0, spec)
    }
}

/// Expands types into instance trees.
///
/// On error the output graph may hold a partial tree that is not registered
/// as a root; callers discard it.
pub struct Instantiator<'a> {
    types: &'a TypeGraph,
}

impl<'a> Instantiator<'a> {
    pub fn new(types: &'a TypeGraph) -> Self {
        Instantiator { types }
    }

    /// Build the tree for `ty`: one node per reachable `MakeChild`, then
    /// every `MakeLink` of each type applied to the corresponding subtree.
    pub fn instantiate(&self, out: &mut InstanceGraph, ty: TypeNode) -> GraphResult<InstanceNode> {
        let identifier = self.types.type_identifier(ty).to_string();
        let mut stack = Vec::new();
        let root = self.expand(out, ty, &identifier, None, &mut stack)?;
        out.roots.push(root);
        info!(
            ty = %identifier,
            nodes = out.subtree(root).len(),
            "instantiated"
        );
        Ok(root)
    }

    fn expand(
        &self,
        out: &mut InstanceGraph,
        ty: TypeNode,
        identifier: &str,
        parent: Option<InstanceNode>,
        stack: &mut Vec<TypeNode>,
    ) -> GraphResult<InstanceNode> {
        if stack.contains(&ty) {
            let chain = stack
                .iter()
                .chain(std::iter::once(&ty))
                .map(|t| self.types.type_identifier(*t))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(GraphError::RecursiveInstantiation {
                ty: self.types.type_identifier(ty).to_string(),
                chain,
            });
        }
        stack.push(ty);

        let node = out.add_instance(ty, identifier, parent);
        for (child_identifier, make_child) in self.types.iter_make_children(ty) {
            let child_type = self
                .types
                .get_make_child_type_reference(make_child)
                .and_then(|r| self.types.get_resolved_type(r))
                .ok_or_else(|| GraphError::UnresolvedTypeReference {
                    owner: self.types.type_identifier(ty).to_string(),
                    identifier: child_identifier.to_string(),
                    name: self
                        .types
                        .get_make_child_type_reference(make_child)
                        .map(|r| self.types.type_reference_identifier(r).to_string())
                        .unwrap_or_default(),
                })?;
            self.expand(out, child_type, child_identifier, Some(node), stack)?;
        }
        self.apply_links(out, ty, node)?;

        stack.pop();
        Ok(node)
    }

    fn apply_links(&self, out: &mut InstanceGraph, ty: TypeNode, node: InstanceNode) -> GraphResult<()> {
        for link in self.types.iter_make_links(ty) {
            let (Some((lhs, rhs)), Some(spec)) =
                (self.types.make_link_operands(link), self.types.make_link_spec(link))
            else {
                continue;
            };
            let lhs_node = self.resolve(out, ty, node, &self.types.reference_path(lhs))?;
            let rhs_node = self.resolve(out, ty, node, &self.types.reference_path(rhs))?;
            let edge = out.add_link(lhs_node, rhs_node, spec.clone());
            debug!(
                %edge,
                lhs = %out.full_name(lhs_node),
                rhs = %out.full_name(rhs_node),
                "materialized link"
            );
        }
        Ok(())
    }

    fn resolve(
        &self,
        out: &InstanceGraph,
        ty: TypeNode,
        node: InstanceNode,
        path: &[String],
    ) -> GraphResult<InstanceNode> {
        out.descendant(node, path)
            .ok_or_else(|| GraphError::ReferenceNotFound {
                owner: self.types.type_identifier(ty).to_string(),
                path: path.join("."),
            })
    }
}

impl TypeGraph {
    /// Instantiate the type named `identifier` into `out`.
    pub fn instantiate(&self, out: &mut InstanceGraph, identifier: &str) -> GraphResult<InstanceNode> {
        let ty = self
            .get_type_by_name(identifier)
            .ok_or_else(|| GraphError::UnknownType(identifier.to_string()))?;
        Instantiator::new(self).instantiate(out, ty)
    }
}
