//! Type-level skeletons: types, child/link descriptors and deferred references
//!
//! Every descriptor is a node in the underlying [`GraphStore`]:
//!
//! - a `Type` node owns its `MakeChild`, `Reference`, `MakeLink` and
//!   `TypeReference` nodes through `Descriptor` edges;
//! - a `MakeChild` points at the `TypeReference` naming its child type;
//! - a `TypeReference` is linked to its target through `Resolution` edges.
//!   Retyping appends a newer resolution and the newest one wins, so nothing
//!   already inserted is ever rewritten.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::GraphStore;
use crate::model::*;
use crate::traits::TraitCatalog;

handle!(
    /// A declared module, component or interface type.
    TypeNode
);
handle!(
    /// "Instantiating the owner creates a child under this identifier."
    MakeChild
);
handle!(
    /// A type name that is linked to a [`TypeNode`] after parsing.
    TypeReference
);
handle!(
    /// A dotted path inside a type, resolved against instances.
    Reference
);
handle!(
    /// "Connect these two references when the owner is instantiated."
    MakeLink
);

/// A type reference still waiting for the linker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedTypeReference {
    pub reference: TypeReference,
    pub owner: Option<TypeNode>,
    /// Field identifier for child references, otherwise the referenced name.
    pub identifier: String,
    pub name: String,
}

/// The type-level graph.
#[derive(Debug, Clone)]
pub struct TypeGraph {
    store: GraphStore,
    catalog: TraitCatalog,
    by_name: HashMap<String, TypeNode>,
    builtins: HashMap<String, TypeNode>,
    sealed: bool,
}

impl TypeGraph {
    pub fn new(catalog: TraitCatalog) -> Self {
        TypeGraph {
            store: GraphStore::new(),
            catalog,
            by_name: HashMap::new(),
            builtins: HashMap::new(),
            sealed: false,
        }
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn catalog(&self) -> &TraitCatalog {
        &self.catalog
    }

    /// Finalize the graph. Any later mutation, including a second `seal`,
    /// is a protocol violation and panics.
    pub fn seal(&mut self) {
        assert!(
            !self.sealed,
            "TypeGraph has already been built; rebuilding is not supported"
        );
        self.sealed = true;
        debug!(
            nodes = self.store.node_count(),
            edges = self.store.edge_count(),
            "type graph sealed"
        );
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    fn ensure_mutable(&self, operation: &str) {
        assert!(
            !self.sealed,
            "TypeGraph has already been built; cannot {operation}"
        );
    }

    // ── Types ───────────────────────────────────────────────

    /// Declare a type. Name lookup returns the first type declared under a
    /// given identifier; later ones are still reachable through their handle.
    pub fn add_type(&mut self, identifier: &str) -> TypeNode {
        self.ensure_mutable("add a type");
        let node = TypeNode(self.store.add_node(NodeKind::Type, identifier));
        self.by_name.entry(identifier.to_string()).or_insert(node);
        debug!(ty = identifier, "declared type");
        node
    }

    pub fn get_type_by_name(&self, identifier: &str) -> Option<TypeNode> {
        self.by_name.get(identifier).copied()
    }

    /// Recover a handle from a raw id, checking that it names a type.
    pub fn type_node(&self, id: NodeId) -> Option<TypeNode> {
        self.store
            .node(id)
            .filter(|n| n.kind == NodeKind::Type)
            .map(|n| TypeNode(n.id))
    }

    /// All types in declaration order.
    pub fn types(&self) -> Vec<TypeNode> {
        self.store.nodes_of_kind(NodeKind::Type).map(TypeNode).collect()
    }

    pub fn type_identifier(&self, ty: TypeNode) -> &str {
        self.store.label(ty.0)
    }

    /// A built-in type already materialized into this graph.
    pub fn builtin(&self, name: &str) -> Option<TypeNode> {
        self.builtins.get(name).copied()
    }

    /// Remember the materialization of a built-in so later lookups share it.
    pub fn register_builtin(&mut self, name: &str, ty: TypeNode) {
        self.ensure_mutable("register a built-in type");
        self.builtins.insert(name.to_string(), ty);
    }

    // ── Type references ─────────────────────────────────────

    /// A reference to a type by name, owned by `owner`, not yet linked.
    pub fn add_type_reference(&mut self, owner: TypeNode, name: &str) -> TypeReference {
        self.ensure_mutable("add a type reference");
        let id = self.store.add_node(NodeKind::TypeReference, name);
        self.store.add_edge(
            owner.0,
            id,
            EdgeSpec::new(EdgeKind::Descriptor).named("type_ref"),
        );
        TypeReference(id)
    }

    pub fn link_type_reference(&mut self, reference: TypeReference, target: TypeNode) {
        self.ensure_mutable("link a type reference");
        self.store
            .add_edge(reference.0, target.0, EdgeSpec::new(EdgeKind::Resolution));
    }

    /// Point an already linked reference somewhere else.
    pub fn update_type_reference(&mut self, reference: TypeReference, target: TypeNode) {
        self.ensure_mutable("retype a type reference");
        debug!(
            reference = self.type_reference_identifier(reference),
            target = self.type_identifier(target),
            "retyped reference"
        );
        self.store.add_edge(
            reference.0,
            target.0,
            EdgeSpec::new(EdgeKind::Resolution).named("retype"),
        );
    }

    /// Current target of a reference: the most recent resolution.
    pub fn get_resolved_type(&self, reference: TypeReference) -> Option<TypeNode> {
        self.store
            .edges_from_of_kind(reference.0, EdgeKind::Resolution)
            .last()
            .map(|e| TypeNode(e.target))
    }

    pub fn type_reference_identifier(&self, reference: TypeReference) -> &str {
        self.store.label(reference.0)
    }

    /// Type that owns a reference.
    pub fn type_reference_owner(&self, reference: TypeReference) -> Option<TypeNode> {
        self.store
            .edges_to_of_kind(reference.0, EdgeKind::Descriptor)
            .into_iter()
            .find_map(|e| self.type_node(e.source))
    }

    fn type_reference_field(&self, reference: TypeReference) -> Option<&str> {
        self.store
            .edges_to_of_kind(reference.0, EdgeKind::Descriptor)
            .into_iter()
            .find(|e| {
                self.store
                    .node(e.source)
                    .is_some_and(|n| n.kind == NodeKind::MakeChild)
            })
            .map(|e| self.store.label(e.source))
    }

    /// Every type reference without a resolution, in creation order.
    pub fn collect_unresolved_type_references(&self) -> Vec<UnresolvedTypeReference> {
        self.store
            .nodes_of_kind(NodeKind::TypeReference)
            .map(TypeReference)
            .filter(|r| self.get_resolved_type(*r).is_none())
            .map(|r| {
                let name = self.type_reference_identifier(r).to_string();
                UnresolvedTypeReference {
                    reference: r,
                    owner: self.type_reference_owner(r),
                    identifier: self
                        .type_reference_field(r)
                        .map_or_else(|| name.clone(), str::to_string),
                    name,
                }
            })
            .collect()
    }

    // ── Children ────────────────────────────────────────────

    /// Declare a child whose type is already known.
    pub fn add_make_child(
        &mut self,
        owner: TypeNode,
        child_type: TypeNode,
        identifier: &str,
    ) -> MakeChild {
        let type_name = self.type_identifier(child_type).to_string();
        let (make_child, reference) = self.add_unresolved_make_child(owner, identifier, &type_name);
        self.link_type_reference(reference, child_type);
        make_child
    }

    /// Declare a child whose type is only known by name until linking.
    pub fn add_unresolved_make_child(
        &mut self,
        owner: TypeNode,
        identifier: &str,
        type_name: &str,
    ) -> (MakeChild, TypeReference) {
        self.ensure_mutable("add a child");
        let make_child = self.store.add_node(NodeKind::MakeChild, identifier);
        self.store.add_edge(
            owner.0,
            make_child,
            EdgeSpec::new(EdgeKind::Descriptor).named("make_child"),
        );
        let reference = self.add_type_reference(owner, type_name);
        self.store.add_edge(
            make_child,
            reference.0,
            EdgeSpec::new(EdgeKind::Descriptor).named("type"),
        );
        (MakeChild(make_child), reference)
    }

    /// Children of a type in declaration order.
    pub fn iter_make_children(&self, ty: TypeNode) -> Vec<(&str, MakeChild)> {
        self.owned(ty, NodeKind::MakeChild)
            .map(|id| (self.store.label(id), MakeChild(id)))
            .collect()
    }

    pub fn make_child_identifier(&self, make_child: MakeChild) -> &str {
        self.store.label(make_child.0)
    }

    pub fn get_make_child_type_reference(&self, make_child: MakeChild) -> Option<TypeReference> {
        self.store
            .edges_from_of_kind(make_child.0, EdgeKind::Descriptor)
            .first()
            .map(|e| TypeReference(e.target))
    }

    pub fn get_make_child_by_identifier(&self, ty: TypeNode, identifier: &str) -> Option<MakeChild> {
        self.iter_make_children(ty)
            .into_iter()
            .find(|(id, _)| *id == identifier)
            .map(|(_, mc)| mc)
    }

    pub fn get_make_child_type_reference_by_identifier(
        &self,
        ty: TypeNode,
        identifier: &str,
    ) -> Option<TypeReference> {
        self.get_make_child_by_identifier(ty, identifier)
            .and_then(|mc| self.get_make_child_type_reference(mc))
    }

    /// Follow child identifiers through resolved types. An empty path is
    /// `start` itself.
    pub fn resolve_child_path<S: AsRef<str>>(&self, start: TypeNode, path: &[S]) -> Option<TypeNode> {
        path.iter().try_fold(start, |current, segment| {
            self.get_make_child_type_reference_by_identifier(current, segment.as_ref())
                .and_then(|r| self.get_resolved_type(r))
        })
    }

    // ── References and links ────────────────────────────────

    pub fn add_reference<S: AsRef<str>>(&mut self, owner: TypeNode, path: &[S]) -> Reference {
        self.ensure_mutable("add a reference");
        let label = path.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(".");
        let id = self.store.add_node(NodeKind::Reference, label);
        self.store.add_edge(
            owner.0,
            id,
            EdgeSpec::new(EdgeKind::Descriptor).named("reference"),
        );
        Reference(id)
    }

    pub fn reference_path(&self, reference: Reference) -> Vec<String> {
        let label = self.store.label(reference.0);
        if label.is_empty() {
            Vec::new()
        } else {
            label.split('.').map(str::to_string).collect()
        }
    }

    pub fn add_make_link(
        &mut self,
        owner: TypeNode,
        lhs: Reference,
        rhs: Reference,
        spec: EdgeSpec,
    ) -> MakeLink {
        self.ensure_mutable("add a link");
        let label = spec.name.clone().unwrap_or_default();
        let id = self
            .store
            .add_node_with_payload(NodeKind::MakeLink, label, NodePayload::Link(spec));
        self.store.add_edge(
            owner.0,
            id,
            EdgeSpec::new(EdgeKind::Descriptor).named("make_link"),
        );
        self.store
            .add_edge(id, lhs.0, EdgeSpec::new(EdgeKind::Operand).named("lhs"));
        self.store
            .add_edge(id, rhs.0, EdgeSpec::new(EdgeKind::Operand).named("rhs"));
        MakeLink(id)
    }

    /// Links of a type in declaration order.
    pub fn iter_make_links(&self, ty: TypeNode) -> Vec<MakeLink> {
        self.owned(ty, NodeKind::MakeLink).map(MakeLink).collect()
    }

    pub fn make_link_operands(&self, link: MakeLink) -> Option<(Reference, Reference)> {
        let operands = self.store.edges_from_of_kind(link.0, EdgeKind::Operand);
        let find = |side: &str| {
            operands
                .iter()
                .find(|e| e.name.as_deref() == Some(side))
                .map(|e| Reference(e.target))
        };
        Some((find("lhs")?, find("rhs")?))
    }

    pub fn make_link_spec(&self, link: MakeLink) -> Option<&EdgeSpec> {
        match self.store.node(link.0).map(|n| &n.payload) {
            Some(NodePayload::Link(spec)) => Some(spec),
            _ => None,
        }
    }

    fn link_paths(&self, link: MakeLink) -> Option<(Vec<String>, Vec<String>)> {
        let (lhs, rhs) = self.make_link_operands(link)?;
        Some((self.reference_path(lhs), self.reference_path(rhs)))
    }

    // ── Traits ──────────────────────────────────────────────

    pub fn add_trait(&mut self, ty: TypeNode, name: &str) {
        self.ensure_mutable("attach a trait");
        let id = self.store.add_node(NodeKind::Trait, name);
        self.store.add_edge(ty.0, id, EdgeSpec::new(EdgeKind::Trait));
    }

    /// Names of attached traits in attachment order.
    pub fn traits(&self, ty: TypeNode) -> Vec<String> {
        self.store
            .edges_from_of_kind(ty.0, EdgeKind::Trait)
            .into_iter()
            .map(|e| self.store.label(e.target).to_string())
            .collect()
    }

    /// The most specific attached trait satisfying `wanted`.
    pub fn get_trait(&self, ty: TypeNode, wanted: &str) -> Option<String> {
        let attached = self.traits(ty);
        self.catalog
            .most_specific(&attached, wanted)
            .map(str::to_string)
    }

    pub fn has_trait(&self, ty: TypeNode, wanted: &str) -> bool {
        self.get_trait(ty, wanted).is_some()
    }

    // ── Inheritance ─────────────────────────────────────────

    pub fn set_parent_type(&mut self, derived: TypeNode, parent: TypeNode) {
        self.ensure_mutable("set a parent type");
        self.store
            .add_edge(derived.0, parent.0, EdgeSpec::new(EdgeKind::Inherits));
    }

    pub fn parent_type(&self, ty: TypeNode) -> Option<TypeNode> {
        self.store
            .edges_from_of_kind(ty.0, EdgeKind::Inherits)
            .last()
            .map(|e| TypeNode(e.target))
    }

    /// `ty` and its ancestors, base type first.
    pub fn type_lineage(&self, ty: TypeNode) -> Vec<TypeNode> {
        let mut chain = vec![ty];
        let mut current = ty;
        while let Some(parent) = self.parent_type(current) {
            if chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }

    /// Copy `source`'s child and link descriptors onto `target`.
    ///
    /// Children whose identifier `target` already declares, or which appear
    /// in `skip_identifiers`, are left alone so the derived definition wins.
    /// Links already present on `target` with the same endpoints, kind and
    /// direction are not duplicated. Traits are copied unless `target` already carries one from
    /// the same family. Returns the number of descriptors copied.
    pub fn copy_type_structure(
        &mut self,
        target: TypeNode,
        source: TypeNode,
        skip_identifiers: &[String],
    ) -> usize {
        self.ensure_mutable("copy type structure");

        let mut taken: HashSet<String> = self
            .iter_make_children(target)
            .into_iter()
            .map(|(id, _)| id.to_string())
            .collect();
        taken.extend(skip_identifiers.iter().cloned());

        let children: Vec<(String, String, Option<TypeNode>)> = self
            .iter_make_children(source)
            .into_iter()
            .filter_map(|(identifier, mc)| {
                let reference = self.get_make_child_type_reference(mc)?;
                Some((
                    identifier.to_string(),
                    self.type_reference_identifier(reference).to_string(),
                    self.get_resolved_type(reference),
                ))
            })
            .collect();

        let mut copied = 0;
        for (identifier, type_name, resolved) in children {
            if !taken.insert(identifier.clone()) {
                debug!(field = %identifier, "kept derived definition");
                continue;
            }
            let (_, reference) = self.add_unresolved_make_child(target, &identifier, &type_name);
            if let Some(resolved) = resolved {
                self.link_type_reference(reference, resolved);
            }
            copied += 1;
        }

        let existing: HashSet<(Vec<String>, Vec<String>, EdgeKind, bool)> = self
            .iter_make_links(target)
            .into_iter()
            .filter_map(|l| {
                let (lhs, rhs) = self.link_paths(l)?;
                let spec = self.make_link_spec(l)?;
                Some((lhs, rhs, spec.kind, spec.directional))
            })
            .collect();
        let links: Vec<(Vec<String>, Vec<String>, EdgeSpec)> = self
            .iter_make_links(source)
            .into_iter()
            .filter_map(|l| {
                let (lhs, rhs) = self.link_paths(l)?;
                Some((lhs, rhs, self.make_link_spec(l)?.clone()))
            })
            .collect();
        for (lhs, rhs, spec) in links {
            if existing.contains(&(lhs.clone(), rhs.clone(), spec.kind, spec.directional)) {
                continue;
            }
            let lhs_ref = self.add_reference(target, &lhs);
            let rhs_ref = self.add_reference(target, &rhs);
            self.add_make_link(target, lhs_ref, rhs_ref, spec);
            copied += 1;
        }

        let families: HashSet<String> = self
            .traits(target)
            .iter()
            .filter_map(|t| self.catalog.lineage(t).last().cloned())
            .collect();
        for name in self.traits(source) {
            let family = self.catalog.lineage(&name).last().cloned();
            if family.is_some_and(|f| families.contains(&f)) {
                continue;
            }
            self.add_trait(target, &name);
        }

        debug!(
            target = self.type_identifier(target),
            source = self.type_identifier(source),
            copied,
            "copied type structure"
        );
        copied
    }

    // ── Diagnostics ─────────────────────────────────────────

    /// Indented one-level dump of a type, stable across runs.
    pub fn render_type(&self, ty: TypeNode) -> String {
        let mut out = String::from(self.type_identifier(ty));
        if let Some(parent) = self.parent_type(ty) {
            out.push_str(&format!(" (extends {})", self.type_identifier(parent)));
        }
        for (identifier, mc) in self.iter_make_children(ty) {
            let target = self.get_make_child_type_reference(mc).map(|r| {
                match self.get_resolved_type(r) {
                    Some(t) => self.type_identifier(t).to_string(),
                    None => format!("<unresolved {}>", self.type_reference_identifier(r)),
                }
            });
            out.push_str(&format!(
                "\n  {identifier}: {}",
                target.unwrap_or_else(|| "<missing>".to_string())
            ));
        }
        for link in self.iter_make_links(ty) {
            let (Some((lhs, rhs)), Some(spec)) = (self.link_paths(link), self.make_link_spec(link))
            else {
                continue;
            };
            let arrow = if spec.directional { "->" } else { "~" };
            let kind = serde_json::to_value(spec.kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            out.push_str(&format!(
                "\n  link {} {arrow} {} [{kind}",
                lhs.join("."),
                rhs.join(".")
            ));
            if let Some(name) = &spec.name {
                out.push_str(&format!(" {name}"));
            }
            out.push(']');
        }
        for name in self.traits(ty) {
            out.push_str(&format!("\n  trait {name}"));
        }
        out
    }

    fn owned(&self, ty: TypeNode, kind: NodeKind) -> impl Iterator<Item = NodeId> + '_ {
        self.store
            .edges_from_of_kind(ty.0, EdgeKind::Descriptor)
            .into_iter()
            .map(|e| e.target)
            .filter(move |id| self.store.node(*id).is_some_and(|n| n.kind == kind))
    }
}

impl Default for TypeGraph {
    fn default() -> Self {
        Self::new(TraitCatalog::builtin())
    }
}

/// Serializable summary of a type, used by dumps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSummary {
    pub identifier: String,
    pub children: Vec<(String, Option<String>)>,
    pub traits: Vec<String>,
}

impl TypeGraph {
    pub fn summarize(&self, ty: TypeNode) -> TypeSummary {
        TypeSummary {
            identifier: self.type_identifier(ty).to_string(),
            children: self
                .iter_make_children(ty)
                .into_iter()
                .map(|(id, mc)| {
                    let resolved = self
                        .get_make_child_type_reference(mc)
                        .and_then(|r| self.get_resolved_type(r))
                        .map(|t| self.type_identifier(t).to_string());
                    (id.to_string(), resolved)
                })
                .collect(),
            traits: self.traits(ty),
        }
    }
}
