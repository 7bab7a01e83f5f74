//! Binding runtime state onto instance trees and evaluating lazy fields

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};
use trellis_core::{
    AttrValue, EdgeKind, InstanceGraph, InstanceNode, Instantiator, TypeGraph, TypeNode,
};
use trellis_pathfinder::{Counter, Path, Pathfinder, PathfinderConfig};

use crate::error::{RuntimeError, RuntimeResult};

/// Computes one lazily-defined field of a node.
pub type Hook = Arc<dyn Fn(&FieldContext<'_>) -> Result<AttrValue, String> + Send + Sync>;

/// Lazy field definitions keyed by the type that declares them.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: BTreeMap<String, Vec<(String, Hook)>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define `field` on every instance of `type_name` and of types derived
    /// from it.
    pub fn register<F>(&mut self, type_name: &str, field: &str, hook: F)
    where
        F: Fn(&FieldContext<'_>) -> Result<AttrValue, String> + Send + Sync + 'static,
    {
        self.hooks
            .entry(type_name.to_string())
            .or_default()
            .push((field.to_string(), Arc::new(hook)));
    }

    pub fn with<F>(mut self, type_name: &str, field: &str, hook: F) -> Self
    where
        F: Fn(&FieldContext<'_>) -> Result<AttrValue, String> + Send + Sync + 'static,
    {
        self.register(type_name, field, hook);
        self
    }

    pub fn hooks_for(&self, type_name: &str) -> &[(String, Hook)] {
        self.hooks.get(type_name).map_or(&[], Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: BTreeMap<&str, Vec<&str>> = self
            .hooks
            .iter()
            .map(|(ty, hooks)| (ty.as_str(), hooks.iter().map(|(f, _)| f.as_str()).collect()))
            .collect();
        f.debug_struct("HookRegistry").field("fields", &fields).finish()
    }
}

/// What a hook can see while computing a field.
pub struct FieldContext<'r> {
    runtime: &'r Runtime,
    node: InstanceNode,
}

impl<'r> FieldContext<'r> {
    pub fn node(&self) -> InstanceNode {
        self.node
    }

    pub fn identifier(&self) -> &str {
        self.runtime.instances.identifier(self.node)
    }

    pub fn full_name(&self) -> String {
        self.runtime.instances.full_name(self.node)
    }

    pub fn type_name(&self) -> &str {
        self.runtime.type_name(self.node)
    }

    pub fn parent(&self) -> Option<InstanceNode> {
        self.runtime.instances.parent(self.node)
    }

    pub fn children(&self) -> Vec<(&str, InstanceNode)> {
        self.runtime.instances.children(self.node)
    }

    /// A field already computed on this node.
    pub fn field(&self, name: &str) -> Option<&AttrValue> {
        self.runtime.field(self.node, name)
    }

    /// A field already computed on another node. Children are evaluated
    /// before their parents.
    pub fn field_of(&self, node: InstanceNode, name: &str) -> Option<&AttrValue> {
        self.runtime.field(node, name)
    }

    pub fn connections(&self) -> Vec<InstanceNode> {
        self.runtime.connections(self.node)
    }
}

/// Per-node state attached by [`Runtime::bind_instance_hierarchy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub root: InstanceNode,
    pub type_name: String,
    pub full_name: String,
}

/// Owns a finished type graph plus the instance trees built from it.
///
/// Each root goes through `instantiate`, `bind_instance_hierarchy` and
/// `execute_runtime_functions` exactly once, in that order.
pub struct Runtime {
    types: TypeGraph,
    instances: InstanceGraph,
    hooks: HookRegistry,
    pathfinder: PathfinderConfig,
    bindings: BTreeMap<InstanceNode, Binding>,
    executed: BTreeSet<InstanceNode>,
    fields: HashMap<InstanceNode, BTreeMap<String, AttrValue>>,
}

impl Runtime {
    pub fn new(types: TypeGraph) -> Self {
        Runtime {
            types,
            instances: InstanceGraph::new(),
            hooks: HookRegistry::new(),
            pathfinder: PathfinderConfig::default(),
            bindings: BTreeMap::new(),
            executed: BTreeSet::new(),
            fields: HashMap::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_pathfinder(mut self, config: PathfinderConfig) -> Self {
        self.pathfinder = config;
        self
    }

    pub fn types(&self) -> &TypeGraph {
        &self.types
    }

    pub fn instances(&self) -> &InstanceGraph {
        &self.instances
    }

    pub fn instantiate(&mut self, ty: TypeNode) -> RuntimeResult<InstanceNode> {
        Ok(Instantiator::new(&self.types).instantiate(&mut self.instances, ty)?)
    }

    pub fn instantiate_by_name(&mut self, identifier: &str) -> RuntimeResult<InstanceNode> {
        Ok(self.types.instantiate(&mut self.instances, identifier)?)
    }

    /// Attach a binding to every node under `root`.
    ///
    /// Panics unless `root` came out of [`Runtime::instantiate`], or if any
    /// node of its tree is already bound.
    pub fn bind_instance_hierarchy(&mut self, root: InstanceNode) {
        assert!(
            self.instances.roots().contains(&root),
            "`{}` is not the root of an instantiated hierarchy",
            self.instances.full_name(root)
        );
        let nodes = self.instances.subtree(root);
        if let Some(bound) = nodes.iter().find(|n| self.bindings.contains_key(*n)) {
            panic!(
                "Instance hierarchy `{}` is already bound (at `{}`)",
                self.instances.full_name(root),
                self.instances.full_name(*bound)
            );
        }
        for node in &nodes {
            let binding = Binding {
                root,
                type_name: self.type_name(*node).to_string(),
                full_name: self.instances.full_name(*node),
            };
            self.bindings.insert(*node, binding);
        }
        debug!(root = %self.instances.full_name(root), nodes = nodes.len(), "bound hierarchy");
    }

    pub fn is_bound(&self, node: InstanceNode) -> bool {
        self.bindings.contains_key(&node)
    }

    /// Binding of `node`. Panics if it was never bound.
    pub fn binding(&self, node: InstanceNode) -> &Binding {
        self.require_bound(node);
        &self.bindings[&node]
    }

    fn require_bound(&self, node: InstanceNode) {
        assert!(
            self.is_bound(node),
            "No instance bound for {}. Must be instantiated before querying runtime graph state.",
            self.instances.full_name(node)
        );
    }

    /// Evaluate every registered lazy field under `root`.
    ///
    /// Children run before parents. On each node the hooks of its type's
    /// ancestors run first, base type first. Panics if `root` is unbound or
    /// was already executed.
    pub fn execute_runtime_functions(&mut self, root: InstanceNode) -> RuntimeResult<()> {
        assert!(
            self.bindings.get(&root).is_some_and(|b| b.root == root),
            "Instance hierarchy `{}` must be bound before executing runtime functions",
            self.instances.full_name(root)
        );
        assert!(
            self.executed.insert(root),
            "Runtime functions of `{}` have already been executed",
            self.instances.full_name(root)
        );

        let mut evaluated = 0usize;
        for node in self.post_order(root) {
            let Some(ty) = self.instances.backing_type(node) else {
                continue;
            };
            let hooks: Vec<(String, Hook)> = self
                .types
                .type_lineage(ty)
                .into_iter()
                .flat_map(|t| self.hooks.hooks_for(self.types.type_identifier(t)).to_vec())
                .collect();
            for (field, hook) in hooks {
                let value = hook(&FieldContext {
                    runtime: self,
                    node,
                })
                .map_err(|message| RuntimeError::Hook {
                    node: self.instances.full_name(node),
                    field: field.clone(),
                    message,
                })?;
                self.fields.entry(node).or_default().insert(field, value);
                evaluated += 1;
            }
        }
        info!(root = %self.instances.full_name(root), evaluated, "executed runtime functions");
        Ok(())
    }

    pub fn field(&self, node: InstanceNode, name: &str) -> Option<&AttrValue> {
        self.fields.get(&node).and_then(|f| f.get(name))
    }

    pub fn type_name(&self, node: InstanceNode) -> &str {
        self.instances
            .backing_type(node)
            .map_or("", |t| self.types.type_identifier(t))
    }

    /// Interfaces directly connected to `node`, in connection order.
    pub fn connections(&self, node: InstanceNode) -> Vec<InstanceNode> {
        self.instances
            .links(node)
            .into_iter()
            .filter(|(e, _)| e.kind == EdgeKind::Connection)
            .map(|(_, other)| other)
            .collect()
    }

    /// Paths from `src` to any of `destinations`. Both ends must be bound.
    pub fn find_paths(
        &self,
        src: InstanceNode,
        destinations: &[InstanceNode],
    ) -> RuntimeResult<(Vec<Path>, Vec<Counter>)> {
        for node in std::iter::once(&src).chain(destinations) {
            self.require_bound(*node);
        }
        let finder = Pathfinder::new(&self.instances, &self.types, self.pathfinder.clone());
        Ok(finder.find_paths(src, destinations)?)
    }

    /// Instance dump of `root` with computed fields merged in.
    pub fn dump(&self, root: InstanceNode) -> Value {
        let mut value = self.instances.dump(root, &self.types);
        self.merge_fields(root, &mut value);
        value
    }

    /// Nodes under `root`, every child before its parent, siblings in
    /// declaration order.
    fn post_order(&self, root: InstanceNode) -> Vec<InstanceNode> {
        let mut out = Vec::new();
        let mut stack = vec![(root, false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                out.push(node);
                continue;
            }
            stack.push((node, true));
            let children = self.instances.children(node);
            stack.extend(children.into_iter().rev().map(|(_, c)| (c, false)));
        }
        out
    }

    fn merge_fields(&self, node: InstanceNode, value: &mut Value) {
        if let Some(fields) = self.fields.get(&node) {
            let rendered: serde_json::Map<String, Value> = fields
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or(Value::Null)))
                .collect();
            value["fields"] = Value::Object(rendered);
        }
        for (name, child) in self.instances.children(node) {
            if let Some(slot) = value.get_mut("children").and_then(|c| c.get_mut(name)) {
                self.merge_fields(child, slot);
            }
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("types", &self.types)
            .field("instances", &self.instances)
            .field("bound", &self.bindings.len())
            .finish()
    }
}
