//! Programmatic module trees lowered into type graphs

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, info, warn};
use trellis_core::{EdgeSpec, InstanceNode, TraitCatalog, TypeGraph, TypeNode};
use trellis_linker::BlockKind;

use crate::binder::{HookRegistry, Runtime};
use crate::error::{RuntimeError, RuntimeResult};

/// Handle to a node of a [`ModuleTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeNode(usize);

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    type_name: String,
    kind: BlockKind,
    parent: Option<TreeNode>,
    children: Vec<TreeNode>,
    traits: Vec<String>,
}

#[derive(Debug, Clone)]
struct Connection {
    lhs: TreeNode,
    rhs: TreeNode,
    spec: EdgeSpec,
}

/// Modules, components and interfaces assembled in code rather than
/// declared in source files.
///
/// Nodes sharing a type name share one type: their children and internal
/// connections are merged when the tree is lowered.
#[derive(Debug, Default)]
pub struct ModuleTree {
    entries: Vec<Entry>,
    connections: Vec<Connection>,
    built: BTreeSet<TreeNode>,
    bound: HashMap<TreeNode, InstanceNode>,
}

impl ModuleTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(&mut self, name: &str, type_name: &str, kind: BlockKind) -> TreeNode {
        self.push(name, type_name, kind, None)
    }

    pub fn add_child(
        &mut self,
        parent: TreeNode,
        name: &str,
        type_name: &str,
        kind: BlockKind,
    ) -> TreeNode {
        let node = self.push(name, type_name, kind, Some(parent));
        self.entries[parent.0].children.push(node);
        node
    }

    pub fn add_trait(&mut self, node: TreeNode, name: &str) {
        self.entries[node.0].traits.push(name.to_string());
    }

    /// Undirected connection between two interfaces.
    pub fn connect(&mut self, lhs: TreeNode, rhs: TreeNode) {
        self.connect_with(lhs, rhs, EdgeSpec::connection());
    }

    pub fn connect_with(&mut self, lhs: TreeNode, rhs: TreeNode, spec: EdgeSpec) {
        self.connections.push(Connection { lhs, rhs, spec });
    }

    pub fn name(&self, node: TreeNode) -> &str {
        &self.entries[node.0].name
    }

    pub fn type_name(&self, node: TreeNode) -> &str {
        &self.entries[node.0].type_name
    }

    pub fn parent(&self, node: TreeNode) -> Option<TreeNode> {
        self.entries[node.0].parent
    }

    pub fn children(&self, node: TreeNode) -> &[TreeNode] {
        &self.entries[node.0].children
    }

    /// Dotted name from the topmost ancestor.
    pub fn full_name(&self, node: TreeNode) -> String {
        self.ancestry(node)
            .iter()
            .map(|n| self.name(*n))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Nodes `node` was connected to, in connection order.
    pub fn connected(&self, node: TreeNode) -> Vec<TreeNode> {
        self.connections
            .iter()
            .filter_map(|c| {
                if c.lhs == node {
                    Some(c.rhs)
                } else if c.rhs == node {
                    Some(c.lhs)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Lower the tree under `root` into a fresh, unsealed type graph.
    ///
    /// Every connection touching the tree must stay inside it. Panics when
    /// called twice for the same root.
    pub fn create_typegraph(&mut self, root: TreeNode) -> RuntimeResult<(TypeGraph, TypeNode)> {
        assert!(
            !self.built.contains(&root),
            "TypeGraph has already been built for this module tree; rebuilding is not supported."
        );
        let members: Vec<TreeNode> = self.subtree(root);
        let inside: HashSet<TreeNode> = members.iter().copied().collect();
        self.check_closed_world(&inside)?;
        self.built.insert(root);

        let mut graph = TypeGraph::new(TraitCatalog::builtin());
        let mut types: HashMap<&str, TypeNode> = HashMap::new();
        for node in &members {
            let entry = &self.entries[node.0];
            if types.contains_key(entry.type_name.as_str()) {
                continue;
            }
            let ty = graph.add_type(&entry.type_name);
            graph.add_trait(ty, entry.kind.trait_name());
            for name in &entry.traits {
                graph.add_trait(ty, name);
            }
            types.insert(&entry.type_name, ty);
        }

        for node in &members {
            let entry = &self.entries[node.0];
            let Some(parent) = entry.parent.filter(|p| inside.contains(p)) else {
                continue;
            };
            let owner = types[self.type_name(parent)];
            let child_type = types[entry.type_name.as_str()];
            match graph.get_make_child_type_reference_by_identifier(owner, &entry.name) {
                None => {
                    graph.add_make_child(owner, child_type, &entry.name);
                }
                Some(existing) if graph.get_resolved_type(existing) != Some(child_type) => {
                    warn!(
                        owner = %self.type_name(parent),
                        field = %entry.name,
                        "conflicting child types for one field, keeping the first"
                    );
                }
                Some(_) => {}
            }
        }

        let mut seen: HashSet<(TypeNode, Vec<String>, Vec<String>)> = HashSet::new();
        let mut links = 0usize;
        for connection in self.connections.iter() {
            if !inside.contains(&connection.lhs) || connection.lhs == connection.rhs {
                continue;
            }
            let (ancestor, lhs, rhs) = self.relative_paths(connection.lhs, connection.rhs);
            let owner = types[self.type_name(ancestor)];
            if !seen.insert((owner, lhs.clone(), rhs.clone())) {
                continue;
            }
            let lhs_ref = graph.add_reference(owner, lhs.as_slice());
            let rhs_ref = graph.add_reference(owner, rhs.as_slice());
            graph.add_make_link(owner, lhs_ref, rhs_ref, connection.spec.clone());
            debug!(
                owner = %self.type_name(ancestor),
                lhs = %lhs.join("."),
                rhs = %rhs.join("."),
                "registered connection"
            );
            links += 1;
        }

        let root_type = types[self.type_name(root)];
        info!(
            root = %self.full_name(root),
            types = types.len(),
            links,
            "created type graph"
        );
        Ok((graph, root_type))
    }

    /// Build, seal and instantiate the tree under `root`, then bind and
    /// evaluate it. Afterwards [`ModuleTree::instance`] answers for every
    /// node of the tree.
    pub fn instantiate(&mut self, root: TreeNode, hooks: HookRegistry) -> RuntimeResult<Runtime> {
        let (mut graph, root_type) = self.create_typegraph(root)?;
        graph.seal();
        let mut runtime = Runtime::new(graph).with_hooks(hooks);
        let instance = runtime.instantiate(root_type)?;
        runtime.bind_instance_hierarchy(instance);
        runtime.execute_runtime_functions(instance)?;

        for node in self.subtree(root) {
            let path: Vec<&str> = self.ancestry(node)
                .into_iter()
                .skip_while(|n| *n != root)
                .skip(1)
                .map(|n| self.name(n))
                .collect();
            let bound = runtime
                .instances()
                .descendant(instance, &path)
                .ok_or_else(|| RuntimeError::MissingInstanceChild(self.full_name(node)))?;
            self.bound.insert(node, bound);
        }
        Ok(runtime)
    }

    /// Instance a tree node was bound to. Panics before instantiation.
    pub fn instance(&self, node: TreeNode) -> InstanceNode {
        match self.bound.get(&node) {
            Some(instance) => *instance,
            None => panic!(
                "No instance bound for {}. Must be instantiated before querying runtime graph state.",
                self.full_name(node)
            ),
        }
    }

    pub fn is_bound(&self, node: TreeNode) -> bool {
        self.bound.contains_key(&node)
    }

    fn push(&mut self, name: &str, type_name: &str, kind: BlockKind, parent: Option<TreeNode>) -> TreeNode {
        let node = TreeNode(self.entries.len());
        self.entries.push(Entry {
            name: name.to_string(),
            type_name: type_name.to_string(),
            kind,
            parent,
            children: Vec::new(),
            traits: Vec::new(),
        });
        node
    }

    /// `node` and its descendants, parents first.
    fn subtree(&self, node: TreeNode) -> Vec<TreeNode> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev());
        }
        out
    }

    /// Topmost ancestor down to `node`.
    fn ancestry(&self, node: TreeNode) -> Vec<TreeNode> {
        let mut chain = vec![node];
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }

    /// Nearest common ancestor of `a` and `b` and both paths below it.
    fn relative_paths(&self, a: TreeNode, b: TreeNode) -> (TreeNode, Vec<String>, Vec<String>) {
        let chain_a = self.ancestry(a);
        let chain_b = self.ancestry(b);
        let shared = chain_a
            .iter()
            .zip(&chain_b)
            .take_while(|(x, y)| x == y)
            .count();
        let ancestor = chain_a[shared - 1];
        let below = |chain: &[TreeNode]| -> Vec<String> {
            chain[shared..]
                .iter()
                .map(|n| self.name(*n).to_string())
                .collect()
        };
        (ancestor, below(&chain_a), below(&chain_b))
    }

    fn check_closed_world(&self, inside: &HashSet<TreeNode>) -> RuntimeResult<()> {
        for connection in &self.connections {
            let (lhs_in, rhs_in) = (inside.contains(&connection.lhs), inside.contains(&connection.rhs));
            if lhs_in == rhs_in {
                continue;
            }
            let (member, stranger) = if lhs_in {
                (connection.lhs, connection.rhs)
            } else {
                (connection.rhs, connection.lhs)
            };
            return Err(RuntimeError::NotInModuleTree {
                inside: self.full_name(member),
                outside: self.full_name(stranger),
            });
        }
        Ok(())
    }
}
