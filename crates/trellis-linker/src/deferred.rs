//! Post-link passes: inheritance flattening, retypes, for-loops

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, info};
use trellis_core::{TypeGraph, TypeNode};

use crate::builder::{BuildState, PendingForLoop, PendingInheritance};
use crate::error::{DslError, DslErrors};
use crate::stdlib::StdlibRegistry;

/// Expands `for` statements once the structure they iterate over is final.
pub trait ForLoopExpander {
    fn expand(&self, graph: &mut TypeGraph, pending: &PendingForLoop) -> Result<(), DslError>;
}

/// Leaves for-loops untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopForLoopExpander;

impl ForLoopExpander for NoopForLoopExpander {
    fn expand(&self, _graph: &mut TypeGraph, pending: &PendingForLoop) -> Result<(), DslError> {
        debug!(block = %pending.block, "for-loop left unexpanded");
        Ok(())
    }
}

/// Runs the three deferred phases over every file of a compilation, in a
/// fixed order: inheritance, then retypes, then for-loops.
pub struct DeferredExecutor<'a> {
    stdlib: &'a StdlibRegistry,
    expander: Box<dyn ForLoopExpander + 'a>,
}

impl<'a> DeferredExecutor<'a> {
    pub fn new(stdlib: &'a StdlibRegistry) -> Self {
        DeferredExecutor {
            stdlib,
            expander: Box::new(NoopForLoopExpander),
        }
    }

    pub fn with_expander(mut self, expander: impl ForLoopExpander + 'a) -> Self {
        self.expander = Box::new(expander);
        self
    }

    pub fn execute(&self, graph: &mut TypeGraph, states: &[&BuildState]) -> Result<(), DslErrors> {
        self.apply_inheritance(graph, states)?;
        self.apply_retypes(graph, states)?;
        self.expand_for_loops(graph, states)?;
        Ok(())
    }

    fn resolve_parent(
        &self,
        graph: &mut TypeGraph,
        state: &BuildState,
        pending: &PendingInheritance,
    ) -> Option<TypeNode> {
        if let Some(local) = state.type_named(&pending.parent) {
            return Some(local);
        }
        match state.import_named(&pending.parent) {
            Some(import) if import.path.is_some() => graph.get_resolved_type(import.reference),
            _ => self.stdlib.get(graph, &pending.parent),
        }
    }

    fn apply_inheritance(&self, graph: &mut TypeGraph, states: &[&BuildState]) -> Result<(), DslErrors> {
        let mut errors = Vec::new();
        let mut dag: DiGraphMap<TypeNode, ()> = DiGraphMap::new();
        let mut records: Vec<(TypeNode, &PendingInheritance)> = Vec::new();

        for state in states {
            for pending in &state.inheritances {
                match self.resolve_parent(graph, state, pending) {
                    Some(parent) => {
                        dag.add_edge(parent, pending.derived, ());
                        records.push((parent, pending));
                    }
                    None => errors.push(DslError::ParentNotFound {
                        parent: pending.parent.clone(),
                        derived: pending.derived_name.clone(),
                    }),
                }
            }
        }
        if !errors.is_empty() {
            return Err(DslErrors(errors));
        }

        let order = toposort(&dag, None).map_err(|_| DslError::CircularInheritance)?;
        for derived in order {
            let Some((parent, pending)) = records.iter().find(|(_, p)| p.derived == derived) else {
                continue;
            };
            let copied = graph.copy_type_structure(derived, *parent, &pending.skip);
            graph.set_parent_type(derived, *parent);
            debug!(
                derived = %pending.derived_name,
                parent = %pending.parent,
                copied,
                "flattened inheritance"
            );
        }
        info!(count = records.len(), "applied inheritance");
        Ok(())
    }

    fn apply_retypes(&self, graph: &mut TypeGraph, states: &[&BuildState]) -> Result<(), DslErrors> {
        let mut retypes: Vec<_> = states
            .iter()
            .enumerate()
            .flat_map(|(file, state)| state.retypes.iter().map(move |r| (file, r)))
            .collect();
        retypes.sort_by_key(|(file, r)| (*file, r.order));

        for (_, retype) in &retypes {
            let full = retype.target.join(".");
            let Some((leaf, parents)) = retype.target.split_last() else {
                return Err(DslError::RetypePathNotFound(full).into());
            };
            let holder = graph
                .resolve_child_path(retype.container, parents)
                .ok_or_else(|| DslError::RetypePathNotFound(parents.join(".")))?;
            let reference = graph
                .get_make_child_type_reference_by_identifier(holder, leaf)
                .ok_or_else(|| DslError::RetypeFieldMissing(full.clone()))?;
            let new_type = graph
                .get_resolved_type(retype.new_type)
                .ok_or_else(|| DslError::RetypeTargetUnlinked(retype.type_name.clone()))?;
            graph.update_type_reference(reference, new_type);
            debug!(target = %full, to = %retype.type_name, "applied retype");
        }
        if !retypes.is_empty() {
            info!(count = retypes.len(), "applied retypes");
        }
        Ok(())
    }

    fn expand_for_loops(&self, graph: &mut TypeGraph, states: &[&BuildState]) -> Result<(), DslErrors> {
        for state in states {
            let mut pending: Vec<&PendingForLoop> = state.for_loops.iter().collect();
            pending.sort_by_key(|p| p.order);
            for for_loop in pending {
                self.expander.expand(graph, for_loop)?;
            }
        }
        Ok(())
    }
}
