//! Bounded breadth-first connectivity search over link edges

use std::collections::{BTreeSet, VecDeque};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use trellis_core::{EdgeId, EdgeKind, GraphEdge, InstanceGraph, InstanceNode, TypeGraph, IS_INTERFACE};

use crate::config::PathfinderConfig;
use crate::counter::{render_counters, Counter};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("`{0}` is not an interface")]
    NotAnInterface(String),

    #[error("node {0} is not part of this instance graph")]
    UnknownNode(String),
}

/// A simple path from the search source to one destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Path {
    pub nodes: Vec<InstanceNode>,
    pub edges: Vec<EdgeId>,
    pub weak_edges: usize,
    /// Halved for every weak edge on the path.
    pub confidence: f64,
}

impl Path {
    pub fn start(&self) -> InstanceNode {
        self.nodes[0]
    }

    pub fn end(&self) -> InstanceNode {
        self.nodes[self.nodes.len() - 1]
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn is_strong(&self) -> bool {
        self.weak_edges == 0
    }
}

struct Stages {
    count: Counter,
    no_revisit: Counter,
    node_type: Counter,
    weak_ceiling: Counter,
    same_end_type: Counter,
    total: Counter,
}

impl Stages {
    fn new() -> Self {
        Stages {
            count: Counter::new("count"),
            no_revisit: Counter::new("no revisit"),
            node_type: Counter::new("node type"),
            weak_ceiling: Counter::new("weak ceiling"),
            same_end_type: Counter::new("same end type"),
            total: Counter::new("total"),
        }
    }

    fn into_vec(self) -> Vec<Counter> {
        vec![
            self.count,
            self.no_revisit,
            self.node_type,
            self.weak_ceiling,
            self.same_end_type,
            self.total,
        ]
    }
}

/// Read-only search over a bound instance graph.
///
/// Only `Connection` and `Pointer` edges are walked; composition never is.
/// Paths are explored shortest first with ties broken by edge creation
/// order, so results are reproducible.
pub struct Pathfinder<'a> {
    instances: &'a InstanceGraph,
    types: &'a TypeGraph,
    config: PathfinderConfig,
}

impl<'a> Pathfinder<'a> {
    pub fn new(instances: &'a InstanceGraph, types: &'a TypeGraph, config: PathfinderConfig) -> Self {
        Pathfinder {
            instances,
            types,
            config,
        }
    }

    pub fn config(&self) -> &PathfinderConfig {
        &self.config
    }

    fn is_weak(&self, edge: &GraphEdge) -> bool {
        edge.kind == EdgeKind::Pointer
            || edge
                .name
                .as_deref()
                .is_some_and(|n| self.config.is_weak_name(n))
    }

    fn is_interface(&self, node: InstanceNode) -> bool {
        if !self.types.catalog().contains(IS_INTERFACE) {
            return true;
        }
        self.instances
            .backing_type(node)
            .is_some_and(|t| self.types.has_trait(t, IS_INTERFACE))
    }

    fn check_endpoint(&self, node: InstanceNode) -> Result<(), PathError> {
        if self.instances.instance(node.node_id()).is_none() {
            return Err(PathError::UnknownNode(node.node_id().to_string()));
        }
        if !self.is_interface(node) {
            return Err(PathError::NotAnInterface(self.instances.full_name(node)));
        }
        Ok(())
    }

    /// Every surviving path from `src` to any of `destinations`, plus the
    /// per-stage counters of this search.
    pub fn find_paths(
        &self,
        src: InstanceNode,
        destinations: &[InstanceNode],
    ) -> Result<(Vec<Path>, Vec<Counter>), PathError> {
        self.check_endpoint(src)?;
        for dst in destinations {
            self.check_endpoint(*dst)?;
        }

        let targets: BTreeSet<InstanceNode> = destinations.iter().copied().collect();
        let mut strong_missing = targets.clone();
        let src_type = self.instances.backing_type(src);

        let mut stages = Stages::new();
        let mut found: Vec<Path> = Vec::new();
        let mut path_count = 0usize;
        let mut stopped = false;

        let mut queue: VecDeque<Path> = VecDeque::new();
        queue.push_back(Path {
            nodes: vec![src],
            edges: Vec::new(),
            weak_edges: 0,
            confidence: 1.0,
        });

        'search: while let Some(partial) = queue.pop_front() {
            for (edge, next) in self.instances.links(partial.end()) {
                let weak_edge = self.is_weak(edge);
                let mut candidate = partial.clone();
                candidate.nodes.push(next);
                candidate.edges.push(edge.id);
                if weak_edge {
                    candidate.weak_edges += 1;
                    candidate.confidence *= 0.5;
                }

                let Stages {
                    count,
                    no_revisit,
                    node_type,
                    weak_ceiling,
                    same_end_type,
                    total,
                } = &mut stages;
                let extend = total.exec(|| {
                    count.exec(|| {
                        path_count += 1;
                        if path_count > self.config.max_paths {
                            stopped = true;
                        }
                        true
                    });
                    let discovered = no_revisit.exec(|| !partial.nodes.contains(&next))
                        && node_type.exec(|| self.is_interface(next))
                        && weak_ceiling.exec(|| {
                            if candidate.weak_edges > 0 && path_count > self.config.max_paths_no_weak {
                                return false;
                            }
                            !(weak_edge
                                && (path_count > self.config.max_paths_no_new_weak
                                    || strong_missing.is_empty()))
                        });
                    if !discovered {
                        return false;
                    }
                    if targets.contains(&next)
                        && same_end_type.exec(|| self.instances.backing_type(next) == src_type)
                    {
                        if candidate.is_strong() {
                            strong_missing.remove(&next);
                        }
                        debug!(
                            to = %self.instances.full_name(next),
                            len = candidate.len(),
                            weak = candidate.weak_edges,
                            "found path"
                        );
                        found.push(candidate.clone());
                    }
                    true
                });

                if extend {
                    queue.push_back(candidate);
                }
                if stopped {
                    warn!(max_paths = self.config.max_paths, "path ceiling reached, search stopped");
                    break 'search;
                }
            }
        }

        let counters = stages.into_vec();
        if self.config.log {
            info!(
                "pathfinder {} -> {} destination(s)\n{}",
                self.instances.full_name(src),
                destinations.len(),
                render_counters(&counters)
            );
        }
        Ok((found, counters))
    }
}
