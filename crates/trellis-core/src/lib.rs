//! Trellis Core — graph store, type skeletons and instance trees

/// Declares a typed handle over a [`model::NodeId`].
macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        pub struct $name(pub(crate) $crate::model::NodeId);

        impl $name {
            pub fn node_id(self) -> $crate::model::NodeId {
                self.0
            }
        }
    };
}

pub mod error;
pub mod graph;
pub mod instance;
pub mod model;
pub mod traits;
pub mod typegraph;


#[cfg(test)]
pub mod test_utils;

pub use error::{GraphError, GraphResult};
pub use graph::GraphStore;
pub use instance::{InstanceGraph, InstanceNode, Instantiator};
pub use model::{AttrValue, Attributes, EdgeId, EdgeKind, EdgeSpec, GraphEdge, GraphNode, NodeId, NodeKind};
pub use traits::{TraitCatalog, IS_COMPONENT, IS_INTERFACE, IS_MODULE};
pub use typegraph::{MakeChild, MakeLink, Reference, TypeGraph, TypeNode, TypeReference, TypeSummary, UnresolvedTypeReference};
