//! Errors raised while expanding types into instances

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("unknown type `{0}`")]
    UnknownType(String),

    #[error("cannot instantiate `{owner}.{identifier}`: type reference `{name}` is not linked")]
    UnresolvedTypeReference {
        owner: String,
        identifier: String,
        name: String,
    },

    #[error("Failed to resolve reference `{path}` in `{owner}`")]
    ReferenceNotFound { owner: String, path: String },

    #[error("recursive instantiation of `{ty}` (via {chain})")]
    RecursiveInstantiation { ty: String, chain: String },
}

pub type GraphResult<T> = Result<T, GraphError>;
