//! Errors raised while materializing and evaluating instance trees

use thiserror::Error;
use trellis_core::GraphError;
use trellis_pathfinder::PathError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(
        "Interface `{outside}` is connected to `{inside}` but is not part of the module tree. \
         All connected interfaces must be descendants of the root before calling create_typegraph()"
    )]
    NotInModuleTree { inside: String, outside: String },

    #[error("Instance graph missing child '{0}'")]
    MissingInstanceChild(String),

    #[error("Runtime field `{field}` of `{node}` failed: {message}")]
    Hook {
        node: String,
        field: String,
        message: String,
    },
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
