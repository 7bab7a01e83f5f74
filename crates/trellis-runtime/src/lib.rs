//! Trellis Runtime — binding, lazy fields and programmatic module trees

pub mod binder;
pub mod error;
pub mod tree;


pub use binder::{Binding, FieldContext, Hook, HookRegistry, Runtime};
pub use error::{RuntimeError, RuntimeResult};
pub use tree::{ModuleTree, TreeNode};
