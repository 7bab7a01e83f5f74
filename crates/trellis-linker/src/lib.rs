//! Statement building, import linking and deferred type passes

pub mod builder;
pub mod compile;
pub mod config;
pub mod deferred;
pub mod error;
pub mod linker;
pub mod resolver;
pub mod source;
pub mod statements;
pub mod stdlib;

#[cfg(test)]
pub mod tests;

#[cfg(test)]
pub mod test_utils;

pub use builder::{BuildState, ImportDecl, NamedReference, PendingForLoop, PendingInheritance, PendingRetype, SkeletonBuilder};
pub use compile::{Compilation, CompileError, Compiler};
pub use config::{ProjectConfig, CONFIG_FILE};
pub use deferred::{DeferredExecutor, ForLoopExpander, NoopForLoopExpander};
pub use error::{ConfigError, DslError, DslErrors, LinkError, LoadError};
pub use linker::Linker;
pub use resolver::SearchPathResolver;
pub use source::{FsLoader, MemoryLoader, SourceLoader};
pub use statements::{BlockDef, BlockKind, BodyItem, SourceFile, Statement};
pub use stdlib::{StdlibDefinition, StdlibRegistry};
