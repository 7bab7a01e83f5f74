//! One compilation unit from entry file to sealed type graph

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use trellis_core::{TraitCatalog, TypeGraph, TypeNode};

use crate::builder::{BuildState, SkeletonBuilder};
use crate::deferred::DeferredExecutor;
use crate::error::{DslErrors, LinkError, LoadError};
use crate::linker::Linker;
use crate::resolver::SearchPathResolver;
use crate::source::SourceLoader;
use crate::stdlib::StdlibRegistry;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Failed to build `{}`:\n{source}", .path.display())]
    Build {
        path: std::path::PathBuf,
        #[source]
        source: DslErrors,
    },

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Deferred(#[from] DslErrors),
}

/// The sealed graph of one entry file and everything it imports.
#[derive(Debug)]
pub struct Compilation {
    pub graph: TypeGraph,
    pub entry: BuildState,
    pub imported: Vec<BuildState>,
}

impl Compilation {
    /// A block declared by the entry file, else by an imported file.
    pub fn type_named(&self, name: &str) -> Option<TypeNode> {
        self.entry
            .type_named(name)
            .or_else(|| self.imported.iter().find_map(|s| s.type_named(name)))
    }

    /// Imported files first, entry last.
    pub fn states(&self) -> Vec<&BuildState> {
        self.imported
            .iter()
            .chain(std::iter::once(&self.entry))
            .collect()
    }
}

/// Shared, immutable inputs for compiling any number of entry files.
pub struct Compiler {
    loader: Arc<dyn SourceLoader>,
    stdlib: Arc<StdlibRegistry>,
    resolver: SearchPathResolver,
    catalog: TraitCatalog,
}

impl Compiler {
    pub fn new(
        loader: Arc<dyn SourceLoader>,
        stdlib: Arc<StdlibRegistry>,
        resolver: SearchPathResolver,
    ) -> Self {
        Compiler {
            loader,
            stdlib,
            resolver,
            catalog: TraitCatalog::builtin(),
        }
    }

    pub fn with_catalog(mut self, catalog: TraitCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn stdlib(&self) -> &StdlibRegistry {
        &self.stdlib
    }

    /// Build, link and flatten `entry`, then seal the graph.
    pub fn compile(&self, entry: &Path) -> Result<Compilation, CompileError> {
        let source = self.loader.load(entry)?;
        let mut graph = TypeGraph::new(self.catalog.clone());
        let state = SkeletonBuilder::new(&mut graph)
            .build(entry, &source)
            .map_err(|source| CompileError::Build {
                path: entry.to_path_buf(),
                source,
            })?;

        let mut linker = Linker::new(
            Arc::clone(&self.loader),
            self.resolver.clone(),
            Arc::clone(&self.stdlib),
        );
        linker.link_imports(&mut graph, &state)?;
        let imported = linker.into_imported();

        let states: Vec<&BuildState> = imported
            .iter()
            .chain(std::iter::once(&state))
            .collect();
        DeferredExecutor::new(&self.stdlib).execute(&mut graph, &states)?;
        graph.seal();

        info!(
            entry = %entry.display(),
            files = imported.len() + 1,
            types = graph.types().len(),
            "compiled"
        );
        Ok(Compilation {
            graph,
            entry: state,
            imported,
        })
    }
}
