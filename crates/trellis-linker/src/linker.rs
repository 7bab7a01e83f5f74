//! Import and name resolution

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};
use trellis_core::{TypeGraph, TypeNode};

use crate::builder::{BuildState, SkeletonBuilder};
use crate::error::LinkError;
use crate::resolver::SearchPathResolver;
use crate::source::SourceLoader;
use crate::stdlib::StdlibRegistry;

type ImportKey = (PathBuf, String, Option<String>);

/// Links every type reference of a file, loading and building imported
/// files into the same graph as needed.
///
/// One linker serves one compilation: imported files are built once and
/// their build states kept for the deferred executor.
pub struct Linker {
    loader: Arc<dyn SourceLoader>,
    resolver: SearchPathResolver,
    stdlib: Arc<StdlibRegistry>,
    memo: HashMap<ImportKey, TypeNode>,
    files: HashMap<PathBuf, usize>,
    imported: Vec<BuildState>,
    stack: Vec<PathBuf>,
}

impl Linker {
    pub fn new(
        loader: Arc<dyn SourceLoader>,
        resolver: SearchPathResolver,
        stdlib: Arc<StdlibRegistry>,
    ) -> Self {
        Linker {
            loader,
            resolver,
            stdlib,
            memo: HashMap::new(),
            files: HashMap::new(),
            imported: Vec::new(),
            stack: Vec::new(),
        }
    }

    pub fn stdlib(&self) -> &Arc<StdlibRegistry> {
        &self.stdlib
    }

    /// Files pulled in by imports, dependencies before dependents.
    pub fn imported_states(&self) -> &[BuildState] {
        &self.imported
    }

    pub fn into_imported(self) -> Vec<BuildState> {
        self.imported
    }

    /// Link the imports and type references of `state`.
    ///
    /// A name used in a block resolves to, in order: a block declared in the
    /// same file, the type an import of that name resolved to, or a built-in.
    /// An import of a name the file declares itself links to that block.
    /// Other imports with a path are looked up through the search path
    /// resolver; imports without one come from the stdlib.
    pub fn link_imports(&mut self, graph: &mut TypeGraph, state: &BuildState) -> Result<(), LinkError> {
        let identity = self.loader.canonicalize(&state.path);
        if self.stack.contains(&identity) {
            return Err(LinkError::CircularImport(state.path.display().to_string()));
        }
        self.stack.push(identity);
        let linked = self.link_state(graph, state);
        self.stack.pop();
        linked?;

        if self.stack.is_empty() {
            let unresolved: Vec<String> = graph
                .collect_unresolved_type_references()
                .into_iter()
                .map(|u| {
                    let owner = u.owner.map_or("?", |o| graph.type_identifier(o));
                    format!("{owner}.{} -> {}", u.identifier, u.name)
                })
                .collect();
            if !unresolved.is_empty() {
                return Err(LinkError::UnresolvedTypeReferences(unresolved));
            }
            info!(
                path = %state.path.display(),
                imported_files = self.imported.len(),
                "linked"
            );
        }
        Ok(())
    }

    fn link_state(&mut self, graph: &mut TypeGraph, state: &BuildState) -> Result<(), LinkError> {
        for import in &state.imports {
            let target = self.resolve_import(graph, state, &import.name, import.path.as_deref())?;
            graph.link_type_reference(import.reference, target);
        }

        for named in &state.references {
            let target = match state.type_named(&named.name) {
                Some(local) => Some(local),
                None => match state.import_named(&named.name) {
                    Some(import) => graph.get_resolved_type(import.reference),
                    None => self.stdlib.get(graph, &named.name),
                },
            };
            match target {
                Some(target) => graph.link_type_reference(named.reference, target),
                None => debug!(name = %named.name, "left unresolved"),
            }
        }
        Ok(())
    }

    fn resolve_import(
        &mut self,
        graph: &mut TypeGraph,
        state: &BuildState,
        name: &str,
        path: Option<&str>,
    ) -> Result<TypeNode, LinkError> {
        let key = (
            state.path.clone(),
            name.to_string(),
            path.map(str::to_string),
        );
        if let Some(hit) = self.memo.get(&key) {
            return Ok(*hit);
        }

        let resolved = match (state.type_named(name), path) {
            (Some(local), _) => local,
            (None, None) => self
                .stdlib
                .get(graph, name)
                .ok_or_else(|| LinkError::UnknownStdlibType(name.to_string()))?,
            (None, Some(raw)) => {
                let file = self
                    .resolver
                    .resolve(self.loader.as_ref(), state.directory(), raw)
                    .ok_or_else(|| LinkError::ImportPathNotFound(raw.to_string()))?;
                let index = self.load_file(graph, &file)?;
                self.imported[index]
                    .type_named(name)
                    .ok_or_else(|| LinkError::SymbolNotFound {
                        name: name.to_string(),
                        path: raw.to_string(),
                    })?
            }
        };
        debug!(
            file = %state.path.display(),
            name,
            path = path.unwrap_or("<stdlib>"),
            "resolved import"
        );
        self.memo.insert(key, resolved);
        Ok(resolved)
    }

    /// Build and link an imported file once. Returns its slot in `imported`.
    fn load_file(&mut self, graph: &mut TypeGraph, file: &Path) -> Result<usize, LinkError> {
        let identity = self.loader.canonicalize(file);
        if self.stack.contains(&identity) {
            return Err(LinkError::CircularImport(file.display().to_string()));
        }
        if let Some(index) = self.files.get(&identity) {
            return Ok(*index);
        }

        let source = self.loader.load(file)?;
        let state = SkeletonBuilder::new(graph)
            .build(file, &source)
            .map_err(|source| LinkError::Build {
                path: file.to_path_buf(),
                source,
            })?;
        self.link_imports(graph, &state)?;

        let index = self.imported.len();
        self.imported.push(state);
        self.files.insert(identity, index);
        Ok(index)
    }
}
