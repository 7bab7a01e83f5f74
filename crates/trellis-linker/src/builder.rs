//! Building type skeletons from parsed statements

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use trellis_core::{EdgeKind, EdgeSpec, TypeGraph, TypeNode, TypeReference};

use crate::error::{DslError, DslErrors};
use crate::statements::{split_path, BlockDef, BodyItem, SourceFile, Statement};

/// `import Name` or `from "path" import Name`, with the reference the linker
/// resolves for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    pub name: String,
    pub path: Option<String>,
    pub reference: TypeReference,
}

/// A type named inside a block body (`new X`, `-> X`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedReference {
    pub reference: TypeReference,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInheritance {
    pub derived: TypeNode,
    pub derived_name: String,
    pub parent: String,
    /// Fields the derived block declares itself.
    pub skip: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRetype {
    pub container: TypeNode,
    pub target: Vec<String>,
    pub new_type: TypeReference,
    pub type_name: String,
    /// Position in the file; later statements win.
    pub order: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingForLoop {
    pub container: TypeNode,
    pub block: String,
    pub raw: String,
    pub order: usize,
}

/// What building one file leaves behind for the linker and the executor.
#[derive(Debug, Clone)]
pub struct BuildState {
    pub path: PathBuf,
    /// Owner of the file's import references.
    pub file_type: TypeNode,
    /// Declared blocks in source order.
    pub types: Vec<(String, TypeNode)>,
    pub imports: Vec<ImportDecl>,
    pub references: Vec<NamedReference>,
    pub inheritances: Vec<PendingInheritance>,
    pub retypes: Vec<PendingRetype>,
    pub for_loops: Vec<PendingForLoop>,
}

impl BuildState {
    /// A block declared in this file.
    pub fn type_named(&self, name: &str) -> Option<TypeNode> {
        self.types
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| *ty)
    }

    pub fn import_named(&self, name: &str) -> Option<&ImportDecl> {
        self.imports.iter().find(|i| i.name == name)
    }

    pub fn directory(&self) -> Option<&Path> {
        self.path.parent()
    }
}

/// Translates one file's statements into TypeGraph descriptors.
///
/// Child types stay unresolved; the linker fills them in. Inheritance,
/// retypes and for-loops are recorded for the deferred executor.
pub struct SkeletonBuilder<'g> {
    graph: &'g mut TypeGraph,
    errors: Vec<DslError>,
    order: usize,
}

impl<'g> SkeletonBuilder<'g> {
    pub fn new(graph: &'g mut TypeGraph) -> Self {
        SkeletonBuilder {
            graph,
            errors: Vec::new(),
            order: 0,
        }
    }

    /// Build every statement of `source`. All authoring errors found are
    /// reported together.
    pub fn build(mut self, path: &Path, source: &SourceFile) -> Result<BuildState, DslErrors> {
        let file_type = self.graph.add_type(&path.display().to_string());
        let mut state = BuildState {
            path: path.to_path_buf(),
            file_type,
            types: Vec::new(),
            imports: Vec::new(),
            references: Vec::new(),
            inheritances: Vec::new(),
            retypes: Vec::new(),
            for_loops: Vec::new(),
        };

        for statement in &source.statements {
            match statement {
                Statement::Import { name, path } => {
                    let reference = self.graph.add_type_reference(file_type, name);
                    state.imports.push(ImportDecl {
                        name: name.clone(),
                        path: path.clone(),
                        reference,
                    });
                }
                Statement::Block(block) => self.build_block(&mut state, block),
            }
        }

        if !self.errors.is_empty() {
            return Err(DslErrors(self.errors));
        }
        info!(
            path = %path.display(),
            types = state.types.len(),
            imports = state.imports.len(),
            "built skeleton"
        );
        Ok(state)
    }

    fn build_block(&mut self, state: &mut BuildState, block: &BlockDef) {
        if state.type_named(&block.name).is_some() {
            self.errors.push(DslError::DuplicateBlock(block.name.clone()));
            return;
        }
        let ty = self.graph.add_type(&block.name);
        self.graph.add_trait(ty, block.kind.trait_name());
        state.types.push((block.name.clone(), ty));

        let mut declared: Vec<String> = Vec::new();
        let mut connects: Vec<&str> = Vec::new();

        for item in &block.body {
            self.order += 1;
            match item {
                BodyItem::New { field, type_name } => {
                    if declared.contains(field) {
                        self.errors.push(DslError::DuplicateField {
                            block: block.name.clone(),
                            field: field.clone(),
                        });
                        continue;
                    }
                    let (_, reference) = self.graph.add_unresolved_make_child(ty, field, type_name);
                    state.references.push(NamedReference {
                        reference,
                        name: type_name.clone(),
                    });
                    declared.push(field.clone());
                }
                BodyItem::Connect {
                    lhs,
                    rhs,
                    name,
                    directional,
                    pointer,
                } => {
                    let kind = if *pointer {
                        EdgeKind::Pointer
                    } else {
                        EdgeKind::Connection
                    };
                    let mut spec = EdgeSpec::new(kind).directional(*directional);
                    if let Some(name) = name {
                        spec = spec.named(name.clone());
                    }
                    let lhs_ref = self.graph.add_reference(ty, &split_path(lhs));
                    let rhs_ref = self.graph.add_reference(ty, &split_path(rhs));
                    self.graph.add_make_link(ty, lhs_ref, rhs_ref, spec);
                    connects.push(lhs);
                    connects.push(rhs);
                }
                BodyItem::Retype { target, type_name } => {
                    let new_type = self.graph.add_type_reference(ty, type_name);
                    state.references.push(NamedReference {
                        reference: new_type,
                        name: type_name.clone(),
                    });
                    state.retypes.push(PendingRetype {
                        container: ty,
                        target: split_path(target),
                        new_type,
                        type_name: type_name.clone(),
                        order: self.order,
                    });
                }
                BodyItem::Trait { name } => self.graph.add_trait(ty, name),
                BodyItem::Pass => {}
                BodyItem::ForLoop { raw } => state.for_loops.push(PendingForLoop {
                    container: ty,
                    block: block.name.clone(),
                    raw: raw.clone(),
                    order: self.order,
                }),
                BodyItem::Block(nested) => self.errors.push(DslError::NestedBlock {
                    block: block.name.clone(),
                    name: nested.name.clone(),
                }),
            }
        }

        // Inherited fields are only known after flattening, so derived
        // blocks are checked when they are instantiated instead.
        if block.parent.is_none() {
            for path in connects {
                let head = split_path(path).into_iter().next();
                if !head.is_some_and(|h| declared.contains(&h)) {
                    self.errors.push(DslError::UndefinedField {
                        block: block.name.clone(),
                        path: path.to_string(),
                    });
                }
            }
        }

        if let Some(parent) = &block.parent {
            state.inheritances.push(PendingInheritance {
                derived: ty,
                derived_name: block.name.clone(),
                parent: parent.clone(),
                skip: declared,
            });
        }
        debug!(block = %block.name, kind = ?block.kind, "built block");
    }
}
