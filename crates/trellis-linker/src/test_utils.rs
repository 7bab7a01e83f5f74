//! Test utilities for trellis-linker

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use crate::*;

pub fn module(name: &str) -> BlockDef {
    BlockDef::new(BlockKind::Module, name)
}

pub fn component(name: &str) -> BlockDef {
    BlockDef::new(BlockKind::Component, name)
}

pub fn interface(name: &str) -> BlockDef {
    BlockDef::new(BlockKind::Interface, name)
}

pub fn file(statements: Vec<Statement>) -> SourceFile {
    SourceFile::new(statements)
}

/// Compile `entry` out of in-memory sources with the default stdlib.
pub fn compile_memory(loader: MemoryLoader, entry: &str) -> Result<Compilation, CompileError> {
    let compiler = Compiler::new(
        Arc::new(loader),
        Arc::new(StdlibRegistry::builtin()),
        SearchPathResolver::default(),
    );
    compiler.compile(Path::new(entry))
}

/// Write statement dumps as `<path>.json` under a temporary project root.
pub fn create_project(files: &[(&str, SourceFile)], config: Option<&str>) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    for (path, source) in files {
        let target = root.join(format!("{path}{}", source::DUMP_SUFFIX));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&target, serde_json::to_string_pretty(source).unwrap()).unwrap();
    }
    if let Some(config) = config {
        fs::write(root.join(CONFIG_FILE), config).unwrap();
    }
    temp_dir
}
