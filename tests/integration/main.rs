//! Integration tests for Trellis
//!
//! These tests drive statement dumps on disk through compilation,
//! instantiation, binding and path search.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use tempfile::TempDir;
use trellis_core::{AttrValue, InstanceNode};
use trellis_linker::{
    BlockDef, BlockKind, BodyItem, Compilation, CompileError, Compiler, FsLoader, ProjectConfig,
    SearchPathResolver, SourceFile, Statement, StdlibRegistry,
};
use trellis_runtime::{HookRegistry, ModuleTree, Runtime};

fn module(name: &str) -> BlockDef {
    BlockDef::new(BlockKind::Module, name)
}

/// Write `<path>.json` dumps under a fresh project root.
fn project(files: &[(&str, SourceFile)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, source) in files {
        let target = dir.path().join(format!("{path}.json"));
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, serde_json::to_string(source).unwrap()).unwrap();
    }
    dir
}

fn compile(root: &Path, entry: &str) -> Result<Compilation, CompileError> {
    let compiler = Compiler::new(
        Arc::new(FsLoader::new()),
        Arc::new(StdlibRegistry::builtin()),
        SearchPathResolver::new(&ProjectConfig::with_root(root)),
    );
    compiler.compile(&root.join(entry))
}

fn divider() -> SourceFile {
    SourceFile::new(vec![
        Statement::import("Resistor"),
        Statement::import("ElectricPower"),
        Statement::Block(
            module("Divider")
                .with(BodyItem::new_field("power", "ElectricPower"))
                .with(BodyItem::new_field("r_top", "Resistor"))
                .with(BodyItem::new_field("r_bottom", "Resistor"))
                .with(BodyItem::connect("power.hv", "r_top.p1"))
                .with(BodyItem::connect("r_top.p2", "r_bottom.p1"))
                .with(BodyItem::connect("r_bottom.p2", "power.lv")),
        ),
    ])
}

fn bound(compilation: Compilation, root: &str, hooks: HookRegistry) -> (Runtime, InstanceNode) {
    let mut runtime = Runtime::new(compilation.graph).with_hooks(hooks);
    let instance = runtime.instantiate_by_name(root).unwrap();
    runtime.bind_instance_hierarchy(instance);
    runtime.execute_runtime_functions(instance).unwrap();
    (runtime, instance)
}

#[test]
fn test_stdlib_import_leaves_nothing_unresolved() {
    let dir = project(&[(
        "main.ato",
        SourceFile::new(vec![
            Statement::import("Resistor"),
            Statement::Block(module("App").with(BodyItem::new_field("r", "Resistor"))),
        ]),
    )]);
    let compilation = compile(dir.path(), "main.ato").unwrap();
    assert!(compilation.graph.collect_unresolved_type_references().is_empty());
}

#[test]
fn test_missing_import_is_reported_with_its_path() {
    let dir = project(&[(
        "main.ato",
        SourceFile::new(vec![Statement::import_from("missing/module.ato", "DoesNotExist")]),
    )]);
    let err = compile(dir.path(), "main.ato").unwrap_err();
    assert_eq!(err.to_string(), "Unable to resolve import `missing/module.ato`");
}

#[test]
fn test_circular_inheritance_is_rejected() {
    let dir = project(&[(
        "main.ato",
        SourceFile::new(vec![
            Statement::Block(module("A").extends("B")),
            Statement::Block(module("B").extends("A")),
        ]),
    )]);
    let err = compile(dir.path(), "main.ato").unwrap_err();
    assert!(err.to_string().contains("Circular inheritance detected"));
}

#[test]
fn test_imported_module_pipeline() {
    let dir = project(&[
        ("parts/divider.ato", divider()),
        (
            "main.ato",
            SourceFile::new(vec![
                Statement::import_from("parts/divider.ato", "Divider"),
                Statement::Block(
                    module("App")
                        .with(BodyItem::new_field("d1", "Divider"))
                        .with(BodyItem::new_field("d2", "Divider"))
                        .with(BodyItem::connect("d1.power.hv", "d2.power.hv")),
                ),
            ]),
        ),
    ]);
    let compilation = compile(dir.path(), "main.ato").unwrap();
    assert_eq!(compilation.imported.len(), 1);
    let app = compilation.type_named("App").unwrap();
    let d1 = compilation.graph.resolve_child_path(app, &["d1"]).unwrap();
    let d2 = compilation.graph.resolve_child_path(app, &["d2"]).unwrap();
    assert_eq!(d1, d2);

    let hooks = HookRegistry::new().with("Resistor", "footprint", |_| Ok(AttrValue::from("R0402")));
    let (runtime, root) = bound(compilation, "App", hooks);
    let instances = runtime.instances();
    let top = instances.descendant(root, &["d1", "r_top"]).unwrap();
    assert_eq!(runtime.field(top, "footprint"), Some(&AttrValue::from("R0402")));

    let start = instances.descendant(root, &["d2", "power", "hv"]).unwrap();
    let end = instances.descendant(root, &["d1", "r_top", "p1"]).unwrap();
    let (paths, _) = runtime.find_paths(start, &[end]).unwrap();
    assert_eq!(paths.len(), 1);
    let names: Vec<String> = paths[0]
        .nodes
        .iter()
        .map(|n| instances.full_name(*n))
        .collect();
    assert_eq!(names, vec!["App.d2.power.hv", "App.d1.power.hv", "App.d1.r_top.p1"]);
}

#[test]
fn test_instantiating_twice_gives_disjoint_isomorphic_trees() {
    let dir = project(&[("divider.ato", divider())]);
    let compilation = compile(dir.path(), "divider.ato").unwrap();
    let mut runtime = Runtime::new(compilation.graph);
    let first = runtime.instantiate_by_name("Divider").unwrap();
    let second = runtime.instantiate_by_name("Divider").unwrap();

    let instances = runtime.instances();
    assert_eq!(instances.dump(first, runtime.types()), instances.dump(second, runtime.types()));
    let a = instances.subtree(first);
    let b = instances.subtree(second);
    assert_eq!(a.len(), b.len());
    assert!(a.iter().all(|n| !b.contains(n)));
}

#[test]
fn test_later_retype_changes_only_its_target() {
    let dir = project(&[(
        "main.ato",
        SourceFile::new(vec![Statement::Block(
            module("App")
                .with(BodyItem::new_field("a", "Resistor"))
                .with(BodyItem::new_field("b", "Resistor"))
                .with(BodyItem::retype("a", "Capacitor"))
                .with(BodyItem::retype("a", "Inductor")),
        )]),
    )]);
    let compilation = compile(dir.path(), "main.ato").unwrap();
    let graph = &compilation.graph;
    let app = compilation.type_named("App").unwrap();
    let a = graph.resolve_child_path(app, &["a"]).unwrap();
    let b = graph.resolve_child_path(app, &["b"]).unwrap();
    assert_eq!(graph.type_identifier(a), "Inductor");
    assert_eq!(graph.type_identifier(b), "Resistor");
}

#[test]
fn test_module_tree_closed_world() {
    let mut tree = ModuleTree::new();
    let board = tree.add_root("board", "Board", BlockKind::Module);
    let inner = tree.add_child(board, "vcc", "Electrical", BlockKind::Interface);
    let loose = tree.add_root("loose", "Loose", BlockKind::Module);
    let outer = tree.add_child(loose, "vcc", "Electrical", BlockKind::Interface);
    tree.connect(inner, outer);

    let err = tree.instantiate(board, HookRegistry::new()).unwrap_err();
    assert!(err.to_string().contains("not part of the module tree"));
}

#[test]
fn test_cli_lists_stdlib() {
    let output = Command::new(env!("CARGO_BIN_EXE_trellis"))
        .arg("stdlib")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Resistor"));
    assert!(stdout.contains("LED"));
}

#[test]
fn test_cli_build_dumps_instance_tree() {
    let dir = project(&[("divider.ato", divider())]);
    let output = Command::new(env!("CARGO_BIN_EXE_trellis"))
        .current_dir(dir.path())
        .args(["build", "divider.ato", "--root", "Divider", "--dump"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let dump: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(dump["type"], "Divider");
    assert_eq!(dump["children"]["r_top"]["type"], "Resistor");
}

#[test]
fn test_cli_build_fails_on_missing_import() {
    let dir = project(&[(
        "main.ato",
        SourceFile::new(vec![Statement::import_from("missing/module.ato", "DoesNotExist")]),
    )]);
    let output = Command::new(env!("CARGO_BIN_EXE_trellis"))
        .current_dir(dir.path())
        .args(["build", "main.ato"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unable to resolve import"));
}
