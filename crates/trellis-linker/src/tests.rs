//! Unit tests for trellis-linker

use std::path::{Path, PathBuf};
use std::sync::Arc;

use trellis_core::{InstanceGraph, Instantiator, TypeGraph, IS_COMPONENT, IS_INTERFACE, IS_MODULE};

use crate::test_utils::*;
use crate::*;

fn child_names(graph: &TypeGraph, name: &str) -> Vec<String> {
    let ty = graph.get_type_by_name(name).unwrap();
    graph
        .iter_make_children(ty)
        .into_iter()
        .map(|(id, _)| id.to_string())
        .collect()
}

// ── Statements ─────────────────────────────────────────────

#[test]
fn test_statement_json_shape() {
    let text = r#"{
        "statements": [
            { "stmt": "import", "name": "Resistor" },
            { "stmt": "import", "name": "Sensor", "path": "parts/sensor.ato" },
            { "stmt": "block", "kind": "module", "name": "App", "parent": "Base", "body": [
                { "item": "new", "field": "r1", "type_name": "Resistor" },
                { "item": "connect", "lhs": "r1.p1", "rhs": "r1.p2", "name": "pull" },
                { "item": "retype", "target": "r1", "type_name": "Resistor" },
                { "item": "pass" }
            ] }
        ]
    }"#;
    let source = SourceFile::from_json(text).unwrap();
    assert_eq!(source.statements[0], Statement::import("Resistor"));
    assert_eq!(
        source.statements[1],
        Statement::import_from("parts/sensor.ato", "Sensor")
    );
    let Statement::Block(block) = &source.statements[2] else {
        panic!("expected a block");
    };
    assert_eq!(block.parent.as_deref(), Some("Base"));
    assert_eq!(block.body.len(), 4);
    assert!(matches!(
        &block.body[1],
        BodyItem::Connect { name: Some(n), directional: false, pointer: false, .. } if n == "pull"
    ));
}

// ── SkeletonBuilder ────────────────────────────────────────

#[test]
fn test_builder_records_pending_work() {
    let mut graph = TypeGraph::default();
    let source = file(vec![
        Statement::import("Resistor"),
        Statement::Block(
            module("App")
                .extends("Base")
                .with(BodyItem::new_field("r1", "Resistor"))
                .with(BodyItem::retype("r1", "Capacitor"))
                .with(BodyItem::ForLoop {
                    raw: "for r in rs: pass".to_string(),
                }),
        ),
    ]);
    let state = SkeletonBuilder::new(&mut graph)
        .build(Path::new("main.ato"), &source)
        .unwrap();

    assert_eq!(state.types.len(), 1);
    assert_eq!(state.imports.len(), 1);
    assert_eq!(state.references.len(), 2);
    assert_eq!(state.inheritances[0].parent, "Base");
    assert_eq!(state.inheritances[0].skip, vec!["r1"]);
    assert_eq!(state.retypes[0].target, vec!["r1"]);
    assert_eq!(state.for_loops.len(), 1);
    assert!(state.retypes[0].order < state.for_loops[0].order);

    let app = state.type_named("App").unwrap();
    assert!(graph.has_trait(app, IS_MODULE));
    // Children and imports stay unresolved until linking.
    assert_eq!(graph.collect_unresolved_type_references().len(), 3);
}

#[test]
fn test_builder_batches_authoring_errors() {
    let mut graph = TypeGraph::default();
    let source = file(vec![
        Statement::Block(
            module("App")
                .with(BodyItem::new_field("a", "Electrical"))
                .with(BodyItem::new_field("a", "Electrical"))
                .with(BodyItem::connect("a", "missing.p1"))
                .with(BodyItem::Block(interface("Inner"))),
        ),
        Statement::Block(module("App")),
    ]);
    let errors = SkeletonBuilder::new(&mut graph)
        .build(Path::new("main.ato"), &source)
        .unwrap_err();

    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    assert_eq!(
        messages,
        vec![
            "Field `a` is already defined in `App`",
            "Nested block `Inner` in `App` is not permitted",
            "Field `missing.p1` is not defined in `App`",
            "Block `App` is already defined",
        ]
    );
}

#[test]
fn test_builder_defers_checks_for_derived_blocks() {
    let mut graph = TypeGraph::default();
    let source = file(vec![Statement::Block(
        module("Derived").extends("Base").with(BodyItem::connect("inherited", "also_inherited")),
    )]);
    assert!(SkeletonBuilder::new(&mut graph)
        .build(Path::new("main.ato"), &source)
        .is_ok());
}

// ── Config & resolver ──────────────────────────────────────

#[test]
fn test_project_config_parsing() {
    let config = ProjectConfig::parse(
        r#"
[project]
package = "acme/widgets"

[paths]
src = "hw"
"#,
    )
    .unwrap();
    assert_eq!(config.package(), Some("acme/widgets"));
    assert_eq!(config.src_dir(), PathBuf::from("hw"));
    assert_eq!(config.modules_dir(), PathBuf::from(".ato/modules"));
}

#[test]
fn test_project_config_rejects_bad_package() {
    let err = ProjectConfig::parse("[project]\npackage = \"no-slash\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidPackage(ref p) if p == "no-slash"));
}

#[test]
fn test_config_discovery_relative_to_file() {
    let project = create_project(&[], Some("[paths]\nsrc = \"hw\"\n"));
    let config = ProjectConfig::discover(project.path()).unwrap();
    assert_eq!(config.src_dir(), project.path().join("hw"));

    let empty = tempfile::TempDir::new().unwrap();
    let fallback = ProjectConfig::discover(empty.path()).unwrap();
    assert_eq!(fallback.src_dir(), empty.path().join("src"));
}

#[test]
fn test_resolver_candidate_order() {
    let mut config = ProjectConfig::with_root(Path::new("/proj"));
    config.project.package = Some("acme/widgets".to_string());
    let mut resolver = SearchPathResolver::new(&config);
    resolver.add_search_path("/extra");
    resolver.add_search_path("/extra");

    let candidates = resolver.candidates(Some(Path::new("/proj/src/boards")), "acme/widgets/parts/r.ato");
    assert_eq!(
        candidates,
        vec![
            PathBuf::from("/proj/src/boards/acme/widgets/parts/r.ato"),
            PathBuf::from("/extra/acme/widgets/parts/r.ato"),
            PathBuf::from("/proj/src/acme/widgets/parts/r.ato"),
            PathBuf::from("/proj/.ato/modules/acme/widgets/parts/r.ato"),
            PathBuf::from("/proj/acme/widgets/parts/r.ato"),
            PathBuf::from("/proj/src/parts/r.ato"),
        ]
    );
    assert_eq!(resolver.search_paths().len(), 1);
}

// ── Stdlib ─────────────────────────────────────────────────

#[test]
fn test_stdlib_materializes_once_per_graph() {
    let stdlib = StdlibRegistry::builtin();
    let mut graph = TypeGraph::default();
    let first = stdlib.get(&mut graph, "I2C").unwrap();
    let types_after_first = graph.types().len();
    let second = stdlib.get(&mut graph, "I2C").unwrap();

    assert_eq!(first, second);
    assert_eq!(graph.types().len(), types_after_first);
    assert!(graph.has_trait(first, IS_INTERFACE));
    assert_eq!(child_names(&graph, "I2C"), vec!["scl", "sda"]);

    let mut other = TypeGraph::default();
    assert!(stdlib.get(&mut other, "I2C").is_some());
    assert!(stdlib.get(&mut other, "Transistor").is_none());
}

#[test]
fn test_stdlib_derived_definition() {
    let stdlib = StdlibRegistry::builtin();
    let mut graph = TypeGraph::default();
    let led = stdlib.get(&mut graph, "LED").unwrap();
    let diode = graph.get_type_by_name("Diode").unwrap();
    assert_eq!(graph.parent_type(led), Some(diode));
    assert_eq!(child_names(&graph, "LED"), vec!["anode", "cathode"]);
    assert!(graph.has_trait(led, IS_COMPONENT));
    assert!(graph.has_trait(led, "can_bridge"));
}

#[test]
fn test_stdlib_allowlist() {
    let stdlib = StdlibRegistry::builtin().with_allowlist(["Electrical", "Resistor"]);
    assert_eq!(stdlib.names(), vec!["Electrical", "Resistor"]);
    let mut graph = TypeGraph::default();
    assert!(stdlib.get(&mut graph, "Capacitor").is_none());
    assert!(stdlib.get(&mut graph, "Resistor").is_some());
}

// ── Linker ─────────────────────────────────────────────────

#[test]
fn test_stdlib_import_links_everything() {
    let loader = MemoryLoader::new().with(
        "main.ato",
        file(vec![
            Statement::import("Resistor"),
            Statement::Block(module("App").with(BodyItem::new_field("r", "Resistor"))),
        ]),
    );
    let compilation = compile_memory(loader, "main.ato").unwrap();
    assert!(compilation.graph.collect_unresolved_type_references().is_empty());
    assert!(compilation.graph.is_sealed());
}

#[test]
fn test_three_uses_of_one_import_share_a_type() {
    let loader = MemoryLoader::new().with(
        "main.ato",
        file(vec![
            Statement::import("Resistor"),
            Statement::import("Capacitor"),
            Statement::Block(
                module("App")
                    .with(BodyItem::new_field("r1", "Resistor"))
                    .with(BodyItem::new_field("r2", "Resistor"))
                    .with(BodyItem::new_field("r3", "Resistor"))
                    .with(BodyItem::new_field("c1", "Capacitor")),
            ),
        ]),
    );
    let compilation = compile_memory(loader, "main.ato").unwrap();
    let graph = &compilation.graph;
    let app = compilation.type_named("App").unwrap();
    let resolved = |field: &str| graph.resolve_child_path(app, &[field]).unwrap();

    assert_eq!(resolved("r1"), resolved("r2"));
    assert_eq!(resolved("r2"), resolved("r3"));
    assert_ne!(resolved("r1"), resolved("c1"));
}

#[test]
fn test_import_of_locally_declared_block() {
    for import in [
        Statement::import("Widget"),
        Statement::import_from("missing/widget.ato", "Widget"),
    ] {
        let loader = MemoryLoader::new().with(
            "main.ato",
            file(vec![
                import,
                Statement::Block(module("Widget")),
                Statement::Block(module("App").with(BodyItem::new_field("w", "Widget"))),
            ]),
        );
        let compilation = compile_memory(loader, "main.ato").unwrap();
        let app = compilation.type_named("App").unwrap();
        assert_eq!(
            compilation.graph.resolve_child_path(app, &["w"]),
            compilation.type_named("Widget")
        );
        assert!(compilation.imported.is_empty());
    }
}

#[test]
fn test_missing_import_path() {
    let loader = MemoryLoader::new().with(
        "main.ato",
        file(vec![Statement::import_from("missing/module.ato", "DoesNotExist")]),
    );
    let err = compile_memory(loader, "main.ato").unwrap_err();
    assert_eq!(err.to_string(), "Unable to resolve import `missing/module.ato`");
}

#[test]
fn test_unknown_stdlib_name() {
    let loader = MemoryLoader::new().with("main.ato", file(vec![Statement::import("FluxCapacitor")]));
    let err = compile_memory(loader, "main.ato").unwrap_err();
    assert_eq!(err.to_string(), "Unknown stdlib type: FluxCapacitor");
}

#[test]
fn test_relative_import_is_built_once() {
    let loader = MemoryLoader::new()
        .with(
            "boards/main.ato",
            file(vec![
                Statement::import_from("parts/sensor.ato", "Sensor"),
                Statement::import_from("./parts/sensor.ato", "Bridge"),
                Statement::Block(
                    module("App")
                        .with(BodyItem::new_field("s", "Sensor"))
                        .with(BodyItem::new_field("b", "Bridge")),
                ),
            ]),
        )
        .with(
            "boards/parts/sensor.ato",
            file(vec![
                Statement::import("I2C"),
                Statement::Block(component("Sensor").with(BodyItem::new_field("i2c", "I2C"))),
                Statement::Block(component("Bridge").with(BodyItem::new_field("i2c", "I2C"))),
            ]),
        );
    let compilation = compile_memory(loader, "boards/main.ato").unwrap();
    assert_eq!(compilation.imported.len(), 1);

    let graph = &compilation.graph;
    let app = compilation.type_named("App").unwrap();
    let sensor = graph.resolve_child_path(app, &["s"]).unwrap();
    let bridge = graph.resolve_child_path(app, &["b"]).unwrap();
    assert_ne!(sensor, bridge);
    assert_eq!(graph.type_identifier(sensor), "Sensor");
    // Both imported components share the one materialized I2C.
    assert_eq!(
        graph.resolve_child_path(app, &["s", "i2c"]),
        graph.resolve_child_path(app, &["b", "i2c"])
    );
}

#[test]
fn test_symbol_missing_from_imported_file() {
    let loader = MemoryLoader::new()
        .with("main.ato", file(vec![Statement::import_from("lib.ato", "Nope")]))
        .with("lib.ato", file(vec![Statement::Block(module("Other"))]));
    let err = compile_memory(loader, "main.ato").unwrap_err();
    assert_eq!(err.to_string(), "`Nope` is not defined in `lib.ato`");
}

#[test]
fn test_circular_import() {
    let loader = MemoryLoader::new()
        .with(
            "a.ato",
            file(vec![
                Statement::import_from("b.ato", "B"),
                Statement::Block(module("A")),
            ]),
        )
        .with(
            "b.ato",
            file(vec![
                Statement::import_from("a.ato", "A"),
                Statement::Block(module("B")),
            ]),
        );
    let err = compile_memory(loader, "a.ato").unwrap_err();
    assert_eq!(err.to_string(), "Circular import detected at `a.ato`");
}

#[test]
fn test_unresolved_names_are_reported() {
    let loader = MemoryLoader::new().with(
        "main.ato",
        file(vec![Statement::Block(
            module("App").with(BodyItem::new_field("mcu", "Mystery")),
        )]),
    );
    let err = compile_memory(loader, "main.ato").unwrap_err();
    assert!(matches!(
        err,
        CompileError::Link(LinkError::UnresolvedTypeReferences(ref refs)) if refs == &vec!["App.mcu -> Mystery".to_string()]
    ));
}

#[test]
fn test_package_import_from_disk() {
    let project = create_project(
        &[
            (
                "src/main.ato",
                file(vec![
                    Statement::import_from("acme/widgets/parts/led_bar.ato", "LedBar"),
                    Statement::Block(module("App").with(BodyItem::new_field("bar", "LedBar"))),
                ]),
            ),
            (
                "src/parts/led_bar.ato",
                file(vec![
                    Statement::import("LED"),
                    Statement::Block(
                        module("LedBar")
                            .with(BodyItem::new_field("d1", "LED"))
                            .with(BodyItem::new_field("d2", "LED"))
                            .with(BodyItem::connect("d1.cathode", "d2.anode")),
                    ),
                ]),
            ),
        ],
        Some("[project]\npackage = \"acme/widgets\"\n"),
    );
    let config = ProjectConfig::discover(project.path()).unwrap();
    let loader = Arc::new(FsLoader::new());
    let compiler = Compiler::new(
        loader.clone(),
        Arc::new(StdlibRegistry::builtin()),
        SearchPathResolver::new(&config),
    );
    let compilation = compiler.compile(&config.src_dir().join("main.ato")).unwrap();
    assert_eq!(loader.cached(), 2);

    let mut instances = InstanceGraph::new();
    let app = compilation.type_named("App").unwrap();
    let root = Instantiator::new(&compilation.graph)
        .instantiate(&mut instances, app)
        .unwrap();
    let cathode = instances.descendant(root, &["bar", "d1", "cathode"]).unwrap();
    let anode = instances.descendant(root, &["bar", "d2", "anode"]).unwrap();
    assert!(instances.is_connected(cathode, anode));
}

// ── DeferredExecutor ───────────────────────────────────────

#[test]
fn test_inheritance_identifier_set() {
    let loader = MemoryLoader::new().with(
        "main.ato",
        file(vec![
            Statement::Block(
                module("Base")
                    .with(BodyItem::new_field("a", "Electrical"))
                    .with(BodyItem::new_field("b", "Electrical"))
                    .with(BodyItem::connect("a", "b")),
            ),
            Statement::Block(
                module("Middle")
                    .extends("Base")
                    .with(BodyItem::new_field("b", "Resistor"))
                    .with(BodyItem::new_field("c", "Electrical")),
            ),
            Statement::Block(
                module("Leaf")
                    .extends("Middle")
                    .with(BodyItem::new_field("d", "Electrical")),
            ),
        ]),
    );
    let compilation = compile_memory(loader, "main.ato").unwrap();
    let graph = &compilation.graph;
    assert_eq!(child_names(graph, "Middle"), vec!["b", "c", "a"]);
    assert_eq!(child_names(graph, "Leaf"), vec!["d", "b", "c", "a"]);

    let leaf = compilation.type_named("Leaf").unwrap();
    let resistor = graph.get_type_by_name("Resistor").unwrap();
    assert_eq!(graph.resolve_child_path(leaf, &["b"]), Some(resistor));
    assert_eq!(graph.iter_make_links(leaf).len(), 1);
    let base = compilation.type_named("Base").unwrap();
    assert_eq!(graph.type_lineage(leaf).first(), Some(&base));
}

#[test]
fn test_circular_inheritance() {
    let loader = MemoryLoader::new().with(
        "main.ato",
        file(vec![
            Statement::Block(module("A").extends("B")),
            Statement::Block(module("B").extends("A")),
        ]),
    );
    let err = compile_memory(loader, "main.ato").unwrap_err();
    assert!(err.to_string().contains("Circular inheritance detected"));
}

#[test]
fn test_missing_parent() {
    let loader = MemoryLoader::new().with(
        "main.ato",
        file(vec![Statement::Block(module("App").extends("Ghost"))]),
    );
    let err = compile_memory(loader, "main.ato").unwrap_err();
    assert_eq!(err.to_string(), "Parent type `Ghost` not found for `App`");
}

#[test]
fn test_inherit_from_stdlib_and_import() {
    let loader = MemoryLoader::new()
        .with(
            "main.ato",
            file(vec![
                Statement::import_from("lib.ato", "Board"),
                Statement::Block(component("MyResistor").extends("Resistor")),
                Statement::Block(module("MyBoard").extends("Board")),
            ]),
        )
        .with(
            "lib.ato",
            file(vec![Statement::Block(
                module("Board").with(BodyItem::new_field("power", "ElectricPower")),
            )]),
        );
    let compilation = compile_memory(loader, "main.ato").unwrap();
    let graph = &compilation.graph;
    assert_eq!(child_names(graph, "MyResistor"), vec!["p1", "p2"]);
    assert_eq!(child_names(graph, "MyBoard"), vec!["power"]);
}

#[test]
fn test_later_retype_wins() {
    let loader = MemoryLoader::new().with(
        "main.ato",
        file(vec![Statement::Block(
            module("App")
                .with(BodyItem::new_field("r", "Resistor"))
                .with(BodyItem::new_field("c", "Capacitor"))
                .with(BodyItem::retype("r", "Inductor"))
                .with(BodyItem::retype("r", "Diode")),
        )]),
    );
    let compilation = compile_memory(loader, "main.ato").unwrap();
    let graph = &compilation.graph;
    let app = compilation.type_named("App").unwrap();
    let r = graph.resolve_child_path(app, &["r"]).unwrap();
    let c = graph.resolve_child_path(app, &["c"]).unwrap();
    assert_eq!(graph.type_identifier(r), "Diode");
    assert_eq!(graph.type_identifier(c), "Capacitor");
}

#[test]
fn test_retype_errors() {
    let loader = MemoryLoader::new().with(
        "main.ato",
        file(vec![Statement::Block(
            module("App")
                .with(BodyItem::new_field("r", "Resistor"))
                .with(BodyItem::retype("x.y", "Resistor")),
        )]),
    );
    let err = compile_memory(loader, "main.ato").unwrap_err();
    assert_eq!(err.to_string(), "Cannot resolve path `x` for retyping");

    let loader = MemoryLoader::new().with(
        "main.ato",
        file(vec![Statement::Block(
            module("App")
                .with(BodyItem::new_field("r", "Resistor"))
                .with(BodyItem::retype("r.p3", "Electrical")),
        )]),
    );
    let err = compile_memory(loader, "main.ato").unwrap_err();
    assert_eq!(err.to_string(), "Cannot retype `r.p3`: field does not exist");
}

#[test]
fn test_retype_requires_linked_target() {
    let mut graph = TypeGraph::default();
    let source = file(vec![Statement::Block(
        module("App")
            .with(BodyItem::new_field("r", "Resistor"))
            .with(BodyItem::retype("r", "Capacitor")),
    )]);
    let state = SkeletonBuilder::new(&mut graph)
        .build(Path::new("main.ato"), &source)
        .unwrap();
    // Link only the child, not the retype target.
    let resistor = StdlibRegistry::builtin().get(&mut graph, "Resistor").unwrap();
    graph.link_type_reference(state.references[0].reference, resistor);

    let stdlib = StdlibRegistry::builtin();
    let err = DeferredExecutor::new(&stdlib)
        .execute(&mut graph, &[&state])
        .unwrap_err();
    assert_eq!(err.to_string(), "Cannot retype to `Capacitor`: type not linked");
}

struct CountingExpander(std::cell::Cell<usize>);

impl ForLoopExpander for CountingExpander {
    fn expand(&self, graph: &mut TypeGraph, pending: &PendingForLoop) -> Result<(), DslError> {
        // Retypes have already landed when loops run.
        let r = graph.resolve_child_path(pending.container, &["r"]).unwrap();
        assert_eq!(graph.type_identifier(r), "Capacitor");
        self.0.set(self.0.get() + 1);
        Ok(())
    }
}

#[test]
fn test_for_loops_run_after_retypes() {
    let mut graph = TypeGraph::default();
    let source = file(vec![Statement::Block(
        module("App")
            .with(BodyItem::new_field("r", "Resistor"))
            .with(BodyItem::ForLoop {
                raw: "for x in r: pass".to_string(),
            })
            .with(BodyItem::retype("r", "Capacitor")),
    )]);
    let state = SkeletonBuilder::new(&mut graph)
        .build(Path::new("main.ato"), &source)
        .unwrap();
    let stdlib = Arc::new(StdlibRegistry::builtin());
    let mut linker = Linker::new(
        Arc::new(MemoryLoader::new()),
        SearchPathResolver::default(),
        Arc::clone(&stdlib),
    );
    linker.link_imports(&mut graph, &state).unwrap();

    let expander = CountingExpander(std::cell::Cell::new(0));
    DeferredExecutor::new(&stdlib)
        .with_expander(&expander)
        .execute(&mut graph, &[&state])
        .unwrap();
    assert_eq!(expander.0.get(), 1);
}

impl ForLoopExpander for &CountingExpander {
    fn expand(&self, graph: &mut TypeGraph, pending: &PendingForLoop) -> Result<(), DslError> {
        (**self).expand(graph, pending)
    }
}

#[test]
fn test_render_flattened_type() {
    let loader = MemoryLoader::new().with(
        "main.ato",
        file(vec![
            Statement::Block(
                module("Base")
                    .with(BodyItem::new_field("power", "ElectricPower"))
                    .with(BodyItem::Trait {
                        name: "has_datasheet".to_string(),
                    }),
            ),
            Statement::Block(
                module("App")
                    .extends("Base")
                    .with(BodyItem::new_field("r", "Resistor"))
                    .with(BodyItem::connect("r.p1", "power.hv")),
            ),
        ]),
    );
    let compilation = compile_memory(loader, "main.ato").unwrap();
    let app = compilation.type_named("App").unwrap();
    insta::assert_snapshot!(compilation.graph.render_type(app), @r"
    App (extends Base)
      r: Resistor
      power: ElectricPower
      link r.p1 ~ power.hv [connection]
      trait is_module
      trait has_datasheet
    ");
}
