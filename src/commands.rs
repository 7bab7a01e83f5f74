//! CLI command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use rayon::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};
use trellis_core::InstanceNode;
use trellis_linker::{Compilation, Compiler, FsLoader, ProjectConfig, SearchPathResolver, StdlibRegistry, CONFIG_FILE};
use trellis_pathfinder::{render_counters, PathfinderConfig};
use trellis_runtime::Runtime;

/// `trellis.toml` tables beyond the ones the linker reads.
#[derive(Debug, Default, Deserialize)]
struct ToolSettings {
    #[serde(default)]
    pathfinder: PathfinderConfig,
}

struct Settings {
    project: ProjectConfig,
    pathfinder: PathfinderConfig,
}

fn load_settings(config: Option<PathBuf>) -> anyhow::Result<Settings> {
    let path = config.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    if !path.is_file() {
        tracing::debug!("No {} found, using defaults", path.display());
        return Ok(Settings {
            project: ProjectConfig::with_root(Path::new(".")),
            pathfinder: PathfinderConfig::default().with_env_overrides(),
        });
    }
    let project = ProjectConfig::load(&path)
        .with_context(|| format!("Failed to load project config {}", path.display()))?;
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let tool: ToolSettings = toml::from_str(&text)
        .with_context(|| format!("Invalid [pathfinder] table in {}", path.display()))?;
    Ok(Settings {
        project,
        pathfinder: tool.pathfinder.with_env_overrides(),
    })
}

fn compiler(project: &ProjectConfig, search_paths: Vec<PathBuf>) -> Compiler {
    let mut resolver = SearchPathResolver::new(project);
    for dir in search_paths {
        resolver.add_search_path(dir);
    }
    Compiler::new(
        Arc::new(FsLoader::new()),
        Arc::new(StdlibRegistry::builtin()),
        resolver,
    )
}

fn materialize(compilation: Compilation, root: &str) -> anyhow::Result<(Runtime, InstanceNode)> {
    let mut runtime = Runtime::new(compilation.graph);
    let instance = runtime
        .instantiate_by_name(root)
        .with_context(|| format!("Failed to instantiate `{}`", root))?;
    runtime.bind_instance_hierarchy(instance);
    runtime.execute_runtime_functions(instance)?;
    Ok((runtime, instance))
}

pub fn build(
    entries: Vec<PathBuf>,
    root: Option<String>,
    search_paths: Vec<PathBuf>,
    config: Option<PathBuf>,
    dump: bool,
) -> anyhow::Result<()> {
    let settings = load_settings(config)?;
    let compiler = compiler(&settings.project, search_paths);

    let results: Vec<(PathBuf, anyhow::Result<Value>)> = entries
        .into_par_iter()
        .map(|entry| {
            let result = build_one(&compiler, &entry, root.as_deref());
            (entry, result)
        })
        .collect();

    let mut failed = 0usize;
    for (entry, result) in results {
        match result {
            Ok(value) => {
                tracing::info!("Built {}", entry.display());
                if dump {
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
            }
            Err(e) => {
                failed += 1;
                tracing::error!("{}: {:#}", entry.display(), e);
            }
        }
    }
    if failed > 0 {
        bail!("{} entr{} failed to build", failed, if failed == 1 { "y" } else { "ies" });
    }
    Ok(())
}

fn build_one(compiler: &Compiler, entry: &Path, root: Option<&str>) -> anyhow::Result<Value> {
    let compilation = compiler
        .compile(entry)
        .with_context(|| format!("Failed to compile {}", entry.display()))?;
    match root {
        Some(root) => {
            let (runtime, instance) = materialize(compilation, root)?;
            tracing::info!(
                "Instantiated {} ({} nodes)",
                root,
                runtime.instances().subtree(instance).len()
            );
            Ok(runtime.dump(instance))
        }
        None => {
            let types: Vec<Value> = compilation
                .entry
                .types
                .iter()
                .map(|(_, ty)| json!(compilation.graph.summarize(*ty)))
                .collect();
            Ok(json!({ "entry": entry.display().to_string(), "types": types }))
        }
    }
}

pub fn paths(
    entry: PathBuf,
    root: String,
    from: String,
    to: Vec<String>,
    search_paths: Vec<PathBuf>,
    config: Option<PathBuf>,
) -> anyhow::Result<()> {
    let settings = load_settings(config)?;
    let compiler = compiler(&settings.project, search_paths);
    let compilation = compiler
        .compile(&entry)
        .with_context(|| format!("Failed to compile {}", entry.display()))?;
    let (runtime, instance) = materialize(compilation, &root)?;
    let runtime = runtime.with_pathfinder(settings.pathfinder);

    let lookup = |dotted: &str| -> anyhow::Result<InstanceNode> {
        let segments: Vec<&str> = dotted.split('.').filter(|s| !s.is_empty()).collect();
        runtime
            .instances()
            .descendant(instance, &segments)
            .ok_or_else(|| anyhow!("`{}` has no node `{}`", root, dotted))
    };
    let src = lookup(from.as_str())?;
    let destinations = to
        .iter()
        .map(|d| lookup(d.as_str()))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let (found, counters) = runtime.find_paths(src, &destinations)?;
    for path in &found {
        let names: Vec<String> = path
            .nodes
            .iter()
            .map(|n| runtime.instances().full_name(*n))
            .collect();
        println!("{:.3}  {}", path.confidence, names.join(" ~ "));
    }
    tracing::info!("{} path(s) found", found.len());
    tracing::debug!("\n{}", render_counters(&counters));
    Ok(())
}

pub fn stdlib() -> anyhow::Result<()> {
    let registry = StdlibRegistry::builtin();
    for name in registry.names() {
        let Some(definition) = registry.definition(name) else {
            continue;
        };
        let mut line = format!("{:<14} {:?}", definition.name, definition.kind);
        if let Some(parent) = &definition.parent {
            line.push_str(&format!(" extends {}", parent));
        }
        let children: Vec<String> = definition
            .children
            .iter()
            .map(|(id, ty)| format!("{}: {}", id, ty))
            .collect();
        if !children.is_empty() {
            line.push_str(&format!(" [{}]", children.join(", ")));
        }
        println!("{}", line);
    }
    Ok(())
}
