//! Trellis CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Compile hardware description statement dumps into instance graphs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, link and flatten entry files
    Build {
        /// Entry files, built in parallel
        #[arg(required = true)]
        entries: Vec<PathBuf>,

        /// Type to instantiate from every entry
        #[arg(long)]
        root: Option<String>,

        /// Extra import search directory (repeatable)
        #[arg(long = "search-path")]
        search_paths: Vec<PathBuf>,

        /// Project config file (defaults to trellis.toml in the working directory)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the flattened types, or the instance tree with --root, as JSON
        #[arg(long)]
        dump: bool,
    },
    /// Search connectivity paths between two interfaces
    Paths {
        /// Entry file
        entry: PathBuf,

        /// Type to instantiate
        #[arg(long)]
        root: String,

        /// Dotted path of the start interface below the root
        #[arg(long)]
        from: String,

        /// Dotted path of a destination interface (repeatable)
        #[arg(long, required = true)]
        to: Vec<String>,

        /// Extra import search directory (repeatable)
        #[arg(long = "search-path")]
        search_paths: Vec<PathBuf>,

        /// Project config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List the built-in types
    Stdlib,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("trellis={}", log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Trellis v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Build {
            entries,
            root,
            search_paths,
            config,
            dump,
        } => commands::build(entries, root, search_paths, config, dump),
        Commands::Paths {
            entry,
            root,
            from,
            to,
            search_paths,
            config,
        } => commands::paths(entry, root, from, to, search_paths, config),
        Commands::Stdlib => commands::stdlib(),
    }
}
