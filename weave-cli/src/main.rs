//! weave CLI - Command-line interface for the code relationship graph
//!
//! Extracts classes, methods, pages, stored procedures and tables from
//! C#, ASPX and SQL sources, links them into a graph and recognizes
//! recurring implementation patterns.

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use weave_core::WeaveConfig;

mod commands;
mod output;

use commands::*;
use output::OutputFormat;

/// Code relationship graph for C#, ASPX and SQL codebases.
#[derive(Parser)]
#[command(name = "weave")]
#[command(author, version)]
#[command(about = "Code relationship graph for C#, ASPX and SQL codebases")]
#[command(propagate_version = true)]
#[command(after_help = "Quick Start:
  weave analyze .                     Build the graph from the current directory
  weave summary                       Node and relationship counts
  weave patterns database_crud        CRUD patterns grouped by entity
  weave export --output graph.json    Write the full graph document

Raw operations:
  weave call find_patterns_by_type --args '{\"pattern_type\": \"aspx_page\"}'")]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, value_enum)]
    format: Option<OutputFormat>,

    /// Project directory holding .weaverc.toml and the graph database
    #[arg(long, global = true, default_value = ".", env = "WEAVE_CONFIG_DIR")]
    config_dir: PathBuf,

    /// Fail on .weaverc.toml errors instead of silently using defaults
    #[arg(long, global = true)]
    strict: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze files or directories into the graph
    #[command(visible_alias = "a")]
    Analyze {
        /// Files or directories to analyze
        #[arg(required = true)]
        paths: Vec<String>,

        /// Keep the graph in memory only for this run
        #[arg(long)]
        no_persist: bool,
    },

    /// Show node and relationship type counts
    #[command(visible_alias = "s")]
    Summary,

    /// List recognized patterns of one type
    #[command(visible_alias = "p")]
    Patterns {
        /// Pattern type, e.g. database_crud or aspx_page
        pattern_type: String,
    },

    /// Export the graph as JSON
    Export {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Invoke a named engine operation
    Call {
        /// Operation name, e.g. get_node_types_summary
        operation: String,

        /// Arguments as a JSON object
        #[arg(long)]
        args: Option<String>,
    },
}

fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<WeaveConfig> {
    if cli.strict {
        Ok(WeaveConfig::load_strict(&cli.config_dir)?)
    } else {
        Ok(WeaveConfig::load(&cli.config_dir))
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let command = match &cli.command {
        Some(cmd) => cmd,
        None => {
            let _ = Cli::command().print_help();
            println!();
            return Ok(());
        }
    };

    let config = load_config(&cli)?;
    let format = cli.format.unwrap_or_default();
    let root = cli.config_dir.as_path();

    match command {
        Commands::Analyze { paths, no_persist } => {
            analyze::run(root, config, paths, *no_persist, format)
        }
        Commands::Summary => summary::run(root, config, format),
        Commands::Patterns { pattern_type } => patterns::run(root, config, pattern_type, format),
        Commands::Export { output } => export::run(root, config, output.as_deref(), format),
        Commands::Call { operation, args } => {
            call::run(root, config, operation, args.as_deref(), format)
        }
    }
}
