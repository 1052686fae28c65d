//! tree-inspect: print the document tree built from a JSON fixture.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tree_core::TreeConfig;
use tree_inspect::{View, inspect, load_fixture};

#[derive(Parser, Debug)]
#[command(name = "tree-inspect")]
#[command(about = "Inspect a folder/document tree fixture")]
struct Args {
    /// Path to the fixture JSON file
    #[arg(short, long)]
    input: PathBuf,

    /// What to print
    #[arg(short, long, value_enum, default_value_t = View::Tree)]
    show: View,

    /// Folder id to start from (stats view only)
    #[arg(long)]
    folder: Option<String>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Respects RUST_LOG, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,tree_core=debug,tree_inspect=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = TreeConfig::from_env().context("invalid tree configuration")?;
    info!("Loading fixture: {:?}", args.input);
    let fixture = load_fixture(&args.input)?;

    let output = inspect(fixture, &config, args.show, args.folder.as_deref())?;
    print!("{output}");
    Ok(())
}
