// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! strata - layered symbol loader for host processes
//!
//! Assembles the host's primary archive, the loader's support code and any
//! auxiliary archives from the extension directory into one namespace, then
//! loads the host's entry symbol on a dedicated thread.

mod startup;

use anyhow::Context;
use clap::Parser;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;
use strata_loader::{LoaderConfig, Symbol, SymbolLoadPipeline, VERSION};
use tracing::{info, warn};

use crate::startup::StartupPlan;

#[derive(Parser)]
#[command(
    name = "strata",
    about = "Layered symbol loader for host processes",
    version = VERSION,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    /// Primary archive of the host
    #[arg(long)]
    primary: Option<PathBuf>,

    /// Loader support code (directory or archive); defaults to the
    /// directory holding this executable
    #[arg(long)]
    support: Option<PathBuf>,

    /// Directory of auxiliary archives registered before the host starts
    #[arg(long, default_value = "earlyplugins")]
    extensions: PathBuf,

    /// Search path of the fallback loader
    #[arg(long, value_delimiter = ',')]
    classpath: Vec<PathBuf>,

    /// Loader configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Entry symbol; defaults to the primary archive's Entry-Symbol
    #[arg(long)]
    entry: Option<String>,

    /// Read every origin's descriptor up front
    #[arg(long)]
    prewarm: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Arguments passed to the host
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("strata=debug,strata_loader=debug")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("strata=info,strata_loader=warn")
            .init();
    }

    let config = LoaderConfig::load(config_path(&cli).as_deref())?;

    let primary = startup::locate_primary(cli.primary.as_deref(), &cli.args)?;
    let host_args = startup::strip_args(&cli.args, &primary);
    println!("{} {}", "Using primary archive:".white().bold(), primary.display());

    let plan = StartupPlan {
        extensions: startup::collect_extensions(&cli.extensions)?,
        primary,
        support: cli.support.clone().or_else(startup::default_support),
        classpath: cli.classpath.clone(),
    };
    let pipeline = startup::assemble(&plan, config)?;

    if cli.prewarm {
        let described = startup::prewarm(&pipeline);
        info!("Prewarmed descriptors, {} origin(s) carry one", described);
    }

    let configs = startup::transform_configs(&pipeline);
    info!("Found {} transform config(s)", configs.len());
    for (name, origin) in &configs {
        info!("  - {} ({})", name, origin.display());
    }

    startup::install_passthrough(&pipeline)?;

    let entry = startup::entry_symbol(&pipeline, cli.entry.as_deref(), &plan.primary)?;
    info!("Starting host at {}", entry);
    let symbol = run_host(pipeline.clone(), entry)?;

    print_summary(&pipeline, &symbol, &host_args);
    Ok(())
}

/// Configuration file: `--config`, else the user's config directory
fn config_path(cli: &Cli) -> Option<PathBuf> {
    if let Some(path) = &cli.config {
        return Some(path.clone());
    }
    let default = dirs::config_dir()?.join("strata").join("loader.toml");
    default.is_file().then_some(default)
}

/// Load the entry symbol on the host thread
fn run_host(pipeline: Arc<SymbolLoadPipeline>, entry: String) -> anyhow::Result<Arc<Symbol>> {
    let handle = std::thread::Builder::new()
        .name("strata-host".to_string())
        .spawn(move || pipeline.load(&entry))
        .context("Spawning the host thread")?;

    match handle.join() {
        Ok(result) => Ok(result?),
        Err(_) => {
            warn!("Host thread panicked");
            anyhow::bail!("Host thread panicked")
        }
    }
}

fn print_summary(pipeline: &SymbolLoadPipeline, symbol: &Symbol, host_args: &[String]) {
    println!();
    println!("{} {}", "Entry:".white().bold(), symbol.name().bright_cyan());
    println!("  {:14} {:?}", "defined by".dimmed(), symbol.defined_by());
    println!("  {:14} {} bytes", "size".dimmed(), symbol.bytes().len());
    if let Some(source) = symbol.code_source() {
        println!("  {:14} {}", "code source".dimmed(), source.display());
    }
    if !symbol.signers().is_empty() {
        println!("  {:14} {}", "signed by".dimmed(), symbol.signers().join(", ").green());
    }
    println!(
        "  {:14} {}",
        "namespaces".dimmed(),
        pipeline.defined_namespaces().join(", ")
    );
    println!(
        "  {:14} {}",
        "origins".dimmed(),
        pipeline.registry().len().yellow()
    );
    if !host_args.is_empty() {
        println!("  {:14} {}", "host args".dimmed(), host_args.join(" "));
    }
}
