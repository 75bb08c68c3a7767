//! Bindle - a declarative asset-bundling pipeline
//!
//! Reads a bindle.toml describing entries, module resolution rules,
//! per-file-kind transform chains, and output templates; resolves the
//! module graph, runs the transform chains, and emits content-addressed
//! artifacts plus an HTML entry document and a manifest.
//!
//! # Features
//! - Deterministic module resolution with configurable roots and extensions
//! - Code splitting at dynamic-import boundaries
//! - Data-driven transform chains with pre/primary phases
//! - Size-threshold asset inlining
//! - Plugin hooks for source substitution, module replacement, and copying

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bindle_lib::Cli;

/// Initialize the logging/tracing system
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("bindle=debug,bindle_lib=debug"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("bindle=info,bindle_lib=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    cli.execute().await
}
