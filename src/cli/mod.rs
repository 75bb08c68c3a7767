//! Command-line interface for Bindle
//!
//! Provides the main CLI structure using clap with a `build` subcommand
//! that runs one bundling pipeline invocation.

mod build;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

pub use build::BuildCommand;

/// Bindle - a declarative asset-bundling pipeline
#[derive(Parser, Debug)]
#[command(name = "bindle")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to bindle.toml config file
    #[arg(short, long, global = true, default_value = "bindle.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the project
    Build(BuildCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        print_banner();

        match &self.command {
            Commands::Build(cmd) => cmd.execute(&self.config).await,
        }
    }
}

/// Print the Bindle banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "📦".cyan(),
        "Bindle".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
