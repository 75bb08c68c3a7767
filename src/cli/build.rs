//! Build command implementation

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::info;

use crate::bundler::Bundler;
use crate::config::{Config, Mode};
use crate::utils::format_size;

/// Build the project
#[derive(Args, Debug)]
pub struct BuildCommand {
    /// Output directory (overrides the configured one)
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,

    /// Build mode (overrides the configured one)
    #[arg(short, long, value_enum)]
    pub mode: Option<Mode>,

    /// Environment name (overrides the configured one)
    #[arg(short, long)]
    pub env: Option<String>,
}

impl BuildCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        let start = Instant::now();

        info!("Loading configuration from {}", config_path);
        let mut config = Config::load(config_path)?;
        self.apply_overrides(&mut config);

        eprintln!("{} Building project...", "→".blue());

        let bundler = Bundler::new(config)?;
        let result = bundler.build().await?;

        let duration = start.elapsed();

        eprintln!(
            "\n{} Emitted {} artifact(s) from {} module(s) in {:.2}s\n",
            "✓".green().bold(),
            result.artifacts.len(),
            result.module_count,
            duration.as_secs_f64()
        );

        // Print artifact summary
        for artifact in &result.artifacts {
            eprintln!(
                "  {} {} {}",
                "•".dimmed(),
                artifact.output_path.display().to_string().cyan(),
                format_size(artifact.size).dimmed()
            );
        }

        for warning in &result.warnings {
            eprintln!("\n  {} {}", "warning:".yellow().bold(), warning);
        }

        eprintln!();

        Ok(())
    }

    fn apply_overrides(&self, config: &mut Config) {
        if let Some(outdir) = &self.outdir {
            config.output.dir = outdir.display().to_string();
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(env) = &self.env {
            config.env = env.clone();
        }
    }
}
