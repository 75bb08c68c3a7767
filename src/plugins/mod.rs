//! Plugin system for Bindle
//!
//! An ordered-handler registry invoked at fixed lifecycle hooks. Handlers
//! run in registration order with pipe semantics: each may transform the
//! payload before the next sees it. Plugin failures are reported as
//! warnings unless the plugin escalates them to fatal.
//!
//! Hooks:
//! - `before_build`: rewrite module source before its transform chain runs
//! - `replace_reference`: swap one module reference for another at resolve time
//! - `after_emit`: post-process the emitted artifact set

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::config::{Config, Mode};
use crate::emitter::Artifact;
use crate::error::PluginError;

/// Plugin hook context
pub struct PluginContext {
    /// Project root directory
    pub root: PathBuf,

    /// Output root directory
    pub out_dir: PathBuf,

    /// Build mode
    pub mode: Mode,

    /// Named environment
    pub env: String,
}

/// Result of a source-rewriting hook
pub enum SourceResult {
    /// Continue to next plugin unchanged
    Skip,
    /// Rewritten source content
    Rewritten(String),
}

/// Plugin trait - implement this to extend the pipeline
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Plugin name for logging and error reporting
    fn name(&self) -> &str;

    /// Rewrite module source before its transform chain runs
    async fn before_build(
        &self,
        _content: &str,
        _path: &Path,
        _ctx: &PluginContext,
    ) -> Result<SourceResult, PluginError> {
        Ok(SourceResult::Skip)
    }

    /// Rewrite a module reference before it is resolved.
    /// Return `None` to leave the reference unchanged.
    fn replace_reference(
        &self,
        _reference: &str,
        _importer: &Path,
        _ctx: &PluginContext,
    ) -> Option<String> {
        None
    }

    /// Post-process the emitted artifact set
    async fn after_emit(
        &self,
        _artifacts: &[Artifact],
        _ctx: &PluginContext,
    ) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Ordered plugin registry
pub struct PluginHost {
    plugins: Vec<Arc<dyn Plugin>>,
    context: PluginContext,
}

impl PluginHost {
    /// Create an empty host
    pub fn new(context: PluginContext) -> Self {
        Self {
            plugins: Vec::new(),
            context,
        }
    }

    /// Build a host from the configured plugin list
    pub fn from_config(config: &Config) -> Result<Self> {
        let context = PluginContext {
            root: config.root.clone(),
            out_dir: config.output_dir(),
            mode: config.mode,
            env: config.env.clone(),
        };

        let mut host = Self::new(context);
        for plugin_config in &config.plugins {
            let options = plugin_config.options.clone().unwrap_or_default();
            let plugin: Arc<dyn Plugin> = match plugin_config.name.as_str() {
                "define" => Arc::new(DefinePlugin::from_options(options)?),
                "replace" => Arc::new(ReplacePlugin::from_options(options)?),
                "copy" => Arc::new(CopyPlugin::from_options(options)?),
                other => anyhow::bail!("Unknown plugin '{other}' in bindle.toml"),
            };
            host.register(plugin);
        }

        Ok(host)
    }

    /// Register a plugin (handlers run in registration order)
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Run `before_build` hooks over one module's source.
    /// Returns the piped content and any non-fatal errors; a fatal plugin
    /// error aborts immediately.
    pub async fn run_before_build(
        &self,
        content: String,
        path: &Path,
    ) -> Result<(String, Vec<PluginError>), PluginError> {
        let mut current = content;
        let mut warnings = Vec::new();

        for plugin in &self.plugins {
            match plugin.before_build(&current, path, &self.context).await {
                Ok(SourceResult::Skip) => {}
                Ok(SourceResult::Rewritten(next)) => current = next,
                Err(err) if err.fatal => return Err(err),
                Err(err) => warnings.push(err),
            }
        }

        Ok((current, warnings))
    }

    /// Pipe a module reference through `replace_reference` handlers
    pub fn rewrite_reference(&self, reference: &str, importer: &Path) -> String {
        let mut current = reference.to_string();
        for plugin in &self.plugins {
            if let Some(next) = plugin.replace_reference(&current, importer, &self.context) {
                debug!("{}: '{}' -> '{}'", plugin.name(), current, next);
                current = next;
            }
        }
        current
    }

    /// Run `after_emit` hooks over the final artifact set
    pub async fn run_after_emit(
        &self,
        artifacts: &[Artifact],
    ) -> Result<Vec<PluginError>, PluginError> {
        let mut warnings = Vec::new();

        for plugin in &self.plugins {
            match plugin.after_emit(artifacts, &self.context).await {
                Ok(()) => {}
                Err(err) if err.fatal => return Err(err),
                Err(err) => warnings.push(err),
            }
        }

        Ok(warnings)
    }
}

fn decode_options<T: serde::de::DeserializeOwned>(options: toml::Table, plugin: &str) -> Result<T> {
    toml::Value::Table(options)
        .try_into()
        .with_context(|| format!("Invalid options for plugin '{plugin}'"))
}

// ---------------------------------------------------------------------------
// define

/// Substitutes configured keys with literal replacement text in module
/// source before transforms run.
pub struct DefinePlugin {
    /// Ordered so substitution is deterministic
    definitions: BTreeMap<String, String>,
}

impl DefinePlugin {
    pub fn new(definitions: BTreeMap<String, String>) -> Self {
        Self { definitions }
    }

    fn from_options(options: toml::Table) -> Result<Self> {
        Ok(Self::new(decode_options(options, "define")?))
    }
}

#[async_trait]
impl Plugin for DefinePlugin {
    fn name(&self) -> &str {
        "define"
    }

    async fn before_build(
        &self,
        content: &str,
        _path: &Path,
        _ctx: &PluginContext,
    ) -> Result<SourceResult, PluginError> {
        let mut rewritten = content.to_string();
        for (key, value) in &self.definitions {
            rewritten = rewritten.replace(key, value);
        }

        if rewritten == content {
            Ok(SourceResult::Skip)
        } else {
            Ok(SourceResult::Rewritten(rewritten))
        }
    }
}

// ---------------------------------------------------------------------------
// replace

#[derive(Deserialize)]
struct ReplaceOptions {
    pattern: String,
    replacement: String,
}

/// Rewrites module references matching a pattern, selecting
/// environment-specific modules at resolve time. The replacement may
/// contain `[env]`, substituted with the build's environment name.
pub struct ReplacePlugin {
    pattern: Regex,
    replacement: String,
}

impl ReplacePlugin {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern).with_context(|| format!("Invalid pattern: {pattern}"))?,
            replacement: replacement.to_string(),
        })
    }

    fn from_options(options: toml::Table) -> Result<Self> {
        let opts: ReplaceOptions = decode_options(options, "replace")?;
        Self::new(&opts.pattern, &opts.replacement)
    }
}

#[async_trait]
impl Plugin for ReplacePlugin {
    fn name(&self) -> &str {
        "replace"
    }

    fn replace_reference(
        &self,
        reference: &str,
        _importer: &Path,
        ctx: &PluginContext,
    ) -> Option<String> {
        if self.pattern.is_match(reference) {
            Some(self.replacement.replace("[env]", &ctx.env))
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// copy

#[derive(Deserialize)]
struct CopyOptions {
    from: String,
    #[serde(default)]
    to: Option<String>,
    /// Escalate a failed copy to abort the build
    #[serde(default)]
    required: bool,
}

/// Copies a directory tree verbatim into the output root after emission
pub struct CopyPlugin {
    from: String,
    to: String,
    required: bool,
}

impl CopyPlugin {
    pub fn new(from: &str, to: &str, required: bool) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            required,
        }
    }

    fn from_options(options: toml::Table) -> Result<Self> {
        let opts: CopyOptions = decode_options(options, "copy")?;
        let to = opts.to.unwrap_or_else(|| opts.from.clone());
        Ok(Self::new(&opts.from, &to, opts.required))
    }

    fn copy_tree(&self, ctx: &PluginContext) -> std::result::Result<usize, String> {
        let source = ctx.root.join(&self.from);
        let dest_root = ctx.out_dir.join(&self.to);

        if !source.is_dir() {
            return Err(format!("source directory not found: {}", source.display()));
        }

        let mut copied = 0;
        for entry in walkdir::WalkDir::new(&source) {
            let entry = entry.map_err(|e| e.to_string())?;
            if !entry.file_type().is_file() {
                continue;
            }

            let rel = entry
                .path()
                .strip_prefix(&source)
                .map_err(|e| e.to_string())?;
            let dest = dest_root.join(rel);

            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
            fs::copy(entry.path(), &dest).map_err(|e| e.to_string())?;
            copied += 1;
        }

        Ok(copied)
    }
}

#[async_trait]
impl Plugin for CopyPlugin {
    fn name(&self) -> &str {
        "copy"
    }

    async fn after_emit(
        &self,
        _artifacts: &[Artifact],
        ctx: &PluginContext,
    ) -> Result<(), PluginError> {
        match self.copy_tree(ctx) {
            Ok(copied) => {
                debug!("copied {} file(s) from {}", copied, self.from);
                Ok(())
            }
            Err(message) => Err(PluginError {
                plugin: self.name().to_string(),
                hook: "after_emit",
                message,
                fatal: self.required,
            }),
        }
    }
}
