//! Transform pipeline
//!
//! Selects transform chains per module from the configured rule table and
//! runs them: every matching pre-phase chain first (in rule declaration
//! order), then every matching primary-phase chain, each step's output
//! feeding the next step's input. Steps are opaque named collaborators
//! looked up in a [`StepRegistry`]; the pipeline only sequences them.

mod steps;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::bundler::FileKind;
use crate::config::{Config, Phase, RuleConfig};
use crate::error::TransformError;

pub use steps::{Discovered, StepOutput, StepRegistry, TransformStep};

/// A rule from the table with its matchers compiled
struct CompiledRule {
    kinds: Vec<FileKind>,
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
    phase: Phase,
    steps: Vec<String>,
    mode: Option<crate::config::Mode>,
    inline_limit: Option<u64>,
}

impl CompiledRule {
    fn compile(rule: &RuleConfig) -> Result<Self> {
        Ok(Self {
            kinds: rule.kinds.clone(),
            include: build_glob_set(&rule.include)?,
            exclude: build_glob_set(&rule.exclude)?,
            phase: rule.phase,
            steps: rule.steps.clone(),
            mode: rule.mode,
            inline_limit: rule.inline_limit,
        })
    }

    fn matches(&self, kind: FileKind, rel_path: &str, config: &Config) -> bool {
        if let Some(mode) = self.mode {
            if mode != config.mode {
                return false;
            }
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&kind) {
            return false;
        }
        if let Some(include) = &self.include {
            if !include.is_match(rel_path) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(rel_path) {
                return false;
            }
        }
        true
    }
}

fn build_glob_set(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {pattern}"))?);
    }
    Ok(Some(builder.build()?))
}

/// The transform pipeline
pub struct Pipeline {
    /// Project configuration
    config: Arc<Config>,

    /// Compiled rule table, in declaration order
    rules: Vec<CompiledRule>,

    /// Named step collaborators
    registry: StepRegistry,
}

impl Pipeline {
    /// Create a pipeline with the built-in step registry
    pub fn new(config: Arc<Config>) -> Result<Self> {
        Self::with_registry(config, StepRegistry::with_builtins())
    }

    /// Create a pipeline with a caller-supplied registry
    pub fn with_registry(config: Arc<Config>, registry: StepRegistry) -> Result<Self> {
        let mut rules = Vec::with_capacity(config.rules.len());
        for rule in &config.rules {
            for step in &rule.steps {
                if !registry.contains(step) {
                    anyhow::bail!("Rule references unknown transform step '{step}'");
                }
            }
            rules.push(CompiledRule::compile(rule)?);
        }

        Ok(Self {
            config,
            rules,
            registry,
        })
    }

    /// Run all matching pre-phase chains for a module.
    /// Reference extraction lives here, so the graph builder calls this
    /// while traversing.
    pub fn run_pre(
        &self,
        kind: FileKind,
        path: &Path,
        content: Vec<u8>,
    ) -> Result<(Vec<u8>, Vec<Discovered>), TransformError> {
        self.run_phase(Phase::Pre, kind, path, content)
    }

    /// Run all matching primary-phase chains for a module
    pub fn run_primary(
        &self,
        kind: FileKind,
        path: &Path,
        content: Vec<u8>,
    ) -> Result<(Vec<u8>, Vec<Discovered>), TransformError> {
        self.run_phase(Phase::Primary, kind, path, content)
    }

    fn run_phase(
        &self,
        phase: Phase,
        kind: FileKind,
        path: &Path,
        mut content: Vec<u8>,
    ) -> Result<(Vec<u8>, Vec<Discovered>), TransformError> {
        let rel = self.rel_path(path);
        let mut discovered = Vec::new();

        for rule in &self.rules {
            if rule.phase != phase || !rule.matches(kind, &rel, &self.config) {
                continue;
            }

            for step_name in &rule.steps {
                let step = self
                    .registry
                    .get(step_name)
                    .expect("step names validated at pipeline construction");

                let output =
                    step.apply(&content, path, &self.config)
                        .map_err(|cause| TransformError {
                            step: step_name.clone(),
                            path: path.to_path_buf(),
                            cause,
                        })?;

                content = output.content;
                discovered.extend(output.discovered);
            }
        }

        Ok((content, discovered))
    }

    /// Inline threshold for a module: the first matching rule that sets one
    pub fn inline_limit_for(&self, kind: FileKind, path: &Path) -> Option<u64> {
        let rel = self.rel_path(path);
        self.rules
            .iter()
            .filter(|r| r.matches(kind, &rel, &self.config))
            .find_map(|r| r.inline_limit)
    }

    /// Root-relative path with forward slashes, for glob matching
    fn rel_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.config.root)
            .unwrap_or(path)
            .display()
            .to_string()
            .replace('\\', "/")
    }
}
