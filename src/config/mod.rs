//! Configuration handling for Bindle
//!
//! Parses and manages bindle.toml configuration files. The loaded `Config`
//! is the build context: it is created once per build and read-only to every
//! downstream component.

mod schema;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use schema::*;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project metadata
    pub project: ProjectConfig,

    /// Build mode
    #[serde(default)]
    pub mode: Mode,

    /// Named environment (selects environment-specific modules)
    #[serde(default = "default_env")]
    pub env: String,

    /// Entry references for graph traversal, keyed by chunk name.
    /// A BTreeMap so entries are always walked in the same order.
    #[serde(default)]
    pub entries: BTreeMap<String, String>,

    /// Module resolution rules
    #[serde(default)]
    pub resolve: ResolveConfig,

    /// Transform rule table, in declaration order
    #[serde(default = "default_rules")]
    pub rules: Vec<RuleConfig>,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Build execution settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Plugin configuration
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,

    /// Root directory (computed from config file location)
    #[serde(skip)]
    pub root: PathBuf,
}

fn default_env() -> String {
    "production".to_string()
}

/// The standard rule table used when a config declares none: reference
/// extraction in the pre phase, JSON wrapping, production-only minification,
/// and inline thresholds for fonts and images.
fn default_rules() -> Vec<RuleConfig> {
    use crate::bundler::FileKind;

    let rule = |kinds: &[FileKind], phase: Phase, steps: &[&str]| RuleConfig {
        kinds: kinds.to_vec(),
        include: Vec::new(),
        exclude: Vec::new(),
        phase,
        steps: steps.iter().map(|s| s.to_string()).collect(),
        mode: None,
        inline_limit: None,
    };

    let mut rules = vec![
        rule(&[FileKind::Script], Phase::Pre, &["script-refs"]),
        rule(&[FileKind::Style], Phase::Pre, &["style-refs"]),
        rule(&[FileKind::Data], Phase::Primary, &["json-module"]),
    ];

    let mut minify = rule(&[FileKind::Script], Phase::Primary, &["minify"]);
    minify.mode = Some(Mode::Production);
    rules.push(minify);

    let mut style_minify = rule(&[FileKind::Style], Phase::Primary, &["style-minify"]);
    style_minify.mode = Some(Mode::Production);
    rules.push(style_minify);

    let mut fonts = rule(&[FileKind::Font], Phase::Primary, &[]);
    fonts.inline_limit = Some(1024);
    rules.push(fonts);

    let mut images = rule(&[FileKind::Image], Phase::Primary, &[]);
    images.inline_limit = Some(10240);
    rules.push(images);

    rules
}

impl Config {
    /// Load configuration from a file path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let canonical_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let content = fs::read_to_string(&canonical_path)
            .with_context(|| format!("Failed to read config file: {}", canonical_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| "Failed to parse bindle.toml")?;

        // Set root directory to the directory containing the config file.
        // Canonical so it prefix-matches resolver output when computing
        // root-relative paths.
        let root = canonical_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        config.root = fs::canonicalize(&root).unwrap_or(root);

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Create a default configuration rooted at the given directory
    pub fn default_config(root: impl Into<PathBuf>) -> Self {
        Self {
            project: ProjectConfig {
                name: "my-app".to_string(),
                version: "0.1.0".to_string(),
            },
            mode: Mode::Development,
            env: default_env(),
            entries: {
                let mut map = BTreeMap::new();
                map.insert("main".to_string(), "./src/main.js".to_string());
                map
            },
            resolve: ResolveConfig::default(),
            rules: default_rules(),
            output: OutputConfig::default(),
            build: BuildConfig::default(),
            plugins: Vec::new(),
            root: root.into(),
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        // Ensure at least one entry exists. Whether the entry reference
        // actually resolves is the resolver's job; it reports every
        // candidate path it tried.
        if self.entries.is_empty() {
            anyhow::bail!("At least one entry must be specified in bindle.toml");
        }

        if self.build.concurrency == 0 {
            anyhow::bail!("build.concurrency must be at least 1");
        }

        Ok(())
    }

    /// Get the absolute output directory path
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.output.dir)
    }

    /// All entries in deterministic (name) order
    pub fn all_entries(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(name, reference)| (name.clone(), reference.clone()))
            .collect()
    }

    /// Absolute resolution root paths, in priority order
    pub fn resolution_roots(&self) -> Vec<PathBuf> {
        self.resolve.roots.iter().map(|r| self.root.join(r)).collect()
    }

    /// Absolute external package root, if configured
    pub fn package_root(&self) -> Option<PathBuf> {
        self.resolve.package_root.as_ref().map(|r| self.root.join(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml_src = r#"
            [project]
            name = "demo"

            [entries]
            main = "./src/app"
        "#;

        let config: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(config.project.name, "demo");
        assert_eq!(config.mode, Mode::Development);
        assert_eq!(config.entries["main"], "./src/app");
        // Standard rule table applies when none is declared
        assert!(config.rules.iter().any(|r| r.steps.contains(&"script-refs".to_string())));
        assert!(config.rules.iter().any(|r| r.inline_limit == Some(10240)));
    }

    #[test]
    fn test_parse_full_config() {
        let toml_src = r#"
            mode = "production"
            env = "staging"

            [project]
            name = "demo"

            [entries]
            main = "./src/app"
            admin = "./src/admin"

            [resolve]
            roots = ["src", "shared"]
            extensions = ["ts", "js"]
            main_files = ["index", "main"]

            [[rules]]
            kinds = ["script"]
            phase = "pre"
            steps = ["script-refs"]
            include = ["src/**"]

            [[rules]]
            kinds = ["image"]
            inline_limit = 4096

            [output]
            dir = "build"

            [output.filenames.script]
            development = "js/[name].js"
            production = "js/[name].[hash].js"

            [build]
            concurrency = 4
            on_transform_error = "skip"

            [[plugins]]
            name = "copy"
            [plugins.options]
            from = "static"
            to = "static"
        "#;

        let config: Config = toml::from_str(toml_src).unwrap();
        assert!(config.mode.is_production());
        assert_eq!(config.env, "staging");
        assert_eq!(config.resolve.roots, vec!["src", "shared"]);
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].phase, Phase::Pre);
        assert_eq!(config.rules[1].inline_limit, Some(4096));
        assert_eq!(config.build.concurrency, 4);
        assert_eq!(config.build.on_transform_error, ErrorPolicy::Skip);
        assert_eq!(config.plugins[0].name, "copy");

        // Entries iterate in name order
        let names: Vec<String> = config.all_entries().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["admin", "main"]);
    }

    #[test]
    fn test_validate_rejects_empty_entries() {
        let mut config = Config::default_config("/tmp");
        config.entries.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_template_selection() {
        let config = Config::default_config("/tmp");
        let t = &config.output.filenames;

        assert_eq!(
            t.for_kind(crate::bundler::FileKind::Script, Mode::Development),
            "scripts/[name].js"
        );
        assert_eq!(
            t.for_kind(crate::bundler::FileKind::Script, Mode::Production),
            "scripts/[name].[hash].js"
        );
        assert_eq!(
            t.for_kind(crate::bundler::FileKind::Image, Mode::Production),
            "images/[name].[hash].[ext]"
        );
    }
}
