//! Configuration schema definitions

use serde::{Deserialize, Serialize};

use crate::bundler::FileKind;

/// Build mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    Production,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Development
    }
}

impl Mode {
    pub fn is_production(&self) -> bool {
        matches!(self, Mode::Production)
    }
}

/// Project metadata configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// Module resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// Resolution roots for bare references, in priority order
    #[serde(default = "default_roots")]
    pub roots: Vec<String>,

    /// Extensions probed for extension-less references, in order
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Main-file names probed when a reference names a directory
    #[serde(default = "default_main_files")]
    pub main_files: Vec<String>,

    /// External package root, searched last for bare references
    #[serde(default = "default_package_root")]
    pub package_root: Option<String>,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            extensions: default_extensions(),
            main_files: default_main_files(),
            package_root: default_package_root(),
        }
    }
}

fn default_roots() -> Vec<String> {
    vec!["src".to_string()]
}

fn default_extensions() -> Vec<String> {
    ["ts", "tsx", "js", "jsx", "json"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_main_files() -> Vec<String> {
    vec!["index".to_string()]
}

fn default_package_root() -> Option<String> {
    Some("node_modules".to_string())
}

/// Transform chain phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Runs before primary steps; reference extraction lives here
    Pre,
    /// The main content-rewriting steps
    Primary,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Primary
    }
}

/// One transform rule: a matcher plus an ordered step chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// File kinds this rule applies to (empty matches any kind)
    #[serde(default)]
    pub kinds: Vec<FileKind>,

    /// Include globs, relative to the project root (empty matches everything)
    #[serde(default)]
    pub include: Vec<String>,

    /// Exclude globs, relative to the project root
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Chain phase
    #[serde(default)]
    pub phase: Phase,

    /// Ordered step names
    #[serde(default)]
    pub steps: Vec<String>,

    /// Only apply in this mode (absent means both)
    #[serde(default)]
    pub mode: Option<Mode>,

    /// Content below this byte count is inlined as a data reference
    /// instead of being emitted as a separate artifact
    #[serde(default)]
    pub inline_limit: Option<u64>,
}

/// Filename templates for one output kind, per mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeTemplates {
    pub development: String,
    pub production: String,
}

impl ModeTemplates {
    fn new(development: &str, production: &str) -> Self {
        Self {
            development: development.to_string(),
            production: production.to_string(),
        }
    }

    pub fn for_mode(&self, mode: Mode) -> &str {
        match mode {
            Mode::Development => &self.development,
            Mode::Production => &self.production,
        }
    }
}

/// Output filename templates per artifact kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilenameTemplates {
    #[serde(default = "default_script_templates")]
    pub script: ModeTemplates,

    #[serde(default = "default_style_templates")]
    pub style: ModeTemplates,

    #[serde(default = "default_font_templates")]
    pub font: ModeTemplates,

    #[serde(default = "default_image_templates")]
    pub image: ModeTemplates,

    #[serde(default = "default_asset_templates")]
    pub asset: ModeTemplates,
}

impl Default for FilenameTemplates {
    fn default() -> Self {
        Self {
            script: default_script_templates(),
            style: default_style_templates(),
            font: default_font_templates(),
            image: default_image_templates(),
            asset: default_asset_templates(),
        }
    }
}

impl FilenameTemplates {
    /// Template for an artifact of the given source kind
    pub fn for_kind(&self, kind: FileKind, mode: Mode) -> &str {
        match kind {
            FileKind::Script => self.script.for_mode(mode),
            FileKind::Style => self.style.for_mode(mode),
            FileKind::Font => self.font.for_mode(mode),
            FileKind::Image => self.image.for_mode(mode),
            _ => self.asset.for_mode(mode),
        }
    }
}

fn default_script_templates() -> ModeTemplates {
    ModeTemplates::new("scripts/[name].js", "scripts/[name].[hash].js")
}

fn default_style_templates() -> ModeTemplates {
    ModeTemplates::new("styles/[name].css", "styles/[name].[hash].css")
}

fn default_font_templates() -> ModeTemplates {
    ModeTemplates::new("fonts/[name].[ext]", "fonts/[name].[hash].[ext]")
}

fn default_image_templates() -> ModeTemplates {
    ModeTemplates::new("images/[name].[ext]", "images/[name].[hash].[ext]")
}

fn default_asset_templates() -> ModeTemplates {
    ModeTemplates::new("assets/[name].[ext]", "assets/[name].[hash].[ext]")
}

/// HTML entry document configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtmlConfig {
    /// Render the entry document at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Optional template file, relative to the project root.
    /// Placeholders: `{{title}}`, `{{mount}}`, `{{styles}}`, `{{scripts}}`.
    #[serde(default)]
    pub template: Option<String>,

    /// Document title (defaults to the project name)
    #[serde(default)]
    pub title: Option<String>,

    /// Id of the mount element
    #[serde(default = "default_mount_id")]
    pub mount_id: String,

    /// Output filename
    #[serde(default = "default_html_filename")]
    pub filename: String,
}

impl Default for HtmlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            template: None,
            title: None,
            mount_id: default_mount_id(),
            filename: default_html_filename(),
        }
    }
}

fn default_mount_id() -> String {
    "app".to_string()
}

fn default_html_filename() -> String {
    "index.html".to_string()
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Public URL prefix for assets
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Generate asset manifest
    #[serde(default = "default_true")]
    pub manifest: bool,

    /// Filename templates per artifact kind
    #[serde(default)]
    pub filenames: FilenameTemplates,

    /// HTML entry document
    #[serde(default)]
    pub html: HtmlConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            public_url: default_public_url(),
            manifest: true,
            filenames: FilenameTemplates::default(),
            html: HtmlConfig::default(),
        }
    }
}

fn default_output_dir() -> String {
    "dist".to_string()
}

fn default_public_url() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

/// What to do when a transform chain step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Abort the build (default)
    Fail,
    /// Skip the remaining steps for non-entry modules and record a warning
    Skip,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        ErrorPolicy::Fail
    }
}

/// Build execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Maximum concurrent module transforms
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Recovery policy for transform failures
    #[serde(default)]
    pub on_transform_error: ErrorPolicy,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            on_transform_error: ErrorPolicy::default(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}

/// Plugin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Plugin name/identifier
    pub name: String,

    /// Plugin-specific options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<toml::Table>,
}
