//! Named transform steps
//!
//! Each step is an opaque `(content, path) -> content'` collaborator the
//! pipeline sequences by name. The built-ins cover reference extraction for
//! scripts and stylesheets, JSON module wrapping, and whitespace/comment
//! minification for production chains. Anything heavier (transpilers,
//! preprocessors) registers through the same interface.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Config;

/// A module reference found inside content by a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    /// The reference text as written
    pub reference: String,

    /// Whether it is a dynamic reference (a chunk split point)
    pub dynamic: bool,
}

/// Output of one step
#[derive(Debug)]
pub struct StepOutput {
    /// Content handed to the next step in the chain
    pub content: Vec<u8>,

    /// Additional references discovered in the content
    pub discovered: Vec<Discovered>,
}

impl StepOutput {
    /// Content passed through unchanged, no discoveries
    pub fn passthrough(content: &[u8]) -> Self {
        Self {
            content: content.to_vec(),
            discovered: Vec::new(),
        }
    }
}

/// One named transform step
pub trait TransformStep: Send + Sync {
    /// Step name, as referenced from the rule table
    fn name(&self) -> &'static str;

    /// Apply the step to one module's content
    fn apply(&self, content: &[u8], path: &Path, config: &Config) -> Result<StepOutput>;
}

/// Named step lookup table
#[derive(Default)]
pub struct StepRegistry {
    steps: HashMap<String, Arc<dyn TransformStep>>,
}

impl StepRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in steps
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ScriptRefs));
        registry.register(Arc::new(StyleRefs));
        registry.register(Arc::new(JsonModule));
        registry.register(Arc::new(Minify));
        registry.register(Arc::new(StyleMinify));
        registry
    }

    /// Register a step under its own name
    pub fn register(&mut self, step: Arc<dyn TransformStep>) {
        self.steps.insert(step.name().to_string(), step);
    }

    /// Look up a step by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn TransformStep>> {
        self.steps.get(name)
    }

    /// Whether a step name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }
}

fn utf8<'a>(content: &'a [u8], path: &Path) -> Result<&'a str> {
    std::str::from_utf8(content)
        .with_context(|| format!("{} is not valid UTF-8", path.display()))
}

// ---------------------------------------------------------------------------
// script-refs

static IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:import|export)\s+(?:(?:\{[^}]*\}|\*\s+as\s+\w+|\w+)\s+from\s+)?["']([^"']+)["']|require\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap()
});

static DYNAMIC_IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"import\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap()
});

/// Extract static and dynamic import references from script content
pub struct ScriptRefs;

impl TransformStep for ScriptRefs {
    fn name(&self) -> &'static str {
        "script-refs"
    }

    fn apply(&self, content: &[u8], path: &Path, _config: &Config) -> Result<StepOutput> {
        let source = utf8(content, path)?;
        let mut discovered = Vec::new();

        let mut dynamic = Vec::new();
        for cap in DYNAMIC_IMPORT_REGEX.captures_iter(source) {
            if let Some(reference) = cap.get(1) {
                let reference = reference.as_str().to_string();
                if !dynamic.contains(&reference) {
                    dynamic.push(reference);
                }
            }
        }

        for cap in IMPORT_REGEX.captures_iter(source) {
            if let Some(reference) = cap.get(1).or_else(|| cap.get(2)) {
                let reference = reference.as_str().to_string();
                if dynamic.contains(&reference) {
                    continue;
                }
                if !discovered.iter().any(|d: &Discovered| d.reference == reference) {
                    discovered.push(Discovered {
                        reference,
                        dynamic: false,
                    });
                }
            }
        }

        discovered.extend(dynamic.into_iter().map(|reference| Discovered {
            reference,
            dynamic: true,
        }));

        Ok(StepOutput {
            content: content.to_vec(),
            discovered,
        })
    }
}

// ---------------------------------------------------------------------------
// style-refs

static CSS_URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"url\(\s*['"]?([^'")]+?)['"]?\s*\)"#).unwrap());

static CSS_IMPORT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"@import\s+['"]([^'"]+)['"]"#).unwrap());

fn is_external_url(reference: &str) -> bool {
    reference.starts_with("data:")
        || reference.starts_with("http:")
        || reference.starts_with("https:")
        || reference.starts_with("//")
        || reference.starts_with('#')
}

/// Extract `url(...)` and `@import` references from stylesheet content
pub struct StyleRefs;

impl TransformStep for StyleRefs {
    fn name(&self) -> &'static str {
        "style-refs"
    }

    fn apply(&self, content: &[u8], path: &Path, _config: &Config) -> Result<StepOutput> {
        let source = utf8(content, path)?;
        let mut discovered: Vec<Discovered> = Vec::new();

        let mut push = |reference: &str| {
            if is_external_url(reference) {
                return;
            }
            if !discovered.iter().any(|d| d.reference == reference) {
                discovered.push(Discovered {
                    reference: reference.to_string(),
                    dynamic: false,
                });
            }
        };

        for cap in CSS_IMPORT_REGEX.captures_iter(source) {
            if let Some(reference) = cap.get(1) {
                push(reference.as_str());
            }
        }
        for cap in CSS_URL_REGEX.captures_iter(source) {
            if let Some(reference) = cap.get(1) {
                push(reference.as_str());
            }
        }

        Ok(StepOutput {
            content: content.to_vec(),
            discovered,
        })
    }
}

// ---------------------------------------------------------------------------
// json-module

/// Wrap JSON content as a script module
pub struct JsonModule;

impl TransformStep for JsonModule {
    fn name(&self) -> &'static str {
        "json-module"
    }

    fn apply(&self, content: &[u8], path: &Path, _config: &Config) -> Result<StepOutput> {
        let source = utf8(content, path)?;

        // Validate JSON
        serde_json::from_str::<serde_json::Value>(source)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?;

        Ok(StepOutput {
            content: format!("module.exports = {};", source.trim()).into_bytes(),
            discovered: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// minify

/// Whitespace and comment collapse for script content
pub struct Minify;

impl TransformStep for Minify {
    fn name(&self) -> &'static str {
        "minify"
    }

    fn apply(&self, content: &[u8], path: &Path, _config: &Config) -> Result<StepOutput> {
        let source = utf8(content, path)?;
        Ok(StepOutput {
            content: minify_script(source).into_bytes(),
            discovered: Vec::new(),
        })
    }
}

fn minify_script(code: &str) -> String {
    let mut result = String::with_capacity(code.len());
    let mut in_string = false;
    let mut string_char = ' ';
    let mut in_single_comment = false;
    let mut in_multi_comment = false;
    let mut prev_char = ' ';
    let mut chars = code.chars().peekable();

    while let Some(c) = chars.next() {
        if in_single_comment {
            if c == '\n' {
                in_single_comment = false;
                result.push('\n');
            }
            continue;
        }

        if in_multi_comment {
            if prev_char == '*' && c == '/' {
                in_multi_comment = false;
            }
            prev_char = c;
            continue;
        }

        if in_string {
            result.push(c);
            if c == string_char && prev_char != '\\' {
                in_string = false;
            }
            prev_char = c;
            continue;
        }

        if c == '"' || c == '\'' || c == '`' {
            in_string = true;
            string_char = c;
            result.push(c);
            prev_char = c;
            continue;
        }

        if c == '/' {
            if let Some(&next) = chars.peek() {
                if next == '/' {
                    in_single_comment = true;
                    chars.next();
                    continue;
                } else if next == '*' {
                    in_multi_comment = true;
                    chars.next();
                    continue;
                }
            }
        }

        // Collapse whitespace
        if c.is_whitespace() {
            if !result.ends_with(' ') && !result.ends_with('\n') {
                result.push(' ');
            }
        } else {
            result.push(c);
        }

        prev_char = c;
    }

    result
}

// ---------------------------------------------------------------------------
// style-minify

/// Comment removal and whitespace collapse for stylesheet content
pub struct StyleMinify;

impl TransformStep for StyleMinify {
    fn name(&self) -> &'static str {
        "style-minify"
    }

    fn apply(&self, content: &[u8], path: &Path, _config: &Config) -> Result<StepOutput> {
        let source = utf8(content, path)?;
        Ok(StepOutput {
            content: minify_style(source).into_bytes(),
            discovered: Vec::new(),
        })
    }
}

fn minify_style(content: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut in_comment = false;
    let mut last_char = ' ';

    for c in content.chars() {
        if in_comment {
            if last_char == '*' && c == '/' {
                in_comment = false;
            }
            last_char = c;
            continue;
        }

        if last_char == '/' && c == '*' {
            in_comment = true;
            result.pop();
            last_char = c;
            continue;
        }

        if c.is_whitespace() {
            if !last_char.is_whitespace()
                && last_char != '{'
                && last_char != ';'
                && last_char != ':'
            {
                result.push(' ');
            }
            last_char = ' ';
            continue;
        }

        if last_char == ' ' && (c == '{' || c == '}' || c == ';' || c == ':' || c == ',') {
            result.pop();
        }

        result.push(c);
        last_char = c;
    }

    result.trim().to_string()
}
