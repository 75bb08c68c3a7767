//! Artifact emission
//!
//! Turns the transformed module graph and its chunk partition into the
//! final output tree: one script and/or style artifact per chunk
//! (concatenated in traversal order), one artifact per non-inlined asset,
//! an HTML entry document, and a JSON manifest. Emission is planned fully
//! in memory first; writing happens afterwards, each artifact atomically
//! (temp file + rename), so a failed or cancelled build never leaves a
//! partial output tree.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::bundler::{ChunkGraph, ChunkId, FileKind, ModuleGraph, ModuleId};
use crate::config::Config;
use crate::error::BuildError;
use crate::utils::{relative_path, render_filename};

/// One output artifact
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Path relative to the output root
    pub path: PathBuf,

    /// Final byte content
    pub bytes: Vec<u8>,

    /// Chunk this artifact was emitted for, if any
    pub chunk: Option<ChunkId>,

    /// Source module path, for per-asset artifacts
    pub source: Option<PathBuf>,
}

/// A fully planned emission: everything computed, nothing written yet
#[derive(Debug, Default)]
pub struct EmitPlan {
    /// Artifacts in emission order
    pub artifacts: Vec<Artifact>,

    /// Mapping from source reference to emitted path
    pub manifest: BTreeMap<String, String>,
}

/// The artifact emitter
pub struct Emitter {
    config: Arc<Config>,
}

impl Emitter {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Compute the full artifact set for a transformed graph.
    ///
    /// Deterministic: chunk module order is discovery order and reference
    /// rewrites are applied in sorted order, so unchanged input produces
    /// byte-identical artifacts and identical hashed filenames.
    pub fn plan(&self, graph: &ModuleGraph, chunks: &ChunkGraph) -> Result<EmitPlan, BuildError> {
        let mut plan = EmitPlan::default();

        // Standalone assets first; bundles embed their final URLs.
        let urls = self.plan_assets(graph, &mut plan);

        for chunk in chunks.chunks() {
            self.plan_chunk_bundles(graph, chunk, &urls, &mut plan);
        }

        if self.config.output.html.enabled {
            let paths_by_chunk = plan.clone_paths_by_chunk();
            self.plan_html(chunks, &paths_by_chunk, &mut plan)?;
        }

        if self.config.output.manifest {
            let bytes = serde_json::to_vec_pretty(&plan.manifest)
                .expect("manifest serialization cannot fail");
            plan.artifacts.push(Artifact {
                path: PathBuf::from("manifest.json"),
                bytes,
                chunk: None,
                source: None,
            });
        }

        Ok(plan)
    }

    /// Emit each non-inlined font/image/other module as its own artifact.
    /// Returns the URL every module reference should be rewritten to:
    /// a public output path, or a data URI for inlined modules.
    fn plan_assets(&self, graph: &ModuleGraph, plan: &mut EmitPlan) -> HashMap<ModuleId, String> {
        let mut urls = HashMap::new();

        for (id, module) in graph.iter() {
            if module.kind.is_bundled() {
                continue;
            }

            if let Some(data_uri) = &module.inlined {
                urls.insert(id, data_uri.clone());
                continue;
            }

            let content = module.content();
            let stem = module
                .path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("asset");
            let ext = module
                .path
                .extension()
                .and_then(|s| s.to_str())
                .unwrap_or("bin");

            let template = self.config.output.filenames.for_kind(module.kind, self.config.mode);
            let rendered = render_filename(template, stem, ext, content);

            urls.insert(id, self.public_path(&rendered));
            self.manifest_asset(graph, id, &rendered, plan);

            plan.artifacts.push(Artifact {
                path: PathBuf::from(&rendered),
                bytes: content.to_vec(),
                chunk: None,
                source: Some(module.path.clone()),
            });
        }

        urls
    }

    /// Concatenate one chunk's script and style content, rewriting asset
    /// references to their final URLs.
    fn plan_chunk_bundles(
        &self,
        graph: &ModuleGraph,
        chunk: &crate::bundler::Chunk,
        urls: &HashMap<ModuleId, String>,
        plan: &mut EmitPlan,
    ) {
        let mut script_parts: Vec<String> = Vec::new();
        let mut style_parts: Vec<String> = Vec::new();

        for &id in &chunk.modules {
            let module = graph.get_module(id).expect("module in graph");
            if !module.kind.is_bundled() {
                continue;
            }

            let mut content = String::from_utf8_lossy(module.content()).into_owned();
            for (reference, target) in graph.references_of(id) {
                if let Some(url) = urls.get(&target) {
                    content = content.replace(reference, url);
                }
            }

            match module.kind {
                FileKind::Style => style_parts.push(content),
                _ => script_parts.push(content),
            }
        }

        if !script_parts.is_empty() {
            let bytes = script_parts.join("\n").into_bytes();
            let template = self
                .config
                .output
                .filenames
                .for_kind(FileKind::Script, self.config.mode);
            let rendered = render_filename(template, &chunk.name, "js", &bytes);
            plan.manifest
                .insert(format!("{}.js", chunk.name), rendered.clone());
            plan.artifacts.push(Artifact {
                path: PathBuf::from(rendered),
                bytes,
                chunk: Some(chunk.id),
                source: None,
            });
        }

        if !style_parts.is_empty() {
            let bytes = style_parts.join("\n").into_bytes();
            let template = self
                .config
                .output
                .filenames
                .for_kind(FileKind::Style, self.config.mode);
            let rendered = render_filename(template, &chunk.name, "css", &bytes);
            plan.manifest
                .insert(format!("{}.css", chunk.name), rendered.clone());
            plan.artifacts.push(Artifact {
                path: PathBuf::from(rendered),
                bytes,
                chunk: Some(chunk.id),
                source: None,
            });
        }
    }

    /// Render the HTML entry document. Stylesheets go in the head; scripts
    /// follow chunk load order, entry chunks last so their code runs after
    /// its dependencies are loadable.
    fn plan_html(
        &self,
        chunks: &ChunkGraph,
        paths_by_chunk: &HashMap<ChunkId, Vec<(String, bool)>>,
        plan: &mut EmitPlan,
    ) -> Result<(), BuildError> {
        let html_config = &self.config.output.html;

        let mut style_tags = String::new();
        let mut script_tags = String::new();
        for chunk in chunks.chunks_in_load_order() {
            let Some(paths) = paths_by_chunk.get(&chunk.id) else {
                continue;
            };
            for (path, is_style) in paths {
                let href = self.public_path(path);
                if *is_style {
                    style_tags.push_str(&format!(
                        "    <link rel=\"stylesheet\" href=\"{href}\">\n"
                    ));
                } else {
                    script_tags.push_str(&format!("    <script src=\"{href}\"></script>\n"));
                }
            }
        }

        let template = match &html_config.template {
            Some(rel) => {
                let path = self.config.root.join(rel);
                fs::read_to_string(&path).map_err(|source| BuildError::Read { path, source })?
            }
            None => DEFAULT_HTML_TEMPLATE.to_string(),
        };

        let title = html_config
            .title
            .clone()
            .unwrap_or_else(|| self.config.project.name.clone());
        let mount = format!("<div id=\"{}\"></div>", html_config.mount_id);

        let mut document = template
            .replace("{{title}}", &title)
            .replace("{{mount}}", &mount)
            .replace("{{styles}}", style_tags.trim_end())
            .replace("{{scripts}}", script_tags.trim_end());

        if self.config.mode.is_production() {
            document = collapse_whitespace(&document);
        }

        plan.artifacts.push(Artifact {
            path: PathBuf::from(&html_config.filename),
            bytes: document.into_bytes(),
            chunk: None,
            source: None,
        });

        Ok(())
    }

    /// Write every planned artifact under the output root, atomically.
    pub fn write(&self, plan: &EmitPlan) -> Result<(), BuildError> {
        let out_dir = self.config.output_dir();

        for artifact in &plan.artifacts {
            let final_path = out_dir.join(&artifact.path);
            let parent = final_path.parent().unwrap_or(&out_dir);

            fs::create_dir_all(parent).map_err(|source| BuildError::Emit {
                path: final_path.clone(),
                source,
            })?;

            let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|source| {
                BuildError::Emit {
                    path: final_path.clone(),
                    source,
                }
            })?;
            tmp.write_all(&artifact.bytes)
                .map_err(|source| BuildError::Emit {
                    path: final_path.clone(),
                    source,
                })?;
            tmp.persist(&final_path).map_err(|e| BuildError::Emit {
                path: final_path.clone(),
                source: e.error,
            })?;

            debug!("emitted {}", final_path.display());
        }

        Ok(())
    }

    fn public_path(&self, rendered: &str) -> String {
        let prefix = &self.config.output.public_url;
        if prefix.ends_with('/') {
            format!("{prefix}{rendered}")
        } else {
            format!("{prefix}/{rendered}")
        }
    }

    fn manifest_asset(&self, graph: &ModuleGraph, id: ModuleId, rendered: &str, plan: &mut EmitPlan) {
        if let Some(module) = graph.get_module(id) {
            let key = relative_path(&self.config.root, &module.path)
                .unwrap_or_else(|| module.path.display().to_string());
            plan.manifest.insert(key, rendered.to_string());
        }
    }
}

impl EmitPlan {
    /// Artifact paths grouped by chunk, styles flagged, for HTML rendering
    fn clone_paths_by_chunk(&self) -> HashMap<ChunkId, Vec<(String, bool)>> {
        let mut by_chunk: HashMap<ChunkId, Vec<(String, bool)>> = HashMap::new();
        for artifact in &self.artifacts {
            if let Some(chunk) = artifact.chunk {
                let path = artifact.path.display().to_string();
                let is_style = path.ends_with(".css");
                by_chunk.entry(chunk).or_default().push((path, is_style));
            }
        }
        by_chunk
    }
}

fn collapse_whitespace(html: &str) -> String {
    html.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("")
}

const DEFAULT_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{{title}}</title>
{{styles}}
  </head>
  <body>
    {{mount}}
{{scripts}}
  </body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::Module;
    use crate::config::Mode;
    use pretty_assertions::assert_eq;

    fn module(path: &str, kind: FileKind, source: &[u8]) -> Module {
        Module {
            path: PathBuf::from(path),
            kind,
            source: source.to_vec(),
            is_entry: false,
            deps: Vec::new(),
            dynamic_deps: Vec::new(),
            output: None,
            inlined: None,
        }
    }

    /// Entry script referencing a stylesheet and an image
    fn fixture(mode: Mode, image_bytes: &[u8]) -> (ModuleGraph, ChunkGraph, Arc<Config>) {
        let mut graph = ModuleGraph::new();
        let a = graph.add_module(module(
            "/proj/src/a.js",
            FileKind::Script,
            b"render('./logo.png');",
        ));
        let css = graph.add_module(module(
            "/proj/src/style.css",
            FileKind::Style,
            b"body { background: url(./logo.png); }",
        ));
        let img = graph.add_module(module("/proj/src/logo.png", FileKind::Image, image_bytes));
        graph.add_dependency(a, "./style.css", css, false);
        graph.add_dependency(a, "./logo.png", img, false);
        graph.add_dependency(css, "./logo.png", img, false);

        let chunks = ChunkGraph::partition(&graph, &[("main".to_string(), a)]);

        let mut config = Config::default_config("/proj");
        config.mode = mode;
        (graph, chunks, Arc::new(config))
    }

    #[test]
    fn test_dev_mode_plan_layout() {
        let (graph, chunks, config) = fixture(Mode::Development, b"imagebytes-imagebytes");
        let plan = Emitter::new(config).plan(&graph, &chunks).unwrap();

        let paths: Vec<String> = plan
            .artifacts
            .iter()
            .map(|a| a.path.display().to_string())
            .collect();
        assert_eq!(
            paths,
            vec![
                "images/logo.png",
                "scripts/main.js",
                "styles/main.css",
                "index.html",
                "manifest.json",
            ]
        );
    }

    #[test]
    fn test_references_rewritten_to_emitted_paths() {
        let (graph, chunks, config) = fixture(Mode::Development, b"imagebytes-imagebytes");
        let plan = Emitter::new(config).plan(&graph, &chunks).unwrap();

        let script = plan
            .artifacts
            .iter()
            .find(|a| a.path.ends_with("main.js"))
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&script.bytes),
            "render('/images/logo.png');"
        );

        let style = plan
            .artifacts
            .iter()
            .find(|a| a.path.ends_with("main.css"))
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&style.bytes),
            "body { background: url(/images/logo.png); }"
        );
    }

    #[test]
    fn test_inlined_asset_not_emitted() {
        let (mut graph, chunks, config) = fixture(Mode::Development, b"tiny");
        let img = graph
            .get_module_id(std::path::Path::new("/proj/src/logo.png"))
            .unwrap();
        graph.get_module_mut(img).unwrap().inlined =
            Some("data:image/png;base64,dGlueQ==".to_string());

        let plan = Emitter::new(config).plan(&graph, &chunks).unwrap();

        assert!(!plan.artifacts.iter().any(|a| a.path.starts_with("images")));
        let script = plan
            .artifacts
            .iter()
            .find(|a| a.path.ends_with("main.js"))
            .unwrap();
        assert!(String::from_utf8_lossy(&script.bytes).contains("data:image/png;base64,dGlueQ=="));
    }

    #[test]
    fn test_production_names_are_hashed_and_content_sensitive() {
        let (graph, chunks, config) = fixture(Mode::Production, b"imagebytes-imagebytes");
        let plan_one = Emitter::new(config.clone()).plan(&graph, &chunks).unwrap();
        let plan_two = Emitter::new(config).plan(&graph, &chunks).unwrap();

        // Idempotent: identical input, identical artifacts
        let paths = |p: &EmitPlan| -> Vec<String> {
            p.artifacts.iter().map(|a| a.path.display().to_string()).collect()
        };
        assert_eq!(paths(&plan_one), paths(&plan_two));
        for (a, b) in plan_one.artifacts.iter().zip(plan_two.artifacts.iter()) {
            assert_eq!(a.bytes, b.bytes);
        }

        // Hashed script filename
        let script_path = paths(&plan_one)
            .into_iter()
            .find(|p| p.starts_with("scripts/"))
            .unwrap();
        assert!(script_path.starts_with("scripts/main."));
        assert_ne!(script_path, "scripts/main.js");

        // Changing the image changes the image and script names
        let (graph_b, chunks_b, config_b) = fixture(Mode::Production, b"different-imagebytes!");
        let plan_b = Emitter::new(config_b).plan(&graph_b, &chunks_b).unwrap();

        let find = |p: &EmitPlan, prefix: &str| -> String {
            p.artifacts
                .iter()
                .map(|a| a.path.display().to_string())
                .find(|path| path.starts_with(prefix))
                .unwrap()
        };
        assert_ne!(find(&plan_one, "images/"), find(&plan_b, "images/"));
        assert_ne!(find(&plan_one, "scripts/"), find(&plan_b, "scripts/"));
    }

    #[test]
    fn test_unrelated_chunk_name_unchanged_by_edit() {
        // Two entries; editing one must not rename the other's bundle.
        let build = |util_src: &[u8]| {
            let mut graph = ModuleGraph::new();
            let a = graph.add_module(module("/proj/src/a.js", FileKind::Script, b"a();"));
            let b = graph.add_module(module("/proj/src/b.js", FileKind::Script, util_src));
            let chunks = ChunkGraph::partition(
                &graph,
                &[("alpha".to_string(), a), ("beta".to_string(), b)],
            );
            let mut config = Config::default_config("/proj");
            config.mode = Mode::Production;
            Emitter::new(Arc::new(config)).plan(&graph, &chunks).unwrap()
        };

        let plan_one = build(b"b();");
        let plan_two = build(b"b(); changed();");

        let find = |p: &EmitPlan, name: &str| -> String {
            p.artifacts
                .iter()
                .map(|a| a.path.display().to_string())
                .find(|path| path.contains(name))
                .unwrap()
        };
        assert_eq!(find(&plan_one, "alpha"), find(&plan_two, "alpha"));
        assert_ne!(find(&plan_one, "beta"), find(&plan_two, "beta"));
    }

    #[test]
    fn test_html_orders_entry_scripts_last() {
        let mut graph = ModuleGraph::new();
        let a = graph.add_module(module("/proj/src/a.js", FileKind::Script, b"a();"));
        let lazy = graph.add_module(module("/proj/src/lazy.js", FileKind::Script, b"lazy();"));
        graph.add_dependency(a, "./lazy", lazy, true);
        let chunks = ChunkGraph::partition(&graph, &[("main".to_string(), a)]);

        let config = Arc::new(Config::default_config("/proj"));
        let plan = Emitter::new(config).plan(&graph, &chunks).unwrap();

        let html = plan
            .artifacts
            .iter()
            .find(|a| a.path.ends_with("index.html"))
            .unwrap();
        let html = String::from_utf8_lossy(&html.bytes);

        let lazy_pos = html.find("scripts/lazy.js").unwrap();
        let main_pos = html.find("scripts/main.js").unwrap();
        assert!(lazy_pos < main_pos, "dependency chunk must load before entry");
        assert!(html.contains("<div id=\"app\"></div>"));
    }

    #[test]
    fn test_manifest_entries() {
        let (graph, chunks, config) = fixture(Mode::Development, b"imagebytes-imagebytes");
        let plan = Emitter::new(config).plan(&graph, &chunks).unwrap();

        assert_eq!(plan.manifest.len(), 3);
        assert_eq!(plan.manifest["main.js"], "scripts/main.js");
        assert_eq!(plan.manifest["main.css"], "styles/main.css");
        assert_eq!(plan.manifest["src/logo.png"], "images/logo.png");
    }

    #[test]
    fn test_write_produces_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default_config(dir.path());
        config.output.html.enabled = false;
        config.output.manifest = false;
        let config = Arc::new(config);

        let plan = EmitPlan {
            artifacts: vec![Artifact {
                path: PathBuf::from("scripts/main.js"),
                bytes: b"bundle".to_vec(),
                chunk: Some(0),
                source: None,
            }],
            manifest: BTreeMap::new(),
        };

        Emitter::new(config).write(&plan).unwrap();

        let written = fs::read(dir.path().join("dist/scripts/main.js")).unwrap();
        assert_eq!(written, b"bundle");
    }
}
