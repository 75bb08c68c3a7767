//! Core bundler implementation
//!
//! Orchestrates one build: graph construction from the entry references,
//! concurrent module transforms, chunk partitioning, and artifact emission.
//!
//! Graph construction is a work-list traversal. Reference extraction is
//! file-kind specific, so it lives in the pipeline's pre phase and runs
//! while the graph is built; primary transforms run afterwards, in
//! parallel, bounded by the configured concurrency. A primary step may
//! discover further references (an embedded asset path), which feed back
//! into the work list, so the loop alternates between graph growth and
//! transform rounds until both are exhausted.

mod chunk;
mod graph;

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::{Config, ErrorPolicy};
use crate::emitter::Emitter;
use crate::error::{BuildError, BuildWarning};
use crate::plugins::PluginHost;
use crate::resolver::Resolver;
use crate::transform::{Discovered, Pipeline};
use crate::utils::data_uri;

pub use chunk::{Chunk, ChunkGraph, ChunkId, ChunkKind};
pub use graph::{FileKind, Module, ModuleGraph, ModuleId};

/// Cooperative cancellation handle.
///
/// Cancelling stops the scheduling of new module transforms; in-flight
/// work finishes, and the build returns [`BuildError::Cancelled`] before
/// anything is written to the output root.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Information about one written artifact
#[derive(Debug)]
pub struct ArtifactInfo {
    /// Absolute output file path
    pub output_path: PathBuf,

    /// Artifact size in bytes
    pub size: usize,
}

/// Result of a build operation
#[derive(Debug)]
pub struct BuildResult {
    /// Written artifacts
    pub artifacts: Vec<ArtifactInfo>,

    /// Mapping from source reference to emitted path
    pub manifest: BTreeMap<String, String>,

    /// Non-fatal problems recorded during the build
    pub warnings: Vec<BuildWarning>,

    /// Number of modules in the graph
    pub module_count: usize,

    /// Number of chunks emitted
    pub chunk_count: usize,
}

/// A module reference waiting to be resolved and ingested
struct PendingRef {
    /// The reference text as written in source
    reference: String,

    /// The referencing module, if any (entries have none)
    importer: Option<(ModuleId, PathBuf)>,

    /// Whether this is a dynamic reference (a chunk split point)
    dynamic: bool,

    /// Entry name when this reference is a configured entry
    entry_name: Option<String>,
}

/// The main bundler
pub struct Bundler {
    /// Project configuration (the build context; immutable for the build)
    config: Arc<Config>,

    /// Module resolver
    resolver: Resolver,

    /// Transform pipeline
    pipeline: Arc<Pipeline>,

    /// Plugin registry
    plugins: PluginHost,

    /// Module graph
    graph: Arc<RwLock<ModuleGraph>>,

    /// Cancellation flag
    cancel: CancelToken,
}

impl Bundler {
    /// Create a new bundler instance
    pub fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let resolver = Resolver::new(config.clone());
        let pipeline = Arc::new(Pipeline::new(config.clone())?);
        let plugins = PluginHost::from_config(&config)?;

        Ok(Self {
            config,
            resolver,
            pipeline,
            plugins,
            graph: Arc::new(RwLock::new(ModuleGraph::new())),
            cancel: CancelToken::new(),
        })
    }

    /// Handle for cancelling this build from another task
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Build the project
    pub async fn build(&self) -> std::result::Result<BuildResult, BuildError> {
        let start = Instant::now();
        let mut warnings = Vec::new();

        info!("Building module graph...");

        let mut queue: VecDeque<PendingRef> = VecDeque::new();
        for (name, reference) in self.config.all_entries() {
            queue.push_back(PendingRef {
                reference,
                importer: None,
                dynamic: false,
                entry_name: Some(name),
            });
        }

        let mut entry_ids: Vec<(String, ModuleId)> = Vec::new();
        let mut transformed: HashSet<ModuleId> = HashSet::new();

        loop {
            while let Some(pending) = queue.pop_front() {
                self.ingest(pending, &mut queue, &mut entry_ids, &mut warnings)
                    .await?;
            }

            let pending_ids: Vec<ModuleId> = {
                let graph = self.graph.read();
                graph
                    .all_module_ids()
                    .into_iter()
                    .filter(|id| !transformed.contains(id))
                    .collect()
            };
            if pending_ids.is_empty() {
                break;
            }

            if self.cancel.is_cancelled() {
                return Err(self.cancelled(&transformed));
            }

            debug!("Transforming {} module(s)...", pending_ids.len());
            let discovered = self.transform_round(&pending_ids, &mut warnings).await?;
            transformed.extend(pending_ids);

            for (importer, path, d) in discovered {
                queue.push_back(PendingRef {
                    reference: d.reference,
                    importer: Some((importer, path)),
                    dynamic: d.dynamic,
                    entry_name: None,
                });
            }
        }

        info!("Generating chunks...");
        let chunk_graph = {
            let graph = self.graph.read();
            ChunkGraph::partition(&graph, &entry_ids)
        };

        if self.cancel.is_cancelled() {
            return Err(self.cancelled(&transformed));
        }

        info!("Writing artifacts...");
        let emitter = Emitter::new(self.config.clone());
        let plan = {
            let graph = self.graph.read();
            emitter.plan(&graph, &chunk_graph)?
        };
        emitter.write(&plan)?;

        let plugin_warnings = self.plugins.run_after_emit(&plan.artifacts).await?;
        warnings.extend(plugin_warnings.into_iter().map(BuildWarning::Plugin));

        debug!("Build completed in {:?}", start.elapsed());

        let out_dir = self.config.output_dir();
        Ok(BuildResult {
            artifacts: plan
                .artifacts
                .iter()
                .map(|a| ArtifactInfo {
                    output_path: out_dir.join(&a.path),
                    size: a.bytes.len(),
                })
                .collect(),
            manifest: plan.manifest,
            warnings,
            module_count: self.graph.read().len(),
            chunk_count: chunk_graph.len(),
        })
    }

    /// Resolve one pending reference and add its module to the graph.
    ///
    /// Deduplication happens here: a reference to an already-known
    /// canonical path only records the edge. New modules get the
    /// `before_build` hook and the pre-phase chain (reference extraction);
    /// references found there are queued.
    async fn ingest(
        &self,
        pending: PendingRef,
        queue: &mut VecDeque<PendingRef>,
        entry_ids: &mut Vec<(String, ModuleId)>,
        warnings: &mut Vec<BuildWarning>,
    ) -> std::result::Result<(), BuildError> {
        let importer_path = pending
            .importer
            .as_ref()
            .map(|(_, path)| path.clone())
            .unwrap_or_else(|| self.config.root.clone());

        let reference = self
            .plugins
            .rewrite_reference(&pending.reference, &importer_path);

        let resolved = match &pending.importer {
            Some((_, path)) => self.resolver.resolve(&reference, path)?,
            None => self.resolver.resolve_entry(&reference)?,
        };

        let existing = self.graph.read().get_module_id(&resolved.path);
        let id = match existing {
            Some(id) => id,
            None => {
                let raw = fs::read(&resolved.path).map_err(|source| BuildError::Read {
                    path: resolved.path.clone(),
                    source,
                })?;

                let content = if resolved.kind.is_text() {
                    match String::from_utf8(raw) {
                        Ok(text) => {
                            let (text, plugin_warnings) =
                                self.plugins.run_before_build(text, &resolved.path).await?;
                            warnings.extend(plugin_warnings.into_iter().map(BuildWarning::Plugin));
                            text.into_bytes()
                        }
                        Err(e) => e.into_bytes(),
                    }
                } else {
                    raw
                };

                let is_entry = pending.entry_name.is_some();
                let (content, discovered) =
                    match self
                        .pipeline
                        .run_pre(resolved.kind, &resolved.path, content.clone())
                    {
                        Ok(result) => result,
                        Err(err)
                            if self.config.build.on_transform_error == ErrorPolicy::Skip
                                && !is_entry =>
                        {
                            warn!("{err}");
                            warnings.push(BuildWarning::TransformSkipped(err));
                            (content, Vec::new())
                        }
                        Err(err) => return Err(err.into()),
                    };

                let id = self.graph.write().add_module(Module {
                    path: resolved.path.clone(),
                    kind: resolved.kind,
                    source: content,
                    is_entry,
                    deps: Vec::new(),
                    dynamic_deps: Vec::new(),
                    output: None,
                    inlined: None,
                });

                for d in discovered {
                    queue.push_back(PendingRef {
                        reference: d.reference,
                        importer: Some((id, resolved.path.clone())),
                        dynamic: d.dynamic,
                        entry_name: None,
                    });
                }

                id
            }
        };

        if let Some((importer_id, _)) = pending.importer {
            self.graph
                .write()
                .add_dependency(importer_id, &pending.reference, id, pending.dynamic);
        }
        if let Some(name) = pending.entry_name {
            entry_ids.push((name, id));
        }

        Ok(())
    }

    /// Run primary transforms for one round of modules, concurrently.
    ///
    /// Modules have no data dependency on each other's transform output,
    /// so each runs in its own task, bounded by a semaphore sized from the
    /// configured concurrency. Cancellation stops scheduling; in-flight
    /// tasks are still awaited.
    async fn transform_round(
        &self,
        ids: &[ModuleId],
        warnings: &mut Vec<BuildWarning>,
    ) -> std::result::Result<Vec<(ModuleId, PathBuf, Discovered)>, BuildError> {
        let semaphore = Arc::new(Semaphore::new(self.config.build.concurrency));
        let mut scheduled = Vec::new();

        for &id in ids {
            if self.cancel.is_cancelled() {
                break;
            }

            let (kind, path, content) = {
                let graph = self.graph.read();
                let module = graph.get_module(id).expect("scheduled module in graph");
                (module.kind, module.path.clone(), module.source.clone())
            };

            let pipeline = self.pipeline.clone();
            let semaphore = semaphore.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore never closed");
                let result = pipeline.run_primary(kind, &path, content);
                (path, result)
            });
            scheduled.push((id, kind, handle));
        }

        let cancelled_early = scheduled.len() < ids.len();
        let mut discovered_all = Vec::new();

        for (id, kind, handle) in scheduled {
            let (path, result) = handle.await.expect("transform task panicked");
            match result {
                Ok((content, discovered)) => {
                    let inlined = self.inline_decision(kind, &path, &content);
                    {
                        let mut graph = self.graph.write();
                        let module = graph.get_module_mut(id).expect("module in graph");
                        module.output = Some(content);
                        module.inlined = inlined;
                    }
                    for d in discovered {
                        discovered_all.push((id, path.clone(), d));
                    }
                }
                Err(err) => {
                    let is_entry = self
                        .graph
                        .read()
                        .get_module(id)
                        .map(|m| m.is_entry)
                        .unwrap_or(false);
                    if self.config.build.on_transform_error == ErrorPolicy::Skip && !is_entry {
                        warn!("{err}");
                        warnings.push(BuildWarning::TransformSkipped(err));
                    } else {
                        return Err(err.into());
                    }
                }
            }
        }

        if cancelled_early {
            let completed = {
                let graph = self.graph.read();
                graph.iter().filter(|(_, m)| m.output.is_some()).count()
            };
            return Err(BuildError::Cancelled {
                completed,
                total: self.graph.read().len(),
            });
        }

        Ok(discovered_all)
    }

    /// Whether an asset module's final content falls under its matched
    /// inline threshold; bundled kinds are never inlined.
    fn inline_decision(
        &self,
        kind: FileKind,
        path: &std::path::Path,
        content: &[u8],
    ) -> Option<String> {
        if kind.is_bundled() {
            return None;
        }
        let limit = self.pipeline.inline_limit_for(kind, path)?;
        if (content.len() as u64) < limit {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("bin");
            Some(data_uri(content, ext))
        } else {
            None
        }
    }

    fn cancelled(&self, transformed: &HashSet<ModuleId>) -> BuildError {
        BuildError::Cancelled {
            completed: transformed.len(),
            total: self.graph.read().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn project() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let config = Config::default_config(root);
        (dir, config)
    }

    fn write(dir: &Path, rel: &str, content: &[u8]) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_build_small_project_with_cycle() {
        let (dir, mut config) = project();
        // a and b reference each other; both reference util
        write(dir.path(), "src/main.js", b"import a from './a';");
        write(dir.path(), "src/a.js", b"import b from './b'; import u from './util';");
        write(dir.path(), "src/b.js", b"import a from './a'; import u from './util';");
        write(dir.path(), "src/util.js", b"export const u = 1;");
        config.entries.insert("main".to_string(), "./src/main".to_string());

        let bundler = Bundler::new(config).unwrap();
        let result = bundler.build().await.unwrap();

        // util referenced twice, one node; cycle did not loop
        assert_eq!(result.module_count, 4);
        assert_eq!(result.chunk_count, 1);
        assert!(result.warnings.is_empty());

        let script = result
            .artifacts
            .iter()
            .find(|a| a.output_path.to_string_lossy().contains("scripts/"))
            .unwrap();
        let bundle = fs::read_to_string(&script.output_path).unwrap();
        assert_eq!(bundle.matches("export const u = 1;").count(), 1);
    }

    #[tokio::test]
    async fn test_dynamic_import_emits_second_script() {
        let (dir, mut config) = project();
        write(dir.path(), "src/main.js", b"const p = import('./panel');");
        write(dir.path(), "src/panel.js", b"export const panel = true;");
        config.entries.insert("main".to_string(), "./src/main".to_string());

        let bundler = Bundler::new(config).unwrap();
        let result = bundler.build().await.unwrap();

        assert_eq!(result.chunk_count, 2);
        assert!(result.manifest.contains_key("main.js"));
        assert!(result.manifest.contains_key("panel.js"));
    }

    #[tokio::test]
    async fn test_missing_module_fails_with_candidates_and_writes_nothing() {
        let (dir, mut config) = project();
        write(dir.path(), "src/main.js", b"import m from './missing';");
        config.entries.insert("main".to_string(), "./src/main".to_string());

        let bundler = Bundler::new(config.clone()).unwrap();
        let err = bundler.build().await.unwrap_err();

        match err {
            BuildError::Resolution(e) => {
                assert_eq!(e.reference, "./missing");
                assert!(e.searched.len() > 1);
            }
            other => panic!("expected resolution error, got {other}"),
        }
        assert!(!config.output_dir().exists());
    }

    #[tokio::test]
    async fn test_transform_error_policy() {
        let (dir, mut config) = project();
        write(dir.path(), "src/main.js", b"import d from './data.json';");
        write(dir.path(), "src/data.json", b"not valid json");
        config.entries.insert("main".to_string(), "./src/main".to_string());

        // Default policy aborts
        let bundler = Bundler::new(config.clone()).unwrap();
        let err = bundler.build().await.unwrap_err();
        assert!(matches!(err, BuildError::Transform(_)));

        // Skip policy warns and completes
        config.build.on_transform_error = ErrorPolicy::Skip;
        let bundler = Bundler::new(config).unwrap();
        let result = bundler.build().await.unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].to_string().contains("json-module"));
    }

    #[tokio::test]
    async fn test_inline_threshold_behavior() {
        let (dir, mut config) = project();
        // Default rules inline images under 10240 bytes
        write(
            dir.path(),
            "src/main.js",
            b"import s from './small.png';\nimport l from './large.png';\nshow(s, l);",
        );
        write(dir.path(), "src/small.png", &[0u8; 16]);
        write(dir.path(), "src/large.png", &vec![0u8; 20000]);
        config.entries.insert("main".to_string(), "./src/main".to_string());

        let bundler = Bundler::new(config).unwrap();
        let result = bundler.build().await.unwrap();

        // Small asset never emitted standalone; large one always is
        assert!(!result
            .artifacts
            .iter()
            .any(|a| a.output_path.to_string_lossy().contains("small")));
        assert!(result
            .artifacts
            .iter()
            .any(|a| a.output_path.to_string_lossy().contains("large")));

        let script = result
            .artifacts
            .iter()
            .find(|a| a.output_path.to_string_lossy().contains("scripts/"))
            .unwrap();
        let bundle = fs::read_to_string(&script.output_path).unwrap();
        assert!(bundle.contains("data:image/png;base64,"));
        assert!(bundle.contains("/images/large.png"));
    }

    #[tokio::test]
    async fn test_cancelled_build_writes_nothing() {
        let (dir, mut config) = project();
        write(dir.path(), "src/main.js", b"export const x = 1;");
        config.entries.insert("main".to_string(), "./src/main".to_string());

        let bundler = Bundler::new(config.clone()).unwrap();
        bundler.cancel_token().cancel();

        let err = bundler.build().await.unwrap_err();
        assert!(matches!(err, BuildError::Cancelled { .. }));
        assert!(!config.output_dir().exists());
    }

    #[tokio::test]
    async fn test_reference_replacement_selects_environment_module() {
        let (dir, mut config) = project();
        write(dir.path(), "src/main.js", b"import cfg from './production';");
        write(dir.path(), "src/production.json", b"{\"api\": \"prod\"}");
        write(dir.path(), "src/staging.json", b"{\"api\": \"stage\"}");
        config.entries.insert("main".to_string(), "./src/main".to_string());
        config.env = "staging".to_string();

        let mut options = toml::Table::new();
        options.insert(
            "pattern".to_string(),
            toml::Value::String("\\./production$".to_string()),
        );
        options.insert(
            "replacement".to_string(),
            toml::Value::String("./[env].json".to_string()),
        );
        config.plugins.push(crate::config::PluginConfig {
            name: "replace".to_string(),
            options: Some(options),
        });

        let bundler = Bundler::new(config).unwrap();
        let result = bundler.build().await.unwrap();

        let script = result
            .artifacts
            .iter()
            .find(|a| a.output_path.to_string_lossy().contains("scripts/"))
            .unwrap();
        let bundle = fs::read_to_string(&script.output_path).unwrap();
        assert!(bundle.contains("stage"));
        assert!(!bundle.contains("prod\""));
    }
}
