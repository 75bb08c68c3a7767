//! Module resolution
//!
//! Turns a module reference as written in source into a canonical file path
//! plus a detected file kind. Relative references resolve against the
//! importer's directory; bare references are tried against each configured
//! resolution root in priority order, with the external package root last.
//! A directory reference probes the configured main-file names, and every
//! extension-less candidate probes the configured extension list in order.
//!
//! Resolution is deterministic: the same reference from the same location
//! always yields the same canonical path within one build. Results are
//! cached for the build's lifetime.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::bundler::FileKind;
use crate::config::Config;
use crate::error::ResolutionError;

/// A canonical file handle produced by resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Canonical path
    pub path: PathBuf,

    /// Detected file kind
    pub kind: FileKind,
}

/// Module resolver
pub struct Resolver {
    /// Project configuration
    config: Arc<Config>,

    /// Per-build resolution cache, keyed by (reference, importer directory)
    cache: DashMap<(String, PathBuf), Resolved>,
}

impl Resolver {
    /// Create a new resolver
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            cache: DashMap::new(),
        }
    }

    /// Resolve a reference from the file that contains it
    pub fn resolve(&self, reference: &str, from: &Path) -> Result<Resolved, ResolutionError> {
        let base = from.parent().unwrap_or(Path::new("."));
        self.resolve_in(reference, base, from)
    }

    /// Resolve an entry reference against the project root
    pub fn resolve_entry(&self, reference: &str) -> Result<Resolved, ResolutionError> {
        let root = self.config.root.clone();
        self.resolve_in(reference, &root, &root)
    }

    fn resolve_in(
        &self,
        reference: &str,
        base: &Path,
        importer: &Path,
    ) -> Result<Resolved, ResolutionError> {
        let cache_key = (reference.to_string(), base.to_path_buf());
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(cached.clone());
        }

        debug!("Resolving '{}' from '{}'", reference, base.display());

        let mut searched = Vec::new();

        let found = if reference.starts_with("./") || reference.starts_with("../") {
            probe(&base.join(reference), &self.config, &mut searched)
        } else if Path::new(reference).is_absolute() {
            probe(Path::new(reference), &self.config, &mut searched)
        } else {
            self.resolve_bare(reference, &mut searched)
        };

        let Some(path) = found else {
            return Err(ResolutionError {
                reference: reference.to_string(),
                importer: importer.to_path_buf(),
                searched,
            });
        };

        // Canonical form keys graph deduplication
        let path = std::fs::canonicalize(&path).map_err(|_| ResolutionError {
            reference: reference.to_string(),
            importer: importer.to_path_buf(),
            searched: searched.clone(),
        })?;

        let resolved = Resolved {
            kind: FileKind::from_path(&path),
            path,
        };

        debug!("Resolved to: {}", resolved.path.display());
        self.cache.insert(cache_key, resolved.clone());

        Ok(resolved)
    }

    /// Try a bare reference against each resolution root, then the
    /// external package root.
    fn resolve_bare(&self, reference: &str, searched: &mut Vec<PathBuf>) -> Option<PathBuf> {
        for root in self.config.resolution_roots() {
            if let Some(found) = probe(&root.join(reference), &self.config, searched) {
                return Some(found);
            }
        }

        if let Some(pkg_root) = self.config.package_root() {
            if let Some(found) = probe(&pkg_root.join(reference), &self.config, searched) {
                return Some(found);
            }
        }

        None
    }
}

/// Probe one candidate location: the exact path, then each configured
/// extension, then (for directories) each main-file name. Every path
/// attempted is recorded in `searched`.
fn probe(target: &Path, config: &Config, searched: &mut Vec<PathBuf>) -> Option<PathBuf> {
    searched.push(target.to_path_buf());
    if target.is_file() {
        return Some(target.to_path_buf());
    }

    for ext in &config.resolve.extensions {
        let candidate = append_extension(target, ext);
        searched.push(candidate.clone());
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    if target.is_dir() {
        for main in &config.resolve.main_files {
            let main_target = target.join(main);
            searched.push(main_target.clone());
            if main_target.is_file() {
                return Some(main_target);
            }

            for ext in &config.resolve.extensions {
                let candidate = append_extension(&main_target, ext);
                searched.push(candidate.clone());
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
    }

    None
}

/// Append an extension without replacing an existing dotted segment
/// ("theme.module" + "css" gives "theme.module.css").
fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(format!(".{ext}"));
    PathBuf::from(os)
}
