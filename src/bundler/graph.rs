//! Module graph data structures

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Unique identifier for a module
pub type ModuleId = usize;

/// File kinds the pipeline can handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Script,
    Style,
    Font,
    Image,
    Markup,
    Data,
    Other,
}

impl FileKind {
    /// Determine file kind from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" => FileKind::Script,
            "css" => FileKind::Style,
            "woff" | "woff2" | "ttf" | "otf" | "eot" => FileKind::Font,
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "ico" | "webp" => FileKind::Image,
            "html" | "htm" => FileKind::Markup,
            "json" => FileKind::Data,
            _ => FileKind::Other,
        }
    }

    /// Detect kind from a path
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(FileKind::from_extension)
            .unwrap_or(FileKind::Other)
    }

    /// Whether content of this kind is UTF-8 text the pipeline can rewrite
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            FileKind::Script | FileKind::Style | FileKind::Markup | FileKind::Data
        )
    }

    /// Whether modules of this kind are concatenated into chunk bundles.
    /// Everything else is emitted standalone or inlined as a data URI.
    pub fn is_bundled(&self) -> bool {
        matches!(self, FileKind::Script | FileKind::Style | FileKind::Data)
    }
}

/// A module in the dependency graph
#[derive(Debug, Clone)]
pub struct Module {
    /// Canonical path to the module
    pub path: PathBuf,

    /// File kind
    pub kind: FileKind,

    /// Content after the pre phase (raw bytes for binary assets)
    pub source: Vec<u8>,

    /// Whether this is an entry point
    pub is_entry: bool,

    /// Statically referenced module IDs, in discovery order
    pub deps: Vec<ModuleId>,

    /// Dynamically referenced module IDs (chunk split points)
    pub dynamic_deps: Vec<ModuleId>,

    /// Content after the primary phase
    pub output: Option<Vec<u8>>,

    /// Data URI, set when the module was inlined instead of emitted
    pub inlined: Option<String>,
}

impl Module {
    /// The bytes downstream consumers should read: transformed if present
    pub fn content(&self) -> &[u8] {
        self.output.as_deref().unwrap_or(&self.source)
    }
}

/// The module dependency graph
///
/// Modules are stored in discovery order; IDs are indices. Duplicate adds
/// for the same canonical path return the existing ID.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    /// All modules, indexed by ID
    modules: Vec<Module>,

    /// Map from canonical path to module ID
    path_to_id: HashMap<PathBuf, ModuleId>,

    /// Reference text resolution: (importer, reference) -> target module.
    /// Used at emit time to rewrite references into output URLs.
    reference_map: HashMap<(ModuleId, String), ModuleId>,
}

impl ModuleGraph {
    /// Create a new empty module graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module to the graph, returning its ID.
    /// Adding the same canonical path twice returns the original ID.
    pub fn add_module(&mut self, module: Module) -> ModuleId {
        if let Some(&id) = self.path_to_id.get(&module.path) {
            return id;
        }

        let id = self.modules.len();
        self.path_to_id.insert(module.path.clone(), id);
        self.modules.push(module);
        id
    }

    /// Record that `from` references `to` via the given reference text
    pub fn add_dependency(&mut self, from: ModuleId, reference: &str, to: ModuleId, dynamic: bool) {
        let module = &mut self.modules[from];
        if dynamic {
            if !module.dynamic_deps.contains(&to) {
                module.dynamic_deps.push(to);
            }
        } else if !module.deps.contains(&to) {
            module.deps.push(to);
        }

        self.reference_map.insert((from, reference.to_string()), to);
    }

    /// Get module ID from canonical path
    pub fn get_module_id(&self, path: &Path) -> Option<ModuleId> {
        self.path_to_id.get(path).copied()
    }

    /// Get a module by ID
    pub fn get_module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    /// Get a mutable reference to a module
    pub fn get_module_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(id)
    }

    /// All module IDs in discovery order
    pub fn all_module_ids(&self) -> Vec<ModuleId> {
        (0..self.modules.len()).collect()
    }

    /// The reference texts recorded for a module, with their targets
    pub fn references_of(&self, id: ModuleId) -> Vec<(&str, ModuleId)> {
        let mut refs: Vec<(&str, ModuleId)> = self
            .reference_map
            .iter()
            .filter(|((from, _), _)| *from == id)
            .map(|((_, reference), &to)| (reference.as_str(), to))
            .collect();
        // HashMap iteration order is arbitrary; keep rewrites deterministic
        refs.sort();
        refs
    }

    /// All modules reachable from `start` via static and dynamic edges (BFS)
    pub fn reachable_from(&self, start: ModuleId) -> Vec<ModuleId> {
        let mut visited = HashSet::new();
        let mut result = Vec::new();
        let mut queue = VecDeque::new();

        queue.push_back(start);
        visited.insert(start);

        while let Some(id) = queue.pop_front() {
            result.push(id);

            let module = &self.modules[id];
            for &dep in module.deps.iter().chain(module.dynamic_deps.iter()) {
                if visited.insert(dep) {
                    queue.push_back(dep);
                }
            }
        }

        result
    }

    /// Iterate over all modules in discovery order
    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules.iter().enumerate()
    }

    /// Total number of modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if graph is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
