//! Chunk partitioning for code splitting
//!
//! Splits the module graph into chunks at dynamic-import boundaries. Every
//! module belongs to exactly one chunk; a module reachable from two
//! boundaries goes to the chunk that discovered it first (breadth-first,
//! in declaration order), which keeps assignment deterministic.

use std::collections::{HashMap, HashSet, VecDeque};

use super::graph::{ModuleGraph, ModuleId};

/// Unique identifier for a chunk
pub type ChunkId = usize;

/// Type of chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// Entry point chunk - loaded immediately
    Entry,
    /// Async chunk - loaded on demand via dynamic import
    Async,
}

/// A chunk is a group of modules emitted as one cohesive output unit
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Chunk id
    pub id: ChunkId,

    /// Chunk name (used for output filenames)
    pub name: String,

    /// Type of chunk
    pub kind: ChunkKind,

    /// The module this chunk starts from
    pub entry: ModuleId,

    /// Module IDs assigned to this chunk, in discovery order
    pub modules: Vec<ModuleId>,

    /// Chunks this chunk loads dynamically
    pub depends_on: Vec<ChunkId>,
}

impl Chunk {
    pub fn is_entry(&self) -> bool {
        self.kind == ChunkKind::Entry
    }
}

/// Result of partitioning the module graph
#[derive(Debug, Default)]
pub struct ChunkGraph {
    chunks: Vec<Chunk>,
    module_to_chunk: HashMap<ModuleId, ChunkId>,
}

impl ChunkGraph {
    /// Partition the graph starting from the given entries, in order.
    ///
    /// Entry chunks are created first; each dynamic-import target found
    /// while assigning a chunk opens a new async chunk. The boundary work
    /// list is processed breadth-first, so chunk ids and module assignment
    /// depend only on graph shape and entry order.
    pub fn partition(graph: &ModuleGraph, entries: &[(String, ModuleId)]) -> Self {
        let mut chunk_graph = ChunkGraph::default();
        let mut used_names: HashSet<String> = HashSet::new();

        // (name, boundary module, kind, chunk that discovered it)
        let mut boundaries: VecDeque<(String, ModuleId, ChunkKind, Option<ChunkId>)> =
            VecDeque::new();
        let mut boundary_seen: HashSet<ModuleId> = HashSet::new();

        for (name, entry_id) in entries {
            if boundary_seen.insert(*entry_id) {
                boundaries.push_back((name.clone(), *entry_id, ChunkKind::Entry, None));
            }
        }

        while let Some((name, start, kind, discovered_by)) = boundaries.pop_front() {
            let chunk_id = chunk_graph.chunks.len();
            chunk_graph.chunks.push(Chunk {
                id: chunk_id,
                name: unique_name(&name, &mut used_names),
                kind,
                entry: start,
                modules: Vec::new(),
                depends_on: Vec::new(),
            });

            if let Some(parent) = discovered_by {
                chunk_graph.chunks[parent].depends_on.push(chunk_id);
            }

            chunk_graph.assign(graph, start, chunk_id, &mut boundaries, &mut boundary_seen);
        }

        chunk_graph
    }

    /// Assign modules reachable from `start` over static edges, stopping at
    /// other chunk boundaries and at modules already claimed by an earlier
    /// chunk. Dynamic targets encountered along the way are queued as new
    /// boundaries.
    fn assign(
        &mut self,
        graph: &ModuleGraph,
        start: ModuleId,
        chunk_id: ChunkId,
        boundaries: &mut VecDeque<(String, ModuleId, ChunkKind, Option<ChunkId>)>,
        boundary_seen: &mut HashSet<ModuleId>,
    ) {
        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(id) = queue.pop_front() {
            if self.module_to_chunk.contains_key(&id) {
                continue;
            }
            // Other boundaries get their own chunk
            if id != start && boundary_seen.contains(&id) {
                continue;
            }

            self.module_to_chunk.insert(id, chunk_id);
            self.chunks[chunk_id].modules.push(id);

            let module = graph.get_module(id).expect("module in graph");

            for &dep in &module.deps {
                if !self.module_to_chunk.contains_key(&dep) {
                    queue.push_back(dep);
                }
            }

            for &dyn_dep in &module.dynamic_deps {
                if boundary_seen.insert(dyn_dep) {
                    let name = graph
                        .get_module(dyn_dep)
                        .map(|m| chunk_name_for(&m.path))
                        .unwrap_or_else(|| "chunk".to_string());
                    boundaries.push_back((name, dyn_dep, ChunkKind::Async, Some(chunk_id)));
                }
            }
        }
    }

    /// All chunks in creation order
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Chunks in load order: async dependencies first, entries last
    pub fn chunks_in_load_order(&self) -> Vec<&Chunk> {
        let mut ordered: Vec<&Chunk> = self.chunks.iter().filter(|c| !c.is_entry()).collect();
        ordered.extend(self.chunks.iter().filter(|c| c.is_entry()));
        ordered
    }

    /// The chunk a module was assigned to
    pub fn chunk_of(&self, module_id: ModuleId) -> Option<ChunkId> {
        self.module_to_chunk.get(&module_id).copied()
    }

    /// Get a chunk by id
    pub fn get(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    /// Number of chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Check if there are no chunks
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Derive an async chunk name from its boundary module path
fn chunk_name_for(path: &std::path::Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("chunk")
        .to_string()
}

/// Deduplicate chunk names with a numeric suffix
fn unique_name(base: &str, used: &mut HashSet<String>) -> String {
    if used.insert(base.to_string()) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::graph::{FileKind, Module};
    use std::path::PathBuf;

    fn module(path: &str) -> Module {
        Module {
            path: PathBuf::from(path),
            kind: FileKind::Script,
            source: Vec::new(),
            is_entry: false,
            deps: Vec::new(),
            dynamic_deps: Vec::new(),
            output: None,
            inlined: None,
        }
    }

    #[test]
    fn test_single_chunk_without_dynamic_imports() {
        let mut graph = ModuleGraph::new();
        let a = graph.add_module(module("/a.js"));
        let b = graph.add_module(module("/b.js"));
        graph.add_dependency(a, "./b", b, false);

        let chunks = ChunkGraph::partition(&graph, &[("main".to_string(), a)]);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks.chunks()[0].name, "main");
        assert_eq!(chunks.chunks()[0].modules, vec![a, b]);
    }

    #[test]
    fn test_dynamic_import_opens_new_chunk() {
        let mut graph = ModuleGraph::new();
        let a = graph.add_module(module("/a.js"));
        let lazy = graph.add_module(module("/lazy.js"));
        let util = graph.add_module(module("/util.js"));
        graph.add_dependency(a, "./lazy", lazy, true);
        graph.add_dependency(lazy, "./util", util, false);

        let chunks = ChunkGraph::partition(&graph, &[("main".to_string(), a)]);

        assert_eq!(chunks.len(), 2);
        let main = &chunks.chunks()[0];
        let lazy_chunk = &chunks.chunks()[1];
        assert!(main.is_entry());
        assert!(!lazy_chunk.is_entry());
        assert_eq!(lazy_chunk.name, "lazy");
        assert_eq!(lazy_chunk.modules, vec![lazy, util]);
        assert_eq!(main.depends_on, vec![lazy_chunk.id]);
    }

    #[test]
    fn test_every_module_in_exactly_one_chunk() {
        let mut graph = ModuleGraph::new();
        let a = graph.add_module(module("/a.js"));
        let b = graph.add_module(module("/b.js"));
        let c = graph.add_module(module("/c.js"));
        let d = graph.add_module(module("/d.js"));
        graph.add_dependency(a, "./b", b, false);
        graph.add_dependency(a, "./c", c, true);
        graph.add_dependency(c, "./d", d, false);
        graph.add_dependency(b, "./d", d, false);

        let chunks = ChunkGraph::partition(&graph, &[("main".to_string(), a)]);

        let mut seen = std::collections::HashSet::new();
        for chunk in chunks.chunks() {
            for &m in &chunk.modules {
                assert!(seen.insert(m), "module {m} assigned twice");
            }
        }
        assert_eq!(seen.len(), graph.len());
    }

    #[test]
    fn test_first_discovered_chunk_wins() {
        // Both lazy chunks reference shared; the first-created chunk claims it.
        let mut graph = ModuleGraph::new();
        let a = graph.add_module(module("/a.js"));
        let one = graph.add_module(module("/one.js"));
        let two = graph.add_module(module("/two.js"));
        let shared = graph.add_module(module("/shared.js"));
        graph.add_dependency(a, "./one", one, true);
        graph.add_dependency(a, "./two", two, true);
        graph.add_dependency(one, "./shared", shared, false);
        graph.add_dependency(two, "./shared", shared, false);

        let chunks = ChunkGraph::partition(&graph, &[("main".to_string(), a)]);

        assert_eq!(chunks.len(), 3);
        let one_chunk = chunks.chunk_of(one).unwrap();
        assert_eq!(chunks.chunk_of(shared), Some(one_chunk));

        // Re-partitioning yields the identical assignment
        let again = ChunkGraph::partition(&graph, &[("main".to_string(), a)]);
        assert_eq!(again.chunk_of(shared), Some(one_chunk));
    }

    #[test]
    fn test_load_order_puts_entries_last() {
        let mut graph = ModuleGraph::new();
        let a = graph.add_module(module("/a.js"));
        let lazy = graph.add_module(module("/lazy.js"));
        graph.add_dependency(a, "./lazy", lazy, true);

        let chunks = ChunkGraph::partition(&graph, &[("main".to_string(), a)]);
        let ordered: Vec<&str> = chunks
            .chunks_in_load_order()
            .iter()
            .map(|c| c.name.as_str())
            .collect();

        assert_eq!(ordered, vec!["lazy", "main"]);
    }

    #[test]
    fn test_chunk_name_collision_gets_suffix() {
        let mut graph = ModuleGraph::new();
        let a = graph.add_module(module("/a.js"));
        let v1 = graph.add_module(module("/widgets/view.js"));
        let v2 = graph.add_module(module("/panels/view.js"));
        graph.add_dependency(a, "./widgets/view", v1, true);
        graph.add_dependency(a, "./panels/view", v2, true);

        let chunks = ChunkGraph::partition(&graph, &[("main".to_string(), a)]);
        let names: Vec<&str> = chunks.chunks().iter().map(|c| c.name.as_str()).collect();

        assert_eq!(names, vec!["main", "view", "view-2"]);
    }
}
