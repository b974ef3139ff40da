//! File-level dependency graph.
//!
//! Import references are resolved against the scanned file set with
//! language-appropriate path rules. Imports that resolve to no in-repo file
//! become external edges (`to = None`). Repeated imports of the same module
//! from the same file collapse into one counted edge.

use crate::types::{DependencyEdge, FileId, Language, RefKind, Reference, SourceFile};
use petgraph::algo::tarjan_scc;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

#[derive(Debug)]
pub struct DependencyGraph {
    graph: StableGraph<FileId, u32>,
    nodes: HashMap<FileId, NodeIndex>,
    edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    /// Build the graph from scanned files and their import references.
    pub fn build(files: &[SourceFile], references: &[Reference]) -> Self {
        let mut graph = StableGraph::new();
        let mut nodes = HashMap::new();
        for file in files {
            nodes.insert(file.id, graph.add_node(file.id));
        }

        let by_path: HashMap<PathBuf, FileId> =
            files.iter().map(|f| (f.rel_path.clone(), f.id)).collect();
        let by_id: HashMap<FileId, &SourceFile> = files.iter().map(|f| (f.id, f)).collect();

        // (from, target) -> index into edges, for count collapsing.
        let mut seen: HashMap<(FileId, Option<FileId>, String), usize> = HashMap::new();
        let mut edges: Vec<DependencyEdge> = Vec::new();

        for reference in references {
            if reference.kind != RefKind::Import {
                continue;
            }
            let Some(from) = by_id.get(&reference.file) else {
                continue;
            };
            let target = resolve_import(from, &reference.name, &by_path);

            let key = (reference.file, target, reference.name.clone());
            match seen.get(&key) {
                Some(&i) => edges[i].count += 1,
                None => {
                    seen.insert(key, edges.len());
                    edges.push(DependencyEdge {
                        from: reference.file,
                        to: target,
                        module: reference.name.clone(),
                        count: 1,
                    });
                }
            }
        }

        for edge in &edges {
            if let Some(to) = edge.to {
                if let (Some(&a), Some(&b)) = (nodes.get(&edge.from), nodes.get(&to)) {
                    match graph.find_edge(a, b) {
                        Some(e) => {
                            if let Some(w) = graph.edge_weight_mut(e) {
                                *w += edge.count;
                            }
                        }
                        None => {
                            graph.add_edge(a, b, edge.count);
                        }
                    }
                }
            }
        }

        Self {
            graph,
            nodes,
            edges,
        }
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// In-repo files this file imports.
    pub fn imports_of(&self, file: FileId) -> Vec<FileId> {
        let Some(&node) = self.nodes.get(&file) else {
            return Vec::new();
        };
        let mut out: Vec<FileId> = self
            .graph
            .edges_directed(node, petgraph::Direction::Outgoing)
            .map(|e| self.graph[e.target()])
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Files importing this file.
    pub fn imported_by(&self, file: FileId) -> Vec<FileId> {
        let Some(&node) = self.nodes.get(&file) else {
            return Vec::new();
        };
        let mut out: Vec<FileId> = self
            .graph
            .edges_directed(node, petgraph::Direction::Incoming)
            .map(|e| self.graph[e.source()])
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// External module texts imported by this file, deduped.
    pub fn external_imports_of(&self, file: FileId) -> Vec<String> {
        let mut out: Vec<String> = self
            .edges
            .iter()
            .filter(|e| e.from == file && e.to.is_none())
            .map(|e| e.module.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Strongly connected components with more than one file, plus
    /// self-importing files. Sorted for stable output.
    pub fn cycles(&self) -> Vec<Vec<FileId>> {
        let mut out = Vec::new();
        for scc in tarjan_scc(&self.graph) {
            let is_cycle = scc.len() > 1
                || scc
                    .first()
                    .is_some_and(|&n| self.graph.find_edge(n, n).is_some());
            if is_cycle {
                let mut files: Vec<FileId> = scc.iter().map(|&n| self.graph[n]).collect();
                files.sort();
                out.push(files);
            }
        }
        out.sort();
        out
    }
}

/// Resolve one import text to an in-repo file, or `None` for external.
fn resolve_import(
    from: &SourceFile,
    module: &str,
    by_path: &HashMap<PathBuf, FileId>,
) -> Option<FileId> {
    match from.language {
        Language::TypeScript | Language::Tsx => resolve_ts(from, module, by_path),
        Language::Python => resolve_python(from, module, by_path),
        Language::Rust => resolve_rust(from, module, by_path),
        Language::PlainText => None,
    }
}

fn resolve_ts(
    from: &SourceFile,
    module: &str,
    by_path: &HashMap<PathBuf, FileId>,
) -> Option<FileId> {
    // Bare specifiers are packages.
    if !module.starts_with("./") && !module.starts_with("../") && module != "." && module != ".." {
        return None;
    }
    let dir = from.rel_path.parent().unwrap_or_else(|| Path::new(""));
    let base = normalize(&dir.join(module));

    if let Some(&id) = by_path.get(&base) {
        return Some(id);
    }
    for ext in ["ts", "tsx", "js", "jsx"] {
        let mut cand = base.clone();
        cand.set_extension(ext);
        if let Some(&id) = by_path.get(&cand) {
            return Some(id);
        }
    }
    for index in ["index.ts", "index.tsx"] {
        if let Some(&id) = by_path.get(&base.join(index)) {
            return Some(id);
        }
    }
    None
}

fn resolve_python(
    from: &SourceFile,
    module: &str,
    by_path: &HashMap<PathBuf, FileId>,
) -> Option<FileId> {
    let dots = module.chars().take_while(|&c| c == '.').count();
    let rest = &module[dots..];

    let base = if dots > 0 {
        // One dot is the containing package; each further dot climbs one.
        let mut dir = from.rel_path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
        for _ in 1..dots {
            dir = dir.parent().map(Path::to_path_buf)?;
        }
        if rest.is_empty() {
            dir
        } else {
            dir.join(rest.replace('.', "/"))
        }
    } else {
        PathBuf::from(rest.replace('.', "/"))
    };

    let mut module_file = base.clone();
    module_file.set_extension("py");
    if let Some(&id) = by_path.get(&module_file) {
        return Some(id);
    }
    if let Some(&id) = by_path.get(&base.join("__init__.py")) {
        return Some(id);
    }
    None
}

fn resolve_rust(
    from: &SourceFile,
    module: &str,
    by_path: &HashMap<PathBuf, FileId>,
) -> Option<FileId> {
    let segments: Vec<&str> = module.split("::").collect();
    let (first, rest) = segments.split_first()?;

    let bases: Vec<PathBuf> = match *first {
        "crate" => vec![PathBuf::from("src"), PathBuf::from("lib"), PathBuf::new()],
        "self" => vec![from
            .rel_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .to_path_buf()],
        "super" => {
            let dir = from.rel_path.parent().unwrap_or_else(|| Path::new(""));
            vec![dir.parent().map(Path::to_path_buf)?]
        }
        _ => return None,
    };

    // Drop trailing segments until a module file matches; `crate::a::b::Item`
    // should land on a/b.rs.
    for cut in (1..=rest.len()).rev() {
        let path: PathBuf = rest[..cut].iter().collect();
        for base in &bases {
            let mut module_file = base.join(&path);
            module_file.set_extension("rs");
            if let Some(&id) = by_path.get(&module_file) {
                return Some(id);
            }
            if let Some(&id) = by_path.get(&base.join(&path).join("mod.rs")) {
                return Some(id);
            }
        }
    }
    None
}

/// Collapse `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
