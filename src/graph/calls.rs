//! Symbol-level call graph.
//!
//! Name resolution runs in three tiers: definitions in the same file, then
//! definitions in directly imported files, then a repository-wide name
//! match. When a tier yields several candidates the reference stays
//! ambiguous and an edge is emitted to every candidate; no tie-break ever
//! picks a winner silently.

use crate::graph::deps::DependencyGraph;
use crate::types::{
    CallEdge, Confidence, FileId, RefKind, Reference, Resolution, SymbolDef, SymbolId,
};
use lasso::ThreadedRodeo;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

/// Traversal direction for [`CallGraph::traverse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Walk caller to callee edges.
    Callees,
    /// Walk callee to caller edges.
    Callers,
}

/// Result of a bounded traversal.
#[derive(Debug)]
pub struct TraversalResult {
    pub nodes: Vec<SymbolId>,
    pub edges: Vec<CallEdge>,
    pub depth_reached: usize,
    /// True when the deadline cut the walk short.
    pub truncated: bool,
}

#[derive(Debug)]
pub struct CallGraph {
    edges: Vec<CallEdge>,
    outgoing: HashMap<SymbolId, Vec<usize>>,
    incoming: HashMap<SymbolId, Vec<usize>>,
}

impl CallGraph {
    /// Resolve call and type references in place and derive the edge set.
    pub fn build(
        symbols: &[SymbolDef],
        references: &mut [Reference],
        deps: &DependencyGraph,
        interner: &ThreadedRodeo,
    ) -> Self {
        // Name -> definitions, repository-wide and per file. Keys are
        // interned handles so reference names hash cheaply.
        let mut global: HashMap<crate::types::InternedString, Vec<SymbolId>> = HashMap::new();
        let mut per_file: HashMap<(FileId, crate::types::InternedString), Vec<SymbolId>> =
            HashMap::new();
        for symbol in symbols {
            global.entry(symbol.name).or_default().push(symbol.id);
            per_file
                .entry((symbol.file, symbol.name))
                .or_default()
                .push(symbol.id);
        }
        let parent_name = |id: SymbolId| -> Option<crate::types::InternedString> {
            symbols[id.0 as usize]
                .parent
                .map(|p| symbols[p.0 as usize].name)
        };

        let mut edge_set: HashSet<CallEdge> = HashSet::new();
        let mut edges: Vec<CallEdge> = Vec::new();

        for reference in references.iter_mut() {
            if !matches!(reference.kind, RefKind::Call | RefKind::TypeReference) {
                continue;
            }

            let qualifier_text = reference.qualifier.as_deref();
            let qualifier = qualifier_text.and_then(|q| interner.get(q));
            // Returns the narrowed set and whether the qualifier pinned it.
            // A qualifier that names a candidate's enclosing type pins the
            // match; otherwise it proves nothing (it may be a variable) and
            // the full set stands.
            let narrow = |ids: &[SymbolId]| -> (Vec<SymbolId>, bool) {
                match qualifier {
                    Some(q) => {
                        let pinned: Vec<SymbolId> = ids
                            .iter()
                            .copied()
                            .filter(|&id| parent_name(id) == Some(q))
                            .collect();
                        if pinned.is_empty() {
                            (ids.to_vec(), false)
                        } else {
                            (pinned, true)
                        }
                    }
                    None => (ids.to_vec(), false),
                }
            };

            // A name no definition carries cannot resolve in any tier.
            let Some(name) = interner.get(&reference.name) else {
                reference.resolution = Resolution::Unresolved;
                continue;
            };
            let (candidates, confidence) = if let Some(local) =
                per_file.get(&(reference.file, name))
            {
                (narrow(local).0, Confidence::Exact)
            } else {
                let imported: Vec<SymbolId> = deps
                    .imports_of(reference.file)
                    .iter()
                    .filter_map(|f| per_file.get(&(*f, name)))
                    .flatten()
                    .copied()
                    .collect();
                if !imported.is_empty() {
                    let (ids, pinned) = narrow(&imported);
                    // The import hop alone only suggests the callee. It is
                    // proven when the qualifier names the binding: either a
                    // candidate's enclosing type or the imported module.
                    let via_module = qualifier_text.is_some_and(|q| {
                        ids.iter().any(|&id| {
                            let file = symbols[id.0 as usize].file;
                            deps.edges().iter().any(|e| {
                                e.from == reference.file
                                    && e.to == Some(file)
                                    && e.module.rsplit(['.', ':', '/']).next() == Some(q)
                            })
                        })
                    });
                    let confidence = if pinned || via_module {
                        Confidence::Exact
                    } else {
                        Confidence::Heuristic
                    };
                    (ids, confidence)
                } else if let Some(any) = global.get(&name) {
                    (narrow(any).0, Confidence::Heuristic)
                } else {
                    (Vec::new(), Confidence::Heuristic)
                }
            };

            reference.resolution = match candidates.len() {
                0 => Resolution::Unresolved,
                1 => Resolution::Resolved(candidates[0]),
                _ => Resolution::Ambiguous(candidates.clone()),
            };

            // Edges need a caller; module-level references resolve but do
            // not produce graph edges.
            let Some(caller) = reference.enclosing else {
                continue;
            };
            if reference.kind != RefKind::Call {
                continue;
            }
            for callee in candidates {
                let edge = CallEdge {
                    caller,
                    callee,
                    confidence,
                };
                if edge_set.insert(edge) {
                    edges.push(edge);
                }
            }
        }

        edges.sort_by_key(|e| (e.caller, e.callee));
        let mut outgoing: HashMap<SymbolId, Vec<usize>> = HashMap::new();
        let mut incoming: HashMap<SymbolId, Vec<usize>> = HashMap::new();
        for (i, edge) in edges.iter().enumerate() {
            outgoing.entry(edge.caller).or_default().push(i);
            incoming.entry(edge.callee).or_default().push(i);
        }

        Self {
            edges,
            outgoing,
            incoming,
        }
    }

    pub fn edges(&self) -> &[CallEdge] {
        &self.edges
    }

    pub fn callees_of(&self, id: SymbolId) -> Vec<CallEdge> {
        self.neighbors(&self.outgoing, id)
    }

    pub fn callers_of(&self, id: SymbolId) -> Vec<CallEdge> {
        self.neighbors(&self.incoming, id)
    }

    fn neighbors(&self, map: &HashMap<SymbolId, Vec<usize>>, id: SymbolId) -> Vec<CallEdge> {
        map.get(&id)
            .map(|ixs| ixs.iter().map(|&i| self.edges[i]).collect())
            .unwrap_or_default()
    }

    /// Breadth-first walk from `start`, bounded by hop depth and an optional
    /// deadline. Cycles terminate through the visited set; revisiting a node
    /// never loops.
    pub fn traverse(
        &self,
        start: SymbolId,
        direction: Direction,
        max_depth: usize,
        deadline: Option<Instant>,
    ) -> TraversalResult {
        let mut visited: HashSet<SymbolId> = HashSet::from([start]);
        let mut nodes = vec![start];
        let mut out_edges = Vec::new();
        let mut depth_reached = 0;
        let mut truncated = false;

        let mut frontier = VecDeque::from([(start, 0usize)]);
        'walk: while let Some((node, depth)) = frontier.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let step = match direction {
                Direction::Callees => self.callees_of(node),
                Direction::Callers => self.callers_of(node),
            };
            for edge in step {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    truncated = true;
                    break 'walk;
                }
                out_edges.push(edge);
                let next = match direction {
                    Direction::Callees => edge.callee,
                    Direction::Callers => edge.caller,
                };
                if visited.insert(next) {
                    nodes.push(next);
                    depth_reached = depth_reached.max(depth + 1);
                    frontier.push_back((next, depth + 1));
                }
            }
        }

        out_edges.sort_by_key(|e| (e.caller, e.callee));
        out_edges.dedup();
        TraversalResult {
            nodes,
            edges: out_edges,
            depth_reached,
            truncated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::deps::DependencyGraph;
    use crate::types::{Language, SourceFile, Span, SymbolKind};
    use std::path::PathBuf;

    struct Fixture {
        files: Vec<SourceFile>,
        symbols: Vec<SymbolDef>,
        references: Vec<Reference>,
        interner: ThreadedRodeo,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                files: Vec::new(),
                symbols: Vec::new(),
                references: Vec::new(),
                interner: ThreadedRodeo::default(),
            }
        }

        fn file(&mut self, rel_path: &str) -> FileId {
            let id = FileId(self.files.len() as u32);
            self.files.push(SourceFile {
                id,
                rel_path: PathBuf::from(rel_path),
                language: Language::Python,
                size: 0,
                modified_ms: 0,
                line_count: 1,
                is_binary: false,
            });
            id
        }

        fn symbol(&mut self, file: FileId, name: &str, parent: Option<SymbolId>) -> SymbolId {
            let id = SymbolId(self.symbols.len() as u32);
            let interned = self.interner.get_or_intern(name);
            self.symbols.push(SymbolDef {
                id,
                file,
                name: interned,
                qualified_name: interned,
                kind: SymbolKind::Function,
                signature: format!("def {name}()"),
                span: Span::default(),
                parent,
                doc_comment: None,
            });
            id
        }

        fn call(&mut self, file: FileId, from: SymbolId, name: &str) {
            self.references.push(Reference {
                file,
                span: Span::default(),
                name: name.to_string(),
                kind: RefKind::Call,
                qualifier: None,
                enclosing: Some(from),
                resolution: Resolution::Unresolved,
            });
        }

        fn import(&mut self, file: FileId, module: &str) {
            self.references.push(Reference {
                file,
                span: Span::default(),
                name: module.to_string(),
                kind: RefKind::Import,
                qualifier: None,
                enclosing: None,
                resolution: Resolution::Unresolved,
            });
        }

        fn build(&mut self) -> CallGraph {
            let deps = DependencyGraph::build(&self.files, &self.references);
            CallGraph::build(&self.symbols, &mut self.references, &deps, &self.interner)
        }
    }

    #[test]
    fn same_file_definition_wins_over_global() {
        let mut fx = Fixture::new();
        let a = fx.file("a.py");
        let b = fx.file("b.py");
        let caller = fx.symbol(a, "caller", None);
        let local = fx.symbol(a, "helper", None);
        let _far = fx.symbol(b, "helper", None);
        fx.call(a, caller, "helper");

        let graph = fx.build();
        assert_eq!(
            graph.edges(),
            &[CallEdge {
                caller,
                callee: local,
                confidence: Confidence::Exact,
            }]
        );
    }

    #[test]
    fn global_tie_emits_edge_to_every_candidate() {
        let mut fx = Fixture::new();
        let a = fx.file("a.py");
        let b = fx.file("b.py");
        let c = fx.file("c.py");
        let caller = fx.symbol(a, "run", None);
        let foo_b = fx.symbol(b, "foo", None);
        let foo_c = fx.symbol(c, "foo", None);
        fx.call(a, caller, "foo");

        let graph = fx.build();
        let callees: Vec<SymbolId> = graph.callees_of(caller).iter().map(|e| e.callee).collect();
        assert_eq!(callees, vec![foo_b, foo_c]);
        assert!(
            graph
                .edges()
                .iter()
                .all(|e| e.confidence == Confidence::Heuristic)
        );

        let call_ref = fx.references.iter().find(|r| r.kind == RefKind::Call).unwrap();
        assert_eq!(
            call_ref.resolution,
            Resolution::Ambiguous(vec![foo_b, foo_c])
        );
    }

    #[test]
    fn import_tier_beats_global_tier() {
        let mut fx = Fixture::new();
        let a = fx.file("a.py");
        let b = fx.file("b.py");
        let c = fx.file("c.py");
        let caller = fx.symbol(a, "run", None);
        let imported = fx.symbol(b, "foo", None);
        let _unrelated = fx.symbol(c, "foo", None);
        fx.import(a, "b");
        fx.call(a, caller, "foo");

        // A bare name through an import hop suggests the callee without
        // proving it, so the edge stays heuristic.
        let graph = fx.build();
        assert_eq!(
            graph.callees_of(caller),
            vec![CallEdge {
                caller,
                callee: imported,
                confidence: Confidence::Heuristic,
            }]
        );
    }

    #[test]
    fn module_qualifier_proves_the_import_hop() {
        let mut fx = Fixture::new();
        let a = fx.file("a.py");
        let b = fx.file("b.py");
        let caller = fx.symbol(a, "run", None);
        let imported = fx.symbol(b, "foo", None);
        fx.import(a, "b");
        fx.references.push(Reference {
            file: a,
            span: Span::default(),
            name: "foo".to_string(),
            kind: RefKind::Call,
            qualifier: Some("b".to_string()),
            enclosing: Some(caller),
            resolution: Resolution::Unresolved,
        });

        let graph = fx.build();
        assert_eq!(
            graph.callees_of(caller),
            vec![CallEdge {
                caller,
                callee: imported,
                confidence: Confidence::Exact,
            }]
        );
    }

    #[test]
    fn self_recursive_call_keeps_its_edge() {
        let mut fx = Fixture::new();
        let a = fx.file("a.py");
        let fact = fx.symbol(a, "fact", None);
        fx.call(a, fact, "fact");

        let graph = fx.build();
        assert_eq!(
            graph.edges(),
            &[CallEdge {
                caller: fact,
                callee: fact,
                confidence: Confidence::Exact,
            }]
        );

        let result = graph.traverse(fact, Direction::Callees, 5, None);
        assert_eq!(result.nodes, vec![fact]);
        assert_eq!(result.edges.len(), 1);
        assert!(!result.truncated);
    }

    #[test]
    fn traversal_terminates_on_cycles() {
        let mut fx = Fixture::new();
        let a = fx.file("a.py");
        let f = fx.symbol(a, "f", None);
        let g = fx.symbol(a, "g", None);
        fx.call(a, f, "g");
        fx.call(a, g, "f");

        let graph = fx.build();
        let result = graph.traverse(f, Direction::Callees, 10, None);
        assert_eq!(result.nodes.len(), 2);
        assert_eq!(result.edges.len(), 2);
        assert!(!result.truncated);
    }

    #[test]
    fn depth_limit_bounds_the_walk() {
        let mut fx = Fixture::new();
        let a = fx.file("a.py");
        let s0 = fx.symbol(a, "s0", None);
        let s1 = fx.symbol(a, "s1", None);
        let _s2 = fx.symbol(a, "s2", None);
        fx.call(a, s0, "s1");
        fx.call(a, s1, "s2");

        let graph = fx.build();
        let result = graph.traverse(s0, Direction::Callees, 1, None);
        assert_eq!(result.nodes.len(), 2);
        assert_eq!(result.depth_reached, 1);
    }

    #[test]
    fn qualifier_pins_method_candidates() {
        let mut fx = Fixture::new();
        let a = fx.file("a.py");
        let b = fx.file("b.py");
        let caller = fx.symbol(a, "run", None);
        let class_b = fx.symbol(b, "Store", None);
        let method_b = fx.symbol(b, "save", Some(class_b));
        let class_c = fx.symbol(b, "Cache", None);
        let _method_c = fx.symbol(b, "save", Some(class_c));
        fx.references.push(Reference {
            file: a,
            span: Span::default(),
            name: "save".to_string(),
            kind: RefKind::Call,
            qualifier: Some("Store".to_string()),
            enclosing: Some(caller),
            resolution: Resolution::Unresolved,
        });

        let graph = fx.build();
        let callees: Vec<SymbolId> = graph.callees_of(caller).iter().map(|e| e.callee).collect();
        assert_eq!(callees, vec![method_b]);
    }
}
