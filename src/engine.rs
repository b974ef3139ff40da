//! Public operation surface.
//!
//! One [`Engine`] serves any number of repository roots. Every operation
//! resolves its root through the cache, so a warm snapshot answers most
//! calls without touching the filesystem beyond staleness stats.

use crate::cache::IndexCache;
use crate::error::{EngineError, Result};
use crate::graph::{Direction, TraversalResult};
use crate::index::{IndexBuilder, RepositoryIndex};
use crate::patterns::{CheckSet, PatternAnalyzer};
use crate::repomap::{self, ContextMode, RepoMapOptions};
use crate::semantic::{self, EmbeddingProvider};
use crate::types::{
    FileId, Finding, IndexWarning, RefKind, Resolution, Severity, SymbolId, SymbolKind,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Default hop bound for call graph walks.
pub const DEFAULT_CALL_DEPTH: usize = 3;

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ScanSummary {
    pub root: String,
    pub total_files: usize,
    pub total_lines: usize,
    /// Files per language, descending.
    pub languages: Vec<(String, usize)>,
    pub warnings: Vec<IndexWarning>,
}

#[derive(Debug, Serialize)]
pub struct TextResult {
    pub text: String,
    pub warnings: Vec<IndexWarning>,
}

#[derive(Debug, Serialize)]
pub struct SymbolMatch {
    pub file: String,
    pub kind: &'static str,
    pub name: String,
    pub qualified_name: String,
    pub signature: String,
    pub line: usize,
    pub end_line: usize,
    pub parent: Option<String>,
    pub doc_comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RelatedFile {
    pub file: String,
    pub relationship: &'static str,
    pub symbols: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FileContext {
    pub file: String,
    pub language: &'static str,
    pub content: String,
    pub symbols: Vec<String>,
    pub imports: Vec<String>,
    pub related: Vec<RelatedFile>,
}

#[derive(Debug, Serialize)]
pub struct FileDependencies {
    pub file: String,
    pub imports: Vec<String>,
    pub imported_by: Vec<String>,
    pub external: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Usage {
    pub file: String,
    pub line: usize,
    pub kind: &'static str,
    /// False when the site matched by name without a resolved target.
    pub certain: bool,
}

#[derive(Debug, Serialize)]
pub struct CallGraphNode {
    pub qualified_name: String,
    pub file: String,
    pub line: usize,
}

#[derive(Debug, Serialize)]
pub struct CallGraphEdge {
    pub from: String,
    pub to: String,
    pub confidence: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CallGraphResponse {
    pub symbol: String,
    pub direction: &'static str,
    pub nodes: Vec<CallGraphNode>,
    pub edges: Vec<CallGraphEdge>,
    pub depth_reached: usize,
    pub truncated: bool,
}

impl CallGraphResponse {
    /// Render the edge set as a mermaid flowchart.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");
        let mut ids: BTreeMap<&str, String> = BTreeMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            ids.insert(node.qualified_name.as_str(), format!("n{i}"));
        }
        for node in &self.nodes {
            if let Some(id) = ids.get(node.qualified_name.as_str()) {
                out.push_str(&format!("    {id}[\"{}\"]\n", node.qualified_name));
            }
        }
        for edge in &self.edges {
            let (Some(from), Some(to)) = (ids.get(edge.from.as_str()), ids.get(edge.to.as_str()))
            else {
                continue;
            };
            let arrow = if edge.confidence == "heuristic" {
                "-.->"
            } else {
                "-->"
            };
            out.push_str(&format!("    {from} {arrow} {to}\n"));
        }
        out
    }
}

#[derive(Debug, Serialize)]
pub struct PatternSummary {
    pub total: usize,
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
}

#[derive(Debug, Serialize)]
pub struct PatternResponse {
    pub summary: PatternSummary,
    pub findings: Vec<Finding>,
    pub warnings: Vec<IndexWarning>,
}

#[derive(Debug, Serialize)]
pub struct FileSlice {
    pub file: String,
    pub total_lines: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChangeImpact {
    pub symbol: String,
    pub direct_callers: Vec<String>,
    pub transitive_callers: Vec<String>,
    pub affected_files: Vec<String>,
}

// ============================================================================
// Engine
// ============================================================================

pub struct Engine {
    cache: IndexCache,
    builder: IndexBuilder,
    analyzer: Arc<PatternAnalyzer>,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            cache: IndexCache::new(),
            builder: IndexBuilder::new(),
            analyzer: Arc::new(PatternAnalyzer::default()),
            embeddings: None,
        }
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builder(mut self, builder: IndexBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embeddings = Some(provider);
        self
    }

    async fn index(&self, root: &Path) -> Result<Arc<RepositoryIndex>> {
        self.cache.get_or_build(root, &self.builder).await
    }

    /// Drop the cached snapshot for a root.
    pub fn invalidate(&self, root: &Path) {
        self.cache.invalidate(root);
    }

    /// Index a root and summarize what was found.
    #[instrument(skip(self))]
    pub async fn scan(&self, root: &Path) -> Result<ScanSummary> {
        let index = self.index(root).await?;

        let mut languages: BTreeMap<&'static str, usize> = BTreeMap::new();
        let mut total_lines = 0;
        for file in index.files() {
            *languages.entry(file.language.as_str()).or_default() += 1;
            total_lines += file.line_count;
        }
        let mut languages: Vec<(String, usize)> = languages
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        languages.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        Ok(ScanSummary {
            root: index.root().display().to_string(),
            total_files: index.files().len(),
            total_lines,
            languages,
            warnings: index.warnings().to_vec(),
        })
    }

    /// Token-budgeted markdown map of the whole repository.
    #[instrument(skip(self))]
    pub async fn repo_map(&self, root: &Path, options: RepoMapOptions) -> Result<TextResult> {
        let index = self.index(root).await?;
        let text = repomap::generate_repo_map(&index, &options);
        Ok(TextResult {
            text,
            warnings: index.warnings().to_vec(),
        })
    }

    /// One file's content plus its neighborhood in the dependency graph.
    #[instrument(skip(self))]
    pub async fn file_context(&self, root: &Path, file: &Path) -> Result<FileContext> {
        let index = self.index(root).await?;
        let source_file = index
            .file_by_path(file)
            .ok_or_else(|| EngineError::not_found(file))?;
        let abs = index.root().join(&source_file.rel_path);
        let content = tokio::fs::read_to_string(&abs)
            .await
            .map_err(|e| EngineError::Internal(e.into()))?;

        let describe = |id: FileId| -> Vec<String> {
            index
                .symbols_in(id)
                .iter()
                .take(10)
                .map(|s| format!("{} {}", s.kind.as_str(), s.signature))
                .collect()
        };

        let mut related = Vec::new();
        for id in index.deps().imports_of(source_file.id).into_iter().take(5) {
            related.push(RelatedFile {
                file: index.file(id).rel_path.to_string_lossy().into_owned(),
                relationship: "imports",
                symbols: describe(id),
            });
        }
        for id in index.deps().imported_by(source_file.id).into_iter().take(5) {
            related.push(RelatedFile {
                file: index.file(id).rel_path.to_string_lossy().into_owned(),
                relationship: "used_by",
                symbols: Vec::new(),
            });
        }

        Ok(FileContext {
            file: source_file.rel_path.to_string_lossy().into_owned(),
            language: source_file.language.as_str(),
            content,
            symbols: describe(source_file.id),
            imports: index
                .deps()
                .edges()
                .iter()
                .filter(|e| e.from == source_file.id)
                .map(|e| e.module.clone())
                .collect(),
            related,
        })
    }

    /// Find definitions by name. With an embedding provider attached the
    /// match is semantic; otherwise it is name containment.
    #[instrument(skip(self))]
    pub async fn search_symbols(
        &self,
        root: &Path,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SymbolMatch>> {
        let index = self.index(root).await?;
        let ranked = semantic::rank_symbols(&index, query, self.embeddings.as_deref(), limit);

        Ok(ranked
            .into_iter()
            .map(|(id, _)| {
                let symbol = index.symbol(id);
                SymbolMatch {
                    file: index
                        .file(symbol.file)
                        .rel_path
                        .to_string_lossy()
                        .into_owned(),
                    kind: symbol.kind.as_str(),
                    name: index.name(symbol.name).to_string(),
                    qualified_name: index.name(symbol.qualified_name).to_string(),
                    signature: symbol.signature.clone(),
                    line: symbol.span.start_line,
                    end_line: symbol.span.end_line,
                    parent: symbol
                        .parent
                        .map(|p| index.name(index.symbol(p).name).to_string()),
                    doc_comment: symbol
                        .doc_comment
                        .as_ref()
                        .map(|d| d.chars().take(200).collect()),
                }
            })
            .collect())
    }

    /// Import neighborhood of one file.
    #[instrument(skip(self))]
    pub async fn dependencies(&self, root: &Path, file: &Path) -> Result<FileDependencies> {
        let index = self.index(root).await?;
        let source_file = index
            .file_by_path(file)
            .ok_or_else(|| EngineError::not_found(file))?;
        let rel = |id: FileId| index.file(id).rel_path.to_string_lossy().into_owned();

        Ok(FileDependencies {
            file: source_file.rel_path.to_string_lossy().into_owned(),
            imports: index
                .deps()
                .imports_of(source_file.id)
                .into_iter()
                .map(rel)
                .collect(),
            imported_by: index
                .deps()
                .imported_by(source_file.id)
                .into_iter()
                .map(rel)
                .collect(),
            external: index.deps().external_imports_of(source_file.id),
        })
    }

    /// Import cycles across the repository, each as a sorted file list.
    #[instrument(skip(self))]
    pub async fn dependency_cycles(&self, root: &Path) -> Result<Vec<Vec<String>>> {
        let index = self.index(root).await?;
        Ok(index
            .deps()
            .cycles()
            .into_iter()
            .map(|cycle| {
                cycle
                    .into_iter()
                    .map(|id| index.file(id).rel_path.to_string_lossy().into_owned())
                    .collect()
            })
            .collect())
    }

    /// Every definition and usage site of a name, in file and line order.
    #[instrument(skip(self))]
    pub async fn find_usages(&self, root: &Path, name: &str) -> Result<Vec<Usage>> {
        let index = self.index(root).await?;
        let mut usages = Vec::new();

        let targets: BTreeSet<SymbolId> = index
            .symbols()
            .iter()
            .filter(|s| index.name(s.name) == name)
            .map(|s| s.id)
            .collect();
        for &id in &targets {
            let symbol = index.symbol(id);
            usages.push(Usage {
                file: index
                    .file(symbol.file)
                    .rel_path
                    .to_string_lossy()
                    .into_owned(),
                line: symbol.span.start_line,
                kind: "definition",
                certain: true,
            });
        }

        for reference in index.references() {
            let hit = match reference.kind {
                RefKind::Import => {
                    reference.name == name
                        || reference
                            .name
                            .rsplit(['.', ':', '/'])
                            .next()
                            .is_some_and(|last| last == name)
                }
                _ => reference.name == name,
            };
            if !hit {
                continue;
            }
            let certain = match &reference.resolution {
                Resolution::Resolved(id) => targets.contains(id),
                Resolution::Ambiguous(ids) => ids.iter().any(|id| targets.contains(id)),
                Resolution::Unresolved => false,
            };
            usages.push(Usage {
                file: index
                    .file(reference.file)
                    .rel_path
                    .to_string_lossy()
                    .into_owned(),
                line: reference.span.start_line,
                kind: reference.kind.as_str(),
                certain: certain || reference.kind == RefKind::Import,
            });
        }

        usages.sort_by(|a, b| (a.file.as_str(), a.line).cmp(&(b.file.as_str(), b.line)));
        Ok(usages)
    }

    /// Bounded caller or callee walk from every definition of `name`.
    #[instrument(skip(self))]
    pub async fn call_graph(
        &self,
        root: &Path,
        name: &str,
        direction: Direction,
        depth: Option<usize>,
        deadline: Option<Instant>,
    ) -> Result<CallGraphResponse> {
        let index = self.index(root).await?;
        let depth = depth.unwrap_or(DEFAULT_CALL_DEPTH);

        let starts: Vec<SymbolId> = index
            .symbols()
            .iter()
            .filter(|s| index.name(s.name) == name)
            .filter(|s| {
                matches!(
                    s.kind,
                    SymbolKind::Function | SymbolKind::Method | SymbolKind::Class
                )
            })
            .map(|s| s.id)
            .collect();
        if starts.is_empty() {
            return Err(EngineError::NotFound(format!("symbol: {name}")));
        }

        let mut node_ids: BTreeSet<SymbolId> = BTreeSet::new();
        let mut all_edges = Vec::new();
        let mut depth_reached = 0;
        let mut truncated = false;
        for start in starts {
            let TraversalResult {
                nodes,
                edges,
                depth_reached: reached,
                truncated: cut,
            } = index.calls().traverse(start, direction, depth, deadline);
            node_ids.extend(nodes);
            all_edges.extend(edges);
            depth_reached = depth_reached.max(reached);
            truncated |= cut;
        }
        all_edges.sort_by_key(|e| (e.caller, e.callee));
        all_edges.dedup();

        let qualified = |id: SymbolId| index.name(index.symbol(id).qualified_name).to_string();
        Ok(CallGraphResponse {
            symbol: name.to_string(),
            direction: match direction {
                Direction::Callers => "callers",
                Direction::Callees => "callees",
            },
            nodes: node_ids
                .iter()
                .map(|&id| {
                    let symbol = index.symbol(id);
                    CallGraphNode {
                        qualified_name: qualified(id),
                        file: index
                            .file(symbol.file)
                            .rel_path
                            .to_string_lossy()
                            .into_owned(),
                        line: symbol.span.start_line,
                    }
                })
                .collect(),
            edges: all_edges
                .into_iter()
                .map(|e| CallGraphEdge {
                    from: qualified(e.caller),
                    to: qualified(e.callee),
                    confidence: match e.confidence {
                        crate::types::Confidence::Exact => "exact",
                        crate::types::Confidence::Heuristic => "heuristic",
                    },
                })
                .collect(),
            depth_reached,
            truncated,
        })
    }

    /// Run the heuristic pattern rules over the whole root, or over a
    /// single indexed file when `file` is given.
    #[instrument(skip(self))]
    pub async fn analyze_patterns(
        &self,
        root: &Path,
        file: Option<&Path>,
        checks: CheckSet,
    ) -> Result<PatternResponse> {
        let index = self.index(root).await?;
        let target = match file {
            Some(path) => {
                let found = index
                    .file_by_path(path)
                    .ok_or_else(|| EngineError::not_found(path))?;
                Some(found.id)
            }
            None => None,
        };
        let report = tokio::task::spawn_blocking({
            let index = Arc::clone(&index);
            let analyzer = Arc::clone(&self.analyzer);
            move || analyzer.analyze(&index, checks, target)
        })
        .await
        .map_err(|e| EngineError::Internal(e.into()))?;

        let count = |severity: Severity| {
            report
                .findings
                .iter()
                .filter(|f| f.severity == severity)
                .count()
        };
        Ok(PatternResponse {
            summary: PatternSummary {
                total: report.findings.len(),
                critical: count(Severity::Critical),
                warning: count(Severity::Warning),
                info: count(Severity::Info),
            },
            findings: report.findings,
            warnings: report.warnings,
        })
    }

    /// Compressed rendering of selected files (or the whole repository).
    #[instrument(skip(self))]
    pub async fn compressed_context(
        &self,
        root: &Path,
        files: Option<Vec<PathBuf>>,
        mode: ContextMode,
        max_tokens: usize,
    ) -> Result<TextResult> {
        let index = self.index(root).await?;

        let ids: Vec<FileId> = match files {
            Some(paths) => {
                let mut ids = Vec::with_capacity(paths.len());
                for path in &paths {
                    let file = index
                        .file_by_path(path)
                        .ok_or_else(|| EngineError::not_found(path))?;
                    ids.push(file.id);
                }
                ids
            }
            None => index
                .files()
                .iter()
                .filter(|f| f.language.is_parseable())
                .map(|f| f.id)
                .collect(),
        };

        let text = tokio::task::spawn_blocking({
            let index = Arc::clone(&index);
            move || repomap::compress_context(&index, &ids, mode, max_tokens)
        })
        .await
        .map_err(|e| EngineError::Internal(e.into()))?
        .map_err(|e| EngineError::Internal(e.into()))?;

        Ok(TextResult {
            text,
            warnings: index.warnings().to_vec(),
        })
    }

    /// Read a 1-based inclusive line range. `end = None` reads to the end.
    #[instrument(skip(self))]
    pub async fn read_file(
        &self,
        root: &Path,
        file: &Path,
        start_line: usize,
        end_line: Option<usize>,
    ) -> Result<FileSlice> {
        let index = self.index(root).await?;
        let source_file = index
            .file_by_path(file)
            .ok_or_else(|| EngineError::not_found(file))?;
        let content = tokio::fs::read_to_string(index.root().join(&source_file.rel_path))
            .await
            .map_err(|e| EngineError::Internal(e.into()))?;

        let lines: Vec<&str> = content.lines().collect();
        let total_lines = lines.len();
        let end_line = end_line.unwrap_or(total_lines);

        if start_line == 0 || start_line > end_line {
            return Err(EngineError::Range(format!(
                "start {start_line} to end {end_line}"
            )));
        }
        if start_line > total_lines || end_line > total_lines {
            return Err(EngineError::Range(format!(
                "{start_line}-{end_line} outside 1-{total_lines}"
            )));
        }

        Ok(FileSlice {
            file: source_file.rel_path.to_string_lossy().into_owned(),
            total_lines,
            start_line,
            end_line,
            content: lines[start_line - 1..end_line].join("\n"),
        })
    }

    /// Who breaks when this symbol changes: direct callers, callers of
    /// callers up to the default depth, and their files.
    #[instrument(skip(self))]
    pub async fn change_impact(&self, root: &Path, name: &str) -> Result<ChangeImpact> {
        let index = self.index(root).await?;
        let response = self
            .call_graph(root, name, Direction::Callers, Some(DEFAULT_CALL_DEPTH), None)
            .await?;

        let starts: BTreeSet<&str> = index
            .symbols()
            .iter()
            .filter(|s| index.name(s.name) == name)
            .map(|s| index.name(s.qualified_name))
            .collect();

        let direct: BTreeSet<String> = response
            .edges
            .iter()
            .filter(|e| starts.contains(e.to.as_str()))
            .map(|e| e.from.clone())
            .collect();
        let transitive: BTreeSet<String> = response
            .nodes
            .iter()
            .map(|n| n.qualified_name.clone())
            .filter(|n| !starts.contains(n.as_str()) && !direct.contains(n))
            .collect();
        let affected_files: BTreeSet<String> =
            response.nodes.iter().map(|n| n.file.clone()).collect();

        Ok(ChangeImpact {
            symbol: name.to_string(),
            direct_callers: direct.into_iter().collect(),
            transitive_callers: transitive.into_iter().collect(),
            affected_files: affected_files.into_iter().collect(),
        })
    }
}
