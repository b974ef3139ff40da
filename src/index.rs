//! Index construction and the immutable snapshot it produces.
//!
//! A build runs scan, read, parse, extract, then graph derivation, and the
//! result is a [`RepositoryIndex`] that never mutates. File reads and parses
//! fan out per file; id assignment happens afterwards on the path-sorted
//! file list, so two builds of an unchanged tree produce identical ids.

use crate::error::{EngineError, Result};
use crate::extract::{FileExtraction, extract_file};
use crate::graph::{CallGraph, DependencyGraph};
use crate::parsing::adapter_for;
use crate::scanner::{ScannedFile, Scanner};
use crate::types::{
    FileId, IndexWarning, ParseStatus, Reference, Resolution, SourceFile, SymbolDef, SymbolId,
    WarningKind,
};
use lasso::ThreadedRodeo;
use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Per-file change detector: a file is unchanged while both fields match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub modified_ms: u64,
    pub size: u64,
}

/// Immutable snapshot of one indexed repository.
#[derive(Debug)]
pub struct RepositoryIndex {
    root: PathBuf,
    files: Vec<SourceFile>,
    file_ids: HashMap<PathBuf, FileId>,
    symbols: Vec<SymbolDef>,
    /// Symbol slice per file, aligned with `files`.
    symbol_ranges: Vec<Range<usize>>,
    references: Vec<Reference>,
    /// Parse outcome per file, aligned with `files`.
    parse_status: Vec<ParseStatus>,
    deps: DependencyGraph,
    calls: CallGraph,
    warnings: Vec<IndexWarning>,
    fingerprints: Vec<(PathBuf, Fingerprint)>,
    interner: ThreadedRodeo,
}

impl RepositoryIndex {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id.0 as usize]
    }

    /// Look up a file by its root-relative path.
    pub fn file_by_path(&self, rel_path: &Path) -> Option<&SourceFile> {
        self.file_ids.get(rel_path).map(|&id| self.file(id))
    }

    pub fn symbols(&self) -> &[SymbolDef] {
        &self.symbols
    }

    pub fn symbol(&self, id: SymbolId) -> &SymbolDef {
        &self.symbols[id.0 as usize]
    }

    /// Symbols defined in one file, in position order.
    pub fn symbols_in(&self, file: FileId) -> &[SymbolDef] {
        &self.symbols[self.symbol_ranges[file.0 as usize].clone()]
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn parse_status(&self, file: FileId) -> ParseStatus {
        self.parse_status[file.0 as usize]
    }

    pub fn deps(&self) -> &DependencyGraph {
        &self.deps
    }

    pub fn calls(&self) -> &CallGraph {
        &self.calls
    }

    pub fn warnings(&self) -> &[IndexWarning] {
        &self.warnings
    }

    pub fn interner(&self) -> &ThreadedRodeo {
        &self.interner
    }

    /// Resolve an interned handle back to its text.
    pub fn name(&self, handle: crate::types::InternedString) -> &str {
        self.interner.resolve(&handle)
    }

    /// True when any indexed file changed, vanished, or was replaced since
    /// the build. New files are not detected here; the cache refreshes on
    /// explicit invalidation for those.
    pub fn is_stale(&self) -> bool {
        for (rel_path, fingerprint) in &self.fingerprints {
            let Ok(metadata) = std::fs::metadata(self.root.join(rel_path)) else {
                return true;
            };
            let modified_ms = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            if fingerprint.size != metadata.len() || fingerprint.modified_ms != modified_ms {
                return true;
            }
        }
        false
    }
}

/// Builds [`RepositoryIndex`] snapshots.
#[derive(Clone)]
pub struct IndexBuilder {
    scanner: Scanner,
    read_timeout: Duration,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self {
            scanner: Scanner::new(),
            read_timeout: Duration::from_secs(5),
        }
    }
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scanner(mut self, scanner: Scanner) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Build a full index of `root`.
    pub async fn build(&self, root: &Path) -> Result<RepositoryIndex> {
        let root = root
            .canonicalize()
            .map_err(|_| EngineError::not_found(root))?;

        let scanner = self.scanner.clone();
        let scan_root = root.clone();
        let outcome = tokio::task::spawn_blocking(move || scanner.scan(&scan_root))
            .await
            .map_err(|e| EngineError::Internal(e.into()))??;
        info!(files = outcome.files.len(), root = %root.display(), "scan complete");

        let mut warnings = outcome.warnings;
        let scanned = outcome.files;

        // Fan out per file; results come back keyed by position so the
        // path-sorted order survives.
        let mut join_set: JoinSet<(usize, FileOutput)> = JoinSet::new();
        for (position, file) in scanned.iter().enumerate() {
            let file = file.clone();
            let read_timeout = self.read_timeout;
            join_set.spawn(async move {
                let output = process_file(&file, read_timeout).await;
                (position, output)
            });
        }

        let mut outputs: Vec<Option<FileOutput>> = (0..scanned.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            let (position, output) = joined.map_err(|e| EngineError::Internal(e.into()))?;
            outputs[position] = Some(output);
        }

        let interner = ThreadedRodeo::default();
        let mut files = Vec::with_capacity(scanned.len());
        let mut file_ids = HashMap::new();
        let mut symbols: Vec<SymbolDef> = Vec::new();
        let mut symbol_ranges = Vec::with_capacity(scanned.len());
        let mut references: Vec<Reference> = Vec::new();
        let mut parse_status = Vec::with_capacity(scanned.len());
        let mut fingerprints = Vec::with_capacity(scanned.len());

        for (position, scanned_file) in scanned.into_iter().enumerate() {
            let id = FileId(position as u32);
            let output = outputs[position].take().unwrap_or(FileOutput {
                line_count: 0,
                status: ParseStatus::Unsupported,
                extraction: None,
                warnings: Vec::new(),
            });

            warnings.extend(output.warnings);
            parse_status.push(output.status);
            fingerprints.push((
                scanned_file.rel_path.clone(),
                Fingerprint {
                    modified_ms: scanned_file.modified_ms,
                    size: scanned_file.size,
                },
            ));

            let symbol_offset = symbols.len();
            if let Some(extraction) = output.extraction {
                for (local, pending) in extraction.symbols.iter().enumerate() {
                    symbols.push(SymbolDef {
                        id: SymbolId((symbol_offset + local) as u32),
                        file: id,
                        name: interner.get_or_intern(&pending.name),
                        qualified_name: interner.get_or_intern(&pending.qualified_name),
                        kind: pending.kind,
                        signature: pending.signature.clone(),
                        span: pending.span,
                        parent: pending
                            .parent
                            .map(|p| SymbolId((symbol_offset + p) as u32)),
                        doc_comment: pending.doc_comment.clone(),
                    });
                }
                for pending in extraction.references {
                    references.push(Reference {
                        file: id,
                        span: pending.span,
                        name: pending.name,
                        kind: pending.kind,
                        qualifier: pending.qualifier,
                        enclosing: pending
                            .enclosing
                            .map(|e| SymbolId((symbol_offset + e) as u32)),
                        resolution: Resolution::Unresolved,
                    });
                }
            }
            symbol_ranges.push(symbol_offset..symbols.len());

            file_ids.insert(scanned_file.rel_path.clone(), id);
            files.push(SourceFile {
                id,
                rel_path: scanned_file.rel_path,
                language: scanned_file.language,
                size: scanned_file.size,
                modified_ms: scanned_file.modified_ms,
                line_count: output.line_count,
                is_binary: scanned_file.is_binary,
            });
        }

        let deps = DependencyGraph::build(&files, &references);
        let calls = CallGraph::build(&symbols, &mut references, &deps, &interner);
        debug!(
            symbols = symbols.len(),
            references = references.len(),
            warnings = warnings.len(),
            "index built"
        );

        Ok(RepositoryIndex {
            root,
            files,
            file_ids,
            symbols,
            symbol_ranges,
            references,
            parse_status,
            deps,
            calls,
            warnings,
            fingerprints,
            interner,
        })
    }
}

/// Per-file pipeline output.
struct FileOutput {
    line_count: usize,
    status: ParseStatus,
    extraction: Option<FileExtraction>,
    warnings: Vec<IndexWarning>,
}

async fn process_file(file: &ScannedFile, read_timeout: Duration) -> FileOutput {
    let mut output = FileOutput {
        line_count: 0,
        status: ParseStatus::Unsupported,
        extraction: None,
        warnings: Vec::new(),
    };
    if file.is_binary {
        return output;
    }

    let rel = file.rel_path.to_string_lossy().into_owned();
    let bytes = match tokio::time::timeout(read_timeout, tokio::fs::read(&file.abs_path)).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(err)) => {
            warn!(file = %rel, error = %err, "unreadable file");
            output.warnings.push(IndexWarning::for_file(
                WarningKind::UnreadableFile,
                rel,
                err.to_string(),
            ));
            return output;
        }
        Err(_) => {
            warn!(file = %rel, "read timed out");
            output.warnings.push(IndexWarning::for_file(
                WarningKind::ReadTimeout,
                rel,
                format!("read exceeded {}ms", read_timeout.as_millis()),
            ));
            return output;
        }
    };

    output.line_count = count_lines(&bytes);
    let Some(adapter) = adapter_for(file.language) else {
        return output;
    };
    let Ok(source) = String::from_utf8(bytes) else {
        output.warnings.push(IndexWarning::for_file(
            WarningKind::UnreadableFile,
            rel,
            "not valid UTF-8",
        ));
        return output;
    };

    // Parsing is CPU-bound; keep it off the async workers.
    let extraction =
        match tokio::task::spawn_blocking(move || extract_file(adapter.as_ref(), &source)).await {
            Ok(extraction) => extraction,
            Err(err) => {
                output.warnings.push(IndexWarning::for_file(
                    WarningKind::ParseFailure,
                    rel,
                    err.to_string(),
                ));
                return output;
            }
        };

    output.status = extraction.status;
    match extraction.status {
        ParseStatus::PartialErrorRecovered => {
            output.warnings.push(IndexWarning::for_file(
                WarningKind::ParseFailure,
                rel,
                "syntax errors; symbols from clean subtrees kept",
            ));
        }
        ParseStatus::Unsupported => {
            output.warnings.push(IndexWarning::for_file(
                WarningKind::UnsupportedLanguage,
                rel,
                "grammar rejected the file",
            ));
        }
        ParseStatus::Ok => {}
    }
    output.extraction = Some(extraction);
    output
}

/// Line count including a final unterminated line.
fn count_lines(bytes: &[u8]) -> usize {
    if bytes.is_empty() {
        return 0;
    }
    let newlines = bytecount::count(bytes, b'\n');
    if bytes.ends_with(b"\n") {
        newlines
    } else {
        newlines + 1
    }
}
