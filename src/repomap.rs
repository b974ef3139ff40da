//! Repository map and compressed context rendering.
//!
//! The map is a markdown outline of every directory, file, and symbol
//! signature, fitted to a token budget. Fitting drops whole files in
//! reverse relevance order (fan-in, then path) before any line-level
//! truncation, and emitted lines are never cut mid-line.

use crate::index::RepositoryIndex;
use crate::types::{FileId, SymbolDef, SymbolKind};
use std::collections::BTreeMap;
use std::path::Path;

/// Truncation marker appended when a budget cuts output short.
const TRUNCATION_MARKER: &str = "... (truncated)";

/// chars/4, the conventional rough estimate for code.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

fn line_tokens(line: &str) -> usize {
    line.chars().count() / 4 + 1
}

#[derive(Debug, Clone, Copy)]
pub struct RepoMapOptions {
    pub max_tokens: usize,
    pub include_docs: bool,
}

impl Default for RepoMapOptions {
    fn default() -> Self {
        Self {
            max_tokens: 8000,
            include_docs: false,
        }
    }
}

/// Rendering mode for [`compress_context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    /// Whole file bodies.
    Full,
    /// Signature outline only.
    Signatures,
    /// Full for small files, signatures for everything over 100 lines.
    Smart,
}

const SMART_FULL_LINE_LIMIT: usize = 100;

/// One per-file section of the map, kept as whole lines for budgeting.
struct FileBlock {
    file: FileId,
    dir: String,
    lines: Vec<String>,
    /// Fan-in; higher survives budget pressure longer.
    relevance: usize,
}

/// Render the repository map within `max_tokens`.
pub fn generate_repo_map(index: &RepositoryIndex, options: &RepoMapOptions) -> String {
    let root_name = index
        .root()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string());
    let header = format!("# Repository Map: {root_name}\n");

    let mut blocks: Vec<FileBlock> = index
        .files()
        .iter()
        .filter(|f| !index.symbols_in(f.id).is_empty())
        .map(|f| FileBlock {
            file: f.id,
            dir: dir_of(&f.rel_path),
            lines: file_block_lines(index, f.id, options.include_docs),
            relevance: index.deps().imported_by(f.id).len(),
        })
        .collect();

    // Try the full map first, then shed the least relevant file until the
    // rendering fits.
    loop {
        let rendered = render_blocks(&header, &blocks);
        if estimate_tokens(&rendered) <= options.max_tokens {
            return rendered;
        }
        if blocks.len() <= 1 {
            break;
        }
        let weakest = blocks
            .iter()
            .enumerate()
            .min_by_key(|(i, b)| (b.relevance, std::cmp::Reverse(*i)))
            .map(|(i, _)| i);
        if let Some(i) = weakest {
            blocks.remove(i);
        }
    }

    // A single block still over budget degrades to a whole-line prefix.
    let mut lines: Vec<&str> = header.lines().collect();
    if let Some(block) = blocks.first() {
        lines.push("");
        lines.extend(block.lines.iter().map(String::as_str));
    }
    truncate_lines(&lines, options.max_tokens)
}

fn render_blocks(header: &str, blocks: &[FileBlock]) -> String {
    let mut by_dir: BTreeMap<&str, Vec<&FileBlock>> = BTreeMap::new();
    for block in blocks {
        by_dir.entry(&block.dir).or_default().push(block);
    }

    let mut out = String::from(header);
    for (dir, dir_blocks) in by_dir {
        out.push('\n');
        out.push_str(&format!("## {dir}\n"));
        for block in dir_blocks {
            out.push('\n');
            for line in &block.lines {
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    out
}

fn dir_of(rel_path: &Path) -> String {
    match rel_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => format!("{}/", p.to_string_lossy()),
        _ => "./".to_string(),
    }
}

fn file_block_lines(index: &RepositoryIndex, file: FileId, include_docs: bool) -> Vec<String> {
    let source_file = index.file(file);
    let name = source_file
        .rel_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut lines = vec![format!("### {name}")];

    let mut modules: Vec<String> = index
        .deps()
        .edges()
        .iter()
        .filter(|e| e.from == file)
        .map(|e| e.module.clone())
        .collect();
    modules.sort();
    modules.dedup();
    if !modules.is_empty() {
        modules.truncate(5);
        lines.push(format!("  imports: {}", modules.join(", ")));
    }

    let symbols = index.symbols_in(file);
    for symbol in symbols.iter().filter(|s| s.parent.is_none()) {
        match symbol.kind {
            SymbolKind::Class => {
                lines.push(format!("  {}:", symbol.signature));
                if include_docs {
                    push_doc(&mut lines, symbol, "    ");
                }
                for method in symbols
                    .iter()
                    .filter(|s| s.parent == Some(symbol.id))
                    .filter(|s| s.kind != SymbolKind::Variable)
                {
                    lines.push(format!("    {}", method.signature));
                }
            }
            SymbolKind::Function | SymbolKind::Method => {
                lines.push(format!("  {}", symbol.signature));
                if include_docs {
                    push_doc(&mut lines, symbol, "    ");
                }
            }
            SymbolKind::Constant | SymbolKind::Variable => {
                lines.push(format!("  {}", symbol.signature));
            }
        }
    }
    lines
}

fn push_doc(lines: &mut Vec<String>, symbol: &SymbolDef, indent: &str) {
    if let Some(doc) = &symbol.doc_comment {
        if let Some(first) = doc.lines().next() {
            let mut summary: String = first.chars().take(100).collect();
            if summary.len() < first.len() {
                summary.push_str("...");
            }
            lines.push(format!("{indent}// {summary}"));
        }
    }
}

/// Keep whole lines while they fit; reserve room for the marker when
/// anything is dropped.
fn truncate_lines(lines: &[&str], max_tokens: usize) -> String {
    let marker_cost = line_tokens(TRUNCATION_MARKER);
    let mut kept: Vec<&str> = Vec::new();
    let mut used = 0;
    let mut truncated = false;

    for (i, line) in lines.iter().enumerate() {
        let cost = line_tokens(line);
        let remaining_after = lines.len() - i - 1;
        let reserve = if remaining_after > 0 { marker_cost } else { 0 };
        if used + cost + reserve > max_tokens {
            truncated = true;
            break;
        }
        used += cost;
        kept.push(line);
    }

    let mut out = kept.join("\n");
    if truncated && used + marker_cost <= max_tokens {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(TRUNCATION_MARKER);
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Render a compressed view of the given files within `max_tokens`.
///
/// Files render in the order given; when the budget cannot hold them all,
/// trailing files are dropped whole and the output ends with a marker.
pub fn compress_context(
    index: &RepositoryIndex,
    files: &[FileId],
    mode: ContextMode,
    max_tokens: usize,
) -> std::io::Result<String> {
    let mut sections: Vec<Vec<String>> = Vec::new();
    for &file in files {
        let source_file = index.file(file);
        let mut lines = vec![format!("### {}", source_file.rel_path.to_string_lossy())];

        let full = match mode {
            ContextMode::Full => true,
            ContextMode::Signatures => false,
            ContextMode::Smart => source_file.line_count <= SMART_FULL_LINE_LIMIT,
        };

        if full && !source_file.is_binary {
            let content = std::fs::read_to_string(index.root().join(&source_file.rel_path))?;
            lines.extend(content.lines().map(|l| l.to_string()));
        } else {
            for symbol in index.symbols_in(file) {
                let indent = if symbol.parent.is_some() { "  " } else { "" };
                lines.push(format!("{indent}{}", symbol.signature));
            }
        }
        lines.push(String::new());
        sections.push(lines);
    }

    let marker_cost = line_tokens(TRUNCATION_MARKER);
    let mut out = String::new();
    let mut used = 0;
    for (i, section) in sections.iter().enumerate() {
        let cost: usize = section.iter().map(|l| line_tokens(l)).sum();
        let reserve = if i + 1 < sections.len() { marker_cost } else { 0 };
        if used + cost + reserve > max_tokens {
            if used + marker_cost <= max_tokens {
                out.push_str(TRUNCATION_MARKER);
                out.push('\n');
            }
            return Ok(out);
        }
        used += cost;
        for line in section {
            out.push_str(line);
            out.push('\n');
        }
    }
    Ok(out)
}
