//! Core types for the repository index.
//!
//! Everything the engine produces is built from these entities: scanned
//! files, symbol definitions, unresolved-then-resolved references, and the
//! edges of the dependency and call graphs.

use lasso::Spur;
use serde::Serialize;
use std::path::PathBuf;

/// Interned string handle for memory-efficient symbol storage.
pub type InternedString = Spur;

/// Unique identifier for files in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

/// Unique identifier for symbols in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

// ============================================================================
// Files
// ============================================================================

/// Languages with first-class grammar support. Everything else is
/// `PlainText`: counted in statistics, never parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
    TypeScript,
    Tsx,
    PlainText,
}

impl Language {
    /// Classify a file extension against the fixed registry.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "rs" => Self::Rust,
            "py" | "pyw" => Self::Python,
            "ts" | "mts" | "cts" => Self::TypeScript,
            "tsx" => Self::Tsx,
            _ => Self::PlainText,
        }
    }

    /// Whether a grammar is registered for this language.
    pub fn is_parseable(&self) -> bool {
        !matches!(self, Self::PlainText)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::PlainText => "plain-text",
        }
    }
}

/// Per-file parse outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseStatus {
    /// Clean parse.
    Ok,
    /// The tree contains error nodes; symbols from clean subtrees are kept.
    PartialErrorRecovered,
    /// No grammar, or the grammar refused the file entirely.
    Unsupported,
}

/// An immutable snapshot of a file taken by the scanner.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub id: FileId,
    /// Path relative to the repository root, `/`-separated.
    pub rel_path: PathBuf,
    pub language: Language,
    pub size: u64,
    /// Modification time in milliseconds since the epoch.
    pub modified_ms: u64,
    /// Newline count; 0 for binary files.
    pub line_count: usize,
    pub is_binary: bool,
}

// ============================================================================
// Symbols
// ============================================================================

/// Position of a syntax element within its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Span {
    pub start_byte: usize,
    pub end_byte: usize,
    /// 1-based.
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

/// Kind of a definition site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    /// Classes, structs, enums, traits, interfaces, type aliases.
    Class,
    Variable,
    Constant,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Variable => "variable",
            Self::Constant => "constant",
        }
    }
}

/// A symbol definition. Identity is positional: (file, qualified name,
/// start byte) - same-named overloads are distinct entries, never merged.
#[derive(Debug, Clone)]
pub struct SymbolDef {
    pub id: SymbolId,
    pub file: FileId,
    /// Simple name, e.g. `parse`.
    pub name: InternedString,
    /// Scope-chain name, e.g. `Parser::parse`.
    pub qualified_name: InternedString,
    pub kind: SymbolKind,
    /// Rendered signature: parameters and return annotation when the syntax
    /// has them, otherwise the bare name.
    pub signature: String,
    pub span: Span,
    /// Enclosing symbol for nested definitions.
    pub parent: Option<SymbolId>,
    pub doc_comment: Option<String>,
}

// ============================================================================
// References
// ============================================================================

/// What a usage site looks like syntactically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefKind {
    Call,
    Import,
    TypeReference,
}

impl RefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Import => "import",
            Self::TypeReference => "type-reference",
        }
    }
}

/// Outcome of resolving a reference against the symbol table. Ambiguity is
/// preserved as a set, never collapsed by a tie-break.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Resolution {
    #[default]
    Unresolved,
    Resolved(SymbolId),
    Ambiguous(Vec<SymbolId>),
}

impl Resolution {
    pub fn candidates(&self) -> &[SymbolId] {
        match self {
            Self::Unresolved => &[],
            Self::Resolved(id) => std::slice::from_ref(id),
            Self::Ambiguous(ids) => ids,
        }
    }
}

/// A usage site. Materialized unresolved by extraction; the graph builders
/// fill in `resolution` later so graphs can be rebuilt without re-parsing.
#[derive(Debug, Clone)]
pub struct Reference {
    pub file: FileId,
    pub span: Span,
    /// Raw name token, or the module text as written for imports.
    pub name: String,
    pub kind: RefKind,
    /// Qualifier hint when statically visible (`foo` in `foo.bar()`,
    /// `Foo` in `Foo::bar()`).
    pub qualifier: Option<String>,
    /// Symbol whose body contains this reference, if any.
    pub enclosing: Option<SymbolId>,
    pub resolution: Resolution,
}

// ============================================================================
// Graph edges
// ============================================================================

/// File-level import edge. `to = None` marks an external package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub from: FileId,
    pub to: Option<FileId>,
    /// Module text as written at the first occurrence.
    pub module: String,
    /// Occurrences collapsed into this edge.
    pub count: u32,
}

/// How a call edge was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Lexical or qualifier-proven match.
    Exact,
    /// Name-based match without static-scope proof.
    Heuristic,
}

/// Symbol-level call (or type-use) edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallEdge {
    pub caller: SymbolId,
    pub callee: SymbolId,
    pub confidence: Confidence,
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Non-fatal failure classes surfaced on results instead of being swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    ParseFailure,
    UnreadableFile,
    ReadTimeout,
    UnsupportedLanguage,
    RuleFailure,
}

/// A warning attached to a build or operation result.
#[derive(Debug, Clone, Serialize)]
pub struct IndexWarning {
    pub kind: WarningKind,
    /// Relative file path, when the warning is file-local.
    pub file: Option<String>,
    pub message: String,
}

impl IndexWarning {
    pub fn for_file(kind: WarningKind, file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            file: Some(file.into()),
            message: message.into(),
        }
    }
}

// ============================================================================
// Pattern findings
// ============================================================================

/// Rule finding severity. Ordering is by increasing weight so `Critical`
/// compares greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingCategory {
    Security,
    Performance,
    Quality,
}

/// One heuristic-rule hit.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub file: String,
    pub line: usize,
    pub category: FindingCategory,
    pub severity: Severity,
    pub message: String,
    /// Offending source line, trimmed.
    pub excerpt: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_registry() {
        assert_eq!(Language::from_extension("rs"), Language::Rust);
        assert_eq!(Language::from_extension("PY"), Language::Python);
        assert_eq!(Language::from_extension("tsx"), Language::Tsx);
        assert_eq!(Language::from_extension("csv"), Language::PlainText);
        assert!(!Language::PlainText.is_parseable());
    }

    #[test]
    fn resolution_candidates() {
        assert!(Resolution::Unresolved.candidates().is_empty());
        assert_eq!(
            Resolution::Resolved(SymbolId(3)).candidates(),
            &[SymbolId(3)]
        );
        let amb = Resolution::Ambiguous(vec![SymbolId(1), SymbolId(2)]);
        assert_eq!(amb.candidates().len(), 2);
    }

    #[test]
    fn severity_orders_by_weight() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }
}
