//! Syntax parser adapter.
//!
//! Hides grammar differences behind one interface: each language supplies a
//! tree-sitter grammar plus the node predicates the generic extractor needs
//! (which kinds denote definitions, which denote imports, how to read names
//! and signatures). Languages are selected from a registry keyed on the
//! language tag; parsing never panics and never aborts the index.

pub mod python;
pub mod rust;
pub mod typescript;

use crate::types::{Language, ParseStatus, SymbolKind};
use tree_sitter::{Node, Parser, Tree};

/// A parse attempt: the tree (when the grammar produced one) and its status.
pub struct ParsedTree {
    pub tree: Option<Tree>,
    pub status: ParseStatus,
}

/// Capability set each supported language implements.
///
/// The extraction logic in [`crate::extract`] is language-agnostic; these
/// hooks are the only per-language parts.
pub trait LanguageAdapter: Send + Sync {
    /// Language tag this adapter serves.
    fn tag(&self) -> Language;

    /// The tree-sitter grammar.
    fn grammar(&self) -> tree_sitter::Language;

    /// Symbol-node predicate: which node kinds denote definitions, and as
    /// what. `Function` here may be refined to `Method` by the extractor
    /// when the definition is nested in a class.
    fn symbol_kind(&self, node: &Node) -> Option<SymbolKind>;

    /// Nodes that contribute a scope segment without being symbols
    /// themselves (e.g. Rust inline modules).
    fn is_scope_node(&self, node: &Node) -> bool {
        let _ = node;
        false
    }

    /// Import-node predicate.
    fn is_import_node(&self, node: &Node) -> bool;

    /// Raw module/path texts carried by an import node, as written.
    fn import_paths(&self, node: Node, source: &[u8]) -> Vec<String>;

    /// Identifier naming a definition (or scope) node.
    fn symbol_name(&self, node: Node, source: &[u8]) -> Option<String>;

    /// Signature text for a definition: parameter list and return annotation
    /// where syntactically present, else the bare name.
    fn signature(&self, node: Node, source: &[u8], name: &str) -> String;

    /// Documentation attached to a definition, if any.
    fn doc_comment(&self, node: Node, source: &[u8]) -> Option<String> {
        let _ = (node, source);
        None
    }

    /// Call-node predicate.
    fn is_call_node(&self, node: &Node) -> bool;

    /// Callee name and optional qualifier hint for a call node.
    fn call_target(&self, node: Node, source: &[u8]) -> Option<(String, Option<String>)>;

    /// Type-reference name when this node is a type usage site.
    fn type_reference(&self, node: Node, source: &[u8]) -> Option<String> {
        let _ = (node, source);
        None
    }
}

/// Look up the adapter for a language tag.
pub fn adapter_for(language: Language) -> Option<Box<dyn LanguageAdapter>> {
    match language {
        Language::Rust => Some(Box::new(rust::RustAdapter)),
        Language::Python => Some(Box::new(python::PythonAdapter)),
        Language::TypeScript => Some(Box::new(typescript::TypeScriptAdapter::typescript())),
        Language::Tsx => Some(Box::new(typescript::TypeScriptAdapter::tsx())),
        Language::PlainText => None,
    }
}

/// Parse source with the adapter's grammar. Grammar failures degrade to
/// `Unsupported`; trees containing error nodes are `PartialErrorRecovered`
/// and still expose their clean subtrees.
pub fn parse_source(adapter: &dyn LanguageAdapter, source: &str) -> ParsedTree {
    let mut parser = Parser::new();
    if parser.set_language(&adapter.grammar()).is_err() {
        return ParsedTree {
            tree: None,
            status: ParseStatus::Unsupported,
        };
    }

    match parser.parse(source, None) {
        Some(tree) => {
            let status = if tree.root_node().has_error() {
                ParseStatus::PartialErrorRecovered
            } else {
                ParseStatus::Ok
            };
            ParsedTree {
                tree: Some(tree),
                status,
            }
        }
        None => ParsedTree {
            tree: None,
            status: ParseStatus::Unsupported,
        },
    }
}

// ============================================================================
// Shared node helpers
// ============================================================================

pub(crate) fn text_of(bytes: &[u8], node: Node) -> Option<String> {
    std::str::from_utf8(&bytes[node.start_byte()..node.end_byte()])
        .ok()
        .map(|s| s.to_string())
}

pub(crate) fn field_text(bytes: &[u8], node: Node, field: &str) -> Option<String> {
    node.child_by_field_name(field)
        .and_then(|n| text_of(bytes, n))
}

/// Flatten a single line out of multi-line node text (signatures stay on
/// one repo-map line).
pub(crate) fn single_line(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_ws = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_ws {
                out.push(' ');
            }
            last_ws = true;
        } else {
            out.push(c);
            last_ws = false;
        }
    }
    out.trim().to_string()
}
