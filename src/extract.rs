//! Generic symbol and reference extraction.
//!
//! One tree walker serves every language; the per-language decisions all
//! live behind [`LanguageAdapter`]. Output is file-local: symbols and
//! references carry vector indices instead of global ids, and the index
//! builder rewrites them after files are ordered.

use crate::parsing::{LanguageAdapter, ParsedTree, parse_source};
use crate::types::{ParseStatus, RefKind, SymbolKind, Span};
use tree_sitter::Node;

/// A symbol before global id assignment. `parent` indexes into the same
/// extraction's symbol vector.
#[derive(Debug, Clone)]
pub struct PendingSymbol {
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub signature: String,
    pub span: Span,
    pub parent: Option<usize>,
    pub doc_comment: Option<String>,
}

/// A reference before global id assignment. `enclosing` indexes into the
/// extraction's symbol vector.
#[derive(Debug, Clone)]
pub struct PendingReference {
    pub span: Span,
    pub name: String,
    pub kind: RefKind,
    pub qualifier: Option<String>,
    pub enclosing: Option<usize>,
}

/// Everything extracted from one file.
#[derive(Debug)]
pub struct FileExtraction {
    pub status: ParseStatus,
    pub symbols: Vec<PendingSymbol>,
    pub references: Vec<PendingReference>,
}

/// Parse and extract a single file.
pub fn extract_file(adapter: &dyn LanguageAdapter, source: &str) -> FileExtraction {
    let ParsedTree { tree, status } = parse_source(adapter, source);
    let Some(tree) = tree else {
        return FileExtraction {
            status,
            symbols: Vec::new(),
            references: Vec::new(),
        };
    };

    let mut walker = Walker {
        adapter,
        source: source.as_bytes(),
        symbols: Vec::new(),
        references: Vec::new(),
        scopes: Vec::new(),
    };
    walker.visit(tree.root_node());

    FileExtraction {
        status,
        symbols: walker.symbols,
        references: walker.references,
    }
}

/// One enclosing scope on the walk path. Scope-only nodes (e.g. inline
/// modules) contribute a name segment without a symbol.
struct Scope {
    name: String,
    symbol: Option<usize>,
    is_type: bool,
}

struct Walker<'a> {
    adapter: &'a dyn LanguageAdapter,
    source: &'a [u8],
    symbols: Vec<PendingSymbol>,
    references: Vec<PendingReference>,
    scopes: Vec<Scope>,
}

impl Walker<'_> {
    fn visit(&mut self, node: Node) {
        // Error subtrees are skipped wholesale; clean siblings of a broken
        // definition still extract normally.
        if node.is_error() || node.is_missing() {
            return;
        }

        if let Some(kind) = self.adapter.symbol_kind(&node) {
            if node.has_error() {
                self.visit_children(node);
                return;
            }
            self.visit_symbol(node, kind);
            return;
        }

        if self.adapter.is_scope_node(&node) {
            if let Some(name) = self.adapter.symbol_name(node, self.source) {
                self.scopes.push(Scope {
                    name,
                    symbol: None,
                    is_type: false,
                });
                self.visit_children(node);
                self.scopes.pop();
                return;
            }
        }

        if self.adapter.is_import_node(&node) {
            for path in self.adapter.import_paths(node, self.source) {
                self.references.push(PendingReference {
                    span: span_of(node),
                    name: path,
                    kind: RefKind::Import,
                    qualifier: None,
                    enclosing: self.enclosing_symbol(),
                });
            }
            return;
        }

        if self.adapter.is_call_node(&node) {
            if let Some((name, qualifier)) = self.adapter.call_target(node, self.source) {
                self.references.push(PendingReference {
                    span: span_of(node),
                    name,
                    kind: RefKind::Call,
                    qualifier,
                    enclosing: self.enclosing_symbol(),
                });
            }
            // Arguments may contain further calls.
            self.visit_children(node);
            return;
        }

        if let Some(name) = self.adapter.type_reference(node, self.source) {
            self.references.push(PendingReference {
                span: span_of(node),
                name,
                kind: RefKind::TypeReference,
                qualifier: None,
                enclosing: self.enclosing_symbol(),
            });
            return;
        }

        self.visit_children(node);
    }

    fn visit_symbol(&mut self, node: Node, kind: SymbolKind) {
        let Some(name) = self.adapter.symbol_name(node, self.source) else {
            self.visit_children(node);
            return;
        };

        // Local variables are noise; only module and class level bindings
        // become symbols.
        if kind == SymbolKind::Variable && self.inside_function() {
            self.visit_children(node);
            return;
        }

        let kind = match kind {
            // A function defined directly under a type scope is a method.
            SymbolKind::Function if self.directly_inside_type() => SymbolKind::Method,
            // Upper-case module bindings read as constants.
            SymbolKind::Variable if is_upper_snake(&name) => SymbolKind::Constant,
            other => other,
        };

        let qualified_name = self.qualified(&name);
        let index = self.symbols.len();
        self.symbols.push(PendingSymbol {
            signature: self.adapter.signature(node, self.source, &name),
            doc_comment: self.adapter.doc_comment(node, self.source),
            qualified_name,
            kind,
            span: span_of(node),
            parent: self.enclosing_symbol(),
            name: name.clone(),
        });

        self.scopes.push(Scope {
            name,
            symbol: Some(index),
            is_type: kind == SymbolKind::Class,
        });
        self.visit_children(node);
        self.scopes.pop();
    }

    fn visit_children(&mut self, node: Node) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child);
        }
    }

    fn enclosing_symbol(&self) -> Option<usize> {
        self.scopes.iter().rev().find_map(|s| s.symbol)
    }

    fn directly_inside_type(&self) -> bool {
        self.scopes.last().is_some_and(|s| s.is_type)
    }

    fn inside_function(&self) -> bool {
        self.scopes.iter().any(|s| {
            s.symbol.is_some_and(|i| {
                matches!(
                    self.symbols[i].kind,
                    SymbolKind::Function | SymbolKind::Method
                )
            })
        })
    }

    fn qualified(&self, name: &str) -> String {
        if self.scopes.is_empty() {
            return name.to_string();
        }
        let mut out = String::new();
        for scope in &self.scopes {
            out.push_str(&scope.name);
            out.push_str("::");
        }
        out.push_str(name);
        out
    }
}

fn is_upper_snake(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

pub(crate) fn span_of(node: Node) -> Span {
    let start = node.start_position();
    let end = node.end_position();
    Span {
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        start_line: start.row + 1,
        start_col: start.column,
        end_line: end.row + 1,
        end_col: end.column,
    }
}
