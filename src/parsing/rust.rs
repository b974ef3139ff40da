//! Rust language adapter.

use super::{LanguageAdapter, field_text, single_line, text_of};
use crate::types::{Language, SymbolKind};
use tree_sitter::Node;

pub struct RustAdapter;

impl LanguageAdapter for RustAdapter {
    fn tag(&self) -> Language {
        Language::Rust
    }

    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_rust::LANGUAGE.into()
    }

    fn symbol_kind(&self, node: &Node) -> Option<SymbolKind> {
        match node.kind() {
            "function_item" => Some(SymbolKind::Function),
            "struct_item" | "enum_item" | "trait_item" | "union_item" | "type_item"
            | "impl_item" => Some(SymbolKind::Class),
            "const_item" | "static_item" => Some(SymbolKind::Constant),
            _ => None,
        }
    }

    fn is_scope_node(&self, node: &Node) -> bool {
        node.kind() == "mod_item" && node.child_by_field_name("body").is_some()
    }

    fn is_import_node(&self, node: &Node) -> bool {
        node.kind() == "use_declaration"
    }

    fn import_paths(&self, node: Node, source: &[u8]) -> Vec<String> {
        let mut paths = Vec::new();
        if let Some(arg) = node.child_by_field_name("argument") {
            collect_use_paths(arg, source, "", &mut paths);
        }
        paths
    }

    fn symbol_name(&self, node: Node, source: &[u8]) -> Option<String> {
        if node.kind() == "impl_item" {
            // `impl Foo<T>` names the impl scope after the first type ident.
            let ty = node.child_by_field_name("type")?;
            let text = text_of(source, ty)?;
            return text
                .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .find(|s| !s.is_empty())
                .map(|s| s.to_string());
        }
        field_text(source, node, "name")
    }

    fn signature(&self, node: Node, source: &[u8], name: &str) -> String {
        if node.kind() != "function_item" {
            return name.to_string();
        }
        let params = field_text(source, node, "parameters").unwrap_or_else(|| "()".to_string());
        let mut sig = format!("fn {name}{}", single_line(&params));
        if let Some(ret) = field_text(source, node, "return_type") {
            sig.push_str(" -> ");
            sig.push_str(&single_line(&ret));
        }
        sig
    }

    fn doc_comment(&self, node: Node, source: &[u8]) -> Option<String> {
        let mut lines = Vec::new();
        let mut cur = node.prev_sibling();
        while let Some(sib) = cur {
            match sib.kind() {
                "line_comment" => {
                    let text = text_of(source, sib)?;
                    if text.starts_with("///") {
                        lines.push(text.trim_start_matches('/').trim().to_string());
                    } else {
                        break;
                    }
                }
                // Attributes sit between doc comments and the item.
                "attribute_item" => {}
                _ => break,
            }
            cur = sib.prev_sibling();
        }
        if lines.is_empty() {
            None
        } else {
            lines.reverse();
            Some(lines.join("\n"))
        }
    }

    fn is_call_node(&self, node: &Node) -> bool {
        node.kind() == "call_expression"
    }

    fn call_target(&self, node: Node, source: &[u8]) -> Option<(String, Option<String>)> {
        let fun = node.child_by_field_name("function")?;
        callee_of(fun, source)
    }

    fn type_reference(&self, node: Node, source: &[u8]) -> Option<String> {
        if node.kind() != "type_identifier" {
            return None;
        }
        // A type_identifier that *names* a definition is not a usage site.
        if let Some(parent) = node.parent() {
            if parent.child_by_field_name("name") == Some(node) {
                return None;
            }
        }
        text_of(source, node)
    }
}

fn callee_of(fun: Node, source: &[u8]) -> Option<(String, Option<String>)> {
    match fun.kind() {
        "identifier" => text_of(source, fun).map(|n| (n, None)),
        "scoped_identifier" => {
            let name = field_text(source, fun, "name")?;
            let qualifier = field_text(source, fun, "path")
                .and_then(|p| p.rsplit("::").next().map(|s| s.to_string()));
            Some((name, qualifier))
        }
        "field_expression" => {
            let name = field_text(source, fun, "field")?;
            let qualifier = fun
                .child_by_field_name("value")
                .filter(|v| v.kind() == "identifier")
                .and_then(|v| text_of(source, v));
            Some((name, qualifier))
        }
        "generic_function" => {
            let inner = fun.child_by_field_name("function")?;
            callee_of(inner, source)
        }
        _ => None,
    }
}

/// Flatten a use-tree into full path strings, expanding `{a, b}` groups.
fn collect_use_paths(node: Node, source: &[u8], prefix: &str, out: &mut Vec<String>) {
    let joined = |prefix: &str, text: &str| {
        if prefix.is_empty() {
            text.to_string()
        } else {
            format!("{prefix}::{text}")
        }
    };

    match node.kind() {
        "identifier" | "scoped_identifier" | "crate" | "self" | "super" => {
            if let Some(text) = text_of(source, node) {
                out.push(joined(prefix, &text));
            }
        }
        "use_as_clause" => {
            if let Some(path) = node.child_by_field_name("path") {
                collect_use_paths(path, source, prefix, out);
            }
        }
        "use_wildcard" => {
            if let Some(text) = text_of(source, node) {
                let path = text.trim_end_matches('*').trim_end_matches("::");
                if !path.is_empty() {
                    out.push(joined(prefix, path));
                } else if !prefix.is_empty() {
                    out.push(prefix.to_string());
                }
            }
        }
        "scoped_use_list" => {
            let new_prefix = node
                .child_by_field_name("path")
                .and_then(|p| text_of(source, p))
                .map(|p| joined(prefix, &p))
                .unwrap_or_else(|| prefix.to_string());
            if let Some(list) = node.child_by_field_name("list") {
                collect_use_paths(list, source, &new_prefix, out);
            }
        }
        "use_list" => {
            for i in 0..node.named_child_count() {
                if let Some(child) = node.named_child(i) {
                    collect_use_paths(child, source, prefix, out);
                }
            }
        }
        _ => {
            for i in 0..node.named_child_count() {
                if let Some(child) = node.named_child(i) {
                    collect_use_paths(child, source, prefix, out);
                }
            }
        }
    }
}
