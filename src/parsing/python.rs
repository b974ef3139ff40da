//! Python language adapter.

use super::{LanguageAdapter, field_text, single_line, text_of};
use crate::types::{Language, SymbolKind};
use tree_sitter::Node;

pub struct PythonAdapter;

impl LanguageAdapter for PythonAdapter {
    fn tag(&self) -> Language {
        Language::Python
    }

    fn grammar(&self) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn symbol_kind(&self, node: &Node) -> Option<SymbolKind> {
        match node.kind() {
            "function_definition" => Some(SymbolKind::Function),
            "class_definition" => Some(SymbolKind::Class),
            // Module and class level bindings only; the extractor drops
            // Variable symbols that land inside a function body.
            "assignment" => {
                let left = node.child_by_field_name("left")?;
                if left.kind() == "identifier" {
                    Some(SymbolKind::Variable)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn is_import_node(&self, node: &Node) -> bool {
        matches!(node.kind(), "import_statement" | "import_from_statement")
    }

    fn import_paths(&self, node: Node, source: &[u8]) -> Vec<String> {
        let mut paths = Vec::new();
        match node.kind() {
            "import_statement" => {
                // `import a.b, c as d` lists dotted names and aliases.
                for i in 0..node.named_child_count() {
                    let Some(child) = node.named_child(i) else {
                        continue;
                    };
                    match child.kind() {
                        "dotted_name" => {
                            if let Some(text) = text_of(source, child) {
                                paths.push(text);
                            }
                        }
                        "aliased_import" => {
                            if let Some(text) = field_text(source, child, "name") {
                                paths.push(text);
                            }
                        }
                        _ => {}
                    }
                }
            }
            "import_from_statement" => {
                // Leading dots on relative imports are kept for resolution.
                if let Some(text) = field_text(source, node, "module_name") {
                    paths.push(text);
                }
            }
            _ => {}
        }
        paths
    }

    fn symbol_name(&self, node: Node, source: &[u8]) -> Option<String> {
        if node.kind() == "assignment" {
            return field_text(source, node, "left");
        }
        field_text(source, node, "name")
    }

    fn signature(&self, node: Node, source: &[u8], name: &str) -> String {
        match node.kind() {
            "function_definition" => {
                let params =
                    field_text(source, node, "parameters").unwrap_or_else(|| "()".to_string());
                let mut sig = format!("def {name}{}", single_line(&params));
                if let Some(ret) = field_text(source, node, "return_type") {
                    sig.push_str(" -> ");
                    sig.push_str(&single_line(&ret));
                }
                sig
            }
            "class_definition" => match node.child_by_field_name("superclasses") {
                Some(sup) => {
                    let text = text_of(source, sup).unwrap_or_default();
                    format!("class {name}{}", single_line(&text))
                }
                None => format!("class {name}"),
            },
            _ => name.to_string(),
        }
    }

    fn doc_comment(&self, node: Node, source: &[u8]) -> Option<String> {
        if !matches!(node.kind(), "function_definition" | "class_definition") {
            return None;
        }
        let body = node.child_by_field_name("body")?;
        let first = body.named_child(0)?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let expr = first.named_child(0)?;
        if expr.kind() != "string" {
            return None;
        }
        let raw = text_of(source, expr)?;
        Some(strip_string_quotes(&raw).trim().to_string())
    }

    fn is_call_node(&self, node: &Node) -> bool {
        node.kind() == "call"
    }

    fn call_target(&self, node: Node, source: &[u8]) -> Option<(String, Option<String>)> {
        let fun = node.child_by_field_name("function")?;
        match fun.kind() {
            "identifier" => text_of(source, fun).map(|n| (n, None)),
            "attribute" => {
                let name = field_text(source, fun, "attribute")?;
                let qualifier = fun
                    .child_by_field_name("object")
                    .filter(|o| o.kind() == "identifier")
                    .and_then(|o| text_of(source, o));
                Some((name, qualifier))
            }
            _ => None,
        }
    }
}

fn strip_string_quotes(raw: &str) -> &str {
    let body = raw
        .trim_start_matches(['r', 'b', 'u', 'f', 'R', 'B', 'U', 'F']);
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if body.len() >= quote.len() * 2 && body.starts_with(quote) && body.ends_with(quote) {
            return &body[quote.len()..body.len() - quote.len()];
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse_source;

    fn parse(source: &str) -> tree_sitter::Tree {
        parse_source(&PythonAdapter, source).tree.unwrap()
    }

    fn named_children(tree: &tree_sitter::Tree) -> Vec<Node<'_>> {
        let root = tree.root_node();
        (0..root.named_child_count())
            .filter_map(|i| root.named_child(i))
            .collect()
    }

    #[test]
    fn imports_keep_relative_dots() {
        let source = "import os.path\nfrom ..pkg import thing\nfrom . import sibling\n";
        let tree = parse(source);
        let bytes = source.as_bytes();

        let mut paths = Vec::new();
        for child in named_children(&tree) {
            if PythonAdapter.is_import_node(&child) {
                paths.extend(PythonAdapter.import_paths(child, bytes));
            }
        }

        assert!(paths.contains(&"os.path".to_string()));
        assert!(paths.contains(&"..pkg".to_string()));
        assert!(paths.contains(&".".to_string()));
    }

    #[test]
    fn def_signature_and_docstring() {
        let source = "def greet(name: str) -> str:\n    \"\"\"Say hello.\"\"\"\n    return name\n";
        let tree = parse(source);
        let bytes = source.as_bytes();
        let def = named_children(&tree)[0];

        let name = PythonAdapter.symbol_name(def, bytes).unwrap();
        assert_eq!(
            PythonAdapter.signature(def, bytes, &name),
            "def greet(name: str) -> str"
        );
        assert_eq!(PythonAdapter.doc_comment(def, bytes).unwrap(), "Say hello.");
    }

    #[test]
    fn method_call_qualifier() {
        let source = "x = client.fetch()\ny = run()\n";
        let tree = parse(source);
        let bytes = source.as_bytes();

        let mut targets = Vec::new();
        collect_calls(tree.root_node(), bytes, &mut targets);

        assert!(targets.contains(&("fetch".to_string(), Some("client".to_string()))));
        assert!(targets.contains(&("run".to_string(), None)));
    }

    fn collect_calls(node: Node, bytes: &[u8], out: &mut Vec<(String, Option<String>)>) {
        if PythonAdapter.is_call_node(&node) {
            if let Some(t) = PythonAdapter.call_target(node, bytes) {
                out.push(t);
            }
        }
        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                collect_calls(child, bytes, out);
            }
        }
    }
}
