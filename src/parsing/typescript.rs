//! TypeScript and TSX language adapter.

use super::{LanguageAdapter, field_text, single_line, text_of};
use crate::types::{Language, SymbolKind};
use tree_sitter::Node;

/// One adapter serves both dialects; only the grammar variant differs.
pub struct TypeScriptAdapter {
    tag: Language,
}

impl TypeScriptAdapter {
    pub fn typescript() -> Self {
        Self {
            tag: Language::TypeScript,
        }
    }

    pub fn tsx() -> Self {
        Self { tag: Language::Tsx }
    }
}

impl LanguageAdapter for TypeScriptAdapter {
    fn tag(&self) -> Language {
        self.tag
    }

    fn grammar(&self) -> tree_sitter::Language {
        match self.tag {
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            _ => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        }
    }

    fn symbol_kind(&self, node: &Node) -> Option<SymbolKind> {
        match node.kind() {
            "function_declaration" | "method_definition" => Some(SymbolKind::Function),
            "class_declaration" | "interface_declaration" | "enum_declaration"
            | "type_alias_declaration" => Some(SymbolKind::Class),
            // `const f = () => ...` and friends count as functions.
            "variable_declarator" => {
                let value = node.child_by_field_name("value")?;
                if matches!(
                    value.kind(),
                    "arrow_function" | "function" | "function_expression"
                ) {
                    Some(SymbolKind::Function)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn is_import_node(&self, node: &Node) -> bool {
        match node.kind() {
            "import_statement" => true,
            // `export { x } from "./mod"` re-exports are imports too.
            "export_statement" => node.child_by_field_name("source").is_some(),
            _ => false,
        }
    }

    fn import_paths(&self, node: Node, source: &[u8]) -> Vec<String> {
        match field_text(source, node, "source") {
            Some(raw) => vec![strip_quotes(&raw)],
            None => Vec::new(),
        }
    }

    fn symbol_name(&self, node: Node, source: &[u8]) -> Option<String> {
        field_text(source, node, "name")
    }

    fn signature(&self, node: Node, source: &[u8], name: &str) -> String {
        let (keyword, target) = match node.kind() {
            "function_declaration" => ("function ", Some(node)),
            "method_definition" => ("", Some(node)),
            "variable_declarator" => ("", node.child_by_field_name("value")),
            "class_declaration" => return format!("class {name}"),
            "interface_declaration" => return format!("interface {name}"),
            "enum_declaration" => return format!("enum {name}"),
            "type_alias_declaration" => return format!("type {name}"),
            _ => return name.to_string(),
        };
        let Some(target) = target else {
            return name.to_string();
        };
        let params = field_text(source, target, "parameters").unwrap_or_else(|| "()".to_string());
        let mut sig = format!("{keyword}{name}{}", single_line(&params));
        if let Some(ret) = field_text(source, target, "return_type") {
            sig.push_str(&single_line(&ret));
        }
        sig
    }

    fn doc_comment(&self, node: Node, source: &[u8]) -> Option<String> {
        // Variable declarators carry their doc on the outer statement.
        let anchor = if node.kind() == "variable_declarator" {
            statement_ancestor(node)
        } else {
            node
        };
        let sib = anchor.prev_sibling()?;
        if sib.kind() != "comment" {
            return None;
        }
        let raw = text_of(source, sib)?;
        if !raw.starts_with("/**") {
            return None;
        }
        let body = raw.trim_start_matches("/**").trim_end_matches("*/");
        let lines: Vec<String> = body
            .lines()
            .map(|l| l.trim().trim_start_matches('*').trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }

    fn is_call_node(&self, node: &Node) -> bool {
        node.kind() == "call_expression"
    }

    fn call_target(&self, node: Node, source: &[u8]) -> Option<(String, Option<String>)> {
        let fun = node.child_by_field_name("function")?;
        match fun.kind() {
            "identifier" => text_of(source, fun).map(|n| (n, None)),
            "member_expression" => {
                let name = field_text(source, fun, "property")?;
                let qualifier = fun
                    .child_by_field_name("object")
                    .filter(|o| o.kind() == "identifier")
                    .and_then(|o| text_of(source, o));
                Some((name, qualifier))
            }
            _ => None,
        }
    }

    fn type_reference(&self, node: Node, source: &[u8]) -> Option<String> {
        if node.kind() != "type_identifier" {
            return None;
        }
        if let Some(parent) = node.parent() {
            if parent.child_by_field_name("name") == Some(node) {
                return None;
            }
        }
        text_of(source, node)
    }
}

fn strip_quotes(raw: &str) -> String {
    raw.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

fn statement_ancestor(node: Node) -> Node {
    let mut cur = node;
    while let Some(parent) = cur.parent() {
        if matches!(
            parent.kind(),
            "lexical_declaration" | "variable_declaration" | "export_statement"
        ) {
            cur = parent;
        } else {
            break;
        }
    }
    cur
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::parse_source;

    fn parse(source: &str) -> tree_sitter::Tree {
        parse_source(&TypeScriptAdapter::typescript(), source)
            .tree
            .unwrap()
    }

    fn walk<'a>(node: Node<'a>, out: &mut Vec<Node<'a>>) {
        out.push(node);
        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                walk(child, out);
            }
        }
    }

    #[test]
    fn imports_and_reexports() {
        let source = "import { a } from \"./mod\";\nexport { b } from './other';\nexport const c = 1;\n";
        let tree = parse(source);
        let bytes = source.as_bytes();
        let adapter = TypeScriptAdapter::typescript();

        let mut nodes = Vec::new();
        walk(tree.root_node(), &mut nodes);
        let paths: Vec<String> = nodes
            .iter()
            .filter(|n| adapter.is_import_node(n))
            .flat_map(|n| adapter.import_paths(*n, bytes))
            .collect();

        assert_eq!(paths, vec!["./mod".to_string(), "./other".to_string()]);
    }

    #[test]
    fn arrow_const_is_function() {
        let source = "const handler = (req: Request): Response => respond(req);\nconst limit = 3;\n";
        let tree = parse(source);
        let bytes = source.as_bytes();
        let adapter = TypeScriptAdapter::typescript();

        let mut nodes = Vec::new();
        walk(tree.root_node(), &mut nodes);
        let fns: Vec<String> = nodes
            .iter()
            .filter(|n| adapter.symbol_kind(n) == Some(SymbolKind::Function))
            .filter_map(|n| adapter.symbol_name(*n, bytes))
            .collect();

        assert_eq!(fns, vec!["handler".to_string()]);
    }

    #[test]
    fn member_call_qualifier() {
        let source = "function f() { api.get(\"/x\"); go(); }";
        let tree = parse(source);
        let bytes = source.as_bytes();
        let adapter = TypeScriptAdapter::typescript();

        let mut nodes = Vec::new();
        walk(tree.root_node(), &mut nodes);
        let calls: Vec<(String, Option<String>)> = nodes
            .iter()
            .filter(|n| adapter.is_call_node(n))
            .filter_map(|n| adapter.call_target(*n, bytes))
            .collect();

        assert!(calls.contains(&("get".to_string(), Some("api".to_string()))));
        assert!(calls.contains(&("go".to_string(), None)));
    }
}
