//! End-to-end engine tests over temporary repositories.

use pretty_assertions::assert_eq;
use repolens::engine::Engine;
use repolens::graph::Direction;
use repolens::index::IndexBuilder;
use repolens::repomap::{RepoMapOptions, estimate_tokens};
use repolens::scanner::Scanner;
use repolens::types::{RefKind, Resolution};
use repolens::EngineError;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn sample_repo() -> TempDir {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "src/parser.py",
        concat!(
            "from .tokens import Token\n",
            "\n",
            "class Parser:\n",
            "    \"\"\"Recursive descent parser.\"\"\"\n",
            "    def parse(self, text):\n",
            "        return self.advance(text)\n",
            "\n",
            "    def advance(self, text):\n",
            "        return Token(text)\n",
        ),
    );
    write(
        temp.path(),
        "src/tokens.py",
        "class Token:\n    def __init__(self, text):\n        self.text = text\n",
    );
    write(
        temp.path(),
        "main.py",
        concat!(
            "from src.parser import Parser\n",
            "\n",
            "def main():\n",
            "    parser = Parser()\n",
            "    parser.parse(\"input\")\n",
        ),
    );
    temp
}

#[tokio::test]
async fn repo_map_covers_every_parsed_file() {
    let repo = sample_repo();
    let engine = Engine::new();
    let result = engine
        .repo_map(repo.path(), RepoMapOptions::default())
        .await
        .unwrap();

    assert!(result.text.contains("### parser.py"));
    assert!(result.text.contains("### tokens.py"));
    assert!(result.text.contains("### main.py"));
    assert!(result.text.contains("class Parser:"));
    assert!(result.text.contains("def parse(self, text)"));
}

#[tokio::test]
async fn repo_map_budget_is_hard_and_truncation_is_whole_line() {
    let repo = sample_repo();
    let engine = Engine::new();

    let full = engine
        .repo_map(repo.path(), RepoMapOptions::default())
        .await
        .unwrap();
    let budget = 50;
    let tight = engine
        .repo_map(
            repo.path(),
            RepoMapOptions {
                max_tokens: budget,
                include_docs: false,
            },
        )
        .await
        .unwrap();

    assert!(estimate_tokens(&tight.text) <= budget);
    for line in tight.text.lines() {
        assert!(
            line == "... (truncated)" || full.text.lines().any(|l| l == line),
            "line was cut mid-way: {line:?}"
        );
    }
}

#[tokio::test]
async fn mutual_imports_are_two_edges_and_graph_ops_terminate() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "a.py", "import b\n\ndef fa():\n    fb()\n");
    write(temp.path(), "b.py", "import a\n\ndef fb():\n    fa()\n");

    let engine = Engine::new();
    let deps_a = engine
        .dependencies(temp.path(), Path::new("a.py"))
        .await
        .unwrap();
    let deps_b = engine
        .dependencies(temp.path(), Path::new("b.py"))
        .await
        .unwrap();
    assert_eq!(deps_a.imports, vec!["b.py"]);
    assert_eq!(deps_a.imported_by, vec!["b.py"]);
    assert_eq!(deps_b.imports, vec!["a.py"]);

    let cycles = engine.dependency_cycles(temp.path()).await.unwrap();
    assert_eq!(cycles, vec![vec!["a.py".to_string(), "b.py".to_string()]]);

    // Recursive calls walk to a fixed point instead of looping.
    let graph = engine
        .call_graph(temp.path(), "fa", Direction::Callees, Some(50), None)
        .await
        .unwrap();
    assert_eq!(graph.nodes.len(), 2);
    assert!(!graph.truncated);
}

#[tokio::test]
async fn ambiguous_name_produces_an_edge_per_candidate() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "left.py", "def foo():\n    pass\n");
    write(temp.path(), "right.py", "def foo():\n    pass\n");
    write(temp.path(), "caller.py", "def run():\n    foo()\n");

    let index = IndexBuilder::new().build(temp.path()).await.unwrap();
    let call = index
        .references()
        .iter()
        .find(|r| r.kind == RefKind::Call && r.name == "foo")
        .unwrap();
    match &call.resolution {
        Resolution::Ambiguous(ids) => assert_eq!(ids.len(), 2),
        other => panic!("expected ambiguity to survive, got {other:?}"),
    }

    let engine = Engine::new();
    let graph = engine
        .call_graph(temp.path(), "run", Direction::Callees, None, None)
        .await
        .unwrap();
    assert_eq!(graph.edges.len(), 2);
    assert!(graph.edges.iter().all(|e| e.confidence == "heuristic"));
}

#[tokio::test]
async fn ignored_directories_never_contribute_symbols() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "src/real.py", "def real(): pass\n");
    write(temp.path(), "build/generated.py", "def generated(): pass\n");

    let scanner = Scanner::new().with_ignore("build/");
    let engine = Engine::new().with_builder(IndexBuilder::new().with_scanner(scanner));

    let summary = engine.scan(temp.path()).await.unwrap();
    assert_eq!(summary.total_files, 1);

    let matches = engine
        .search_symbols(temp.path(), "generated", 10)
        .await
        .unwrap();
    assert!(matches.is_empty());
}

#[tokio::test]
async fn broken_file_degrades_without_failing_the_build() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "good.py", "def fine(): pass\n");
    write(
        temp.path(),
        "broken.rs",
        "fn first() {}\nfn broken( {\nfn last() {}\n",
    );

    let engine = Engine::new();
    let summary = engine.scan(temp.path()).await.unwrap();
    assert_eq!(summary.total_files, 2);
    assert!(
        summary
            .warnings
            .iter()
            .any(|w| w.file.as_deref() == Some("broken.rs"))
    );

    let matches = engine.search_symbols(temp.path(), "first", 10).await.unwrap();
    assert_eq!(matches.len(), 1);
    let matches = engine.search_symbols(temp.path(), "last", 10).await.unwrap();
    assert_eq!(matches.len(), 1);
}

#[tokio::test]
async fn symbol_spans_stay_within_file_bounds() {
    let repo = sample_repo();
    let index = IndexBuilder::new().build(repo.path()).await.unwrap();

    for symbol in index.symbols() {
        let file = index.file(symbol.file);
        let size = fs::metadata(repo.path().join(&file.rel_path)).unwrap().len() as usize;
        assert!(symbol.span.start_byte <= symbol.span.end_byte);
        assert!(symbol.span.end_byte <= size);
        assert!(symbol.span.start_line >= 1);
        assert!(symbol.span.end_line <= file.line_count);
    }
}

#[tokio::test]
async fn read_file_range_error_is_fatal_to_that_call_only() {
    let repo = sample_repo();
    let engine = Engine::new();

    let err = engine
        .read_file(repo.path(), Path::new("main.py"), 10, Some(5))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Range(_)));

    // The engine still answers afterwards.
    let slice = engine
        .read_file(repo.path(), Path::new("main.py"), 1, Some(1))
        .await
        .unwrap();
    assert_eq!(slice.content, "from src.parser import Parser");
}

#[tokio::test]
async fn relative_import_resolves_inside_package() {
    let repo = sample_repo();
    let engine = Engine::new();

    let deps = engine
        .dependencies(repo.path(), Path::new("src/parser.py"))
        .await
        .unwrap();
    assert_eq!(deps.imports, vec!["src/tokens.py"]);
    assert_eq!(deps.imported_by, vec!["main.py"]);
}

#[tokio::test]
async fn responses_serialize_to_json() {
    let repo = sample_repo();
    let engine = Engine::new();

    let summary = engine.scan(repo.path()).await.unwrap();
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["total_files"], 3);
    assert!(json["languages"].is_array());

    let graph = engine
        .call_graph(repo.path(), "parse", Direction::Callers, None, None)
        .await
        .unwrap();
    let json = serde_json::to_value(&graph).unwrap();
    assert_eq!(json["direction"], "callers");
    assert!(json["nodes"].is_array());
}

#[tokio::test]
async fn search_results_carry_position_and_parent() {
    let repo = sample_repo();
    let engine = Engine::new();

    let matches = engine
        .search_symbols(repo.path(), "parse", 10)
        .await
        .unwrap();
    let parse = matches
        .iter()
        .find(|m| m.qualified_name == "Parser::parse")
        .unwrap();
    assert_eq!(parse.file, "src/parser.py");
    assert_eq!(parse.kind, "method");
    assert_eq!(parse.parent.as_deref(), Some("Parser"));
    assert!(parse.line >= 1 && parse.line <= parse.end_line);
}
