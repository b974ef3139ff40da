//! Heuristic pattern rules.
//!
//! Line and symbol level checks over parseable files. Rules never abort an
//! analysis run: a failing rule degrades to a `RuleFailure` warning and the
//! remaining rules still report.

use crate::index::RepositoryIndex;
use crate::types::{
    FileId, Finding, FindingCategory, IndexWarning, Severity, SourceFile, SymbolDef, SymbolKind,
    WarningKind,
};
use lasso::ThreadedRodeo;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Rule categories selectable by callers. `All` is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckSet {
    Security,
    Performance,
    Quality,
    All,
}

impl CheckSet {
    fn covers(&self, category: FindingCategory) -> bool {
        match self {
            Self::All => true,
            Self::Security => category == FindingCategory::Security,
            Self::Performance => category == FindingCategory::Performance,
            Self::Quality => category == FindingCategory::Quality,
        }
    }
}

/// Per-file inputs handed to each rule.
pub struct RuleContext<'a> {
    pub file: &'a SourceFile,
    pub rel_path: &'a str,
    pub source: &'a str,
    /// Symbols defined in this file, in position order.
    pub symbols: &'a [SymbolDef],
    pub interner: &'a ThreadedRodeo,
}

impl RuleContext<'_> {
    fn finding(
        &self,
        line: usize,
        category: FindingCategory,
        severity: Severity,
        message: impl Into<String>,
        excerpt: &str,
    ) -> Finding {
        Finding {
            file: self.rel_path.to_string(),
            line,
            category,
            severity,
            message: message.into(),
            excerpt: truncate(excerpt.trim(), 80),
        }
    }
}

/// One heuristic check.
pub trait PatternRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn category(&self) -> FindingCategory;
    fn check(&self, ctx: &RuleContext) -> anyhow::Result<Vec<Finding>>;
}

/// Aggregate result of a pattern run.
#[derive(Debug, Default)]
pub struct PatternReport {
    pub findings: Vec<Finding>,
    pub warnings: Vec<IndexWarning>,
}

pub struct PatternAnalyzer {
    rules: Vec<Box<dyn PatternRule>>,
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self {
            rules: vec![
                Box::new(HardcodedSecrets),
                Box::new(SqlInjection),
                Box::new(BlockingSleep),
                Box::new(NestedQueryLoop),
                Box::new(LongFunction),
                Box::new(GodObject),
                Box::new(LargeFile),
            ],
        }
    }
}

impl PatternAnalyzer {
    /// Run the selected rule categories over every parseable file, or
    /// over just `target` when one is given.
    /// Findings come back sorted by file, line, then descending severity.
    pub fn analyze(
        &self,
        index: &RepositoryIndex,
        checks: CheckSet,
        target: Option<FileId>,
    ) -> PatternReport {
        let mut report = PatternReport::default();

        for file in index.files() {
            if target.is_some_and(|t| t != file.id) {
                continue;
            }
            if !file.language.is_parseable() {
                continue;
            }
            let rel_path = file.rel_path.to_string_lossy().into_owned();
            let source = match std::fs::read_to_string(index.root().join(&file.rel_path)) {
                Ok(s) => s,
                Err(err) => {
                    report.warnings.push(IndexWarning::for_file(
                        WarningKind::UnreadableFile,
                        rel_path,
                        err.to_string(),
                    ));
                    continue;
                }
            };
            let ctx = RuleContext {
                file,
                rel_path: &rel_path,
                source: &source,
                symbols: index.symbols_in(file.id),
                interner: index.interner(),
            };
            for rule in &self.rules {
                if !checks.covers(rule.category()) {
                    continue;
                }
                match rule.check(&ctx) {
                    Ok(findings) => report.findings.extend(findings),
                    Err(err) => report.warnings.push(IndexWarning::for_file(
                        WarningKind::RuleFailure,
                        rel_path.clone(),
                        format!("{}: {err}", rule.name()),
                    )),
                }
            }
        }

        report.findings.sort_by(|a, b| {
            (a.file.as_str(), a.line)
                .cmp(&(b.file.as_str(), b.line))
                .then(b.severity.cmp(&a.severity))
        });
        report
    }
}

// ============================================================================
// Security rules
// ============================================================================

static SECRET_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (
            r#"(?i)(password|passwd|pwd)\s*=\s*["'][^"']+["']"#,
            "Hardcoded password",
        ),
        (
            r#"(?i)(api_key|apikey|api-key)\s*=\s*["'][^"']+["']"#,
            "Hardcoded API key",
        ),
        (
            r#"(?i)(secret|token)\s*=\s*["'][a-zA-Z0-9]{20,}["']"#,
            "Hardcoded secret or token",
        ),
        (r"(?i)(aws_access_key|aws_secret)", "AWS credentials in code"),
    ]
    .into_iter()
    .filter_map(|(p, m)| Regex::new(p).ok().map(|r| (r, m)))
    .collect()
});

const SECRET_ALLOWLIST: &[&str] = &[
    "example",
    "placeholder",
    "xxx",
    "your_",
    "env.",
    "process.env",
    "os.environ",
];

struct HardcodedSecrets;

impl PatternRule for HardcodedSecrets {
    fn name(&self) -> &'static str {
        "hardcoded-secrets"
    }

    fn category(&self) -> FindingCategory {
        FindingCategory::Security
    }

    fn check(&self, ctx: &RuleContext) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();
        for (line_no, line) in ctx.source.lines().enumerate() {
            let lowered = line.to_lowercase();
            if SECRET_ALLOWLIST.iter().any(|a| lowered.contains(a)) {
                continue;
            }
            for (pattern, message) in SECRET_PATTERNS.iter() {
                if pattern.is_match(line) {
                    findings.push(ctx.finding(
                        line_no + 1,
                        FindingCategory::Security,
                        Severity::Critical,
                        *message,
                        line,
                    ));
                }
            }
        }
        Ok(findings)
    }
}

static SQL_CONCAT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)(execute|query|raw)\s*\([^)]*["'][^"']*\s*\+"#).ok()
});
static SQL_FSTRING: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)f["'].*\{.*\}.*(SELECT|INSERT|UPDATE|DELETE)"#).ok()
});

struct SqlInjection;

impl PatternRule for SqlInjection {
    fn name(&self) -> &'static str {
        "sql-injection"
    }

    fn category(&self) -> FindingCategory {
        FindingCategory::Security
    }

    fn check(&self, ctx: &RuleContext) -> anyhow::Result<Vec<Finding>> {
        let concat = SQL_CONCAT
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("sql concat pattern failed to compile"))?;
        let fstring = SQL_FSTRING
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("sql fstring pattern failed to compile"))?;

        let mut findings = Vec::new();
        for (line_no, line) in ctx.source.lines().enumerate() {
            if concat.is_match(line) || fstring.is_match(line) {
                findings.push(ctx.finding(
                    line_no + 1,
                    FindingCategory::Security,
                    Severity::Warning,
                    "Potential SQL injection, use parameterized queries",
                    line,
                ));
            }
        }
        Ok(findings)
    }
}

// ============================================================================
// Performance rules
// ============================================================================

static BLOCKING_SLEEP: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(time\.sleep|thread::sleep|sleep_ms)\s*\(\s*\d").ok()
});

struct BlockingSleep;

impl PatternRule for BlockingSleep {
    fn name(&self) -> &'static str {
        "blocking-sleep"
    }

    fn category(&self) -> FindingCategory {
        FindingCategory::Performance
    }

    fn check(&self, ctx: &RuleContext) -> anyhow::Result<Vec<Finding>> {
        let pattern = BLOCKING_SLEEP
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("sleep pattern failed to compile"))?;

        let mut findings = Vec::new();
        for (line_no, line) in ctx.source.lines().enumerate() {
            if pattern.is_match(line) {
                findings.push(ctx.finding(
                    line_no + 1,
                    FindingCategory::Performance,
                    Severity::Info,
                    "Blocking sleep, consider an async alternative",
                    line,
                ));
            }
        }
        Ok(findings)
    }
}

static LOOP_HEADER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*for\s+.+\s+in\s+.+[:{]\s*$").ok());
static QUERY_CALL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\.(find|get|query|fetch|select)").ok());

struct NestedQueryLoop;

impl PatternRule for NestedQueryLoop {
    fn name(&self) -> &'static str {
        "nested-query-loop"
    }

    fn category(&self) -> FindingCategory {
        FindingCategory::Performance
    }

    fn check(&self, ctx: &RuleContext) -> anyhow::Result<Vec<Finding>> {
        let header = LOOP_HEADER
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("loop pattern failed to compile"))?;
        let query = QUERY_CALL
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("query pattern failed to compile"))?;

        let lines: Vec<&str> = ctx.source.lines().collect();
        let mut findings = Vec::new();
        for (line_no, line) in lines.iter().enumerate() {
            if !header.is_match(line) {
                continue;
            }
            // Look at the first three lines of the loop body.
            let body = lines[line_no + 1..(line_no + 4).min(lines.len())].join("\n");
            if query.is_match(&body) {
                findings.push(ctx.finding(
                    line_no + 1,
                    FindingCategory::Performance,
                    Severity::Warning,
                    "Potential N+1 query, consider batch fetching",
                    line,
                ));
            }
        }
        Ok(findings)
    }
}

// ============================================================================
// Quality rules
// ============================================================================

const LONG_FUNCTION_LINES: usize = 100;

struct LongFunction;

impl PatternRule for LongFunction {
    fn name(&self) -> &'static str {
        "long-function"
    }

    fn category(&self) -> FindingCategory {
        FindingCategory::Quality
    }

    fn check(&self, ctx: &RuleContext) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();
        for symbol in ctx.symbols {
            if !matches!(symbol.kind, SymbolKind::Function | SymbolKind::Method) {
                continue;
            }
            let lines = symbol.span.end_line - symbol.span.start_line + 1;
            if lines > LONG_FUNCTION_LINES {
                findings.push(ctx.finding(
                    symbol.span.start_line,
                    FindingCategory::Quality,
                    Severity::Warning,
                    format!("Function too long ({lines} lines), consider splitting"),
                    &symbol.signature,
                ));
            }
        }
        Ok(findings)
    }
}

const GOD_OBJECT_METHODS: usize = 20;

struct GodObject;

impl PatternRule for GodObject {
    fn name(&self) -> &'static str {
        "god-object"
    }

    fn category(&self) -> FindingCategory {
        FindingCategory::Quality
    }

    fn check(&self, ctx: &RuleContext) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();
        for symbol in ctx.symbols {
            if symbol.kind != SymbolKind::Class {
                continue;
            }
            let methods = ctx
                .symbols
                .iter()
                .filter(|s| s.parent == Some(symbol.id) && s.kind == SymbolKind::Method)
                .count();
            if methods > GOD_OBJECT_METHODS {
                let name = ctx.interner.resolve(&symbol.name);
                findings.push(ctx.finding(
                    symbol.span.start_line,
                    FindingCategory::Quality,
                    Severity::Warning,
                    format!("Class has too many methods ({methods}), possible god object"),
                    &format!("class {name}"),
                ));
            }
        }
        Ok(findings)
    }
}

const LARGE_FILE_LINES: usize = 500;

struct LargeFile;

impl PatternRule for LargeFile {
    fn name(&self) -> &'static str {
        "large-file"
    }

    fn category(&self) -> FindingCategory {
        FindingCategory::Quality
    }

    fn check(&self, ctx: &RuleContext) -> anyhow::Result<Vec<Finding>> {
        let lines = ctx.source.lines().count();
        if lines > LARGE_FILE_LINES {
            return Ok(vec![ctx.finding(
                1,
                FindingCategory::Quality,
                Severity::Info,
                format!("Large file ({lines} lines), consider splitting"),
                "",
            )]);
        }
        Ok(Vec::new())
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileId, Language, Span, SymbolId};
    use std::path::PathBuf;

    fn ctx<'a>(
        file: &'a SourceFile,
        source: &'a str,
        symbols: &'a [SymbolDef],
        interner: &'a ThreadedRodeo,
    ) -> RuleContext<'a> {
        RuleContext {
            file,
            rel_path: "app.py",
            source,
            symbols,
            interner,
        }
    }

    fn plain_file() -> SourceFile {
        SourceFile {
            id: FileId(0),
            rel_path: PathBuf::from("app.py"),
            language: Language::Python,
            size: 0,
            modified_ms: 0,
            line_count: 1,
            is_binary: false,
        }
    }

    #[test]
    fn secrets_flagged_and_allowlist_respected() {
        let file = plain_file();
        let interner = ThreadedRodeo::default();
        let source = "password = \"hunter2\"\napi_key = \"your_key_here\"\n";
        let findings = HardcodedSecrets
            .check(&ctx(&file, source, &[], &interner))
            .unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, 1);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[0].message, "Hardcoded password");
    }

    #[test]
    fn sql_concat_flagged() {
        let file = plain_file();
        let interner = ThreadedRodeo::default();
        let source = "cursor.execute(\"SELECT * FROM users WHERE id = \" + user_id)\n";
        let findings = SqlInjection
            .check(&ctx(&file, source, &[], &interner))
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
    }

    #[test]
    fn loop_with_query_in_body_flagged() {
        let file = plain_file();
        let interner = ThreadedRodeo::default();
        let source = "for user in users:\n    profile = db.get(user.id)\n";
        let findings = NestedQueryLoop
            .check(&ctx(&file, source, &[], &interner))
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, 1);
    }

    #[test]
    fn long_function_uses_symbol_spans() {
        let file = plain_file();
        let interner = ThreadedRodeo::default();
        let name = interner.get_or_intern("huge");
        let symbols = vec![SymbolDef {
            id: SymbolId(0),
            file: FileId(0),
            name,
            qualified_name: name,
            kind: SymbolKind::Function,
            signature: "def huge()".to_string(),
            span: Span {
                start_byte: 0,
                end_byte: 0,
                start_line: 5,
                start_col: 0,
                end_line: 160,
                end_col: 0,
            },
            parent: None,
            doc_comment: None,
        }];
        let findings = LongFunction
            .check(&ctx(&file, "", &symbols, &interner))
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, 5);
    }

    #[test]
    fn short_file_produces_no_size_finding() {
        let file = plain_file();
        let interner = ThreadedRodeo::default();
        let findings = LargeFile
            .check(&ctx(&file, "a\nb\n", &[], &interner))
            .unwrap();
        assert!(findings.is_empty());
    }
}
