//! Repository scanner.
//!
//! Walks a root directory with gitignore semantics, classifies languages by
//! extension, and probes for binary content. Excluded directories are pruned
//! without descending, so their files are never read.

use crate::error::EngineError;
use crate::types::{IndexWarning, Language, WarningKind};
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Bytes probed for the NUL-byte binary heuristic.
const BINARY_PROBE_BYTES: usize = 8192;

/// A candidate file produced by the scanner. Content is not read here beyond
/// the binary probe.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub abs_path: PathBuf,
    pub rel_path: PathBuf,
    pub language: Language,
    pub size: u64,
    pub modified_ms: u64,
    pub is_binary: bool,
}

/// Result of a scan: the candidate list plus non-fatal warnings.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub files: Vec<ScannedFile>,
    pub warnings: Vec<IndexWarning>,
}

/// Walks a repository root applying ignore rules.
#[derive(Debug, Clone)]
pub struct Scanner {
    /// Extra ignore patterns with gitignore semantics, applied on top of the
    /// repository's own ignore file.
    ignore_patterns: Vec<String>,
    /// Files above this size are listed but never read.
    max_file_size: u64,
}

impl Default for Scanner {
    fn default() -> Self {
        Self {
            ignore_patterns: Vec::new(),
            max_file_size: 2 * 1024 * 1024,
        }
    }
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an ignore pattern (gitignore syntax, `!` negates).
    pub fn with_ignore(mut self, pattern: &str) -> Self {
        self.ignore_patterns.push(pattern.to_string());
        self
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Scan the root, returning candidate files sorted by relative path.
    pub fn scan(&self, root: &Path) -> Result<ScanOutcome, EngineError> {
        if !root.exists() {
            return Err(EngineError::Scan(format!(
                "root path does not exist: {}",
                root.display()
            )));
        }
        if !root.is_dir() {
            return Err(EngineError::Scan(format!(
                "root path is not a directory: {}",
                root.display()
            )));
        }

        let overrides = self.build_overrides(root)?;

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .require_git(false)
            .overrides(overrides)
            .build();

        let mut outcome = ScanOutcome::default();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    outcome.warnings.push(IndexWarning {
                        kind: WarningKind::UnreadableFile,
                        file: None,
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }

            let path = entry.path();
            let rel = path.strip_prefix(root).unwrap_or(path).to_path_buf();

            let metadata = match fs::metadata(path) {
                Ok(m) => m,
                Err(e) => {
                    outcome.warnings.push(IndexWarning::for_file(
                        WarningKind::UnreadableFile,
                        rel.to_string_lossy(),
                        e.to_string(),
                    ));
                    continue;
                }
            };

            let language = rel
                .extension()
                .and_then(|e| e.to_str())
                .map(Language::from_extension)
                .unwrap_or(Language::PlainText);

            let oversized = metadata.len() > self.max_file_size;
            let is_binary = if oversized {
                false
            } else {
                match probe_binary(path) {
                    Ok(b) => b,
                    Err(e) => {
                        outcome.warnings.push(IndexWarning::for_file(
                            WarningKind::UnreadableFile,
                            rel.to_string_lossy(),
                            e.to_string(),
                        ));
                        continue;
                    }
                }
            };

            outcome.files.push(ScannedFile {
                abs_path: path.to_path_buf(),
                rel_path: rel,
                // Oversized files degrade to uncounted plain text.
                language: if oversized { Language::PlainText } else { language },
                size: metadata.len(),
                modified_ms: modified_ms(&metadata),
                is_binary: is_binary || oversized,
            });
        }

        outcome.files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        Ok(outcome)
    }

    fn build_overrides(&self, root: &Path) -> Result<ignore::overrides::Override, EngineError> {
        let mut builder = OverrideBuilder::new(root);
        for pattern in &self.ignore_patterns {
            // Override patterns are whitelist-style; invert to get ignore
            // semantics, and un-invert caller negations.
            let inverted = if let Some(rest) = pattern.strip_prefix('!') {
                rest.to_string()
            } else {
                format!("!{pattern}")
            };
            builder
                .add(&inverted)
                .map_err(|e| EngineError::Scan(format!("bad ignore pattern {pattern:?}: {e}")))?;
        }
        builder
            .build()
            .map_err(|e| EngineError::Scan(e.to_string()))
    }
}

/// NUL byte within the first probe window marks a file binary.
fn probe_binary(path: &Path) -> std::io::Result<bool> {
    let mut file = fs::File::open(path)?;
    let mut buf = [0u8; BINARY_PROBE_BYTES];
    let mut read_total = 0;
    while read_total < buf.len() {
        let n = file.read(&mut buf[read_total..])?;
        if n == 0 {
            break;
        }
        read_total += n;
    }
    Ok(buf[..read_total].contains(&0))
}

fn modified_ms(metadata: &fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn scan_classifies_languages() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.rs", b"fn main() {}");
        write(temp.path(), "b.py", b"def f(): pass");
        write(temp.path(), "notes.txt", b"hello");

        let outcome = Scanner::new().scan(temp.path()).unwrap();
        let langs: Vec<_> = outcome.files.iter().map(|f| f.language).collect();
        assert_eq!(
            langs,
            vec![Language::Rust, Language::Python, Language::PlainText]
        );
    }

    #[test]
    fn scan_missing_root_fails() {
        let err = Scanner::new().scan(Path::new("/nonexistent/abc")).unwrap_err();
        assert!(matches!(err, EngineError::Scan(_)));
    }

    #[test]
    fn ignore_pattern_prunes_directory() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/a.rs", b"fn a() {}");
        write(temp.path(), "build/out.rs", b"fn generated() {}");

        let outcome = Scanner::new()
            .with_ignore("build/")
            .scan(temp.path())
            .unwrap();
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].rel_path, PathBuf::from("src/a.rs"));
    }

    #[test]
    fn gitignore_respected_by_default() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), ".gitignore", b"generated/\n");
        write(temp.path(), "generated/x.rs", b"fn x() {}");
        write(temp.path(), "y.rs", b"fn y() {}");

        let outcome = Scanner::new().scan(temp.path()).unwrap();
        let names: Vec<_> = outcome
            .files
            .iter()
            .map(|f| f.rel_path.to_string_lossy().to_string())
            .collect();
        assert!(names.contains(&"y.rs".to_string()));
        assert!(!names.iter().any(|n| n.starts_with("generated/")));
    }

    #[test]
    fn binary_files_flagged() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "blob.rs", &[0u8, 1, 2, 3]);
        write(temp.path(), "text.rs", b"fn t() {}");

        let outcome = Scanner::new().scan(temp.path()).unwrap();
        let blob = outcome
            .files
            .iter()
            .find(|f| f.rel_path.to_string_lossy() == "blob.rs")
            .unwrap();
        assert!(blob.is_binary);
        let text = outcome
            .files
            .iter()
            .find(|f| f.rel_path.to_string_lossy() == "text.rs")
            .unwrap();
        assert!(!text.is_binary);
    }
}
