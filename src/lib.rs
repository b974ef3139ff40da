#![allow(clippy::collapsible_if)]
#![allow(clippy::too_many_arguments)]

//! repolens
//!
//! A repository indexing and analysis engine for AI coding agents.
//!
//! # Architecture
//!
//! Indexing runs as a pipeline over one repository root:
//!
//! 1. **Scan**: walk the tree with gitignore semantics, classify languages,
//!    and flag binaries without reading file bodies.
//! 2. **Parse and extract**: per-language tree-sitter grammars feed one
//!    generic extractor that produces symbols and unresolved references.
//!    Broken files degrade to partial extraction, never to a failed build.
//! 3. **Graphs**: file-level imports resolve into a dependency graph;
//!    call references resolve in three tiers (same file, imported files,
//!    repository-wide) with ambiguity preserved as edge sets.
//!
//! The resulting [`index::RepositoryIndex`] is an immutable snapshot cached
//! per root. Query operations on [`engine::Engine`] serve from the snapshot:
//! token-budgeted repository maps, symbol search, usage lookup, bounded
//! call graph walks, heuristic pattern findings, and compressed context.
//!
//! # Usage
//!
//! ```ignore
//! use repolens::engine::Engine;
//! use repolens::repomap::RepoMapOptions;
//!
//! let engine = Engine::new();
//! let map = engine.repo_map("/path/to/repo".as_ref(), RepoMapOptions::default()).await?;
//! println!("{}", map.text);
//! ```

pub mod cache;
pub mod engine;
pub mod error;
pub mod extract;
pub mod graph;
pub mod index;
pub mod parsing;
pub mod patterns;
pub mod repomap;
pub mod scanner;
pub mod semantic;
pub mod types;

pub use engine::Engine;
pub use error::{EngineError, Result};
pub use index::{IndexBuilder, RepositoryIndex};
pub use scanner::Scanner;
