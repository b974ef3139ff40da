//! Semantic ranking seam.
//!
//! The engine itself is purely syntactic; this trait is the attachment
//! point for an embedding backend. The default ranking falls back to plain
//! name containment so callers get reasonable results with no backend at
//! all.

use crate::index::RepositoryIndex;
use crate::types::SymbolId;

/// Produces fixed-width embeddings for short code snippets.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Rank symbols against a query, best first.
///
/// With a provider, signatures and doc comments are embedded and scored by
/// cosine similarity; without one, substring matching on names decides.
pub fn rank_symbols(
    index: &RepositoryIndex,
    query: &str,
    provider: Option<&dyn EmbeddingProvider>,
    limit: usize,
) -> Vec<(SymbolId, f32)> {
    let mut scored: Vec<(SymbolId, f32)> = match provider {
        Some(provider) => {
            let Ok(query_vec) = provider.embed(query) else {
                return Vec::new();
            };
            index
                .symbols()
                .iter()
                .filter_map(|symbol| {
                    let mut text = symbol.signature.clone();
                    if let Some(doc) = &symbol.doc_comment {
                        text.push(' ');
                        text.push_str(doc);
                    }
                    let vec = provider.embed(&text).ok()?;
                    Some((symbol.id, provider.similarity(&query_vec, &vec)))
                })
                .collect()
        }
        None => {
            let needle = query.to_lowercase();
            index
                .symbols()
                .iter()
                .filter_map(|symbol| {
                    let name = index.name(symbol.name).to_lowercase();
                    if name == needle {
                        Some((symbol.id, 1.0))
                    } else if name.contains(&needle) {
                        Some((symbol.id, 0.5))
                    } else {
                        None
                    }
                })
                .collect()
        }
    };

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexBuilder;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn cosine_basics() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn name_fallback_prefers_exact_match() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("a.py"),
            "def parse(): pass\ndef parse_header(): pass\ndef emit(): pass\n",
        )
        .unwrap();
        let index = IndexBuilder::new().build(temp.path()).await.unwrap();

        let ranked = rank_symbols(&index, "parse", None, 10);
        assert_eq!(ranked.len(), 2);
        assert_eq!(index.name(index.symbol(ranked[0].0).name), "parse");
        assert_eq!(index.name(index.symbol(ranked[1].0).name), "parse_header");
    }
}
