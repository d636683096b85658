// file: src/aggregate/narrowing.rs
// description: embedding-similarity pre-filter selecting the descriptions nearest to the keyword

use crate::clients::Embedder;
use crate::error::{PipelineError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct Narrower {
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    chunk_size: usize,
    pacing: Duration,
}

impl Narrower {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        top_k: usize,
        chunk_size: usize,
        pacing: Duration,
    ) -> Self {
        Self {
            embedder,
            top_k: top_k.max(1),
            chunk_size: chunk_size.max(1),
            pacing,
        }
    }

    /// The `top_k` descriptions nearest to the keyword, nearest first. Sets no
    /// larger than `top_k` are returned untouched.
    pub async fn narrow(&self, keyword: &str, descriptions: Vec<String>) -> Result<Vec<String>> {
        if descriptions.len() <= self.top_k {
            debug!(
                "Skipping narrowing: {} descriptions within top_k {}",
                descriptions.len(),
                self.top_k
            );
            return Ok(descriptions);
        }

        let vectors = self.embed_chunked(&descriptions).await?;
        let query = self
            .embed_chunked(&[keyword.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Generation("No embedding for keyword".to_string()))?;

        let nearest = nearest_indices(&query, &vectors, self.top_k)?;
        info!(
            "Narrowed {} descriptions to {} nearest to '{}'",
            descriptions.len(),
            nearest.len(),
            keyword
        );

        Ok(nearest
            .into_iter()
            .map(|idx| descriptions[idx].clone())
            .collect())
    }

    async fn embed_chunked(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for (i, chunk) in texts.chunks(self.chunk_size).enumerate() {
            if i > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            let embedded = self.embedder.embed(chunk).await?;
            if embedded.len() != chunk.len() {
                return Err(PipelineError::Generation(format!(
                    "Embedder returned {} vectors for {} texts",
                    embedded.len(),
                    chunk.len()
                )));
            }
            vectors.extend(embedded);
        }

        Ok(vectors)
    }
}

fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Indices of the `k` vectors closest to `query` by L2 distance, ascending,
/// ties kept in input order. Each index appears at most once.
pub fn nearest_indices(query: &[f32], vectors: &[Vec<f32>], k: usize) -> Result<Vec<usize>> {
    if let Some(bad) = vectors.iter().find(|v| v.len() != query.len()) {
        return Err(PipelineError::Generation(format!(
            "Embedding dimension mismatch: {} vs {}",
            bad.len(),
            query.len()
        )));
    }

    let mut scored: Vec<(usize, f32)> = vectors
        .iter()
        .enumerate()
        .map(|(idx, v)| (idx, l2_squared(query, v)))
        .collect();

    scored.sort_by(|a, b| a.1.total_cmp(&b.1));
    Ok(scored.into_iter().take(k).map(|(idx, _)| idx).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeEmbedder;

    #[test]
    fn test_nearest_indices_orders_by_distance() {
        let vectors = vec![vec![5.0, 5.0], vec![0.1, 0.0], vec![1.0, 1.0], vec![0.1, 0.0]];
        let nearest = nearest_indices(&[0.0, 0.0], &vectors, 3).unwrap();
        assert_eq!(nearest, vec![1, 3, 2]);
    }

    #[test]
    fn test_nearest_indices_caps_at_available() {
        let vectors = vec![vec![1.0], vec![2.0]];
        assert_eq!(nearest_indices(&[0.0], &vectors, 10).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let vectors = vec![vec![1.0, 2.0]];
        assert!(nearest_indices(&[0.0], &vectors, 1).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_narrow_embeds_in_chunks() {
        let embedder = Arc::new(FakeEmbedder::new());
        let narrower = Narrower::new(embedder.clone(), 2, 5, Duration::from_secs(1));

        // the fake embeds a text as [len]; the keyword "ab" sits nearest the short texts
        let descriptions: Vec<String> = (1..=12).map(|n| "x".repeat(n)).collect();
        let narrowed = narrower.narrow("ab", descriptions).await.unwrap();

        assert_eq!(narrowed, vec!["xx".to_string(), "x".to_string()]);
        // 12 descriptions in chunks of 5, plus the keyword
        assert_eq!(embedder.calls(), 4);
    }

    #[tokio::test]
    async fn test_small_sets_skip_embedding() {
        let embedder = Arc::new(FakeEmbedder::new());
        let narrower = Narrower::new(embedder.clone(), 10, 5, Duration::ZERO);

        let narrowed = narrower
            .narrow("demo", vec!["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(narrowed.len(), 2);
        assert_eq!(embedder.calls(), 0);
    }
}
