//! Exact L2 nearest-neighbor index over chunk embeddings.
//!
//! The index is ephemeral: it is built from scratch for the full corpus at
//! load time and for every query's role-filtered subset, never updated in
//! place and never persisted. A neighbor's `position` is an index into the
//! exact sequence the index was built from.
//!
//! Search is brute force over all stored vectors (O(n·d) per query), which
//! matches a flat L2 index. Distances are squared Euclidean.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::embedding::{embed_query, l2_squared, EmbeddingProvider};

/// One search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    /// Squared L2 distance to the query vector.
    pub distance: f32,
    /// Position within the sequence the index was built from.
    pub position: usize,
}

/// Flat (exhaustive) L2 index.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    dims: usize,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Embed `texts` with `provider` and index the resulting vectors.
    ///
    /// An empty input produces an empty index without calling the provider.
    pub async fn build(provider: &dyn EmbeddingProvider, texts: &[String]) -> Result<Self> {
        if texts.is_empty() {
            return Ok(Self::empty(provider.dims()));
        }
        let vectors = provider.embed(texts).await?;
        if vectors.len() != texts.len() {
            bail!(
                "embedding provider returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            );
        }
        Self::from_vectors(vectors)
    }

    /// Index pre-computed vectors. All vectors must share one dimensionality.
    pub fn from_vectors(vectors: Vec<Vec<f32>>) -> Result<Self> {
        let dims = vectors.first().map(|v| v.len()).unwrap_or(0);
        if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dims) {
            bail!(
                "vector {} has dimension {}, expected {}",
                i,
                v.len(),
                dims
            );
        }
        Ok(Self { dims, vectors })
    }

    pub fn empty(dims: usize) -> Self {
        Self {
            dims,
            vectors: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        self.vectors.get(position).map(|v| v.as_slice())
    }

    /// The `k` nearest positions by ascending distance (all of them if the
    /// index holds fewer than `k`). Tie order is unspecified.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        if self.vectors.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut hits: Vec<Neighbor> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, v)| Neighbor {
                distance: l2_squared(query, v),
                position,
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        hits
    }

    /// Embed `question` and return its `k` nearest neighbors.
    ///
    /// Querying an empty index returns no matches and skips the embedding call.
    pub async fn query(
        &self,
        provider: &dyn EmbeddingProvider,
        question: &str,
        k: usize,
    ) -> Result<Vec<Neighbor>> {
        if self.vectors.is_empty() {
            return Ok(Vec::new());
        }
        let qv = embed_query(provider, question).await?;
        if qv.len() != self.dims {
            bail!(
                "query embedding has dimension {}, index expects {}",
                qv.len(),
                self.dims
            );
        }
        Ok(self.search(&qv, k))
    }

    /// A new index over the given positions, in the given order.
    ///
    /// Position `i` of the result corresponds to `positions[i]` of `self`.
    pub fn subset(&self, positions: &[usize]) -> Result<Self> {
        let mut vectors = Vec::with_capacity(positions.len());
        for &p in positions {
            match self.vectors.get(p) {
                Some(v) => vectors.push(v.clone()),
                None => bail!("position {} out of range for index of {}", p, self.len()),
            }
        }
        Ok(Self {
            dims: self.dims,
            vectors,
        })
    }
}
