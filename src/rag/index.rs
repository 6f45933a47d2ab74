//! Exact in-memory vector index with maximal marginal relevance search

use super::embedding::cosine_similarity;

#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub text: String,
    pub page: usize,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    chunks: Vec<IndexedChunk>,
}

impl VectorIndex {
    pub fn new(chunks: Vec<IndexedChunk>) -> Self {
        Self { chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Indices of the `fetch_k` chunks most similar to `query`, best first
    fn nearest(&self, query: &[f32], fetch_k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (i, cosine_similarity(query, &c.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(fetch_k);
        scored
    }

    /// Pick `k` chunks out of the `fetch_k` nearest, trading relevance to the
    /// query against similarity to chunks already picked.
    ///
    /// `lambda` of 1.0 is pure relevance, 0.0 is maximum diversity.
    pub fn max_marginal_relevance(
        &self,
        query: &[f32],
        k: usize,
        fetch_k: usize,
        lambda: f32,
    ) -> Vec<&IndexedChunk> {
        let candidates = self.nearest(query, fetch_k.max(k));
        let target = k.min(candidates.len());
        if target == 0 {
            return Vec::new();
        }

        // candidates[0] is the most similar
        let mut picked: Vec<usize> = vec![0];
        while picked.len() < target {
            let mut best: Option<(usize, f32)> = None;
            for (pos, (idx, relevance)) in candidates.iter().enumerate() {
                if picked.contains(&pos) {
                    continue;
                }
                let redundancy = picked
                    .iter()
                    .map(|&p| {
                        cosine_similarity(
                            &self.chunks[*idx].embedding,
                            &self.chunks[candidates[p].0].embedding,
                        )
                    })
                    .fold(f32::NEG_INFINITY, f32::max);
                let score = lambda * relevance - (1.0 - lambda) * redundancy;
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((pos, score));
                }
            }
            match best {
                Some((pos, _)) => picked.push(pos),
                None => break,
            }
        }

        picked
            .into_iter()
            .map(|pos| &self.chunks[candidates[pos].0])
            .collect()
    }
}
