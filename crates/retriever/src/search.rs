//! Multi-query vector search
//!
//! Embeds the processed query plus all variants in one batched call,
//! fans the embeddings out as concurrent nearest-neighbor queries,
//! then merges the matches into a single deduplicated, score-sorted
//! list. The merge is commutative and idempotent (max-score-wins per
//! chunk id), so the final order does not depend on which search
//! completes first.

use crate::state::{IterationState, RetrievedChunk};
use chainsight_common::errors::{AppError, Result};
use chainsight_common::index::VectorIndex;
use chainsight_common::Embedder;
use futures::future::join_all;
use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SearcherConfig {
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub min_sufficient_chunks: usize,
}

impl SearcherConfig {
    pub fn from_retrieval_config(config: &chainsight_common::config::RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            similarity_threshold: config.similarity_threshold,
            min_sufficient_chunks: config.min_sufficient_chunks,
        }
    }
}

pub struct MultiQuerySearcher {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    config: SearcherConfig,
}

impl MultiQuerySearcher {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: SearcherConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    /// Run one search pass and fold the results into the state.
    /// Advances the iteration count by exactly 1.
    pub async fn search(&self, state: IterationState) -> Result<IterationState> {
        // Query list: processed query first, then variants
        let mut queries = vec![if state.processed_query.is_empty() {
            state.query.clone()
        } else {
            state.processed_query.clone()
        }];
        queries.extend(state.variants.iter().map(|v| v.query.clone()));

        info!(
            queries = queries.len(),
            iteration = state.iteration_count,
            "Multi-query search"
        );

        let embeddings = self.embedder.embed_batch(&queries).await?;

        let searches = embeddings.iter().enumerate().map(|(variant_index, vector)| {
            let index = Arc::clone(&self.index);
            let top_k = self.config.top_k;
            async move { (variant_index, index.query(vector, top_k, true).await) }
        });
        let outcomes = join_all(searches).await;

        let mut merged: HashMap<String, RetrievedChunk> = HashMap::new();
        let mut failed_queries = 0;

        for (variant_index, outcome) in outcomes {
            let matches = match outcome {
                Ok(matches) => matches,
                Err(e) => {
                    // One variant failing degrades recall, not the pass
                    warn!(
                        variant = variant_index,
                        error = %e,
                        "Index query failed, skipping this variant"
                    );
                    failed_queries += 1;
                    continue;
                }
            };

            for m in matches {
                if m.score < self.config.similarity_threshold {
                    continue;
                }
                match merged.get_mut(&m.id) {
                    Some(existing) if existing.score >= m.score => {}
                    Some(existing) => {
                        existing.score = m.score;
                        existing.metadata = m.metadata;
                        existing.variant_index = variant_index;
                    }
                    None => {
                        merged.insert(
                            m.id.clone(),
                            RetrievedChunk {
                                id: m.id,
                                score: m.score,
                                metadata: m.metadata,
                                variant_index,
                            },
                        );
                    }
                }
            }
        }

        if failed_queries == queries.len() {
            return Err(AppError::Index {
                message: format!("all {} index queries failed", failed_queries),
            });
        }

        let mut chunks: Vec<RetrievedChunk> = merged.into_values().collect();
        chunks.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let needs_refinement = chunks.len() < self.config.min_sufficient_chunks;
        counter!("search_chunks_retrieved_total").increment(chunks.len() as u64);
        info!(
            chunks = chunks.len(),
            failed_queries,
            needs_refinement,
            "Search pass complete"
        );

        Ok(state.with_search_results(chunks, needs_refinement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chainsight_common::index::{IndexMatch, IndexRecord, IndexStats};
    use serde_json::json;
    use std::sync::Mutex;

    /// Maps the i-th text of a batch to the one-hot vector e_i, so
    /// the scripted index can tell queries apart.
    struct PositionalEmbedder {
        dimension: usize,
    }

    #[async_trait]
    impl Embedder for PositionalEmbedder {
        async fn embed(&self, _text: &str) -> chainsight_common::Result<Vec<f32>> {
            let mut v = vec![0.0; self.dimension];
            v[0] = 1.0;
            Ok(v)
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> chainsight_common::Result<Vec<Vec<f32>>> {
            Ok((0..texts.len())
                .map(|i| {
                    let mut v = vec![0.0; self.dimension];
                    v[i] = 1.0;
                    v
                })
                .collect())
        }

        fn model_name(&self) -> &str {
            "positional"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }

    /// Returns a scripted response per query position (argmax of the
    /// incoming vector); positions scripted with Err fail the query.
    struct ScriptedIndex {
        responses: Mutex<HashMap<usize, std::result::Result<Vec<IndexMatch>, String>>>,
    }

    impl ScriptedIndex {
        fn new(
            responses: Vec<(usize, std::result::Result<Vec<IndexMatch>, String>)>,
        ) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
            }
        }
    }

    fn m(id: &str, score: f32) -> IndexMatch {
        IndexMatch {
            id: id.to_string(),
            score,
            metadata: json!({"source": "test"}),
        }
    }

    #[async_trait]
    impl VectorIndex for ScriptedIndex {
        async fn upsert(&self, records: Vec<IndexRecord>) -> chainsight_common::Result<usize> {
            Ok(records.len())
        }

        async fn query(
            &self,
            vector: &[f32],
            _top_k: usize,
            _include_metadata: bool,
        ) -> chainsight_common::Result<Vec<IndexMatch>> {
            let position = vector
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                .map(|(i, _)| i)
                .unwrap_or(0);
            let responses = self.responses.lock().unwrap();
            match responses.get(&position) {
                Some(Ok(matches)) => Ok(matches.clone()),
                Some(Err(message)) => Err(AppError::Index {
                    message: message.clone(),
                }),
                None => Ok(vec![]),
            }
        }

        async fn describe_stats(&self) -> chainsight_common::Result<IndexStats> {
            Ok(IndexStats::default())
        }
    }

    fn searcher(index: ScriptedIndex) -> MultiQuerySearcher {
        MultiQuerySearcher::new(
            Arc::new(PositionalEmbedder { dimension: 8 }),
            Arc::new(index),
            SearcherConfig {
                top_k: 10,
                similarity_threshold: 0.45,
                min_sufficient_chunks: 3,
            },
        )
    }

    fn state_with_variants(names: &[&str]) -> IterationState {
        use crate::state::{QueryType, QueryVariant};
        IterationState::new("original question").with_expansion(
            QueryType::ResearchQuestion,
            names
                .iter()
                .map(|n| QueryVariant {
                    dimension: n.to_string(),
                    rationale: String::new(),
                    query: format!("variant {}", n),
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_duplicate_id_keeps_highest_score_and_winning_variant() {
        let index = ScriptedIndex::new(vec![
            (0, Ok(vec![m("chunk-x", 0.6)])),
            (1, Ok(vec![m("chunk-x", 0.8)])),
        ]);
        let searcher = searcher(index);

        let state = searcher
            .search(state_with_variants(&["one"]))
            .await
            .unwrap();

        assert_eq!(state.chunks.len(), 1);
        assert_eq!(state.chunks[0].id, "chunk-x");
        assert!((state.chunks[0].score - 0.8).abs() < f32::EPSILON);
        assert_eq!(state.chunks[0].variant_index, 1);
    }

    #[tokio::test]
    async fn test_expansion_only_chunk_survives_once_at_its_score() {
        // 1 original + 3 expansions; chunk X appears only via the
        // third expansion at 0.50
        let index = ScriptedIndex::new(vec![
            (0, Ok(vec![m("a", 0.7), m("b", 0.6)])),
            (1, Ok(vec![m("a", 0.5)])),
            (2, Ok(vec![])),
            (3, Ok(vec![m("chunk-x", 0.50)])),
        ]);
        let searcher = searcher(index);

        let state = searcher
            .search(state_with_variants(&["one", "two", "three"]))
            .await
            .unwrap();

        let x: Vec<_> = state.chunks.iter().filter(|c| c.id == "chunk-x").collect();
        assert_eq!(x.len(), 1);
        assert!((x[0].score - 0.50).abs() < f32::EPSILON);
        assert_eq!(x[0].variant_index, 3);
    }

    #[tokio::test]
    async fn test_below_threshold_matches_are_discarded() {
        let index = ScriptedIndex::new(vec![(
            0,
            Ok(vec![m("keep", 0.45), m("drop", 0.449), m("drop2", 0.1)]),
        )]);
        let searcher = searcher(index);

        let state = searcher
            .search(IterationState::new("q"))
            .await
            .unwrap();

        assert_eq!(state.chunks.len(), 1);
        assert_eq!(state.chunks[0].id, "keep");
    }

    #[tokio::test]
    async fn test_results_sorted_descending_and_sufficiency_flag() {
        let index = ScriptedIndex::new(vec![(
            0,
            Ok(vec![m("low", 0.5), m("high", 0.9), m("mid", 0.7)]),
        )]);
        let searcher = searcher(index);

        let state = searcher.search(IterationState::new("q")).await.unwrap();

        let scores: Vec<f32> = state.chunks.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![0.9, 0.7, 0.5]);
        // 3 chunks meets the minimum of 3
        assert!(!state.needs_refinement);
        assert_eq!(state.iteration_count, 1);
    }

    #[tokio::test]
    async fn test_empty_results_request_refinement() {
        let index = ScriptedIndex::new(vec![(0, Ok(vec![]))]);
        let searcher = searcher(index);

        let state = searcher.search(IterationState::new("q")).await.unwrap();

        assert!(state.chunks.is_empty());
        assert!(state.needs_refinement);
    }

    #[tokio::test]
    async fn test_single_variant_failure_degrades_not_fails() {
        let index = ScriptedIndex::new(vec![
            (0, Ok(vec![m("a", 0.8)])),
            (1, Err("connection refused".into())),
        ]);
        let searcher = searcher(index);

        let state = searcher
            .search(state_with_variants(&["one"]))
            .await
            .unwrap();

        assert_eq!(state.chunks.len(), 1);
        assert_eq!(state.chunks[0].id, "a");
    }

    #[tokio::test]
    async fn test_all_queries_failing_is_an_error() {
        let index = ScriptedIndex::new(vec![
            (0, Err("down".into())),
            (1, Err("down".into())),
        ]);
        let searcher = searcher(index);

        let err = searcher
            .search(state_with_variants(&["one"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Index { .. }));
    }
}
