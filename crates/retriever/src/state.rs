//! Iteration state threaded through the retrieval workflow
//!
//! One fully-typed record per stage boundary. Stages never mutate a
//! shared state in place; each consumes the previous value and
//! returns a new one through the constructors below.

use serde::{Deserialize, Serialize};

/// Coarse query classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Conceptual or causal question
    ResearchQuestion,
    /// Request for a specific metric, threshold, or data point
    DataLookup,
}

/// One alternative phrasing of the query, tagged with the semantic
/// angle it explores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryVariant {
    pub dimension: String,
    pub rationale: String,
    pub query: String,
}

/// One retrieved knowledge fragment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Unique id within the iteration state
    pub id: String,

    /// Similarity score, higher is more relevant
    pub score: f32,

    /// Opaque metadata bag from the index (source attribution,
    /// extracted fields, causal steps)
    pub metadata: serde_json::Value,

    /// Index into the query list of the variant that surfaced the
    /// winning score (0 = the processed query itself)
    pub variant_index: usize,
}

/// State carried across the retrieval loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationState {
    /// User's original query
    pub query: String,

    /// Query actually used for search on the current pass
    pub processed_query: String,

    /// Coarse classification, set on the first pass
    pub query_type: QueryType,

    /// Expansion variants, set on the first pass
    pub variants: Vec<QueryVariant>,

    /// Deduplicated, score-sorted retrieved chunks
    pub chunks: Vec<RetrievedChunk>,

    /// Completed search passes; increments by exactly 1 per pass
    pub iteration_count: u32,

    /// Whether the last search pass asked for another iteration
    pub needs_refinement: bool,

    /// Formatted context handed to answer generation
    pub synthesized_context: Option<String>,

    /// Final answer, set only at the end
    pub answer: Option<String>,
}

impl IterationState {
    pub fn new(query: impl Into<String>) -> Self {
        let query = query.into();
        Self {
            processed_query: query.clone(),
            query,
            query_type: QueryType::ResearchQuestion,
            variants: Vec::new(),
            chunks: Vec::new(),
            iteration_count: 0,
            needs_refinement: false,
            synthesized_context: None,
            answer: None,
        }
    }

    /// First-pass expansion output
    pub fn with_expansion(
        self,
        query_type: QueryType,
        variants: Vec<QueryVariant>,
    ) -> Self {
        Self {
            processed_query: self.query.clone(),
            query_type,
            variants,
            ..self
        }
    }

    /// Re-entry after refinement. Variants from the first expansion
    /// are kept; only the search query is replaced.
    pub fn with_refined_query(self, processed_query: String) -> Self {
        Self {
            processed_query,
            ..self
        }
    }

    /// Search output; this is the only place the iteration count
    /// advances
    pub fn with_search_results(
        self,
        chunks: Vec<RetrievedChunk>,
        needs_refinement: bool,
    ) -> Self {
        Self {
            chunks,
            needs_refinement,
            iteration_count: self.iteration_count + 1,
            ..self
        }
    }

    /// Terminal synthesis output
    pub fn with_answer(self, synthesized_context: String, answer: String) -> Self {
        Self {
            synthesized_context: Some(synthesized_context),
            answer: Some(answer),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_starts_at_iteration_zero() {
        let state = IterationState::new("what drives liquidity?");
        assert_eq!(state.iteration_count, 0);
        assert!(!state.needs_refinement);
        assert_eq!(state.processed_query, state.query);
        assert!(state.answer.is_none());
    }

    #[test]
    fn test_search_results_increment_iteration_exactly_once() {
        let state = IterationState::new("q")
            .with_search_results(vec![], true)
            .with_search_results(vec![], false);
        assert_eq!(state.iteration_count, 2);
    }

    #[test]
    fn test_refined_query_keeps_variants() {
        let state = IterationState::new("q").with_expansion(
            QueryType::DataLookup,
            vec![QueryVariant {
                dimension: "timing".into(),
                rationale: "leads the move".into(),
                query: "what precedes rate cuts".into(),
            }],
        );
        let state = state.with_refined_query("rewritten".into());
        assert_eq!(state.processed_query, "rewritten");
        assert_eq!(state.variants.len(), 1);
        assert_eq!(state.query_type, QueryType::DataLookup);
    }
}
