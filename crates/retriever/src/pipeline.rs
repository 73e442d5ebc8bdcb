//! Retrieval pipeline - the refinement state machine
//!
//! Drives expand-and-search passes until the search reports
//! sufficiency or the iteration cap is reached, then synthesizes an
//! answer from whatever was gathered. Cap-hit still produces a
//! best-effort answer, including from zero chunks.

use crate::expand::QueryExpander;
use crate::refine::{PassthroughRefiner, QueryRefiner};
use crate::search::MultiQuerySearcher;
use crate::state::IterationState;
use crate::synthesize::AnswerSynthesizer;
use chainsight_common::errors::Result;
use tracing::{debug, info, instrument};

pub struct RetrievalPipeline {
    expander: QueryExpander,
    searcher: MultiQuerySearcher,
    synthesizer: AnswerSynthesizer,
    refiner: Box<dyn QueryRefiner>,
    max_iterations: u32,
}

impl RetrievalPipeline {
    pub fn new(
        expander: QueryExpander,
        searcher: MultiQuerySearcher,
        synthesizer: AnswerSynthesizer,
        max_iterations: u32,
    ) -> Self {
        Self {
            expander,
            searcher,
            synthesizer,
            refiner: Box::new(PassthroughRefiner),
            max_iterations,
        }
    }

    /// Swap in a query rewrite strategy for refinement passes
    pub fn with_refiner(mut self, refiner: Box<dyn QueryRefiner>) -> Self {
        self.refiner = refiner;
        self
    }

    /// Run the full workflow and return the final state with the
    /// answer attached
    #[instrument(skip(self), fields(query = %query))]
    pub async fn run(&self, query: &str) -> Result<IterationState> {
        let mut state = IterationState::new(query);

        loop {
            state = if state.iteration_count == 0 {
                let query_type = self.expander.classify(&state.query).await;
                let variants = self.expander.expand(&state.query).await;
                info!(?query_type, variants = variants.len(), "Query expanded");
                state.with_expansion(query_type, variants)
            } else {
                let refined = self.refiner.refine(&state);
                debug!(refined = %refined, "Re-entering search with refined query");
                state.with_refined_query(refined)
            };

            state = self.searcher.search(state).await?;

            if state.needs_refinement && state.iteration_count < self.max_iterations {
                info!(
                    iteration = state.iteration_count,
                    chunks = state.chunks.len(),
                    "Insufficient context, refining"
                );
                continue;
            }
            break;
        }

        info!(
            iterations = state.iteration_count,
            chunks = state.chunks.len(),
            "Retrieval complete, synthesizing"
        );
        self.synthesizer.synthesize(state).await
    }

    /// Retrieval entry point: one query string in, one answer out
    pub async fn answer(&self, query: &str) -> Result<String> {
        let state = self.run(query).await?;
        Ok(state
            .answer
            .unwrap_or_else(|| crate::synthesize::NO_ANSWER_MESSAGE.to_string()))
    }
}
