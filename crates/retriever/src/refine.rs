//! Query refinement between iterations
//!
//! The minimal contract is "return a query string". The shipped
//! implementation passes the original query through unchanged;
//! smarter rewrites based on prior chunks plug in behind the trait.

use crate::state::IterationState;

/// Rewrites the search query for a refinement pass
pub trait QueryRefiner: Send + Sync {
    fn refine(&self, state: &IterationState) -> String;
}

/// Returns the original query unchanged
pub struct PassthroughRefiner;

impl QueryRefiner for PassthroughRefiner {
    fn refine(&self, state: &IterationState) -> String {
        state.query.clone()
    }
}
