//! Chainsight Retrieval Core
//!
//! Answers natural-language research questions by expanding the
//! query into semantic variants, fanning them out against a vector
//! index, iterating while context is insufficient, and synthesizing
//! a causal-chain answer from the merged results.
//!
//! Module layout follows the workflow:
//! - [`dispatch`] - bounded-concurrency executor for remote calls
//! - [`expand`] - query classification and variant generation
//! - [`search`] - batched embedding + multi-query index search
//! - [`refine`] - query rewrite seam between iterations
//! - [`synthesize`] - context formatting and answer generation
//! - [`pipeline`] - the refinement state machine tying it together

pub mod dispatch;
pub mod expand;
pub mod pipeline;
pub mod prompts;
pub mod refine;
pub mod search;
pub mod state;
pub mod synthesize;

pub use dispatch::{Dispatcher, DispatcherConfig, Task, TaskOutcome, TaskResult};
pub use expand::QueryExpander;
pub use pipeline::RetrievalPipeline;
pub use search::{MultiQuerySearcher, SearcherConfig};
pub use state::{IterationState, QueryType, QueryVariant, RetrievedChunk};
pub use synthesize::AnswerSynthesizer;
