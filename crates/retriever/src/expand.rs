//! Query classification and expansion
//!
//! Classification is one low-latency call with temperature pinned to
//! 0.0; ambiguous output defaults to a research question. Expansion
//! asks for 4-6 DIMENSION/REASONING/QUERY triples and parses them
//! leniently: markers match case-insensitively through markdown
//! emphasis, incomplete triples are dropped, and zero parsed
//! variants is a valid degraded outcome.

use crate::dispatch::Dispatcher;
use crate::prompts::{QUERY_EXPANSION_PROMPT, QUERY_TYPE_PROMPT};
use crate::state::{QueryType, QueryVariant};
use chainsight_common::llm::{ChatMessage, GenerationParams};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct QueryExpander {
    dispatcher: Arc<Dispatcher>,
}

impl QueryExpander {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Classify the query. Any failure or ambiguous output degrades
    /// to ResearchQuestion.
    pub async fn classify(&self, query: &str) -> QueryType {
        let prompt = QUERY_TYPE_PROMPT.replace("{query}", query);
        let params = GenerationParams {
            temperature: 0.0,
            max_tokens: 50,
        };

        match self
            .dispatcher
            .dispatch_one(vec![ChatMessage::user(prompt)], params)
            .await
        {
            Ok(response) => {
                debug!(response = %response.trim(), "Classification response");
                if response.to_lowercase().contains("data_lookup") {
                    QueryType::DataLookup
                } else {
                    QueryType::ResearchQuestion
                }
            }
            Err(e) => {
                warn!(error = %e, "Classification failed, defaulting to research question");
                QueryType::ResearchQuestion
            }
        }
    }

    /// Generate query variants. A failed call or unparseable output
    /// yields an empty list; search then proceeds with the original
    /// query alone.
    pub async fn expand(&self, query: &str) -> Vec<QueryVariant> {
        let prompt = QUERY_EXPANSION_PROMPT.replace("{query}", query);
        let params = GenerationParams {
            temperature: 0.3,
            max_tokens: 1500,
        };

        match self
            .dispatcher
            .dispatch_one(vec![ChatMessage::user(prompt)], params)
            .await
        {
            Ok(response) => {
                let variants = parse_variants(&response);
                debug!(count = variants.len(), "Parsed query variants");
                for variant in &variants {
                    debug!(
                        dimension = %variant.dimension,
                        query = %variant.query,
                        "Variant"
                    );
                }
                variants
            }
            Err(e) => {
                warn!(error = %e, "Expansion failed, searching with original query only");
                Vec::new()
            }
        }
    }
}

/// Strip surrounding markdown emphasis and quoting from a field value
fn clean_field(value: &str) -> String {
    value
        .trim_matches(|c: char| c == '*' || c == '`' || c == '_' || c.is_whitespace())
        .to_string()
}

/// Extract the value after the first colon of a marker line
fn value_after_colon(line: &str) -> String {
    match line.split_once(':') {
        Some((_, rest)) => clean_field(rest),
        None => String::new(),
    }
}

/// Lenient line scanner for DIMENSION/REASONING/QUERY triples.
///
/// A variant is emitted only once all three fields of an item have
/// been seen; anything malformed or incomplete is dropped silently.
pub fn parse_variants(response: &str) -> Vec<QueryVariant> {
    let mut variants = Vec::new();
    let mut dimension: Option<String> = None;
    let mut rationale: Option<String> = None;

    for line in response.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let upper = line.to_uppercase();

        if upper.contains("DIMENSION:") {
            dimension = Some(value_after_colon(line));
        } else if upper.contains("REASONING:") {
            rationale = Some(value_after_colon(line));
        } else if upper.contains("QUERY:") {
            let query = value_after_colon(line);
            if !query.is_empty() {
                if let (Some(dimension), Some(rationale)) = (dimension.take(), rationale.take())
                {
                    variants.push(QueryVariant {
                        dimension,
                        rationale,
                        query,
                    });
                }
            }
            dimension = None;
            rationale = None;
        }
    }

    variants
}
