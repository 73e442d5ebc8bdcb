//! Answer synthesis from retrieved chunks
//!
//! Formats the capped, score-sorted chunk list into a structured
//! context and asks the generation backend to extract and connect
//! causal chains. An empty chunk list short-circuits to a fixed
//! message without any generation call.

use crate::dispatch::Dispatcher;
use crate::prompts::CAUSAL_CHAIN_PROMPT;
use crate::state::{IterationState, RetrievedChunk};
use chainsight_common::errors::Result;
use chainsight_common::llm::{ChatMessage, GenerationParams};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

/// Context placeholder when search found nothing
pub const NO_CONTEXT_MESSAGE: &str = "No relevant context found.";

/// Answer when there was nothing to reason over
pub const NO_CONTEXT_ANSWER: &str =
    "I couldn't find relevant causal chains to answer this question.";

/// Answer when generation itself failed terminally
pub const NO_ANSWER_MESSAGE: &str = "No answer generated.";

pub struct AnswerSynthesizer {
    dispatcher: Arc<Dispatcher>,
    max_answer_chunks: usize,
}

impl AnswerSynthesizer {
    pub fn new(dispatcher: Arc<Dispatcher>, max_answer_chunks: usize) -> Self {
        Self {
            dispatcher,
            max_answer_chunks,
        }
    }

    /// Produce the final answer and attach it to the state
    pub async fn synthesize(&self, state: IterationState) -> Result<IterationState> {
        let capped = &state.chunks[..state.chunks.len().min(self.max_answer_chunks)];

        if capped.is_empty() {
            info!("No chunks retrieved, skipping generation");
            return Ok(state.with_answer(
                NO_CONTEXT_MESSAGE.to_string(),
                NO_CONTEXT_ANSWER.to_string(),
            ));
        }

        info!(chunks = capped.len(), "Extracting causal chains");
        let context = format_context(capped);

        let prompt = CAUSAL_CHAIN_PROMPT
            .replace("{query}", &state.query)
            .replace("{context}", &context);
        let params = GenerationParams {
            temperature: 0.3,
            max_tokens: 2000,
        };

        let answer = match self
            .dispatcher
            .dispatch_one(vec![ChatMessage::user(prompt)], params)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                // Retries and fallback are already spent; degrade to
                // a distinguishable non-answer instead of crashing
                error!(error = %e, "Answer generation failed");
                NO_ANSWER_MESSAGE.to_string()
            }
        };

        Ok(state.with_answer(context, answer))
    }
}

/// Non-empty string field of a JSON object
fn field<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// The ingestion side stores `extracted_data` either as a JSON
/// object or as a JSON-encoded string (the index flattens nested
/// metadata). Unparseable payloads come back empty.
fn extracted_data(metadata: &Value) -> Value {
    match metadata.get("extracted_data") {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        Some(Value::String(raw)) => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::Object(Default::default()))
        }
        _ => Value::Object(Default::default()),
    }
}

/// Format chunks as source-attributed blocks, score-descending,
/// separated by `---`
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    let mut parts = Vec::with_capacity(chunks.len());

    for (i, chunk) in chunks.iter().enumerate() {
        let extracted = extracted_data(&chunk.metadata);

        let source = field(&extracted, "source")
            .or_else(|| field(&chunk.metadata, "tg_channel"))
            .unwrap_or("unknown");

        let mut part = format!("[Source {}: {}] (score: {:.2})\n", i + 1, source, chunk.score);
        if let Some(what_happened) = field(&extracted, "what_happened") {
            part.push_str(&format!("What happened: {}\n", what_happened));
        }
        if let Some(interpretation) = field(&extracted, "interpretation") {
            part.push_str(&format!("Interpretation: {}\n", interpretation));
        }
        if let Some(used_data) = field(&extracted, "used_data") {
            part.push_str(&format!("Data: {}\n", used_data));
        }

        if let Some(chains) = extracted.get("logic_chains").and_then(Value::as_array) {
            if !chains.is_empty() {
                part.push_str("Causal chains:\n");
                for chain in chains {
                    let cause = field(chain, "cause").unwrap_or("");
                    let effect = field(chain, "effect").unwrap_or("");
                    let mechanism = field(chain, "mechanism").unwrap_or("");
                    let direction = field(chain, "direction").unwrap_or("");
                    part.push_str(&format!(
                        "  - {} -> {} ({}): {}\n",
                        cause, effect, direction, mechanism
                    ));
                }
            }
        }

        parts.push(part);
    }

    parts.join("\n---\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatcherConfig;
    use chainsight_common::llm::MockChatClient;
    use serde_json::json;

    fn chunk(id: &str, score: f32, metadata: Value) -> RetrievedChunk {
        RetrievedChunk {
            id: id.to_string(),
            score,
            metadata,
            variant_index: 0,
        }
    }

    fn synthesizer_with(
        primary: Arc<MockChatClient>,
        max_answer_chunks: usize,
    ) -> AnswerSynthesizer {
        let fallback = Arc::new(MockChatClient::failing("fallback", "down"));
        let dispatcher = Arc::new(Dispatcher::new(
            primary,
            fallback,
            DispatcherConfig {
                max_retries: 0,
                ..DispatcherConfig::default()
            },
        ));
        AnswerSynthesizer::new(dispatcher, max_answer_chunks)
    }

    #[test]
    fn test_format_context_renders_causal_steps() {
        let metadata = json!({
            "extracted_data": {
                "source": "Goldman Sachs",
                "what_happened": "Fed cut rates by 50bp",
                "interpretation": "Easing cycle has begun",
                "used_data": "Fed funds futures",
                "logic_chains": [{
                    "cause": "rate cuts",
                    "effect": "real rates down",
                    "mechanism": "lower nominal yields",
                    "direction": "positive"
                }]
            }
        });
        let context = format_context(&[chunk("c1", 0.87, metadata)]);

        assert!(context.contains("[Source 1: Goldman Sachs] (score: 0.87)"));
        assert!(context.contains("What happened: Fed cut rates by 50bp"));
        assert!(context.contains("Interpretation: Easing cycle has begun"));
        assert!(context.contains("Data: Fed funds futures"));
        assert!(context.contains("rate cuts -> real rates down (positive): lower nominal yields"));
    }

    #[test]
    fn test_format_context_parses_string_encoded_extracted_data() {
        let metadata = json!({
            "extracted_data": "{\"source\": \"UBS\", \"what_happened\": \"spreads widened\"}"
        });
        let context = format_context(&[chunk("c1", 0.5, metadata)]);
        assert!(context.contains("[Source 1: UBS]"));
        assert!(context.contains("What happened: spreads widened"));
    }

    #[test]
    fn test_format_context_falls_back_to_channel_then_unknown() {
        let with_channel = json!({"tg_channel": "macro_daily"});
        let context = format_context(&[chunk("c1", 0.5, with_channel)]);
        assert!(context.contains("[Source 1: macro_daily]"));

        let bare = json!({});
        let context = format_context(&[chunk("c1", 0.5, bare)]);
        assert!(context.contains("[Source 1: unknown]"));
    }

    #[test]
    fn test_format_context_separates_blocks() {
        let chunks = vec![
            chunk("a", 0.9, json!({"extracted_data": {"source": "A"}})),
            chunk("b", 0.8, json!({"extracted_data": {"source": "B"}})),
        ];
        let context = format_context(&chunks);
        assert_eq!(context.matches("\n---\n").count(), 1);
        assert!(context.contains("[Source 1: A]"));
        assert!(context.contains("[Source 2: B]"));
    }

    #[tokio::test]
    async fn test_empty_chunks_skip_generation_entirely() {
        let primary = Arc::new(MockChatClient::fixed("primary", "should not be called"));
        let synthesizer = synthesizer_with(primary.clone(), 15);

        let state = synthesizer
            .synthesize(IterationState::new("q"))
            .await
            .unwrap();

        assert_eq!(state.answer.as_deref(), Some(NO_CONTEXT_ANSWER));
        assert_eq!(state.synthesized_context.as_deref(), Some(NO_CONTEXT_MESSAGE));
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_chunk_list_is_capped() {
        let primary = Arc::new(MockChatClient::fixed("primary", "CHAIN: a -> b"));
        let synthesizer = synthesizer_with(primary, 2);

        let chunks: Vec<RetrievedChunk> = (0..5)
            .map(|i| {
                chunk(
                    &format!("c{}", i),
                    0.9 - i as f32 * 0.1,
                    json!({"extracted_data": {"source": format!("s{}", i)}}),
                )
            })
            .collect();
        let state = IterationState::new("q").with_search_results(chunks, false);

        let state = synthesizer.synthesize(state).await.unwrap();
        let context = state.synthesized_context.unwrap();

        assert!(context.contains("[Source 1: s0]"));
        assert!(context.contains("[Source 2: s1]"));
        assert!(!context.contains("s2"));
    }

    #[tokio::test]
    async fn test_generation_failure_degrades_to_no_answer() {
        let primary = Arc::new(MockChatClient::failing("primary", "overloaded"));
        let synthesizer = synthesizer_with(primary, 15);

        let state = IterationState::new("q").with_search_results(
            vec![chunk("c1", 0.9, json!({"extracted_data": {"source": "A"}}))],
            false,
        );

        let state = synthesizer.synthesize(state).await.unwrap();
        assert_eq!(state.answer.as_deref(), Some(NO_ANSWER_MESSAGE));
    }
}
