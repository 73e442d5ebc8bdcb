//! Chainsight retrieval entry point
//!
//! Accepts one natural-language query and prints the synthesized
//! causal-chain answer.

use chainsight_common::embeddings::OpenAiEmbedder;
use chainsight_common::errors::AppError;
use chainsight_common::index::{PineconeIndex, VectorIndex};
use chainsight_common::llm::build_chat_client;
use chainsight_common::{AppConfig, VERSION};
use chainsight_retriever::dispatch::{Dispatcher, DispatcherConfig};
use chainsight_retriever::expand::QueryExpander;
use chainsight_retriever::pipeline::RetrievalPipeline;
use chainsight_retriever::search::{MultiQuerySearcher, SearcherConfig};
use chainsight_retriever::synthesize::AnswerSynthesizer;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    init_tracing(&config);
    info!("Chainsight v{}", VERSION);

    let query: String = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        eprintln!("Usage: chainsight <query>");
        std::process::exit(2);
    }

    let index: Arc<dyn VectorIndex> = Arc::new(PineconeIndex::from_config(&config.index)?);
    let stats = index.describe_stats().await?;
    info!(
        vectors = stats.total_vector_count,
        dimension = stats.dimension,
        "Connected to vector index"
    );

    let pipeline = build_pipeline(&config, index)?;

    let state = pipeline.run(&query).await?;
    println!(
        "{}",
        state.answer.as_deref().unwrap_or("No answer generated.")
    );

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.observability.log_level.clone()));

    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

fn build_pipeline(
    config: &AppConfig,
    index: Arc<dyn VectorIndex>,
) -> anyhow::Result<RetrievalPipeline> {
    let openai_key =
        config
            .llm
            .openai_api_key
            .clone()
            .ok_or_else(|| AppError::MissingSetting {
                name: "llm.openai_api_key".to_string(),
            })?;

    let embedder = Arc::new(OpenAiEmbedder::new(
        openai_key,
        &config.embedding,
        config.llm.openai_api_base.clone(),
    )?);

    let dispatcher_config = DispatcherConfig::from_llm_config(&config.llm);

    // Classification and expansion ride the low-latency model; the
    // answer call rides the primary. Both paths share the same
    // fallback executor.
    let fallback = build_chat_client(config.llm.fallback_model, &config.llm)?;
    let fast_dispatcher = Arc::new(Dispatcher::new(
        build_chat_client(config.llm.fast_model, &config.llm)?,
        Arc::clone(&fallback),
        dispatcher_config.clone(),
    ));
    let answer_dispatcher = Arc::new(Dispatcher::new(
        build_chat_client(config.llm.primary_model, &config.llm)?,
        fallback,
        dispatcher_config,
    ));

    let expander = QueryExpander::new(fast_dispatcher);
    let searcher = MultiQuerySearcher::new(
        embedder,
        index,
        SearcherConfig::from_retrieval_config(&config.retrieval),
    );
    let synthesizer =
        AnswerSynthesizer::new(answer_dispatcher, config.retrieval.max_answer_chunks);

    Ok(RetrievalPipeline::new(
        expander,
        searcher,
        synthesizer,
        config.retrieval.max_iterations,
    ))
}
