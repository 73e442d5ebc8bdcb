//! Chainsight Common Library
//!
//! Shared code for the Chainsight retrieval system including:
//! - Error types and handling
//! - Configuration management
//! - Chat completion client abstraction (OpenAI, Anthropic)
//! - Embedding client abstraction
//! - Vector index client abstraction

pub mod config;
pub mod embeddings;
pub mod errors;
pub mod index;
pub mod llm;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use index::VectorIndex;
pub use llm::ChatClient;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
