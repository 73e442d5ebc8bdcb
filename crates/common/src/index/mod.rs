//! Vector index client abstraction
//!
//! Consumed only through the insert/query boundary: upserts are
//! batched at 100 records per call, queries return ranked matches
//! with metadata. The handle is constructed explicitly by the
//! composing application and injected where needed; it is safe for
//! concurrent read-only queries from multiple in-flight tasks.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;

/// Pinecone recommends upserting at most 100 vectors per call
const UPSERT_BATCH_SIZE: usize = 100;

/// One record to insert or overwrite
#[derive(Debug, Clone, Serialize)]
pub struct IndexRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: serde_json::Value,
}

/// One ranked match from a nearest-neighbor query
#[derive(Debug, Clone, Deserialize)]
pub struct IndexMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Index occupancy statistics
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexStats {
    #[serde(rename = "totalVectorCount", default)]
    pub total_vector_count: u64,
    #[serde(default)]
    pub dimension: usize,
}

/// Trait for vector index backends
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite records; returns the upserted count
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize>;

    /// Nearest-neighbor query returning the top_k ranked matches
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<IndexMatch>>;

    /// Index occupancy statistics
    async fn describe_stats(&self) -> Result<IndexStats>;
}

/// Pinecone REST client
pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    host: String,
    namespace: String,
}

#[derive(Serialize)]
struct PineconeQueryRequest<'a> {
    vector: &'a [f32],
    #[serde(rename = "topK")]
    top_k: usize,
    #[serde(rename = "includeMetadata")]
    include_metadata: bool,
    #[serde(skip_serializing_if = "str::is_empty")]
    namespace: &'a str,
}

#[derive(Deserialize)]
struct PineconeQueryResponse {
    #[serde(default)]
    matches: Vec<IndexMatch>,
}

#[derive(Serialize)]
struct PineconeUpsertRequest<'a> {
    vectors: &'a [IndexRecord],
    #[serde(skip_serializing_if = "str::is_empty")]
    namespace: &'a str,
}

#[derive(Deserialize)]
struct PineconeUpsertResponse {
    #[serde(rename = "upsertedCount", default)]
    upserted_count: usize,
}

impl PineconeIndex {
    /// Build a handle from configuration. Missing credentials are a
    /// hard configuration error, not a deferred runtime failure.
    pub fn from_config(config: &crate::config::IndexConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AppError::MissingSetting {
                name: "index.api_key".to_string(),
            })?;
        let host = config
            .host
            .clone()
            .ok_or_else(|| AppError::MissingSetting {
                name: "index.host".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            host: host.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
        })
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let url = format!("{}{}", self.host, path);

        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Index {
                message: format!("Request to {} failed: {}", path, e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Index {
                message: format!("API error {} on {}: {}", status, path, text),
            });
        }

        response.json().await.map_err(|e| AppError::Index {
            message: format!("Failed to parse {} response: {}", path, e),
        })
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize> {
        let mut total = 0;

        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let request = PineconeUpsertRequest {
                vectors: batch,
                namespace: &self.namespace,
            };
            let response: PineconeUpsertResponse =
                self.post("/vectors/upsert", &request).await?;
            total += response.upserted_count;
            tracing::debug!(batch = batch.len(), total = total, "Upserted batch");
        }

        Ok(total)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<IndexMatch>> {
        let request = PineconeQueryRequest {
            vector,
            top_k,
            include_metadata,
            namespace: &self.namespace,
        };
        let response: PineconeQueryResponse = self.post("/query", &request).await?;
        Ok(response.matches)
    }

    async fn describe_stats(&self) -> Result<IndexStats> {
        self.post("/describe_index_stats", &serde_json::json!({}))
            .await
    }
}

/// In-memory cosine-similarity index for tests
pub struct InMemoryIndex {
    records: RwLock<Vec<IndexRecord>>,
    dimension: usize,
}

impl InMemoryIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            dimension,
        }
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize> {
        let count = records.len();
        let mut store = self.records.write().await;
        for record in records {
            if record.values.len() != self.dimension {
                return Err(AppError::Index {
                    message: format!(
                        "Dimension mismatch: expected {}, got {}",
                        self.dimension,
                        record.values.len()
                    ),
                });
            }
            store.retain(|r| r.id != record.id);
            store.push(record);
        }
        Ok(count)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<IndexMatch>> {
        let store = self.records.read().await;
        let mut matches: Vec<IndexMatch> = store
            .iter()
            .map(|r| IndexMatch {
                id: r.id.clone(),
                score: Self::cosine(vector, &r.values),
                metadata: if include_metadata {
                    r.metadata.clone()
                } else {
                    serde_json::Value::Null
                },
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn describe_stats(&self) -> Result<IndexStats> {
        let store = self.records.read().await;
        Ok(IndexStats {
            total_vector_count: store.len() as u64,
            dimension: self.dimension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, values: Vec<f32>) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            values,
            metadata: json!({"source": "test"}),
        }
    }

    #[tokio::test]
    async fn test_query_orders_by_cosine_and_respects_top_k() {
        let index = InMemoryIndex::new(2);
        index
            .upsert(vec![
                record("aligned", vec![1.0, 0.0]),
                record("diagonal", vec![1.0, 1.0]),
                record("orthogonal", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let matches = index.query(&[1.0, 0.0], 2, true).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "aligned");
        assert_eq!(matches[1].id, "diagonal");
        assert!(matches[0].score > matches[1].score);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let index = InMemoryIndex::new(2);
        index.upsert(vec![record("a", vec![1.0, 0.0])]).await.unwrap();
        index.upsert(vec![record("a", vec![0.0, 1.0])]).await.unwrap();

        let stats = index.describe_stats().await.unwrap();
        assert_eq!(stats.total_vector_count, 1);

        let matches = index.query(&[0.0, 1.0], 1, false).await.unwrap();
        assert!(matches[0].score > 0.99);
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension() {
        let index = InMemoryIndex::new(3);
        let err = index
            .upsert(vec![record("bad", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Index { .. }));
    }
}
