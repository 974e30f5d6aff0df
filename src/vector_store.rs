//! Vector store abstraction.
//!
//! The ingestion pipeline upserts enriched chunks keyed by their
//! deterministic `chunk_id`; retrieval runs nearest-neighbour search over
//! the same collection. Two backends:
//!
//! - [`QdrantStore`]: Qdrant REST API (cosine distance).
//! - [`MemoryVectorStore`]: process-local brute-force cosine search, used
//!   with `vector.backend = "memory"` and in tests.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::VectorConfig;
use crate::embedding::cosine_similarity;
use crate::models::VectorHit;

/// One point to upsert.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    fn kind(&self) -> &str;

    /// Create the collection with `dims`-sized cosine vectors if missing.
    async fn ensure_collection(&self, dims: usize) -> Result<()>;

    /// Insert or overwrite points by id.
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()>;

    /// The `top_k` nearest points to `vector`, best first.
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorHit>>;

    /// Every stored payload, in store order.
    async fn scroll_all(&self) -> Result<Vec<Map<String, Value>>>;

    async fn count(&self) -> Result<u64>;
}

pub fn create_vector_store(config: &VectorConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend.as_str() {
        "qdrant" => Ok(Arc::new(QdrantStore::new(config)?)),
        "memory" => Ok(Arc::new(MemoryVectorStore::default())),
        other => bail!("Unknown vector backend: {}", other),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Qdrant
// ═══════════════════════════════════════════════════════════════════════

const SCROLL_PAGE: usize = 256;

pub struct QdrantStore {
    url: String,
    collection: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl QdrantStore {
    pub fn new(config: &VectorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    fn endpoint(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.url, self.collection, suffix)
    }

    /// Send a request and return the `result` field of the response.
    async fn call(&self, method: reqwest::Method, url: String, body: Option<Value>) -> Result<Value> {
        let mut request = self.client.request(method, &url);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Qdrant connection error ({})", url))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text: String = text.chars().take(500).collect();
            bail!("Qdrant API error {}: {}", status, text);
        }

        let json: Value = response.json().await?;
        Ok(json.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn kind(&self) -> &str {
        "qdrant"
    }

    async fn ensure_collection(&self, dims: usize) -> Result<()> {
        let mut request = self.client.get(self.endpoint(""));
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        let response = request.send().await.context("Qdrant connection error")?;
        if response.status().is_success() {
            return Ok(());
        }
        if response.status().as_u16() != 404 {
            bail!("Qdrant API error {} while checking collection", response.status());
        }

        tracing::info!(collection = %self.collection, dims, "creating Qdrant collection");
        self.call(
            reqwest::Method::PUT,
            self.endpoint(""),
            Some(json!({ "vectors": { "size": dims, "distance": "Cosine" } })),
        )
        .await?;
        Ok(())
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let points: Vec<Value> = points
            .into_iter()
            .map(|p| json!({ "id": p.id, "vector": p.vector, "payload": p.payload }))
            .collect();
        self.call(
            reqwest::Method::PUT,
            self.endpoint("/points?wait=true"),
            Some(json!({ "points": points })),
        )
        .await?;
        Ok(())
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorHit>> {
        let result = self
            .call(
                reqwest::Method::POST,
                self.endpoint("/points/search"),
                Some(json!({ "vector": vector, "limit": top_k, "with_payload": true })),
            )
            .await?;
        parse_search_result(&result)
    }

    async fn scroll_all(&self) -> Result<Vec<Map<String, Value>>> {
        let mut payloads = Vec::new();
        let mut offset = Value::Null;

        loop {
            let mut body = json!({
                "limit": SCROLL_PAGE,
                "with_payload": true,
                "with_vector": false,
            });
            if !offset.is_null() {
                body["offset"] = offset.clone();
            }
            let result = self
                .call(reqwest::Method::POST, self.endpoint("/points/scroll"), Some(body))
                .await?;

            if let Some(points) = result.get("points").and_then(Value::as_array) {
                payloads.extend(
                    points
                        .iter()
                        .filter_map(|p| p.get("payload").and_then(Value::as_object).cloned()),
                );
            }

            offset = result.get("next_page_offset").cloned().unwrap_or(Value::Null);
            if offset.is_null() {
                break;
            }
        }

        Ok(payloads)
    }

    async fn count(&self) -> Result<u64> {
        let result = self
            .call(
                reqwest::Method::POST,
                self.endpoint("/points/count"),
                Some(json!({ "exact": true })),
            )
            .await?;
        result
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow::anyhow!("Invalid Qdrant count response"))
    }
}

fn parse_search_result(result: &Value) -> Result<Vec<VectorHit>> {
    let items = result
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Invalid Qdrant search response"))?;

    Ok(items
        .iter()
        .map(|item| VectorHit {
            id: match item.get("id") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            },
            score: item.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
            payload: item
                .get("payload")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        })
        .collect())
}

// ═══════════════════════════════════════════════════════════════════════
// In-memory
// ═══════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct MemoryVectorStore {
    dims: RwLock<Option<usize>>,
    points: RwLock<BTreeMap<String, (Vec<f32>, Map<String, Value>)>>,
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    fn kind(&self) -> &str {
        "memory"
    }

    async fn ensure_collection(&self, dims: usize) -> Result<()> {
        let mut current = self.dims.write().await;
        match *current {
            Some(existing) if existing != dims => {
                bail!("collection has {} dimensions, got {}", existing, dims)
            }
            _ => *current = Some(dims),
        }
        Ok(())
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        let dims = *self.dims.read().await;
        let mut stored = self.points.write().await;
        for point in points {
            if let Some(d) = dims {
                if point.vector.len() != d {
                    bail!(
                        "vector for {} has {} dimensions, expected {}",
                        point.id,
                        point.vector.len(),
                        d
                    );
                }
            }
            stored.insert(point.id, (point.vector, point.payload));
        }
        Ok(())
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorHit>> {
        let stored = self.points.read().await;
        let mut hits: Vec<VectorHit> = stored
            .iter()
            .map(|(id, (v, payload))| VectorHit {
                id: id.clone(),
                score: cosine_similarity(vector, v),
                payload: payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn scroll_all(&self) -> Result<Vec<Map<String, Value>>> {
        Ok(self
            .points
            .read()
            .await
            .values()
            .map(|(_, payload)| payload.clone())
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.points.read().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, vector: Vec<f32>, text: &str) -> VectorPoint {
        let mut payload = Map::new();
        payload.insert("text".into(), Value::from(text));
        VectorPoint {
            id: id.into(),
            vector,
            payload,
        }
    }

    #[tokio::test]
    async fn memory_upsert_overwrites_by_id() {
        let store = MemoryVectorStore::default();
        store.ensure_collection(2).await.unwrap();
        store.upsert(vec![point("a", vec![1.0, 0.0], "v1")]).await.unwrap();
        store.upsert(vec![point("a", vec![1.0, 0.0], "v2")]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.scroll_all().await.unwrap()[0]["text"], "v2");
    }

    #[tokio::test]
    async fn memory_search_orders_by_similarity() {
        let store = MemoryVectorStore::default();
        store
            .upsert(vec![
                point("far", vec![0.0, 1.0], "far"),
                point("near", vec![1.0, 0.1], "near"),
            ])
            .await
            .unwrap();
        let hits = store.search(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "near");
    }

    #[tokio::test]
    async fn memory_rejects_wrong_dims() {
        let store = MemoryVectorStore::default();
        store.ensure_collection(3).await.unwrap();
        assert!(store.ensure_collection(4).await.is_err());
        assert!(store.upsert(vec![point("a", vec![1.0], "x")]).await.is_err());
    }

    #[test]
    fn qdrant_search_result_parsing() {
        let result = json!([
            { "id": "5d0c…", "score": 0.9, "payload": { "text": "Article 1" } },
            { "id": 7, "score": 0.5 }
        ]);
        let hits = parse_search_result(&result).unwrap();
        assert_eq!(hits[0].id, "5d0c…");
        assert_eq!(hits[0].payload["text"], "Article 1");
        assert_eq!(hits[1].id, "7");
        assert!(hits[1].payload.is_empty());
    }
}
