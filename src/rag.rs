//! Vector retrieval and chunk indexing.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::embedding::{embed_batched, embed_query, Embedder};
use crate::enrich::chunk_id;
use crate::models::{EnrichedChunk, TextChunk};
use crate::vector_store::{VectorPoint, VectorStore};

/// One `rag_search` result. `metadata` is the full stored payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RagHit {
    pub text: String,
    pub score: f32,
    pub metadata: Map<String, Value>,
}

/// Embed `query` and return the `top_k` closest stored chunks.
pub async fn search(
    vectors: &dyn VectorStore,
    embedder: &dyn Embedder,
    query: &str,
    top_k: usize,
) -> Result<Vec<RagHit>> {
    let vector = embed_query(embedder, query)
        .await
        .context("query embedding failed")?;
    let hits = vectors.search(&vector, top_k).await?;

    Ok(hits
        .into_iter()
        .map(|hit| RagHit {
            text: hit
                .payload
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            score: hit.score,
            metadata: hit.payload,
        })
        .collect())
}

/// Upsert enriched chunks keyed by `chunk_id`, in batches.
///
/// Returns the number of points written. Any failed batch fails the call.
pub async fn index_enriched(
    vectors: &dyn VectorStore,
    chunks: &[EnrichedChunk],
    batch_size: usize,
) -> Result<usize> {
    let Some(first) = chunks.first() else {
        return Ok(0);
    };
    vectors.ensure_collection(first.embedding.len()).await?;

    let batch_size = batch_size.max(1);
    let total_batches = chunks.len().div_ceil(batch_size);
    for (i, batch) in chunks.chunks(batch_size).enumerate() {
        let points = batch
            .iter()
            .map(|chunk| -> Result<VectorPoint> {
                let payload = match serde_json::to_value(chunk)? {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                Ok(VectorPoint {
                    id: chunk.chunk_id.clone(),
                    vector: chunk.embedding.clone(),
                    payload,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        vectors
            .upsert(points)
            .await
            .with_context(|| format!("vector upsert failed (batch {}/{})", i + 1, total_batches))?;
        tracing::debug!(batch = i + 1, total_batches, "uploaded vector batch");
    }

    Ok(chunks.len())
}

/// Embed and upsert plain chunks without enrichment.
///
/// Payload is `{text, ..metadata}`. A chunk without `metadata.chunk_id` is
/// keyed by its position in `chunks`. Returns `false` when there was
/// nothing to index or an upsert batch failed.
pub async fn ingest_chunks(
    vectors: &dyn VectorStore,
    embedder: &dyn Embedder,
    chunks: &[TextChunk],
    upsert_batch_size: usize,
    embed_batch_size: usize,
) -> Result<bool> {
    if chunks.is_empty() {
        return Ok(false);
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embed_batched(embedder, &texts, embed_batch_size).await?;

    let dims = embeddings.first().map(Vec::len).unwrap_or(0);
    vectors.ensure_collection(dims).await?;

    let points: Vec<VectorPoint> = chunks
        .iter()
        .enumerate()
        .zip(embeddings)
        .map(|((position, chunk), vector)| {
            let mut payload = Map::new();
            payload.insert("text".into(), Value::from(chunk.text.clone()));
            for (k, v) in &chunk.metadata {
                payload.insert(k.clone(), v.clone());
            }
            VectorPoint {
                id: chunk_id(chunk.filename(), chunk.index_or(position as i64), &chunk.text),
                vector,
                payload,
            }
        })
        .collect();

    let mut remaining = points;
    while !remaining.is_empty() {
        let rest = remaining.split_off(upsert_batch_size.max(1).min(remaining.len()));
        if let Err(e) = vectors.upsert(remaining).await {
            tracing::warn!(error = %format!("{:#}", e), "vector batch upload failed");
            return Ok(false);
        }
        remaining = rest;
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::MemoryVectorStore;
    use async_trait::async_trait;

    /// Maps text length onto a 2-d unit-ish vector.
    struct LenEmbedder;

    #[async_trait]
    impl Embedder for LenEmbedder {
        fn model_name(&self) -> &str {
            "len"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0])
                .collect())
        }
    }

    fn chunk(text: &str, index: i64) -> TextChunk {
        let mut metadata = Map::new();
        metadata.insert("filename".into(), Value::from("europe/solvency.pdf"));
        metadata.insert("chunk_id".into(), Value::from(index));
        TextChunk {
            text: text.into(),
            metadata,
        }
    }

    #[tokio::test]
    async fn ingest_chunks_is_idempotent() {
        let store = MemoryVectorStore::default();
        let chunks = vec![chunk("Solvency capital", 0), chunk("Own funds", 1)];

        assert!(ingest_chunks(&store, &LenEmbedder, &chunks, 1, 8).await.unwrap());
        assert!(ingest_chunks(&store, &LenEmbedder, &chunks, 1, 8).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn chunks_without_ids_sharing_a_prefix_are_kept_apart() {
        let store = MemoryVectorStore::default();
        let head = "A".repeat(64);
        let chunks = vec![
            TextChunk {
                text: format!("{} first clause", head),
                metadata: Map::new(),
            },
            TextChunk {
                text: format!("{} second clause", head),
                metadata: Map::new(),
            },
        ];

        assert!(ingest_chunks(&store, &LenEmbedder, &chunks, 50, 8).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 2);

        // Re-ingesting the same batch still lands on the same points
        assert!(ingest_chunks(&store, &LenEmbedder, &chunks, 50, 8).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn ingest_nothing_returns_false() {
        let store = MemoryVectorStore::default();
        assert!(!ingest_chunks(&store, &LenEmbedder, &[], 50, 8).await.unwrap());
    }

    #[tokio::test]
    async fn search_returns_text_and_payload() {
        let store = MemoryVectorStore::default();
        ingest_chunks(&store, &LenEmbedder, &[chunk("Own funds", 0)], 50, 8)
            .await
            .unwrap();

        let hits = search(&store, &LenEmbedder, "own funds", 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "Own funds");
        assert_eq!(hits[0].metadata["filename"], "europe/solvency.pdf");
        assert_eq!(hits[0].metadata["text"], "Own funds");
    }
}
