use crate::error::{IngestError, StoreError};
use crate::models::{ChunkMetadata, ChunkRecord, Document};
use crate::pipeline::EmbeddingOutcome;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

/// Bulk chunk persistence boundary.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    async fn insert_chunks(
        &self,
        document: &Document,
        records: &[ChunkRecord],
    ) -> Result<(), StoreError>;
}

/// Insert batching is sized independently of embedding batching: the limit
/// here is the backing store's payload size, not provider rate limits.
#[derive(Debug, Clone, Copy)]
pub struct WriterConfig {
    pub insert_batch_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            insert_batch_size: 50,
        }
    }
}

impl WriterConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.insert_batch_size == 0 {
            return Err(IngestError::InvalidArgument(
                "insert_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WriteReport {
    pub persisted: usize,
    pub skipped: usize,
}

pub fn make_chunk_id(document_id: &Uuid, index: usize, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Persists embedded outcomes in fixed-size batches. Failed outcomes are
/// dropped (counted as skipped) rather than written as null-vector rows;
/// their candidate indices stay reserved so a later re-embed fills the gaps.
///
/// A failed insert batch aborts the remaining write; the error reports how
/// many chunks made it in before the abort.
pub async fn write_chunks(
    sink: &dyn ChunkSink,
    document: &Document,
    outcomes: &[EmbeddingOutcome],
    marker_count: usize,
    config: &WriterConfig,
) -> Result<WriteReport, IngestError> {
    config.validate()?;

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for outcome in outcomes {
        match outcome {
            EmbeddingOutcome::Embedded {
                candidate,
                embedding,
            } => records.push(ChunkRecord {
                chunk_id: make_chunk_id(&document.id, candidate.index, &candidate.text),
                document_id: document.id,
                chunk_index: candidate.index,
                content: candidate.text.clone(),
                embedding: embedding.clone(),
                metadata: ChunkMetadata {
                    char_start: candidate.char_start,
                    char_end: candidate.char_end,
                    token_estimate: candidate.token_estimate,
                    page: candidate.page,
                    marker_count,
                },
            }),
            EmbeddingOutcome::Failed { .. } => skipped += 1,
        }
    }

    let mut persisted = 0usize;
    for batch in records.chunks(config.insert_batch_size) {
        if let Err(source) = sink.insert_chunks(document, batch).await {
            return Err(IngestError::InsertFailed { persisted, source });
        }
        persisted += batch.len();
    }

    debug!(persisted, skipped, document = %document.slug, "chunk write complete");
    Ok(WriteReport { persisted, skipped })
}
