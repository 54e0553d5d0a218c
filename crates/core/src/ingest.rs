use crate::chunking::{build_candidates, scan_page_markers, ChunkerConfig};
use crate::embeddings::Embedder;
use crate::error::{IngestError, Result};
use crate::models::Document;
use crate::normalize::ensure_page_markers;
use crate::pipeline::{embed_candidates, BatchConfig};
use crate::writer::{write_chunks, ChunkSink, WriterConfig};
use tracing::info;

/// Raw extracted text plus the page count reported by the extraction step.
/// How the text was produced (PDF, paste, OCR) is the caller's business.
#[derive(Debug, Clone)]
pub struct SourceText {
    pub text: String,
    pub total_pages: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestionConfig {
    pub chunker: ChunkerConfig,
    pub batch: BatchConfig,
    pub writer: WriterConfig,
}

impl IngestionConfig {
    pub fn validate(&self) -> Result<()> {
        self.chunker.validate()?;
        self.batch.validate()?;
        self.writer.validate()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IngestionReport {
    pub marker_count: usize,
    pub chunks_built: usize,
    pub embedded: usize,
    pub failed_embeddings: usize,
    pub rate_limited: usize,
    pub persisted: usize,
}

/// Runs one document through normalize, chunk, embed, and write.
///
/// Configuration problems and an embedder that does not speak the document's
/// declared model fail fast before any text is touched. Per-chunk embedding
/// failures reduce the persisted count rather than failing the document.
pub async fn ingest_document(
    embedder: &dyn Embedder,
    sink: &dyn ChunkSink,
    document: &Document,
    source: &SourceText,
    config: &IngestionConfig,
) -> Result<IngestionReport> {
    config.validate()?;

    if embedder.model() != document.embedding_model {
        return Err(IngestError::InvalidArgument(format!(
            "embedder model {} does not match document model {}",
            embedder.model(),
            document.embedding_model
        )));
    }

    let normalized = ensure_page_markers(&source.text, source.total_pages)?;
    let marker_count = scan_page_markers(&normalized)?.len();
    let candidates = build_candidates(&normalized, source.total_pages, &config.chunker)?;

    info!(
        document = %document.slug,
        pages = source.total_pages,
        markers = marker_count,
        chunks = candidates.len(),
        "ingesting document"
    );

    let batch_report = embed_candidates(embedder, &candidates, &config.batch).await?;
    let write_report = write_chunks(
        sink,
        document,
        &batch_report.outcomes,
        marker_count,
        &config.writer,
    )
    .await?;

    Ok(IngestionReport {
        marker_count,
        chunks_built: candidates.len(),
        embedded: batch_report.embedded,
        failed_embeddings: batch_report.failed,
        rate_limited: batch_report.rate_limited,
        persisted: write_report.persisted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EmbedError, StoreError};
    use crate::models::{ChunkRecord, EmbeddingModel};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    struct FlakyEmbedder {
        model: EmbeddingModel,
        calls: AtomicUsize,
        fail_every: usize,
    }

    impl FlakyEmbedder {
        fn reliable(model: EmbeddingModel) -> Self {
            Self {
                model,
                calls: AtomicUsize::new(0),
                fail_every: 0,
            }
        }

        fn failing_every(model: EmbeddingModel, fail_every: usize) -> Self {
            Self {
                fail_every,
                ..Self::reliable(model)
            }
        }
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn model(&self) -> EmbeddingModel {
            self.model
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_every > 0 && call % self.fail_every == 0 {
                return Err(EmbedError::Provider {
                    model: self.model.to_string(),
                    details: format!("simulated failure on call {call}"),
                });
            }
            Ok(vec![0.5; 4])
        }
    }

    struct RecordingSink {
        recorded: Mutex<Vec<ChunkRecord>>,
        fail: bool,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                recorded: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl ChunkSink for RecordingSink {
        async fn insert_chunks(
            &self,
            _document: &Document,
            records: &[ChunkRecord],
        ) -> Result<(), StoreError> {
            if self.fail {
                return Err(StoreError::BackendResponse {
                    backend: "fake".to_string(),
                    details: "insert rejected".to_string(),
                });
            }
            self.recorded.lock().unwrap().extend_from_slice(records);
            Ok(())
        }
    }

    fn document(model: EmbeddingModel) -> Document {
        Document {
            id: Uuid::new_v4(),
            slug: "handbook".to_string(),
            title: "Employee Handbook".to_string(),
            owner_group: "ops".to_string(),
            embedding_model: model,
            active: true,
            created_at: Utc::now(),
        }
    }

    fn small_config() -> IngestionConfig {
        IngestionConfig {
            chunker: ChunkerConfig {
                chunk_tokens: 10,
                overlap_tokens: 2,
            },
            batch: BatchConfig {
                batch_size: 4,
                batch_delay: Duration::ZERO,
            },
            writer: WriterConfig {
                insert_batch_size: 3,
            },
        }
    }

    fn two_page_source() -> SourceText {
        SourceText {
            text: format!("Page 1\n\n{}\n\nPage 2\n\n{}", "x".repeat(100), "y".repeat(100)),
            total_pages: 2,
        }
    }

    #[tokio::test]
    async fn a_document_flows_through_all_stages_with_consistent_counts() {
        let embedder = FlakyEmbedder::failing_every(EmbeddingModel::Local, 4);
        let sink = RecordingSink::new();

        let report = ingest_document(
            &embedder,
            &sink,
            &document(EmbeddingModel::Local),
            &two_page_source(),
            &small_config(),
        )
        .await
        .unwrap();

        assert_eq!(report.marker_count, 2);
        assert!(report.chunks_built > 1);
        assert_eq!(report.failed_embeddings, report.chunks_built / 4);
        assert_eq!(report.embedded, report.chunks_built - report.failed_embeddings);
        assert_eq!(report.persisted, report.embedded);
        assert_eq!(report.rate_limited, 0);

        let recorded = sink.recorded.lock().unwrap();
        assert_eq!(recorded.len(), report.persisted);
        for record in recorded.iter() {
            assert_eq!(record.metadata.marker_count, 2);
            assert!((1..=2).contains(&record.metadata.page));
        }
    }

    #[tokio::test]
    async fn invalid_configuration_fails_before_any_work() {
        let embedder = FlakyEmbedder::reliable(EmbeddingModel::Local);
        let sink = RecordingSink::new();
        let config = IngestionConfig {
            chunker: ChunkerConfig {
                chunk_tokens: 10,
                overlap_tokens: 10,
            },
            ..small_config()
        };

        let result = ingest_document(
            &embedder,
            &sink,
            &document(EmbeddingModel::Local),
            &two_page_source(),
            &config,
        )
        .await;

        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert!(sink.recorded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn an_embedder_for_the_wrong_model_is_rejected() {
        let embedder = FlakyEmbedder::reliable(EmbeddingModel::Local);
        let sink = RecordingSink::new();

        let result = ingest_document(
            &embedder,
            &sink,
            &document(EmbeddingModel::OpenAi),
            &two_page_source(),
            &small_config(),
        )
        .await;

        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn a_rejected_insert_reports_what_was_persisted() {
        let embedder = FlakyEmbedder::reliable(EmbeddingModel::Local);
        let sink = RecordingSink::failing();

        let result = ingest_document(
            &embedder,
            &sink,
            &document(EmbeddingModel::Local),
            &two_page_source(),
            &small_config(),
        )
        .await;

        match result {
            Err(IngestError::InsertFailed { persisted, .. }) => assert_eq!(persisted, 0),
            other => panic!("expected InsertFailed, got {other:?}"),
        }
    }
}
