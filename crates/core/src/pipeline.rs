use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::models::ChunkCandidate;
use futures_util::future::join_all;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            batch_delay: Duration::from_millis(100),
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.batch_size == 0 {
            return Err(IngestError::InvalidArgument(
                "batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// What happened to a single candidate. Failures keep the candidate so a
/// caller can re-embed exactly the missing subset later.
#[derive(Debug, Clone)]
pub enum EmbeddingOutcome {
    Embedded {
        candidate: ChunkCandidate,
        embedding: Vec<f32>,
    },
    Failed {
        candidate: ChunkCandidate,
        reason: String,
        rate_limited: bool,
    },
}

impl EmbeddingOutcome {
    pub fn candidate(&self) -> &ChunkCandidate {
        match self {
            EmbeddingOutcome::Embedded { candidate, .. } => candidate,
            EmbeddingOutcome::Failed { candidate, .. } => candidate,
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self, EmbeddingOutcome::Embedded { .. })
    }
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub outcomes: Vec<EmbeddingOutcome>,
    pub embedded: usize,
    pub failed: usize,
    pub rate_limited: usize,
}

/// Embeds candidates in fixed-size batches. Calls within a batch run
/// concurrently; batches run sequentially with `batch_delay` between them
/// (none after the last) to stay under provider rate limits.
///
/// A failed call marks only its own candidate as `Failed`; the rest of the
/// document proceeds. Output order matches input order.
pub async fn embed_candidates(
    embedder: &dyn Embedder,
    candidates: &[ChunkCandidate],
    config: &BatchConfig,
) -> Result<BatchReport, IngestError> {
    config.validate()?;

    debug!(
        candidates = candidates.len(),
        batch_size = config.batch_size,
        "embedding chunk candidates"
    );

    let mut outcomes = Vec::with_capacity(candidates.len());
    let mut embedded = 0usize;
    let mut failed = 0usize;
    let mut rate_limited = 0usize;

    for (batch_index, batch) in candidates.chunks(config.batch_size).enumerate() {
        if batch_index > 0 {
            tokio::time::sleep(config.batch_delay).await;
        }

        let results = join_all(
            batch
                .iter()
                .map(|candidate| embedder.embed(&candidate.text)),
        )
        .await;

        for (candidate, result) in batch.iter().zip(results) {
            match result {
                Ok(embedding) => {
                    embedded += 1;
                    outcomes.push(EmbeddingOutcome::Embedded {
                        candidate: candidate.clone(),
                        embedding,
                    });
                }
                Err(error) => {
                    let rate_limit = error.is_rate_limit();
                    warn!(
                        chunk_index = candidate.index,
                        rate_limit,
                        error = %error,
                        "embedding failed, skipping chunk"
                    );
                    failed += 1;
                    if rate_limit {
                        rate_limited += 1;
                    }
                    outcomes.push(EmbeddingOutcome::Failed {
                        candidate: candidate.clone(),
                        reason: error.to_string(),
                        rate_limited: rate_limit,
                    });
                }
            }
        }
    }

    Ok(BatchReport {
        outcomes,
        embedded,
        failed,
        rate_limited,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmbedError;
    use crate::models::EmbeddingModel;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    struct FlakyEmbedder {
        calls: AtomicUsize,
        fail_every: usize,
        rate_limit: bool,
    }

    impl FlakyEmbedder {
        fn failing_every(fail_every: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_every,
                rate_limit: false,
            }
        }

        fn rate_limiting_every(fail_every: usize) -> Self {
            Self {
                rate_limit: true,
                ..Self::failing_every(fail_every)
            }
        }
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn model(&self) -> EmbeddingModel {
            EmbeddingModel::Local
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_every > 0 && call % self.fail_every == 0 {
                if self.rate_limit {
                    return Err(EmbedError::RateLimited {
                        model: self.model().to_string(),
                    });
                }
                return Err(EmbedError::Provider {
                    model: self.model().to_string(),
                    details: format!("simulated failure on call {call}"),
                });
            }
            Ok(vec![call as f32; 4])
        }
    }

    fn candidates(count: usize) -> Vec<ChunkCandidate> {
        (0..count)
            .map(|index| ChunkCandidate {
                index,
                text: format!("candidate {index}"),
                char_start: index * 10,
                char_end: index * 10 + 10,
                page: 1,
                token_estimate: 3,
            })
            .collect()
    }

    fn zero_delay() -> BatchConfig {
        BatchConfig {
            batch_size: 4,
            batch_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn every_third_failure_is_isolated_to_its_own_chunk() {
        let embedder = FlakyEmbedder::failing_every(3);
        let report = embed_candidates(&embedder, &candidates(10), &zero_delay())
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 10);
        assert_eq!(report.embedded, 7);
        assert_eq!(report.failed, 3);
        assert_eq!(report.rate_limited, 0);

        for (position, outcome) in report.outcomes.iter().enumerate() {
            assert_eq!(outcome.candidate().index, position);
            let should_fail = (position + 1) % 3 == 0;
            assert_eq!(outcome.is_embedded(), !should_fail);
        }
    }

    #[tokio::test]
    async fn rate_limits_are_counted_separately_from_other_failures() {
        let embedder = FlakyEmbedder::rate_limiting_every(2);
        let report = embed_candidates(&embedder, &candidates(10), &zero_delay())
            .await
            .unwrap();

        assert_eq!(report.failed, 5);
        assert_eq!(report.rate_limited, 5);
        for outcome in &report.outcomes {
            if let EmbeddingOutcome::Failed { rate_limited, .. } = outcome {
                assert!(rate_limited);
            }
        }
    }

    #[tokio::test]
    async fn batches_are_paced_by_the_configured_delay() {
        let embedder = FlakyEmbedder::failing_every(0);
        let config = BatchConfig {
            batch_size: 2,
            batch_delay: Duration::from_millis(25),
        };

        let started = Instant::now();
        let report = embed_candidates(&embedder, &candidates(6), &config)
            .await
            .unwrap();

        // Three batches, two inter-batch delays.
        assert_eq!(report.embedded, 6);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected() {
        let embedder = FlakyEmbedder::failing_every(0);
        let config = BatchConfig {
            batch_size: 0,
            batch_delay: Duration::ZERO,
        };

        let result = embed_candidates(&embedder, &candidates(3), &config).await;
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn no_candidates_produce_an_empty_report() {
        let embedder = FlakyEmbedder::failing_every(0);
        let report = embed_candidates(&embedder, &[], &zero_delay())
            .await
            .unwrap();

        assert!(report.outcomes.is_empty());
        assert_eq!(report.embedded, 0);
        assert_eq!(report.failed, 0);
    }
}
