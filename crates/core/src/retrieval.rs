use crate::embeddings::Embedder;
use crate::error::{RetrievalError, StoreError};
use crate::models::{ChunkMatch, Document, EmbeddingModel, RetrievalMatch, SearchMode};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Nearest-neighbor backend boundary: single- and multi-document search, each
/// in vector and hybrid form. Hybrid calls carry the raw query text for the
/// full-text component; multi-document calls return up to the limit *per
/// document*, never a shared pool one document can crowd out.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn vector_search(
        &self,
        document_id: Uuid,
        query_vector: &[f32],
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<ChunkMatch>, StoreError>;

    async fn vector_search_multi(
        &self,
        document_ids: &[Uuid],
        query_vector: &[f32],
        threshold: f64,
        per_document_limit: usize,
    ) -> Result<Vec<ChunkMatch>, StoreError>;

    async fn hybrid_search(
        &self,
        document_id: Uuid,
        query_vector: &[f32],
        query_text: &str,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<ChunkMatch>, StoreError>;

    async fn hybrid_search_multi(
        &self,
        document_ids: &[Uuid],
        query_vector: &[f32],
        query_text: &str,
        threshold: f64,
        per_document_limit: usize,
    ) -> Result<Vec<ChunkMatch>, StoreError>;
}

/// Similarity cutoffs per embedding model and search mode. Hybrid thresholds
/// sit lower because the full-text component compensates for weaker vector
/// discrimination; the low-dimensional local model scores lower across the
/// board than the 1536-dim one.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub vector_openai: f64,
    pub vector_local: f64,
    pub hybrid_openai: f64,
    pub hybrid_local: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            vector_openai: 0.3,
            vector_local: 0.05,
            hybrid_openai: 0.2,
            hybrid_local: 0.05,
        }
    }
}

impl Thresholds {
    pub fn select(&self, model: EmbeddingModel, mode: SearchMode) -> f64 {
        match (mode, model) {
            (SearchMode::Vector, EmbeddingModel::OpenAi) => self.vector_openai,
            (SearchMode::Vector, EmbeddingModel::Local) => self.vector_local,
            (SearchMode::Hybrid, EmbeddingModel::OpenAi) => self.hybrid_openai,
            (SearchMode::Hybrid, EmbeddingModel::Local) => self.hybrid_local,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalConfig {
    pub thresholds: Thresholds,
    pub per_document_limit: usize,
    pub timeout: Option<Duration>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            per_document_limit: 5,
            timeout: None,
        }
    }
}

/// One embedder per model, so the query is embedded into the same space as
/// the document set being searched.
pub struct EmbedderSet {
    pub openai: Arc<dyn Embedder>,
    pub local: Arc<dyn Embedder>,
}

impl EmbedderSet {
    pub fn for_model(&self, model: EmbeddingModel) -> &dyn Embedder {
        match model {
            EmbeddingModel::OpenAi => self.openai.as_ref(),
            EmbeddingModel::Local => self.local.as_ref(),
        }
    }
}

pub struct RetrievalEngine<B> {
    backend: B,
    embedders: EmbedderSet,
    config: RetrievalConfig,
}

impl<B: SimilaritySearch> RetrievalEngine<B> {
    pub fn new(backend: B, embedders: EmbedderSet) -> Self {
        Self::with_config(backend, embedders, RetrievalConfig::default())
    }

    pub fn with_config(backend: B, embedders: EmbedderSet, config: RetrievalConfig) -> Self {
        Self {
            backend,
            embedders,
            config,
        }
    }

    /// Top-K chunks per target document for the query, ranked by score.
    ///
    /// An empty result is a successful search that cleared nothing over the
    /// threshold; backend failures and timeout expiry surface as their own
    /// error variants and are never collapsed into "no match".
    pub async fn retrieve(
        &self,
        query: &str,
        documents: &[Document],
        mode: SearchMode,
    ) -> Result<Vec<RetrievalMatch>, RetrievalError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }
        if documents.is_empty() {
            return Err(RetrievalError::NoDocuments);
        }
        // The registry validates slug sets up front; this re-check keeps a
        // mixed set from ever reaching the backend through other call paths.
        let model = check_compatibility(documents)?;

        let query_vector = self.embedders.for_model(model).embed(query).await?;
        let threshold = self.config.thresholds.select(model, mode);
        let limit = self.config.per_document_limit;

        let matches = self
            .dispatch(query, &query_vector, documents, mode, threshold, limit)
            .await?;

        let by_id: HashMap<Uuid, &Document> = documents
            .iter()
            .map(|document| (document.id, document))
            .collect();

        let mut resolved = Vec::with_capacity(matches.len());
        for matched in matches {
            let Some(document) = by_id.get(&matched.document_id) else {
                return Err(RetrievalError::Store(StoreError::BackendResponse {
                    backend: "similarity-search".to_string(),
                    details: format!("match for unknown document id {}", matched.document_id),
                }));
            };
            resolved.push(RetrievalMatch {
                chunk_id: matched.chunk_id,
                content: matched.content,
                page: matched.page,
                score: matched.score,
                document: (*document).clone(),
            });
        }

        resolved.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        debug!(matches = resolved.len(), %mode, threshold, "retrieval complete");
        Ok(resolved)
    }

    async fn dispatch(
        &self,
        query: &str,
        query_vector: &[f32],
        documents: &[Document],
        mode: SearchMode,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<ChunkMatch>, RetrievalError> {
        let search = async {
            match (mode, documents) {
                (SearchMode::Vector, [single]) => {
                    self.backend
                        .vector_search(single.id, query_vector, threshold, limit)
                        .await
                }
                (SearchMode::Vector, _) => {
                    let ids: Vec<Uuid> = documents.iter().map(|document| document.id).collect();
                    self.backend
                        .vector_search_multi(&ids, query_vector, threshold, limit)
                        .await
                }
                (SearchMode::Hybrid, [single]) => {
                    self.backend
                        .hybrid_search(single.id, query_vector, query, threshold, limit)
                        .await
                }
                (SearchMode::Hybrid, _) => {
                    let ids: Vec<Uuid> = documents.iter().map(|document| document.id).collect();
                    self.backend
                        .hybrid_search_multi(&ids, query_vector, query, threshold, limit)
                        .await
                }
            }
        };

        match self.config.timeout {
            Some(budget) => match tokio::time::timeout(budget, search).await {
                Ok(result) => Ok(result?),
                Err(_) => Err(RetrievalError::TimedOut { budget }),
            },
            None => Ok(search.await?),
        }
    }
}

fn check_compatibility(documents: &[Document]) -> Result<EmbeddingModel, RetrievalError> {
    let mut owners: Vec<&str> = documents
        .iter()
        .map(|document| document.owner_group.as_str())
        .collect();
    owners.sort_unstable();
    owners.dedup();
    if owners.len() > 1 {
        return Err(RetrievalError::IncompatibleDocuments(format!(
            "documents span owner groups: {}",
            owners.join(", ")
        )));
    }

    let mut models: Vec<EmbeddingModel> = Vec::new();
    for document in documents {
        if !models.contains(&document.embedding_model) {
            models.push(document.embedding_model);
        }
    }
    if models.len() > 1 {
        return Err(RetrievalError::IncompatibleDocuments(format!(
            "documents span embedding models: {}",
            models
                .iter()
                .map(|model| model.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    models
        .first()
        .copied()
        .ok_or(RetrievalError::NoDocuments)
}
