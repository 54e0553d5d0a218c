use crate::error::StoreError;
use crate::models::{ChunkMatch, ChunkRecord, Document};
use crate::registry::DocumentStore;
use crate::retrieval::SimilaritySearch;
use crate::writer::ChunkSink;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;
use uuid::Uuid;

const BACKEND: &str = "postgrest";

/// PostgREST client over a pgvector-backed schema.
///
/// Expects two tables (`documents`, `chunks`) and four SQL functions exposed
/// as RPC: `match_chunks`, `match_chunks_multi`, `hybrid_match_chunks`,
/// `hybrid_match_chunks_multi`, each returning rows shaped like `ChunkMatch`
/// with `match_count` applied per document.
#[derive(Clone)]
pub struct PostgrestStore {
    endpoint: String,
    api_key: String,
    client: Client,
}

impl PostgrestStore {
    pub fn new(endpoint: &str, api_key: impl Into<String>) -> Result<Self, StoreError> {
        let parsed = Url::parse(endpoint)?;
        Ok(Self {
            endpoint: parsed.as_str().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: Client::new(),
        })
    }

    /// Registers a document row. Document CRUD otherwise lives outside this
    /// crate; this exists so a first ingest can create its own registration.
    pub async fn create_document(&self, document: &Document) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.url("documents"))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=minimal")
            .json(document)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("create document {}: {status}: {details}", document.slug),
            });
        }
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Vec<ChunkMatch>, StoreError> {
        let response = self
            .client
            .post(self.url(&format!("rpc/{function}")))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&args)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("{function}: {status}: {details}"),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn select_documents(&self, query: &[(&str, &str)]) -> Result<Vec<Document>, StoreError> {
        let response = self
            .client
            .get(self.url("documents"))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("select documents: {status}: {details}"),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl SimilaritySearch for PostgrestStore {
    async fn vector_search(
        &self,
        document_id: Uuid,
        query_vector: &[f32],
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<ChunkMatch>, StoreError> {
        self.rpc(
            "match_chunks",
            json!({
                "doc_id": document_id,
                "query_embedding": query_vector,
                "match_threshold": threshold,
                "match_count": limit,
            }),
        )
        .await
    }

    async fn vector_search_multi(
        &self,
        document_ids: &[Uuid],
        query_vector: &[f32],
        threshold: f64,
        per_document_limit: usize,
    ) -> Result<Vec<ChunkMatch>, StoreError> {
        self.rpc(
            "match_chunks_multi",
            json!({
                "doc_ids": document_ids,
                "query_embedding": query_vector,
                "match_threshold": threshold,
                "match_count": per_document_limit,
            }),
        )
        .await
    }

    async fn hybrid_search(
        &self,
        document_id: Uuid,
        query_vector: &[f32],
        query_text: &str,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<ChunkMatch>, StoreError> {
        self.rpc(
            "hybrid_match_chunks",
            json!({
                "doc_id": document_id,
                "query_embedding": query_vector,
                "query_text": query_text,
                "match_threshold": threshold,
                "match_count": limit,
            }),
        )
        .await
    }

    async fn hybrid_search_multi(
        &self,
        document_ids: &[Uuid],
        query_vector: &[f32],
        query_text: &str,
        threshold: f64,
        per_document_limit: usize,
    ) -> Result<Vec<ChunkMatch>, StoreError> {
        self.rpc(
            "hybrid_match_chunks_multi",
            json!({
                "doc_ids": document_ids,
                "query_embedding": query_vector,
                "query_text": query_text,
                "match_threshold": threshold,
                "match_count": per_document_limit,
            }),
        )
        .await
    }
}

#[async_trait]
impl ChunkSink for PostgrestStore {
    async fn insert_chunks(
        &self,
        document: &Document,
        records: &[ChunkRecord],
    ) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(self.url("chunks"))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=minimal")
            .json(&records)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("insert chunks for {}: {status}: {details}", document.slug),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PostgrestStore {
    async fn list_active(&self) -> Result<Vec<Document>, StoreError> {
        self.select_documents(&[("active", "eq.true"), ("select", "*")])
            .await
    }

    async fn list_by_owner(&self, owner_group: &str) -> Result<Vec<Document>, StoreError> {
        let owner_filter = format!("eq.{owner_group}");
        self.select_documents(&[
            ("active", "eq.true"),
            ("owner_group", owner_filter.as_str()),
            ("select", "*"),
        ])
        .await
    }
}
