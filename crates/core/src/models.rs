use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Embedding models the pipeline knows how to drive. A closed enum rather
/// than a string tag, so wiring up a third model is a compile-checked change
/// at every match site.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingModel {
    OpenAi,
    Local,
}

impl EmbeddingModel {
    pub fn dimensions(&self) -> usize {
        match self {
            EmbeddingModel::OpenAi => 1536,
            EmbeddingModel::Local => 384,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingModel::OpenAi => "openai",
            EmbeddingModel::Local => "local",
        }
    }
}

impl fmt::Display for EmbeddingModel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for EmbeddingModel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "openai" => Ok(EmbeddingModel::OpenAi),
            "local" => Ok(EmbeddingModel::Local),
            other => Err(format!("unknown embedding model: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Vector,
    Hybrid,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            SearchMode::Vector => "vector",
            SearchMode::Hybrid => "hybrid",
        })
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "vector" => Ok(SearchMode::Vector),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(format!("unknown search mode: {other}")),
        }
    }
}

/// One ingested source. Owned by exactly one access-control group; immutable
/// after creation except for `active` and display metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub owner_group: String,
    pub embedding_model: EmbeddingModel,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A page marker located during the chunker's pre-scan: `(page, char offset)`.
/// Transient — never persisted on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMarker {
    pub page: u32,
    pub offset: usize,
}

/// A chunk before embedding: one sliding window over the normalized text.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkCandidate {
    pub index: usize,
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
    pub page: u32,
    pub token_estimate: usize,
}

/// Fixed-shape chunk metadata. The marker count is carried along so poor page
/// attribution can be diagnosed from the stored rows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub char_start: usize,
    pub char_end: usize,
    pub token_estimate: usize,
    pub page: u32,
    pub marker_count: usize,
}

/// A chunk as persisted: only successfully embedded candidates become records,
/// so `embedding` is always populated at the declared dimensionality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub document_id: Uuid,
    pub chunk_index: usize,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(flatten)]
    pub metadata: ChunkMetadata,
}

/// A ranked hit as returned by the similarity-search backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMatch {
    pub chunk_id: String,
    pub document_id: Uuid,
    pub content: String,
    pub page: u32,
    pub score: f64,
}

/// A hit resolved against the validated document set. Ephemeral — assembled
/// into a prompt, never persisted.
#[derive(Debug, Clone)]
pub struct RetrievalMatch {
    pub chunk_id: String,
    pub content: String,
    pub page: u32,
    pub score: f64,
    pub document: Document,
}
