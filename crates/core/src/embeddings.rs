use crate::error::EmbedError;
use crate::models::EmbeddingModel;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

pub const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
pub const OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const LOCAL_EMBEDDING_MODEL: &str = "all-minilm";

/// Turns text into a fixed-dimension vector. One implementation per
/// `EmbeddingModel` variant; query embedding at retrieval time goes through
/// the same seam so stored vectors and query vectors share a space.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model(&self) -> EmbeddingModel;

    fn dimensions(&self) -> usize {
        self.model().dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

pub struct OpenAiEmbedder {
    endpoint: String,
    api_key: String,
    client: Client,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(OPENAI_EMBEDDINGS_URL, api_key)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client: Client::new(),
        }
    }

    pub fn from_env() -> Result<Self, EmbedError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| EmbedError::MissingApiKey("OPENAI_API_KEY".to_string()))?;
        Ok(Self::new(api_key))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model(&self) -> EmbeddingModel {
        EmbeddingModel::OpenAi
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": OPENAI_EMBEDDING_MODEL,
                "input": text,
            }))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(EmbedError::RateLimited {
                model: self.model().to_string(),
            });
        }
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(EmbedError::Provider {
                model: self.model().to_string(),
                details: format!("{status}: {details}"),
            });
        }

        let parsed: Value = response.json().await?;
        check_dimensions(self.model(), vector_at(&parsed, "/data/0/embedding"))
    }
}

/// Ollama-style local embedding server.
pub struct LocalEmbedder {
    endpoint: String,
    model_name: String,
    client: Client,
}

impl LocalEmbedder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_model(endpoint, LOCAL_EMBEDDING_MODEL)
    }

    pub fn with_model(endpoint: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model_name: model_name.into(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model(&self) -> EmbeddingModel {
        EmbeddingModel::Local
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let response = self
            .client
            .post(format!(
                "{}/api/embeddings",
                self.endpoint.trim_end_matches('/')
            ))
            .json(&json!({
                "model": self.model_name,
                "prompt": text,
            }))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(EmbedError::RateLimited {
                model: self.model().to_string(),
            });
        }
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(EmbedError::Provider {
                model: self.model().to_string(),
                details: format!("{status}: {details}"),
            });
        }

        let parsed: Value = response.json().await?;
        check_dimensions(self.model(), vector_at(&parsed, "/embedding"))
    }
}

fn vector_at(parsed: &Value, pointer: &str) -> Vec<f32> {
    parsed
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_f64)
                .map(|value| value as f32)
                .collect()
        })
        .unwrap_or_default()
}

fn check_dimensions(model: EmbeddingModel, vector: Vec<f32>) -> Result<Vec<f32>, EmbedError> {
    let expected = model.dimensions();
    if vector.len() != expected {
        return Err(EmbedError::WrongDimensions {
            model: model.to_string(),
            got: vector.len(),
            expected,
        });
    }
    Ok(vector)
}
