use crate::error::{RegistryError, StoreError};
use crate::models::{Document, EmbeddingModel};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Document metadata boundary.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_active(&self) -> Result<Vec<Document>, StoreError>;
    async fn list_by_owner(&self, owner_group: &str) -> Result<Vec<Document>, StoreError>;
}

/// Outcome of validating a query's document set. `Mixed` and `UnknownSlugs`
/// name the offending values so callers can report them verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetValidation<T> {
    Consistent(T),
    Mixed(Vec<T>),
    UnknownSlugs(Vec<String>),
}

struct CacheSnapshot {
    documents: Vec<Document>,
    refreshed_at: Instant,
    version: u64,
}

/// TTL-cached view of the active document list. Owned and injected explicitly
/// rather than living in module state; concurrent refreshes are tolerated,
/// last write wins.
pub struct DocumentRegistry<S> {
    store: S,
    ttl: Duration,
    cache: RwLock<Option<CacheSnapshot>>,
}

impl<S: DocumentStore> DocumentRegistry<S> {
    pub fn new(store: S) -> Self {
        Self::with_ttl(store, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(store: S, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            cache: RwLock::new(None),
        }
    }

    /// Reloads the cache from the store when forced or past its TTL. A failed
    /// reload over an existing cache logs and serves stale; with nothing
    /// cached yet the failure propagates.
    pub async fn refresh(&self, force: bool) -> Result<(), RegistryError> {
        if !force {
            let cache = self.cache.read().await;
            if let Some(snapshot) = cache.as_ref() {
                if snapshot.refreshed_at.elapsed() < self.ttl {
                    return Ok(());
                }
            }
        }

        match self.store.list_active().await {
            Ok(documents) => {
                let mut cache = self.cache.write().await;
                let version = cache.as_ref().map(|snapshot| snapshot.version + 1).unwrap_or(0);
                debug!(documents = documents.len(), version, "document cache refreshed");
                *cache = Some(CacheSnapshot {
                    documents,
                    refreshed_at: Instant::now(),
                    version,
                });
                Ok(())
            }
            Err(error) => {
                let cache = self.cache.read().await;
                if cache.is_some() {
                    warn!(error = %error, "document refresh failed, serving stale cache");
                    Ok(())
                } else {
                    Err(RegistryError::Refresh(error))
                }
            }
        }
    }

    /// `None` means no active document carries the slug.
    pub async fn lookup_by_slug(&self, slug: &str) -> Result<Option<Document>, RegistryError> {
        self.refresh(false).await?;
        let cache = self.cache.read().await;
        Ok(cache.as_ref().and_then(|snapshot| {
            snapshot
                .documents
                .iter()
                .find(|document| document.slug == slug)
                .cloned()
        }))
    }

    /// All slugs must belong to one owning group. An empty input set reports
    /// `UnknownSlugs` with no names.
    pub async fn validate_same_owner(
        &self,
        slugs: &[String],
    ) -> Result<SetValidation<String>, RegistryError> {
        if slugs.is_empty() {
            return Ok(SetValidation::UnknownSlugs(Vec::new()));
        }

        let (documents, missing) = self.resolve_all(slugs).await?;
        if !missing.is_empty() {
            return Ok(SetValidation::UnknownSlugs(missing));
        }

        let mut owners: Vec<String> = documents
            .iter()
            .map(|document| document.owner_group.clone())
            .collect();
        owners.sort();
        owners.dedup();

        if owners.len() > 1 {
            return Ok(SetValidation::Mixed(owners));
        }
        Ok(SetValidation::Consistent(owners.pop().unwrap_or_default()))
    }

    /// All slugs must share one embedding model, otherwise their vectors live
    /// in different spaces and a joint query is meaningless.
    pub async fn validate_same_embedding_model(
        &self,
        slugs: &[String],
    ) -> Result<SetValidation<EmbeddingModel>, RegistryError> {
        if slugs.is_empty() {
            return Ok(SetValidation::UnknownSlugs(Vec::new()));
        }

        let (documents, missing) = self.resolve_all(slugs).await?;
        if !missing.is_empty() {
            return Ok(SetValidation::UnknownSlugs(missing));
        }

        let mut models: Vec<EmbeddingModel> = Vec::new();
        for document in &documents {
            if !models.contains(&document.embedding_model) {
                models.push(document.embedding_model);
            }
        }

        match models.as_slice() {
            [single] => Ok(SetValidation::Consistent(*single)),
            _ => Ok(SetValidation::Mixed(models)),
        }
    }

    async fn resolve_all(
        &self,
        slugs: &[String],
    ) -> Result<(Vec<Document>, Vec<String>), RegistryError> {
        self.refresh(false).await?;
        let cache = self.cache.read().await;

        let mut found = Vec::new();
        let mut missing = Vec::new();
        for slug in slugs {
            let document = cache.as_ref().and_then(|snapshot| {
                snapshot
                    .documents
                    .iter()
                    .find(|document| &document.slug == slug)
                    .cloned()
            });
            match document {
                Some(document) => found.push(document),
                None => missing.push(slug.clone()),
            }
        }
        Ok((found, missing))
    }
}
