mod extract;

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use doc_chat_core::{
    ingest_document, Document, DocumentRegistry, DocumentStore, Embedder, EmbedderSet,
    EmbeddingModel, IngestionConfig, LocalEmbedder, OpenAiEmbedder, PostgrestStore,
    PromptAssembler, RetrievalConfig, RetrievalEngine, SearchMode, SetValidation,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "doc-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// PostgREST endpoint of the chunk and document store
    #[arg(
        long,
        default_value = "http://localhost:3000",
        env = "DOC_CHAT_STORE_URL"
    )]
    store_url: String,

    /// API key for the backing store
    #[arg(long, default_value = "", env = "DOC_CHAT_STORE_KEY")]
    store_key: String,

    /// Local embedding server (Ollama-compatible)
    #[arg(
        long,
        default_value = "http://localhost:11434",
        env = "DOC_CHAT_LOCAL_EMBEDDINGS_URL"
    )]
    local_embeddings_url: String,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a PDF or text file as one document.
    Ingest {
        /// Source file (.pdf or plain text)
        #[arg(long)]
        file: PathBuf,
        /// Stable human-readable document key
        #[arg(long)]
        slug: String,
        /// Display title; defaults to the file name
        #[arg(long)]
        title: Option<String>,
        /// Owning group for access control
        #[arg(long, default_value = "default")]
        owner: String,
        /// Embedding model: openai or local
        #[arg(long, default_value = "local")]
        model: EmbeddingModel,
        /// Page count hint for plain-text sources
        #[arg(long)]
        pages: Option<u32>,
    },
    /// Ask a question against one or more ingested documents.
    Ask {
        /// Question text
        #[arg(long)]
        query: String,
        /// Target document slug; repeat the flag for multi-document search
        #[arg(long = "doc", required = true)]
        docs: Vec<String>,
        /// vector or hybrid
        #[arg(long, default_value = "vector")]
        mode: SearchMode,
        /// Matches per document
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Similarity-search deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// List registered documents.
    Docs {
        /// Restrict to one owning group
        #[arg(long)]
        owner: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let store = PostgrestStore::new(&cli.store_url, cli.store_key.clone())
        .map_err(|error| anyhow!(error.to_string()))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "doc-chat boot"
    );

    match cli.command {
        Command::Ingest {
            file,
            slug,
            title,
            owner,
            model,
            pages,
        } => {
            let source = extract::load_source(&file, pages)?;
            let registry = DocumentRegistry::new(store.clone());

            let document = match registry.lookup_by_slug(&slug).await? {
                Some(existing) => {
                    if existing.embedding_model != model {
                        bail!(
                            "document {} is registered with model {}, not {}",
                            slug,
                            existing.embedding_model,
                            model
                        );
                    }
                    existing
                }
                None => {
                    let document = Document {
                        id: Uuid::new_v4(),
                        slug: slug.clone(),
                        title: title.unwrap_or_else(|| {
                            file.file_stem()
                                .and_then(|stem| stem.to_str())
                                .unwrap_or("untitled")
                                .to_string()
                        }),
                        owner_group: owner,
                        embedding_model: model,
                        active: true,
                        created_at: Utc::now(),
                    };
                    store.create_document(&document).await?;
                    info!(slug = %document.slug, "registered new document");
                    document
                }
            };

            let embedder = build_embedder(model, &cli.local_embeddings_url)?;
            let report = ingest_document(
                embedder.as_ref(),
                &store,
                &document,
                &source,
                &IngestionConfig::default(),
            )
            .await?;

            println!(
                "ingested {} as '{}' ({} pages, {} markers)",
                file.display(),
                document.slug,
                source.total_pages,
                report.marker_count
            );
            println!("  chunks built:      {}", report.chunks_built);
            println!("  embedded:          {}", report.embedded);
            println!(
                "  failed embeddings: {} ({} rate limited)",
                report.failed_embeddings, report.rate_limited
            );
            println!("  persisted:         {}", report.persisted);
        }
        Command::Ask {
            query,
            docs,
            mode,
            top_k,
            timeout_ms,
        } => {
            let registry = DocumentRegistry::new(store.clone());

            match registry.validate_same_owner(&docs).await? {
                SetValidation::Consistent(_) => {}
                SetValidation::Mixed(owners) => {
                    bail!("documents span owner groups: {}", owners.join(", "))
                }
                SetValidation::UnknownSlugs(missing) => {
                    bail!("unknown documents: {}", missing.join(", "))
                }
            }
            if let SetValidation::Mixed(models) =
                registry.validate_same_embedding_model(&docs).await?
            {
                bail!(
                    "documents span embedding models: {}",
                    models
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }

            let mut documents = Vec::new();
            for slug in &docs {
                match registry.lookup_by_slug(slug).await? {
                    Some(document) => documents.push(document),
                    None => bail!("unknown document: {slug}"),
                }
            }

            let config = RetrievalConfig {
                per_document_limit: top_k,
                timeout: timeout_ms.map(Duration::from_millis),
                ..RetrievalConfig::default()
            };
            let engine = RetrievalEngine::with_config(
                store.clone(),
                build_embedder_set(&cli.local_embeddings_url),
                config,
            );

            let matches = engine.retrieve(&query, &documents, mode).await?;
            if matches.is_empty() {
                println!("no passages cleared the relevance threshold");
                return Ok(());
            }

            let prompt = PromptAssembler::default().assemble(&query, &matches, &documents);

            println!("system prompt:\n{}\n", prompt.system);
            println!("user turn:\n{}\n", prompt.user);
            println!("citations:");
            for matched in &matches {
                println!(
                    "  [{}] p.{} score={:.3} chunk={}",
                    matched.document.title, matched.page, matched.score, matched.chunk_id
                );
            }
        }
        Command::Docs { owner } => {
            let documents = match owner {
                Some(owner) => store.list_by_owner(&owner).await?,
                None => store.list_active().await?,
            };

            if documents.is_empty() {
                println!("no documents registered");
                return Ok(());
            }
            for document in documents {
                println!(
                    "{}  '{}' owner={} model={} created={}",
                    document.slug,
                    document.title,
                    document.owner_group,
                    document.embedding_model,
                    document.created_at.to_rfc3339()
                );
            }
        }
    }

    Ok(())
}

fn build_embedder(model: EmbeddingModel, local_url: &str) -> Result<Arc<dyn Embedder>> {
    match model {
        EmbeddingModel::OpenAi => Ok(Arc::new(OpenAiEmbedder::from_env()?)),
        EmbeddingModel::Local => Ok(Arc::new(LocalEmbedder::new(local_url))),
    }
}

/// The `ask` path only ever calls the embedder matching the validated set's
/// model, so the other slot may be an unconfigured client.
fn build_embedder_set(local_url: &str) -> EmbedderSet {
    EmbedderSet {
        openai: Arc::new(OpenAiEmbedder::new(
            std::env::var("OPENAI_API_KEY").unwrap_or_default(),
        )),
        local: Arc::new(LocalEmbedder::new(local_url)),
    }
}
