pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod prompt;
pub mod registry;
pub mod retrieval;
pub mod stores;
pub mod writer;

pub use chunking::{build_candidates, scan_page_markers, ChunkerConfig, CHARS_PER_TOKEN};
pub use embeddings::{Embedder, LocalEmbedder, OpenAiEmbedder};
pub use error::{EmbedError, IngestError, RegistryError, RetrievalError, StoreError};
pub use ingest::{ingest_document, IngestionConfig, IngestionReport, SourceText};
pub use models::{
    ChunkCandidate, ChunkMatch, ChunkMetadata, ChunkRecord, Document, EmbeddingModel, PageMarker,
    RetrievalMatch, SearchMode,
};
pub use normalize::{clean_whitespace, ensure_page_markers};
pub use pipeline::{embed_candidates, BatchConfig, BatchReport, EmbeddingOutcome};
pub use prompt::{DisclosureRule, GroundedPrompt, PromptAssembler, SlugListRule};
pub use registry::{DocumentRegistry, DocumentStore, SetValidation};
pub use retrieval::{
    EmbedderSet, RetrievalConfig, RetrievalEngine, SimilaritySearch, Thresholds,
};
pub use stores::PostgrestStore;
pub use writer::{make_chunk_id, write_chunks, ChunkSink, WriteReport, WriterConfig};
