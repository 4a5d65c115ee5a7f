//! SmartVoz Vector crate - embedding providers, persisted vector index,
//! index builder, and the retrieval gateway.
//!
//! The index is built offline from the exported corpus, written to a
//! staging directory and swapped into place. The gateway loads it lazily,
//! embeds enhanced queries with the same provider, and returns typed
//! evidence plus a synthesized answer. Failures never cross the gateway
//! boundary as errors; they are carried inside the [`SearchResult`].

pub mod builder;
pub mod embedding;
pub mod gateway;
pub mod index;
pub mod lock;
pub mod provider;
pub mod rebuild;
pub mod synthesizer;

pub use builder::{BuildReport, IndexBuilder};
pub use embedding::{
    DynEmbeddingService, EmbeddingService, MockEmbedding, OnnxEmbeddingService, OpenAiEmbedding,
};
pub use gateway::{
    clamp_top_k, enhance_query, ClientIdentity, EvidenceHit, RetrievalFailure, RetrievalGateway,
    SearchResult, DEFAULT_TOP_K, MAX_TOP_K,
};
pub use index::{IndexEntry, IndexManifest, SearchHit, VectorIndex};
pub use lock::RebuildLock;
pub use provider::{select_embedder, SelectedEmbedder};
pub use rebuild::{build_index, export_corpus, rebuild, RebuildReport, RebuildStatus};
pub use synthesizer::{
    AnswerSynthesizer, ExtractiveSynthesizer, OpenAiChatSynthesizer, NO_EVIDENCE_ANSWER,
};
