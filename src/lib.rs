//! pkm-rag - 개인 지식관리 RAG 시스템
//!
//! 마크다운/텍스트/HTML/PDF 소스 폴더를 대상으로
//! TF-IDF + 임베딩 하이브리드 검색, RDF 지식 그래프 빌드,
//! 온톨로지 기반 공백 분석과 외부 문헌 탐색을 제공합니다.

pub mod annotations;
pub mod cache;
pub mod cli;
pub mod collector;
pub mod completion;
pub mod config;
pub mod discovery;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod gaps;
pub mod graph;
pub mod knowledge;
pub mod loader;
pub mod server;

// Re-exports
pub use annotations::Annotations;
pub use cache::{Cache, CachedEmbedder};
pub use completion::{create_completion, CompletionProvider, CompletionRequest, OpenAiCompletion};
pub use config::Config;
pub use discovery::{Candidate, Discovery, ExistingSource, FilterOutcome, LiteratureSource};
pub use embedding::{create_embedder, get_api_key, has_api_key, EmbeddingProvider, OpenAiEmbedding};
pub use engine::{AskResponse, CorpusStats, PkmEngine};
pub use error::PkmError;
pub use gaps::{GapAnalyzer, GapReport};
pub use graph::{Graph, GraphBuilder, GraphStats, Ontology};
pub use knowledge::{
    Chunk, Chunker, ConceptExtractor, ConceptStrategy, HybridRetriever, ParagraphChunker,
    RetrievedDocument, SearchMethod,
};
pub use loader::{Document, DocumentLoader};
