//! Knowledge 모듈 - 검색과 개념 추출
//!
//! - Chunker: 문단 경계 기반 텍스트 분할
//! - Concepts: 휴리스틱 / 온톨로지 가이드 개념 추출
//! - TF-IDF: 키워드 점수
//! - Vector: 코사인 유사도, 평균 임베딩
//! - Hybrid: 두 점수 통합 + 그래프 / 중요도 재정렬

mod chunker;
mod concepts;
mod hybrid;
mod tfidf;
mod vector;

// Re-exports
pub use chunker::{floor_char_boundary, truncate_at_boundary, Chunk, Chunker, ParagraphChunker};
pub use concepts::{
    extract_heuristic, normalize_label, ConceptExtractor, ConceptStrategy, ExtractedConcept,
    MAX_LABEL_CHARS,
};
pub use hybrid::{
    embedding_text, graph_weights, rrf_fusion, weighted_fusion, HybridRetriever,
    RetrievedDocument, SearchContext, SearchMethod,
};
pub use tfidf::{tokenize, TfIdfIndex};
pub use vector::{cosine_similarity, mean_embedding, SearchResult, VectorIndex};
