//! 하이브리드 검색 - TF-IDF + 임베딩 통합
//!
//! 키워드 점수(TF-IDF 코사인)와 의미 점수(임베딩 코사인)를 두 가지 방식으로 통합합니다:
//! - Weighted: 각 목록을 최대값으로 정규화한 뒤 가중 합
//! - RRF: 순위 기반 `Σ 1 / (k + rank + 1)`
//!
//! 통합 후 그래프(토픽 → 개념 → 청크)와 소스 중요도로 재정렬할 수 있습니다.
//! 점수는 원시값이며, 한 번의 호출 안에서의 상대 순서만 의미가 있습니다.
//!
//! ref: https://www.elastic.co/blog/hybrid-search-rrf

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tokio::sync::OnceCell;

use crate::annotations::Annotations;
use crate::config::{FusionMethod, RetrievalConfig};
use crate::embedding::EmbeddingProvider;
use crate::graph::{label_of, term_value, vocab, Graph, Term};
use crate::loader::Document;

use super::chunker::truncate_at_boundary;
use super::tfidf::{tokenize, TfIdfIndex};
use super::vector::cosine_similarity;

/// 토픽을 통해 연결된 개념의 가중치 (직접 매칭은 1.0)
const TOPIC_SIBLING_WEIGHT: f32 = 0.5;
/// 스니펫 최대 길이 (바이트)
const SNIPPET_BYTES: usize = 300;

// ============================================================================
// Types
// ============================================================================

/// 검색 방법
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    /// TF-IDF 키워드 검색만 사용
    Keyword,
    /// 임베딩 검색만 사용
    Semantic,
    /// 두 점수 통합
    Hybrid,
}

/// 검색 결과
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedDocument {
    /// 문서 목록 내 순번
    #[serde(skip)]
    pub index: usize,
    pub title: String,
    pub path: String,
    /// 최종 점수 (높을수록 좋음)
    pub score: f32,
    pub keyword_score: Option<f32>,
    pub semantic_score: Option<f32>,
    /// 그래프 재정렬 가중치 (0이면 미적용)
    pub graph_weight: f32,
    /// 질의 단어가 가장 많이 나오는 문단
    pub snippet: String,
    /// 실제 사용된 검색 방법
    pub method: SearchMethod,
}

/// 호출 단위 검색 컨텍스트
#[derive(Default, Clone, Copy)]
pub struct SearchContext<'a> {
    /// 없으면 의미 검색은 키워드 검색으로 대체
    pub embedder: Option<&'a dyn EmbeddingProvider>,
    pub graph: Option<&'a Graph>,
    pub annotations: Option<&'a Annotations>,
}

// ============================================================================
// HybridRetriever
// ============================================================================

/// 하이브리드 검색기
///
/// 문서 단위로 검색합니다. 문서 임베딩은 첫 의미 검색 때 한 번 계산해 둡니다
/// (임베딩 프로바이더가 캐시를 거치면 디스크에서 읽음).
pub struct HybridRetriever {
    documents: Vec<Document>,
    keyword: TfIdfIndex,
    config: RetrievalConfig,
    doc_vectors: OnceCell<Vec<Option<Vec<f32>>>>,
}

impl HybridRetriever {
    pub fn new(documents: Vec<Document>, config: RetrievalConfig) -> Self {
        let texts: Vec<String> = documents
            .iter()
            .map(|d| format!("{}\n\n{}", d.title, d.text))
            .collect();
        let keyword = TfIdfIndex::build(&texts);
        tracing::debug!("Keyword index built over {} documents", keyword.len());

        Self {
            documents,
            keyword,
            config,
            doc_vectors: OnceCell::new(),
        }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// 검색 (실패하지 않음, 외부 호출 실패는 경고 후 대체)
    pub async fn search(
        &self,
        query: &str,
        method: SearchMethod,
        limit: usize,
        ctx: &SearchContext<'_>,
    ) -> Vec<RetrievedDocument> {
        if self.documents.is_empty() || query.trim().is_empty() {
            return Vec::new();
        }

        let keyword_scores = self.keyword.scores(query);
        let (method, semantic_scores) = match method {
            SearchMethod::Keyword => (SearchMethod::Keyword, None),
            SearchMethod::Semantic | SearchMethod::Hybrid => {
                match self.semantic_scores(query, ctx.embedder).await {
                    Some(scores) => (method, Some(scores)),
                    None => {
                        tracing::warn!("Semantic search unavailable, falling back to keyword search");
                        (SearchMethod::Keyword, None)
                    }
                }
            }
        };

        let base: Vec<f32> = match (method, &semantic_scores) {
            (SearchMethod::Semantic, Some(sem)) => sem.iter().map(|s| s.max(0.0)).collect(),
            (SearchMethod::Hybrid, Some(sem)) => self.fuse(&keyword_scores, sem),
            _ => keyword_scores.clone(),
        };

        let boosts = ctx
            .graph
            .filter(|_| self.config.graph_boost > 0.0)
            .map(|g| graph_weights(g, query))
            .unwrap_or_default();

        let query_tokens: HashSet<String> = tokenize(query).into_iter().collect();
        let mut results: Vec<RetrievedDocument> = self
            .documents
            .iter()
            .enumerate()
            .filter(|(i, _)| base[*i] > 0.0)
            .map(|(i, doc)| {
                let graph_weight = boosts
                    .get(&vocab::source(&doc.id))
                    .copied()
                    .unwrap_or(0.0);
                let mut score = base[i] * (1.0 + self.config.graph_boost * graph_weight);
                if self.config.use_annotations {
                    if let Some(annotations) = ctx.annotations {
                        score *= annotations.multiplier(doc.file_name());
                    }
                }
                RetrievedDocument {
                    index: i,
                    title: doc.title.clone(),
                    path: doc.path.clone(),
                    score,
                    keyword_score: Some(keyword_scores[i]),
                    semantic_score: semantic_scores.as_ref().map(|s| s[i]),
                    graph_weight,
                    snippet: best_snippet(&doc.text, &query_tokens),
                    method,
                }
            })
            .filter(|r| r.score > 0.0)
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));
        results.truncate(limit);
        results
    }

    /// 질의-문서 임베딩 코사인 (임베딩 실패한 문서는 0)
    async fn semantic_scores(
        &self,
        query: &str,
        embedder: Option<&dyn EmbeddingProvider>,
    ) -> Option<Vec<f32>> {
        let embedder = embedder?;
        let query_vector = match embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Failed to embed query: {:#}", e);
                return None;
            }
        };

        let doc_vectors = self
            .doc_vectors
            .get_or_init(|| self.embed_documents(embedder))
            .await;
        if doc_vectors.iter().all(Option::is_none) {
            return None;
        }

        Some(
            doc_vectors
                .iter()
                .map(|v| {
                    v.as_ref()
                        .map(|v| cosine_similarity(&query_vector, v))
                        .unwrap_or(0.0)
                })
                .collect(),
        )
    }

    async fn embed_documents(&self, embedder: &dyn EmbeddingProvider) -> Vec<Option<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(self.documents.len());
        for doc in &self.documents {
            let text = embedding_text(doc, self.config.embed_char_limit);
            match embedder.embed(&text).await {
                Ok(v) => vectors.push(Some(v)),
                Err(e) => {
                    tracing::warn!("Failed to embed {}: {:#}", doc.path, e);
                    vectors.push(None);
                }
            }
        }
        tracing::info!(
            "Embedded {}/{} documents",
            vectors.iter().filter(|v| v.is_some()).count(),
            vectors.len()
        );
        vectors
    }

    fn fuse(&self, keyword: &[f32], semantic: &[f32]) -> Vec<f32> {
        match self.config.fusion {
            FusionMethod::Weighted => {
                weighted_fusion(keyword, semantic, self.config.keyword_weight)
            }
            FusionMethod::Rrf => rrf_fusion(&[keyword, semantic], self.config.rrf_k),
        }
    }
}

// ============================================================================
// Fusion
// ============================================================================

/// 최대값 정규화 후 `w × keyword + (1 - w) × semantic`
pub fn weighted_fusion(keyword: &[f32], semantic: &[f32], keyword_weight: f32) -> Vec<f32> {
    let keyword = normalize_by_max(keyword);
    let semantic = normalize_by_max(semantic);
    keyword
        .iter()
        .zip(&semantic)
        .map(|(k, s)| keyword_weight * k + (1.0 - keyword_weight) * s)
        .collect()
}

/// Reciprocal Rank Fusion
///
/// 각 목록에서 점수 > 0인 항목만 순위를 가집니다.
pub fn rrf_fusion(lists: &[&[f32]], k: f32) -> Vec<f32> {
    let len = lists.first().map_or(0, |l| l.len());
    let mut fused = vec![0.0f32; len];
    for list in lists {
        let mut ranked: Vec<(usize, f32)> = list
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, s)| *s > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        for (rank, (i, _)) in ranked.into_iter().enumerate() {
            if let Some(slot) = fused.get_mut(i) {
                *slot += 1.0 / (k + rank as f32 + 1.0);
            }
        }
    }
    fused
}

fn normalize_by_max(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| s.max(0.0) / max).collect()
}

// ============================================================================
// Graph Re-ranking
// ============================================================================

/// 질의와 관련된 문서 IRI → 그래프 가중치
///
/// 질의 단어를 라벨에 포함한 개념(1.0)과, 같은 토픽에 속한 개념(0.5)에서
/// mentionsConcept / hasChunk 를 거슬러 문서를 찾습니다.
pub fn graph_weights(graph: &Graph, query: &str) -> HashMap<String, f32> {
    let query_tokens: HashSet<String> = tokenize(query).into_iter().collect();
    let mut doc_weights = HashMap::new();
    if query_tokens.is_empty() {
        return doc_weights;
    }

    let mut concept_weights: HashMap<Term, f32> = HashMap::new();
    for concept in graph.instances_of(vocab::DOMAIN_CONCEPT) {
        let label = label_of(graph, &concept);
        if tokenize(&label).iter().any(|t| query_tokens.contains(t)) {
            concept_weights.insert(concept, 1.0);
        }
    }

    let seeds: Vec<Term> = concept_weights.keys().cloned().collect();
    for seed in &seeds {
        for topic in graph.subjects(vocab::COVERS_CONCEPT, seed) {
            for sibling in graph.objects(&topic, vocab::COVERS_CONCEPT) {
                concept_weights.entry(sibling).or_insert(TOPIC_SIBLING_WEIGHT);
            }
        }
    }

    for (concept, weight) in &concept_weights {
        for chunk in graph.subjects(vocab::MENTIONS_CONCEPT, concept) {
            for doc in graph.subjects(vocab::HAS_CHUNK, &chunk) {
                let entry = doc_weights.entry(term_value(&doc).to_string()).or_insert(0.0f32);
                *entry = entry.max(*weight);
            }
        }
    }

    doc_weights
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 임베딩 입력 텍스트 (제목 + 본문, 길이 제한)
pub fn embedding_text(doc: &Document, char_limit: usize) -> String {
    let full = format!("{}\n\n{}", doc.title, doc.text);
    truncate_at_boundary(&full, char_limit).to_string()
}

/// 질의 단어가 가장 많이 나오는 문단 (없으면 첫 문단)
fn best_snippet(text: &str, query_tokens: &HashSet<String>) -> String {
    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let best = paragraphs
        .iter()
        .enumerate()
        .max_by_key(|(i, p)| {
            let hits = tokenize(p)
                .iter()
                .filter(|t| query_tokens.contains(*t))
                .count();
            // 동률이면 앞 문단
            (hits, std::cmp::Reverse(*i))
        })
        .map(|(_, p)| *p)
        .unwrap_or("");

    let snippet = truncate_at_boundary(best, SNIPPET_BYTES);
    if snippet.len() < best.len() {
        format!("{}...", snippet.trim_end())
    } else {
        snippet.to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::FileType;
    use crate::embedding::mock::HashEmbedder;
    use crate::graph::{iri, literal};
    use crate::loader::FrontMatter;
    use std::path::PathBuf;

    fn doc(id: &str, title: &str, text: &str) -> Document {
        Document {
            id: id.to_string(),
            title: title.to_string(),
            text: text.to_string(),
            path: format!("{}.md", id),
            source_path: PathBuf::from(format!("{}.md", id)),
            format: FileType::Markdown,
            front_matter: FrontMatter::default(),
        }
    }

    fn corpus() -> Vec<Document> {
        vec![
            doc(
                "a",
                "RDF and SPARQL Basics",
                "SPARQL is the query language for RDF.\n\nTriples have a subject, predicate and object.",
            ),
            doc(
                "b",
                "Knowledge Graph Fundamentals",
                "A knowledge graph connects entities with typed edges.\n\nOntologies describe classes.",
            ),
        ]
    }

    #[tokio::test]
    async fn test_keyword_search_ranks_sparql_doc_first() {
        let retriever = HybridRetriever::new(corpus(), RetrievalConfig::default());
        let results = retriever
            .search("what is SPARQL?", SearchMethod::Keyword, 5, &SearchContext::default())
            .await;
        assert!(!results.is_empty());
        assert_eq!(results[0].title, "RDF and SPARQL Basics");
        assert!(results[0].snippet.starts_with("SPARQL is the query language"));
    }

    #[tokio::test]
    async fn test_semantic_without_embedder_falls_back() {
        let retriever = HybridRetriever::new(corpus(), RetrievalConfig::default());
        let results = retriever
            .search("knowledge graph", SearchMethod::Semantic, 5, &SearchContext::default())
            .await;
        assert_eq!(results[0].method, SearchMethod::Keyword);
        assert_eq!(results[0].title, "Knowledge Graph Fundamentals");
    }

    #[tokio::test]
    async fn test_hybrid_uses_both_scores() {
        let retriever = HybridRetriever::new(corpus(), RetrievalConfig::default());
        let embedder = HashEmbedder::new(64);
        let ctx = SearchContext {
            embedder: Some(&embedder),
            ..Default::default()
        };

        let results = retriever.search("knowledge graph entities", SearchMethod::Hybrid, 5, &ctx).await;
        assert_eq!(results[0].method, SearchMethod::Hybrid);
        assert_eq!(results[0].title, "Knowledge Graph Fundamentals");
        assert!(results[0].semantic_score.is_some());

        // 문서 임베딩은 한 번만 계산
        let calls = embedder.calls();
        retriever.search("graph", SearchMethod::Semantic, 5, &ctx).await;
        assert_eq!(embedder.calls(), calls + 1);
    }

    #[tokio::test]
    async fn test_annotations_rerank() {
        let docs = vec![
            doc("x", "Graph Notes", "graph databases store graph data"),
            doc("y", "More Graph Notes", "graph databases store graph data"),
        ];
        let retriever = HybridRetriever::new(docs, RetrievalConfig::default());
        let mut annotations = Annotations::default();
        annotations.set("y.md", 5, None);
        let ctx = SearchContext {
            annotations: Some(&annotations),
            ..Default::default()
        };

        let results = retriever.search("graph databases", SearchMethod::Keyword, 5, &ctx).await;
        assert_eq!(results[0].path, "y.md");
    }

    #[tokio::test]
    async fn test_graph_boost_rerank() {
        let docs = vec![
            doc("p", "Storage Notes", "storage engines and storage formats"),
            doc("q", "Storage Layout", "storage engines and storage formats"),
        ];
        let mut graph = Graph::new();
        let chunk = iri(vocab::source("q_chunk_0"));
        let concept = iri(vocab::onto("Columnar_Storage"));
        graph.add(iri(vocab::source("q")), vocab::HAS_CHUNK, chunk.clone());
        graph.add(concept.clone(), vocab::RDF_TYPE, iri(vocab::DOMAIN_CONCEPT));
        graph.add(concept.clone(), vocab::SKOS_PREF_LABEL, literal("Columnar Storage"));
        graph.add(chunk, vocab::MENTIONS_CONCEPT, concept);

        let retriever = HybridRetriever::new(docs, RetrievalConfig::default());
        let ctx = SearchContext {
            graph: Some(&graph),
            ..Default::default()
        };
        let results = retriever.search("storage", SearchMethod::Keyword, 5, &ctx).await;
        assert_eq!(results[0].path, "q.md");
        assert!(results[0].graph_weight > 0.0);
    }

    #[test]
    fn test_rrf_fusion() {
        let keyword = [0.9, 0.0, 0.1];
        let semantic = [0.2, 0.8, 0.1];
        let fused = rrf_fusion(&[&keyword, &semantic], 60.0);
        // 0: rank 0 + rank 1, 1: rank 0 only, 2: rank 1 + rank 2
        assert!(fused[0] > fused[2]);
        assert!(fused[2] > fused[1]);
        assert!((fused[1] - 1.0 / 61.0).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_fusion() {
        let fused = weighted_fusion(&[2.0, 1.0], &[0.0, 0.5], 0.5);
        assert!((fused[0] - 0.5).abs() < 1e-6);
        assert!((fused[1] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_embedding_text_truncates_on_char_boundary() {
        let d = doc("k", "제목", "한국어 본문입니다");
        let text = embedding_text(&d, 8);
        assert!(text.len() <= 8);
        assert!(text.starts_with("제목"));
    }
}
