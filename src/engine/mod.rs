//! PKM 엔진
//!
//! 로드된 코퍼스, 검색기, 캐시, 그래프, 프로바이더를 한곳에 묶습니다.
//! CLI와 HTTP 서버가 같은 엔진을 사용합니다.
//!
//! ## 흐름
//! ```text
//! data/sources/ → DocumentLoader → HybridRetriever (TF-IDF + 임베딩)
//!                               └→ GraphBuilder → knowledge_graph.ttl
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::annotations::Annotations;
use crate::cache::{Cache, CachedEmbedder};
use crate::completion::{CompletionProvider, CompletionRequest};
use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::graph::export::{self, GRAPH_FILE, SCHEMA_FILE};
use crate::graph::sparql::{self, SparqlOutcome};
use crate::graph::{Graph, GraphBuilder, GraphStats, NaiveBatchClustering};
use crate::knowledge::{
    truncate_at_boundary, Chunk, ConceptExtractor, ConceptStrategy, HybridRetriever,
    ParagraphChunker, RetrievedDocument, SearchContext, SearchMethod,
};
use crate::loader::{Document, DocumentLoader};

/// 답변 컨텍스트에 넣을 문서당 최대 바이트
const ASK_CONTEXT_BYTES: usize = 8000;

const ASK_SYSTEM_PROMPT: &str = "You are a research assistant that answers questions based ONLY on the provided source documents.

Rules:
1. Only use information from the provided sources
2. Include citations like [1], [2], [3] referring to source numbers
3. If sources don't contain enough information, say so
4. Be precise and cite specific sources for each claim
5. Synthesize information across sources when relevant";

pub const NO_SOURCES_ANSWER: &str = "No relevant sources found in the vault.";
pub const NO_PROVIDER_ERROR: &str = "Completion provider not configured. Set OPENAI_API_KEY in .env";

// ============================================================================
// Types
// ============================================================================

/// 답변에 인용된 소스
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub title: String,
    pub path: String,
    pub score: f32,
}

/// 질문 응답 결과
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: Option<String>,
    pub sources: Vec<SourceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AskResponse {
    fn failed(error: impl Into<String>, sources: Vec<SourceRef>) -> Self {
        Self {
            answer: None,
            sources,
            model: None,
            error: Some(error.into()),
        }
    }
}

/// 코퍼스 통계
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorpusStats {
    pub num_documents: usize,
    pub total_characters: usize,
    pub total_sections: usize,
    pub avg_doc_length: usize,
}

/// 그래프 빌드 결과 요약
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub stats: GraphStats,
    pub chunks: Vec<Chunk>,
}

// ============================================================================
// Engine
// ============================================================================

/// PKM 엔진
pub struct PkmEngine {
    config: Config,
    cache: Cache,
    strategy: ConceptStrategy,
    retriever: HybridRetriever,
    annotations: Annotations,
    graph: Option<Graph>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    completion: Option<Arc<dyn CompletionProvider>>,
}

impl PkmEngine {
    /// 설정에 따라 코퍼스 로드
    ///
    /// 온톨로지 경로가 설정되어 있는데 파일이 없으면 여기서 실패합니다.
    pub async fn load(config: Config) -> Result<Self> {
        let strategy = ConceptStrategy::resolve(&config.extraction)?;
        let cache = Cache::from_paths(&config.paths)?;

        let sources_dir = &config.paths.sources_dir;
        std::fs::create_dir_all(sources_dir)
            .with_context(|| format!("Failed to create sources dir {:?}", sources_dir))?;
        let documents = DocumentLoader::new().load_directory(sources_dir).await?;

        let annotations = Annotations::load(&config.paths.annotations_file);
        let retriever = HybridRetriever::new(documents, config.retrieval.clone());

        tracing::info!(
            "Engine ready: {} documents, {} extraction, {} annotations",
            retriever.documents().len(),
            strategy.name(),
            annotations.len()
        );

        Ok(Self {
            config,
            cache,
            strategy,
            retriever,
            annotations,
            graph: None,
            embedder: None,
            completion: None,
        })
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_completion(mut self, completion: Arc<dyn CompletionProvider>) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn documents(&self) -> &[Document] {
        self.retriever.documents()
    }

    pub fn graph(&self) -> Option<&Graph> {
        self.graph.as_ref()
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    pub fn has_completion(&self) -> bool {
        self.completion.is_some()
    }

    pub fn graph_path(&self) -> PathBuf {
        self.config.paths.graphs_dir.join(GRAPH_FILE)
    }

    pub fn schema_path(&self) -> PathBuf {
        self.config.paths.graphs_dir.join(SCHEMA_FILE)
    }

    // ------------------------------------------------------------------------
    // Graph
    // ------------------------------------------------------------------------

    /// 현재 코퍼스로 그래프 생성 (기존 그래프 대체)
    pub async fn build_graph(&mut self) -> BuildSummary {
        let chunker = ParagraphChunker::new(&self.config.chunking);
        let clustering = NaiveBatchClustering::new(self.config.topics.batch_size);
        let mut extractor =
            ConceptExtractor::new(&self.strategy, self.config.extraction.max_concepts_per_chunk)
                .with_cache(&self.cache);
        if let Some(completion) = self.completion.as_deref() {
            extractor = extractor.with_completion(completion);
        }

        let output = GraphBuilder::new(&chunker, &extractor, &clustering)
            .build(self.retriever.documents())
            .await;

        self.graph = Some(output.graph);
        BuildSummary {
            stats: output.stats,
            chunks: output.chunks,
        }
    }

    /// 그래프를 `graphs_dir/knowledge_graph.ttl`로 내보내기
    pub fn export_graph(&self) -> Result<PathBuf> {
        let Some(graph) = &self.graph else {
            bail!("Knowledge graph has not been built");
        };
        let path = self.graph_path();
        export::export_graph(graph, &path)?;
        Ok(path)
    }

    /// 그래프 스키마를 `graphs_dir/pkm_ontology.ttl`로 내보내기
    pub fn export_schema(&self) -> Result<PathBuf> {
        let path = self.schema_path();
        export::export_schema(&path)?;
        Ok(path)
    }

    /// 이전에 내보낸 그래프 로드 (파일이 없으면 false)
    pub fn load_exported_graph(&mut self) -> Result<bool> {
        let path = self.graph_path();
        if !path.is_file() {
            return Ok(false);
        }
        let graph = export::load_graph(&path)?;
        tracing::info!("Loaded graph from {:?} ({} triples)", path, graph.len());
        self.graph = Some(graph);
        Ok(true)
    }

    /// 현재 그래프에 SPARQL 질의
    pub fn sparql(&self, query: &str) -> Result<SparqlOutcome> {
        let Some(graph) = &self.graph else {
            bail!("Knowledge graph has not been built");
        };
        sparql::query(graph, query)
    }

    // ------------------------------------------------------------------------
    // Retrieval
    // ------------------------------------------------------------------------

    /// 문서 검색
    pub async fn query(
        &self,
        query: &str,
        method: SearchMethod,
        limit: usize,
    ) -> Vec<RetrievedDocument> {
        let cached = self
            .embedder
            .as_deref()
            .map(|inner| CachedEmbedder::new(&self.cache, inner));
        let ctx = SearchContext {
            embedder: cached.as_ref().map(|e| e as &dyn EmbeddingProvider),
            graph: self.graph.as_ref(),
            annotations: Some(&self.annotations),
        };
        self.retriever.search(query, method, limit, &ctx).await
    }

    /// 소스 기반 질문 응답 (`[n]` 인용 포함)
    pub async fn ask(&self, question: &str) -> AskResponse {
        let Some(completion) = self.completion.as_deref() else {
            return AskResponse::failed(NO_PROVIDER_ERROR, Vec::new());
        };

        let method = if self.embedder.is_some() {
            SearchMethod::Hybrid
        } else {
            SearchMethod::Keyword
        };
        let results = self
            .query(question, method, self.config.retrieval.top_k)
            .await;

        if results.is_empty() {
            return AskResponse {
                answer: Some(NO_SOURCES_ANSWER.to_string()),
                sources: Vec::new(),
                model: None,
                error: None,
            };
        }

        let sources: Vec<SourceRef> = results
            .iter()
            .map(|r| SourceRef {
                title: r.title.clone(),
                path: r.path.clone(),
                score: r.score,
            })
            .collect();

        let request = CompletionRequest::new(ASK_SYSTEM_PROMPT, self.ask_prompt(question, &results))
            .temperature(0.3);

        match completion.complete(&request).await {
            Ok(answer) => {
                tracing::info!("Answered with {} sources", sources.len());
                AskResponse {
                    answer: Some(answer),
                    sources,
                    model: Some(completion.name().to_string()),
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!("Answer generation failed: {:#}", e);
                AskResponse::failed(format!("Error generating response: {:#}", e), sources)
            }
        }
    }

    fn ask_prompt(&self, question: &str, results: &[RetrievedDocument]) -> String {
        let mut context = Vec::new();
        for (i, result) in results.iter().enumerate() {
            let text = self
                .documents()
                .get(result.index)
                .map(|d| truncate_at_boundary(&d.text, ASK_CONTEXT_BYTES))
                .unwrap_or(result.snippet.as_str());
            context.push(format!("\n[Source {}: {}]", i + 1, result.title));
            context.push(format!("Path: {}", result.path));
            context.push(format!("\n{}\n", text));
            context.push("-".repeat(80));
        }

        format!(
            "Sources:\n{}\n\nQuestion: {}\n\nProvide a comprehensive answer using only the information from the sources above. Include citations [1], [2], etc. for each fact.",
            context.join("\n"),
            question
        )
    }

    // ------------------------------------------------------------------------
    // Stats
    // ------------------------------------------------------------------------

    pub fn stats(&self) -> CorpusStats {
        let documents = self.documents();
        let total_characters: usize = documents.iter().map(|d| d.text.chars().count()).sum();
        let total_sections = documents.iter().map(|d| count_sections(&d.text)).sum();

        CorpusStats {
            num_documents: documents.len(),
            total_characters,
            total_sections,
            avg_doc_length: total_characters.checked_div(documents.len()).unwrap_or(0),
        }
    }
}

/// 마크다운 헤딩으로 나뉜 섹션 수 (헤딩 앞 본문도 한 섹션)
fn count_sections(text: &str) -> usize {
    let mut sections = 0;
    let mut has_content = false;
    for line in text.lines() {
        if line.starts_with('#') && line.trim_start_matches('#').starts_with(' ') {
            if has_content {
                sections += 1;
            }
            has_content = false;
        } else if !line.trim().is_empty() {
            has_content = true;
        }
    }
    if has_content {
        sections += 1;
    }
    sections
}

// ============================================================================
// Tests
// ============================================================================
