//! 소스 탐색 모듈
//!
//! 검색 쿼리를 여러 문헌 API에 보내 후보를 모으고,
//! 1. 기존 소스와 중복(정확한 URL 또는 제목 퍼지 매칭)을 제거한 뒤
//! 2. 시맨틱 필터(도메인 관련성 / 다양성)를 통과한 후보만 채택합니다.
//!
//! 채택 수가 `min_new_sources`에 못 미치면 LLM으로 새 쿼리를 만들어
//! `max_iterations`까지 반복합니다.
//!
//! 기존 소스가 하나도 없으면 도메인 임베딩을 만들 수 없어 관련성 검사가
//! 사실상 꺼집니다. 이 경우 경고만 남기고 모든 후보를 관련성 검사 없이 통과시킵니다.

pub mod sources;

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Serialize;

use crate::completion::{CompletionProvider, CompletionRequest};
use crate::config::DiscoveryConfig;
use crate::embedding::EmbeddingProvider;
use crate::knowledge::{cosine_similarity, mean_embedding, VectorIndex};
use crate::loader::Document;

pub use sources::create_sources;

/// API 호출 간 딜레이
const REQUEST_DELAY: Duration = Duration::from_millis(500);
/// 임베딩에 사용하는 스니펫 / 본문 길이 (문자)
const EMBED_SNIPPET_CHARS: usize = 200;
/// 기존 소스 본문 미리보기 길이 (문자)
const EXISTING_CONTENT_CHARS: usize = 500;
/// 반복당 추가 쿼리 수
const EXPANSION_QUERIES: usize = 3;
/// 확장 프롬프트에 넣는 쿼리별 제목 수 / 전체 제목 수
const EXPANSION_TITLES_PER_QUERY: usize = 3;
const EXPANSION_TITLES_MAX: usize = 10;

const EXPANSION_SYSTEM_PROMPT: &str =
    "You are a research query expert. Generate diverse search queries.";

// ============================================================================
// Types
// ============================================================================

/// 문헌 API 검색 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// API 이름
    pub source: String,
}

impl Candidate {
    /// 임베딩 입력: `"title. snippet[:200]"`
    pub fn embedding_text(&self) -> String {
        format!("{}. {}", self.title, take_chars(&self.snippet, EMBED_SNIPPET_CHARS))
    }
}

/// 문헌 검색 API
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Candidate>>;
}

/// 코퍼스에 이미 있는 소스 (중복 검사 / 도메인 임베딩용)
#[derive(Debug, Clone)]
pub struct ExistingSource {
    pub title: String,
    pub url: Option<String>,
    /// 공백 정리된 본문 앞부분
    pub content: String,
}

impl ExistingSource {
    pub fn from_document(doc: &Document) -> Self {
        let cleaned: String = doc
            .text
            .split_whitespace()
            .filter(|word| !word.chars().all(|c| c == '#'))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            title: doc.title.clone(),
            url: doc.front_matter.text("url").map(str::to_string),
            content: take_chars(&cleaned, EXISTING_CONTENT_CHARS),
        }
    }

    fn embedding_text(&self) -> String {
        format!("{}. {}", self.title, take_chars(&self.content, EMBED_SNIPPET_CHARS))
    }
}

/// 채택된 후보
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredSource {
    pub query: String,
    pub candidate: Candidate,
    /// 도메인 유사도 (필터 미사용 / 퇴화 시 None)
    pub domain_similarity: Option<f32>,
}

/// 탐색 실행 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterOutcome {
    pub accepted: Vec<DiscoveredSource>,
    pub duplicates: usize,
    /// 시맨틱 필터에서 거절된 수
    pub rejected: usize,
    /// 실패한 API 호출 수
    pub failed_calls: usize,
    /// 기존 소스가 없어 도메인 관련성 검사가 꺼졌는지
    pub degenerate: bool,
    /// 시맨틱 필터 적용 여부
    pub semantic_filter: bool,
    /// 실행한 반복 수
    pub iterations: usize,
    /// 실행한 쿼리 (확장 쿼리 포함, 실행 순서)
    pub queries: Vec<String>,
}

// ============================================================================
// Duplicate Detection
// ============================================================================

/// 제목 유사도 (0 ~ 100)
///
/// 삽입/삭제 편집 거리 기반: `2 × LCS / (len(a) + len(b)) × 100`.
pub fn fuzzy_ratio(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }

    // 최장 공통 부분 수열 (두 행 DP)
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let lcs = prev[b.len()];

    (2 * lcs) as f32 / total as f32 * 100.0
}

/// 기존 소스 + 이번 실행에서 채택한 후보 대비 중복 검사
pub struct Deduplicator {
    titles: Vec<String>,
    urls: HashSet<String>,
    threshold: f32,
}

impl Deduplicator {
    pub fn new(existing: &[ExistingSource], threshold: u8) -> Self {
        Self {
            titles: existing.iter().map(|s| s.title.to_lowercase()).collect(),
            urls: existing.iter().filter_map(|s| s.url.clone()).collect(),
            threshold: f32::from(threshold),
        }
    }

    /// 중복이면 사유 반환
    pub fn check(&self, candidate: &Candidate) -> Option<String> {
        if self.urls.contains(&candidate.url) {
            return Some(format!("Exact URL match: {}", candidate.url));
        }
        let title = candidate.title.to_lowercase();
        self.titles.iter().find_map(|existing| {
            let ratio = fuzzy_ratio(&title, existing);
            (ratio >= self.threshold)
                .then(|| format!("Title similarity {:.0}% with: {}", ratio, existing))
        })
    }

    pub fn remember(&mut self, candidate: &Candidate) {
        self.titles.push(candidate.title.to_lowercase());
        self.urls.insert(candidate.url.clone());
    }
}

// ============================================================================
// Semantic Filter
// ============================================================================

/// 후보 판정
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept { domain_similarity: Option<f32> },
    Reject(String),
}

/// 도메인 관련성 + 다양성 필터
pub struct SemanticFilter<'a> {
    embedder: &'a dyn EmbeddingProvider,
    domain: Option<Vec<f32>>,
    accepted: VectorIndex,
    domain_threshold: f32,
    diversity_threshold: f32,
}

impl<'a> SemanticFilter<'a> {
    /// 기존 소스(최대 `domain_sample`개)의 평균 임베딩으로 도메인 구성
    pub async fn new(
        embedder: &'a dyn EmbeddingProvider,
        existing: &[ExistingSource],
        config: &DiscoveryConfig,
    ) -> Self {
        let texts: Vec<String> = existing
            .iter()
            .take(config.domain_sample)
            .map(ExistingSource::embedding_text)
            .collect();

        let domain = if texts.is_empty() {
            tracing::warn!(
                "No existing sources for domain embedding; relevance filter is degenerate and will accept all candidates"
            );
            None
        } else {
            match embedder.embed_batch(&texts).await {
                Ok(vectors) => {
                    tracing::info!("Domain embedding computed from {} sources", vectors.len());
                    mean_embedding(&vectors)
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to embed existing sources: {:#}; relevance filter is degenerate",
                        e
                    );
                    None
                }
            }
        };

        Self {
            embedder,
            domain,
            accepted: VectorIndex::new(),
            domain_threshold: config.domain_threshold,
            diversity_threshold: config.diversity_threshold,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.domain.is_none()
    }

    /// 후보 판정. 채택되면 이후 다양성 검사 대상에 추가됩니다.
    pub async fn evaluate(&mut self, candidate: &Candidate) -> Verdict {
        let vector = match self.embedder.embed(&candidate.embedding_text()).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Failed to embed candidate '{}': {:#}", candidate.title, e);
                return Verdict::Accept {
                    domain_similarity: None,
                };
            }
        };

        let domain_similarity = self.domain.as_deref().map(|d| cosine_similarity(&vector, d));
        if let Some(similarity) = domain_similarity {
            if similarity < self.domain_threshold {
                return Verdict::Reject(format!(
                    "Low domain relevance: {:.2} < {}",
                    similarity, self.domain_threshold
                ));
            }
        }

        if let Some(max) = self.accepted.max_similarity(&vector) {
            if max > self.diversity_threshold {
                return Verdict::Reject(format!(
                    "Too similar to an accepted candidate: {:.2} > {}",
                    max, self.diversity_threshold
                ));
            }
        }

        self.accepted.push(vector);
        Verdict::Accept { domain_similarity }
    }
}

// ============================================================================
// Discovery
// ============================================================================

/// 쿼리 → API 검색 → 중복 제거 → 시맨틱 필터
pub struct Discovery<'a> {
    sources: Vec<Box<dyn LiteratureSource>>,
    embedder: Option<&'a dyn EmbeddingProvider>,
    completion: Option<&'a dyn CompletionProvider>,
    config: &'a DiscoveryConfig,
    delay: Duration,
}

impl<'a> Discovery<'a> {
    pub fn new(sources: Vec<Box<dyn LiteratureSource>>, config: &'a DiscoveryConfig) -> Self {
        Self {
            sources,
            embedder: None,
            completion: None,
            config,
            delay: REQUEST_DELAY,
        }
    }

    pub fn with_embedder(mut self, embedder: &'a dyn EmbeddingProvider) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// 쿼리 확장에 사용할 LLM
    pub fn with_completion(mut self, completion: &'a dyn CompletionProvider) -> Self {
        self.completion = Some(completion);
        self
    }

    /// API 호출 간 딜레이
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 모든 쿼리를 순차 실행
    pub async fn run(&self, queries: &[String], existing: &[ExistingSource]) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();
        let mut dedup = Deduplicator::new(existing, self.config.title_similarity);

        let mut filter = match (self.config.semantic_filter, self.embedder) {
            (true, Some(embedder)) => Some(SemanticFilter::new(embedder, existing, self.config).await),
            (true, None) => {
                tracing::warn!("No embedding provider, skipping semantic filter");
                None
            }
            (false, _) => None,
        };
        outcome.semantic_filter = filter.is_some();
        outcome.degenerate = filter.as_ref().is_some_and(SemanticFilter::is_degenerate);

        let mut pending: Vec<String> = queries.to_vec();
        while !pending.is_empty() && outcome.iterations < self.config.max_iterations {
            outcome.iterations += 1;
            tracing::info!(
                "Discovery iteration {}/{} ({} queries)",
                outcome.iterations,
                self.config.max_iterations,
                pending.len()
            );

            for query in std::mem::take(&mut pending) {
                self.search_query(&query, &mut dedup, filter.as_mut(), &mut outcome)
                    .await;
                outcome.queries.push(query);
            }

            if outcome.accepted.len() >= self.config.min_new_sources {
                tracing::info!(
                    "Found {} sources (>= {}), stopping",
                    outcome.accepted.len(),
                    self.config.min_new_sources
                );
                break;
            }
            if outcome.iterations >= self.config.max_iterations {
                break;
            }

            pending = self.expand_queries(queries, &outcome).await;
        }

        tracing::info!(
            "Discovery finished: {} accepted, {} duplicates, {} filtered, {} failed calls",
            outcome.accepted.len(),
            outcome.duplicates,
            outcome.rejected,
            outcome.failed_calls
        );
        outcome
    }

    /// 한 쿼리 검색 결과를 중복 제거 / 필터 후 채택
    async fn search_query(
        &self,
        query: &str,
        dedup: &mut Deduplicator,
        mut filter: Option<&mut SemanticFilter<'_>>,
        outcome: &mut FilterOutcome,
    ) {
        tracing::info!("Searching: {}", query);
        for candidate in self.search_all(query, &mut outcome.failed_calls).await {
            if let Some(reason) = dedup.check(&candidate) {
                tracing::debug!("Skipped duplicate '{}': {}", candidate.title, reason);
                outcome.duplicates += 1;
                continue;
            }

            let domain_similarity = match filter.as_deref_mut() {
                Some(filter) => match filter.evaluate(&candidate).await {
                    Verdict::Accept { domain_similarity } => domain_similarity,
                    Verdict::Reject(reason) => {
                        tracing::debug!("Filtered '{}': {}", candidate.title, reason);
                        outcome.rejected += 1;
                        continue;
                    }
                },
                None => None,
            };

            tracing::debug!("Accepted '{}'", candidate.title);
            dedup.remember(&candidate);
            outcome.accepted.push(DiscoveredSource {
                query: query.to_string(),
                candidate,
                domain_similarity,
            });
        }
    }

    /// 원래 쿼리와 지금까지 찾은 제목으로 새 쿼리 생성
    ///
    /// LLM이 없거나 실패하면 빈 목록을 돌려 반복을 끝냅니다.
    /// 이미 실행한 쿼리는 제외합니다.
    async fn expand_queries(&self, original: &[String], outcome: &FilterOutcome) -> Vec<String> {
        let Some(completion) = self.completion else {
            tracing::info!("No completion provider, skipping query expansion");
            return Vec::new();
        };

        let titles = sample_titles(original, &outcome.accepted);
        let request =
            CompletionRequest::new(EXPANSION_SYSTEM_PROMPT, expansion_prompt(original, &titles))
                .temperature(0.7);

        let reply = match completion.complete(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Query expansion failed: {:#}", e);
                return Vec::new();
            }
        };

        let seen: HashSet<String> = outcome.queries.iter().map(|q| q.to_lowercase()).collect();
        let queries: Vec<String> = parse_expansion(&reply)
            .into_iter()
            .filter(|q| !seen.contains(&q.to_lowercase()))
            .take(EXPANSION_QUERIES)
            .collect();
        tracing::info!("Generated {} additional queries", queries.len());
        queries
    }

    /// 한 쿼리를 모든 소스에 순차 전송 (실패는 로그 후 건너뜀)
    async fn search_all(&self, query: &str, failed: &mut usize) -> Vec<Candidate> {
        let mut results = Vec::new();
        for (i, source) in self.sources.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match source.search(query, self.config.max_per_source).await {
                Ok(found) => {
                    tracing::debug!("{}: {} results", source.name(), found.len());
                    results.extend(found);
                }
                Err(e) => {
                    tracing::warn!("{} search failed: {:#}", source.name(), e);
                    *failed += 1;
                }
            }
        }
        results
    }
}

// ============================================================================
// Query Expansion
// ============================================================================

/// 원래 쿼리별 상위 제목 (쿼리당 3개, 최대 10개)
fn sample_titles(original: &[String], accepted: &[DiscoveredSource]) -> Vec<String> {
    let mut titles = Vec::new();
    for query in original {
        titles.extend(
            accepted
                .iter()
                .filter(|a| &a.query == query)
                .take(EXPANSION_TITLES_PER_QUERY)
                .map(|a| a.candidate.title.clone()),
        );
    }
    titles.truncate(EXPANSION_TITLES_MAX);
    titles
}

fn expansion_prompt(original: &[String], titles: &[String]) -> String {
    let queries = original
        .iter()
        .map(|q| format!("- {}", q))
        .collect::<Vec<_>>()
        .join("\n");
    let found = if titles.is_empty() {
        "(none yet)".to_string()
    } else {
        titles
            .iter()
            .map(|t| format!("- {}", t))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Based on these original research queries:\n{queries}\n\n\
         And these articles we found:\n{found}\n\n\
         Generate {n} NEW search queries that are:\n\
         1. Related to the same research domain but with different angles\n\
         2. More specific or explore sub-topics\n\
         3. Different enough to find NEW articles (not duplicates)\n\
         4. Focused on practical applications, case studies, or technical implementations\n\n\
         Return only the queries, one per line, without numbering.",
        n = EXPANSION_QUERIES
    )
}

/// 한 줄에 하나씩, 글머리표 / 번호 제거
fn parse_expansion(reply: &str) -> Vec<String> {
    reply
        .lines()
        .map(|line| {
            let line = line.trim().trim_start_matches(['-', '*', '•']).trim_start();
            let digits = line.trim_start_matches(|c: char| c.is_ascii_digit());
            let line = match digits.strip_prefix(['.', ')']) {
                Some(rest) if digits.len() < line.len() => rest.trim_start(),
                _ => line,
            };
            line.trim_matches('"').trim().to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

// ============================================================================
// URL List
// ============================================================================

/// 검토용 URL 목록 (쿼리별 그룹)
pub fn render_url_list(accepted: &[DiscoveredSource], generated: DateTime<Local>) -> String {
    let mut lines = vec![
        "# Automatically Discovered Source URLs".to_string(),
        format!("# Generated: {}", generated.format("%Y-%m-%d %H:%M:%S")),
        format!("# Total URLs: {}", accepted.len()),
        "#".to_string(),
        "# Instructions:".to_string(),
        "#   1. Review URLs below".to_string(),
        "#   2. Remove irrelevant URLs (delete lines)".to_string(),
        "#   3. Save the remaining sources into data/sources/ and run: pkm-rag build".to_string(),
        "#".to_string(),
        String::new(),
    ];

    let mut current_query: Option<&str> = None;
    for item in accepted {
        if current_query != Some(item.query.as_str()) {
            lines.push(String::new());
            lines.push(format!("# Query: {}", item.query));
            lines.push("#".to_string());
            current_query = Some(item.query.as_str());
        }
        lines.push(format!("# [{}] {}", item.candidate.source, item.candidate.title));
        lines.push(item.candidate.url.clone());
        lines.push(String::new());
    }

    lines.join("\n")
}

pub fn save_url_list(path: &Path, accepted: &[DiscoveredSource]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    std::fs::write(path, render_url_list(accepted, Local::now()))
        .with_context(|| format!("Failed to write {:?}", path))?;
    tracing::info!("Saved {} URLs to {:?}", accepted.len(), path);
    Ok(())
}

fn take_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::mock::ScriptedCompletion;
    use crate::embedding::mock::HashEmbedder;
    use tempfile::TempDir;

    struct StubSource {
        name: &'static str,
        results: Vec<Candidate>,
    }

    #[async_trait]
    impl LiteratureSource for StubSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<Candidate>> {
            Ok(self.results.iter().take(max_results).cloned().collect())
        }
    }

    /// 쿼리마다 다른 후보를 돌려주는 소스
    struct QuerySource;

    #[async_trait]
    impl LiteratureSource for QuerySource {
        fn name(&self) -> &str {
            "query"
        }

        async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Candidate>> {
            Ok((0..max_results)
                .map(|i| {
                    let slug = query.replace(' ', "-");
                    candidate(
                        &format!("{} result {}", query, i),
                        &format!("https://example.org/{}/{}", slug, i),
                        "",
                    )
                })
                .collect())
        }
    }

    fn query_sources() -> Vec<Box<dyn LiteratureSource>> {
        vec![Box::new(QuerySource)]
    }

    fn iteration_config(max_iterations: usize, min_new_sources: usize) -> DiscoveryConfig {
        DiscoveryConfig {
            semantic_filter: false,
            max_per_source: 2,
            title_similarity: 100,
            max_iterations,
            min_new_sources,
            ..Default::default()
        }
    }

    struct FailingSource;

    #[async_trait]
    impl LiteratureSource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<Candidate>> {
            anyhow::bail!("HTTP 503")
        }
    }

    fn candidate(title: &str, url: &str, snippet: &str) -> Candidate {
        Candidate {
            title: title.to_string(),
            url: url.to_string(),
            snippet: snippet.to_string(),
            source: "stub".to_string(),
        }
    }

    fn existing(title: &str, url: Option<&str>, content: &str) -> ExistingSource {
        ExistingSource {
            title: title.to_string(),
            url: url.map(str::to_string),
            content: content.to_string(),
        }
    }

    fn unrelated() -> Vec<Candidate> {
        vec![
            candidate(
                "Dark Energy Survey",
                "https://example.org/astro",
                "galaxy redshift cosmology telescope",
            ),
            candidate(
                "Protein Folding Dynamics",
                "https://example.org/bio",
                "molecular chains enzymes cells",
            ),
        ]
    }

    #[test]
    fn test_fuzzy_ratio() {
        assert_eq!(fuzzy_ratio("", ""), 100.0);
        assert_eq!(fuzzy_ratio("abc", "abc"), 100.0);
        assert_eq!(fuzzy_ratio("abc", "xyz"), 0.0);
        // LCS("this is a test", "this is a test!") = 14 → 28/29
        let ratio = fuzzy_ratio("this is a test", "this is a test!");
        assert!((ratio - 96.55).abs() < 0.01);
    }

    #[test]
    fn test_deduplicator() {
        let mut dedup = Deduplicator::new(
            &[existing("Linked Data Quality", Some("https://example.org/ldq"), "")],
            85,
        );

        let exact = candidate("Something Else", "https://example.org/ldq", "");
        assert!(dedup.check(&exact).unwrap().starts_with("Exact URL match"));

        let fuzzy = candidate("Linked data quality.", "https://other.org/1", "");
        assert!(dedup.check(&fuzzy).unwrap().starts_with("Title similarity"));

        let fresh = candidate("Ontology Alignment Survey", "https://other.org/2", "");
        assert!(dedup.check(&fresh).is_none());
        dedup.remember(&fresh);
        assert!(dedup.check(&fresh).is_some());
    }

    #[test]
    fn test_existing_source_from_document() {
        let dir = TempDir::new().unwrap();
        let doc = Document {
            id: "Note".to_string(),
            title: "Note".to_string(),
            text: "# Note\n\nSome   body\ntext.".to_string(),
            path: "note.md".to_string(),
            source_path: dir.path().join("note.md"),
            format: crate::collector::FileType::Markdown,
            front_matter: crate::loader::frontmatter::split("---\nurl: https://example.org/n\n---\n").0,
        };

        let source = ExistingSource::from_document(&doc);
        assert_eq!(source.content, "Note Some body text.");
        assert_eq!(source.url.as_deref(), Some("https://example.org/n"));
    }

    #[tokio::test]
    async fn test_filter_rejects_off_domain_and_near_duplicates() {
        let embedder = HashEmbedder::new(256);
        let config = DiscoveryConfig::default();
        let corpus = vec![
            existing("RDF Graphs", None, "rdf triples graph linked data semantic web"),
            existing("SPARQL Queries", None, "sparql query rdf graph linked data"),
        ];
        let mut filter = SemanticFilter::new(&embedder, &corpus, &config).await;
        assert!(!filter.is_degenerate());

        let on_topic = candidate(
            "Linked Data Graphs",
            "https://example.org/a",
            "rdf graph linked data semantic web triples",
        );
        assert!(matches!(
            filter.evaluate(&on_topic).await,
            Verdict::Accept { domain_similarity: Some(s) } if s >= 0.35
        ));

        // 같은 텍스트는 다양성 검사에서 거절
        assert!(matches!(filter.evaluate(&on_topic).await, Verdict::Reject(_)));

        for off_topic in unrelated() {
            assert!(matches!(filter.evaluate(&off_topic).await, Verdict::Reject(_)));
        }
    }

    #[tokio::test]
    async fn test_empty_corpus_accepts_unrelated_candidates() {
        let embedder = HashEmbedder::new(256);
        let config = DiscoveryConfig::default();
        let sources: Vec<Box<dyn LiteratureSource>> = vec![Box::new(StubSource {
            name: "stub",
            results: unrelated(),
        })];
        let discovery = Discovery::new(sources, &config)
            .with_embedder(&embedder)
            .with_delay(Duration::ZERO);

        let outcome = discovery
            .run(&["knowledge graphs".to_string()], &[])
            .await;

        assert!(outcome.semantic_filter);
        assert!(outcome.degenerate);
        assert_eq!(outcome.accepted.len(), 2);
        assert!(outcome.accepted.iter().all(|a| a.domain_similarity.is_none()));
    }

    #[tokio::test]
    async fn test_run_skips_failed_sources_and_duplicates() {
        let config = DiscoveryConfig {
            semantic_filter: false,
            ..Default::default()
        };
        let results = vec![
            candidate("Graph Notes", "https://example.org/dup", ""),
            candidate("Ontology Design Patterns", "https://example.org/odp", ""),
            candidate("Ontology Design Patterns", "https://example.org/odp", ""),
        ];
        let sources: Vec<Box<dyn LiteratureSource>> = vec![
            Box::new(FailingSource),
            Box::new(StubSource {
                name: "stub",
                results,
            }),
        ];
        let discovery = Discovery::new(sources, &config).with_delay(Duration::ZERO);

        let outcome = discovery
            .run(
                &["ontology design".to_string()],
                &[existing("Graph Notes", None, "")],
            )
            .await;

        assert_eq!(outcome.failed_calls, 1);
        assert_eq!(outcome.duplicates, 2);
        assert_eq!(outcome.accepted.len(), 1);
        assert!(!outcome.semantic_filter);
        assert!(!outcome.degenerate);
    }

    #[tokio::test]
    async fn test_expands_queries_until_enough_sources() {
        let config = iteration_config(3, 5);
        let completion =
            ScriptedCompletion::new(["1. linked data tooling\n- RDF\nontology case studies\n"]);
        let discovery = Discovery::new(query_sources(), &config)
            .with_completion(&completion)
            .with_delay(Duration::ZERO);

        let outcome = discovery.run(&["rdf".to_string()], &[]).await;

        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.accepted.len(), 6);
        assert_eq!(
            outcome.queries,
            vec!["rdf", "linked data tooling", "ontology case studies"]
        );
        assert_eq!(completion.calls(), 1);
        let prompt = &completion.prompts()[0];
        assert!(prompt.contains("- rdf"));
        assert!(prompt.contains("- rdf result 0"));
    }

    #[tokio::test]
    async fn test_expansion_stops_at_max_iterations() {
        let config = iteration_config(2, 100);
        let completion = ScriptedCompletion::new(["graph embeddings", "never used"]);
        let discovery = Discovery::new(query_sources(), &config)
            .with_completion(&completion)
            .with_delay(Duration::ZERO);

        let outcome = discovery.run(&["rdf".to_string()], &[]).await;

        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.queries, vec!["rdf", "graph embeddings"]);
        assert_eq!(outcome.accepted.len(), 4);
        assert_eq!(completion.calls(), 1);
    }

    #[tokio::test]
    async fn test_single_iteration_without_expansion() {
        let config = iteration_config(3, 100);

        let discovery = Discovery::new(query_sources(), &config)
            .with_delay(Duration::ZERO);
        let outcome = discovery.run(&["rdf".to_string()], &[]).await;
        assert_eq!(outcome.iterations, 1);

        let completion = ScriptedCompletion::failing();
        let discovery = Discovery::new(query_sources(), &config)
            .with_completion(&completion)
            .with_delay(Duration::ZERO);
        let outcome = discovery.run(&["rdf".to_string()], &[]).await;
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(completion.calls(), 1);
    }

    #[test]
    fn test_parse_expansion() {
        let reply = "1. Knowledge graph QA\n2) ontology matching\n\n- \"SPARQL federation\"\n* 2024 RDF benchmarks\n";
        assert_eq!(
            parse_expansion(reply),
            vec![
                "Knowledge graph QA",
                "ontology matching",
                "SPARQL federation",
                "2024 RDF benchmarks"
            ]
        );
    }

    #[test]
    fn test_sample_titles_per_query() {
        let found = |query: &str, title: &str| DiscoveredSource {
            query: query.to_string(),
            candidate: candidate(title, "https://x.org", ""),
            domain_similarity: None,
        };
        let accepted = vec![
            found("q1", "a"),
            found("q1", "b"),
            found("q1", "c"),
            found("q1", "d"),
            found("q2", "e"),
            found("expanded", "f"),
        ];
        let titles = sample_titles(&["q1".to_string(), "q2".to_string()], &accepted);
        assert_eq!(titles, vec!["a", "b", "c", "e"]);
    }

    #[test]
    fn test_url_list_groups_by_query() {
        use chrono::TimeZone;

        let accepted = vec![
            DiscoveredSource {
                query: "q1".to_string(),
                candidate: candidate("A", "https://a.org", ""),
                domain_similarity: None,
            },
            DiscoveredSource {
                query: "q1".to_string(),
                candidate: candidate("B", "https://b.org", ""),
                domain_similarity: Some(0.5),
            },
            DiscoveredSource {
                query: "q2".to_string(),
                candidate: candidate("C", "https://c.org", ""),
                domain_similarity: None,
            },
        ];
        let when = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let text = render_url_list(&accepted, when);

        assert!(text.contains("# Total URLs: 3"));
        assert_eq!(text.matches("# Query: q1").count(), 1);
        assert!(text.contains("# [stub] B\nhttps://b.org\n"));
        let urls: Vec<&str> = text.lines().filter(|l| l.starts_with("https://")).collect();
        assert_eq!(urls, vec!["https://a.org", "https://b.org", "https://c.org"]);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("discovered_urls.txt");
        save_url_list(&path, &accepted).unwrap();
        assert!(path.exists());
    }
}
