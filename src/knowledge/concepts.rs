//! 개념 추출
//!
//! 두 가지 전략을 제공합니다:
//! - Heuristic: 마크다운 헤딩 + 대문자로 시작하는 2-5 단어 구
//! - OntologyGuided: 도메인 온톨로지를 프롬프트에 넣어 LLM으로 추출,
//!   호출이나 파싱이 실패하면 Heuristic으로 대체
//!
//! 결과는 전략별로 캐시됩니다 (`data/keywords/*.json`).

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cache::{content_hash, Cache};
use crate::completion::{strip_code_fence, CompletionProvider, CompletionRequest};
use crate::config::{ExtractionConfig, ExtractionMode};
use crate::error::PkmError;
use crate::graph::ontology::Ontology;

/// 라벨 최대 길이 (문자)
pub const MAX_LABEL_CHARS: usize = 80;

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+(.+)$").expect("Invalid regex"));
static CAPITALIZED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+){1,4})\b").expect("Invalid regex")
});
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("Invalid regex"));

/// 대문자 구에서 제외할 단어
const STOPWORDS: [&str; 5] = ["the", "this", "that", "with", "from"];

// ============================================================================
// Types
// ============================================================================

/// 추출 전략 (설정 시점에 한 번 결정)
#[derive(Debug, Clone)]
pub enum ConceptStrategy {
    Heuristic,
    OntologyGuided(Ontology),
}

impl ConceptStrategy {
    /// 설정에서 전략 결정 (온톨로지 로드 포함)
    pub fn resolve(config: &ExtractionConfig) -> Result<Self, PkmError> {
        match config.mode() {
            ExtractionMode::Heuristic => Ok(Self::Heuristic),
            ExtractionMode::OntologyGuided(path) => {
                Ok(Self::OntologyGuided(Ontology::load(&path)?))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::OntologyGuided(_) => "ontology",
        }
    }

    pub fn ontology(&self) -> Option<&Ontology> {
        match self {
            Self::OntologyGuided(ontology) => Some(ontology),
            Self::Heuristic => None,
        }
    }

    /// 캐시 키 (온톨로지가 바뀌면 다른 엔트리)
    fn cache_key(&self) -> String {
        match self {
            Self::Heuristic => "heuristic".to_string(),
            Self::OntologyGuided(ontology) => {
                format!("ontology-{}", &content_hash(&ontology.render())[..12])
            }
        }
    }
}

/// 추출된 개념
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedConcept {
    pub label: String,
    /// 매칭된 온톨로지 클래스 IRI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

impl ExtractedConcept {
    fn plain(label: String) -> Self {
        Self { label, class: None }
    }
}

// ============================================================================
// ConceptExtractor
// ============================================================================

/// 청크 단위 개념 추출기
pub struct ConceptExtractor<'a> {
    strategy: &'a ConceptStrategy,
    completion: Option<&'a dyn CompletionProvider>,
    cache: Option<&'a Cache>,
    max_concepts: usize,
}

impl<'a> ConceptExtractor<'a> {
    pub fn new(strategy: &'a ConceptStrategy, max_concepts: usize) -> Self {
        Self {
            strategy,
            completion: None,
            cache: None,
            max_concepts: max_concepts.max(1),
        }
    }

    pub fn with_completion(mut self, completion: &'a dyn CompletionProvider) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn with_cache(mut self, cache: &'a Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// 개념 추출 (실패하지 않음)
    pub async fn extract(&self, text: &str) -> Vec<ExtractedConcept> {
        let key = self.strategy.cache_key();
        if let Some(cached) = self
            .cache
            .and_then(|c| c.get_keywords::<Vec<ExtractedConcept>>(&key, text))
        {
            tracing::debug!("Concept cache hit ({})", key);
            return cached;
        }

        let (concepts, cacheable) = match (self.strategy, self.completion) {
            (ConceptStrategy::OntologyGuided(ontology), Some(completion)) => {
                match self.extract_with_llm(ontology, completion, text).await {
                    Ok(concepts) => (concepts, true),
                    Err(e) => {
                        tracing::warn!("LLM concept extraction failed, using heuristic: {:#}", e);
                        (self.heuristic(text), false)
                    }
                }
            }
            (ConceptStrategy::OntologyGuided(_), None) => {
                tracing::debug!("No completion provider, using heuristic extraction");
                (self.heuristic(text), false)
            }
            (ConceptStrategy::Heuristic, _) => (self.heuristic(text), true),
        };

        // 대체 결과는 캐시하지 않음 (다음 실행에서 다시 시도)
        if cacheable {
            if let Some(cache) = self.cache {
                if let Err(e) = cache.put_keywords(&key, text, &concepts) {
                    tracing::warn!("Failed to cache concepts: {}", e);
                }
            }
        }

        concepts
    }

    fn heuristic(&self, text: &str) -> Vec<ExtractedConcept> {
        extract_heuristic(text, self.max_concepts)
            .into_iter()
            .map(ExtractedConcept::plain)
            .collect()
    }

    async fn extract_with_llm(
        &self,
        ontology: &Ontology,
        completion: &dyn CompletionProvider,
        text: &str,
    ) -> anyhow::Result<Vec<ExtractedConcept>> {
        let request = CompletionRequest::new(
            "You extract domain concepts from text for a knowledge graph. Return only valid JSON.",
            build_prompt(ontology, text, self.max_concepts),
        )
        .temperature(0.2)
        .json();

        let reply = completion.complete(&request).await?;
        let raw = parse_reply(&reply)?;

        let mut seen = HashSet::new();
        let concepts = raw
            .into_iter()
            .filter_map(|(label, class)| {
                let label = normalize_label(&label);
                if label.is_empty() || !seen.insert(label.to_lowercase()) {
                    return None;
                }
                let class = class
                    .and_then(|name| ontology.find_class(&name))
                    .map(|c| c.iri.clone());
                Some(ExtractedConcept { label, class })
            })
            .take(self.max_concepts)
            .collect();
        Ok(concepts)
    }
}

// ============================================================================
// Heuristic Extraction
// ============================================================================

/// 헤딩 + 대문자 구 기반 추출
///
/// 헤딩은 3자 초과이며 "Introduction"이 아니어야 합니다.
/// 대문자 구는 2-5 단어, 한 줄 안, 불용어를 포함하지 않고 5자 초과여야 합니다.
pub fn extract_heuristic(text: &str, max_concepts: usize) -> Vec<String> {
    let headings = HEADING_RE
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().trim().trim_end_matches('#').trim())
        .filter(|h| h.chars().count() > 3 && *h != "Introduction");

    let phrases = CAPITALIZED_RE
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str())
        .filter(|p| {
            !p.split_whitespace()
                .any(|w| STOPWORDS.contains(&w.to_lowercase().as_str()))
        })
        .filter(|p| p.chars().count() > 5);

    let mut seen = HashSet::new();
    headings
        .chain(phrases)
        .map(normalize_label)
        .filter(|label| !label.is_empty() && seen.insert(label.clone()))
        .take(max_concepts)
        .collect()
}

/// 공백 정리 + 80자 제한
pub fn normalize_label(label: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(label.trim(), " ");
    if collapsed.chars().count() <= MAX_LABEL_CHARS {
        return collapsed.into_owned();
    }
    collapsed
        .chars()
        .take(MAX_LABEL_CHARS)
        .collect::<String>()
        .trim_end()
        .to_string()
}

// ============================================================================
// Helper Functions
// ============================================================================

fn build_prompt(ontology: &Ontology, text: &str, max_concepts: usize) -> String {
    format!(
        r#"Extract up to {max} key domain concepts from the text below.
Use the domain ontology to decide what counts as a concept. For each concept,
give its name as it appears in the text and the ontology class it best fits
(use null when none fits).

Domain ontology:
{ontology}
Return JSON in this exact format:
{{"concepts": [{{"label": "concept name", "class": "Class Label"}}]}}

Text:
{text}"#,
        max = max_concepts,
        ontology = ontology.render(),
        text = text,
    )
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawConcept {
    Label(String),
    Labeled {
        #[serde(alias = "name", alias = "concept")]
        label: String,
        #[serde(default, alias = "type")]
        class: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawReply {
    Wrapped { concepts: Vec<RawConcept> },
    Bare(Vec<RawConcept>),
}

/// LLM 응답 → (라벨, 클래스 이름) 목록
fn parse_reply(reply: &str) -> anyhow::Result<Vec<(String, Option<String>)>> {
    let parsed: RawReply = serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| anyhow::anyhow!("Unparseable concept list: {}", e))?;
    let items = match parsed {
        RawReply::Wrapped { concepts } => concepts,
        RawReply::Bare(concepts) => concepts,
    };
    Ok(items
        .into_iter()
        .map(|item| match item {
            RawConcept::Label(label) => (label, None),
            RawConcept::Labeled { label, class } => (label, class),
        })
        .collect())
}

// ============================================================================
// Tests
// ============================================================================
