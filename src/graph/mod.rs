//! RDF 지식 그래프 모듈
//!
//! 문서 → 청크 → 개념 → 토픽의 계층 구조를 RDF 트리플로 표현합니다.
//!
//! ## 구성
//! - `Graph`: oxigraph 인메모리 그래프 래퍼 (중복 제거, 인덱스 조회)
//! - `vocab`: 네임스페이스 / 클래스 / 프로퍼티 IRI
//! - `builder`: 문서 집합에서 그래프 생성
//! - `clustering`: 개념 → 토픽 그룹화
//! - `turtle`: Turtle 직렬화 / 파싱
//! - `sparql`: SPARQL 질의
//! - `export`: 헤더 포함 내보내기, 그래프 스키마
//! - `ontology`: 사용자 도메인 온톨로지 로드

pub mod builder;
pub mod clustering;
pub mod export;
pub mod ontology;
pub mod sparql;
pub mod turtle;
pub mod vocab;

use std::sync::LazyLock;

use oxigraph::model::vocab::xsd;
use oxigraph::model::{
    Graph as TripleSet, NamedNode, NamedNodeRef, SubjectRef, TermRef, TripleRef,
};
use regex::Regex;
use serde::Serialize;

pub use builder::{BuildOutput, GraphBuilder};
pub use clustering::{NaiveBatchClustering, TopicClustering};
pub use ontology::{Ontology, OntologyClass, OntologyProperty};
pub use oxigraph::model::{Literal, Term, Triple};

// ============================================================================
// Terms
// ============================================================================

/// IRI 노드
///
/// 어휘 상수와 `sanitize_local`로 만든 로컬 이름처럼 이미 유효한 IRI에만 사용합니다.
/// 외부 입력은 `checked_iri`를 사용합니다.
pub fn iri(value: impl Into<String>) -> Term {
    NamedNode::new_unchecked(value).into()
}

/// 검증된 IRI 노드 (유효하지 않으면 None)
pub fn checked_iri(value: impl Into<String>) -> Option<Term> {
    match NamedNode::new(value) {
        Ok(node) => Some(node.into()),
        Err(e) => {
            tracing::warn!("Skipping invalid IRI: {}", e);
            None
        }
    }
}

/// 평문 리터럴
pub fn literal(value: impl Into<String>) -> Term {
    Literal::new_simple_literal(value).into()
}

/// xsd:integer 리터럴
pub fn integer(value: usize) -> Term {
    Literal::new_typed_literal(value.to_string(), xsd::INTEGER).into()
}

/// 리터럴 값 또는 IRI 문자열 (빈 노드는 빈 문자열)
pub fn term_value(term: &Term) -> &str {
    match term {
        Term::NamedNode(node) => node.as_str(),
        Term::Literal(literal) => literal.value(),
        _ => "",
    }
}

fn subject_ref(term: &Term) -> Option<SubjectRef<'_>> {
    match term {
        Term::NamedNode(node) => Some(node.as_ref().into()),
        Term::BlankNode(node) => Some(node.as_ref().into()),
        _ => None,
    }
}

/// 결과 순서 고정 (N-Triples 표기 기준)
fn sorted(mut terms: Vec<Term>) -> Vec<Term> {
    terms.sort_by_cached_key(ToString::to_string);
    terms
}

// ============================================================================
// Graph
// ============================================================================

/// 메모리 트리플 저장소
///
/// 트리플은 집합으로 취급되며(중복 무시), 조회 결과는 IRI 순으로 정렬됩니다.
#[derive(Debug, Default, Clone)]
pub struct Graph {
    inner: TripleSet,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 트리플 추가 (새로 추가되면 true, 리터럴 주어는 무시)
    pub fn add(&mut self, subject: Term, predicate: &str, object: Term) -> bool {
        let Some(subject) = subject_ref(&subject) else {
            return false;
        };
        self.inner.insert(TripleRef::new(
            subject,
            NamedNodeRef::new_unchecked(predicate),
            object.as_ref(),
        ))
    }

    pub fn insert(&mut self, triple: &Triple) -> bool {
        self.inner.insert(triple)
    }

    pub fn contains(&self, subject: &Term, predicate: &str, object: &Term) -> bool {
        let Some(subject) = subject_ref(subject) else {
            return false;
        };
        self.inner.contains(TripleRef::new(
            subject,
            NamedNodeRef::new_unchecked(predicate),
            object.as_ref(),
        ))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = TripleRef<'_>> {
        self.inner.iter()
    }

    /// 주어 → 프리디킷(rdf:type 우선) → 목적어 순으로 정렬된 트리플
    pub fn sorted_triples(&self) -> Vec<Triple> {
        let mut triples: Vec<Triple> = self.inner.iter().map(TripleRef::into_owned).collect();
        triples.sort_by_cached_key(|t| {
            (
                t.subject.to_string(),
                t.predicate.as_str() != vocab::RDF_TYPE,
                t.predicate.to_string(),
                t.object.to_string(),
            )
        });
        triples
    }

    /// 트리플 패턴 매칭 (None은 와일드카드)
    pub fn matching(
        &self,
        subject: Option<&Term>,
        predicate: Option<&str>,
        object: Option<&Term>,
    ) -> Vec<Triple> {
        let predicate = predicate.map(NamedNodeRef::new_unchecked);
        let object = object.map(Term::as_ref);

        let candidates: Vec<TripleRef<'_>> = match (subject, predicate) {
            (Some(s), _) => match subject_ref(s) {
                Some(s) => self.inner.triples_for_subject(s).collect(),
                None => return Vec::new(),
            },
            (None, Some(p)) => self.inner.triples_for_predicate(p).collect(),
            (None, None) => self.inner.iter().collect(),
        };

        let mut triples: Vec<Triple> = candidates
            .into_iter()
            .filter(|t| {
                predicate.map_or(true, |p| t.predicate == p) && object.map_or(true, |o| t.object == o)
            })
            .map(TripleRef::into_owned)
            .collect();
        triples.sort_by_cached_key(ToString::to_string);
        triples
    }

    /// 주어진 타입의 주어 목록
    pub fn instances_of(&self, class: &str) -> Vec<Term> {
        self.subjects(vocab::RDF_TYPE, &iri(class))
    }

    /// (subject, predicate, ?) 목적어 목록
    pub fn objects(&self, subject: &Term, predicate: &str) -> Vec<Term> {
        let Some(subject) = subject_ref(subject) else {
            return Vec::new();
        };
        sorted(
            self.inner
                .objects_for_subject_predicate(subject, NamedNodeRef::new_unchecked(predicate))
                .map(TermRef::into_owned)
                .collect(),
        )
    }

    /// (?, predicate, object) 주어 목록
    pub fn subjects(&self, predicate: &str, object: &Term) -> Vec<Term> {
        sorted(
            self.inner
                .subjects_for_predicate_object(NamedNodeRef::new_unchecked(predicate), object.as_ref())
                .map(|s| Term::from(s.into_owned()))
                .collect(),
        )
    }

    /// 첫 번째 리터럴 값 (라벨 조회 등)
    pub fn literal_value<'a>(&'a self, subject: &Term, predicate: &str) -> Option<&'a str> {
        let subject = subject_ref(subject)?;
        let mut values: Vec<&'a str> = self
            .inner
            .objects_for_subject_predicate(subject, NamedNodeRef::new_unchecked(predicate))
            .filter_map(|o| match o {
                TermRef::Literal(literal) => Some(literal.value()),
                _ => None,
            })
            .collect();
        values.sort_unstable();
        values.into_iter().next()
    }

    /// 프리디킷 사용 횟수
    pub fn count_predicate(&self, predicate: &str) -> usize {
        self.inner
            .triples_for_predicate(NamedNodeRef::new_unchecked(predicate))
            .count()
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// 그래프 통계
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphStats {
    pub total_triples: usize,
    pub documents: usize,
    pub chunks: usize,
    pub domain_concepts: usize,
    pub topic_nodes: usize,
    pub tags: usize,
    pub links: usize,
    pub chunk_mentions: usize,
    pub topic_covers_concepts: usize,
    pub topic_covers_chunks: usize,
}

impl GraphStats {
    pub fn from_graph(graph: &Graph) -> Self {
        Self {
            total_triples: graph.len(),
            documents: graph.instances_of(vocab::DOCUMENT).len(),
            chunks: graph.instances_of(vocab::CHUNK).len(),
            domain_concepts: graph.instances_of(vocab::DOMAIN_CONCEPT).len(),
            topic_nodes: graph.instances_of(vocab::TOPIC_NODE).len(),
            tags: graph.instances_of(vocab::TAG).len(),
            links: graph.count_predicate(vocab::LINKS_TO),
            chunk_mentions: graph.count_predicate(vocab::MENTIONS_CONCEPT),
            topic_covers_concepts: graph.count_predicate(vocab::COVERS_CONCEPT),
            topic_covers_chunks: graph.count_predicate(vocab::COVERS_CHUNK),
        }
    }
}

// ============================================================================
// Queries
// ============================================================================

/// 토픽 요약
#[derive(Debug, Clone, Serialize)]
pub struct TopicSummary {
    pub iri: String,
    pub label: String,
    pub concepts: Vec<String>,
    pub chunk_count: usize,
}

/// 개념 요약
#[derive(Debug, Clone, Serialize)]
pub struct ConceptSummary {
    pub iri: String,
    pub label: String,
    pub mention_count: usize,
}

/// 토픽 목록 (구성 개념 라벨 포함)
pub fn list_topics(graph: &Graph) -> Vec<TopicSummary> {
    graph
        .instances_of(vocab::TOPIC_NODE)
        .iter()
        .map(|topic| {
            let concepts = graph
                .objects(topic, vocab::COVERS_CONCEPT)
                .iter()
                .map(|c| label_of(graph, c))
                .collect();
            TopicSummary {
                iri: term_value(topic).to_string(),
                label: label_of(graph, topic),
                concepts,
                chunk_count: graph.objects(topic, vocab::COVERS_CHUNK).len(),
            }
        })
        .collect()
}

/// 개념 목록 (언급 수 내림차순, 동률은 라벨 순)
pub fn list_concepts(graph: &Graph) -> Vec<ConceptSummary> {
    let mut concepts: Vec<ConceptSummary> = graph
        .instances_of(vocab::DOMAIN_CONCEPT)
        .iter()
        .map(|c| ConceptSummary {
            iri: term_value(c).to_string(),
            label: label_of(graph, c),
            mention_count: graph.subjects(vocab::MENTIONS_CONCEPT, c).len(),
        })
        .collect();
    concepts.sort_by(|a, b| {
        b.mention_count
            .cmp(&a.mention_count)
            .then_with(|| a.label.cmp(&b.label))
    });
    concepts
}

/// skos:prefLabel > rdfs:label > IRI 로컬 이름
pub fn label_of(graph: &Graph, term: &Term) -> String {
    graph
        .literal_value(term, vocab::SKOS_PREF_LABEL)
        .or_else(|| graph.literal_value(term, vocab::RDFS_LABEL))
        .map(str::to_string)
        .unwrap_or_else(|| local_name(term_value(term)).to_string())
}

/// IRI의 마지막 세그먼트 ('#' 또는 '/' 이후)
pub fn local_name(iri: &str) -> &str {
    iri.rsplit(['#', '/']).next().unwrap_or(iri)
}

// ============================================================================
// Helper Functions
// ============================================================================

static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("Invalid regex"));
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("Invalid regex"));

/// 텍스트를 IRI 로컬 이름으로 변환
///
/// 단어 문자 / 공백 / 하이픈 외에는 제거하고, 공백은 `_`로 바꿉니다.
pub fn sanitize_local(text: &str) -> String {
    let stripped = NON_WORD_RE.replace_all(text.trim(), "");
    WHITESPACE_RE.replace_all(stripped.trim(), "_").into_owned()
}
