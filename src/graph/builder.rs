//! 그래프 빌더
//!
//! 문서 집합을 세 계층의 RDF 그래프로 변환합니다:
//! 1. 문서 (메타데이터, 태그, 위키링크)
//! 2. 청크 (텍스트, 순번, 부모 링크) → 개념 (mentionsConcept)
//! 3. 토픽 (coversConcept, coversChunk)
//!
//! 개념은 정규화된 라벨로 병합되며, 모든 개념은 최소 하나의 청크가 언급하고
//! 정확히 하나의 토픽에 속합니다.

use std::collections::HashMap;

use crate::knowledge::{normalize_label, Chunk, Chunker, ConceptExtractor};
use crate::loader::Document;

use super::clustering::{ConceptRef, TopicClustering};
use super::{integer, iri, literal, local_name, sanitize_local, vocab, Graph, GraphStats, Term};

/// 토픽 라벨 최대 길이
const TOPIC_LABEL_MAX: usize = 80;

// ============================================================================
// Types
// ============================================================================

/// 빌드 결과
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub graph: Graph,
    pub chunks: Vec<Chunk>,
    pub stats: GraphStats,
}

/// 병합된 개념 노드
#[derive(Debug, Clone)]
struct ConceptNode {
    iri: Term,
    label: String,
}

/// 빌드 중 상태
#[derive(Default)]
struct BuildState {
    graph: Graph,
    concepts: Vec<ConceptNode>,
    /// 정규화 라벨 → concepts 인덱스
    by_label: HashMap<String, usize>,
    /// 사용 중인 IRI 로컬 이름
    used_locals: HashMap<String, usize>,
}

impl BuildState {
    /// 어휘의 클래스 / 프로퍼티 이름은 개념 IRI로 쓰지 않음
    fn new() -> Self {
        let mut state = Self::default();
        let reserved = [
            vocab::DOCUMENT,
            vocab::CHUNK,
            vocab::DOMAIN_CONCEPT,
            vocab::TOPIC_NODE,
            vocab::TAG,
            vocab::CLASSIFIED_AS,
        ]
        .into_iter()
        .chain(vocab::STRUCTURAL_PREDICATES)
        .filter(|iri| iri.starts_with(vocab::ONTO_NS));
        for iri in reserved {
            state.used_locals.insert(local_name(iri).to_string(), 1);
        }
        state
    }

    /// 온톨로지 네임스페이스의 로컬 이름 확보 (이미 쓰이면 `_N` 접미사)
    fn claim_local(&mut self, base: String) -> String {
        match self.used_locals.get(&base).copied() {
            None => {
                self.used_locals.insert(base.clone(), 1);
                base
            }
            Some(mut n) => loop {
                n += 1;
                let candidate = format!("{}_{}", base, n);
                if !self.used_locals.contains_key(&candidate) {
                    self.used_locals.insert(base, n);
                    self.used_locals.insert(candidate.clone(), 1);
                    break candidate;
                }
            },
        }
    }

    /// 라벨에 해당하는 개념 노드 (없으면 생성)
    fn intern(&mut self, label: &str) -> Option<Term> {
        let label = normalize_label(label);
        if label.is_empty() {
            return None;
        }
        if let Some(&idx) = self.by_label.get(&label) {
            return Some(self.concepts[idx].iri.clone());
        }

        let base = match sanitize_local(&label) {
            local if local.is_empty() => "concept".to_string(),
            local => local,
        };
        let local = self.claim_local(base);

        let concept = iri(vocab::onto(&local));
        self.graph
            .add(concept.clone(), vocab::RDF_TYPE, iri(vocab::DOMAIN_CONCEPT));
        self.graph
            .add(concept.clone(), vocab::SKOS_PREF_LABEL, literal(label.clone()));

        self.by_label.insert(label.clone(), self.concepts.len());
        self.concepts.push(ConceptNode {
            iri: concept.clone(),
            label,
        });
        Some(concept)
    }
}

// ============================================================================
// GraphBuilder
// ============================================================================

/// 문서 → RDF 그래프 빌더
pub struct GraphBuilder<'a> {
    chunker: &'a dyn Chunker,
    extractor: &'a ConceptExtractor<'a>,
    clustering: &'a dyn TopicClustering,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        chunker: &'a dyn Chunker,
        extractor: &'a ConceptExtractor<'a>,
        clustering: &'a dyn TopicClustering,
    ) -> Self {
        Self {
            chunker,
            extractor,
            clustering,
        }
    }

    /// 전체 그래프 생성
    ///
    /// 문서는 입력 순서대로 처리되며, 같은 입력(과 같은 캐시)이면 같은 그래프가 나옵니다.
    pub async fn build(&self, documents: &[Document]) -> BuildOutput {
        let mut state = BuildState::new();
        let mut all_chunks = Vec::new();

        tracing::info!(
            "Building knowledge graph from {} documents (chunker={}, clustering={})",
            documents.len(),
            self.chunker.name(),
            self.clustering.name()
        );

        for (i, doc) in documents.iter().enumerate() {
            let chunks = self.add_document(&mut state, doc).await;
            tracing::debug!(
                "[{}/{}] {} → {} chunks",
                i + 1,
                documents.len(),
                doc.title,
                chunks.len()
            );
            all_chunks.extend(chunks);
        }

        for doc in documents {
            add_links(&mut state.graph, doc, documents);
        }

        self.add_topics(&mut state);
        add_mention_counts(&mut state);

        let stats = GraphStats::from_graph(&state.graph);
        tracing::info!(
            "Graph built: {} triples ({} chunks, {} concepts, {} topics)",
            stats.total_triples,
            stats.chunks,
            stats.domain_concepts,
            stats.topic_nodes
        );

        BuildOutput {
            graph: state.graph,
            chunks: all_chunks,
            stats,
        }
    }

    async fn add_document(&self, state: &mut BuildState, doc: &Document) -> Vec<Chunk> {
        let doc_iri = iri(vocab::source(&doc.id));
        add_document_metadata(&mut state.graph, &doc_iri, doc);

        let chunks = self.chunker.chunk_document(&doc.id, &doc.text);
        let mut chunk_iris = Vec::with_capacity(chunks.len());

        for chunk in &chunks {
            let chunk_iri = iri(vocab::source(&format!("{}_chunk_{}", doc.id, chunk.index)));
            let graph = &mut state.graph;
            graph.add(chunk_iri.clone(), vocab::RDF_TYPE, iri(vocab::CHUNK));
            graph.add(chunk_iri.clone(), vocab::CHUNK_INDEX, integer(chunk.index));
            graph.add(chunk_iri.clone(), vocab::CHUNK_TEXT, literal(chunk.text.clone()));
            graph.add(doc_iri.clone(), vocab::HAS_CHUNK, chunk_iri.clone());

            for concept in self.extractor.extract(&chunk.text).await {
                let Some(concept_iri) = state.intern(&concept.label) else {
                    continue;
                };
                state
                    .graph
                    .add(chunk_iri.clone(), vocab::MENTIONS_CONCEPT, concept_iri.clone());
                if let Some(class) = concept.class {
                    state
                        .graph
                        .add(concept_iri, vocab::CLASSIFIED_AS, iri(class));
                }
            }
            chunk_iris.push(chunk_iri);
        }

        // 섹션 헤딩 개념 (문서 수준 mentions + 헤딩을 포함한 청크의 mentionsConcept)
        for heading in doc.section_headings() {
            let Some(chunk_pos) = chunks
                .iter()
                .position(|c| contains_heading(&c.text, &heading))
                .or_else(|| (!chunks.is_empty()).then_some(0))
            else {
                continue;
            };
            let Some(concept_iri) = state.intern(&heading) else {
                continue;
            };
            state
                .graph
                .add(doc_iri.clone(), vocab::MENTIONS, concept_iri.clone());
            state.graph.add(
                chunk_iris[chunk_pos].clone(),
                vocab::MENTIONS_CONCEPT,
                concept_iri,
            );
        }

        chunks
    }

    /// 개념을 토픽으로 묶어 TopicNode 생성
    fn add_topics(&self, state: &mut BuildState) {
        let groups = {
            let graph = &state.graph;
            let refs: Vec<ConceptRef<'_>> = state
                .concepts
                .iter()
                .map(|c| ConceptRef {
                    label: &c.label,
                    mention_count: graph.subjects(vocab::MENTIONS_CONCEPT, &c.iri).len(),
                })
                .collect();
            self.clustering.cluster(&refs)
        };

        for (i, group) in groups.iter().enumerate() {
            let members: Vec<ConceptNode> = group
                .iter()
                .filter_map(|&idx| state.concepts.get(idx).cloned())
                .collect();
            if members.is_empty() {
                continue;
            }
            let labels: Vec<&str> = members.iter().map(|c| c.label.as_str()).collect();
            let topic = iri(vocab::onto(&state.claim_local(format!("topic_{}", i))));

            let mut triples = vec![
                (vocab::RDF_TYPE, iri(vocab::TOPIC_NODE)),
                (vocab::SKOS_PREF_LABEL, literal(topic_label(&labels))),
                (
                    vocab::SKOS_DEFINITION,
                    literal(format!(
                        "Auto-generated topic covering {} domain concepts",
                        members.len()
                    )),
                ),
                (vocab::RDFS_COMMENT, literal(topic_comment(&labels))),
            ];
            for concept in &members {
                triples.push((vocab::COVERS_CONCEPT, concept.iri.clone()));
            }
            for concept in &members {
                for chunk in state.graph.subjects(vocab::MENTIONS_CONCEPT, &concept.iri) {
                    triples.push((vocab::COVERS_CHUNK, chunk));
                }
            }

            for (predicate, object) in triples {
                state.graph.add(topic.clone(), predicate, object);
            }
        }

        tracing::debug!("Created {} topic nodes", groups.len());
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn add_document_metadata(graph: &mut Graph, doc_iri: &Term, doc: &Document) {
    graph.add(doc_iri.clone(), vocab::RDF_TYPE, iri(vocab::DOCUMENT));
    graph.add(doc_iri.clone(), vocab::RDFS_LABEL, literal(doc.title.clone()));
    graph.add(doc_iri.clone(), vocab::PATH, literal(doc.path.clone()));
    graph.add(doc_iri.clone(), vocab::SOURCE_FORMAT, literal(doc.format.mime()));

    let fm = &doc.front_matter;
    if let Some(title) = fm.text("title") {
        graph.add(doc_iri.clone(), vocab::DCT_TITLE, literal(title));
    }
    if let Some(author) = fm.text("author") {
        graph.add(doc_iri.clone(), vocab::DCT_CREATOR, literal(author));
    }
    if let Some(created) = fm.text("date").or_else(|| fm.text("created")) {
        graph.add(doc_iri.clone(), vocab::DCT_CREATED, literal(created));
    }

    for tag in fm.tags() {
        let local = sanitize_local(&tag);
        if local.is_empty() {
            continue;
        }
        let tag_iri = iri(vocab::tag(&local));
        graph.add(doc_iri.clone(), vocab::HAS_TAG, tag_iri.clone());
        graph.add(tag_iri.clone(), vocab::RDF_TYPE, iri(vocab::TAG));
        graph.add(tag_iri, vocab::RDFS_LABEL, literal(tag));
    }
}

/// 위키링크 → linksTo (제목이 일치하는 문서가 있으면 그 문서의 IRI)
fn add_links(graph: &mut Graph, doc: &Document, documents: &[Document]) {
    let doc_iri = iri(vocab::source(&doc.id));
    for target in doc.wikilinks() {
        let local = documents
            .iter()
            .find(|d| d.title == target)
            .map(|d| d.id.clone())
            .unwrap_or_else(|| sanitize_local(&target));
        if local.is_empty() {
            continue;
        }
        graph.add(doc_iri.clone(), vocab::LINKS_TO, iri(vocab::source(&local)));
    }
}

fn add_mention_counts(state: &mut BuildState) {
    let counts: Vec<(Term, usize)> = state
        .concepts
        .iter()
        .map(|c| {
            (
                c.iri.clone(),
                state.graph.subjects(vocab::MENTIONS_CONCEPT, &c.iri).len(),
            )
        })
        .collect();
    for (iri, count) in counts {
        state
            .graph
            .add(iri, vocab::MENTION_COUNT, integer(count));
    }
}

fn contains_heading(text: &str, heading: &str) -> bool {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("## "))
        .any(|h| h.trim() == heading)
}

/// "Topic: a, b" (80자 제한)
fn topic_label(labels: &[&str]) -> String {
    let head: Vec<&str> = labels.iter().take(2).copied().collect();
    let label = format!("Topic: {}", head.join(", "));
    if label.chars().count() > TOPIC_LABEL_MAX {
        let cut: String = label.chars().take(TOPIC_LABEL_MAX - 3).collect();
        format!("{}...", cut)
    } else {
        label
    }
}

/// "Clusters concepts: a, b, c, d, e (and N more)"
fn topic_comment(labels: &[&str]) -> String {
    let head: Vec<&str> = labels.iter().take(5).copied().collect();
    let mut names = head.join(", ");
    if labels.len() > 5 {
        names.push_str(&format!(" (and {} more)", labels.len() - 5));
    }
    format!("Clusters concepts: {}", names)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::FileType;
    use crate::graph::clustering::NaiveBatchClustering;
    use crate::graph::{label_of, list_topics, turtle};
    use crate::knowledge::{ConceptStrategy, ParagraphChunker};
    use crate::loader::frontmatter;
    use std::collections::HashSet;
    use std::path::PathBuf;

    fn doc(id: &str, raw: &str) -> Document {
        let (front_matter, body) = frontmatter::split(raw);
        let title = front_matter
            .text("title")
            .map(str::to_string)
            .unwrap_or_else(|| id.replace('_', " "));
        Document {
            id: id.to_string(),
            title,
            text: body.to_string(),
            path: format!("{}.md", id),
            source_path: PathBuf::from(format!("{}.md", id)),
            format: FileType::Markdown,
            front_matter,
        }
    }

    fn corpus() -> Vec<Document> {
        vec![
            doc(
                "RDF_Basics",
                "---\ntitle: RDF Basics\nauthor: Ada\ntags: [rdf, semantic web]\n---\n# RDF Basics\n\nResource Description Framework describes Linked Data.\n\n## Triple Patterns\n\nQuery Languages match Triple Patterns. See [[Graph Notes|graphs]].",
            ),
            doc(
                "Graph_Notes",
                "# Graph Notes\n\nLinked Data forms a Knowledge Graph.\n\n## Introduction\n\nNothing here.",
            ),
        ]
    }

    async fn build(docs: &[Document], batch: usize) -> BuildOutput {
        let strategy = ConceptStrategy::Heuristic;
        let extractor = ConceptExtractor::new(&strategy, 10);
        let chunker = ParagraphChunker::with_defaults();
        let clustering = NaiveBatchClustering::new(batch);
        GraphBuilder::new(&chunker, &extractor, &clustering)
            .build(docs)
            .await
    }

    #[tokio::test]
    async fn test_every_concept_mentioned_and_in_one_topic() {
        let output = build(&corpus(), 2).await;
        let graph = &output.graph;

        let concepts = graph.instances_of(vocab::DOMAIN_CONCEPT);
        assert!(concepts.len() >= 4);
        for concept in &concepts {
            assert!(
                !graph.subjects(vocab::MENTIONS_CONCEPT, concept).is_empty(),
                "{} has no mentions",
                concept
            );
            assert_eq!(graph.subjects(vocab::COVERS_CONCEPT, concept).len(), 1);
        }
        // 모든 mentionsConcept 엣지의 양 끝이 그래프에 존재
        for triple in graph.matching(None, Some(vocab::MENTIONS_CONCEPT), None) {
            let chunk = Term::from(triple.subject);
            assert!(graph.contains(&chunk, vocab::RDF_TYPE, &iri(vocab::CHUNK)));
            assert!(graph.contains(&triple.object, vocab::RDF_TYPE, &iri(vocab::DOMAIN_CONCEPT)));
        }
    }

    #[tokio::test]
    async fn test_concepts_merge_across_documents() {
        let output = build(&corpus(), 10).await;
        let graph = &output.graph;
        let linked = iri(vocab::onto("Linked_Data"));
        assert_eq!(graph.subjects(vocab::MENTIONS_CONCEPT, &linked).len(), 2);
        assert_eq!(
            graph.literal_value(&linked, vocab::MENTION_COUNT),
            Some("2")
        );

        let labels: Vec<String> = graph
            .instances_of(vocab::DOMAIN_CONCEPT)
            .iter()
            .map(|c| label_of(graph, c))
            .collect();
        let unique: HashSet<&String> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }

    #[tokio::test]
    async fn test_document_metadata_tags_and_links() {
        let output = build(&corpus(), 10).await;
        let graph = &output.graph;
        let rdf = iri(vocab::source("RDF_Basics"));

        assert_eq!(graph.literal_value(&rdf, vocab::DCT_CREATOR), Some("Ada"));
        assert_eq!(graph.literal_value(&rdf, vocab::SOURCE_FORMAT), Some("text/markdown"));
        assert!(graph.contains(&rdf, vocab::HAS_TAG, &iri(vocab::tag("semantic_web"))));
        assert!(graph.contains(
            &rdf,
            vocab::LINKS_TO,
            &iri(vocab::source("Graph_Notes"))
        ));
        assert!(graph.contains(
            &rdf,
            vocab::MENTIONS,
            &iri(vocab::onto("Triple_Patterns"))
        ));
        // Introduction은 개념이 아님
        assert!(graph
            .instances_of(vocab::DOMAIN_CONCEPT)
            .iter()
            .all(|c| label_of(graph, c) != "Introduction"));
    }

    #[tokio::test]
    async fn test_topic_labels() {
        let output = build(&corpus(), 10).await;
        let topics = list_topics(&output.graph);
        assert_eq!(topics.len(), 1);
        assert!(topics[0].label.starts_with("Topic: "));
        assert!(topics[0].chunk_count > 0);
        assert_eq!(output.stats.topic_nodes, 1);
    }

    #[tokio::test]
    async fn test_rebuild_is_identical() {
        let first = turtle::serialize(&build(&corpus(), 10).await.graph).unwrap();
        let second = turtle::serialize(&build(&corpus(), 10).await.graph).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_chunk_triples() {
        let output = build(&corpus(), 10).await;
        let chunk = iri(vocab::source("Graph_Notes_chunk_0"));
        assert_eq!(output.graph.literal_value(&chunk, vocab::CHUNK_INDEX), Some("0"));
        assert!(output
            .graph
            .contains(&iri(vocab::source("Graph_Notes")), vocab::HAS_CHUNK, &chunk));
        assert_eq!(output.chunks.len(), output.stats.chunks);
    }

    #[test]
    fn test_topic_label_truncation() {
        let long = "x".repeat(90);
        let label = topic_label(&[&long, "b"]);
        assert_eq!(label.chars().count(), 80);
        assert!(label.ends_with("..."));
        assert_eq!(topic_label(&["A", "B", "C"]), "Topic: A, B");
    }

    #[test]
    fn test_topic_comment_more() {
        let labels = ["a", "b", "c", "d", "e", "f", "g"];
        assert_eq!(
            topic_comment(&labels),
            "Clusters concepts: a, b, c, d, e (and 2 more)"
        );
    }

    #[test]
    fn test_intern_collision_suffix() {
        let mut state = BuildState::new();
        let a = state.intern("Data Space").unwrap();
        let b = state.intern("Data Space!").unwrap();
        let again = state.intern("  Data   Space ").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, again);
        assert_eq!(b, iri(vocab::onto("Data_Space_2")));

        let doc_concept = state.intern("Document").unwrap();
        assert_eq!(doc_concept, iri(vocab::onto("Document_2")));
    }

    #[tokio::test]
    async fn test_tags_do_not_collide_with_concepts() {
        let docs = vec![doc(
            "Tagged",
            "---\ntags: [Linked Data, Document]\n---\nLinked Data connects Knowledge Graphs everywhere.",
        )];
        let output = build(&docs, 10).await;
        let graph = &output.graph;

        let concept = iri(vocab::onto("Linked_Data"));
        let tag = iri(vocab::tag("Linked_Data"));
        assert!(graph.contains(&concept, vocab::RDF_TYPE, &iri(vocab::DOMAIN_CONCEPT)));
        assert!(!graph.contains(&concept, vocab::RDF_TYPE, &iri(vocab::TAG)));
        assert!(graph.contains(&tag, vocab::RDF_TYPE, &iri(vocab::TAG)));
        assert!(!graph.contains(&tag, vocab::RDF_TYPE, &iri(vocab::DOMAIN_CONCEPT)));

        // 어휘 클래스와 같은 이름의 태그
        assert!(!graph.contains(&iri(vocab::DOCUMENT), vocab::RDF_TYPE, &iri(vocab::TAG)));
        assert!(graph.contains(&iri(vocab::tag("Document")), vocab::RDF_TYPE, &iri(vocab::TAG)));
        assert_eq!(output.stats.tags, 2);
    }

    #[tokio::test]
    async fn test_topic_iris_do_not_collide_with_concepts() {
        let docs = vec![doc("Topics", "# Topics\n\n## topic 0\n\nSome text about Linked Data.")];
        let output = build(&docs, 10).await;
        let graph = &output.graph;

        let concept = iri(vocab::onto("topic_0"));
        assert!(graph.contains(&concept, vocab::RDF_TYPE, &iri(vocab::DOMAIN_CONCEPT)));
        assert!(!graph.contains(&concept, vocab::RDF_TYPE, &iri(vocab::TOPIC_NODE)));

        let topics = graph.instances_of(vocab::TOPIC_NODE);
        assert_eq!(topics, vec![iri(vocab::onto("topic_0_2"))]);
        assert_eq!(graph.objects(&topics[0], vocab::RDF_TYPE).len(), 1);
    }
}
