//! 그래프 내보내기
//!
//! - 지식 그래프: 사람이 읽을 수 있는 헤더(생성 시각, 통계, 구조 안내) + Turtle
//! - 스키마: 그래프 자체의 어휘(클래스 / 프로퍼티)를 별도 Turtle로

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

use super::{iri, literal, turtle, vocab, Graph, GraphStats};

/// 기본 파일 이름
pub const GRAPH_FILE: &str = "knowledge_graph.ttl";
pub const SCHEMA_FILE: &str = "pkm_ontology.ttl";

/// Turtle 헤더 (생성 시각이 유일한 비결정적 부분)
pub fn render_header(stats: &GraphStats, generated: DateTime<Local>) -> String {
    format!(
        "# Knowledge Graph Export
# Generated: {generated}
#
# Graph Statistics:
#   - Documents: {documents}
#   - Chunks: {chunks}
#   - Domain Concepts: {concepts}
#   - Topic Nodes: {topics}
#   - Total Triples: {triples}
#
# Structure Guide:
#   1. Topic Nodes (onto:TopicNode) - Navigation layer organizing concepts
#   2. Documents (onto:Document) - Source files with metadata
#   3. Chunks (onto:Chunk) - Text segments from documents
#   4. Domain Concepts (onto:DomainConcept) - Knowledge entities
#   5. Tags (onto:Tag) - Document categorization
#
# Relationships:
#   - onto:hasChunk: Document → Chunk (1-to-many)
#   - onto:mentionsConcept: Chunk → DomainConcept (many-to-many)
#   - onto:coversConcept: TopicNode → DomainConcept (many-to-many)
#   - onto:coversChunk: TopicNode → Chunk (many-to-many)
#

",
        generated = generated.format("%Y-%m-%d %H:%M:%S"),
        documents = stats.documents,
        chunks = stats.chunks,
        concepts = stats.domain_concepts,
        topics = stats.topic_nodes,
        triples = stats.total_triples,
    )
}

/// 헤더 + 그래프 Turtle 문자열
pub fn render_graph(graph: &Graph, generated: DateTime<Local>) -> Result<String> {
    let stats = GraphStats::from_graph(graph);
    let mut out = render_header(&stats, generated);
    out.push_str(&turtle::serialize(graph)?);
    Ok(out)
}

/// 그래프를 파일로 저장 (부모 디렉토리 생성)
pub fn export_graph(graph: &Graph, path: &Path) -> Result<()> {
    write_file(path, &render_graph(graph, Local::now())?)?;
    tracing::info!("Exported graph to {:?} ({} triples)", path, graph.len());
    Ok(())
}

/// 스키마를 파일로 저장
pub fn export_schema(path: &Path) -> Result<()> {
    let schema = schema_graph();
    write_file(path, &turtle::serialize(&schema)?)?;
    tracing::info!("Created schema {:?} ({} triples)", path, schema.len());
    Ok(())
}

/// 이전에 내보낸 그래프 로드
pub fn load_graph(path: &Path) -> Result<Graph> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    turtle::parse(&raw).with_context(|| format!("Failed to parse {:?}", path))
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))
}

// ============================================================================
// Schema
// ============================================================================

struct ClassDef {
    iri: &'static str,
    label: &'static str,
    parent: Option<&'static str>,
    comment: Option<&'static str>,
}

struct PropertyDef {
    iri: &'static str,
    kind: &'static str,
    domain: &'static str,
    range: &'static str,
    label: &'static str,
    comment: Option<&'static str>,
}

const CLASSES: &[ClassDef] = &[
    ClassDef {
        iri: vocab::DOCUMENT,
        label: "Document",
        parent: Some(vocab::DCT_BIBLIOGRAPHIC_RESOURCE),
        comment: Some("A source document such as Markdown, PDF, or HTML."),
    },
    ClassDef {
        iri: vocab::CHUNK,
        label: "Chunk",
        parent: None,
        comment: Some("A text span extracted from a document for retrieval and annotation."),
    },
    ClassDef {
        iri: vocab::DOMAIN_CONCEPT,
        label: "Domain Concept",
        parent: Some(vocab::SKOS_CONCEPT),
        comment: Some("Real-world or domain-level concept represented in the knowledge graph."),
    },
    ClassDef {
        iri: vocab::TOPIC_NODE,
        label: "Topic Node",
        parent: Some(vocab::SKOS_CONCEPT),
        comment: Some(
            "A topic or domain area summarising a set of domain concepts and supporting documents.",
        ),
    },
    ClassDef {
        iri: vocab::TAG,
        label: "Tag",
        parent: None,
        comment: None,
    },
];

const PROPERTIES: &[PropertyDef] = &[
    PropertyDef {
        iri: vocab::PATH,
        kind: vocab::OWL_DATATYPE_PROPERTY,
        domain: vocab::DOCUMENT,
        range: vocab::RDFS_LITERAL,
        label: "path",
        comment: None,
    },
    PropertyDef {
        iri: vocab::SOURCE_FORMAT,
        kind: vocab::OWL_DATATYPE_PROPERTY,
        domain: vocab::DOCUMENT,
        range: vocab::RDFS_LITERAL,
        label: "source format",
        comment: Some("MIME type of the source document (e.g., text/markdown, application/pdf)"),
    },
    PropertyDef {
        iri: vocab::CHUNK_INDEX,
        kind: vocab::OWL_DATATYPE_PROPERTY,
        domain: vocab::CHUNK,
        range: vocab::RDFS_LITERAL,
        label: "chunk index",
        comment: None,
    },
    PropertyDef {
        iri: vocab::CHUNK_TEXT,
        kind: vocab::OWL_DATATYPE_PROPERTY,
        domain: vocab::CHUNK,
        range: vocab::RDFS_LITERAL,
        label: "chunk text",
        comment: None,
    },
    PropertyDef {
        iri: vocab::MENTION_COUNT,
        kind: vocab::OWL_DATATYPE_PROPERTY,
        domain: vocab::DOMAIN_CONCEPT,
        range: vocab::RDFS_LITERAL,
        label: "mention count",
        comment: Some("Number of chunks that mention the concept."),
    },
    PropertyDef {
        iri: vocab::HAS_CHUNK,
        kind: vocab::OWL_OBJECT_PROPERTY,
        domain: vocab::DOCUMENT,
        range: vocab::CHUNK,
        label: "has chunk",
        comment: None,
    },
    PropertyDef {
        iri: vocab::MENTIONS_CONCEPT,
        kind: vocab::OWL_OBJECT_PROPERTY,
        domain: vocab::CHUNK,
        range: vocab::DOMAIN_CONCEPT,
        label: "mentions concept",
        comment: Some("Indicates that the chunk mentions or refers to a domain concept."),
    },
    PropertyDef {
        iri: vocab::COVERS_CONCEPT,
        kind: vocab::OWL_OBJECT_PROPERTY,
        domain: vocab::TOPIC_NODE,
        range: vocab::DOMAIN_CONCEPT,
        label: "covers concept",
        comment: Some("Associates a topic with domain concepts that fall under it."),
    },
    PropertyDef {
        iri: vocab::COVERS_CHUNK,
        kind: vocab::OWL_OBJECT_PROPERTY,
        domain: vocab::TOPIC_NODE,
        range: vocab::CHUNK,
        label: "covers chunk",
        comment: Some("Associates a topic with supporting text chunks."),
    },
    PropertyDef {
        iri: vocab::LINKS_TO,
        kind: vocab::OWL_OBJECT_PROPERTY,
        domain: vocab::DOCUMENT,
        range: vocab::DOCUMENT,
        label: "links to",
        comment: None,
    },
    PropertyDef {
        iri: vocab::HAS_TAG,
        kind: vocab::OWL_OBJECT_PROPERTY,
        domain: vocab::DOCUMENT,
        range: vocab::TAG,
        label: "has tag",
        comment: None,
    },
    PropertyDef {
        iri: vocab::MENTIONS,
        kind: vocab::OWL_OBJECT_PROPERTY,
        domain: vocab::DOCUMENT,
        range: vocab::DOMAIN_CONCEPT,
        label: "mentions",
        comment: Some("Section heading of the document, as a concept."),
    },
    PropertyDef {
        iri: vocab::CLASSIFIED_AS,
        kind: vocab::OWL_OBJECT_PROPERTY,
        domain: vocab::DOMAIN_CONCEPT,
        range: vocab::OWL_CLASS,
        label: "classified as",
        comment: Some("Domain ontology class assigned during ontology-guided extraction."),
    },
];

/// 그래프 어휘 스키마
pub fn schema_graph() -> Graph {
    let mut graph = Graph::new();

    for class in CLASSES {
        let subject = iri(class.iri);
        graph.add(subject.clone(), vocab::RDF_TYPE, iri(vocab::OWL_CLASS));
        if let Some(parent) = class.parent {
            graph.add(subject.clone(), vocab::RDFS_SUBCLASS_OF, iri(parent));
        }
        graph.add(subject.clone(), vocab::RDFS_LABEL, literal(class.label));
        if let Some(comment) = class.comment {
            graph.add(subject, vocab::RDFS_COMMENT, literal(comment));
        }
    }

    for prop in PROPERTIES {
        let subject = iri(prop.iri);
        graph.add(subject.clone(), vocab::RDF_TYPE, iri(prop.kind));
        graph.add(subject.clone(), vocab::RDFS_DOMAIN, iri(prop.domain));
        graph.add(subject.clone(), vocab::RDFS_RANGE, iri(prop.range));
        graph.add(subject.clone(), vocab::RDFS_LABEL, literal(prop.label));
        if let Some(comment) = prop.comment {
            graph.add(subject, vocab::RDFS_COMMENT, literal(comment));
        }
    }

    graph
}
