//! 그래프 어휘 (네임스페이스, 클래스, 프로퍼티)
//!
//! ref: https://www.w3.org/TR/skos-reference/
//! ref: https://www.dublincore.org/specifications/dublin-core/dcmi-terms/

// ============================================================================
// Namespaces
// ============================================================================

pub const SOURCES_NS: &str = "http://pkm.local/sources/";
pub const ONTO_NS: &str = "http://pkm.local/ontology/";
/// 문서 태그 (개념 / 어휘와 분리)
pub const TAGS_NS: &str = "http://pkm.local/tags/";
/// 도메인 온톨로지 (갭 분석 대상)
pub const META_NS: &str = "http://pkm.local/meta-ontology/";
pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS_NS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const OWL_NS: &str = "http://www.w3.org/2002/07/owl#";
pub const SKOS_NS: &str = "http://www.w3.org/2004/02/skos/core#";
pub const DCTERMS_NS: &str = "http://purl.org/dc/terms/";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";

/// 직렬화에 사용하는 접두어 (출력 순서)
pub const PREFIXES: [(&str, &str); 10] = [
    ("sources", SOURCES_NS),
    ("onto", ONTO_NS),
    ("tag", TAGS_NS),
    ("meta", META_NS),
    ("rdf", RDF_NS),
    ("rdfs", RDFS_NS),
    ("owl", OWL_NS),
    ("skos", SKOS_NS),
    ("dct", DCTERMS_NS),
    ("xsd", XSD_NS),
];

// ============================================================================
// Standard Terms
// ============================================================================

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
pub const RDFS_COMMENT: &str = "http://www.w3.org/2000/01/rdf-schema#comment";
pub const RDFS_SUBCLASS_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";
pub const RDFS_DOMAIN: &str = "http://www.w3.org/2000/01/rdf-schema#domain";
pub const RDFS_RANGE: &str = "http://www.w3.org/2000/01/rdf-schema#range";
pub const RDFS_LITERAL: &str = "http://www.w3.org/2000/01/rdf-schema#Literal";
pub const RDFS_CLASS: &str = "http://www.w3.org/2000/01/rdf-schema#Class";
pub const OWL_CLASS: &str = "http://www.w3.org/2002/07/owl#Class";
pub const OWL_OBJECT_PROPERTY: &str = "http://www.w3.org/2002/07/owl#ObjectProperty";
pub const OWL_DATATYPE_PROPERTY: &str = "http://www.w3.org/2002/07/owl#DatatypeProperty";
pub const SKOS_CONCEPT: &str = "http://www.w3.org/2004/02/skos/core#Concept";
pub const SKOS_PREF_LABEL: &str = "http://www.w3.org/2004/02/skos/core#prefLabel";
pub const SKOS_DEFINITION: &str = "http://www.w3.org/2004/02/skos/core#definition";
pub const DCT_TITLE: &str = "http://purl.org/dc/terms/title";
pub const DCT_CREATOR: &str = "http://purl.org/dc/terms/creator";
pub const DCT_CREATED: &str = "http://purl.org/dc/terms/created";
pub const DCT_BIBLIOGRAPHIC_RESOURCE: &str = "http://purl.org/dc/terms/BibliographicResource";
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";

// ============================================================================
// Graph Classes
// ============================================================================

pub const DOCUMENT: &str = "http://pkm.local/ontology/Document";
pub const CHUNK: &str = "http://pkm.local/ontology/Chunk";
pub const DOMAIN_CONCEPT: &str = "http://pkm.local/ontology/DomainConcept";
pub const TOPIC_NODE: &str = "http://pkm.local/ontology/TopicNode";
pub const TAG: &str = "http://pkm.local/ontology/Tag";

// ============================================================================
// Graph Properties
// ============================================================================

pub const PATH: &str = "http://pkm.local/ontology/path";
pub const SOURCE_FORMAT: &str = "http://pkm.local/ontology/sourceFormat";
pub const HAS_CHUNK: &str = "http://pkm.local/ontology/hasChunk";
pub const CHUNK_INDEX: &str = "http://pkm.local/ontology/chunkIndex";
pub const CHUNK_TEXT: &str = "http://pkm.local/ontology/chunkText";
pub const MENTIONS_CONCEPT: &str = "http://pkm.local/ontology/mentionsConcept";
pub const MENTION_COUNT: &str = "http://pkm.local/ontology/mentionCount";
pub const MENTIONS: &str = "http://pkm.local/ontology/mentions";
pub const HAS_TAG: &str = "http://pkm.local/ontology/hasTag";
pub const LINKS_TO: &str = "http://pkm.local/ontology/linksTo";
pub const COVERS_CONCEPT: &str = "http://pkm.local/ontology/coversConcept";
pub const COVERS_CHUNK: &str = "http://pkm.local/ontology/coversChunk";
/// 개념 → 도메인 온톨로지 클래스 (온톨로지 가이드 추출)
pub const CLASSIFIED_AS: &str = "http://pkm.local/ontology/classifiedAs";

/// 그래프 구조를 이루는 프리디킷 (도메인 관계가 아님)
pub const STRUCTURAL_PREDICATES: [&str; 20] = [
    RDF_TYPE,
    RDFS_LABEL,
    RDFS_COMMENT,
    SKOS_PREF_LABEL,
    SKOS_DEFINITION,
    DCT_TITLE,
    DCT_CREATOR,
    DCT_CREATED,
    PATH,
    SOURCE_FORMAT,
    HAS_CHUNK,
    CHUNK_INDEX,
    CHUNK_TEXT,
    MENTIONS_CONCEPT,
    MENTION_COUNT,
    MENTIONS,
    HAS_TAG,
    LINKS_TO,
    COVERS_CONCEPT,
    COVERS_CHUNK,
];

pub fn source(local: &str) -> String {
    format!("{}{}", SOURCES_NS, local)
}

pub fn onto(local: &str) -> String {
    format!("{}{}", ONTO_NS, local)
}

pub fn tag(local: &str) -> String {
    format!("{}{}", TAGS_NS, local)
}

pub fn is_structural(predicate: &str) -> bool {
    STRUCTURAL_PREDICATES.contains(&predicate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terms_live_in_their_namespaces() {
        for term in [DOCUMENT, CHUNK, DOMAIN_CONCEPT, TOPIC_NODE, COVERS_CHUNK] {
            assert!(term.starts_with(ONTO_NS));
        }
        assert!(RDF_TYPE.starts_with(RDF_NS));
        assert!(SKOS_PREF_LABEL.starts_with(SKOS_NS));
        assert_eq!(onto("Chunk"), CHUNK);
        assert!(!tag("Chunk").starts_with(ONTO_NS));
    }

    #[test]
    fn test_classified_as_is_not_structural() {
        assert!(is_structural(MENTIONS_CONCEPT));
        assert!(!is_structural(CLASSIFIED_AS));
    }
}
