//! 도메인 온톨로지
//!
//! 사용자가 제공한 Turtle 파일에서 클래스(`owl:Class` / `rdfs:Class`)와
//! 관계(`owl:ObjectProperty`)를 읽습니다. 개념 추출 프롬프트와 갭 분석에 사용됩니다.

use std::path::Path;

use serde::Serialize;

use crate::error::PkmError;

use super::{label_of, local_name, term_value, turtle, vocab, Graph, Term};

/// 온톨로지 클래스
#[derive(Debug, Clone, Serialize)]
pub struct OntologyClass {
    pub iri: String,
    pub label: String,
    pub comment: Option<String>,
}

/// 온톨로지 관계 (object property)
#[derive(Debug, Clone, Serialize)]
pub struct OntologyProperty {
    pub iri: String,
    pub label: String,
    /// 도메인 클래스 라벨 (미지정 시 "Any")
    pub domain: String,
    /// 레인지 클래스 라벨 (미지정 시 "Any")
    pub range: String,
}

/// 로드된 도메인 온톨로지
#[derive(Debug, Clone, Default)]
pub struct Ontology {
    pub classes: Vec<OntologyClass>,
    pub properties: Vec<OntologyProperty>,
}

impl Ontology {
    /// Turtle 파일에서 로드
    ///
    /// 파일이 없으면 `PkmError::OntologyNotFound`.
    /// 읽기 / 파싱 실패는 경고 후 빈 온톨로지로 대체합니다.
    pub fn load(path: &Path) -> Result<Self, PkmError> {
        if !path.is_file() {
            return Err(PkmError::OntologyNotFound(path.to_path_buf()));
        }

        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Failed to read ontology {:?}: {}, using empty ontology", path, e);
                return Ok(Self::default());
            }
        };

        match turtle::parse(&raw) {
            Ok(graph) => {
                let ontology = Self::from_graph(&graph);
                tracing::info!(
                    "Loaded ontology {:?}: {} classes, {} relationships",
                    path,
                    ontology.classes.len(),
                    ontology.properties.len()
                );
                Ok(ontology)
            }
            Err(e) => {
                tracing::warn!("Malformed ontology {:?}: {:#}, using empty ontology", path, e);
                Ok(Self::default())
            }
        }
    }

    pub fn from_graph(graph: &Graph) -> Self {
        let mut classes: Vec<OntologyClass> = Vec::new();
        for class_type in [vocab::OWL_CLASS, vocab::RDFS_CLASS] {
            for subject in graph.instances_of(class_type) {
                let Term::NamedNode(node) = &subject else {
                    continue;
                };
                if classes.iter().any(|c| c.iri == node.as_str()) {
                    continue;
                }
                let comment = graph
                    .literal_value(&subject, vocab::RDFS_COMMENT)
                    .or_else(|| graph.literal_value(&subject, vocab::SKOS_DEFINITION))
                    .map(str::to_string);
                classes.push(OntologyClass {
                    iri: node.as_str().to_string(),
                    label: label_of(graph, &subject),
                    comment,
                });
            }
        }

        let properties = graph
            .instances_of(vocab::OWL_OBJECT_PROPERTY)
            .iter()
            .filter(|p| p.is_named_node())
            .map(|p| OntologyProperty {
                iri: term_value(p).to_string(),
                label: label_of(graph, p),
                domain: endpoint_label(graph, p, vocab::RDFS_DOMAIN),
                range: endpoint_label(graph, p, vocab::RDFS_RANGE),
            })
            .collect();

        Self {
            classes,
            properties,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// 라벨 또는 IRI 로컬 이름으로 클래스 찾기 (대소문자 무시)
    pub fn find_class(&self, name: &str) -> Option<&OntologyClass> {
        let name = name.trim();
        self.classes.iter().find(|c| {
            c.label.eq_ignore_ascii_case(name) || local_name(&c.iri).eq_ignore_ascii_case(name)
        })
    }

    /// LLM 프롬프트용 텍스트
    pub fn render(&self) -> String {
        let mut out = String::from("Classes:\n");
        for class in &self.classes {
            match &class.comment {
                Some(comment) => out.push_str(&format!("- {}: {}\n", class.label, comment)),
                None => out.push_str(&format!("- {}\n", class.label)),
            }
        }
        if !self.properties.is_empty() {
            out.push_str("\nRelationships:\n");
            for prop in &self.properties {
                out.push_str(&format!("- {} ({} → {})\n", prop.label, prop.domain, prop.range));
            }
        }
        out
    }
}

fn endpoint_label(graph: &Graph, property: &Term, predicate: &str) -> String {
    graph
        .objects(property, predicate)
        .iter()
        .find(|t| t.is_named_node())
        .map(|t| label_of(graph, t))
        .unwrap_or_else(|| "Any".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ONTOLOGY: &str = r#"
@prefix meta: <http://pkm.local/meta-ontology/> .
@prefix owl: <http://www.w3.org/2002/07/owl#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .

meta:DataSpace a owl:Class ;
    rdfs:label "Data Space" ;
    rdfs:comment "A federated data sharing ecosystem" .

meta:Regulation a owl:Class ;
    rdfs:label "Regulation" .

meta:governs a owl:ObjectProperty ;
    rdfs:label "governs" ;
    rdfs:domain meta:Regulation ;
    rdfs:range meta:DataSpace .

meta:relatedTo a owl:ObjectProperty ;
    rdfs:label "related to" .
"#;

    #[test]
    fn test_from_turtle() {
        let graph = turtle::parse(ONTOLOGY).unwrap();
        let ontology = Ontology::from_graph(&graph);

        assert_eq!(ontology.classes.len(), 2);
        assert_eq!(ontology.classes[0].label, "Data Space");
        assert_eq!(
            ontology.classes[0].comment.as_deref(),
            Some("A federated data sharing ecosystem")
        );

        assert_eq!(ontology.properties.len(), 2);
        assert_eq!(ontology.properties[0].domain, "Regulation");
        assert_eq!(ontology.properties[0].range, "Data Space");
        assert_eq!(ontology.properties[1].domain, "Any");
    }

    #[test]
    fn test_find_class_by_label_or_local_name() {
        let ontology = Ontology::from_graph(&turtle::parse(ONTOLOGY).unwrap());
        assert!(ontology.find_class("data space").is_some());
        assert!(ontology.find_class("DataSpace").is_some());
        assert!(ontology.find_class("Unknown").is_none());
    }

    #[test]
    fn test_render_lists_classes_and_relationships() {
        let ontology = Ontology::from_graph(&turtle::parse(ONTOLOGY).unwrap());
        let rendered = ontology.render();
        assert!(rendered.contains("- Data Space: A federated data sharing ecosystem"));
        assert!(rendered.contains("- governs (Regulation → Data Space)"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = Ontology::load(Path::new("/nonexistent/ontology.ttl")).unwrap_err();
        assert!(matches!(err, PkmError::OntologyNotFound(_)));
    }

    #[test]
    fn test_malformed_file_falls_back_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.ttl");
        std::fs::write(&path, "@prefix broken").unwrap();
        let ontology = Ontology::load(&path).unwrap();
        assert!(ontology.is_empty());
    }
}
