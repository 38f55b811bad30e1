//! 갭 분석 모듈
//!
//! 도메인 온톨로지의 각 클래스가 지식 그래프에서 얼마나 다뤄지는지 점수화하고,
//! 부족한 영역에 대한 검색 쿼리를 생성합니다.
//!
//! ## 점수
//! `raw = instances × 50 + chunk mentions × 2 + relations × 10`,
//! `score = min(100, raw / 200 × 100)`. 각 항에 대해 단조 증가합니다.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::completion::{strip_code_fence, CompletionProvider, CompletionRequest};
use crate::config::GapsConfig;
use crate::graph::{iri, label_of, vocab, Graph, Ontology, Term};

/// 만점(100)에 해당하는 raw 점수
pub const MAX_RAW_SCORE: f32 = 200.0;
/// 이 횟수 미만으로 사용된 관계는 갭
pub const RELATIONSHIP_GAP_USES: usize = 3;

const INSTANCE_WEIGHT: f32 = 50.0;
const CHUNK_WEIGHT: f32 = 2.0;
const RELATION_WEIGHT: f32 = 10.0;

const QUERY_SYSTEM_PROMPT: &str = "You are a research assistant. Return only valid JSON.";

// ============================================================================
// Types
// ============================================================================

/// 클래스별 커버리지
#[derive(Debug, Clone, Serialize)]
pub struct ClassCoverage {
    pub label: String,
    pub iri: String,
    /// 매칭된 도메인 개념 수
    pub instances: usize,
    /// 매칭된 개념을 언급하는 청크 수
    pub chunks: usize,
    /// 도메인 관계 트리플 수
    pub relations: usize,
    pub score: f32,
}

impl ClassCoverage {
    pub fn level(&self) -> &'static str {
        if self.score < 30.0 {
            "LOW"
        } else if self.score < 60.0 {
            "MEDIUM"
        } else {
            "HIGH"
        }
    }
}

/// 거의 사용되지 않은 온톨로지 관계
#[derive(Debug, Clone, Serialize)]
pub struct RelationshipGap {
    pub label: String,
    pub domain: String,
    pub range: String,
    pub count: usize,
}

/// 우선 조사 영역
#[derive(Debug, Clone, Serialize)]
pub struct FocusArea {
    pub label: String,
    pub reason: String,
}

/// 갭 분석 결과
#[derive(Debug, Clone, Serialize)]
pub struct GapReport {
    /// 분석 시각
    pub generated: DateTime<Local>,
    /// 분석한 그래프 파일
    pub source: String,
    /// 점수 오름차순
    pub coverage: Vec<ClassCoverage>,
    pub gaps: Vec<String>,
    pub relationship_gaps: Vec<RelationshipGap>,
    pub focus_areas: Vec<FocusArea>,
    pub queries: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QueryReply {
    Wrapped { queries: Vec<String> },
    Bare(Vec<String>),
}

// ============================================================================
// Scoring
// ============================================================================

/// 커버리지 점수 (0 ~ 100)
pub fn coverage_score(instances: usize, chunks: usize, relations: usize) -> f32 {
    let raw = instances as f32 * INSTANCE_WEIGHT
        + chunks as f32 * CHUNK_WEIGHT
        + relations as f32 * RELATION_WEIGHT;
    (raw / MAX_RAW_SCORE * 100.0).min(100.0)
}

// ============================================================================
// Analyzer
// ============================================================================

/// 온톨로지 대비 그래프 갭 분석기
pub struct GapAnalyzer<'a> {
    ontology: &'a Ontology,
    graph: &'a Graph,
    config: &'a GapsConfig,
}

impl<'a> GapAnalyzer<'a> {
    pub fn new(ontology: &'a Ontology, graph: &'a Graph, config: &'a GapsConfig) -> Self {
        Self {
            ontology,
            graph,
            config,
        }
    }

    /// 클래스별 커버리지 (점수 오름차순)
    ///
    /// 개념 라벨이 클래스 라벨을 포함하거나(대소문자 무시)
    /// `onto:classifiedAs`로 해당 클래스에 분류된 개념이 인스턴스입니다.
    pub fn analyze_coverage(&self) -> Vec<ClassCoverage> {
        let concepts = self.graph.instances_of(vocab::DOMAIN_CONCEPT);

        let mut coverage: Vec<ClassCoverage> = self
            .ontology
            .classes
            .iter()
            .map(|class| {
                let needle = class.label.to_lowercase();
                let class_term = iri(class.iri.as_str());
                let matching: Vec<&Term> = concepts
                    .iter()
                    .filter(|concept| {
                        label_of(self.graph, concept).to_lowercase().contains(&needle)
                            || self
                                .graph
                                .contains(concept, vocab::CLASSIFIED_AS, &class_term)
                    })
                    .collect();

                let chunks = matching
                    .iter()
                    .map(|c| self.graph.subjects(vocab::MENTIONS_CONCEPT, c).len())
                    .sum();
                let relations = matching.iter().map(|c| self.domain_relations(c)).sum();

                ClassCoverage {
                    label: class.label.clone(),
                    iri: class.iri.clone(),
                    instances: matching.len(),
                    chunks,
                    relations,
                    score: coverage_score(matching.len(), chunks, relations),
                }
            })
            .collect();

        coverage.sort_by(|a, b| a.score.total_cmp(&b.score));
        tracing::info!("Analyzed coverage for {} ontology classes", coverage.len());
        coverage
    }

    /// 임계값 미만 클래스 라벨
    pub fn identify_gaps(&self, coverage: &[ClassCoverage]) -> Vec<String> {
        let gaps: Vec<String> = coverage
            .iter()
            .filter(|c| c.score < self.config.threshold)
            .map(|c| {
                tracing::debug!("Gap: {} (score {:.0})", c.label, c.score);
                c.label.clone()
            })
            .collect();
        tracing::info!(
            "Found {} gaps below threshold {}",
            gaps.len(),
            self.config.threshold
        );
        gaps
    }

    /// 사용 횟수가 적은 온톨로지 관계
    pub fn relationship_gaps(&self) -> Vec<RelationshipGap> {
        self.ontology
            .properties
            .iter()
            .filter_map(|prop| {
                let count = self.graph.count_predicate(&prop.iri);
                (count < RELATIONSHIP_GAP_USES).then(|| RelationshipGap {
                    label: prop.label.clone(),
                    domain: prop.domain.clone(),
                    range: prop.range.clone(),
                    count,
                })
            })
            .collect()
    }

    /// 점수가 가장 낮은 클래스들과 그 이유
    pub fn focus_areas(&self, coverage: &[ClassCoverage]) -> Vec<FocusArea> {
        let mut sorted: Vec<&ClassCoverage> = coverage.iter().collect();
        sorted.sort_by(|a, b| a.score.total_cmp(&b.score));

        sorted
            .into_iter()
            .take(self.config.focus_areas)
            .map(|c| FocusArea {
                label: c.label.clone(),
                reason: focus_reason(c),
            })
            .collect()
    }

    /// 갭별 검색 쿼리 생성
    ///
    /// LLM 실패 시 `"<gap> overview examples"`로 대체합니다.
    pub async fn generate_queries(
        &self,
        completion: Option<&dyn CompletionProvider>,
        gaps: &[String],
        relationship_gaps: &[RelationshipGap],
    ) -> Vec<String> {
        if gaps.is_empty() && relationship_gaps.is_empty() {
            return Vec::new();
        }

        let max = self.config.max_queries;
        let Some(completion) = completion else {
            tracing::warn!("No completion provider, using fallback queries");
            return fallback_queries(gaps, max);
        };

        let request = CompletionRequest::new(
            QUERY_SYSTEM_PROMPT,
            query_prompt(gaps, relationship_gaps, max),
        )
        .temperature(0.7)
        .json();

        let parsed = completion
            .complete(&request)
            .await
            .and_then(|reply| parse_queries(&reply));

        match parsed {
            Ok(queries) if !queries.is_empty() => {
                tracing::info!("Generated {} search queries", queries.len());
                queries.into_iter().take(max).collect()
            }
            Ok(_) => {
                tracing::warn!("Completion returned no queries, using fallback");
                fallback_queries(gaps, max)
            }
            Err(e) => {
                tracing::warn!("Query generation failed: {:#}, using fallback", e);
                fallback_queries(gaps, max)
            }
        }
    }

    /// 전체 분석 실행
    pub async fn run(&self, completion: Option<&dyn CompletionProvider>, source: &str) -> GapReport {
        let coverage = self.analyze_coverage();
        let gaps = self.identify_gaps(&coverage);
        let relationship_gaps = self.relationship_gaps();
        let focus_areas = self.focus_areas(&coverage);
        let queries = self
            .generate_queries(completion, &gaps, &relationship_gaps)
            .await;

        GapReport {
            generated: Local::now(),
            source: source.to_string(),
            coverage,
            gaps,
            relationship_gaps,
            focus_areas,
            queries,
        }
    }

    /// 개념이 주어 또는 목적어인 도메인 관계 트리플 수
    fn domain_relations(&self, concept: &Term) -> usize {
        let is_domain = |p: &str| p.starts_with(vocab::META_NS) || p == vocab::CLASSIFIED_AS;
        let outgoing = self
            .graph
            .matching(Some(concept), None, None)
            .iter()
            .filter(|t| is_domain(t.predicate.as_str()))
            .count();
        let incoming = self
            .graph
            .matching(None, None, Some(concept))
            .iter()
            .filter(|t| is_domain(t.predicate.as_str()))
            .count();
        outgoing + incoming
    }
}

// ============================================================================
// Report
// ============================================================================

const QUERIES_HEADING: &str = "## Recommended Search Queries";

impl GapReport {
    /// 텍스트 리포트
    pub fn render(&self) -> String {
        let rule = "=".repeat(60);
        let mut lines = vec![
            rule.clone(),
            "SOURCE DISCOVERY REPORT".to_string(),
            format!("Generated: {}", self.generated.format("%Y-%m-%d %H:%M:%S")),
            format!("Graph: {}", self.source),
            rule,
            String::new(),
            "## Coverage Summary".to_string(),
            String::new(),
        ];

        for c in &self.coverage {
            lines.push(format!("  {}: {} ({:.0}/100)", c.label, c.level(), c.score));
            lines.push(format!(
                "    - {} instances, {} chunks, {} relationships",
                c.instances, c.chunks, c.relations
            ));
        }
        lines.push(String::new());

        lines.push("## Top Focus Areas".to_string());
        lines.push(String::new());
        for (i, area) in self.focus_areas.iter().enumerate() {
            lines.push(format!("  {}. {}", i + 1, area.label));
            lines.push(format!("     Reason: {}", area.reason));
        }
        lines.push(String::new());

        lines.push("## Relationship Gaps".to_string());
        lines.push(String::new());
        for gap in &self.relationship_gaps {
            lines.push(format!("  - {}: {} → {}", gap.label, gap.domain, gap.range));
            lines.push(format!("    Current usage: {} triple(s)", gap.count));
        }
        lines.push(String::new());

        lines.push(QUERIES_HEADING.to_string());
        lines.push(String::new());
        for (i, query) in self.queries.iter().enumerate() {
            lines.push(format!("  {}. {}", i + 1, query));
        }
        lines.push(String::new());

        lines.push("## Next Steps".to_string());
        lines.push(String::new());
        lines.push("  1. Use the search queries above to find relevant articles/papers".to_string());
        lines.push("  2. Add discovered sources to data/sources/".to_string());
        lines.push("  3. Rebuild knowledge graph: pkm-rag build".to_string());
        lines.push("  4. Re-run gap analysis to assess improvement".to_string());
        lines.push(String::new());

        lines.join("\n")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        std::fs::write(path, self.render()).with_context(|| format!("Failed to write {:?}", path))?;
        tracing::info!("Saved gap report to {:?}", path);
        Ok(())
    }
}

/// 리포트의 "Recommended Search Queries" 섹션에서 쿼리 읽기
pub fn parse_report_queries(report: &str) -> Vec<String> {
    report
        .lines()
        .skip_while(|line| line.trim() != QUERIES_HEADING)
        .skip(1)
        .take_while(|line| !line.starts_with("## "))
        .filter_map(|line| {
            let (number, query) = line.trim().split_once(". ")?;
            number.parse::<usize>().ok()?;
            let query = query.trim();
            (!query.is_empty()).then(|| query.to_string())
        })
        .collect()
}

// ============================================================================
// Helper Functions
// ============================================================================

fn focus_reason(c: &ClassCoverage) -> String {
    let mut reasons = Vec::new();
    if c.instances == 0 {
        reasons.push("no instances found".to_string());
    } else if c.instances < 2 {
        reasons.push("only 1 instance".to_string());
    }
    if c.chunks < 3 {
        reasons.push(format!("only {} mentions", c.chunks));
    }
    if c.relations < 2 {
        reasons.push(format!("only {} relationships", c.relations));
    }

    if reasons.is_empty() {
        format!("lowest relative coverage ({:.0}/100)", c.score)
    } else {
        reasons.join(", ")
    }
}

fn fallback_queries(gaps: &[String], max: usize) -> Vec<String> {
    gaps.iter()
        .take(max)
        .map(|gap| format!("{} overview examples", gap))
        .collect()
}

fn query_prompt(gaps: &[String], relationship_gaps: &[RelationshipGap], max: usize) -> String {
    let gap_context = gaps
        .iter()
        .take(5)
        .map(|g| format!("  - {}", g))
        .collect::<Vec<_>>()
        .join("\n");
    let rel_context = relationship_gaps
        .iter()
        .take(5)
        .map(|r| {
            format!(
                "  - {}: {} → {} (only {} examples)",
                r.label, r.domain, r.range, r.count
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a research assistant helping discover sources to fill knowledge gaps.

Current Knowledge Gaps (under-covered topics):
{gap_context}

Under-utilized Relationships:
{rel_context}

Generate {max} targeted search queries to find sources that would:
1. Provide more depth on under-covered topics
2. Explain relationships between these concepts
3. Include practical examples and case studies

Return a JSON object: {{\"queries\": [\"query1\", \"query2\", ...]}}
"
    )
}

fn parse_queries(reply: &str) -> Result<Vec<String>> {
    let parsed: QueryReply =
        serde_json::from_str(strip_code_fence(reply)).context("Invalid query JSON")?;
    let queries = match parsed {
        QueryReply::Wrapped { queries } | QueryReply::Bare(queries) => queries,
    };
    Ok(queries
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::mock::ScriptedCompletion;
    use crate::graph::{literal, OntologyClass, OntologyProperty};
    use tempfile::TempDir;

    fn meta(local: &str) -> String {
        format!("{}{}", vocab::META_NS, local)
    }

    fn ontology() -> Ontology {
        Ontology {
            classes: vec![
                OntologyClass {
                    iri: meta("Ontology"),
                    label: "Ontology".to_string(),
                    comment: None,
                },
                OntologyClass {
                    iri: meta("Reasoner"),
                    label: "Reasoner".to_string(),
                    comment: None,
                },
            ],
            properties: vec![
                OntologyProperty {
                    iri: meta("usesOntology"),
                    label: "uses ontology".to_string(),
                    domain: "Reasoner".to_string(),
                    range: "Ontology".to_string(),
                },
                OntologyProperty {
                    iri: meta("extends"),
                    label: "extends".to_string(),
                    domain: "Any".to_string(),
                    range: "Any".to_string(),
                },
            ],
        }
    }

    fn concept(graph: &mut Graph, local: &str, label: &str) -> Term {
        let node = iri(vocab::onto(local));
        graph.add(node.clone(), vocab::RDF_TYPE, iri(vocab::DOMAIN_CONCEPT));
        graph.add(node.clone(), vocab::SKOS_PREF_LABEL, literal(label));
        node
    }

    fn mention(graph: &mut Graph, chunk: &str, concept: &Term) {
        graph.add(
            iri(vocab::source(chunk)),
            vocab::MENTIONS_CONCEPT,
            concept.clone(),
        );
    }

    /// Ontology: 인스턴스 2, 청크 3, 관계 4 / Reasoner: 분류로만 1 인스턴스
    fn graph() -> Graph {
        let mut g = Graph::new();
        let web = concept(&mut g, "Web_Ontology_Language", "Web Ontology Language");
        let upper = concept(&mut g, "Upper_Ontology", "Upper Ontology");
        let hermit = concept(&mut g, "HermiT", "HermiT");
        let _unrelated = concept(&mut g, "Linked_Data", "Linked Data");

        mention(&mut g, "a_chunk_0", &web);
        mention(&mut g, "a_chunk_1", &web);
        mention(&mut g, "b_chunk_0", &upper);

        g.add(upper.clone(), &meta("extends"), web.clone());
        g.add(hermit.clone(), &meta("usesOntology"), web.clone());
        g.add(hermit, vocab::CLASSIFIED_AS, iri(meta("Reasoner")));
        g
    }

    #[test]
    fn test_score_monotone_and_capped() {
        let mut previous = -1.0;
        for n in 0..10 {
            for score in [
                coverage_score(n, 0, 0),
                coverage_score(0, n, 0),
                coverage_score(0, 0, n),
            ] {
                assert!((0.0..=100.0).contains(&score));
            }
            let combined = coverage_score(n, n, n);
            assert!(combined >= previous);
            previous = combined;
        }
        assert!(coverage_score(1, 5, 2) <= coverage_score(2, 5, 2));
        assert!(coverage_score(1, 5, 2) <= coverage_score(1, 6, 2));
        assert!(coverage_score(1, 5, 2) <= coverage_score(1, 5, 3));
        assert_eq!(coverage_score(10, 100, 10), 100.0);
        assert_eq!(coverage_score(0, 0, 0), 0.0);
    }

    #[test]
    fn test_coverage_counts() {
        let ontology = ontology();
        let graph = graph();
        let config = GapsConfig::default();
        let coverage = GapAnalyzer::new(&ontology, &graph, &config).analyze_coverage();

        let onto = coverage.iter().find(|c| c.label == "Ontology").unwrap();
        assert_eq!(onto.instances, 2);
        assert_eq!(onto.chunks, 3);
        // extends(out+in) + usesOntology(in)
        assert_eq!(onto.relations, 3);
        assert_eq!(onto.score, coverage_score(2, 3, 3));

        let reasoner = coverage.iter().find(|c| c.label == "Reasoner").unwrap();
        assert_eq!(reasoner.instances, 1);
        assert_eq!(reasoner.chunks, 0);
        // usesOntology(out) + classifiedAs(out)
        assert_eq!(reasoner.relations, 2);

        // 오름차순
        assert!(coverage[0].score <= coverage[1].score);
    }

    #[test]
    fn test_gaps_and_focus_areas() {
        let ontology = ontology();
        let graph = graph();
        let config = GapsConfig::default();
        let analyzer = GapAnalyzer::new(&ontology, &graph, &config);
        let coverage = analyzer.analyze_coverage();

        let gaps = analyzer.identify_gaps(&coverage);
        assert_eq!(gaps, vec!["Reasoner".to_string()]);

        let focus = analyzer.focus_areas(&coverage);
        assert_eq!(focus.len(), 2);
        assert_eq!(focus[0].label, "Reasoner");
        assert_eq!(focus[0].reason, "only 1 instance, only 0 mentions");

        let rel_gaps = analyzer.relationship_gaps();
        assert_eq!(rel_gaps.len(), 2);
        assert!(rel_gaps.iter().all(|g| g.count == 1));
    }

    #[tokio::test]
    async fn test_queries_from_completion() {
        let ontology = ontology();
        let graph = graph();
        let config = GapsConfig::default();
        let analyzer = GapAnalyzer::new(&ontology, &graph, &config);
        let completion = ScriptedCompletion::new([
            r#"{"queries": ["description logic reasoners", "OWL reasoner benchmarks"]}"#,
        ]);

        let queries = analyzer
            .generate_queries(Some(&completion), &["Reasoner".to_string()], &[])
            .await;
        assert_eq!(
            queries,
            vec![
                "description logic reasoners".to_string(),
                "OWL reasoner benchmarks".to_string()
            ]
        );
        assert!(completion.prompts()[0].contains("  - Reasoner"));
    }

    #[tokio::test]
    async fn test_queries_fallback() {
        let ontology = ontology();
        let graph = graph();
        let config = GapsConfig::default();
        let analyzer = GapAnalyzer::new(&ontology, &graph, &config);
        let gaps = vec!["Reasoner".to_string()];

        let failing = ScriptedCompletion::failing();
        let queries = analyzer.generate_queries(Some(&failing), &gaps, &[]).await;
        assert_eq!(queries, vec!["Reasoner overview examples".to_string()]);

        let garbage = ScriptedCompletion::new(["not json"]);
        let queries = analyzer.generate_queries(Some(&garbage), &gaps, &[]).await;
        assert_eq!(queries, vec!["Reasoner overview examples".to_string()]);

        let queries = analyzer.generate_queries(None, &gaps, &[]).await;
        assert_eq!(queries, vec!["Reasoner overview examples".to_string()]);
    }

    #[tokio::test]
    async fn test_no_gaps_skips_completion() {
        let ontology = Ontology::default();
        let graph = Graph::new();
        let config = GapsConfig::default();
        let completion = ScriptedCompletion::new(["{\"queries\": [\"x\"]}"]);

        let report = GapAnalyzer::new(&ontology, &graph, &config)
            .run(Some(&completion), "empty.ttl")
            .await;
        assert!(report.coverage.is_empty());
        assert!(report.queries.is_empty());
        assert_eq!(completion.calls(), 0);
    }

    #[tokio::test]
    async fn test_report_save_and_read_back_queries() {
        let ontology = ontology();
        let graph = graph();
        let config = GapsConfig::default();
        let report = GapAnalyzer::new(&ontology, &graph, &config)
            .run(None, "knowledge_graph.ttl")
            .await;

        let text = report.render();
        assert!(text.contains("SOURCE DISCOVERY REPORT"));
        let stamp = report.generated.format("%Y-%m-%d %H:%M:%S").to_string();
        assert!(text.contains(&format!("Generated: {}\nGraph: knowledge_graph.ttl\n", stamp)));
        assert!(!text.contains("Generated: knowledge_graph.ttl"));
        assert!(text.contains("  Reasoner: MEDIUM (35/100)"));
        assert!(text.contains("  - uses ontology: Reasoner → Ontology"));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("discovery_report.txt");
        report.save(&path).unwrap();

        let saved = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            parse_report_queries(&saved),
            vec!["Reasoner overview examples".to_string()]
        );
    }
}
