//! SPARQL 질의
//!
//! 지식 그래프를 oxigraph 인메모리 `Store`에 적재한 뒤 질의합니다.
//! SELECT 결과는 변수 이름 → 값 문자열 행으로 변환합니다.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use oxigraph::model::GraphNameRef;
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;
use serde::Serialize;

use super::{term_value, Graph, Term};

/// 결과 행 (변수 → 값, 바인딩되지 않은 변수는 생략)
pub type SolutionRow = BTreeMap<String, String>;

/// 질의 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SparqlOutcome {
    /// SELECT
    Solutions {
        variables: Vec<String>,
        rows: Vec<SolutionRow>,
    },
    /// ASK
    Boolean { value: bool },
    /// CONSTRUCT / DESCRIBE (N-Triples 행)
    Triples { triples: Vec<String> },
}

impl SparqlOutcome {
    pub fn len(&self) -> usize {
        match self {
            SparqlOutcome::Solutions { rows, .. } => rows.len(),
            SparqlOutcome::Boolean { .. } => 1,
            SparqlOutcome::Triples { triples } => triples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 그래프에 SPARQL 질의 실행
pub fn query(graph: &Graph, sparql: &str) -> Result<SparqlOutcome> {
    let store = Store::new().context("Failed to create in-memory store")?;
    for triple in graph.iter() {
        store
            .insert(triple.in_graph(GraphNameRef::DefaultGraph))
            .context("Failed to load triple into store")?;
    }

    let results = store.query(sparql).context("SPARQL query failed")?;
    let outcome = match results {
        QueryResults::Solutions(solutions) => {
            let variables: Vec<String> = solutions
                .variables()
                .iter()
                .map(|v| v.as_str().to_string())
                .collect();
            let mut rows = Vec::new();
            for solution in solutions {
                let solution = solution.context("SPARQL evaluation failed")?;
                let row: SolutionRow = solution
                    .iter()
                    .map(|(variable, term)| (variable.as_str().to_string(), render_term(term)))
                    .collect();
                rows.push(row);
            }
            SparqlOutcome::Solutions { variables, rows }
        }
        QueryResults::Boolean(value) => SparqlOutcome::Boolean { value },
        QueryResults::Graph(triples) => {
            let mut out = Vec::new();
            for triple in triples {
                out.push(triple.context("SPARQL evaluation failed")?.to_string());
            }
            SparqlOutcome::Triples { triples: out }
        }
    };

    tracing::debug!("SPARQL query returned {} results", outcome.len());
    Ok(outcome)
}

/// IRI와 리터럴은 값 그대로, 빈 노드는 `_:id`
fn render_term(term: &Term) -> String {
    match term {
        Term::BlankNode(node) => node.to_string(),
        other => term_value(other).to_string(),
    }
}
