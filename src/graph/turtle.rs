//! Turtle 직렬화 / 파싱 (oxigraph `io`)
//!
//! ref: https://www.w3.org/TR/turtle/

use anyhow::{Context, Result};
use oxigraph::io::{RdfFormat, RdfParser, RdfSerializer};
use oxigraph::model::Triple;

use super::vocab::PREFIXES;
use super::Graph;

/// 그래프를 Turtle 문자열로 직렬화
///
/// 트리플은 `Graph::sorted_triples` 순서로 쓰이므로 같은 그래프는 항상 같은 바이트열을 만듭니다.
pub fn serialize(graph: &Graph) -> Result<String> {
    let mut serializer = RdfSerializer::from_format(RdfFormat::Turtle);
    for (prefix, ns) in PREFIXES {
        serializer = serializer
            .with_prefix(prefix, ns)
            .with_context(|| format!("Invalid prefix IRI {}", ns))?;
    }

    let mut writer = serializer.for_writer(Vec::new());
    for triple in graph.sorted_triples() {
        writer
            .serialize_triple(&triple)
            .context("Failed to serialize triple")?;
    }
    let bytes = writer.finish().context("Failed to finish Turtle output")?;
    String::from_utf8(bytes).context("Turtle output is not UTF-8")
}

/// Turtle 문자열을 그래프로 파싱
pub fn parse(input: &str) -> Result<Graph> {
    let mut graph = Graph::new();
    for quad in RdfParser::from_format(RdfFormat::Turtle).for_reader(input.as_bytes()) {
        let quad = quad.context("Invalid Turtle")?;
        graph.insert(&Triple::from(quad));
    }
    Ok(graph)
}
