//! Front matter 파싱
//!
//! 문서 맨 앞의 `---` 블록을 YAML(serde_yaml)로 읽습니다.
//! 최상위는 매핑이어야 하며, 숫자 / 불리언 스칼라는 문자열로 정규화합니다.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_yaml::{Mapping, Value};

/// 파싱된 front matter
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrontMatter {
    entries: BTreeMap<String, Value>,
}

impl FrontMatter {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// 문자열 값 (리스트면 첫 문자열 원소)
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.entries.get(key)? {
            Value::String(s) => Some(s.trim()).filter(|s| !s.is_empty()),
            Value::Sequence(items) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .find(|s| !s.is_empty()),
            _ => None,
        }
    }

    /// 리스트 값 (문자열이면 콤마로 분리)
    pub fn list(&self, key: &str) -> Vec<String> {
        match self.entries.get(key) {
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// 태그 (`tags` 또는 `tag`), '#' 접두어 제거
    pub fn tags(&self) -> Vec<String> {
        let mut tags = self.list("tags");
        if tags.is_empty() {
            tags = self.list("tag");
        }
        tags.into_iter()
            .map(|t| t.trim_start_matches('#').to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// front matter와 본문 분리
///
/// 닫는 `---`(또는 `...`)가 없으면 front matter가 없는 것으로 봅니다.
pub fn split(raw: &str) -> (FrontMatter, &str) {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return (FrontMatter::default(), text);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let block = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (parse_block(block), body);
        }
        offset += line.len();
    }

    // 마지막 줄이 개행 없이 `---`로 끝나는 경우
    if rest.trim_end() == "---" {
        return (FrontMatter::default(), "");
    }

    (FrontMatter::default(), text)
}

/// YAML 블록 파싱 (오류 시 경고 후 빈 front matter)
fn parse_block(block: &str) -> FrontMatter {
    if block.trim().is_empty() {
        return FrontMatter::default();
    }

    let mapping: Mapping = match serde_yaml::from_str(block) {
        Ok(mapping) => mapping,
        Err(e) => {
            tracing::warn!("Ignoring malformed front matter: {}", e);
            return FrontMatter::default();
        }
    };

    let entries = mapping
        .into_iter()
        .filter_map(|(key, value)| {
            let key = match normalize(key) {
                Value::String(key) => key,
                _ => return None,
            };
            Some((key, normalize(value)))
        })
        .collect();

    FrontMatter { entries }
}

fn normalize(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(normalize).collect()),
        Value::Tagged(tagged) => normalize(tagged.value),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_front_matter() {
        let (fm, body) = split("# Title\n\nBody");
        assert!(fm.is_empty());
        assert_eq!(body, "# Title\n\nBody");
    }

    #[test]
    fn test_scalar_and_inline_list() {
        let raw = "---\ntitle: \"RDF Primer\"\nauthor: Jane Doe\ntags: [rdf, 'sparql', \"#semweb\"]\n---\n# Heading\n";
        let (fm, body) = split(raw);
        assert_eq!(fm.text("title"), Some("RDF Primer"));
        assert_eq!(fm.text("author"), Some("Jane Doe"));
        assert_eq!(fm.tags(), vec!["rdf", "sparql", "semweb"]);
        assert_eq!(body, "# Heading\n");
    }

    #[test]
    fn test_block_list() {
        let raw = "---\ntags:\n  - knowledge graph\n  - ontology\ncreated: 2024-01-05\n---\nbody";
        let (fm, body) = split(raw);
        assert_eq!(fm.tags(), vec!["knowledge graph", "ontology"]);
        assert_eq!(fm.text("created"), Some("2024-01-05"));
        assert_eq!(body, "body");
    }

    #[test]
    fn test_comma_separated_scalar_tags() {
        let (fm, _) = split("---\ntags: a, b\n---\n");
        assert_eq!(fm.tags(), vec!["a", "b"]);
    }

    #[test]
    fn test_numbers_and_booleans_become_text() {
        let (fm, _) = split("---\nyear: 2024\ndraft: false\ntags: [2024, rdf]\n---\n");
        assert_eq!(fm.text("year"), Some("2024"));
        assert_eq!(fm.text("draft"), Some("false"));
        assert_eq!(fm.tags(), vec!["2024", "rdf"]);
    }

    #[test]
    fn test_unclosed_front_matter_is_body() {
        let raw = "---\ntitle: x\nno closing";
        let (fm, body) = split(raw);
        assert!(fm.is_empty());
        assert_eq!(body, raw);
    }

    #[test]
    fn test_nested_mapping_is_kept_but_not_text() {
        let raw = "---\nmeta:\n  nested: value\ntitle: T\n---\n";
        let (fm, _) = split(raw);
        assert_eq!(fm.text("title"), Some("T"));
        assert_eq!(fm.text("meta"), None);
        let nested = fm.get("meta").and_then(|m| m.get("nested"));
        assert_eq!(nested.and_then(Value::as_str), Some("value"));
    }

    #[test]
    fn test_folded_and_literal_blocks() {
        let raw = "---\nsummary: >\n  Linked data\n  on the web\nauthor: |\n  Ada\n---\nbody";
        let (fm, body) = split(raw);
        assert_eq!(fm.text("summary"), Some("Linked data on the web"));
        assert_eq!(fm.text("author"), Some("Ada"));
        assert_eq!(body, "body");
    }

    #[test]
    fn test_malformed_yaml_is_ignored() {
        let (fm, body) = split("---\ntitle: [unclosed\n---\nbody");
        assert!(fm.is_empty());
        assert_eq!(body, "body");
    }

    #[test]
    fn test_crlf_front_matter() {
        let (fm, body) = split("---\r\ntitle: Win\r\n---\r\nbody");
        assert_eq!(fm.text("title"), Some("Win"));
        assert_eq!(body, "body");
    }
}
