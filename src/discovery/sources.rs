//! 문헌 검색 API 클라이언트
//!
//! - OpenAlex: https://docs.openalex.org/api-entities/works/search-works
//! - arXiv: https://info.arxiv.org/help/api/user-manual.html (Atom 피드)
//! - Semantic Scholar: https://api.semanticscholar.org/api-docs/graph
//! - Crossref: https://api.crossref.org/swagger-ui/index.html
//!
//! 각 클라이언트는 HTTP 호출과 응답 파싱을 분리해 파싱만 단위 테스트합니다.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use super::{Candidate, LiteratureSource};

const USER_AGENT: &str = "pkm-rag/0.1 (literature discovery)";
const TIMEOUT_SECS: u64 = 10;
/// 초록 미리보기 길이 (문자)
const SNIPPET_CHARS: usize = 300;
const NO_ABSTRACT: &str = "No abstract available";

/// 공용 HTTP 클라이언트
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(TIMEOUT_SECS))
        .build()
        .context("Failed to build HTTP client")
}

/// 설정 이름으로 소스 생성 (알 수 없는 이름은 경고 후 무시)
pub fn create_sources(names: &[String]) -> Result<Vec<Box<dyn LiteratureSource>>> {
    let client = http_client()?;
    let mut sources: Vec<Box<dyn LiteratureSource>> = Vec::new();
    for name in names {
        match name.as_str() {
            "openalex" => sources.push(Box::new(OpenAlex::new(client.clone()))),
            "arxiv" => sources.push(Box::new(Arxiv::new(client.clone()))),
            "semantic_scholar" => sources.push(Box::new(SemanticScholar::new(client.clone()))),
            "crossref" => sources.push(Box::new(Crossref::new(client.clone()))),
            other => tracing::warn!("Unknown literature source '{}', ignoring", other),
        }
    }
    Ok(sources)
}

async fn get_text(request: reqwest::RequestBuilder, source: &str) -> Result<String> {
    let response = request
        .send()
        .await
        .with_context(|| format!("{} request failed", source))?;
    let status = response.status();
    if !status.is_success() {
        bail!("{} returned HTTP {}", source, status);
    }
    response
        .text()
        .await
        .with_context(|| format!("Failed to read {} response", source))
}

// ============================================================================
// OpenAlex
// ============================================================================

pub struct OpenAlex {
    client: reqwest::Client,
}

impl OpenAlex {
    pub const ENDPOINT: &'static str = "https://api.openalex.org/works";

    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAlexResponse {
    #[serde(default)]
    results: Vec<OpenAlexWork>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexWork {
    title: Option<String>,
    doi: Option<String>,
    primary_location: Option<OpenAlexLocation>,
    abstract_inverted_index: Option<BTreeMap<String, Vec<usize>>>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexLocation {
    landing_page_url: Option<String>,
}

/// 역색인(단어 → 위치)으로부터 초록 복원
fn rebuild_abstract(index: &BTreeMap<String, Vec<usize>>) -> String {
    let mut words: Vec<(usize, &str)> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |&p| (p, word.as_str())))
        .collect();
    words.sort();
    words
        .into_iter()
        .map(|(_, word)| word)
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn parse_openalex(body: &str) -> Result<Vec<Candidate>> {
    let response: OpenAlexResponse =
        serde_json::from_str(body).context("Invalid OpenAlex response")?;

    Ok(response
        .results
        .into_iter()
        .filter_map(|work| {
            let url = work
                .primary_location
                .and_then(|loc| loc.landing_page_url)
                .or(work.doi)
                .filter(|u| !u.is_empty())?;
            let snippet = work
                .abstract_inverted_index
                .filter(|index| !index.is_empty())
                .map(|index| take_chars(&rebuild_abstract(&index), SNIPPET_CHARS))
                .unwrap_or_else(|| NO_ABSTRACT.to_string());
            Some(Candidate {
                title: work.title.unwrap_or_else(|| "Untitled".to_string()),
                url,
                snippet,
                source: "OpenAlex".to_string(),
            })
        })
        .collect())
}

#[async_trait]
impl LiteratureSource for OpenAlex {
    fn name(&self) -> &str {
        "OpenAlex"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Candidate>> {
        let per_page = max_results.to_string();
        let request = self.client.get(Self::ENDPOINT).query(&[
            ("search", query),
            ("per_page", per_page.as_str()),
            ("filter", "is_oa:true"),
            ("sort", "cited_by_count:desc"),
        ]);
        parse_openalex(&get_text(request, self.name()).await?)
    }
}

// ============================================================================
// arXiv
// ============================================================================

static ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<entry>(.*?)</entry>").expect("Invalid regex"));
static ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<id>(.*?)</id>").expect("Invalid regex"));
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<title[^>]*>(.*?)</title>").expect("Invalid regex"));
static SUMMARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<summary[^>]*>(.*?)</summary>").expect("Invalid regex"));

pub struct Arxiv {
    client: reqwest::Client,
}

impl Arxiv {
    pub const ENDPOINT: &'static str = "https://export.arxiv.org/api/query";

    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

pub(crate) fn parse_arxiv(feed: &str) -> Vec<Candidate> {
    let capture = |re: &Regex, text: &str| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| collapse_whitespace(&decode_entities(m.as_str())))
    };

    ENTRY_RE
        .captures_iter(feed)
        .filter_map(|entry| {
            let body = entry.get(1)?.as_str();
            let url = capture(&ID_RE, body).filter(|u| !u.is_empty())?;
            let title = capture(&TITLE_RE, body).unwrap_or_else(|| "Untitled".to_string());
            let snippet = capture(&SUMMARY_RE, body)
                .map(|s| take_chars(&s, SNIPPET_CHARS))
                .unwrap_or_else(|| NO_ABSTRACT.to_string());
            Some(Candidate {
                title,
                url,
                snippet,
                source: "arXiv".to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl LiteratureSource for Arxiv {
    fn name(&self) -> &str {
        "arXiv"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Candidate>> {
        let search_query = format!("all:{}", query);
        let max = max_results.to_string();
        let request = self.client.get(Self::ENDPOINT).query(&[
            ("search_query", search_query.as_str()),
            ("start", "0"),
            ("max_results", max.as_str()),
        ]);
        Ok(parse_arxiv(&get_text(request, self.name()).await?))
    }
}

// ============================================================================
// Semantic Scholar
// ============================================================================

pub struct SemanticScholar {
    client: reqwest::Client,
}

impl SemanticScholar {
    pub const ENDPOINT: &'static str = "https://api.semanticscholar.org/graph/v1/paper/search";

    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ScholarResponse {
    #[serde(default)]
    data: Vec<ScholarPaper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScholarPaper {
    paper_id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
}

pub(crate) fn parse_semantic_scholar(body: &str) -> Result<Vec<Candidate>> {
    let response: ScholarResponse =
        serde_json::from_str(body).context("Invalid Semantic Scholar response")?;

    Ok(response
        .data
        .into_iter()
        .filter_map(|paper| {
            let url = paper
                .url
                .filter(|u| !u.is_empty())
                .or_else(|| {
                    paper
                        .paper_id
                        .map(|id| format!("https://www.semanticscholar.org/paper/{}", id))
                })?;
            Some(Candidate {
                title: paper.title.unwrap_or_else(|| "Untitled".to_string()),
                url,
                snippet: paper
                    .abstract_text
                    .map(|a| take_chars(&a, SNIPPET_CHARS))
                    .unwrap_or_else(|| NO_ABSTRACT.to_string()),
                source: "Semantic Scholar".to_string(),
            })
        })
        .collect())
}

#[async_trait]
impl LiteratureSource for SemanticScholar {
    fn name(&self) -> &str {
        "Semantic Scholar"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Candidate>> {
        let limit = max_results.to_string();
        let request = self.client.get(Self::ENDPOINT).query(&[
            ("query", query),
            ("limit", limit.as_str()),
            ("fields", "title,url,abstract"),
        ]);
        parse_semantic_scholar(&get_text(request, self.name()).await?)
    }
}

// ============================================================================
// Crossref
// ============================================================================

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("Invalid regex"));

pub struct Crossref {
    client: reqwest::Client,
}

impl Crossref {
    pub const ENDPOINT: &'static str = "https://api.crossref.org/works";

    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct CrossrefResponse {
    message: CrossrefMessage,
}

#[derive(Debug, Deserialize)]
struct CrossrefMessage {
    #[serde(default)]
    items: Vec<CrossrefItem>,
}

#[derive(Debug, Deserialize)]
struct CrossrefItem {
    #[serde(default)]
    title: Vec<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
}

pub(crate) fn parse_crossref(body: &str) -> Result<Vec<Candidate>> {
    let response: CrossrefResponse =
        serde_json::from_str(body).context("Invalid Crossref response")?;

    Ok(response
        .message
        .items
        .into_iter()
        .filter_map(|item| {
            let url = item.url.filter(|u| !u.is_empty())?;
            let title = item.title.into_iter().next()?;
            // JATS 태그 제거
            let snippet = item
                .abstract_text
                .map(|a| take_chars(&collapse_whitespace(&TAG_RE.replace_all(&a, " ")), SNIPPET_CHARS))
                .unwrap_or_else(|| NO_ABSTRACT.to_string());
            Some(Candidate {
                title,
                url,
                snippet,
                source: "Crossref".to_string(),
            })
        })
        .collect())
}

#[async_trait]
impl LiteratureSource for Crossref {
    fn name(&self) -> &str {
        "Crossref"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Candidate>> {
        let rows = max_results.to_string();
        let request = self
            .client
            .get(Self::ENDPOINT)
            .query(&[("query", query), ("rows", rows.as_str())]);
        parse_crossref(&get_text(request, self.name()).await?)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn take_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openalex_rebuilds_abstract() {
        let body = r#"{
            "results": [
                {
                    "title": "Linked Data Quality",
                    "doi": "https://doi.org/10.1/ldq",
                    "primary_location": {"landing_page_url": "https://example.org/ldq"},
                    "abstract_inverted_index": {"quality": [2], "Linked": [0], "data": [1]}
                },
                {
                    "title": "No Location",
                    "doi": "https://doi.org/10.1/nl",
                    "primary_location": null,
                    "abstract_inverted_index": null
                },
                {"title": "No URL at all"}
            ]
        }"#;

        let candidates = parse_openalex(body).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].url, "https://example.org/ldq");
        assert_eq!(candidates[0].snippet, "Linked data quality");
        assert_eq!(candidates[1].url, "https://doi.org/10.1/nl");
        assert_eq!(candidates[1].snippet, NO_ABSTRACT);
        assert_eq!(candidates[1].source, "OpenAlex");
    }

    #[test]
    fn test_parse_arxiv_feed() {
        let feed = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query</title>
  <entry>
    <id>http://arxiv.org/abs/2101.00001v1</id>
    <title>SPARQL Query
      Optimisation</title>
    <summary>  We study joins &amp; filters.  </summary>
  </entry>
  <entry>
    <title>Missing id</title>
  </entry>
</feed>"#;

        let candidates = parse_arxiv(feed);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "SPARQL Query Optimisation");
        assert_eq!(candidates[0].url, "http://arxiv.org/abs/2101.00001v1");
        assert_eq!(candidates[0].snippet, "We study joins & filters.");
    }

    #[test]
    fn test_parse_semantic_scholar() {
        let body = r#"{"total": 2, "data": [
            {"paperId": "abc", "title": "Ontology Matching", "url": null, "abstract": null},
            {"paperId": "def", "title": "Graph Embeddings", "url": "https://s2.org/def", "abstract": "Vectors."}
        ]}"#;

        let candidates = parse_semantic_scholar(body).unwrap();
        assert_eq!(candidates[0].url, "https://www.semanticscholar.org/paper/abc");
        assert_eq!(candidates[0].snippet, NO_ABSTRACT);
        assert_eq!(candidates[1].snippet, "Vectors.");
    }

    #[test]
    fn test_parse_crossref_strips_jats() {
        let body = r#"{"status": "ok", "message": {"items": [
            {"title": ["Data Spaces"], "URL": "https://doi.org/10.2/ds",
             "abstract": "<jats:p>Sovereign   data sharing.</jats:p>"},
            {"title": [], "URL": "https://doi.org/10.2/untitled"}
        ]}}"#;

        let candidates = parse_crossref(body).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].snippet, "Sovereign data sharing.");
    }

    #[test]
    fn test_snippet_is_truncated_by_chars() {
        let long = "é".repeat(400);
        assert_eq!(take_chars(&long, SNIPPET_CHARS).chars().count(), 300);
    }

    #[test]
    fn test_create_sources_ignores_unknown() {
        let names = vec!["arxiv".to_string(), "bing".to_string(), "crossref".to_string()];
        let sources = create_sources(&names).unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["arXiv", "Crossref"]);
    }
}
