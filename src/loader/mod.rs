//! 문서 로더
//!
//! 소스 디렉토리의 파일을 수집 → 텍스트 추출 → front matter 분리하여
//! `Document` 목록을 만듭니다. 실패한 파일은 경고 후 건너뜁니다.

pub mod frontmatter;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use serde::Serialize;

use crate::collector::{CollectedFile, CollectionStats, FileCollector, FileType};
use crate::extractor::ContentExtractor;
use crate::graph::sanitize_local;

pub use frontmatter::FrontMatter;

static WIKILINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]]+)\]\]").expect("Invalid regex"));

// ============================================================================
// Document
// ============================================================================

/// 로드된 문서 (한 번의 실행 동안 불변)
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    /// 그래프 로컬 이름 (제목 기반, 코퍼스 내 고유)
    pub id: String,
    pub title: String,
    /// front matter를 제외한 본문
    pub text: String,
    /// 소스 디렉토리 기준 상대 경로
    pub path: String,
    #[serde(skip)]
    pub source_path: PathBuf,
    #[serde(skip)]
    pub format: FileType,
    pub front_matter: FrontMatter,
}

impl Document {
    /// 파일 이름 (주석 파일의 키)
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// `## ` 섹션 제목 목록 ("Introduction" 제외)
    pub fn section_headings(&self) -> Vec<String> {
        self.text
            .lines()
            .filter_map(|line| line.trim().strip_prefix("## "))
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty() && h != "Introduction")
            .collect()
    }

    /// `[[Target]]` / `[[Target|Alias]]` / `[[Target#Section]]`의 대상 제목
    pub fn wikilinks(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        WIKILINK_RE
            .captures_iter(&self.text)
            .filter_map(|cap| {
                let inner = cap.get(1)?.as_str();
                let target = inner.split('|').next()?.split('#').next()?.trim();
                (!target.is_empty()).then(|| target.to_string())
            })
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }
}

/// 제목 결정: front matter `title` > 첫 `# ` 헤딩 > 형식 제목 > 파일 이름
fn resolve_title(fm: &FrontMatter, body: &str, format_title: Option<&str>, path: &Path) -> String {
    if let Some(title) = fm.text("title") {
        return title.to_string();
    }
    if let Some(heading) = body
        .lines()
        .find_map(|line| line.trim().strip_prefix("# "))
        .map(str::trim)
        .filter(|h| !h.is_empty())
    {
        return heading.to_string();
    }
    if let Some(title) = format_title.filter(|t| !t.trim().is_empty()) {
        return title.trim().to_string();
    }
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "untitled".to_string())
}

// ============================================================================
// Loader
// ============================================================================

/// 문서 로더
pub struct DocumentLoader {
    collector: FileCollector,
    extractor: ContentExtractor,
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentLoader {
    pub fn new() -> Self {
        Self {
            collector: FileCollector::with_defaults(),
            extractor: ContentExtractor::new(),
        }
    }

    /// 디렉토리의 모든 지원 파일 로드
    ///
    /// 개별 파일 실패는 경고 후 건너뛰며, 전체 실행을 중단하지 않습니다.
    pub async fn load_directory(&self, root: &Path) -> Result<Vec<Document>> {
        let files = self.collector.collect_directory(root)?;
        let stats = CollectionStats::from_files(&files);
        tracing::debug!(
            "Sources: {} markdown, {} text, {} pdf, {} html ({} bytes)",
            stats.markdown_files,
            stats.text_files,
            stats.pdf_files,
            stats.html_files,
            stats.total_size
        );

        let mut documents = Vec::with_capacity(files.len());
        let mut used_ids = HashSet::new();

        for file in &files {
            match self.load_file(file).await {
                Ok(mut doc) => {
                    doc.id = unique_id(&doc.id, &mut used_ids);
                    tracing::debug!("Loaded {} ({})", doc.title, doc.path);
                    documents.push(doc);
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {:#}", file.relative, e);
                }
            }
        }

        tracing::info!(
            "Loaded {} documents ({} skipped)",
            documents.len(),
            files.len() - documents.len()
        );
        Ok(documents)
    }

    /// 단일 파일 로드
    pub async fn load_file(&self, file: &CollectedFile) -> Result<Document> {
        let content = self.extractor.extract(&file.path, file.file_type).await?;

        let (front_matter, body) = match file.file_type {
            FileType::Markdown | FileType::Text => {
                let (fm, body) = frontmatter::split(&content.text);
                (fm, body.to_string())
            }
            _ => (FrontMatter::default(), content.text.clone()),
        };

        if body.trim().is_empty() {
            anyhow::bail!("no extractable text");
        }

        let title = resolve_title(&front_matter, &body, content.title.as_deref(), &file.path);
        let id = match sanitize_local(&title) {
            id if id.is_empty() => "document".to_string(),
            id => id,
        };

        Ok(Document {
            id,
            title,
            text: body,
            path: file.relative.clone(),
            source_path: file.path.clone(),
            format: file.file_type,
            front_matter,
        })
    }
}

/// 중복 ID에 `_2`, `_3`... 접미사
fn unique_id(base: &str, used: &mut HashSet<String>) -> String {
    if used.insert(base.to_string()) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}", base, n);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn load(files: &[(&str, &str)]) -> Vec<Document> {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
        DocumentLoader::new()
            .load_directory(dir.path())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_title_resolution_order() {
        let docs = load(&[
            ("a.md", "---\ntitle: From Front Matter\n---\n# From Heading\n"),
            ("b.md", "intro\n\n# From Heading\n\ntext"),
            ("c-file-stem.txt", "no headings at all"),
        ])
        .await;
        let titles: Vec<_> = docs.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["From Front Matter", "From Heading", "c-file-stem"]);
        assert_eq!(docs[0].text, "# From Heading\n");
    }

    #[tokio::test]
    async fn test_bad_file_is_skipped() {
        let docs = load(&[
            ("good.md", "# Good\n\nContent"),
            ("empty.md", "   \n"),
            ("broken.pdf", "not really a pdf"),
        ])
        .await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].title, "Good");
    }

    #[tokio::test]
    async fn test_duplicate_titles_get_unique_ids() {
        let docs = load(&[("x/one.md", "# Same Title\n"), ("y/two.md", "# Same Title\n")]).await;
        assert_eq!(docs[0].id, "Same_Title");
        assert_eq!(docs[1].id, "Same_Title_2");
        assert_eq!(docs[1].path, "y/two.md");
        assert_eq!(docs[1].file_name(), "two.md");
    }

    #[tokio::test]
    async fn test_reload_is_identical() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("n.md"), "# Note\n\nPara one.\n\nPara two.").unwrap();
        let loader = DocumentLoader::new();
        let first = loader.load_directory(dir.path()).await.unwrap();
        let second = loader.load_directory(dir.path()).await.unwrap();
        assert_eq!(first[0].text, second[0].text);
        assert_eq!(first[0].id, second[0].id);
    }

    #[test]
    fn test_wikilinks_and_headings() {
        let doc = Document {
            id: "d".to_string(),
            title: "D".to_string(),
            text: "See [[RDF Basics|rdf]] and [[Graphs#Intro]] and [[RDF Basics]].\n\n## Introduction\n\n## Triple Stores\n".to_string(),
            path: "d.md".to_string(),
            source_path: PathBuf::from("d.md"),
            format: FileType::Markdown,
            front_matter: FrontMatter::default(),
        };
        assert_eq!(doc.wikilinks(), vec!["RDF Basics", "Graphs"]);
        assert_eq!(doc.section_headings(), vec!["Triple Stores"]);
    }
}
