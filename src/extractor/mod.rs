//! 콘텐츠 추출 모듈
//!
//! 파일 형식별로 평문 텍스트를 추출합니다.
//! - 마크다운 / 텍스트: UTF-8로 읽기 (잘못된 바이트는 치환)
//! - PDF: pdf-extract로 페이지별 추출 후 문단 정리
//! - HTML: 본문 블록 요소를 문단으로 변환

pub mod html;
pub mod pdf;

use std::path::Path;

use anyhow::{Context, Result};

use crate::collector::FileType;

/// 추출된 콘텐츠
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    /// 추출된 텍스트
    pub text: String,
    /// 형식 자체에 들어있는 제목 (HTML `<title>`)
    pub title: Option<String>,
    /// PDF 페이지 수
    pub pages: Option<usize>,
}

impl ExtractedContent {
    fn plain(text: String) -> Self {
        Self {
            text,
            title: None,
            pages: None,
        }
    }
}

/// 콘텐츠 추출기
#[derive(Debug, Default)]
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 파일에서 콘텐츠 추출
    pub async fn extract(&self, path: &Path, file_type: FileType) -> Result<ExtractedContent> {
        match file_type {
            FileType::Markdown | FileType::Text => self.extract_text(path).await,
            FileType::Pdf => self.extract_pdf(path).await,
            FileType::Html => self.extract_html(path).await,
        }
    }

    async fn extract_text(&self, path: &Path) -> Result<ExtractedContent> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read text file: {:?}", path))?;

        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!("Invalid UTF-8 in {:?}, replacing bad bytes", path);
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };

        Ok(ExtractedContent::plain(text))
    }

    async fn extract_pdf(&self, path: &Path) -> Result<ExtractedContent> {
        // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
        let owned = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || pdf::extract_pages(&owned))
            .await
            .context("PDF extraction task failed")??;

        let text = pages
            .iter()
            .map(|page| pdf::reflow(page))
            .filter(|page| !page.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(ExtractedContent {
            text,
            title: None,
            pages: Some(pages.len()),
        })
    }

    async fn extract_html(&self, path: &Path) -> Result<ExtractedContent> {
        let raw = self.extract_text(path).await?.text;
        let extracted = html::extract(&raw);
        Ok(ExtractedContent {
            text: extracted.text,
            title: extracted.title,
            pages: None,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
