//! PDF 텍스트 추출
//!
//! pdf-extract 크레이트로 텍스트를 뽑고, 폼피드 기준으로 페이지를 나눕니다.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

/// "--- Page 3 ---" 형태의 페이지 구분선
static PAGE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*[-=]+\s*(?:Page\s*)?(\d+)\s*[-=]+\s*$").expect("Invalid regex")
});

/// PDF 파일에서 페이지별 텍스트 추출
///
/// 스캔 문서처럼 텍스트가 없으면 빈 목록을 반환합니다.
pub fn extract_pages(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(Vec::new());
    }

    Ok(split_pages(&text))
}

/// 추출 텍스트를 페이지 단위로 분리
fn split_pages(text: &str) -> Vec<String> {
    let by_formfeed: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if by_formfeed.len() > 1 {
        return by_formfeed;
    }

    if PAGE_MARKER_RE.is_match(text) {
        let by_marker: Vec<String> = PAGE_MARKER_RE
            .split(text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if by_marker.len() > 1 {
            return by_marker;
        }
    }

    vec![text.trim().to_string()]
}

/// 페이지 내 줄바꿈 정리
///
/// PDF 텍스트는 줄마다 개행이 들어가므로, 빈 줄만 문단 경계로 남기고
/// 나머지 개행은 공백으로 합칩니다.
pub fn reflow(page: &str) -> String {
    page.split("\n\n")
        .map(|para| para.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|para| !para.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
