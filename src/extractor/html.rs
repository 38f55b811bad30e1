//! HTML 텍스트 추출
//!
//! scraper 크레이트로 파싱하여 본문 영역의 블록 요소를 문단으로 변환합니다.
//! 제목 요소는 마크다운 헤딩(`## ...`)으로 바꿔 이후 개념 추출에서 활용합니다.

use scraper::{ElementRef, Html, Selector};

/// 본문 후보 (우선순위 순)
const CONTENT_SELECTORS: [&str; 5] = ["article", "main", "[role=main]", ".content", "#content"];

/// 문단으로 취급하는 블록 요소
const BLOCK_TAGS: [&str; 11] = [
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "li", "pre", "blockquote", "td",
];

/// 텍스트 수집에서 제외하는 요소
const SKIP_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

/// 본문으로 인정하는 최소 길이
const MIN_CONTENT_CHARS: usize = 100;

/// HTML 추출 결과
#[derive(Debug, Clone, PartialEq)]
pub struct HtmlText {
    pub title: Option<String>,
    /// 문단 사이 빈 줄로 구분된 텍스트
    pub text: String,
}

/// HTML 문서에서 제목과 본문 추출
pub fn extract(html: &str) -> HtmlText {
    let document = Html::parse_document(html);
    HtmlText {
        title: extract_title(&document),
        text: extract_content(&document),
    }
}

/// `<title>` > 첫 `<h1>`
fn extract_title(document: &Html) -> Option<String> {
    for selector in ["title", "h1"] {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let title = collapse(&visible_text(&element));
            if !title.is_empty() {
                return Some(title);
            }
        }
    }
    None
}

fn extract_content(document: &Html) -> String {
    for selector in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let text = paragraphs(&element);
            if text.len() > MIN_CONTENT_CHARS {
                return text;
            }
        }
    }

    // 폴백: body 전체 (없으면 문서 루트)
    if let Ok(selector) = Selector::parse("body") {
        if let Some(body) = document.select(&selector).next() {
            return paragraphs(&body);
        }
    }
    paragraphs(&document.root_element())
}

/// 블록 요소별 문단 생성
///
/// 블록 요소가 하나도 없으면 전체 텍스트를 한 문단으로 반환합니다.
fn paragraphs(root: &ElementRef) -> String {
    let mut out: Vec<String> = Vec::new();

    for node in root.descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        let name = element.value().name();
        if !BLOCK_TAGS.contains(&name) || has_block_ancestor(&element, root) {
            continue;
        }

        let text = collapse(&visible_text(&element));
        if text.is_empty() {
            continue;
        }

        match heading_level(name) {
            Some(level) => out.push(format!("{} {}", "#".repeat(level), text)),
            None => out.push(text),
        }
    }

    if out.is_empty() {
        return collapse(&visible_text(root));
    }
    out.join("\n\n")
}

/// 중첩된 블록 (li > p 등) 중복 방지
fn has_block_ancestor(element: &ElementRef, root: &ElementRef) -> bool {
    for ancestor in element.ancestors() {
        if ancestor.id() == root.id() {
            return false;
        }
        if let Some(el) = ancestor.value().as_element() {
            if BLOCK_TAGS.contains(&el.name()) {
                return true;
            }
        }
    }
    false
}

/// script/style 하위를 제외한 텍스트
fn visible_text(element: &ElementRef) -> String {
    let mut text = String::new();
    for node in element.descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| SKIP_TAGS.contains(&e.name()))
                .unwrap_or(false)
        });
        if !hidden {
            text.push_str(fragment);
            text.push(' ');
        }
    }
    text
}

fn heading_level(name: &str) -> Option<usize> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
