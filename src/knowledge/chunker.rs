//! Text Chunking Module
//!
//! 문단 경계 기반 텍스트 분할을 제공합니다.
//! 짧은 문단은 목표 토큰 수에 도달할 때까지 합치고, 문단 중간에서는 절대 자르지 않습니다.
//! 같은 입력에 대해 항상 같은 청크 시퀀스를 만듭니다.

use serde::Serialize;

use crate::config::ChunkingConfig;

// ============================================================================
// Types
// ============================================================================

/// 문서 청크
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// 부모 문서 ID
    pub doc_id: String,
    /// 문서 내 순번 (0부터)
    pub index: usize,
    pub text: String,
}

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;

    /// 문서 단위 청크 생성
    fn chunk_document(&self, doc_id: &str, text: &str) -> Vec<Chunk> {
        self.chunk(text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                doc_id: doc_id.to_string(),
                index,
                text,
            })
            .collect()
    }
}

// ============================================================================
// ParagraphChunker
// ============================================================================

/// 문단 병합 청커
///
/// 토큰 수는 `단어 수 × tokens_per_word`로 추정합니다.
/// 목표를 넘는 단일 문단은 그대로 하나의 청크가 됩니다.
pub struct ParagraphChunker {
    target_tokens: f32,
    tokens_per_word: f32,
}

impl ParagraphChunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            target_tokens: config.target_tokens as f32,
            tokens_per_word: config.tokens_per_word,
        }
    }

    /// 기본 설정 (500 토큰, 1.3 토큰/단어)
    pub fn with_defaults() -> Self {
        Self::new(&ChunkingConfig::default())
    }

    fn estimate_tokens(&self, paragraph: &str) -> f32 {
        paragraph.split_whitespace().count() as f32 * self.tokens_per_word
    }
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        let normalized = text.replace("\r\n", "\n");
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_tokens = 0.0f32;

        for para in normalized.split("\n\n") {
            let para = para.trim();
            if para.is_empty() {
                continue;
            }

            let tokens = self.estimate_tokens(para);
            if !current.is_empty() && current_tokens + tokens > self.target_tokens {
                chunks.push(current.join("\n\n"));
                current.clear();
                current_tokens = 0.0;
            }
            current.push(para);
            current_tokens += tokens;
        }

        if !current.is_empty() {
            chunks.push(current.join("\n\n"));
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "ParagraphChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// UTF-8 경계 조정 (인덱스 이하로)
#[inline]
pub fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        s.len()
    } else {
        let mut i = index;
        while i > 0 && !s.is_char_boundary(i) {
            i -= 1;
        }
        i
    }
}

/// 앞에서부터 최대 `max_bytes` 바이트 (문자 경계 유지)
pub fn truncate_at_boundary(s: &str, max_bytes: usize) -> &str {
    &s[..floor_char_boundary(s, max_bytes)]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(target_tokens: usize) -> ParagraphChunker {
        ParagraphChunker::new(&ChunkingConfig {
            target_tokens,
            tokens_per_word: 1.0,
        })
    }

    #[test]
    fn test_chunker_empty() {
        assert!(ParagraphChunker::with_defaults().chunk("").is_empty());
        assert!(ParagraphChunker::with_defaults().chunk("  \n\n  ").is_empty());
    }

    #[test]
    fn test_short_paragraphs_are_merged() {
        let text = "# Header\n\nShort paragraph.\n\nAnother one.";
        let chunks = ParagraphChunker::with_defaults().chunk(text);
        assert_eq!(chunks, vec!["# Header\n\nShort paragraph.\n\nAnother one."]);
    }

    #[test]
    fn test_splits_at_target_without_breaking_paragraphs() {
        // 각 문단 4 단어, 목표 8 토큰
        let text = "a b c d\n\ne f g h\n\ni j k l\n\nm n o p\n\nq r s t";
        let chunks = chunker(8).chunk(text);
        assert_eq!(
            chunks,
            vec!["a b c d\n\ne f g h", "i j k l\n\nm n o p", "q r s t"]
        );
    }

    #[test]
    fn test_oversized_paragraph_kept_whole() {
        let long = "word ".repeat(50);
        let text = format!("small\n\n{}\n\ntail", long.trim());
        let chunks = chunker(10).chunk(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], long.trim());
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let text = "Alpha beta.\n\nGamma delta epsilon.\r\n\r\nZeta.";
        let c = chunker(3);
        assert_eq!(c.chunk(text), c.chunk(text));
        assert_eq!(c.chunk(text).len(), 3);
    }

    #[test]
    fn test_chunk_document_indices() {
        let chunks = chunker(2).chunk_document("doc-a", "one two\n\nthree four");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].doc_id, "doc-a");
        assert_eq!(chunks[1].index, 1);
        assert_eq!(chunks[1].text, "three four");
    }

    #[test]
    fn test_truncate_at_boundary() {
        let text = "안녕하세요";
        // 한글 한 글자 = 3 바이트
        assert_eq!(truncate_at_boundary(text, 4), "안");
        assert_eq!(truncate_at_boundary(text, 100), text);
    }
}
