//! 파일 수집 모듈
//!
//! 소스 디렉토리를 재귀 탐색하여 지원하는 확장자의 파일을 수집합니다.
//! .gitignore 패턴을 존중하며, 결과는 경로 순으로 정렬됩니다.

use std::path::{Path, PathBuf};

use anyhow::Result;
use ignore::WalkBuilder;

// ============================================================================
// File Types
// ============================================================================

/// 지원하는 파일 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// 마크다운 (front matter 지원)
    Markdown,
    /// 일반 텍스트
    Text,
    /// PDF 파일
    Pdf,
    /// HTML 파일 (본문 텍스트만 추출)
    Html,
}

impl FileType {
    /// 확장자로 파일 타입 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "md" | "markdown" => Some(FileType::Markdown),
            "txt" => Some(FileType::Text),
            "pdf" => Some(FileType::Pdf),
            "html" | "htm" => Some(FileType::Html),
            _ => None,
        }
    }

    /// 파일 경로에서 타입 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// MIME 타입 (그래프의 onto:sourceFormat)
    pub fn mime(&self) -> &'static str {
        match self {
            FileType::Markdown => "text/markdown",
            FileType::Text => "text/plain",
            FileType::Pdf => "application/pdf",
            FileType::Html => "text/html",
        }
    }
}

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 파일 정보
#[derive(Debug, Clone)]
pub struct CollectedFile {
    /// 파일 경로
    pub path: PathBuf,
    /// 소스 디렉토리 기준 상대 경로 ('/' 구분)
    pub relative: String,
    pub file_type: FileType,
    /// 파일 크기 (바이트)
    pub size: u64,
}

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

/// 파일 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 수집기 생성
    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 폴더 재귀 수집
    ///
    /// 디렉토리가 없으면 빈 목록을 반환합니다.
    pub fn collect_directory(&self, root: &Path) -> Result<Vec<CollectedFile>> {
        if !root.is_dir() {
            tracing::warn!("Sources directory does not exist: {:?}", root);
            return Ok(Vec::new());
        }

        let mut files = Vec::new();

        let walker = WalkBuilder::new(root)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            let path = entry.path();
            let Some(file_type) = FileType::from_path(path) else {
                continue;
            };

            let size = match entry.metadata() {
                Ok(m) => m.len(),
                Err(e) => {
                    tracing::warn!("Failed to read metadata {:?}: {}", path, e);
                    continue;
                }
            };

            if self.config.max_file_size > 0 && size > self.config.max_file_size {
                tracing::warn!("Skipping large file: {:?} ({} bytes)", path, size);
                continue;
            }

            files.push(CollectedFile {
                path: path.to_path_buf(),
                relative: relative_path(root, path),
                file_type,
                size,
            });
        }

        // 파일시스템 순회 순서와 무관하게 결정적 출력
        files.sort_by(|a, b| a.relative.cmp(&b.relative));

        tracing::info!("Collected {} files from {:?}", files.len(), root);
        Ok(files)
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// ============================================================================
// Statistics
// ============================================================================

/// 수집 통계
#[derive(Debug, Default)]
pub struct CollectionStats {
    pub total_files: usize,
    pub markdown_files: usize,
    pub text_files: usize,
    pub pdf_files: usize,
    pub html_files: usize,
    pub total_size: u64,
}

impl CollectionStats {
    /// 수집된 파일 목록에서 통계 계산
    pub fn from_files(files: &[CollectedFile]) -> Self {
        let mut stats = Self::default();

        for file in files {
            stats.total_files += 1;
            stats.total_size += file.size;

            match file.file_type {
                FileType::Markdown => stats.markdown_files += 1,
                FileType::Text => stats.text_files += 1,
                FileType::Pdf => stats.pdf_files += 1,
                FileType::Html => stats.html_files += 1,
            }
        }

        stats
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_type_from_extension() {
        assert_eq!(FileType::from_extension("md"), Some(FileType::Markdown));
        assert_eq!(FileType::from_extension("TXT"), Some(FileType::Text));
        assert_eq!(FileType::from_extension("htm"), Some(FileType::Html));
        assert_eq!(FileType::from_extension("PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_extension("png"), None);
    }

    #[test]
    fn test_mime() {
        assert_eq!(FileType::Markdown.mime(), "text/markdown");
        assert_eq!(FileType::Pdf.mime(), "application/pdf");
    }

    #[test]
    fn test_collect_directory_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("b.md"), "# B").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("sub/c.html"), "<p>c</p>").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8; 4]).unwrap();

        let files = FileCollector::with_defaults()
            .collect_directory(dir.path())
            .unwrap();
        let names: Vec<_> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.md", "sub/c.html"]);

        let stats = CollectionStats::from_files(&files);
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.html_files, 1);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let files = FileCollector::with_defaults()
            .collect_directory(Path::new("/nonexistent/pkm-rag/sources"))
            .unwrap();
        assert!(files.is_empty());
    }
}
