//! 캐시 모듈
//!
//! 콘텐츠 해시(SHA-256) 기반 파일 캐시입니다.
//! - 임베딩: `{embeddings_dir}/{hash}.npy`
//! - 추출 개념: `{keywords_dir}/{hash}.json`
//!
//! 엔트리는 최초 요청 시 생성되고, 파일을 지우기 전까지 무효화되지 않습니다.
//! 손상된 파일은 경고 후 캐시 미스로 취급합니다.

pub mod npy;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::PathsConfig;
use crate::embedding::EmbeddingProvider;

// ============================================================================
// Cache
// ============================================================================

/// 임베딩 / 개념 캐시
///
/// 디렉토리에서 만들어 참조로 전달합니다.
#[derive(Debug, Clone)]
pub struct Cache {
    embeddings_dir: PathBuf,
    keywords_dir: PathBuf,
}

/// 개념 캐시 엔트리
#[derive(Debug, Serialize, Deserialize)]
struct KeywordEntry<T> {
    strategy: String,
    concepts: T,
}

impl Cache {
    /// 캐시 디렉토리 열기 (없으면 생성)
    pub fn open(embeddings_dir: impl Into<PathBuf>, keywords_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache = Self {
            embeddings_dir: embeddings_dir.into(),
            keywords_dir: keywords_dir.into(),
        };
        std::fs::create_dir_all(&cache.embeddings_dir).with_context(|| {
            format!("Failed to create cache dir {:?}", cache.embeddings_dir)
        })?;
        std::fs::create_dir_all(&cache.keywords_dir)
            .with_context(|| format!("Failed to create cache dir {:?}", cache.keywords_dir))?;
        Ok(cache)
    }

    pub fn from_paths(paths: &PathsConfig) -> Result<Self> {
        Self::open(&paths.embeddings_dir, &paths.keywords_dir)
    }

    fn embedding_path(&self, text: &str) -> PathBuf {
        self.embeddings_dir.join(format!("{}.npy", content_hash(text)))
    }

    fn keywords_path(&self, strategy: &str, text: &str) -> PathBuf {
        self.keywords_dir
            .join(format!("{}.json", content_hash(&format!("{}\n{}", strategy, text))))
    }

    /// 캐시된 임베딩 조회
    pub fn get_embedding(&self, text: &str) -> Option<Vec<f32>> {
        let path = self.embedding_path(text);
        let bytes = std::fs::read(&path).ok()?;
        match npy::decode(&bytes) {
            Ok(vector) if !vector.is_empty() => Some(vector),
            Ok(_) => {
                tracing::warn!("Empty embedding cache entry {:?}, ignoring", path);
                None
            }
            Err(e) => {
                tracing::warn!("Malformed embedding cache entry {:?}: {}", path, e);
                None
            }
        }
    }

    /// 임베딩 저장
    pub fn put_embedding(&self, text: &str, vector: &[f32]) -> Result<()> {
        let path = self.embedding_path(text);
        std::fs::write(&path, npy::encode(vector))
            .with_context(|| format!("Failed to write {:?}", path))
    }

    /// 캐시된 개념 목록 조회
    ///
    /// 같은 텍스트라도 추출 전략이 다르면 별도 엔트리입니다.
    pub fn get_keywords<T: DeserializeOwned>(&self, strategy: &str, text: &str) -> Option<T> {
        let path = self.keywords_path(strategy, text);
        let raw = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<KeywordEntry<T>>(&raw) {
            Ok(entry) => Some(entry.concepts),
            Err(e) => {
                tracing::warn!("Malformed keyword cache entry {:?}: {}", path, e);
                None
            }
        }
    }

    /// 개념 목록 저장
    pub fn put_keywords<T: Serialize>(&self, strategy: &str, text: &str, concepts: &T) -> Result<()> {
        let path = self.keywords_path(strategy, text);
        let entry = KeywordEntry {
            strategy: strategy.to_string(),
            concepts,
        };
        let json = serde_json::to_string_pretty(&entry)?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))
    }

    /// 캐시 엔트리 수 (임베딩, 개념)
    pub fn stats(&self) -> (usize, usize) {
        (
            count_files(&self.embeddings_dir, "npy"),
            count_files(&self.keywords_dir, "json"),
        )
    }
}

/// SHA-256 hex 다이제스트
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn count_files(dir: &Path, ext: &str) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some(ext))
                .count()
        })
        .unwrap_or(0)
}

// ============================================================================
// CachedEmbedder
// ============================================================================

/// 캐시를 거치는 임베딩 프로바이더
///
/// 캐시 히트 시 내부 프로바이더를 호출하지 않습니다.
pub struct CachedEmbedder<'a> {
    cache: &'a Cache,
    inner: &'a dyn EmbeddingProvider,
}

impl<'a> CachedEmbedder<'a> {
    pub fn new(cache: &'a Cache, inner: &'a dyn EmbeddingProvider) -> Self {
        Self { cache, inner }
    }
}

#[async_trait]
impl<'a> EmbeddingProvider for CachedEmbedder<'a> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.cache.get_embedding(text) {
            tracing::debug!("Embedding cache hit");
            return Ok(vector);
        }

        let vector = self.inner.embed(text).await?;
        if let Err(e) = self.cache.put_embedding(text, &vector) {
            tracing::warn!("Failed to cache embedding: {}", e);
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

// ============================================================================
// Tests
// ============================================================================
