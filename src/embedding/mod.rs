//! 임베딩 모듈 - OpenAI 호환 API를 통한 텍스트 벡터화
//!
//! 텍스트를 벡터로 변환하는 임베딩 프로바이더입니다.
//! 시맨틱 검색과 소스 필터링에 사용됩니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&config.provider)?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::ProviderConfig;
use crate::error::PkmError;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Rate Limiter
// ============================================================================

/// 분당 요청 수 제한
const RATE_LIMIT_RPM: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 호출 간 최소 딜레이
const MIN_DELAY_MS: u64 = 250;
/// 429 에러 시 최대 재시도 횟수
pub(crate) const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
pub(crate) const INITIAL_BACKOFF_MS: u64 = 2000;

/// Rate Limiter with minimum delay between requests
///
/// 임베딩/완성 클라이언트가 공유합니다.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    pub(crate) fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay: Duration::from_millis(MIN_DELAY_MS),
            last_request: None,
        }
    }

    pub(crate) fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::new(RATE_LIMIT_RPM, RATE_LIMIT_WINDOW)))
    }

    /// 요청 가능 여부 확인 및 대기
    pub(crate) async fn acquire(&mut self) {
        // 버스트 방지
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                tokio::time::sleep(self.min_delay - elapsed).await;
            }
        }

        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

/// 지수 백오프 시간
pub(crate) fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt))
}

// ============================================================================
// OpenAI Embedding
// ============================================================================

/// OpenAI 호환 임베딩 구현체
///
/// source: https://platform.openai.com/docs/api-reference/embeddings
#[derive(Debug)]
pub struct OpenAiEmbedding {
    api_key: String,
    endpoint: String,
    model: String,
    client: reqwest::Client,
    dimension: usize,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl OpenAiEmbedding {
    /// 새 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - 프로바이더 API 키
    /// * `config` - 엔드포인트 / 모델 / 차원 설정
    pub fn new(api_key: String, config: &ProviderConfig) -> Result<Self> {
        if config.embedding_dimension == 0 {
            anyhow::bail!("Invalid embedding dimension: 0");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.embedding_model.clone(),
            client,
            dimension: config.embedding_dimension,
            rate_limiter: RateLimiter::shared(),
        })
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

/// OpenAI 에러 응답
#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    pub(crate) error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorDetail {
    pub(crate) message: String,
    #[serde(default, rename = "type")]
    pub(crate) kind: String,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = EmbedRequest {
            model: &self.model,
            input: text,
        };

        let mut last_error: Option<anyhow::Error> = None;

        // 재시도 루프 (429 / 전송 실패 시 지수 백오프)
        for attempt in 0..=MAX_RETRIES {
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            let response = match self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("Failed to send embedding request: {}", e));
                    if attempt < MAX_RETRIES {
                        let wait = backoff(attempt);
                        tracing::warn!(
                            "Request failed, retrying in {:?} (attempt {}/{})",
                            wait,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read response body")?;

            if status.is_success() {
                let parsed: EmbedResponse =
                    serde_json::from_str(&body).context("Failed to parse embedding response")?;
                return parsed
                    .data
                    .into_iter()
                    .next()
                    .map(|d| d.embedding)
                    .context("Embedding response contained no data");
            }

            if status.as_u16() == 429 {
                let wait = backoff(attempt);
                tracing::warn!(
                    "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                    wait,
                    attempt + 1,
                    MAX_RETRIES
                );
                last_error = Some(anyhow::anyhow!("Rate limit exceeded (429)"));

                if attempt < MAX_RETRIES {
                    tokio::time::sleep(wait).await;
                    continue;
                }
            } else {
                if let Ok(error) = serde_json::from_str::<ApiError>(&body) {
                    anyhow::bail!(
                        "Embedding API error ({}): {}",
                        error.error.kind,
                        error.error.message
                    );
                }
                anyhow::bail!("Embedding API error ({}): {}", status, body);
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("Embedding failed after {} retries", MAX_RETRIES)))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// `vars` 순서대로 확인하여 처음 발견한 비어있지 않은 값을 사용합니다.
pub fn get_api_key(vars: &[String]) -> Result<String, PkmError> {
    for var in vars {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    Err(PkmError::MissingApiKey {
        vars: vars.to_vec(),
    })
}

/// API 키 존재 여부 확인
pub fn has_api_key(vars: &[String]) -> bool {
    vars.iter()
        .any(|var| std::env::var(var).map(|k| !k.is_empty()).unwrap_or(false))
}

// ============================================================================
// Factory Function
// ============================================================================

/// 임베딩 프로바이더 생성
///
/// 환경변수에서 API 키를 읽어 생성합니다. 키가 없으면 `PkmError::MissingApiKey`.
pub fn create_embedder(config: &ProviderConfig) -> Result<OpenAiEmbedding> {
    let api_key = get_api_key(&config.api_key_env)?;
    let embedder = OpenAiEmbedding::new(api_key, config)?;
    tracing::info!(
        "Using {} embedding (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Test Double
// ============================================================================

/// 결정적 임베딩 (네트워크 없이 테스트용)
///
/// 단어 해시를 버킷에 누적한 bag-of-words 벡터를 L2 정규화합니다.
/// 같은 단어를 공유하는 텍스트일수록 코사인 유사도가 높습니다.
#[cfg(test)]
pub(crate) mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    pub(crate) struct HashEmbedder {
        dimension: usize,
        calls: AtomicUsize,
    }

    impl HashEmbedder {
        pub(crate) fn new(dimension: usize) -> Self {
            Self {
                dimension,
                calls: AtomicUsize::new(0),
            }
        }

        /// embed() 호출 횟수
        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn fnv1a(word: &str) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }

    #[async_trait]
    impl EmbeddingProvider for HashEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut vector = vec![0.0f32; self.dimension];
            for word in text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
            {
                let bucket = (fnv1a(&word.to_lowercase()) % self.dimension as u64) as usize;
                vector[bucket] += 1.0;
            }
            let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                vector.iter_mut().for_each(|v| *v /= norm);
            }
            Ok(vector)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            "hash-embedder"
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::mock::HashEmbedder;
    use super::*;

    #[test]
    fn test_get_api_key_missing_lists_vars() {
        let vars = vec!["PKM_RAG_TEST_UNSET_A".to_string(), "PKM_RAG_TEST_UNSET_B".to_string()];
        let err = get_api_key(&vars).unwrap_err();
        assert!(err.to_string().contains("PKM_RAG_TEST_UNSET_A or PKM_RAG_TEST_UNSET_B"));
        assert!(!has_api_key(&vars));
    }

    #[test]
    fn test_get_api_key_uses_first_present() {
        std::env::set_var("PKM_RAG_TEST_KEY_SECOND", "second");
        let vars = vec![
            "PKM_RAG_TEST_KEY_FIRST_UNSET".to_string(),
            "PKM_RAG_TEST_KEY_SECOND".to_string(),
        ];
        assert_eq!(get_api_key(&vars).unwrap(), "second");
        assert!(has_api_key(&vars));
    }

    #[test]
    fn test_create_embedder_without_key_is_missing_key_error() {
        let config = ProviderConfig {
            api_key_env: vec!["PKM_RAG_TEST_NO_SUCH_KEY".to_string()],
            ..Default::default()
        };
        let err = create_embedder(&config).unwrap_err();
        assert!(err.downcast_ref::<PkmError>().is_some());
    }

    #[test]
    fn test_embedding_endpoint_from_base_url() {
        let config = ProviderConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            ..Default::default()
        };
        let embedder = OpenAiEmbedding::new("fake_key".to_string(), &config).unwrap();
        assert_eq!(embedder.endpoint, "http://localhost:8080/v1/embeddings");
        assert_eq!(embedder.dimension(), 1536);
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(0), Duration::from_millis(2000));
        assert_eq!(backoff(2), Duration::from_millis(8000));
    }

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(32);
        let a = embedder.embed("graph databases and sparql").await.unwrap();
        let b = embedder.embed("graph databases and sparql").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(embedder.calls(), 2);
    }

    #[tokio::test]
    async fn test_default_embed_batch_is_sequential() {
        let embedder = HashEmbedder::new(16);
        let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let vectors = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(embedder.calls(), 3);
    }
}
