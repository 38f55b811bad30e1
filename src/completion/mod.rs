//! 완성(Chat Completion) 모듈
//!
//! 개념 추출, 갭 쿼리 생성, 질의응답에 사용하는 LLM 호출 인터페이스입니다.
//! 호출은 항상 한 번에 하나씩 순차적으로 await 됩니다.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::ProviderConfig;
use crate::embedding::{backoff, get_api_key, ApiError, RateLimiter, MAX_RETRIES};

// ============================================================================
// CompletionProvider Trait
// ============================================================================

/// 완성 요청
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    /// JSON 객체 응답 강제
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.3,
            json_mode: false,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// 완성 프로바이더 트레이트
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// 응답 텍스트 반환
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// OpenAI Chat Completions
// ============================================================================

/// OpenAI 호환 Chat Completions 구현체
///
/// source: https://platform.openai.com/docs/api-reference/chat
#[derive(Debug)]
pub struct OpenAiCompletion {
    api_key: String,
    endpoint: String,
    model: String,
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl OpenAiCompletion {
    pub fn new(api_key: String, config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(60)))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            endpoint: format!(
                "{}/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
            model: config.completion_model.clone(),
            client,
            rate_limiter: RateLimiter::shared(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionProvider for OpenAiCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            response_format: request.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        for attempt in 0..=MAX_RETRIES {
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .context("Failed to send completion request")?;

            let status = response.status();
            let text = response
                .text()
                .await
                .context("Failed to read response body")?;

            if status.is_success() {
                let parsed: ChatResponse =
                    serde_json::from_str(&text).context("Failed to parse completion response")?;
                return parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .map(|c| c.trim().to_string())
                    .context("Completion response contained no message");
            }

            if status.as_u16() == 429 && attempt < MAX_RETRIES {
                let wait = backoff(attempt);
                tracing::warn!(
                    "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                    wait,
                    attempt + 1,
                    MAX_RETRIES
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if let Ok(error) = serde_json::from_str::<ApiError>(&text) {
                anyhow::bail!(
                    "Completion API error ({}): {}",
                    error.error.kind,
                    error.error.message
                );
            }
            anyhow::bail!("Completion API error ({}): {}", status, text);
        }

        anyhow::bail!("Completion failed after {} retries", MAX_RETRIES)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// 완성 프로바이더 생성 (API 키 없으면 `PkmError::MissingApiKey`)
pub fn create_completion(config: &ProviderConfig) -> Result<OpenAiCompletion> {
    let api_key = get_api_key(&config.api_key_env)?;
    let completion = OpenAiCompletion::new(api_key, config)?;
    tracing::info!("Using {} for completions", completion.name());
    Ok(completion)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 응답에서 JSON 본문 추출
///
/// 모델이 ```json 펜스로 감싸서 응답하는 경우를 처리합니다.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

// ============================================================================
// Test Double
// ============================================================================

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use super::*;

    /// 미리 정해둔 응답을 순서대로 반환. 응답이 소진되면 에러.
    pub(crate) struct ScriptedCompletion {
        replies: StdMutex<VecDeque<String>>,
        prompts: StdMutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedCompletion {
        pub(crate) fn new<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                replies: StdMutex::new(replies.into_iter().map(Into::into).collect()),
                prompts: StdMutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        /// 항상 실패하는 프로바이더
        pub(crate) fn failing() -> Self {
            Self::new(Vec::<String>::new())
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedCompletion {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.user.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("Completion API error (500): scripted failure"))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::mock::ScriptedCompletion;
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_request_builder() {
        let request = CompletionRequest::new("sys", "user").temperature(0.7).json();
        assert!(request.json_mode);
        assert!((request.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_chat_request_serializes_json_mode() {
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.3,
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_scripted_completion_exhausts_then_fails() {
        let provider = ScriptedCompletion::new(["first"]);
        let request = CompletionRequest::new("s", "u");
        assert_eq!(provider.complete(&request).await.unwrap(), "first");
        assert!(provider.complete(&request).await.is_err());
        assert_eq!(provider.calls(), 2);
    }
}
