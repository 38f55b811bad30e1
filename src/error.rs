//! 에러 타입
//!
//! 대부분의 경로는 `anyhow::Result`로 전파하고, 시작 시점에 사용자에게
//! 바로 보여야 하는 치명적 조건만 `PkmError`로 명명합니다.
//! 파일 단위 / API 호출 단위 실패는 에러가 아니라 경고 로그 후 건너뜁니다.

use std::path::PathBuf;

use thiserror::Error;

/// 치명적 에러 (시작 시 즉시 표시)
#[derive(Error, Debug)]
pub enum PkmError {
    /// API 키 미설정
    #[error(
        "API key not found. Set {} environment variable (or add it to .env)",
        .vars.join(" or ")
    )]
    MissingApiKey { vars: Vec<String> },

    /// 설정 파일 읽기 실패
    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// 설정 파일 파싱 실패
    #[error("Failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// 설정 값 검증 실패
    #[error("Invalid configuration value at {key}: {message}")]
    InvalidConfig { key: String, message: String },

    /// 온톨로지 파일 없음
    #[error("Ontology file not found: {0}")]
    OntologyNotFound(PathBuf),
}

impl PkmError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }
}
