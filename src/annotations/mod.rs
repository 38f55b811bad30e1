//! 소스 중요도 주석
//!
//! `data/source_annotations.toml` 형식:
//! ```toml
//! [sources."rdf-basics.md"]
//! importance = 5
//! note = "핵심 1차 자료"
//! ```
//! 검색 점수 가중치로만 사용됩니다. 주석이 없는 파일은 중립(3)입니다.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 중립 중요도
pub const NEUTRAL_IMPORTANCE: u8 = 3;

/// 중요도 단계 설명
pub fn importance_level(importance: u8) -> &'static str {
    match importance {
        1 => "REFERENCE",
        2 => "SUPPORTING",
        3 => "RELEVANT",
        4 => "KEY",
        _ => "CRITICAL",
    }
}

/// 파일별 주석
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default = "default_importance")]
    pub importance: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

fn default_importance() -> u8 {
    NEUTRAL_IMPORTANCE
}

/// 주석 집합 (파일 이름 → 주석)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default)]
    pub sources: BTreeMap<String, Annotation>,
}

impl Annotations {
    /// 파일에서 로드
    ///
    /// 파일이 없으면 빈 주석, 손상된 파일은 경고 후 빈 주석.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match toml::from_str::<Self>(&raw) {
            Ok(mut annotations) => {
                for annotation in annotations.sources.values_mut() {
                    annotation.importance = annotation.importance.clamp(1, 5);
                }
                tracing::debug!("Loaded {} source annotations", annotations.sources.len());
                annotations
            }
            Err(e) => {
                tracing::warn!("Malformed annotations file {:?}: {}, ignoring", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize annotations")?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn importance(&self, file_name: &str) -> u8 {
        self.sources
            .get(file_name)
            .map_or(NEUTRAL_IMPORTANCE, |a| a.importance)
    }

    pub fn set(&mut self, file_name: impl Into<String>, importance: u8, note: Option<String>) {
        self.sources.insert(
            file_name.into(),
            Annotation {
                importance: importance.clamp(1, 5),
                note,
            },
        );
    }

    /// 검색 점수 배수: `1 + (importance - 3) × 0.25`
    pub fn multiplier(&self, file_name: &str) -> f32 {
        1.0 + (f32::from(self.importance(file_name)) - f32::from(NEUTRAL_IMPORTANCE)) * 0.25
    }
}
