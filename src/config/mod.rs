//! 설정 모듈
//!
//! TOML 설정 파일을 로드하고 검증합니다.
//! 탐색 순서: `--config` 경로 > `./pkm-rag.toml` > `{config_dir}/pkm-rag/config.toml` > 기본값
//!
//! 모든 섹션은 생략 가능하며, 생략된 값은 기본값으로 채워집니다.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PkmError;

/// 프로젝트 로컬 설정 파일 이름
pub const LOCAL_CONFIG_FILE: &str = "pkm-rag.toml";

// ============================================================================
// Config
// ============================================================================

/// 전체 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub extraction: ExtractionConfig,
    pub topics: TopicsConfig,
    pub gaps: GapsConfig,
    pub discovery: DiscoveryConfig,
    pub provider: ProviderConfig,
}

/// 파일 경로 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// 입력 문서 디렉토리
    pub sources_dir: PathBuf,
    /// 임베딩 캐시 (*.npy)
    pub embeddings_dir: PathBuf,
    /// 키워드(개념) 캐시 (*.json)
    pub keywords_dir: PathBuf,
    /// 그래프 출력 디렉토리 (*.ttl)
    pub graphs_dir: PathBuf,
    /// 소스 중요도 주석 파일
    pub annotations_file: PathBuf,
    /// 갭 분석 리포트
    pub report_file: PathBuf,
    /// 탐색된 URL 목록
    pub discovered_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self::under(Path::new("data"))
    }
}

impl PathsConfig {
    /// 지정한 데이터 루트 아래에 표준 레이아웃 구성
    pub fn under(root: &Path) -> Self {
        Self {
            sources_dir: root.join("sources"),
            embeddings_dir: root.join("embeddings"),
            keywords_dir: root.join("keywords"),
            graphs_dir: root.join("graphs"),
            annotations_file: root.join("source_annotations.toml"),
            report_file: root.join("discovery_report.txt"),
            discovered_file: root.join("discovered_urls.txt"),
        }
    }
}

/// 청킹 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// 청크당 목표 토큰 수
    pub target_tokens: usize,
    /// 단어당 토큰 추정치
    pub tokens_per_word: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: 500,
            tokens_per_word: 1.3,
        }
    }
}

/// 점수 통합 방식
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMethod {
    /// keyword_weight × keyword + (1 - keyword_weight) × semantic
    Weighted,
    /// Reciprocal Rank Fusion
    Rrf,
}

/// 검색 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub fusion: FusionMethod,
    /// Weighted 방식에서 키워드 점수 가중치 (0.0 ~ 1.0)
    pub keyword_weight: f32,
    /// RRF 상수 k
    pub rrf_k: f32,
    /// 그래프 경로 재순위 가중치 (0이면 비활성)
    pub graph_boost: f32,
    /// 소스 중요도 주석 반영 여부
    pub use_annotations: bool,
    /// 문서 임베딩 시 사용할 최대 문자 수
    pub embed_char_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            fusion: FusionMethod::Weighted,
            keyword_weight: 0.5,
            rrf_k: 60.0,
            graph_boost: 0.2,
            use_annotations: true,
            embed_char_limit: 8000,
        }
    }
}

/// 개념 추출 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// 도메인 온톨로지 (Turtle). 지정하면 LLM 가이드 추출 사용
    pub ontology: Option<PathBuf>,
    /// 청크당 최대 개념 수
    pub max_concepts_per_chunk: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            ontology: None,
            max_concepts_per_chunk: 10,
        }
    }
}

/// 개념 추출 모드 (설정 시점에 한 번 결정)
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionMode {
    Heuristic,
    OntologyGuided(PathBuf),
}

impl ExtractionConfig {
    pub fn mode(&self) -> ExtractionMode {
        match &self.ontology {
            Some(path) => ExtractionMode::OntologyGuided(path.clone()),
            None => ExtractionMode::Heuristic,
        }
    }
}

/// 토픽 생성 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    /// 토픽당 개념 수
    pub batch_size: usize,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self { batch_size: 10 }
    }
}

/// 갭 분석 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GapsConfig {
    /// 이 점수 미만이면 갭 (0 ~ 100)
    pub threshold: f32,
    /// 생성할 검색 쿼리 수
    pub max_queries: usize,
    /// 리포트에 표시할 집중 영역 수
    pub focus_areas: usize,
}

impl Default for GapsConfig {
    fn default() -> Self {
        Self {
            threshold: 50.0,
            max_queries: 5,
            focus_areas: 3,
        }
    }
}

/// 소스 탐색 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// 사용할 문헌 API (openalex, arxiv, semantic_scholar, crossref)
    pub sources: Vec<String>,
    /// API당 최대 결과 수
    pub max_per_source: usize,
    /// 제목 퍼지 매칭 중복 임계값 (0 ~ 100)
    pub title_similarity: u8,
    /// 시맨틱 필터 사용 여부
    pub semantic_filter: bool,
    /// 도메인 관련성 최소 코사인 유사도
    pub domain_threshold: f32,
    /// 다양성 최대 코사인 유사도
    pub diversity_threshold: f32,
    /// 도메인 임베딩 계산에 사용할 기존 소스 수
    pub domain_sample: usize,
    /// 쿼리 확장 포함 최대 검색 반복 수
    pub max_iterations: usize,
    /// 이 수만큼 채택되면 반복 중단
    pub min_new_sources: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                "openalex".to_string(),
                "arxiv".to_string(),
                "semantic_scholar".to_string(),
                "crossref".to_string(),
            ],
            max_per_source: 5,
            title_similarity: 85,
            semantic_filter: true,
            domain_threshold: 0.35,
            diversity_threshold: 0.75,
            domain_sample: 20,
            max_iterations: 3,
            min_new_sources: 5,
        }
    }
}

/// 임베딩/완성 API 설정 (OpenAI 호환)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub completion_model: String,
    /// API 키를 찾을 환경변수 (우선순위 순)
    pub api_key_env: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: 1536,
            completion_model: "gpt-4o-mini".to_string(),
            api_key_env: vec!["OPENAI_API_KEY".to_string(), "PKM_API_KEY".to_string()],
            timeout_secs: 30,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    /// 파일에서 설정 로드 후 검증
    pub fn load(path: &Path) -> Result<Self, PkmError> {
        let text = std::fs::read_to_string(path).map_err(|source| PkmError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| PkmError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// 표준 위치에서 설정 탐색
    ///
    /// 명시적 경로가 주어지면 반드시 존재해야 합니다.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, PkmError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Self::load(&local);
        }

        if let Some(global) = global_config_path() {
            if global.is_file() {
                return Self::load(&global);
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// 값 범위 검증
    pub fn validate(&self) -> Result<(), PkmError> {
        if self.chunking.target_tokens == 0 {
            return Err(PkmError::invalid("chunking.target_tokens", "must be > 0"));
        }
        if self.chunking.tokens_per_word <= 0.0 {
            return Err(PkmError::invalid("chunking.tokens_per_word", "must be > 0"));
        }
        if self.topics.batch_size == 0 {
            return Err(PkmError::invalid("topics.batch_size", "must be > 0"));
        }
        if self.retrieval.top_k == 0 {
            return Err(PkmError::invalid("retrieval.top_k", "must be > 0"));
        }
        check_unit("retrieval.keyword_weight", self.retrieval.keyword_weight)?;
        check_unit("discovery.domain_threshold", self.discovery.domain_threshold)?;
        check_unit("discovery.diversity_threshold", self.discovery.diversity_threshold)?;
        if self.discovery.max_iterations == 0 {
            return Err(PkmError::invalid("discovery.max_iterations", "must be > 0"));
        }
        if self.discovery.title_similarity > 100 {
            return Err(PkmError::invalid(
                "discovery.title_similarity",
                "must be within 0..=100",
            ));
        }
        if !(0.0..=100.0).contains(&self.gaps.threshold) {
            return Err(PkmError::invalid("gaps.threshold", "must be within 0..=100"));
        }
        if self.retrieval.graph_boost < 0.0 {
            return Err(PkmError::invalid("retrieval.graph_boost", "must be >= 0"));
        }
        Ok(())
    }
}

/// 전역 설정 파일 경로 ({config_dir}/pkm-rag/config.toml)
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pkm-rag").join("config.toml"))
}

fn check_unit(key: &str, value: f32) -> Result<(), PkmError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PkmError::invalid(key, "must be within 0.0..=1.0"))
    }
}

// ============================================================================
// Tests
// ============================================================================
