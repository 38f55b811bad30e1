//! CLI 모듈
//!
//! pkm-rag CLI 명령어 정의 및 구현

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::cache::CachedEmbedder;
use crate::completion::{create_completion, CompletionProvider};
use crate::config::{global_config_path, Config, LOCAL_CONFIG_FILE};
use crate::discovery::{create_sources, save_url_list, Discovery, ExistingSource};
use crate::embedding::{create_embedder, has_api_key, EmbeddingProvider};
use crate::engine::PkmEngine;
use crate::gaps::{parse_report_queries, GapAnalyzer};
use crate::graph::sparql::SparqlOutcome;
use crate::graph::{list_concepts, list_topics, Ontology};
use crate::knowledge::SearchMethod;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "pkm-rag")]
#[command(version, about = "개인 지식관리 RAG - 하이브리드 검색 + 지식 그래프", long_about = None)]
pub struct Cli {
    /// 설정 파일 경로
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// 디버그 로그 출력
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 소스 폴더로부터 지식 그래프 빌드 및 Turtle 내보내기
    Build {
        /// 출력할 토픽 개수
        #[arg(long, default_value = "10")]
        show_topics: usize,
    },

    /// 소스 검색
    Query {
        /// 검색 쿼리
        query: String,

        /// 검색 방법
        #[arg(short, long, value_enum, default_value = "hybrid")]
        method: SearchMethod,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// 소스 기반 질문 응답
    Ask {
        /// 질문
        question: String,
    },

    /// 코퍼스 통계
    Stats,

    /// 그래프 스키마 Turtle 내보내기
    Schema,

    /// 내보낸 지식 그래프에 SPARQL 질의
    Sparql {
        /// SPARQL 질의 (SELECT / ASK / CONSTRUCT)
        query: String,

        /// JSON 으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 온톨로지 대비 지식 공백 분석
    Gaps {
        /// 온톨로지 Turtle 파일 (기본: 설정의 extraction.ontology)
        #[arg(short, long)]
        ontology: Option<PathBuf>,

        /// LLM 쿼리 생성 건너뛰기
        #[arg(long)]
        no_llm: bool,
    },

    /// 외부 문헌 탐색
    Discover {
        /// 검색 쿼리 (생략 시 공백 리포트의 추천 쿼리 사용)
        #[arg(short, long)]
        query: Vec<String>,

        /// 시맨틱 필터 끄기
        #[arg(long)]
        no_filter: bool,

        /// 쿼리 확장 포함 최대 반복 수 (기본: discovery.max_iterations)
        #[arg(long)]
        max_iterations: Option<usize>,

        /// 이 수만큼 찾으면 반복 중단 (기본: discovery.min_new_sources)
        #[arg(long)]
        min_new_sources: Option<usize>,
    },

    /// HTTP API 서버 실행
    Serve {
        /// 바인드 주소
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// 포트
        #[arg(short, long, default_value = "5000")]
        port: u16,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::discover(cli.config.as_deref()).context("설정 로드 실패")?;

    match cli.command {
        Commands::Build { show_topics } => cmd_build(config, show_topics).await,
        Commands::Query {
            query,
            method,
            limit,
        } => cmd_query(config, &query, method, limit).await,
        Commands::Ask { question } => cmd_ask(config, &question).await,
        Commands::Stats => cmd_stats(config).await,
        Commands::Schema => cmd_schema(config).await,
        Commands::Sparql { query, json } => cmd_sparql(config, &query, json).await,
        Commands::Gaps { ontology, no_llm } => cmd_gaps(config, ontology, no_llm).await,
        Commands::Discover {
            query,
            no_filter,
            max_iterations,
            min_new_sources,
        } => cmd_discover(config, query, no_filter, max_iterations, min_new_sources).await,
        Commands::Serve { host, port } => cmd_serve(config, &host, port).await,
        Commands::Status => cmd_status(config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 그래프 빌드 명령어 (build)
///
/// 문서를 청크로 나누고 개념/토픽을 추출해 RDF 그래프로 내보냅니다.
async fn cmd_build(config: Config, show_topics: usize) -> Result<()> {
    let completion = optional_completion(&config)?;
    let mut engine = PkmEngine::load(config).await.context("엔진 초기화 실패")?;
    if let Some(completion) = completion {
        engine = engine.with_completion(completion);
    }

    if engine.documents().is_empty() {
        println!(
            "[!] 소스 폴더가 비어 있습니다: {}",
            engine.config().paths.sources_dir.display()
        );
        return Ok(());
    }

    println!(
        "[*] {} 문서로 지식 그래프 빌드 중...",
        engine.documents().len()
    );

    let summary = engine.build_graph().await;
    let graph_path = engine.export_graph().context("그래프 내보내기 실패")?;
    let schema_path = engine.export_schema().context("스키마 내보내기 실패")?;

    let stats = &summary.stats;
    println!();
    println!("[OK] 그래프 빌드 완료");
    println!("     문서: {}, 청크: {}", stats.documents, stats.chunks);
    println!(
        "     개념: {}, 토픽: {}, 태그: {}, 링크: {}",
        stats.domain_concepts, stats.topic_nodes, stats.tags, stats.links
    );
    println!("     트리플: {}", stats.total_triples);
    println!("     그래프: {}", graph_path.display());
    println!("     스키마: {}", schema_path.display());

    if let Some(graph) = engine.graph() {
        let topics = list_topics(graph);
        if !topics.is_empty() && show_topics > 0 {
            println!();
            println!("[*] 토픽 ({} 중 {}):", topics.len(), show_topics.min(topics.len()));
            for topic in topics.iter().take(show_topics) {
                println!(
                    "  - {} ({} 청크): {}",
                    topic.label,
                    topic.chunk_count,
                    truncate_text(&topic.concepts.join(", "), 80)
                );
            }
        }

        let concepts = list_concepts(graph);
        if !concepts.is_empty() {
            println!();
            println!("[*] 주요 개념:");
            for concept in concepts.iter().take(10) {
                println!("  - {} ({}회)", concept.label, concept.mention_count);
            }
        }
    }

    Ok(())
}

/// 검색 명령어 (query)
///
/// 키워드 / 시맨틱 / 하이브리드 검색으로 소스를 찾습니다.
async fn cmd_query(config: Config, query: &str, method: SearchMethod, limit: usize) -> Result<()> {
    let mut method = method;
    let embedder = if method == SearchMethod::Keyword {
        None
    } else {
        optional_embedder(&config)?
    };
    if embedder.is_none() && method != SearchMethod::Keyword {
        println!("[!] API 키가 없어 키워드 검색으로 진행합니다.");
        method = SearchMethod::Keyword;
    }

    let mut engine = PkmEngine::load(config).await.context("엔진 초기화 실패")?;
    if let Some(embedder) = embedder {
        engine = engine.with_embedder(embedder);
    }
    if let Err(e) = engine.load_exported_graph() {
        println!("[!] 그래프 로드 실패 (그래프 가중치 없이 진행): {:#}", e);
    }

    println!("[*] 검색 중: \"{}\"", query);

    let results = engine.query(query, method, limit).await;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        let method_str = match result.method {
            SearchMethod::Keyword => "KEY",
            SearchMethod::Semantic => "SEM",
            SearchMethod::Hybrid => "HYB",
        };

        println!(
            "{}. [{}] [점수: {:.4}] {}",
            i + 1,
            method_str,
            result.score,
            result.title
        );
        println!("   경로: {}", result.path);

        let mut parts = Vec::new();
        if let Some(score) = result.keyword_score {
            parts.push(format!("키워드 {:.3}", score));
        }
        if let Some(score) = result.semantic_score {
            parts.push(format!("시맨틱 {:.3}", score));
        }
        if result.graph_weight > 0.0 {
            parts.push(format!("그래프 {:.3}", result.graph_weight));
        }
        if !parts.is_empty() {
            println!("   세부: {}", parts.join(", "));
        }

        println!("   스니펫: {}", truncate_text(&result.snippet, 200));
        println!();
    }

    Ok(())
}

/// 질문 응답 명령어 (ask)
async fn cmd_ask(config: Config, question: &str) -> Result<()> {
    let Some(completion) = optional_completion(&config)? else {
        bail!(
            "API 키가 설정되지 않았습니다.\n\
             설정: export {}=your-key",
            config.provider.api_key_env.join(" 또는 ")
        );
    };
    let embedder = optional_embedder(&config)?;

    let mut engine = PkmEngine::load(config)
        .await
        .context("엔진 초기화 실패")?
        .with_completion(completion);
    if let Some(embedder) = embedder {
        engine = engine.with_embedder(embedder);
    }
    if let Err(e) = engine.load_exported_graph() {
        tracing::debug!("Graph not loaded: {:#}", e);
    }

    println!("[*] 질문: {}", question);

    let response = engine.ask(question).await;
    if let Some(error) = response.error {
        bail!("{}", error);
    }

    println!();
    println!("{}", response.answer.unwrap_or_default());

    if !response.sources.is_empty() {
        println!();
        println!("[OK] 출처:");
        for (i, source) in response.sources.iter().enumerate() {
            println!(
                "  [{}] {} ({}) [점수: {:.4}]",
                i + 1,
                source.title,
                source.path,
                source.score
            );
        }
    }

    Ok(())
}

/// 통계 명령어 (stats)
async fn cmd_stats(config: Config) -> Result<()> {
    let engine = PkmEngine::load(config).await.context("엔진 초기화 실패")?;
    let stats = engine.stats();

    println!("[OK] 코퍼스 통계");
    println!("     문서: {}", stats.num_documents);
    println!("     문자 수: {}", stats.total_characters);
    println!("     섹션: {}", stats.total_sections);
    println!("     평균 문서 길이: {} 자", stats.avg_doc_length);

    let (embeddings, keywords) = engine.cache().stats();
    println!("     캐시: 임베딩 {}, 키워드 {}", embeddings, keywords);

    Ok(())
}

/// 스키마 내보내기 명령어 (schema)
async fn cmd_schema(config: Config) -> Result<()> {
    let engine = PkmEngine::load(config).await.context("엔진 초기화 실패")?;
    let path = engine.export_schema().context("스키마 내보내기 실패")?;
    println!("[OK] 스키마 저장: {}", path.display());
    Ok(())
}

/// SPARQL 질의 명령어 (sparql)
///
/// 내보낸 그래프를 불러와 질의합니다. 그래프가 없으면 build 를 먼저 실행해야 합니다.
async fn cmd_sparql(config: Config, query: &str, json: bool) -> Result<()> {
    let mut engine = PkmEngine::load(config).await.context("엔진 초기화 실패")?;
    if !engine.load_exported_graph().context("그래프 로드 실패")? {
        bail!(
            "내보낸 그래프가 없습니다: {} (먼저 build 명령을 실행하세요)",
            engine.graph_path().display()
        );
    }

    let outcome = engine.sparql(query).context("SPARQL 질의 실패")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        SparqlOutcome::Solutions { variables, rows } => {
            if rows.is_empty() {
                println!("[!] 결과가 없습니다.");
                return Ok(());
            }
            println!("[OK] {} 건 ({})\n", rows.len(), variables.join(", "));
            for (i, row) in rows.iter().enumerate() {
                let cells: Vec<String> = variables
                    .iter()
                    .map(|v| {
                        let value = row.get(v).map(String::as_str).unwrap_or("-");
                        format!("{}={}", v, truncate_text(value, 80))
                    })
                    .collect();
                println!("{}. {}", i + 1, cells.join("  "));
            }
        }
        SparqlOutcome::Boolean { value } => println!("[OK] {}", value),
        SparqlOutcome::Triples { triples } => {
            println!("[OK] {} 트리플\n", triples.len());
            for triple in &triples {
                println!("{}", triple);
            }
        }
    }

    Ok(())
}

/// 공백 분석 명령어 (gaps)
///
/// 내보낸 그래프를 온톨로지와 비교해 커버리지 리포트를 저장합니다.
async fn cmd_gaps(config: Config, ontology: Option<PathBuf>, no_llm: bool) -> Result<()> {
    let Some(ontology_path) = ontology.or_else(|| config.extraction.ontology.clone()) else {
        bail!("온톨로지 파일을 지정해야 합니다 (--ontology 또는 extraction.ontology)");
    };
    let ontology = Ontology::load(&ontology_path)
        .with_context(|| format!("온톨로지 로드 실패: {}", ontology_path.display()))?;
    if ontology.is_empty() {
        println!("[!] 온톨로지에 클래스가 없습니다: {}", ontology_path.display());
        return Ok(());
    }

    let completion = if no_llm {
        None
    } else {
        optional_completion(&config)?
    };

    let mut engine = PkmEngine::load(config).await.context("엔진 초기화 실패")?;
    if !engine.load_exported_graph().context("그래프 로드 실패")? {
        println!("[*] 내보낸 그래프가 없어 새로 빌드합니다...");
        if let Some(completion) = completion.clone() {
            engine = engine.with_completion(completion);
        }
        engine.build_graph().await;
        engine.export_graph().context("그래프 내보내기 실패")?;
    }
    let Some(graph) = engine.graph() else {
        bail!("지식 그래프가 없습니다");
    };

    println!(
        "[*] 커버리지 분석 중 (클래스 {}, 속성 {})...",
        ontology.classes.len(),
        ontology.properties.len()
    );

    let source = engine.graph_path().display().to_string();
    let analyzer = GapAnalyzer::new(&ontology, graph, &engine.config().gaps);
    let report = analyzer.run(completion.as_deref(), &source).await;

    println!();
    println!("{}", report.render());

    let report_path = &engine.config().paths.report_file;
    report.save(report_path).context("리포트 저장 실패")?;
    println!("[OK] 리포트 저장: {}", report_path.display());

    Ok(())
}

/// 문헌 탐색 명령어 (discover)
///
/// 추천 쿼리로 외부 API를 검색하고 중복/무관한 후보를 걸러냅니다.
async fn cmd_discover(
    config: Config,
    queries: Vec<String>,
    no_filter: bool,
    max_iterations: Option<usize>,
    min_new_sources: Option<usize>,
) -> Result<()> {
    let queries = if queries.is_empty() {
        let report_path = &config.paths.report_file;
        let report = std::fs::read_to_string(report_path).with_context(|| {
            format!(
                "공백 리포트를 읽을 수 없습니다: {} (먼저 gaps 명령을 실행하거나 --query를 지정하세요)",
                report_path.display()
            )
        })?;
        parse_report_queries(&report)
    } else {
        queries
    };

    if queries.is_empty() {
        println!("[!] 검색할 쿼리가 없습니다.");
        return Ok(());
    }

    let mut discovery_config = config.discovery.clone();
    if no_filter {
        discovery_config.semantic_filter = false;
    }
    if let Some(max) = max_iterations {
        if max == 0 {
            bail!("--max-iterations는 1 이상이어야 합니다");
        }
        discovery_config.max_iterations = max;
    }
    if let Some(min) = min_new_sources {
        discovery_config.min_new_sources = min;
    }

    let embedder = if discovery_config.semantic_filter {
        let embedder = optional_embedder(&config)?;
        if embedder.is_none() {
            println!("[!] API 키가 없어 시맨틱 필터 없이 진행합니다.");
        }
        embedder
    } else {
        None
    };
    let completion = if discovery_config.max_iterations > 1 {
        optional_completion(&config)?
    } else {
        None
    };

    let engine = PkmEngine::load(config).await.context("엔진 초기화 실패")?;
    let existing: Vec<ExistingSource> = engine
        .documents()
        .iter()
        .map(ExistingSource::from_document)
        .collect();

    let sources = create_sources(&discovery_config.sources).context("소스 생성 실패")?;
    if sources.is_empty() {
        bail!("사용 가능한 탐색 소스가 없습니다 (discovery.sources 확인)");
    }

    println!(
        "[*] {} 쿼리 x {} 소스 탐색 중 (기존 소스 {} 건)...",
        queries.len(),
        sources.len(),
        existing.len()
    );

    let cached = embedder
        .as_deref()
        .map(|e| CachedEmbedder::new(engine.cache(), e));
    let mut discovery = Discovery::new(sources, &discovery_config);
    if let Some(cached) = cached.as_ref() {
        discovery = discovery.with_embedder(cached);
    }
    if let Some(completion) = completion.as_deref() {
        discovery = discovery.with_completion(completion);
    }

    let outcome = discovery.run(&queries, &existing).await;

    println!();
    if outcome.degenerate {
        println!("[!] 기존 소스가 없어 도메인 관련성 검사를 건너뛰었습니다.");
    }
    if outcome.queries.len() > queries.len() {
        println!("[*] 확장 쿼리:");
        for query in &outcome.queries[queries.len()..] {
            println!("    - {}", query);
        }
    }
    println!(
        "[OK] 반복 {}, 채택 {}, 중복 {}, 거절 {}, 실패한 호출 {}",
        outcome.iterations,
        outcome.accepted.len(),
        outcome.duplicates,
        outcome.rejected,
        outcome.failed_calls
    );

    for (i, found) in outcome.accepted.iter().enumerate() {
        let similarity = found
            .domain_similarity
            .map(|s| format!(" [유사도: {:.2}]", s))
            .unwrap_or_default();
        println!(
            "{}. [{}] {}{}",
            i + 1,
            found.candidate.source,
            truncate_text(&found.candidate.title, 80),
            similarity
        );
        println!("   URL: {}", found.candidate.url);
    }

    if outcome.accepted.is_empty() {
        return Ok(());
    }

    let output = &engine.config().paths.discovered_file;
    save_url_list(output, &outcome.accepted).context("URL 목록 저장 실패")?;
    println!();
    println!("[OK] URL 목록 저장: {}", output.display());

    Ok(())
}

/// HTTP 서버 명령어 (serve)
async fn cmd_serve(config: Config, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("잘못된 주소: {}:{}", host, port))?;

    let completion = optional_completion(&config)?;
    let embedder = optional_embedder(&config)?;

    let mut engine = PkmEngine::load(config).await.context("엔진 초기화 실패")?;
    match completion {
        Some(completion) => engine = engine.with_completion(completion),
        None => println!("[!] API 키 미설정: /api/ask 는 오류를 반환합니다."),
    }
    if let Some(embedder) = embedder {
        engine = engine.with_embedder(embedder);
    }
    if let Err(e) = engine.load_exported_graph() {
        println!("[!] 그래프 로드 실패: {:#}", e);
    }

    println!(
        "[OK] {} 문서 로드, http://{} 에서 대기 중",
        engine.documents().len(),
        addr
    );

    crate::server::serve(Arc::new(engine), addr).await
}

/// 상태 명령어 (status)
///
/// 설정과 데이터 디렉토리 상태를 확인합니다.
async fn cmd_status(config: Config) -> Result<()> {
    println!("pkm-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    // 설정 파일
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        println!("[OK] 설정 파일: {}", local.display());
    } else if let Some(global) = global_config_path().filter(|p| p.is_file()) {
        println!("[OK] 설정 파일: {}", global.display());
    } else {
        println!("[*] 설정 파일 없음 (기본값 사용)");
    }

    let paths = &config.paths;
    println!("[*] 소스 폴더: {}", paths.sources_dir.display());
    println!("[*] 그래프 폴더: {}", paths.graphs_dir.display());

    // API 키 상태
    if has_api_key(&config.provider.api_key_env) {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!(
            "    설정: export {}=your-key",
            config.provider.api_key_env.join(" 또는 ")
        );
    }

    match &config.extraction.ontology {
        Some(path) => println!("[*] 개념 추출: 온톨로지 기반 ({})", path.display()),
        None => println!("[*] 개념 추출: 휴리스틱"),
    }

    match PkmEngine::load(config).await {
        Ok(engine) => {
            let stats = engine.stats();
            println!("[OK] 소스 문서: {} 건", stats.num_documents);
            println!(
                "     총 콘텐츠: {}",
                format_bytes(engine.documents().iter().map(|d| d.text.len()).sum())
            );

            let (embeddings, keywords) = engine.cache().stats();
            println!("[OK] 캐시: 임베딩 {}, 키워드 {}", embeddings, keywords);

            let graph_path = engine.graph_path();
            if graph_path.is_file() {
                println!("[OK] 지식 그래프: {}", graph_path.display());
            } else {
                println!("[!] 지식 그래프 없음 (build 명령으로 생성)");
            }
        }
        Err(e) => {
            println!("[!] 엔진 초기화 실패: {:#}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// API 키가 있으면 임베딩 제공자 생성
fn optional_embedder(config: &Config) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    if !has_api_key(&config.provider.api_key_env) {
        return Ok(None);
    }
    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(create_embedder(&config.provider).context("임베딩 제공자 생성 실패")?);
    Ok(Some(embedder))
}

/// API 키가 있으면 완성 제공자 생성
fn optional_completion(config: &Config) -> Result<Option<Arc<dyn CompletionProvider>>> {
    if !has_api_key(&config.provider.api_key_env) {
        return Ok(None);
    }
    let completion: Arc<dyn CompletionProvider> =
        Arc::new(create_completion(&config.provider).context("완성 제공자 생성 실패")?);
    Ok(Some(completion))
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
