//! pkm-rag CLI 진입점

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    // .env 로드 (없으면 무시)
    dotenvy::dotenv().ok();

    let cli = pkm_rag::cli::Cli::parse();

    // 로깅 초기화
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    // CLI 실행
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(pkm_rag::cli::run(cli))
}
