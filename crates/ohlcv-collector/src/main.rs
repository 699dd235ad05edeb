//! OHLCV collector CLI.

use clap::{Args, Parser, Subcommand};
use ohlcv_collector::{apply_pair_overrides, load_config, Processor, ProcessorSettings};
use ohlcv_core::{init_logging, IngestConfig, LogConfig};
use ohlcv_data::{CandleStore, MemoryCandleStore, PgCandleStore};
use ohlcv_exchange::create_client;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "ohlcv-collector")]
#[command(about = "OHLCV candle ingestion pipeline", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 설정 파일 경로 (TOML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error). 설정 파일보다 우선
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// 드라이런 모드 (DB에 저장하지 않음)
    #[arg(long, global = true, default_value = "false")]
    dry_run: bool,
}

#[derive(Args, Debug, Clone, Default)]
struct PairArgs {
    /// 수집할 심볼 (쉼표로 구분, 예: "BTC/USDT,ETH/USDT")
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<String>,

    /// 수집할 타임프레임 (쉼표로 구분, 예: "1h,15m")
    #[arg(long, value_delimiter = ',')]
    timeframes: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// 과거 데이터 백필 (lookback 기간)
    Backfill(PairArgs),

    /// 실시간 스트리밍 (종료 신호까지)
    Stream(PairArgs),

    /// 백필 후 실시간 스트리밍
    Run(PairArgs),

    /// 데이터베이스 스키마 적용
    Migrate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    init_logging(LogConfig::from_settings(&config.logging))?;

    info!("OHLCV Collector 시작");

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    match cli.command {
        Commands::Migrate => {
            let store = PgCandleStore::connect(&config.database).await?;
            store.migrate().await?;
        }
        Commands::Backfill(pairs) => {
            let processor = build_processor(&mut config, &pairs, cli.dry_run, &cancel).await?;
            processor.run_historical().await.log_summary();
        }
        Commands::Stream(pairs) => {
            let processor = build_processor(&mut config, &pairs, cli.dry_run, &cancel).await?;
            processor.run_realtime().await.log_summary();
        }
        Commands::Run(pairs) => {
            let processor = build_processor(&mut config, &pairs, cli.dry_run, &cancel).await?;

            info!("Step 1/2: 과거 데이터 백필");
            processor.run_historical().await.log_summary();

            if processor.is_shutdown() {
                warn!("종료 요청으로 실시간 스트리밍을 건너뜀");
            } else {
                info!("Step 2/2: 실시간 스트리밍");
                processor.run_realtime().await.log_summary();
            }
        }
    }

    info!("OHLCV Collector 종료");
    Ok(())
}

/// 거래소 클라이언트와 저장소를 만들고 프로세서를 생성
async fn build_processor(
    config: &mut IngestConfig,
    pairs: &PairArgs,
    dry_run: bool,
    cancel: &CancellationToken,
) -> Result<Processor, Box<dyn std::error::Error>> {
    apply_pair_overrides(config, &pairs.symbols, &pairs.timeframes)?;

    let exchange = create_client(&config.exchange)?;
    let store: Arc<dyn CandleStore> = if dry_run {
        warn!("드라이런 모드: 수집한 캔들은 메모리에만 저장됩니다");
        Arc::new(MemoryCandleStore::new())
    } else {
        let store = PgCandleStore::connect(&config.database).await?;
        store.health_check().await?;
        Arc::new(store)
    };

    let settings = ProcessorSettings::from_config(config)?;
    let processor = Processor::new(exchange, store, settings, cancel.clone()).await?;
    Ok(processor)
}

/// Ctrl+C 또는 SIGTERM을 받으면 모든 파이프라인에 종료를 전파
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C 핸들러 설치 실패");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM 핸들러 설치 실패");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Ctrl+C 수신, 파이프라인 종료 중...");
        }
        _ = terminate => {
            warn!("SIGTERM 수신, 파이프라인 종료 중...");
        }
    }

    shutdown_token.cancel();
}
