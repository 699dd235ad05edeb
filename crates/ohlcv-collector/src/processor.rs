//! 페어별 파이프라인 오케스트레이터.
//!
//! 심볼 × 타임프레임 조합마다 독립된 태스크를 띄우고, 모든 태스크가 끝날 때까지
//! 기다린 뒤 페어별 결과를 모아 반환합니다. 한 페어의 실패는 다른 페어를
//! 취소하지 않습니다.

use crate::config::ProcessorSettings;
use crate::modules::{run_historical_pipeline, run_realtime_pipeline, PipelineContext};
use crate::stats::{PairOutcome, RunMode, RunReport};
use crate::{CollectorError, Result};
use futures::future::join_all;
use ohlcv_core::{ConfigError, ErrorKind, SeriesKey};
use ohlcv_data::CandleStore;
use ohlcv_exchange::ExchangeClient;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};

/// 수집 프로세서.
pub struct Processor {
    context: PipelineContext,
}

impl Processor {
    /// 프로세서를 생성합니다.
    ///
    /// 모든 페어를 거래소에 미리 확인하며, 하나라도 거부되면 실행 전에 실패합니다.
    pub async fn new(
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<dyn CandleStore>,
        mut settings: ProcessorSettings,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        settings.pairs.retain(|key| seen.insert(key.clone()));

        if settings.pairs.is_empty() {
            return Err(ConfigError::Invalid("수집할 페어가 없습니다".to_string()).into());
        }

        for key in &settings.pairs {
            if let Err(e) = exchange.validate_pair(key).await {
                error!(
                    exchange = exchange.name(),
                    symbol = %key.symbol,
                    timeframe = %key.timeframe,
                    error = %e,
                    "페어 검증 실패"
                );
                return Err(CollectorError::Exchange(e));
            }
        }

        info!(
            exchange = exchange.name(),
            pairs = settings.pairs.len(),
            "프로세서 준비 완료"
        );

        Ok(Self {
            context: PipelineContext {
                exchange,
                store,
                settings: Arc::new(settings),
                cancel,
            },
        })
    }

    /// 검증된 페어 목록
    pub fn pairs(&self) -> &[SeriesKey] {
        &self.context.settings.pairs
    }

    /// 모든 파이프라인 종료 요청
    pub fn shutdown(&self) {
        self.context.cancel.cancel();
    }

    /// 종료 요청 여부
    pub fn is_shutdown(&self) -> bool {
        self.context.cancel.is_cancelled()
    }

    /// 모든 페어의 과거 데이터를 백필합니다.
    pub async fn run_historical(&self) -> RunReport {
        self.fan_out(RunMode::Historical).await
    }

    /// 모든 페어의 실시간 스트리밍을 시작하고 전부 종료될 때까지 기다립니다.
    pub async fn run_realtime(&self) -> RunReport {
        self.fan_out(RunMode::Realtime).await
    }

    async fn fan_out(&self, mode: RunMode) -> RunReport {
        let started = Instant::now();
        let pairs = self.pairs().to_vec();
        info!(%mode, pairs = pairs.len(), "파이프라인 시작");

        let handles: Vec<_> = pairs
            .iter()
            .map(|key| {
                let span = ohlcv_core::pipeline_span!(mode.as_str(), key);
                let ctx = self.context.clone();
                let key = key.clone();
                match mode {
                    RunMode::Historical => {
                        tokio::spawn(run_historical_pipeline(ctx, key).instrument(span))
                    }
                    RunMode::Realtime => {
                        tokio::spawn(run_realtime_pipeline(ctx, key).instrument(span))
                    }
                }
            })
            .collect();

        let results = join_all(handles).await;

        let outcomes = pairs
            .into_iter()
            .zip(results)
            .map(|(key, joined)| {
                let outcome = joined.unwrap_or_else(|e| {
                    error!(
                        symbol = %key.symbol,
                        timeframe = %key.timeframe,
                        error = %e,
                        "파이프라인 태스크 비정상 종료"
                    );
                    PairOutcome::Failed {
                        kind: ErrorKind::Internal,
                        error: e.to_string(),
                    }
                });
                (key, outcome)
            })
            .collect();

        RunReport {
            mode,
            outcomes,
            elapsed: started.elapsed(),
        }
    }
}
