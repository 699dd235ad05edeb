//! 페어별 수집 파이프라인.
//!
//! 파이프라인 하나는 (심볼, 타임프레임) 하나를 담당하며 커서와 재시도 상태를
//! 단독으로 소유합니다. 파이프라인 사이에 공유되는 것은 저장소뿐입니다.

pub mod historical;
pub mod realtime;

pub use historical::run_historical_pipeline;
pub use realtime::run_realtime_pipeline;

use crate::config::ProcessorSettings;
use crate::{CollectorError, Result};
use chrono::Utc;
use ohlcv_core::{partition_valid, Candle};
use ohlcv_data::{CandleStore, WriteMode};
use ohlcv_exchange::{sleep_or_cancel, Backoff, ExchangeClient};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 파이프라인 실행에 필요한 공유 핸들.
#[derive(Clone)]
pub struct PipelineContext {
    pub exchange: Arc<dyn ExchangeClient>,
    pub store: Arc<dyn CandleStore>,
    pub settings: Arc<ProcessorSettings>,
    pub cancel: CancellationToken,
}

/// 불변식을 어긴 캔들을 걸러내고 제외된 개수를 함께 반환합니다.
pub(crate) fn drop_invalid(batch: Vec<Candle>) -> (Vec<Candle>, usize) {
    let (valid, rejected) = partition_valid(batch, Utc::now());
    for (candle, reason) in &rejected {
        warn!(
            candle_time = %candle.candle_time,
            reason = %reason,
            "유효하지 않은 캔들 제외"
        );
    }
    (valid, rejected.len())
}

/// 저장소 쓰기. 재시도 가능한 에러는 파이프라인 백오프로 다시 시도합니다.
///
/// 쓰기 자체는 취소하지 않고, 재시도 대기만 취소에 반응합니다.
pub(crate) async fn persist_with_retry(
    ctx: &PipelineContext,
    batch: &[Candle],
    mode: WriteMode,
) -> Result<usize> {
    let mut backoff = Backoff::new(ctx.settings.retry);

    loop {
        match ctx.store.save_candles(batch, mode).await {
            Ok(written) => {
                if backoff.attempts() > 0 {
                    info!(attempts = backoff.attempts(), "저장소 복구");
                }
                return Ok(written);
            }
            Err(e) if e.is_retryable() => match backoff.next_delay() {
                Some(delay) => {
                    warn!(
                        attempt = backoff.attempts(),
                        delay_secs = delay.as_secs(),
                        count = batch.len(),
                        error = %e,
                        "저장 실패, 재시도 대기"
                    );
                    if !sleep_or_cancel(delay, &ctx.cancel).await {
                        return Err(CollectorError::Cancelled);
                    }
                }
                None => {
                    error!(
                        attempts = backoff.attempts(),
                        count = batch.len(),
                        error = %e,
                        "저장 재시도 한도 초과"
                    );
                    return Err(CollectorError::StorageExhausted {
                        attempts: backoff.attempts(),
                        source: e,
                    });
                }
            },
            Err(e) => {
                error!(count = batch.len(), error = %e, "저장 실패 (재시도 불가)");
                return Err(e.into());
            }
        }
    }
}
