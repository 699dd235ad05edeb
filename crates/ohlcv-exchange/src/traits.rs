//! 거래소 클라이언트 추상화.
//!
//! 거래소는 두 가지 기능을 제공합니다:
//! - 과거 구간 조회 ([`ExchangeClient::fetch_range`])
//! - 장기 구독 ([`ExchangeClient::subscribe`] → [`CandleSubscription`])
//!
//! 재연결은 클라이언트의 책임이 아닙니다. 구독이 실패하면 호출자가
//! 핸들을 버리고 새로 구독합니다.

use crate::error::ExchangeError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ohlcv_core::{Candle, SeriesKey, Timeframe};
use std::time::Duration;

/// 거래소 작업 결과 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// 시장 데이터 거래소 클라이언트.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// 거래소 식별자.
    fn name(&self) -> &str;

    /// 연속 호출 사이에 지켜야 하는 최소 간격.
    fn rate_limit(&self) -> Duration;

    /// 거래소가 이 (심볼, 타임프레임) 조합을 지원하는지 확인합니다.
    ///
    /// 지원하지 않으면 설정 에러(`SymbolNotFound`, `UnsupportedTimeframe`)를 반환합니다.
    async fn validate_pair(&self, key: &SeriesKey) -> ExchangeResult<()>;

    /// `since` 이후의 캔들을 시간 오름차순으로 조회합니다.
    ///
    /// 빈 결과는 더 이상 데이터가 없음을 의미합니다.
    async fn fetch_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: DateTime<Utc>,
    ) -> ExchangeResult<Vec<Candle>>;

    /// 실시간 캔들 구독을 엽니다.
    async fn subscribe(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> ExchangeResult<Box<dyn CandleSubscription>>;
}

/// 하나의 (심볼, 타임프레임)에 대한 구독 핸들.
#[async_trait]
pub trait CandleSubscription: Send {
    /// 다음 푸시를 기다립니다.
    ///
    /// 푸시는 새 캔들이나 갱신된 캔들을 담으며 비어 있을 수 있습니다.
    async fn next_batch(&mut self) -> ExchangeResult<Vec<Candle>>;
}
