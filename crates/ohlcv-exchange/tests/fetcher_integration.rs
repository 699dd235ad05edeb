//! 페처와 시뮬레이션 거래소를 함께 사용하는 통합 테스트.

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use futures::StreamExt;
use ohlcv_core::{RetryPolicy, SeriesKey, Timeframe};
use ohlcv_exchange::simulated::{synthetic_candles, ScriptedExchange};
use ohlcv_exchange::{ExchangeError, FetchError, FetcherState, HistoricalFetcher, RealtimeFetcher};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn btc_1h() -> SeriesKey {
    SeriesKey::new("BTC/USDT", Timeframe::H1)
}

/// 두 페이지(500개, 10개) 후 빈 페이지: 510개, 호출 3회.
#[tokio::test(start_paused = true)]
async fn historical_pages_until_exhausted() {
    let key = btc_1h();
    let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    let all = synthetic_candles(&key, start, 510);

    let exchange = ScriptedExchange::new().with_rate_limit(Duration::from_millis(50));
    exchange.push_page(&key, all[..500].to_vec());
    exchange.push_page(&key, all[500..].to_vec());

    let fetcher = HistoricalFetcher::new(
        Arc::new(exchange.clone()),
        RetryPolicy::default(),
        CancellationToken::new(),
    );

    let began = tokio::time::Instant::now();
    let candles = fetcher.fetch(&key, start, Utc::now()).await.unwrap();

    assert_eq!(candles.len(), 510);
    assert_eq!(candles, all);

    let calls = exchange.range_calls(&key);
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1], all[499].candle_time + ChronoDuration::milliseconds(1));
    assert_eq!(calls[2], all[509].candle_time + ChronoDuration::milliseconds(1));

    // 비어 있지 않은 페이지 뒤마다 rate limit 대기
    assert_eq!(began.elapsed(), Duration::from_millis(100));
}

/// push A [100, 200], push B [150, 250] → B에서는 250만 통과.
#[tokio::test(start_paused = true)]
async fn realtime_stream_dedups_by_cursor() {
    let key = SeriesKey::new("ETH/USDT", Timeframe::M1);
    let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let at = |s: i64| {
        let mut candle = synthetic_candles(&key, base, 1).remove(0);
        candle.candle_time = base + ChronoDuration::seconds(s);
        candle
    };

    let exchange = ScriptedExchange::new();
    exchange.push_update(&key, vec![at(100), at(200)]);
    exchange.push_update(&key, vec![at(150), at(250)]);

    let cancel = CancellationToken::new();
    let fetcher = RealtimeFetcher::new(
        Arc::new(exchange.clone()),
        key.clone(),
        RetryPolicy::default(),
        cancel.clone(),
    );
    let mut stream = Box::pin(fetcher.into_stream());

    let a = stream.next().await.unwrap().unwrap();
    let b = stream.next().await.unwrap().unwrap();
    assert_eq!(a.len(), 2);
    assert_eq!(b, vec![at(250)]);

    cancel.cancel();
    assert!(matches!(stream.next().await, Some(Err(FetchError::Cancelled))));
    assert!(stream.next().await.is_none());
}

/// 11번 연속 실패 → 종료, 이후 배치 없음.
#[tokio::test(start_paused = true)]
async fn realtime_terminates_and_stays_terminated() {
    let key = btc_1h();
    let exchange = ScriptedExchange::new();
    for _ in 0..11 {
        exchange.push_update_error(&key, ExchangeError::Disconnected("reset by peer".into()));
    }
    exchange.push_update(&key, synthetic_candles(&key, Utc::now() - ChronoDuration::days(1), 1));

    let mut fetcher = RealtimeFetcher::new(
        Arc::new(exchange.clone()),
        key.clone(),
        RetryPolicy::default(),
        CancellationToken::new(),
    );

    let err = fetcher.next_batch().await.unwrap_err();
    assert!(matches!(err, FetchError::RetriesExhausted { attempts: 11, .. }));
    assert_eq!(fetcher.state(), FetcherState::Terminated);

    for _ in 0..3 {
        assert!(matches!(fetcher.next_batch().await, Err(FetchError::Terminated)));
    }
    assert_eq!(exchange.pending_updates(&key), 1);
}
