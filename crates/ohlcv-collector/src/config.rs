//! 실행 설정 로드 모듈.
//!
//! 우선순위 (높은 것부터):
//! 1. CLI 인자 (`--symbols`, `--timeframes`, `--log-level`)
//! 2. `OHLCV__` 접두사 환경변수 (`.env` 포함)
//! 3. 설정 파일 (TOML)
//! 4. 기본값
//!
//! `database.url`이 비어 있으면 `DATABASE_URL`을 사용합니다.

use crate::Result;
use chrono::Duration as ChronoDuration;
use ohlcv_core::{ConfigError, IngestConfig, RetryPolicy, SeriesKey};
use std::path::Path;
use std::time::Duration;

/// 설정 파일과 환경변수에서 전체 설정 로드
pub fn load_config(path: Option<&Path>) -> Result<IngestConfig> {
    dotenvy::dotenv().ok();

    let mut config = IngestConfig::load(path)?;
    if config.database.url.trim().is_empty() {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }
    }

    Ok(config)
}

/// CLI로 받은 심볼/타임프레임으로 설정을 덮어씀 (비어 있으면 유지)
pub fn apply_pair_overrides(
    config: &mut IngestConfig,
    symbols: &[String],
    timeframes: &[String],
) -> Result<()> {
    if !symbols.is_empty() {
        config.collection.symbols = symbols.iter().map(|s| s.trim().to_string()).collect();
    }
    if !timeframes.is_empty() {
        config.collection.timeframes = timeframes.iter().map(|s| s.trim().to_string()).collect();
    }
    config.validate()?;
    Ok(())
}

/// 프로세서 설정
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// 수집할 (심볼, 타임프레임) 목록
    pub pairs: Vec<SeriesKey>,
    /// 재시도/백오프 정책 (페처와 파이프라인 공통)
    pub retry: RetryPolicy,
    /// 과거 데이터 조회 기간
    pub lookback: ChronoDuration,
    /// 과거 데이터가 없을 때 완료 처리 전 대기 시간
    pub empty_history_delay: Duration,
}

impl ProcessorSettings {
    /// 페어 목록으로 생성 (나머지는 기본값)
    pub fn new(pairs: Vec<SeriesKey>) -> Self {
        Self {
            pairs,
            retry: RetryPolicy::default(),
            lookback: ChronoDuration::days(365),
            empty_history_delay: Duration::from_secs(5),
        }
    }

    /// 전체 설정에서 생성
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let symbols = config.collection.normalized_symbols()?;
        let timeframes = config.collection.parsed_timeframes()?;
        let days = config.collection.lookback_days;
        let lookback = ChronoDuration::try_days(days)
            .filter(|lookback| *lookback > ChronoDuration::zero())
            .ok_or_else(|| {
                ConfigError::Invalid(format!("collection.lookback_days 범위 초과: {}", days))
            })?;

        Ok(Self {
            pairs: SeriesKey::cartesian(&symbols, &timeframes),
            retry: config.retry,
            lookback,
            empty_history_delay: config.collection.empty_history_delay(),
        })
    }

    /// 재시도 정책 설정
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 과거 데이터 조회 기간 설정
    pub fn with_lookback(mut self, lookback: ChronoDuration) -> Self {
        self.lookback = lookback;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ohlcv_core::Timeframe;

    #[test]
    fn test_settings_from_default_config() {
        let config = IngestConfig::default();
        let settings = ProcessorSettings::from_config(&config).unwrap();

        assert_eq!(settings.pairs.len(), 4);
        assert_eq!(settings.pairs[0], SeriesKey::new("BTC/USDT", Timeframe::H1));
        assert_eq!(settings.lookback, ChronoDuration::days(365));
        assert_eq!(settings.empty_history_delay, Duration::from_secs(5));
        assert_eq!(settings.retry, RetryPolicy::default());
    }

    #[test]
    fn test_pair_overrides() {
        let mut config = IngestConfig::default();
        apply_pair_overrides(&mut config, &[" SOL/USDT ".to_string()], &["4h".to_string()])
            .unwrap();

        let settings = ProcessorSettings::from_config(&config).unwrap();
        assert_eq!(settings.pairs, vec![SeriesKey::new("SOL/USDT", Timeframe::H4)]);
    }

    #[test]
    fn test_invalid_override_is_config_error() {
        let mut config = IngestConfig::default();
        let err = apply_pair_overrides(&mut config, &[], &["7x".to_string()]).unwrap_err();
        assert_eq!(err.kind(), ohlcv_core::ErrorKind::Configuration);
    }

    #[test]
    fn test_unrepresentable_lookback_is_config_error() {
        let mut config = IngestConfig::default();
        config.collection.lookback_days = i64::MAX / 1000;

        let err = ProcessorSettings::from_config(&config).unwrap_err();
        assert_eq!(err.kind(), ohlcv_core::ErrorKind::Configuration);
    }
}
