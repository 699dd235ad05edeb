//! Binance 거래소 커넥터.
//!
//! Binance Spot 공개 시장 데이터 API(REST + WebSocket) 구현.
//! 메인넷과 테스트넷 모두 지원하며 인증이 필요 없습니다.

use crate::error::ExchangeError;
use crate::traits::{CandleSubscription, ExchangeClient, ExchangeResult};
use crate::websocket::BinanceKlineSubscription;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ohlcv_core::{Candle, ExchangeSettings, SeriesKey, Symbol, Timeframe};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};

/// Binance가 알리는 공개 API 요청 간격.
pub const BINANCE_RATE_LIMIT: Duration = Duration::from_millis(50);

/// `/api/v3/klines`의 최대 limit.
const MAX_KLINE_LIMIT: u32 = 1000;

// ============================================================================
// 설정
// ============================================================================

/// Binance 클라이언트 설정.
#[derive(Debug, Clone)]
pub struct BinanceConfig {
    /// 테스트넷 사용
    pub testnet: bool,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 요청당 캔들 수
    pub page_limit: u32,
    /// 요청 간 최소 간격
    pub rate_limit: Duration,
    /// REST 기본 URL 오버라이드
    pub rest_base_url: Option<String>,
    /// WebSocket 기본 URL 오버라이드
    pub ws_base_url: Option<String>,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            testnet: false,
            timeout_secs: 30,
            page_limit: 500,
            rate_limit: BINANCE_RATE_LIMIT,
            rest_base_url: None,
            ws_base_url: None,
        }
    }
}

impl BinanceConfig {
    /// REST 기본 URL을 지정합니다 (테스트용 목 서버 등).
    pub fn with_rest_base_url(mut self, url: impl Into<String>) -> Self {
        self.rest_base_url = Some(url.into());
        self
    }

    /// 수집기 설정의 `[exchange]` 섹션에서 생성합니다.
    pub fn from_settings(settings: &ExchangeSettings) -> Self {
        Self {
            testnet: settings.testnet,
            timeout_secs: settings.timeout_secs,
            page_limit: settings.page_limit.clamp(1, MAX_KLINE_LIMIT),
            rate_limit: settings
                .rate_limit_ms
                .map(Duration::from_millis)
                .unwrap_or(BINANCE_RATE_LIMIT),
            rest_base_url: settings.rest_base_url.clone(),
            ws_base_url: settings.ws_base_url.clone(),
        }
    }

    /// REST API 기본 URL 반환.
    pub fn rest_base_url(&self) -> &str {
        match (&self.rest_base_url, self.testnet) {
            (Some(url), _) => url.trim_end_matches('/'),
            (None, true) => "https://testnet.binance.vision",
            (None, false) => "https://api.binance.com",
        }
    }

    /// WebSocket 기본 URL 반환.
    pub fn ws_base_url(&self) -> &str {
        match (&self.ws_base_url, self.testnet) {
            (Some(url), _) => url.trim_end_matches('/'),
            (None, true) => "wss://testnet.binance.vision/ws",
            (None, false) => "wss://stream.binance.com:9443/ws",
        }
    }
}

// ============================================================================
// API 응답 타입
// ============================================================================

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct BinanceKline(
    i64,    // 0: Open time
    String, // 1: Open
    String, // 2: High
    String, // 3: Low
    String, // 4: Close
    String, // 5: Volume
    i64,    // 6: Close time
    String, // 7: Quote asset volume
    i64,    // 8: Number of trades
    String, // 9: Taker buy base asset volume
    String, // 10: Taker buy quote asset volume
    String, // 11: Ignore
);

#[derive(Debug, Deserialize)]
struct BinanceExchangeInfo {
    symbols: Vec<BinanceSymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct BinanceSymbolInfo {
    symbol: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct BinanceError {
    code: i32,
    msg: String,
}

// ============================================================================
// Binance 클라이언트
// ============================================================================

/// Binance 시장 데이터 클라이언트.
pub struct BinanceClient {
    config: BinanceConfig,
    client: Client,
}

impl BinanceClient {
    /// 새 Binance 클라이언트 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `ExchangeError::NetworkError`를 반환합니다.
    pub fn new(config: BinanceConfig) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ExchangeError::NetworkError(format!("HTTP 클라이언트 생성 실패: {}", e))
            })?;

        Ok(Self { config, client })
    }

    /// 공개 API 요청 (인증 불필요).
    async fn public_get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let url = format!("{}{}", self.config.rest_base_url(), endpoint);
        debug!(endpoint, ?params, "GET");

        let response = self.client.get(&url).query(params).send().await?;
        self.handle_response(response).await
    }

    /// API 응답 처리.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> ExchangeResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| {
                error!(error = %e, body = %body, "응답 파싱 실패");
                ExchangeError::ParseError(e.to_string())
            });
        }

        // 418: IP 차단, 429: 요청 한도 초과
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT {
            return Err(ExchangeError::RateLimited);
        }

        if let Ok(error) = serde_json::from_str::<BinanceError>(&body) {
            return Err(Self::map_error_code(error.code, &error.msg));
        }

        if status.is_server_error() {
            return Err(ExchangeError::NetworkError(format!("HTTP {}: {}", status, body)));
        }

        Err(ExchangeError::ApiError {
            code: i32::from(status.as_u16()),
            message: body,
        })
    }

    /// Binance 에러 코드를 ExchangeError로 매핑.
    fn map_error_code(code: i32, msg: &str) -> ExchangeError {
        match code {
            -1000 => ExchangeError::Unknown(msg.to_string()),
            -1001 => ExchangeError::Disconnected(msg.to_string()),
            -1003 => ExchangeError::RateLimited,
            -1007 => ExchangeError::Timeout(msg.to_string()),
            -1120 => ExchangeError::UnsupportedTimeframe(msg.to_string()),
            -1121 => ExchangeError::SymbolNotFound(msg.to_string()),
            _ => ExchangeError::ApiError {
                code,
                message: msg.to_string(),
            },
        }
    }

    /// 표준 심볼을 Binance 형식으로 변환 ("BTC/USDT" → "BTCUSDT").
    pub(crate) fn to_binance_symbol(symbol: &str) -> ExchangeResult<String> {
        symbol
            .parse::<Symbol>()
            .map(|s| s.concatenated())
            .map_err(ExchangeError::SymbolNotFound)
    }

    /// 문자열에서 Decimal 파싱.
    pub(crate) fn parse_decimal(s: &str) -> ExchangeResult<Decimal> {
        s.parse()
            .map_err(|e| ExchangeError::ParseError(format!("decimal '{}': {}", s, e)))
    }

    /// 밀리초 타임스탬프를 시각으로 변환.
    pub(crate) fn parse_millis(ms: i64) -> ExchangeResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| ExchangeError::ParseError(format!("timestamp out of range: {}", ms)))
    }

    fn to_candle(symbol: &str, timeframe: Timeframe, k: &BinanceKline) -> ExchangeResult<Candle> {
        Ok(Candle::new(
            symbol,
            timeframe,
            Self::parse_millis(k.0)?,
            Self::parse_decimal(&k.1)?,
            Self::parse_decimal(&k.2)?,
            Self::parse_decimal(&k.3)?,
            Self::parse_decimal(&k.4)?,
            Self::parse_decimal(&k.5)?,
        ))
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn name(&self) -> &str {
        if self.config.testnet {
            "binance-testnet"
        } else {
            "binance"
        }
    }

    fn rate_limit(&self) -> Duration {
        self.config.rate_limit
    }

    async fn validate_pair(&self, key: &SeriesKey) -> ExchangeResult<()> {
        let binance_symbol = Self::to_binance_symbol(&key.symbol)?;

        let info: BinanceExchangeInfo = self
            .public_get("/api/v3/exchangeInfo", &[("symbol", binance_symbol.clone())])
            .await?;

        match info.symbols.iter().find(|s| s.symbol == binance_symbol) {
            Some(s) if s.status == "TRADING" => {
                debug!(symbol = %key.symbol, "페어 확인");
                Ok(())
            }
            Some(s) => Err(ExchangeError::SymbolNotFound(format!(
                "{} (status: {})",
                key.symbol, s.status
            ))),
            None => Err(ExchangeError::SymbolNotFound(key.symbol.clone())),
        }
    }

    async fn fetch_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: DateTime<Utc>,
    ) -> ExchangeResult<Vec<Candle>> {
        let binance_symbol = Self::to_binance_symbol(symbol)?;

        let resp: Vec<BinanceKline> = self
            .public_get(
                "/api/v3/klines",
                &[
                    ("symbol", binance_symbol),
                    ("interval", timeframe.as_interval().to_string()),
                    ("startTime", since.timestamp_millis().to_string()),
                    ("limit", self.config.page_limit.to_string()),
                ],
            )
            .await?;

        resp.iter()
            .map(|k| Self::to_candle(symbol, timeframe, k))
            .collect()
    }

    async fn subscribe(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> ExchangeResult<Box<dyn CandleSubscription>> {
        let binance_symbol = Self::to_binance_symbol(symbol)?;
        let url = format!(
            "{}/{}@kline_{}",
            self.config.ws_base_url(),
            binance_symbol.to_lowercase(),
            timeframe.as_interval()
        );

        info!(%url, "Binance kline 스트림 연결");
        let subscription = BinanceKlineSubscription::connect(&url, symbol, timeframe).await?;
        Ok(Box::new(subscription))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn client(server: &mockito::Server) -> BinanceClient {
        BinanceClient::new(BinanceConfig::default().with_rest_base_url(server.url())).unwrap()
    }

    const KLINES_BODY: &str = r#"[
        [1704067200000,"42283.58","42554.57","42261.02","42475.23","1271.68108",1704070799999,"53957248.97",47134,"682.57581","28957416.82","0"],
        [1704070800000,"42475.23","42775.00","42431.65","42613.56","1196.37856",1704074399999,"50984349.59",44211,"580.71726","24743923.62","0"]
    ]"#;

    #[test]
    fn test_symbol_conversion() {
        assert_eq!(BinanceClient::to_binance_symbol("BTC/USDT").unwrap(), "BTCUSDT");
        assert!(BinanceClient::to_binance_symbol("BTCUSDT").is_err());
    }

    #[test]
    fn test_config_from_settings() {
        let settings = ExchangeSettings {
            rate_limit_ms: Some(250),
            page_limit: 5000,
            testnet: true,
            ..Default::default()
        };
        let config = BinanceConfig::from_settings(&settings);
        assert_eq!(config.rate_limit, Duration::from_millis(250));
        assert_eq!(config.page_limit, MAX_KLINE_LIMIT);
        assert_eq!(config.rest_base_url(), "https://testnet.binance.vision");

        let default = BinanceConfig::from_settings(&ExchangeSettings::default());
        assert_eq!(default.rate_limit, BINANCE_RATE_LIMIT);
    }

    #[tokio::test]
    async fn test_fetch_range_parses_klines() {
        let mut server = mockito::Server::new_async().await;
        let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mock = server
            .mock("GET", "/api/v3/klines")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
                mockito::Matcher::UrlEncoded("interval".into(), "1h".into()),
                mockito::Matcher::UrlEncoded("startTime".into(), "1704067200000".into()),
                mockito::Matcher::UrlEncoded("limit".into(), "500".into()),
            ]))
            .with_status(200)
            .with_body(KLINES_BODY)
            .create_async()
            .await;

        let candles = client(&server)
            .fetch_range("BTC/USDT", Timeframe::H1, since)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].symbol, "BTC/USDT");
        assert_eq!(candles[0].candle_time, since);
        assert_eq!(candles[0].open, dec!(42283.58));
        assert_eq!(candles[1].close, dec!(42613.56));
        assert_eq!(candles[1].volume, dec!(1196.37856));
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let mut server = mockito::Server::new_async().await;
        let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let _unknown = server
            .mock("GET", "/api/v3/klines")
            .match_query(mockito::Matcher::UrlEncoded(
                "symbol".into(),
                "FOOUSDT".into(),
            ))
            .with_status(400)
            .with_body(r#"{"code":-1121,"msg":"Invalid symbol."}"#)
            .create_async()
            .await;
        let _limited = server
            .mock("GET", "/api/v3/klines")
            .match_query(mockito::Matcher::UrlEncoded(
                "symbol".into(),
                "BTCUSDT".into(),
            ))
            .with_status(429)
            .create_async()
            .await;
        let _down = server
            .mock("GET", "/api/v3/klines")
            .match_query(mockito::Matcher::UrlEncoded(
                "symbol".into(),
                "ETHUSDT".into(),
            ))
            .with_status(503)
            .with_body("Service Unavailable")
            .create_async()
            .await;

        let client = client(&server);

        let err = client
            .fetch_range("FOO/USDT", Timeframe::H1, since)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::SymbolNotFound(_)));
        assert!(err.is_config_error());

        let err = client
            .fetch_range("BTC/USDT", Timeframe::H1, since)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::RateLimited));

        let err = client
            .fetch_range("ETH/USDT", Timeframe::H1, since)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::NetworkError(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_validate_pair() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/api/v3/exchangeInfo")
            .match_query(mockito::Matcher::UrlEncoded(
                "symbol".into(),
                "BTCUSDT".into(),
            ))
            .with_status(200)
            .with_body(r#"{"timezone":"UTC","symbols":[{"symbol":"BTCUSDT","status":"TRADING"}]}"#)
            .create_async()
            .await;
        let _halted = server
            .mock("GET", "/api/v3/exchangeInfo")
            .match_query(mockito::Matcher::UrlEncoded(
                "symbol".into(),
                "LUNAUSDT".into(),
            ))
            .with_status(200)
            .with_body(r#"{"symbols":[{"symbol":"LUNAUSDT","status":"BREAK"}]}"#)
            .create_async()
            .await;

        let client = client(&server);
        assert!(client
            .validate_pair(&SeriesKey::new("BTC/USDT", Timeframe::H1))
            .await
            .is_ok());

        let err = client
            .validate_pair(&SeriesKey::new("LUNA/USDT", Timeframe::H1))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::SymbolNotFound(_)));
    }
}
