//! Binance kline WebSocket 구독.
//!
//! `<symbol>@kline_<interval>` 스트림 하나에 연결합니다. 진행 중인 캔들 갱신은
//! 빈 푸시로, 마감된 캔들(`x = true`)은 캔들 하나짜리 푸시로 전달합니다.
//! 따라서 캔들마다 확정된 값이 한 번만 전달됩니다.
//!
//! 서버는 주기적으로 ping을 보내므로 [`READ_IDLE_TIMEOUT`] 동안 아무 프레임도 오지 않으면
//! 연결이 끊긴 것으로 보고 `Timeout` 에러를 반환합니다.

use crate::connector::binance::BinanceClient;
use crate::error::ExchangeError;
use crate::traits::{CandleSubscription, ExchangeResult};
use async_trait::async_trait;
use futures::StreamExt;
use ohlcv_core::{Candle, Timeframe};
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

/// 프레임 없이 기다리는 최대 시간.
pub const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Binance 캔들(kline) 스트림 이벤트.
#[derive(Debug, Deserialize)]
struct WsKlineEvent {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "k")]
    kline: WsKline,
}

#[derive(Debug, Deserialize)]
struct WsKline {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "i")]
    interval: String,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "x")]
    is_closed: bool,
}

/// 단일 kline 스트림 구독 핸들.
pub struct BinanceKlineSubscription {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    symbol: String,
    timeframe: Timeframe,
}

impl BinanceKlineSubscription {
    /// 스트림 URL에 연결합니다.
    pub async fn connect(url: &str, symbol: &str, timeframe: Timeframe) -> ExchangeResult<Self> {
        let (ws, _) = connect_async(url).await?;
        info!(symbol, %timeframe, "Binance WebSocket 연결됨");

        Ok(Self {
            ws,
            symbol: symbol.to_string(),
            timeframe,
        })
    }

    /// 텍스트 메시지를 푸시로 변환합니다.
    ///
    /// kline 이벤트가 아니거나 진행 중인 캔들이면 빈 배치입니다.
    fn parse_message(
        text: &str,
        symbol: &str,
        timeframe: Timeframe,
    ) -> ExchangeResult<Vec<Candle>> {
        let event: WsKlineEvent = serde_json::from_str(text)?;
        if event.event_type != "kline" {
            return Ok(Vec::new());
        }

        let k = event.kline;
        if k.interval != timeframe.as_interval() {
            return Err(ExchangeError::ParseError(format!(
                "unexpected interval {} (expected {})",
                k.interval, timeframe
            )));
        }
        if !k.is_closed {
            return Ok(Vec::new());
        }

        Ok(vec![Candle::new(
            symbol,
            timeframe,
            BinanceClient::parse_millis(k.open_time)?,
            BinanceClient::parse_decimal(&k.open)?,
            BinanceClient::parse_decimal(&k.high)?,
            BinanceClient::parse_decimal(&k.low)?,
            BinanceClient::parse_decimal(&k.close)?,
            BinanceClient::parse_decimal(&k.volume)?,
        )])
    }
}

#[async_trait]
impl CandleSubscription for BinanceKlineSubscription {
    async fn next_batch(&mut self) -> ExchangeResult<Vec<Candle>> {
        loop {
            let Ok(received) = tokio::time::timeout(READ_IDLE_TIMEOUT, self.ws.next()).await else {
                warn!(
                    idle_secs = READ_IDLE_TIMEOUT.as_secs(),
                    "WebSocket 수신 없음, 연결 종료로 처리"
                );
                return Err(ExchangeError::Timeout(format!(
                    "{}초 동안 수신 없음",
                    READ_IDLE_TIMEOUT.as_secs()
                )));
            };

            match received {
                Some(Ok(Message::Text(text))) => {
                    return Self::parse_message(&text, &self.symbol, self.timeframe);
                }
                Some(Ok(Message::Ping(_))) => {
                    // Pong은 tungstenite에서 자동으로 처리됨
                    debug!("Received ping");
                }
                Some(Ok(Message::Close(frame))) => {
                    warn!(?frame, "서버가 WebSocket을 닫음");
                    return Err(ExchangeError::Disconnected(format!("closed: {:?}", frame)));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(ExchangeError::Disconnected("stream ended".to_string()));
                }
            }
        }
    }
}
