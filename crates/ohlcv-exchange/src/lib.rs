//! 거래소 연결과 캔들 페처.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - `ExchangeClient` trait: 구간 조회 + 구독 두 가지 기능의 거래소 인터페이스
//! - Binance 커넥터 (REST + WebSocket)
//! - 스크립트 기반 시뮬레이션 거래소 (테스트용)
//! - 지수 백오프 재시도 상태
//! - 과거 데이터 페처와 실시간 페처

pub mod connector;
pub mod error;
pub mod historical;
pub mod realtime;
pub mod retry;
pub mod simulated;
pub mod traits;
pub mod websocket;

pub use connector::{create_client, BinanceClient, BinanceConfig};
pub use error::*;
pub use historical::HistoricalFetcher;
pub use realtime::{FetcherState, RealtimeFetcher};
pub use retry::{sleep_or_cancel, Backoff};
pub use simulated::ScriptedExchange;
pub use traits::*;
