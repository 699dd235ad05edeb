//! 테스트와 드라이런을 위한 시뮬레이션 거래소.
//!
//! # 예제
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use ohlcv_core::{SeriesKey, Timeframe};
//! use ohlcv_exchange::simulated::{synthetic_candles, ScriptedExchange};
//!
//! let key = SeriesKey::new("BTC/USDT", Timeframe::H1);
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//!
//! let exchange = ScriptedExchange::new();
//! exchange.push_page(&key, synthetic_candles(&key, start, 500));
//! exchange.push_update(&key, synthetic_candles(&key, start, 1));
//! ```

mod scripted;

pub use scripted::{synthetic_candles, ScriptedExchange};
