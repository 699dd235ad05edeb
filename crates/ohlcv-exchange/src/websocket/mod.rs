//! WebSocket 구독 구현.

mod stream;

pub use stream::{BinanceKlineSubscription, READ_IDLE_TIMEOUT};
