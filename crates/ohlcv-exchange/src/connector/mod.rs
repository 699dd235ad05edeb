//! 거래소 커넥터.

pub mod binance;

pub use binance::*;

use crate::error::ExchangeError;
use crate::traits::{ExchangeClient, ExchangeResult};
use ohlcv_core::ExchangeSettings;
use std::sync::Arc;

/// 거래소 식별자로 클라이언트를 생성합니다.
///
/// 알 수 없는 식별자는 `UnsupportedExchange` 설정 에러입니다.
pub fn create_client(settings: &ExchangeSettings) -> ExchangeResult<Arc<dyn ExchangeClient>> {
    match settings.name.trim().to_lowercase().as_str() {
        "binance" => {
            let client = BinanceClient::new(BinanceConfig::from_settings(settings))?;
            Ok(Arc::new(client))
        }
        other => Err(ExchangeError::UnsupportedExchange(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_client() {
        let client = create_client(&ExchangeSettings::default()).unwrap();
        assert_eq!(client.name(), "binance");

        let settings = ExchangeSettings {
            name: "kraken".to_string(),
            ..Default::default()
        };
        let err = create_client(&settings).err().unwrap();
        assert!(matches!(err, ExchangeError::UnsupportedExchange(ref name) if name == "kraken"));
        assert!(err.is_config_error());
    }
}
