//! 거래 페어 심볼 정의.
//!
//! 수집 파이프라인은 `"BTC/USDT"` 형식의 표준 심볼 문자열을 자연 키로 사용합니다.
//! 거래소별 표기(`BTCUSDT`, `btcusdt`)로의 변환은 각 커넥터가 담당합니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 기준 자산과 호가 자산으로 구성된 거래 페어.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    /// 기준 자산 (예: BTC)
    pub base: String,
    /// 호가 자산 (예: USDT)
    pub quote: String,
}

impl Symbol {
    /// 새 심볼을 생성합니다.
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// "BASE/QUOTE" 형식 문자열에서 심볼을 파싱합니다.
    ///
    /// 구분자가 없거나 어느 한쪽이 비어 있으면 `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let (base, quote) = s.trim().split_once('/')?;
        let valid = |part: &str| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric())
        };
        if valid(base) && valid(quote) {
            Some(Self::new(base, quote))
        } else {
            None
        }
    }

    /// 표준 심볼 문자열 형식을 반환합니다.
    pub fn to_standard_string(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }

    /// 구분자 없이 이어붙인 형식 (`BTCUSDT`).
    pub fn concatenated(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for Symbol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Invalid symbol (expected BASE/QUOTE): {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_creation() {
        let symbol = Symbol::new("btc", "usdt");
        assert_eq!(symbol.base, "BTC");
        assert_eq!(symbol.quote, "USDT");
        assert_eq!(symbol.to_string(), "BTC/USDT");
        assert_eq!(symbol.concatenated(), "BTCUSDT");
    }

    #[test]
    fn test_symbol_parse() {
        let symbol: Symbol = "ETH/USDT".parse().unwrap();
        assert_eq!(symbol.base, "ETH");
        assert_eq!(symbol.quote, "USDT");

        assert!(Symbol::parse("ETHUSDT").is_none());
        assert!(Symbol::parse("/USDT").is_none());
        assert!(Symbol::parse("ETH/").is_none());
        assert!(Symbol::parse("ETH/US-DT").is_none());
    }
}
