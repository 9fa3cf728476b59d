use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::de::{self, IgnoredAny, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use signal_core::candle::Candle;
use tracing::debug;

use crate::error::ProviderError;
use crate::provider::CandleProvider;

const BINANCE_BASE_URL: &str = "https://api.binance.com";

/// Kline intervals accepted by `/api/v3/klines`.
pub const SUPPORTED_INTERVALS: &[&str] = &[
    "1s", "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w",
    "1M",
];

/// Upper bound Binance enforces on `limit`.
const MAX_LIMIT: usize = 1000;

/// Binance spot market data provider.
/// Public endpoint, no authentication required.
pub struct BinanceProvider {
    client: Client,
    base_url: String,
    quote_asset: String,
}

impl BinanceProvider {
    /// Create a provider quoting pairs against `quote_asset` (e.g. `USDT`).
    /// Every request is bounded by `timeout`.
    pub fn new(
        quote_asset: impl Into<String>,
        timeout: Duration,
        base_url: Option<String>,
    ) -> Result<Self, ProviderError> {
        let quote_asset = quote_asset.into().trim().to_uppercase();
        if quote_asset.is_empty() {
            return Err(ProviderError::Config("quote asset must not be empty".into()));
        }

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.unwrap_or_else(|| BINANCE_BASE_URL.to_string()),
            quote_asset,
        })
    }

    /// Exchange symbol for a configured pair, e.g. `btc` → `BTCUSDT`.
    pub fn symbol(&self, pair: &str) -> String {
        format!("{}{}", pair.trim().to_uppercase(), self.quote_asset)
    }

    pub fn validate_interval(interval: &str) -> Result<(), ProviderError> {
        if SUPPORTED_INTERVALS.contains(&interval) {
            Ok(())
        } else {
            Err(ProviderError::Config(format!(
                "unsupported interval '{interval}'. Expected one of: {}",
                SUPPORTED_INTERVALS.join(", ")
            )))
        }
    }
}

/// One kline row. Binance sends a JSON array whose first six elements are
/// open time (ms since epoch) and OHLCV as decimal strings; trailing columns
/// are skipped, however many there are.
#[derive(Debug)]
struct KlineRow {
    open_time: i64,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
}

impl<'de> Deserialize<'de> for KlineRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = KlineRow;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a kline array with at least 6 elements")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<KlineRow, A::Error> {
                let open_time: i64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let mut price = |index: usize| -> Result<String, A::Error> {
                    seq.next_element()?
                        .ok_or_else(|| de::Error::invalid_length(index, &self))
                };
                let row = KlineRow {
                    open_time,
                    open: price(1)?,
                    high: price(2)?,
                    low: price(3)?,
                    close: price(4)?,
                    volume: price(5)?,
                };
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(row)
            }
        }

        deserializer.deserialize_seq(RowVisitor)
    }
}

#[derive(Debug, Deserialize)]
struct BinanceErrorBody {
    code: i64,
    msg: String,
}

fn parse_price(field: &str, value: &str) -> Result<f64, ProviderError> {
    let parsed: f64 = value
        .parse()
        .map_err(|e| ProviderError::Parse(format!("invalid {field} '{value}': {e}")))?;
    if !parsed.is_finite() {
        return Err(ProviderError::Parse(format!("non-finite {field} '{value}'")));
    }
    Ok(parsed)
}

impl KlineRow {
    fn to_candle(&self) -> Result<Candle, ProviderError> {
        let timestamp = DateTime::from_timestamp_millis(self.open_time).ok_or_else(|| {
            ProviderError::Parse(format!("invalid open time: {}", self.open_time))
        })?;

        Ok(Candle {
            timestamp,
            open: parse_price("open", &self.open)?,
            high: parse_price("high", &self.high)?,
            low: parse_price("low", &self.low)?,
            close: parse_price("close", &self.close)?,
            volume: parse_price("volume", &self.volume)?,
        })
    }
}

fn parse_klines(rows: &[KlineRow]) -> Result<Vec<Candle>, ProviderError> {
    let mut candles = rows
        .iter()
        .map(KlineRow::to_candle)
        .collect::<Result<Vec<_>, _>>()?;
    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}

#[async_trait]
impl CandleProvider for BinanceProvider {
    fn name(&self) -> &str {
        "binance"
    }

    async fn fetch_candles(
        &self,
        pair: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        Self::validate_interval(timeframe)?;
        let symbol = self.symbol(pair);
        let limit = limit.clamp(1, MAX_LIMIT).to_string();

        let response = self
            .client
            .get(format!("{}/api/v3/klines", self.base_url))
            .query(&[
                ("symbol", symbol.as_str()),
                ("interval", timeframe),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        // 418 means the IP is banned after ignoring earlier 429s.
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ProviderError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<BinanceErrorBody>(&body) {
                Ok(err) => format!("{} (code {})", err.msg, err.code),
                Err(_) => body,
            };
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let rows: Vec<KlineRow> = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("failed to parse response: {e}")))?;

        let candles = parse_klines(&rows)?;
        debug!(%symbol, timeframe, count = candles.len(), "fetched klines");
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const KLINES_JSON: &str = r#"[
        [1736951400000, "96500.10", "96620.00", "96480.55", "96610.01", "12.345",
         1736951459999, "1192345.67", 321, "6.1", "589000.12", "0"],
        [1736951340000, "96450.00", "96510.00", "96400.00", "96500.10", "10.5",
         1736951399999, "1013250.00", 280, "5.0", "482500.00", "0"]
    ]"#;

    #[test]
    fn parse_kline_rows() {
        let rows: Vec<KlineRow> = serde_json::from_str(KLINES_JSON).unwrap();
        let candles = parse_klines(&rows).unwrap();

        assert_eq!(candles.len(), 2);
        // Sorted oldest first
        assert_eq!(
            candles[0].timestamp,
            Utc.with_ymd_and_hms(2025, 1, 15, 14, 29, 0).unwrap()
        );
        assert_eq!(candles[0].close, 96500.10);
        assert_eq!(candles[1].open, 96500.10);
        assert_eq!(candles[1].high, 96620.00);
        assert_eq!(candles[1].low, 96480.55);
        assert_eq!(candles[1].close, 96610.01);
        assert_eq!(candles[1].volume, 12.345);
    }

    #[test]
    fn parse_empty_klines() {
        let rows: Vec<KlineRow> = serde_json::from_str("[]").unwrap();
        assert!(parse_klines(&rows).unwrap().is_empty());
    }

    #[test]
    fn reject_short_kline_row() {
        let json = r#"[[1736951400000, "1.0", "1.0", "1.0", "1.0"]]"#;
        assert!(serde_json::from_str::<Vec<KlineRow>>(json).is_err());
    }

    #[test]
    fn extra_trailing_columns_are_skipped() {
        let json = r#"[[1736951400000, "1.5", "2.0", "1.0", "1.75", "3.0",
                        1736951459999, "0", 1, "0", "0", "0", "new", [1, 2]]]"#;
        let rows: Vec<KlineRow> = serde_json::from_str(json).unwrap();
        let candles = parse_klines(&rows).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].close, 1.75);
        assert_eq!(candles[0].volume, 3.0);
    }

    #[test]
    fn six_column_row_is_enough() {
        let json = r#"[[1736951400000, "1.0", "1.0", "1.0", "1.0", "0.5"]]"#;
        let rows: Vec<KlineRow> = serde_json::from_str(json).unwrap();
        assert_eq!(parse_klines(&rows).unwrap()[0].volume, 0.5);
    }

    #[test]
    fn reject_bad_price() {
        let json = r#"[[1736951400000, "1.0", "abc", "1.0", "1.0", "1.0",
                        1736951459999, "0", 1, "0", "0", "0"]]"#;
        let rows: Vec<KlineRow> = serde_json::from_str(json).unwrap();
        let err = parse_klines(&rows).unwrap_err();
        assert!(matches!(err, ProviderError::Parse(msg) if msg.contains("high")));
    }

    #[test]
    fn reject_non_finite_price() {
        let json = r#"[[1736951400000, "1.0", "1.0", "1.0", "inf", "1.0",
                        1736951459999, "0", 1, "0", "0", "0"]]"#;
        let rows: Vec<KlineRow> = serde_json::from_str(json).unwrap();
        assert!(parse_klines(&rows).is_err());
    }

    #[test]
    fn parse_error_body() {
        let body: BinanceErrorBody =
            serde_json::from_str(r#"{"code": -1121, "msg": "Invalid symbol."}"#).unwrap();
        assert_eq!(body.code, -1121);
        assert_eq!(body.msg, "Invalid symbol.");
    }

    #[test]
    fn symbol_appends_quote_asset() {
        let provider = BinanceProvider::new("usdt", Duration::from_secs(5), None).unwrap();
        assert_eq!(provider.symbol("btc"), "BTCUSDT");
        assert_eq!(provider.symbol(" ETH "), "ETHUSDT");
        assert_eq!(provider.name(), "binance");
    }

    #[test]
    fn empty_quote_asset_rejected() {
        assert!(matches!(
            BinanceProvider::new(" ", Duration::from_secs(5), None),
            Err(ProviderError::Config(_))
        ));
    }

    #[test]
    fn interval_validation() {
        assert!(BinanceProvider::validate_interval("1m").is_ok());
        assert!(BinanceProvider::validate_interval("1M").is_ok());
        assert!(matches!(
            BinanceProvider::validate_interval("7m"),
            Err(ProviderError::Config(_))
        ));
    }

    #[tokio::test]
    async fn unsupported_interval_fails_before_request() {
        // Unroutable base URL: the interval check must fail first.
        let provider = BinanceProvider::new(
            "USDT",
            Duration::from_millis(50),
            Some("http://127.0.0.1:9".into()),
        )
        .unwrap();
        let err = provider.fetch_candles("BTC", "2m", 100).await.unwrap_err();
        assert!(matches!(err, ProviderError::Config(_)));
    }
}
