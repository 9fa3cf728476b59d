use async_trait::async_trait;
use signal_core::candle::Candle;

use crate::error::ProviderError;

/// Trait for fetching recent candles for a trading pair from an external source.
#[async_trait]
pub trait CandleProvider: Send + Sync {
    /// Provider name (for logging/display).
    fn name(&self) -> &str;

    /// Fetch the `limit` most recent candles for `pair` at `timeframe`.
    /// Returns candles sorted by timestamp, oldest first.
    async fn fetch_candles(
        &self,
        pair: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError>;
}
