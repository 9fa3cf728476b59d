use std::fmt;

use serde::{Deserialize, Serialize};

use crate::candle::Candle;
use crate::error::SignalError;
use crate::indicators;

/// Bonus when the latest close is above the moving average.
pub const ABOVE_MA_BONUS: u32 = 30;
/// Bonus when RSI is outside the oversold/overbought band.
pub const RSI_EXTREME_BONUS: u32 = 25;
/// Bonus when the latest close is above the previous close.
pub const RISING_CLOSE_BONUS: u32 = 20;

/// Predicted direction of the next move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
        }
    }
}

/// Direction and confidence for a single candle window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub direction: Direction,
    pub confidence: u32,
}

/// A scored pair/timeframe combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub pair: String,
    pub timeframe: String,
    pub direction: Direction,
    pub confidence: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScorerParams {
    pub rsi_period: usize,
    pub ma_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
}

impl Default for ScorerParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            ma_period: 20,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
        }
    }
}

/// Additive heuristic scorer: MA trend, RSI extremes and last-candle momentum.
#[derive(Debug, Clone, Default)]
pub struct SignalScorer {
    params: ScorerParams,
}

impl SignalScorer {
    pub fn new(params: ScorerParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ScorerParams {
        &self.params
    }

    /// Minimum number of candles `score` accepts: the MA window plus the
    /// prior close, or the RSI window plus its seed close, whichever is longer.
    pub fn min_candles(&self) -> usize {
        (self.params.ma_period + 1).max(self.params.rsi_period + 1)
    }

    /// Score the most recent candle of a time-ordered window.
    pub fn score(&self, candles: &[Candle]) -> Result<Score, SignalError> {
        let needed = self.min_candles();
        if candles.len() < needed {
            return Err(SignalError::InsufficientData {
                needed,
                got: candles.len(),
            });
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        if let Some(i) = closes.iter().position(|c| !c.is_finite()) {
            return Err(SignalError::InvalidData(format!(
                "non-finite close at index {i}"
            )));
        }

        let rsi = indicators::rsi(&closes, self.params.rsi_period).ok_or(
            SignalError::InsufficientData {
                needed,
                got: candles.len(),
            },
        )?;
        let ma = indicators::sma(&closes, self.params.ma_period).ok_or(
            SignalError::InsufficientData {
                needed,
                got: candles.len(),
            },
        )?;

        let close = closes[closes.len() - 1];
        let prev_close = closes[closes.len() - 2];

        let mut confidence = 0;
        if close > ma {
            confidence += ABOVE_MA_BONUS;
        }
        if rsi < self.params.rsi_oversold || rsi > self.params.rsi_overbought {
            confidence += RSI_EXTREME_BONUS;
        }
        if close > prev_close {
            confidence += RISING_CLOSE_BONUS;
        }

        // Direction depends only on the last two closes.
        let direction = if close > prev_close {
            Direction::Up
        } else {
            Direction::Down
        };

        Ok(Score {
            direction,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn make_candles(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: start + Duration::minutes(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect()
    }

    /// Rising trend with alternating +2 / -1.5 steps, ending on an up step.
    fn zigzag_up(len: usize) -> Vec<f64> {
        let mut closes = vec![100.0];
        for i in 1..len {
            let step = if i % 2 == 0 { 2.0 } else { -1.5 };
            closes.push(closes[i - 1] + step);
        }
        closes
    }

    #[test]
    fn rejects_short_window() {
        let scorer = SignalScorer::default();
        let err = scorer.score(&make_candles(&[1.0; 20])).unwrap_err();
        assert!(matches!(
            err,
            SignalError::InsufficientData { needed: 21, got: 20 }
        ));
    }

    #[test]
    fn window_boundary_is_ma_period_plus_one() {
        let scorer = SignalScorer::default();
        assert_eq!(scorer.min_candles(), 21);

        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert!(matches!(
            scorer.score(&make_candles(&closes)),
            Err(SignalError::InsufficientData { needed: 21, got: 20 })
        ));

        let closes: Vec<f64> = (0..21).map(|i| 100.0 + i as f64).collect();
        assert!(scorer.score(&make_candles(&closes)).is_ok());
    }

    #[test]
    fn longer_rsi_period_sets_the_window() {
        let scorer = SignalScorer::new(ScorerParams {
            rsi_period: 30,
            ..ScorerParams::default()
        });
        assert_eq!(scorer.min_candles(), 31);
    }

    #[test]
    fn rejects_non_finite_close() {
        let mut closes = vec![10.0; 25];
        closes[7] = f64::NAN;
        let err = SignalScorer::default()
            .score(&make_candles(&closes))
            .unwrap_err();
        assert!(matches!(err, SignalError::InvalidData(_)));
    }

    #[test]
    fn linear_rise_scores_maximum() {
        // No losses in the RSI window, so RSI saturates at 100.
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + i as f64).collect();
        let score = SignalScorer::default().score(&make_candles(&closes)).unwrap();
        assert_eq!(score.direction, Direction::Up);
        assert_eq!(score.confidence, 75);
    }

    #[test]
    fn zigzag_rise_keeps_rsi_mid_range() {
        // RSI = 100 - 100 / (1 + 1.0 / 0.75) ≈ 57.1
        let score = SignalScorer::default()
            .score(&make_candles(&zigzag_up(25)))
            .unwrap();
        assert_eq!(score.direction, Direction::Up);
        assert_eq!(score.confidence, ABOVE_MA_BONUS + RISING_CLOSE_BONUS);
    }

    #[test]
    fn flat_series_scores_rsi_bonus_only() {
        let score = SignalScorer::default()
            .score(&make_candles(&[42.0; 30]))
            .unwrap();
        assert_eq!(score.direction, Direction::Down);
        assert_eq!(score.confidence, RSI_EXTREME_BONUS);
    }

    #[test]
    fn falling_series_is_oversold_and_down() {
        let closes: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        let score = SignalScorer::default().score(&make_candles(&closes)).unwrap();
        assert_eq!(score.direction, Direction::Down);
        assert_eq!(score.confidence, RSI_EXTREME_BONUS);
    }

    #[test]
    fn mild_pullback_scores_zero() {
        // Down-trending zigzag ending on a down step: below MA, RSI mid-range.
        let mut closes = vec![100.0];
        for i in 1..30 {
            let step = if i % 2 == 0 { 1.5 } else { -2.0 };
            closes.push(closes[i - 1] + step);
        }
        let score = SignalScorer::default().score(&make_candles(&closes)).unwrap();
        assert_eq!(score.direction, Direction::Down);
        assert_eq!(score.confidence, 0);
    }

    #[test]
    fn custom_thresholds_change_rsi_bonus() {
        let params = ScorerParams {
            rsi_oversold: 10.0,
            rsi_overbought: 50.0,
            ..ScorerParams::default()
        };
        let score = SignalScorer::new(params)
            .score(&make_candles(&zigzag_up(25)))
            .unwrap();
        assert_eq!(score.confidence, 75);
    }

    #[test]
    fn direction_display() {
        assert_eq!(Direction::Up.to_string(), "UP");
        assert_eq!(Direction::Down.to_string(), "DOWN");
    }
}
