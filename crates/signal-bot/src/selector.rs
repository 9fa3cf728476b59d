use std::sync::Arc;
use std::time::Duration;

use signal_core::config::BotConfig;
use signal_core::error::SignalError;
use signal_core::scorer::{Score, ScoreResult, SignalScorer};
use signal_providers::error::ProviderError;
use signal_providers::provider::CandleProvider;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};

const DEFAULT_CANDLE_LIMIT: usize = 100;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Why one pair/timeframe combination produced no candidate.
#[derive(Debug, Error)]
pub enum CellError {
    #[error("fetch failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("scoring failed: {0}")]
    Score(#[from] SignalError),

    #[error("evaluation task failed: {0}")]
    Task(String),
}

#[derive(Debug)]
pub struct CellFailure {
    pub pair: String,
    pub timeframe: String,
    pub error: CellError,
}

/// Result of one pass over every configured combination.
#[derive(Debug, Default)]
pub struct Selection {
    /// Highest-scoring combination, `None` when nothing scored above zero.
    pub best: Option<ScoreResult>,
    pub evaluated: usize,
    pub failures: Vec<CellFailure>,
}

/// Scores every pair × timeframe combination and keeps the best one.
pub struct SignalSelector {
    provider: Arc<dyn CandleProvider>,
    scorer: SignalScorer,
    pairs: Vec<String>,
    timeframes: Vec<String>,
    candle_limit: usize,
    request_timeout: Duration,
}

impl SignalSelector {
    pub fn new(
        provider: Arc<dyn CandleProvider>,
        scorer: SignalScorer,
        pairs: Vec<String>,
        timeframes: Vec<String>,
    ) -> Self {
        Self {
            provider,
            scorer,
            pairs,
            timeframes,
            candle_limit: DEFAULT_CANDLE_LIMIT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn from_config(provider: Arc<dyn CandleProvider>, config: &BotConfig) -> Self {
        Self::new(
            provider,
            SignalScorer::new(config.scorer_params()),
            config.pairs.clone(),
            config.timeframes.clone(),
        )
        .with_candle_limit(config.candle_limit)
        .with_request_timeout(config.request_timeout())
    }

    pub fn with_candle_limit(mut self, candle_limit: usize) -> Self {
        self.candle_limit = candle_limit;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Configured combinations in pair-then-timeframe order.
    pub fn combinations(&self) -> Vec<(String, String)> {
        self.pairs
            .iter()
            .flat_map(|pair| {
                self.timeframes
                    .iter()
                    .map(move |tf| (pair.clone(), tf.clone()))
            })
            .collect()
    }

    /// Evaluate every combination concurrently and pick the best.
    ///
    /// Failures are collected per combination and never abort the pass.
    /// Completion order does not affect the result: candidates are compared
    /// in configured order after all tasks finish.
    pub async fn select_best(&self) -> Selection {
        let combinations = self.combinations();

        let mut tasks = JoinSet::new();
        for (index, (pair, timeframe)) in combinations.iter().cloned().enumerate() {
            let provider = Arc::clone(&self.provider);
            let scorer = self.scorer.clone();
            let limit = self.candle_limit;
            let timeout = self.request_timeout;
            tasks.spawn(async move {
                let outcome =
                    evaluate_cell(provider.as_ref(), &scorer, &pair, &timeframe, limit, timeout)
                        .await;
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<Result<Score, CellError>>> =
            combinations.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => warn!("signal evaluation task failed: {e}"),
            }
        }

        let mut selection = Selection {
            evaluated: combinations.len(),
            ..Selection::default()
        };
        let mut candidates = Vec::new();

        for ((pair, timeframe), outcome) in combinations.into_iter().zip(outcomes) {
            let outcome = outcome.unwrap_or_else(|| {
                Err(CellError::Task("task panicked or was cancelled".into()))
            });
            match outcome {
                Ok(score) => {
                    debug!(
                        %pair,
                        %timeframe,
                        direction = %score.direction,
                        confidence = score.confidence,
                        "scored"
                    );
                    candidates.push(ScoreResult {
                        pair,
                        timeframe,
                        direction: score.direction,
                        confidence: score.confidence,
                    });
                }
                Err(error) => {
                    warn!(%pair, %timeframe, "skipping combination: {error}");
                    selection.failures.push(CellFailure {
                        pair,
                        timeframe,
                        error,
                    });
                }
            }
        }

        selection.best = pick_best(candidates);
        selection
    }
}

async fn evaluate_cell(
    provider: &dyn CandleProvider,
    scorer: &SignalScorer,
    pair: &str,
    timeframe: &str,
    limit: usize,
    timeout: Duration,
) -> Result<Score, CellError> {
    let candles = tokio::time::timeout(timeout, provider.fetch_candles(pair, timeframe, limit))
        .await
        .map_err(|_| CellError::Timeout(timeout))??;
    Ok(scorer.score(&candles)?)
}

/// First candidate whose confidence strictly beats everything before it.
/// Zero never beats the initial best, so all-zero input yields `None`.
pub fn pick_best(candidates: impl IntoIterator<Item = ScoreResult>) -> Option<ScoreResult> {
    let mut best: Option<ScoreResult> = None;
    let mut best_confidence = 0;
    for candidate in candidates {
        if candidate.confidence > best_confidence {
            best_confidence = candidate.confidence;
            best = Some(candidate);
        }
    }
    best
}
