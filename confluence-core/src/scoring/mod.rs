//! Confluence scoring: weighted detector votes, trend penalty, threshold.
//!
//! For one evaluation candle every bullish vote adds its detector's weight to
//! the buy score and every bearish vote to the sell score. An uptrend scales
//! the sell score by the penalty factor, a downtrend the buy score. A side
//! wins only if it reaches the threshold and strictly beats the other side.

pub mod trend;

pub use trend::{BarStamp, MaKind, TrendFilter, TrendFilterConfig, TrendState};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detectors::DETECTOR_KINDS;
use crate::domain::{Direction, Signal};
use crate::pipeline::AnalysisFrame;

const DEFAULT_WEIGHTS: [f64; 6] = [1.0, 1.5, 1.0, 2.5, 1.5, 1.5];

// ─── Config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weight per signal column; columns without a weight count zero.
    pub weights: BTreeMap<String, f64>,
    pub signal_threshold: f64,
    /// Multiplier applied to the counter-trend side, in `[0, 1]`.
    pub trend_penalty_factor: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: DETECTOR_KINDS
                .iter()
                .zip(DEFAULT_WEIGHTS)
                .map(|(k, w)| (k.to_string(), w))
                .collect(),
            signal_threshold: 3.0,
            trend_penalty_factor: 0.3,
        }
    }
}

impl ScoringConfig {
    pub fn weight(&self, column: &str) -> f64 {
        self.weights.get(column).copied().unwrap_or(0.0)
    }

    pub fn with_weight(mut self, column: &str, weight: f64) -> Self {
        self.weights.insert(column.to_string(), weight);
        self
    }
}

// ─── Scores ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CompositeScore {
    pub buy_score: f64,
    pub sell_score: f64,
}

impl CompositeScore {
    /// Scale the counter-trend side by `factor`.
    pub fn penalized(self, trend: TrendState, factor: f64) -> Self {
        match trend {
            TrendState::Up => Self {
                sell_score: self.sell_score * factor,
                ..self
            },
            TrendState::Down => Self {
                buy_score: self.buy_score * factor,
                ..self
            },
            TrendState::Undefined => self,
        }
    }

    /// BUY or SELL when one side reaches `threshold` and beats the other.
    pub fn decide(self, threshold: f64) -> Direction {
        if self.buy_score >= threshold && self.buy_score > self.sell_score {
            Direction::Buy
        } else if self.sell_score >= threshold && self.sell_score > self.buy_score {
            Direction::Sell
        } else {
            Direction::Flat
        }
    }
}

/// One non-neutral vote that entered the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub column: String,
    pub signal: Signal,
    pub weight: f64,
}

/// Scorer result for one candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEvaluation {
    pub index: usize,
    /// Scores before the trend penalty.
    pub raw: CompositeScore,
    /// Scores after the trend penalty; these decide the direction.
    pub score: CompositeScore,
    pub trend: TrendState,
    pub direction: Direction,
    pub contributors: Vec<Contribution>,
}

impl ScoreEvaluation {
    /// Short human-readable description of the decision.
    pub fn reason(&self) -> String {
        let names: Vec<&str> = self
            .contributors
            .iter()
            .filter(|c| match self.direction {
                Direction::Buy => c.signal == Signal::Bullish,
                Direction::Sell => c.signal == Signal::Bearish,
                Direction::Flat => false,
            })
            .map(|c| c.column.as_str())
            .collect();
        format!(
            "confluence buy {:.2} / sell {:.2} ({:?} trend) from [{}]",
            self.score.buy_score,
            self.score.sell_score,
            self.trend,
            names.join(", ")
        )
    }
}

// ─── Scorer ──────────────────────────────────────────────────────────

/// Stateless apart from a cursor that only moves forward.
#[derive(Debug, Clone)]
pub struct ConfluenceScorer {
    config: ScoringConfig,
    cursor: usize,
}

impl ConfluenceScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config, cursor: 0 }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score an arbitrary set of `(column, vote)` pairs.
    pub fn score<'a, I>(&self, index: usize, votes: I, trend: TrendState) -> ScoreEvaluation
    where
        I: IntoIterator<Item = (&'a str, Signal)>,
    {
        let mut raw = CompositeScore::default();
        let mut contributors = Vec::new();
        for (column, signal) in votes {
            let weight = self.config.weight(column);
            match signal {
                Signal::Bullish => raw.buy_score += weight,
                Signal::Bearish => raw.sell_score += weight,
                Signal::Neutral => continue,
            }
            contributors.push(Contribution {
                column: column.to_string(),
                signal,
                weight,
            });
        }

        let score = raw.penalized(trend, self.config.trend_penalty_factor);
        let direction = score.decide(self.config.signal_threshold);
        debug!(
            index,
            buy = score.buy_score,
            sell = score.sell_score,
            ?trend,
            %direction,
            "confluence scored"
        );
        ScoreEvaluation {
            index,
            raw,
            score,
            trend,
            direction,
            contributors,
        }
    }

    /// Score every signal column of `frame` at `index`.
    pub fn evaluate(&self, frame: &AnalysisFrame, index: usize, trend: TrendState) -> ScoreEvaluation {
        self.score(index, frame.signals_at(index), trend)
    }

    /// Score the candle at the cursor and advance it; `None` past the end.
    ///
    /// `trends` is indexed like the frame; missing entries are `Undefined`.
    pub fn next(&mut self, frame: &AnalysisFrame, trends: &[TrendState]) -> Option<ScoreEvaluation> {
        if self.cursor >= frame.len() {
            return None;
        }
        let index = self.cursor;
        self.cursor += 1;
        let trend = trends.get(index).copied().unwrap_or_default();
        Some(self.evaluate(frame, index, trend))
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the cursor to `index`; moving backwards is ignored.
    pub fn advance_to(&mut self, index: usize) {
        self.cursor = self.cursor.max(index);
    }
}
