//! Pair selection by daily volatility.
//!
//! Each pair's candles are folded into calendar-day bars and ranked by the
//! latest daily ATR, most volatile first. Pairs with too few days for the ATR
//! are left out of the ranking.

use confluence_core::domain::Candle;
use confluence_core::indicators::Atr;
use serde::Serialize;
use tracing::{info, warn};

use crate::evaluate::PairInput;

/// ATR period used when none is given.
pub const DEFAULT_SELECTOR_ATR_PERIOD: usize = 14;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairVolatility {
    pub pair: String,
    /// Latest daily ATR in price units.
    pub daily_atr: f64,
    /// `daily_atr` over the last close.
    pub atr_pct: f64,
}

/// One bar per calendar day, stamped with the day's last candle.
pub fn daily_bars(candles: &[Candle]) -> Vec<Candle> {
    let mut days: Vec<Candle> = Vec::new();
    for c in candles {
        match days.last_mut() {
            Some(day) if day.timestamp.date() == c.timestamp.date() => {
                day.timestamp = c.timestamp;
                day.high = day.high.max(c.high);
                day.low = day.low.min(c.low);
                day.close = c.close;
                day.volume += c.volume;
            }
            _ => days.push(c.clone()),
        }
    }
    days
}

/// Rank `inputs` by daily ATR, highest first. Ties keep input order.
pub fn rank_pairs_by_volatility(inputs: &[PairInput], atr_period: usize) -> Vec<PairVolatility> {
    let atr = Atr::new(atr_period.max(1));
    let mut ranked: Vec<PairVolatility> = inputs
        .iter()
        .filter_map(|input| {
            let days = daily_bars(input.series.candles());
            let Some(daily_atr) = atr.latest(&days) else {
                warn!(pair = %input.pair, days = days.len(), atr_period, "not enough daily bars for ATR, pair skipped");
                return None;
            };
            let close = days.last().map_or(f64::NAN, |d| d.close);
            Some(PairVolatility {
                pair: input.pair.clone(),
                daily_atr,
                atr_pct: daily_atr / close,
            })
        })
        .collect();
    ranked.sort_by(|a, b| b.daily_atr.total_cmp(&a.daily_atr));

    for (rank, v) in ranked.iter().enumerate() {
        info!(rank = rank + 1, pair = %v.pair, daily_atr = v.daily_atr, "pair ranked");
    }
    ranked
}

/// The ranked subset of `inputs`, most volatile first.
pub fn order_by_volatility(inputs: &[PairInput], atr_period: usize) -> Vec<PairInput> {
    rank_pairs_by_volatility(inputs, atr_period)
        .iter()
        .filter_map(|v| inputs.iter().find(|i| i.pair == v.pair).cloned())
        .collect()
}
