//! Local-extremum detection over price series.
//!
//! Two flavours are used by the detectors:
//! - [`find_peaks`] / [`find_troughs`]: neighbour comparison with plateau
//!   handling and a minimum separation between accepted peaks.
//! - [`swing_points`]: strict extremum over a symmetric window of candles.

use crate::domain::{Candle, Level, LevelKind};

/// Indices of local maxima in `values`.
///
/// A peak is a sample strictly greater than its left neighbour and strictly
/// greater than the first differing sample to its right. Flat tops report
/// their midpoint (rounded down). Endpoints are never peaks and NaN never
/// compares greater, so it never forms or confirms a peak.
///
/// With `min_distance > 1`, peaks closer than `min_distance` samples to a
/// higher accepted peak are dropped. Highest peaks are accepted first; among
/// equal heights the later index wins.
pub fn find_peaks(values: &[f64], min_distance: usize) -> Vec<usize> {
    let peaks = local_maxima(values);
    if min_distance <= 1 || peaks.len() < 2 {
        return peaks;
    }
    select_by_distance(values, &peaks, min_distance)
}

/// Indices of local minima in `values` (peaks of the negated series).
pub fn find_troughs(values: &[f64], min_distance: usize) -> Vec<usize> {
    let negated: Vec<f64> = values.iter().map(|v| -v).collect();
    find_peaks(&negated, min_distance)
}

fn local_maxima(values: &[f64]) -> Vec<usize> {
    let n = values.len();
    let mut peaks = Vec::new();
    if n < 3 {
        return peaks;
    }
    let mut i = 1;
    while i < n - 1 {
        if values[i - 1] < values[i] {
            let mut ahead = i + 1;
            while ahead < n - 1 && values[ahead] == values[i] {
                ahead += 1;
            }
            if values[ahead] < values[i] {
                let right_edge = ahead - 1;
                peaks.push((i + right_edge) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    peaks
}

fn select_by_distance(values: &[f64], peaks: &[usize], min_distance: usize) -> Vec<usize> {
    let mut keep = vec![true; peaks.len()];

    // Stable sort: equal heights keep index order, so iterating from the back
    // visits the later of two equal peaks first.
    let mut by_height: Vec<usize> = (0..peaks.len()).collect();
    by_height.sort_by(|&a, &b| values[peaks[a]].total_cmp(&values[peaks[b]]));

    for &j in by_height.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < min_distance {
            keep[k - 1] = false;
            k -= 1;
        }
        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - peaks[j] < min_distance {
            keep[k] = false;
            k += 1;
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, kept)| kept.then_some(p))
        .collect()
}

/// Swing highs and lows: a candle whose high (low) is strictly above (below)
/// the highs (lows) of the `period` candles on each side.
///
/// Returned in index order; a candle can be both a swing high and a swing low.
pub fn swing_points(candles: &[Candle], period: usize) -> Vec<Level> {
    let n = candles.len();
    let mut levels = Vec::new();
    if period == 0 || n < 2 * period + 1 {
        return levels;
    }

    for i in period..n - period {
        let high = candles[i].high;
        let low = candles[i].low;
        let is_high = (1..=period)
            .all(|j| high > candles[i - j].high && high > candles[i + j].high);
        let is_low = (1..=period).all(|j| low < candles[i - j].low && low < candles[i + j].low);

        if is_high {
            levels.push(Level {
                index: i,
                price: high,
                kind: LevelKind::SwingHigh,
            });
        }
        if is_low {
            levels.push(Level {
                index: i,
                price: low,
                kind: LevelKind::SwingLow,
            });
        }
    }
    levels
}

/// Running "last known" value of a level kind: for each candle, the price of
/// the most recent level of `kind` at or before it (NaN before the first).
pub fn forward_fill(levels: &[Level], kind: LevelKind, len: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; len];
    let mut last = f64::NAN;
    let mut pending = levels.iter().filter(|l| l.kind == kind).peekable();
    for (i, slot) in out.iter_mut().enumerate() {
        while let Some(level) = pending.next_if(|l| l.index <= i) {
            last = level.price;
        }
        *slot = last;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_candles;

    fn make_ranges(ranges: &[(f64, f64)]) -> Vec<Candle> {
        let mut candles = make_candles(&vec![0.0; ranges.len()]);
        for (c, &(high, low)) in candles.iter_mut().zip(ranges) {
            c.high = high;
            c.low = low;
            c.open = low;
            c.close = high;
        }
        candles
    }

    #[test]
    fn simple_peaks() {
        let v = [0.0, 2.0, 0.0, 3.0, 0.0, 1.0, 1.0];
        assert_eq!(find_peaks(&v, 1), vec![1, 3]);
    }

    #[test]
    fn plateau_reports_midpoint() {
        let v = [0.0, 1.0, 2.0, 2.0, 2.0, 2.0, 1.0];
        assert_eq!(find_peaks(&v, 1), vec![3]);
    }

    #[test]
    fn endpoints_and_nan_are_not_peaks() {
        assert!(find_peaks(&[5.0, 1.0, 5.0], 1).is_empty());
        assert!(find_peaks(&[0.0, f64::NAN, 0.0], 1).is_empty());
        assert!(find_peaks(&[1.0], 1).is_empty());
    }

    #[test]
    fn distance_keeps_highest() {
        let v = [0.0, 2.0, 0.0, 3.0, 0.0, 2.5, 0.0, 0.0, 0.0, 1.0, 0.0];
        // peaks at 1, 3, 5, 9; with distance 3 the 3.0 peak removes 1 and 5
        assert_eq!(find_peaks(&v, 3), vec![3, 9]);
    }

    #[test]
    fn distance_tie_prefers_later_index() {
        let v = [0.0, 2.0, 0.0, 2.0, 0.0];
        assert_eq!(find_peaks(&v, 3), vec![3]);
    }

    #[test]
    fn troughs_mirror_peaks() {
        let v = [3.0, 1.0, 3.0, 0.5, 3.0];
        assert_eq!(find_troughs(&v, 1), vec![1, 3]);
    }

    #[test]
    fn swing_points_strict() {
        let candles = make_ranges(&[
            (10.0, 8.0),
            (11.0, 9.0),
            (15.0, 10.0),
            (12.0, 9.0),
            (11.0, 8.0),
            (9.0, 6.0),
            (10.0, 7.0),
            (11.0, 8.0),
        ]);
        let swings = swing_points(&candles, 2);
        assert_eq!(
            swings,
            vec![
                Level {
                    index: 2,
                    price: 15.0,
                    kind: LevelKind::SwingHigh
                },
                Level {
                    index: 5,
                    price: 6.0,
                    kind: LevelKind::SwingLow
                },
            ]
        );
    }

    #[test]
    fn forward_fill_carries_last_value() {
        let levels = [
            Level {
                index: 1,
                price: 5.0,
                kind: LevelKind::SwingHigh,
            },
            Level {
                index: 2,
                price: 1.0,
                kind: LevelKind::SwingLow,
            },
            Level {
                index: 3,
                price: 6.0,
                kind: LevelKind::SwingHigh,
            },
        ];
        let filled = forward_fill(&levels, LevelKind::SwingHigh, 5);
        assert!(filled[0].is_nan());
        assert_eq!(&filled[1..], &[5.0, 5.0, 6.0, 6.0]);
    }
}
