//! Trailing-window primitives shared by every rolling column.

use std::collections::VecDeque;
use std::str::FromStr;

use rust_decimal::RoundingStrategy;
use rust_decimal::prelude::*;

/// Bounded history of the most recent values of one series, newest last.
///
/// Mirrors a `rows between N preceding and current row` frame: averages
/// over a window longer than the history seen so far use only the rows
/// available.
#[derive(Debug, Clone)]
pub struct TrailingWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl TrailingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value pushed `k` steps ago; `lag(0)` is the newest.
    pub fn lag(&self, k: usize) -> Option<f64> {
        let len = self.values.len();
        if k >= len {
            return None;
        }
        self.values.get(len - 1 - k).copied()
    }

    /// Mean of the newest `min(length, len)` values.
    ///
    /// The sum is rebuilt oldest-first on every call instead of kept as a
    /// running total, so results never drift with series length and match
    /// a frame-by-frame aggregate exactly.
    pub fn mean(&self, length: usize) -> Option<f64> {
        let take = length.min(self.values.len());
        if take == 0 {
            return None;
        }
        let sum: f64 = self.values.iter().skip(self.values.len() - take).sum();
        Some(sum / take as f64)
    }
}

/// Round half away from zero on the shortest round-trip decimal form of
/// `value`, so `2.675` rounds to `2.68` and `101.96499999999999` to `101.96`.
pub fn round_half_away(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let rounded = shortest_decimal(value)
        .map(|d| d.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or_else(|| {
            let factor = 10f64.powi(decimals as i32);
            (value * factor).round() / factor
        });
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// `Display` for f64 prints the shortest digits that round-trip; parse those
/// rather than the binary value. Magnitudes too long for plain notation go
/// through the exponent form.
fn shortest_decimal(value: f64) -> Option<Decimal> {
    Decimal::from_str(&value.to_string())
        .or_else(|_| Decimal::from_scientific(&format!("{value:e}")))
        .ok()
}

pub fn round2(value: f64) -> f64 {
    round_half_away(value, 2)
}

/// `(new - base) / base * 100`; `None` when `base` is zero.
pub fn pct_change(new: f64, base: f64) -> Option<f64> {
    if base == 0.0 {
        return None;
    }
    Some((new - base) / base * 100.0)
}
