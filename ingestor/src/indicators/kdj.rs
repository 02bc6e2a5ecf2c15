//! KDJ stochastic oscillator over a 9-period high/low window.

pub const PERIOD: usize = 9;
pub const NEUTRAL: f64 = 50.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KdjState {
    pub k: f64,
    pub d: f64,
    pub j: f64,
}

impl KdjState {
    pub fn seed() -> Self {
        Self {
            k: NEUTRAL,
            d: NEUTRAL,
            j: NEUTRAL,
        }
    }

    pub fn step(&self, rsv: f64) -> Self {
        let k = (2.0 * self.k + rsv) / 3.0;
        let d = (2.0 * self.d + k) / 3.0;
        Self { k, d, j: 3.0 * k - 2.0 * d }
    }
}

/// Raw stochastic value of `price` within the window's range.
///
/// `highs` and `lows` are most recent first; only the first [`PERIOD`]
/// entries are considered. A zero-width range yields the neutral 50.
pub fn rsv(price: f64, highs: &[f64], lows: &[f64]) -> f64 {
    let high = highs
        .iter()
        .take(PERIOD)
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let low = lows
        .iter()
        .take(PERIOD)
        .copied()
        .fold(f64::INFINITY, f64::min);

    if !high.is_finite() || !low.is_finite() || high == low {
        return NEUTRAL;
    }

    (price - low) / (high - low) * 100.0
}
