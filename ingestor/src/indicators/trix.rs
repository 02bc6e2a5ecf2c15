//! TRIX: rate of change of a triple-smoothed EMA(12), with a 9-value mean.

pub const ALPHA: f64 = 2.0 / 13.0;
pub const MA_PERIOD: usize = 9;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrixState {
    pub ema1: f64,
    pub ema2: f64,
    pub ema3: f64,
    pub trix: f64,
}

impl TrixState {
    pub fn seed(price: f64) -> Self {
        Self {
            ema1: price,
            ema2: price,
            ema3: price,
            trix: 0.0,
        }
    }

    pub fn step(&self, price: f64) -> Self {
        let ema1 = ALPHA * price + (1.0 - ALPHA) * self.ema1;
        let ema2 = ALPHA * ema1 + (1.0 - ALPHA) * self.ema2;
        let ema3 = ALPHA * ema2 + (1.0 - ALPHA) * self.ema3;

        let trix = if self.ema3 == 0.0 {
            0.0
        } else {
            (ema3 - self.ema3) / self.ema3 * 100.0
        };

        Self {
            ema1,
            ema2,
            ema3,
            trix,
        }
    }
}

/// Today's TRIX plus up to eight prior values, always divided by
/// [`MA_PERIOD`]. A short history therefore pulls the average towards zero.
pub fn trix_ma(today: f64, prior: impl IntoIterator<Item = f64>) -> f64 {
    let sum: f64 = today + prior.into_iter().take(MA_PERIOD - 1).sum::<f64>();
    sum / MA_PERIOD as f64
}
