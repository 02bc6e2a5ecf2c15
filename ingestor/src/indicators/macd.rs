//! MACD recurrence: EMA(12), EMA(26) and a 9-period signal line.

pub const ALPHA_SHORT: f64 = 2.0 / 13.0;
pub const ALPHA_LONG: f64 = 2.0 / 27.0;
pub const ALPHA_SIGNAL: f64 = 2.0 / 10.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MacdState {
    pub ema_short: f64,
    pub ema_long: f64,
    pub diff: f64,
    pub signal_line: f64,
}

impl MacdState {
    /// Neutral seed for a symbol without history.
    pub fn seed(price: f64) -> Self {
        Self {
            ema_short: price,
            ema_long: price,
            diff: 0.0,
            signal_line: 0.0,
        }
    }

    pub fn step(&self, price: f64) -> Self {
        let ema_short = ALPHA_SHORT * price + (1.0 - ALPHA_SHORT) * self.ema_short;
        let ema_long = ALPHA_LONG * price + (1.0 - ALPHA_LONG) * self.ema_long;
        let diff = ema_short - ema_long;
        let signal_line = ALPHA_SIGNAL * diff + (1.0 - ALPHA_SIGNAL) * self.signal_line;

        Self {
            ema_short,
            ema_long,
            diff,
            signal_line,
        }
    }
}
