//! Indicator state engine.
//!
//! [`compute_next`] is a pure function of the new quote and the stored rows
//! of earlier trading days. Re-running it for the same inputs yields the
//! same row, so re-ingesting a quote (or restarting the process mid-day)
//! never drifts the state.

pub mod bollinger;
pub mod kdj;
pub mod ma;
pub mod macd;
pub mod trix;
pub mod volume;

use crate::model::{CanonicalQuote, DailyRecord};

use kdj::KdjState;
use macd::MacdState;
use trix::TrixState;

/// Number of prior rows the engine needs: the longest window is MA20/BOLL.
pub const HISTORY_DEPTH: usize = 20;

pub struct EngineInput<'a> {
    pub quote: &'a CanonicalQuote,
    /// Rows strictly before `quote.day`, most recent first.
    pub history: &'a [DailyRecord],
    /// Volumes of recent samples in the quote's intraday bucket, most recent first.
    pub baseline_volumes: &'a [i64],
    /// Trading minutes elapsed at `quote.observed_at`.
    pub elapsed_minutes: u32,
}

pub fn compute_next(input: &EngineInput<'_>) -> DailyRecord {
    let q = input.quote;
    let history = &input.history[..input.history.len().min(HISTORY_DEPTH)];

    let closes: Vec<f64> = std::iter::once(q.close)
        .chain(history.iter().map(|r| r.close))
        .collect();

    let ma5 = ma::round2(ma::simple(&closes, 5));
    let ma10 = ma::round2(ma::simple(&closes, 10));
    let ma20 = ma::round2(ma::simple(&closes, 20));
    let (boll_upper, boll_lower) = bollinger::bands(&closes, ma20);

    let volume_ratio = ma::round2(volume::volume_ratio(
        q.volume,
        input.baseline_volumes,
        input.elapsed_minutes,
    ));

    let (macd, kdj, trix, trix_ma) = match history.first() {
        None => (
            MacdState::seed(q.close),
            KdjState::seed(),
            TrixState::seed(q.close),
            0.0,
        ),
        Some(prev) => {
            let macd = MacdState {
                ema_short: prev.ema_short,
                ema_long: prev.ema_long,
                diff: prev.diff,
                signal_line: prev.signal_line,
            }
            .step(q.close);

            let highs: Vec<f64> = std::iter::once(q.high)
                .chain(history.iter().map(|r| r.high))
                .collect();
            let lows: Vec<f64> = std::iter::once(q.low)
                .chain(history.iter().map(|r| r.low))
                .collect();
            let kdj = KdjState {
                k: prev.kdj_k,
                d: prev.kdj_d,
                j: prev.kdj_j,
            }
            .step(kdj::rsv(q.close, &highs, &lows));

            let trix = TrixState {
                ema1: prev.trix_ema1,
                ema2: prev.trix_ema2,
                ema3: prev.trix_ema3,
                trix: prev.trix,
            }
            .step(q.close);
            let trix_ma = trix::trix_ma(trix.trix, history.iter().map(|r| r.trix));

            (macd, kdj, trix, trix_ma)
        }
    };

    DailyRecord {
        symbol: q.symbol.clone(),
        day: q.day,
        name: q.name.clone(),
        open: q.open,
        high: q.high,
        low: q.low,
        close: q.close,
        prior_close: q.prior_close,
        volume: q.volume,
        turnover_rate: q.turnover_rate,
        ma5,
        ma10,
        ma20,
        ema_short: macd.ema_short,
        ema_long: macd.ema_long,
        diff: macd.diff,
        signal_line: macd.signal_line,
        kdj_k: kdj.k,
        kdj_d: kdj.d,
        kdj_j: kdj.j,
        trix_ema1: trix.ema1,
        trix_ema2: trix.ema2,
        trix_ema3: trix.ema3,
        trix: trix.trix,
        trix_ma,
        boll_upper,
        boll_lower,
        volume_ratio,
        net_inflow: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use proptest::prelude::*;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn quote(day: u32, close: f64, high: f64, low: f64, volume: i64) -> CanonicalQuote {
        CanonicalQuote {
            symbol: "600519".into(),
            name: "Kweichow Moutai".into(),
            day: at(day, 0, 0).date(),
            observed_at: at(day, 14, 0),
            open: close,
            high,
            low,
            close,
            prior_close: close,
            volume,
            turnover_rate: Some(0.4),
        }
    }

    fn run(q: &CanonicalQuote, history: &[DailyRecord]) -> DailyRecord {
        compute_next(&EngineInput {
            quote: q,
            history,
            baseline_volumes: &[],
            elapsed_minutes: 240,
        })
    }

    #[test]
    fn new_symbol_gets_neutral_seed() {
        let row = run(&quote(4, 10.0, 10.0, 10.0, 1_000), &[]);

        assert_eq!(row.ma5, 10.0);
        assert_eq!(row.ema_short, 10.0);
        assert_eq!(row.ema_long, 10.0);
        assert_eq!(row.diff, 0.0);
        assert_eq!(row.signal_line, 0.0);
        assert_eq!(row.kdj_k, 50.0);
        assert_eq!(row.kdj_d, 50.0);
        assert_eq!(row.trix_ema3, 10.0);
        assert_eq!(row.trix, 0.0);
        assert_eq!(row.trix_ma, 0.0);
        assert_eq!(row.boll_upper, 10.0);
        assert_eq!(row.boll_lower, 10.0);
        assert_eq!(row.volume_ratio, 1.0);
        assert_eq!(row.net_inflow, None);
    }

    #[test]
    fn flat_window_keeps_k_at_fifty() {
        let mut history = Vec::new();
        for day in 1..=9 {
            let row = run(&quote(day, 10.0, 10.0, 10.0, 500), &history);
            history.insert(0, row);
        }

        let row = run(&quote(11, 10.0, 10.0, 10.0, 500), &history);
        assert_eq!(row.kdj_k, 50.0);
        assert_eq!(row.kdj_d, 50.0);
    }

    #[test]
    fn uses_previous_day_state_not_same_day() {
        let day1 = run(&quote(4, 10.0, 10.5, 9.5, 1_000), &[]);
        let history = vec![day1];

        // Two quotes of the same day computed against the same prior row:
        // the later one fully replaces the earlier one.
        let early = run(&quote(5, 11.0, 11.0, 10.0, 300), &history);
        let late = run(&quote(5, 12.0, 12.0, 10.0, 900), &history);
        let replay = run(&quote(5, 12.0, 12.0, 10.0, 900), &history);

        assert_ne!(early, late);
        assert_eq!(late, replay);
        assert_eq!(late.ma5, 11.0);
        assert!(late.diff > 0.0);
        assert!(late.kdj_k > 50.0);
    }

    #[test]
    fn trix_ma_averages_today_with_prior_rows() {
        let mut history = Vec::new();
        for (i, close) in [10.0, 11.0, 12.5, 12.0].into_iter().enumerate() {
            let row = run(&quote(i as u32 + 1, close, close, close, 100), &history);
            history.insert(0, row);
        }
        let row = run(&quote(8, 13.0, 13.0, 13.0, 100), &history);

        // Five values available, still averaged over nine.
        let expected = (row.trix + history.iter().map(|r| r.trix).sum::<f64>()) / 9.0;
        assert!((row.trix_ma - expected).abs() < 1e-12);
    }

    #[test]
    fn second_day_trix_ma_is_a_ninth_of_trix() {
        let day1 = run(&quote(4, 10.0, 10.0, 10.0, 1_000), &[]);
        let day2 = run(&quote(5, 11.0, 11.0, 11.0, 1_000), &[day1]);

        assert!(day2.trix > 0.0);
        assert!((day2.trix_ma - day2.trix / 9.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn engine_is_deterministic_and_finite(
            closes in proptest::collection::vec(1.0f64..500.0, 1..30),
            volume in 0i64..10_000_000,
            samples in proptest::collection::vec(0i64..10_000_000, 0..8),
            elapsed in 0u32..300,
        ) {
            let mut history = Vec::new();
            for (i, c) in closes.iter().enumerate() {
                let q = quote((i % 28) as u32 + 1, *c, c * 1.02, c * 0.98, volume);
                let row = run(&q, &history);
                history.insert(0, row);
                history.truncate(HISTORY_DEPTH);
            }

            let q = quote(28, closes[0], closes[0], closes[0], volume);
            let input = EngineInput {
                quote: &q,
                history: &history,
                baseline_volumes: &samples,
                elapsed_minutes: elapsed,
            };
            let a = compute_next(&input);
            let b = compute_next(&input);

            prop_assert_eq!(&a, &b);
            prop_assert!(a.kdj_k.is_finite() && a.trix.is_finite() && a.volume_ratio.is_finite());
            prop_assert!(a.boll_upper >= a.boll_lower);
        }
    }
}
