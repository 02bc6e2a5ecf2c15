//! Session gate: decides whether the dispatcher may schedule work.
//!
//! Phases move `Closed -> Detecting -> Open <-> MidDayPause -> Closed`.
//! Opening is never assumed from the calendar alone; a reference probe must
//! show today's session with traded volume. Holidays therefore stay closed
//! without a holiday table.

use std::time::Duration;

use chrono::{Datelike, NaiveDate, Weekday};
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::adapter::{ReferenceProbe, ReferenceReading};

/// Minimum bellwether volume that counts as "traded today".
const MIN_OPEN_VOLUME: i64 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarketPhase {
    Closed,
    Detecting,
    Open,
    MidDayPause,
}

/// What the dispatcher is allowed to ask.
pub trait TradingWindow: Send + Sync {
    fn is_trading_window_open(&self) -> bool;

    /// Whether the market was detected open at some point on `day`.
    fn traded_on(&self, day: NaiveDate) -> bool;
}

#[derive(Clone, Copy, Debug)]
pub struct GateConfig {
    /// Pause between probe attempts after a transport error.
    pub probe_interval: Duration,
    /// Upper bound on one detection attempt.
    pub detect_timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(10),
            detect_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
struct GateState {
    phase: MarketPhase,
    traded_on: Option<NaiveDate>,
}

pub struct SessionGate {
    state: RwLock<GateState>,
    cfg: GateConfig,
}

impl SessionGate {
    pub fn new(cfg: GateConfig) -> Self {
        Self {
            state: RwLock::new(GateState {
                phase: MarketPhase::Closed,
                traded_on: None,
            }),
            cfg,
        }
    }

    pub fn phase(&self) -> MarketPhase {
        self.state.read().phase
    }

    /// Probes until the exchange is known to trade `today` or not.
    ///
    /// Only starts from `Closed`; any other phase is returned unchanged.
    #[instrument(skip(self, probe))]
    pub async fn detect_open(&self, probe: &dyn ReferenceProbe, today: NaiveDate) -> MarketPhase {
        {
            let mut s = self.state.write();
            if s.phase != MarketPhase::Closed {
                return s.phase;
            }
            if matches!(today.weekday(), Weekday::Sat | Weekday::Sun) {
                debug!("weekend; staying closed");
                return MarketPhase::Closed;
            }
            s.phase = MarketPhase::Detecting;
        }

        let verdict = tokio::time::timeout(self.cfg.detect_timeout, self.poll(probe, today)).await;

        let mut s = self.state.write();
        // A close that raced the probe wins.
        if s.phase != MarketPhase::Detecting {
            return s.phase;
        }

        s.phase = match verdict {
            Ok(true) => {
                s.traded_on = Some(today);
                info!(component = "session", event = "open", "market open detected");
                MarketPhase::Open
            }
            Ok(false) => {
                info!(component = "session", event = "closed", "market not trading today");
                MarketPhase::Closed
            }
            Err(_) => {
                warn!(
                    component = "session",
                    event = "detect_timeout",
                    timeout_s = self.cfg.detect_timeout.as_secs(),
                    "open detection timed out; staying closed"
                );
                MarketPhase::Closed
            }
        };
        s.phase
    }

    async fn poll(&self, probe: &dyn ReferenceProbe, today: NaiveDate) -> bool {
        loop {
            match probe.probe().await {
                Ok(reading) => return is_trading(&reading, today),
                Err(e) => {
                    warn!(error = %e, "reference probe failed; retrying");
                    tokio::time::sleep(self.cfg.probe_interval).await;
                }
            }
        }
    }

    pub fn enter_midday(&self) {
        let mut s = self.state.write();
        if s.phase == MarketPhase::Open {
            s.phase = MarketPhase::MidDayPause;
            info!(component = "session", event = "midday_pause", "midday pause");
        }
    }

    pub fn resume(&self) {
        let mut s = self.state.write();
        if s.phase == MarketPhase::MidDayPause {
            s.phase = MarketPhase::Open;
            info!(component = "session", event = "resume", "afternoon session resumed");
        }
    }

    pub fn close(&self) {
        let mut s = self.state.write();
        if s.phase != MarketPhase::Closed {
            info!(component = "session", event = "close", from = ?s.phase, "market closed");
        }
        s.phase = MarketPhase::Closed;
    }
}

impl TradingWindow for SessionGate {
    fn is_trading_window_open(&self) -> bool {
        self.phase() == MarketPhase::Open
    }

    fn traded_on(&self, day: NaiveDate) -> bool {
        self.state.read().traded_on == Some(day)
    }
}

fn is_trading(reading: &ReferenceReading, today: NaiveDate) -> bool {
    reading.day == today && reading.volume > MIN_OPEN_VOLUME
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProbe {
        failures_before_reading: usize,
        reading: ReferenceReading,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReferenceProbe for ScriptedProbe {
        async fn probe(&self) -> Result<ReferenceReading, AdapterError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_reading {
                return Err(AdapterError::Status(503));
            }
            Ok(self.reading)
        }
    }

    fn probe(failures: usize, day: NaiveDate, volume: i64) -> ScriptedProbe {
        ScriptedProbe {
            failures_before_reading: failures,
            reading: ReferenceReading { day, volume },
            calls: AtomicUsize::new(0),
        }
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn gate() -> SessionGate {
        SessionGate::new(GateConfig {
            probe_interval: Duration::from_secs(10),
            detect_timeout: Duration::from_secs(60),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_transient_probe_errors() {
        let g = gate();
        let p = probe(2, monday(), 1_000);

        assert_eq!(g.detect_open(&p, monday()).await, MarketPhase::Open);
        assert!(g.is_trading_window_open());
        assert!(g.traded_on(monday()));
        assert_eq!(p.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_date_or_no_volume_stays_closed() {
        let g = gate();
        let friday = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(
            g.detect_open(&probe(0, friday, 5_000), monday()).await,
            MarketPhase::Closed
        );
        assert_eq!(
            g.detect_open(&probe(0, monday(), 0), monday()).await,
            MarketPhase::Closed
        );
        assert!(!g.traded_on(monday()));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_outage_times_out_closed() {
        let g = gate();
        let p = probe(usize::MAX, monday(), 1_000);

        assert_eq!(g.detect_open(&p, monday()).await, MarketPhase::Closed);
        assert!(!g.is_trading_window_open());
    }

    #[tokio::test]
    async fn weekend_never_probes() {
        let g = gate();
        let saturday = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let p = probe(0, saturday, 1_000);

        assert_eq!(g.detect_open(&p, saturday).await, MarketPhase::Closed);
        assert_eq!(p.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn midday_pause_gates_then_resumes() {
        let g = gate();
        g.detect_open(&probe(0, monday(), 1_000), monday()).await;

        g.enter_midday();
        assert_eq!(g.phase(), MarketPhase::MidDayPause);
        assert!(!g.is_trading_window_open());

        g.resume();
        assert!(g.is_trading_window_open());

        g.close();
        assert_eq!(g.phase(), MarketPhase::Closed);
        // still remembered for the post-close sweep
        assert!(g.traded_on(monday()));
    }

    #[test]
    fn pause_and_resume_ignored_while_closed() {
        let g = gate();
        g.enter_midday();
        assert_eq!(g.phase(), MarketPhase::Closed);
        g.resume();
        assert_eq!(g.phase(), MarketPhase::Closed);
    }
}
