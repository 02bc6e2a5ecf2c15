//! Daily driver for the session gate.
//!
//! Fires the gate transitions at fixed exchange-local times and kicks the
//! dispatcher on open and after the close. Times are wall-clock based, so a
//! process started mid-session catches up immediately.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use tracing::{error, info};

use crate::adapter::ReferenceProbe;
use crate::dispatch::Dispatcher;
use crate::session::gate::{MarketPhase, SessionGate};
use crate::time::Clock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    DetectOpen,
    MidDayPause,
    Resume,
    Close,
    Settle,
}

const SCHEDULE: [((u32, u32, u32), SessionEvent); 5] = [
    ((9, 31, 20), SessionEvent::DetectOpen),
    ((11, 30, 0), SessionEvent::MidDayPause),
    ((13, 0, 0), SessionEvent::Resume),
    ((15, 0, 20), SessionEvent::Close),
    ((18, 0, 0), SessionEvent::Settle),
];

fn at((h, m, s): (u32, u32, u32)) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, s).unwrap_or(NaiveTime::MIN)
}

/// First scheduled event strictly after `now`, skipping weekends.
pub fn next_event(now: NaiveDateTime) -> (NaiveDateTime, SessionEvent) {
    let mut day = now.date();
    loop {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            for (hms, ev) in SCHEDULE {
                let when = day.and_time(at(hms));
                if when > now {
                    return (when, ev);
                }
            }
        }
        day = day.succ_opt().unwrap_or(day);
    }
}

/// Phase the gate should be in at `now` if the market trades today.
/// `None` before detection time and after the close.
pub fn expected_phase(now: NaiveDateTime) -> Option<MarketPhase> {
    if matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
        return None;
    }
    let t = now.time();
    let [open, pause, resume, close, _] = SCHEDULE.map(|(hms, _)| at(hms));

    if t < open || t >= close {
        None
    } else if t >= pause && t < resume {
        Some(MarketPhase::MidDayPause)
    } else {
        Some(MarketPhase::Open)
    }
}

pub async fn run_session_clock(
    gate: Arc<SessionGate>,
    probe: Arc<dyn ReferenceProbe>,
    clock: Arc<dyn Clock>,
    dispatcher: Arc<Dispatcher>,
) {
    info!(component = "session", event = "startup", "Session clock started");

    // Started inside the session window: detect now instead of tomorrow.
    let now = clock.now();
    if let Some(phase) = expected_phase(now) {
        if gate.detect_open(probe.as_ref(), now.date()).await == MarketPhase::Open {
            if phase == MarketPhase::MidDayPause {
                gate.enter_midday();
            } else {
                kick(&dispatcher);
            }
        }
    }

    loop {
        let now = clock.now();
        let (when, event) = next_event(now);
        let wait = (when - now).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;

        match event {
            SessionEvent::DetectOpen => {
                if gate.detect_open(probe.as_ref(), when.date()).await == MarketPhase::Open {
                    kick(&dispatcher);
                }
            }
            SessionEvent::MidDayPause => gate.enter_midday(),
            SessionEvent::Resume => gate.resume(),
            SessionEvent::Close => gate.close(),
            SessionEvent::Settle => {
                let d = dispatcher.clone();
                tokio::spawn(async move {
                    if let Err(e) = d.settle().await {
                        error!(error = ?e, "post-close sweep failed");
                    }
                });
            }
        }
    }
}

/// Runs one dispatch cycle in the background so the clock keeps its schedule.
fn kick(dispatcher: &Arc<Dispatcher>) {
    let d = dispatcher.clone();
    tokio::spawn(async move {
        if let Err(e) = d.run_cycle().await {
            error!(error = ?e, "dispatch cycle after open failed");
        }
    });
}
