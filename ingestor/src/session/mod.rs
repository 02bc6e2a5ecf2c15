pub mod clock;
pub mod gate;

pub use clock::run_session_clock;
pub use gate::{GateConfig, MarketPhase, SessionGate, TradingWindow};
