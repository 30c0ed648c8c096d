// fxsignal - Indicator-driven FX alert bot
// Polls broker candles, scores EMA/RSI/ATR/MACD setups per instrument and
// pushes the strongest call of each cycle to a Telegram chat.

#![deny(clippy::unwrap_used)]

pub mod bot;
pub mod config;
pub mod data;
pub mod notify;
pub mod orchestrator;
pub mod session;
pub mod trading;

// Re-export commonly used items
pub use config::Config;
pub use data::{Candle, CandleSource};
pub use trading::{Direction, Signal};
