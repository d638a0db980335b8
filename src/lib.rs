//! A round-based chart trading game.
//!
//! The player is shown a random window of historical candles, bets long, short
//! or hold, watches the next few candles being revealed and is scored on the
//! outcome. [`GameEngine`] owns the session and applies intents; the
//! [`report`] module derives statistics, behavioural breakdowns, leaderboard
//! records and shareable results from the round history.

pub mod data;
pub mod error;
pub mod game;
mod macros;
pub mod math;
pub mod prelude;
pub mod report;
pub mod transport;

pub use game::engine::GameEngine;
