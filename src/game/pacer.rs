use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use crate::game::{Reveal, Transition, engine::GameEngine};

pub const DEFAULT_REVEAL_INTERVAL: Duration = Duration::from_millis(500);

/// How a paced reveal ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceOutcome {
    /// Every future bar is visible; the round is ready to settle.
    Exhausted,

    /// The token fired before the future was exhausted.
    Cancelled,

    /// The engine stopped accepting reveals (e.g. the position was closed or the game reset).
    Interrupted,
}

/// Drives `reveal_next_candle()` at a fixed interval.
///
/// The engine itself never schedules anything; this is the caller-side timer.
#[derive(Debug, Clone)]
pub struct RevealPacer {
    interval: Duration,
    cancel: CancellationToken,
}

impl Default for RevealPacer {
    fn default() -> Self {
        Self::new(DEFAULT_REVEAL_INTERVAL)
    }
}

impl RevealPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(self, cancel: CancellationToken) -> Self {
        Self { cancel, ..self }
    }

    /// A token that stops [`RevealPacer::run`] at its next tick.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Reveals one bar per interval, the first one an interval after the call.
    #[tracing::instrument(skip_all, fields(interval = %humantime::format_duration(self.interval)))]
    pub async fn run(&self, engine: &mut GameEngine) -> PaceOutcome {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Reveal cancelled");
                    return PaceOutcome::Cancelled;
                }
                _ = ticker.tick() => {
                    match engine.reveal_next_candle() {
                        Transition::Applied(Reveal::More { .. }) => {}
                        Transition::Applied(Reveal::Exhausted) => return PaceOutcome::Exhausted,
                        Transition::Ignored { .. } => return PaceOutcome::Interrupted,
                    }
                }
            }
        }
    }
}
