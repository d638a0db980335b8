use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

pub mod config;
pub mod engine;
pub mod outcome;
pub mod pacer;
pub mod session;

/// Represents the lifecycle phase of a game session.
///
/// # Lifecycle
///
/// ```md
/// Current Phase | Intent                       | Next Phase                  | Notes
/// --------------|------------------------------|-----------------------------|-----------------------------------
/// `Idle`        | initialize_game()            | Playing                     | Round 1 window selected
/// `Playing`     | place_bet(Long / Short)      | Revealing                   | Entry = last visible close
/// `Playing`     | place_bet(Hold)              | Settled                     | Resolved without reveal
/// `Revealing`   | reveal_next_candle()         | Revealing                   | One future bar becomes visible
/// `Revealing`   | settle() (future exhausted)  | Settled / Finished          | Finished only on liquidation
/// `Revealing`   | close_position()             | Settled / Finished          | Settles at the last revealed bar
/// `Settled`     | next_round()                 | Playing / AdBreak / Finished| Finished when history is full
/// `AdBreak`     | resume()                     | Playing                     | Does not consume a round
/// `Finished`    | initialize_game()            | Playing                     | Replaces the finished game
/// any           | reset_game()                 | Idle                        | Balance and history cleared
/// ```
///
/// Every other combination is ignored and reported as [`Transition::Ignored`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// No game in progress. Waiting for `initialize_game()`.
    #[default]
    Idle,

    /// A window is visible and the player may pick a position.
    Playing,

    /// A position is open and future bars are being revealed.
    Revealing,

    /// The round outcome has been recorded; waiting for `next_round()`.
    Settled,

    /// Presentation gate between rounds. Game data is untouched.
    AdBreak,

    /// Terminal. Game data is frozen for the summary.
    Finished,
}

impl Phase {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }

    pub fn is_revealing(&self) -> bool {
        matches!(self, Self::Revealing)
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled)
    }

    pub fn is_ad_break(&self) -> bool {
        matches!(self, Self::AdBreak)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// A position is open; settings must not change.
    pub fn is_round_active(&self) -> bool {
        self.is_revealing()
    }
}

/// The intents a caller can dispatch to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Intent {
    InitializeGame,
    PlaceBet,
    RevealNextCandle,
    Settle,
    ClosePosition,
    NextRound,
    Resume,
    UpdateSettings,
    SubmitScore,
}

/// Why an intent was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgnoreReason {
    /// The intent is not valid from the current phase.
    WrongPhase(Phase),

    /// The intent belongs to a superseded session (reset or re-initialized since).
    StaleEpoch { ticket: u64, current: u64 },

    /// The future bars are not exhausted yet.
    RevealPending { remaining: usize },

    /// This game is already on the leaderboard.
    AlreadyRegistered,
}

/// Result of dispatching an intent.
///
/// Out-of-phase intents are expected (rapid input racing phase changes) and are
/// not errors: they leave the session untouched and come back as `Ignored`.
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub enum Transition<T = ()> {
    Applied(T),
    Ignored { intent: Intent, reason: IgnoreReason },
}

impl<T> Transition<T> {
    pub(crate) fn wrong_phase(intent: Intent, phase: Phase) -> Self {
        Self::Ignored {
            intent,
            reason: IgnoreReason::WrongPhase(phase),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored { .. })
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::Ignored { .. } => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Transition<U> {
        match self {
            Self::Applied(value) => Transition::Applied(f(value)),
            Self::Ignored { intent, reason } => Transition::Ignored { intent, reason },
        }
    }
}

/// Whether more future bars remain after a reveal step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reveal {
    /// More bars remain.
    More { remaining: usize },

    /// The last bar has been revealed (or the position was liquidated); ready to settle.
    Exhausted,
}

impl Reveal {
    pub fn has_more(&self) -> bool {
        matches!(self, Self::More { .. })
    }
}

/// What `next_round()` led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundAdvance {
    /// A fresh window is visible and the next round is playable.
    Playing { round_index: usize },

    /// A fresh window is selected, but an ad break gates it.
    AdBreak { round_index: usize },

    /// All rounds are played.
    Finished,
}
