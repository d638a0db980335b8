use std::sync::Arc;

use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    data::{domain::Candle, timeframe::Timeframe},
    error::ChartplayResult,
    game::{
        IgnoreReason, Intent, Phase, Reveal, RoundAdvance, Transition,
        config::{GameConfig, GameSettings},
        outcome::{Position, RoundOutcome},
        session::Session,
    },
    report::{
        analysis::{Bucket, BucketReport, analyze},
        leaderboard::{LeaderboardStore, Submission, submit},
        share::SharedResult,
        statistics::{GameReport, Statistics},
    },
    transport::candles::CandleProvider,
};

/// Handle for one in-flight series fetch.
///
/// Only the ticket of the latest `begin_initialize()` is honoured; a reset or
/// a newer initialization turns older tickets stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitTicket {
    epoch: u64,
    timeframe: Timeframe,
}

impl InitTicket {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The timeframe to fetch candles for.
    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }
}

/// The single owner of a game session.
///
/// Callers dispatch intents; the engine applies them to its [`Session`] and
/// hands out read-only views. Out-of-phase intents come back as
/// [`Transition::Ignored`].
#[derive(Debug)]
pub struct GameEngine {
    config: GameConfig,
    settings: GameSettings,
    session: Session,
    rng: StdRng,
    epoch: u64,
    loading: bool,
}

impl Default for GameEngine {
    fn default() -> Self {
        Self::new(GameSettings::default(), GameConfig::default())
    }
}

impl GameEngine {
    pub fn new(settings: GameSettings, config: GameConfig) -> Self {
        let rng = match config.seed() {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            config,
            settings,
            session: Session::idle(settings, config),
            rng,
            epoch: 0,
            loading: false,
        }
    }

    // ============================================================================================
    // Initialization
    // ============================================================================================

    /// Fetches a series from `provider` and starts a new game on it.
    ///
    /// # Errors
    /// A failed fetch or an insufficient series leaves the engine `Idle` (or
    /// `Finished`) and is returned to the caller, who may retry.
    pub async fn initialize_game<P: CandleProvider>(
        &mut self,
        provider: &P,
    ) -> ChartplayResult<Transition> {
        let ticket = match self.begin_initialize() {
            Transition::Applied(ticket) => ticket,
            Transition::Ignored { intent, reason } => {
                return Ok(Transition::Ignored { intent, reason });
            }
        };

        match provider.fetch(ticket.timeframe()).await {
            Ok(series) => self.complete_initialize(ticket, series),
            Err(e) => {
                let _ = self.fail_initialize(ticket);
                Err(e)
            }
        }
    }

    /// Starts a fetch. Valid from `Idle` and `Finished`.
    #[tracing::instrument(skip(self), fields(epoch = self.epoch))]
    pub fn begin_initialize(&mut self) -> Transition<InitTicket> {
        let phase = self.session.phase();
        if !(phase.is_idle() || phase.is_finished()) {
            return ignored(Transition::wrong_phase(Intent::InitializeGame, phase));
        }

        self.epoch += 1;
        self.loading = true;
        let ticket = InitTicket {
            epoch: self.epoch,
            timeframe: self.settings.timeframe(),
        };
        info!(epoch = ticket.epoch, timeframe = %ticket.timeframe, "Loading candles");
        Transition::Applied(ticket)
    }

    /// Starts the game on a fetched series, unless `ticket` was superseded.
    ///
    /// The game is played on the ticket's timeframe. A timeframe picked while
    /// the fetch was in flight stays in the settings for the next game.
    ///
    /// # Errors
    /// Returns [`DataError::InsufficientData`] when `series` cannot hold a round,
    /// and the validation errors of [`validate_series`] for unusable bars.
    ///
    /// [`DataError::InsufficientData`]: crate::error::DataError::InsufficientData
    /// [`validate_series`]: crate::data::domain::validate_series
    #[tracing::instrument(skip(self, series), fields(epoch = self.epoch))]
    pub fn complete_initialize(
        &mut self,
        ticket: InitTicket,
        series: impl Into<Arc<[Candle]>>,
    ) -> ChartplayResult<Transition> {
        if let Some(stale) = self.stale(ticket) {
            warn!(ticket = ticket.epoch, current = self.epoch, "Discarding stale candle series");
            return Ok(stale);
        }
        self.loading = false;

        if self.settings.timeframe() != ticket.timeframe {
            warn!(
                fetched = %ticket.timeframe,
                selected = %self.settings.timeframe(),
                "Timeframe changed during fetch; it applies to the next game"
            );
        }
        let settings = self.settings.with_timeframe(ticket.timeframe);
        let session = Session::start(settings, self.config, series.into(), &mut self.rng)?;
        self.session = session;

        info!(
            timeframe = %ticket.timeframe,
            max_rounds = self.session.max_rounds(),
            balance = self.session.balance(),
            "Game Started"
        );
        Ok(Transition::Applied(()))
    }

    /// Drops the loading state after a failed fetch. Stale tickets are ignored.
    pub fn fail_initialize(&mut self, ticket: InitTicket) -> Transition {
        if let Some(stale) = self.stale(ticket) {
            return stale;
        }
        warn!(epoch = ticket.epoch, "Candle fetch failed");
        self.loading = false;
        Transition::Applied(())
    }

    fn stale(&self, ticket: InitTicket) -> Option<Transition> {
        (ticket.epoch != self.epoch).then_some(Transition::Ignored {
            intent: Intent::InitializeGame,
            reason: IgnoreReason::StaleEpoch {
                ticket: ticket.epoch,
                current: self.epoch,
            },
        })
    }

    // ============================================================================================
    // Round intents
    // ============================================================================================

    #[tracing::instrument(skip(self), fields(epoch = self.epoch, round = self.session.round_index()))]
    pub fn place_bet(&mut self, position: Position) -> Transition {
        let t = self.session.place_bet(position);
        if let Transition::Applied(entry) = &t {
            info!(%position, entry = entry.0, "Position Opened");
        }
        ignored(t).map(|_| ())
    }

    #[tracing::instrument(skip(self), fields(epoch = self.epoch, round = self.session.round_index()))]
    pub fn reveal_next_candle(&mut self) -> Transition<Reveal> {
        let t = self.session.reveal_next_candle();
        if let Transition::Applied(reveal) = &t {
            let close = self.session.visible_window().last().map(|c| c.close.0);
            debug!(?reveal, close, "Candle Revealed");
        }
        ignored(t)
    }

    #[tracing::instrument(skip(self), fields(epoch = self.epoch, round = self.session.round_index()))]
    pub fn settle(&mut self) -> Transition<RoundOutcome> {
        let t = self.session.settle();
        self.log_settled(&t);
        ignored(t)
    }

    #[tracing::instrument(skip(self), fields(epoch = self.epoch, round = self.session.round_index()))]
    pub fn close_position(&mut self) -> Transition<RoundOutcome> {
        let t = self.session.close_position();
        self.log_settled(&t);
        ignored(t)
    }

    /// # Errors
    /// Propagates [`DataError::InsufficientData`] from the window selection.
    ///
    /// [`DataError::InsufficientData`]: crate::error::DataError::InsufficientData
    #[tracing::instrument(skip(self), fields(epoch = self.epoch, round = self.session.round_index()))]
    pub fn next_round(&mut self) -> ChartplayResult<Transition<RoundAdvance>> {
        let t = self.session.next_round(&mut self.rng)?;
        match &t {
            Transition::Applied(RoundAdvance::Finished) => {
                let report = self.session.report();
                info!(
                    rounds = report.statistics.total_rounds,
                    win_rate = report.statistics.win_rate,
                    return_percent = report.return_percent,
                    "Game Finished"
                );
            }
            Transition::Applied(advance) => info!(?advance, "Next Round"),
            Transition::Ignored { .. } => {}
        }
        Ok(ignored(t))
    }

    #[tracing::instrument(skip(self), fields(epoch = self.epoch))]
    pub fn resume(&mut self) -> Transition<usize> {
        ignored(self.session.resume())
    }

    /// Clears the game and returns to `Idle`. Any fetch still in flight is superseded.
    #[tracing::instrument(skip(self), fields(epoch = self.epoch))]
    pub fn reset_game(&mut self) {
        self.epoch += 1;
        self.loading = false;
        self.session = Session::idle(self.settings, self.config);
        info!(epoch = self.epoch, "Game Reset");
    }

    /// Applies new player settings unless a position is open.
    #[tracing::instrument(skip(self), fields(epoch = self.epoch))]
    pub fn update_settings(&mut self, settings: GameSettings) -> Transition<GameSettings> {
        let t = self.session.update_settings(settings);
        if t.is_applied() {
            self.settings = settings;
            debug!(?settings, "Settings Updated");
        }
        ignored(t)
    }

    // ============================================================================================
    // Results
    // ============================================================================================

    pub fn statistics(&self) -> Statistics {
        self.session.statistics()
    }

    pub fn report(&self) -> GameReport {
        self.session.report()
    }

    pub fn analysis(&self) -> Vec<(Bucket, BucketReport)> {
        analyze(self.session.history())
    }

    /// Shareable summary, available once the game is finished.
    pub fn shared_result(&self) -> Option<SharedResult> {
        self.session
            .phase()
            .is_finished()
            .then(|| SharedResult::from(&self.session.report()))
    }

    pub fn is_ranking_registered(&self) -> bool {
        self.session.is_ranking_registered()
    }

    /// Publishes the finished game. The ranking flag is set only on success, so
    /// a failed submission may be retried.
    ///
    /// # Errors
    /// Returns the store's error; the engine state is unchanged in that case.
    #[tracing::instrument(skip_all, fields(epoch = self.epoch))]
    pub async fn submit_to_leaderboard<S: LeaderboardStore>(
        &mut self,
        store: &S,
        submission: &Submission,
    ) -> ChartplayResult<Transition> {
        let phase = self.session.phase();
        if !phase.is_finished() {
            return Ok(ignored(Transition::wrong_phase(Intent::SubmitScore, phase)));
        }
        if self.session.is_ranking_registered() {
            return Ok(ignored(Transition::Ignored {
                intent: Intent::SubmitScore,
                reason: IgnoreReason::AlreadyRegistered,
            }));
        }

        let report = self.session.report();
        let rules = self.session.rule_set();
        submit(store, submission, &report, self.session.history(), &rules).await?;

        self.session.mark_ranking_registered();
        Ok(Transition::Applied(()))
    }

    // ============================================================================================
    // Views
    // ============================================================================================

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn settings(&self) -> GameSettings {
        self.settings
    }

    pub fn config(&self) -> GameConfig {
        self.config
    }

    fn log_settled(&self, t: &Transition<RoundOutcome>) {
        if let Transition::Applied(o) = t {
            info!(
                position = %o.position,
                won = o.won,
                profit_percent = o.profit_percent,
                liquidated = o.liquidated,
                balance = self.session.balance(),
                "Round Settled"
            );
        }
    }
}

fn ignored<T>(t: Transition<T>) -> Transition<T> {
    if let Transition::Ignored { intent, reason } = &t {
        debug!(%intent, ?reason, "Intent Ignored");
    }
    t
}
