use std::sync::Arc;

use rand::Rng;

use crate::{
    data::{
        domain::{Candle, Price, validate_series},
        segment::{Segment, select_segment},
        timeframe::Timeframe,
    },
    error::ChartplayResult,
    game::{
        IgnoreReason, Intent, Phase, Reveal, RoundAdvance, Transition,
        config::{GameConfig, GameSettings, LiquidationPolicy, RuleSet},
        outcome::{IndicatorSnapshot, Position, RoundOutcome, Settlement},
    },
    report::statistics::{GameReport, Statistics, compute_stats},
};

/// An open position, recorded at `place_bet()`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct OpenPosition {
    position: Position,
    entry_price: Price,
    /// Balance at the moment of entry; the stake is a fraction of it.
    balance: f64,
    indicators: IndicatorSnapshot,
}

/// The authoritative state of one game.
///
/// Every intent is a method that either applies a complete transition or
/// returns [`Transition::Ignored`] without touching any field.
#[derive(Debug, Clone)]
pub struct Session {
    config: GameConfig,
    settings: GameSettings,
    /// Rules captured at `start()`; settings edited mid-game apply to the next game.
    rules: RuleSet,
    series: Option<Arc<[Candle]>>,
    phase: Phase,
    balance: f64,
    /// 1-based number of the current round; `0` while idle.
    round_index: usize,
    history: Vec<RoundOutcome>,
    segment: Option<Segment>,
    open: Option<OpenPosition>,
    ranking_registered: bool,
}

impl Session {
    /// A session waiting for `initialize_game()`.
    pub fn idle(settings: GameSettings, config: GameConfig) -> Self {
        Self {
            config,
            settings,
            rules: RuleSet::new(&settings, &config),
            series: None,
            phase: Phase::Idle,
            balance: config.initial_balance(),
            round_index: 0,
            history: Vec::new(),
            segment: None,
            open: None,
            ranking_registered: false,
        }
    }

    /// A fresh game on `series`, with round 1 playable.
    ///
    /// # Errors
    /// Fails with [`DataError::InsufficientData`] when the series cannot hold one
    /// full round for the configured timeframe, and with the errors of
    /// [`validate_series`] for unordered or non-positive bars.
    ///
    /// [`DataError::InsufficientData`]: crate::error::DataError::InsufficientData
    pub fn start<R: Rng + ?Sized>(
        settings: GameSettings,
        config: GameConfig,
        series: Arc<[Candle]>,
        rng: &mut R,
    ) -> ChartplayResult<Self> {
        validate_series(&series)?;
        let segment = select_segment(
            &series,
            settings.timeframe().profile(),
            config.warmup_size(),
            rng,
        )?;

        Ok(Self {
            series: Some(series),
            phase: Phase::Playing,
            round_index: 1,
            segment: Some(segment),
            ..Self::idle(settings, config)
        })
    }

    // ============================================================================================
    // Transitions
    // ============================================================================================

    /// Opens a position at the close of the last visible bar.
    ///
    /// `Hold` resolves the round on the spot and moves to `Settled`.
    /// Returns the entry price.
    pub fn place_bet(&mut self, position: Position) -> Transition<Price> {
        let entry = match (&self.phase, &self.open, &self.segment) {
            (Phase::Playing, None, Some(seg)) => seg.last_visible().map(|c| c.close),
            _ => None,
        };
        let Some(entry_price) = entry else {
            return Transition::wrong_phase(Intent::PlaceBet, self.phase);
        };

        let indicators = IndicatorSnapshot::capture(self.history_window());
        let open = OpenPosition {
            position,
            entry_price,
            balance: self.balance,
            indicators,
        };

        self.open = Some(open);
        if position == Position::Hold {
            self.record(open, entry_price);
        } else {
            self.phase = Phase::Revealing;
        }

        Transition::Applied(entry_price)
    }

    /// Moves the next future bar into the visible window.
    ///
    /// Under [`LiquidationPolicy::EndGame`] the remaining bars are dropped as soon
    /// as a revealed close wipes out the stake, so the round settles there.
    pub fn reveal_next_candle(&mut self) -> Transition<Reveal> {
        if !self.phase.is_revealing() {
            return Transition::wrong_phase(Intent::RevealNextCandle, self.phase);
        }
        let Some(open) = self.open else {
            return Transition::wrong_phase(Intent::RevealNextCandle, self.phase);
        };
        let Some(seg) = self.segment.as_mut() else {
            return Transition::wrong_phase(Intent::RevealNextCandle, self.phase);
        };
        let Some(close) = seg.reveal_next().map(|c| c.close) else {
            return Transition::Applied(Reveal::Exhausted);
        };

        let liquidated = self.settlement(open, close).is_liquidated_at(close);

        let Some(seg) = self.segment.as_mut() else {
            return Transition::Applied(Reveal::Exhausted);
        };
        if liquidated {
            seg.discard_pending();
        }

        match seg.pending_future().len() {
            0 => Transition::Applied(Reveal::Exhausted),
            remaining => Transition::Applied(Reveal::More { remaining }),
        }
    }

    /// Settles the open position at the last revealed close, once every future bar is shown.
    pub fn settle(&mut self) -> Transition<RoundOutcome> {
        if !self.phase.is_revealing() {
            return Transition::wrong_phase(Intent::Settle, self.phase);
        }
        let remaining = self.pending_future().len();
        if remaining > 0 {
            return Transition::Ignored {
                intent: Intent::Settle,
                reason: IgnoreReason::RevealPending { remaining },
            };
        }
        self.settle_at_last_visible(Intent::Settle)
    }

    /// Settles the open position immediately, dropping the unrevealed bars.
    pub fn close_position(&mut self) -> Transition<RoundOutcome> {
        if !self.phase.is_revealing() {
            return Transition::wrong_phase(Intent::ClosePosition, self.phase);
        }
        if let Some(seg) = self.segment.as_mut() {
            seg.discard_pending();
        }
        self.settle_at_last_visible(Intent::ClosePosition)
    }

    /// Leaves the round-result display.
    ///
    /// Finishes the game once `max_rounds` outcomes are recorded; otherwise a
    /// fresh window is drawn and the next round becomes playable, possibly
    /// behind an ad break.
    ///
    /// # Errors
    /// Propagates [`DataError::InsufficientData`] from the window selection; the
    /// session is left untouched in that case.
    ///
    /// [`DataError::InsufficientData`]: crate::error::DataError::InsufficientData
    pub fn next_round<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> ChartplayResult<Transition<RoundAdvance>> {
        let series = match (&self.phase, &self.series) {
            (Phase::Settled, Some(series)) => Arc::clone(series),
            _ => return Ok(Transition::wrong_phase(Intent::NextRound, self.phase)),
        };

        if self.history.len() >= self.rules.max_rounds {
            self.phase = Phase::Finished;
            return Ok(Transition::Applied(RoundAdvance::Finished));
        }

        let segment = select_segment(
            &series,
            self.rules.timeframe.profile(),
            self.config.warmup_size(),
            rng,
        )?;

        self.segment = Some(segment);
        self.open = None;
        self.round_index += 1;

        let round_index = self.round_index;
        if self
            .config
            .ad_schedule()
            .is_break_before(round_index, self.rules.max_rounds)
        {
            self.phase = Phase::AdBreak;
            Ok(Transition::Applied(RoundAdvance::AdBreak { round_index }))
        } else {
            self.phase = Phase::Playing;
            Ok(Transition::Applied(RoundAdvance::Playing { round_index }))
        }
    }

    /// Leaves an ad break for the round it gated. Returns that round's number.
    pub fn resume(&mut self) -> Transition<usize> {
        if !self.phase.is_ad_break() {
            return Transition::wrong_phase(Intent::Resume, self.phase);
        }
        self.phase = Phase::Playing;
        Transition::Applied(self.round_index)
    }

    /// Replaces the player settings unless a position is open.
    ///
    /// Leverage, timeframe and round count are part of the [`RuleSet`]; once a
    /// game has started they take effect with the next game.
    pub fn update_settings(&mut self, settings: GameSettings) -> Transition<GameSettings> {
        if self.phase.is_round_active() {
            return Transition::wrong_phase(Intent::UpdateSettings, self.phase);
        }
        self.settings = settings;
        if self.phase.is_idle() {
            self.rules = RuleSet::new(&settings, &self.config);
        }
        Transition::Applied(settings)
    }

    pub(crate) fn mark_ranking_registered(&mut self) {
        self.ranking_registered = true;
    }

    // ============================================================================================
    // Read-only views
    // ============================================================================================

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn initial_balance(&self) -> f64 {
        self.config.initial_balance()
    }

    pub fn round_index(&self) -> usize {
        self.round_index
    }

    pub fn max_rounds(&self) -> usize {
        self.rules.max_rounds
    }

    pub fn history(&self) -> &[RoundOutcome] {
        &self.history
    }

    pub fn settings(&self) -> GameSettings {
        self.settings
    }

    pub fn config(&self) -> GameConfig {
        self.config
    }

    pub fn timeframe(&self) -> Timeframe {
        self.rules.timeframe
    }

    /// The rules this game is played and scored under.
    pub fn rule_set(&self) -> RuleSet {
        self.rules
    }

    /// Bars shown to the player, revealed future bars included.
    pub fn visible_window(&self) -> &[Candle] {
        self.segment.as_ref().map_or(&[], Segment::visible)
    }

    pub fn pending_future(&self) -> &[Candle] {
        self.segment.as_ref().map_or(&[], Segment::pending_future)
    }

    pub fn warmup(&self) -> &[Candle] {
        self.segment.as_ref().map_or(&[], Segment::warmup)
    }

    pub fn entry_price(&self) -> Option<Price> {
        self.open.map(|o| o.entry_price)
    }

    /// The side of the position in play, if any. Cleared once the round is settled.
    pub fn open_position(&self) -> Option<Position> {
        match self.phase {
            Phase::Revealing => self.open.map(|o| o.position),
            _ => None,
        }
    }

    /// PnL of the open position marked to the last visible close.
    pub fn unrealized_pnl(&self) -> Option<f64> {
        let open = self.open.filter(|_| self.phase.is_revealing())?;
        let close = self.visible_window().last()?.close;
        Some(self.settlement(open, close).raw_pnl_at(close))
    }

    pub fn is_ranking_registered(&self) -> bool {
        self.ranking_registered
    }

    pub fn statistics(&self) -> Statistics {
        compute_stats(&self.history)
    }

    pub fn report(&self) -> GameReport {
        GameReport::new(self.statistics(), self.initial_balance(), self.balance)
    }

    // ============================================================================================
    // Internals
    // ============================================================================================

    fn history_window(&self) -> &[Candle] {
        self.segment.as_ref().map_or(&[], Segment::history)
    }

    fn settlement(&self, open: OpenPosition, exit_price: Price) -> Settlement {
        Settlement {
            round_index: self.round_index,
            position: open.position,
            entry_price: open.entry_price,
            exit_price,
            balance: open.balance,
            bet_fraction: self.rules.bet_fraction,
            leverage: self.rules.leverage,
            liquidation: self.config.liquidation(),
            indicators: Some(open.indicators),
        }
    }

    fn settle_at_last_visible(&mut self, intent: Intent) -> Transition<RoundOutcome> {
        let exit = self.visible_window().last().map(|c| c.close);
        match (self.open, exit) {
            (Some(open), Some(exit_price)) => Transition::Applied(self.record(open, exit_price)),
            _ => Transition::wrong_phase(intent, self.phase),
        }
    }

    /// Books the outcome, applies the PnL and moves to `Settled`, or to `Finished`
    /// after a liquidation under [`LiquidationPolicy::EndGame`].
    fn record(&mut self, open: OpenPosition, exit_price: Price) -> RoundOutcome {
        let outcome = self.settlement(open, exit_price).into_outcome();

        self.balance += outcome.pnl;
        self.history.push(outcome.clone());

        self.phase = if outcome.liquidated && self.config.liquidation() == LiquidationPolicy::EndGame
        {
            Phase::Finished
        } else {
            Phase::Settled
        };

        outcome
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        error::{ChartplayError, DataError},
        game::config::AdSchedule,
    };

    /// 1d profile: 40 visible + 3 prediction. Warm-up 0 makes one window span 43 bars.
    fn settings() -> GameSettings {
        GameSettings::default()
            .with_timeframe(Timeframe::Day1)
            .with_max_rounds(3)
            .unwrap()
    }

    fn config() -> GameConfig {
        GameConfig::default()
            .with_warmup_size(0)
            .with_ad_schedule(AdSchedule::Disabled)
    }

    fn series(closes: impl IntoIterator<Item = f64>) -> Arc<[Candle]> {
        let t0 = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
        closes
            .into_iter()
            .enumerate()
            .map(|(i, p)| Candle::new(t0 + Duration::days(i as i64), p, p, p, p))
            .collect()
    }

    fn rising() -> Arc<[Candle]> {
        series((0..43).map(|i| 100.0 + i as f64))
    }

    fn started(data: Arc<[Candle]>, config: GameConfig) -> Session {
        started_levered(data, config, 1)
    }

    fn started_levered(data: Arc<[Candle]>, config: GameConfig, leverage: u32) -> Session {
        let mut rng = StdRng::seed_from_u64(1);
        let settings = settings().with_leverage(leverage).unwrap();
        Session::start(settings, config, data, &mut rng).unwrap()
    }

    fn reveal_all(s: &mut Session) -> usize {
        let mut calls = 0;
        while let Transition::Applied(r) = s.reveal_next_candle() {
            calls += 1;
            if !r.has_more() {
                break;
            }
        }
        calls
    }

    #[test]
    fn test_start_populates_round_one() {
        let s = started(rising(), config());
        assert_eq!(s.phase(), Phase::Playing);
        assert_eq!(s.round_index(), 1);
        assert_eq!(s.visible_window().len(), 40);
        assert_eq!(s.pending_future().len(), 3);
        assert!(s.warmup().is_empty());
        assert_eq!(s.balance(), 1_000.0);
        assert!(s.history().is_empty());
    }

    #[test]
    fn test_start_fails_on_short_series() {
        let mut rng = StdRng::seed_from_u64(1);
        let data = series((0..42).map(|i| i as f64 + 1.0));
        let err = Session::start(settings(), config(), data, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            ChartplayError::Data(DataError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_long_round_on_rising_series() {
        let mut s = started(rising(), config());

        // Entry at last visible close (139), exit at last future close (142)
        assert_eq!(s.place_bet(Position::Long), Transition::Applied(Price(139.0)));
        assert_eq!(s.phase(), Phase::Revealing);
        assert_eq!(s.open_position(), Some(Position::Long));

        assert_eq!(reveal_all(&mut s), 3);
        let out = s.settle().applied().unwrap();

        assert!(out.won);
        assert_eq!(out.exit_price, Price(142.0));
        assert_eq!(s.phase(), Phase::Settled);
        assert_eq!(s.history().len(), 1);
        assert!((s.balance() - (1_000.0 + out.pnl)).abs() < 1e-9);
        assert_eq!(s.open_position(), None);
    }

    #[test]
    fn test_place_bet_while_revealing_is_ignored() {
        let mut s = started(rising(), config());
        let _ = s.place_bet(Position::Short);
        let before_balance = s.balance();
        let before_pending = s.pending_future().len();

        let t = s.place_bet(Position::Long);

        assert_eq!(
            t,
            Transition::Ignored {
                intent: Intent::PlaceBet,
                reason: IgnoreReason::WrongPhase(Phase::Revealing),
            }
        );
        assert_eq!(s.open_position(), Some(Position::Short));
        assert_eq!(s.balance(), before_balance);
        assert_eq!(s.pending_future().len(), before_pending);
        assert!(s.history().is_empty());
    }

    #[test]
    fn test_settle_waits_for_exhausted_future() {
        let mut s = started(rising(), config());
        let _ = s.place_bet(Position::Long);
        let _ = s.reveal_next_candle();

        assert_eq!(
            s.settle(),
            Transition::Ignored {
                intent: Intent::Settle,
                reason: IgnoreReason::RevealPending { remaining: 2 },
            }
        );
        assert!(s.history().is_empty());
    }

    #[test]
    fn test_close_position_settles_at_last_revealed_bar() {
        let mut s = started(rising(), config());
        let _ = s.place_bet(Position::Long);
        let _ = s.reveal_next_candle();

        let out = s.close_position().applied().unwrap();

        assert_eq!(out.exit_price, Price(140.0));
        assert!(s.pending_future().is_empty());
        assert_eq!(s.phase(), Phase::Settled);
    }

    #[test]
    fn test_hold_resolves_without_reveal() {
        let mut s = started(rising(), config());
        let _ = s.place_bet(Position::Hold);

        assert_eq!(s.phase(), Phase::Settled);
        let out = &s.history()[0];
        assert_eq!(out.position, Position::Hold);
        assert!(!out.won);
        assert_eq!(out.entry_price, out.exit_price);
        assert_eq!(s.balance(), 1_000.0);
        assert_eq!(s.pending_future().len(), 3);
    }

    #[test]
    fn test_finished_exactly_at_max_rounds() {
        let mut s = started(rising(), config());
        let mut rng = StdRng::seed_from_u64(9);

        for round in 1..=3 {
            assert_eq!(s.round_index(), round);
            let _ = s.place_bet(Position::Hold);
            let adv = s.next_round(&mut rng).unwrap().applied().unwrap();
            if round < 3 {
                assert_eq!(adv, RoundAdvance::Playing { round_index: round + 1 });
                assert!(!s.phase().is_finished());
            } else {
                assert_eq!(adv, RoundAdvance::Finished);
            }
        }

        assert_eq!(s.phase(), Phase::Finished);
        assert_eq!(s.history().len(), 3);
        assert!(s.place_bet(Position::Long).is_ignored());
        assert!(s.next_round(&mut rng).unwrap().is_ignored());
    }

    #[test]
    fn test_ad_break_does_not_consume_a_round() {
        let mut s = started(rising(), config().with_ad_schedule(AdSchedule::Every(2)));
        let mut rng = StdRng::seed_from_u64(2);

        let _ = s.place_bet(Position::Hold);
        let adv = s.next_round(&mut rng).unwrap().applied().unwrap();
        assert_eq!(adv, RoundAdvance::AdBreak { round_index: 2 });
        assert!(s.place_bet(Position::Long).is_ignored());

        assert_eq!(s.resume(), Transition::Applied(2));
        assert_eq!(s.phase(), Phase::Playing);
        assert_eq!(s.round_index(), 2);
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn test_end_game_liquidation_stops_reveal_and_finishes() {
        // Visible 100s, then a crash: -50% on the first future bar
        let data = series((0..40).map(|_| 100.0).chain([50.0, 60.0, 70.0]));
        let cfg = config().with_liquidation(LiquidationPolicy::EndGame);
        let mut s = started_levered(data, cfg, 10);

        let _ = s.place_bet(Position::Long);
        assert_eq!(s.reveal_next_candle(), Transition::Applied(Reveal::Exhausted));

        let out = s.settle().applied().unwrap();
        assert!(out.liquidated);
        assert!((out.pnl + 100.0).abs() < 1e-9);
        assert!((s.balance() - 900.0).abs() < 1e-9);
        assert_eq!(s.phase(), Phase::Finished);
    }

    #[test]
    fn test_unbounded_policy_lets_balance_go_negative() {
        let data = series((0..40).map(|_| 100.0).chain([1.0, 1.0, 1.0]));
        let mut s = started_levered(data, config().with_bet_fraction(1.0).unwrap(), 100);

        let _ = s.place_bet(Position::Long);
        reveal_all(&mut s);
        let out = s.settle().applied().unwrap();

        assert!(!out.liquidated);
        assert!(s.balance() < 0.0);
        assert_eq!(s.phase(), Phase::Settled);
    }

    #[test]
    fn test_settings_locked_while_revealing() {
        let mut s = started(rising(), config());
        let _ = s.place_bet(Position::Long);
        let levered = s.settings().with_leverage(50).unwrap();

        assert!(s.update_settings(levered).is_ignored());
        assert_eq!(s.settings().leverage(), 1);

        reveal_all(&mut s);
        let _ = s.settle();
        assert!(s.update_settings(levered).is_applied());
        assert_eq!(s.settings().leverage(), 50);
        assert_eq!(s.rule_set().leverage, 1, "applies from the next game");
    }

    #[test]
    fn test_leverage_is_fixed_for_the_whole_game() {
        // Arrange: two rounds on a rising series, leverage 2 at start
        let mut s = started_levered(rising(), config(), 2);
        let _ = s.place_bet(Position::Long);
        reveal_all(&mut s);
        let first = s.settle().applied().unwrap();

        // Act: raise leverage between rounds, then play round 2
        assert!(s.update_settings(s.settings().with_leverage(100).unwrap()).is_applied());
        let mut rng = StdRng::seed_from_u64(9);
        let _ = s.next_round(&mut rng).unwrap();
        let _ = s.place_bet(Position::Long);
        reveal_all(&mut s);
        let second = s.settle().applied().unwrap();

        // Assert: both rounds settle at the starting leverage
        let change = second.entry_price.relative_change(second.exit_price);
        assert!((second.profit_percent - change * 200.0).abs() < 1e-9);
        let first_change = first.entry_price.relative_change(first.exit_price);
        assert!((first.profit_percent - first_change * 200.0).abs() < 1e-9);
        assert_eq!(s.rule_set().leverage, 2);
    }

    #[test]
    fn test_idle_settings_update_replaces_rules() {
        let mut s = Session::idle(GameSettings::default(), config());
        let next = GameSettings::default()
            .with_leverage(20)
            .unwrap()
            .with_timeframe(Timeframe::Day1);

        assert!(s.update_settings(next).is_applied());

        assert_eq!(s.rule_set().leverage, 20);
        assert_eq!(s.timeframe(), Timeframe::Day1);
    }

    #[test]
    fn test_start_rejects_non_finite_prices() {
        let data = series((0..42).map(|i| 100.0 + i as f64).chain([f64::NAN]));
        let mut rng = StdRng::seed_from_u64(1);

        let err = Session::start(settings(), config(), data, &mut rng).unwrap_err();

        assert!(matches!(
            err,
            ChartplayError::Data(DataError::MalformedCandle { index: 42, .. })
        ));
    }

    #[test]
    fn test_timeframe_change_waits_for_next_game() {
        let mut s = started(rising(), config());
        let _ = s.place_bet(Position::Hold);

        let t = s.update_settings(s.settings().with_timeframe(Timeframe::Minute1));
        assert!(t.is_applied());
        assert_eq!(s.timeframe(), Timeframe::Day1);
        assert_eq!(s.rule_set().timeframe, Timeframe::Day1);

        // The 43-bar series still serves 1d rounds
        let mut rng = StdRng::seed_from_u64(4);
        assert!(s.next_round(&mut rng).unwrap().is_applied());
        assert_eq!(s.visible_window().len(), 40);
    }

    #[test]
    fn test_unrealized_pnl_tracks_revealed_bars() {
        let mut s = started(rising(), config());
        assert_eq!(s.unrealized_pnl(), None);

        let _ = s.place_bet(Position::Long);
        assert_eq!(s.unrealized_pnl(), Some(0.0));

        let _ = s.reveal_next_candle();
        let pnl = s.unrealized_pnl().unwrap();
        assert!((pnl - 100.0 * (1.0 / 139.0)).abs() < 1e-9);
    }
}
