use serde::{Deserialize, Serialize};

use crate::{
    data::timeframe::Timeframe,
    error::{ChartplayResult, EnvError},
};

pub const MIN_LEVERAGE: u32 = 1;
pub const MAX_LEVERAGE: u32 = 100;

// ================================================================================================
// Player Settings
// ================================================================================================

/// Which indicator overlays the player has switched on.
///
/// Purely presentational; the indicator snapshot recorded with each round is
/// computed regardless of these flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IndicatorFlags {
    pub rsi: bool,
    pub ma: bool,
    pub bb: bool,
}

/// Player-editable settings. Changes are accepted between rounds, never while a
/// position is open.
///
/// `leverage`, `timeframe` and `max_rounds` are frozen into the game's
/// [`RuleSet`] at `initialize_game()`; changing them mid-game takes effect with
/// the next game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameSettings {
    leverage: u32,
    indicators: IndicatorFlags,
    timeframe: Timeframe,
    max_rounds: usize,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            leverage: 1,
            indicators: IndicatorFlags::default(),
            timeframe: Timeframe::default(),
            max_rounds: 25,
        }
    }
}

impl GameSettings {
    /// Sets the leverage multiplier.
    ///
    /// # Errors
    /// Returns [`EnvError::InvalidLeverage`] outside `1..=100`.
    pub fn with_leverage(self, leverage: u32) -> ChartplayResult<Self> {
        if !(MIN_LEVERAGE..=MAX_LEVERAGE).contains(&leverage) {
            return Err(EnvError::InvalidLeverage(leverage).into());
        }
        Ok(Self { leverage, ..self })
    }

    pub fn with_indicators(self, indicators: IndicatorFlags) -> Self {
        Self { indicators, ..self }
    }

    pub fn with_timeframe(self, timeframe: Timeframe) -> Self {
        Self { timeframe, ..self }
    }

    /// Sets the number of rounds per game.
    ///
    /// # Errors
    /// Returns [`EnvError::InvalidSettings`] for zero rounds.
    pub fn with_max_rounds(self, max_rounds: usize) -> ChartplayResult<Self> {
        if max_rounds == 0 {
            return Err(EnvError::InvalidSettings("max_rounds must be > 0".to_string()).into());
        }
        Ok(Self { max_rounds, ..self })
    }

    pub fn leverage(&self) -> u32 {
        self.leverage
    }

    pub fn indicators(&self) -> IndicatorFlags {
        self.indicators
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }
}

// ================================================================================================
// Engine Configuration
// ================================================================================================

/// When the engine pauses for an ad break between rounds.
///
/// The break is entered *before* the given round number (1-based) becomes playable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AdSchedule {
    /// No ad breaks.
    Disabled,

    /// Fixed table keyed by game length:
    /// 10 rounds -> before round 5; 25 -> 10, 20; 50 -> 15, 30, 45.
    #[default]
    Standard,

    /// Before every round whose number is a multiple of `n` (round 1 excluded).
    Every(usize),
}

impl AdSchedule {
    pub fn is_break_before(&self, round_index: usize, max_rounds: usize) -> bool {
        match *self {
            AdSchedule::Disabled => false,
            AdSchedule::Standard => matches!(
                (max_rounds, round_index),
                (10, 5) | (25, 10) | (25, 20) | (50, 15) | (50, 30) | (50, 45)
            ),
            AdSchedule::Every(n) => n > 0 && round_index > 1 && round_index % n == 0,
        }
    }
}

/// What happens when a round loses the whole stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LiquidationPolicy {
    /// No floor: the loss is whatever the price move implies, even beyond the stake.
    #[default]
    Unbounded,

    /// The loss is capped at the stake, the round is flagged as liquidated and the
    /// game ends immediately. The reveal loop stops at the first liquidating bar.
    EndGame,
}

/// Engine-level configuration, fixed for the lifetime of a [`GameEngine`].
///
/// [`GameEngine`]: crate::game::engine::GameEngine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    initial_balance: f64,
    warmup_size: usize,
    bet_fraction: f64,
    ad_schedule: AdSchedule,
    liquidation: LiquidationPolicy,
    seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            initial_balance: 1_000.0,
            warmup_size: 50,
            bet_fraction: 0.10,
            ad_schedule: AdSchedule::default(),
            liquidation: LiquidationPolicy::default(),
            seed: None,
        }
    }
}

impl GameConfig {
    /// # Errors
    /// Returns [`EnvError::InvalidConfig`] unless the balance is finite and positive.
    pub fn with_initial_balance(self, initial_balance: f64) -> ChartplayResult<Self> {
        if !initial_balance.is_finite() || initial_balance <= 0.0 {
            return Err(EnvError::InvalidConfig(format!(
                "initial balance must be positive, got {initial_balance}"
            ))
            .into());
        }
        Ok(Self {
            initial_balance,
            ..self
        })
    }

    pub fn with_warmup_size(self, warmup_size: usize) -> Self {
        Self {
            warmup_size,
            ..self
        }
    }

    /// # Errors
    /// Returns [`EnvError::InvalidConfig`] outside `(0, 1]`.
    pub fn with_bet_fraction(self, bet_fraction: f64) -> ChartplayResult<Self> {
        if !(bet_fraction > 0.0 && bet_fraction <= 1.0) {
            return Err(EnvError::InvalidConfig(format!(
                "bet fraction must be within (0, 1], got {bet_fraction}"
            ))
            .into());
        }
        Ok(Self {
            bet_fraction,
            ..self
        })
    }

    pub fn with_ad_schedule(self, ad_schedule: AdSchedule) -> Self {
        Self {
            ad_schedule,
            ..self
        }
    }

    pub fn with_liquidation(self, liquidation: LiquidationPolicy) -> Self {
        Self {
            liquidation,
            ..self
        }
    }

    /// Seeds the window selection for reproducible games.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn warmup_size(&self) -> usize {
        self.warmup_size
    }

    pub fn bet_fraction(&self) -> f64 {
        self.bet_fraction
    }

    pub fn ad_schedule(&self) -> AdSchedule {
        self.ad_schedule
    }

    pub fn liquidation(&self) -> LiquidationPolicy {
        self.liquidation
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

// ================================================================================================
// Rule Set
// ================================================================================================

/// The parameters that make two scores comparable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub timeframe: Timeframe,
    pub leverage: u32,
    pub max_rounds: usize,
    pub bet_fraction: f64,
    pub initial_balance: f64,
}

impl RuleSet {
    pub fn new(settings: &GameSettings, config: &GameConfig) -> Self {
        Self {
            timeframe: settings.timeframe(),
            leverage: settings.leverage(),
            max_rounds: settings.max_rounds(),
            bet_fraction: config.bet_fraction(),
            initial_balance: config.initial_balance(),
        }
    }

    /// Computes a deterministic hash of this rule set.
    pub fn fingerprint(&self) -> ChartplayResult<String> {
        let mut hasher = blake3::Hasher::new();
        let bytes = postcard::to_stdvec(self).map_err(EnvError::Encoding)?;
        hasher.update(&bytes);
        Ok(format!("{}", hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leverage_bounds() {
        let s = GameSettings::default();
        assert!(s.with_leverage(0).is_err());
        assert!(s.with_leverage(101).is_err());
        assert_eq!(s.with_leverage(1).unwrap().leverage(), 1);
        assert_eq!(s.with_leverage(100).unwrap().leverage(), 100);
    }

    #[test]
    fn test_max_rounds_must_be_positive() {
        assert!(GameSettings::default().with_max_rounds(0).is_err());
        assert_eq!(
            GameSettings::default()
                .with_max_rounds(10)
                .unwrap()
                .max_rounds(),
            10
        );
    }

    #[test]
    fn test_config_validation() {
        let c = GameConfig::default();
        assert!(c.with_initial_balance(0.0).is_err());
        assert!(c.with_initial_balance(f64::NAN).is_err());
        assert!(c.with_bet_fraction(0.0).is_err());
        assert!(c.with_bet_fraction(1.5).is_err());
        assert_eq!(c.with_bet_fraction(1.0).unwrap().bet_fraction(), 1.0);
    }

    #[test]
    fn test_standard_ad_schedule() {
        let s = AdSchedule::Standard;
        let breaks_25: Vec<usize> = (1..=25).filter(|r| s.is_break_before(*r, 25)).collect();
        assert_eq!(breaks_25, vec![10, 20]);
        let breaks_10: Vec<usize> = (1..=10).filter(|r| s.is_break_before(*r, 10)).collect();
        assert_eq!(breaks_10, vec![5]);
        let breaks_50: Vec<usize> = (1..=50).filter(|r| s.is_break_before(*r, 50)).collect();
        assert_eq!(breaks_50, vec![15, 30, 45]);
        assert!(!s.is_break_before(5, 7));
    }

    #[test]
    fn test_every_ad_schedule() {
        let s = AdSchedule::Every(3);
        let breaks: Vec<usize> = (1..=10).filter(|r| s.is_break_before(*r, 10)).collect();
        assert_eq!(breaks, vec![3, 6, 9]);
        assert!(!AdSchedule::Every(0).is_break_before(3, 10));
        assert!(!AdSchedule::Disabled.is_break_before(5, 10));
    }

    #[test]
    fn test_fingerprint_is_deterministic_and_rule_sensitive() {
        let settings = GameSettings::default();
        let config = GameConfig::default();
        let a = RuleSet::new(&settings, &config).fingerprint().unwrap();
        let b = RuleSet::new(&settings, &config).fingerprint().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let levered = settings.with_leverage(10).unwrap();
        let c = RuleSet::new(&levered, &config).fingerprint().unwrap();
        assert_ne!(a, c);
    }
}
