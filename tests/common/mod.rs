#![allow(dead_code)]

use chartplay::prelude::*;
use chrono::{Duration, TimeZone, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Candles one minute apart with the given closes; open/high/low hug the close.
pub fn series_from_closes(closes: impl IntoIterator<Item = f64>) -> Vec<Candle> {
    let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    closes
        .into_iter()
        .enumerate()
        .map(|(i, c)| Candle::new(t0 + Duration::minutes(i as i64), c, c + 0.1, c - 0.1, c))
        .collect()
}

/// Every close higher than the one before: `Long` always wins, `Short` always loses.
pub fn rising_series(n: usize) -> Vec<Candle> {
    series_from_closes((0..n).map(|i| 100.0 + i as f64 * 0.5))
}

pub fn flat_series(n: usize, price: f64) -> Vec<Candle> {
    series_from_closes(std::iter::repeat_n(price, n))
}

pub fn random_walk_series(n: usize, seed: u64) -> Vec<Candle> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut price = 100.0_f64;
    series_from_closes((0..n).map(|_| {
        price = (price * (1.0 + rng.random_range(-0.01..0.01))).max(1.0);
        price
    }))
}

pub fn engine(max_rounds: usize, config: GameConfig) -> GameEngine {
    let settings = GameSettings::default()
        .with_max_rounds(max_rounds)
        .expect("valid max rounds");
    GameEngine::new(settings, config.with_seed(42))
}

pub async fn started(mut engine: GameEngine, series: Vec<Candle>) -> GameEngine {
    let provider = StaticCandleProvider::new(series);
    let t = engine
        .initialize_game(&provider)
        .await
        .expect("initialization succeeds");
    assert!(t.is_applied());
    engine
}

/// Opens `position`, reveals the whole future and settles.
pub fn play_round(engine: &mut GameEngine, position: Position) -> RoundOutcome {
    assert!(engine.place_bet(position).is_applied());
    if position != Position::Hold {
        while let Transition::Applied(Reveal::More { .. }) = engine.reveal_next_candle() {}
        return engine.settle().applied().expect("settle after exhausted reveal");
    }
    engine
        .session()
        .history()
        .last()
        .cloned()
        .expect("hold is recorded immediately")
}

/// Moves to the next playable round, skipping an ad break if one is scheduled.
pub fn advance(engine: &mut GameEngine) -> RoundAdvance {
    let adv = engine
        .next_round()
        .expect("series holds another round")
        .applied()
        .expect("next_round from Settled");
    if let RoundAdvance::AdBreak { .. } = adv {
        assert!(engine.resume().is_applied());
    }
    adv
}
