use std::time::Duration;

use anyhow::{Context, Result};
use chartplay::{
    data::domain::closes,
    math::indicator::rsi,
    prelude::*,
};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};
use reqwest::Url;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let settings = GameSettings::default()
        .with_timeframe(Timeframe::Minute15)
        .with_leverage(5)?
        .with_max_rounds(10)?;
    let config = GameConfig::default().with_seed(7);
    let mut engine = GameEngine::new(settings, config);

    let provider = StaticCandleProvider::new(random_walk(600, 7));
    engine
        .initialize_game(&provider)
        .await
        .context("Failed to start game")?;

    let pacer = RevealPacer::new(Duration::from_millis(20));
    while !engine.phase().is_finished() {
        let position = pick(engine.session());
        if engine.place_bet(position).is_ignored() {
            break;
        }

        if position != Position::Hold {
            if pacer.run(&mut engine).await != PaceOutcome::Exhausted {
                break;
            }
            let _ = engine.settle();
        }

        if let Some(last) = engine.session().history().last() {
            println!(
                "round {:>2}  {:<5}  {:>8.2}%  balance {:>9.2}",
                last.round_index,
                last.position.to_string(),
                last.profit_percent,
                engine.session().balance()
            );
        }

        match engine.next_round()? {
            Transition::Applied(RoundAdvance::AdBreak { round_index }) => {
                info!(round_index, "Ad break");
                let _ = engine.resume();
            }
            Transition::Applied(_) => {}
            Transition::Ignored { .. } => break,
        }
    }

    let report = engine.report();
    let stats = &report.statistics;
    println!("\n--- Game Summary ---");
    println!("Return:          {:.2}%", report.return_percent);
    println!("Win rate:        {:.1}%", stats.win_rate);
    println!("Profit factor:   {}", stats.profit_factor);
    println!("Best trade:      {:.2}%", stats.best_trade_percent);
    println!(
        "Streaks:         {} wins / {} losses",
        stats.max_consecutive_wins, stats.max_consecutive_losses
    );

    for (bucket, result) in engine.analysis() {
        if let Some(sample) = result.sample() {
            println!(
                "{:<14} n={:<3} long {:>5.1}%  win {:>5.1}%",
                <&'static str>::from(bucket),
                sample.total,
                sample.long_rate,
                sample.win_rate
            );
        }
    }

    if let Some(shared) = engine.shared_result() {
        let base = Url::parse("https://chartplay.example/result")?;
        println!("\nShare: {}", shared.to_url(&base));
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

/// Mean reversion on RSI(14): buy oversold, sell overbought, sit out otherwise.
fn pick(session: &Session) -> Position {
    let prices = closes(session.warmup().iter().chain(session.visible_window()));
    match rsi(&prices, 14).last().copied().filter(|v| v.is_finite()) {
        Some(v) if v < 40.0 => Position::Long,
        Some(v) if v > 60.0 => Position::Short,
        _ => Position::Hold,
    }
}

fn random_walk(n: usize, seed: u64) -> Vec<Candle> {
    let mut rng = StdRng::seed_from_u64(seed);
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut close = 42_000.0_f64;
    (0..n)
        .map(|i| {
            let open = close;
            close = (open * (1.0 + rng.random_range(-0.004..0.004))).max(1.0);
            let high = open.max(close) * (1.0 + rng.random_range(0.0..0.001));
            let low = open.min(close) * (1.0 - rng.random_range(0.0..0.001));
            Candle::new(t0 + ChronoDuration::minutes(15 * i as i64), open, high, low, close)
        })
        .collect()
}
