pub mod candles;
pub mod leaderboard;
