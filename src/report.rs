pub mod analysis;
pub mod leaderboard;
pub mod share;
pub mod statistics;
