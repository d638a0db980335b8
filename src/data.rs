pub mod domain;
pub mod segment;
pub mod timeframe;
