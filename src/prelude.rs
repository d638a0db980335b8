// 1. Traits
pub use crate::math::indicator::StreamingIndicator;
pub use crate::report::leaderboard::LeaderboardStore;
pub use crate::transport::candles::CandleProvider;

// 2. The Core "Loop" Types
pub use crate::game::{
    IgnoreReason, Intent, Phase, Reveal, RoundAdvance, Transition,
    engine::{GameEngine, InitTicket},
    pacer::{PaceOutcome, RevealPacer},
    session::Session,
};

// 3. Domain Types
pub use crate::data::domain::{Candle, Price};
pub use crate::data::segment::{Segment, select_segment};
pub use crate::data::timeframe::{Timeframe, TimeframeProfile};
pub use crate::game::outcome::{BbPosition, IndicatorSnapshot, MaTrend, Position, RoundOutcome};

// 4. Configuration
pub use crate::game::config::{
    AdSchedule, GameConfig, GameSettings, IndicatorFlags, LiquidationPolicy, RuleSet,
};

// 5. Reports
pub use crate::report::analysis::{Bucket, BucketReport, BucketSample, analyze};
pub use crate::report::leaderboard::{
    InMemoryLeaderboard, LeaderboardRecord, Submission, submit,
};
pub use crate::report::share::SharedResult;
pub use crate::report::statistics::{GameReport, ProfitFactor, Statistics, compute_stats};

// 6. Transport
pub use crate::transport::candles::{HttpCandleProvider, StaticCandleProvider, parse_candles};
pub use crate::transport::leaderboard::RestLeaderboard;

// 7. Errors
pub use crate::error::{
    ChartplayError, ChartplayResult, DataError, EnvError, IoError, TransportError,
};
