pub mod backtest;
pub mod odds;
pub mod recommend;

pub use backtest::{run_backtest, BacktestReport, BetSettings, ReferenceWindow};
pub use odds::{AmericanOdds, EdgeResult, EdgeTier};
pub use recommend::{recommend, LiveSettings, OddsTable, Slate};
