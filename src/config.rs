use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::betting::backtest::ReferenceWindow;
use crate::betting::odds::{AmericanOdds, DEFAULT_STAKE};
use crate::db::models::{BetResult, DEFAULT_BET_TYPE};
use crate::model::predictor::Call;

/// First-inning run model, edge calculator and bet tracker for MLB YRFI/NRFI markets
#[derive(Parser, Debug, Clone)]
#[command(name = "yrfi-edge", version, about)]
pub struct Config {
    /// Directory holding the latest model and its timestamped archives
    #[arg(long, env = "MODEL_DIR", default_value = "models", global = true)]
    pub model_dir: PathBuf,

    /// SQLite bet ledger path
    #[arg(long, env = "BETS_DATABASE_PATH", default_value = "bets.db", global = true)]
    pub database_path: String,

    /// Where daily prediction files are written
    #[arg(long, env = "PREDICTIONS_DIR", default_value = "predictions", global = true)]
    pub predictions_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fit a model on one or more seasons of historical games
    Train {
        /// Historical games CSV (repeat to combine seasons)
        #[arg(long = "data", required = true)]
        data: Vec<PathBuf>,
    },

    /// Score upcoming games and price them against sportsbook odds
    Predict {
        /// Upcoming games CSV
        #[arg(long)]
        games: PathBuf,

        /// Odds JSON keyed by "Away @ Home"
        #[arg(long)]
        odds: Option<PathBuf>,

        /// Only score games on this date (YYYY-MM-DD); defaults to all games, saved under today
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Minimum edge for a value bet (e.g. 0.03 = 3%)
        #[arg(long, env = "LIVE_MIN_EDGE", default_value = "0.03")]
        live_min_edge: f64,

        /// Stake used for expected value
        #[arg(long, default_value_t = DEFAULT_STAKE)]
        stake: f64,
    },

    /// Replay a completed season against a saved model
    Backtest {
        /// Historical games CSV for the season to replay
        #[arg(long)]
        data: PathBuf,

        /// Source of the rate tables used while replaying
        #[arg(long, value_enum)]
        reference_window: ReferenceWindow,

        /// Price assumed for every YES bet
        #[arg(long, default_value = "-110", allow_hyphen_values = true)]
        odds: AmericanOdds,

        #[arg(long, default_value_t = DEFAULT_STAKE)]
        stake: f64,

        /// Bet only when edge exceeds this fraction
        #[arg(long, default_value = "0.05")]
        min_edge: f64,
    },

    /// Manage the bet ledger
    Bets {
        #[command(subcommand)]
        action: BetsCommand,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum BetsCommand {
    /// Record a bet
    Log {
        /// Game date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        away: String,
        #[arg(long)]
        home: String,
        /// YES (run scores) or NO
        #[arg(long, value_enum, ignore_case = true)]
        selection: Call,
        #[arg(long, allow_hyphen_values = true)]
        odds: AmericanOdds,
        #[arg(long, default_value_t = DEFAULT_STAKE)]
        stake: f64,
        /// Model probability of the selected outcome
        #[arg(long)]
        probability: f64,
        #[arg(long, default_value = DEFAULT_BET_TYPE)]
        bet_type: String,
        /// Result if already known
        #[arg(long, default_value = "PENDING")]
        result: BetResult,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Settle a bet
    Update {
        /// Bet id (BET0007 or 7)
        id: String,
        /// WIN, LOSS or PUSH
        result: BetResult,
        /// Whether a first-inning run scored (inferred from the result if omitted)
        #[arg(long)]
        actual: Option<bool>,
        #[arg(long, allow_hyphen_values = true)]
        closing_odds: Option<AmericanOdds>,
    },

    /// Performance summary over settled bets
    Stats {
        /// Minimum edge for the value-bet section
        #[arg(long, default_value = "0.03")]
        min_edge: f64,
    },

    /// Show the most recent bets
    History {
        #[arg(short = 'n', long, default_value = "20")]
        count: usize,
    },

    /// Write the whole ledger to CSV
    Export { path: PathBuf },
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        match &self.command {
            Command::Train { .. } => {}
            Command::Predict {
                live_min_edge,
                stake,
                ..
            } => {
                check_edge("live_min_edge", *live_min_edge)?;
                check_stake(*stake)?;
            }
            Command::Backtest {
                min_edge, stake, ..
            } => {
                check_edge("min_edge", *min_edge)?;
                check_stake(*stake)?;
            }
            Command::Bets { action } => match action {
                BetsCommand::Log {
                    probability, stake, ..
                } => {
                    if !(0.0..=1.0).contains(probability) {
                        anyhow::bail!("probability must be between 0.0 and 1.0");
                    }
                    check_stake(*stake)?;
                }
                BetsCommand::Stats { min_edge } => check_edge("min_edge", *min_edge)?,
                BetsCommand::History { count } if *count == 0 => {
                    anyhow::bail!("history count must be at least 1");
                }
                _ => {}
            },
        }
        Ok(())
    }
}

fn check_edge(name: &str, edge: f64) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&edge) {
        anyhow::bail!("{} must be between 0.0 and 1.0", name);
    }
    Ok(())
}

fn check_stake(stake: f64) -> anyhow::Result<()> {
    if stake.is_nan() || stake <= 0.0 {
        anyhow::bail!("stake must be positive");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backtest_with_negative_odds() {
        let cfg = Config::try_parse_from([
            "yrfi-edge",
            "backtest",
            "--data",
            "season.csv",
            "--reference-window",
            "trailing",
            "--odds",
            "-120",
        ])
        .unwrap();
        match cfg.command {
            Command::Backtest {
                reference_window,
                odds,
                min_edge,
                ..
            } => {
                assert_eq!(reference_window, ReferenceWindow::Trailing);
                assert_eq!(odds.value(), -120);
                assert_eq!(min_edge, 0.05);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(cfg_valid(&["yrfi-edge", "backtest", "--data", "s.csv", "--reference-window", "same-season"]));
    }

    #[test]
    fn backtest_requires_reference_window() {
        assert!(Config::try_parse_from(["yrfi-edge", "backtest", "--data", "season.csv"]).is_err());
    }

    #[test]
    fn parses_bet_log_and_update() {
        let cfg = Config::try_parse_from([
            "yrfi-edge",
            "bets",
            "log",
            "--date",
            "2024-08-12",
            "--away",
            "Philadelphia Phillies",
            "--home",
            "Atlanta Braves",
            "--selection",
            "YES",
            "--odds",
            "+105",
            "--probability",
            "0.56",
        ])
        .unwrap();
        match cfg.command {
            Command::Bets {
                action:
                    BetsCommand::Log {
                        selection,
                        odds,
                        result,
                        bet_type,
                        ..
                    },
            } => {
                assert_eq!(selection, Call::Yes);
                assert_eq!(odds.value(), 105);
                assert_eq!(result, BetResult::Pending);
                assert_eq!(bet_type, DEFAULT_BET_TYPE);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cfg = Config::try_parse_from(["yrfi-edge", "bets", "update", "BET0003", "win"]).unwrap();
        assert!(matches!(
            cfg.command,
            Command::Bets {
                action: BetsCommand::Update {
                    result: BetResult::Win,
                    ..
                }
            }
        ));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(!cfg_valid(&[
            "yrfi-edge", "predict", "--games", "g.csv", "--live-min-edge", "1.5"
        ]));
        assert!(!cfg_valid(&["yrfi-edge", "bets", "history", "-n", "0"]));
        assert!(cfg_valid(&["yrfi-edge", "bets", "stats"]));
    }

    fn cfg_valid(args: &[&str]) -> bool {
        Config::try_parse_from(args).unwrap().validate().is_ok()
    }
}
