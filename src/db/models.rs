use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::betting::odds::AmericanOdds;
use crate::model::predictor::Call;

pub const DEFAULT_BET_TYPE: &str = "First Inning Run";

/// Settlement state of a logged bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BetResult {
    Pending,
    Win,
    Loss,
    Push,
}

impl BetResult {
    pub fn as_str(self) -> &'static str {
        match self {
            BetResult::Pending => "PENDING",
            BetResult::Win => "WIN",
            BetResult::Loss => "LOSS",
            BetResult::Push => "PUSH",
        }
    }

    pub fn is_settled(self) -> bool {
        self != BetResult::Pending
    }

    /// Profit for a bet of `stake` at `odds` settled as `self`.
    pub fn profit(self, odds: AmericanOdds, stake: f64) -> f64 {
        match self {
            BetResult::Win => odds.win_amount(stake),
            BetResult::Loss => -stake,
            BetResult::Push | BetResult::Pending => 0.0,
        }
    }
}

impl fmt::Display for BetResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BetResult {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(BetResult::Pending),
            "WIN" | "W" => Ok(BetResult::Win),
            "LOSS" | "L" => Ok(BetResult::Loss),
            "PUSH" | "P" => Ok(BetResult::Push),
            other => bail!("unknown bet result {:?} (expected WIN, LOSS, PUSH or PENDING)", other),
        }
    }
}

impl ToSql for BetResult {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for BetResult {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: anyhow::Error| FromSqlError::Other(e.into()))
    }
}

/// A bet as entered by the user; pricing fields are derived on insert.
#[derive(Debug, Clone)]
pub struct NewBet {
    pub date: NaiveDate,
    pub away_team: String,
    pub home_team: String,
    pub bet_type: String,
    pub selection: Call,
    pub odds: AmericanOdds,
    pub stake: f64,
    /// Model probability of the selected outcome (0.0–1.0)
    pub model_probability: f64,
    pub result: BetResult,
    pub notes: Option<String>,
}

impl NewBet {
    pub fn game(&self) -> String {
        format!("{} @ {}", self.away_team, self.home_team)
    }
}

/// A row of the bet ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bet {
    pub id: i64,
    pub date: NaiveDate,
    /// "Away @ Home"
    pub game: String,
    pub home_team: String,
    pub away_team: String,
    pub bet_type: String,
    /// "YES" or "NO"
    pub selection: String,
    pub odds: i32,
    pub stake: f64,
    pub model_probability: f64,
    pub implied_probability: f64,
    pub edge: f64,
    pub edge_tier: String,
    pub ev_dollars: f64,
    pub ev_percent: f64,
    pub result: BetResult,
    pub profit_loss: f64,
    /// Whether a first-inning run actually happened, once known
    pub actual_occurred: Option<bool>,
    pub closing_odds: Option<i32>,
    /// Our price beat the closing price
    pub beat_closing_line: Option<bool>,
    pub notes: Option<String>,
    pub logged_at: DateTime<Utc>,
}

impl Bet {
    pub fn display_id(&self) -> String {
        format_bet_id(self.id)
    }
}

pub fn format_bet_id(id: i64) -> String {
    format!("BET{:04}", id)
}

/// Accepts `BET0007`, `bet7` or `7`.
pub fn parse_bet_id(s: &str) -> Result<i64> {
    let t = s.trim();
    let digits = match t.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("BET") => &t[3..],
        _ => t,
    };
    match digits.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => bail!("invalid bet id {:?}", s),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Record {
    pub bets: usize,
    pub wins: usize,
    pub losses: usize,
    pub pushes: usize,
    pub staked: f64,
    pub profit: f64,
}

impl Record {
    pub fn add(&mut self, bet: &Bet) {
        self.bets += 1;
        match bet.result {
            BetResult::Win => self.wins += 1,
            BetResult::Loss => self.losses += 1,
            BetResult::Push => self.pushes += 1,
            BetResult::Pending => {}
        }
        self.staked += bet.stake;
        self.profit += bet.profit_loss;
    }

    /// Percent of decided (non-push) bets won.
    pub fn win_rate(&self) -> f64 {
        let decided = self.wins + self.losses;
        if decided == 0 {
            0.0
        } else {
            self.wins as f64 / decided as f64 * 100.0
        }
    }

    pub fn roi(&self) -> f64 {
        if self.staked > 0.0 {
            self.profit / self.staked * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueBetStats {
    pub min_edge: f64,
    pub record: Record,
    pub avg_edge_pct: f64,
    /// Sum of model probabilities
    pub expected_wins: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierStats {
    pub tier: String,
    pub record: Record,
    pub avg_edge_pct: f64,
}
