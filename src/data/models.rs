use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Placeholder used by the box-score collector when no starter was listed.
pub const UNKNOWN_PITCHER: &str = "Unknown";

/// Which half of the first inning a team bats in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Bats in the bottom of the inning.
    Home,
    /// Bats in the top of the inning.
    Away,
}

impl Side {
    pub fn prefix(self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }
}

/// Pre-game context shared by completed and upcoming games.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameInfo {
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    /// Starting pitcher for the home side (`Unknown` when not announced)
    pub home_pitcher: String,
    pub away_pitcher: String,
    pub venue: Option<String>,
    /// Game-time temperature in °F
    pub temperature: Option<f64>,
    /// Free-form wind descriptor, e.g. "8 mph SW"
    pub wind: Option<String>,
}

impl GameInfo {
    /// Label used by sportsbooks and the odds table: "Away @ Home".
    pub fn label(&self) -> String {
        format!("{} @ {}", self.away_team, self.home_team)
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }
}

/// A completed game with its first-inning outcome.
///
/// The "run scored" flag is derived from the per-side runs rather than stored,
/// so it can never disagree with them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalEvent {
    pub game_id: String,
    pub game: GameInfo,
    pub first_inning_runs_home: u32,
    pub first_inning_runs_away: u32,
    pub final_score_home: Option<u32>,
    pub final_score_away: Option<u32>,
}

impl HistoricalEvent {
    pub fn new(game_id: impl Into<String>, game: GameInfo, runs_home: u32, runs_away: u32) -> Self {
        HistoricalEvent {
            game_id: game_id.into(),
            game,
            first_inning_runs_home: runs_home,
            first_inning_runs_away: runs_away,
            final_score_home: None,
            final_score_away: None,
        }
    }

    /// Home side scored in the bottom of the first.
    pub fn home_scored(&self) -> bool {
        self.first_inning_runs_home > 0
    }

    /// Away side scored in the top of the first.
    pub fn away_scored(&self) -> bool {
        self.first_inning_runs_away > 0
    }

    /// YRFI outcome: a run scored by either side in the first inning.
    pub fn run_scored(&self) -> bool {
        self.home_scored() || self.away_scored()
    }

    /// Training label (1.0 = YRFI).
    pub fn label(&self) -> f64 {
        if self.run_scored() {
            1.0
        } else {
            0.0
        }
    }
}

/// An upcoming game, no outcome fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProspectiveEvent {
    pub game_id: String,
    pub game: GameInfo,
    /// Scheduled first pitch, as published (e.g. "19:05")
    pub game_time: Option<String>,
}
