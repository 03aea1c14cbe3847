//! Historical first-inning scoring / allowing rates per team and per pitcher.
//!
//! Teams get two independent rates because the home side bats in the bottom of
//! the inning and the away side in the top. Pitchers get a single role-blind
//! rate of starts in which the opponent scored in the first.
//!
//! Entities with no qualifying games resolve to league-average constants so
//! that every downstream join is total.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::data::models::{HistoricalEvent, UNKNOWN_PITCHER};

/// How often a team scores in the first when batting at home.
pub const LEAGUE_HOME_TEAM_RATE: f64 = 0.45;
/// How often a team scores in the first when batting on the road.
pub const LEAGUE_AWAY_TEAM_RATE: f64 = 0.42;
/// How often a starter allows a first-inning run.
pub const LEAGUE_PITCHER_RATE: f64 = 0.42;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityRate {
    /// Fraction of qualifying games with a first-inning run (0.0–1.0)
    pub rate: f64,
    /// Number of qualifying games behind `rate`; 0 means `rate` is the fallback
    pub sample_size: usize,
}

impl EntityRate {
    fn from_counts(hits: usize, games: usize, fallback: f64) -> Self {
        if games == 0 {
            return EntityRate {
                rate: fallback,
                sample_size: 0,
            };
        }
        EntityRate {
            rate: hits as f64 / games as f64,
            sample_size: games,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamRate {
    pub home: EntityRate,
    pub away: EntityRate,
}

impl TeamRate {
    pub fn total_games(&self) -> usize {
        self.home.sample_size + self.away.sample_size
    }
}

/// Pitcher tendencies. Only `first_inning_run_rate` is observed; the other
/// rates are linear proxies of it until per-pitch data is available.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitcherProfile {
    pub first_inning_run_rate: f64,
    /// BB/9
    pub walk_rate: f64,
    /// K/9
    pub strikeout_rate: f64,
    /// HR/9
    pub hr_rate: f64,
    pub gb_rate: f64,
    pub first_inning_walk_rate: f64,
    pub first_inning_hr_rate: f64,
}

impl PitcherProfile {
    pub const LEAGUE_AVERAGE: PitcherProfile = PitcherProfile {
        first_inning_run_rate: LEAGUE_PITCHER_RATE,
        walk_rate: 3.0,
        strikeout_rate: 8.5,
        hr_rate: 1.2,
        gb_rate: 0.45,
        first_inning_walk_rate: 0.35,
        first_inning_hr_rate: 0.11,
    };

    pub fn from_run_rate(r: f64) -> Self {
        PitcherProfile {
            first_inning_run_rate: r,
            walk_rate: 2.5 + r * 2.5,
            strikeout_rate: 10.0 - r * 4.0,
            hr_rate: 0.8 + r * 1.2,
            gb_rate: 0.52 - r * 0.2,
            first_inning_walk_rate: 0.25 + r * 0.35,
            first_inning_hr_rate: 0.08 + r * 0.15,
        }
    }
}

/// Aggregated rate tables. Ordered maps keep serialization and iteration
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateTables {
    pub teams: BTreeMap<String, TeamRate>,
    pub pitchers: BTreeMap<String, EntityRate>,
}

impl RateTables {
    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a HistoricalEvent>,
    {
        // (hits, games) per role
        let mut team_home: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        let mut team_away: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        let mut pitcher: BTreeMap<&str, (usize, usize)> = BTreeMap::new();

        for ev in events {
            let g = &ev.game;

            let h = team_home.entry(g.home_team.as_str()).or_default();
            h.0 += usize::from(ev.home_scored());
            h.1 += 1;
            let a = team_away.entry(g.away_team.as_str()).or_default();
            a.0 += usize::from(ev.away_scored());
            a.1 += 1;
            // Make sure both roles exist for every team seen.
            team_home.entry(g.away_team.as_str()).or_default();
            team_away.entry(g.home_team.as_str()).or_default();

            // Home starter faces the away lineup and vice versa.
            if g.home_pitcher != UNKNOWN_PITCHER {
                let p = pitcher.entry(g.home_pitcher.as_str()).or_default();
                p.0 += usize::from(ev.away_scored());
                p.1 += 1;
            }
            if g.away_pitcher != UNKNOWN_PITCHER {
                let p = pitcher.entry(g.away_pitcher.as_str()).or_default();
                p.0 += usize::from(ev.home_scored());
                p.1 += 1;
            }
        }

        let teams = team_home
            .iter()
            .map(|(team, &(home_hits, home_games))| {
                let (away_hits, away_games) = team_away.get(team).copied().unwrap_or((0, 0));
                (
                    team.to_string(),
                    TeamRate {
                        home: EntityRate::from_counts(home_hits, home_games, LEAGUE_HOME_TEAM_RATE),
                        away: EntityRate::from_counts(away_hits, away_games, LEAGUE_AWAY_TEAM_RATE),
                    },
                )
            })
            .collect();

        let pitchers = pitcher
            .into_iter()
            .map(|(name, (hits, starts))| {
                (
                    name.to_string(),
                    EntityRate::from_counts(hits, starts, LEAGUE_PITCHER_RATE),
                )
            })
            .collect();

        RateTables { teams, pitchers }
    }

    pub fn team(&self, team: &str) -> Option<&TeamRate> {
        self.teams.get(team)
    }

    /// Team's first-inning scoring rate when batting at home.
    pub fn team_home_rate(&self, team: &str) -> f64 {
        self.teams
            .get(team)
            .map(|t| t.home.rate)
            .unwrap_or(LEAGUE_HOME_TEAM_RATE)
    }

    /// Team's first-inning scoring rate when batting on the road.
    pub fn team_away_rate(&self, team: &str) -> f64 {
        self.teams
            .get(team)
            .map(|t| t.away.rate)
            .unwrap_or(LEAGUE_AWAY_TEAM_RATE)
    }

    pub fn pitcher_rate(&self, name: &str) -> EntityRate {
        self.pitchers.get(name).copied().unwrap_or(EntityRate {
            rate: LEAGUE_PITCHER_RATE,
            sample_size: 0,
        })
    }

    pub fn pitcher_profile(&self, name: &str) -> PitcherProfile {
        match self.pitchers.get(name) {
            Some(r) if r.sample_size > 0 => PitcherProfile::from_run_rate(r.rate),
            _ => PitcherProfile::LEAGUE_AVERAGE,
        }
    }
}
