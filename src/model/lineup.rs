//! Batting-order strength for the top of a lineup.
//!
//! There is no per-batter data in the pipeline yet, so [`LineupTable`] derives
//! a composite estimate from the team's own first-inning scoring tendency in
//! the relevant role. The feature builder only sees [`LineupStrength`], so a
//! real lineup source can replace the proxy without touching it.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::data::models::{HistoricalEvent, Side};

/// Share of a team's most recent games treated as "recent form".
const RECENT_FRACTION: f64 = 0.2;
const HOT_STREAK_MIN: f64 = 0.7;
const HOT_STREAK_MAX: f64 = 1.3;

pub trait LineupStrength {
    /// Estimated quality of `team`'s lineup when batting on `side`.
    fn estimate(&self, team: &str, side: Side) -> LineupQuality;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineupQuality {
    pub weighted_obp: f64,
    pub weighted_slg: f64,
    pub weighted_ops: f64,
    pub weighted_walk_rate: f64,
    pub weighted_iso: f64,
    pub weighted_first_inning_perf: f64,
    /// Recent scoring rate relative to the season rate, bounded to [0.7, 1.3]
    pub hot_streak_score: f64,
}

impl LineupQuality {
    pub const LEAGUE_AVERAGE: LineupQuality = LineupQuality {
        weighted_obp: 0.320,
        weighted_slg: 0.420,
        weighted_ops: 0.740,
        weighted_walk_rate: 0.085,
        weighted_iso: 0.160,
        weighted_first_inning_perf: 0.450,
        hot_streak_score: 0.50,
    };

    /// Proxy estimate from a first-inning scoring rate `s`.
    pub fn from_scoring_rate(s: f64, hot_streak_score: f64) -> Self {
        let obp = 0.300 + s * 0.15;
        let slg = 0.380 + s * 0.25;
        LineupQuality {
            weighted_obp: obp,
            weighted_slg: slg,
            weighted_ops: obp + slg,
            weighted_walk_rate: 0.075 + s * 0.03,
            weighted_iso: 0.140 + s * 0.12,
            weighted_first_inning_perf: s,
            hot_streak_score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamLineups {
    pub home: LineupQuality,
    pub away: LineupQuality,
}

/// Team-aggregate lineup proxy, snapshotted into the trained model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineupTable {
    pub teams: BTreeMap<String, TeamLineups>,
}

impl LineupTable {
    /// Build from games in the order supplied; the trailing slice of each
    /// team's games is its recent form.
    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a HistoricalEvent>,
    {
        // team → ordered (batting side, scored in its own half)
        let mut history: BTreeMap<&str, Vec<(Side, bool)>> = BTreeMap::new();
        for ev in events {
            history
                .entry(ev.game.home_team.as_str())
                .or_default()
                .push((Side::Home, ev.home_scored()));
            history
                .entry(ev.game.away_team.as_str())
                .or_default()
                .push((Side::Away, ev.away_scored()));
        }

        let teams = history
            .into_iter()
            .map(|(team, games)| {
                (
                    team.to_string(),
                    TeamLineups {
                        home: proxy_for_side(&games, Side::Home),
                        away: proxy_for_side(&games, Side::Away),
                    },
                )
            })
            .collect();
        LineupTable { teams }
    }
}

impl LineupStrength for LineupTable {
    fn estimate(&self, team: &str, side: Side) -> LineupQuality {
        match self.teams.get(team) {
            Some(t) => match side {
                Side::Home => t.home,
                Side::Away => t.away,
            },
            None => LineupQuality::LEAGUE_AVERAGE,
        }
    }
}

fn scoring_rate(games: &[(Side, bool)], side: Side) -> Option<f64> {
    let (hits, n) = games
        .iter()
        .filter(|(s, _)| *s == side)
        .fold((0usize, 0usize), |(h, n), (_, scored)| (h + usize::from(*scored), n + 1));
    if n == 0 {
        None
    } else {
        Some(hits as f64 / n as f64)
    }
}

fn proxy_for_side(games: &[(Side, bool)], side: Side) -> LineupQuality {
    let Some(rate) = scoring_rate(games, side) else {
        return LineupQuality::LEAGUE_AVERAGE;
    };
    let recent_len = (games.len() as f64 * RECENT_FRACTION) as usize;
    let recent = &games[games.len() - recent_len..];
    let hot = match scoring_rate(recent, side) {
        Some(recent_rate) if rate > 0.0 => (recent_rate / rate).clamp(HOT_STREAK_MIN, HOT_STREAK_MAX),
        // No recent games in this role, or no season scoring: no form signal.
        _ => 1.0,
    };
    LineupQuality::from_scoring_rate(rate, hot)
}
