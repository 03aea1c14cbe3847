//! Feature engineering: one numeric row per game.
//!
//! Column order is canonical (base, team, pitcher, lineup, park, season) and
//! is recorded in the trained model. Anything handed to an existing model goes
//! through [`align`], which reconciles schema drift by dropping unknown columns
//! and zero-filling missing ones.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::data::models::{GameInfo, Side};

use super::aggregator::{PitcherProfile, RateTables};
use super::lineup::{LineupQuality, LineupStrength};

/// Used when no temperature is available for any game in the batch.
pub const DEFAULT_TEMPERATURE: f64 = 72.0;
/// Used when the wind descriptor is missing or has no number in it.
pub const DEFAULT_WIND_SPEED: f64 = 8.0;
pub const HOT_TEMPERATURE: f64 = 80.0;
pub const COLD_TEMPERATURE: f64 = 60.0;
pub const HIGH_WIND_MPH: f64 = 15.0;
/// Size of the park-indicator vocabulary.
pub const TOP_VENUES: usize = 10;

const BASE_FEATURES: [&str; 5] = ["temp", "temp_hot", "temp_cold", "wind_speed", "high_wind"];
const TEAM_FEATURES: [&str; 2] = ["home_team_off_rate", "away_team_off_rate"];
const PITCHER_SUFFIXES: [&str; 7] = [
    "1st_inn_rate",
    "walk_rate",
    "1st_inn_walk_rate",
    "k_rate",
    "hr_rate",
    "1st_inn_hr_rate",
    "gb_rate",
];
const LINEUP_SUFFIXES: [&str; 7] = [
    "weighted_obp",
    "weighted_slg",
    "weighted_ops",
    "weighted_walk_rate",
    "weighted_iso",
    "weighted_1st_inn_perf",
    "hot_streak_score",
];
const SEASON_FEATURE: &str = "is_summer";

/// Closed set of venues that get an indicator column, fixed at training time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VenueVocabulary(Vec<String>);

impl VenueVocabulary {
    pub fn new(venues: Vec<String>) -> Self {
        VenueVocabulary(venues)
    }

    /// The `TOP_VENUES` most frequent venues; ties keep first appearance.
    pub fn most_frequent(games: &[&GameInfo]) -> Self {
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for (idx, g) in games.iter().enumerate() {
            if let Some(v) = g.venue.as_deref() {
                counts.entry(v).or_insert((0, idx)).0 += 1;
            }
        }
        let mut ranked: Vec<(&str, usize, usize)> =
            counts.into_iter().map(|(v, (n, first))| (v, n, first)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        VenueVocabulary(
            ranked
                .into_iter()
                .take(TOP_VENUES)
                .map(|(v, _, _)| v.to_string())
                .collect(),
        )
    }

    pub fn venues(&self) -> &[String] {
        &self.0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.0.iter().map(|v| park_column(v)).collect()
    }
}

pub fn park_column(venue: &str) -> String {
    format!("park_{}", venue.replace(' ', "_"))
}

/// Everything joined onto a game row besides its own fields.
pub struct FeatureContext<'a> {
    pub rates: &'a RateTables,
    pub lineups: &'a dyn LineupStrength,
    pub venues: &'a VenueVocabulary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    pub names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

/// Canonical column names for a venue vocabulary.
pub fn feature_names(venues: &VenueVocabulary) -> Vec<String> {
    let mut names: Vec<String> = BASE_FEATURES.iter().map(|s| s.to_string()).collect();
    names.extend(TEAM_FEATURES.iter().map(|s| s.to_string()));
    for suffix in PITCHER_SUFFIXES {
        for side in [Side::Home, Side::Away] {
            names.push(format!("{}_pitcher_{}", side.prefix(), suffix));
        }
    }
    for side in [Side::Home, Side::Away] {
        for suffix in LINEUP_SUFFIXES {
            names.push(format!("{}_{}", side.prefix(), suffix));
        }
    }
    names.extend(venues.column_names());
    names.push(SEASON_FEATURE.to_string());
    names
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Fill value for missing temperatures: batch median of the games that have
/// one, or [`DEFAULT_TEMPERATURE`] when none do.
pub fn temperature_fill(games: &[&GameInfo]) -> f64 {
    median(games.iter().filter_map(|g| g.temperature).collect()).unwrap_or(DEFAULT_TEMPERATURE)
}

/// Fill value for missing or unparseable wind: batch median of the speeds
/// that parse, or [`DEFAULT_WIND_SPEED`] when none do.
pub fn wind_fill(games: &[&GameInfo]) -> f64 {
    median(games.iter().filter_map(|g| wind_speed(g.wind.as_deref())).collect())
        .unwrap_or(DEFAULT_WIND_SPEED)
}

/// First run of digits in a wind descriptor ("12 mph NE" → 12).
pub fn wind_speed(wind: Option<&str>) -> Option<f64> {
    let digits: String = wind?
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<f64>().ok()
}

/// Values substituted for missing weather fields across one batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherFill {
    pub temperature: f64,
    pub wind_speed: f64,
}

impl WeatherFill {
    pub fn from_games(games: &[&GameInfo]) -> Self {
        WeatherFill {
            temperature: temperature_fill(games),
            wind_speed: wind_fill(games),
        }
    }
}

impl Default for WeatherFill {
    /// Moderate conditions for a lone game with nothing to take a median of.
    fn default() -> Self {
        WeatherFill {
            temperature: DEFAULT_TEMPERATURE,
            wind_speed: DEFAULT_WIND_SPEED,
        }
    }
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

fn pitcher_values(p: &PitcherProfile) -> [f64; 7] {
    [
        p.first_inning_run_rate,
        p.walk_rate,
        p.first_inning_walk_rate,
        p.strikeout_rate,
        p.hr_rate,
        p.first_inning_hr_rate,
        p.gb_rate,
    ]
}

fn lineup_values(q: &LineupQuality) -> [f64; 7] {
    [
        q.weighted_obp,
        q.weighted_slg,
        q.weighted_ops,
        q.weighted_walk_rate,
        q.weighted_iso,
        q.weighted_first_inning_perf,
        q.hot_streak_score,
    ]
}

/// One row in canonical order for `feature_names(ctx.venues)`.
pub fn build_row(game: &GameInfo, fill: &WeatherFill, ctx: &FeatureContext) -> Vec<f64> {
    let temp = game.temperature.unwrap_or(fill.temperature);
    let wind = wind_speed(game.wind.as_deref()).unwrap_or(fill.wind_speed);

    let mut row = Vec::with_capacity(48 + ctx.venues.venues().len());
    row.extend([
        temp,
        flag(temp > HOT_TEMPERATURE),
        flag(temp < COLD_TEMPERATURE),
        wind,
        flag(wind > HIGH_WIND_MPH),
    ]);
    row.push(ctx.rates.team_home_rate(&game.home_team));
    row.push(ctx.rates.team_away_rate(&game.away_team));

    let home_p = pitcher_values(&ctx.rates.pitcher_profile(&game.home_pitcher));
    let away_p = pitcher_values(&ctx.rates.pitcher_profile(&game.away_pitcher));
    for i in 0..PITCHER_SUFFIXES.len() {
        row.push(home_p[i]);
        row.push(away_p[i]);
    }

    row.extend(lineup_values(&ctx.lineups.estimate(&game.home_team, Side::Home)));
    row.extend(lineup_values(&ctx.lineups.estimate(&game.away_team, Side::Away)));

    for venue in ctx.venues.venues() {
        row.push(flag(game.venue.as_deref() == Some(venue.as_str())));
    }
    row.push(flag(matches!(game.month(), 6..=8)));
    row
}

/// Build the full canonical frame for a batch sharing one context.
pub fn build_features(games: &[&GameInfo], ctx: &FeatureContext) -> FeatureFrame {
    let fill = WeatherFill::from_games(games);
    FeatureFrame {
        names: feature_names(ctx.venues),
        rows: games.iter().map(|g| build_row(g, &fill, ctx)).collect(),
    }
}

/// Columns dropped or synthesized while aligning to a model's feature list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDrift {
    pub dropped: Vec<String>,
    pub zero_filled: Vec<String>,
}

impl SchemaDrift {
    pub fn is_empty(&self) -> bool {
        self.dropped.is_empty() && self.zero_filled.is_empty()
    }
}

/// Reorder `frame` to exactly `target` columns. Extra columns are dropped and
/// missing ones are zero; drift is logged since it usually means the model is
/// stale relative to the feature code.
pub fn align(frame: &FeatureFrame, target: &[String]) -> (Vec<Vec<f64>>, SchemaDrift) {
    let index: HashMap<&str, usize> = frame
        .names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();
    let positions: Vec<Option<usize>> = target.iter().map(|n| index.get(n.as_str()).copied()).collect();

    let drift = SchemaDrift {
        dropped: frame
            .names
            .iter()
            .filter(|n| !target.contains(*n))
            .cloned()
            .collect(),
        zero_filled: target
            .iter()
            .zip(&positions)
            .filter(|(_, p)| p.is_none())
            .map(|(n, _)| n.clone())
            .collect(),
    };
    if !drift.is_empty() {
        warn!(
            "Feature schema drift: {} column(s) dropped, {} zero-filled; the model may be stale",
            drift.dropped.len(),
            drift.zero_filled.len()
        );
        debug!(
            "Dropped: {:?}; zero-filled: {:?}",
            drift.dropped, drift.zero_filled
        );
    }

    let rows = frame
        .rows
        .iter()
        .map(|row| {
            positions
                .iter()
                .map(|p| p.map(|i| row[i]).unwrap_or(0.0))
                .collect()
        })
        .collect();
    (rows, drift)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::models::HistoricalEvent;
    use crate::model::lineup::LineupTable;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn game(venue: Option<&str>, temp: Option<f64>, wind: Option<&str>, month: u32) -> GameInfo {
        GameInfo {
            date: NaiveDate::from_ymd_opt(2024, month, 10).unwrap(),
            home_team: "Atlanta Braves".into(),
            away_team: "Philadelphia Phillies".into(),
            home_pitcher: "Spencer Strider".into(),
            away_pitcher: "Zack Wheeler".into(),
            venue: venue.map(Into::into),
            temperature: temp,
            wind: wind.map(Into::into),
        }
    }

    fn col(frame: &FeatureFrame, row: usize, name: &str) -> f64 {
        let i = frame.names.iter().position(|n| n == name).expect(name);
        frame.rows[row][i]
    }

    #[test]
    fn canonical_names_match_row_width() {
        let venues = VenueVocabulary::new(vec!["Truist Park".into(), "Petco Park".into()]);
        let names = feature_names(&venues);
        assert_eq!(names.len(), 5 + 2 + 14 + 14 + 2 + 1);
        assert_eq!(names[7], "home_pitcher_1st_inn_rate");
        assert_eq!(names[8], "away_pitcher_1st_inn_rate");
        assert!(names.contains(&"park_Truist_Park".to_string()));
        assert_eq!(names.last().map(String::as_str), Some("is_summer"));

        let rates = RateTables::default();
        let lineups = LineupTable::default();
        let ctx = FeatureContext {
            rates: &rates,
            lineups: &lineups,
            venues: &venues,
        };
        let g = game(None, None, None, 4);
        assert_eq!(build_row(&g, &WeatherFill::default(), &ctx).len(), names.len());
    }

    #[test]
    fn missing_temperature_uses_batch_median() {
        let a = game(None, Some(50.0), None, 4);
        let b = game(None, Some(90.0), None, 4);
        let c = game(None, Some(70.0), None, 4);
        let d = game(None, None, None, 4);
        assert_relative_eq!(temperature_fill(&[&a, &b, &c, &d]), 70.0);
        assert_relative_eq!(temperature_fill(&[&a, &b, &d]), 70.0);
        assert_relative_eq!(temperature_fill(&[&d]), DEFAULT_TEMPERATURE);
    }

    #[test]
    fn temperature_regime_flags() {
        let rates = RateTables::default();
        let lineups = LineupTable::default();
        let venues = VenueVocabulary::default();
        let ctx = FeatureContext {
            rates: &rates,
            lineups: &lineups,
            venues: &venues,
        };
        let hot = game(None, Some(85.0), None, 7);
        let cold = game(None, Some(55.0), None, 4);
        let edge = game(None, Some(80.0), None, 4);
        let frame = build_features(&[&hot, &cold, &edge], &ctx);
        assert_relative_eq!(col(&frame, 0, "temp_hot"), 1.0);
        assert_relative_eq!(col(&frame, 1, "temp_cold"), 1.0);
        assert_relative_eq!(col(&frame, 2, "temp_hot"), 0.0);
        assert_relative_eq!(col(&frame, 0, "is_summer"), 1.0);
        assert_relative_eq!(col(&frame, 1, "is_summer"), 0.0);
    }

    #[test]
    fn wind_speed_is_extracted_from_descriptor() {
        assert_eq!(wind_speed(Some("12 mph NE")), Some(12.0));
        assert_eq!(wind_speed(Some("Wind 17 mph, Out To CF")), Some(17.0));
        assert_eq!(wind_speed(Some("calm")), None);
        assert_eq!(wind_speed(None), None);
    }

    #[test]
    fn missing_wind_uses_batch_median() {
        let a = game(None, Some(70.0), Some("20 mph Out To CF"), 4);
        let b = game(None, Some(70.0), Some("30 mph L To R"), 4);
        let calm = game(None, Some(70.0), Some("calm"), 4);
        let missing = game(None, Some(70.0), None, 4);

        assert_relative_eq!(wind_fill(&[&a, &b, &calm, &missing]), 25.0);
        assert_relative_eq!(wind_fill(&[&missing, &calm]), DEFAULT_WIND_SPEED);

        let rates = RateTables::default();
        let lineups = LineupTable::default();
        let venues = VenueVocabulary::default();
        let ctx = FeatureContext {
            rates: &rates,
            lineups: &lineups,
            venues: &venues,
        };
        let frame = build_features(&[&a, &b, &missing, &calm], &ctx);
        assert_relative_eq!(col(&frame, 2, "wind_speed"), 25.0);
        assert_relative_eq!(col(&frame, 3, "wind_speed"), 25.0);
        assert_relative_eq!(col(&frame, 2, "high_wind"), 1.0);

        let lone = build_features(&[&missing], &ctx);
        assert_relative_eq!(col(&lone, 0, "wind_speed"), DEFAULT_WIND_SPEED);
    }

    #[test]
    fn unmatched_entities_get_league_defaults() {
        let rates = RateTables::default();
        let lineups = LineupTable::default();
        let venues = VenueVocabulary::default();
        let ctx = FeatureContext {
            rates: &rates,
            lineups: &lineups,
            venues: &venues,
        };
        let g = game(None, None, None, 5);
        let frame = build_features(&[&g], &ctx);
        assert_relative_eq!(col(&frame, 0, "home_team_off_rate"), 0.45);
        assert_relative_eq!(col(&frame, 0, "away_team_off_rate"), 0.42);
        assert_relative_eq!(col(&frame, 0, "home_pitcher_walk_rate"), 3.0);
        assert_relative_eq!(col(&frame, 0, "away_pitcher_k_rate"), 8.5);
        assert_relative_eq!(col(&frame, 0, "home_weighted_ops"), 0.740);
        assert!(frame.rows[0].iter().all(|v| v.is_finite()));
    }

    #[test]
    fn joined_rates_come_from_the_context() {
        let g = game(Some("Truist Park"), Some(75.0), Some("5 mph"), 6);
        let hist = vec![HistoricalEvent::new("1", g.clone(), 1, 0)];
        let rates = RateTables::from_events(&hist);
        let lineups = LineupTable::from_events(&hist);
        let venues = VenueVocabulary::most_frequent(&[&g]);
        let ctx = FeatureContext {
            rates: &rates,
            lineups: &lineups,
            venues: &venues,
        };
        let frame = build_features(&[&g], &ctx);
        assert_relative_eq!(col(&frame, 0, "home_team_off_rate"), 1.0);
        // Wheeler (away starter) allowed a run in his one start.
        assert_relative_eq!(col(&frame, 0, "away_pitcher_1st_inn_rate"), 1.0);
        assert_relative_eq!(col(&frame, 0, "home_pitcher_1st_inn_rate"), 0.0);
        assert_relative_eq!(col(&frame, 0, "park_Truist_Park"), 1.0);
        assert_relative_eq!(col(&frame, 0, "home_weighted_1st_inn_perf"), 1.0);
    }

    #[test]
    fn venue_vocabulary_is_top_ten_by_frequency() {
        let mut games = Vec::new();
        for i in 0..12 {
            for _ in 0..(i + 1) {
                games.push(game(Some(format!("Park {}", i).as_str()), None, None, 5));
            }
        }
        let refs: Vec<&GameInfo> = games.iter().collect();
        let vocab = VenueVocabulary::most_frequent(&refs);
        assert_eq!(vocab.venues().len(), TOP_VENUES);
        assert_eq!(vocab.venues()[0], "Park 11");
        assert!(!vocab.venues().contains(&"Park 0".to_string()));
        assert!(!vocab.venues().contains(&"Park 1".to_string()));
    }

    #[test]
    fn align_drops_extra_and_zero_fills_missing() {
        let frame = FeatureFrame {
            names: vec!["a".into(), "b".into(), "park_Unseen".into()],
            rows: vec![vec![1.0, 2.0, 1.0]],
        };
        let target = vec!["b".to_string(), "c".to_string(), "a".to_string()];
        let (rows, drift) = align(&frame, &target);
        assert_eq!(rows, vec![vec![2.0, 0.0, 1.0]]);
        assert_eq!(drift.dropped, vec!["park_Unseen".to_string()]);
        assert_eq!(drift.zero_filled, vec!["c".to_string()]);
    }
}
