//! Season replay with flat-stake YRFI bets.
//!
//! Scoring ([`season_probabilities`]) and the bet simulation ([`simulate`])
//! are separate steps; `simulate` only needs one probability per game, so any
//! probability source can be replayed through it.
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::data::models::{GameInfo, HistoricalEvent};
use crate::model::aggregator::RateTables;
use crate::model::calibration::{CalibrationTable, MODEL_BINS};
use crate::model::features::{FeatureContext, WeatherFill};
use crate::model::lineup::LineupTable;
use crate::model::TrainedModel;

use super::odds::{AmericanOdds, EdgeResult, EdgeTier, DEFAULT_STAKE};

/// Minimum bets for a venue to appear in the venue breakdown.
const MIN_VENUE_BETS: usize = 5;
const TOP_VENUE_ROWS: usize = 5;

/// Where team, pitcher and lineup rates come from while replaying a season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceWindow {
    /// Aggregate over the season being replayed, outcomes included. Leaks the
    /// result of every game into its own features.
    SameSeason,
    /// The tables stored in the model at training time.
    TrainingSnapshot,
    /// For each game, only season games dated strictly before it.
    Trailing,
}

impl fmt::Display for ReferenceWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReferenceWindow::SameSeason => "same-season",
            ReferenceWindow::TrainingSnapshot => "training-snapshot",
            ReferenceWindow::Trailing => "trailing",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BetSettings {
    /// Price assumed for every YES bet
    pub odds: AmericanOdds,
    pub stake: f64,
    /// Bet only when edge is strictly above this fraction
    pub min_edge: f64,
}

impl Default for BetSettings {
    fn default() -> Self {
        BetSettings {
            odds: AmericanOdds::default(),
            stake: DEFAULT_STAKE,
            min_edge: 0.05,
        }
    }
}

/// One replayed game; column order is the results file layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestRow {
    pub game_id: String,
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub venue: Option<String>,
    pub temperature: Option<f64>,
    pub predicted_prob: f64,
    pub predicted: u8,
    pub actual: u8,
    pub correct: bool,
    pub implied_prob: f64,
    pub edge: f64,
    pub edge_pct: f64,
    pub edge_tier: String,
    pub would_bet: bool,
    pub bet_won: bool,
    pub bet_lost: bool,
    pub profit: f64,
}

/// Bets, wins and profit for one slice of the value bets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub label: String,
    pub bets: usize,
    pub wins: usize,
    pub edge_pct_sum: f64,
    pub profit: f64,
}

impl GroupStats {
    fn new(label: impl Into<String>) -> Self {
        GroupStats {
            label: label.into(),
            bets: 0,
            wins: 0,
            edge_pct_sum: 0.0,
            profit: 0.0,
        }
    }

    fn add(&mut self, row: &BacktestRow) {
        self.bets += 1;
        self.wins += usize::from(row.bet_won);
        self.edge_pct_sum += row.edge_pct;
        self.profit += row.profit;
    }

    pub fn win_pct(&self) -> f64 {
        ratio_pct(self.wins as f64, self.bets as f64)
    }

    pub fn avg_edge_pct(&self) -> f64 {
        if self.bets == 0 {
            0.0
        } else {
            self.edge_pct_sum / self.bets as f64
        }
    }

    pub fn roi_pct(&self, stake: f64) -> f64 {
        ratio_pct(self.profit, self.bets as f64 * stake)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BettingSummary {
    pub bets: usize,
    pub wins: usize,
    pub losses: usize,
    /// Percent
    pub win_rate: f64,
    pub avg_edge_pct: f64,
    pub staked: f64,
    pub profit: f64,
    /// Percent of amount staked
    pub roi: f64,
    /// Percent; the implied probability of the price
    pub break_even_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub settings_odds: AmericanOdds,
    pub stake: f64,
    pub min_edge: f64,
    pub games: usize,
    pub correct: usize,
    /// Percent
    pub accuracy: f64,
    pub predicted_yes: usize,
    pub predicted_yes_correct: usize,
    pub predicted_no: usize,
    pub predicted_no_correct: usize,
    /// Percent of games with a first-inning run
    pub baseline_yes_rate: f64,
    pub calibration: CalibrationTable,
    pub betting: Option<BettingSummary>,
    pub tiers: Vec<GroupStats>,
    pub temperature: Vec<GroupStats>,
    pub venues: Vec<GroupStats>,
    pub months: Vec<GroupStats>,
    #[serde(skip)]
    pub rows: Vec<BacktestRow>,
}

fn ratio_pct(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den * 100.0
    } else {
        0.0
    }
}

/// Right-inclusive temperature bands (°F) for the conditions breakdown.
const TEMPERATURE_BANDS: [(f64, f64, &str); 4] = [
    (0.0, 60.0, "Cold (<60)"),
    (60.0, 70.0, "Cool (60-70)"),
    (70.0, 80.0, "Warm (70-80)"),
    (80.0, 120.0, "Hot (>80)"),
];

fn temperature_band_index(temp: f64) -> Option<usize> {
    TEMPERATURE_BANDS
        .iter()
        .position(|(lo, hi, _)| temp > *lo && temp <= *hi)
}

pub fn temperature_band(temp: f64) -> Option<&'static str> {
    temperature_band_index(temp).map(|i| TEMPERATURE_BANDS[i].2)
}

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Replay `events` against one probability each and settle flat-stake YES bets.
pub fn simulate(events: &[HistoricalEvent], probabilities: &[f64], settings: &BetSettings) -> BacktestReport {
    let rows: Vec<BacktestRow> = events
        .iter()
        .zip(probabilities)
        .map(|(ev, &p)| {
            let priced = EdgeResult::evaluate(p, settings.odds, settings.stake);
            let predicted = u8::from(p > 0.5);
            let actual = u8::from(ev.run_scored());
            let would_bet = priced.is_value(settings.min_edge);
            let bet_won = would_bet && actual == 1;
            let bet_lost = would_bet && actual == 0;
            let profit = if bet_won {
                priced.win_amount
            } else if bet_lost {
                -settings.stake
            } else {
                0.0
            };
            BacktestRow {
                game_id: ev.game_id.clone(),
                date: ev.game.date,
                home_team: ev.game.home_team.clone(),
                away_team: ev.game.away_team.clone(),
                venue: ev.game.venue.clone(),
                temperature: ev.game.temperature,
                predicted_prob: p,
                predicted,
                actual,
                correct: predicted == actual,
                implied_prob: priced.implied_probability,
                edge: priced.edge,
                edge_pct: priced.edge_pct,
                edge_tier: priced.tier.label().to_string(),
                would_bet,
                bet_won,
                bet_lost,
                profit,
            }
        })
        .collect();

    let games = rows.len();
    let correct = rows.iter().filter(|r| r.correct).count();
    let count = |pred: u8, hit: bool| {
        rows.iter()
            .filter(|r| r.predicted == pred && (!hit || r.correct))
            .count()
    };
    let samples: Vec<(f64, f64)> = rows
        .iter()
        .map(|r| (r.predicted_prob, f64::from(r.actual)))
        .collect();

    let bets: Vec<&BacktestRow> = rows.iter().filter(|r| r.would_bet).collect();
    let betting = (!bets.is_empty()).then(|| {
        let wins = bets.iter().filter(|r| r.bet_won).count();
        let staked = bets.len() as f64 * settings.stake;
        let profit: f64 = bets.iter().map(|r| r.profit).sum();
        BettingSummary {
            bets: bets.len(),
            wins,
            losses: bets.iter().filter(|r| r.bet_lost).count(),
            win_rate: ratio_pct(wins as f64, bets.len() as f64),
            avg_edge_pct: bets.iter().map(|r| r.edge_pct).sum::<f64>() / bets.len() as f64,
            staked,
            profit,
            roi: ratio_pct(profit, staked),
            break_even_rate: settings.odds.implied_probability() * 100.0,
        }
    });

    let mut tiers: BTreeMap<EdgeTier, GroupStats> = BTreeMap::new();
    let mut temps: BTreeMap<usize, GroupStats> = BTreeMap::new();
    let mut venues: BTreeMap<&str, GroupStats> = BTreeMap::new();
    let mut months: BTreeMap<u32, GroupStats> = BTreeMap::new();
    for r in &bets {
        let tier = EdgeTier::from_label(&r.edge_tier).unwrap_or(EdgeTier::Negative);
        tiers.entry(tier).or_insert_with(|| GroupStats::new(tier.label())).add(r);
        if let Some(band) = r.temperature.and_then(temperature_band_index) {
            temps
                .entry(band)
                .or_insert_with(|| GroupStats::new(TEMPERATURE_BANDS[band].2))
                .add(r);
        }
        if let Some(v) = r.venue.as_deref() {
            venues.entry(v).or_insert_with(|| GroupStats::new(v)).add(r);
        }
        let m = r.date.month();
        months
            .entry(m)
            .or_insert_with(|| GroupStats::new(MONTHS[(m as usize - 1) % 12]))
            .add(r);
    }

    let mut venues: Vec<GroupStats> = venues
        .into_values()
        .filter(|g| g.bets >= MIN_VENUE_BETS)
        .collect();
    venues.sort_by(|a, b| b.win_pct().total_cmp(&a.win_pct()));
    venues.truncate(TOP_VENUE_ROWS);

    BacktestReport {
        settings_odds: settings.odds,
        stake: settings.stake,
        min_edge: settings.min_edge,
        games,
        correct,
        accuracy: ratio_pct(correct as f64, games as f64),
        predicted_yes: count(1, false),
        predicted_yes_correct: count(1, true),
        predicted_no: count(0, false),
        predicted_no_correct: count(0, true),
        baseline_yes_rate: ratio_pct(
            rows.iter().filter(|r| r.actual == 1).count() as f64,
            games as f64,
        ),
        calibration: CalibrationTable::from_samples(&samples, &MODEL_BINS),
        betting,
        tiers: tiers.into_values().collect(),
        temperature: temps.into_values().collect(),
        venues,
        months: months.into_values().collect(),
        rows,
    }
}

/// Index of the first game dated on or after `date` in a date-sorted slice.
fn first_on_or_after(sorted: &[&HistoricalEvent], date: NaiveDate) -> usize {
    sorted.partition_point(|e| e.game.date < date)
}

/// Model probability for every event, in input order, with rates taken from
/// `window`.
pub fn season_probabilities(
    model: &TrainedModel,
    events: &[HistoricalEvent],
    window: ReferenceWindow,
) -> Vec<f64> {
    let games: Vec<&GameInfo> = events.iter().map(|e| &e.game).collect();
    let fill = WeatherFill::from_games(&games);
    let to_probs = |preds: Vec<crate::model::Prediction>| -> Vec<f64> {
        preds.into_iter().map(|p| p.probability).collect()
    };

    match window {
        ReferenceWindow::TrainingSnapshot => to_probs(model.predict_filled(&games, fill, &model.context())),
        ReferenceWindow::SameSeason => {
            warn!(
                "Reference window same-season: rates include the outcomes being predicted; \
                 accuracy and ROI are optimistic"
            );
            let rates = RateTables::from_events(events);
            let lineups = LineupTable::from_events(events);
            let ctx = FeatureContext {
                rates: &rates,
                lineups: &lineups,
                venues: &model.venues,
            };
            to_probs(model.predict_filled(&games, fill, &ctx))
        }
        ReferenceWindow::Trailing => {
            let mut sorted: Vec<&HistoricalEvent> = events.iter().collect();
            sorted.sort_by_key(|e| e.game.date);

            let mut by_date: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
            for (i, e) in events.iter().enumerate() {
                by_date.entry(e.game.date).or_default().push(i);
            }

            let mut probs = vec![0.0; events.len()];
            for (date, idx) in by_date {
                let prior = &sorted[..first_on_or_after(&sorted, date)];
                let rates = RateTables::from_events(prior.iter().copied());
                let lineups = LineupTable::from_events(prior.iter().copied());
                let ctx = FeatureContext {
                    rates: &rates,
                    lineups: &lineups,
                    venues: &model.venues,
                };
                let day: Vec<&GameInfo> = idx.iter().map(|&i| games[i]).collect();
                for (i, p) in idx.iter().zip(model.predict_filled(&day, fill, &ctx)) {
                    probs[*i] = p.probability;
                }
            }
            probs
        }
    }
}

pub fn run_backtest(
    model: &TrainedModel,
    events: &[HistoricalEvent],
    window: ReferenceWindow,
    settings: &BetSettings,
) -> BacktestReport {
    info!(
        "Backtesting {} games at {} (window: {}, min edge {:.1}%)",
        events.len(),
        settings.odds,
        window,
        settings.min_edge * 100.0
    );
    let probs = season_probabilities(model, events, window);
    simulate(events, &probs, settings)
}

/// `season.csv` → `season_backtest_results.csv`, next to the input.
pub fn results_path(input: &Path) -> PathBuf {
    let raw = input.to_string_lossy();
    let stem = raw.strip_suffix(".csv").unwrap_or(raw.as_ref());
    PathBuf::from(format!("{}_backtest_results.csv", stem))
}

pub fn write_results(path: &Path, rows: &[BacktestRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        wtr.serialize(row)
            .with_context(|| format!("Failed to write row for game {}", row.game_id))?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    info!("Wrote {} backtest rows to {}", rows.len(), path.display());
    Ok(())
}

// ── Report output ───────────────────────────────────────────────

fn rule(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "{}", "=".repeat(70))?;
    writeln!(f, "{}", title)?;
    writeln!(f, "{}", "=".repeat(70))
}

fn group_table(f: &mut fmt::Formatter<'_>, groups: &[GroupStats], stake: f64, with_edge: bool) -> fmt::Result {
    if with_edge {
        writeln!(
            f,
            "{:<20} {:>5} {:>5} {:>9} {:>10} {:>7} {:>7}",
            "", "Bets", "Wins", "Avg Edge", "Profit", "Win %", "ROI %"
        )?;
    } else {
        writeln!(f, "{:<20} {:>5} {:>5} {:>10} {:>7}", "", "Bets", "Wins", "Profit", "Win %")?;
    }
    for g in groups {
        if with_edge {
            writeln!(
                f,
                "{:<20} {:>5} {:>5} {:>+8.2}% {:>+10.2} {:>7.1} {:>7.1}",
                g.label,
                g.bets,
                g.wins,
                g.avg_edge_pct(),
                g.profit,
                g.win_pct(),
                g.roi_pct(stake)
            )?;
        } else {
            writeln!(
                f,
                "{:<20} {:>5} {:>5} {:>+10.2} {:>7.1}",
                g.label,
                g.bets,
                g.wins,
                g.profit,
                g.win_pct()
            )?;
        }
    }
    Ok(())
}

impl fmt::Display for BacktestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        rule(f, "OVERALL MODEL PERFORMANCE")?;
        writeln!(f, "Total Games: {}", self.games)?;
        writeln!(f, "Overall Accuracy: {:.2}%", self.accuracy)?;
        writeln!(
            f,
            "Predicted YES: {} games ({:.1}% correct)",
            self.predicted_yes,
            ratio_pct(self.predicted_yes_correct as f64, self.predicted_yes as f64)
        )?;
        writeln!(
            f,
            "Predicted NO: {} games ({:.1}% correct)",
            self.predicted_no,
            ratio_pct(self.predicted_no_correct as f64, self.predicted_no as f64)
        )?;
        writeln!(f, "Baseline (actual YES rate): {:.1}%", self.baseline_yes_rate)?;
        writeln!(
            f,
            "Model improvement: {:+.2} percentage points over random",
            self.accuracy - 50.0
        )?;

        rule(f, "MODEL CALIBRATION")?;
        write!(f, "{}", self.calibration)?;

        rule(
            f,
            &format!("BETTING PERFORMANCE ({:.0}%+ EDGE THRESHOLD)", self.min_edge * 100.0),
        )?;
        match &self.betting {
            None => writeln!(f, "No bets met the edge threshold")?,
            Some(b) => {
                writeln!(f, "Value Bets Identified: {}", b.bets)?;
                writeln!(f, "Record: {}W - {}L", b.wins, b.losses)?;
                writeln!(f, "Win Rate: {:.2}%", b.win_rate)?;
                writeln!(f, "Average Edge: {:+.2}%", b.avg_edge_pct)?;
                writeln!(f, "Total Staked: ${:.2}", b.staked)?;
                writeln!(f, "Total Profit: ${:+.2}", b.profit)?;
                writeln!(f, "ROI: {:+.2}%", b.roi)?;
                writeln!(
                    f,
                    "Break-even win rate ({} odds): {:.1}%",
                    self.settings_odds, b.break_even_rate
                )?;
                let margin = b.win_rate - b.break_even_rate;
                if margin > 0.0 {
                    writeln!(f, "PROFITABLE ({:+.2} percentage points above break-even)", margin)?;
                } else {
                    writeln!(f, "Not profitable ({:+.2} percentage points vs break-even)", margin)?;
                }
            }
        }

        rule(f, "PERFORMANCE BY EDGE TIER")?;
        group_table(f, &self.tiers, self.stake, true)?;

        rule(f, "BEST PERFORMING CONDITIONS")?;
        if !self.temperature.is_empty() {
            writeln!(f, "By Temperature:")?;
            group_table(f, &self.temperature, self.stake, false)?;
        }
        if !self.venues.is_empty() {
            writeln!(f, "\nTop {} Venues (min {} bets):", TOP_VENUE_ROWS, MIN_VENUE_BETS)?;
            group_table(f, &self.venues, self.stake, false)?;
        }
        if !self.months.is_empty() {
            writeln!(f, "\nBy Month:")?;
            group_table(f, &self.months, self.stake, false)?;
        }
        Ok(())
    }
}
