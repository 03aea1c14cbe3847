//! Daily slate: predictions for upcoming games priced against sportsbook
//! YRFI/NRFI lines.
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::data::models::{GameInfo, ProspectiveEvent};
use crate::error::ModelError;
use crate::model::predictor::Call;
use crate::model::store::write_atomic;
use crate::model::{Prediction, TrainedModel};

use super::odds::{AmericanOdds, EdgeResult, DEFAULT_STAKE};

/// Lines for one game. A side with an unusable price is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OddsQuote {
    pub yrfi: Option<AmericanOdds>,
    pub nrfi: Option<AmericanOdds>,
}

#[derive(Debug, Deserialize)]
struct RawQuote {
    #[serde(default)]
    yrfi_odds: Option<serde_json::Value>,
    #[serde(default)]
    nrfi_odds: Option<serde_json::Value>,
}

fn odds_from_json(value: &serde_json::Value) -> Result<AmericanOdds, ModelError> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| ModelError::InvalidOdds(n.to_string()))
            .and_then(AmericanOdds::new),
        serde_json::Value::String(s) => s.parse(),
        other => Err(ModelError::InvalidOdds(other.to_string())),
    }
}

/// Sportsbook lines keyed by game label ("Away @ Home").
#[derive(Debug, Clone, Default)]
pub struct OddsTable {
    quotes: HashMap<String, OddsQuote>,
}

impl OddsTable {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read odds file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Failed to parse odds file {}", path.display()))
    }

    /// Prices may be integers or strings like "+120". Bad prices are logged
    /// and dropped for that side only.
    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed: HashMap<String, RawQuote> = serde_json::from_str(raw)?;
        let mut quotes = HashMap::with_capacity(parsed.len());
        for (label, q) in parsed {
            let side = |v: &Option<serde_json::Value>, name: &str| match v.as_ref().map(odds_from_json) {
                Some(Ok(o)) => Some(o),
                Some(Err(e)) => {
                    warn!("{}: ignoring {} line: {}", label, name, e);
                    None
                }
                None => None,
            };
            let quote = OddsQuote {
                yrfi: side(&q.yrfi_odds, "YRFI"),
                nrfi: side(&q.nrfi_odds, "NRFI"),
            };
            quotes.insert(label, quote);
        }
        Ok(OddsTable { quotes })
    }

    pub fn insert(&mut self, label: impl Into<String>, quote: OddsQuote) {
        self.quotes.insert(label.into(), quote);
    }

    pub fn get(&self, label: &str) -> Option<&OddsQuote> {
        self.quotes.get(label)
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

/// The better-priced side of a game.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pick {
    pub selection: Call,
    #[serde(flatten)]
    pub edge: EdgeResult,
    pub is_value_bet: bool,
    pub badge: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub game_id: String,
    pub label: String,
    #[serde(flatten)]
    pub game: GameInfo,
    pub game_time: Option<String>,
    #[serde(flatten)]
    pub prediction: Prediction,
    pub yrfi: Option<EdgeResult>,
    pub nrfi: Option<EdgeResult>,
    pub pick: Option<Pick>,
}

impl Recommendation {
    pub fn has_odds(&self) -> bool {
        self.pick.is_some()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LiveSettings {
    /// A pick is a value bet when its edge is strictly above this fraction
    pub min_edge: f64,
    pub stake: f64,
}

impl Default for LiveSettings {
    fn default() -> Self {
        LiveSettings {
            min_edge: 0.03,
            stake: DEFAULT_STAKE,
        }
    }
}

fn pick_side(yrfi: Option<EdgeResult>, nrfi: Option<EdgeResult>, min_edge: f64) -> Option<Pick> {
    let best = match (yrfi, nrfi) {
        (Some(y), Some(n)) if n.edge > y.edge => (Call::No, n),
        (Some(y), _) => (Call::Yes, y),
        (None, Some(n)) => (Call::No, n),
        (None, None) => return None,
    };
    Some(Pick {
        selection: best.0,
        edge: best.1,
        is_value_bet: best.1.is_value(min_edge),
        badge: best.1.tier.badge(),
    })
}

/// Score `games` and price each against `odds`. Games with a usable line come
/// first, best edge first; the rest keep their input order.
pub fn recommend(
    model: &TrainedModel,
    games: &[ProspectiveEvent],
    odds: &OddsTable,
    settings: &LiveSettings,
) -> Vec<Recommendation> {
    let infos: Vec<&GameInfo> = games.iter().map(|g| &g.game).collect();
    let predictions = model.predict_batch(&infos);

    let mut recs: Vec<Recommendation> = games
        .iter()
        .zip(predictions)
        .map(|(g, prediction)| {
            let label = g.game.label();
            let quote = odds.get(&label).copied().unwrap_or_default();
            let p = prediction.probability;
            let yrfi = quote.yrfi.map(|o| EdgeResult::evaluate(p, o, settings.stake));
            let nrfi = quote.nrfi.map(|o| EdgeResult::evaluate(1.0 - p, o, settings.stake));
            Recommendation {
                game_id: g.game_id.clone(),
                label,
                game: g.game.clone(),
                game_time: g.game_time.clone(),
                prediction,
                yrfi,
                nrfi,
                pick: pick_side(yrfi, nrfi, settings.min_edge),
            }
        })
        .collect();

    let edge_of = |r: &Recommendation| r.pick.map(|p| p.edge.edge);
    recs.sort_by(|a, b| match (edge_of(a), edge_of(b)) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let value = recs
        .iter()
        .filter(|r| r.pick.map(|p| p.is_value_bet).unwrap_or(false))
        .count();
    info!(
        "{} games scored, {} with odds, {} value bets",
        recs.len(),
        recs.iter().filter(|r| r.has_odds()).count(),
        value
    );
    recs
}

pub fn predictions_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("predictions_{}.json", date.format("%Y-%m-%d")))
}

pub fn save_recommendations(dir: &Path, date: NaiveDate, recs: &[Recommendation]) -> Result<PathBuf> {
    let path = predictions_path(dir, date);
    let json = serde_json::to_vec_pretty(recs).context("Failed to serialize predictions")?;
    write_atomic(&path, &json)?;
    info!("Saved {} predictions to {}", recs.len(), path.display());
    Ok(path)
}

/// Console rendering of a slate.
pub struct Slate<'a>(pub &'a [Recommendation]);

impl fmt::Display for Slate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(70);
        writeln!(f, "{}", "=".repeat(70))?;
        writeln!(f, "PREDICTIONS SORTED BY VALUE/EDGE")?;
        writeln!(f, "{}", "=".repeat(70))?;

        let (priced, unpriced): (Vec<&Recommendation>, Vec<&Recommendation>) =
            self.0.iter().partition(|r| r.has_odds());

        if !priced.is_empty() {
            writeln!(f, "\nGAMES WITH ODDS (SORTED BY BEST VALUE):")?;
            writeln!(f, "{}", rule)?;
        }
        for (i, r) in priced.iter().enumerate() {
            let Some(pick) = r.pick else { continue };
            let g = &r.game;
            writeln!(f, "\n#{} - {}", i + 1, r.label)?;
            writeln!(
                f,
                "   Time: {} | Venue: {}",
                r.game_time.as_deref().unwrap_or("TBD"),
                g.venue.as_deref().unwrap_or("Unknown")
            )?;
            writeln!(f, "   Pitchers: {} vs {}", g.away_pitcher, g.home_pitcher)?;
            match g.temperature {
                Some(t) => writeln!(f, "   Weather: {:.0}°F, {}", t, g.wind.as_deref().unwrap_or("n/a"))?,
                None => writeln!(f, "   Weather: n/a")?,
            }
            writeln!(
                f,
                "   MODEL: {:.1}% chance of 1st inning run ({} confidence)",
                r.prediction.probability * 100.0,
                r.prediction.confidence
            )?;
            writeln!(
                f,
                "   {}: {} (implies {:.1}%)",
                pick.selection,
                pick.edge.odds,
                pick.edge.implied_probability * 100.0
            )?;
            writeln!(f, "   EDGE: {:+.1}% | {}", pick.edge.edge_pct, pick.badge)?;
            if pick.is_value_bet {
                writeln!(
                    f,
                    "   EV: ${:+.2} per ${:.0} bet ({:+.1}% ROI)",
                    pick.edge.expected_value, pick.edge.stake, pick.edge.ev_pct
                )?;
                writeln!(f, "   RECOMMENDATION: BET {} - {}", pick.selection, pick.badge)?;
            } else {
                writeln!(f, "   RECOMMENDATION: SKIP (insufficient edge)")?;
            }
            writeln!(f, "{}", rule)?;
        }

        if !unpriced.is_empty() {
            writeln!(f, "\nGAMES WITHOUT ODDS:")?;
            writeln!(f, "{}", rule)?;
        }
        for r in unpriced {
            writeln!(f, "\n{}", r.label)?;
            writeln!(
                f,
                "   MODEL: {:.1}% chance of 1st inning run",
                r.prediction.probability * 100.0
            )?;
            writeln!(f, "   Confidence: {}", r.prediction.confidence)?;
            writeln!(f, "{}", rule)?;
        }
        Ok(())
    }
}
