//! American odds, edge and expected value.
//!
//! A price of `-110` means risking 110 to win 100; `+150` means risking 100
//! to win 150. The implied probability is the break-even win rate at that
//! price, and the edge is the model's probability minus it.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// Standard juice on both sides of a first-inning total.
pub const DEFAULT_ODDS: i32 = -110;
/// Flat stake used when none is given.
pub const DEFAULT_STAKE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct AmericanOdds(i32);

impl AmericanOdds {
    pub fn new(odds: i32) -> Result<Self, ModelError> {
        if odds.unsigned_abs() < 100 {
            return Err(ModelError::InvalidOdds(odds.to_string()));
        }
        Ok(AmericanOdds(odds))
    }

    pub fn value(self) -> i32 {
        self.0
    }

    /// Break-even probability at this price, strictly inside (0, 1).
    pub fn implied_probability(self) -> f64 {
        let o = self.0 as f64;
        if o < 0.0 {
            o.abs() / (o.abs() + 100.0)
        } else {
            100.0 / (o + 100.0)
        }
    }

    /// Profit on a winning bet of `stake`, excluding the stake itself.
    pub fn win_amount(self, stake: f64) -> f64 {
        let o = self.0 as f64;
        if o < 0.0 {
            stake * 100.0 / o.abs()
        } else {
            stake * o / 100.0
        }
    }
}

impl Default for AmericanOdds {
    fn default() -> Self {
        AmericanOdds(DEFAULT_ODDS)
    }
}

impl TryFrom<i32> for AmericanOdds {
    type Error = ModelError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        AmericanOdds::new(value)
    }
}

impl From<AmericanOdds> for i32 {
    fn from(o: AmericanOdds) -> i32 {
        o.0
    }
}

impl FromStr for AmericanOdds {
    type Err = ModelError;

    /// Accepts `-110`, `+150` and `150`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let digits = t.strip_prefix('+').unwrap_or(t);
        digits
            .parse::<i32>()
            .map_err(|_| ModelError::InvalidOdds(s.to_string()))
            .and_then(AmericanOdds::new)
            .map_err(|_| ModelError::InvalidOdds(s.to_string()))
    }
}

impl fmt::Display for AmericanOdds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 > 0 {
            write!(f, "+{}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeTier {
    Excellent,
    Great,
    Good,
    Fair,
    Marginal,
    Negative,
}

impl EdgeTier {
    /// Best to worst.
    pub const ALL: [EdgeTier; 6] = [
        EdgeTier::Excellent,
        EdgeTier::Great,
        EdgeTier::Good,
        EdgeTier::Fair,
        EdgeTier::Marginal,
        EdgeTier::Negative,
    ];

    /// Tier for an edge in percentage points. Lower bounds are inclusive;
    /// NaN lands in `Negative`.
    pub fn from_edge_pct(edge_pct: f64) -> Self {
        if edge_pct >= 10.0 {
            EdgeTier::Excellent
        } else if edge_pct >= 7.0 {
            EdgeTier::Great
        } else if edge_pct >= 5.0 {
            EdgeTier::Good
        } else if edge_pct >= 3.0 {
            EdgeTier::Fair
        } else if edge_pct >= 0.0 {
            EdgeTier::Marginal
        } else {
            EdgeTier::Negative
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EdgeTier::Excellent => "Excellent (10%+)",
            EdgeTier::Great => "Great (7-10%)",
            EdgeTier::Good => "Good (5-7%)",
            EdgeTier::Fair => "Fair (3-5%)",
            EdgeTier::Marginal => "Marginal (0-3%)",
            EdgeTier::Negative => "Negative Edge",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        EdgeTier::ALL.into_iter().find(|t| t.label() == label)
    }

    /// Short marker for recommendation listings.
    pub fn badge(self) -> &'static str {
        match self {
            EdgeTier::Excellent => "⭐⭐⭐ EXCELLENT",
            EdgeTier::Great => "⭐⭐ GREAT",
            EdgeTier::Good => "⭐ GOOD",
            EdgeTier::Fair => "✓ FAIR",
            EdgeTier::Marginal => "• MARGINAL",
            EdgeTier::Negative => "✗ NO VALUE",
        }
    }
}

impl fmt::Display for EdgeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Model probability priced against a sportsbook line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeResult {
    pub model_probability: f64,
    pub odds: AmericanOdds,
    pub implied_probability: f64,
    /// `model_probability - implied_probability`
    pub edge: f64,
    pub edge_pct: f64,
    pub stake: f64,
    pub win_amount: f64,
    /// Expected profit in stake currency
    pub expected_value: f64,
    pub ev_pct: f64,
    pub tier: EdgeTier,
}

impl EdgeResult {
    pub fn evaluate(model_probability: f64, odds: AmericanOdds, stake: f64) -> Self {
        let implied = odds.implied_probability();
        let edge = model_probability - implied;
        let win_amount = odds.win_amount(stake);
        let expected_value = model_probability * win_amount - (1.0 - model_probability) * stake;
        let ev_pct = if stake > 0.0 {
            expected_value / stake * 100.0
        } else {
            0.0
        };
        EdgeResult {
            model_probability,
            odds,
            implied_probability: implied,
            edge,
            edge_pct: edge * 100.0,
            stake,
            win_amount,
            expected_value,
            ev_pct,
            tier: EdgeTier::from_edge_pct(edge * 100.0),
        }
    }

    /// Strictly above `min_edge` (a fraction, e.g. 0.03).
    pub fn is_value(&self, min_edge: f64) -> bool {
        self.edge > min_edge
    }
}
