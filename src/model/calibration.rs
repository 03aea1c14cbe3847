//! Probability scoring and reliability tables.
//!
//! Shared by training (held-out split), the backtest and the bet ledger.
use serde::{Deserialize, Serialize};
use std::fmt;

const EPS: f64 = 1e-6;

/// Bin edges used for model evaluation: `<40%` through `>60%`.
pub const MODEL_BINS: [f64; 7] = [0.0, 0.40, 0.45, 0.50, 0.55, 0.60, 1.0];
/// Coarser bins for the bet ledger, where probabilities below 45% are rare.
pub const LEDGER_BINS: [f64; 6] = [0.0, 0.45, 0.50, 0.55, 0.60, 1.0];

pub fn clamp_prob(p: f64) -> f64 {
    p.clamp(EPS, 1.0 - EPS)
}

pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

pub fn logloss(p: f64, y: f64) -> f64 {
    let p = clamp_prob(p);
    -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
}

/// Mean log loss over `(probability, outcome)` pairs; 0 for an empty slice.
pub fn mean_logloss(samples: &[(f64, f64)]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|(p, y)| logloss(*p, *y)).sum::<f64>() / samples.len() as f64
}

pub fn brier(samples: &[(f64, f64)]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|(p, y)| (p - y).powi(2)).sum::<f64>() / samples.len() as f64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub label: String,
    pub mean_predicted: f64,
    pub mean_actual: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTable {
    /// Only non-empty bins are kept.
    pub bins: Vec<CalibrationBin>,
}

fn pct(x: f64) -> String {
    format!("{}", (x * 100.0).round() as i64)
}

/// Human label for the right-inclusive bin `(lo, hi]`.
fn bin_label(lo: f64, hi: f64) -> String {
    if lo <= 0.0 {
        format!("<{}%", pct(hi))
    } else if hi >= 1.0 {
        format!(">{}%", pct(lo))
    } else {
        format!("{}-{}%", pct(lo), pct(hi))
    }
}

/// Index of the right-inclusive bin holding `p`. The first bin also takes 0.
fn bin_index(edges: &[f64], p: f64) -> Option<usize> {
    if !p.is_finite() {
        return None;
    }
    (0..edges.len() - 1).find(|&i| {
        let (lo, hi) = (edges[i], edges[i + 1]);
        (p > lo || (i == 0 && p >= lo)) && p <= hi
    })
}

impl CalibrationTable {
    /// Bucket `(probability, outcome)` pairs by `edges` (ascending).
    pub fn from_samples(samples: &[(f64, f64)], edges: &[f64]) -> Self {
        if edges.len() < 2 {
            return CalibrationTable::default();
        }
        let mut acc = vec![(0.0f64, 0.0f64, 0usize); edges.len() - 1];
        for (p, y) in samples {
            if let Some(i) = bin_index(edges, *p) {
                acc[i].0 += p;
                acc[i].1 += y;
                acc[i].2 += 1;
            }
        }
        let bins = acc
            .into_iter()
            .enumerate()
            .filter(|(_, (_, _, n))| *n > 0)
            .map(|(i, (sp, sy, n))| CalibrationBin {
                label: bin_label(edges[i], edges[i + 1]),
                mean_predicted: sp / n as f64,
                mean_actual: sy / n as f64,
                count: n,
            })
            .collect();
        CalibrationTable { bins }
    }
}

impl fmt::Display for CalibrationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<10} {:>10} {:>10} {:>6}", "Bin", "Predicted", "Actual", "Count")?;
        for b in &self.bins {
            writeln!(
                f,
                "{:<10} {:>9.1}% {:>9.1}% {:>6}",
                b.label,
                b.mean_predicted * 100.0,
                b.mean_actual * 100.0,
                b.count
            )?;
        }
        Ok(())
    }
}
