use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::data::models::{GameInfo, HistoricalEvent};
use crate::error::ModelError;

use super::aggregator::RateTables;
use super::calibration::{brier, mean_logloss, CalibrationTable, MODEL_BINS};
use super::classifier::{
    accuracy, cross_val_accuracy, roc_auc, stratified_split, top_features, FitOptions,
    LogisticRegression, StandardScaler, SPLIT_SEED,
};
use super::features::{
    align, build_features, build_row, feature_names, FeatureContext, FeatureFrame, WeatherFill,
    VenueVocabulary,
};
use super::lineup::LineupTable;

/// Smallest batch `train` accepts.
pub const MIN_TRAINING_EVENTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum Call {
    #[serde(rename = "YES")]
    Yes,
    #[serde(rename = "NO")]
    No,
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Call::Yes => write!(f, "YES"),
            Call::No => write!(f, "NO"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Distance of `p` from a coin flip: > 0.15 High, > 0.08 Medium.
    pub fn from_probability(p: f64) -> Self {
        let d = (p - 0.5).abs();
        if d > 0.15 {
            Confidence::High
        } else if d > 0.08 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Confidence::High => "High",
            Confidence::Medium => "Medium",
            Confidence::Low => "Low",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Probability of a first-inning run (0.0–1.0)
    pub probability: f64,
    pub call: Call,
    pub confidence: Confidence,
}

impl Prediction {
    pub fn from_probability(probability: f64) -> Self {
        Prediction {
            probability,
            call: if probability > 0.5 { Call::Yes } else { Call::No },
            confidence: Confidence::from_probability(probability),
        }
    }
}

/// Everything needed to score a game, frozen at training time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub classifier: LogisticRegression,
    pub scaler: StandardScaler,
    pub feature_names: Vec<String>,
    pub venues: VenueVocabulary,
    pub rates: RateTables,
    pub lineups: LineupTable,
    pub trained_at: DateTime<Utc>,
    pub training_events: usize,
}

impl TrainedModel {
    /// Feature context backed by the tables snapshotted at training time.
    pub fn context(&self) -> FeatureContext<'_> {
        FeatureContext {
            rates: &self.rates,
            lineups: &self.lineups,
            venues: &self.venues,
        }
    }

    pub fn predict(&self, game: &GameInfo) -> Prediction {
        self.predict_batch(&[game])
            .pop()
            .unwrap_or_else(|| Prediction::from_probability(0.5))
    }

    /// Score a batch with the snapshot tables. Batch matters: missing
    /// temperatures and wind speeds are filled with the batch median.
    pub fn predict_batch(&self, games: &[&GameInfo]) -> Vec<Prediction> {
        self.predict_batch_with(games, &self.context())
    }

    /// Score a batch against caller-supplied rate and lineup tables.
    pub fn predict_batch_with(&self, games: &[&GameInfo], ctx: &FeatureContext) -> Vec<Prediction> {
        self.predict_filled(games, WeatherFill::from_games(games), ctx)
    }

    /// Like [`predict_batch_with`](Self::predict_batch_with) with an explicit
    /// fill for missing weather, for callers that score one batch in
    /// several pieces.
    pub fn predict_filled(
        &self,
        games: &[&GameInfo],
        fill: WeatherFill,
        ctx: &FeatureContext,
    ) -> Vec<Prediction> {
        let frame = FeatureFrame {
            names: feature_names(ctx.venues),
            rows: games.iter().map(|g| build_row(g, &fill, ctx)).collect(),
        };
        let (rows, _) = align(&frame, &self.feature_names);
        rows.iter()
            .map(|r| Prediction::from_probability(self.probability_of_row(r)))
            .collect()
    }

    /// Probability for a row already in `feature_names` order.
    pub fn probability_of_row(&self, row: &[f64]) -> f64 {
        self.classifier.predict_proba(&self.scaler.transform(row))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TrainOptions {
    pub test_fraction: f64,
    pub cv_folds: usize,
    pub seed: u64,
    pub fit: FitOptions,
}

impl Default for TrainOptions {
    fn default() -> Self {
        TrainOptions {
            test_fraction: 0.2,
            cv_folds: 5,
            seed: SPLIT_SEED,
            fit: FitOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub events: usize,
    pub positive_rate: f64,
    pub train_size: usize,
    pub test_size: usize,
    /// Percent, 0–100
    pub train_accuracy: f64,
    /// Percent, 0–100
    pub test_accuracy: f64,
    pub auc: Option<f64>,
    /// Percent, 0–100
    pub cv_accuracy_mean: f64,
    pub cv_accuracy_std: f64,
    pub top_features: Vec<(String, f64)>,
    pub calibration: CalibrationTable,
    pub brier: f64,
    pub logloss: f64,
}

impl fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Training events:  {} ({:.1}% YRFI)", self.events, self.positive_rate * 100.0)?;
        writeln!(f, "Train / test:     {} / {}", self.train_size, self.test_size)?;
        writeln!(f, "Train accuracy:   {:.1}%", self.train_accuracy)?;
        writeln!(f, "Test accuracy:    {:.1}%", self.test_accuracy)?;
        match self.auc {
            Some(auc) => writeln!(f, "Test AUC:         {:.3}", auc)?,
            None => writeln!(f, "Test AUC:         n/a (single-class test split)")?,
        }
        writeln!(
            f,
            "CV accuracy:      {:.1}% (+/- {:.1}%)",
            self.cv_accuracy_mean, self.cv_accuracy_std
        )?;
        writeln!(f, "Brier / logloss:  {:.4} / {:.4}", self.brier, self.logloss)?;
        writeln!(f)?;
        writeln!(f, "Top features:")?;
        for (name, coef) in &self.top_features {
            writeln!(f, "  {:<32} {:>+8.4}", name, coef)?;
        }
        writeln!(f)?;
        writeln!(f, "Held-out calibration:")?;
        write!(f, "{}", self.calibration)
    }
}

/// Fit a model on `events` and evaluate it on a stratified hold-out.
///
/// Rate and lineup tables are aggregated over the whole batch and stored in
/// the model; the returned model is fitted on the train partition only.
pub fn train(
    events: &[HistoricalEvent],
    opts: &TrainOptions,
) -> Result<(TrainedModel, TrainingReport), ModelError> {
    if events.len() < MIN_TRAINING_EVENTS {
        return Err(ModelError::InsufficientData(format!(
            "{} events, need at least {}",
            events.len(),
            MIN_TRAINING_EVENTS
        )));
    }
    let labels: Vec<f64> = events.iter().map(|e| e.label()).collect();
    let positives = labels.iter().filter(|y| **y > 0.5).count();
    if positives == 0 || positives == labels.len() {
        return Err(ModelError::InsufficientData(
            "every event has the same outcome".to_string(),
        ));
    }

    let rates = RateTables::from_events(events);
    let lineups = LineupTable::from_events(events);
    let games: Vec<&GameInfo> = events.iter().map(|e| &e.game).collect();
    let venues = VenueVocabulary::most_frequent(&games);
    info!(
        "Aggregated {} teams, {} pitchers, {} park columns",
        rates.teams.len(),
        rates.pitchers.len(),
        venues.venues().len()
    );

    let frame = build_features(
        &games,
        &FeatureContext {
            rates: &rates,
            lineups: &lineups,
            venues: &venues,
        },
    );

    let (train_idx, test_idx) = stratified_split(&labels, opts.test_fraction, opts.seed);
    let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<f64>) {
        (
            idx.iter().map(|&i| frame.rows[i].clone()).collect(),
            idx.iter().map(|&i| labels[i]).collect(),
        )
    };
    let (train_x, train_y) = pick(&train_idx);
    let (test_x, test_y) = pick(&test_idx);
    debug!("Split {} train / {} test", train_x.len(), test_x.len());

    let scaler = StandardScaler::fit(&train_x);
    let train_scaled = scaler.transform_all(&train_x);
    let test_scaled = scaler.transform_all(&test_x);
    let classifier = LogisticRegression::fit(&train_scaled, &train_y, &opts.fit);

    let train_probs: Vec<f64> = train_scaled.iter().map(|r| classifier.predict_proba(r)).collect();
    let test_probs: Vec<f64> = test_scaled.iter().map(|r| classifier.predict_proba(r)).collect();
    let (cv_mean, cv_std) = cross_val_accuracy(&train_scaled, &train_y, opts.cv_folds, &opts.fit);
    let held_out: Vec<(f64, f64)> = test_probs.iter().copied().zip(test_y.iter().copied()).collect();

    let report = TrainingReport {
        events: events.len(),
        positive_rate: positives as f64 / events.len() as f64,
        train_size: train_x.len(),
        test_size: test_x.len(),
        train_accuracy: accuracy(&train_probs, &train_y) * 100.0,
        test_accuracy: accuracy(&test_probs, &test_y) * 100.0,
        auc: roc_auc(&test_probs, &test_y),
        cv_accuracy_mean: cv_mean * 100.0,
        cv_accuracy_std: cv_std * 100.0,
        top_features: top_features(&frame.names, &classifier.coefficients, 10),
        calibration: CalibrationTable::from_samples(&held_out, &MODEL_BINS),
        brier: brier(&held_out),
        logloss: mean_logloss(&held_out),
    };
    info!(
        "Trained on {} games: test accuracy {:.1}%, AUC {}",
        report.train_size,
        report.test_accuracy,
        report
            .auc
            .map(|a| format!("{:.3}", a))
            .unwrap_or_else(|| "n/a".to_string())
    );

    let model = TrainedModel {
        classifier,
        scaler,
        feature_names: frame.names,
        venues,
        rates,
        lineups,
        trained_at: Utc::now(),
        training_events: events.len(),
    };
    Ok((model, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::season;
    use approx::assert_relative_eq;

    #[test]
    fn hundred_game_season_reports_bounded_metrics() {
        let events = season(100, 45, 7);
        assert_eq!(events.iter().filter(|e| e.run_scored()).count(), 45);
        let (_, report) = train(&events, &TrainOptions::default()).unwrap();
        assert_eq!(report.test_size, 20);
        assert!((0.0..=100.0).contains(&report.test_accuracy));
        assert!((0.0..=100.0).contains(&report.train_accuracy));
        let auc = report.auc.unwrap();
        assert!((0.0..=1.0).contains(&auc));
        assert!(report.top_features.len() <= 10);
        let binned: usize = report.calibration.bins.iter().map(|b| b.count).sum();
        assert_eq!(binned, 20);
    }

    #[test]
    fn model_learns_the_synthetic_signal() {
        let events = season(600, 270, 11);
        let (_, report) = train(&events, &TrainOptions::default()).unwrap();
        assert!(report.test_accuracy > 55.0, "{}", report);
        assert!(report.auc.unwrap() > 0.6);
    }

    #[test]
    fn too_few_or_single_class_batches_are_rejected() {
        let events = season(8, 4, 1);
        assert!(matches!(
            train(&events, &TrainOptions::default()),
            Err(ModelError::InsufficientData(_))
        ));
        let events = season(40, 0, 1);
        assert!(matches!(
            train(&events, &TrainOptions::default()),
            Err(ModelError::InsufficientData(_))
        ));
    }

    #[test]
    fn repeated_prediction_is_identical() {
        let events = season(120, 54, 3);
        let (model, _) = train(&events, &TrainOptions::default()).unwrap();
        let upcoming = events[17].game.clone();

        let ctx = model.context();
        let a = build_features(&[&upcoming], &ctx);
        let b = build_features(&[&upcoming], &ctx);
        assert_eq!(a, b);
        assert_eq!(model.predict(&upcoming), model.predict(&upcoming));
    }

    #[test]
    fn serialized_model_predicts_the_same() {
        let events = season(120, 54, 5);
        let (model, _) = train(&events, &TrainOptions::default()).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let restored: TrainedModel = serde_json::from_str(&json).unwrap();
        for e in events.iter().take(25) {
            assert_relative_eq!(
                model.predict(&e.game).probability,
                restored.predict(&e.game).probability,
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn confidence_and_call_thresholds() {
        assert_eq!(Prediction::from_probability(0.5).call, Call::No);
        assert_eq!(Prediction::from_probability(0.5001).call, Call::Yes);
        assert_eq!(Confidence::from_probability(0.66), Confidence::High);
        assert_eq!(Confidence::from_probability(0.36), Confidence::Medium);
        assert_eq!(Confidence::from_probability(0.58), Confidence::Low);
    }
}
