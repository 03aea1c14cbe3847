//! Standardization plus L2-regularized logistic regression.
//!
//! Fit is full-batch gradient descent on the class-weighted mean log loss, the
//! same decaying-rate scheme used elsewhere for probability fits. Feature
//! counts are small (tens of columns, a few thousand games a season) so there
//! is no need for a second-order solver.
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::calibration::sigmoid;

/// Seed for every shuffled split so reports are reproducible.
pub const SPLIT_SEED: u64 = 42;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Per-column mean and population standard deviation. Constant columns get
    /// scale 1 so they transform to 0 rather than NaN.
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        let n = rows.len().max(1) as f64;
        let mut mean = vec![0.0; width];
        for row in rows {
            for (m, x) in mean.iter_mut().zip(row) {
                *m += x;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0; width];
        for row in rows {
            for ((v, x), m) in var.iter_mut().zip(row).zip(&mean) {
                *v += (x - m).powi(2);
            }
        }
        let scale = var
            .into_iter()
            .map(|v| {
                let sd = (v / n).sqrt();
                if sd > 0.0 && sd.is_finite() {
                    sd
                } else {
                    1.0
                }
            })
            .collect();
        StandardScaler { mean, scale }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    /// Inverse regularization strength.
    pub c: f64,
    pub max_iters: usize,
    pub learning_rate: f64,
    /// Stop once every gradient component is below this.
    pub tolerance: f64,
    /// Weight classes by `n / (2 n_c)`.
    pub balanced: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        FitOptions {
            c: 1.0,
            max_iters: 1000,
            learning_rate: 0.5,
            tolerance: 1e-6,
            balanced: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LogisticRegression {
    /// Fit on already-scaled rows with labels in {0, 1}.
    pub fn fit(rows: &[Vec<f64>], labels: &[f64], opts: &FitOptions) -> Self {
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut model = LogisticRegression {
            coefficients: vec![0.0; width],
            intercept: 0.0,
        };
        if rows.is_empty() {
            return model;
        }

        let n = rows.len() as f64;
        let weights = sample_weights(labels, opts.balanced);
        let l2 = 1.0 / (opts.c * n);

        let mut grad = vec![0.0; width];
        for i in 0..opts.max_iters.max(1) {
            let lr = opts.learning_rate / (1.0 + 0.01 * i as f64);
            grad.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_b = 0.0;
            for ((row, y), w) in rows.iter().zip(labels).zip(&weights) {
                let err = w * (model.predict_proba(row) - y);
                for (g, x) in grad.iter_mut().zip(row) {
                    *g += err * x;
                }
                grad_b += err;
            }
            for (g, c) in grad.iter_mut().zip(&model.coefficients) {
                *g = *g / n + l2 * c;
            }
            grad_b /= n;

            let max_grad = grad.iter().fold(grad_b.abs(), |m, g| m.max(g.abs()));
            if max_grad < opts.tolerance {
                break;
            }
            for (c, g) in model.coefficients.iter_mut().zip(&grad) {
                *c -= lr * g;
            }
            model.intercept -= lr * grad_b;
            if !model.intercept.is_finite() {
                break;
            }
        }
        model
    }

    pub fn decision(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(c, x)| c * x)
                .sum::<f64>()
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.decision(row))
    }
}

fn sample_weights(labels: &[f64], balanced: bool) -> Vec<f64> {
    if !balanced {
        return vec![1.0; labels.len()];
    }
    let n = labels.len() as f64;
    let pos = labels.iter().filter(|y| **y > 0.5).count() as f64;
    let neg = n - pos;
    let w_pos = if pos > 0.0 { n / (2.0 * pos) } else { 0.0 };
    let w_neg = if neg > 0.0 { n / (2.0 * neg) } else { 0.0 };
    labels
        .iter()
        .map(|y| if *y > 0.5 { w_pos } else { w_neg })
        .collect()
}

// ── Evaluation ──────────────────────────────────────────────────

/// Share of correct hard predictions at the 0.5 threshold (0.0–1.0).
pub fn accuracy(probs: &[f64], labels: &[f64]) -> f64 {
    if probs.is_empty() {
        return 0.0;
    }
    let correct = probs
        .iter()
        .zip(labels)
        .filter(|(p, y)| (**p > 0.5) == (**y > 0.5))
        .count();
    correct as f64 / probs.len() as f64
}

/// Area under the ROC curve via the Mann-Whitney rank statistic, with tied
/// scores sharing their average rank. `None` when only one class is present.
pub fn roc_auc(probs: &[f64], labels: &[f64]) -> Option<f64> {
    let n_pos = labels.iter().filter(|y| **y > 0.5).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[a].total_cmp(&probs[b]));

    let mut ranks = vec![0.0; probs.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && probs[order[j + 1]] == probs[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 share their mean
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = avg;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = ranks
        .iter()
        .zip(labels)
        .filter(|(_, y)| **y > 0.5)
        .map(|(r, _)| r)
        .sum();
    let n_pos = n_pos as f64;
    Some((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}

/// Stratified train/test split: each class is shuffled with a seeded RNG and
/// `test_fraction` of it (rounded) goes to the test side. Returns
/// `(train_indices, test_indices)`, each sorted.
pub fn stratified_split(labels: &[f64], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();
    for class in [0.0, 1.0] {
        let mut idx: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, y)| (**y > 0.5) == (class > 0.5))
            .map(|(i, _)| i)
            .collect();
        idx.shuffle(&mut rng);
        let n_test = ((idx.len() as f64) * test_fraction).round() as usize;
        test.extend_from_slice(&idx[..n_test]);
        train.extend_from_slice(&idx[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Unshuffled stratified k-fold assignment: within each class the i-th sample
/// goes to fold `i % k`. Returns the fold number of every sample.
pub fn stratified_folds(labels: &[f64], k: usize) -> Vec<usize> {
    let k = k.max(1);
    let mut seen = [0usize; 2];
    labels
        .iter()
        .map(|y| {
            let c = usize::from(*y > 0.5);
            let fold = seen[c] % k;
            seen[c] += 1;
            fold
        })
        .collect()
}

/// Cross-validated accuracy on scaled rows: `(mean, population std)`.
pub fn cross_val_accuracy(
    rows: &[Vec<f64>],
    labels: &[f64],
    k: usize,
    opts: &FitOptions,
) -> (f64, f64) {
    let k = k.min(rows.len()).max(1);
    let folds = stratified_folds(labels, k);
    let mut scores = Vec::with_capacity(k);
    for fold in 0..k {
        let (mut tr_x, mut tr_y, mut te_x, mut te_y) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
        for ((row, y), f) in rows.iter().zip(labels).zip(&folds) {
            if *f == fold {
                te_x.push(row.clone());
                te_y.push(*y);
            } else {
                tr_x.push(row.clone());
                tr_y.push(*y);
            }
        }
        if te_x.is_empty() || tr_x.is_empty() {
            continue;
        }
        let model = LogisticRegression::fit(&tr_x, &tr_y, opts);
        let probs: Vec<f64> = te_x.iter().map(|r| model.predict_proba(r)).collect();
        scores.push(accuracy(&probs, &te_y));
    }
    if scores.is_empty() {
        return (0.0, 0.0);
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
    (mean, var.sqrt())
}

/// Largest `n` coefficients by magnitude, paired with their column names.
pub fn top_features(names: &[String], coefficients: &[f64], n: usize) -> Vec<(String, f64)> {
    let mut pairs: Vec<(String, f64)> = names.iter().cloned().zip(coefficients.iter().copied()).collect();
    pairs.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
    pairs.truncate(n);
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn scaler_uses_population_std_and_guards_constants() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let s = StandardScaler::fit(&rows);
        assert_relative_eq!(s.mean[0], 2.0);
        assert_relative_eq!(s.scale[0], 1.0);
        assert_relative_eq!(s.scale[1], 1.0);
        assert_eq!(s.transform(&[3.0, 5.0]), vec![1.0, 0.0]);
    }

    #[test]
    fn separable_data_is_learned() {
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64 / 10.0 - 2.0]).collect();
        let labels: Vec<f64> = (0..40).map(|i| if i >= 20 { 1.0 } else { 0.0 }).collect();
        let m = LogisticRegression::fit(&rows, &labels, &FitOptions::default());
        assert!(m.coefficients[0] > 0.0);
        let probs: Vec<f64> = rows.iter().map(|r| m.predict_proba(r)).collect();
        assert!(accuracy(&probs, &labels) >= 0.95);
    }

    #[test]
    fn regularization_shrinks_coefficients() {
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64 / 10.0 - 2.0]).collect();
        let labels: Vec<f64> = (0..40).map(|i| if i >= 20 { 1.0 } else { 0.0 }).collect();
        let loose = LogisticRegression::fit(&rows, &labels, &FitOptions::default());
        let tight = LogisticRegression::fit(
            &rows,
            &labels,
            &FitOptions {
                c: 0.01,
                ..FitOptions::default()
            },
        );
        assert!(tight.coefficients[0].abs() < loose.coefficients[0].abs());
    }

    #[test]
    fn balanced_weights_offset_class_imbalance() {
        // Uninformative feature, 1 positive in 4: balanced intercept stays near 0.
        let rows = vec![vec![0.0]; 4];
        let labels = vec![1.0, 0.0, 0.0, 0.0];
        let m = LogisticRegression::fit(&rows, &labels, &FitOptions::default());
        assert_relative_eq!(m.predict_proba(&[0.0]), 0.5, epsilon = 1e-3);
        let plain = LogisticRegression::fit(
            &rows,
            &labels,
            &FitOptions {
                balanced: false,
                ..FitOptions::default()
            },
        );
        assert!(plain.predict_proba(&[0.0]) < 0.4);
    }

    #[test]
    fn auc_handles_ties_and_degenerate_labels() {
        assert_relative_eq!(roc_auc(&[0.1, 0.4, 0.35, 0.8], &[0.0, 0.0, 1.0, 1.0]).unwrap(), 0.75);
        assert_relative_eq!(roc_auc(&[0.5, 0.5], &[0.0, 1.0]).unwrap(), 0.5);
        assert_eq!(roc_auc(&[0.2, 0.9], &[1.0, 1.0]), None);
    }

    #[test]
    fn stratified_split_preserves_class_ratio_and_is_reproducible() {
        let labels: Vec<f64> = (0..100).map(|i| if i < 45 { 1.0 } else { 0.0 }).collect();
        let (train, test) = stratified_split(&labels, 0.2, SPLIT_SEED);
        assert_eq!(train.len() + test.len(), 100);
        assert_eq!(test.iter().filter(|&&i| labels[i] > 0.5).count(), 9);
        assert_eq!(test.len(), 20);
        assert_eq!(stratified_split(&labels, 0.2, SPLIT_SEED), (train, test));
    }

    #[test]
    fn folds_are_balanced_per_class() {
        let labels = vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        assert_eq!(stratified_folds(&labels, 3), vec![0, 0, 1, 1, 2, 2]);
    }

    #[test]
    fn top_features_sort_by_magnitude() {
        let names: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let top = top_features(&names, &[0.1, -0.9, 0.5], 2);
        assert_eq!(top[0].0, "b");
        assert_eq!(top[1].0, "c");
    }
}
