use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PipelineError;
use crate::features::FeatureVector;
use crate::models::{ClassifierMetrics, LabeledExample};
use crate::trees::{BoostingParams, ForestParams, GradientBoosting, RandomForest};

pub const MIN_TRAINING_EXAMPLES: usize = 10;
pub const MIN_EXAMPLES_PER_CLASS: usize = 2;
pub const TEST_FRACTION: f64 = 0.2;
const SPLIT_SEED: u64 = 42;

/// Zero-mean, unit-variance scaling. Constant columns keep a scale of 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        let n = rows.len().max(1) as f64;
        let mut means = vec![0.0; width];
        let mut scales = vec![1.0; width];

        for column in 0..width {
            let mean = rows.iter().map(|row| row[column]).sum::<f64>() / n;
            let variance = rows.iter().map(|row| (row[column] - mean).powi(2)).sum::<f64>() / n;
            means[column] = mean;
            let std = variance.sqrt();
            if std > f64::EPSILON {
                scales[column] = std;
            }
        }

        Self { means, scales }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(value, (mean, scale))| (value - mean) / scale)
            .collect()
    }
}

/// Split indices into (train, test), preserving class proportions. Every
/// class with at least two members lands in both halves.
pub fn stratified_split(labels: &[bool], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in [false, true] {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|&(_, &label)| label == class)
            .map(|(i, _)| i)
            .collect();
        members.shuffle(&mut rng);

        let n_test = if members.len() < 2 {
            0
        } else {
            ((members.len() as f64 * test_fraction).round() as usize).clamp(1, members.len() - 1)
        };
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Area under the ROC curve via the rank-sum statistic, ties averaged.
/// `None` when either class is missing.
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> Option<f64> {
    let positives = labels.iter().filter(|&&l| l).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[a]
            .partial_cmp(&scores[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; scores.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
            end += 1;
        }
        let average_rank = (start + end) as f64 / 2.0 + 1.0;
        for &i in &order[start..=end] {
            ranks[i] = average_rank;
        }
        start = end + 1;
    }

    let positive_rank_sum: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|&(&label, _)| label)
        .map(|(_, rank)| rank)
        .sum();
    let p = positives as f64;
    let u = positive_rank_sum - p * (p + 1.0) / 2.0;
    Some(u / (p * negatives as f64))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEnsemble {
    scaler: StandardScaler,
    forest: RandomForest,
    boosting: GradientBoosting,
}

impl RiskEnsemble {
    pub fn train(examples: &[LabeledExample]) -> Result<(Self, ClassifierMetrics), PipelineError> {
        let positives = examples.iter().filter(|e| e.label).count();
        let negatives = examples.len() - positives;

        if examples.len() < MIN_TRAINING_EXAMPLES {
            return Err(PipelineError::insufficient(
                "classifier training",
                MIN_TRAINING_EXAMPLES,
                examples.len(),
            ));
        }
        if positives.min(negatives) < MIN_EXAMPLES_PER_CLASS {
            return Err(PipelineError::insufficient(
                "classifier training (per class)",
                MIN_EXAMPLES_PER_CLASS,
                positives.min(negatives),
            ));
        }

        info!(
            examples = examples.len(),
            positives, negatives, "training burnout classifier ensemble"
        );

        let labels: Vec<bool> = examples.iter().map(|e| e.label).collect();
        let (train_idx, test_idx) = stratified_split(&labels, TEST_FRACTION, SPLIT_SEED);

        let raw_train: Vec<Vec<f64>> = train_idx
            .iter()
            .map(|&i| examples[i].features.to_array().to_vec())
            .collect();
        let scaler = StandardScaler::fit(&raw_train);
        let train_rows: Vec<Vec<f64>> = raw_train.iter().map(|row| scaler.transform(row)).collect();
        let train_labels: Vec<bool> = train_idx.iter().map(|&i| labels[i]).collect();

        let forest = RandomForest::fit(&train_rows, &train_labels, ForestParams::default());
        let boosting = GradientBoosting::fit(&train_rows, &train_labels, BoostingParams::default());
        let ensemble = Self {
            scaler,
            forest,
            boosting,
        };

        let test_labels: Vec<bool> = test_idx.iter().map(|&i| labels[i]).collect();
        let (mut forest_scores, mut boosting_scores, mut ensemble_scores) =
            (Vec::new(), Vec::new(), Vec::new());
        for &i in &test_idx {
            let (forest_p, boosting_p) = ensemble.component_probabilities(&examples[i].features);
            forest_scores.push(forest_p);
            boosting_scores.push(boosting_p);
            ensemble_scores.push((forest_p + boosting_p) / 2.0);
        }

        let metrics = ClassifierMetrics {
            random_forest_auc: roc_auc(&test_labels, &forest_scores).unwrap_or(0.5),
            gradient_boosting_auc: roc_auc(&test_labels, &boosting_scores).unwrap_or(0.5),
            ensemble_auc: roc_auc(&test_labels, &ensemble_scores).unwrap_or(0.5),
            train_size: train_idx.len(),
            test_size: test_idx.len(),
        };

        info!(
            trees = ensemble.forest.n_trees(),
            "burnout classifier ensemble trained (forest AUC {:.3}, boosting AUC {:.3}, ensemble AUC {:.3})",
            metrics.random_forest_auc, metrics.gradient_boosting_auc, metrics.ensemble_auc
        );

        Ok((ensemble, metrics))
    }

    /// Mean of the forest and boosting positive-class probabilities.
    pub fn predict_proba(&self, features: &FeatureVector) -> f64 {
        let (forest_p, boosting_p) = self.component_probabilities(features);
        (forest_p + boosting_p) / 2.0
    }

    pub(crate) fn component_probabilities(&self, features: &FeatureVector) -> (f64, f64) {
        let row = self.scaler.transform(&features.to_array());
        (
            self.forest.predict_proba(&row),
            self.boosting.predict_proba(&row),
        )
    }
}
