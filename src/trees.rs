use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Features considered per split; `None` means all of them.
    pub max_features: Option<usize>,
}

struct GrowContext<'a> {
    rows: &'a [Vec<f64>],
    targets: &'a [f64],
    weights: &'a [f64],
    params: TreeParams,
    leaf_value: &'a dyn Fn(&[usize]) -> f64,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn fit(
        rows: &[Vec<f64>],
        samples: &[usize],
        targets: &[f64],
        weights: &[f64],
        params: TreeParams,
        rng: &mut StdRng,
        leaf_value: &dyn Fn(&[usize]) -> f64,
    ) -> Self {
        let ctx = GrowContext {
            rows,
            targets,
            weights,
            params,
            leaf_value,
        };
        let mut tree = RegressionTree { nodes: Vec::new() };
        tree.grow(&ctx, samples.to_vec(), 0, rng);
        tree
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes.get(index) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    index = if value < *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    #[cfg(test)]
    pub fn depth(&self) -> usize {
        self.depth_from(0)
    }

    #[cfg(test)]
    fn depth_from(&self, index: usize) -> usize {
        match self.nodes.get(index) {
            Some(Node::Split { left, right, .. }) => {
                1 + self.depth_from(*left).max(self.depth_from(*right))
            }
            _ => 0,
        }
    }

    fn grow(
        &mut self,
        ctx: &GrowContext<'_>,
        samples: Vec<usize>,
        depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let index = self.nodes.len();
        self.nodes.push(Node::Leaf { value: 0.0 });

        let split = if depth < ctx.params.max_depth
            && samples.len() >= ctx.params.min_samples_split.max(2)
        {
            best_split(ctx, &samples, rng)
        } else {
            None
        };

        match split {
            Some(split) => {
                let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
                    .iter()
                    .copied()
                    .partition(|&i| ctx.rows[i][split.feature] < split.threshold);
                let left = self.grow(ctx, left_samples, depth + 1, rng);
                let right = self.grow(ctx, right_samples, depth + 1, rng);
                self.nodes[index] = Node::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left,
                    right,
                };
            }
            None => {
                self.nodes[index] = Node::Leaf {
                    value: (ctx.leaf_value)(&samples),
                };
            }
        }

        index
    }
}

fn best_split(ctx: &GrowContext<'_>, samples: &[usize], rng: &mut StdRng) -> Option<BestSplit> {
    let n_features = ctx.rows.first().map(Vec::len).unwrap_or(0);
    if n_features == 0 {
        return None;
    }

    let (total_w, total_wy, total_wyy) = samples.iter().fold((0.0, 0.0, 0.0), |acc, &i| {
        let w = ctx.weights[i];
        let y = ctx.targets[i];
        (acc.0 + w, acc.1 + w * y, acc.2 + w * y * y)
    });
    if total_w <= 0.0 {
        return None;
    }
    let parent_error = total_wyy - total_wy * total_wy / total_w;
    if parent_error <= MIN_GAIN {
        return None;
    }

    // With subsampling, features are drawn in random order and the search
    // keeps going past `max_features` until some split is found.
    let (order, budget): (Vec<usize>, usize) = match ctx.params.max_features {
        Some(k) if k < n_features => (sample(rng, n_features, n_features).into_vec(), k.max(1)),
        _ => ((0..n_features).collect(), n_features),
    };

    let mut best: Option<BestSplit> = None;
    let mut sorted = samples.to_vec();

    for (inspected, feature) in order.into_iter().enumerate() {
        if inspected >= budget && best.is_some() {
            break;
        }

        sorted.sort_by(|&a, &b| {
            ctx.rows[a][feature]
                .partial_cmp(&ctx.rows[b][feature])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let (mut left_w, mut left_wy, mut left_wyy) = (0.0, 0.0, 0.0);
        for pair in 0..sorted.len() - 1 {
            let i = sorted[pair];
            let w = ctx.weights[i];
            let y = ctx.targets[i];
            left_w += w;
            left_wy += w * y;
            left_wyy += w * y * y;

            let here = ctx.rows[i][feature];
            let next = ctx.rows[sorted[pair + 1]][feature];
            if next <= here {
                continue;
            }

            let right_w = total_w - left_w;
            if left_w <= 0.0 || right_w <= 0.0 {
                continue;
            }
            let right_wy = total_wy - left_wy;
            let right_wyy = total_wyy - left_wyy;
            let children_error = (left_wyy - left_wy * left_wy / left_w)
                + (right_wyy - right_wy * right_wy / right_w);
            let gain = parent_error - children_error;

            if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(BestSplit {
                    feature,
                    threshold: (here + next) / 2.0,
                    gain,
                });
            }
        }
    }

    best
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[derive(Debug, Clone, Copy)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 5,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn fit(rows: &[Vec<f64>], labels: &[bool], params: ForestParams) -> Self {
        let n = rows.len();
        if n == 0 {
            return Self { trees: Vec::new() };
        }

        let targets: Vec<f64> = labels.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();
        let positives = labels.iter().filter(|&&l| l).count();
        let negatives = n - positives;
        let weight_for = |count: usize| {
            if count == 0 {
                0.0
            } else {
                n as f64 / (2.0 * count as f64)
            }
        };
        let (positive_weight, negative_weight) = (weight_for(positives), weight_for(negatives));
        let weights: Vec<f64> = labels
            .iter()
            .map(|&l| if l { positive_weight } else { negative_weight })
            .collect();

        let n_features = rows[0].len();
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            max_features: Some(((n_features as f64).sqrt() as usize).max(1)),
        };
        let leaf_value = |samples: &[usize]| {
            let (w, wy) = samples.iter().fold((0.0, 0.0), |acc, &i| {
                (acc.0 + weights[i], acc.1 + weights[i] * targets[i])
            });
            if w > 0.0 {
                wy / w
            } else {
                0.0
            }
        };

        let mut rng = StdRng::seed_from_u64(params.seed);
        let trees = (0..params.n_trees)
            .map(|_| {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(
                    rows,
                    &bootstrap,
                    &targets,
                    &weights,
                    tree_params,
                    &mut rng,
                    &leaf_value,
                )
            })
            .collect();

        Self { trees }
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let total: f64 = self.trees.iter().map(|tree| tree.predict(row)).sum();
        (total / self.trees.len() as f64).clamp(0.0, 1.0)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BoostingParams {
    pub n_stages: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_stages: 100,
            learning_rate: 0.1,
            max_depth: 5,
            seed: 42,
        }
    }
}

// Log-loss boosting, Newton-step leaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    init: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoosting {
    pub fn fit(rows: &[Vec<f64>], labels: &[bool], params: BoostingParams) -> Self {
        let n = rows.len();
        let targets: Vec<f64> = labels.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();
        let prior = if n == 0 {
            0.5
        } else {
            (targets.iter().sum::<f64>() / n as f64).clamp(1e-6, 1.0 - 1e-6)
        };
        let init = (prior / (1.0 - prior)).ln();

        let weights = vec![1.0; n];
        let samples: Vec<usize> = (0..n).collect();
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: 2,
            max_features: None,
        };
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut raw = vec![init; n];
        let mut trees = Vec::with_capacity(params.n_stages);

        for _ in 0..params.n_stages {
            let probabilities: Vec<f64> = raw.iter().map(|&r| sigmoid(r)).collect();
            let residuals: Vec<f64> = targets
                .iter()
                .zip(&probabilities)
                .map(|(y, p)| y - p)
                .collect();
            let leaf_value = |leaf: &[usize]| {
                let numerator: f64 = leaf.iter().map(|&i| residuals[i]).sum();
                let denominator: f64 = leaf
                    .iter()
                    .map(|&i| probabilities[i] * (1.0 - probabilities[i]))
                    .sum();
                if denominator.abs() < 1e-150 {
                    0.0
                } else {
                    numerator / denominator
                }
            };

            let tree = RegressionTree::fit(
                rows,
                &samples,
                &residuals,
                &weights,
                tree_params,
                &mut rng,
                &leaf_value,
            );
            for (score, row) in raw.iter_mut().zip(rows) {
                *score += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Self {
            init,
            learning_rate: params.learning_rate,
            trees,
        }
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let raw = self.init
            + self.learning_rate * self.trees.iter().map(|tree| tree.predict(row)).sum::<f64>();
        sigmoid(raw)
    }
}
