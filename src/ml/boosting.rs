//! Gradient-boosted decision trees for binary classification.
//!
//! Trees are grown leaf-wise: at each step the leaf with the largest split
//! gain is split, until `num_leaves` is reached or no leaf can be split.
//! Candidate thresholds are midpoints between consecutive distinct feature
//! values within a leaf.

use super::gbdt::GbdtParams;
use super::metrics::sigmoid;
use crate::structs::{CryoError, Result};
use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, warn};

/// Probabilities are clamped to this margin when computing the initial score
const PROB_EPS: f64 = 1e-15;

// ============================================================================
// Dataset
// ============================================================================

/// Training matrix with 0/1 labels and per-feature sort orders
#[derive(Debug, Clone)]
pub struct BoostDataset {
    data: Array2<f64>,
    labels: Vec<f64>,
    sorted: Vec<Vec<usize>>,
}

impl BoostDataset {
    /// # Errors
    /// Returns error if the dataset is empty, lengths differ, a label is not
    /// 0/1, or a value is not finite
    pub fn new(data: Array2<f64>, labels: Vec<f64>) -> Result<Self> {
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(CryoError::Ml("Training data must be non-empty".into()));
        }
        if data.nrows() != labels.len() {
            return Err(CryoError::Ml(format!(
                "Got {} rows but {} labels",
                data.nrows(),
                labels.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|&&y| y != 0.0 && y != 1.0) {
            return Err(CryoError::Ml(format!(
                "Binary objective needs 0/1 labels, got {bad}"
            )));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(CryoError::Ml("Training data contains non-finite values".into()));
        }

        let sorted = data
            .columns()
            .into_iter()
            .map(|col| {
                let mut idx: Vec<usize> = (0..col.len()).collect();
                idx.sort_by(|&a, &b| col[a].total_cmp(&col[b]));
                idx
            })
            .collect();

        Ok(Self {
            data,
            labels,
            sorted,
        })
    }

    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    #[must_use]
    pub fn labels(&self) -> &[f64] {
        &self.labels
    }

    #[must_use]
    pub const fn data(&self) -> &Array2<f64> {
        &self.data
    }
}

// ============================================================================
// Tree
// ============================================================================

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single regression tree; `value <= threshold` goes left
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    #[must_use]
    pub fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if row[feature] <= threshold { left } else { right },
            }
        }
    }

    #[must_use]
    pub fn num_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitInfo {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct LeafState {
    node: usize,
    samples: Vec<usize>,
    depth: usize,
    best: Option<SplitInfo>,
}

/// Per-sample first and second order gradients of the loss
struct Gradients {
    grad: Vec<f64>,
    hess: Vec<f64>,
}

impl Gradients {
    fn sums(&self, samples: &[usize]) -> (f64, f64) {
        samples
            .iter()
            .fold((0.0, 0.0), |(g, h), &i| (g + self.grad[i], h + self.hess[i]))
    }
}

fn leaf_score(g: f64, h: f64, lambda: f64) -> f64 {
    g * g / (h + lambda)
}

fn leaf_value(samples: &[usize], gradients: &Gradients, params: &GbdtParams) -> f64 {
    let (g, h) = gradients.sums(samples);
    -g / (h + params.lambda_l2) * params.learning_rate
}

fn best_split(
    dataset: &BoostDataset,
    samples: &[usize],
    features: &[usize],
    gradients: &Gradients,
    params: &GbdtParams,
) -> Option<SplitInfo> {
    if samples.len() < 2 * params.min_data_in_leaf.max(1) {
        return None;
    }

    let mut in_leaf = vec![false; dataset.n_samples()];
    for &i in samples {
        in_leaf[i] = true;
    }
    let (g_total, h_total) = gradients.sums(samples);
    let parent = leaf_score(g_total, h_total, params.lambda_l2);

    let mut best: Option<SplitInfo> = None;
    for &feature in features {
        let column = dataset.data.column(feature);
        let ordered: Vec<usize> = dataset.sorted[feature]
            .iter()
            .copied()
            .filter(|&i| in_leaf[i])
            .collect();

        let (mut g_left, mut h_left) = (0.0, 0.0);
        for (pos, pair) in ordered.windows(2).enumerate() {
            let (i, next) = (pair[0], pair[1]);
            g_left += gradients.grad[i];
            h_left += gradients.hess[i];

            let n_left = pos + 1;
            let n_right = ordered.len() - n_left;
            if column[i] == column[next]
                || n_left < params.min_data_in_leaf
                || n_right < params.min_data_in_leaf
            {
                continue;
            }

            let h_right = h_total - h_left;
            if h_left < params.min_sum_hessian_in_leaf || h_right < params.min_sum_hessian_in_leaf {
                continue;
            }

            let gain = leaf_score(g_left, h_left, params.lambda_l2)
                + leaf_score(g_total - g_left, h_right, params.lambda_l2)
                - parent;
            if gain > 0.0 && best.is_none_or(|b| gain > b.gain) {
                best = Some(SplitInfo {
                    feature,
                    threshold: (column[i] + column[next]) / 2.0,
                    gain,
                });
            }
        }
    }
    best
}

fn grow_tree(
    dataset: &BoostDataset,
    features: &[usize],
    gradients: &Gradients,
    params: &GbdtParams,
) -> Tree {
    let depth_limit = usize::try_from(params.max_depth).ok().filter(|&d| d > 0);
    let can_split = |depth: usize| depth_limit.is_none_or(|limit| depth < limit);

    let root: Vec<usize> = (0..dataset.n_samples()).collect();
    let mut nodes = vec![Node::Leaf {
        value: leaf_value(&root, gradients, params),
    }];
    let mut leaves = vec![LeafState {
        node: 0,
        best: can_split(0)
            .then(|| best_split(dataset, &root, features, gradients, params))
            .flatten(),
        samples: root,
        depth: 0,
    }];

    while leaves.len() < params.num_leaves {
        let Some((pos, split)) = leaves
            .iter()
            .enumerate()
            .filter_map(|(pos, leaf)| leaf.best.map(|b| (pos, b)))
            .max_by(|a, b| a.1.gain.total_cmp(&b.1.gain))
        else {
            break;
        };

        let leaf = leaves.swap_remove(pos);
        let column = dataset.data.column(split.feature);
        let (left, right): (Vec<usize>, Vec<usize>) = leaf
            .samples
            .iter()
            .partition(|&&i| column[i] <= split.threshold);

        let left_node = nodes.len();
        let right_node = left_node + 1;
        nodes.push(Node::Leaf {
            value: leaf_value(&left, gradients, params),
        });
        nodes.push(Node::Leaf {
            value: leaf_value(&right, gradients, params),
        });
        nodes[leaf.node] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_node,
            right: right_node,
        };

        let depth = leaf.depth + 1;
        for (node, samples) in [(left_node, left), (right_node, right)] {
            let best = can_split(depth)
                .then(|| best_split(dataset, &samples, features, gradients, params))
                .flatten();
            leaves.push(LeafState {
                node,
                samples,
                depth,
                best,
            });
        }
    }

    Tree { nodes }
}

// ============================================================================
// Booster
// ============================================================================

/// Additive tree ensemble on the log-odds scale
#[derive(Debug, Clone)]
pub struct Booster {
    init_score: f64,
    trees: Vec<Tree>,
    n_features: usize,
}

impl Booster {
    /// Train for up to `num_rounds` iterations.
    ///
    /// `on_iteration` is called after every tree with the 1-based iteration
    /// number. Training stops early once no leaf can be split on any feature.
    ///
    /// # Errors
    /// Returns error if the parameters are invalid or the callback fails
    pub fn train<F>(
        dataset: &BoostDataset,
        params: &GbdtParams,
        num_rounds: usize,
        mut on_iteration: F,
    ) -> Result<Self>
    where
        F: FnMut(usize, &Self) -> Result<()>,
    {
        params.validate()?;
        debug!(
            "{:?}/{:?} booster on {} samples x {} features",
            params.boosting,
            params.objective,
            dataset.n_samples(),
            dataset.n_features()
        );

        let n = dataset.n_samples();
        let labels = dataset.labels();
        #[allow(clippy::cast_precision_loss)]
        let positive_rate = labels.iter().sum::<f64>() / n as f64;
        let p = positive_rate.clamp(PROB_EPS, 1.0 - PROB_EPS);

        let mut booster = Self {
            init_score: (p / (1.0 - p)).ln(),
            trees: Vec::new(),
            n_features: dataset.n_features(),
        };
        let mut scores = vec![booster.init_score; n];
        let mut rng = StdRng::seed_from_u64(params.seed);
        let all_features: Vec<usize> = (0..dataset.n_features()).collect();

        for iteration in 1..=num_rounds {
            let (grad, hess): (Vec<f64>, Vec<f64>) = scores
                .iter()
                .zip(labels)
                .map(|(&s, &y)| {
                    let prob = sigmoid(s);
                    (prob - y, (prob * (1.0 - prob)).max(f64::EPSILON))
                })
                .unzip();
            let gradients = Gradients { grad, hess };

            let sampled = if params.feature_fraction < 1.0 {
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let amount = ((params.feature_fraction * all_features.len() as f64).round()
                    as usize)
                    .clamp(1, all_features.len());
                let mut chosen =
                    rand::seq::index::sample(&mut rng, all_features.len(), amount).into_vec();
                chosen.sort_unstable();
                Some(chosen)
            } else {
                None
            };

            // A sampled subset without a usable split falls back to every feature
            let mut tree = grow_tree(
                dataset,
                sampled.as_deref().unwrap_or(&all_features),
                &gradients,
                params,
            );
            if tree.num_leaves() < 2 && sampled.is_some() {
                debug!("Iteration {iteration}: sampled features cannot split, using all");
                tree = grow_tree(dataset, &all_features, &gradients, params);
            }
            if tree.num_leaves() < 2 {
                warn!(
                    "Stopped training after {} iterations: no further splits with positive gain",
                    iteration - 1
                );
                break;
            }

            for (i, score) in scores.iter_mut().enumerate() {
                *score += tree.predict(dataset.data.row(i));
            }
            debug!("Iteration {iteration}: {} leaves", tree.num_leaves());
            booster.trees.push(tree);

            on_iteration(iteration, &booster)?;
        }

        Ok(booster)
    }

    /// Raw log-odds for one row
    #[must_use]
    pub fn predict_raw_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.init_score + self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    /// Positive-class probability for one row
    #[must_use]
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        sigmoid(self.predict_raw_row(row))
    }

    /// Positive-class probabilities for every row
    ///
    /// # Errors
    /// Returns error if the column count differs from the training data
    pub fn predict(&self, data: &Array2<f64>) -> Result<Vec<f64>> {
        if data.ncols() != self.n_features {
            return Err(CryoError::Ml(format!(
                "Model expects {} features, got {}",
                self.n_features,
                data.ncols()
            )));
        }
        Ok(data.rows().into_iter().map(|r| self.predict_row(r)).collect())
    }

    #[must_use]
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    #[must_use]
    pub const fn init_score(&self) -> f64 {
        self.init_score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Positives have x0 > 0; x1 is noise
    fn separable(n: usize) -> BoostDataset {
        let half = n / 2;
        let data = Array2::from_shape_fn((n, 2), |(i, j)| {
            let offset = if i < half { -1.0 } else { 1.0 };
            if j == 0 {
                offset * (1.0 + (i % 7) as f64)
            } else {
                ((i * 31) % 11) as f64
            }
        });
        let labels = (0..n).map(|i| if i < half { 0.0 } else { 1.0 }).collect();
        BoostDataset::new(data, labels).expect("dataset")
    }

    fn params() -> GbdtParams {
        GbdtParams {
            learning_rate: 0.1,
            min_data_in_leaf: 5,
            ..GbdtParams::default()
        }
    }

    #[test]
    fn test_dataset_rejects_bad_labels() {
        let data = array![[1.0], [2.0]];
        assert!(BoostDataset::new(data.clone(), vec![0.0, 2.0]).is_err());
        assert!(BoostDataset::new(data.clone(), vec![0.0]).is_err());
        assert!(BoostDataset::new(array![[f64::NAN], [1.0]], vec![0.0, 1.0]).is_err());
        assert!(BoostDataset::new(data, vec![0.0, 1.0]).is_ok());
    }

    #[test]
    fn test_separates_linear_data() {
        let dataset = separable(60);
        let booster = Booster::train(&dataset, &params(), 30, |_, _| Ok(())).expect("train");

        assert!(booster.num_trees() > 0);
        let probs = booster.predict(dataset.data()).expect("predict");
        for (p, y) in probs.iter().zip(dataset.labels()) {
            assert_eq!(*p > 0.5, *y == 1.0);
        }
    }

    #[test]
    fn test_first_split_is_on_signal_feature() {
        let dataset = separable(60);
        let booster = Booster::train(&dataset, &params(), 1, |_, _| Ok(())).expect("train");
        match booster.trees[0].nodes[0] {
            Node::Split {
                feature, threshold, ..
            } => {
                assert_eq!(feature, 0);
                assert!((threshold - 0.0).abs() < 1e-12);
            }
            Node::Leaf { .. } => panic!("root should split"),
        }
    }

    #[test]
    fn test_leaf_limit() {
        let dataset = separable(80);
        let limited = GbdtParams {
            num_leaves: 2,
            min_data_in_leaf: 1,
            ..params()
        };
        let booster = Booster::train(&dataset, &limited, 3, |_, _| Ok(())).expect("train");
        assert!(booster.trees.iter().all(|t| t.num_leaves() == 2));
    }

    #[test]
    fn test_min_data_stops_training() {
        let dataset = separable(10);
        let booster =
            Booster::train(&dataset, &GbdtParams::default(), 10, |_, _| Ok(())).expect("train");
        assert_eq!(booster.num_trees(), 0);
        assert!(booster.init_score().abs() < 1e-12);
        assert!((booster.predict_row(dataset.data().row(0)) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_callback_sees_each_iteration() {
        let dataset = separable(40);
        let mut seen = Vec::new();
        let booster = Booster::train(&dataset, &params(), 5, |it, b| {
            seen.push((it, b.num_trees()));
            Ok(())
        })
        .expect("train");
        assert_eq!(seen.len(), booster.num_trees());
        assert!(seen.iter().all(|&(it, trees)| it == trees));
    }

    #[test]
    fn test_feature_fraction_is_seeded() {
        let dataset = separable(60);
        let sampled = GbdtParams {
            feature_fraction: 0.5,
            ..params()
        };
        let a = Booster::train(&dataset, &sampled, 10, |_, _| Ok(())).expect("train");
        let b = Booster::train(&dataset, &sampled, 10, |_, _| Ok(())).expect("train");
        let pa = a.predict(dataset.data()).expect("predict");
        let pb = b.predict(dataset.data()).expect("predict");
        assert_eq!(pa, pb);
    }

    #[test]
    fn test_feature_fraction_skips_constant_column() {
        let n = 60;
        let data = Array2::from_shape_fn((n, 2), |(i, j)| {
            let sign = if i < n / 2 { -1.0 } else { 1.0 };
            if j == 0 {
                sign * (1.0 + (i % 7) as f64)
            } else {
                3.0
            }
        });
        let labels = (0..n).map(|i| if i < n / 2 { 0.0 } else { 1.0 }).collect();
        let dataset = BoostDataset::new(data, labels).expect("dataset");

        for seed in 0..20 {
            let sampled = GbdtParams {
                feature_fraction: 0.5,
                seed,
                ..params()
            };
            let booster = Booster::train(&dataset, &sampled, 50, |_, _| Ok(())).expect("train");
            assert_eq!(booster.num_trees(), 50, "seed {seed}");
        }
    }

    #[test]
    fn test_predict_checks_width() {
        let dataset = separable(40);
        let booster = Booster::train(&dataset, &params(), 2, |_, _| Ok(())).expect("train");
        assert!(booster.predict(&Array2::zeros((3, 5))).is_err());
    }
}
