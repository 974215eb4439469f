//! Binary GBDT classifier wrapper: scaling, train/test split, training and ROC

use super::boosting::{BoostDataset, Booster};
use super::features::StandardScaler;
use super::metrics::{roc, roc_auc_score};
use crate::structs::{CryoError, Result, RocReport};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Iterations between metric log lines
const LOG_PERIOD: usize = 100;

// ============================================================================
// Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Auc,
    BinaryLogloss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoostingType {
    Gbdt,
}

impl FromStr for Objective {
    type Err = CryoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "binary" => Ok(Self::Binary),
            other => Err(CryoError::Config(format!("Unknown objective: {other}"))),
        }
    }
}

impl FromStr for Metric {
    type Err = CryoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auc" => Ok(Self::Auc),
            "binary_logloss" | "logloss" => Ok(Self::BinaryLogloss),
            other => Err(CryoError::Config(format!("Unknown metric: {other}"))),
        }
    }
}

impl FromStr for BoostingType {
    type Err = CryoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gbdt" => Ok(Self::Gbdt),
            other => Err(CryoError::Config(format!("Unknown boosting type: {other}"))),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auc => write!(f, "auc"),
            Self::BinaryLogloss => write!(f, "binary_logloss"),
        }
    }
}

/// Booster configuration
#[derive(Debug, Clone)]
pub struct GbdtParams {
    pub objective: Objective,
    pub metric: Metric,
    pub boosting: BoostingType,
    /// Negative means unlimited
    pub max_depth: i32,
    pub learning_rate: f64,
    pub num_leaves: usize,
    pub min_data_in_leaf: usize,
    pub min_sum_hessian_in_leaf: f64,
    pub lambda_l2: f64,
    pub feature_fraction: f64,
    pub verbosity: i32,
    pub seed: u64,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self {
            objective: Objective::Binary,
            metric: Metric::Auc,
            boosting: BoostingType::Gbdt,
            max_depth: -1,
            learning_rate: 0.01,
            num_leaves: 31,
            min_data_in_leaf: 20,
            min_sum_hessian_in_leaf: 1e-3,
            lambda_l2: 0.0,
            feature_fraction: 1.0,
            verbosity: 1,
            seed: 0,
        }
    }
}

impl GbdtParams {
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// # Errors
    /// Returns `Config` for out-of-range values
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(CryoError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.num_leaves < 2 {
            return Err(CryoError::Config(format!(
                "num_leaves must be at least 2, got {}",
                self.num_leaves
            )));
        }
        if self.max_depth == 0 {
            return Err(CryoError::Config(
                "max_depth must be positive or -1 for unlimited".into(),
            ));
        }
        if !(self.feature_fraction > 0.0 && self.feature_fraction <= 1.0) {
            return Err(CryoError::Config(format!(
                "feature_fraction must be in (0, 1], got {}",
                self.feature_fraction
            )));
        }
        if self.lambda_l2 < 0.0 || self.min_sum_hessian_in_leaf < 0.0 {
            return Err(CryoError::Config(
                "lambda_l2 and min_sum_hessian_in_leaf must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Split
// ============================================================================

/// Shuffle `0..n` with a seeded rng and split into `(train, test)` indices.
///
/// The test partition is the first `ceil(test_size * n)` shuffled indices.
///
/// # Errors
/// Returns error if `test_size` is outside `(0, 1)` or either side would be empty
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn train_test_split(n: usize, test_size: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(CryoError::Config(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }
    let n_test = (test_size * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(CryoError::Ml(format!(
            "Cannot split {n} samples with test_size {test_size}"
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let train = indices.split_off(n_test);
    Ok((train, indices))
}

// ============================================================================
// Wrapper
// ============================================================================

/// Standardises inputs, holds a seeded train/test split and the trained model
pub struct GbdtWrapper {
    x_labels: Vec<String>,
    scaler: StandardScaler,
    train_set: BoostDataset,
    x_test: Array2<f64>,
    y_test: Vec<f64>,
    random_state: u64,
    model: Option<Booster>,
}

impl GbdtWrapper {
    /// # Errors
    /// Returns error if shapes disagree, labels are not 0/1, or the split is empty
    pub fn new(
        x: &Array2<f64>,
        y: &[f64],
        x_labels: Option<&[String]>,
        random_state: u64,
        test_size: f64,
    ) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(CryoError::Ml(format!(
                "Got {} rows but {} labels",
                x.nrows(),
                y.len()
            )));
        }

        let x_labels = match x_labels {
            Some(labels) if labels.len() == x.ncols() => {
                labels.iter().map(|l| format!("{l} normed")).collect()
            }
            Some(labels) => {
                return Err(CryoError::Ml(format!(
                    "Got {} labels for {} columns",
                    labels.len(),
                    x.ncols()
                )))
            }
            None => (0..x.ncols()).map(|i| format!("Column_{i}")).collect(),
        };

        let (scaler, x_scaled) = StandardScaler::fit_transform(x)?;
        let (train_idx, test_idx) = train_test_split(x.nrows(), test_size, random_state)?;

        let x_train = x_scaled.select(Axis(0), &train_idx);
        let y_train = train_idx.iter().map(|&i| y[i]).collect();
        let x_test = x_scaled.select(Axis(0), &test_idx);
        let y_test = test_idx.iter().map(|&i| y[i]).collect();

        Ok(Self {
            x_labels,
            scaler,
            train_set: BoostDataset::new(x_train, y_train)?,
            x_test,
            y_test,
            random_state,
            model: None,
        })
    }

    /// Train for `epochs` iterations with `params`, or the defaults seeded
    /// from `random_state`
    ///
    /// # Errors
    /// Returns error if the parameters are invalid
    pub fn train(&mut self, epochs: usize, params: Option<GbdtParams>) -> Result<&Booster> {
        let params = params.unwrap_or_else(|| GbdtParams::default().with_seed(self.random_state));
        params.validate()?;

        info!("Training GBDT");
        let (x_test, y_test) = (&self.x_test, &self.y_test);
        let model = Booster::train(&self.train_set, &params, epochs, |iteration, booster| {
            if params.verbosity > 0 && iteration % LOG_PERIOD == 0 {
                let probs = booster.predict(x_test)?;
                match evaluate_metric(params.metric, y_test, &probs) {
                    Ok(value) => info!("[{iteration}] test {}: {value:.5}", params.metric),
                    Err(e) => debug!("[{iteration}] test {} unavailable: {e}", params.metric),
                }
            }
            Ok(())
        })?;
        info!("Done!");

        Ok(&*self.model.insert(model))
    }

    /// # Errors
    /// Returns `NotFitted` before training
    pub fn model(&self) -> Result<&Booster> {
        self.model
            .as_ref()
            .ok_or(CryoError::NotFitted("Need to train model first"))
    }

    #[must_use]
    pub const fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    #[must_use]
    pub fn x_labels(&self) -> &[String] {
        &self.x_labels
    }

    #[must_use]
    pub fn test_labels(&self) -> &[f64] {
        &self.y_test
    }

    #[must_use]
    pub fn train_size(&self) -> usize {
        self.train_set.n_samples()
    }

    /// Probabilities for the held-out partition
    ///
    /// # Errors
    /// Returns `NotFitted` before training
    pub fn predict_test(&self) -> Result<Vec<f64>> {
        self.model()?.predict(&self.x_test)
    }

    /// ROC curves of the model and the all-zero baseline on the test partition
    ///
    /// # Errors
    /// Returns `NotFitted` before training, or an error if the test labels
    /// hold a single class
    pub fn plot_roc(&self) -> Result<RocReport> {
        let probs = self.predict_test()?;
        let no_skill_probs = vec![0.0; self.y_test.len()];

        let (no_skill, no_skill_auc) = roc(&self.y_test, &no_skill_probs)?;
        let (model, model_auc) = roc(&self.y_test, &probs)?;
        let report = RocReport {
            no_skill_auc,
            model_auc,
            no_skill,
            model,
        };

        info!("No Skill: ROC AUC={:.3}", report.no_skill_auc);
        info!("{}", report.title());
        Ok(report)
    }
}

#[allow(clippy::cast_precision_loss)]
fn evaluate_metric(metric: Metric, y: &[f64], probs: &[f64]) -> Result<f64> {
    match metric {
        Metric::Auc => roc_auc_score(y, probs),
        Metric::BinaryLogloss => {
            if y.is_empty() {
                return Err(CryoError::Ml("No samples to score".into()));
            }
            let total: f64 = y
                .iter()
                .zip(probs)
                .map(|(&t, &p)| {
                    let p = p.clamp(1e-15, 1.0 - 1e-15);
                    -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
                })
                .sum();
            Ok(total / y.len() as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    /// Class 1 has a shifted first feature
    fn blobs(n: usize) -> (Array2<f64>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(7);
        let y: Vec<f64> = (0..n).map(|i| (i % 2) as f64).collect();
        let x = Array2::from_shape_fn((n, 3), |(i, j)| {
            let noise: f64 = rng.random_range(-1.0..1.0);
            if j == 0 {
                y[i] * 6.0 + noise
            } else {
                noise * 10.0
            }
        });
        (x, y)
    }

    #[test]
    fn test_params_from_str() {
        assert_eq!("binary".parse::<Objective>().expect("objective"), Objective::Binary);
        assert_eq!("AUC".parse::<Metric>().expect("metric"), Metric::Auc);
        assert_eq!("gbdt".parse::<BoostingType>().expect("boosting"), BoostingType::Gbdt);
        assert!(matches!("multiclass".parse::<Objective>(), Err(CryoError::Config(_))));
        assert!(matches!("dart".parse::<BoostingType>(), Err(CryoError::Config(_))));
    }

    #[test]
    fn test_params_validate() {
        assert!(GbdtParams::default().validate().is_ok());
        let bad = [
            GbdtParams {
                learning_rate: 0.0,
                ..GbdtParams::default()
            },
            GbdtParams {
                num_leaves: 1,
                ..GbdtParams::default()
            },
            GbdtParams {
                max_depth: 0,
                ..GbdtParams::default()
            },
            GbdtParams {
                feature_fraction: 1.5,
                ..GbdtParams::default()
            },
            GbdtParams {
                lambda_l2: -1.0,
                ..GbdtParams::default()
            },
        ];
        assert!(bad.iter().all(|p| p.validate().is_err()));
    }

    #[test]
    fn test_split_sizes_and_determinism() {
        let (train, test) = train_test_split(10, 0.3, 0).expect("split");
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 7);

        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());

        assert_eq!(train_test_split(10, 0.3, 0).expect("split"), (train, test));
        assert!(train_test_split(10, 0.0, 0).is_err());
        assert!(train_test_split(1, 0.5, 0).is_err());
    }

    #[test]
    fn test_labels_get_normed_suffix() {
        let (x, y) = blobs(20);
        let labels = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let wrapper = GbdtWrapper::new(&x, &y, Some(&labels), 0, 0.3).expect("wrapper");
        assert_eq!(wrapper.x_labels(), ["a normed", "b normed", "c normed"]);
        assert_eq!(wrapper.train_size(), 14);
        assert_eq!(wrapper.test_labels().len(), 6);
    }

    #[test]
    fn test_roc_requires_training() {
        let (x, y) = blobs(20);
        let wrapper = GbdtWrapper::new(&x, &y, None, 0, 0.3).expect("wrapper");
        assert!(matches!(wrapper.plot_roc(), Err(CryoError::NotFitted(_))));
        assert!(wrapper.model().is_err());
    }

    #[test]
    fn test_train_and_roc() {
        let (x, y) = blobs(200);
        let mut wrapper = GbdtWrapper::new(&x, &y, None, 3, 0.3).expect("wrapper");
        let params = GbdtParams {
            learning_rate: 0.1,
            verbosity: 0,
            ..GbdtParams::default()
        };
        wrapper.train(50, Some(params)).expect("train");

        let report = wrapper.plot_roc().expect("roc");
        assert!((report.no_skill_auc - 0.5).abs() < 1e-12);
        assert!(report.model_auc > 0.95);
        assert!(report.title().starts_with("Logistic: ROC AUC="));
    }

    #[test]
    fn test_logloss_metric() {
        let loss = evaluate_metric(Metric::BinaryLogloss, &[1.0, 0.0], &[0.5, 0.5]).expect("loss");
        assert!((loss - std::f64::consts::LN_2).abs() < 1e-12);
    }
}
