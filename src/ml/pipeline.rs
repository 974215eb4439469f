//! Featurize and train pipelines behind the CLI commands

use super::evaluator::Evaluator;
use super::featurizer::{FeatureEnsembler, DEFAULT_COMPONENTS};
use super::gbdt::{GbdtParams, GbdtWrapper};
use crate::structs::{CryoError, Evaluation, FeatureTable, LabeledRow, Result, RocReport};
use crate::transforms::ImageTransform;
use ndarray::{Array1, Array2, ArrayView1};
use tracing::info;

/// Configuration for the featurize pipeline
#[derive(Debug, Clone)]
pub struct FeaturizeConfig {
    pub n_components: usize,
    pub transforms: Vec<ImageTransform>,
    pub seed: u64,
}

impl Default for FeaturizeConfig {
    fn default() -> Self {
        Self {
            n_components: DEFAULT_COMPONENTS,
            transforms: vec![
                ImageTransform::Identity,
                ImageTransform::roberts(),
                ImageTransform::fft2(),
            ],
            seed: 0,
        }
    }
}

impl FeaturizeConfig {
    /// # Errors
    /// Returns `Config` if no transform or no component is requested
    pub fn validate(&self) -> Result<()> {
        if self.n_components == 0 {
            return Err(CryoError::Config("n_components must be positive".into()));
        }
        if self.transforms.is_empty() {
            return Err(CryoError::Config("At least one transform is required".into()));
        }
        Ok(())
    }
}

/// Configuration for the train pipeline
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub target: String,
    pub epochs: usize,
    pub test_size: f64,
    pub seed: u64,
    pub workers: Option<usize>,
    pub params: GbdtParams,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            target: "class".to_string(),
            epochs: 10_000,
            test_size: 0.3,
            seed: 0,
            workers: None,
            params: GbdtParams::default(),
        }
    }
}

impl TrainConfig {
    /// # Errors
    /// Returns `Config` for invalid epochs, split or booster parameters
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(CryoError::Config("epochs must be positive".into()));
        }
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(CryoError::Config(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if self.workers == Some(0) {
            return Err(CryoError::Config("workers must be positive".into()));
        }
        self.params.validate()
    }
}

/// Fitted ensembler together with the class index of every sample
pub struct FeaturizeOutcome {
    pub ensembler: FeatureEnsembler,
    pub classes: Vec<usize>,
}

/// Featurize one batch per class; samples keep class order
///
/// # Errors
/// Returns error if the config is invalid, no images are given, or fitting fails
pub fn run_featurize(batches: Vec<Vec<Array2<f64>>>, config: &FeaturizeConfig) -> Result<FeaturizeOutcome> {
    config.validate()?;

    let classes: Vec<usize> = batches
        .iter()
        .enumerate()
        .flat_map(|(class, batch)| std::iter::repeat(class).take(batch.len()))
        .collect();
    if classes.is_empty() {
        return Err(CryoError::Ml("No images to featurize".into()));
    }
    info!("Featurizing {} images from {} classes", classes.len(), batches.len());

    let data = batches.into_iter().flatten().collect();
    let mut ensembler = FeatureEnsembler::new(data, config.transforms.clone(), config.n_components)
        .with_seed(config.seed);
    ensembler.fit()?;

    Ok(FeaturizeOutcome { ensembler, classes })
}

/// ROC report and per-row predictions of a trained classifier
pub struct TrainOutcome {
    pub report: RocReport,
    pub predictions: Vec<Evaluation<f64, LabeledRow>>,
    pub n_trees: usize,
}

/// Train on a feature table, evaluate on the held-out split and score every row
///
/// # Errors
/// Returns error if the config is invalid, training fails, or the test split
/// holds a single class
pub fn run_train(table: &FeatureTable, config: &TrainConfig) -> Result<TrainOutcome> {
    config.validate()?;

    let mut wrapper = GbdtWrapper::new(
        &table.data,
        &table.target,
        Some(table.names.as_slice()),
        config.seed,
        config.test_size,
    )?;
    wrapper.train(config.epochs, Some(config.params.clone().with_seed(config.seed)))?;
    let report = wrapper.plot_roc()?;

    let rows: Vec<LabeledRow> = table
        .data
        .rows()
        .into_iter()
        .zip(&table.target)
        .enumerate()
        .map(|(row_id, (values, &target))| LabeledRow {
            row_id,
            values: values.to_vec(),
            target,
        })
        .collect();

    let scaler = wrapper.scaler();
    let model = wrapper.model()?;
    let mut evaluator = Evaluator::new(
        &rows,
        |x: Array1<f64>| model.predict_row(x.view()),
        |row: &LabeledRow| scaler.transform_row(ArrayView1::from(&row.values)),
    );
    if let Some(n) = config.workers {
        evaluator = evaluator.with_workers(n);
    }
    let predictions = evaluator.evaluate()?;

    Ok(TrainOutcome {
        report,
        predictions,
        n_trees: model.num_trees(),
    })
}
