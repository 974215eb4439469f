//! Feature extraction from image batches via PCA, FastICA and factor analysis

use super::features::{stack_flat, StandardScaler};
use super::reduction::{EstimatorKind, FittedEstimator};
use crate::structs::{CryoError, FeatureSet, Result};
use crate::transforms::ImageTransform;
use ndarray::{concatenate, Array2, Axis};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Default number of components per estimator
pub const DEFAULT_COMPONENTS: usize = 9;

/// Fits the three decomposition estimators to a batch of equally-shaped images.
///
/// The steps must run in order: [`preprocess`](Self::preprocess),
/// [`fit_estimators`](Self::fit_estimators),
/// [`compute_features`](Self::compute_features). [`fit`](Self::fit) runs all
/// three.
pub struct Featurizer {
    raw: Vec<Array2<f64>>,
    n_components: usize,
    seed: u64,
    sample_shape: Option<(usize, usize)>,
    scaler: Option<StandardScaler>,
    data: Option<Array2<f64>>,
    estimators: Vec<FittedEstimator>,
    features: Option<FeatureSet>,
}

impl Featurizer {
    #[must_use]
    pub fn new(data: Vec<Array2<f64>>, n_components: usize) -> Self {
        Self {
            raw: data,
            n_components,
            seed: 0,
            sample_shape: None,
            scaler: None,
            data: None,
            estimators: Vec::new(),
            features: None,
        }
    }

    /// Seed for the randomised estimators
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Run every step
    ///
    /// # Errors
    /// Returns the first failing step's error
    pub fn fit(&mut self) -> Result<()> {
        info!("Preprocessing data");
        self.preprocess()?;

        info!("Fitting estimators");
        self.fit_estimators()?;

        info!("Calculating features");
        self.compute_features()?;

        info!("Done!");
        Ok(())
    }

    /// Flatten, stack and standardise the raw batch
    ///
    /// # Errors
    /// Returns error if the batch is empty, shapes differ, or the component
    /// count does not fit the data
    pub fn preprocess(&mut self) -> Result<()> {
        let (stacked, shape) = stack_flat(&self.raw)?;
        let (n_samples, n_features) = stacked.dim();
        if self.n_components == 0 || self.n_components > n_samples.min(n_features) {
            return Err(CryoError::Ml(format!(
                "n_components must be in 1..={} for {n_samples} samples of {n_features} features, got {}",
                n_samples.min(n_features),
                self.n_components
            )));
        }

        let (scaler, scaled) = StandardScaler::fit_transform(&stacked)?;
        self.sample_shape = Some(shape);
        self.scaler = Some(scaler);
        self.data = Some(scaled);
        Ok(())
    }

    /// Fit PCA, FastICA and factor analysis to the standardised data
    ///
    /// # Errors
    /// Returns `NotFitted` before [`preprocess`](Self::preprocess), or the
    /// estimator's own failure
    pub fn fit_estimators(&mut self) -> Result<()> {
        let data = self.data.as_ref().ok_or(CryoError::NotFitted(
            "Data must be preprocessed before fitting estimators",
        ))?;

        let mut estimators = Vec::with_capacity(EstimatorKind::ALL.len());
        for kind in EstimatorKind::ALL {
            info!(
                "Calculating {} features using {}",
                self.n_components,
                kind.name()
            );
            let start = Instant::now();
            estimators.push(kind.fit(data, self.n_components, self.seed)?);
            info!("Time taken = {:.3}s", start.elapsed().as_secs_f64());
        }

        self.estimators = estimators;
        Ok(())
    }

    /// Collect basis arrays, coefficients and labels from the fitted estimators
    ///
    /// # Errors
    /// Returns `NotFitted` before [`fit_estimators`](Self::fit_estimators)
    pub fn compute_features(&mut self) -> Result<()> {
        let (data, shape) = match (&self.data, self.sample_shape) {
            (Some(data), Some(shape)) if !self.estimators.is_empty() => (data, shape),
            _ => return Err(CryoError::NotFitted("Estimators must be fitted to data first")),
        };

        let mut features = Vec::new();
        let mut coeffs = Vec::new();
        let mut labels = Vec::new();
        for estimator in &self.estimators {
            let components = estimator.components(data.ncols())?;
            for component in components.outer_iter() {
                features.push(component.to_owned().into_shape(shape)?);
            }
            coeffs.push(estimator.transform(data)?);
            let name = estimator.kind().name();
            labels.extend((0..self.n_components).map(|i| format!("{name} {i}")));
        }

        let views: Vec<_> = coeffs.iter().map(Array2::view).collect();
        self.features = Some(FeatureSet {
            features,
            coeffs: concatenate(Axis(1), &views)?,
            labels,
        });
        Ok(())
    }

    /// # Errors
    /// Returns `NotFitted` until features have been computed
    pub fn features(&self) -> Result<&FeatureSet> {
        self.features
            .as_ref()
            .ok_or(CryoError::NotFitted("Features have not been computed"))
    }

    /// Write one PNG grid of components per estimator into `dir`.
    ///
    /// Files are named `{prefix}{estimator}.png`.
    ///
    /// # Errors
    /// Returns `NotFitted` before the estimators are fitted, or an image error
    pub fn plot_2d_components(&self, dir: &Path, prefix: &str, n_col: usize) -> Result<Vec<PathBuf>> {
        let (data, shape) = match (&self.data, self.sample_shape) {
            (Some(data), Some(shape)) if !self.estimators.is_empty() => (data, shape),
            _ => {
                return Err(CryoError::NotFitted(
                    "Estimators need to be fitted to data before plotting",
                ))
            }
        };

        let mut written = Vec::new();
        for estimator in &self.estimators {
            let components = estimator.components(data.ncols())?;
            let images = components
                .outer_iter()
                .map(|c| c.to_owned().into_shape(shape))
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let path = dir.join(format!("{prefix}{}.png", estimator.kind().name()));
            super::output::write_component_grid(&path, &images, n_col)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Aggregates features over several image transforms of the same batch
pub struct FeatureEnsembler {
    data: Vec<Array2<f64>>,
    transforms: Vec<ImageTransform>,
    n_components: usize,
    seed: u64,
    fitted: Vec<(ImageTransform, Featurizer)>,
    features: Option<FeatureSet>,
}

impl FeatureEnsembler {
    #[must_use]
    pub fn new(data: Vec<Array2<f64>>, transforms: Vec<ImageTransform>, n_components: usize) -> Self {
        Self {
            data,
            transforms,
            n_components,
            seed: 0,
            fitted: Vec::new(),
            features: None,
        }
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Featurize each transformed batch and concatenate the results.
    ///
    /// Labels are prefixed with `"{transform}: "`.
    ///
    /// # Errors
    /// Returns the first transform or featurizer failure
    pub fn fit(&mut self) -> Result<()> {
        if self.transforms.is_empty() {
            return Err(CryoError::Config("At least one transform is required".into()));
        }

        let mut features = Vec::new();
        let mut coeffs = Vec::new();
        let mut labels = Vec::new();
        let mut fitted = Vec::with_capacity(self.transforms.len());

        for &transform in &self.transforms {
            let data_tf = transform.apply(&self.data)?;
            let mut featurizer = Featurizer::new(data_tf, self.n_components).with_seed(self.seed);
            featurizer.fit()?;

            let set = featurizer.features()?;
            features.extend(set.features.iter().cloned());
            coeffs.push(set.coeffs.clone());
            labels.extend(
                set.labels
                    .iter()
                    .map(|label| format!("{}: {label}", transform.name())),
            );
            fitted.push((transform, featurizer));
        }

        let views: Vec<_> = coeffs.iter().map(Array2::view).collect();
        self.features = Some(FeatureSet {
            features,
            coeffs: concatenate(Axis(1), &views)?,
            labels,
        });
        self.fitted = fitted;
        Ok(())
    }

    /// # Errors
    /// Returns `NotFitted` before [`fit`](Self::fit)
    pub fn features(&self) -> Result<&FeatureSet> {
        self.features
            .as_ref()
            .ok_or(CryoError::NotFitted("Features have not been computed"))
    }

    /// Write component grids for every transform as `{transform}_{estimator}.png`
    ///
    /// # Errors
    /// Returns `NotFitted` before [`fit`](Self::fit), or an image error
    pub fn plot_2d_components(&self, dir: &Path, n_col: usize) -> Result<Vec<PathBuf>> {
        if self.fitted.is_empty() {
            return Err(CryoError::NotFitted("Features have not been computed"));
        }
        let mut written = Vec::new();
        for (transform, featurizer) in &self.fitted {
            let prefix = format!("{}_", transform.name());
            written.extend(featurizer.plot_2d_components(dir, &prefix, n_col)?);
        }
        Ok(written)
    }
}
