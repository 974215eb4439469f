//! Decomposition estimators: PCA and FastICA via linfa, factor analysis via EM

use crate::structs::{CryoError, Result};
use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_ica::fast_ica::FastIca;
use linfa_reduction::Pca;
use ndarray::{s, Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Iteration cap for factor analysis
pub const FA_MAX_ITER: usize = 20;
const FA_MIN_NOISE: f64 = 1e-6;
const FA_TOL: f64 = 1e-8;
const UNIT_CHUNK: usize = 64;

/// The decomposition algorithms run by the featurizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorKind {
    Pca,
    FastIca,
    FactorAnalysis,
}

impl EstimatorKind {
    pub const ALL: [Self; 3] = [Self::Pca, Self::FastIca, Self::FactorAnalysis];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pca => "PCA",
            Self::FastIca => "FastICA",
            Self::FactorAnalysis => "FactorAnalysis",
        }
    }

    /// Fit this estimator to an `N x M` matrix
    ///
    /// # Errors
    /// Returns error if the underlying algorithm fails
    #[allow(clippy::cast_possible_truncation)]
    pub fn fit(self, data: &Array2<f64>, n_components: usize, seed: u64) -> Result<FittedEstimator> {
        match self {
            Self::Pca => {
                let dataset = DatasetBase::from(data.clone());
                let pca = Pca::params(n_components)
                    .whiten(true)
                    .fit(&dataset)
                    .map_err(|e| CryoError::Ml(format!("PCA failed: {e}")))?;
                Ok(FittedEstimator::Pca(pca))
            }
            Self::FastIca => {
                let dataset = DatasetBase::from(data.clone());
                let ica = FastIca::params()
                    .ncomponents(n_components)
                    .random_state(seed as usize)
                    .fit(&dataset)
                    .map_err(|e| CryoError::Ml(format!("FastICA failed: {e}")))?;
                Ok(FittedEstimator::FastIca(ica))
            }
            Self::FactorAnalysis => Ok(FittedEstimator::FactorAnalysis(FactorAnalysis::fit(
                data,
                n_components,
                FA_MAX_ITER,
                seed,
            )?)),
        }
    }
}

/// A fitted decomposition model
pub enum FittedEstimator {
    Pca(Pca<f64>),
    FastIca(FastIca<f64>),
    FactorAnalysis(FactorAnalysis),
}

impl FittedEstimator {
    #[must_use]
    pub const fn kind(&self) -> EstimatorKind {
        match self {
            Self::Pca(_) => EstimatorKind::Pca,
            Self::FastIca(_) => EstimatorKind::FastIca,
            Self::FactorAnalysis(_) => EstimatorKind::FactorAnalysis,
        }
    }

    /// Per-sample coefficients, `N x n_components`
    ///
    /// # Errors
    /// Returns error if the model cannot project the data
    pub fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        match self {
            Self::Pca(model) => {
                let coeffs: Array2<f64> = model.predict(data);
                Ok(coeffs)
            }
            Self::FastIca(model) => {
                let coeffs: Array2<f64> = model.predict(data);
                Ok(coeffs)
            }
            Self::FactorAnalysis(model) => model.transform(data),
        }
    }

    /// Learned basis, one row of length `n_features` per component
    ///
    /// # Errors
    /// Returns error if the model cannot project unit vectors
    pub fn components(&self, n_features: usize) -> Result<Array2<f64>> {
        match self {
            Self::Pca(model) => {
                // Whitening scales each basis row by sqrt(n - 1) / sigma
                let mut basis = model.components().clone();
                for mut row in basis.rows_mut() {
                    let norm = row.dot(&row).sqrt();
                    if norm > 0.0 {
                        row.mapv_inplace(|v| v / norm);
                    }
                }
                Ok(basis)
            }
            Self::FastIca(_) => linear_part(n_features, |x| self.transform(x)),
            Self::FactorAnalysis(model) => Ok(model.components().clone()),
        }
    }
}

/// Recover the linear part of an affine transform from its response to unit vectors.
///
/// Unit vectors are issued `UNIT_CHUNK` rows at a time.
fn linear_part(
    n_features: usize,
    transform: impl Fn(&Array2<f64>) -> Result<Array2<f64>>,
) -> Result<Array2<f64>> {
    let at_zero = transform(&Array2::zeros((1, n_features)))?;
    let mut linear = Array2::zeros((n_features, at_zero.ncols()));

    for start in (0..n_features).step_by(UNIT_CHUNK) {
        let len = UNIT_CHUNK.min(n_features - start);
        let units =
            Array2::from_shape_fn((len, n_features), |(i, j)| if j == start + i { 1.0 } else { 0.0 });
        let block = transform(&units)? - &at_zero.row(0);
        linear
            .slice_mut(s![start..start + len, ..])
            .assign(&block);
    }
    Ok(linear.reversed_axes())
}

/// Linear Gaussian latent factor model fitted by expectation-maximisation
#[derive(Debug, Clone)]
pub struct FactorAnalysis {
    mean: Array1<f64>,
    /// `k x M` loading matrix
    components: Array2<f64>,
    noise_variance: Array1<f64>,
    n_iter: usize,
}

impl FactorAnalysis {
    /// # Errors
    /// Returns error if the data is empty or a latent covariance becomes singular
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(data: &Array2<f64>, n_components: usize, max_iter: usize, seed: u64) -> Result<Self> {
        let (n, m) = data.dim();
        if n == 0 || n_components == 0 || n_components > m {
            return Err(CryoError::Ml(format!(
                "FactorAnalysis needs 1..={m} components on non-empty data, got {n_components}"
            )));
        }

        let mean = data
            .mean_axis(Axis(0))
            .ok_or_else(|| CryoError::Ml("FactorAnalysis on empty data".into()))?;
        let centered = data - &mean;
        let var = centered.mapv(|v| v * v).sum_axis(Axis(0)) / n as f64;

        let mut rng = StdRng::seed_from_u64(seed);
        let mut loadings =
            Array2::from_shape_fn((m, n_components), |_| rng.random_range(-0.1..0.1));
        let mut psi = var.mapv(|v| v.max(FA_MIN_NOISE));

        let mut n_iter = 0;
        for _ in 0..max_iter {
            n_iter += 1;
            let (ez, g) = posterior_mean(&centered, &loadings, &psi)?;

            let ezz = g * n as f64 + ez.t().dot(&ez);
            let xt_ez = centered.t().dot(&ez);
            loadings = xt_ez.dot(&invert(&ezz)?);

            let explained = (&loadings * &xt_ez).sum_axis(Axis(1)) / n as f64;
            let new_psi = (&var - &explained).mapv(|v| v.max(FA_MIN_NOISE));
            let delta = (&new_psi - &psi)
                .iter()
                .fold(0.0f64, |acc, d| acc.max(d.abs()));
            psi = new_psi;
            if delta < FA_TOL {
                break;
            }
        }

        Ok(Self {
            mean,
            components: loadings.reversed_axes(),
            noise_variance: psi,
            n_iter,
        })
    }

    /// Posterior mean of the latent factors for each sample
    ///
    /// # Errors
    /// Returns error if the column count differs from the fitted data
    pub fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        if data.ncols() != self.mean.len() {
            return Err(CryoError::Ml(format!(
                "FactorAnalysis fitted on {} columns, got {}",
                self.mean.len(),
                data.ncols()
            )));
        }
        let centered = data - &self.mean;
        let loadings = self.components.t().to_owned();
        let (ez, _) = posterior_mean(&centered, &loadings, &self.noise_variance)?;
        Ok(ez)
    }

    #[must_use]
    pub const fn components(&self) -> &Array2<f64> {
        &self.components
    }

    #[must_use]
    pub const fn noise_variance(&self) -> &Array1<f64> {
        &self.noise_variance
    }

    #[must_use]
    pub const fn n_iter(&self) -> usize {
        self.n_iter
    }
}

/// E-step: returns `E[z|x]` for every row and the posterior covariance
fn posterior_mean(
    centered: &Array2<f64>,
    loadings: &Array2<f64>,
    psi: &Array1<f64>,
) -> Result<(Array2<f64>, Array2<f64>)> {
    let k = loadings.ncols();
    // W^T Psi^-1, scaled column-wise
    let wt_psi_inv = &loadings.t() / psi;
    let precision = Array2::<f64>::eye(k) + wt_psi_inv.dot(loadings);
    let g = invert(&precision)?;
    let ez = centered.dot(&wt_psi_inv.t()).dot(&g);
    Ok((ez, g))
}

/// Gauss-Jordan inverse of a small square matrix
fn invert(matrix: &Array2<f64>) -> Result<Array2<f64>> {
    let n = matrix.nrows();
    let mut a = matrix.clone();
    let mut inv = Array2::<f64>::eye(n);

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() < 1e-12 {
            return Err(CryoError::Ml("Singular matrix in factor analysis".into()));
        }
        if pivot != col {
            for j in 0..n {
                a.swap([pivot, j], [col, j]);
                inv.swap([pivot, j], [col, j]);
            }
        }

        let p = a[[col, col]];
        a.row_mut(col).mapv_inplace(|v| v / p);
        inv.row_mut(col).mapv_inplace(|v| v / p);

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor == 0.0 {
                continue;
            }
            let a_col = a.row(col).to_owned();
            let inv_col = inv.row(col).to_owned();
            a.row_mut(row).scaled_add(-factor, &a_col);
            inv.row_mut(row).scaled_add(-factor, &inv_col);
        }
    }

    Ok(inv)
}
