//! Consolidated public types for the cryotile crate
//!
//! This module contains the structs and enums shared across the crate.

use ndarray::Array2;
use serde::Serialize;

pub use crate::error::{CryoError, Result};

// ============================================================================
// Tiling Types
// ============================================================================

/// Integer micrograph identifier, as encoded in the label file
pub type MicrographKey = u32;

/// A particle annotation in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Position of a tile within the grid laid over a micrograph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellIndex {
    pub row: usize,
    pub col: usize,
}

/// Composite key `(micrograph, row, col)`.
///
/// Field order makes the derived ordering row-major within each micrograph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CellKey {
    pub micrograph: MicrographKey,
    pub row: usize,
    pub col: usize,
}

impl CellKey {
    #[must_use]
    pub const fn new(micrograph: MicrographKey, cell: CellIndex) -> Self {
        Self {
            micrograph,
            row: cell.row,
            col: cell.col,
        }
    }

    #[must_use]
    pub const fn cell(&self) -> CellIndex {
        CellIndex {
            row: self.row,
            col: self.col,
        }
    }
}

/// Grid decomposition of a micrograph into fixed-size tiles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSpec {
    /// Full micrograph dimensions `(H, W)`
    pub input_shape: (usize, usize),
    /// Tile dimensions `(dimH, dimW)`
    pub sample_shape: (usize, usize),
}

/// Why a (micrograph, cell) pair produced no annotation entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSkip {
    /// The micrograph has no entry in the label file
    UnknownMicrograph(MicrographKey),
    /// No annotation falls strictly inside the cell
    Empty,
}

// ============================================================================
// Feature Types
// ============================================================================

/// Features produced by a featurizer or an ensembler
#[derive(Debug, Clone)]
pub struct FeatureSet {
    /// Basis arrays, one per component, shaped like a single sample
    pub features: Vec<Array2<f64>>,
    /// `N x total_components` coefficient matrix
    pub coeffs: Array2<f64>,
    /// One label per coefficient column
    pub labels: Vec<String>,
}

impl FeatureSet {
    /// Number of coefficient columns
    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.labels.len()
    }

    /// Number of samples
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.coeffs.nrows()
    }
}

/// Numeric table loaded from a features CSV, split into inputs and target
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub names: Vec<String>,
    pub data: Array2<f64>,
    pub target: Vec<f64>,
}

// ============================================================================
// Classifier Types
// ============================================================================

/// Points of a receiver operating characteristic curve
#[derive(Debug, Clone, Serialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub thresholds: Vec<f64>,
}

/// ROC comparison of a trained model against the majority-class baseline
#[derive(Debug, Clone, Serialize)]
pub struct RocReport {
    pub no_skill_auc: f64,
    pub model_auc: f64,
    pub no_skill: RocCurve,
    pub model: RocCurve,
}

impl RocReport {
    /// Title line, as shown above the curve
    #[must_use]
    pub fn title(&self) -> String {
        format!("Logistic: ROC AUC={:.3}", self.model_auc)
    }
}

/// One evaluated row: model output as key, input row as value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation<O, T> {
    pub key: O,
    pub value: T,
}

/// A numeric input row with its target, as scored by the batch evaluator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledRow {
    pub row_id: usize,
    pub values: Vec<f64>,
    pub target: f64,
}
