use crate::csv_reader::CsvData;
use crate::structs::{CryoError, FeatureTable, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Per-column zero-mean, unit-variance scaling.
///
/// Uses the population standard deviation; constant columns keep a scale of 1.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Learn column means and deviations
    ///
    /// # Errors
    /// Returns error if `data` has no rows
    pub fn fit(data: &Array2<f64>) -> Result<Self> {
        let mean = data
            .mean_axis(Axis(0))
            .ok_or_else(|| CryoError::Ml("Cannot scale empty data".into()))?;
        let scale = data
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 { s } else { 1.0 });
        Ok(Self { mean, scale })
    }

    /// # Errors
    /// Returns error if the column count differs from the fitted data
    pub fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        if data.ncols() != self.mean.len() {
            return Err(CryoError::Ml(format!(
                "Scaler fitted on {} columns, got {}",
                self.mean.len(),
                data.ncols()
            )));
        }
        Ok((data - &self.mean) / &self.scale)
    }

    /// Scale a single row
    #[must_use]
    pub fn transform_row(&self, row: ArrayView1<'_, f64>) -> Array1<f64> {
        (&row - &self.mean) / &self.scale
    }

    /// # Errors
    /// Returns error if `data` has no rows
    pub fn fit_transform(data: &Array2<f64>) -> Result<(Self, Array2<f64>)> {
        let scaler = Self::fit(data)?;
        let scaled = scaler.transform(data)?;
        Ok((scaler, scaled))
    }
}

/// Stack equally-shaped images into an `N x (h*w)` matrix
///
/// # Errors
/// Returns error if the batch is empty or shapes differ
pub fn stack_flat(data: &[Array2<f64>]) -> Result<(Array2<f64>, (usize, usize))> {
    let first = data
        .first()
        .ok_or_else(|| CryoError::Ml("Cannot featurize an empty batch".into()))?;
    let shape = first.dim();

    let mut flat = Vec::with_capacity(data.len() * first.len());
    for (i, arr) in data.iter().enumerate() {
        if arr.dim() != shape {
            return Err(CryoError::Ml(format!(
                "Sample {i} has shape {:?}, expected {shape:?}",
                arr.dim()
            )));
        }
        flat.extend(arr.iter().copied());
    }

    let stacked = Array2::from_shape_vec((data.len(), shape.0 * shape.1), flat)?;
    Ok((stacked, shape))
}

impl FeatureTable {
    /// Split a CSV into numeric input columns and a target column
    ///
    /// # Errors
    /// Returns error if the target column is missing or no complete numeric rows exist
    pub fn from_csv(csv: &CsvData, target: &str) -> Result<Self> {
        let target_idx = csv.require_column(target)?;

        let input_cols: Vec<usize> = csv
            .numeric_column_indices()
            .into_iter()
            .filter(|&i| i != target_idx)
            .collect();
        if input_cols.is_empty() {
            return Err(CryoError::Ml("No numeric feature columns found".into()));
        }

        let names: Vec<String> = input_cols
            .iter()
            .filter_map(|&i| csv.headers.get(i).cloned())
            .collect();

        let mut flat = Vec::new();
        let mut targets = Vec::new();
        for row in 0..csv.row_count() {
            if let (Some(values), Some(label)) = (
                csv.numeric_row(row, &input_cols),
                csv.numeric_row(row, &[target_idx]).and_then(|t| t.first().copied()),
            ) {
                flat.extend(values);
                targets.push(label);
            }
        }

        if targets.is_empty() {
            return Err(CryoError::Ml("No complete rows with numeric data".into()));
        }

        let data = Array2::from_shape_vec((targets.len(), names.len()), flat)?;
        Ok(Self {
            names,
            data,
            target: targets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_scaler_zero_mean_unit_variance() {
        let data = array![[1.0, 10.0, 5.0], [2.0, 20.0, 5.0], [3.0, 30.0, 5.0]];
        let (_, scaled) = StandardScaler::fit_transform(&data).expect("scale");

        for col in scaled.columns().into_iter().take(2) {
            assert!(col.mean().expect("mean").abs() < 1e-12);
            assert!((col.std(0.0) - 1.0).abs() < 1e-12);
        }
        // Constant column is centered but not divided by zero
        assert!(scaled.column(2).iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_scaler_row_matches_matrix() {
        let data = array![[1.0, 4.0], [3.0, 8.0]];
        let scaler = StandardScaler::fit(&data).expect("fit");
        let full = scaler.transform(&data).expect("transform");
        assert_eq!(scaler.transform_row(data.row(1)), full.row(1));
    }

    #[test]
    fn test_stack_flat() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let b = array![[5.0, 6.0], [7.0, 8.0]];
        let (stacked, shape) = stack_flat(&[a, b]).expect("stack");
        assert_eq!(shape, (2, 2));
        assert_eq!(stacked.row(1).to_vec(), vec![5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_stack_flat_rejects_mismatch() {
        let a = Array2::zeros((2, 2));
        let b = Array2::zeros((2, 3));
        assert!(stack_flat(&[a, b]).is_err());
        assert!(stack_flat(&[]).is_err());
    }

    #[test]
    fn test_feature_table_from_csv() {
        let mut file = NamedTempFile::new().expect("create");
        file.write_all(b"PCA 0,PCA 1,class\n0.5,1.5,0\nbad,2.5,1\n-1.0,3.0,1\n")
            .expect("write");
        let csv = CsvData::from_file(file.path(), false).expect("parse");

        let table = FeatureTable::from_csv(&csv, "class").expect("table");
        assert_eq!(table.names, vec!["PCA 0", "PCA 1"]);
        assert_eq!(table.data.nrows(), 2);
        assert_eq!(table.target, vec![0.0, 1.0]);
    }

    #[test]
    fn test_feature_table_missing_target() {
        let mut file = NamedTempFile::new().expect("create");
        file.write_all(b"a,b\n1,2\n").expect("write");
        let csv = CsvData::from_file(file.path(), false).expect("parse");
        assert!(matches!(
            FeatureTable::from_csv(&csv, "class"),
            Err(CryoError::Config(_))
        ));
    }
}
