//! Artifact writers for the tile, featurize and train commands

use crate::structs::{
    CellKey, CryoError, Evaluation, FeatureSet, LabeledRow, Point, Result, RocCurve, RocReport,
};
use image::{GrayImage, Luma};
use ndarray::Array2;
use ndarray_npy::write_npy;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Gap between tiles in a component grid, in pixels
const GRID_PAD: u32 = 2;
const GRID_BACKGROUND: Luma<u8> = Luma([0]);

/// Write `summary.txt`
///
/// # Errors
/// Returns error if file cannot be written
pub fn write_summary(output_dir: &Path, content: &str) -> Result<()> {
    let path = output_dir.join("summary.txt");
    fs::write(path, content)?;
    Ok(())
}

/// Write every tile as `{micrograph}_{row}_{col}.npy`
///
/// # Errors
/// Returns error if the directory or a file cannot be written
pub fn write_tiles(output_dir: &Path, tiles: &BTreeMap<CellKey, Array2<f32>>) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)?;
    let mut written = Vec::with_capacity(tiles.len());
    for (key, tile) in tiles {
        let path = output_dir.join(format!("{}_{}_{}.npy", key.micrograph, key.row, key.col));
        write_npy(&path, tile)?;
        written.push(path);
    }
    Ok(written)
}

/// Write `annotations.json` - matched points per cell
///
/// # Errors
/// Returns error if file cannot be written
pub fn write_annotations_json(
    output_dir: &Path,
    annotations: &BTreeMap<CellKey, Vec<Point>>,
) -> Result<PathBuf> {
    let entries: Vec<_> = annotations
        .iter()
        .map(|(key, points)| AnnotationEntry {
            micrograph: key.micrograph,
            row: key.row,
            col: key.col,
            points: points.iter().map(|p| [p.x, p.y]).collect(),
        })
        .collect();

    let path = output_dir.join("annotations.json");
    fs::write(&path, serde_json::to_string_pretty(&entries)?)?;
    Ok(path)
}

/// Write `features.csv` - one coefficient column per label plus `class`
///
/// # Errors
/// Returns error if the class count differs from the sample count or the
/// file cannot be written
pub fn write_features_csv(output_dir: &Path, features: &FeatureSet, classes: &[usize]) -> Result<PathBuf> {
    if classes.len() != features.n_samples() {
        return Err(CryoError::Ml(format!(
            "Got {} class labels for {} samples",
            classes.len(),
            features.n_samples()
        )));
    }

    let path = output_dir.join("features.csv");
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(features.labels.iter().map(String::as_str).chain(["class"]))?;

    for (row, class) in features.coeffs.rows().into_iter().zip(classes) {
        let mut record: Vec<String> = row.iter().map(ToString::to_string).collect();
        record.push(class.to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(path)
}

/// Write `roc.csv` (long format) and `roc.json`
///
/// # Errors
/// Returns error if a file cannot be written
pub fn write_roc(output_dir: &Path, report: &RocReport) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_dir.join("roc.csv"))?;
    writer.write_record(["curve", "fpr", "tpr", "threshold"])?;
    write_curve(&mut writer, "No Skill", &report.no_skill)?;
    write_curve(&mut writer, "Logistic", &report.model)?;
    writer.flush()?;

    let json = serde_json::to_string_pretty(report)?;
    fs::write(output_dir.join("roc.json"), json)?;
    Ok(())
}

fn write_curve(writer: &mut csv::Writer<fs::File>, name: &str, curve: &RocCurve) -> Result<()> {
    for ((fpr, tpr), threshold) in curve.fpr.iter().zip(&curve.tpr).zip(&curve.thresholds) {
        writer.write_record([
            name.to_string(),
            fpr.to_string(),
            tpr.to_string(),
            threshold.to_string(),
        ])?;
    }
    Ok(())
}

/// Write `predictions.csv` - probability and hard label for every row
///
/// # Errors
/// Returns error if file cannot be written
pub fn write_predictions(output_dir: &Path, predictions: &[Evaluation<f64, LabeledRow>]) -> Result<PathBuf> {
    let path = output_dir.join("predictions.csv");
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(["row_id", "target", "probability", "predicted"])?;
    for eval in predictions {
        let predicted = u8::from(eval.key >= 0.5);
        writer.write_record([
            eval.value.row_id.to_string(),
            eval.value.target.to_string(),
            format!("{:.6}", eval.key),
            predicted.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(path)
}

/// Render equally-shaped components side by side as one grayscale grid.
///
/// Each component is scaled symmetrically about zero by its own largest
/// absolute value.
///
/// # Errors
/// Returns error if there are no images, `n_col` is zero, shapes differ, or
/// the PNG cannot be written
pub fn write_component_grid(path: &Path, images: &[Array2<f64>], n_col: usize) -> Result<()> {
    let first = images
        .first()
        .ok_or_else(|| CryoError::Ml("No components to plot".into()))?;
    if n_col == 0 {
        return Err(CryoError::Config("Component grid needs at least one column".into()));
    }
    let (h, w) = first.dim();
    if let Some(bad) = images.iter().find(|img| img.dim() != (h, w)) {
        return Err(CryoError::Ml(format!(
            "Component shape {:?} differs from {:?}",
            bad.dim(),
            (h, w)
        )));
    }

    let n_col = n_col.min(images.len());
    let n_row = images.len().div_ceil(n_col);
    let to_u32 = |v: usize| {
        u32::try_from(v).map_err(|_| CryoError::Config(format!("grid dimension {v} too large")))
    };
    let (tile_h, tile_w) = (to_u32(h)?, to_u32(w)?);
    let width = to_u32(n_col)? * (tile_w + GRID_PAD) + GRID_PAD;
    let height = to_u32(n_row)? * (tile_h + GRID_PAD) + GRID_PAD;

    let mut canvas = GrayImage::from_pixel(width, height, GRID_BACKGROUND);
    for (idx, img) in images.iter().enumerate() {
        let x0 = to_u32(idx % n_col)? * (tile_w + GRID_PAD) + GRID_PAD;
        let y0 = to_u32(idx / n_col)? * (tile_h + GRID_PAD) + GRID_PAD;
        let vmax = img.iter().fold(0.0_f64, |m, v| m.max(v.abs()));

        for ((i, j), &v) in img.indexed_iter() {
            let t = if vmax > 0.0 { v / vmax } else { 0.0 };
            canvas.put_pixel(x0 + to_u32(j)?, y0 + to_u32(i)?, gray_level(t));
        }
    }

    canvas.save(path)?;
    Ok(())
}

/// Map `t` in `[-1, 1]` linearly onto `0..=255`
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn gray_level(t: f64) -> Luma<u8> {
    Luma([((t.clamp(-1.0, 1.0) + 1.0) * 127.5).round() as u8])
}

// JSON output structures

#[derive(Serialize)]
struct AnnotationEntry {
    micrograph: u32,
    row: usize,
    col: usize,
    points: Vec<[f64; 2]>,
}
