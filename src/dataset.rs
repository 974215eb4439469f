//! File-level glue: listing, MRCS frame extraction and `.npy` dataset creation

use crate::mrc::MrcStack;
use crate::structs::{CryoError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array2;
use ndarray_npy::{read_npy, write_npy, ReadNpyError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const STACK_EXTENSION: &str = "mrcs";

/// List files in `dir` whose name ends with `ext`, sorted by path
///
/// # Errors
/// Returns error if the directory cannot be read
pub fn files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            continue;
        }
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(ext))
        {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Extract every frame of an `.mrcs` stack as a 2D array
///
/// # Errors
/// Returns `UnsupportedExtension` for any other extension, or a decode error
pub fn frames_from_mrcs(path: &Path) -> Result<Vec<Array2<f32>>> {
    if path.extension().and_then(|e| e.to_str()) != Some(STACK_EXTENSION) {
        return Err(CryoError::UnsupportedExtension(path.to_path_buf()));
    }
    Ok(MrcStack::open(path)?.into_frames())
}

/// Concatenate the frames of several `.mrcs` files, in path order.
///
/// Everything is held in memory.
///
/// # Errors
/// Returns the first failure from [`frames_from_mrcs`]
pub fn frames_from_paths(paths: &[PathBuf]) -> Result<Vec<Array2<f32>>> {
    let mut all = Vec::new();
    for path in paths {
        all.extend(frames_from_mrcs(path)?);
    }
    Ok(all)
}

/// Convert per-class directories of `.mrcs` stacks into one `.npy` per frame.
///
/// Frames of class `c` are written to `paths_out[i]/{c}_{n}.npy`, with `n`
/// counting from zero within each class.
///
/// # Errors
/// Returns error if the three lists differ in length, or on any IO/decode failure
pub fn create_dataset(
    classes: &[String],
    paths_in: &[PathBuf],
    paths_out: &[PathBuf],
    ext: &str,
) -> Result<usize> {
    if classes.len() != paths_in.len() || classes.len() != paths_out.len() {
        return Err(CryoError::Config(format!(
            "got {} classes, {} input dirs and {} output dirs",
            classes.len(),
            paths_in.len(),
            paths_out.len()
        )));
    }

    let style = ProgressStyle::default_bar()
        .template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());

    let mut total = 0;
    for ((class, dir_in), dir_out) in classes.iter().zip(paths_in).zip(paths_out) {
        fs::create_dir_all(dir_out)?;
        let in_paths = files_with_extension(dir_in, ext)?;
        let frames = frames_from_paths(&in_paths)?;
        info!(
            "Converting {} frames from {} files for class {class}",
            frames.len(),
            in_paths.len()
        );

        let bar = ProgressBar::new(frames.len() as u64);
        bar.set_style(style.clone());
        bar.set_message(class.clone());

        for (counter, frame) in frames.iter().enumerate() {
            write_npy(dir_out.join(format!("{class}_{counter}.npy")), frame)?;
            bar.inc(1);
        }
        bar.finish();
        total += frames.len();
    }

    Ok(total)
}

/// Load 2D `.npy` arrays stored as either `f32` or `f64`
///
/// # Errors
/// Returns error if a file is missing or holds a different dtype/rank
pub fn load_npy_paths(paths: &[PathBuf]) -> Result<Vec<Array2<f64>>> {
    paths.iter().map(|p| load_npy(p)).collect()
}

fn load_npy(path: &Path) -> Result<Array2<f64>> {
    match read_npy::<_, Array2<f32>>(path) {
        Ok(arr) => Ok(arr.mapv(f64::from)),
        Err(ReadNpyError::WrongDescriptor(_)) => Ok(read_npy::<_, Array2<f64>>(path)?),
        Err(e) => Err(e.into()),
    }
}
