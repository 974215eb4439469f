//! Per-image transforms applied before featurization

use crate::structs::{CryoError, Result};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};
use ndarray::Array2;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use tracing::info;

/// Closed set of image transforms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTransform {
    /// Leave the image untouched
    Identity,
    /// Bilinear resize to `(rows, cols)`, then Roberts cross edge magnitude
    Roberts { resized_shape: (usize, usize) },
    /// Centered `central_width` square crop of the shifted 2D FFT magnitude
    Fft2 { central_width: usize },
}

impl ImageTransform {
    #[must_use]
    pub const fn roberts() -> Self {
        Self::Roberts {
            resized_shape: (28, 28),
        }
    }

    #[must_use]
    pub const fn fft2() -> Self {
        Self::Fft2 { central_width: 50 }
    }

    /// Name used to prefix feature labels
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Identity => "Identity",
            Self::Roberts { .. } => "Roberts",
            Self::Fft2 { .. } => "FFT2",
        }
    }

    /// Transform a single image
    ///
    /// # Errors
    /// Returns error if the image is too small for the transform
    pub fn transform(&self, arr: &Array2<f64>) -> Result<Array2<f64>> {
        match *self {
            Self::Identity => Ok(arr.clone()),
            Self::Roberts { resized_shape } => Ok(roberts(&resize(arr, resized_shape)?)),
            Self::Fft2 { central_width } => fft2_center_crop(arr, central_width),
        }
    }

    /// Transform every image of a batch, preserving order
    ///
    /// # Errors
    /// Returns the first per-image failure
    pub fn apply(&self, data: &[Array2<f64>]) -> Result<Vec<Array2<f64>>> {
        info!("Applying transform: {}", self.name());
        data.iter().map(|arr| self.transform(arr)).collect()
    }
}

fn to_u32(v: usize) -> Result<u32> {
    u32::try_from(v).map_err(|_| CryoError::Config(format!("image dimension {v} too large")))
}

#[allow(clippy::cast_possible_truncation)]
fn resize(arr: &Array2<f64>, (rows, cols): (usize, usize)) -> Result<Array2<f64>> {
    if rows == 0 || cols == 0 {
        return Err(CryoError::Config("resize target must be non-empty".into()));
    }
    let (h, w) = arr.dim();
    let pixels: Vec<f32> = arr.iter().map(|&v| v as f32).collect();
    let buf: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(to_u32(w)?, to_u32(h)?, pixels)
            .ok_or_else(|| CryoError::Ml(format!("cannot build {h}x{w} image buffer")))?;

    let resized = imageops::resize(&buf, to_u32(cols)?, to_u32(rows)?, FilterType::Triangle);
    let values = resized.into_raw().into_iter().map(f64::from).collect();
    Ok(Array2::from_shape_vec((rows, cols), values)?)
}

/// Roberts cross magnitude, clamping at the high-index border
fn roberts(arr: &Array2<f64>) -> Array2<f64> {
    let (h, w) = arr.dim();
    Array2::from_shape_fn((h, w), |(i, j)| {
        let i1 = (i + 1).min(h - 1);
        let j1 = (j + 1).min(w - 1);
        let d1 = arr[[i, j]] - arr[[i1, j1]];
        let d2 = arr[[i, j1]] - arr[[i1, j]];
        ((d1 * d1 + d2 * d2) / 2.0).sqrt()
    })
}

fn fft2_magnitude(arr: &Array2<f64>) -> Array2<f64> {
    let (h, w) = arr.dim();
    let mut planner = FftPlanner::<f64>::new();
    let row_fft = planner.plan_fft_forward(w);
    let col_fft = planner.plan_fft_forward(h);

    let mut spectrum = arr.mapv(|v| Complex::new(v, 0.0));
    for mut row in spectrum.rows_mut() {
        let mut buf = row.to_vec();
        row_fft.process(&mut buf);
        row.iter_mut().zip(buf).for_each(|(dst, v)| *dst = v);
    }
    for mut col in spectrum.columns_mut() {
        let mut buf = col.to_vec();
        col_fft.process(&mut buf);
        col.iter_mut().zip(buf).for_each(|(dst, v)| *dst = v);
    }

    spectrum.mapv(|c| c.norm())
}

fn fft2_center_crop(arr: &Array2<f64>, width: usize) -> Result<Array2<f64>> {
    let (h, w) = arr.dim();
    if width == 0 || width > h || width > w {
        return Err(CryoError::Config(format!(
            "FFT crop width {width} does not fit a {h}x{w} image"
        )));
    }

    let magnitude = fft2_magnitude(arr);
    let start_h = (h - width) / 2;
    let start_w = (w - width) / 2;

    // Index of shifted position k in the unshifted spectrum of length n
    let unshift = |k: usize, n: usize| (k + n - n / 2) % n;
    Ok(Array2::from_shape_fn((width, width), |(i, j)| {
        magnitude[[unshift(start_h + i, h), unshift(start_w + j, w)]]
    }))
}
