use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("NPY read error: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),

    #[error("NPY write error: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("MRC error: {0}")]
    Mrc(String),

    #[error("Unsupported file extension: {}", .0.display())]
    UnsupportedExtension(PathBuf),

    #[error("Label file error at line {line}: {reason}")]
    LabelParse { line: usize, reason: String },

    #[error("{0}")]
    NotFitted(&'static str),

    #[error("ML error: {0}")]
    Ml(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CryoError>;
