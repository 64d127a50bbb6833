use thiserror::Error;
use std::io;
use std::path::PathBuf;

use crate::field::FieldTag;

/// Error types for the object verification engine
#[derive(Error, Debug)]
pub enum ModeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("Grid dimensions do not match: forecast is {fcst_nx}x{fcst_ny}, observation is {obs_nx}x{obs_ny}")]
    GridMismatch {
        fcst_nx: usize,
        fcst_ny: usize,
        obs_nx: usize,
        obs_ny: usize,
    },

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Object {id} does not exist in the {tag} field ({count} objects)")]
    UnknownObject {
        tag: FieldTag,
        id: usize,
        count: usize,
    },

    #[error("The {comparison} comparison expects {expected} objects but got {found} object {id}")]
    FieldMismatch {
        comparison: &'static str,
        expected: FieldTag,
        found: FieldTag,
        id: usize,
    },

    #[error("No valid intensity values for {tag} object {id}")]
    NoValidIntensity {
        tag: FieldTag,
        id: usize,
    },

    #[error("CSV output error: {0}")]
    CsvOutput(#[from] csv::Error),

    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, ModeError>;
