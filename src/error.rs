use thiserror::Error;

/// Crate-wide error type for fallible component boundaries.
///
/// Bootstrap/CLI code works in `anyhow::Result` (see `main.rs`); this type
/// is for the internal seams — cache, jobs, checker.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("File not found or expired. Please check again.")]
    NotFound,

    #[error("invalid subscription content: {0}")]
    InvalidContent(String),

    #[error("internal error: {0}")]
    Internal(String),
}
