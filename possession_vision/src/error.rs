// THEORY:
// The `error` module defines the single error vocabulary shared by every layer of
// the possession engine. Errors fall into two families, and the split matters more
// than the individual variants:
//
// 1.  **Frame-level errors** (`InvalidDetection`, `MissingArtifact`): something is
//     wrong with one frame's data. The pipeline logs them, counts the frame as
//     skipped, and keeps going. One bad label file must never cost the whole run.
// 2.  **Pipeline-level errors** (`InsufficientData`, `NotFitted`, `AlreadyFitted`,
//     configuration and I/O failures): the run cannot produce a meaningful answer.
//     These are surfaced immediately to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for possession engine operations.
pub type Result<T> = std::result::Result<T, PossessionError>;

#[derive(Error, Debug)]
pub enum PossessionError {
    /// Team fitting needs at least one sample per cluster.
    #[error("Insufficient data: team fitting needs at least 2 player samples, got {samples}")]
    InsufficientData { samples: usize },

    #[error("Team model has not been fitted; run the sample collection and fit stages first")]
    NotFitted,

    /// The team model is fixed once fitted; a second fit is refused.
    #[error("Team model is already fitted and cannot be refitted")]
    AlreadyFitted,

    #[error("Invalid detection record '{line}': {reason}")]
    InvalidDetection { line: String, reason: String },

    #[error("Missing detection artifact: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Worker pool error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PossessionError {
    pub fn invalid_detection<L: Into<String>, R: Into<String>>(line: L, reason: R) -> Self {
        Self::InvalidDetection {
            line: line.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that only invalidate the current frame.
    pub fn is_frame_level(&self) -> bool {
        matches!(
            self,
            PossessionError::InvalidDetection { .. } | PossessionError::MissingArtifact(_)
        )
    }
}
