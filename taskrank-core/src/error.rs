//! Error types for the prioritization engine.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while ranking tasks.
///
/// Only `EngineUnavailable` is ever returned from [`crate::prioritize`];
/// the other variants are folded into a per-task `Error` outcome.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrioritizeError {
    /// The scoring artifact never loaded. Restart after repairing it.
    #[error("prioritization engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The extracted feature vector had the wrong shape or a non-numeric element.
    #[error("invalid features: {0}")]
    InvalidFeatures(String),

    /// The scorer rejected or failed on a vector.
    #[error("scoring failed: {0}")]
    Scoring(#[from] ScoreError),
}

/// Failure of a single scorer invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("non-finite input at feature {index} ({name})")]
    NonFiniteInput { index: usize, name: &'static str },

    #[error("scorer returned non-finite score {0}")]
    NonFiniteOutput(f64),

    #[error("model produced no prediction")]
    NoPrediction,

    #[error("{0}")]
    Other(String),
}

/// Failure to load the on-disk scoring artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed model: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, PrioritizeError>;
