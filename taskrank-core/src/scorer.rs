//! Scorer boundary.
//!
//! The scorer is a black box: a deterministic `FeatureVector -> f64`. It is
//! loaded once at startup into a [`ScorerHandle`], which is either a usable
//! scorer or an explicit marker that loading failed. The handle never changes
//! after construction; recovering from a bad artifact means building a new one
//! (in practice, restarting the process).

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::artifact::{check_feature_order, load_feature_names, ForestModel};
use crate::error::{PrioritizeError, ScoreError};
use crate::features::FeatureVector;

/// Maps a validated feature vector to a priority score.
///
/// Implementations must be deterministic for a fixed artifact and must not
/// mutate shared state, since one scorer is shared across all calls.
pub trait Scorer: Send + Sync {
    fn score(&self, features: &FeatureVector) -> Result<f64, ScoreError>;
}

impl<S: Scorer + ?Sized> Scorer for Arc<S> {
    fn score(&self, features: &FeatureVector) -> Result<f64, ScoreError> {
        self.as_ref().score(features)
    }
}

/// Adapts a closure into a [`Scorer`].
pub struct FnScorer<F>(F);

pub fn scorer_fn<F>(f: F) -> FnScorer<F>
where
    F: Fn(&FeatureVector) -> Result<f64, ScoreError> + Send + Sync,
{
    FnScorer(f)
}

impl<F> Scorer for FnScorer<F>
where
    F: Fn(&FeatureVector) -> Result<f64, ScoreError> + Send + Sync,
{
    fn score(&self, features: &FeatureVector) -> Result<f64, ScoreError> {
        (self.0)(features)
    }
}

/// Startup-time outcome of loading the scorer.
#[derive(Clone)]
pub enum ScorerHandle {
    Loaded(Arc<dyn Scorer>),
    Unavailable { reason: String },
}

impl ScorerHandle {
    pub fn loaded(scorer: impl Scorer + 'static) -> Self {
        Self::Loaded(Arc::new(scorer))
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Load the model artifact and its feature ordering.
    ///
    /// Never fails: any problem yields `Unavailable` and is logged. The feature
    /// ordering is only compared against the canonical one, never enforced.
    pub fn load(model_path: &Path, features_path: &Path) -> Self {
        let model = match ForestModel::load(model_path) {
            Ok(m) => m,
            Err(e) => {
                error!(path = %model_path.display(), error = %e, "model loading failed");
                return Self::unavailable(e.to_string());
            }
        };

        let names = match load_feature_names(features_path) {
            Ok(n) => n,
            Err(e) => {
                error!(path = %features_path.display(), error = %e, "feature list loading failed");
                return Self::unavailable(e.to_string());
            }
        };

        if let Err(mismatch) = check_feature_order(&names) {
            warn!(%mismatch, "artifact feature ordering differs from extractor ordering");
        }

        info!(
            trees = model.tree_count(),
            classes = model.classes().len(),
            "model and features loaded successfully"
        );
        Self::loaded(model)
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    /// The scorer, or `EngineUnavailable` with the load failure reason.
    pub fn scorer(&self) -> Result<&dyn Scorer, PrioritizeError> {
        match self {
            Self::Loaded(s) => Ok(s.as_ref()),
            Self::Unavailable { reason } => Err(PrioritizeError::EngineUnavailable(reason.clone())),
        }
    }
}

impl fmt::Debug for ScorerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded(_) => f.write_str("ScorerHandle::Loaded"),
            Self::Unavailable { reason } => f
                .debug_struct("ScorerHandle::Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_scorer_is_called() {
        let handle = ScorerHandle::loaded(scorer_fn(|f: &FeatureVector| Ok(f.urgency_score() * 2.0)));
        let scorer = handle.scorer().unwrap();
        let v = FeatureVector::new([1.0, 4.0, 0.0, 0.5, 0.0]);
        assert_eq!(scorer.score(&v), Ok(8.0));
        assert!(handle.is_available());
    }

    #[test]
    fn unavailable_handle_reports_reason() {
        let handle = ScorerHandle::unavailable("model file missing");
        assert!(!handle.is_available());
        match handle.scorer() {
            Err(PrioritizeError::EngineUnavailable(reason)) => assert_eq!(reason, "model file missing"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn load_missing_artifact_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ScorerHandle::load(&dir.path().join("nope.json"), &dir.path().join("f.json"));
        assert!(!handle.is_available());
        assert!(format!("{handle:?}").contains("Unavailable"));
    }

    #[test]
    fn handle_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ScorerHandle>();
    }
}
