//! taskrank-core: readiness gating and model-backed ranking of tasks.

pub mod artifact;
pub mod error;
pub mod features;
pub mod gate;
pub mod prioritize;
pub mod scorer;
pub mod task;

pub use artifact::{check_feature_order, load_feature_names, ForestModel, Node, Tree};
pub use error::{ArtifactError, PrioritizeError, ScoreError};
pub use features::{
    extract_features, validate_features, FeatureVector, DAYS_LEFT_SENTINEL, FEATURE_COUNT,
    FEATURE_NAMES,
};
pub use gate::dependencies_met;
pub use prioritize::{
    prioritize, prioritize_now, score_updates, PrioritizedTask, Prioritizer, Readiness, Summary,
    BLOCKED_SCORE, ERROR_SCORE,
};
pub use scorer::{scorer_fn, FnScorer, Scorer, ScorerHandle};
pub use task::{parse_dependency_list, Task, TaskId};
