//! Prioritization orchestrator.
//!
//! Each task is classified on its own:
//! - dependencies unmet → `Blocked`, score -1, never extracted or scored
//! - features invalid or scorer failed → `Error`, score -2, error message kept
//! - otherwise → `Ready` with the scorer's output
//!
//! Output is the Ready tasks stably sorted by score (highest first), followed
//! by Blocked and Error tasks in input order. Every input task appears exactly
//! once.

use std::collections::HashSet;
use std::fmt;

use chrono::{Local, NaiveDateTime};
use serde::ser::{Error as _, SerializeMap};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::error::{PrioritizeError, Result, ScoreError};
use crate::features::{extract_features, FeatureVector};
use crate::gate::dependencies_met;
use crate::scorer::{Scorer, ScorerHandle};
use crate::task::{Task, TaskId};

pub const BLOCKED_SCORE: f64 = -1.0;
pub const ERROR_SCORE: f64 = -2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Readiness {
    Ready,
    Blocked,
    Error,
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Ready => "Ready",
            Self::Blocked => "Blocked",
            Self::Error => "Error",
        })
    }
}

/// A task annotated with its outcome.
///
/// Serializes as the input record with `score`, `status` and (for errors)
/// `error` set on top, so the input `status` is replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct PrioritizedTask {
    pub task: Task,
    pub score: f64,
    pub status: Readiness,
    pub error: Option<String>,
}

impl PrioritizedTask {
    fn ready(task: &Task, score: f64) -> Self {
        Self {
            task: task.clone(),
            score,
            status: Readiness::Ready,
            error: None,
        }
    }

    fn blocked(task: &Task) -> Self {
        Self {
            task: task.clone(),
            score: BLOCKED_SCORE,
            status: Readiness::Blocked,
            error: None,
        }
    }

    fn errored(task: &Task, error: &PrioritizeError) -> Self {
        Self {
            task: task.clone(),
            score: ERROR_SCORE,
            status: Readiness::Error,
            error: Some(error.to_string()),
        }
    }

    pub fn id(&self) -> Option<TaskId> {
        self.task.id
    }
}

impl Serialize for PrioritizedTask {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let fields = match serde_json::to_value(&self.task).map_err(S::Error::custom)? {
            Value::Object(fields) => fields,
            other => return Err(S::Error::custom(format!("task serialized as {other}"))),
        };

        let mut map = serializer.serialize_map(None)?;
        for (key, value) in &fields {
            if !matches!(key.as_str(), "score" | "status" | "error") {
                map.serialize_entry(key, value)?;
            }
        }
        map.serialize_entry("score", &self.score)?;
        map.serialize_entry("status", &self.status)?;
        if let Some(err) = &self.error {
            map.serialize_entry("error", err)?;
        }
        map.end()
    }
}

/// Rank `tasks` given the ids already completed, measuring deadlines from `now`.
///
/// Fails only when the scorer never loaded; in that case no task is examined.
pub fn prioritize(
    handle: &ScorerHandle,
    tasks: &[Task],
    completed: &HashSet<TaskId>,
    now: NaiveDateTime,
) -> Result<Vec<PrioritizedTask>> {
    let scorer = handle.scorer().inspect_err(|e| {
        error!(error = %e, "prioritization requested but the model is not loaded");
    })?;

    let mut ready = Vec::new();
    let mut held = Vec::new();
    for task in tasks {
        let outcome = evaluate(scorer, task, completed, now);
        match outcome.status {
            Readiness::Ready => ready.push(outcome),
            Readiness::Blocked | Readiness::Error => held.push(outcome),
        }
    }

    // Stable: equal scores keep input order.
    ready.sort_by(|a, b| b.score.total_cmp(&a.score));

    ready.extend(held);
    info!(summary = %Summary::of(&ready), "prioritized tasks");
    Ok(ready)
}

/// [`prioritize`] against the local wall clock.
pub fn prioritize_now(
    handle: &ScorerHandle,
    tasks: &[Task],
    completed: &HashSet<TaskId>,
) -> Result<Vec<PrioritizedTask>> {
    prioritize(handle, tasks, completed, Local::now().naive_local())
}

fn evaluate(
    scorer: &dyn Scorer,
    task: &Task,
    completed: &HashSet<TaskId>,
    now: NaiveDateTime,
) -> PrioritizedTask {
    if !dependencies_met(&task.dependencies, completed) {
        debug!(task = %task.label(), deps = ?task.dependencies, "blocked on dependencies");
        return PrioritizedTask::blocked(task);
    }

    match score_task(scorer, task, now) {
        Ok(score) => PrioritizedTask::ready(task, score),
        Err(e) => {
            error!(task = %task.label(), error = %e, "could not score task");
            PrioritizedTask::errored(task, &e)
        }
    }
}

fn score_task(scorer: &dyn Scorer, task: &Task, now: NaiveDateTime) -> Result<f64> {
    let raw = extract_features(task, now);
    let features = FeatureVector::from_values(&raw)?;
    let score = scorer.score(&features)?;
    if !score.is_finite() {
        return Err(ScoreError::NonFiniteOutput(score).into());
    }
    debug!(task = %task.label(), score, "prediction");
    Ok(score)
}

/// Host-facing engine: a scorer handle fixed at construction.
#[derive(Debug, Clone)]
pub struct Prioritizer {
    handle: ScorerHandle,
}

impl Prioritizer {
    pub fn new(handle: ScorerHandle) -> Self {
        Self { handle }
    }

    pub fn is_available(&self) -> bool {
        self.handle.is_available()
    }

    pub fn prioritize(
        &self,
        tasks: &[Task],
        completed: &HashSet<TaskId>,
        now: NaiveDateTime,
    ) -> Result<Vec<PrioritizedTask>> {
        prioritize(&self.handle, tasks, completed, now)
    }

    pub fn prioritize_now(
        &self,
        tasks: &[Task],
        completed: &HashSet<TaskId>,
    ) -> Result<Vec<PrioritizedTask>> {
        prioritize_now(&self.handle, tasks, completed)
    }
}

/// `(id, score)` for every result that has an id, in output order.
///
/// For hosts that persist scores between runs; tasks without an id are skipped.
pub fn score_updates(results: &[PrioritizedTask]) -> Vec<(TaskId, f64)> {
    results
        .iter()
        .filter_map(|r| r.id().map(|id| (id, r.score)))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub ready: usize,
    pub blocked: usize,
    pub error: usize,
}

impl Summary {
    pub fn of(results: &[PrioritizedTask]) -> Self {
        let mut s = Self::default();
        for r in results {
            match r.status {
                Readiness::Ready => s.ready += 1,
                Readiness::Blocked => s.blocked += 1,
                Readiness::Error => s.error += 1,
            }
        }
        s
    }

    pub fn total(&self) -> usize {
        self.ready + self.blocked + self.error
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ready, {} blocked, {} error",
            self.ready, self.blocked, self.error
        )
    }
}
