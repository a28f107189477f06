//! Feature extraction and validation.
//!
//! A task becomes five raw values, in this fixed order:
//! `[days_left, urgency_score, dependency_count, normalized_urgency, status_overdue]`.
//!
//! Extraction never fails. A missing or unparseable deadline becomes
//! [`DAYS_LEFT_SENTINEL`], which ranks the task as maximally not urgent.
//! The raw values are then checked by [`validate_features`] before they are
//! turned into a typed [`FeatureVector`] for the scorer.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::PrioritizeError;
use crate::task::Task;

pub const FEATURE_COUNT: usize = 5;

/// Canonical feature ordering. Artifacts ship their own list; see `artifact`.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "days_left",
    "urgency_score",
    "dependency_count",
    "normalized_urgency",
    "status_overdue",
];

/// Substituted for `days_left` when the deadline cannot be read.
pub const DAYS_LEFT_SENTINEL: i64 = 9999;

const DEADLINE_FORMAT: &str = "%Y-%m-%d";

/// Extract the raw feature values for `task`, measuring deadlines against `now`.
pub fn extract_features(task: &Task, now: NaiveDateTime) -> Vec<Value> {
    let days_left = match parse_deadline(&task.deadline) {
        Ok(deadline) => days_until(deadline, now),
        Err(reason) => {
            warn!(task = %task.label(), %reason, "invalid deadline, using sentinel");
            DAYS_LEFT_SENTINEL
        }
    };

    let values = vec![
        Value::from(days_left),
        task.urgency_score.clone(),
        Value::from(task.dependencies.len()),
        task.normalized_urgency.clone(),
        Value::from(u8::from(task.is_overdue())),
    ];

    debug!(task = %task.label(), features = ?values, "extracted features");
    values
}

fn parse_deadline(deadline: &Value) -> Result<NaiveDate, String> {
    match deadline {
        Value::String(s) => NaiveDate::parse_from_str(s, DEADLINE_FORMAT)
            .map_err(|e| format!("'{s}': {e}")),
        Value::Null => Err("missing".to_string()),
        other => Err(format!("expected a date string, got {other}")),
    }
}

/// Whole days from `now` until the start of `deadline`, rounded toward
/// negative infinity. Once any part of `now`'s day has elapsed, a deadline
/// on that same day is already one day late.
fn days_until(deadline: NaiveDate, now: NaiveDateTime) -> i64 {
    let whole = (deadline - now.date()).num_days();
    if now.time() > NaiveTime::MIN {
        whole - 1
    } else {
        whole
    }
}

/// Accept iff there are exactly five values and each one is a JSON number.
pub fn validate_features(values: &[Value]) -> bool {
    if values.len() != FEATURE_COUNT {
        error!(len = values.len(), features = ?values, "invalid feature format");
        return false;
    }
    if !values.iter().all(Value::is_number) {
        error!(features = ?values, "invalid feature type");
        return false;
    }
    true
}

/// Validated, typed scorer input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    /// Validate raw values and convert them.
    pub fn from_values(values: &[Value]) -> Result<Self, PrioritizeError> {
        if !validate_features(values) {
            let rendered: Vec<String> = values.iter().map(Value::to_string).collect();
            return Err(PrioritizeError::InvalidFeatures(format!(
                "[{}]",
                rendered.join(", ")
            )));
        }

        let mut out = [0.0; FEATURE_COUNT];
        for (slot, value) in out.iter_mut().zip(values) {
            *slot = value.as_f64().ok_or_else(|| {
                PrioritizeError::InvalidFeatures(format!("{value} is not representable as f64"))
            })?;
        }
        Ok(Self(out))
    }

    pub fn as_array(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }

    pub fn days_left(&self) -> f64 {
        self.0[0]
    }

    pub fn urgency_score(&self) -> f64 {
        self.0[1]
    }

    pub fn dependency_count(&self) -> f64 {
        self.0[2]
    }

    pub fn normalized_urgency(&self) -> f64 {
        self.0[3]
    }

    pub fn is_overdue(&self) -> bool {
        self.0[4] != 0.0
    }
}
