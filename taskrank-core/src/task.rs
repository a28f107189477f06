//! Task model as handed over by the CRUD layer.
//!
//! Records arrive loosely typed, so the fields that feed the feature vector keep
//! their raw JSON value. A wrongly typed `urgency_score` then shows up as an
//! `Error` outcome for that one task instead of failing the whole decode.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub type TaskId = i64;

/// Input task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Absent for synthetic/test tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskId>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    /// Expected to be a `YYYY-MM-DD` string; `Null` when absent.
    #[serde(default)]
    pub deadline: Value,

    #[serde(default = "default_urgency_score")]
    pub urgency_score: Value,

    #[serde(default = "default_normalized_urgency")]
    pub normalized_urgency: Value,

    #[serde(default, deserialize_with = "null_as_default")]
    pub dependencies: Vec<TaskId>,

    /// Nullable in the task store; `null` reads as empty.
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,

    /// Any other keys on the record, carried through to the output untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_urgency_score() -> Value {
    Value::from(0)
}

fn default_normalized_urgency() -> Value {
    Value::from(0.0)
}

impl Default for Task {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            deadline: Value::Null,
            urgency_score: default_urgency_score(),
            normalized_urgency: default_normalized_urgency(),
            dependencies: Vec::new(),
            status: String::new(),
            extra: Map::new(),
        }
    }
}

impl Task {
    pub fn new(id: TaskId, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
            status: "Pending".to_string(),
            ..Self::default()
        }
    }

    pub fn with_deadline(mut self, deadline: impl Into<String>) -> Self {
        self.deadline = Value::String(deadline.into());
        self
    }

    pub fn with_urgency(mut self, urgency_score: i64) -> Self {
        self.urgency_score = Value::from(urgency_score);
        self
    }

    pub fn with_normalized_urgency(mut self, normalized: f64) -> Self {
        self.normalized_urgency = Value::from(normalized);
        self
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies = deps.into_iter().collect();
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn is_overdue(&self) -> bool {
        self.status.to_lowercase() == "overdue"
    }

    /// Label used in log lines.
    pub fn label(&self) -> String {
        match self.id {
            Some(id) => id.to_string(),
            None => "unknown".to_string(),
        }
    }
}

/// Parse the comma-separated dependency encoding used by the task store,
/// e.g. `"1,2,3"`. Empty segments (and so a trailing comma) are skipped.
pub fn parse_dependency_list(raw: &str) -> Result<Vec<TaskId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<TaskId>()
                .with_context(|| format!("invalid task id '{s}'"))
        })
        .collect()
}
