use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque task identifier. Fresh ids are UUID v4 strings; ids read back
/// from storage are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    /// Sanitized rich text body, never blank.
    pub content_html: String,

    #[serde(default)]
    pub template: Option<String>,

    #[serde(default)]
    pub due_date: Option<NaiveDate>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        content_html: String,
        template: Option<String>,
        due_date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TaskId::generate(),
            content_html,
            template,
            due_date,
            created_at: now,
            completed: false,
            completed_at: None,
        }
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        if !self.completed {
            self.completed = true;
            self.completed_at = Some(now);
        }
    }

    pub fn mark_active(&mut self) {
        self.completed = false;
        self.completed_at = None;
    }

    /// `completed_at` is set exactly when the task is completed.
    pub fn is_consistent(&self) -> bool {
        self.completed == self.completed_at.is_some()
    }

    pub fn has_template(&self, label: &str) -> bool {
        self.template.as_deref() == Some(label)
    }
}
