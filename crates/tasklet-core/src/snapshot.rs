use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::datetime::{parse_iso, parse_timestamp};
use crate::error::StorageError;
use crate::sanitize::{is_blank_html, sanitize};
use crate::task::{Task, TaskId};
use crate::templates::{DEFAULT_TEMPLATE_MAX_LENGTH, TemplateSet, clean_template_name};
use crate::view::{ActiveFilter, ActiveView};

/// Schema version written by this build. Version 1 snapshots carry the
/// legacy default template on every task.
pub const CURRENT_VERSION: u32 = 2;

const LEGACY_VERSION: u32 = 1;

/// Full persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub tasks: Vec<Task>,
    pub templates: Vec<String>,
    pub active_filter: ActiveFilter,
    pub active_view: ActiveView,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            version: CURRENT_VERSION,
            tasks: Vec::new(),
            templates: Vec::new(),
            active_filter: ActiveFilter::All,
            active_view: ActiveView::Tasks,
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Rules applied while validating a stored snapshot.
#[derive(Debug, Clone)]
pub struct MigrationRules {
    /// Label auto-assigned by older builds; stripped when migrating.
    pub legacy_default: Option<String>,
    pub template_max_length: usize,
    /// Stand-in creation time for records that lost theirs.
    pub loaded_at: DateTime<Utc>,
}

impl MigrationRules {
    pub fn new(legacy_default: Option<String>, template_max_length: usize) -> Self {
        Self {
            legacy_default,
            template_max_length,
            loaded_at: Utc::now(),
        }
    }

    fn is_legacy_label(&self, label: &str) -> bool {
        self.legacy_default
            .as_deref()
            .is_some_and(|legacy| legacy.to_lowercase() == label.to_lowercase())
    }
}

impl Default for MigrationRules {
    fn default() -> Self {
        Self::new(Some("General".to_string()), DEFAULT_TEMPLATE_MAX_LENGTH)
    }
}

pub fn encode_snapshot(snapshot: &Snapshot) -> Result<String, StorageError> {
    Ok(serde_json::to_string(snapshot)?)
}

/// Validates stored text field by field. Never fails: unreadable input
/// yields an empty snapshot and malformed task records are dropped.
#[tracing::instrument(skip(raw, rules), fields(bytes = raw.len()))]
pub fn decode_snapshot(raw: &str, rules: &MigrationRules) -> Snapshot {
    let root = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!(kind = json_kind(&other), "snapshot is not an object; starting empty");
            return Snapshot::empty();
        }
        Err(err) => {
            warn!(error = %err, "snapshot is not valid json; starting empty");
            return Snapshot::empty();
        }
    };

    let version = root
        .get("version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(LEGACY_VERSION);

    let migrating = version < CURRENT_VERSION;
    if version > CURRENT_VERSION {
        warn!(version, current = CURRENT_VERSION, "snapshot from a newer build; loading best-effort");
    }

    let mut decoder = Decoder {
        rules,
        migrating,
        templates: TemplateSet::new(),
        seen: HashSet::new(),
        stripped: 0,
    };

    if let Some(Value::Array(labels)) = root.get("templates") {
        for label in labels.iter().filter_map(Value::as_str) {
            decoder.register(label);
        }
    }

    let mut tasks = Vec::new();
    let mut dropped = 0usize;
    if let Some(Value::Array(records)) = root.get("tasks") {
        for (idx, record) in records.iter().enumerate() {
            match decoder.task(record) {
                Ok(task) => tasks.push(task),
                Err(Rejected::Duplicate(id)) => {
                    warn!(idx, %id, "dropping task with duplicate id");
                    dropped += 1;
                }
                Err(Rejected::Malformed) => {
                    warn!(idx, "dropping malformed task record");
                    dropped += 1;
                }
            }
        }
    }

    let active_filter = root
        .get("activeFilter")
        .and_then(Value::as_str)
        .map(|raw| decoder.filter(raw))
        .unwrap_or_default();

    let active_view = root
        .get("activeView")
        .and_then(Value::as_str)
        .and_then(ActiveView::parse)
        .unwrap_or_default();

    if migrating {
        info!(
            from = version,
            to = CURRENT_VERSION,
            stripped = decoder.stripped,
            "migrated legacy snapshot"
        );
    }
    debug!(tasks = tasks.len(), dropped, templates = decoder.templates.len(), "decoded snapshot");

    Snapshot {
        version: CURRENT_VERSION,
        tasks,
        templates: decoder.templates.as_slice().to_vec(),
        active_filter,
        active_view,
    }
}

enum Rejected {
    Malformed,
    Duplicate(TaskId),
}

struct Decoder<'a> {
    rules: &'a MigrationRules,
    migrating: bool,
    templates: TemplateSet,
    seen: HashSet<TaskId>,
    stripped: usize,
}

impl Decoder<'_> {
    /// Cleans and registers a label, returning its canonical spelling.
    /// During migration the legacy default label is discarded.
    fn register(&mut self, raw: &str) -> Option<String> {
        let cleaned = clean_template_name(raw, self.rules.template_max_length)?;
        if self.migrating && self.rules.is_legacy_label(&cleaned) {
            self.stripped += 1;
            return None;
        }
        Some(self.templates.insert(&cleaned))
    }

    /// Validates one record. Templates are only registered for records
    /// that are kept.
    fn task(&mut self, record: &Value) -> Result<Task, Rejected> {
        let fields = record.as_object().ok_or(Rejected::Malformed)?;

        let id = record_id(fields).ok_or(Rejected::Malformed)?;
        if self.seen.contains(&id) {
            return Err(Rejected::Duplicate(id));
        }

        let content_html = fields
            .get("contentHtml")
            .and_then(Value::as_str)
            .map(sanitize)
            .ok_or(Rejected::Malformed)?;
        if is_blank_html(&content_html) {
            return Err(Rejected::Malformed);
        }

        let template = fields
            .get("template")
            .and_then(Value::as_str)
            .and_then(|raw| self.register(raw));

        let due_date = fields
            .get("dueDate")
            .and_then(Value::as_str)
            .and_then(|raw| parse_iso(raw.trim()));

        let created_at = fields
            .get("createdAt")
            .and_then(parse_timestamp)
            .unwrap_or(self.rules.loaded_at);

        let completed = fields
            .get("completed")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let completed_at = if completed {
            Some(
                fields
                    .get("completedAt")
                    .and_then(parse_timestamp)
                    .unwrap_or(created_at),
            )
        } else {
            None
        };

        self.seen.insert(id.clone());
        Ok(Task {
            id,
            content_html,
            template,
            due_date,
            created_at,
            completed,
            completed_at,
        })
    }

    fn filter(&self, raw: &str) -> ActiveFilter {
        match ActiveFilter::from_stored(raw) {
            ActiveFilter::Template(label) => match self.templates.resolve(&label) {
                Some(canonical) => ActiveFilter::Template(canonical.to_string()),
                None => ActiveFilter::All,
            },
            other => other,
        }
    }
}

fn record_id(fields: &Map<String, Value>) -> Option<TaskId> {
    match fields.get("id")? {
        Value::String(raw) if !raw.trim().is_empty() => Some(TaskId::from(raw.as_str())),
        Value::Number(number) => Some(TaskId::from(number.to_string())),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
