//! Structural migration of persisted state.
//!
//! Persisted blobs carry no schema version, so migration works by shape:
//! missing fields are backfilled, unknown enum values fall back to their
//! defaults, and records that cannot be identified are dropped. Migration
//! is total. The worst input yields an empty state.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::model::{
    clamp_minutes, is_representable, AppState, DueDate, EpochMs, FocusState, MicroTask, Task,
    TaskStatus, Thought, ThoughtKind, ThoughtStatus,
};
use crate::core::sanitize::display_string;

/// Estimate given to micro-tasks persisted without one.
pub const FALLBACK_ESTIMATE_MINUTES: i64 = 5;

/// What kind of record was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Root,
    Task,
    MicroTask,
    Thought,
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FragmentKind::Root => write!(f, "root"),
            FragmentKind::Task => write!(f, "task"),
            FragmentKind::MicroTask => write!(f, "micro_task"),
            FragmentKind::Thought => write!(f, "thought"),
        }
    }
}

/// Why a record was discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationIssue {
    /// The persisted document is not a JSON object.
    RootNotAnObject,
    /// A collection element is not a JSON object.
    NotAnObject,
    /// No usable `id`.
    MissingId,
    /// Title missing or blank.
    EmptyTitle,
    /// Thought content missing or blank.
    EmptyContent,
}

impl fmt::Display for MigrationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationIssue::RootNotAnObject => write!(f, "document is not an object"),
            MigrationIssue::NotAnObject => write!(f, "record is not an object"),
            MigrationIssue::MissingId => write!(f, "missing id"),
            MigrationIssue::EmptyTitle => write!(f, "empty title"),
            MigrationIssue::EmptyContent => write!(f, "empty content"),
        }
    }
}

/// A fragment of the input excluded from the migrated state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardedFragment {
    pub kind: FragmentKind,
    /// Location in the input, e.g. `tasks[2].microTasks[0]`.
    pub position: String,
    pub issues: Vec<MigrationIssue>,
}

impl DiscardedFragment {
    fn new(kind: FragmentKind, position: impl Into<String>, issues: Vec<MigrationIssue>) -> Self {
        Self {
            kind,
            position: position.into(),
            issues,
        }
    }

    /// Issues joined for display.
    pub fn reason(&self) -> String {
        self.issues
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Migrated state plus everything that was left behind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MigrationReport {
    pub state: AppState,
    pub discarded: Vec<DiscardedFragment>,
}

impl MigrationReport {
    /// True when nothing was dropped.
    pub fn is_clean(&self) -> bool {
        self.discarded.is_empty()
    }
}

/// Upgrade any persisted JSON to the current state shape.
pub fn migrate(raw: &Value) -> AppState {
    migrate_with_report(raw).state
}

/// Upgrade and report every discarded fragment.
pub fn migrate_with_report(raw: &Value) -> MigrationReport {
    let root = match raw {
        Value::Object(root) => root,
        Value::Null => return MigrationReport::default(),
        _ => {
            tracing::warn!("persisted state is not an object; starting empty");
            return MigrationReport {
                state: AppState::default(),
                discarded: vec![DiscardedFragment::new(
                    FragmentKind::Root,
                    "$",
                    vec![MigrationIssue::RootNotAnObject],
                )],
            };
        }
    };

    let mut discarded = Vec::new();

    let tasks = elements(root, "tasks")
        .enumerate()
        .filter_map(|(i, item)| migrate_task(item, &format!("tasks[{i}]"), &mut discarded))
        .collect();

    let thoughts = elements(root, "thoughts")
        .enumerate()
        .filter_map(|(i, item)| migrate_thought(item, &format!("thoughts[{i}]"), &mut discarded))
        .collect();

    let focus = root.get("focus").map(migrate_focus).unwrap_or_default();

    if !discarded.is_empty() {
        tracing::warn!(
            discarded = discarded.len(),
            "dropped invalid records while migrating persisted state"
        );
    }

    MigrationReport {
        state: AppState {
            tasks,
            thoughts,
            focus,
        },
        discarded,
    }
}

/// Elements of an array field; anything else counts as empty.
fn elements<'a>(record: &'a Map<String, Value>, key: &str) -> std::slice::Iter<'a, Value> {
    match record.get(key) {
        Some(Value::Array(items)) => items.iter(),
        _ => (&[] as &[Value]).iter(),
    }
}

fn migrate_task(
    item: &Value,
    position: &str,
    discarded: &mut Vec<DiscardedFragment>,
) -> Option<Task> {
    let record = object_or_discard(item, FragmentKind::Task, position, discarded)?;
    let (id, title) = identify(record, "title");
    let (Some(id), Some(title)) = (id, title) else {
        discarded.push(DiscardedFragment::new(
            FragmentKind::Task,
            position,
            missing_issues(record, "title", MigrationIssue::EmptyTitle),
        ));
        return None;
    };

    let micro_tasks = elements(record, "microTasks")
        .enumerate()
        .filter_map(|(i, m)| migrate_micro_task(m, &format!("{position}.microTasks[{i}]"), discarded))
        .collect();

    let status = status_field(record.get("status"));
    let created_at = epoch_field(record.get("createdAt")).unwrap_or(0);

    Some(Task {
        id,
        title,
        description: text_field(record.get("description")),
        micro_tasks,
        status,
        created_at,
        completed_at: completion(status.is_completed(), record.get("completedAt"), created_at),
        due_date: due_date_field(record.get("dueDate")),
        archived_at: epoch_field(record.get("archivedAt")),
    })
}

fn migrate_micro_task(
    item: &Value,
    position: &str,
    discarded: &mut Vec<DiscardedFragment>,
) -> Option<MicroTask> {
    let record = object_or_discard(item, FragmentKind::MicroTask, position, discarded)?;
    let (id, title) = identify(record, "title");
    let (Some(id), Some(title)) = (id, title) else {
        discarded.push(DiscardedFragment::new(
            FragmentKind::MicroTask,
            position,
            missing_issues(record, "title", MigrationIssue::EmptyTitle),
        ));
        return None;
    };

    let status = status_field(record.get("status"));
    let created_at = epoch_field(record.get("createdAt")).unwrap_or(0);
    let minutes = epoch_field(record.get("estimatedMinutes")).unwrap_or(FALLBACK_ESTIMATE_MINUTES);

    Some(MicroTask {
        id,
        title,
        estimated_minutes: clamp_minutes(minutes),
        status,
        created_at,
        completed_at: completion(status.is_completed(), record.get("completedAt"), created_at),
    })
}

fn migrate_thought(
    item: &Value,
    position: &str,
    discarded: &mut Vec<DiscardedFragment>,
) -> Option<Thought> {
    let record = object_or_discard(item, FragmentKind::Thought, position, discarded)?;
    let (id, content) = identify(record, "content");
    let (Some(id), Some(content)) = (id, content) else {
        discarded.push(DiscardedFragment::new(
            FragmentKind::Thought,
            position,
            missing_issues(record, "content", MigrationIssue::EmptyContent),
        ));
        return None;
    };

    let status = lowercase_field(record.get("status"))
        .and_then(|s| ThoughtStatus::parse(&s))
        .unwrap_or_default();
    let kind = lowercase_field(record.get("type"))
        .and_then(|s| ThoughtKind::parse(&s))
        .unwrap_or_default();
    let created_at = epoch_field(record.get("createdAt")).unwrap_or(0);

    Some(Thought {
        id,
        content,
        kind,
        status,
        created_at,
        processed_at: completion(
            status == ThoughtStatus::Processed,
            record.get("processedAt"),
            created_at,
        ),
        linked_task_id: text_field(record.get("linkedTaskId")),
    })
}

fn migrate_focus(raw: &Value) -> FocusState {
    let Value::Object(record) = raw else {
        return FocusState::default();
    };
    // A session without a start time cannot be resumed.
    let Some(start_time) = epoch_field(record.get("startTime")) else {
        return FocusState::default();
    };
    FocusState {
        is_active: matches!(record.get("isActive"), Some(Value::Bool(true))),
        current_task_id: text_field(record.get("currentTaskId")),
        current_micro_task_id: text_field(record.get("currentMicroTaskId")),
        start_time: Some(start_time),
        duration: epoch_field(record.get("duration")).unwrap_or(0).max(0),
        paused_time: epoch_field(record.get("pausedTime")).unwrap_or(0).max(0),
    }
}

fn object_or_discard<'a>(
    item: &'a Value,
    kind: FragmentKind,
    position: &str,
    discarded: &mut Vec<DiscardedFragment>,
) -> Option<&'a Map<String, Value>> {
    match item {
        Value::Object(record) => Some(record),
        _ => {
            discarded.push(DiscardedFragment::new(
                kind,
                position,
                vec![MigrationIssue::NotAnObject],
            ));
            None
        }
    }
}

/// The `id` and the required label field (`title` or `content`).
fn identify(record: &Map<String, Value>, label_key: &str) -> (Option<String>, Option<String>) {
    (
        text_field(record.get("id")),
        text_field(record.get(label_key)),
    )
}

fn missing_issues(
    record: &Map<String, Value>,
    label_key: &str,
    label_issue: MigrationIssue,
) -> Vec<MigrationIssue> {
    let mut issues = Vec::new();
    if text_field(record.get("id")).is_none() {
        issues.push(MigrationIssue::MissingId);
    }
    if text_field(record.get(label_key)).is_none() {
        issues.push(label_issue);
    }
    issues
}

/// Non-blank display text of a field.
fn text_field(value: Option<&Value>) -> Option<String> {
    value
        .and_then(display_string)
        .filter(|s| !s.trim().is_empty())
}

fn lowercase_field(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.trim().to_ascii_lowercase()),
        _ => None,
    }
}

fn status_field(value: Option<&Value>) -> TaskStatus {
    lowercase_field(value)
        .and_then(|s| TaskStatus::parse(&s))
        .unwrap_or_default()
}

/// Epoch milliseconds from a number, a numeric string or an RFC 3339 string.
///
/// Values chrono cannot represent as a date are treated as missing.
fn epoch_field(value: Option<&Value>) -> Option<EpochMs> {
    let millis = match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f as i64)
                })
                .or_else(|| {
                    chrono::DateTime::parse_from_rfc3339(s)
                        .ok()
                        .map(|at| at.timestamp_millis())
                })
        }
        _ => None,
    }?;
    Some(millis).filter(|ms| is_representable(*ms))
}

fn due_date_field(value: Option<&Value>) -> Option<DueDate> {
    match value? {
        Value::Number(_) => epoch_field(value).map(DueDate::At),
        other => text_field(Some(other)).map(DueDate::Label),
    }
}

/// Completion time exists iff the record is completed.
///
/// A completed record without a usable time is stamped with its creation time.
fn completion(completed: bool, value: Option<&Value>, created_at: EpochMs) -> Option<EpochMs> {
    if completed {
        Some(epoch_field(value).unwrap_or(created_at))
    } else {
        None
    }
}
