//! Canonical shapes of the persisted application state.
//!
//! Timestamps are epoch milliseconds. The JSON form uses camelCase field
//! names so that blobs written by earlier clients load unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Milliseconds since the Unix epoch.
pub type EpochMs = i64;

/// Smallest estimate a micro-task may carry.
pub const MIN_MICRO_MINUTES: u32 = 1;

/// Largest estimate a micro-task may carry. Anything longer is not atomic.
pub const MAX_MICRO_MINUTES: u32 = 15;

/// Mint a fresh opaque identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Clamp a raw minute estimate into `[MIN_MICRO_MINUTES, MAX_MICRO_MINUTES]`.
pub fn clamp_minutes(minutes: i64) -> u32 {
    minutes.clamp(MIN_MICRO_MINUTES as i64, MAX_MICRO_MINUTES as i64) as u32
}

/// Whether chrono can place `ms` on the calendar.
pub fn is_representable(ms: EpochMs) -> bool {
    chrono::DateTime::from_timestamp_millis(ms).is_some()
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.filter(|s| !is_blank(s))
}

fn representable_or(ms: EpochMs, fallback: EpochMs) -> EpochMs {
    if is_representable(ms) {
        ms
    } else {
        fallback
    }
}

/// A completion time exists iff `done`. A missing or unusable one becomes `now`.
fn completion_time(done: bool, at: Option<EpochMs>, now: EpochMs) -> Option<EpochMs> {
    done.then(|| at.filter(|ms| is_representable(*ms)).unwrap_or(now))
}

/// Lifecycle status shared by tasks and micro-tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Paused,
}

impl TaskStatus {
    /// Parse the wire form. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }

    /// The wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Paused => "paused",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An atomic unit of work of at most fifteen minutes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MicroTask {
    pub id: String,
    pub title: String,
    pub estimated_minutes: u32,
    pub status: TaskStatus,
    pub created_at: EpochMs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<EpochMs>,
}

impl MicroTask {
    /// Create a pending micro-task. The estimate is clamped.
    pub fn new(title: impl Into<String>, estimated_minutes: i64, now: EpochMs) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            estimated_minutes: clamp_minutes(estimated_minutes),
            status: TaskStatus::Pending,
            created_at: now,
            completed_at: None,
        }
    }

    /// Replace the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    /// Re-establish the clamp and the completedAt-iff-completed invariant.
    ///
    /// A completed micro-task without a completion time is stamped `now`.
    /// Returns `None` when the id or title is blank.
    pub fn normalized(mut self, now: EpochMs) -> Option<Self> {
        if is_blank(&self.id) || is_blank(&self.title) {
            return None;
        }
        self.estimated_minutes = clamp_minutes(self.estimated_minutes as i64);
        self.created_at = representable_or(self.created_at, now);
        self.completed_at = completion_time(self.status.is_completed(), self.completed_at, now);
        Some(self)
    }
}

/// A due date is either a timestamp or a free-form label typed by the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DueDate {
    At(EpochMs),
    Label(String),
}

impl DueDate {
    /// Blank labels and timestamps off the calendar carry no date.
    pub fn is_usable(&self) -> bool {
        match self {
            DueDate::At(ms) => is_representable(*ms),
            DueDate::Label(label) => !is_blank(label),
        }
    }
}

impl fmt::Display for DueDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DueDate::At(ms) => match chrono::DateTime::from_timestamp_millis(*ms) {
                Some(at) => write!(f, "{}", at.format("%Y-%m-%d %H:%M UTC")),
                None => write!(f, "{}", ms),
            },
            DueDate::Label(label) => f.write_str(label),
        }
    }
}

/// A goal broken into micro-tasks. Owns its micro-task sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub micro_tasks: Vec<MicroTask>,
    pub status: TaskStatus,
    pub created_at: EpochMs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<EpochMs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DueDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<EpochMs>,
}

impl Task {
    /// Create a pending task with no micro-tasks.
    pub fn new(title: impl Into<String>, now: EpochMs) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            description: None,
            micro_tasks: Vec::new(),
            status: TaskStatus::Pending,
            created_at: now,
            completed_at: None,
            due_date: None,
            archived_at: None,
        }
    }

    /// Replace the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_due_date(mut self, due: DueDate) -> Self {
        self.due_date = Some(due);
        self
    }

    /// Archived tasks never appear in active views, whatever their status.
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// `(completed, total)` micro-task counts.
    pub fn progress(&self) -> (usize, usize) {
        let done = self.micro_tasks.iter().filter(|m| m.is_completed()).count();
        (done, self.micro_tasks.len())
    }

    /// True when the task has micro-tasks and every one of them is completed.
    pub fn is_all_complete(&self) -> bool {
        !self.micro_tasks.is_empty() && self.micro_tasks.iter().all(MicroTask::is_completed)
    }

    pub fn micro_task(&self, id: &str) -> Option<&MicroTask> {
        self.micro_tasks.iter().find(|m| m.id == id)
    }

    /// Mark the task completed. Only used when building an `UpdateTask` payload.
    pub fn completed(mut self, now: EpochMs) -> Self {
        self.status = TaskStatus::Completed;
        self.completed_at.get_or_insert(now);
        self
    }

    /// Bring a task payload into the shape a reload would give it.
    ///
    /// Returns `None` when the task or any of its micro-tasks lacks an id or
    /// title. Blank optional text and unusable times are cleared.
    pub fn normalized(mut self, now: EpochMs) -> Option<Self> {
        if is_blank(&self.id) || is_blank(&self.title) {
            return None;
        }
        self.micro_tasks = self
            .micro_tasks
            .into_iter()
            .map(|m| m.normalized(now))
            .collect::<Option<Vec<_>>>()?;
        self.description = non_blank(self.description);
        self.created_at = representable_or(self.created_at, now);
        self.completed_at = completion_time(self.status.is_completed(), self.completed_at, now);
        self.due_date = self.due_date.filter(DueDate::is_usable);
        self.archived_at = self.archived_at.filter(|ms| is_representable(*ms));
        Some(self)
    }
}

/// How a thought was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtKind {
    #[default]
    Text,
    Voice,
}

impl ThoughtKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "voice" => Some(Self::Voice),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
        }
    }
}

/// Whether a thought still sits in the inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtStatus {
    #[default]
    Inbox,
    Processed,
}

impl ThoughtStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "inbox" => Some(Self::Inbox),
            "processed" => Some(Self::Processed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Processed => "processed",
        }
    }
}

/// A captured idea waiting to be turned into work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Thought {
    pub id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: ThoughtKind,
    #[serde(default)]
    pub status: ThoughtStatus,
    pub created_at: EpochMs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<EpochMs>,
    /// Weak reference to a task; may dangle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_task_id: Option<String>,
}

impl Thought {
    pub fn new(content: impl Into<String>, kind: ThoughtKind, now: EpochMs) -> Self {
        Self {
            id: new_id(),
            content: content.into(),
            kind,
            status: ThoughtStatus::Inbox,
            created_at: now,
            processed_at: None,
            linked_task_id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_link(mut self, task_id: impl Into<String>) -> Self {
        self.linked_task_id = Some(task_id.into());
        self
    }

    /// Returns `None` when the id or content is blank.
    pub fn normalized(mut self, now: EpochMs) -> Option<Self> {
        if is_blank(&self.id) || is_blank(&self.content) {
            return None;
        }
        self.created_at = representable_or(self.created_at, now);
        self.processed_at = completion_time(
            self.status == ThoughtStatus::Processed,
            self.processed_at,
            now,
        );
        self.linked_task_id = non_blank(self.linked_task_id);
        Some(self)
    }
}

/// The current focus session. Inactive and empty by default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FocusState {
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_micro_task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<EpochMs>,
    /// Planned length in milliseconds.
    pub duration: i64,
    /// Milliseconds spent paused.
    pub paused_time: i64,
}

impl FocusState {
    /// Whether a session was started and not ended (running or paused).
    pub fn has_session(&self) -> bool {
        self.start_time.is_some()
    }

    /// Focused milliseconds at `now`, never negative.
    pub fn elapsed_ms(&self, now: EpochMs) -> i64 {
        match self.start_time {
            Some(start) => now
                .saturating_sub(start)
                .saturating_sub(self.paused_time)
                .max(0),
            None => 0,
        }
    }

    /// Milliseconds left on the countdown at `now`, never negative.
    pub fn remaining_ms(&self, now: EpochMs) -> i64 {
        if !self.has_session() {
            return 0;
        }
        self.duration.saturating_sub(self.elapsed_ms(now)).max(0)
    }

    /// True once an active session has run its full duration.
    pub fn is_elapsed(&self, now: EpochMs) -> bool {
        self.is_active && self.has_session() && self.remaining_ms(now) == 0
    }

    /// A session needs a start time chrono can represent; otherwise there is none.
    /// Durations outside that range count as zero.
    pub fn normalized(self) -> Self {
        match self.start_time {
            Some(start) if is_representable(start) => Self {
                is_active: self.is_active,
                current_task_id: non_blank(self.current_task_id),
                current_micro_task_id: non_blank(self.current_micro_task_id),
                start_time: Some(start),
                duration: representable_or(self.duration, 0).max(0),
                paused_time: representable_or(self.paused_time, 0).max(0),
            },
            _ => Self::default(),
        }
    }
}

/// Root aggregate owned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AppState {
    /// Insertion order is display order.
    pub tasks: Vec<Task>,
    /// Newest first.
    pub thoughts: Vec<Thought>,
    pub focus: FocusState,
}

impl AppState {
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn thought(&self, id: &str) -> Option<&Thought> {
        self.thoughts.iter().find(|t| t.id == id)
    }

    /// Tasks shown in active views.
    pub fn active_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| !t.is_archived())
    }

    pub fn archived_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.is_archived())
    }

    /// Thoughts not yet processed, newest first.
    pub fn inbox(&self) -> impl Iterator<Item = &Thought> {
        self.thoughts
            .iter()
            .filter(|t| t.status == ThoughtStatus::Inbox)
    }

    /// Drop unidentified records and normalize the rest.
    pub fn normalized(self, now: EpochMs) -> Self {
        Self {
            tasks: self
                .tasks
                .into_iter()
                .filter_map(|t| t.normalized(now))
                .collect(),
            thoughts: self
                .thoughts
                .into_iter()
                .filter_map(|t| t.normalized(now))
                .collect(),
            focus: self.focus.normalized(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_micro_task_new_clamps_minutes() {
        assert_eq!(MicroTask::new("a", 45, 0).estimated_minutes, 15);
        assert_eq!(MicroTask::new("a", 0, 0).estimated_minutes, 1);
        assert_eq!(MicroTask::new("a", -3, 0).estimated_minutes, 1);
        assert_eq!(MicroTask::new("a", 7, 0).estimated_minutes, 7);
    }

    #[test]
    fn test_micro_task_normalized_stamps_completion() {
        let mut micro = MicroTask::new("a", 5, 10);
        micro.status = TaskStatus::Completed;
        let micro = micro.normalized(99).unwrap();
        assert_eq!(micro.completed_at, Some(99));

        let mut reopened = micro.clone();
        reopened.status = TaskStatus::Pending;
        assert_eq!(reopened.normalized(120).unwrap().completed_at, None);
    }

    #[test]
    fn test_blank_records_do_not_normalize() {
        assert!(Task::new("   ", 0).normalized(1).is_none());
        assert!(Task::new("x", 0).with_id("").normalized(1).is_none());
        assert!(MicroTask::new("\t", 5, 0).normalized(1).is_none());
        assert!(Thought::new("", ThoughtKind::Text, 0).normalized(1).is_none());

        let mut task = Task::new("Plan trip", 0);
        task.micro_tasks.push(MicroTask::new(" ", 5, 0));
        assert!(task.normalized(1).is_none());
    }

    #[test]
    fn test_task_normalized_fixes_embedded_micro_tasks() {
        let mut micro = MicroTask::new("Book flights", 5, 10).with_id("m1");
        micro.estimated_minutes = 90;
        micro.status = TaskStatus::Completed;
        let mut task = Task::new("Plan trip", 10)
            .with_description("  ")
            .with_due_date(DueDate::Label(String::new()));
        task.micro_tasks.push(micro);
        task.archived_at = Some(i64::MAX);

        let task = task.normalized(500).unwrap();
        assert_eq!(task.micro_tasks[0].estimated_minutes, MAX_MICRO_MINUTES);
        assert_eq!(task.micro_tasks[0].completed_at, Some(500));
        assert_eq!(task.description, None);
        assert_eq!(task.due_date, None);
        assert_eq!(task.archived_at, None);
        assert_eq!(task.completed_at, None);
        assert_eq!(task.clone().normalized(900), Some(task));
    }

    #[test]
    fn test_thought_normalized_clears_blank_link() {
        let mut thought = Thought::new("call mum", ThoughtKind::Voice, i64::MIN).with_link(" ");
        thought.status = ThoughtStatus::Processed;

        let thought = thought.normalized(42).unwrap();
        assert_eq!(thought.created_at, 42);
        assert_eq!(thought.processed_at, Some(42));
        assert_eq!(thought.linked_task_id, None);
    }

    #[test]
    fn test_focus_normalized_needs_calendar_start() {
        let broken = FocusState {
            is_active: true,
            start_time: Some(i64::MIN),
            duration: 1_000,
            ..FocusState::default()
        };
        assert_eq!(broken.normalized(), FocusState::default());

        let focus = FocusState {
            is_active: true,
            current_task_id: Some(String::new()),
            current_micro_task_id: Some("m1".into()),
            start_time: Some(1_000),
            duration: -5,
            paused_time: -1,
        }
        .normalized();
        assert_eq!(focus.current_task_id, None);
        assert_eq!(focus.current_micro_task_id.as_deref(), Some("m1"));
        assert_eq!((focus.duration, focus.paused_time), (0, 0));

        let endless = FocusState {
            start_time: Some(0),
            duration: i64::MAX,
            ..FocusState::default()
        };
        assert_eq!(endless.normalized().duration, 0);
    }

    #[test]
    fn test_task_progress() {
        let mut task = Task::new("Write report", 0);
        assert_eq!(task.progress(), (0, 0));
        assert!(!task.is_all_complete());

        task.micro_tasks.push(MicroTask::new("outline", 5, 0));
        task.micro_tasks.push(MicroTask::new("draft", 10, 0));
        task.micro_tasks[0].status = TaskStatus::Completed;
        assert_eq!(task.progress(), (1, 2));
        assert!(!task.is_all_complete());

        task.micro_tasks[1].status = TaskStatus::Completed;
        assert!(task.is_all_complete());
    }

    #[test]
    fn test_focus_countdown() {
        let focus = FocusState {
            is_active: true,
            start_time: Some(1_000),
            duration: 60_000,
            ..Default::default()
        };
        assert_eq!(focus.elapsed_ms(31_000), 30_000);
        assert_eq!(focus.remaining_ms(31_000), 30_000);
        assert!(!focus.is_elapsed(31_000));
        assert!(focus.is_elapsed(61_000));
        assert_eq!(focus.remaining_ms(500_000), 0);
    }

    #[test]
    fn test_focus_countdown_saturates_on_extreme_times() {
        let focus = FocusState {
            is_active: true,
            start_time: Some(i64::MIN),
            duration: 1_000,
            paused_time: i64::MAX,
            ..Default::default()
        };
        assert_eq!(focus.elapsed_ms(i64::MAX), 0);
        assert_eq!(focus.remaining_ms(i64::MAX), 1_000);

        let focus = FocusState {
            is_active: true,
            start_time: Some(i64::MIN),
            duration: i64::MIN,
            ..Default::default()
        };
        assert_eq!(focus.elapsed_ms(1_700_000_000_000), i64::MAX);
        assert_eq!(focus.remaining_ms(1_700_000_000_000), 0);
        assert!(focus.is_elapsed(1_700_000_000_000));
    }

    #[test]
    fn test_inactive_focus_never_elapses() {
        let focus = FocusState::default();
        assert_eq!(focus.remaining_ms(10_000), 0);
        assert!(!focus.is_elapsed(10_000));
    }

    #[test]
    fn test_task_wire_shape_is_camel_case() {
        let mut task = Task::new("x", 5).with_id("a");
        task.micro_tasks.push(MicroTask::new("m", 3, 5).with_id("m1"));
        let json = serde_json::to_value(&task).unwrap();

        assert_eq!(json["id"], "a");
        assert_eq!(json["createdAt"], 5);
        assert_eq!(json["microTasks"][0]["estimatedMinutes"], 3);
        assert!(json.get("archivedAt").is_none());
    }

    #[test]
    fn test_thought_kind_serializes_as_type() {
        let thought = Thought::new("call mom", ThoughtKind::Voice, 0).with_id("t");
        let json = serde_json::to_value(&thought).unwrap();
        assert_eq!(json["type"], "voice");
        assert_eq!(json["status"], "inbox");
    }

    #[test]
    fn test_due_date_untagged() {
        let at: DueDate = serde_json::from_str("1700000000000").unwrap();
        assert_eq!(at, DueDate::At(1_700_000_000_000));
        let label: DueDate = serde_json::from_str("\"Friday\"").unwrap();
        assert_eq!(label.to_string(), "Friday");
    }

    #[test]
    fn test_active_and_archived_views() {
        let mut state = AppState::default();
        state.tasks.push(Task::new("a", 0).with_id("a"));
        let mut archived = Task::new("b", 0).with_id("b");
        archived.status = TaskStatus::Completed;
        archived.archived_at = Some(10);
        state.tasks.push(archived);

        let active: Vec<_> = state.active_tasks().map(|t| t.id.as_str()).collect();
        let gone: Vec<_> = state.archived_tasks().map(|t| t.id.as_str()).collect();
        assert_eq!(active, vec!["a"]);
        assert_eq!(gone, vec!["b"]);
    }
}
