//! Task commands: add, list, done, delete, archive-overdue.

use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

use crate::cli::{CommandOutcome, OutputOptions};
use crate::core::{Action, Clock, DueDate, EpochMs, Store, Task};
use crate::storage::StateGateway;

/// Output format for the task commands.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutput {
    pub success: bool,
    /// Whether the state changed.
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<Task>,
    /// Tasks archived by `archive-overdue`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskOutput {
    fn task(task: Task, changed: bool) -> Self {
        Self {
            success: true,
            changed,
            task: Some(task),
            ..Self::default()
        }
    }

    fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

impl CommandOutcome for TaskOutput {
    fn succeeded(&self) -> bool {
        self.success
    }
}

/// Parse a user-supplied due date.
///
/// RFC 3339 timestamps and `YYYY-MM-DD` (midnight UTC) become timestamps;
/// anything else is kept as a label.
pub fn parse_due_date(input: &str) -> DueDate {
    let input = input.trim();
    if let Ok(at) = chrono::DateTime::parse_from_rfc3339(input) {
        return DueDate::At(at.timestamp_millis());
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M") {
        return DueDate::At(Utc.from_utc_datetime(&at).timestamp_millis());
    }
    if let Some(at) = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return DueDate::At(Utc.from_utc_datetime(&at).timestamp_millis());
    }
    DueDate::Label(input.to_string())
}

/// The task command implementation.
pub struct TaskCommand<'a, G: StateGateway, C: Clock> {
    store: &'a mut Store<G, C>,
}

impl<'a, G: StateGateway, C: Clock> TaskCommand<'a, G, C> {
    pub fn new(store: &'a mut Store<G, C>) -> Self {
        Self { store }
    }

    pub fn add(&mut self, title: &str, description: Option<&str>, due: Option<&str>) -> TaskOutput {
        let title = title.trim();
        if title.is_empty() {
            return TaskOutput::failure("Task title cannot be empty");
        }

        let mut task = Task::new(title, self.store.now());
        if let Some(description) = description.map(str::trim).filter(|d| !d.is_empty()) {
            task = task.with_description(description);
        }
        if let Some(due) = due.filter(|d| !d.trim().is_empty()) {
            task = task.with_due_date(parse_due_date(due));
        }

        self.store.dispatch(&Action::AddTask(task.clone()));
        TaskOutput::task(task, true)
    }

    pub fn list(&self, archived: bool) -> TaskOutput {
        let state = self.store.state();
        let tasks: Vec<Task> = if archived {
            state.archived_tasks().cloned().collect()
        } else {
            state.active_tasks().cloned().collect()
        };
        TaskOutput {
            success: true,
            tasks,
            ..TaskOutput::default()
        }
    }

    /// Mark a task completed. Micro-tasks are left as they are.
    pub fn done(&mut self, id: &str) -> TaskOutput {
        let Some(task) = self.store.state().task(id).cloned() else {
            return TaskOutput::failure(format!("Task not found: {}", id));
        };
        if task.status.is_completed() {
            return TaskOutput::task(task, false);
        }

        let completed = task.completed(self.store.now());
        self.store.dispatch(&Action::UpdateTask(completed.clone()));
        TaskOutput::task(completed, true)
    }

    pub fn delete(&mut self, id: &str) -> TaskOutput {
        let Some(task) = self.store.state().task(id).cloned() else {
            return TaskOutput::failure(format!("Task not found: {}", id));
        };
        self.store.dispatch(&Action::DeleteTask(id.to_string()));
        TaskOutput::task(task, true)
    }

    pub fn archive_overdue(&mut self) -> TaskOutput {
        let before = self.store.state();
        let after = self.store.dispatch(&Action::ArchiveOverdueTasks);
        let archived = after
            .archived_tasks()
            .count()
            .saturating_sub(before.archived_tasks().count());
        TaskOutput {
            success: true,
            changed: archived > 0,
            archived: Some(archived),
            ..TaskOutput::default()
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &TaskOutput, options: &OutputOptions) -> String {
        let now = self.store.now();
        options.render(output, |o| format_human_readable(o, now))
    }
}

fn format_task_line(task: &Task, now: EpochMs) -> String {
    let (done, total) = task.progress();
    let mut line = format!("[{}] {} ({}/{})", task.status, task.title, done, total);
    if let Some(due) = &task.due_date {
        let overdue = matches!(due, DueDate::At(at) if *at < now) && !task.status.is_completed();
        line.push_str(&format!(" due {}{}", due, if overdue { " (overdue)" } else { "" }));
    }
    format!("{}  {}", line, task.id)
}

fn format_human_readable(output: &TaskOutput, now: EpochMs) -> String {
    if let Some(error) = &output.error {
        return format!("Error: {}\n", error);
    }

    let mut out = String::new();

    if let Some(archived) = output.archived {
        out.push_str(&format!("Archived {} task(s).\n", archived));
        return out;
    }

    if let Some(task) = &output.task {
        out.push_str(&format_task_line(task, now));
        out.push('\n');
        for micro in &task.micro_tasks {
            let mark = if micro.is_completed() { "x" } else { " " };
            out.push_str(&format!(
                "  [{}] {} ({} min)  {}\n",
                mark, micro.title, micro.estimated_minutes, micro.id
            ));
        }
        return out;
    }

    if output.tasks.is_empty() {
        return "No tasks.\n".to_string();
    }
    for task in &output.tasks {
        out.push_str(&format_task_line(task, now));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ManualClock, MicroTask, TaskStatus};
    use crate::storage::{BlobGateway, MemoryBlobStore, APP_STATE_KEY};
    use std::sync::Arc;

    const NOW: EpochMs = 1_700_000_000_000;

    type TestStore = Store<BlobGateway<Arc<MemoryBlobStore>>, Arc<ManualClock>>;

    fn setup() -> TestStore {
        let gateway = BlobGateway::new(Arc::new(MemoryBlobStore::new()), APP_STATE_KEY);
        Store::open(gateway, Arc::new(ManualClock::new(NOW)))
    }

    #[test]
    fn test_add_task() {
        let mut store = setup();
        let output = TaskCommand::new(&mut store).add("  Write report ", Some("q3"), None);

        assert!(output.success);
        let task = output.task.unwrap();
        assert_eq!(task.title, "Write report");
        assert_eq!(task.description.as_deref(), Some("q3"));
        assert_eq!(task.created_at, NOW);
        assert_eq!(store.state().tasks.len(), 1);
    }

    #[test]
    fn test_add_rejects_empty_title() {
        let mut store = setup();
        let output = TaskCommand::new(&mut store).add("   ", None, None);

        assert!(!output.succeeded());
        assert!(store.state().tasks.is_empty());
    }

    #[test]
    fn test_parse_due_date() {
        assert_eq!(
            parse_due_date("2024-03-01"),
            DueDate::At(1_709_251_200_000)
        );
        assert_eq!(
            parse_due_date("2024-03-01T00:00:00Z"),
            DueDate::At(1_709_251_200_000)
        );
        assert_eq!(
            parse_due_date("next friday"),
            DueDate::Label("next friday".into())
        );
    }

    #[test]
    fn test_list_splits_archived() {
        let mut store = setup();
        let mut cmd = TaskCommand::new(&mut store);
        cmd.add("a", None, None);
        cmd.archive_overdue();
        cmd.add("b", None, None);

        let active = cmd.list(false);
        assert_eq!(active.tasks.len(), 1);
        assert_eq!(active.tasks[0].title, "b");

        let archived = cmd.list(true);
        assert_eq!(archived.tasks[0].title, "a");
    }

    #[test]
    fn test_done_leaves_micro_tasks_alone() {
        let mut store = setup();
        let mut task = Task::new("t", NOW).with_id("t1");
        task.micro_tasks.push(MicroTask::new("m", 5, NOW).with_id("m1"));
        store.dispatch(&Action::AddTask(task));

        let output = TaskCommand::new(&mut store).done("t1");
        assert!(output.changed);

        let state = store.state();
        assert_eq!(state.tasks[0].status, TaskStatus::Completed);
        assert_eq!(state.tasks[0].completed_at, Some(NOW));
        assert!(!state.tasks[0].micro_tasks[0].is_completed());

        let again = TaskCommand::new(&mut store).done("t1");
        assert!(again.success);
        assert!(!again.changed);
    }

    #[test]
    fn test_unknown_id_fails() {
        let mut store = setup();
        let mut cmd = TaskCommand::new(&mut store);
        assert!(!cmd.done("nope").success);
        assert!(!cmd.delete("nope").success);
    }

    #[test]
    fn test_delete() {
        let mut store = setup();
        store.dispatch(&Action::AddTask(Task::new("t", NOW).with_id("t1")));

        let output = TaskCommand::new(&mut store).delete("t1");
        assert!(output.success);
        assert!(store.state().tasks.is_empty());
    }

    #[test]
    fn test_archive_overdue_counts() {
        let mut store = setup();
        store.dispatch(&Action::AddTask(Task::new("a", NOW).with_id("a")));
        store.dispatch(&Action::AddTask(Task::new("b", NOW).with_id("b").completed(NOW)));

        let mut cmd = TaskCommand::new(&mut store);
        assert_eq!(cmd.archive_overdue().archived, Some(1));

        let second = cmd.archive_overdue();
        assert_eq!(second.archived, Some(0));
        assert!(!second.changed);
    }

    #[test]
    fn test_format_output() {
        let mut store = setup();
        let mut cmd = TaskCommand::new(&mut store);
        let output = cmd.add("Write report", None, Some("2000-01-01"));

        let text = cmd.format_output(&output, &OutputOptions::default());
        assert!(text.contains("[pending] Write report (0/0)"));
        assert!(text.contains("(overdue)"));

        let json = cmd.format_output(
            &output,
            &OutputOptions {
                json: true,
                quiet: false,
            },
        );
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["task"]["title"], "Write report");
    }
}
