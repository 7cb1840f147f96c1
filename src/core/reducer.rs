//! Pure reducer for the application state.
//!
//! `reduce` never mutates its input. An action that changes nothing returns
//! the same `Arc`, so callers detect change with `Arc::ptr_eq`. Record
//! payloads are normalized the way a reload would normalize them, and a
//! payload without an id or title is a no-op.

use std::sync::Arc;

use crate::core::action::Action;
use crate::core::model::{AppState, EpochMs, FocusState, TaskStatus, ThoughtStatus};

/// Apply `action` to `state` at time `now`.
pub fn reduce(state: &Arc<AppState>, action: &Action, now: EpochMs) -> Arc<AppState> {
    match apply(state, action, now) {
        Some(next) => Arc::new(next),
        None => Arc::clone(state),
    }
}

/// Compute the next state, or `None` when the action is a no-op.
fn apply(state: &AppState, action: &Action, now: EpochMs) -> Option<AppState> {
    match action {
        Action::AddTask(task) => {
            let task = task.clone().normalized(now)?;
            let mut next = state.clone();
            next.tasks.push(task);
            Some(next)
        }

        Action::UpdateTask(task) => {
            let index = state.tasks.iter().position(|t| t.id == task.id)?;
            let replacement = task.clone().normalized(now)?;
            if state.tasks[index] == replacement {
                return None;
            }
            let mut next = state.clone();
            next.tasks[index] = replacement;
            Some(next)
        }

        Action::DeleteTask(id) => {
            let index = state.tasks.iter().position(|t| &t.id == id)?;
            let mut next = state.clone();
            next.tasks.remove(index);
            Some(next)
        }

        Action::AddMicroTask {
            task_id,
            micro_task,
        } => {
            let index = state.tasks.iter().position(|t| &t.id == task_id)?;
            let micro_task = micro_task.clone().normalized(now)?;
            let mut next = state.clone();
            next.tasks[index].micro_tasks.push(micro_task);
            Some(next)
        }

        Action::UpdateMicroTask {
            task_id,
            micro_task,
        } => {
            let task_index = state.tasks.iter().position(|t| &t.id == task_id)?;
            let micro_index = state.tasks[task_index]
                .micro_tasks
                .iter()
                .position(|m| m.id == micro_task.id)?;
            let replacement = micro_task.clone().normalized(now)?;
            if state.tasks[task_index].micro_tasks[micro_index] == replacement {
                return None;
            }
            let mut next = state.clone();
            next.tasks[task_index].micro_tasks[micro_index] = replacement;
            Some(next)
        }

        Action::CompleteMicroTask {
            task_id,
            micro_task_id,
        } => {
            let task_index = state.tasks.iter().position(|t| &t.id == task_id)?;
            let micro_index = state.tasks[task_index]
                .micro_tasks
                .iter()
                .position(|m| &m.id == micro_task_id)?;
            // Already completed: keep the original completion time.
            if state.tasks[task_index].micro_tasks[micro_index].is_completed() {
                return None;
            }
            let mut next = state.clone();
            let micro = &mut next.tasks[task_index].micro_tasks[micro_index];
            micro.status = TaskStatus::Completed;
            micro.completed_at = Some(now);
            Some(next)
        }

        Action::ArchiveOverdueTasks => {
            let overdue = |status: TaskStatus, archived: Option<EpochMs>| {
                !status.is_completed() && archived.is_none()
            };
            if !state
                .tasks
                .iter()
                .any(|t| overdue(t.status, t.archived_at))
            {
                return None;
            }
            let mut next = state.clone();
            for task in next.tasks.iter_mut() {
                if overdue(task.status, task.archived_at) {
                    task.archived_at = Some(now);
                }
            }
            Some(next)
        }

        Action::StartFocus {
            task_id,
            micro_task_id,
            duration,
        } => {
            let mut next = state.clone();
            next.focus = FocusState {
                is_active: true,
                current_task_id: Some(task_id.clone()),
                current_micro_task_id: micro_task_id.clone(),
                start_time: Some(now),
                duration: *duration,
                paused_time: 0,
            }
            .normalized();
            Some(next)
        }

        Action::PauseFocus => set_focus_active(state, false),

        Action::ResumeFocus => set_focus_active(state, true),

        Action::EndFocus => {
            if state.focus == FocusState::default() {
                return None;
            }
            let mut next = state.clone();
            next.focus = FocusState::default();
            Some(next)
        }

        Action::AddThought(thought) => {
            let thought = thought.clone().normalized(now)?;
            let mut next = state.clone();
            next.thoughts.insert(0, thought);
            Some(next)
        }

        Action::DeleteThought(id) => {
            let index = state.thoughts.iter().position(|t| &t.id == id)?;
            let mut next = state.clone();
            next.thoughts.remove(index);
            Some(next)
        }

        Action::ProcessThought(id) => {
            let index = state.thoughts.iter().position(|t| &t.id == id)?;
            if state.thoughts[index].status == ThoughtStatus::Processed {
                return None;
            }
            let mut next = state.clone();
            let thought = &mut next.thoughts[index];
            thought.status = ThoughtStatus::Processed;
            thought.processed_at = Some(now);
            Some(next)
        }

        Action::LoadState(loaded) => Some(loaded.clone().normalized(now)),
    }
}

/// Pause and resume only flip `is_active`, and only inside a session.
fn set_focus_active(state: &AppState, active: bool) -> Option<AppState> {
    if !state.focus.has_session() || state.focus.is_active == active {
        return None;
    }
    let mut next = state.clone();
    next.focus.is_active = active;
    Some(next)
}
