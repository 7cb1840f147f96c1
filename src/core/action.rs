//! The action vocabulary accepted by the store.
//!
//! The wire form is `{"type": "ADD_TASK", "payload": ...}`. Names and payload
//! shapes are a compatibility contract with persisted data and existing UIs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::model::{AppState, MicroTask, Task, Thought};

/// Every intent the reducer understands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Action {
    AddTask(Task),
    UpdateTask(Task),
    DeleteTask(String),
    AddMicroTask {
        task_id: String,
        micro_task: MicroTask,
    },
    UpdateMicroTask {
        task_id: String,
        micro_task: MicroTask,
    },
    CompleteMicroTask {
        task_id: String,
        micro_task_id: String,
    },
    ArchiveOverdueTasks,
    StartFocus {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        micro_task_id: Option<String>,
        duration: i64,
    },
    PauseFocus,
    ResumeFocus,
    EndFocus,
    AddThought(Thought),
    DeleteThought(String),
    ProcessThought(String),
    LoadState(AppState),
}

impl Action {
    /// Decode a raw wire action.
    ///
    /// Unknown types and malformed payloads yield `None`; callers treat that
    /// as a no-op.
    pub fn from_value(raw: &Value) -> Option<Self> {
        Self::deserialize(raw).ok()
    }

    /// The wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::AddTask(_) => "ADD_TASK",
            Action::UpdateTask(_) => "UPDATE_TASK",
            Action::DeleteTask(_) => "DELETE_TASK",
            Action::AddMicroTask { .. } => "ADD_MICRO_TASK",
            Action::UpdateMicroTask { .. } => "UPDATE_MICRO_TASK",
            Action::CompleteMicroTask { .. } => "COMPLETE_MICRO_TASK",
            Action::ArchiveOverdueTasks => "ARCHIVE_OVERDUE_TASKS",
            Action::StartFocus { .. } => "START_FOCUS",
            Action::PauseFocus => "PAUSE_FOCUS",
            Action::ResumeFocus => "RESUME_FOCUS",
            Action::EndFocus => "END_FOCUS",
            Action::AddThought(_) => "ADD_THOUGHT",
            Action::DeleteThought(_) => "DELETE_THOUGHT",
            Action::ProcessThought(_) => "PROCESS_THOUGHT",
            Action::LoadState(_) => "LOAD_STATE",
        }
    }
}
