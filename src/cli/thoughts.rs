//! Thought inbox commands: add, list, process, delete.

use serde::Serialize;

use crate::cli::{CommandOutcome, OutputOptions};
use crate::core::{Action, Clock, Store, Thought, ThoughtKind, ThoughtStatus};
use crate::storage::StateGateway;
use crate::util::truncate;

/// Output format for the thought commands.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThoughtOutput {
    pub success: bool,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<Thought>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub thoughts: Vec<Thought>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ThoughtOutput {
    fn thought(thought: Option<Thought>, changed: bool) -> Self {
        Self {
            success: true,
            changed,
            thought,
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

impl CommandOutcome for ThoughtOutput {
    fn succeeded(&self) -> bool {
        self.success
    }
}

/// The thought command implementation.
pub struct ThoughtCommand<'a, G: StateGateway, C: Clock> {
    store: &'a mut Store<G, C>,
}

impl<'a, G: StateGateway, C: Clock> ThoughtCommand<'a, G, C> {
    pub fn new(store: &'a mut Store<G, C>) -> Self {
        Self { store }
    }

    /// Capture a thought at the top of the inbox.
    pub fn add(&mut self, content: &str, voice: bool, link: Option<&str>) -> ThoughtOutput {
        let content = content.trim();
        if content.is_empty() {
            return ThoughtOutput::failure("Thought cannot be empty");
        }
        if let Some(task_id) = link {
            if self.store.state().task(task_id).is_none() {
                return ThoughtOutput::failure(format!("Task not found: {}", task_id));
            }
        }

        let kind = if voice {
            ThoughtKind::Voice
        } else {
            ThoughtKind::Text
        };
        let mut thought = Thought::new(content, kind, self.store.now());
        if let Some(task_id) = link {
            thought = thought.with_link(task_id);
        }

        self.store.dispatch(&Action::AddThought(thought.clone()));
        ThoughtOutput::thought(Some(thought), true)
    }

    /// Inbox thoughts, or every thought with `all`. Newest first.
    pub fn list(&self, all: bool) -> ThoughtOutput {
        let state = self.store.state();
        let thoughts = if all {
            state.thoughts.clone()
        } else {
            state.inbox().cloned().collect()
        };
        ThoughtOutput {
            success: true,
            thoughts,
            ..ThoughtOutput::default()
        }
    }

    pub fn process(&mut self, id: &str) -> ThoughtOutput {
        self.apply(id, Action::ProcessThought(id.to_string()))
    }

    pub fn delete(&mut self, id: &str) -> ThoughtOutput {
        self.apply(id, Action::DeleteThought(id.to_string()))
    }

    fn apply(&mut self, id: &str, action: Action) -> ThoughtOutput {
        let before = self.store.state();
        let Some(existing) = before.thought(id).cloned() else {
            return ThoughtOutput::failure(format!("Thought not found: {}", id));
        };
        let after = self.store.dispatch(&action);
        let changed = !std::sync::Arc::ptr_eq(&before, &after);
        let thought = after.thought(id).cloned().unwrap_or(existing);
        ThoughtOutput::thought(Some(thought), changed)
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &ThoughtOutput, options: &OutputOptions) -> String {
        options.render(output, format_human_readable)
    }
}

fn format_thought_line(thought: &Thought) -> String {
    let mark = match thought.status {
        ThoughtStatus::Inbox => " ",
        ThoughtStatus::Processed => "x",
    };
    let voice = if thought.kind == ThoughtKind::Voice {
        " (voice)"
    } else {
        ""
    };
    format!(
        "[{}] {}{}  {}",
        mark,
        truncate(&thought.content, 60),
        voice,
        thought.id
    )
}

fn format_human_readable(output: &ThoughtOutput) -> String {
    if let Some(error) = &output.error {
        return format!("Error: {}\n", error);
    }
    if let Some(thought) = &output.thought {
        let mut line = format_thought_line(thought);
        if !output.changed {
            line.push_str(" [unchanged]");
        }
        line.push('\n');
        return line;
    }
    if output.thoughts.is_empty() {
        return "Inbox is empty.\n".to_string();
    }
    output
        .thoughts
        .iter()
        .map(|t| format_thought_line(t) + "\n")
        .collect()
}
