//! Micro-task commands: add and complete.
//!
//! Completing a micro-task is the only trigger for the reward engine, and
//! only when the completion actually changed the state.

use serde::Serialize;

use crate::cli::{CommandOutcome, OutputOptions};
use crate::config::Config;
use crate::core::{
    Action, Clock, CompletionOutcome, MicroTask, RandomSource, RewardEngine, Store,
};
use crate::storage::{BlobStore, StateGateway};

/// Output format for the micro-task commands.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroOutput {
    pub success: bool,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub micro_task: Option<MicroTask>,
    /// `(completed, total)` for the parent task after the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<(usize, usize)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<CompletionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MicroOutput {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

impl CommandOutcome for MicroOutput {
    fn succeeded(&self) -> bool {
        self.success
    }
}

/// The micro-task command implementation.
pub struct MicroCommand<'a, G: StateGateway, C: Clock> {
    store: &'a mut Store<G, C>,
    config: &'a Config,
}

impl<'a, G: StateGateway, C: Clock> MicroCommand<'a, G, C> {
    pub fn new(store: &'a mut Store<G, C>, config: &'a Config) -> Self {
        Self { store, config }
    }

    /// Add a micro-task. The estimate is clamped to the allowed range.
    pub fn add(&mut self, task_id: &str, title: &str, minutes: Option<i64>) -> MicroOutput {
        let title = title.trim();
        if title.is_empty() {
            return MicroOutput::failure("Micro-task title cannot be empty");
        }
        if self.store.state().task(task_id).is_none() {
            return MicroOutput::failure(format!("Task not found: {}", task_id));
        }

        let minutes =
            minutes.unwrap_or_else(|| i64::from(self.config.tasks.default_micro_minutes));
        let micro = MicroTask::new(title, minutes, self.store.now());
        let micro_id = micro.id.clone();

        let state = self.store.dispatch(&Action::AddMicroTask {
            task_id: task_id.to_string(),
            micro_task: micro,
        });

        let task = state.task(task_id);
        MicroOutput {
            success: true,
            changed: true,
            task_id: Some(task_id.to_string()),
            micro_task: task.and_then(|t| t.micro_task(&micro_id)).cloned(),
            progress: task.map(|t| t.progress()),
            ..MicroOutput::default()
        }
    }

    /// Complete a micro-task and, if that changed anything, roll for a reward.
    pub fn complete<R, RC, B>(
        &mut self,
        task_id: &str,
        micro_id: &str,
        engine: &mut RewardEngine<R, RC, B>,
    ) -> MicroOutput
    where
        R: RandomSource,
        RC: Clock,
        B: BlobStore,
    {
        let before = self.store.state();
        let exists = before
            .task(task_id)
            .and_then(|t| t.micro_task(micro_id))
            .is_some();
        if !exists {
            return MicroOutput::failure(format!(
                "Micro-task not found: {} in task {}",
                micro_id, task_id
            ));
        }

        let after = self.store.dispatch(&Action::CompleteMicroTask {
            task_id: task_id.to_string(),
            micro_task_id: micro_id.to_string(),
        });
        let changed = !std::sync::Arc::ptr_eq(&before, &after);

        let task = after.task(task_id);
        let outcome = match (changed, task) {
            (true, Some(task)) => Some(engine.trigger_completion(task.is_all_complete())),
            _ => None,
        };

        MicroOutput {
            success: true,
            changed,
            task_id: Some(task_id.to_string()),
            micro_task: task.and_then(|t| t.micro_task(micro_id)).cloned(),
            progress: task.map(|t| t.progress()),
            outcome,
            ..MicroOutput::default()
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &MicroOutput, options: &OutputOptions) -> String {
        options.render(output, format_human_readable)
    }
}

fn format_human_readable(output: &MicroOutput) -> String {
    if let Some(error) = &output.error {
        return format!("Error: {}\n", error);
    }

    let mut out = String::new();
    if let Some(micro) = &output.micro_task {
        let verb = match (micro.is_completed(), output.changed) {
            (true, true) => "Completed",
            (true, false) => "Already completed",
            _ => "Added",
        };
        out.push_str(&format!(
            "{}: {} ({} min)  {}\n",
            verb, micro.title, micro.estimated_minutes, micro.id
        ));
    }
    if let Some((done, total)) = output.progress {
        out.push_str(&format!("Progress: {}/{}\n", done, total));
        if total > 0 && done == total {
            out.push_str("Every micro-task is done.\n");
        }
    }
    if let Some(outcome) = &output.outcome {
        if outcome.combo_count > 0 {
            out.push_str(&format!("Combo x{}\n", outcome.combo_count));
        }
        if let Some(reward) = &outcome.reward {
            out.push_str(&format!(
                "{} {} [{}]: {}\n",
                reward.emoji, reward.title, reward.kind, reward.description
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EpochMs, ManualClock, RewardSettings, ScriptedRandom, Task};
    use crate::storage::{BlobGateway, MemoryBlobStore, APP_STATE_KEY};
    use std::sync::Arc;

    const NOW: EpochMs = 1_700_000_000_000;

    type TestStore = Store<BlobGateway<Arc<MemoryBlobStore>>, Arc<ManualClock>>;
    type TestEngine = RewardEngine<ScriptedRandom, Arc<ManualClock>, Arc<MemoryBlobStore>>;

    fn setup(draws: Vec<f64>) -> (TestStore, TestEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(NOW));
        let blobs = Arc::new(MemoryBlobStore::new());
        let gateway = BlobGateway::new(Arc::clone(&blobs), APP_STATE_KEY);
        let mut store = Store::open(gateway, Arc::clone(&clock));
        store.dispatch(&Action::AddTask(Task::new("Write report", NOW).with_id("t1")));
        let engine = RewardEngine::new(
            ScriptedRandom::new(draws),
            Arc::clone(&clock),
            blobs,
            RewardSettings::default(),
        );
        (store, engine, clock)
    }

    #[test]
    fn test_add_clamps_and_defaults() {
        let (mut store, _engine, _clock) = setup(vec![0.9]);
        let config = Config::default();
        let mut cmd = MicroCommand::new(&mut store, &config);

        let output = cmd.add("t1", "Outline", None);
        assert_eq!(output.micro_task.unwrap().estimated_minutes, 5);

        let output = cmd.add("t1", "Draft", Some(90));
        assert_eq!(output.micro_task.unwrap().estimated_minutes, 15);
        assert_eq!(output.progress, Some((0, 2)));
    }

    #[test]
    fn test_add_to_missing_task_fails() {
        let (mut store, _engine, _clock) = setup(vec![0.9]);
        let config = Config::default();
        let output = MicroCommand::new(&mut store, &config).add("nope", "x", None);
        assert!(!output.succeeded());
    }

    #[test]
    fn test_three_micro_tasks_progress() {
        let (mut store, mut engine, clock) = setup(vec![0.9]);
        let config = Config::default();
        let mut cmd = MicroCommand::new(&mut store, &config);

        let ids: Vec<String> = (0..3)
            .map(|i| cmd.add("t1", &format!("step {}", i), None).micro_task.unwrap().id)
            .collect();

        cmd.complete("t1", &ids[0], &mut engine);
        clock.advance(60_000);
        let output = cmd.complete("t1", &ids[1], &mut engine);
        assert_eq!(output.progress, Some((2, 3)));
        assert_eq!(output.outcome.unwrap().combo_count, 1);

        let state = store.state();
        assert!(!state.tasks[0].status.is_completed());
        assert!(!state.tasks[0].is_all_complete());
    }

    #[test]
    fn test_complete_triggers_reward_once() {
        // Hit, then pick the first pool entry.
        let (mut store, mut engine, _clock) = setup(vec![0.0, 0.0]);
        let config = Config::default();
        let mut cmd = MicroCommand::new(&mut store, &config);
        let id = cmd.add("t1", "Outline", None).micro_task.unwrap().id;

        let first = cmd.complete("t1", &id, &mut engine);
        assert!(first.changed);
        assert_eq!(first.outcome.unwrap().reward.unwrap().id, "spark");

        let second = cmd.complete("t1", &id, &mut engine);
        assert!(second.success);
        assert!(!second.changed);
        assert!(second.outcome.is_none());
        assert_eq!(engine.completed_count(), 1);
    }

    #[test]
    fn test_complete_missing_micro_task_fails() {
        let (mut store, mut engine, _clock) = setup(vec![0.0]);
        let config = Config::default();
        let output = MicroCommand::new(&mut store, &config).complete("t1", "nope", &mut engine);
        assert!(!output.succeeded());
        assert_eq!(engine.completed_count(), 0);
    }

    #[test]
    fn test_format_reward() {
        let (mut store, mut engine, _clock) = setup(vec![0.0, 0.0]);
        let config = Config::default();
        let mut cmd = MicroCommand::new(&mut store, &config);
        let id = cmd.add("t1", "Outline", None).micro_task.unwrap().id;
        let output = cmd.complete("t1", &id, &mut engine);

        let text = cmd.format_output(&output, &OutputOptions::default());
        assert!(text.contains("Completed: Outline"));
        assert!(text.contains("Every micro-task is done."));
        assert!(text.contains("Spark [common]"));
    }
}
