//! Focus session commands: start, pause, resume, end, status, wait.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::cli::{format_countdown, CommandOutcome, OutputOptions};
use crate::config::Config;
use crate::core::{
    Action, AppState, Clock, EpochMs, RandomSource, RewardEngine, Store, TickCue, Ticker,
};
use crate::storage::{BlobStore, StateGateway};

/// Snapshot of the focus session for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusStatus {
    /// A session exists (running or paused).
    pub in_session: bool,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub micro_task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub micro_task_title: Option<String>,
    pub duration_ms: i64,
    pub elapsed_ms: i64,
    pub remaining_ms: i64,
}

impl FocusStatus {
    pub fn from_state(state: &AppState, now: EpochMs) -> Self {
        let focus = &state.focus;
        let task = focus.current_task_id.as_deref().and_then(|id| state.task(id));
        let micro = focus
            .current_micro_task_id
            .as_deref()
            .and_then(|id| task.and_then(|t| t.micro_task(id)));
        Self {
            in_session: focus.has_session(),
            is_active: focus.is_active,
            task_id: focus.current_task_id.clone(),
            task_title: task.map(|t| t.title.clone()),
            micro_task_id: focus.current_micro_task_id.clone(),
            micro_task_title: micro.map(|m| m.title.clone()),
            duration_ms: focus.duration,
            elapsed_ms: focus.elapsed_ms(now),
            remaining_ms: focus.remaining_ms(now),
        }
    }
}

/// Output format for the focus commands.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusOutput {
    pub success: bool,
    pub changed: bool,
    pub status: FocusStatus,
    /// Set by `wait` once the countdown ran out.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub elapsed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FocusOutput {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

impl CommandOutcome for FocusOutput {
    fn succeeded(&self) -> bool {
        self.success
    }
}

/// The focus command implementation.
pub struct FocusCommand<'a, G: StateGateway, C: Clock> {
    store: &'a mut Store<G, C>,
    config: &'a Config,
}

impl<'a, G: StateGateway, C: Clock> FocusCommand<'a, G, C> {
    pub fn new(store: &'a mut Store<G, C>, config: &'a Config) -> Self {
        Self { store, config }
    }

    fn output(&self, changed: bool) -> FocusOutput {
        FocusOutput {
            success: true,
            changed,
            status: FocusStatus::from_state(&self.store.state(), self.store.now()),
            ..FocusOutput::default()
        }
    }

    fn apply(&mut self, action: Action) -> FocusOutput {
        let before = self.store.state();
        let after = self.store.dispatch(&action);
        self.output(!std::sync::Arc::ptr_eq(&before, &after))
    }

    /// Start a session, replacing any running one.
    pub fn start(
        &mut self,
        task_id: &str,
        micro_id: Option<&str>,
        minutes: Option<u32>,
    ) -> FocusOutput {
        let state = self.store.state();
        let Some(task) = state.task(task_id) else {
            return FocusOutput::failure(format!("Task not found: {}", task_id));
        };
        if let Some(micro_id) = micro_id {
            if task.micro_task(micro_id).is_none() {
                return FocusOutput::failure(format!("Micro-task not found: {}", micro_id));
            }
        }

        let minutes = minutes.unwrap_or(self.config.focus.default_minutes);
        if minutes == 0 {
            return FocusOutput::failure("Focus length must be at least one minute");
        }

        self.apply(Action::StartFocus {
            task_id: task_id.to_string(),
            micro_task_id: micro_id.map(str::to_string),
            duration: i64::from(minutes) * 60_000,
        })
    }

    pub fn pause(&mut self) -> FocusOutput {
        self.apply(Action::PauseFocus)
    }

    pub fn resume(&mut self) -> FocusOutput {
        self.apply(Action::ResumeFocus)
    }

    pub fn end(&mut self) -> FocusOutput {
        self.apply(Action::EndFocus)
    }

    pub fn status(&self) -> FocusOutput {
        self.output(false)
    }

    /// Tick until the running session's countdown reaches zero, then end it.
    ///
    /// Each tick also lets the reward engine close an expired combo window.
    /// `sleep` is called between ticks and `progress` after each one.
    pub fn wait<R, RC, B>(
        &mut self,
        engine: &mut RewardEngine<R, RC, B>,
        mut sleep: impl FnMut(Duration),
        mut progress: impl FnMut(&FocusStatus),
    ) -> FocusOutput
    where
        R: RandomSource,
        RC: Clock,
        B: BlobStore,
    {
        let state = self.store.state();
        if !state.focus.has_session() || !state.focus.is_active {
            return FocusOutput::failure("No running focus session");
        }

        let interval = i64::try_from(self.config.focus.tick_millis).unwrap_or(i64::MAX);
        let mut ticker = Ticker::new(interval);

        loop {
            let now = self.store.now();
            if ticker.poll(now) {
                engine.expire_combo(now);

                let cues = self.store.on_tick(now);
                if cues
                    .iter()
                    .any(|cue| matches!(cue, TickCue::FocusElapsed { .. }))
                {
                    debug!("focus countdown elapsed");
                    let mut output = self.end();
                    output.elapsed = true;
                    return output;
                }

                let status = FocusStatus::from_state(&self.store.state(), now);
                if !status.is_active {
                    return self.output(false);
                }
                progress(&status);
            }

            let wait = ticker.until_next(now).clamp(1, interval.max(1));
            sleep(Duration::from_millis(u64::try_from(wait).unwrap_or(1)));
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &FocusOutput, options: &OutputOptions) -> String {
        options.render(output, format_human_readable)
    }
}

/// One-line countdown for progress display.
pub fn format_status_line(status: &FocusStatus) -> String {
    let target = match (&status.micro_task_title, &status.task_title) {
        (Some(micro), Some(task)) => format!("{} / {}", task, micro),
        (None, Some(task)) => task.clone(),
        _ => status.task_id.clone().unwrap_or_default(),
    };
    let state = if status.is_active { "focusing" } else { "paused" };
    format!(
        "{} {} remaining ({})",
        target,
        format_countdown(status.remaining_ms),
        state
    )
}

fn format_human_readable(output: &FocusOutput) -> String {
    if let Some(error) = &output.error {
        return format!("Error: {}\n", error);
    }
    if output.elapsed {
        return "Focus session complete.\n".to_string();
    }
    if !output.status.in_session {
        return "No focus session.\n".to_string();
    }
    let mut line = format_status_line(&output.status);
    if !output.changed {
        line.push_str(" [unchanged]");
    }
    line.push('\n');
    line
}
