//! The state store: single owner of the canonical `AppState`.
//!
//! Every change goes through `dispatch`, which runs the pure reducer and
//! hands effective changes to the gateway. Readers get immutable snapshots.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::action::Action;
use crate::core::clock::Clock;
use crate::core::migrate::{migrate_with_report, DiscardedFragment};
use crate::core::model::{AppState, EpochMs};
use crate::core::reducer::reduce;
use crate::core::sanitize::sanitize_with_report;
use crate::storage::StateGateway;

/// What loading a raw document found and repaired.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    /// Whether a document was present at all.
    pub found: bool,
    /// Paths of container values flattened to text.
    pub coerced: Vec<String>,
    pub discarded: Vec<DiscardedFragment>,
    #[serde(skip)]
    pub state: AppState,
}

impl Inspection {
    pub fn is_clean(&self) -> bool {
        self.coerced.is_empty() && self.discarded.is_empty()
    }
}

/// Run a raw document through sanitize and migrate.
pub fn inspect(raw: Option<&Value>) -> Inspection {
    let Some(raw) = raw else {
        return Inspection::default();
    };
    let (sanitized, coerced) = sanitize_with_report(raw);
    let report = migrate_with_report(&sanitized);
    Inspection {
        found: true,
        coerced,
        discarded: report.discarded,
        state: report.state,
    }
}

/// Periodic signals derived from the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickCue {
    /// An active focus session has run its full duration.
    FocusElapsed {
        task_id: Option<String>,
        micro_task_id: Option<String>,
    },
}

/// Owner of the application state.
pub struct Store<G: StateGateway, C: Clock> {
    state: Arc<AppState>,
    gateway: G,
    clock: C,
    inspection: Inspection,
}

impl<G: StateGateway, C: Clock> Store<G, C> {
    /// Load persisted state through the gateway and build the store.
    ///
    /// A missing or unreadable document yields the empty state. A document
    /// that needed repair is written back in its repaired form.
    pub fn open(gateway: G, clock: C) -> Self {
        let raw = gateway.load();
        let inspection = inspect(raw.as_ref());

        let mut store = Self {
            state: Arc::new(AppState::default()),
            gateway,
            clock,
            inspection: Inspection::default(),
        };

        if inspection.found {
            let loaded = Action::LoadState(inspection.state.clone());
            store.state = reduce(&store.state, &loaded, store.clock.now_ms());
            info!(
                tasks = store.state.tasks.len(),
                thoughts = store.state.thoughts.len(),
                "state loaded"
            );
            if !inspection.is_clean() {
                warn!(
                    coerced = inspection.coerced.len(),
                    discarded = inspection.discarded.len(),
                    "persisted state repaired"
                );
                store.gateway.save(&store.state);
            }
        }

        store.inspection = inspection;
        store
    }

    /// Current snapshot.
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// What the startup load found.
    pub fn inspection(&self) -> &Inspection {
        &self.inspection
    }

    pub fn now(&self) -> EpochMs {
        self.clock.now_ms()
    }

    /// Apply `action`. Saves only when the state changed.
    pub fn dispatch(&mut self, action: &Action) -> Arc<AppState> {
        let next = reduce(&self.state, action, self.clock.now_ms());
        if Arc::ptr_eq(&next, &self.state) {
            debug!(action = action.kind(), "no-op");
        } else {
            debug!(action = action.kind(), "state changed");
            self.state = next;
            self.gateway.save(&self.state);
        }
        self.state()
    }

    /// Apply a wire-form action. Unknown or malformed actions are no-ops.
    pub fn dispatch_value(&mut self, raw: &Value) -> Arc<AppState> {
        match Action::from_value(raw) {
            Some(action) => self.dispatch(&action),
            None => {
                debug!("ignoring unrecognized action");
                self.state()
            }
        }
    }

    /// Signals due at `now`. Reads state only.
    pub fn on_tick(&self, now: EpochMs) -> Vec<TickCue> {
        let focus = &self.state.focus;
        let mut cues = Vec::new();
        if focus.is_elapsed(now) {
            cues.push(TickCue::FocusElapsed {
                task_id: focus.current_task_id.clone(),
                micro_task_id: focus.current_micro_task_id.clone(),
            });
        }
        cues
    }

    /// Wait for queued saves to reach the backend.
    pub fn flush(&self) {
        self.gateway.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::model::{MicroTask, Task, TaskStatus};
    use crate::storage::{BlobGateway, BlobStore, MemoryBlobStore, APP_STATE_KEY};
    use serde_json::json;

    const START: EpochMs = 1_700_000_000_000;

    type TestStore = Store<BlobGateway<Arc<MemoryBlobStore>>, Arc<ManualClock>>;

    fn open_with(store: &Arc<MemoryBlobStore>) -> (TestStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let gateway = BlobGateway::new(Arc::clone(store), APP_STATE_KEY);
        (Store::open(gateway, Arc::clone(&clock)), clock)
    }

    #[test]
    fn test_open_empty_does_not_write() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let (store, _clock) = open_with(&blobs);

        assert_eq!(*store.state(), AppState::default());
        assert!(!store.inspection().found);
        assert_eq!(blobs.write_count(), 0);
    }

    #[test]
    fn test_add_task_persists() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let (mut store, _clock) = open_with(&blobs);

        let task = Task::new("Write report", START).with_id("t1");
        let state = store.dispatch(&Action::AddTask(task));

        assert_eq!(state.tasks.len(), 1);
        assert_eq!(state.tasks[0].status, TaskStatus::Pending);
        assert!(state.tasks[0].micro_tasks.is_empty());

        let raw = blobs.load(APP_STATE_KEY).unwrap().unwrap();
        assert_eq!(raw["tasks"][0]["title"], "Write report");
    }

    #[test]
    fn test_noop_skips_save() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let (mut store, _clock) = open_with(&blobs);

        let before = store.state();
        let after = store.dispatch(&Action::DeleteTask("missing".into()));
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(blobs.write_count(), 0);
    }

    #[test]
    fn test_unknown_wire_action_is_noop() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let (mut store, _clock) = open_with(&blobs);

        let before = store.state();
        let after = store.dispatch_value(&json!({"type": "SELF_DESTRUCT", "payload": 1}));
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_wire_action_applies() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let (mut store, clock) = open_with(&blobs);

        store.dispatch(&Action::AddTask(Task::new("t", START).with_id("t1")));
        store.dispatch(&Action::AddMicroTask {
            task_id: "t1".into(),
            micro_task: MicroTask::new("m", 5, START).with_id("m1"),
        });
        clock.advance(1_000);

        let state = store.dispatch_value(&json!({
            "type": "COMPLETE_MICRO_TASK",
            "payload": {"taskId": "t1", "microTaskId": "m1"}
        }));
        let micro = state.tasks[0].micro_task("m1").unwrap();
        assert!(micro.is_completed());
        assert_eq!(micro.completed_at, Some(START + 1_000));
    }

    #[test]
    fn test_corrupt_blob_recovers() {
        let blobs = Arc::new(MemoryBlobStore::with_blob(
            APP_STATE_KEY,
            json!({
                "tasks": [
                    {"id": "a", "title": "ok"},
                    {"title": "no id"},
                    {"id": "b", "title": {"text": "nested"}}
                ],
                "thoughts": "not an array"
            }),
        ));
        let (store, _clock) = open_with(&blobs);

        let state = store.state();
        let ids: Vec<_> = state.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(state.tasks[1].title, r#"{"text":"nested"}"#);
        assert!(state.thoughts.is_empty());

        let inspection = store.inspection();
        assert_eq!(inspection.discarded.len(), 1);
        assert_eq!(inspection.coerced.len(), 1);

        // Repaired document written back.
        assert_eq!(blobs.write_count(), 1);
        let raw = blobs.load(APP_STATE_KEY).unwrap().unwrap();
        assert_eq!(raw["tasks"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_clean_blob_is_not_rewritten() {
        let blobs = Arc::new(MemoryBlobStore::new());
        {
            let (mut store, _clock) = open_with(&blobs);
            store.dispatch(&Action::AddTask(Task::new("keep", START).with_id("t1")));
        }
        assert_eq!(blobs.write_count(), 1);

        let (store, _clock) = open_with(&blobs);
        assert_eq!(store.state().tasks[0].title, "keep");
        assert_eq!(blobs.write_count(), 1);
    }

    #[test]
    fn test_failed_save_keeps_memory_state() {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs.set_fail_writes(true);
        let (mut store, _clock) = open_with(&blobs);

        let state = store.dispatch(&Action::AddTask(Task::new("t", START).with_id("t1")));
        assert_eq!(state.tasks.len(), 1);
        assert!(blobs.is_empty());
    }

    #[test]
    fn test_on_tick_reports_elapsed_focus() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let (mut store, clock) = open_with(&blobs);

        store.dispatch(&Action::StartFocus {
            task_id: "t1".into(),
            micro_task_id: None,
            duration: 60_000,
        });
        assert!(store.on_tick(clock.now_ms() + 59_999).is_empty());

        let cues = store.on_tick(clock.now_ms() + 60_000);
        assert_eq!(
            cues,
            vec![TickCue::FocusElapsed {
                task_id: Some("t1".into()),
                micro_task_id: None
            }]
        );

        store.dispatch(&Action::PauseFocus);
        assert!(store.on_tick(clock.now_ms() + 120_000).is_empty());
    }

    #[test]
    fn test_corrupt_focus_times_do_not_break_ticks() {
        let blobs = Arc::new(MemoryBlobStore::with_blob(
            APP_STATE_KEY,
            json!({"focus": {"isActive": true, "startTime": -1.0e300, "duration": 1000}}),
        ));
        let (mut store, clock) = open_with(&blobs);

        assert!(!store.state().focus.has_session());
        assert!(store.on_tick(clock.now_ms()).is_empty());

        store.dispatch_value(&json!({
            "type": "LOAD_STATE",
            "payload": {
                "tasks": [],
                "thoughts": [],
                "focus": {"isActive": true, "startTime": i64::MIN, "duration": 1000, "pausedTime": 0}
            }
        }));
        assert!(!store.state().focus.has_session());
        assert!(store.on_tick(clock.now_ms()).is_empty());
    }

    #[test]
    fn test_dispatched_state_matches_reopened_state() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let (mut store, _clock) = open_with(&blobs);

        store.dispatch(&Action::AddTask(Task::new("", START)));
        let mut micro = MicroTask::new("Stretch", 5, START).with_id("m1");
        micro.estimated_minutes = 90;
        micro.status = TaskStatus::Completed;
        let mut task = Task::new("Morning", START).with_id("t1");
        task.micro_tasks.push(micro);
        let live = store.dispatch(&Action::AddTask(task));
        assert_eq!(live.tasks.len(), 1);

        let (reopened, _clock) = open_with(&blobs);
        assert_eq!(*reopened.state(), *live);
        assert!(reopened.inspection().is_clean());
    }

    #[test]
    fn test_inspect_absent() {
        let inspection = inspect(None);
        assert!(!inspection.found);
        assert!(inspection.is_clean());
    }
}
