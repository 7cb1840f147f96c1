//! Best-effort persistence of the application state.
//!
//! A gateway loads the raw document once at startup and saves a full
//! snapshot after every effective change. Neither direction can fail from
//! the caller's point of view: errors are logged and swallowed.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde_json::Value;
use tracing::{debug, warn};

use crate::core::model::AppState;
use crate::error::{FailOpen, Result};
use crate::storage::BlobStore;

/// Load/save seam between the state store and persistence.
pub trait StateGateway: Send {
    /// Raw persisted document, or `None` when absent or unreadable.
    fn load(&self) -> Option<Value>;

    /// Persist a snapshot. Never fails.
    fn save(&self, state: &Arc<AppState>);

    /// Block until every snapshot handed to `save` has been written.
    fn flush(&self) {}
}

impl<T: StateGateway + ?Sized> StateGateway for Box<T> {
    fn load(&self) -> Option<Value> {
        (**self).load()
    }

    fn save(&self, state: &Arc<AppState>) {
        (**self).save(state)
    }

    fn flush(&self) {
        (**self).flush()
    }
}

fn write_state(store: &dyn BlobStore, key: &str, state: &AppState) -> Result<()> {
    let value = serde_json::to_value(state)?;
    store.save(key, &value)
}

fn read_state(store: &dyn BlobStore, key: &str) -> Option<Value> {
    store
        .load(key)
        .fail_open_default("loading persisted state")
}

/// Gateway that writes synchronously on the caller's thread.
pub struct BlobGateway<B: BlobStore> {
    store: B,
    key: String,
}

impl<B: BlobStore> BlobGateway<B> {
    pub fn new(store: B, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

impl<B: BlobStore> StateGateway for BlobGateway<B> {
    fn load(&self) -> Option<Value> {
        read_state(&self.store, &self.key)
    }

    fn save(&self, state: &Arc<AppState>) {
        write_state(&self.store, &self.key, state).fail_open_default("saving state");
    }
}

enum WriterMsg {
    Save(Arc<AppState>),
    Flush(Sender<()>),
}

/// Gateway that hands snapshots to a writer thread.
///
/// Snapshots queued while a write is in progress are coalesced and only
/// the newest is written. Dropping the gateway drains the queue.
pub struct BackgroundGateway {
    store: Arc<dyn BlobStore>,
    key: String,
    sender: Option<Sender<WriterMsg>>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundGateway {
    pub fn new(store: Arc<dyn BlobStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let (sender, receiver) = mpsc::channel();

        let worker_store = Arc::clone(&store);
        let worker_key = key.clone();
        let worker = thread::Builder::new()
            .name("sprig-writer".to_string())
            .spawn(move || run_writer(worker_store, worker_key, receiver));

        let (sender, worker) = match worker {
            Ok(handle) => (Some(sender), Some(handle)),
            Err(e) => {
                warn!(error = %e, "could not start writer thread, saving inline");
                (None, None)
            }
        };

        Self {
            store,
            key,
            sender,
            worker,
        }
    }
}

fn absorb(msg: WriterMsg, pending: &mut Option<Arc<AppState>>, acks: &mut Vec<Sender<()>>) {
    match msg {
        WriterMsg::Save(state) => *pending = Some(state),
        WriterMsg::Flush(ack) => acks.push(ack),
    }
}

fn run_writer(store: Arc<dyn BlobStore>, key: String, receiver: Receiver<WriterMsg>) {
    let mut pending = None;
    let mut acks = Vec::new();

    while let Ok(msg) = receiver.recv() {
        absorb(msg, &mut pending, &mut acks);
        while let Ok(msg) = receiver.try_recv() {
            absorb(msg, &mut pending, &mut acks);
        }

        if let Some(state) = pending.take() {
            write_state(&*store, &key, &state).fail_open_default("saving state");
        }
        for ack in acks.drain(..) {
            let _ = ack.send(());
        }
    }

    debug!("writer thread stopped");
}

impl StateGateway for BackgroundGateway {
    fn load(&self) -> Option<Value> {
        read_state(&*self.store, &self.key)
    }

    fn save(&self, state: &Arc<AppState>) {
        let queued = self
            .sender
            .as_ref()
            .map(|sender| sender.send(WriterMsg::Save(Arc::clone(state))).is_ok())
            .unwrap_or(false);

        if !queued {
            write_state(&*self.store, &self.key, state).fail_open_default("saving state");
        }
    }

    fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (ack_tx, ack_rx) = mpsc::channel();
        if sender.send(WriterMsg::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for BackgroundGateway {
    fn drop(&mut self) {
        // Closing the channel lets the writer drain and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("writer thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Task, Thought, ThoughtKind};
    use crate::storage::{MemoryBlobStore, APP_STATE_KEY};
    use serde_json::json;

    fn state_with_tasks(n: usize) -> Arc<AppState> {
        let tasks = (0..n)
            .map(|i| Task::new(format!("task {}", i), i as i64).with_id(format!("t{}", i)))
            .collect();
        Arc::new(AppState {
            tasks,
            ..AppState::default()
        })
    }

    #[test]
    fn test_blob_gateway_roundtrip() {
        let store = Arc::new(MemoryBlobStore::new());
        let gateway = BlobGateway::new(Arc::clone(&store), APP_STATE_KEY);

        assert!(gateway.load().is_none());

        let state = state_with_tasks(2);
        gateway.save(&state);

        let raw = gateway.load().unwrap();
        assert_eq!(raw["tasks"][1]["id"], "t1");
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_save_failure_is_swallowed() {
        let store = Arc::new(MemoryBlobStore::new());
        store.set_fail_writes(true);
        let gateway = BlobGateway::new(Arc::clone(&store), APP_STATE_KEY);

        gateway.save(&state_with_tasks(1));
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_uses_wire_names() {
        let store = Arc::new(MemoryBlobStore::new());
        let gateway = BlobGateway::new(Arc::clone(&store), APP_STATE_KEY);

        let state = Arc::new(AppState {
            thoughts: vec![Thought::new("idea", ThoughtKind::Voice, 7).with_id("th1")],
            ..AppState::default()
        });
        gateway.save(&state);

        let raw = store.load(APP_STATE_KEY).unwrap().unwrap();
        assert_eq!(raw["thoughts"][0]["type"], "voice");
        assert_eq!(raw["thoughts"][0]["createdAt"], 7);
        assert_eq!(raw["focus"]["isActive"], false);
    }

    #[test]
    fn test_background_gateway_last_write_wins() {
        let store = Arc::new(MemoryBlobStore::new());
        let gateway = BackgroundGateway::new(store.clone(), APP_STATE_KEY);

        for n in 1..=20 {
            gateway.save(&state_with_tasks(n));
        }
        gateway.flush();

        let raw = store.load(APP_STATE_KEY).unwrap().unwrap();
        assert_eq!(raw["tasks"].as_array().unwrap().len(), 20);
        assert!(store.write_count() >= 1);
        assert!(store.write_count() <= 20);
    }

    #[test]
    fn test_background_gateway_drains_on_drop() {
        let store = Arc::new(MemoryBlobStore::new());
        {
            let gateway = BackgroundGateway::new(store.clone(), APP_STATE_KEY);
            gateway.save(&state_with_tasks(3));
        }

        let raw = store.load(APP_STATE_KEY).unwrap().unwrap();
        assert_eq!(raw["tasks"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_background_gateway_load() {
        let store = Arc::new(MemoryBlobStore::with_blob(
            APP_STATE_KEY,
            json!({"tasks": [], "thoughts": []}),
        ));
        let gateway = BackgroundGateway::new(store, APP_STATE_KEY);
        assert_eq!(gateway.load(), Some(json!({"tasks": [], "thoughts": []})));
    }

    #[test]
    fn test_flush_with_nothing_pending_returns() {
        let store = Arc::new(MemoryBlobStore::new());
        let gateway = BackgroundGateway::new(store.clone(), APP_STATE_KEY);
        gateway.flush();
        assert_eq!(store.write_count(), 0);
    }
}
