//! Dispatch command: apply a raw wire action.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::cli::{CommandOutcome, OutputOptions};
use crate::core::{Action, Clock, Store};
use crate::storage::StateGateway;

/// Output format for the dispatch command.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutput {
    pub success: bool,
    /// Whether the action decoded into a known action.
    pub recognized: bool,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandOutcome for DispatchOutput {
    fn succeeded(&self) -> bool {
        self.success
    }
}

/// The dispatch command implementation.
pub struct DispatchCommand<'a, G: StateGateway, C: Clock> {
    store: &'a mut Store<G, C>,
}

impl<'a, G: StateGateway, C: Clock> DispatchCommand<'a, G, C> {
    pub fn new(store: &'a mut Store<G, C>) -> Self {
        Self { store }
    }

    /// Apply `input`, a JSON `{"type": ..., "payload": ...}` document.
    ///
    /// Unknown types are reported as unrecognized no-ops, not errors.
    pub fn run(&mut self, input: &str) -> DispatchOutput {
        let raw: Value = match serde_json::from_str(input) {
            Ok(raw) => raw,
            Err(e) => {
                return DispatchOutput {
                    error: Some(format!("Invalid JSON: {}", e)),
                    ..DispatchOutput::default()
                }
            }
        };

        let action = Action::from_value(&raw).map(|a| a.kind().to_string());
        let before = self.store.state();
        let after = self.store.dispatch_value(&raw);

        DispatchOutput {
            success: true,
            recognized: action.is_some(),
            changed: !Arc::ptr_eq(&before, &after),
            action: action.or_else(|| {
                raw.get("type")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            }),
            error: None,
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &DispatchOutput, options: &OutputOptions) -> String {
        options.render(output, format_human_readable)
    }
}

fn format_human_readable(output: &DispatchOutput) -> String {
    if let Some(error) = &output.error {
        return format!("Error: {}\n", error);
    }
    let name = output.action.as_deref().unwrap_or("(untyped)");
    match (output.recognized, output.changed) {
        (false, _) => format!("{}: not a known action, ignored\n", name),
        (true, true) => format!("{}: applied\n", name),
        (true, false) => format!("{}: no change\n", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EpochMs, ManualClock};
    use crate::storage::{BlobGateway, MemoryBlobStore, APP_STATE_KEY};

    const NOW: EpochMs = 1_700_000_000_000;

    type TestStore = Store<BlobGateway<Arc<MemoryBlobStore>>, Arc<ManualClock>>;

    fn setup() -> TestStore {
        let gateway = BlobGateway::new(Arc::new(MemoryBlobStore::new()), APP_STATE_KEY);
        Store::open(gateway, Arc::new(ManualClock::new(NOW)))
    }

    #[test]
    fn test_applies_wire_action() {
        let mut store = setup();
        let output = DispatchCommand::new(&mut store).run(
            r#"{"type":"ADD_TASK","payload":{"id":"t1","title":"From wire","microTasks":[],"status":"pending","createdAt":1}}"#,
        );

        assert!(output.recognized);
        assert!(output.changed);
        assert_eq!(output.action.as_deref(), Some("ADD_TASK"));
        assert_eq!(store.state().tasks[0].title, "From wire");
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let mut store = setup();
        let mut cmd = DispatchCommand::new(&mut store);
        let output = cmd.run(r#"{"type":"TELEPORT"}"#);

        assert!(output.success);
        assert!(!output.recognized);
        assert!(!output.changed);
        assert_eq!(
            cmd.format_output(&output, &OutputOptions::default()),
            "TELEPORT: not a known action, ignored\n"
        );
    }

    #[test]
    fn test_blank_title_is_recognized_but_ignored() {
        let mut store = setup();
        let output = DispatchCommand::new(&mut store).run(
            r#"{"type":"ADD_TASK","payload":{"id":"t1","title":"  ","status":"pending","createdAt":1}}"#,
        );

        assert!(output.recognized);
        assert!(!output.changed);
        assert!(store.state().tasks.is_empty());
    }

    #[test]
    fn test_noop_action() {
        let mut store = setup();
        let output = DispatchCommand::new(&mut store).run(r#"{"type":"END_FOCUS"}"#);
        assert!(output.recognized);
        assert!(!output.changed);
    }

    #[test]
    fn test_invalid_json() {
        let mut store = setup();
        let output = DispatchCommand::new(&mut store).run("{oops");
        assert!(!output.succeeded());
    }
}
