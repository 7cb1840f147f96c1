//! Doctor command: report what loading the persisted state would repair.
//!
//! Runs the same sanitize and migrate pipeline as startup but never writes.

use serde::Serialize;

use crate::cli::{CommandOutcome, OutputOptions};
use crate::core::{inspect, DiscardedFragment};
use crate::storage::StateGateway;

/// Output format for the doctor command.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorOutput {
    pub success: bool,
    /// Whether a persisted document exists.
    pub found: bool,
    pub tasks: usize,
    pub micro_tasks: usize,
    pub thoughts: usize,
    pub coerced: Vec<String>,
    pub discarded: Vec<DiscardedFragment>,
}

impl DoctorOutput {
    pub fn is_clean(&self) -> bool {
        self.coerced.is_empty() && self.discarded.is_empty()
    }
}

impl CommandOutcome for DoctorOutput {
    fn succeeded(&self) -> bool {
        self.success
    }
}

/// The doctor command implementation.
pub struct DoctorCommand<'a, G: StateGateway> {
    gateway: &'a G,
}

impl<'a, G: StateGateway> DoctorCommand<'a, G> {
    pub fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    pub fn run(&self) -> DoctorOutput {
        let raw = self.gateway.load();
        let inspection = inspect(raw.as_ref());
        let state = &inspection.state;

        DoctorOutput {
            success: true,
            found: inspection.found,
            tasks: state.tasks.len(),
            micro_tasks: state.tasks.iter().map(|t| t.micro_tasks.len()).sum(),
            thoughts: state.thoughts.len(),
            coerced: inspection.coerced,
            discarded: inspection.discarded,
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &DoctorOutput, options: &OutputOptions) -> String {
        options.render(output, format_human_readable)
    }
}

fn format_human_readable(output: &DoctorOutput) -> String {
    if !output.found {
        return "No saved state yet.\n".to_string();
    }

    let mut out = format!(
        "Saved state: {} task(s), {} micro-task(s), {} thought(s)\n",
        output.tasks, output.micro_tasks, output.thoughts
    );

    if output.is_clean() {
        out.push_str("No problems found.\n");
        return out;
    }

    if !output.coerced.is_empty() {
        out.push_str(&format!(
            "\nFlattened to text ({}):\n",
            output.coerced.len()
        ));
        for path in &output.coerced {
            out.push_str(&format!("  {}\n", path));
        }
    }
    if !output.discarded.is_empty() {
        out.push_str(&format!(
            "\nWill be dropped on next load ({}):\n",
            output.discarded.len()
        ));
        for fragment in &output.discarded {
            out.push_str(&format!(
                "  {} {}: {}\n",
                fragment.kind,
                fragment.position,
                fragment.reason()
            ));
        }
    }
    out
}
