//! CLI commands for Sprig.
//!
//! Each command borrows the state store (and the reward engine where it
//! needs one), returns a serializable output, and formats it as JSON or
//! human-readable text.

pub mod dispatch;
pub mod doctor;
pub mod focus;
pub mod micro;
pub mod rewards;
pub mod tasks;
pub mod thoughts;

use serde::Serialize;

pub use dispatch::DispatchCommand;
pub use doctor::DoctorCommand;
pub use focus::FocusCommand;
pub use micro::MicroCommand;
pub use rewards::RewardsCommand;
pub use tasks::TaskCommand;
pub use thoughts::ThoughtCommand;

/// Output flags shared by every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

impl OutputOptions {
    /// Format `output` as pretty JSON or with `human`, or nothing when quiet.
    pub fn render<T: Serialize>(&self, output: &T, human: impl FnOnce(&T) -> String) -> String {
        if self.quiet {
            return String::new();
        }

        if self.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            human(output)
        }
    }
}

/// Outputs that report success for the exit code.
pub trait CommandOutcome {
    fn succeeded(&self) -> bool;
}

/// Human-readable milliseconds as `mm:ss`.
pub fn format_countdown(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
