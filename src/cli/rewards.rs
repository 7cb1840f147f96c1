//! Rewards command: ledger summary and recent rewards.

use serde::Serialize;

use crate::cli::{format_countdown, CommandOutcome, OutputOptions};
use crate::core::{Clock, EpochMs, RandomSource, Reward, RewardEngine, RewardStats};
use crate::storage::BlobStore;

/// How many of the latest rewards to show.
pub const RECENT_REWARDS: usize = 5;

/// Output format for the rewards command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardsOutput {
    pub success: bool,
    pub stats: RewardStats,
    /// Milliseconds until the current combo lapses.
    pub combo_window_remaining_ms: i64,
    /// Newest first.
    pub recent: Vec<Reward>,
}

impl CommandOutcome for RewardsOutput {
    fn succeeded(&self) -> bool {
        self.success
    }
}

/// The rewards command implementation.
pub struct RewardsCommand<'a, R: RandomSource, C: Clock, B: BlobStore> {
    engine: &'a mut RewardEngine<R, C, B>,
}

impl<'a, R: RandomSource, C: Clock, B: BlobStore> RewardsCommand<'a, R, C, B> {
    pub fn new(engine: &'a mut RewardEngine<R, C, B>) -> Self {
        Self { engine }
    }

    /// Summarize the ledger at `now`, closing a lapsed combo first.
    pub fn run(&mut self, now: EpochMs) -> RewardsOutput {
        self.engine.expire_combo(now);

        let earned = self.engine.earned_rewards();
        let recent = earned.iter().rev().take(RECENT_REWARDS).cloned().collect();

        RewardsOutput {
            success: true,
            stats: self.engine.stats(),
            combo_window_remaining_ms: self.engine.combo_window_remaining(now),
            recent,
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &RewardsOutput, options: &OutputOptions) -> String {
        options.render(output, format_human_readable)
    }
}

fn format_human_readable(output: &RewardsOutput) -> String {
    let stats = &output.stats;
    let mut out = format!(
        "Completed: {}\nRewards: {} (common {}, rare {}, epic {}, legendary {})\n",
        stats.completed_count,
        stats.total_earned,
        stats.common,
        stats.rare,
        stats.epic,
        stats.legendary
    );

    if stats.combo_count > 0 {
        out.push_str(&format!(
            "Combo x{} ({} left)\n",
            stats.combo_count,
            format_countdown(output.combo_window_remaining_ms)
        ));
    }

    if !output.recent.is_empty() {
        out.push_str("\nRecent:\n");
        for reward in &output.recent {
            out.push_str(&format!("  {} {} [{}]\n", reward.emoji, reward.title, reward.kind));
        }
    }
    out
}
