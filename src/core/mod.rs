//! Core types and logic for Sprig.
//!
//! The data model, the action vocabulary and its pure reducer, the
//! load-time repair pipeline (sanitize, then migrate), the store that owns
//! the state, and the reward engine.

pub mod action;
pub mod clock;
pub mod migrate;
pub mod model;
pub mod reducer;
pub mod reward;
pub mod sanitize;
pub mod store;

pub use action::Action;
pub use clock::{Clock, ManualClock, SystemClock, Ticker};
pub use migrate::{
    migrate, migrate_with_report, DiscardedFragment, FragmentKind, MigrationIssue,
    MigrationReport,
};
pub use model::{
    AppState, DueDate, EpochMs, FocusState, MicroTask, Task, TaskStatus, Thought, ThoughtKind,
    ThoughtStatus,
};
pub use reducer::reduce;
pub use reward::{
    default_pool, roll_reward, CompletionOutcome, RandomSource, Reward, RewardEngine, RewardKind,
    RewardLedger, RewardSettings, RewardStats, RngSource, ScriptedRandom,
};
pub use sanitize::{sanitize, sanitize_with_report};
pub use store::{inspect, Inspection, Store, TickCue};
