//! Sprig - micro-task focus companion
//!
//! Sprig breaks tasks into short micro-tasks, runs focus sessions against
//! them, and hands out variable-ratio rewards on completion. All state lives
//! in one JSON document that is repaired on load and saved on every
//! effective change.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod storage;
pub mod util;

pub use config::Config;
pub use core::{
    inspect, reduce, Action, AppState, Clock, FocusState, Inspection, MicroTask, RewardEngine,
    RewardSettings, Store, SystemClock, Task, TaskStatus, Thought,
};
pub use error::{FailOpen, Result, SprigError};
pub use storage::{
    BackgroundGateway, BlobGateway, BlobStore, FileBlobStore, MemoryBlobStore, StateGateway,
    APP_STATE_KEY, REWARDS_KEY,
};

// CLI commands
pub use cli::{
    DispatchCommand, DoctorCommand, FocusCommand, MicroCommand, RewardsCommand, TaskCommand,
    ThoughtCommand,
};
