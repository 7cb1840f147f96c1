//! Sprig configuration.
//!
//! `SPRIG_*` environment variables win over `<home>/config.toml`, which wins
//! over the built-in defaults. A missing or broken config file is not an
//! error; Sprig falls back to defaults and logs a warning.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::model::{MAX_MICRO_MINUTES, MIN_MICRO_MINUTES};
use crate::core::reward::RewardSettings;
use crate::error::{FailOpen, Result, SprigError};

/// Main configuration struct for Sprig.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub rewards: RewardsConfig,
    pub focus: FocusConfig,
    pub tasks: TasksConfig,
}

/// Where and how state is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Override for the state directory. Defaults to `<home>/state`.
    pub state_dir: Option<PathBuf>,
    /// Write snapshots from a background thread.
    pub background_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            background_writes: true,
        }
    }
}

/// Reward engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RewardsConfig {
    /// Completions closer together than this build a combo.
    pub combo_window_seconds: u64,
    /// Reward chance at combo 0.
    pub base_chance: f64,
    /// Reward chance at combo 0 when the task's micro-tasks are all done.
    pub all_complete_chance: f64,
}

impl RewardsConfig {
    /// Check if a chance value is valid.
    pub fn is_valid_chance(value: f64) -> bool {
        (0.0..=1.0).contains(&value)
    }

    pub fn settings(&self) -> RewardSettings {
        RewardSettings {
            combo_window_ms: i64::try_from(self.combo_window_seconds.saturating_mul(1000))
                .unwrap_or(i64::MAX),
            base_chance: self.base_chance,
            all_complete_chance: self.all_complete_chance,
        }
    }
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            combo_window_seconds: 300,
            base_chance: 0.3,
            all_complete_chance: 0.5,
        }
    }
}

/// Focus session defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FocusConfig {
    /// Session length when none is given.
    pub default_minutes: u32,
    /// Countdown refresh interval for `focus wait`.
    pub tick_millis: u64,
}

/// Shortest accepted tick interval.
pub const MIN_TICK_MILLIS: u64 = 10;

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            default_minutes: 15,
            tick_millis: 1000,
        }
    }
}

/// Task defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TasksConfig {
    /// Estimate for new micro-tasks when none is given.
    pub default_micro_minutes: u32,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            default_micro_minutes: 5,
        }
    }
}

impl Config {
    /// Defaults, then the user file, then the environment.
    pub fn load() -> Self {
        let mut config = Config::default();

        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        config.apply_env_overrides();
        config
    }

    /// Load user config from `<home>/config.toml`.
    fn load_user_config() -> Option<Config> {
        let path = sprig_home()?.join("config.toml");
        if !path.exists() {
            return None;
        }
        Self::load_from_file(&path)
            .map(Some)
            .fail_open_default("loading user config")
    }

    fn load_from_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| SprigError::storage(path, e))?;
        toml::from_str(&content).map_err(|e| SprigError::config(e.to_string()))
    }

    /// Overlay `SPRIG_*` variables onto the loaded values.
    fn apply_env_overrides(&mut self) {
        env_override(
            "SPRIG_COMBO_WINDOW_SECONDS",
            &mut self.rewards.combo_window_seconds,
            |v| *v > 0,
        );
        env_override(
            "SPRIG_BASE_CHANCE",
            &mut self.rewards.base_chance,
            |v| RewardsConfig::is_valid_chance(*v),
        );
        env_override(
            "SPRIG_ALL_COMPLETE_CHANCE",
            &mut self.rewards.all_complete_chance,
            |v| RewardsConfig::is_valid_chance(*v),
        );
        env_override(
            "SPRIG_FOCUS_MINUTES",
            &mut self.focus.default_minutes,
            |v| *v > 0,
        );
        env_override("SPRIG_TICK_MILLIS", &mut self.focus.tick_millis, |v| {
            *v >= MIN_TICK_MILLIS
        });
        env_override(
            "SPRIG_BACKGROUND_WRITES",
            &mut self.storage.background_writes,
            |_| true,
        );
    }

    /// Overlay `other` onto `self` field by field.
    ///
    /// Values from `other` take precedence if they differ from defaults.
    /// Invalid values in `other` are ignored with a warning.
    fn merge(mut self, other: Config) -> Self {
        if other.storage.state_dir.is_some() {
            self.storage.state_dir = other.storage.state_dir;
        }
        let default_storage = StorageConfig::default();
        if other.storage.background_writes != default_storage.background_writes {
            self.storage.background_writes = other.storage.background_writes;
        }

        let default_rewards = RewardsConfig::default();
        if other.rewards.combo_window_seconds != default_rewards.combo_window_seconds {
            if other.rewards.combo_window_seconds > 0 {
                self.rewards.combo_window_seconds = other.rewards.combo_window_seconds;
            } else {
                tracing::warn!("rewards.combo_window_seconds must be positive, ignoring");
            }
        }
        for (value, slot, name) in [
            (
                other.rewards.base_chance,
                &mut self.rewards.base_chance,
                "base_chance",
            ),
            (
                other.rewards.all_complete_chance,
                &mut self.rewards.all_complete_chance,
                "all_complete_chance",
            ),
        ] {
            if RewardsConfig::is_valid_chance(value) {
                *slot = value;
            } else {
                tracing::warn!("rewards.{} = {} is outside 0..=1, ignoring", name, value);
            }
        }

        let default_focus = FocusConfig::default();
        if other.focus.default_minutes != default_focus.default_minutes
            && other.focus.default_minutes > 0
        {
            self.focus.default_minutes = other.focus.default_minutes;
        }
        if other.focus.tick_millis != default_focus.tick_millis
            && other.focus.tick_millis >= MIN_TICK_MILLIS
        {
            self.focus.tick_millis = other.focus.tick_millis;
        }

        if other.tasks.default_micro_minutes != TasksConfig::default().default_micro_minutes {
            self.tasks.default_micro_minutes = other
                .tasks
                .default_micro_minutes
                .clamp(MIN_MICRO_MINUTES, MAX_MICRO_MINUTES);
        }

        self
    }

    /// Resolved state directory: the configured override or `<home>/state`.
    pub fn state_dir(&self) -> Option<PathBuf> {
        self.storage.state_dir.clone().or_else(state_dir)
    }
}

/// Parse `name` into `slot`, keeping the current value when unset or invalid.
fn env_override<T>(name: &str, slot: &mut T, valid: impl Fn(&T) -> bool)
where
    T: FromStr + std::fmt::Display,
{
    let Ok(raw) = env::var(name) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => *slot = value,
        _ => tracing::warn!(
            "Invalid {} value '{}'. Keeping '{}'.",
            name,
            raw,
            slot
        ),
    }
}

/// Get the Sprig home directory.
///
/// `SPRIG_HOME` when set and non-empty, otherwise `~/.sprig`, otherwise a
/// per-user temp directory.
pub fn sprig_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("SPRIG_HOME") {
        if home.is_empty() {
            tracing::warn!("SPRIG_HOME is empty, using default");
        } else {
            let path = PathBuf::from(&home);
            if path.is_absolute() {
                return Some(path);
            }
            if let Ok(canonical) = path.canonicalize() {
                return Some(canonical);
            }
            tracing::warn!("SPRIG_HOME is relative and doesn't exist, using as-is");
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return Some(home.join(".sprig"));
    }

    let fallback_path = fallback_sprig_home();
    tracing::warn!(
        "HOME not set, using fallback location: {}",
        fallback_path.display()
    );
    Some(fallback_path)
}

/// Get fallback home path when HOME is unavailable.
#[cfg(unix)]
fn fallback_sprig_home() -> PathBuf {
    use std::os::unix::fs::MetadataExt;
    let uid = std::fs::metadata("/").map(|m| m.uid()).unwrap_or(0);
    PathBuf::from(format!("/tmp/sprig-{}", uid))
}

#[cfg(not(unix))]
fn fallback_sprig_home() -> PathBuf {
    std::env::temp_dir().join("sprig")
}

/// Default directory for persisted blobs.
pub fn state_dir() -> Option<PathBuf> {
    sprig_home().map(|h| h.join("state"))
}

/// Where the CLI panic hook appends crash reports.
pub fn crash_log_path() -> Option<PathBuf> {
    sprig_home().map(|h| h.join("crash.log"))
}
