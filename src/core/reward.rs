//! Variable-ratio reward engine.
//!
//! Every micro-task completion is one trigger. Completions that follow each
//! other within the combo window raise the combo level, which scales the
//! chance of drawing a reward from the weighted pool. The ledger is written
//! to the blob store after every trigger; a failed write is only logged.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::clock::Clock;
use crate::core::model::{is_representable, EpochMs};
use crate::error::{FailOpen, Result, SprigError};
use crate::storage::{BlobStore, REWARDS_KEY};

/// Highest combo level.
pub const MAX_COMBO: u8 = 4;

/// Chance multiplier per combo level.
pub const COMBO_MULTIPLIERS: [f64; MAX_COMBO as usize + 1] = [1.0, 1.2, 1.5, 2.0, 3.0];

/// Reward rarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardKind {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl RewardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
        }
    }
}

impl std::fmt::Display for RewardKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reward definition from the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RewardKind,
    pub title: String,
    pub emoji: String,
    pub description: String,
    pub probability: f64,
}

impl Reward {
    fn define(
        id: &str,
        kind: RewardKind,
        title: &str,
        emoji: &str,
        description: &str,
        probability: f64,
    ) -> Self {
        Self {
            id: id.to_string(),
            kind,
            title: title.to_string(),
            emoji: emoji.to_string(),
            description: description.to_string(),
            probability,
        }
    }
}

/// The built-in reward pool. Probabilities sum to 1.0.
pub fn default_pool() -> Vec<Reward> {
    use RewardKind::*;
    vec![
        Reward::define("spark", Common, "Spark", "✨", "One more step done.", 0.30),
        Reward::define("sprout", Common, "Sprout", "🌱", "Small steps add up.", 0.25),
        Reward::define("streak", Rare, "On a Roll", "🔥", "You kept the momentum going.", 0.20),
        Reward::define("bullseye", Rare, "Bullseye", "🎯", "Right on target.", 0.12),
        Reward::define("surge", Epic, "Surge", "⚡", "A burst of focus.", 0.08),
        Reward::define("deep-work", Epic, "Deep Work", "🧠", "Locked in and delivering.", 0.04),
        Reward::define("trophy", Legendary, "Unstoppable", "🏆", "A rare run of wins.", 0.01),
    ]
}

/// Pick a pool entry by cumulative probability.
///
/// Returns the first entry whose cumulative mass exceeds `r`, or the first
/// entry when the masses fall short of `r`. `None` only for an empty pool.
pub fn roll_reward(pool: &[Reward], r: f64) -> Option<&Reward> {
    let mut cumulative = 0.0;
    for reward in pool {
        cumulative += reward.probability;
        if r < cumulative {
            return Some(reward);
        }
    }
    pool.first()
}

/// Uniform draws in `[0, 1)`.
pub trait RandomSource: Send {
    fn next_f64(&mut self) -> f64;
}

/// `RandomSource` backed by any `rand` generator.
#[derive(Debug, Clone)]
pub struct RngSource<R>(R);

impl RngSource<StdRng> {
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send> RandomSource for RngSource<R> {
    fn next_f64(&mut self) -> f64 {
        self.0.gen::<f64>()
    }
}

/// Replays a fixed list of draws, then repeats the last one.
#[derive(Debug, Clone)]
pub struct ScriptedRandom {
    draws: Vec<f64>,
    next: usize,
}

impl ScriptedRandom {
    pub fn new(draws: impl Into<Vec<f64>>) -> Self {
        Self {
            draws: draws.into(),
            next: 0,
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn next_f64(&mut self) -> f64 {
        let Some(last) = self.draws.last().copied() else {
            return 0.0;
        };
        let draw = self.draws.get(self.next).copied().unwrap_or(last);
        self.next += 1;
        draw
    }
}

/// Tunables for the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardSettings {
    pub combo_window_ms: i64,
    pub base_chance: f64,
    pub all_complete_chance: f64,
}

impl Default for RewardSettings {
    fn default() -> Self {
        Self {
            combo_window_ms: 5 * 60 * 1000,
            base_chance: 0.3,
            all_complete_chance: 0.5,
        }
    }
}

impl RewardSettings {
    /// Reward chance for a trigger at `combo`, capped at 1.0.
    pub fn chance(&self, combo: u8, is_all_complete: bool) -> f64 {
        let base = if is_all_complete {
            self.all_complete_chance
        } else {
            self.base_chance
        };
        let multiplier = COMBO_MULTIPLIERS[usize::from(combo.min(MAX_COMBO))];
        (base * multiplier).min(1.0)
    }
}

/// Draw against `chance`, then make an independent second draw for the pool.
pub fn draw_reward<R: RandomSource + ?Sized>(
    random: &mut R,
    chance: f64,
    pool: &[Reward],
) -> Option<Reward> {
    if random.next_f64() < chance {
        roll_reward(pool, random.next_f64()).cloned()
    } else {
        None
    }
}

/// Persisted engine state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RewardLedger {
    pub completed_count: u64,
    pub combo_count: u8,
    pub last_completion_time: EpochMs,
    pub earned_rewards: Vec<Reward>,
}

/// Result of one trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOutcome {
    pub reward: Option<Reward>,
    pub combo_count: u8,
}

/// Summary of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardStats {
    pub completed_count: u64,
    pub combo_count: u8,
    pub total_earned: usize,
    pub common: usize,
    pub rare: usize,
    pub epic: usize,
    pub legendary: usize,
}

/// Stateful reward service.
pub struct RewardEngine<R: RandomSource, C: Clock, B: BlobStore> {
    random: R,
    clock: C,
    store: B,
    settings: RewardSettings,
    pool: Vec<Reward>,
    ledger: RewardLedger,
}

impl<R: RandomSource, C: Clock, B: BlobStore> RewardEngine<R, C, B> {
    /// Create an engine, restoring the ledger from `store` when present.
    pub fn new(random: R, clock: C, store: B, settings: RewardSettings) -> Self {
        let ledger = load_ledger(&store).fail_open_default("loading reward ledger");
        Self {
            random,
            clock,
            store,
            settings,
            pool: default_pool(),
            ledger,
        }
    }

    /// Replace the pool (tests and custom pools).
    pub fn with_pool(mut self, pool: Vec<Reward>) -> Self {
        self.pool = pool;
        self
    }

    /// Record one completion and maybe award a reward.
    pub fn trigger_completion(&mut self, is_all_complete: bool) -> CompletionOutcome {
        let now = self.clock.now_ms();
        let ledger = &mut self.ledger;

        if now.saturating_sub(ledger.last_completion_time) < self.settings.combo_window_ms {
            ledger.combo_count = (ledger.combo_count + 1).min(MAX_COMBO);
        } else {
            ledger.combo_count = 0;
        }
        ledger.last_completion_time = now;
        ledger.completed_count += 1;

        let combo = ledger.combo_count;
        let chance = self.settings.chance(combo, is_all_complete);
        let reward = draw_reward(&mut self.random, chance, &self.pool);

        if let Some(reward) = &reward {
            info!(reward = %reward.id, kind = %reward.kind, combo, "reward earned");
            self.ledger.earned_rewards.push(reward.clone());
        } else {
            debug!(combo, chance, "no reward this time");
        }
        self.persist();

        CompletionOutcome {
            reward,
            combo_count: combo,
        }
    }

    pub fn completed_count(&self) -> u64 {
        self.ledger.completed_count
    }

    pub fn combo_count(&self) -> u8 {
        self.ledger.combo_count
    }

    pub fn last_completion_time(&self) -> EpochMs {
        self.ledger.last_completion_time
    }

    pub fn earned_rewards(&self) -> Vec<Reward> {
        self.ledger.earned_rewards.clone()
    }

    pub fn ledger(&self) -> &RewardLedger {
        &self.ledger
    }

    /// Milliseconds left in the current combo window, zero when closed.
    pub fn combo_window_remaining(&self, now: EpochMs) -> i64 {
        if self.ledger.combo_count == 0 {
            return 0;
        }
        self.ledger
            .last_completion_time
            .saturating_add(self.settings.combo_window_ms)
            .saturating_sub(now)
            .max(0)
    }

    /// Drop the combo once its window has passed. Returns `true` if it was reset.
    pub fn expire_combo(&mut self, now: EpochMs) -> bool {
        if self.ledger.combo_count == 0 || self.combo_window_remaining(now) > 0 {
            return false;
        }
        debug!(combo = self.ledger.combo_count, "combo window expired");
        self.ledger.combo_count = 0;
        self.persist();
        true
    }

    pub fn stats(&self) -> RewardStats {
        let mut stats = RewardStats {
            completed_count: self.ledger.completed_count,
            combo_count: self.ledger.combo_count,
            total_earned: self.ledger.earned_rewards.len(),
            ..RewardStats::default()
        };
        for reward in &self.ledger.earned_rewards {
            match reward.kind {
                RewardKind::Common => stats.common += 1,
                RewardKind::Rare => stats.rare += 1,
                RewardKind::Epic => stats.epic += 1,
                RewardKind::Legendary => stats.legendary += 1,
            }
        }
        stats
    }

    fn persist(&self) {
        serde_json::to_value(&self.ledger)
            .map_err(SprigError::from)
            .and_then(|value| self.store.save(REWARDS_KEY, &value))
            .fail_open_default("saving reward ledger");
    }
}

fn load_ledger<B: BlobStore>(store: &B) -> Result<RewardLedger> {
    let Some(raw) = store.load(REWARDS_KEY)? else {
        return Ok(RewardLedger::default());
    };
    let mut ledger: RewardLedger = serde_json::from_value(raw)?;
    ledger.combo_count = ledger.combo_count.min(MAX_COMBO);
    if !is_representable(ledger.last_completion_time) {
        warn!(
            last_completion_time = ledger.last_completion_time,
            "reward ledger has an impossible completion time; combo reset"
        );
        ledger.last_completion_time = 0;
        ledger.combo_count = 0;
    }
    Ok(ledger)
}
