//! UCB1 hint bandit with a sliding reward window.
//!
//! Process-wide by design: hint learning accumulates across workers, so
//! the state lives behind one mutex and tests reset it explicitly.
//! Reconfiguring the window length or exploration constant clears all
//! state, since scores under the old parameters are not comparable.

use std::collections::{HashMap, VecDeque};
use std::sync::{LazyLock, Mutex, MutexGuard};

use rand::seq::SliceRandom;
use rand::RngCore;

#[derive(Debug, Clone, Default)]
struct ArmStats {
    count: u64,
    reward_sum: f64,
}

#[derive(Debug, Clone)]
struct WindowEntry {
    arm: String,
    reward: f64,
}

/// UCB1 over named arms. `window = 0` keeps unbounded history.
#[derive(Debug)]
pub struct HintBandit {
    arms: HashMap<String, ArmStats>,
    window: VecDeque<WindowEntry>,
    window_len: usize,
    exploration: f64,
    total: u64,
    /// Floor applied to an arm's reward sum after each update; PQS uses
    /// 0.0 so penalties cannot drive an arm permanently negative.
    reward_floor: Option<f64>,
}

impl HintBandit {
    pub fn new(window_len: usize, exploration: f64) -> Self {
        Self {
            arms: HashMap::new(),
            window: VecDeque::new(),
            window_len,
            exploration,
            total: 0,
            reward_floor: None,
        }
    }

    pub fn with_reward_floor(mut self, floor: f64) -> Self {
        self.reward_floor = Some(floor);
        self
    }

    /// Resets all state when the parameters changed.
    pub fn reconfigure(&mut self, window_len: usize, exploration: f64) {
        if self.window_len != window_len || self.exploration != exploration {
            self.window_len = window_len;
            self.exploration = exploration;
            self.arms.clear();
            self.window.clear();
            self.total = 0;
        }
    }

    pub fn reset(&mut self) {
        self.arms.clear();
        self.window.clear();
        self.total = 0;
    }

    /// Records one observation, evicting the oldest window entry when
    /// the window is full.
    pub fn record(&mut self, arm: &str, reward: f64) {
        if self.window_len != 0 && self.window.len() >= self.window_len {
            if let Some(old) = self.window.pop_front() {
                if let Some(stats) = self.arms.get_mut(&old.arm) {
                    stats.count = stats.count.saturating_sub(1);
                    stats.reward_sum -= old.reward;
                    self.total = self.total.saturating_sub(1);
                }
            }
        }
        let stats = self.arms.entry(arm.to_string()).or_default();
        stats.count += 1;
        stats.reward_sum += reward;
        if let Some(floor) = self.reward_floor {
            stats.reward_sum = stats.reward_sum.max(floor);
        }
        self.total += 1;
        if self.window_len != 0 {
            self.window.push_back(WindowEntry {
                arm: arm.to_string(),
                reward,
            });
        }
    }

    pub fn plays(&self, arm: &str) -> u64 {
        self.arms.get(arm).map_or(0, |s| s.count)
    }

    /// `avg + c * sqrt(ln N / n)`; `None` for an unplayed arm.
    pub fn score(&self, arm: &str) -> Option<f64> {
        let stats = self.arms.get(arm)?;
        if stats.count == 0 {
            return None;
        }
        let avg = stats.reward_sum / stats.count as f64;
        let n = self.total.max(1) as f64;
        Some(avg + self.exploration * (n.ln() / stats.count as f64).sqrt())
    }

    /// Picks up to `limit` distinct non-empty arms: unplayed arms first
    /// in uniform random order, then played arms by descending score.
    pub fn pick(&self, rng: &mut dyn RngCore, candidates: &[String], limit: usize) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut unplayed: Vec<&String> = Vec::new();
        let mut played: Vec<(&String, f64)> = Vec::new();
        for arm in candidates {
            if arm.is_empty() || !seen.insert(arm) {
                continue;
            }
            match self.score(arm) {
                None => unplayed.push(arm),
                Some(score) => played.push((arm, score)),
            }
        }
        unplayed.shuffle(rng);
        played.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        unplayed
            .into_iter()
            .chain(played.into_iter().map(|(a, _)| a))
            .take(limit)
            .cloned()
            .collect()
    }
}

static HINT_BANDIT: LazyLock<Mutex<HintBandit>> =
    LazyLock::new(|| Mutex::new(HintBandit::new(0, std::f64::consts::SQRT_2)));

fn hint_bandit(window: usize, exploration: f64) -> MutexGuard<'static, HintBandit> {
    let mut guard = HINT_BANDIT
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    guard.reconfigure(window, exploration);
    guard
}

/// Picks up to `limit` hints from `hints` using the process-wide bandit
/// configured with `(window, exploration)`.
pub fn pick_hints_bandit(
    rng: &mut dyn RngCore,
    hints: &[String],
    limit: usize,
    window: usize,
    exploration: f64,
) -> Vec<String> {
    hint_bandit(window, exploration).pick(rng, hints, limit)
}

/// Records a reward for a hint on the process-wide bandit.
pub fn update_hint_bandit(hint: &str, reward: f64, window: usize, exploration: f64) {
    hint_bandit(window, exploration).record(hint, reward);
}

/// Clears the process-wide bandit. Test hook.
pub fn reset_hint_bandit() {
    HINT_BANDIT
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .reset();
}
