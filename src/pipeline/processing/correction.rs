//! Online-learned rating correction.
//!
//! The agent keeps a state/action value table over discretized ratings and the three
//! adjustments {-1, 0, +1}. Each refinement picks the best-valued adjustment, applies it under
//! the imputed-rating floor, scores the result against any ground-truth rating and performs a
//! single-step temporal-difference update. The whole table is flushed to its [`TableStore`]
//! after every update while the table lock is held, so a returned [`Correction`] implies the
//! mutation is durable and no reader ever sees an unpersisted value.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::app::ports::TableStore;
use crate::constants::{DEFAULT_ALPHA, DEFAULT_GAMMA, MAX_RATING, MIN_RATING, NEUTRAL_REWARD};
use crate::error::{RefineryError, Result};

/// Rating rounded half-to-even and clamped to 0..=10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RatingState(u8);

impl RatingState {
    pub const MAX: u8 = MAX_RATING as u8;

    pub fn from_rating(rating: f64) -> Self {
        if !rating.is_finite() {
            return RatingState(0);
        }
        let rounded = rating.clamp(MIN_RATING, MAX_RATING).round_ties_even();
        RatingState(rounded as u8)
    }

    pub fn new(value: u8) -> Option<Self> {
        (value <= Self::MAX).then_some(RatingState(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    Decrease,
    Hold,
    Increase,
}

impl Action {
    /// Evaluation order; on equal value and magnitude the earlier action wins.
    pub const ALL: [Action; 3] = [Action::Decrease, Action::Hold, Action::Increase];

    pub fn delta(self) -> i8 {
        match self {
            Action::Decrease => -1,
            Action::Hold => 0,
            Action::Increase => 1,
        }
    }

    pub fn from_delta(delta: i64) -> Option<Self> {
        match delta {
            -1 => Some(Action::Decrease),
            0 => Some(Action::Hold),
            1 => Some(Action::Increase),
            _ => None,
        }
    }
}

/// On-disk row of the value table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    state: i64,
    action: i64,
    value: f64,
}

/// Learned value per (state, action). Absent keys read as 0.0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TableEntry>", into = "Vec<TableEntry>")]
pub struct ValueTable {
    values: HashMap<(RatingState, Action), f64>,
}

impl ValueTable {
    pub fn get(&self, state: RatingState, action: Action) -> f64 {
        self.values.get(&(state, action)).copied().unwrap_or(0.0)
    }

    /// Returns the previous stored value, if any.
    pub fn set(&mut self, state: RatingState, action: Action, value: f64) -> Option<f64> {
        self.values.insert((state, action), value)
    }

    fn restore(&mut self, state: RatingState, action: Action, previous: Option<f64>) {
        match previous {
            Some(v) => {
                self.values.insert((state, action), v);
            }
            None => {
                self.values.remove(&(state, action));
            }
        }
    }

    pub fn max_value(&self, state: RatingState) -> f64 {
        Action::ALL
            .iter()
            .map(|a| self.get(state, *a))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Highest-valued action; ties go to the smallest adjustment magnitude.
    pub fn best_action(&self, state: RatingState) -> Action {
        let key = |action: Action| (self.get(state, action), -action.delta().abs());
        let mut best = Action::ALL[0];
        let mut best_key = key(best);
        for action in &Action::ALL[1..] {
            let candidate = key(*action);
            // Strict comparison: a full tie keeps the earlier action
            if candidate.0 > best_key.0 || (candidate.0 == best_key.0 && candidate.1 > best_key.1) {
                best = *action;
                best_key = candidate;
            }
        }
        best
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries ordered by state then action.
    pub fn entries(&self) -> Vec<(RatingState, Action, f64)> {
        let mut entries: Vec<_> = self.values.iter().map(|((s, a), v)| (*s, *a, *v)).collect();
        entries.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
        entries
    }
}

impl TryFrom<Vec<TableEntry>> for ValueTable {
    type Error = String;

    fn try_from(entries: Vec<TableEntry>) -> std::result::Result<Self, Self::Error> {
        let mut table = ValueTable::default();
        for entry in entries {
            let state = u8::try_from(entry.state)
                .ok()
                .and_then(RatingState::new)
                .ok_or_else(|| format!("state {} outside 0..=10", entry.state))?;
            let action = Action::from_delta(entry.action)
                .ok_or_else(|| format!("action {} not in {{-1, 0, 1}}", entry.action))?;
            if !entry.value.is_finite() {
                return Err(format!("non-finite value for state {}", entry.state));
            }
            table.set(state, action, entry.value);
        }
        Ok(table)
    }
}

impl From<ValueTable> for Vec<TableEntry> {
    fn from(table: ValueTable) -> Self {
        table
            .entries()
            .into_iter()
            .map(|(s, a, v)| TableEntry {
                state: s.value() as i64,
                action: a.delta() as i64,
                value: v,
            })
            .collect()
    }
}

/// Learning-rate and discount for the TD update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentParams {
    /// How fast new evidence overrides old estimates.
    pub alpha: f64,
    /// How much of the next state's best value bleeds into the update.
    pub gamma: f64,
}

impl Default for AgentParams {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            gamma: DEFAULT_GAMMA,
        }
    }
}

/// Result of one refinement step.
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub state: RatingState,
    pub action: Action,
    pub refined: f64,
    pub reward: f64,
    pub next_state: RatingState,
    /// Value stored for (state, action) after the update.
    pub updated_value: f64,
}

/// `clamp(0, 10, max(imputed, predicted + action))`.
///
/// The floor is intentional: a negative action can lower `predicted + action`, but never
/// below the imputed rating.
pub fn adjust_rating(predicted: f64, imputed: f64, action: Action) -> f64 {
    let adjusted = predicted + f64::from(action.delta());
    imputed.max(adjusted).clamp(MIN_RATING, MAX_RATING)
}

/// Linear closeness to the ground truth in [0, 1]; neutral 0.5 without a usable rating.
pub fn compute_reward(refined: f64, actual: Option<f64>) -> f64 {
    match actual {
        Some(actual) if actual.is_finite() => (1.0 - (refined - actual).abs() / 10.0).max(0.0),
        _ => NEUTRAL_REWARD,
    }
}

/// Process-wide correction agent. Construct once and share behind an `Arc`.
pub struct CorrectionAgent {
    store: Box<dyn TableStore>,
    table: Mutex<ValueTable>,
    params: AgentParams,
}

impl CorrectionAgent {
    /// Load the table from `store`. Nothing stored means a cold start;
    /// an unreadable table is returned as an error rather than discarded.
    pub fn open(store: Box<dyn TableStore>, params: AgentParams) -> Result<Self> {
        let table = match store.load()? {
            Some(table) => {
                info!("Correction agent loaded {} learned values", table.len());
                table
            }
            None => {
                info!("Correction agent starting with an empty value table");
                ValueTable::default()
            }
        };
        Ok(Self {
            store,
            table: Mutex::new(table),
            params,
        })
    }

    pub fn params(&self) -> AgentParams {
        self.params
    }

    fn lock(&self) -> MutexGuard<'_, ValueTable> {
        // Updates are reverted before an error is returned, so a poisoned table is consistent
        self.table.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn value(&self, state: RatingState, action: Action) -> f64 {
        self.lock().get(state, action)
    }

    pub fn best_action(&self, state: RatingState) -> Action {
        self.lock().best_action(state)
    }

    pub fn snapshot(&self) -> ValueTable {
        self.lock().clone()
    }

    /// One TD update of (state, action) followed by a full-table flush.
    pub fn update(
        &self,
        state: RatingState,
        action: Action,
        reward: f64,
        next_state: RatingState,
    ) -> Result<f64> {
        let mut table = self.lock();
        self.update_locked(&mut table, state, action, reward, next_state)
    }

    fn update_locked(
        &self,
        table: &mut ValueTable,
        state: RatingState,
        action: Action,
        reward: f64,
        next_state: RatingState,
    ) -> Result<f64> {
        let current = table.get(state, action);
        let next_max = table.max_value(next_state);
        let updated =
            current + self.params.alpha * (reward + self.params.gamma * next_max - current);

        let previous = table.set(state, action, updated);
        if let Err(e) = self.store.save(table) {
            table.restore(state, action, previous);
            warn!(
                "Value table flush failed for state {} action {}: {}",
                state.value(),
                action.delta(),
                e
            );
            crate::observability::metrics::refine::table_persist_failed();
            return Err(match e {
                RefineryError::TablePersist(_) => e,
                other => RefineryError::TablePersist(other.to_string()),
            });
        }

        debug!(
            "Q[{}, {}]: {:.4} -> {:.4} (reward {:.3}, next_max {:.4})",
            state.value(),
            action.delta(),
            current,
            updated,
            reward,
            next_max
        );
        Ok(updated)
    }

    /// Select, apply, score and learn from a correction in one critical section.
    pub fn correct(&self, predicted: f64, imputed: f64, actual: Option<f64>) -> Result<Correction> {
        let mut table = self.lock();

        let state = RatingState::from_rating(predicted);
        let action = table.best_action(state);
        let refined = adjust_rating(predicted, imputed, action);
        let reward = compute_reward(refined, actual);
        let next_state = RatingState::from_rating(refined);

        let updated_value = self.update_locked(&mut table, state, action, reward, next_state)?;

        Ok(Correction {
            state,
            action,
            refined,
            reward,
            next_state,
            updated_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::{InMemoryTableStore, JsonFileTableStore};
    use std::sync::Arc;

    fn agent_with(store: InMemoryTableStore) -> CorrectionAgent {
        CorrectionAgent::open(Box::new(store), AgentParams::default()).unwrap()
    }

    fn state(v: u8) -> RatingState {
        RatingState::new(v).unwrap()
    }

    #[test]
    fn test_state_rounds_half_to_even_and_clamps() {
        assert_eq!(RatingState::from_rating(9.5).value(), 10);
        assert_eq!(RatingState::from_rating(8.5).value(), 8);
        assert_eq!(RatingState::from_rating(8.51).value(), 9);
        assert_eq!(RatingState::from_rating(-3.0).value(), 0);
        assert_eq!(RatingState::from_rating(42.0).value(), 10);
        assert!(RatingState::new(11).is_none());
    }

    #[test]
    fn test_best_action_prefers_hold_on_empty_table() {
        let table = ValueTable::default();
        for v in 0..=10 {
            assert_eq!(table.best_action(state(v)), Action::Hold);
        }
    }

    #[test]
    fn test_best_action_picks_highest_value() {
        let mut table = ValueTable::default();
        table.set(state(5), Action::Increase, 0.3);
        table.set(state(5), Action::Hold, 0.1);
        assert_eq!(table.best_action(state(5)), Action::Increase);

        table.set(state(5), Action::Decrease, 0.7);
        assert_eq!(table.best_action(state(5)), Action::Decrease);
    }

    #[test]
    fn test_best_action_tie_breaks_on_smallest_magnitude() {
        let mut table = ValueTable::default();
        table.set(state(3), Action::Hold, 0.4);
        table.set(state(3), Action::Increase, 0.4);
        assert_eq!(table.best_action(state(3)), Action::Hold);

        // Equal magnitude: first in evaluation order
        let mut table = ValueTable::default();
        table.set(state(3), Action::Hold, -0.2);
        table.set(state(3), Action::Increase, 0.4);
        table.set(state(3), Action::Decrease, 0.4);
        assert_eq!(table.best_action(state(3)), Action::Decrease);
    }

    #[test]
    fn test_best_action_negative_values_lose_to_default() {
        let mut table = ValueTable::default();
        table.set(state(7), Action::Hold, -0.5);
        // Decrease and Increase read as 0.0; Decrease comes first
        assert_eq!(table.best_action(state(7)), Action::Decrease);
    }

    #[test]
    fn test_adjust_rating_floor_and_bounds() {
        assert_eq!(adjust_rating(9.5, 9.0, Action::Hold), 9.5);
        assert_eq!(adjust_rating(9.5, 9.0, Action::Decrease), 9.0);
        assert_eq!(adjust_rating(9.5, 9.0, Action::Increase), 10.0);
        assert_eq!(adjust_rating(0.2, 0.0, Action::Decrease), 0.0);
        assert_eq!(adjust_rating(3.0, 6.5, Action::Increase), 6.5);
    }

    #[test]
    fn test_refined_never_below_imputed_and_within_bounds() {
        for p in 0..=100 {
            for i in 0..=10 {
                let predicted = p as f64 / 10.0;
                let imputed = i as f64;
                for action in Action::ALL {
                    let refined = adjust_rating(predicted, imputed, action);
                    assert!(refined >= imputed);
                    assert!((0.0..=10.0).contains(&refined));
                }
            }
        }
    }

    #[test]
    fn test_reward_bounds_and_neutral() {
        assert!((compute_reward(9.5, Some(9.0)) - 0.95).abs() < 1e-12);
        assert_eq!(compute_reward(10.0, Some(0.0)), 0.0);
        assert_eq!(compute_reward(10.0, Some(-5.0)), 0.0);
        assert_eq!(compute_reward(4.0, None), 0.5);
        assert_eq!(compute_reward(4.0, Some(f64::NAN)), 0.5);
        assert_eq!(compute_reward(4.0, Some(f64::INFINITY)), 0.5);
    }

    #[test]
    fn test_update_applies_single_td_step() {
        let agent = agent_with(InMemoryTableStore::new());
        let updated = agent.update(state(10), Action::Hold, 0.95, state(10)).unwrap();
        // 0 + 0.5 * (0.95 + 0.9 * 0 - 0)
        assert!((updated - 0.475).abs() < 1e-12);
        assert_eq!(agent.value(state(10), Action::Hold), updated);

        // next_max now includes the freshly learned value
        let second = agent.update(state(10), Action::Hold, 0.95, state(10)).unwrap();
        let expected = 0.475 + 0.5 * (0.95 + 0.9 * 0.475 - 0.475);
        assert!((second - expected).abs() < 1e-12);
    }

    #[test]
    fn test_update_flushes_full_table_each_time() {
        let store = Arc::new(InMemoryTableStore::new());
        struct Shared(Arc<InMemoryTableStore>);
        impl TableStore for Shared {
            fn load(&self) -> Result<Option<ValueTable>> {
                self.0.load()
            }
            fn save(&self, table: &ValueTable) -> Result<()> {
                self.0.save(table)
            }
        }

        let agent =
            CorrectionAgent::open(Box::new(Shared(store.clone())), AgentParams::default()).unwrap();
        agent.update(state(2), Action::Hold, 0.5, state(2)).unwrap();
        agent.update(state(6), Action::Increase, 1.0, state(7)).unwrap();

        assert_eq!(store.save_count(), 2);
        assert_eq!(store.stored().unwrap(), agent.snapshot());
        assert_eq!(store.stored().unwrap().len(), 2);
    }

    #[test]
    fn test_failed_save_is_reverted_and_reported() {
        let mut seeded = ValueTable::default();
        seeded.set(state(4), Action::Hold, 0.25);
        let store = InMemoryTableStore::with_table(seeded.clone());
        store.set_failing(true);
        let agent = agent_with(store);

        let err = agent.update(state(4), Action::Hold, 1.0, state(4)).unwrap_err();
        assert!(matches!(err, RefineryError::TablePersist(_)));
        assert!(err.is_persistence());
        assert_eq!(agent.snapshot(), seeded);

        let err = agent.correct(6.0, 5.0, Some(6.0)).unwrap_err();
        assert!(err.is_persistence());
        assert_eq!(agent.snapshot(), seeded);
    }

    #[test]
    fn test_correct_example_scenario() {
        let agent = agent_with(InMemoryTableStore::new());
        let correction = agent.correct(9.5, 9.0, Some(9.0)).unwrap();

        assert_eq!(correction.state.value(), 10);
        assert_eq!(correction.action, Action::Hold);
        assert_eq!(correction.refined, 9.5);
        assert!((correction.reward - 0.95).abs() < 1e-12);
        assert_eq!(correction.next_state.value(), 10);
        assert!((agent.value(state(10), Action::Hold) - 0.475).abs() < 1e-12);
    }

    #[test]
    fn test_correct_is_deterministic_for_identical_table() {
        let mut seeded = ValueTable::default();
        seeded.set(state(6), Action::Increase, 0.8);
        let a = agent_with(InMemoryTableStore::with_table(seeded.clone()));
        let b = agent_with(InMemoryTableStore::with_table(seeded));

        let ca = a.correct(6.2, 5.0, None).unwrap();
        let cb = b.correct(6.2, 5.0, None).unwrap();
        assert_eq!(ca, cb);
        assert_eq!(ca.action, Action::Increase);
        assert!((ca.refined - 7.2).abs() < 1e-12);
        assert_eq!(ca.reward, 0.5);
    }

    #[test]
    fn test_reload_after_save_reproduces_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qtable.json");

        let agent =
            CorrectionAgent::open(Box::new(JsonFileTableStore::new(&path)), AgentParams::default())
                .unwrap();
        agent.correct(9.5, 9.0, Some(9.0)).unwrap();
        agent.correct(3.3, 7.0, None).unwrap();
        let before = agent.snapshot();
        drop(agent);

        let reopened =
            CorrectionAgent::open(Box::new(JsonFileTableStore::new(&path)), AgentParams::default())
                .unwrap();
        assert_eq!(reopened.snapshot(), before);
    }

    #[test]
    fn test_open_fails_on_corrupt_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qtable.json");
        std::fs::write(&path, "garbage").unwrap();

        let result = CorrectionAgent::open(Box::new(JsonFileTableStore::new(&path)), AgentParams::default());
        assert!(matches!(result, Err(RefineryError::CorruptTable { .. })));
        // The corrupt file is left untouched
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "garbage");
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let agent = Arc::new(agent_with(InMemoryTableStore::new()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let agent = agent.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        agent.update(state(1), Action::Hold, 1.0, state(9)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Sequential replay of 200 updates must match exactly
        let mut expected = 0.0;
        for _ in 0..200 {
            expected = expected + 0.5 * (1.0 + 0.9 * 0.0 - expected);
        }
        assert!((agent.value(state(1), Action::Hold) - expected).abs() < 1e-12);
    }
}
