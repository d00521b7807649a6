//! Weighted round-robin scheduling over provider/model candidates.
//!
//! Each candidate is unrolled into `weight` adjacent copies in registration
//! order, and a cursor walks that expanded list. With `(A,2),(B,1),(C,3)` one
//! cycle is `A A B C C C`: selections are proportional to weight but bursty,
//! not interleaved.

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::types::Candidate;
use hatbot_core::{Error, Result};

/// Deterministic weighted round-robin scheduler.
#[derive(Debug, Default)]
pub struct WeightedRoundRobinScheduler {
    state: Mutex<SchedulerState>,
}

#[derive(Debug, Default)]
struct SchedulerState {
    candidates: Vec<Candidate>,
    /// Indices into `candidates`, one per unit of weight.
    expanded: Vec<usize>,
    /// Always in `[0, expanded.len())` when `expanded` is non-empty.
    cursor: usize,
}

impl SchedulerState {
    fn build(candidates: Vec<Candidate>) -> Result<Self> {
        if candidates.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one candidate must be registered".into(),
            ));
        }

        let mut expanded = Vec::new();
        for (idx, candidate) in candidates.iter().enumerate() {
            if candidate.weight < 1 {
                return Err(Error::InvalidConfig(format!(
                    "candidate '{}' has weight {}; weights must be >= 1",
                    candidate.id, candidate.weight
                )));
            }
            expanded.extend(std::iter::repeat(idx).take(candidate.weight as usize));
        }

        Ok(Self {
            candidates,
            expanded,
            cursor: 0,
        })
    }
}

impl WeightedRoundRobinScheduler {
    /// Build a scheduler over `candidates`.
    pub fn new(candidates: Vec<Candidate>) -> Result<Self> {
        let state = SchedulerState::build(candidates)?;
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Replace the whole candidate set and reset the cursor.
    ///
    /// Validation happens before the swap, so a rejected registration leaves
    /// the current candidates and cursor untouched.
    pub fn register(&self, candidates: Vec<Candidate>) -> Result<()> {
        let next = SchedulerState::build(candidates)?;
        info!(
            "Scheduler registered {} candidates (cycle length {})",
            next.candidates.len(),
            next.expanded.len()
        );
        *self.state.lock() = next;
        Ok(())
    }

    /// Build a fresh scheduler from `candidates`, leaving `self` as it is.
    pub fn reload(&self, candidates: Vec<Candidate>) -> Result<Self> {
        Self::new(candidates)
    }

    /// Return the candidate under the cursor and advance the cursor.
    pub fn next(&self) -> Result<String> {
        let mut state = self.state.lock();
        if state.expanded.is_empty() {
            return Err(Error::EmptyScheduler);
        }
        let idx = state.expanded[state.cursor];
        state.cursor = (state.cursor + 1) % state.expanded.len();
        let id = state.candidates[idx].id.clone();
        debug!("Scheduler selected {}", id);
        Ok(id)
    }

    /// Registered candidates in registration order.
    pub fn candidates(&self) -> Vec<Candidate> {
        self.state.lock().candidates.clone()
    }

    /// Number of `next()` calls in one full cycle (sum of weights).
    pub fn cycle_len(&self) -> usize {
        self.state.lock().expanded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn cands(pairs: &[(&str, i64)]) -> Vec<Candidate> {
        pairs.iter().map(|&(id, w)| Candidate::new(id, w)).collect()
    }

    fn abc() -> WeightedRoundRobinScheduler {
        WeightedRoundRobinScheduler::new(cands(&[("A", 2), ("B", 1), ("C", 3)])).unwrap()
    }

    fn take(sched: &WeightedRoundRobinScheduler, n: usize) -> Vec<String> {
        (0..n).map(|_| sched.next().unwrap()).collect()
    }

    #[test]
    fn test_burst_order_follows_registration() {
        let sched = abc();
        assert_eq!(take(&sched, 6), vec!["A", "A", "B", "C", "C", "C"]);
    }

    #[test]
    fn test_every_window_matches_weights() {
        let sched = abc();
        let seq = take(&sched, 30);
        for window in seq.windows(6) {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for id in window {
                *counts.entry(id.as_str()).or_default() += 1;
            }
            assert_eq!(counts["A"], 2);
            assert_eq!(counts["B"], 1);
            assert_eq!(counts["C"], 3);
        }
        // Identical across full cycles
        assert_eq!(seq[0..6], seq[6..12]);
        assert_eq!(seq[6..12], seq[24..30]);
    }

    #[test]
    fn test_empty_scheduler() {
        let sched = WeightedRoundRobinScheduler::default();
        assert!(sched.is_empty());
        assert!(matches!(sched.next(), Err(Error::EmptyScheduler)));

        let err = sched.register(Vec::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(matches!(sched.next(), Err(Error::EmptyScheduler)));
    }

    #[test]
    fn test_invalid_weight_keeps_previous_state() {
        let sched = abc();
        assert_eq!(sched.next().unwrap(), "A");

        for bad in [0i64, -3] {
            let err = sched.register(cands(&[("X", 1), ("Y", bad)])).unwrap_err();
            assert!(matches!(err, Error::InvalidConfig(_)));
        }

        // Cursor was not reset and candidates were not replaced
        assert_eq!(take(&sched, 5), vec!["A", "B", "C", "C", "C"]);
        assert_eq!(sched.candidates().len(), 3);
    }

    #[test]
    fn test_register_resets_cursor() {
        let sched = abc();
        take(&sched, 4);
        sched.register(cands(&[("X", 1), ("Y", 2)])).unwrap();
        assert_eq!(sched.cycle_len(), 3);
        assert_eq!(take(&sched, 4), vec!["X", "Y", "Y", "X"]);
    }

    #[test]
    fn test_reload_returns_new_instance() {
        let sched = abc();
        take(&sched, 2);
        let reloaded = sched.reload(cands(&[("Z", 1)])).unwrap();
        assert_eq!(reloaded.next().unwrap(), "Z");
        // Original keeps its own candidates and cursor
        assert_eq!(sched.next().unwrap(), "B");

        assert!(sched.reload(cands(&[("Z", 0)])).is_err());
        assert_eq!(sched.next().unwrap(), "C");
    }

    #[test]
    fn test_concurrent_next_preserves_counts() {
        let sched = Arc::new(abc());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sched = sched.clone();
                std::thread::spawn(move || take(&sched, 60))
            })
            .collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                *counts.entry(id).or_default() += 1;
            }
        }
        // 240 calls = 40 full cycles
        assert_eq!(counts["A"], 80);
        assert_eq!(counts["B"], 40);
        assert_eq!(counts["C"], 120);
    }
}
