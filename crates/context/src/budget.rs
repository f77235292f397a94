//! Budget Tracker - bounds how long the orchestrator may keep refining
//!
//! Budget units are intentionally approximate (a fixed charge per dispatched
//! sub-question). Only bounded total work matters, not exact accounting.

use serde::{Deserialize, Serialize};

/// Budget state, replaced (never mutated in place) at round boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetState {
    /// Answering rounds completed
    pub iteration_nr: u32,

    /// Units left; may go negative when the last round overspent
    pub remaining_budget: i64,

    /// Sufficiency checks that reported open gaps
    pub insufficient_signal_count: u32,
}

/// Outcome of charging a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    Available,
    /// Normal termination condition, not an error
    Exhausted,
}

/// Aggregate sufficiency signal of the latest round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SufficiencySignal {
    /// Sub-answers of the round that are not fully answered
    pub open_gaps: usize,
}

impl SufficiencySignal {
    pub fn has_gaps(&self) -> bool {
        self.open_gaps > 0
    }
}

/// Refine/stop decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    ContinueRefine,
    Stop(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    NoGaps,
    RoundLimit,
    BudgetExhausted,
    /// Loop-prevention threshold on insufficient signals
    SignalLimit,
}

/// Budget tracker configuration
#[derive(Debug, Clone, Copy)]
pub struct BudgetTracker {
    max_rounds: u32,
    max_budget: i64,
    max_insufficient_signals: u32,
}

impl BudgetTracker {
    pub fn new(max_rounds: u32, max_budget: i64) -> Self {
        Self {
            max_rounds,
            max_budget,
            max_insufficient_signals: u32::MAX,
        }
    }

    /// Stop refining once `limit` insufficient signals were recorded
    pub fn with_signal_limit(mut self, limit: u32) -> Self {
        self.max_insufficient_signals = limit;
        self
    }

    pub fn init(&self) -> BudgetState {
        BudgetState {
            iteration_nr: 0,
            remaining_budget: self.max_budget,
            insufficient_signal_count: 0,
        }
    }

    /// Charge a completed round. Completes one iteration.
    pub fn charge(&self, state: BudgetState, cost: u32) -> (BudgetState, BudgetStatus) {
        let next = BudgetState {
            iteration_nr: state.iteration_nr + 1,
            remaining_budget: state.remaining_budget.saturating_sub(cost as i64),
            ..state
        };
        (next, Self::status(&next))
    }

    pub fn status(state: &BudgetState) -> BudgetStatus {
        if state.remaining_budget <= 0 {
            BudgetStatus::Exhausted
        } else {
            BudgetStatus::Available
        }
    }

    /// Count a sufficiency signal that reported gaps
    pub fn record_signal(&self, state: BudgetState, signal: &SufficiencySignal) -> BudgetState {
        if signal.has_gaps() {
            BudgetState {
                insufficient_signal_count: state.insufficient_signal_count + 1,
                ..state
            }
        } else {
            state
        }
    }

    pub fn decide_continue(&self, state: &BudgetState, signal: &SufficiencySignal) -> Decision {
        if !signal.has_gaps() {
            Decision::Stop(StopReason::NoGaps)
        } else if Self::status(state) == BudgetStatus::Exhausted {
            Decision::Stop(StopReason::BudgetExhausted)
        } else if state.iteration_nr >= self.max_rounds {
            Decision::Stop(StopReason::RoundLimit)
        } else if state.insufficient_signal_count >= self.max_insufficient_signals {
            Decision::Stop(StopReason::SignalLimit)
        } else {
            Decision::ContinueRefine
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaps(n: usize) -> SufficiencySignal {
        SufficiencySignal { open_gaps: n }
    }

    #[test]
    fn test_charge_is_monotonic() {
        let tracker = BudgetTracker::new(5, 4);
        let mut state = tracker.init();

        for cost in [1, 0, 2, 3] {
            let before = state.remaining_budget;
            let (next, _) = tracker.charge(state, cost);
            assert!(next.remaining_budget <= before);
            state = next;
        }

        assert_eq!(state.iteration_nr, 4);
        assert_eq!(state.remaining_budget, -2);
        assert_eq!(BudgetTracker::status(&state), BudgetStatus::Exhausted);
    }

    #[test]
    fn test_exhausted_at_zero() {
        let tracker = BudgetTracker::new(5, 2);
        let (state, status) = tracker.charge(tracker.init(), 1);
        assert_eq!(status, BudgetStatus::Available);
        let (_, status) = tracker.charge(state, 1);
        assert_eq!(status, BudgetStatus::Exhausted);
    }

    #[test]
    fn test_decide_continue() {
        let tracker = BudgetTracker::new(2, 10);
        let (state, _) = tracker.charge(tracker.init(), 2);

        assert_eq!(tracker.decide_continue(&state, &gaps(0)), Decision::Stop(StopReason::NoGaps));
        assert_eq!(tracker.decide_continue(&state, &gaps(1)), Decision::ContinueRefine);

        let (state, _) = tracker.charge(state, 2);
        assert_eq!(
            tracker.decide_continue(&state, &gaps(1)),
            Decision::Stop(StopReason::RoundLimit)
        );
    }

    #[test]
    fn test_exhausted_budget_stops() {
        let tracker = BudgetTracker::new(10, 1);
        let (state, status) = tracker.charge(tracker.init(), 3);
        assert_eq!(status, BudgetStatus::Exhausted);
        assert_eq!(
            tracker.decide_continue(&state, &gaps(2)),
            Decision::Stop(StopReason::BudgetExhausted)
        );
    }

    #[test]
    fn test_signal_limit() {
        let tracker = BudgetTracker::new(10, 100).with_signal_limit(2);
        let (mut state, _) = tracker.charge(tracker.init(), 1);

        state = tracker.record_signal(state, &gaps(1));
        assert_eq!(tracker.decide_continue(&state, &gaps(1)), Decision::ContinueRefine);

        state = tracker.record_signal(state, &gaps(1));
        assert_eq!(
            tracker.decide_continue(&state, &gaps(1)),
            Decision::Stop(StopReason::SignalLimit)
        );

        let unchanged = tracker.record_signal(state, &gaps(0));
        assert_eq!(unchanged, state);
    }
}
