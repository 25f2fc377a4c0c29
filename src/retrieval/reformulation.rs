//! Reformulation retry state machine
//!
//! ```text
//! Initial ─Start→ Searching(1) ─Completed(n ≥ min)→ Terminal(Success)
//!                      │
//!                      └─Completed(n < min, budget left)→ Reformulating(a)
//!                                                              │
//!                      Searching(a + 1) ←──────Rewritten───────┘
//! Searching(a) ─Completed(n < min, budget spent)→ Terminal(Exhausted)
//! any non-terminal ─Cancelled→ Terminal(Cancelled)
//! ```
//!
//! Attempts are numbered from 1. The controller allows at most
//! `retry_budget + 1` attempts in total.

use serde::{Deserialize, Serialize};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// An attempt reached the minimum result count
    Success,
    /// Every allowed attempt came up short; not an error
    Exhausted,
    /// A cancellation signal stopped further attempts
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReformulationState {
    Initial,
    Searching { attempt: u32 },
    Reformulating { attempt: u32 },
    Terminal(Termination),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReformulationEvent {
    Start,
    /// The current attempt finished with `result_count` capped results;
    /// `cancelled` reports whether a cancellation signal was seen meanwhile
    Completed { result_count: usize, cancelled: bool },
    /// A broader query is ready for the next attempt
    Rewritten,
    Cancelled,
}

/// Bounded retry controller driving the retrieval attempts of one run
#[derive(Debug, Clone)]
pub struct ReformulationController {
    state: ReformulationState,
    min_results: usize,
    retry_budget: u32,
}

impl ReformulationController {
    pub fn new(min_results: usize, retry_budget: u32) -> Self {
        Self {
            state: ReformulationState::Initial,
            min_results,
            retry_budget,
        }
    }

    pub fn state(&self) -> ReformulationState {
        self.state
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry_budget + 1
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, ReformulationState::Terminal(_))
    }

    pub fn termination(&self) -> Option<Termination> {
        match self.state {
            ReformulationState::Terminal(t) => Some(t),
            _ => None,
        }
    }

    /// Feed one event and return the new state
    ///
    /// Events that make no sense in the current state leave it unchanged.
    pub fn advance(&mut self, event: ReformulationEvent) -> ReformulationState {
        use ReformulationEvent as E;
        use ReformulationState as S;

        let next = match (self.state, event) {
            (S::Terminal(_), _) => self.state,
            (_, E::Cancelled) => S::Terminal(Termination::Cancelled),
            (S::Initial, E::Start) => S::Searching { attempt: 1 },
            (
                S::Searching { attempt },
                E::Completed {
                    result_count,
                    cancelled,
                },
            ) => {
                if result_count >= self.min_results {
                    S::Terminal(Termination::Success)
                } else if attempt >= self.max_attempts() {
                    S::Terminal(Termination::Exhausted)
                } else if cancelled {
                    S::Terminal(Termination::Cancelled)
                } else {
                    S::Reformulating { attempt }
                }
            }
            (S::Reformulating { attempt }, E::Rewritten) => S::Searching {
                attempt: attempt + 1,
            },
            (state, event) => {
                tracing::warn!("Ignoring {:?} in reformulation state {:?}", event, state);
                state
            }
        };

        self.state = next;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReformulationEvent as E;
    use ReformulationState as S;

    fn completed(result_count: usize) -> ReformulationEvent {
        E::Completed {
            result_count,
            cancelled: false,
        }
    }

    #[test]
    fn test_success_on_first_attempt() {
        let mut controller = ReformulationController::new(3, 2);
        assert_eq!(controller.advance(E::Start), S::Searching { attempt: 1 });
        assert_eq!(
            controller.advance(completed(5)),
            S::Terminal(Termination::Success)
        );
        assert!(controller.is_terminal());
    }

    #[test]
    fn test_exhausts_after_budget_plus_one_attempts() {
        let mut controller = ReformulationController::new(3, 2);
        controller.advance(E::Start);

        let mut attempts = 1;
        loop {
            match controller.advance(completed(0)) {
                S::Reformulating { .. } => {
                    controller.advance(E::Rewritten);
                    attempts += 1;
                }
                S::Terminal(t) => {
                    assert_eq!(t, Termination::Exhausted);
                    break;
                }
                other => panic!("unexpected state {:?}", other),
            }
        }
        assert_eq!(attempts, 3);
    }

    #[test]
    fn test_zero_budget_exhausts_immediately() {
        let mut controller = ReformulationController::new(1, 0);
        controller.advance(E::Start);
        assert_eq!(
            controller.advance(completed(0)),
            S::Terminal(Termination::Exhausted)
        );
    }

    #[test]
    fn test_cancellation_between_attempts() {
        let mut controller = ReformulationController::new(3, 2);
        controller.advance(E::Start);
        assert_eq!(
            controller.advance(E::Completed {
                result_count: 1,
                cancelled: true
            }),
            S::Terminal(Termination::Cancelled)
        );
    }

    #[test]
    fn test_success_wins_over_cancellation() {
        let mut controller = ReformulationController::new(3, 2);
        controller.advance(E::Start);
        assert_eq!(
            controller.advance(E::Completed {
                result_count: 4,
                cancelled: true
            }),
            S::Terminal(Termination::Success)
        );
    }

    #[test]
    fn test_invalid_events_ignored() {
        let mut controller = ReformulationController::new(3, 2);
        assert_eq!(controller.advance(E::Rewritten), S::Initial);
        assert_eq!(controller.advance(completed(10)), S::Initial);

        controller.advance(E::Start);
        assert_eq!(controller.advance(E::Start), S::Searching { attempt: 1 });

        controller.advance(completed(10));
        assert_eq!(
            controller.advance(E::Cancelled),
            S::Terminal(Termination::Success)
        );
    }
}
