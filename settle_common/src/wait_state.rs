//! Observable lifecycle of a single condition wait.
//!
//! Every waiter owns one [`WaitStateMachine`]. State changes are published on a
//! `tokio::sync::watch` channel so observers (tests, progress reporters) see the
//! waiter move `Idle → Polling → terminal` without polling the waiter itself.
//!
//! # Example
//!
//! ```rust,ignore
//! use settle_common::wait_state::{WaitState, WaitStateMachine};
//!
//! let sm = WaitStateMachine::new();
//! sm.transition_to_polling().unwrap();
//! sm.record_poll().unwrap();
//! sm.transition_to_satisfied().unwrap();
//!
//! let terminal = sm.wait_for_terminal().await;
//! assert_eq!(terminal, WaitState::Satisfied);
//! ```

use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle states of a condition wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitState {
    /// Created, no predicate evaluated yet
    Idle,

    /// Polling loop running; `polls` evaluations have completed so far
    Polling { polls: u32 },

    /// Predicate returned true
    Satisfied,

    /// Deadline elapsed before the predicate returned true
    TimedOut,

    /// Cancellation signal fired
    Cancelled,

    /// Predicate returned an error
    Failed { error: String },
}

impl WaitState {
    /// Returns true once the wait has resolved and no more polls will happen
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WaitState::Satisfied
                | WaitState::TimedOut
                | WaitState::Cancelled
                | WaitState::Failed { .. }
        )
    }

    /// Number of completed polls while the loop is running
    pub fn polls(&self) -> Option<u32> {
        match self {
            WaitState::Polling { polls } => Some(*polls),
            _ => None,
        }
    }
}

/// Watch-channel backed state machine for one wait.
#[derive(Clone)]
pub struct WaitStateMachine {
    sender: Arc<watch::Sender<WaitState>>,
    // Keeps the channel open while no external subscriber exists
    _receiver: watch::Receiver<WaitState>,
}

impl WaitStateMachine {
    /// Create a new state machine in the Idle state
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(WaitState::Idle);
        Self {
            sender: Arc::new(sender),
            _receiver: receiver,
        }
    }

    /// Get the current state without blocking
    pub fn current(&self) -> WaitState {
        self.sender.borrow().clone()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<WaitState> {
        self.sender.subscribe()
    }

    /// Transition from Idle to Polling
    pub fn transition_to_polling(&self) -> Result<(), &'static str> {
        self.apply(
            |state| matches!(state, WaitState::Idle),
            |_| WaitState::Polling { polls: 0 },
            "Can only start polling from Idle",
        )
    }

    /// Count one completed predicate evaluation
    pub fn record_poll(&self) -> Result<(), &'static str> {
        self.apply(
            |state| matches!(state, WaitState::Polling { .. }),
            |state| WaitState::Polling {
                polls: state.polls().unwrap_or(0).saturating_add(1),
            },
            "Can only record a poll while Polling",
        )
    }

    /// Transition from Polling to Satisfied
    pub fn transition_to_satisfied(&self) -> Result<(), &'static str> {
        self.apply(
            |state| matches!(state, WaitState::Polling { .. }),
            |_| WaitState::Satisfied,
            "Can only be satisfied while Polling",
        )
    }

    /// Transition from Polling to TimedOut
    pub fn transition_to_timed_out(&self) -> Result<(), &'static str> {
        self.apply(
            |state| matches!(state, WaitState::Polling { .. }),
            |_| WaitState::TimedOut,
            "Can only time out while Polling",
        )
    }

    /// Transition to Cancelled from any non-terminal state
    pub fn transition_to_cancelled(&self) -> Result<(), &'static str> {
        self.apply(
            |state| !state.is_terminal(),
            |_| WaitState::Cancelled,
            "Cannot transition from terminal state",
        )
    }

    /// Transition to Failed from any non-terminal state
    pub fn transition_to_failed(&self, error: String) -> Result<(), &'static str> {
        self.apply(
            |state| !state.is_terminal(),
            |_| WaitState::Failed { error },
            "Cannot transition from terminal state",
        )
    }

    /// Wait until the state is terminal and return it. Event-driven, no polling.
    pub async fn wait_for_terminal(&self) -> WaitState {
        let mut rx = self.sender.subscribe();
        loop {
            {
                let state = rx.borrow_and_update();
                if state.is_terminal() {
                    return state.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.current();
            }
        }
    }

    /// Check if the wait has resolved
    pub fn is_terminal(&self) -> bool {
        self.sender.borrow().is_terminal()
    }

    fn apply(
        &self,
        allowed: impl Fn(&WaitState) -> bool,
        next: impl FnOnce(&WaitState) -> WaitState,
        rejection: &'static str,
    ) -> Result<(), &'static str> {
        let transitioned = self.sender.send_if_modified(|state| {
            if allowed(state) {
                *state = next(state);
                true
            } else {
                false
            }
        });
        if transitioned { Ok(()) } else { Err(rejection) }
    }
}

impl Default for WaitStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
