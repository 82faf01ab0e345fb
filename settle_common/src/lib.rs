//! Shared building blocks for `settle`.
//!
//! Currently this is the observable wait-state machine that every
//! `ConditionWaiter` owns.

pub mod wait_state;

pub use wait_state::{WaitState, WaitStateMachine};
