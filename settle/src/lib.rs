//! # settle
//!
//! Deterministic "wait for condition" polling. Instead of sleeping for a fixed
//! time and hoping the system under test is ready, callers hand `settle` a
//! predicate and a budget; it polls until the predicate holds, the budget runs
//! out, or the caller cancels.
//!
//! ## Modules
//!
//! - **`request`**: `WaitRequest`, validated `WaitSettings` and the `PollPolicy`.
//! - **`waiter`**: `ConditionWaiter`, the polling loop, and the `wait_until*` helpers.
//! - **`error`**: `WaitError` (`InvalidArgument`, `Predicate`).
//! - **`config`**: TOML/environment configuration of default cadences.
//! - **`probe`**: readiness probes (path, TCP, command) used by the binary.
//! - **`shell`**: the `settle` command-line host.
//! - **`utils`**: logging initialization.
//! - **`test_utils`**: helpers shared by tests.
//!
//! The observable wait lifecycle (`WaitState`) lives in `settle_common`.

pub mod config;
pub mod error;
pub mod probe;
pub mod request;
pub mod shell;
pub mod test_utils;
pub mod utils;
pub mod waiter;

pub use error::{BoxError, WaitError};
pub use request::{PollPolicy, WaitRequest, WaitSettings};
pub use settle_common::{WaitState, WaitStateMachine};
pub use waiter::{
    ConditionWaiter, WaitOutcome, WaitReport, try_wait_until, try_wait_until_async, wait_until,
    wait_until_async, wait_until_cancellable,
};
