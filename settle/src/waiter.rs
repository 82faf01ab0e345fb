//! # Condition Waiter
//!
//! Polls a caller-supplied predicate until it returns true, the deadline
//! passes, or the request's cancellation token fires. Replaces fixed sleeps in
//! async tests with a bounded, observable wait.
//!
//! ## Contract
//!
//! - The first evaluation happens immediately. Later evaluations are spaced by
//!   at least the poll interval (see [`crate::PollPolicy`]).
//! - `true` resolves with [`WaitOutcome::Satisfied`].
//! - After a `false` evaluation at or past the deadline the wait resolves with
//!   [`WaitOutcome::TimedOut`]. An evaluation still running when the deadline
//!   passes is dropped and the wait times out at the deadline. Timing out is an
//!   outcome, not an error.
//! - A fired cancellation token resolves with [`WaitOutcome::Cancelled`]. A
//!   token that is already cancelled when the wait starts yields `Cancelled`
//!   with zero evaluations. An in-flight async evaluation is dropped.
//! - A predicate `Err` stops polling and surfaces as [`WaitError::Predicate`].
//!
//! Each waiter owns its timer and its [`WaitStateMachine`], so concurrent
//! waits never interact.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use settle::{wait_until, WaitOutcome};
//! use std::time::Duration;
//!
//! let report = wait_until(Duration::from_secs(1), Duration::from_millis(10), || {
//!     server.is_ready()
//! })
//! .await?;
//! assert_eq!(report.outcome, WaitOutcome::Satisfied);
//! ```

use crate::error::{BoxError, WaitError};
use crate::request::{WaitRequest, WaitSettings};
use settle_common::{WaitState, WaitStateMachine};
use std::convert::Infallible;
use std::fmt;
use std::future::{Future, ready};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Terminal result of a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Satisfied,
    TimedOut,
    Cancelled,
}

impl WaitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitOutcome::Satisfied => "satisfied",
            WaitOutcome::TimedOut => "timed out",
            WaitOutcome::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WaitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a wait together with how it got there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitReport {
    pub outcome: WaitOutcome,
    /// Number of completed predicate evaluations
    pub polls: u32,
    /// Time from the start of the wait until it resolved
    pub elapsed: Duration,
}

impl WaitReport {
    pub fn is_satisfied(&self) -> bool {
        self.outcome == WaitOutcome::Satisfied
    }
}

/// Drives one [`WaitRequest`] to completion.
pub struct ConditionWaiter<P> {
    request: WaitRequest<P>,
    state: WaitStateMachine,
}

impl<P> ConditionWaiter<P> {
    pub fn new(request: WaitRequest<P>) -> Self {
        Self {
            request,
            state: WaitStateMachine::new(),
        }
    }

    /// Observe this waiter's state transitions.
    pub fn subscribe(&self) -> watch::Receiver<WaitState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> WaitState {
        self.state.current()
    }

    pub fn settings(&self) -> &WaitSettings {
        self.request.settings()
    }

    /// Handle on this waiter's state machine, usable after `wait` consumes the waiter.
    pub fn state_machine(&self) -> WaitStateMachine {
        self.state.clone()
    }
}

impl<P, Fut, E> ConditionWaiter<P>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: Into<BoxError>,
{
    /// Run the polling loop until the wait resolves.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Predicate`] if the predicate fails.
    pub async fn wait(self) -> Result<WaitReport, WaitError> {
        let ConditionWaiter { request, state } = self;
        let WaitRequest {
            mut predicate,
            settings,
            cancellation,
        } = request;
        let cancellation = cancellation.unwrap_or_default();

        let start = Instant::now();
        // None when the timeout is too large to represent; such a wait never expires
        let deadline = start.checked_add(settings.timeout());
        let mut polls: u32 = 0;

        if cancellation.is_cancelled() {
            return Ok(finish_cancelled(&state, polls, start));
        }

        expect_transition(state.transition_to_polling());
        tracing::debug!(
            poll_interval_ms = settings.poll_interval().as_millis() as u64,
            timeout_ms = settings.timeout().as_millis() as u64,
            "Starting condition wait"
        );

        loop {
            let evaluation = tokio::select! {
                biased;
                result = predicate() => result,
                _ = cancellation.cancelled() => {
                    return Ok(finish_cancelled(&state, polls, start));
                }
                _ = expire_at(deadline) => {
                    return Ok(finish_timed_out(&state, polls, start));
                }
            };
            polls = polls.saturating_add(1);

            let satisfied = match evaluation {
                Ok(satisfied) => satisfied,
                Err(err) => {
                    let source: BoxError = err.into();
                    expect_transition(state.transition_to_failed(source.to_string()));
                    tracing::error!(polls, error = %source, "Predicate failed; stopping wait");
                    return Err(WaitError::Predicate { polls, source });
                }
            };
            expect_transition(state.record_poll());

            if satisfied {
                expect_transition(state.transition_to_satisfied());
                let report = report(WaitOutcome::Satisfied, polls, start);
                tracing::info!(
                    polls,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Condition satisfied"
                );
                return Ok(report);
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok(finish_timed_out(&state, polls, start));
            }

            let delay = settings.delay_after(polls);
            tracing::trace!(polls, delay_ms = delay.as_millis() as u64, "Condition not met yet");

            tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    return Ok(finish_cancelled(&state, polls, start));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn report(outcome: WaitOutcome, polls: u32, start: Instant) -> WaitReport {
    WaitReport {
        outcome,
        polls,
        elapsed: start.elapsed(),
    }
}

fn finish_cancelled(state: &WaitStateMachine, polls: u32, start: Instant) -> WaitReport {
    expect_transition(state.transition_to_cancelled());
    tracing::debug!(polls, "Condition wait cancelled");
    report(WaitOutcome::Cancelled, polls, start)
}

fn finish_timed_out(state: &WaitStateMachine, polls: u32, start: Instant) -> WaitReport {
    expect_transition(state.transition_to_timed_out());
    let report = report(WaitOutcome::TimedOut, polls, start);
    tracing::warn!(
        polls,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Condition not met before timeout"
    );
    report
}

/// Resolves at `deadline`, or never when there is none.
async fn expire_at(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// The loop only requests transitions valid for its current state.
fn expect_transition(result: Result<(), &'static str>) {
    debug_assert!(result.is_ok(), "wait state transition rejected: {result:?}");
    if let Err(rejection) = result {
        tracing::warn!(rejection, "Wait state transition rejected");
    }
}

/// Wait for a synchronous check to become true.
///
/// Argument order follows the other wait helpers: `timeout`, then `interval`.
pub async fn wait_until<F>(
    timeout: Duration,
    interval: Duration,
    mut condition: F,
) -> Result<WaitReport, WaitError>
where
    F: FnMut() -> bool,
{
    try_wait_until(timeout, interval, move || Ok::<_, Infallible>(condition())).await
}

/// Wait for a fallible synchronous check to become true.
pub async fn try_wait_until<F, E>(
    timeout: Duration,
    interval: Duration,
    mut condition: F,
) -> Result<WaitReport, WaitError>
where
    F: FnMut() -> Result<bool, E>,
    E: Into<BoxError>,
{
    let request = WaitRequest::new(move || ready(condition()), interval, timeout)?;
    ConditionWaiter::new(request).wait().await
}

/// Wait for an async check to become true.
pub async fn wait_until_async<F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut condition: F,
) -> Result<WaitReport, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    try_wait_until_async(timeout, interval, move || {
        let check = condition();
        async move { Ok::<_, Infallible>(check.await) }
    })
    .await
}

/// Wait for a fallible async check to become true.
pub async fn try_wait_until_async<F, Fut, E>(
    timeout: Duration,
    interval: Duration,
    condition: F,
) -> Result<WaitReport, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: Into<BoxError>,
{
    let request = WaitRequest::new(condition, interval, timeout)?;
    ConditionWaiter::new(request).wait().await
}

/// Same as [`wait_until`] but stops early when `token` is cancelled.
pub async fn wait_until_cancellable<F>(
    timeout: Duration,
    interval: Duration,
    token: CancellationToken,
    mut condition: F,
) -> Result<WaitReport, WaitError>
where
    F: FnMut() -> bool,
{
    let request = WaitRequest::new(
        move || ready(Ok::<_, Infallible>(condition())),
        interval,
        timeout,
    )?
    .with_cancellation(token);
    ConditionWaiter::new(request).wait().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediately_true_polls_once() {
        let calls = Cell::new(0u32);
        let report = wait_until(ms(1000), ms(10), || {
            calls.set(calls.get() + 1);
            true
        })
        .await
        .unwrap();

        assert_eq!(report.outcome, WaitOutcome::Satisfied);
        assert_eq!(report.polls, 1);
        assert_eq!(calls.get(), 1);
        assert_eq!(report.elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_check_succeeds() {
        let calls = Cell::new(0u32);
        let report = wait_until(ms(1000), ms(10), || {
            calls.set(calls.get() + 1);
            calls.get() == 3
        })
        .await
        .unwrap();

        assert!(report.is_satisfied());
        assert_eq!(calls.get(), 3);
        assert_eq!(report.polls, 3);
        assert_eq!(report.elapsed, ms(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_true_times_out_within_bound() {
        let report = wait_until(ms(100), ms(30), || false).await.unwrap();

        assert_eq!(report.outcome, WaitOutcome::TimedOut);
        assert!(report.elapsed >= ms(100));
        assert!(report.elapsed <= ms(130));
        // Evaluations at 0, 30, 60, 90, 120
        assert_eq!(report.polls, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_arguments_never_poll() {
        let calls = Cell::new(0u32);
        let zero_interval = wait_until(ms(100), ms(0), || {
            calls.set(calls.get() + 1);
            true
        })
        .await;
        let zero_timeout = wait_until(ms(0), ms(10), || {
            calls.set(calls.get() + 1);
            true
        })
        .await;

        assert!(zero_interval.unwrap_err().is_invalid_argument());
        assert!(zero_timeout.unwrap_err().is_invalid_argument());
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_error_stops_polling() {
        let calls = Cell::new(0u32);
        let result = try_wait_until(ms(1000), ms(10), || {
            calls.set(calls.get() + 1);
            if calls.get() == 2 {
                Err("probe exploded")
            } else {
                Ok(false)
            }
        })
        .await;

        match result {
            Err(WaitError::Predicate { polls, source }) => {
                assert_eq!(polls, 2);
                assert_eq!(source.to_string(), "probe exploded");
            }
            other => panic!("expected predicate error, got {other:?}"),
        }
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_token_skips_polling() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = Cell::new(0u32);

        let report = wait_until_cancellable(ms(1000), ms(10), token, || {
            calls.set(calls.get() + 1);
            true
        })
        .await
        .unwrap();

        assert_eq!(report.outcome, WaitOutcome::Cancelled);
        assert_eq!(report.polls, 0);
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_machine_reaches_terminal() {
        let request = WaitRequest::new(|| ready(Ok::<_, Infallible>(true)), ms(10), ms(100)).unwrap();
        let waiter = ConditionWaiter::new(request);
        let rx = waiter.subscribe();
        assert_eq!(waiter.state(), WaitState::Idle);

        waiter.wait().await.unwrap();
        assert_eq!(*rx.borrow(), WaitState::Satisfied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_state_records_error() {
        let request =
            WaitRequest::new(|| ready(Err::<bool, _>("nope")), ms(10), ms(100)).unwrap();
        let waiter = ConditionWaiter::new(request);
        let rx = waiter.subscribe();

        assert!(waiter.wait().await.is_err());
        assert_eq!(
            *rx.borrow(),
            WaitState::Failed {
                error: "nope".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_predicate_times_out_at_deadline() {
        let request = WaitRequest::new(
            std::future::pending::<Result<bool, Infallible>>,
            ms(10),
            ms(100),
        )
        .unwrap();
        let waiter = ConditionWaiter::new(request);
        let rx = waiter.subscribe();

        let report = waiter.wait().await.unwrap();
        assert_eq!(report.outcome, WaitOutcome::TimedOut);
        assert_eq!(report.elapsed, ms(100));
        assert_eq!(report.polls, 0);
        assert_eq!(*rx.borrow(), WaitState::TimedOut);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "wait state transition rejected")]
    fn test_rejected_transition_is_loud_in_debug() {
        let state = WaitStateMachine::new();
        expect_transition(state.transition_to_satisfied());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(WaitOutcome::Satisfied.to_string(), "satisfied");
        assert_eq!(WaitOutcome::TimedOut.to_string(), "timed out");
        assert_eq!(WaitOutcome::Cancelled.to_string(), "cancelled");
    }
}
