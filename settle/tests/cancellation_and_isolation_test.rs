//! Cancellation, predicate failures and isolation between concurrent waiters.

use settle::test_utils::concurrency::{
    CI_QUICK_TIMEOUT, CountingPredicate, spawn_tasks_with_barrier, with_ci_timeout,
};
use settle::{
    ConditionWaiter, WaitError, WaitOutcome, WaitRequest, WaitState, try_wait_until_async,
    wait_until, wait_until_cancellable,
};
use std::convert::Infallible;
use std::future::ready;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

#[tokio::test(start_paused = true)]
async fn test_cancel_between_polls_stops_polling() {
    let token = CancellationToken::new();
    let predicate = CountingPredicate::never();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(ms(35)).await;
        canceller.cancel();
    });

    let report = wait_until_cancellable(ms(1000), ms(10), token, || predicate.check())
        .await
        .unwrap();

    assert_eq!(report.outcome, WaitOutcome::Cancelled);
    assert_eq!(report.elapsed, ms(35));
    // Evaluations at 0, 10, 20 and 30ms
    assert_eq!(report.polls, 4);

    tokio::time::sleep(ms(200)).await;
    assert_eq!(predicate.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_drops_in_flight_evaluation() {
    let token = CancellationToken::new();
    let started = CountingPredicate::never();
    let request = WaitRequest::new(
        || {
            started.check();
            async {
                tokio::time::sleep(ms(50)).await;
                Ok::<_, Infallible>(true)
            }
        },
        ms(10),
        ms(1000),
    )
    .unwrap()
    .with_cancellation(token.clone());
    let waiter = ConditionWaiter::new(request);
    let rx = waiter.subscribe();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(ms(20)).await;
        canceller.cancel();
    });

    let report = waiter.wait().await.unwrap();
    assert_eq!(report.outcome, WaitOutcome::Cancelled);
    assert_eq!(report.polls, 0);
    assert_eq!(report.elapsed, ms(20));
    assert_eq!(started.calls(), 1);
    assert_eq!(*rx.borrow(), WaitState::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_async_predicate_error_propagates() {
    let predicate = CountingPredicate::never();
    let result = try_wait_until_async(ms(1000), ms(10), || {
        let predicate = predicate.clone();
        async move {
            predicate.check();
            if predicate.calls() < 3 {
                Ok(false)
            } else {
                Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "cannot read readiness file",
                ))
            }
        }
    })
    .await;

    match result {
        Err(WaitError::Predicate { polls, source }) => {
            assert_eq!(polls, 3);
            assert!(source.to_string().contains("cannot read readiness file"));
        }
        other => panic!("expected predicate error, got {other:?}"),
    }
    assert_eq!(predicate.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_waiters_are_isolated() {
    let results = spawn_tasks_with_barrier(20, |i| async move {
        let succeed_on = (i % 5) as u32 + 1;
        let predicate = CountingPredicate::succeeding_on(succeed_on);
        let report = wait_until(ms(1000), ms(10), || predicate.check())
            .await
            .unwrap();
        (succeed_on, report, predicate.calls())
    })
    .await;

    assert_eq!(results.len(), 20);
    for (succeed_on, report, calls) in results {
        assert!(report.is_satisfied());
        assert_eq!(report.polls, succeed_on);
        assert_eq!(calls, succeed_on);
        assert_eq!(report.elapsed, ms(10) * (succeed_on - 1));
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancelling_one_waiter_leaves_others_running() {
    let cancelled_token = CancellationToken::new();
    let slow = CountingPredicate::succeeding_on(6);
    let other = CountingPredicate::never();

    let cancelled = wait_until_cancellable(ms(1000), ms(10), cancelled_token.clone(), || {
        other.check()
    });
    let running = wait_until_cancellable(ms(1000), ms(10), CancellationToken::new(), || {
        slow.check()
    });
    let cancel = async {
        tokio::time::sleep(ms(15)).await;
        cancelled_token.cancel();
    };

    let (cancelled, running, ()) = tokio::join!(cancelled, running, cancel);
    assert_eq!(cancelled.unwrap().outcome, WaitOutcome::Cancelled);

    let running = running.unwrap();
    assert_eq!(running.outcome, WaitOutcome::Satisfied);
    assert_eq!(running.polls, 6);
    assert_eq!(other.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_state_visible_after_waiter_is_consumed() {
    let request = WaitRequest::new(
        || async {
            tokio::time::sleep(ms(500)).await;
            Ok::<_, Infallible>(true)
        },
        ms(10),
        ms(50),
    )
    .unwrap();
    let waiter = ConditionWaiter::new(request);
    let state = waiter.state_machine();
    let watcher = tokio::spawn(async move { state.wait_for_terminal().await });

    let report = waiter.wait().await.unwrap();
    assert_eq!(report.outcome, WaitOutcome::TimedOut);
    assert_eq!(watcher.await.unwrap(), WaitState::TimedOut);
}

#[tokio::test]
async fn test_wait_never_hangs_past_its_budget() {
    let report = with_ci_timeout(
        "never-true wait",
        CI_QUICK_TIMEOUT,
        wait_until(ms(50), ms(5), || false),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(report.outcome, WaitOutcome::TimedOut);
    assert!(report.elapsed >= ms(50));
}
