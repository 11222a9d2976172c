mod common;

use common::{unreachable, ScriptedRunner};
use meshbridge::bridge::retry::{
    AttemptReport, Completed, Completion, RetryExecutor, RetryPolicy,
};
use meshbridge::meshtastic::{ActionError, CliAction, DeviceTarget, TextTarget};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 10,
        delay: Duration::from_millis(1),
    }
}

fn executor(
    runner: Arc<ScriptedRunner>,
) -> (RetryExecutor, mpsc::UnboundedReceiver<AttemptReport>) {
    RetryExecutor::new(
        runner,
        DeviceTarget::Host("10.0.0.5".into()),
        "Connected",
        policy(),
    )
}

/// Feed reports into the executor until one invocation completes.
async fn drive(
    exec: &mut RetryExecutor,
    rx: &mut mpsc::UnboundedReceiver<AttemptReport>,
) -> Completed {
    loop {
        let report = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout waiting for attempt")
            .expect("report channel closed");
        if let Some(done) = exec.on_report(report) {
            return done;
        }
    }
}

fn ping() -> CliAction {
    CliAction::SendPing {
        dest: "a1b2c3d4".parse().unwrap(),
    }
}

#[tokio::test]
async fn nine_failures_then_success() {
    let mut script: Vec<_> = (0..9).map(|_| Err(unreachable())).collect();
    script.push(Ok("pong".to_string()));
    let runner = Arc::new(ScriptedRunner::new(script, Err(unreachable())));
    let (mut exec, mut rx) = executor(runner.clone());

    exec.invoke(ping(), Completion::Detached);
    let done = drive(&mut exec, &mut rx).await;

    let output = tokio_test::assert_ok!(done.outcome);
    assert_eq!(output, "pong");
    assert_eq!(runner.call_count(), 10);
    assert_eq!(exec.in_flight(), 0);
}

#[tokio::test]
async fn gives_up_after_bound_and_stops() {
    let runner = Arc::new(ScriptedRunner::always(Err(unreachable())));
    let (mut exec, mut rx) = executor(runner.clone());

    exec.invoke(ping(), Completion::Detached);
    let done = drive(&mut exec, &mut rx).await;

    let exhausted = tokio_test::assert_err!(done.outcome);
    assert_eq!(exhausted.attempts, 11);
    assert_eq!(exhausted.last_error, unreachable());
    assert_eq!(runner.call_count(), 11);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(runner.call_count(), 11);
    assert_eq!(exec.in_flight(), 0);
}

#[tokio::test]
async fn sweep_needs_connected_marker() {
    let runner = Arc::new(ScriptedRunner::new(
        vec![Ok("Error: no response from radio".to_string())],
        Ok("Connected to radio\n│ ID │\n".to_string()),
    ));
    let (mut exec, mut rx) = executor(runner.clone());

    exec.invoke(CliAction::ListNodes, Completion::Sweep);
    assert!(exec.sweep_in_flight());
    let done = drive(&mut exec, &mut rx).await;

    assert_eq!(done.completion, Completion::Sweep);
    assert!(done.outcome.unwrap().contains("Connected"));
    assert_eq!(runner.call_count(), 2);
    assert_eq!(runner.calls()[0], vec!["--host", "10.0.0.5", "--nodes"]);
    assert!(!exec.sweep_in_flight());
}

#[tokio::test]
async fn invocations_retry_independently() {
    // First call fails, everything after succeeds: only one invocation needs a retry.
    let runner = Arc::new(ScriptedRunner::new(
        vec![Err(ActionError::Timeout(Duration::from_secs(60)))],
        Ok(String::new()),
    ));
    let (mut exec, mut rx) = executor(runner.clone());

    let a = exec.invoke(ping(), Completion::Detached);
    let b = exec.invoke(
        CliAction::SendText {
            target: TextTarget::Channel(1),
            text: "hi".into(),
        },
        Completion::Detached,
    );
    assert_ne!(a, b);
    assert_eq!(exec.in_flight(), 2);

    let first = drive(&mut exec, &mut rx).await;
    let second = drive(&mut exec, &mut rx).await;
    assert!(first.outcome.is_ok());
    assert!(second.outcome.is_ok());
    assert_eq!(runner.call_count(), 3);
}

#[tokio::test]
async fn cancel_stops_delayed_attempts() {
    let runner = Arc::new(ScriptedRunner::always(Err(unreachable())));
    let (mut exec, mut rx) = RetryExecutor::new(
        runner.clone(),
        DeviceTarget::Host("10.0.0.5".into()),
        "Connected",
        RetryPolicy {
            max_retries: 10,
            delay: Duration::from_millis(50),
        },
    );

    exec.invoke(ping(), Completion::Detached);
    let report = rx.recv().await.unwrap();
    assert!(exec.on_report(report).is_none());
    exec.cancel();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(runner.call_count(), 1);
    assert!(rx.try_recv().is_err());
}
