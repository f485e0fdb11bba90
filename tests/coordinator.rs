mod common;
use crate::common::{init_tracing, with_timeout, ConfigFileBuilder, FakeExecutor};

use std::sync::Arc;
use std::time::Duration;

use std::future::Future;
use std::pin::Pin;

use futures::StreamExt;
use tokio::sync::Barrier;

use taskstream::engine::{CancellationWatch, StopOutcome, TaskCoordinator, TaskRequest};
use taskstream::errors::TaskstreamError;
use taskstream::exec::{ExecutionResult, ExecutorBackend};
use taskstream::fs::mock::MockFileSystem;
use taskstream::logs::{Checkpoint, LogSink, LogSnapshot};
use taskstream::types::TaskState;

const SCRIPT: &str = "/jobs/train.sh";

fn coordinator(fake: &FakeExecutor) -> (TaskCoordinator, MockFileSystem) {
    coordinator_with(Arc::new(fake.clone()))
}

fn coordinator_with(backend: Arc<dyn ExecutorBackend>) -> (TaskCoordinator, MockFileSystem) {
    let fs = MockFileSystem::new();
    fs.add_file(SCRIPT, "echo hi\n");
    let stream = ConfigFileBuilder::new()
        .checkpoint_path("/state/.task_state.json")
        .stream();
    let coordinator = TaskCoordinator::new(backend, Arc::new(fs.clone()), stream);
    (coordinator, fs)
}

/// Backend whose execution unit dies mid-task.
struct PanickingBackend;

async fn crash() -> ExecutionResult {
    panic!("backend crashed");
}

impl ExecutorBackend for PanickingBackend {
    fn execute(
        &self,
        _request: TaskRequest,
        _sink: LogSink,
        _cancel: CancellationWatch,
    ) -> Pin<Box<dyn Future<Output = ExecutionResult> + Send + '_>> {
        Box::pin(crash())
    }
}

fn last_checkpoint(fs: &MockFileSystem) -> Checkpoint {
    let (_, bytes) = fs.writes().pop().expect("no checkpoint written");
    serde_json::from_slice(&bytes).unwrap()
}

async fn final_snapshot(logs: taskstream::logs::LogStreamer) -> LogSnapshot {
    let snapshots: Vec<_> = with_timeout(logs.into_stream().collect()).await;
    snapshots.into_iter().last().expect("stream produced nothing")
}

#[tokio::test]
async fn completed_task_streams_banners_and_tears_down() {
    init_tracing();
    let fake = FakeExecutor::new().with_lines(["epoch 1", "epoch 2"]);
    let (coordinator, fs) = coordinator(&fake);

    let request = TaskRequest::new(SCRIPT)
        .with_label("Train model")
        .with_output_dir("/results/run1");
    let started = coordinator.start_task(request).unwrap();
    assert_eq!(started.generation, 1);

    let initial = last_checkpoint(&fs);
    assert!(initial.running);
    assert_eq!(initial.line_count, 0);
    assert_eq!(initial.label, "Train model");

    let last = final_snapshot(started.logs).await;
    let result = started.result.await.unwrap();

    assert_eq!(last.state, TaskState::Completed);
    let texts = last.texts();
    assert_eq!(texts.first(), Some(&"Starting task: Train model"));
    assert!(texts.contains(&"epoch 1"));
    assert!(texts.contains(&"Results saved in: /results/run1"));
    assert_eq!(texts.last(), Some(&"Execution unit finished"));

    assert_eq!(result.text(), "[stdout] epoch 1\n[stdout] epoch 2");
    assert!(!coordinator.is_running());
    assert_eq!(coordinator.state(), TaskState::Completed);

    let closing = last_checkpoint(&fs);
    assert!(!closing.running);
    assert_eq!(closing.state, Some(TaskState::Completed));
    assert_eq!(fake.calls(), 1);
    assert_eq!(fake.requests()[0].label.as_deref(), Some("Train model"));
}

#[tokio::test]
async fn second_start_is_rejected_while_active() {
    init_tracing();
    let fake = FakeExecutor::new().until_cancelled();
    let (coordinator, _fs) = coordinator(&fake);

    let first = coordinator.start_task(TaskRequest::new(SCRIPT)).unwrap();
    let err = coordinator.start_task(TaskRequest::new(SCRIPT)).unwrap_err();
    assert!(matches!(err, TaskstreamError::AlreadyRunning { generation: 1 }));
    assert_eq!(coordinator.generation(), 1, "rejected start touched no state");

    assert_eq!(coordinator.request_stop(), StopOutcome::Requested);
    final_snapshot(first.logs).await;

    let second = coordinator.start_task(TaskRequest::new(SCRIPT)).unwrap();
    assert_eq!(second.generation, 2);
    assert_eq!(coordinator.state(), TaskState::Running);
    coordinator.request_stop();
    final_snapshot(second.logs).await;
    assert_eq!(fake.calls(), 2);
}

#[tokio::test]
async fn stop_without_task_reports_nothing_to_stop() {
    init_tracing();
    let fake = FakeExecutor::new();
    let (coordinator, fs) = coordinator(&fake);

    assert_eq!(coordinator.request_stop(), StopOutcome::NothingToStop);
    assert_eq!(coordinator.state(), TaskState::Idle);
    assert_eq!(coordinator.generation(), 0);
    assert!(fs.writes().is_empty());
}

#[tokio::test]
async fn stop_request_cancels_the_task() {
    init_tracing();
    let fake = FakeExecutor::new().with_lines(["loading"]).until_cancelled();
    let (coordinator, fs) = coordinator(&fake);

    let started = coordinator.start_task(TaskRequest::new(SCRIPT)).unwrap();
    assert!(coordinator.is_running());

    assert_eq!(coordinator.request_stop(), StopOutcome::Requested);
    assert_eq!(coordinator.state(), TaskState::Cancelling);
    assert_eq!(coordinator.request_stop(), StopOutcome::AlreadyRequested);

    let last = final_snapshot(started.logs).await;
    let result = started.result.await.unwrap();

    assert_eq!(last.state, TaskState::Cancelled);
    assert!(last.to_string().contains("Task stopped by user"));
    assert!(last.texts().contains(&"Task interrupted by user"));
    assert!(result.is_interrupted());
    assert!(!coordinator.is_running());
    assert_eq!(coordinator.state(), TaskState::Cancelled);
    assert_eq!(coordinator.request_stop(), StopOutcome::NothingToStop);
    assert_eq!(last_checkpoint(&fs).state, Some(TaskState::Cancelled));
}

#[tokio::test]
async fn non_zero_exit_is_a_failure() {
    init_tracing();
    let fake = FakeExecutor::new().with_lines(["boom"]).with_exit_code(2);
    let (coordinator, _fs) = coordinator(&fake);

    let started = coordinator.start_task(TaskRequest::new(SCRIPT)).unwrap();
    let last = final_snapshot(started.logs).await;

    assert_eq!(last.state, TaskState::Failed);
    assert!(last.texts().contains(&"Task failed with exit code 2"));
    assert!(last.to_string().contains("Task failed after"));
    assert_eq!(coordinator.state(), TaskState::Failed);
}

#[tokio::test]
async fn missing_script_is_a_caller_error() {
    init_tracing();
    let fake = FakeExecutor::new();
    let (coordinator, _fs) = coordinator(&fake);

    let err = coordinator
        .start_task(TaskRequest::new("/jobs/missing.sh"))
        .unwrap_err();
    assert!(matches!(err, TaskstreamError::ScriptNotFound(_)));
    assert_eq!(coordinator.generation(), 0);
    assert_eq!(fake.calls(), 0);
}

#[tokio::test]
async fn stale_stop_does_not_reach_the_next_task() {
    init_tracing();
    let fake = FakeExecutor::new()
        .with_hold(Duration::from_millis(50))
        .with_lines(["tick"]);
    let (coordinator, _fs) = coordinator(&fake);

    let first = coordinator.start_task(TaskRequest::new(SCRIPT)).unwrap();
    final_snapshot(first.logs).await;
    assert_eq!(first.result.await.unwrap().exit_code(), Some(0));

    // A stop aimed at the finished task finds nothing and leaves the next one alone.
    assert_eq!(coordinator.request_stop(), StopOutcome::NothingToStop);
    let second = coordinator.start_task(TaskRequest::new(SCRIPT)).unwrap();
    let last = final_snapshot(second.logs).await;
    assert_eq!(last.state, TaskState::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_admit_exactly_one_task() {
    init_tracing();
    const CALLERS: usize = 8;
    let fake = FakeExecutor::new().until_cancelled();
    let (coordinator, _fs) = coordinator(&fake);
    let coordinator = Arc::new(coordinator);
    let barrier = Arc::new(Barrier::new(CALLERS));

    let callers: Vec<_> = (0..CALLERS)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                coordinator.start_task(TaskRequest::new(SCRIPT))
            })
        })
        .collect();

    let mut started = Vec::new();
    let mut rejected = 0;
    for caller in callers {
        match caller.await.unwrap() {
            Ok(task) => started.push(task),
            Err(TaskstreamError::AlreadyRunning { generation }) => {
                assert_eq!(generation, 1);
                rejected += 1;
            }
            Err(other) => panic!("unexpected start error: {other}"),
        }
    }

    assert_eq!(started.len(), 1);
    assert_eq!(rejected, CALLERS - 1);
    assert_eq!(coordinator.generation(), 1);

    assert_eq!(coordinator.request_stop(), StopOutcome::Requested);
    let task = started.pop().unwrap();
    let last = final_snapshot(task.logs).await;
    assert_eq!(last.state, TaskState::Cancelled);
    assert_eq!(fake.calls(), 1);
}

#[tokio::test]
async fn crashed_execution_unit_reports_failure_and_frees_the_slot() {
    init_tracing();
    let (coordinator, _fs) = coordinator_with(Arc::new(PanickingBackend));

    let started = coordinator.start_task(TaskRequest::new(SCRIPT)).unwrap();
    let last = final_snapshot(started.logs).await;
    assert_eq!(last.state, TaskState::Failed);
    assert!(started.result.await.is_err(), "no result from a crashed unit");

    with_timeout(async {
        while coordinator.is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert_eq!(coordinator.state(), TaskState::Failed);
    assert_eq!(coordinator.request_stop(), StopOutcome::NothingToStop);

    let next = coordinator.start_task(TaskRequest::new(SCRIPT)).unwrap();
    assert_eq!(next.generation, 2);
    final_snapshot(next.logs).await;
}

#[tokio::test(start_paused = true)]
async fn stop_between_lines_keeps_what_was_already_published() {
    init_tracing();
    let fake = FakeExecutor::new()
        .with_lines((0..5).map(|i| format!("step {i}")))
        .with_line_interval(Duration::from_secs(1));
    let (coordinator, _fs) = coordinator(&fake);

    let started = coordinator.start_task(TaskRequest::new(SCRIPT)).unwrap();
    let mut logs = started.logs;
    loop {
        let snap = logs.next_snapshot().await.unwrap();
        assert!(!snap.is_final(), "task ended before step 2 was shown");
        if snap.texts().contains(&"step 2") {
            break;
        }
    }

    assert_eq!(coordinator.request_stop(), StopOutcome::Requested);
    let last = final_snapshot(logs).await;
    let result = started.result.await.unwrap();

    assert_eq!(last.state, TaskState::Cancelled);
    let texts = last.texts();
    assert!(texts.contains(&"step 2"));
    assert!(!texts.contains(&"step 3"));
    assert!(!texts.contains(&"step 4"));
    assert!(result.is_interrupted());
    assert_eq!(result.stdout_tail, vec!["step 0", "step 1", "step 2"]);
}
