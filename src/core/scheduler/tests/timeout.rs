use std::time::Duration;

use super::{Harness, MockExecutor, new_task, wait_until};
use crate::core::scheduler::{SchedulerSettings, TIMEOUT_ERROR};
use crate::core::types::TaskStatus;

#[tokio::test]
async fn overrunning_task_fails_with_timeout_message() {
    let settings = SchedulerSettings {
        concurrency: 1,
        poll_interval: Duration::from_millis(50),
        default_timeout: Duration::from_millis(100),
        drain_timeout: Duration::from_secs(2),
    };
    let harness = Harness::build(settings, MockExecutor::new(Duration::from_millis(500), 0.0));

    let task = harness
        .scheduler
        .submit(new_task("sleep", 5))
        .await
        .expect("submit");
    harness.scheduler.start().await.expect("start");

    let failed = wait_until(Duration::from_secs(3), || async {
        harness
            .tasks
            .get(&task.id)
            .await
            .is_some_and(|t| t.status == TaskStatus::Failed)
    })
    .await;
    assert!(failed, "task should fail on timeout");

    let task = harness.tasks.get(&task.id).await.expect("get");
    assert_eq!(task.error.as_deref(), Some(TIMEOUT_ERROR));
    assert!(task.duration_ms.expect("duration") >= 100);
    assert!(task.completed_at.is_some());

    // The slot was released: a follow-up task gets picked up.
    let follow_up = harness
        .scheduler
        .submit(new_task("follow-up", 5))
        .await
        .expect("submit");
    let picked_up = wait_until(Duration::from_secs(3), || async {
        harness
            .tasks
            .get(&follow_up.id)
            .await
            .is_some_and(|t| t.status != TaskStatus::Pending)
    })
    .await;
    assert!(picked_up, "freed slot should admit the next task");

    harness.scheduler.stop().await;
}

#[tokio::test]
async fn executor_failure_marks_task_failed_and_counts_stats() {
    let harness = Harness::build(
        Harness::fast_settings(1),
        MockExecutor::failing(Duration::from_millis(30)),
    );

    let task = harness
        .scheduler
        .submit(new_task("doomed", 5))
        .await
        .expect("submit");
    harness.scheduler.start().await.expect("start");

    let failed = wait_until(Duration::from_secs(3), || async {
        harness
            .tasks
            .get(&task.id)
            .await
            .is_some_and(|t| t.status == TaskStatus::Failed)
    })
    .await;
    assert!(failed);

    let task = harness.tasks.get(&task.id).await.expect("get");
    assert_eq!(task.error.as_deref(), Some("scripted failure"));

    let stats = harness.stats.aggregate().await;
    assert_eq!(stats.requests.total, 1);
    assert_eq!(stats.requests.failed, 1);
    harness.scheduler.stop().await;
}
