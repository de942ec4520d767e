use std::time::Duration;

use super::{Harness, MockExecutor, new_task, wait_until};

#[tokio::test]
async fn in_flight_tasks_never_exceed_the_concurrency_cap() {
    let harness = Harness::build(
        Harness::fast_settings(2),
        MockExecutor::new(Duration::from_millis(60), 0.0),
    );

    for i in 0..6 {
        harness
            .scheduler
            .submit(new_task(&format!("job-{i}"), 5))
            .await
            .expect("submit");
    }
    harness.scheduler.start().await.expect("start");

    let done = wait_until(Duration::from_secs(5), || async {
        harness.tasks.get_stats().await.completed == 6
    })
    .await;
    assert!(done, "all tasks should complete");

    assert!(
        harness.executor.max_in_flight() <= 2,
        "saw {} simultaneous executions with concurrency 2",
        harness.executor.max_in_flight()
    );
    harness.scheduler.stop().await;
}

#[tokio::test]
async fn submit_wakes_the_dispatcher_before_the_next_poll() {
    // Poll interval is deliberately long; only the submit wake-up can get
    // the task picked up this fast.
    let settings = crate::core::scheduler::SchedulerSettings {
        concurrency: 1,
        poll_interval: Duration::from_secs(30),
        default_timeout: Duration::from_secs(5),
        drain_timeout: Duration::from_secs(2),
    };
    let harness = Harness::build(settings, MockExecutor::new(Duration::from_millis(20), 0.0));
    harness.scheduler.start().await.expect("start");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let task = harness
        .scheduler
        .submit(new_task("prompted", 5))
        .await
        .expect("submit");

    let completed = wait_until(Duration::from_secs(2), || async {
        harness
            .tasks
            .get(&task.id)
            .await
            .is_some_and(|t| t.status.is_terminal())
    })
    .await;
    assert!(completed, "wake-up should dispatch without waiting for the poll");

    let status = harness.scheduler.status().await;
    assert!(status.running);
    assert_eq!(status.concurrency, 1);
    assert_eq!(status.stats.completed, 1);
    harness.scheduler.stop().await;
}
