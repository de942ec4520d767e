use std::time::Duration;

use super::{Harness, MockExecutor, new_task, wait_until};
use crate::core::types::TaskStatus;

#[tokio::test]
async fn queued_tasks_complete_in_priority_order() {
    let harness = Harness::build(
        Harness::fast_settings(1),
        MockExecutor::new(Duration::from_millis(50), 0.0),
    );

    // All three are queued before the dispatcher runs, so the draw order is
    // purely (priority desc, age asc).
    harness
        .scheduler
        .submit(new_task("a", 3))
        .await
        .expect("submit");
    harness
        .scheduler
        .submit(new_task("b", 7))
        .await
        .expect("submit");
    harness
        .scheduler
        .submit(new_task("c", 5))
        .await
        .expect("submit");

    harness.scheduler.start().await.expect("start");

    let done = wait_until(Duration::from_secs(5), || async {
        harness.tasks.get_stats().await.completed == 3
    })
    .await;
    assert!(done, "all three tasks should complete");

    assert_eq!(harness.executor.completion_order().await, vec!["b", "c", "a"]);
    harness.scheduler.stop().await;
}

#[tokio::test]
async fn priority_patch_takes_effect_on_next_dispatch() {
    let harness = Harness::build(
        Harness::fast_settings(1),
        MockExecutor::new(Duration::from_millis(200), 0.0),
    );

    let running = harness
        .scheduler
        .submit(new_task("running", 9))
        .await
        .expect("submit");
    let low = harness
        .scheduler
        .submit(new_task("low", 2))
        .await
        .expect("submit");
    harness
        .scheduler
        .submit(new_task("mid", 5))
        .await
        .expect("submit");

    harness.scheduler.start().await.expect("start");

    let started = wait_until(Duration::from_secs(2), || async {
        harness
            .tasks
            .get(&running.id)
            .await
            .is_some_and(|t| t.status == TaskStatus::Processing)
    })
    .await;
    assert!(started, "first task should be picked up");

    // Bump the low-priority task above "mid" while it is still pending;
    // the change must be visible to the next dispatch round.
    harness
        .tasks
        .update(
            &low.id,
            crate::core::types::TaskPatch {
                priority: Some(10),
                ..crate::core::types::TaskPatch::default()
            },
        )
        .await
        .expect("patch")
        .expect("found");

    let done = wait_until(Duration::from_secs(5), || async {
        harness.tasks.get_stats().await.completed == 3
    })
    .await;
    assert!(done, "all tasks should complete");

    assert_eq!(
        harness.executor.completion_order().await,
        vec!["running", "low", "mid"]
    );
    harness.scheduler.stop().await;
}
