mod concurrency;
mod priority;
mod timeout;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::executor::{ExecuteRequest, ExecuteResult, Executor, Usage};
use crate::core::scheduler::{SchedulerSettings, TaskScheduler};
use crate::core::store::{SessionStore, StatsStore, TaskStore};
use crate::core::types::NewTask;
use crate::core::webhook::{WebhookDispatcher, WebhookSettings};

/// Scripted executor: fixed latency and cost, records completion order and
/// the high-water mark of simultaneous executions.
pub(crate) struct MockExecutor {
    latency: Duration,
    cost_usd: f64,
    fail: bool,
    completions: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockExecutor {
    pub(crate) fn new(latency: Duration, cost_usd: f64) -> Self {
        Self {
            latency,
            cost_usd,
            fail: false,
            completions: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(latency: Duration) -> Self {
        Self {
            fail: true,
            ..Self::new(latency, 0.0)
        }
    }

    pub(crate) async fn completion_order(&self) -> Vec<String> {
        self.completions.lock().await.clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResult> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completions.lock().await.push(request.prompt.clone());

        if self.fail {
            return Ok(ExecuteResult::failure(
                "scripted failure",
                self.latency.as_millis() as i64,
            ));
        }
        Ok(ExecuteResult::completed(
            format!("echo:{}", request.prompt),
            self.latency.as_millis() as i64,
            self.cost_usd,
            request.session_id,
            Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
        ))
    }
}

pub(crate) struct Harness {
    #[allow(dead_code)]
    dir: tempfile::TempDir,
    pub(crate) tasks: TaskStore,
    pub(crate) sessions: SessionStore,
    pub(crate) stats: StatsStore,
    pub(crate) executor: Arc<MockExecutor>,
    pub(crate) scheduler: TaskScheduler,
}

impl Harness {
    pub(crate) fn build(settings: SchedulerSettings, executor: MockExecutor) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let tasks = TaskStore::open(dir.path().join("tasks.json")).expect("tasks store");
        let sessions = SessionStore::open(dir.path().join("sessions.json")).expect("sessions");
        let stats = StatsStore::open(dir.path().join("statistics.json"), true).expect("stats");
        let executor = Arc::new(executor);
        let webhooks = Arc::new(WebhookDispatcher::new(WebhookSettings {
            enabled: false,
            ..WebhookSettings::default()
        }));
        let scheduler = TaskScheduler::new(
            settings,
            tasks.clone(),
            sessions.clone(),
            stats.clone(),
            executor.clone(),
            webhooks,
        );
        Self {
            dir,
            tasks,
            sessions,
            stats,
            executor,
            scheduler,
        }
    }

    pub(crate) fn fast_settings(concurrency: usize) -> SchedulerSettings {
        SchedulerSettings {
            concurrency,
            poll_interval: Duration::from_millis(50),
            default_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(2),
        }
    }
}

pub(crate) fn new_task(prompt: &str, priority: u8) -> NewTask {
    NewTask {
        prompt: prompt.to_string(),
        project_path: "/tmp".to_string(),
        model: "test-model".to_string(),
        priority: Some(priority),
        ..NewTask::default()
    }
}

/// Poll `check` until it reports true or the deadline passes.
pub(crate) async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
