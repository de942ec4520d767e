use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use serde_json::Value;
use tokio::sync::{Mutex, Notify, broadcast};
use tracing::{debug, info, warn};

use crate::core::executor::{ExecuteRequest, ExecuteResult, Executor};
use crate::core::store::{RequestOutcome, SessionStore, StatsStore, TaskStore};
use crate::core::types::{NewTask, Task, TaskEvent, TaskStats, TaskStatus};
use crate::core::webhook::WebhookDispatcher;

pub const TIMEOUT_ERROR: &str = "Task execution timeout";

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Maximum number of tasks executing at once.
    pub concurrency: usize,
    /// Coarse tick for pending discovery.
    pub poll_interval: Duration,
    /// Per-task wall-clock budget.
    pub default_timeout: Duration,
    /// Soft deadline for draining in-flight tasks on stop.
    pub drain_timeout: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            concurrency: 3,
            poll_interval: Duration::from_secs(1),
            default_timeout: Duration::from_secs(300),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

struct ActiveEntry {
    #[allow(dead_code)]
    started_at: Instant,
}

/// Queue status snapshot for the API surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStatus {
    pub running: bool,
    pub concurrency: usize,
    pub active_tasks: Vec<String>,
    #[serde(flatten)]
    pub stats: TaskStats,
}

#[derive(Debug)]
pub enum CancelOutcome {
    NotFound,
    InvalidState(TaskStatus),
    Cancelled(Task),
}

/// Drives queued tasks under three constraints: bounded concurrency,
/// priority ordering, and per-task timeout, while keeping the persistent
/// store consistent across restarts.
///
/// The in-memory `active` map is the concurrency ledger: a slot is reserved
/// there before the `processing` transition is persisted, so two dispatch
/// rounds can never admit the same task or oversubscribe.
#[derive(Clone)]
pub struct TaskScheduler {
    settings: SchedulerSettings,
    tasks: TaskStore,
    sessions: SessionStore,
    stats: StatsStore,
    executor: Arc<dyn Executor>,
    webhooks: Arc<WebhookDispatcher>,
    active: Arc<Mutex<HashMap<String, ActiveEntry>>>,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
    events: broadcast::Sender<TaskEvent>,
}

impl TaskScheduler {
    pub fn new(
        settings: SchedulerSettings,
        tasks: TaskStore,
        sessions: SessionStore,
        stats: StatsStore,
        executor: Arc<dyn Executor>,
        webhooks: Arc<WebhookDispatcher>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            settings,
            tasks,
            sessions,
            stats,
            executor,
            webhooks,
            active: Arc::new(Mutex::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the dispatch loop. Tasks persisted as `processing` lost their
    /// executor on the previous shutdown and are reset to `pending` first.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.tasks.reset_processing_to_pending().await?;
        info!(
            "Task Scheduler starting (concurrency {}, timeout {}s)",
            self.settings.concurrency,
            self.settings.default_timeout.as_secs()
        );
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_loop().await;
        });
        Ok(())
    }

    /// Stop admitting tasks and wait for in-flight ones to drain, bounded by
    /// the soft deadline. Abandoned tasks stay `processing` on disk and are
    /// recovered on the next start.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.wake.notify_one();
        let deadline = Instant::now() + self.settings.drain_timeout;
        loop {
            let in_flight = self.active.lock().await.len();
            if in_flight == 0 {
                break;
            }
            if Instant::now() >= deadline {
                warn!(
                    "Abandoning {} in-flight task(s); they remain processing and will be recovered on next start",
                    in_flight
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        info!("Task Scheduler stopped");
    }

    /// Create a task record and prod the dispatcher.
    pub async fn submit(&self, new: NewTask) -> Result<Task> {
        let task = self.tasks.create(new).await?;
        let _ = self.events.send(TaskEvent::Submitted {
            task_id: task.id.clone(),
        });
        self.wake.notify_one();
        Ok(task)
    }

    /// Best-effort cancellation: releases the concurrency slot and detaches
    /// the scheduler's interest. A still-running executor is not reaped; its
    /// late result is discarded because the task is terminal.
    pub async fn cancel_task(&self, id: &str) -> Result<CancelOutcome> {
        let Some(task) = self.tasks.get(id).await else {
            return Ok(CancelOutcome::NotFound);
        };
        if task.status.is_terminal() {
            return Ok(CancelOutcome::InvalidState(task.status));
        }
        self.active.lock().await.remove(id);
        match self.tasks.cancel(id).await? {
            Some(cancelled) => {
                let _ = self.events.send(TaskEvent::Cancelled {
                    task_id: cancelled.id.clone(),
                });
                self.webhooks.send(
                    "task.cancelled",
                    task_event_data(&cancelled),
                    cancelled.webhook_url(),
                );
                self.wake.notify_one();
                Ok(CancelOutcome::Cancelled(cancelled))
            }
            None => Ok(CancelOutcome::InvalidState(task.status)),
        }
    }

    pub async fn status(&self) -> QueueStatus {
        let active_tasks: Vec<String> = self.active.lock().await.keys().cloned().collect();
        QueueStatus {
            running: self.is_running(),
            concurrency: self.settings.concurrency,
            active_tasks,
            stats: self.tasks.get_stats().await,
        }
    }

    async fn run_loop(&self) {
        while self.is_running() {
            self.dispatch().await;
            tokio::select! {
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
        debug!("Dispatch loop exited");
    }

    /// One dispatch round: admit pending tasks while slots are free.
    async fn dispatch(&self) {
        loop {
            if !self.is_running() {
                return;
            }
            let Some(task) = self.tasks.get_next_pending().await else {
                return;
            };
            // Reserve the slot before the persistence call so parallel
            // rounds cannot oversubscribe or double-pick.
            {
                let mut active = self.active.lock().await;
                if active.len() >= self.settings.concurrency {
                    return;
                }
                if active.contains_key(&task.id) {
                    return;
                }
                active.insert(
                    task.id.clone(),
                    ActiveEntry {
                        started_at: Instant::now(),
                    },
                );
            }
            match self.tasks.mark_processing(&task.id).await {
                Ok(Some(task)) => {
                    let _ = self.events.send(TaskEvent::Started {
                        task_id: task.id.clone(),
                    });
                    let scheduler = self.clone();
                    tokio::spawn(async move {
                        scheduler.execute_task(task).await;
                    });
                }
                Ok(None) => {
                    // Changed underneath us (e.g. cancelled between the read
                    // and the transition); release the reservation.
                    self.active.lock().await.remove(&task.id);
                }
                Err(e) => {
                    warn!(
                        "Failed to mark task {} processing, will retry next tick: {}",
                        task.id, e
                    );
                    self.active.lock().await.remove(&task.id);
                    return;
                }
            }
        }
    }

    async fn execute_task(&self, task: Task) {
        let request = ExecuteRequest {
            prompt: task.prompt.clone(),
            project_path: task.project_path.clone(),
            model: Some(task.model.clone()),
            session_id: task.session_id.clone(),
            ..ExecuteRequest::default()
        }
        .apply_metadata(&task.metadata);

        let outcome =
            tokio::time::timeout(self.settings.default_timeout, self.executor.execute(request))
                .await;

        match outcome {
            Ok(Ok(result)) if result.success => self.finish_success(&task, result).await,
            Ok(Ok(result)) => {
                let error = result
                    .error
                    .unwrap_or_else(|| "Executor failure".to_string());
                self.finish_failure(&task, error, "task.failed").await;
            }
            Ok(Err(e)) => {
                self.finish_failure(&task, e.to_string(), "task.error").await;
            }
            Err(_) => {
                self.finish_failure(&task, TIMEOUT_ERROR.to_string(), "task.timeout")
                    .await;
            }
        }

        self.active.lock().await.remove(&task.id);
        self.wake.notify_one();
    }

    async fn finish_success(&self, task: &Task, result: ExecuteResult) {
        // Cancellation may have detached us while the executor was running;
        // the late result is discarded.
        if !self.active.lock().await.contains_key(&task.id) {
            info!("Discarding result for detached task {}", task.id);
            return;
        }
        let output = result.result.unwrap_or_default();
        let updated = match self
            .tasks
            .mark_completed(&task.id, output, result.cost_usd)
            .await
        {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                info!("Discarding result for terminal task {}", task.id);
                return;
            }
            Err(e) => {
                warn!("Failed to persist completion of task {}: {}", task.id, e);
                return;
            }
        };

        if let Some(session_id) = &updated.session_id {
            if let Err(e) = self.sessions.add_cost(session_id, updated.cost_usd).await {
                warn!("Failed to accrue cost on session {}: {}", session_id, e);
            }
            if let Err(e) = self.sessions.increment_messages(session_id).await {
                warn!("Failed to count message on session {}: {}", session_id, e);
            }
        }
        if let Err(e) = self
            .stats
            .record_request(RequestOutcome {
                success: true,
                input_tokens: result.usage.input_tokens,
                output_tokens: result.usage.output_tokens,
                cost_usd: updated.cost_usd,
                model: updated.model.clone(),
            })
            .await
        {
            warn!("Failed to record statistics: {}", e);
        }

        let _ = self.events.send(TaskEvent::Completed {
            task_id: updated.id.clone(),
            cost_usd: updated.cost_usd,
        });
        self.webhooks
            .send("task.completed", task_event_data(&updated), updated.webhook_url());
        info!(
            "Task {} completed in {}ms (cost ${:.4})",
            updated.id,
            updated.duration_ms.unwrap_or_default(),
            updated.cost_usd
        );
    }

    async fn finish_failure(&self, task: &Task, error: String, event: &'static str) {
        if !self.active.lock().await.contains_key(&task.id) {
            info!("Discarding failure for detached task {}", task.id);
            return;
        }
        let updated = match self.tasks.mark_failed(&task.id, error.clone()).await {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                info!("Discarding failure for terminal task {}", task.id);
                return;
            }
            Err(e) => {
                warn!("Failed to persist failure of task {}: {}", task.id, e);
                return;
            }
        };

        if let Err(e) = self
            .stats
            .record_request(RequestOutcome {
                success: false,
                model: updated.model.clone(),
                ..RequestOutcome::default()
            })
            .await
        {
            warn!("Failed to record statistics: {}", e);
        }

        let _ = self.events.send(TaskEvent::Failed {
            task_id: updated.id.clone(),
            error: error.clone(),
        });
        self.webhooks
            .send(event, task_event_data(&updated), updated.webhook_url());
        warn!("Task {} failed: {}", updated.id, error);
    }
}

#[async_trait::async_trait]
impl crate::core::lifecycle::LifecycleComponent for TaskScheduler {
    async fn on_init(&mut self) -> Result<()> {
        info!("Task Scheduler initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        self.start().await
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        self.stop().await;
        Ok(())
    }
}

fn task_event_data(task: &Task) -> Value {
    serde_json::json!({
        "task_id": task.id,
        "status": task.status,
        "priority": task.priority,
        "session_id": task.session_id,
        "result": task.result,
        "error": task.error,
        "duration_ms": task.duration_ms,
        "cost_usd": task.cost_usd,
    })
}

#[cfg(test)]
mod tests;
