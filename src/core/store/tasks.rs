use std::cmp::Reverse;
use std::path::Path;

use anyhow::Result;
use tracing::info;

use super::DocumentStore;
use crate::core::ids::generate_id;
use crate::core::types::{
    NewTask, PRIORITY_DEFAULT, Task, TaskPatch, TaskStats, TaskStatus, can_transition, millis_since,
    now_iso,
};

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TasksDocument {
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskListFilter {
    pub status: Option<TaskStatus>,
    pub limit: Option<usize>,
}

/// Persistent set of task records, indexed by id and drawn in
/// (priority descending, created_at ascending, id ascending) order.
#[derive(Clone)]
pub struct TaskStore {
    store: DocumentStore<TasksDocument>,
}

impl TaskStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            store: DocumentStore::open(path)?,
        })
    }

    pub async fn create(&self, new: NewTask) -> Result<Task> {
        let now = now_iso();
        let task = Task {
            id: generate_id(),
            created_at: now.clone(),
            updated_at: now,
            started_at: None,
            completed_at: None,
            status: TaskStatus::Pending,
            priority: new.priority.unwrap_or(PRIORITY_DEFAULT),
            prompt: new.prompt,
            project_path: new.project_path,
            model: new.model,
            result: None,
            error: None,
            duration_ms: None,
            cost_usd: 0.0,
            session_id: new.session_id,
            metadata: new.metadata,
        };
        let created = task.clone();
        self.store
            .with_lock(move |doc| {
                doc.tasks.push(task);
                Ok(())
            })
            .await?;
        Ok(created)
    }

    pub async fn get(&self, id: &str) -> Option<Task> {
        let doc = self.store.read().await;
        doc.tasks.iter().find(|t| t.id == id).cloned()
    }

    /// Apply a typed patch and bump `updated_at`. Returns `None` when the
    /// task does not exist. Status transitions go through the dedicated
    /// helpers, not through patches.
    pub async fn update(&self, id: &str, patch: TaskPatch) -> Result<Option<Task>> {
        let id = id.to_string();
        self.store
            .with_lock(move |doc| {
                let Some(task) = doc.tasks.iter_mut().find(|t| t.id == id) else {
                    return Ok(None);
                };
                if let Some(priority) = patch.priority {
                    task.priority = priority;
                }
                if let Some(session_id) = patch.session_id {
                    task.session_id = Some(session_id);
                }
                if let Some(metadata) = patch.metadata {
                    for (key, value) in metadata {
                        task.metadata.insert(key, value);
                    }
                }
                task.updated_at = now_iso();
                Ok(Some(task.clone()))
            })
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.store
            .with_lock(move |doc| {
                let before = doc.tasks.len();
                doc.tasks.retain(|t| t.id != id);
                Ok(doc.tasks.len() < before)
            })
            .await
    }

    pub async fn list(&self, filter: TaskListFilter) -> Vec<Task> {
        let doc = self.store.read().await;
        let mut tasks: Vec<Task> = doc
            .tasks
            .into_iter()
            .filter(|t| filter.status.is_none_or(|s| t.status == s))
            .collect();
        sort_by_dispatch_order(&mut tasks);
        if let Some(limit) = filter.limit {
            tasks.truncate(limit);
        }
        tasks
    }

    /// Highest-priority oldest pending task, or `None`.
    pub async fn get_next_pending(&self) -> Option<Task> {
        let doc = self.store.read().await;
        let mut pending: Vec<Task> = doc
            .tasks
            .into_iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect();
        sort_by_dispatch_order(&mut pending);
        pending.into_iter().next()
    }

    pub async fn mark_processing(&self, id: &str) -> Result<Option<Task>> {
        let id = id.to_string();
        self.store
            .with_lock(move |doc| {
                let Some(task) = doc.tasks.iter_mut().find(|t| t.id == id) else {
                    return Ok(None);
                };
                if !can_transition(task.status, TaskStatus::Processing) {
                    return Ok(None);
                }
                task.status = TaskStatus::Processing;
                task.started_at = Some(now_iso());
                task.updated_at = now_iso();
                Ok(Some(task.clone()))
            })
            .await
    }

    pub async fn mark_completed(
        &self,
        id: &str,
        result: String,
        cost_usd: f64,
    ) -> Result<Option<Task>> {
        let id = id.to_string();
        self.store
            .with_lock(move |doc| {
                let Some(task) = doc.tasks.iter_mut().find(|t| t.id == id) else {
                    return Ok(None);
                };
                if !can_transition(task.status, TaskStatus::Completed) {
                    return Ok(None);
                }
                task.status = TaskStatus::Completed;
                task.result = Some(result);
                task.cost_usd = cost_usd;
                task.duration_ms = task.started_at.as_deref().and_then(millis_since);
                task.completed_at = Some(now_iso());
                task.updated_at = now_iso();
                Ok(Some(task.clone()))
            })
            .await
    }

    pub async fn mark_failed(&self, id: &str, error: String) -> Result<Option<Task>> {
        let id = id.to_string();
        self.store
            .with_lock(move |doc| {
                let Some(task) = doc.tasks.iter_mut().find(|t| t.id == id) else {
                    return Ok(None);
                };
                if !can_transition(task.status, TaskStatus::Failed) {
                    return Ok(None);
                }
                task.status = TaskStatus::Failed;
                task.error = Some(error);
                task.duration_ms = task.started_at.as_deref().and_then(millis_since);
                task.completed_at = Some(now_iso());
                task.updated_at = now_iso();
                Ok(Some(task.clone()))
            })
            .await
    }

    /// Cancel a pending or processing task. Refuses terminal states by
    /// returning `None`.
    pub async fn cancel(&self, id: &str) -> Result<Option<Task>> {
        let id = id.to_string();
        self.store
            .with_lock(move |doc| {
                let Some(task) = doc.tasks.iter_mut().find(|t| t.id == id) else {
                    return Ok(None);
                };
                if !can_transition(task.status, TaskStatus::Cancelled) {
                    return Ok(None);
                }
                task.status = TaskStatus::Cancelled;
                task.completed_at = Some(now_iso());
                task.updated_at = now_iso();
                Ok(Some(task.clone()))
            })
            .await
    }

    /// Crash recovery: every task persisted as `processing` lost its
    /// in-memory slot on restart and must become eligible again.
    /// `started_at` is left as-is for observability.
    pub async fn reset_processing_to_pending(&self) -> Result<Vec<String>> {
        let reset = self
            .store
            .with_lock(|doc| {
                let mut reset = Vec::new();
                for task in doc
                    .tasks
                    .iter_mut()
                    .filter(|t| t.status == TaskStatus::Processing)
                {
                    task.status = TaskStatus::Pending;
                    task.updated_at = now_iso();
                    reset.push(task.id.clone());
                }
                Ok(reset)
            })
            .await?;
        if !reset.is_empty() {
            info!("Recovered {} interrupted task(s) back to pending", reset.len());
        }
        Ok(reset)
    }

    /// Remove terminal tasks older than the retention cutoff, keyed on
    /// `completed_at` with `created_at` as fallback.
    pub async fn cleanup(&self, retention_days: u32) -> Result<usize> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days as i64);
        let cutoff = cutoff.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        self.store
            .with_lock(move |doc| {
                let before = doc.tasks.len();
                doc.tasks.retain(|t| {
                    if !t.status.is_terminal() {
                        return true;
                    }
                    let reference = t.completed_at.as_deref().unwrap_or(&t.created_at);
                    reference >= cutoff.as_str()
                });
                Ok(before - doc.tasks.len())
            })
            .await
    }

    pub async fn get_stats(&self) -> TaskStats {
        let doc = self.store.read().await;
        let mut stats = TaskStats {
            total: doc.tasks.len(),
            ..TaskStats::default()
        };
        for task in &doc.tasks {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
            stats.total_cost_usd += task.cost_usd;
        }
        stats
    }
}

fn sort_by_dispatch_order(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        (Reverse(a.priority), &a.created_at, &a.id).cmp(&(Reverse(b.priority), &b.created_at, &b.id))
    });
}
