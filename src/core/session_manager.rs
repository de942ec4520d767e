use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::core::executor::{ExecuteRequest, ExecuteResult, Executor};
use crate::core::store::{RequestOutcome, SessionListFilter, SessionStore, StatsStore};
use crate::core::types::{
    Metadata, NewSession, Session, SessionPatch, SessionStats, SessionStatus,
};
use crate::core::webhook::WebhookDispatcher;

#[derive(Debug, Clone, Default)]
pub struct ContinueRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub max_budget_usd: Option<f64>,
}

#[derive(Debug)]
pub enum ContinueOutcome {
    NotFound,
    NotActive(SessionStatus),
    Executed(ExecuteResult),
}

/// Thin orchestrator over the session store: creation, continuation, cost
/// accrual, and expiry cleanup.
#[derive(Clone)]
pub struct SessionManager {
    store: SessionStore,
    stats: StatsStore,
    executor: Arc<dyn Executor>,
    webhooks: Arc<WebhookDispatcher>,
    default_model: String,
    default_project_path: String,
}

impl SessionManager {
    pub fn new(
        store: SessionStore,
        stats: StatsStore,
        executor: Arc<dyn Executor>,
        webhooks: Arc<WebhookDispatcher>,
        default_model: String,
        default_project_path: String,
    ) -> Self {
        Self {
            store,
            stats,
            executor,
            webhooks,
            default_model,
            default_project_path,
        }
    }

    pub async fn create(
        &self,
        model: Option<String>,
        project_path: Option<String>,
        metadata: Metadata,
    ) -> Result<Session> {
        let session = self
            .store
            .create(NewSession {
                id: None,
                model: model.unwrap_or_else(|| self.default_model.clone()),
                project_path: project_path.unwrap_or_else(|| self.default_project_path.clone()),
                metadata,
            })
            .await?;
        info!("Session {} created", session.id);
        self.webhooks.send(
            "session.created",
            serde_json::json!({ "session_id": session.id }),
            None,
        );
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.store.get(id).await
    }

    pub async fn list(&self, filter: SessionListFilter) -> Vec<Session> {
        self.store.list(filter).await
    }

    pub async fn search(&self, query: &str, limit: Option<usize>) -> Vec<Session> {
        self.store.search(query, limit).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let deleted = self.store.delete(id).await?;
        if deleted {
            info!("Session {} deleted", id);
            self.webhooks.send(
                "session.deleted",
                serde_json::json!({ "session_id": id }),
                None,
            );
        }
        Ok(deleted)
    }

    pub async fn update_status(&self, id: &str, status: SessionStatus) -> Result<Option<Session>> {
        self.store
            .update(
                id,
                SessionPatch {
                    status: Some(status),
                    ..SessionPatch::default()
                },
            )
            .await
    }

    pub async fn get_stats(&self) -> SessionStats {
        self.store.get_stats().await
    }

    /// Accrue one successful execution against a session: cost plus one
    /// message.
    pub async fn accrue(&self, id: &str, cost_usd: f64) -> Result<()> {
        self.store.add_cost(id, cost_usd).await?;
        self.store.increment_messages(id).await?;
        Ok(())
    }

    pub async fn cleanup_expired(&self, retention_days: u32) -> Result<usize> {
        let purged = self.store.cleanup(retention_days).await?;
        if purged > 0 {
            info!("Purged {} expired session(s)", purged);
        }
        Ok(purged)
    }

    /// Run one more prompt inside an existing session, with the session's
    /// stored model and project path. Refuses non-active sessions. On
    /// success the session accrues the cost and message count.
    pub async fn continue_session(
        &self,
        id: &str,
        request: ContinueRequest,
    ) -> Result<ContinueOutcome> {
        let Some(session) = self.store.get(id).await else {
            return Ok(ContinueOutcome::NotFound);
        };
        if session.status != SessionStatus::Active {
            return Ok(ContinueOutcome::NotActive(session.status));
        }

        let result = self
            .executor
            .execute(ExecuteRequest {
                prompt: request.prompt,
                project_path: session.project_path.clone(),
                model: Some(session.model.clone()),
                session_id: Some(session.id.clone()),
                system_prompt: request.system_prompt,
                max_budget_usd: request.max_budget_usd,
                ..ExecuteRequest::default()
            })
            .await?;

        if result.success {
            if let Err(e) = self.store.add_cost(&session.id, result.cost_usd).await {
                warn!("Failed to accrue cost on session {}: {}", session.id, e);
            }
            if let Err(e) = self.store.increment_messages(&session.id).await {
                warn!("Failed to count message on session {}: {}", session.id, e);
            }
        }
        if let Err(e) = self
            .stats
            .record_request(RequestOutcome {
                success: result.success,
                input_tokens: result.usage.input_tokens,
                output_tokens: result.usage.output_tokens,
                cost_usd: result.cost_usd,
                model: session.model.clone(),
            })
            .await
        {
            warn!("Failed to record statistics: {}", e);
        }

        Ok(ContinueOutcome::Executed(result))
    }
}
