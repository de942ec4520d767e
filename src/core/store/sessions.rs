use std::path::Path;

use anyhow::Result;

use super::DocumentStore;
use crate::core::ids::generate_id;
use crate::core::types::{
    NewSession, Session, SessionPatch, SessionStats, SessionStatus, now_iso,
};

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SessionsDocument {
    pub sessions: Vec<Session>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionListFilter {
    pub status: Option<SessionStatus>,
    pub project_path: Option<String>,
    pub limit: Option<usize>,
}

/// Persistent session records with cost and message accrual.
#[derive(Clone)]
pub struct SessionStore {
    store: DocumentStore<SessionsDocument>,
}

impl SessionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            store: DocumentStore::open(path)?,
        })
    }

    pub async fn create(&self, new: NewSession) -> Result<Session> {
        let now = now_iso();
        let session = Session {
            id: new.id.unwrap_or_else(generate_id),
            created_at: now.clone(),
            updated_at: now,
            model: new.model,
            project_path: new.project_path,
            status: SessionStatus::Active,
            total_cost_usd: 0.0,
            messages_count: 0,
            metadata: new.metadata,
        };
        let created = session.clone();
        self.store
            .with_lock(move |doc| {
                doc.sessions.push(session);
                Ok(())
            })
            .await?;
        Ok(created)
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        let doc = self.store.read().await;
        doc.sessions.iter().find(|s| s.id == id).cloned()
    }

    pub async fn update(&self, id: &str, patch: SessionPatch) -> Result<Option<Session>> {
        let id = id.to_string();
        self.store
            .with_lock(move |doc| {
                let Some(session) = doc.sessions.iter_mut().find(|s| s.id == id) else {
                    return Ok(None);
                };
                if let Some(status) = patch.status {
                    session.status = status;
                }
                if let Some(model) = patch.model {
                    session.model = model;
                }
                if let Some(metadata) = patch.metadata {
                    for (key, value) in metadata {
                        session.metadata.insert(key, value);
                    }
                }
                session.updated_at = now_iso();
                Ok(Some(session.clone()))
            })
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.store
            .with_lock(move |doc| {
                let before = doc.sessions.len();
                doc.sessions.retain(|s| s.id != id);
                Ok(doc.sessions.len() < before)
            })
            .await
    }

    /// Sessions ordered most recently touched first.
    pub async fn list(&self, filter: SessionListFilter) -> Vec<Session> {
        let doc = self.store.read().await;
        let mut sessions: Vec<Session> = doc
            .sessions
            .into_iter()
            .filter(|s| filter.status.is_none_or(|status| s.status == status))
            .filter(|s| {
                filter
                    .project_path
                    .as_deref()
                    .is_none_or(|p| s.project_path == p)
            })
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if let Some(limit) = filter.limit {
            sessions.truncate(limit);
        }
        sessions
    }

    /// Case-insensitive match against the id and a JSON rendering of the
    /// metadata.
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Vec<Session> {
        let needle = query.to_lowercase();
        let doc = self.store.read().await;
        let mut sessions: Vec<Session> = doc
            .sessions
            .into_iter()
            .filter(|s| {
                if s.id.to_lowercase().contains(&needle) {
                    return true;
                }
                serde_json::to_string(&s.metadata)
                    .map(|rendered| rendered.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if let Some(limit) = limit {
            sessions.truncate(limit);
        }
        sessions
    }

    pub async fn increment_messages(&self, id: &str) -> Result<Option<Session>> {
        let id = id.to_string();
        self.store
            .with_lock(move |doc| {
                let Some(session) = doc.sessions.iter_mut().find(|s| s.id == id) else {
                    return Ok(None);
                };
                session.messages_count += 1;
                session.updated_at = now_iso();
                Ok(Some(session.clone()))
            })
            .await
    }

    pub async fn add_cost(&self, id: &str, delta: f64) -> Result<Option<Session>> {
        let id = id.to_string();
        self.store
            .with_lock(move |doc| {
                let Some(session) = doc.sessions.iter_mut().find(|s| s.id == id) else {
                    return Ok(None);
                };
                session.total_cost_usd = (session.total_cost_usd + delta).max(0.0);
                session.updated_at = now_iso();
                Ok(Some(session.clone()))
            })
            .await
    }

    /// Purge sessions idle past the retention cutoff, keyed on `updated_at`.
    pub async fn cleanup(&self, retention_days: u32) -> Result<usize> {
        let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days as i64);
        let cutoff = cutoff.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        self.store
            .with_lock(move |doc| {
                let before = doc.sessions.len();
                doc.sessions.retain(|s| s.updated_at >= cutoff);
                Ok(before - doc.sessions.len())
            })
            .await
    }

    pub async fn get_stats(&self) -> SessionStats {
        let doc = self.store.read().await;
        let mut stats = SessionStats {
            total: doc.sessions.len(),
            ..SessionStats::default()
        };
        for session in &doc.sessions {
            match session.status {
                SessionStatus::Active => stats.active += 1,
                SessionStatus::Archived => stats.archived += 1,
            }
            stats.total_cost_usd += session.total_cost_usd;
            stats.total_messages += session.messages_count;
        }
        stats
    }
}
