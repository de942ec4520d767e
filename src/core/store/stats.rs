use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;

use super::DocumentStore;

/// Rolling retention for daily rows, in days.
const DAILY_RETENTION_DAYS: i64 = 90;

/// One request-level outcome, reported by whichever component produced the
/// authoritative result (scheduler worker or the synchronous execute path).
#[derive(Debug, Clone, Default)]
pub struct RequestOutcome {
    pub success: bool,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub model: String,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct StatsDocument {
    pub daily: Vec<DailyStats>,
    pub requests: RequestTotals,
    pub tokens: TokenTotals,
    pub costs: CostTotals,
    pub models: BTreeMap<String, ModelUsage>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct DailyStats {
    pub date: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    #[serde(default)]
    pub models: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RequestTotals {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenTotals {
    pub total_input: u64,
    pub total_output: u64,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CostTotals {
    pub total_usd: f64,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ModelUsage {
    pub count: u64,
    pub cost_usd: f64,
}

/// Request-level counters and daily rollups. Best-effort sink: callers log
/// and continue when a write fails.
#[derive(Clone)]
pub struct StatsStore {
    store: DocumentStore<StatsDocument>,
    enabled: bool,
}

impl StatsStore {
    pub fn open(path: impl AsRef<Path>, enabled: bool) -> Result<Self> {
        Ok(Self {
            store: DocumentStore::open(path)?,
            enabled,
        })
    }

    pub async fn record_request(&self, outcome: RequestOutcome) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        self.store
            .with_lock(move |doc| {
                doc.requests.total += 1;
                if outcome.success {
                    doc.requests.successful += 1;
                } else {
                    doc.requests.failed += 1;
                }
                doc.tokens.total_input += outcome.input_tokens;
                doc.tokens.total_output += outcome.output_tokens;
                doc.costs.total_usd += outcome.cost_usd;

                let model = doc.models.entry(outcome.model.clone()).or_default();
                model.count += 1;
                model.cost_usd += outcome.cost_usd;

                let row = match doc.daily.iter_mut().find(|d| d.date == today) {
                    Some(row) => row,
                    None => {
                        doc.daily.push(DailyStats {
                            date: today.clone(),
                            ..DailyStats::default()
                        });
                        doc.daily.last_mut().expect("just pushed")
                    }
                };
                row.total_requests += 1;
                if outcome.success {
                    row.successful_requests += 1;
                } else {
                    row.failed_requests += 1;
                }
                row.input_tokens += outcome.input_tokens;
                row.output_tokens += outcome.output_tokens;
                row.cost_usd += outcome.cost_usd;
                *row.models.entry(outcome.model).or_default() += 1;

                let cutoff = (chrono::Utc::now()
                    - chrono::Duration::days(DAILY_RETENTION_DAYS))
                .format("%Y-%m-%d")
                .to_string();
                doc.daily.retain(|d| d.date >= cutoff);
                doc.daily.sort_by(|a, b| a.date.cmp(&b.date));
                Ok(())
            })
            .await
    }

    pub async fn aggregate(&self) -> StatsDocument {
        self.store.read().await
    }

    /// Most recent daily rows, newest last.
    pub async fn daily(&self, days: usize) -> Vec<DailyStats> {
        let doc = self.store.read().await;
        let skip = doc.daily.len().saturating_sub(days);
        doc.daily.into_iter().skip(skip).collect()
    }
}
