use serde_json::{Map, Value};

pub type Metadata = Map<String, Value>;

/// Current UTC time as a fixed-width ISO-8601 string. Fixed width keeps
/// lexicographic order equal to chronological order inside the stores.
pub fn now_iso() -> String {
    chrono::Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Milliseconds elapsed since an ISO-8601 timestamp, `None` if unparseable.
pub fn millis_since(iso: &str) -> Option<i64> {
    let then = chrono::DateTime::parse_from_rfc3339(iso).ok()?;
    Some((chrono::Utc::now() - then.with_timezone(&chrono::Utc)).num_milliseconds())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TaskStatus::Pending),
            "processing" => Some(TaskStatus::Processing),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states are absorbing.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

pub fn can_transition(from: TaskStatus, to: TaskStatus) -> bool {
    match from {
        TaskStatus::Pending => matches!(to, TaskStatus::Processing | TaskStatus::Cancelled),
        TaskStatus::Processing => matches!(
            to,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        ),
        TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => false,
    }
}

pub const PRIORITY_MIN: u8 = 1;
pub const PRIORITY_MAX: u8 = 10;
pub const PRIORITY_DEFAULT: u8 = 5;

/// A persisted unit of work: one prompt handed to the executor tool.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Task {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    pub status: TaskStatus,
    pub priority: u8,
    pub prompt: String,
    pub project_path: String,
    pub model: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Task {
    /// Webhook override carried in creation metadata, if any.
    pub fn webhook_url(&self) -> Option<String> {
        self.metadata
            .get("webhook_url")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

/// Creation parameters; the store fills id, timestamps, status and defaults.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub prompt: String,
    pub project_path: String,
    pub model: String,
    pub priority: Option<u8>,
    pub session_id: Option<String>,
    pub metadata: Metadata,
}

/// The patchable surface of a task record. Everything else is owned by the
/// transition helpers, so arbitrary-key merges cannot corrupt a record.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub priority: Option<u8>,
    pub session_id: Option<String>,
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total_cost_usd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Archived,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Archived => "archived",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "active" => Some(SessionStatus::Active),
            "archived" => Some(SessionStatus::Archived),
            _ => None,
        }
    }
}

/// A logical grouping of executions sharing model and project context.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    pub model: String,
    pub project_path: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub messages_count: u64,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub id: Option<String>,
    pub model: String,
    pub project_path: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub status: Option<SessionStatus>,
    pub model: Option<String>,
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SessionStats {
    pub total: usize,
    pub active: usize,
    pub archived: usize,
    pub total_cost_usd: f64,
    pub total_messages: u64,
}

/// Scheduler lifecycle notifications published on the broadcast channel.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Submitted { task_id: String },
    Started { task_id: String },
    Completed { task_id: String, cost_usd: f64 },
    Failed { task_id: String, error: String },
    Cancelled { task_id: String },
}
