use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::core::types::Metadata;

/// One invocation of the executor tool.
#[derive(Debug, Clone, Default)]
pub struct ExecuteRequest {
    pub prompt: String,
    pub project_path: String,
    pub model: Option<String>,
    pub session_id: Option<String>,
    pub system_prompt: Option<String>,
    pub max_budget_usd: Option<f64>,
    pub allowed_tools: Option<Vec<String>>,
    pub disallowed_tools: Option<Vec<String>>,
    pub agent: Option<String>,
    pub mcp_config: Option<String>,
}

impl ExecuteRequest {
    /// Fold task metadata keys (executor options supplied at submission)
    /// into the request.
    pub fn apply_metadata(mut self, metadata: &Metadata) -> Self {
        if let Some(v) = metadata.get("system_prompt").and_then(|v| v.as_str()) {
            self.system_prompt = Some(v.to_string());
        }
        if let Some(v) = metadata.get("max_budget_usd").and_then(|v| v.as_f64()) {
            self.max_budget_usd = Some(v);
        }
        if let Some(v) = metadata.get("allowed_tools").and_then(|v| v.as_array()) {
            self.allowed_tools = Some(
                v.iter()
                    .filter_map(|t| t.as_str().map(|s| s.to_string()))
                    .collect(),
            );
        }
        if let Some(v) = metadata.get("disallowed_tools").and_then(|v| v.as_array()) {
            self.disallowed_tools = Some(
                v.iter()
                    .filter_map(|t| t.as_str().map(|s| s.to_string()))
                    .collect(),
            );
        }
        if let Some(v) = metadata.get("agent").and_then(|v| v.as_str()) {
            self.agent = Some(v.to_string());
        }
        if let Some(v) = metadata.get("mcp_config").and_then(|v| v.as_str()) {
            self.mcp_config = Some(v.to_string());
        }
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Outcome of one executor invocation. Tool-level failures (non-zero exit,
/// unparseable reply, reported error) are values, not errors; `Err` is
/// reserved for failures to even run the tool.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: i64,
    pub cost_usd: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub usage: Usage,
}

impl ExecuteResult {
    pub fn completed(
        result: String,
        duration_ms: i64,
        cost_usd: f64,
        session_id: Option<String>,
        usage: Usage,
    ) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            duration_ms,
            cost_usd,
            session_id,
            usage,
        }
    }

    pub fn failure(error: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            duration_ms,
            cost_usd: 0.0,
            session_id: None,
            usage: Usage::default(),
        }
    }
}

/// The JSON document the executor tool writes to stdout.
#[derive(Debug, Deserialize)]
struct ToolReply {
    result: String,
    #[serde(default)]
    total_cost_usd: f64,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    usage: Usage,
    #[serde(default)]
    is_error: bool,
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResult>;
}

/// Invokes the executor tool as a child process and parses its single JSON
/// reply. Wall-clock is measured from spawn to exit.
pub struct CliExecutor {
    command: String,
    default_model: String,
    timeout: Duration,
}

impl CliExecutor {
    pub fn new(command: impl Into<String>, default_model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            default_model: default_model.into(),
            timeout,
        }
    }

    fn build_command(&self, request: &ExecuteRequest) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg("--print").arg("--output-format").arg("json");
        cmd.arg("--model")
            .arg(request.model.as_deref().unwrap_or(&self.default_model));
        if let Some(session_id) = &request.session_id {
            cmd.arg("--resume").arg(session_id);
        }
        if let Some(system_prompt) = &request.system_prompt {
            cmd.arg("--append-system-prompt").arg(system_prompt);
        }
        if let Some(budget) = request.max_budget_usd {
            cmd.arg("--max-budget-usd").arg(budget.to_string());
        }
        if let Some(tools) = &request.allowed_tools {
            cmd.arg("--allowed-tools").arg(tools.join(","));
        }
        if let Some(tools) = &request.disallowed_tools {
            cmd.arg("--disallowed-tools").arg(tools.join(","));
        }
        if let Some(agent) = &request.agent {
            cmd.arg("--agent").arg(agent);
        }
        if let Some(mcp_config) = &request.mcp_config {
            cmd.arg("--mcp-config").arg(mcp_config);
        }
        cmd.arg(&request.prompt);
        cmd.current_dir(&request.project_path);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Executor for CliExecutor {
    async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResult> {
        if let Some(budget) = request.max_budget_usd {
            if budget <= 0.0 {
                return Ok(ExecuteResult::failure("max_budget_usd must be positive", 0));
            }
        }

        let mut cmd = self.build_command(&request);
        let started = Instant::now();

        debug!("Invoking executor tool in {}", request.project_path);
        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn executor tool '{}'", self.command))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.context("Failed to collect executor output")?,
            Err(_) => {
                // The child is killed on drop; the scheduler owns the task's
                // terminal state.
                warn!(
                    "Executor tool exceeded {}s, killing child",
                    self.timeout.as_secs()
                );
                return Ok(ExecuteResult::failure(
                    format!("Executor timed out after {}s", self.timeout.as_secs()),
                    started.elapsed().as_millis() as i64,
                ));
            }
        };
        let duration_ms = started.elapsed().as_millis() as i64;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Ok(ExecuteResult::failure(
                if detail.is_empty() {
                    format!("Executor exited with {}", output.status)
                } else {
                    format!("Executor exited with {}: {}", output.status, detail)
                },
                duration_ms,
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let reply: ToolReply = match serde_json::from_str(stdout.trim()) {
            Ok(reply) => reply,
            Err(e) => {
                return Ok(ExecuteResult::failure(
                    format!("Unparseable executor reply: {}", e),
                    duration_ms,
                ));
            }
        };

        if reply.is_error {
            return Ok(ExecuteResult::failure(reply.result, duration_ms));
        }

        info!(
            "Executor finished in {}ms (cost ${:.4})",
            duration_ms, reply.total_cost_usd
        );
        Ok(ExecuteResult::completed(
            reply.result,
            duration_ms,
            reply.total_cost_usd,
            reply.session_id,
            reply.usage,
        ))
    }
}
