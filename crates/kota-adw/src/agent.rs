//! LLM agent invocation via the `claude` CLI.
//!
//! Each phase spawns one subprocess with explicit argv, a scoped tool list,
//! captured stdout/stderr, and a configurable timeout. Cost is read from the
//! CLI's JSON result envelope when present.

use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("agent CLI not found")]
    CliNotFound,
    #[error("timeout after {0} seconds")]
    Timeout(u32),
    #[error("agent exited with code {code}: {stderr}")]
    ExitCode { code: i32, stderr: String },
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Result of one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub output: String,
    pub duration_ms: u64,
    pub cost_usd: f64,
}

/// One phase agent invocation: prompt, tool scope, and working directory.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub prompt: String,
    pub allowed_tools: Vec<String>,
    pub working_dir: PathBuf,
}

/// Abstraction over the LLM CLI so the orchestrator is testable without it.
pub trait AgentInvoker: Send + Sync {
    fn invoke(
        &self,
        request: &AgentRequest,
    ) -> impl std::future::Future<Output = Result<AgentResult>> + Send;
}

/// Configuration for the real CLI runner.
#[derive(Debug, Clone)]
pub struct ClaudeAgent {
    pub model: String,
    pub timeout_sec: u32,
}

impl ClaudeAgent {
    pub fn new(model: impl Into<String>, timeout_sec: u32) -> Self {
        Self {
            model: model.into(),
            timeout_sec,
        }
    }

    async fn run_once(&self, request: &AgentRequest) -> Result<AgentResult> {
        let start = std::time::Instant::now();

        let mut cmd = Command::new("claude");
        cmd.arg("-p")
            .arg("--output-format")
            .arg("json")
            .arg("--model")
            .arg(&self.model);
        if !request.allowed_tools.is_empty() {
            cmd.arg("--allowedTools").arg(request.allowed_tools.join(","));
        }
        cmd.arg(&request.prompt)
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(
            model = %self.model,
            working_dir = %request.working_dir.display(),
            tools = request.allowed_tools.len(),
            "spawning agent process"
        );

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AgentError::CliNotFound
            } else {
                AgentError::Io(e)
            }
        })?;

        let output = if self.timeout_sec > 0 {
            match timeout(
                Duration::from_secs(u64::from(self.timeout_sec)),
                child.wait_with_output(),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => return Err(AgentError::Timeout(self.timeout_sec)),
            }
        } else {
            child.wait_with_output().await?
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        let code = output.status.code().unwrap_or(-1);
        if code != 0 {
            return Err(AgentError::ExitCode {
                code,
                stderr: stderr.chars().take(2000).collect(),
            });
        }

        let (text, cost_usd) = parse_result_envelope(&stdout);
        info!(
            duration_ms,
            cost_usd,
            output_bytes = text.len(),
            "agent invocation complete"
        );
        Ok(AgentResult {
            output: text,
            duration_ms,
            cost_usd,
        })
    }
}

impl AgentInvoker for ClaudeAgent {
    async fn invoke(&self, request: &AgentRequest) -> Result<AgentResult> {
        self.run_once(request).await
    }
}

/// Pull the result text and cost out of the CLI's JSON envelope.
/// Plain-text output is passed through with zero cost.
fn parse_result_envelope(stdout: &str) -> (String, f64) {
    let Ok(envelope) = serde_json::from_str::<Value>(stdout.trim()) else {
        return (stdout.trim().to_string(), 0.0);
    };
    let text = envelope
        .get("result")
        .and_then(Value::as_str)
        .map_or_else(|| stdout.trim().to_string(), str::to_string);
    let cost = envelope
        .get("total_cost_usd")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    (text, cost)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_parsing_extracts_result_and_cost() {
        let stdout = r#"{"type": "result", "result": "Domain: auth", "total_cost_usd": 0.0421}"#;
        let (text, cost) = parse_result_envelope(stdout);
        assert_eq!(text, "Domain: auth");
        assert!((cost - 0.0421).abs() < f64::EPSILON);
    }

    #[test]
    fn plain_text_output_passes_through() {
        let (text, cost) = parse_result_envelope("just prose\n");
        assert_eq!(text, "just prose");
        assert_eq!(cost, 0.0);
    }

    #[test]
    fn envelope_without_result_field_keeps_raw() {
        let stdout = r#"{"type": "other"}"#;
        let (text, _) = parse_result_envelope(stdout);
        assert_eq!(text, stdout);
    }
}
