//! kota-adw - autonomous developer workflow orchestrator.
//!
//! Drives issue-to-pull-request automation: analysis, plan, build, improve,
//! and pr phases, each a scoped LLM-agent invocation, with curated context
//! carried between phases and a resumable checkpoint after each one.

pub mod agent;
pub mod batch;
pub mod checkpoint;
pub mod curator;
pub mod git;
pub mod phases;
pub mod pr;
pub mod worktree;

use agent::{AgentInvoker, AgentRequest, AgentResult};
use checkpoint::{Checkpoint, CheckpointStore, RunStatus};
use chrono::Utc;
use kota_core::{AdwConfig, AdwExit, IssueType, RetryPolicy};
use kotadb::tools::ToolContext;
use phases::{AdwPhase, AnalysisOutput, IssuePayload, PhaseError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Type alias for application-level errors with context.
pub type AppResult<T> = eyre::Result<T>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("issue fetch failed: {0}")]
    IssueFetch(String),
    #[error("agent failed in {phase}: {source}")]
    Agent {
        phase: &'static str,
        source: agent::AgentError,
    },
    #[error("{0}")]
    Parse(#[from] PhaseError),
    #[error("specification not found at {0}")]
    MissingSpec(String),
    #[error("type-check failed")]
    TypeCheckFailed,
    #[error("tests failed")]
    TestsFailed,
    #[error("git error: {0}")]
    Git(#[from] git::GitError),
    #[error("worktree error: {0}")]
    Worktree(#[from] worktree::WorktreeError),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] checkpoint::CheckpointError),
    #[error("pull request failed: {0}")]
    Pr(#[from] pr::PrError),
    #[error("cancelled at phase boundary")]
    Cancelled,
    #[error("internal state error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> AdwExit {
        match self {
            Self::IssueFetch(_) => AdwExit::ResourceUnavailable,
            Self::Agent { source, .. } => match source {
                agent::AgentError::Timeout(_) => AdwExit::Timeout,
                agent::AgentError::CliNotFound => AdwExit::UnmetDependency,
                _ => AdwExit::AgentFailed,
            },
            Self::Parse(_) => AdwExit::ParseError,
            Self::MissingSpec(_) => AdwExit::MissingSpec,
            Self::TypeCheckFailed => AdwExit::TypeCheckFailed,
            Self::TestsFailed => AdwExit::TestsFailed,
            Self::Git(_) | Self::Worktree(_) => AdwExit::VcsError,
            Self::Checkpoint(_) => AdwExit::FileIo,
            Self::Pr(_) => AdwExit::Network,
            Self::Cancelled | Self::Internal(_) => AdwExit::Unexpected,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Final result of one issue run.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub pr_url: Option<String>,
    pub cost_usd: f64,
    pub duration_ms: u64,
}

/// The orchestrator for one workspace.
///
/// Generic over the agent invoker so phase flow is testable without the
/// LLM CLI.
pub struct Orchestrator<A: AgentInvoker> {
    pub tool_ctx: Arc<ToolContext>,
    pub config: AdwConfig,
    agent: A,
    curator_agent: A,
    checkpoints: CheckpointStore,
    workspace_root: PathBuf,
    cancel: CancellationToken,
}

impl<A: AgentInvoker> Orchestrator<A> {
    pub fn new(
        tool_ctx: Arc<ToolContext>,
        config: AdwConfig,
        workspace_root: PathBuf,
        agent: A,
        curator_agent: A,
    ) -> Self {
        let checkpoints = CheckpointStore::new(workspace_root.join(&config.data_dir));
        Self {
            tool_ctx,
            config,
            agent,
            curator_agent,
            checkpoints,
            workspace_root,
            cancel: CancellationToken::new(),
        }
    }

    /// Token checked between phases; cancelling preserves the checkpoint.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn checkpoint_store(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Run (or resume) the workflow for one issue.
    pub async fn run_issue(
        &self,
        issue_number: u64,
        issue_file: Option<&Path>,
    ) -> Result<RunOutcome> {
        let started = std::time::Instant::now();
        let workflow_id = format!("adw-{issue_number}");

        let mut checkpoint = self
            .checkpoints
            .load(issue_number)?
            .unwrap_or_else(|| Checkpoint::new(issue_number, &workflow_id));
        if !checkpoint.completed_phases.is_empty() {
            info!(
                issue = issue_number,
                completed = ?checkpoint.completed_phases,
                "resuming from checkpoint"
            );
        }
        let _ = self.checkpoints.update_manifest(issue_number, |e| {
            e.status = RunStatus::Running;
            e.started_at = Utc::now();
        });

        let issue = match self.fetch_issue(issue_number, issue_file) {
            Ok(issue) => issue,
            Err(e) => {
                let _ = self.checkpoints.update_manifest(issue_number, |entry| {
                    entry.status = RunStatus::Failed;
                    entry.completed_at = Some(Utc::now());
                    entry.error_message = Some(e.to_string());
                });
                return Err(e);
            }
        };
        let result = self
            .drive_phases(&issue, &workflow_id, &mut checkpoint)
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok((pr_url, cost_usd)) => {
                // Contexts are cleared only on full success; failed runs
                // keep them for resume.
                if let Err(e) = self.tool_ctx.storage.clear_contexts(&workflow_id).await {
                    warn!(error = %e, "context cleanup failed");
                }
                if let Err(e) = self.checkpoints.delete(issue_number) {
                    warn!(error = %e, "checkpoint cleanup failed");
                }
                self.auto_record_success(&issue, &checkpoint).await;
                let _ = self.checkpoints.update_manifest(issue_number, |e| {
                    e.status = RunStatus::Completed;
                    e.completed_at = Some(Utc::now());
                    e.pr_url = pr_url.clone();
                    e.cost_usd = Some(cost_usd);
                    e.duration_ms = Some(duration_ms);
                });
                Ok(RunOutcome {
                    pr_url,
                    cost_usd,
                    duration_ms,
                })
            }
            Err(e) => {
                // Preserve the checkpoint for resume; the phase error wins
                // over any save problem.
                if let Err(save_err) = self.checkpoints.save(&checkpoint) {
                    warn!(error = %save_err, "checkpoint save failed");
                }
                self.auto_record_failure(&issue, &e).await;
                let status = if matches!(e, OrchestratorError::Cancelled) {
                    RunStatus::Cancelled
                } else {
                    RunStatus::Failed
                };
                let _ = self.checkpoints.update_manifest(issue_number, |entry| {
                    entry.status = status;
                    entry.completed_at = Some(Utc::now());
                    entry.duration_ms = Some(duration_ms);
                    entry.error_message = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    fn fetch_issue(&self, number: u64, issue_file: Option<&Path>) -> Result<IssuePayload> {
        let payload = match issue_file {
            Some(path) => phases::read_issue_file(path),
            None => phases::fetch_issue(&self.workspace_root, number),
        };
        payload.map_err(|e| OrchestratorError::IssueFetch(e.to_string()))
    }

    async fn drive_phases(
        &self,
        issue: &IssuePayload,
        workflow_id: &str,
        checkpoint: &mut Checkpoint,
    ) -> Result<(Option<String>, f64)> {
        let mut cost_usd = 0.0;
        let mut analysis = self.analysis_from_checkpoint(issue, checkpoint);
        let mut pr_url = None;

        for phase in AdwPhase::ALL {
            if self.cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }
            if checkpoint.is_completed(phase.as_str()) {
                continue;
            }
            let _ = self.checkpoints.update_manifest(issue.number, |e| {
                e.current_phase = Some(phase.as_str().to_string());
            });
            info!(issue = issue.number, phase = phase.as_str(), "phase starting");

            match phase {
                AdwPhase::Analysis => {
                    let context =
                        curator::injected_context(&self.tool_ctx, workflow_id, phase).await;
                    let prompt = phases::analysis_prompt(issue, context.as_deref());
                    let result = self
                        .execute_phase(phase, prompt, &self.workspace_root)
                        .await?;
                    cost_usd += result.cost_usd;
                    let parsed = phases::parse_analysis_output(&result.output)?;
                    checkpoint.domain = Some(parsed.domain.clone());
                    checkpoint.issue_type = Some(parsed.issue_type.as_str().to_string());
                    analysis = Some(parsed);
                    self.curate_after(workflow_id, phase, &result.output).await;
                }
                AdwPhase::Plan => {
                    let Some(analysis_ref) = analysis.as_ref() else {
                        return Err(OrchestratorError::Internal(
                            "plan reached without analysis output".to_string(),
                        ));
                    };
                    let context =
                        curator::injected_context(&self.tool_ctx, workflow_id, phase).await;
                    let prompt = phases::plan_prompt(issue, analysis_ref, context.as_deref());
                    let result = self
                        .execute_phase(phase, prompt, &self.workspace_root)
                        .await?;
                    cost_usd += result.cost_usd;
                    let spec_path = phases::parse_plan_output(&result.output)?;
                    if !spec_path.is_file() {
                        return Err(OrchestratorError::MissingSpec(
                            spec_path.display().to_string(),
                        ));
                    }
                    checkpoint.spec_path = Some(spec_path.display().to_string());
                    self.curate_after(workflow_id, phase, &result.output).await;
                }
                AdwPhase::Build => {
                    let worktree_dir = self.ensure_worktree(issue.number, checkpoint)?;
                    let spec_path = checkpoint
                        .spec_path
                        .clone()
                        .map(PathBuf::from)
                        .ok_or_else(|| OrchestratorError::MissingSpec("<none>".to_string()))?;
                    let context =
                        curator::injected_context(&self.tool_ctx, workflow_id, phase).await;
                    let prompt = phases::build_prompt(&spec_path, context.as_deref());
                    let result = self.execute_phase(phase, prompt, &worktree_dir).await?;
                    cost_usd += result.cost_usd;
                    checkpoint.files_modified = phases::parse_build_output(&result.output)?;
                    self.curate_after(workflow_id, phase, &result.output).await;
                }
                AdwPhase::Improve => {
                    // Improve is best-effort; its failure never fails the run.
                    let domain = checkpoint.domain.clone().unwrap_or_default();
                    let context =
                        curator::injected_context(&self.tool_ctx, workflow_id, phase).await;
                    let prompt = phases::improve_prompt(&domain, context.as_deref());
                    let working_dir = checkpoint
                        .worktree_path
                        .clone()
                        .map_or_else(|| self.workspace_root.clone(), PathBuf::from);
                    match self.execute_phase(phase, prompt, &working_dir).await {
                        Ok(result) => {
                            cost_usd += result.cost_usd;
                            self.curate_after(workflow_id, phase, &result.output).await;
                        }
                        Err(e) => {
                            warn!(issue = issue.number, error = %e, "improve phase failed, continuing");
                        }
                    }
                }
                AdwPhase::Pr => {
                    pr_url = Some(self.run_pr_phase(issue, checkpoint, cost_usd).await?);
                }
            }

            checkpoint.mark_completed(phase.as_str());
            self.checkpoints.save(checkpoint)?;
        }

        Ok((pr_url, cost_usd))
    }

    /// Rebuild analysis state from a checkpoint on resume.
    fn analysis_from_checkpoint(
        &self,
        issue: &IssuePayload,
        checkpoint: &Checkpoint,
    ) -> Option<AnalysisOutput> {
        if !checkpoint.is_completed(AdwPhase::Analysis.as_str()) {
            return None;
        }
        Some(AnalysisOutput {
            domain: checkpoint.domain.clone().unwrap_or_else(|| "general".to_string()),
            issue_type: checkpoint
                .issue_type
                .as_deref()
                .and_then(IssueType::parse)
                .unwrap_or(IssueType::Feature),
            requirements: issue.body.clone(),
        })
    }

    /// One phase-agent invocation with transient retry.
    async fn execute_phase(
        &self,
        phase: AdwPhase,
        prompt: String,
        working_dir: &Path,
    ) -> Result<AgentResult> {
        let request = AgentRequest {
            prompt,
            allowed_tools: phase.allowed_tools(),
            working_dir: working_dir.to_path_buf(),
        };
        let policy = RetryPolicy::new(
            self.config.phase_retries.max(1),
            Duration::from_secs(u64::from(self.config.retry_backoff_sec)),
        );
        policy
            .run(phase.as_str(), || self.agent.invoke(&request))
            .await
            .map_err(|source| OrchestratorError::Agent {
                phase: phase.as_str(),
                source,
            })
    }

    /// Curation is synchronous after the phase and always swallowed.
    async fn curate_after(&self, workflow_id: &str, phase: AdwPhase, output: &str) {
        match curator::curate(
            &self.tool_ctx,
            &self.curator_agent,
            &self.workspace_root,
            workflow_id,
            phase,
            output,
        )
        .await
        {
            Ok(_) => {}
            Err(e) => warn!(phase = phase.as_str(), error = %e, "curation failed"),
        }
    }

    /// Create the per-issue worktree once, remembering it in the checkpoint.
    fn ensure_worktree(&self, issue: u64, checkpoint: &mut Checkpoint) -> Result<PathBuf> {
        if let Some(path) = &checkpoint.worktree_path {
            let path = PathBuf::from(path);
            if path.is_dir() {
                return Ok(path);
            }
        }

        let base = if git::branch_exists(&self.workspace_root, &self.config.base_branch)? {
            self.config.base_branch.clone()
        } else {
            git::detect_default_branch(&self.workspace_root)?
        };
        let info = worktree::create(&self.workspace_root, issue, &base)?;
        checkpoint.worktree_path = Some(info.path.display().to_string());
        checkpoint.branch_name = Some(info.branch.clone());
        let _ = self.checkpoints.update_manifest(issue, |e| {
            e.worktree_path = Some(info.path.display().to_string());
            e.branch = Some(info.branch.clone());
        });
        Ok(info.path)
    }

    async fn run_pr_phase(
        &self,
        issue: &IssuePayload,
        checkpoint: &Checkpoint,
        cost_usd: f64,
    ) -> Result<String> {
        let worktree_dir = checkpoint
            .worktree_path
            .clone()
            .map(PathBuf::from)
            .ok_or_else(|| OrchestratorError::MissingSpec("no worktree for pr".to_string()))?;
        let branch = checkpoint
            .branch_name
            .clone()
            .ok_or_else(|| OrchestratorError::MissingSpec("no branch for pr".to_string()))?;

        let validation =
            pr::run_validation(&worktree_dir, &self.config, &checkpoint.files_modified);
        for warning in &validation.warnings {
            warn!(issue = issue.number, "{warning}");
        }
        if !validation.typecheck.success {
            return Err(OrchestratorError::TypeCheckFailed);
        }
        if !validation.tests.success {
            return Err(OrchestratorError::TestsFailed);
        }

        let issue_type = checkpoint
            .issue_type
            .as_deref()
            .and_then(IssueType::parse)
            .unwrap_or(IssueType::Feature);
        let domain = checkpoint.domain.clone().unwrap_or_else(|| "general".to_string());
        let body = pr::build_pr_body(
            issue.number,
            &issue.title,
            &validation,
            &checkpoint.files_modified,
            0,
            cost_usd,
        );

        let url = pr::create_pull_request(
            &worktree_dir,
            &self.config,
            &branch,
            issue.number,
            issue_type,
            &domain,
            &format!("{}: {}", issue_type.as_str(), issue.title),
            &body,
            &checkpoint.files_modified,
        )
        .await?;
        Ok(url)
    }

    /// Record a decision for the completed run. Best-effort.
    async fn auto_record_success(&self, issue: &IssuePayload, checkpoint: &Checkpoint) {
        let args = serde_json::json!({
            "title": format!("Implemented issue #{}", issue.number),
            "context": issue.title,
            "decision": format!(
                "Resolved via automated workflow touching {} file(s)",
                checkpoint.files_modified.len()
            ),
            "scope": "pattern",
            "related_files": checkpoint.files_modified,
        });
        if let Err(e) = kotadb::tools::dispatch(
            &self.tool_ctx,
            kotadb::tools::Toolset::Full,
            "record_decision",
            &args,
        )
        .await
        {
            warn!(error = %e, "auto-record decision failed");
        }
    }

    /// Record the failure so future runs can avoid the approach. Best-effort.
    async fn auto_record_failure(&self, issue: &IssuePayload, error: &OrchestratorError) {
        let args = serde_json::json!({
            "title": format!("Workflow failed for issue #{}", issue.number),
            "problem": issue.title,
            "approach": "automated issue-to-pr workflow",
            "failure_reason": error.to_string(),
        });
        if let Err(e) = kotadb::tools::dispatch(
            &self.tool_ctx,
            kotadb::tools::Toolset::Full,
            "record_failure",
            &args,
        )
        .await
        {
            warn!(error = %e, "auto-record failure failed");
        }
    }
}
