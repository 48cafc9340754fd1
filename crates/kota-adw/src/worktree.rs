//! Per-issue worktree lifecycle.
//!
//! Each workflow gets an isolated checkout at `.worktrees/<issue>-<ts>` on a
//! fresh `automation/<issue>-<ts>` branch forked from the base branch.

use crate::git;
use chrono::{SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error("git error: {0}")]
    Git(#[from] git::GitError),
}

pub type Result<T> = std::result::Result<T, WorktreeError>;

/// An isolated per-issue checkout.
#[derive(Debug, Clone)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: String,
}

/// Filesystem-safe timestamp: ISO-8601 with `:` replaced by `-`.
pub fn timestamp_slug() -> String {
    Utc::now()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
        .replace(':', "-")
}

/// The worktree path for one issue at one timestamp.
pub fn worktree_path(workspace_root: &Path, issue: u64, timestamp: &str) -> PathBuf {
    workspace_root
        .join(".worktrees")
        .join(format!("{issue}-{timestamp}"))
}

/// Create the worktree and branch for an issue.
pub fn create(workspace_root: &Path, issue: u64, base_branch: &str) -> Result<WorktreeInfo> {
    let timestamp = timestamp_slug();
    let path = worktree_path(workspace_root, issue, &timestamp);
    let branch = format!("automation/{issue}-{timestamp}");

    git::create_worktree(workspace_root, &path, &branch, base_branch)?;
    Ok(WorktreeInfo { path, branch })
}

/// Best-effort removal. A worktree that is not registered is a no-op.
pub fn remove(
    workspace_root: &Path,
    info: &WorktreeInfo,
    force: bool,
    remove_branch: bool,
) -> Result<()> {
    if git::worktree_registered(workspace_root, &info.path)? {
        if let Err(e) = git::remove_worktree(workspace_root, &info.path, force) {
            warn!(worktree = %info.path.display(), error = %e, "worktree removal failed");
            return Err(e.into());
        }
    }

    if remove_branch {
        if let Err(e) = git::delete_branch(workspace_root, &info.branch, force) {
            warn!(branch = %info.branch, error = %e, "branch removal failed");
        }
    }
    Ok(())
}
