//! Git operations for the orchestrator.
//!
//! Every call spawns git with explicit argv and captured output; nothing is
//! shell-interpolated.

use std::path::Path;
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git command failed: {0}")]
    CommandFailed(String),
    #[error("failed to execute git: {0}")]
    Execution(#[from] std::io::Error),
    #[error("invalid utf-8 in git output")]
    InvalidUtf8,
}

pub type Result<T> = std::result::Result<T, GitError>;

/// Run one git command, returning trimmed stdout on success.
fn run_git(workspace_root: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(workspace_root)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitError::CommandFailed(format!(
            "git {}: {}",
            args.join(" "),
            stderr.trim()
        )));
    }
    String::from_utf8(output.stdout)
        .map(|s| s.trim().to_string())
        .map_err(|_| GitError::InvalidUtf8)
}

/// Detect the default branch: remote HEAD first, then `main`, then `master`.
pub fn detect_default_branch(workspace_root: &Path) -> Result<String> {
    if let Ok(full_ref) = run_git(workspace_root, &["symbolic-ref", "refs/remotes/origin/HEAD"]) {
        if let Some(branch) = full_ref.strip_prefix("refs/remotes/origin/") {
            return Ok(branch.to_string());
        }
    }

    for candidate in ["main", "master"] {
        let check = run_git(
            workspace_root,
            &["rev-parse", "--verify", &format!("refs/heads/{candidate}")],
        );
        if check.is_ok() {
            return Ok(candidate.to_string());
        }
    }
    Ok("main".to_string())
}

/// Check if a branch exists locally.
pub fn branch_exists(workspace_root: &Path, branch: &str) -> Result<bool> {
    let output = Command::new("git")
        .args(["rev-parse", "--verify", &format!("refs/heads/{branch}")])
        .current_dir(workspace_root)
        .output()?;
    Ok(output.status.success())
}

/// Create a branch from base without checking it out.
pub fn create_branch(workspace_root: &Path, branch: &str, base: &str) -> Result<()> {
    run_git(workspace_root, &["branch", branch, base])?;
    Ok(())
}

pub fn delete_branch(workspace_root: &Path, branch: &str, force: bool) -> Result<()> {
    let flag = if force { "-D" } else { "-d" };
    run_git(workspace_root, &["branch", flag, branch])?;
    Ok(())
}

/// Create a worktree at `worktree_path` on `branch`, creating the branch
/// from `base_branch` when needed.
pub fn create_worktree(
    workspace_root: &Path,
    worktree_path: &Path,
    branch: &str,
    base_branch: &str,
) -> Result<()> {
    if let Some(parent) = worktree_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            GitError::CommandFailed(format!("failed to create parent directory: {e}"))
        })?;
    }

    if !branch_exists(workspace_root, branch)? {
        create_branch(workspace_root, branch, base_branch)?;
    }

    run_git(
        workspace_root,
        &[
            "worktree",
            "add",
            worktree_path.to_string_lossy().as_ref(),
            branch,
        ],
    )?;
    Ok(())
}

/// Remove a worktree; `force` discards uncommitted changes.
pub fn remove_worktree(workspace_root: &Path, worktree_path: &Path, force: bool) -> Result<()> {
    let path = worktree_path.to_string_lossy();
    let mut args = vec!["worktree", "remove"];
    if force {
        args.push("--force");
    }
    args.push(path.as_ref());
    run_git(workspace_root, &args)?;
    Ok(())
}

/// Paths of all registered worktrees.
pub fn list_worktrees(workspace_root: &Path) -> Result<Vec<String>> {
    let output = run_git(workspace_root, &["worktree", "list", "--porcelain"])?;
    Ok(output
        .lines()
        .filter_map(|line| line.strip_prefix("worktree "))
        .map(str::to_string)
        .collect())
}

/// Whether the given path is a registered worktree.
pub fn worktree_registered(workspace_root: &Path, worktree_path: &Path) -> Result<bool> {
    let canonical = worktree_path
        .canonicalize()
        .unwrap_or_else(|_| worktree_path.to_path_buf());
    let registered = list_worktrees(workspace_root)?;
    Ok(registered.iter().any(|w| {
        Path::new(w)
            .canonicalize()
            .map(|p| p == canonical)
            .unwrap_or(Path::new(w) == worktree_path)
    }))
}

/// Stage specific paths; on failure fall back to staging everything.
pub fn stage(workspace_root: &Path, paths: &[String]) -> Result<()> {
    if !paths.is_empty() {
        let mut args = vec!["add", "--"];
        for path in paths {
            args.push(path.as_str());
        }
        if run_git(workspace_root, &args).is_ok() {
            return Ok(());
        }
    }
    run_git(workspace_root, &["add", "-A"])?;
    Ok(())
}

/// Create a commit with the given subject; returns false when there was
/// nothing to commit.
pub fn commit(workspace_root: &Path, subject: &str) -> Result<bool> {
    let output = Command::new("git")
        .args(["commit", "-m", subject])
        .current_dir(workspace_root)
        .output()?;
    if output.status.success() {
        return Ok(true);
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stdout.contains("nothing to commit") || stderr.contains("nothing to commit") {
        return Ok(false);
    }
    Err(GitError::CommandFailed(format!(
        "git commit: {}",
        stderr.trim()
    )))
}

/// Push a branch to origin, setting upstream.
pub fn push(workspace_root: &Path, branch: &str) -> Result<()> {
    run_git(workspace_root, &["push", "-u", "origin", branch])?;
    Ok(())
}

/// Names of files changed relative to a base branch.
pub fn changed_files(workspace_root: &Path, base_branch: &str) -> Result<Vec<String>> {
    let output = run_git(
        workspace_root,
        &["diff", "--name-only", &format!("{base_branch}...HEAD")],
    )?;
    Ok(output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
