//! PR module: validation gate, convention scan, commit, push, and the pull
//! request itself.
//!
//! Validation failures block; convention findings are advisory warnings.

use crate::git;
use kota_core::{AdwConfig, IssueType, RetryPolicy};
use serde::Serialize;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PrError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("git error: {0}")]
    Git(#[from] git::GitError),
    #[error("forge CLI failed: {0}")]
    Forge(String),
}

pub type Result<T> = std::result::Result<T, PrError>;

/// Outcome of one validation command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    pub command: String,
    pub success: bool,
    pub exit_code: i32,
}

/// Full validation evidence for the PR body.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub typecheck: CommandOutcome,
    pub tests: CommandOutcome,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.typecheck.success && self.tests.success
    }
}

/// Run one configured command with explicit argv splitting.
fn run_command(working_dir: &Path, command: &str) -> CommandOutcome {
    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
        return CommandOutcome {
            command: command.to_string(),
            success: true,
            exit_code: 0,
        };
    };
    let output = Command::new(program)
        .args(parts)
        .current_dir(working_dir)
        .output();
    match output {
        Ok(output) => CommandOutcome {
            command: command.to_string(),
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
        },
        Err(e) => {
            warn!(command, error = %e, "validation command failed to start");
            CommandOutcome {
                command: command.to_string(),
                success: false,
                exit_code: -1,
            }
        }
    }
}

/// Type-check and tests must pass; conventions only warn.
pub fn run_validation(
    working_dir: &Path,
    config: &AdwConfig,
    modified_files: &[String],
) -> ValidationReport {
    let typecheck = run_command(working_dir, &config.typecheck_cmd);
    let tests = run_command(working_dir, &config.test_cmd);
    let warnings = scan_conventions(working_dir, &config.app_root, modified_files);
    ValidationReport {
        typecheck,
        tests,
        warnings,
    }
}

/// Advisory convention scan over the modified files inside the app root:
/// ad-hoc console prints outside comments, and relative imports deeper
/// than three levels.
pub fn scan_conventions(
    working_dir: &Path,
    app_root: &Path,
    modified_files: &[String],
) -> Vec<String> {
    let mut warnings = Vec::new();
    for file in modified_files {
        if !Path::new(file).starts_with(app_root) {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(working_dir.join(file)) else {
            continue;
        };
        for (idx, line) in content.lines().enumerate() {
            let code = strip_line_comment(line);
            if code.contains("console.") {
                warnings.push(format!("{file}:{}: ad-hoc console print", idx + 1));
            }
            if code.contains("../../../") {
                warnings.push(format!(
                    "{file}:{}: relative import deeper than three levels",
                    idx + 1
                ));
            }
        }
    }
    warnings
}

fn strip_line_comment(line: &str) -> &str {
    match line.find("//") {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Commit subject per convention: `<type>(<domain>): implement issue #<n>`.
pub fn commit_subject(issue_type: IssueType, domain: &str, issue: u64) -> String {
    format!("{}({domain}): implement issue #{issue}", issue_type.as_str())
}

/// PR body with summary, validation evidence, anti-mock declaration,
/// metrics, and the closing reference.
pub fn build_pr_body(
    issue: u64,
    summary: &str,
    validation: &ValidationReport,
    modified_files: &[String],
    duration_ms: u64,
    cost_usd: f64,
) -> String {
    let mut body = String::new();
    body.push_str("## Summary\n\n");
    body.push_str(summary);
    body.push_str("\n\n## Validation Evidence\n\n");
    for outcome in [&validation.typecheck, &validation.tests] {
        let status = if outcome.success { "passed" } else { "FAILED" };
        body.push_str(&format!(
            "- `{}`: {} (exit {})\n",
            outcome.command, status, outcome.exit_code
        ));
    }
    if !validation.warnings.is_empty() {
        body.push_str("\nConvention warnings (advisory):\n");
        for warning in &validation.warnings {
            body.push_str(&format!("- {warning}\n"));
        }
    }

    body.push_str("\n## Anti-Mock Declaration\n\n");
    body.push_str(
        "No mocked behavior was introduced; validation ran against the real commands above.\n",
    );

    body.push_str("\n## Metrics\n\n");
    body.push_str("| Metric | Value |\n|---|---|\n");
    body.push_str(&format!("| Files modified | {} |\n", modified_files.len()));
    body.push_str(&format!("| Duration | {} ms |\n", duration_ms));
    body.push_str(&format!("| Cost | ${cost_usd:.4} |\n"));

    body.push_str("\n## Modified Files\n\n");
    for file in modified_files {
        body.push_str(&format!("- `{file}`\n"));
    }

    body.push_str(&format!("\nCloses #{issue}\n"));
    body
}

/// Stage, commit, push (with transient retry), and open the pull request.
/// Returns the PR URL.
pub async fn create_pull_request(
    worktree: &Path,
    config: &AdwConfig,
    branch: &str,
    issue: u64,
    issue_type: IssueType,
    domain: &str,
    title: &str,
    body: &str,
    modified_files: &[String],
) -> Result<String> {
    git::stage(worktree, modified_files)?;
    let committed = git::commit(worktree, &commit_subject(issue_type, domain, issue))?;
    if !committed {
        info!(issue, "nothing new to commit before PR");
    }

    // Pushes hit the network; retry the transient failures only.
    let policy = RetryPolicy::new(
        config.phase_retries.max(1),
        std::time::Duration::from_secs(u64::from(config.retry_backoff_sec)),
    );
    policy
        .run("git push", || async { git::push(worktree, branch) })
        .await?;

    open_pr(worktree, &config.base_branch, branch, title, body)
}

fn open_pr(
    worktree: &Path,
    base_branch: &str,
    branch: &str,
    title: &str,
    body: &str,
) -> Result<String> {
    let output = Command::new("gh")
        .args([
            "pr",
            "create",
            "--base",
            base_branch,
            "--head",
            branch,
            "--title",
            title,
            "--body",
            body,
        ])
        .current_dir(worktree)
        .output()
        .map_err(|e| PrError::Forge(format!("cannot run gh: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PrError::Forge(format!("gh pr create: {}", stderr.trim())));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let url = stdout
        .lines()
        .rev()
        .find(|line| line.starts_with("http"))
        .unwrap_or("")
        .to_string();
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn commit_subject_format() {
        assert_eq!(
            commit_subject(IssueType::Feature, "auth", 42),
            "feature(auth): implement issue #42"
        );
        assert_eq!(
            commit_subject(IssueType::Bug, "indexing", 7),
            "bug(indexing): implement issue #7"
        );
    }

    #[test]
    fn convention_scan_flags_prints_and_deep_imports() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(
            dir.path().join("src/a.ts"),
            "import x from '../../../deep';\nconsole.log('hi');\n// console.log('fine')\n",
        )
        .unwrap();

        let warnings = scan_conventions(
            dir.path(),
            &PathBuf::from("src"),
            &["src/a.ts".to_string()],
        );
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("deeper than three"));
        assert!(warnings[1].contains("console print"));
    }

    #[test]
    fn files_outside_app_root_are_not_scanned() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("script.ts"), "console.log('x');\n").unwrap();
        let warnings = scan_conventions(
            dir.path(),
            &PathBuf::from("src"),
            &["script.ts".to_string()],
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn pr_body_contains_required_sections() {
        let validation = ValidationReport {
            typecheck: CommandOutcome {
                command: "npm run typecheck".to_string(),
                success: true,
                exit_code: 0,
            },
            tests: CommandOutcome {
                command: "npm test".to_string(),
                success: true,
                exit_code: 0,
            },
            warnings: vec!["src/a.ts:1: ad-hoc console print".to_string()],
        };
        let body = build_pr_body(
            42,
            "Added retry handling.",
            &validation,
            &["src/a.ts".to_string()],
            120_000,
            0.42,
        );
        assert!(body.contains("## Summary"));
        assert!(body.contains("## Validation Evidence"));
        assert!(body.contains("## Anti-Mock Declaration"));
        assert!(body.contains("## Metrics"));
        assert!(body.contains("Closes #42"));
        assert!(body.contains("`npm test`: passed"));
        assert!(body.contains("advisory"));
    }

    #[test]
    fn validation_report_passed_requires_both() {
        let ok = CommandOutcome {
            command: "x".to_string(),
            success: true,
            exit_code: 0,
        };
        let bad = CommandOutcome {
            command: "y".to_string(),
            success: false,
            exit_code: 1,
        };
        assert!(ValidationReport {
            typecheck: ok.clone(),
            tests: ok.clone(),
            warnings: vec![]
        }
        .passed());
        assert!(!ValidationReport {
            typecheck: ok,
            tests: bad,
            warnings: vec![]
        }
        .passed());
    }
}
