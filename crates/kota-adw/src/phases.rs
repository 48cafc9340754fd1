//! Phase definitions: prompts, tool scoping, and output parsing.
//!
//! Each phase is one agent invocation. Outputs are parsed from labeled
//! sections of the agent's prose, never from assumed formatting.

use kota_core::sections::{extract_list_section, extract_section};
use kota_core::{IssueType, WorkflowPhase};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("issue fetch failed: {0}")]
    IssueFetch(String),
    #[error("unparseable {phase} output: {reason}")]
    Parse { phase: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, PhaseError>;

/// Orchestrator phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdwPhase {
    Analysis,
    Plan,
    Build,
    Improve,
    Pr,
}

impl AdwPhase {
    pub const ALL: [Self; 5] = [
        Self::Analysis,
        Self::Plan,
        Self::Build,
        Self::Improve,
        Self::Pr,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Plan => "plan",
            Self::Build => "build",
            Self::Improve => "improve",
            Self::Pr => "pr",
        }
    }

    /// The context-store key this phase writes under; `pr` writes none.
    pub fn context_phase(self) -> Option<WorkflowPhase> {
        match self {
            Self::Analysis => Some(WorkflowPhase::Analysis),
            Self::Plan => Some(WorkflowPhase::Plan),
            Self::Build => Some(WorkflowPhase::Build),
            Self::Improve => Some(WorkflowPhase::Improve),
            Self::Pr => None,
        }
    }

    /// The phase whose curated context feeds this one.
    pub fn context_source(self) -> Option<WorkflowPhase> {
        match self {
            Self::Analysis => None,
            Self::Plan => Some(WorkflowPhase::Analysis),
            Self::Build => Some(WorkflowPhase::Plan),
            Self::Improve | Self::Pr => Some(WorkflowPhase::Build),
        }
    }

    /// Tool scope handed to the phase agent.
    pub fn allowed_tools(self) -> Vec<String> {
        let tools: &[&str] = match self {
            Self::Analysis | Self::Plan => &[
                "Read",
                "Grep",
                "Glob",
                "mcp__kotadb__search",
                "mcp__kotadb__search_dependencies",
                "mcp__kotadb__generate_task_context",
                "mcp__kotadb__get_domain_key_files",
            ],
            Self::Build => &["Read", "Grep", "Glob", "Edit", "Write", "Bash"],
            Self::Improve => &[
                "Read",
                "Write",
                "mcp__kotadb__get_recent_patterns",
                "mcp__kotadb__sync_expertise",
            ],
            Self::Pr => &[],
        };
        tools.iter().map(|t| (*t).to_string()).collect()
    }
}

/// Issue payload consumed by the analysis phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuePayload {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<IssueLabel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueLabel {
    pub name: String,
}

/// Fetch an issue via the forge CLI (`gh issue view --json ...`).
pub fn fetch_issue(workspace_root: &Path, number: u64) -> Result<IssuePayload> {
    let output = Command::new("gh")
        .args([
            "issue",
            "view",
            &number.to_string(),
            "--json",
            "number,title,body,labels",
        ])
        .current_dir(workspace_root)
        .output()
        .map_err(|e| PhaseError::IssueFetch(format!("cannot run gh: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PhaseError::IssueFetch(stderr.trim().to_string()));
    }
    parse_issue_json(&String::from_utf8_lossy(&output.stdout))
}

/// Read the same JSON payload from disk (offline runs and tests).
pub fn read_issue_file(path: &Path) -> Result<IssuePayload> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| PhaseError::IssueFetch(format!("cannot read issue file: {e}")))?;
    parse_issue_json(&content)
}

fn parse_issue_json(raw: &str) -> Result<IssuePayload> {
    serde_json::from_str(raw).map_err(|e| PhaseError::IssueFetch(format!("invalid issue JSON: {e}")))
}

/// Output of the analysis phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub domain: String,
    pub issue_type: IssueType,
    pub requirements: String,
}

pub fn analysis_prompt(issue: &IssuePayload, context: Option<&str>) -> String {
    let labels: Vec<&str> = issue.labels.iter().map(|l| l.name.as_str()).collect();
    let mut prompt = format!(
        "Analyze this issue and answer with labeled sections.\n\n\
         Issue #{}: {}\nLabels: {}\n\n{}\n\n\
         Answer with exactly these sections:\n\
         Domain: <one word domain, e.g. auth, api, indexing>\n\
         Issue Type: <feature|bug|chore|refactor>\n\
         Requirements:\n<bulleted list of concrete requirements>\n",
        issue.number,
        issue.title,
        labels.join(", "),
        issue.body,
    );
    if let Some(context) = context {
        prompt.push_str("\nCarried context:\n");
        prompt.push_str(context);
    }
    prompt
}

pub fn parse_analysis_output(text: &str) -> Result<AnalysisOutput> {
    let domain = extract_section(text, "Domain").ok_or(PhaseError::Parse {
        phase: "analysis",
        reason: "missing Domain section".to_string(),
    })?;
    let issue_type = extract_section(text, "Issue Type")
        .and_then(|raw| IssueType::parse(&raw))
        .ok_or(PhaseError::Parse {
            phase: "analysis",
            reason: "missing or invalid Issue Type section".to_string(),
        })?;
    let requirements = extract_section(text, "Requirements").ok_or(PhaseError::Parse {
        phase: "analysis",
        reason: "missing Requirements section".to_string(),
    })?;

    Ok(AnalysisOutput {
        domain: domain.split_whitespace().next().unwrap_or("general").to_lowercase(),
        issue_type,
        requirements,
    })
}

pub fn plan_prompt(issue: &IssuePayload, analysis: &AnalysisOutput, context: Option<&str>) -> String {
    let mut prompt = format!(
        "Write an implementation specification for issue #{} ({}, domain {}).\n\n\
         Requirements:\n{}\n\n\
         Save the specification as a markdown document and answer with:\n\
         Spec Path: <absolute path to the document>\n",
        issue.number,
        analysis.issue_type.as_str(),
        analysis.domain,
        analysis.requirements,
    );
    if let Some(context) = context {
        prompt.push_str("\nCarried context:\n");
        prompt.push_str(context);
    }
    prompt
}

pub fn parse_plan_output(text: &str) -> Result<PathBuf> {
    if let Some(path) = extract_section(text, "Spec Path").or_else(|| extract_section(text, "Spec"))
    {
        let trimmed = path.trim().trim_matches('`');
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }
    // Fallback: last absolute markdown path in the output.
    text.split_whitespace()
        .filter(|tok| tok.starts_with('/') && tok.ends_with(".md"))
        .next_back()
        .map(PathBuf::from)
        .ok_or(PhaseError::Parse {
            phase: "plan",
            reason: "no spec path in output".to_string(),
        })
}

pub fn build_prompt(spec_path: &Path, context: Option<&str>) -> String {
    let mut prompt = format!(
        "Implement the specification at {} in the current working tree.\n\
         Follow the repository's conventions. Do not invent mock behavior.\n\n\
         When done, answer with:\n\
         Modified Files:\n- <repo-relative path>\n",
        spec_path.display(),
    );
    if let Some(context) = context {
        prompt.push_str("\nCarried context:\n");
        prompt.push_str(context);
    }
    prompt
}

pub fn parse_build_output(text: &str) -> Result<Vec<String>> {
    let files = extract_list_section(text, "Modified Files");
    if files.is_empty() {
        return Err(PhaseError::Parse {
            phase: "build",
            reason: "no Modified Files section".to_string(),
        });
    }
    Ok(files)
}

pub fn improve_prompt(domain: &str, context: Option<&str>) -> String {
    let mut prompt = format!(
        "Review the just-completed change in domain '{domain}' and update the \
         expertise documents under .kotadb/expertise/{domain}/ with anything a \
         future implementer should know. Keep each document short.\n",
    );
    if let Some(context) = context {
        prompt.push_str("\nCarried context:\n");
        prompt.push_str(context);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue() -> IssuePayload {
        IssuePayload {
            number: 42,
            title: "Login retries missing".to_string(),
            body: "Retries never happen on 429.".to_string(),
            labels: vec![IssueLabel {
                name: "bug".to_string(),
            }],
        }
    }

    #[test]
    fn phase_order_and_context_wiring() {
        assert_eq!(AdwPhase::ALL[0], AdwPhase::Analysis);
        assert_eq!(AdwPhase::ALL[4], AdwPhase::Pr);
        assert_eq!(AdwPhase::Pr.context_phase(), None);
        assert_eq!(
            AdwPhase::Build.context_source(),
            Some(WorkflowPhase::Plan)
        );
        assert_eq!(AdwPhase::Analysis.context_source(), None);
    }

    #[test]
    fn analysis_output_parses_labeled_sections() {
        let text = "Domain: auth\nIssue Type: bug\nRequirements:\n- retry on 429\n- log attempts\n";
        let parsed = parse_analysis_output(text).unwrap();
        assert_eq!(parsed.domain, "auth");
        assert_eq!(parsed.issue_type, IssueType::Bug);
        assert!(parsed.requirements.contains("retry on 429"));
    }

    #[test]
    fn analysis_missing_section_is_parse_error() {
        let err = parse_analysis_output("Domain: auth\n").unwrap_err();
        assert!(matches!(err, PhaseError::Parse { phase: "analysis", .. }));
    }

    #[test]
    fn plan_output_prefers_labeled_path() {
        let text = "Wrote the plan.\nSpec Path: /tmp/specs/issue-42.md\n";
        assert_eq!(
            parse_plan_output(text).unwrap(),
            PathBuf::from("/tmp/specs/issue-42.md")
        );
    }

    #[test]
    fn plan_output_falls_back_to_last_md_path() {
        let text = "Considered /tmp/a.md then settled on /tmp/b.md";
        assert_eq!(parse_plan_output(text).unwrap(), PathBuf::from("/tmp/b.md"));
        assert!(parse_plan_output("no path here").is_err());
    }

    #[test]
    fn build_output_lists_modified_files() {
        let text = "Done.\nModified Files:\n- src/auth/login.ts\n- src/auth/session.ts\n";
        assert_eq!(
            parse_build_output(text).unwrap(),
            vec!["src/auth/login.ts", "src/auth/session.ts"]
        );
    }

    #[test]
    fn issue_json_round_trip() {
        let raw = r#"{"number": 42, "title": "t", "body": "b", "labels": [{"name": "bug"}]}"#;
        let parsed = parse_issue_json(raw).unwrap();
        assert_eq!(parsed.number, 42);
        assert_eq!(parsed.labels[0].name, "bug");
    }

    #[test]
    fn prompts_embed_carried_context() {
        let analysis = AnalysisOutput {
            domain: "auth".to_string(),
            issue_type: IssueType::Bug,
            requirements: "- retry".to_string(),
        };
        let prompt = plan_prompt(&issue(), &analysis, Some("prior failures: none"));
        assert!(prompt.contains("Carried context"));
        assert!(prompt.contains("prior failures: none"));
    }

    #[test]
    fn build_phase_gets_edit_tools_analysis_does_not() {
        assert!(AdwPhase::Build.allowed_tools().iter().any(|t| t == "Edit"));
        assert!(!AdwPhase::Analysis.allowed_tools().iter().any(|t| t == "Edit"));
    }
}
