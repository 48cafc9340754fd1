//! Inter-phase context curation.
//!
//! After each phase a cheaper model distills what the next phase needs into
//! a compact structured summary, stored in the workflow context table and
//! injected into the next prompt. Curation failure never fails the run.

use crate::agent::{AgentInvoker, AgentRequest};
use crate::phases::AdwPhase;
use kotadb::tools::{self, ToolContext, Toolset};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Upper bound on context injected into the next phase's prompt.
pub const MAX_INJECTED_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum CuratorError {
    #[error("curator agent failed: {0}")]
    Agent(#[from] crate::agent::AgentError),
    #[error("curator output unparseable: {0}")]
    Parse(String),
    #[error("context store failed: {0}")]
    Store(String),
}

/// The curated summary shape stored per `(workflow, phase)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CuratorSummary {
    pub summary: String,
    pub relevant_failures: Vec<String>,
    pub relevant_patterns: Vec<String>,
    pub relevant_decisions: Vec<String>,
    pub code_intelligence: String,
}

/// Run the curator after `phase` and persist the summary under its key.
pub async fn curate<A: AgentInvoker>(
    ctx: &ToolContext,
    agent: &A,
    workspace_root: &Path,
    workflow_id: &str,
    phase: AdwPhase,
    phase_output: &str,
) -> Result<CuratorSummary, CuratorError> {
    let Some(context_phase) = phase.context_phase() else {
        return Ok(CuratorSummary::default());
    };

    let memory = gather_memory(ctx, phase_output).await;
    let prompt = curator_prompt(phase, phase_output, &memory);
    let request = AgentRequest {
        prompt,
        // Memory and code-intelligence tools only.
        allowed_tools: vec![
            "mcp__kotadb__search".to_string(),
            "mcp__kotadb__generate_task_context".to_string(),
            "mcp__kotadb__search_dependencies".to_string(),
            "mcp__kotadb__analyze_change_impact".to_string(),
            "mcp__kotadb__get_recent_patterns".to_string(),
        ],
        working_dir: workspace_root.to_path_buf(),
    };

    let result = agent.invoke(&request).await?;
    let summary = parse_summary(&result.output)?;

    let mut payload = serde_json::to_value(&summary).unwrap_or_default();
    payload["phase"] = json!(context_phase.as_str());
    tools::validate_context_payload(context_phase, &payload)
        .map_err(|e| CuratorError::Store(e.to_string()))?;
    ctx.storage
        .store_context(workflow_id, context_phase, &payload)
        .await
        .map_err(|e| CuratorError::Store(e.to_string()))?;

    Ok(summary)
}

/// Load the curated context feeding `phase`, rendered and capped for the
/// prompt. Missing context is simply absent.
pub async fn injected_context(
    ctx: &ToolContext,
    workflow_id: &str,
    phase: AdwPhase,
) -> Option<String> {
    let source = phase.context_source()?;
    let rows = ctx
        .storage
        .get_contexts(workflow_id, Some(source))
        .await
        .ok()?;
    let row = rows.into_iter().next()?;
    let summary: CuratorSummary = serde_json::from_value(row.context_data).ok()?;
    Some(render_for_prompt(&summary))
}

/// Human-readable rendering of a summary, capped at `MAX_INJECTED_CHARS`.
pub fn render_for_prompt(summary: &CuratorSummary) -> String {
    let mut text = summary.summary.clone();
    for (label, items) in [
        ("Known failures", &summary.relevant_failures),
        ("Patterns", &summary.relevant_patterns),
        ("Decisions", &summary.relevant_decisions),
    ] {
        if items.is_empty() {
            continue;
        }
        text.push_str(&format!("\n{label}:\n"));
        for item in items {
            text.push_str(&format!("- {item}\n"));
        }
    }
    if !summary.code_intelligence.is_empty() {
        text.push_str("\nCode intelligence:\n");
        text.push_str(&summary.code_intelligence);
    }

    if text.len() > MAX_INJECTED_CHARS {
        let mut cut = MAX_INJECTED_CHARS;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

/// Pre-gather memory hits so the curator starts from concrete material.
async fn gather_memory(ctx: &ToolContext, topic: &str) -> Value {
    let args = json!({
        "query": topic.chars().take(200).collect::<String>(),
        "scope": ["decisions", "patterns", "failures"],
        "limit": 5,
    });
    match tools::dispatch(ctx, Toolset::Full, "search", &args).await {
        Ok(results) => results,
        Err(e) => {
            warn!(error = %e, "curator memory gathering failed");
            json!({})
        }
    }
}

fn curator_prompt(phase: AdwPhase, phase_output: &str, memory: &Value) -> String {
    format!(
        "You are curating context between automation phases. The '{}' phase \
         just finished. Summarize, in at most 500 tokens, what the next phase \
         must know.\n\nPhase output:\n{}\n\nStored memory hits:\n{}\n\n\
         Answer with a single JSON object:\n\
         {{\"summary\": str, \"relevantFailures\": [str], \"relevantPatterns\": [str], \
         \"relevantDecisions\": [str], \"codeIntelligence\": str}}\n",
        phase.as_str(),
        truncate(phase_output, 6000),
        truncate(&memory.to_string(), 4000),
    )
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut cut = max;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text[..cut].to_string()
}

/// Parse the curator's JSON object out of possibly chatty output.
pub fn parse_summary(output: &str) -> Result<CuratorSummary, CuratorError> {
    let start = output
        .find('{')
        .ok_or_else(|| CuratorError::Parse("no JSON object in output".to_string()))?;
    let end = output
        .rfind('}')
        .ok_or_else(|| CuratorError::Parse("no JSON object in output".to_string()))?;
    if end < start {
        return Err(CuratorError::Parse("malformed JSON bounds".to_string()));
    }
    serde_json::from_str(&output[start..=end]).map_err(|e| CuratorError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_summary_tolerates_prose_around_json() {
        let output = "Here you go:\n{\"summary\": \"retry exists\", \"relevantFailures\": [\"mocked push\"], \"relevantPatterns\": [], \"relevantDecisions\": [], \"codeIntelligence\": \"a.ts -> b.ts\"}\nDone.";
        let summary = parse_summary(output).unwrap();
        assert_eq!(summary.summary, "retry exists");
        assert_eq!(summary.relevant_failures, vec!["mocked push"]);
    }

    #[test]
    fn parse_summary_defaults_missing_fields() {
        let summary = parse_summary("{\"summary\": \"short\"}").unwrap();
        assert!(summary.relevant_patterns.is_empty());
        assert!(summary.code_intelligence.is_empty());
    }

    #[test]
    fn parse_summary_rejects_non_json() {
        assert!(parse_summary("no braces at all").is_err());
    }

    #[test]
    fn render_caps_injected_context() {
        let summary = CuratorSummary {
            summary: "s".repeat(5000),
            ..CuratorSummary::default()
        };
        let rendered = render_for_prompt(&summary);
        assert!(rendered.len() <= MAX_INJECTED_CHARS);
    }

    #[test]
    fn render_lists_memory_sections() {
        let summary = CuratorSummary {
            summary: "do the thing".to_string(),
            relevant_failures: vec!["mocking git broke push".to_string()],
            relevant_patterns: vec!["auth:session".to_string()],
            relevant_decisions: vec![],
            code_intelligence: "b.ts has 3 dependents".to_string(),
        };
        let rendered = render_for_prompt(&summary);
        assert!(rendered.contains("Known failures"));
        assert!(rendered.contains("auth:session"));
        assert!(rendered.contains("3 dependents"));
        assert!(!rendered.contains("Decisions"));
    }
}
