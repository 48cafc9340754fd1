//! Unified multi-scope search.
//!
//! Scopes run concurrently; the response aggregates per-scope results,
//! counts, and advisory tips. Filters are scope-specific and silently
//! ignored where irrelevant.

use super::tips::{tips_for, TipInput};
use super::{clamp_limit, repo_for, storage_err, ToolContext};
use kota_core::{DecisionScope, SymbolKind, ToolError};
use serde_json::{json, Value};
use std::collections::BTreeMap;

const DEFAULT_LIMIT: u32 = 20;
const DEFAULT_CONTEXT_LINES: u32 = 3;
const ALL_SCOPES: &[&str] = &["code", "symbols", "decisions", "patterns", "failures"];

pub async fn unified_search(ctx: &ToolContext, args: &Value) -> Result<Value, ToolError> {
    let query = args
        .get("query")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let scopes: Vec<String> = args
        .get("scope")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_else(|| vec!["code".to_string(), "symbols".to_string()]);
    for scope in &scopes {
        if !ALL_SCOPES.contains(&scope.as_str()) {
            return Err(ToolError::invalid(format!("unknown scope: {scope}")));
        }
    }

    let limit = clamp_limit(args, "limit", DEFAULT_LIMIT);
    let context_lines = args
        .get("context_lines")
        .and_then(Value::as_u64)
        .unwrap_or(u64::from(DEFAULT_CONTEXT_LINES)) as u32;

    // Default output: compact when only code is searched, full otherwise.
    let code_only = scopes.iter().all(|s| s == "code");
    let output = args
        .get("output")
        .and_then(Value::as_str)
        .unwrap_or(if code_only { "compact" } else { "full" });

    let filters = args.get("filters").cloned().unwrap_or_else(|| json!({}));
    let repo_filter = filters.get("repository").and_then(Value::as_str);
    let repo = repo_for(ctx, repo_filter).await?;
    let repo_id = repo.as_ref().map(|r| r.id.clone());

    let has = |name: &str| scopes.iter().any(|s| s == name);

    // All selected scopes are issued concurrently.
    let (code, symbols, decisions, patterns, failures) = tokio::join!(
        search_code(ctx, has("code"), query, repo_id.as_ref(), limit, output, context_lines),
        search_symbols(ctx, has("symbols"), query, &filters, repo_id.as_ref(), limit),
        search_decisions(ctx, has("decisions"), query, &filters, repo_id.as_ref(), limit),
        search_patterns(ctx, has("patterns"), query, &filters, repo_id.as_ref(), limit),
        search_failures(ctx, has("failures"), query, repo_id.as_ref(), limit),
    );

    let mut results = serde_json::Map::new();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for (scope, outcome) in [
        ("code", code?),
        ("symbols", symbols?),
        ("decisions", decisions?),
        ("patterns", patterns?),
        ("failures", failures?),
    ] {
        let Some(rows) = outcome else { continue };
        counts.insert(scope.to_string(), rows.len());
        results.insert(scope.to_string(), Value::Array(rows));
    }

    let total: usize = counts.values().sum();
    let repository_count = ctx
        .storage
        .list_repositories()
        .await
        .map(|r| r.len())
        .unwrap_or(0);
    let tips = tips_for(&TipInput {
        query,
        scopes: &scopes,
        counts: counts.clone(),
        has_repository_filter: repo_filter.is_some(),
        repository_count,
    });

    let mut counts_value = serde_json::Map::new();
    counts_value.insert("total".to_string(), json!(total));
    for (scope, count) in &counts {
        counts_value.insert(scope.clone(), json!(count));
    }

    let mut response = json!({
        "results": Value::Object(results),
        "counts": Value::Object(counts_value),
    });
    if !tips.is_empty() {
        response["tips"] = json!(tips);
    }
    Ok(response)
}

async fn search_code(
    ctx: &ToolContext,
    enabled: bool,
    query: &str,
    repo_id: Option<&kota_core::Id>,
    limit: u32,
    output: &str,
    context_lines: u32,
) -> Result<Option<Vec<Value>>, ToolError> {
    if !enabled {
        return Ok(None);
    }
    let files = ctx
        .storage
        .search_files(query, repo_id, limit)
        .await
        .map_err(storage_err)?;

    let mut rows = Vec::with_capacity(files.len());
    for file in &files {
        let row = match output {
            "paths" => json!(file.path),
            "compact" => json!({
                "path": file.path,
                "language": file.language,
                "indexed_at": file.indexed_at.to_rfc3339(),
            }),
            "snippet" => json!({
                "path": file.path,
                "matches": snippet_matches(file.content.as_deref().unwrap_or(""), query, context_lines),
            }),
            _ => {
                let dependencies: Vec<String> = ctx
                    .storage
                    .references_for_file(&file.id)
                    .await
                    .map_err(storage_err)?
                    .into_iter()
                    .filter_map(|r| r.target_file_path)
                    .collect();
                json!({
                    "path": file.path,
                    "language": file.language,
                    "indexed_at": file.indexed_at.to_rfc3339(),
                    "snippet": first_match_line(file.content.as_deref().unwrap_or(""), query),
                    "dependencies": dependencies,
                })
            }
        };
        rows.push(row);
    }
    Ok(Some(rows))
}

async fn search_symbols(
    ctx: &ToolContext,
    enabled: bool,
    query: &str,
    filters: &Value,
    repo_id: Option<&kota_core::Id>,
    limit: u32,
) -> Result<Option<Vec<Value>>, ToolError> {
    if !enabled {
        return Ok(None);
    }
    let kinds: Vec<SymbolKind> = filters
        .get("kinds")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(SymbolKind::parse)
                .collect()
        })
        .unwrap_or_default();
    let exported_only = filters
        .get("exported_only")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let hits = ctx
        .storage
        .search_symbols(query, &kinds, exported_only, repo_id, limit)
        .await
        .map_err(storage_err)?;
    let rows = hits
        .iter()
        .map(|hit| {
            json!({
                "name": hit.symbol.name,
                "kind": hit.symbol.kind.as_str(),
                "location": {
                    "file": hit.file_path,
                    "line_start": hit.symbol.line_start,
                    "line_end": hit.symbol.line_end,
                },
                "signature": hit.symbol.signature,
                "is_exported": hit.symbol.metadata.get("is_exported").cloned().unwrap_or(json!(false)),
            })
        })
        .collect();
    Ok(Some(rows))
}

async fn search_decisions(
    ctx: &ToolContext,
    enabled: bool,
    query: &str,
    filters: &Value,
    repo_id: Option<&kota_core::Id>,
    limit: u32,
) -> Result<Option<Vec<Value>>, ToolError> {
    if !enabled {
        return Ok(None);
    }
    let scope = filters
        .get("scope")
        .and_then(Value::as_str)
        .and_then(DecisionScope::parse);
    let hits = ctx
        .storage
        .search_decisions(query, scope, repo_id, limit)
        .await
        .map_err(storage_err)?;
    let rows = hits
        .iter()
        .map(|hit| {
            json!({
                "title": hit.decision.title,
                "decision": hit.decision.decision,
                "scope": hit.decision.scope.as_str(),
                "relevance": hit.relevance,
                "related_files": hit.decision.related_files,
            })
        })
        .collect();
    Ok(Some(rows))
}

async fn search_patterns(
    ctx: &ToolContext,
    enabled: bool,
    _query: &str,
    filters: &Value,
    repo_id: Option<&kota_core::Id>,
    limit: u32,
) -> Result<Option<Vec<Value>>, ToolError> {
    if !enabled {
        return Ok(None);
    }
    let pattern_type = filters.get("pattern_type").and_then(Value::as_str);
    let file = filters.get("file").and_then(Value::as_str);
    let patterns = ctx
        .storage
        .search_patterns(pattern_type, file, repo_id, limit)
        .await
        .map_err(storage_err)?;
    let rows = patterns
        .iter()
        .map(|p| {
            json!({
                "pattern_type": p.pattern_type,
                "description": p.description,
                "file_path": p.file_path,
                "created_at": p.created_at.to_rfc3339(),
            })
        })
        .collect();
    Ok(Some(rows))
}

async fn search_failures(
    ctx: &ToolContext,
    enabled: bool,
    query: &str,
    repo_id: Option<&kota_core::Id>,
    limit: u32,
) -> Result<Option<Vec<Value>>, ToolError> {
    if !enabled {
        return Ok(None);
    }
    let hits = ctx
        .storage
        .search_failures(query, repo_id, limit)
        .await
        .map_err(storage_err)?;
    let rows = hits
        .iter()
        .map(|hit| {
            json!({
                "title": hit.failure.title,
                "problem": hit.failure.problem,
                "failure_reason": hit.failure.failure_reason,
                "relevance": hit.relevance,
            })
        })
        .collect();
    Ok(Some(rows))
}

/// First line containing the term, for the full output mode.
fn first_match_line(content: &str, term: &str) -> Option<String> {
    let lower = term.to_lowercase();
    content
        .lines()
        .find(|line| line.to_lowercase().contains(&lower))
        .map(|line| line.trim().to_string())
}

/// Up to five match lines, each with the surrounding context window
/// truncated at file bounds.
fn snippet_matches(content: &str, term: &str, context_lines: u32) -> Vec<Value> {
    let lower = term.to_lowercase();
    let lines: Vec<&str> = content.lines().collect();
    let mut matches = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        if !line.to_lowercase().contains(&lower) {
            continue;
        }
        let start = idx.saturating_sub(context_lines as usize);
        let end = (idx + context_lines as usize).min(lines.len().saturating_sub(1));
        let window: Vec<String> = lines[start..=end].iter().map(|l| (*l).to_string()).collect();
        matches.push(json!({
            "line": idx + 1,
            "text": window,
        }));
        if matches.len() >= 5 {
            break;
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_window_truncates_at_file_bounds() {
        let content = "one\ntwo target\nthree\nfour\n";
        let matches = snippet_matches(content, "target", 3);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["line"], json!(2));
        // Window is clipped to the file: lines 1..=4.
        assert_eq!(
            matches[0]["text"],
            json!(["one", "two target", "three", "four"])
        );
    }

    #[test]
    fn snippet_zero_context_is_match_line_only() {
        let matches = snippet_matches("a\nb target\nc\n", "target", 0);
        assert_eq!(matches[0]["text"], json!(["b target"]));
    }

    #[test]
    fn first_match_line_is_case_insensitive() {
        assert_eq!(
            first_match_line("alpha\nThe Target here\n", "target").as_deref(),
            Some("The Target here")
        );
        assert_eq!(first_match_line("alpha\n", "target"), None);
    }
}
