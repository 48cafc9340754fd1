//! Tool surface: a fixed catalog of named operations with JSON schemas,
//! tier filtering, parameter validation, and dispatch.
//!
//! Tools convert internal errors into the shared taxonomy; they never leak
//! stack traces. NotFound-style conditions return empty results plus a
//! message field rather than raising.

pub mod schema;
pub mod search;
pub mod tips;

use crate::domains::DomainRules;
use crate::extract::ExtractOptions;
use crate::guard;
use crate::indexer::{self, IndexError};
use crate::query::{self, Direction, QueryError};
use crate::storage::{
    DecisionInsert, FailureInsert, PatternUpsert, Storage, StorageError,
};
use crate::sync::{self, SyncError};
use kota_core::{
    DecisionScope, InsightKind, KotaConfig, ReferenceKind, Repository, ToolError, WorkflowPhase,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Shared context threaded through every tool handler.
pub struct ToolContext {
    pub storage: Arc<Storage>,
    pub config: KotaConfig,
    pub rules: DomainRules,
}

/// Coarse grouping used by the tier filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Core,
    Sync,
    Memory,
    Expertise,
}

/// Caller-selected toolset; invalid tools are hidden and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Toolset {
    Core,
    #[default]
    Default,
    Memory,
    Full,
}

impl Toolset {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "core" => Self::Core,
            "default" => Self::Default,
            "memory" => Self::Memory,
            "full" => Self::Full,
            _ => return None,
        })
    }

    pub fn allows(self, tier: Tier) -> bool {
        match self {
            Self::Core => tier == Tier::Core,
            Self::Default => matches!(tier, Tier::Core | Tier::Sync),
            Self::Memory => matches!(tier, Tier::Core | Tier::Sync | Tier::Memory),
            Self::Full => true,
        }
    }
}

/// One entry of the tool catalog.
#[derive(Debug, Clone)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub tier: Tier,
    pub input_schema: Value,
}

/// The tier-filtered catalog, in registration order.
pub fn catalog(toolset: Toolset) -> Vec<ToolDef> {
    all_tools()
        .into_iter()
        .filter(|tool| toolset.allows(tool.tier))
        .collect()
}

fn all_tools() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "search",
            description: "Multi-scope search over code, symbols, decisions, patterns, and failures.",
            tier: Tier::Core,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "scope": {"type": "array", "items": {"type": "string", "enum": ["code", "symbols", "decisions", "patterns", "failures"]}},
                    "filters": {"type": "object"},
                    "limit": {"type": "number", "minimum": 1},
                    "output": {"type": "string", "enum": ["full", "paths", "compact", "snippet"]},
                    "context_lines": {"type": "number", "minimum": 0, "maximum": 10}
                },
                "required": ["query"]
            }),
        },
        ToolDef {
            name: "index_repository",
            description: "Index a local working tree into the knowledge base (full index).",
            tier: Tier::Core,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "repository": {"type": "string"},
                    "ref": {"type": "string"},
                    "localPath": {"type": "string"}
                },
                "required": ["repository"]
            }),
        },
        ToolDef {
            name: "list_recent_files",
            description: "Most recently indexed files.",
            tier: Tier::Core,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "limit": {"type": "number", "minimum": 1},
                    "repository": {"type": "string"}
                }
            }),
        },
        ToolDef {
            name: "search_dependencies",
            description: "Traverse the file dependency graph from a file, with cycle reporting.",
            tier: Tier::Core,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string"},
                    "direction": {"type": "string", "enum": ["dependents", "dependencies", "both"]},
                    "depth": {"type": "number", "minimum": 1, "maximum": 5},
                    "include_tests": {"type": "boolean"},
                    "reference_types": {"type": "array", "items": {"type": "string", "enum": ["import", "re_export", "export_all", "dynamic_import"]}},
                    "repository": {"type": "string"}
                },
                "required": ["file_path"]
            }),
        },
        ToolDef {
            name: "analyze_change_impact",
            description: "Estimate the blast radius of changing a file from its dependents.",
            tier: Tier::Core,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string"},
                    "repository": {"type": "string"}
                },
                "required": ["file_path"]
            }),
        },
        ToolDef {
            name: "validate_implementation_spec",
            description: "Check that file paths mentioned in a spec document resolve to indexed files.",
            tier: Tier::Core,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "spec_path": {"type": "string"},
                    "repository": {"type": "string"}
                },
                "required": ["spec_path"]
            }),
        },
        ToolDef {
            name: "generate_task_context",
            description: "Aggregate relevant files, symbols, decisions, and patterns for a task.",
            tier: Tier::Core,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "task": {"type": "string"},
                    "repository": {"type": "string"},
                    "max_chars": {"type": "number", "minimum": 200}
                },
                "required": ["task"]
            }),
        },
        ToolDef {
            name: "get_domain_key_files",
            description: "Files with the highest inbound-dependent count within a domain.",
            tier: Tier::Core,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "domain": {"type": "string"},
                    "limit": {"type": "number", "minimum": 1},
                    "repository": {"type": "string"}
                },
                "required": ["domain"]
            }),
        },
        ToolDef {
            name: "kota_sync_export",
            description: "Export changed tables as JSONL with a deletion manifest.",
            tier: Tier::Sync,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "force": {"type": "boolean"},
                    "export_dir": {"type": "string"}
                }
            }),
        },
        ToolDef {
            name: "kota_sync_import",
            description: "Import a JSONL export directory, applying deletions first.",
            tier: Tier::Sync,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "import_dir": {"type": "string"}
                }
            }),
        },
        ToolDef {
            name: "record_decision",
            description: "Record an architectural or tactical decision.",
            tier: Tier::Memory,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "context": {"type": "string"},
                    "decision": {"type": "string"},
                    "scope": {"type": "string", "enum": ["architecture", "pattern", "convention", "workaround"]},
                    "rationale": {"type": "string"},
                    "alternatives": {"type": "array", "items": {"type": "string"}},
                    "related_files": {"type": "array", "items": {"type": "string"}},
                    "repository": {"type": "string"}
                },
                "required": ["title", "context", "decision", "scope"]
            }),
        },
        ToolDef {
            name: "record_failure",
            description: "Record a failed approach so it is not repeated.",
            tier: Tier::Memory,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "problem": {"type": "string"},
                    "approach": {"type": "string"},
                    "failure_reason": {"type": "string"},
                    "related_files": {"type": "array", "items": {"type": "string"}},
                    "repository": {"type": "string"}
                },
                "required": ["title", "problem", "approach", "failure_reason"]
            }),
        },
        ToolDef {
            name: "record_insight",
            description: "Record a lightweight session observation.",
            tier: Tier::Memory,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "content": {"type": "string"},
                    "insight_type": {"type": "string", "enum": ["discovery", "failure", "workaround"]},
                    "session_id": {"type": "string"},
                    "related_file": {"type": "string"}
                },
                "required": ["content", "insight_type"]
            }),
        },
        ToolDef {
            name: "get_recent_patterns",
            description: "Most recently recorded patterns, optionally filtered by type prefix.",
            tier: Tier::Memory,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "pattern_type": {"type": "string"},
                    "limit": {"type": "number", "minimum": 1}
                }
            }),
        },
        ToolDef {
            name: "validate_expertise",
            description: "Report stored patterns whose expertise document is missing on disk.",
            tier: Tier::Expertise,
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDef {
            name: "sync_expertise",
            description: "Upsert patterns from the expertise document directory.",
            tier: Tier::Expertise,
            input_schema: json!({"type": "object", "properties": {}}),
        },
    ]
}

/// Dispatch one tool call: tier check, schema validation, then the handler.
pub async fn dispatch(
    ctx: &ToolContext,
    toolset: Toolset,
    name: &str,
    args: &Value,
) -> Result<Value, ToolError> {
    let Some(tool) = all_tools().into_iter().find(|t| t.name == name) else {
        return Err(ToolError::NotFound(format!("unknown tool: {name}")));
    };
    if !toolset.allows(tool.tier) {
        return Err(ToolError::NotFound(format!(
            "tool {name} is not available in this toolset"
        )));
    }
    schema::validate(&tool.input_schema, args)?;

    match name {
        "search" => search::unified_search(ctx, args).await,
        "index_repository" => tool_index_repository(ctx, args).await,
        "list_recent_files" => tool_list_recent_files(ctx, args).await,
        "search_dependencies" => tool_search_dependencies(ctx, args).await,
        "analyze_change_impact" => tool_analyze_change_impact(ctx, args).await,
        "validate_implementation_spec" => tool_validate_spec(ctx, args).await,
        "generate_task_context" => tool_generate_task_context(ctx, args).await,
        "get_domain_key_files" => tool_domain_key_files(ctx, args).await,
        "kota_sync_export" => tool_sync_export(ctx, args).await,
        "kota_sync_import" => tool_sync_import(ctx, args).await,
        "record_decision" => tool_record_decision(ctx, args).await,
        "record_failure" => tool_record_failure(ctx, args).await,
        "record_insight" => tool_record_insight(ctx, args).await,
        "get_recent_patterns" => tool_recent_patterns(ctx, args).await,
        "validate_expertise" => tool_validate_expertise(ctx, args).await,
        "sync_expertise" => tool_sync_expertise(ctx, args).await,
        other => Err(ToolError::NotFound(format!("unknown tool: {other}"))),
    }
}

// --- Error mapping ---

pub(crate) fn storage_err(e: StorageError) -> ToolError {
    match e {
        StorageError::RepositoryNotFound(m) | StorageError::FileNotFound(m) => {
            ToolError::NotFound(m)
        }
        StorageError::Conflict(m) => ToolError::Conflict(m),
        other => ToolError::Fatal(other.to_string()),
    }
}

fn query_err(e: QueryError) -> ToolError {
    match e {
        QueryError::FileNotIndexed(m) => ToolError::NotFound(format!("file not indexed: {m}")),
        QueryError::Storage(e) => storage_err(e),
    }
}

fn index_err(e: IndexError) -> ToolError {
    match e {
        IndexError::NotADirectory(m) => ToolError::invalid(format!("not a directory: {m}")),
        IndexError::Storage(e) => storage_err(e),
        other => ToolError::Fatal(other.to_string()),
    }
}

fn sync_err(e: SyncError) -> ToolError {
    match e {
        SyncError::Row { .. } | SyncError::UnknownTable(_) => ToolError::invalid(e.to_string()),
        SyncError::Storage(e) => storage_err(e),
        SyncError::Io { .. } => ToolError::Fatal(e.to_string()),
    }
}

// --- Shared parameter helpers ---

pub(crate) fn opt_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// Clamp a limit parameter to 1..=100.
pub(crate) fn clamp_limit(args: &Value, key: &str, default: u32) -> u32 {
    args.get(key)
        .and_then(Value::as_u64)
        .map_or(default, |n| n.clamp(1, 100) as u32)
}

/// Resolve the repository a tool operates on.
///
/// An explicit `repository` filter is looked up by full name (with a
/// `local/` fallback); otherwise the auto-index guard resolves the current
/// working tree.
pub(crate) async fn repo_for(
    ctx: &ToolContext,
    filter: Option<&str>,
) -> Result<Option<Repository>, ToolError> {
    if let Some(name) = filter {
        let repo = ctx
            .storage
            .find_repository_by_name(name)
            .await
            .map_err(storage_err)?;
        if repo.is_some() {
            return Ok(repo);
        }
        return ctx
            .storage
            .find_repository_by_name(&format!("local/{name}"))
            .await
            .map_err(storage_err);
    }
    Ok(guard::ensure_indexed(&ctx.storage, &ctx.config).await)
}

/// Like `repo_for`, but the tool requires indexed data.
pub(crate) async fn repo_required(
    ctx: &ToolContext,
    filter: Option<&str>,
) -> Result<Repository, ToolError> {
    repo_for(ctx, filter).await?.ok_or_else(|| {
        ToolError::NotFound(
            "no indexed repository for the working directory; run index_repository first"
                .to_string(),
        )
    })
}

fn string_list(args: &Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// --- Handlers ---

async fn tool_index_repository(ctx: &ToolContext, args: &Value) -> Result<Value, ToolError> {
    let repository = opt_str(args, "repository").unwrap_or_default();
    let root = opt_str(args, "localPath")
        .map(PathBuf::from)
        .unwrap_or_else(|| ctx.config.working_dir.clone());

    let full_name = if repository.contains('/') {
        repository.to_string()
    } else {
        format!("local/{repository}")
    };
    let options = ExtractOptions {
        max_file_size: ctx.config.max_file_size,
        ..ExtractOptions::default()
    };
    let outcome = indexer::index_full(&ctx.storage, &root, &full_name, &options)
        .await
        .map_err(index_err)?;
    Ok(serde_json::to_value(outcome).unwrap_or_default())
}

async fn tool_list_recent_files(ctx: &ToolContext, args: &Value) -> Result<Value, ToolError> {
    let limit = clamp_limit(args, "limit", 10);
    let repo = repo_for(ctx, opt_str(args, "repository")).await?;
    let files = ctx
        .storage
        .list_recent_files(repo.as_ref().map(|r| &r.id), limit)
        .await
        .map_err(storage_err)?;
    let rows: Vec<Value> = files
        .iter()
        .map(|f| {
            json!({
                "path": f.path,
                "language": f.language,
                "size": f.size,
                "indexed_at": f.indexed_at.to_rfc3339(),
            })
        })
        .collect();
    let mut result = json!({"files": rows});
    if repo.is_none() {
        result["message"] = json!("no repository indexed for the working directory");
    }
    Ok(result)
}

fn parse_reference_types(args: &Value) -> Option<Vec<ReferenceKind>> {
    let list = args.get("reference_types")?.as_array()?;
    let kinds: Vec<ReferenceKind> = list
        .iter()
        .filter_map(Value::as_str)
        .filter_map(ReferenceKind::parse)
        .collect();
    if kinds.is_empty() {
        None
    } else {
        Some(kinds)
    }
}

async fn tool_search_dependencies(ctx: &ToolContext, args: &Value) -> Result<Value, ToolError> {
    let file_path = opt_str(args, "file_path").unwrap_or_default();
    let direction = opt_str(args, "direction").unwrap_or("dependents");
    let depth = args.get("depth").and_then(Value::as_u64).unwrap_or(1) as u32;
    let include_tests = args
        .get("include_tests")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let reference_types = parse_reference_types(args);
    let repo = repo_required(ctx, opt_str(args, "repository")).await?;

    let mut result = json!({"file": file_path, "direction": direction});
    if direction == "dependents" || direction == "both" {
        let traversal = query::traverse(
            &ctx.storage,
            &repo.id,
            file_path,
            Direction::Dependents,
            depth,
            include_tests,
            reference_types.as_deref(),
        )
        .await
        .map_err(query_err)?;
        result["unresolved_imports"] =
            serde_json::to_value(&traversal.unresolved_imports).unwrap_or_default();
        result["dependents"] = serde_json::to_value(traversal).unwrap_or_default();
    }
    if direction == "dependencies" || direction == "both" {
        let traversal = query::traverse(
            &ctx.storage,
            &repo.id,
            file_path,
            Direction::Dependencies,
            depth,
            include_tests,
            reference_types.as_deref(),
        )
        .await
        .map_err(query_err)?;
        result["unresolved_imports"] =
            serde_json::to_value(&traversal.unresolved_imports).unwrap_or_default();
        result["dependencies"] = serde_json::to_value(traversal).unwrap_or_default();
    }
    Ok(result)
}

async fn tool_analyze_change_impact(ctx: &ToolContext, args: &Value) -> Result<Value, ToolError> {
    let file_path = opt_str(args, "file_path").unwrap_or_default();
    let repo = repo_required(ctx, opt_str(args, "repository")).await?;

    let traversal = query::traverse(
        &ctx.storage,
        &repo.id,
        file_path,
        Direction::Dependents,
        3,
        true,
        None,
    )
    .await
    .map_err(query_err)?;

    let indirect_count: usize = traversal.indirect.values().map(Vec::len).sum();
    let total = traversal.direct.len() + indirect_count;
    let risk = match total {
        0..=2 => "low",
        3..=9 => "medium",
        _ => "high",
    };

    Ok(json!({
        "file": file_path,
        "direct_dependents": traversal.direct,
        "indirect_dependents": traversal.indirect,
        "cycles": traversal.cycles,
        "unresolved_imports": traversal.unresolved_imports,
        "total_dependents": total,
        "risk": risk,
    }))
}

async fn tool_validate_spec(ctx: &ToolContext, args: &Value) -> Result<Value, ToolError> {
    let spec_path = opt_str(args, "spec_path").unwrap_or_default();
    let repo = repo_required(ctx, opt_str(args, "repository")).await?;

    let abs = if PathBuf::from(spec_path).is_absolute() {
        PathBuf::from(spec_path)
    } else {
        ctx.config.working_dir.join(spec_path)
    };
    let content = std::fs::read_to_string(&abs)
        .map_err(|e| ToolError::invalid(format!("cannot read spec {spec_path}: {e}")))?;

    let mentions = extract_path_mentions(&content);
    let mut valid = Vec::new();
    let mut missing = Vec::new();
    for path in mentions {
        let resolved = ctx
            .storage
            .resolve_file_path(&repo.id, &path)
            .await
            .map_err(storage_err)?;
        if resolved.is_some() {
            valid.push(path);
        } else {
            missing.push(path);
        }
    }
    let total = valid.len() + missing.len();
    let coverage = if total == 0 {
        1.0
    } else {
        valid.len() as f64 / total as f64
    };
    Ok(json!({"valid": valid, "missing": missing, "coverage": coverage}))
}

/// Source-file paths mentioned in a document, deduplicated in order.
fn extract_path_mentions(content: &str) -> Vec<String> {
    use std::sync::LazyLock;
    static PATH_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"[A-Za-z0-9_][A-Za-z0-9_./-]*\.(?:tsx?|jsx?|mjs|cjs|py|rs)\b").unwrap()
    });
    let mut seen = std::collections::HashSet::new();
    PATH_RE
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .filter(|p| p.contains('/'))
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

async fn tool_generate_task_context(ctx: &ToolContext, args: &Value) -> Result<Value, ToolError> {
    let task = opt_str(args, "task").unwrap_or_default();
    let max_chars = args
        .get("max_chars")
        .and_then(Value::as_u64)
        .unwrap_or(4000) as usize;
    let repo = repo_for(ctx, opt_str(args, "repository")).await?;
    let repo_id = repo.as_ref().map(|r| &r.id);

    let files = ctx
        .storage
        .search_files(task, repo_id, 5)
        .await
        .map_err(storage_err)?;
    let symbols = ctx
        .storage
        .search_symbols(task, &[], false, repo_id, 5)
        .await
        .map_err(storage_err)?;
    let decisions = ctx
        .storage
        .search_decisions(task, None, repo_id, 3)
        .await
        .map_err(storage_err)?;
    let patterns = ctx
        .storage
        .search_patterns(None, None, repo_id, 3)
        .await
        .map_err(storage_err)?;

    let mut block = format!("Task: {task}\n");
    if !files.is_empty() {
        block.push_str("\nRelevant files:\n");
        for f in &files {
            block.push_str(&format!("- {}\n", f.path));
        }
    }
    if !symbols.is_empty() {
        block.push_str("\nRelevant symbols:\n");
        for s in &symbols {
            block.push_str(&format!(
                "- {} ({}) in {}:{}\n",
                s.symbol.name,
                s.symbol.kind.as_str(),
                s.file_path,
                s.symbol.line_start
            ));
        }
    }
    if !decisions.is_empty() {
        block.push_str("\nRecorded decisions:\n");
        for d in &decisions {
            block.push_str(&format!("- {}: {}\n", d.decision.title, d.decision.decision));
        }
    }
    if !patterns.is_empty() {
        block.push_str("\nPatterns:\n");
        for p in &patterns {
            block.push_str(&format!("- {}: {}\n", p.pattern_type, p.description));
        }
    }
    if block.len() > max_chars {
        let mut cut = max_chars;
        while cut > 0 && !block.is_char_boundary(cut) {
            cut -= 1;
        }
        block.truncate(cut);
    }

    Ok(json!({"context": block, "chars": block.len()}))
}

async fn tool_domain_key_files(ctx: &ToolContext, args: &Value) -> Result<Value, ToolError> {
    let domain = opt_str(args, "domain").unwrap_or_default();
    let limit = clamp_limit(args, "limit", 10);
    let repo = repo_required(ctx, opt_str(args, "repository")).await?;

    let (files, matched) =
        query::domain_key_files(&ctx.storage, &repo.id, &ctx.rules, domain, limit)
            .await
            .map_err(query_err)?;
    let mut result = json!({
        "domain": domain,
        "key_files": serde_json::to_value(files).unwrap_or_default(),
    });
    if !matched {
        result["message"] = json!(format!(
            "no path rules configured for domain '{domain}'; showing repository-wide ranking"
        ));
    }
    Ok(result)
}

async fn tool_sync_export(ctx: &ToolContext, args: &Value) -> Result<Value, ToolError> {
    let force = args.get("force").and_then(Value::as_bool).unwrap_or(false);
    let dir = opt_str(args, "export_dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| ctx.config.export_dir.clone());
    let report = sync::export(&ctx.storage, &dir, force)
        .await
        .map_err(sync_err)?;
    let mut value = serde_json::to_value(report).unwrap_or_default();
    value["export_dir"] = json!(dir.display().to_string());
    Ok(value)
}

async fn tool_sync_import(ctx: &ToolContext, args: &Value) -> Result<Value, ToolError> {
    let dir = opt_str(args, "import_dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| ctx.config.export_dir.clone());
    if !dir.is_dir() {
        return Err(ToolError::invalid(format!(
            "import directory does not exist: {}",
            dir.display()
        )));
    }
    let report = sync::import(&ctx.storage, &dir)
        .await
        .map_err(sync_err)?;
    Ok(serde_json::to_value(report).unwrap_or_default())
}

async fn tool_record_decision(ctx: &ToolContext, args: &Value) -> Result<Value, ToolError> {
    let scope = opt_str(args, "scope")
        .and_then(DecisionScope::parse)
        .ok_or_else(|| ToolError::invalid("scope must be one of architecture, pattern, convention, workaround"))?;
    let repo = repo_for(ctx, opt_str(args, "repository")).await?;

    let decision = ctx
        .storage
        .insert_decision(DecisionInsert {
            repository_id: repo.map(|r| r.id),
            title: opt_str(args, "title").unwrap_or_default().to_string(),
            context: opt_str(args, "context").unwrap_or_default().to_string(),
            decision: opt_str(args, "decision").unwrap_or_default().to_string(),
            scope,
            rationale: opt_str(args, "rationale").map(str::to_string),
            alternatives: string_list(args, "alternatives"),
            related_files: string_list(args, "related_files"),
        })
        .await
        .map_err(storage_err)?;
    Ok(json!({"id": decision.id, "recorded": true}))
}

async fn tool_record_failure(ctx: &ToolContext, args: &Value) -> Result<Value, ToolError> {
    let repo = repo_for(ctx, opt_str(args, "repository")).await?;
    let failure = ctx
        .storage
        .insert_failure(FailureInsert {
            repository_id: repo.map(|r| r.id),
            title: opt_str(args, "title").unwrap_or_default().to_string(),
            problem: opt_str(args, "problem").unwrap_or_default().to_string(),
            approach: opt_str(args, "approach").unwrap_or_default().to_string(),
            failure_reason: opt_str(args, "failure_reason")
                .unwrap_or_default()
                .to_string(),
            related_files: string_list(args, "related_files"),
        })
        .await
        .map_err(storage_err)?;
    Ok(json!({"id": failure.id, "recorded": true}))
}

async fn tool_record_insight(ctx: &ToolContext, args: &Value) -> Result<Value, ToolError> {
    let insight_type = opt_str(args, "insight_type")
        .and_then(InsightKind::parse)
        .ok_or_else(|| ToolError::invalid("insight_type must be one of discovery, failure, workaround"))?;
    let insight = ctx
        .storage
        .insert_insight(
            opt_str(args, "session_id").map(str::to_string),
            opt_str(args, "content").unwrap_or_default().to_string(),
            insight_type,
            opt_str(args, "related_file").map(str::to_string),
        )
        .await
        .map_err(storage_err)?;
    Ok(json!({"id": insight.id, "recorded": true}))
}

async fn tool_recent_patterns(ctx: &ToolContext, args: &Value) -> Result<Value, ToolError> {
    let limit = clamp_limit(args, "limit", 10);
    let patterns = ctx
        .storage
        .search_patterns(opt_str(args, "pattern_type"), None, None, limit)
        .await
        .map_err(storage_err)?;
    let rows: Vec<Value> = patterns
        .iter()
        .map(|p| {
            json!({
                "pattern_type": p.pattern_type,
                "file_path": p.file_path,
                "description": p.description,
                "created_at": p.created_at.to_rfc3339(),
            })
        })
        .collect();
    Ok(json!({"patterns": rows}))
}

async fn tool_validate_expertise(ctx: &ToolContext, _args: &Value) -> Result<Value, ToolError> {
    let patterns = ctx.storage.list_patterns().await.map_err(storage_err)?;
    let mut stale = Vec::new();
    let mut checked = 0u64;
    for pattern in patterns {
        let Some(file_path) = &pattern.file_path else {
            continue;
        };
        checked += 1;
        if !ctx.config.working_dir.join(file_path).is_file() {
            stale.push(json!({
                "pattern_type": pattern.pattern_type,
                "file_path": file_path,
            }));
        }
    }
    Ok(json!({"checked": checked, "stale": stale}))
}

async fn tool_sync_expertise(ctx: &ToolContext, _args: &Value) -> Result<Value, ToolError> {
    let dir = &ctx.config.expertise_dir;
    if !dir.is_dir() {
        return Ok(json!({
            "synced": 0,
            "message": format!("no expertise directory at {}", dir.display()),
        }));
    }

    let repo = repo_for(ctx, None).await?;
    let mut synced = 0u64;
    let domains = std::fs::read_dir(dir)
        .map_err(|e| ToolError::Fatal(format!("cannot read expertise dir: {e}")))?;
    for domain_entry in domains.flatten() {
        if !domain_entry.path().is_dir() {
            continue;
        }
        let domain = domain_entry.file_name().to_string_lossy().to_string();
        let Ok(docs) = std::fs::read_dir(domain_entry.path()) else {
            continue;
        };
        for doc in docs.flatten() {
            let path = doc.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping unreadable expertise doc");
                    continue;
                }
            };
            let (description, example) = parse_expertise_doc(&content);
            let rel = path
                .strip_prefix(&ctx.config.working_dir)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| path.display().to_string());
            ctx.storage
                .upsert_pattern(PatternUpsert {
                    repository_id: repo.as_ref().map(|r| r.id.clone()),
                    pattern_type: format!("{domain}:{name}"),
                    file_path: Some(rel),
                    description,
                    example,
                })
                .await
                .map_err(storage_err)?;
            synced += 1;
        }
    }
    Ok(json!({"synced": synced}))
}

/// First paragraph as description, first fenced code block as example.
fn parse_expertise_doc(content: &str) -> (String, Option<String>) {
    let mut description = String::new();
    let mut paragraph_done = false;
    let mut example: Option<String> = None;
    let mut in_fence = false;
    let mut fence_buf = String::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            if in_fence {
                if example.is_none() && !fence_buf.trim().is_empty() {
                    example = Some(fence_buf.trim_end().to_string());
                }
                in_fence = false;
            } else {
                in_fence = true;
                fence_buf.clear();
            }
            continue;
        }
        if in_fence {
            fence_buf.push_str(line);
            fence_buf.push('\n');
            continue;
        }
        if trimmed.starts_with('#') {
            continue;
        }
        if trimmed.is_empty() {
            if !description.is_empty() {
                paragraph_done = true;
            }
            continue;
        }
        if !paragraph_done && description.len() < 512 {
            if !description.is_empty() {
                description.push(' ');
            }
            description.push_str(trimmed);
        }
    }

    if description.is_empty() {
        description = "undocumented pattern".to_string();
    }
    (description, example)
}

/// The phase value a context-store payload must agree with.
///
/// `store_context` callers validate `data.phase == phase` before writing.
pub fn validate_context_payload(
    phase: WorkflowPhase,
    data: &Value,
) -> Result<(), ToolError> {
    if let Some(declared) = data.get("phase").and_then(Value::as_str) {
        if declared != phase.as_str() {
            return Err(ToolError::invalid(format!(
                "payload phase '{declared}' does not match '{}'",
                phase.as_str()
            )));
        }
    }
    Ok(())
}
