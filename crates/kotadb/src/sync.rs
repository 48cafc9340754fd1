//! JSONL import/export for git-based sync between machines.
//!
//! Export writes one `<table>.jsonl` per changed table plus a
//! `deletions.jsonl` manifest; a table whose row hash is unchanged since the
//! last export is skipped unless forced. Import applies deletions first, then
//! streams each table inside a single transaction.

use crate::storage::{Storage, StorageError};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("{file}:{line}: {message}")]
    Row {
        file: String,
        line: usize,
        message: String,
    },
    #[error("unknown table in manifest: {0}")]
    UnknownTable(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Exported tables in foreign-key order. Import follows the same order.
const TABLES: &[&str] = &[
    "repositories",
    "files",
    "symbols",
    "refs",
    "decisions",
    "failures",
    "patterns",
    "insights",
    "workflow_contexts",
];

/// Outcome of an export run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportReport {
    pub tables_exported: Vec<String>,
    pub tables_skipped: Vec<String>,
    pub deletions: u64,
}

/// Outcome of an import run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub tables_imported: Vec<String>,
    pub rows_imported: u64,
    pub deletions_applied: u64,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SyncError + '_ {
    move |source| SyncError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Export all tables whose content changed since the last export.
pub async fn export(storage: &Storage, export_dir: &Path, force: bool) -> Result<ExportReport> {
    std::fs::create_dir_all(export_dir).map_err(io_err(export_dir))?;
    let mut report = ExportReport::default();

    for table in TABLES {
        let rows = fetch_rows(storage, table).await?;
        let serialized: Vec<String> = rows
            .iter()
            .map(|row| serde_json::to_string(row).map_err(StorageError::from))
            .collect::<std::result::Result<_, _>>()?;
        let hash = table_hash(&serialized);

        let previous: Option<(String,)> =
            sqlx::query_as("SELECT content_hash FROM sync_state WHERE table_name = ?1")
                .bind(table)
                .fetch_optional(storage.pool())
                .await
                .map_err(StorageError::from)?;
        if !force && previous.map(|(h,)| h) == Some(hash.clone()) {
            report.tables_skipped.push((*table).to_string());
            continue;
        }

        let path = export_dir.join(format!("{table}.jsonl"));
        let mut out = std::fs::File::create(&path).map_err(io_err(&path))?;
        for line in &serialized {
            writeln!(out, "{line}").map_err(io_err(&path))?;
        }

        sqlx::query(
            "INSERT INTO sync_state (table_name, content_hash, exported_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (table_name) DO UPDATE SET
                content_hash = excluded.content_hash,
                exported_at = excluded.exported_at",
        )
        .bind(table)
        .bind(&hash)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(storage.pool())
        .await
        .map_err(StorageError::from)?;

        report.tables_exported.push((*table).to_string());
    }

    // Drain pending deletions into the manifest.
    let deletions: Vec<(String, String, String)> =
        sqlx::query_as("SELECT table_name, row_id, deleted_at FROM sync_deletions ORDER BY deleted_at, row_id")
            .fetch_all(storage.pool())
            .await
            .map_err(StorageError::from)?;
    let manifest_path = export_dir.join("deletions.jsonl");
    let mut manifest = std::fs::File::create(&manifest_path).map_err(io_err(&manifest_path))?;
    for (table, row_id, deleted_at) in &deletions {
        let line = json!({"table": table, "id": row_id, "deleted_at": deleted_at});
        writeln!(manifest, "{line}").map_err(io_err(&manifest_path))?;
    }
    report.deletions = deletions.len() as u64;
    sqlx::query("DELETE FROM sync_deletions")
        .execute(storage.pool())
        .await
        .map_err(StorageError::from)?;

    info!(
        exported = report.tables_exported.len(),
        skipped = report.tables_skipped.len(),
        deletions = report.deletions,
        "sync export complete"
    );
    Ok(report)
}

/// Import an export directory: deletions first, then each table.
///
/// Each table imports inside one transaction; a bad row aborts that table
/// and reports the offending file and line.
pub async fn import(storage: &Storage, import_dir: &Path) -> Result<ImportReport> {
    let mut report = ImportReport::default();

    let manifest_path = import_dir.join("deletions.jsonl");
    if manifest_path.is_file() {
        let file = std::fs::File::open(&manifest_path).map_err(io_err(&manifest_path))?;
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(io_err(&manifest_path))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: Value = serde_json::from_str(&line).map_err(|e| SyncError::Row {
                file: "deletions.jsonl".to_string(),
                line: line_no + 1,
                message: e.to_string(),
            })?;
            let table = entry.get("table").and_then(Value::as_str).ok_or_else(|| {
                SyncError::Row {
                    file: "deletions.jsonl".to_string(),
                    line: line_no + 1,
                    message: "missing table".to_string(),
                }
            })?;
            let id = entry.get("id").and_then(Value::as_str).ok_or_else(|| {
                SyncError::Row {
                    file: "deletions.jsonl".to_string(),
                    line: line_no + 1,
                    message: "missing id".to_string(),
                }
            })?;
            if !TABLES.contains(&table) {
                return Err(SyncError::UnknownTable(table.to_string()));
            }
            let sql = format!("DELETE FROM {table} WHERE id = ?1");
            sqlx::query(&sql)
                .bind(id)
                .execute(storage.pool())
                .await
                .map_err(StorageError::from)?;
            report.deletions_applied += 1;
        }
    }

    for table in TABLES {
        let path = import_dir.join(format!("{table}.jsonl"));
        if !path.is_file() {
            continue;
        }
        let rows = import_table(storage, table, &path).await?;
        report.rows_imported += rows;
        report.tables_imported.push((*table).to_string());
    }

    info!(
        tables = report.tables_imported.len(),
        rows = report.rows_imported,
        deletions = report.deletions_applied,
        "sync import complete"
    );
    Ok(report)
}

async fn import_table(storage: &Storage, table: &str, path: &Path) -> Result<u64> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let file = std::fs::File::open(path).map_err(io_err(path))?;

    let mut tx = storage.pool().begin().await.map_err(StorageError::from)?;
    let mut imported = 0u64;

    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_err(path))?;
        if line.trim().is_empty() {
            continue;
        }
        let row: Value = serde_json::from_str(&line).map_err(|e| SyncError::Row {
            file: file_name.clone(),
            line: line_no + 1,
            message: e.to_string(),
        })?;
        insert_row(&mut tx, table, &row).await.map_err(|e| {
            SyncError::Row {
                file: file_name.clone(),
                line: line_no + 1,
                message: e.to_string(),
            }
        })?;
        imported += 1;
    }

    tx.commit().await.map_err(StorageError::from)?;
    Ok(imported)
}

/// Stable hash over the serialized rows of one table.
fn table_hash(lines: &[String]) -> String {
    let mut hasher = Sha256::new();
    for line in lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn s(row: &Value, key: &str) -> Option<String> {
    row.get(key).and_then(Value::as_str).map(str::to_string)
}

fn n(row: &Value, key: &str) -> Option<i64> {
    row.get(key).and_then(Value::as_i64)
}

fn req(value: Option<String>, key: &str) -> std::result::Result<String, String> {
    value.ok_or_else(|| format!("missing field {key}"))
}

async fn insert_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    table: &str,
    row: &Value,
) -> std::result::Result<(), String> {
    let result = match table {
        "repositories" => {
            sqlx::query(
                "INSERT OR REPLACE INTO repositories (id, full_name, git_url, created_at, last_indexed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(req(s(row, "id"), "id")?)
            .bind(req(s(row, "full_name"), "full_name")?)
            .bind(req(s(row, "git_url"), "git_url")?)
            .bind(req(s(row, "created_at"), "created_at")?)
            .bind(s(row, "last_indexed_at"))
            .execute(&mut **tx)
            .await
        }
        "files" => {
            sqlx::query(
                "INSERT OR REPLACE INTO files (id, repository_id, path, language, content_hash, size, indexed_at, content)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(req(s(row, "id"), "id")?)
            .bind(req(s(row, "repository_id"), "repository_id")?)
            .bind(req(s(row, "path"), "path")?)
            .bind(req(s(row, "language"), "language")?)
            .bind(req(s(row, "content_hash"), "content_hash")?)
            .bind(n(row, "size").ok_or("missing field size")?)
            .bind(req(s(row, "indexed_at"), "indexed_at")?)
            .bind(s(row, "content"))
            .execute(&mut **tx)
            .await
        }
        "symbols" => {
            sqlx::query(
                "INSERT OR REPLACE INTO symbols (id, file_id, name, kind, signature, documentation, line_start, line_end, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .bind(req(s(row, "id"), "id")?)
            .bind(req(s(row, "file_id"), "file_id")?)
            .bind(req(s(row, "name"), "name")?)
            .bind(req(s(row, "kind"), "kind")?)
            .bind(s(row, "signature"))
            .bind(s(row, "documentation"))
            .bind(n(row, "line_start").ok_or("missing field line_start")?)
            .bind(n(row, "line_end").ok_or("missing field line_end")?)
            .bind(row.get("metadata").map(Value::to_string).unwrap_or_else(|| "{}".to_string()))
            .execute(&mut **tx)
            .await
        }
        "refs" => {
            sqlx::query(
                "INSERT OR REPLACE INTO refs (id, file_id, target_file_path, target_symbol_name, reference_type, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(req(s(row, "id"), "id")?)
            .bind(req(s(row, "file_id"), "file_id")?)
            .bind(s(row, "target_file_path"))
            .bind(s(row, "target_symbol_name"))
            .bind(req(s(row, "reference_type"), "reference_type")?)
            .bind(row.get("metadata").map(Value::to_string).unwrap_or_else(|| "{}".to_string()))
            .execute(&mut **tx)
            .await
        }
        "decisions" => {
            sqlx::query(
                "INSERT OR REPLACE INTO decisions (id, repository_id, title, context, decision, scope, rationale, alternatives, related_files, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )
            .bind(req(s(row, "id"), "id")?)
            .bind(s(row, "repository_id"))
            .bind(req(s(row, "title"), "title")?)
            .bind(req(s(row, "context"), "context")?)
            .bind(req(s(row, "decision"), "decision")?)
            .bind(req(s(row, "scope"), "scope")?)
            .bind(s(row, "rationale"))
            .bind(row.get("alternatives").map(Value::to_string).unwrap_or_else(|| "[]".to_string()))
            .bind(row.get("related_files").map(Value::to_string).unwrap_or_else(|| "[]".to_string()))
            .bind(req(s(row, "created_at"), "created_at")?)
            .bind(req(s(row, "updated_at"), "updated_at")?)
            .execute(&mut **tx)
            .await
        }
        "failures" => {
            sqlx::query(
                "INSERT OR REPLACE INTO failures (id, repository_id, title, problem, approach, failure_reason, related_files, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(req(s(row, "id"), "id")?)
            .bind(s(row, "repository_id"))
            .bind(req(s(row, "title"), "title")?)
            .bind(req(s(row, "problem"), "problem")?)
            .bind(req(s(row, "approach"), "approach")?)
            .bind(req(s(row, "failure_reason"), "failure_reason")?)
            .bind(row.get("related_files").map(Value::to_string).unwrap_or_else(|| "[]".to_string()))
            .bind(req(s(row, "created_at"), "created_at")?)
            .execute(&mut **tx)
            .await
        }
        "patterns" => {
            sqlx::query(
                "INSERT OR REPLACE INTO patterns (id, repository_id, pattern_type, file_path, description, example, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(req(s(row, "id"), "id")?)
            .bind(s(row, "repository_id"))
            .bind(req(s(row, "pattern_type"), "pattern_type")?)
            .bind(s(row, "file_path"))
            .bind(req(s(row, "description"), "description")?)
            .bind(s(row, "example"))
            .bind(req(s(row, "created_at"), "created_at")?)
            .execute(&mut **tx)
            .await
        }
        "insights" => {
            sqlx::query(
                "INSERT OR REPLACE INTO insights (id, session_id, content, insight_type, related_file, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(req(s(row, "id"), "id")?)
            .bind(s(row, "session_id"))
            .bind(req(s(row, "content"), "content")?)
            .bind(req(s(row, "insight_type"), "insight_type")?)
            .bind(s(row, "related_file"))
            .bind(req(s(row, "created_at"), "created_at")?)
            .execute(&mut **tx)
            .await
        }
        "workflow_contexts" => {
            sqlx::query(
                "INSERT OR REPLACE INTO workflow_contexts (id, workflow_id, phase, context_data, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(req(s(row, "id"), "id")?)
            .bind(req(s(row, "workflow_id"), "workflow_id")?)
            .bind(req(s(row, "phase"), "phase")?)
            .bind(row.get("context_data").map(Value::to_string).unwrap_or_else(|| "{}".to_string()))
            .bind(req(s(row, "created_at"), "created_at")?)
            .bind(req(s(row, "updated_at"), "updated_at")?)
            .execute(&mut **tx)
            .await
        }
        other => return Err(format!("unknown table {other}")),
    };

    result.map(|_| ()).map_err(|e| e.to_string())
}

/// Fetch all rows of one table as JSON values, ordered by id.
async fn fetch_rows(storage: &Storage, table: &str) -> Result<Vec<Value>> {
    let pool = storage.pool();
    let rows = match table {
        "repositories" => {
            let rows: Vec<(String, String, String, String, Option<String>)> = sqlx::query_as(
                "SELECT id, full_name, git_url, created_at, last_indexed_at FROM repositories ORDER BY id",
            )
            .fetch_all(pool)
            .await
            .map_err(StorageError::from)?;
            rows.into_iter()
                .map(|(id, full_name, git_url, created_at, last_indexed_at)| {
                    json!({"id": id, "full_name": full_name, "git_url": git_url,
                           "created_at": created_at, "last_indexed_at": last_indexed_at})
                })
                .collect()
        }
        "files" => {
            let rows: Vec<(String, String, String, String, String, i64, String, Option<String>)> =
                sqlx::query_as(
                    "SELECT id, repository_id, path, language, content_hash, size, indexed_at, content
                     FROM files ORDER BY id",
                )
                .fetch_all(pool)
                .await
                .map_err(StorageError::from)?;
            rows.into_iter()
                .map(|(id, repository_id, path, language, content_hash, size, indexed_at, content)| {
                    json!({"id": id, "repository_id": repository_id, "path": path,
                           "language": language, "content_hash": content_hash, "size": size,
                           "indexed_at": indexed_at, "content": content})
                })
                .collect()
        }
        "symbols" => {
            let rows: Vec<(String, String, String, String, Option<String>, Option<String>, i64, i64, String)> =
                sqlx::query_as(
                    "SELECT id, file_id, name, kind, signature, documentation, line_start, line_end, metadata
                     FROM symbols ORDER BY id",
                )
                .fetch_all(pool)
                .await
                .map_err(StorageError::from)?;
            rows.into_iter()
                .map(|(id, file_id, name, kind, signature, documentation, line_start, line_end, metadata)| {
                    json!({"id": id, "file_id": file_id, "name": name, "kind": kind,
                           "signature": signature, "documentation": documentation,
                           "line_start": line_start, "line_end": line_end,
                           "metadata": serde_json::from_str::<Value>(&metadata).unwrap_or_default()})
                })
                .collect()
        }
        "refs" => {
            let rows: Vec<(String, String, Option<String>, Option<String>, String, String)> =
                sqlx::query_as(
                    "SELECT id, file_id, target_file_path, target_symbol_name, reference_type, metadata
                     FROM refs ORDER BY id",
                )
                .fetch_all(pool)
                .await
                .map_err(StorageError::from)?;
            rows.into_iter()
                .map(|(id, file_id, target_file_path, target_symbol_name, reference_type, metadata)| {
                    json!({"id": id, "file_id": file_id, "target_file_path": target_file_path,
                           "target_symbol_name": target_symbol_name, "reference_type": reference_type,
                           "metadata": serde_json::from_str::<Value>(&metadata).unwrap_or_default()})
                })
                .collect()
        }
        "decisions" => {
            let rows: Vec<(String, Option<String>, String, String, String, String, Option<String>, String, String, String, String)> =
                sqlx::query_as(
                    "SELECT id, repository_id, title, context, decision, scope, rationale,
                            alternatives, related_files, created_at, updated_at
                     FROM decisions ORDER BY id",
                )
                .fetch_all(pool)
                .await
                .map_err(StorageError::from)?;
            rows.into_iter()
                .map(|(id, repository_id, title, context, decision, scope, rationale, alternatives, related_files, created_at, updated_at)| {
                    json!({"id": id, "repository_id": repository_id, "title": title,
                           "context": context, "decision": decision, "scope": scope,
                           "rationale": rationale,
                           "alternatives": serde_json::from_str::<Value>(&alternatives).unwrap_or_default(),
                           "related_files": serde_json::from_str::<Value>(&related_files).unwrap_or_default(),
                           "created_at": created_at, "updated_at": updated_at})
                })
                .collect()
        }
        "failures" => {
            let rows: Vec<(String, Option<String>, String, String, String, String, String, String)> =
                sqlx::query_as(
                    "SELECT id, repository_id, title, problem, approach, failure_reason, related_files, created_at
                     FROM failures ORDER BY id",
                )
                .fetch_all(pool)
                .await
                .map_err(StorageError::from)?;
            rows.into_iter()
                .map(|(id, repository_id, title, problem, approach, failure_reason, related_files, created_at)| {
                    json!({"id": id, "repository_id": repository_id, "title": title,
                           "problem": problem, "approach": approach,
                           "failure_reason": failure_reason,
                           "related_files": serde_json::from_str::<Value>(&related_files).unwrap_or_default(),
                           "created_at": created_at})
                })
                .collect()
        }
        "patterns" => {
            let rows: Vec<(String, Option<String>, String, Option<String>, String, Option<String>, String)> =
                sqlx::query_as(
                    "SELECT id, repository_id, pattern_type, file_path, description, example, created_at
                     FROM patterns ORDER BY id",
                )
                .fetch_all(pool)
                .await
                .map_err(StorageError::from)?;
            rows.into_iter()
                .map(|(id, repository_id, pattern_type, file_path, description, example, created_at)| {
                    json!({"id": id, "repository_id": repository_id, "pattern_type": pattern_type,
                           "file_path": file_path, "description": description,
                           "example": example, "created_at": created_at})
                })
                .collect()
        }
        "insights" => {
            let rows: Vec<(String, Option<String>, String, String, Option<String>, String)> =
                sqlx::query_as(
                    "SELECT id, session_id, content, insight_type, related_file, created_at
                     FROM insights ORDER BY id",
                )
                .fetch_all(pool)
                .await
                .map_err(StorageError::from)?;
            rows.into_iter()
                .map(|(id, session_id, content, insight_type, related_file, created_at)| {
                    json!({"id": id, "session_id": session_id, "content": content,
                           "insight_type": insight_type, "related_file": related_file,
                           "created_at": created_at})
                })
                .collect()
        }
        "workflow_contexts" => {
            let rows: Vec<(String, String, String, String, String, String)> = sqlx::query_as(
                "SELECT id, workflow_id, phase, context_data, created_at, updated_at
                 FROM workflow_contexts ORDER BY id",
            )
            .fetch_all(pool)
            .await
            .map_err(StorageError::from)?;
            rows.into_iter()
                .map(|(id, workflow_id, phase, context_data, created_at, updated_at)| {
                    json!({"id": id, "workflow_id": workflow_id, "phase": phase,
                           "context_data": serde_json::from_str::<Value>(&context_data).unwrap_or_default(),
                           "created_at": created_at, "updated_at": updated_at})
                })
                .collect()
        }
        other => return Err(SyncError::UnknownTable(other.to_string())),
    };
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::create_test_storage;
    use crate::storage::{DecisionInsert, FileUpsert, ReferenceInsert, SymbolInsert};
    use kota_core::{DecisionScope, ReferenceKind, SymbolKind};
    use tempfile::TempDir;

    async fn seed(ts: &crate::storage::test_support::TestStorage) -> kota_core::Id {
        let repo = ts
            .storage
            .upsert_repository("local/demo", "/repo/demo")
            .await
            .unwrap();
        ts.storage
            .index_file(
                &repo.id,
                &FileUpsert {
                    path: "a.ts".to_string(),
                    language: "typescript".to_string(),
                    content_hash: "h1".to_string(),
                    size: 10,
                    content: Some("export function foo() {}".to_string()),
                },
                &[SymbolInsert {
                    name: "foo".to_string(),
                    kind: SymbolKind::Function,
                    signature: None,
                    documentation: None,
                    line_start: 1,
                    line_end: 1,
                    metadata: serde_json::json!({"is_exported": true}),
                }],
                &[ReferenceInsert {
                    target_symbol_name: None,
                    reference_type: ReferenceKind::Import,
                    metadata: serde_json::json!({"importSource": "./b"}),
                }],
            )
            .await
            .unwrap();
        ts.storage
            .insert_decision(DecisionInsert {
                repository_id: Some(repo.id.clone()),
                title: "Use sqlite".to_string(),
                context: "ctx".to_string(),
                decision: "embed".to_string(),
                scope: DecisionScope::Architecture,
                rationale: None,
                alternatives: vec![],
                related_files: vec![],
            })
            .await
            .unwrap();
        repo.id
    }

    #[tokio::test]
    async fn export_then_reexport_skips_unchanged_tables() {
        let ts = create_test_storage().await;
        seed(&ts).await;
        let dir = TempDir::new().unwrap();

        let first = export(&ts.storage, dir.path(), false).await.unwrap();
        assert!(first.tables_exported.contains(&"files".to_string()));
        assert!(dir.path().join("files.jsonl").is_file());
        assert!(dir.path().join("deletions.jsonl").is_file());

        let second = export(&ts.storage, dir.path(), false).await.unwrap();
        assert!(second.tables_exported.is_empty());
        assert_eq!(second.tables_skipped.len(), TABLES.len());

        let forced = export(&ts.storage, dir.path(), true).await.unwrap();
        assert_eq!(forced.tables_exported.len(), TABLES.len());
    }

    #[tokio::test]
    async fn round_trip_preserves_rows() {
        let source = create_test_storage().await;
        seed(&source).await;
        let dir = TempDir::new().unwrap();
        export(&source.storage, dir.path(), true).await.unwrap();

        let target = create_test_storage().await;
        let report = import(&target.storage, dir.path()).await.unwrap();
        assert!(report.rows_imported >= 4);

        for table in TABLES {
            let before = fetch_rows(&source.storage, table).await.unwrap();
            let after = fetch_rows(&target.storage, table).await.unwrap();
            assert_eq!(before, after, "table {table} did not round-trip");
        }
    }

    #[tokio::test]
    async fn deletions_manifest_applies_before_rows() {
        let source = create_test_storage().await;
        let repo_id = seed(&source).await;
        let dir = TempDir::new().unwrap();
        export(&source.storage, dir.path(), true).await.unwrap();

        // Import the snapshot into a second store.
        let target = create_test_storage().await;
        import(&target.storage, dir.path()).await.unwrap();
        assert_eq!(target.storage.count_files(&repo_id).await.unwrap(), 1);

        // Delete the file at the source, export, import again.
        source.storage.delete_file(&repo_id, "a.ts").await.unwrap();
        export(&source.storage, dir.path(), true).await.unwrap();
        import(&target.storage, dir.path()).await.unwrap();
        assert_eq!(target.storage.count_files(&repo_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn bad_row_reports_file_and_line() {
        let ts = create_test_storage().await;
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("repositories.jsonl"),
            "{\"id\": \"r1\", \"full_name\": \"local/x\", \"git_url\": \"/x\", \"created_at\": \"t\"}\n{\"id\": \"r2\"}\n",
        )
        .unwrap();

        let result = import(&ts.storage, dir.path()).await;
        match result {
            Err(SyncError::Row { file, line, .. }) => {
                assert_eq!(file, "repositories.jsonl");
                assert_eq!(line, 2);
            }
            other => panic!("expected row error, got {other:?}"),
        }

        // The aborted table left nothing behind.
        let rows = fetch_rows(&ts.storage, "repositories").await.unwrap();
        assert!(rows.is_empty());
    }
}
