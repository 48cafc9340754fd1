//! Indexer workflow: full and incremental extraction into the store.
//!
//! All mutations for one file share one transaction (see storage), so an
//! interrupted run leaves each file either fully old or fully new.

use crate::extract::{self, ExtractOptions, ExtractedFile};
use crate::storage::{Storage, StorageError};
use kota_core::{Id, Repository};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("extraction error: {0}")]
    Extract(#[from] crate::extract::ExtractError),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("task join error: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Counters reported by an index run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IndexStats {
    pub files_indexed: u64,
    pub symbols_extracted: u64,
    pub references_extracted: u64,
}

/// Result of a full or incremental index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexOutcome {
    #[serde(rename = "repositoryId")]
    pub repository_id: Id,
    pub status: String,
    pub stats: IndexStats,
}

/// Derive `local/<dir>` from a working-tree root.
pub fn full_name_for_root(root: &Path) -> String {
    let name = root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("repository");
    format!("local/{name}")
}

/// Fully index a working tree into the store.
///
/// Unchanged files (same content hash) are skipped; files no longer present
/// on disk are deleted. `last_indexed_at` advances on success.
pub async fn index_full(
    storage: &Storage,
    root: &Path,
    full_name: &str,
    options: &ExtractOptions,
) -> Result<IndexOutcome> {
    if !root.is_dir() {
        return Err(IndexError::NotADirectory(root.display().to_string()));
    }

    let git_url = root
        .canonicalize()
        .unwrap_or_else(|_| root.to_path_buf())
        .display()
        .to_string();
    let repo = storage.upsert_repository(full_name, &git_url).await?;

    // Extraction is CPU-bound and internally parallel; keep it off the
    // async executor.
    let extract_root = root.to_path_buf();
    let extract_options = options.clone();
    let extracted = tokio::task::spawn_blocking(move || {
        extract::extract_tree(&extract_root, &extract_options)
    })
    .await
    .map_err(|e| IndexError::Join(e.to_string()))??;

    let mut stats = IndexStats::default();
    let disk_paths: HashSet<String> = extracted.iter().map(|f| f.path.clone()).collect();

    // Remove rows for files that disappeared from the working tree.
    for stored in storage.file_paths(&repo.id).await? {
        if !disk_paths.contains(&stored) {
            storage.delete_file(&repo.id, &stored).await?;
        }
    }

    for file in &extracted {
        if apply_file(storage, &repo.id, file, &mut stats).await? {
            stats.files_indexed += 1;
        }
    }

    resolve_all_references(storage, &repo.id).await?;
    storage
        .advance_last_indexed(&repo.id, chrono::Utc::now())
        .await?;

    info!(
        repository = full_name,
        files = stats.files_indexed,
        symbols = stats.symbols_extracted,
        references = stats.references_extracted,
        "full index complete"
    );

    Ok(IndexOutcome {
        repository_id: repo.id,
        status: "completed".to_string(),
        stats,
    })
}

/// Incrementally index changed and deleted paths.
///
/// References are re-resolved only for the touched files and for files whose
/// references previously resolved to them.
pub async fn index_incremental(
    storage: &Storage,
    root: &Path,
    repo: &Repository,
    changed: &[String],
    deleted: &[String],
    options: &ExtractOptions,
) -> Result<IndexOutcome> {
    let mut stats = IndexStats::default();
    let mut needs_resolution: HashSet<String> = HashSet::new();

    for path in deleted {
        for source in storage.files_referencing_path(&repo.id, path).await? {
            if let Ok(file) = storage.get_file(&source).await {
                needs_resolution.insert(file.path);
            }
        }
        if storage.delete_file(&repo.id, path).await? {
            info!(file = %path, "removed deleted file");
        }
        needs_resolution.remove(path);
    }

    for path in changed {
        let abs = root.join(path);
        if !abs.is_file() {
            warn!(file = %path, "changed path missing on disk, skipping");
            continue;
        }
        let extracted = match extract::extract_file(&abs, path, options.max_file_size) {
            Ok(Some(extracted)) => extracted,
            Ok(None) => continue,
            Err(e) => {
                warn!(file = %path, error = %e, "extraction failed, skipping file");
                continue;
            }
        };

        // Files referencing the old version re-resolve either way; content
        // identity is judged by hash below.
        for source in storage.files_referencing_path(&repo.id, path).await? {
            if let Ok(file) = storage.get_file(&source).await {
                needs_resolution.insert(file.path);
            }
        }

        if apply_file(storage, &repo.id, &extracted, &mut stats).await? {
            stats.files_indexed += 1;
            needs_resolution.insert(path.clone());
        }
    }

    if !needs_resolution.is_empty() {
        resolve_references_for(storage, &repo.id, &needs_resolution).await?;
    }
    storage
        .advance_last_indexed(&repo.id, chrono::Utc::now())
        .await?;

    Ok(IndexOutcome {
        repository_id: repo.id.clone(),
        status: "completed".to_string(),
        stats,
    })
}

/// Upsert one extracted file unless its hash is unchanged.
/// Returns true when the store was touched.
async fn apply_file(
    storage: &Storage,
    repository_id: &Id,
    file: &ExtractedFile,
    stats: &mut IndexStats,
) -> Result<bool> {
    if let Some(existing) = storage.get_file_by_path(repository_id, &file.path).await? {
        if existing.content_hash == file.content_hash {
            return Ok(false);
        }
    }

    let upsert = crate::storage::FileUpsert {
        path: file.path.clone(),
        language: file.language.clone(),
        content_hash: file.content_hash.clone(),
        size: file.size,
        content: file.content.clone(),
    };
    storage
        .index_file(repository_id, &upsert, &file.symbols, &file.references)
        .await?;
    stats.symbols_extracted += file.symbols.len() as u64;
    stats.references_extracted += file.references.len() as u64;
    Ok(true)
}

/// Resolve references of every file in the repository.
async fn resolve_all_references(storage: &Storage, repository_id: &Id) -> Result<()> {
    let meta = storage.list_file_meta(repository_id).await?;
    let all: HashSet<String> = meta.iter().map(|(_, path, _)| path.clone()).collect();
    resolve_for_meta(storage, &meta, &all).await
}

/// Resolve references for a subset of paths.
async fn resolve_references_for(
    storage: &Storage,
    repository_id: &Id,
    paths: &HashSet<String>,
) -> Result<()> {
    let meta = storage.list_file_meta(repository_id).await?;
    let all: HashSet<String> = meta.iter().map(|(_, path, _)| path.clone()).collect();
    let subset: Vec<(Id, String, String)> = meta
        .into_iter()
        .filter(|(_, path, _)| paths.contains(path))
        .collect();
    resolve_for_meta(storage, &subset, &all).await
}

async fn resolve_for_meta(
    storage: &Storage,
    meta: &[(Id, String, String)],
    all_paths: &HashSet<String>,
) -> Result<()> {
    let languages: HashMap<&str, &str> = meta
        .iter()
        .map(|(_, path, language)| (path.as_str(), language.as_str()))
        .collect();

    for (file_id, path, _) in meta {
        let language = languages.get(path.as_str()).copied().unwrap_or("");
        for reference in storage.references_for_file(file_id).await? {
            let Some(specifier) = reference.import_source().map(str::to_string) else {
                continue;
            };
            let target = extract::resolve_import(language, path, &specifier, all_paths);
            storage
                .update_reference_target(&reference.id, target.as_deref())
                .await?;
        }
    }
    Ok(())
}
