//! Auto-index guard: detects an un-indexed working tree on first tool use
//! and triggers the indexer workflow once.

use crate::extract::ExtractOptions;
use crate::indexer;
use crate::storage::Storage;
use kota_core::{KotaConfig, Repository};
use tracing::{info, warn};

/// Resolve the repository for the configured working directory, indexing it
/// first if it was never indexed (no row, no stamp, or no files).
///
/// Returns None when auto-indexing failed; read-only callers proceed on
/// empty data, callers that require indexed state treat it as fatal.
pub async fn ensure_indexed(storage: &Storage, config: &KotaConfig) -> Option<Repository> {
    let root = config
        .working_dir
        .canonicalize()
        .unwrap_or_else(|_| config.working_dir.clone());
    let git_url = root.display().to_string();

    let existing = match storage.find_repository_by_git_url(&git_url).await {
        Ok(existing) => existing,
        Err(e) => {
            warn!(error = %e, "repository lookup failed");
            return None;
        }
    };

    if let Some(repo) = existing {
        let has_stamp = repo.last_indexed_at.is_some();
        let has_files = storage.count_files(&repo.id).await.unwrap_or(0) > 0;
        if has_stamp && has_files {
            return Some(repo);
        }
    }

    info!(root = %git_url, "working tree not indexed, auto-indexing");
    let full_name = indexer::full_name_for_root(&root);
    let options = ExtractOptions {
        max_file_size: config.max_file_size,
        ..ExtractOptions::default()
    };
    match indexer::index_full(storage, &root, &full_name, &options).await {
        Ok(outcome) => {
            info!(
                repository = %full_name,
                files = outcome.stats.files_indexed,
                "auto-index complete"
            );
            storage.get_repository(&outcome.repository_id).await.ok()
        }
        Err(e) => {
            warn!(error = %e, "auto-index failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::create_test_storage;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn config_for(root: &std::path::Path) -> KotaConfig {
        KotaConfig {
            db_path: PathBuf::from(":memory:"),
            working_dir: root.to_path_buf(),
            allowed_origins: Vec::new(),
            export_dir: root.join(".kotadb/export"),
            max_file_size: KotaConfig::DEFAULT_MAX_FILE_SIZE,
            domains_path: root.join(".kotadb/domains.toml"),
            expertise_dir: root.join(".kotadb/expertise"),
        }
    }

    #[tokio::test]
    async fn first_use_triggers_index() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export const A = 1;\n").unwrap();
        let ts = create_test_storage().await;

        let repo = ensure_indexed(&ts.storage, &config_for(dir.path())).await;
        let repo = repo.expect("auto-index should succeed");
        assert!(repo.last_indexed_at.is_some());
        assert_eq!(ts.storage.count_files(&repo.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn second_use_does_not_reindex() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export const A = 1;\n").unwrap();
        let ts = create_test_storage().await;

        let first = ensure_indexed(&ts.storage, &config_for(dir.path()))
            .await
            .unwrap();
        let stamp = first.last_indexed_at;
        let second = ensure_indexed(&ts.storage, &config_for(dir.path()))
            .await
            .unwrap();
        assert_eq!(second.last_indexed_at, stamp);
    }

    #[tokio::test]
    async fn missing_tree_fails_softly() {
        let ts = create_test_storage().await;
        let config = config_for(std::path::Path::new("/no/such/tree"));
        assert!(ensure_indexed(&ts.storage, &config).await.is_none());
    }
}
