//! Per-issue checkpoints and the run manifest.
//!
//! Both are written atomically (tmp file + rename), so a crash mid-write
//! leaves either the previous or the new state, never a torn file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("corrupt checkpoint {path}: {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Resumable orchestrator state for one issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub issue_number: u64,
    pub workflow_id: String,
    pub completed_phases: Vec<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub issue_type: Option<String>,
    #[serde(default)]
    pub spec_path: Option<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub worktree_path: Option<String>,
    #[serde(default)]
    pub branch_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(issue_number: u64, workflow_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            issue_number,
            workflow_id: workflow_id.into(),
            completed_phases: Vec::new(),
            domain: None,
            issue_type: None,
            spec_path: None,
            files_modified: Vec::new(),
            worktree_path: None,
            branch_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self, phase: &str) -> bool {
        self.completed_phases.iter().any(|p| p == phase)
    }

    pub fn mark_completed(&mut self, phase: &str) {
        if !self.is_completed(phase) {
            self.completed_phases.push(phase.to_string());
        }
        self.updated_at = Utc::now();
    }
}

/// Run status in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// One manifest entry per issue run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub issue_number: u64,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub worktree_path: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub current_phase: Option<String>,
    #[serde(default)]
    pub pr_url: Option<String>,
    #[serde(default)]
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Checkpoint and manifest storage rooted at `automation/.data`.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    data_dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn checkpoints_dir(&self) -> PathBuf {
        self.data_dir.join("checkpoints")
    }

    pub fn checkpoint_path(&self, issue: u64) -> PathBuf {
        self.checkpoints_dir().join(format!("{issue}.json"))
    }

    fn manifest_path(&self) -> PathBuf {
        self.data_dir.join("manifest.json")
    }

    pub fn load(&self, issue: u64) -> Result<Option<Checkpoint>> {
        let path = self.checkpoint_path(issue);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|source| CheckpointError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let checkpoint =
            serde_json::from_str(&content).map_err(|source| CheckpointError::Corrupt {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Some(checkpoint))
    }

    /// Atomic write: serialize to `<path>.tmp`, then rename over the target.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let path = self.checkpoint_path(checkpoint.issue_number);
        write_atomic(&path, &serde_json::to_vec_pretty(checkpoint).unwrap_or_default())
    }

    /// Remove the checkpoint after a successful run. Missing file is fine.
    pub fn delete(&self, issue: u64) -> Result<()> {
        let path = self.checkpoint_path(issue);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    // --- Run manifest ---

    pub fn read_manifest(&self) -> Result<Vec<ManifestEntry>> {
        let path = self.manifest_path();
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| CheckpointError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| CheckpointError::Corrupt {
            path: path.display().to_string(),
            source,
        })
    }

    /// Insert or update one issue's manifest entry, atomically.
    pub fn update_manifest<F>(&self, issue: u64, update: F) -> Result<()>
    where
        F: FnOnce(&mut ManifestEntry),
    {
        let mut entries = self.read_manifest()?;
        if let Some(entry) = entries.iter_mut().find(|e| e.issue_number == issue) {
            update(entry);
        } else {
            let mut entry = ManifestEntry {
                issue_number: issue,
                status: RunStatus::Running,
                started_at: Utc::now(),
                completed_at: None,
                worktree_path: None,
                branch: None,
                current_phase: None,
                pr_url: None,
                cost_usd: None,
                duration_ms: None,
                error_message: None,
            };
            update(&mut entry);
            entries.push(entry);
        }
        write_atomic(
            &self.manifest_path(),
            &serde_json::to_vec_pretty(&entries).unwrap_or_default(),
        )
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let io_err = |source: std::io::Error| CheckpointError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, CheckpointStore) {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("automation/.data"));
        (dir, store)
    }

    #[test]
    fn save_load_delete_round_trip() {
        let (_dir, store) = store();
        let mut checkpoint = Checkpoint::new(42, "adw-42");
        checkpoint.domain = Some("auth".to_string());
        checkpoint.mark_completed("analysis");
        checkpoint.mark_completed("plan");

        store.save(&checkpoint).unwrap();
        let loaded = store.load(42).unwrap().unwrap();
        assert_eq!(loaded.completed_phases, vec!["analysis", "plan"]);
        assert_eq!(loaded.domain.as_deref(), Some("auth"));
        assert!(loaded.is_completed("plan"));
        assert!(!loaded.is_completed("build"));

        store.delete(42).unwrap();
        assert!(store.load(42).unwrap().is_none());
        // Deleting again is a no-op.
        store.delete(42).unwrap();
    }

    #[test]
    fn checkpoint_serializes_camel_case() {
        let checkpoint = Checkpoint::new(7, "adw-7");
        let value = serde_json::to_value(&checkpoint).unwrap();
        assert!(value.get("issueNumber").is_some());
        assert!(value.get("completedPhases").is_some());
        assert!(value.get("issue_number").is_none());
    }

    #[test]
    fn atomic_write_leaves_no_tmp_file() {
        let (_dir, store) = store();
        store.save(&Checkpoint::new(1, "adw-1")).unwrap();
        let tmp = store.checkpoint_path(1).with_extension("json.tmp");
        assert!(!tmp.exists());
        assert!(store.checkpoint_path(1).exists());
    }

    #[test]
    fn corrupt_checkpoint_is_reported_not_swallowed() {
        let (_dir, store) = store();
        let path = store.checkpoint_path(9);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            store.load(9),
            Err(CheckpointError::Corrupt { .. })
        ));
    }

    #[test]
    fn manifest_updates_are_keyed_by_issue() {
        let (_dir, store) = store();
        store
            .update_manifest(1, |e| {
                e.current_phase = Some("analysis".to_string());
            })
            .unwrap();
        store
            .update_manifest(2, |e| {
                e.status = RunStatus::Cancelled;
            })
            .unwrap();
        store
            .update_manifest(1, |e| {
                e.status = RunStatus::Completed;
                e.pr_url = Some("https://example.test/pr/1".to_string());
            })
            .unwrap();

        let entries = store.read_manifest().unwrap();
        assert_eq!(entries.len(), 2);
        let first = entries.iter().find(|e| e.issue_number == 1).unwrap();
        assert_eq!(first.status, RunStatus::Completed);
        assert_eq!(first.pr_url.as_deref(), Some("https://example.test/pr/1"));
    }
}
