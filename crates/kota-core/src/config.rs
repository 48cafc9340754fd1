//! Configuration for the engine and the orchestrator.
//!
//! Engine settings come from the environment; orchestrator settings merge a
//! key=value file (`.kotadb/config`) under environment overrides.
//! Precedence: environment > config file > defaults.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("invalid config line: {0}")]
    InvalidLine(String),
    #[error("invalid boolean value for {key}: {value}")]
    InvalidBool { key: String, value: String },
    #[error("invalid integer value for {key}: {value}")]
    InvalidInt { key: String, value: String },
}

/// Expand a leading `~` to the user's home directory.
fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

/// Code-intelligence engine settings.
#[derive(Debug, Clone)]
pub struct KotaConfig {
    /// Database file. `KOTADB_PATH` or `<cwd>/.kotadb/kota.db`.
    pub db_path: PathBuf,
    /// Working tree the engine serves. `KOTADB_CWD` or the process cwd.
    pub working_dir: PathBuf,
    /// Origin allow-list for the HTTP front-end. `KOTA_ALLOWED_ORIGINS`, comma-separated.
    pub allowed_origins: Vec<String>,
    /// Default sync export directory.
    pub export_dir: PathBuf,
    /// Files larger than this are indexed for path and hash only.
    pub max_file_size: u64,
    /// Domain-to-path rule set consumed by key-file queries.
    pub domains_path: PathBuf,
    /// Expertise documents synced into the patterns table.
    pub expertise_dir: PathBuf,
}

impl KotaConfig {
    pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

    pub fn from_env() -> Self {
        let working_dir = std::env::var("KOTADB_CWD")
            .map(|s| expand_home(&s))
            .or_else(|_| std::env::current_dir())
            .unwrap_or_else(|_| PathBuf::from("."));
        Self::for_dir(working_dir)
    }

    /// Build a config rooted at an explicit working directory.
    pub fn for_dir(working_dir: PathBuf) -> Self {
        let db_path = std::env::var("KOTADB_PATH")
            .map(|s| expand_home(&s))
            .unwrap_or_else(|_| working_dir.join(".kotadb/kota.db"));
        let allowed_origins = std::env::var("KOTA_ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            db_path,
            export_dir: working_dir.join(".kotadb/export"),
            domains_path: working_dir.join(".kotadb/domains.toml"),
            expertise_dir: working_dir.join(".kotadb/expertise"),
            working_dir,
            allowed_origins,
            max_file_size: Self::DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct AdwConfig {
    /// Model for the phase agents.
    pub model: String,
    /// Cheaper model for the inter-phase curator.
    pub curator_model: String,
    /// Branch that worktrees fork from and PRs target.
    pub base_branch: String,
    /// Batch concurrency bound. `ADW_MAX_PARALLEL_AGENTS` caps it.
    pub max_parallel: usize,
    /// Retry attempts per phase for transient failures.
    pub phase_retries: u32,
    /// Base backoff between retries, doubled per attempt.
    pub retry_backoff_sec: u32,
    /// Timeout per agent invocation in seconds (0 = none).
    pub phase_timeout_sec: u32,
    /// Validation commands run by the PR module.
    pub typecheck_cmd: String,
    pub test_cmd: String,
    /// Application root scanned by the convention checks.
    pub app_root: PathBuf,
    /// Checkpoints and the run manifest live under here.
    pub data_dir: PathBuf,
    pub github_token: Option<String>,
    pub anthropic_api_key: Option<String>,
}

impl Default for AdwConfig {
    fn default() -> Self {
        Self {
            model: "opus".to_string(),
            curator_model: "haiku".to_string(),
            base_branch: "develop".to_string(),
            max_parallel: 3,
            phase_retries: 3,
            retry_backoff_sec: 5,
            phase_timeout_sec: 1800,
            typecheck_cmd: "npm run typecheck".to_string(),
            test_cmd: "npm test".to_string(),
            app_root: PathBuf::from("src"),
            data_dir: PathBuf::from("automation/.data"),
            github_token: None,
            anthropic_api_key: None,
        }
    }
}

impl AdwConfig {
    /// Load `.kotadb/config` if present, then apply environment overrides.
    pub fn load(workspace_root: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let path = workspace_root.join(".kotadb/config");
        if path.exists() {
            config.load_file(&path)?;
        }
        config.apply_env();
        Ok(config)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.parse_content(&content)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("ADW_MAX_PARALLEL_AGENTS") {
            if let Ok(n) = v.parse::<usize>() {
                if n > 0 {
                    self.max_parallel = self.max_parallel.min(n);
                }
            }
        }
        self.github_token = std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
        self.anthropic_api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|t| !t.is_empty());
    }

    /// Parse key=value content, skipping comments and blank lines.
    fn parse_content(&mut self, content: &str) -> Result<(), ConfigError> {
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::InvalidLine(line.to_string()));
            };

            let key = key.trim();
            let value = Self::unquote(value.trim());
            self.apply_value(key, &value)?;
        }
        Ok(())
    }

    /// Remove surrounding quotes from a value.
    fn unquote(value: &str) -> String {
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            return value[1..value.len() - 1].to_string();
        }
        value.to_string()
    }

    fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
        value.parse().map_err(|_| ConfigError::InvalidInt {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    fn apply_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "model" => self.model = value.to_string(),
            "curator_model" => self.curator_model = value.to_string(),
            "base_branch" => self.base_branch = value.to_string(),
            "max_parallel" => {
                self.max_parallel = Self::parse_u32(key, value)? as usize;
            }
            "phase_retries" => self.phase_retries = Self::parse_u32(key, value)?,
            "retry_backoff_sec" => self.retry_backoff_sec = Self::parse_u32(key, value)?,
            "phase_timeout_sec" => self.phase_timeout_sec = Self::parse_u32(key, value)?,
            "typecheck_cmd" => self.typecheck_cmd = value.to_string(),
            "test_cmd" => self.test_cmd = value.to_string(),
            "app_root" => self.app_root = PathBuf::from(value),
            "data_dir" => self.data_dir = PathBuf::from(value),
            // Unknown keys are tolerated so older configs keep working.
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adw_defaults_match_documented_values() {
        let config = AdwConfig::default();
        assert_eq!(config.base_branch, "develop");
        assert_eq!(config.max_parallel, 3);
        assert_eq!(config.curator_model, "haiku");
    }

    #[test]
    fn parse_content_applies_known_keys() {
        let mut config = AdwConfig::default();
        config
            .parse_content("# comment\nmodel=sonnet\nbase_branch='main'\nphase_retries=5\n")
            .unwrap();
        assert_eq!(config.model, "sonnet");
        assert_eq!(config.base_branch, "main");
        assert_eq!(config.phase_retries, 5);
    }

    #[test]
    fn parse_content_rejects_garbage_lines() {
        let mut config = AdwConfig::default();
        let result = config.parse_content("not a key value pair");
        assert!(matches!(result, Err(ConfigError::InvalidLine(_))));
    }

    #[test]
    fn parse_content_rejects_bad_integers() {
        let mut config = AdwConfig::default();
        let result = config.parse_content("phase_retries=lots");
        assert!(matches!(result, Err(ConfigError::InvalidInt { .. })));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut config = AdwConfig::default();
        config.parse_content("future_knob=1").unwrap();
        assert_eq!(config.model, "opus");
    }

    #[test]
    fn kota_config_roots_paths_under_working_dir() {
        let config = KotaConfig::for_dir(PathBuf::from("/repo"));
        assert_eq!(config.export_dir, PathBuf::from("/repo/.kotadb/export"));
        assert_eq!(config.max_file_size, 1024 * 1024);
    }
}
