//! Domain-to-path rule set.
//!
//! The mapping is data, not code: `.kotadb/domains.toml` carries a
//! `[domains]` table of `name = ["path-prefix", ...]`. A missing file means
//! an empty rule set and key-file queries degrade to repo-wide ranking.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainRulesError {
    #[error("failed to read domain rules: {0}")]
    Read(#[from] std::io::Error),
    #[error("invalid domain rules: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DomainsFile {
    #[serde(default)]
    domains: BTreeMap<String, Vec<String>>,
}

/// Loaded domain rules.
#[derive(Debug, Clone, Default)]
pub struct DomainRules {
    domains: BTreeMap<String, Vec<String>>,
}

impl DomainRules {
    /// Load rules from disk; a missing file is an empty rule set.
    pub fn load(path: &Path) -> Result<Self, DomainRulesError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let parsed: DomainsFile = toml::from_str(&content)?;
        Ok(Self {
            domains: parsed.domains,
        })
    }

    pub fn from_map(domains: BTreeMap<String, Vec<String>>) -> Self {
        Self { domains }
    }

    /// Path prefixes for a domain; empty when the domain is unknown.
    pub fn prefixes_for(&self, domain: &str) -> &[String] {
        self.domains
            .get(domain)
            .map_or(&[], |prefixes| prefixes.as_slice())
    }

    pub fn domain_names(&self) -> impl Iterator<Item = &str> {
        self.domains.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_empty_rules() {
        let rules = DomainRules::load(Path::new("/definitely/not/here.toml")).unwrap();
        assert!(rules.is_empty());
        assert!(rules.prefixes_for("auth").is_empty());
    }

    #[test]
    fn parses_domains_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("domains.toml");
        std::fs::write(
            &path,
            "[domains]\nauth = [\"src/auth/\", \"src/session/\"]\napi = [\"src/api/\"]\n",
        )
        .unwrap();

        let rules = DomainRules::load(&path).unwrap();
        assert_eq!(rules.prefixes_for("auth"), ["src/auth/", "src/session/"]);
        assert_eq!(rules.domain_names().collect::<Vec<_>>(), vec!["api", "auth"]);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("domains.toml");
        std::fs::write(&path, "domains = 7").unwrap();
        assert!(DomainRules::load(&path).is_err());
    }
}
