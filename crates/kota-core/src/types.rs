//! Entity types for the code-intelligence data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for all stored entities.
/// Uses `UUIDv7` for time-ordered lexicographic sorting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub String);

impl Id {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// --- Enumerations ---

/// Kind of an extracted symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    Type,
    Variable,
    Constant,
    Method,
    Property,
    Module,
    Namespace,
    Enum,
    EnumMember,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::Method => "method",
            Self::Property => "property",
            Self::Module => "module",
            Self::Namespace => "namespace",
            Self::Enum => "enum",
            Self::EnumMember => "enum_member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "function" => Self::Function,
            "class" => Self::Class,
            "interface" => Self::Interface,
            "type" => Self::Type,
            "variable" => Self::Variable,
            "constant" => Self::Constant,
            "method" => Self::Method,
            "property" => Self::Property,
            "module" => Self::Module,
            "namespace" => Self::Namespace,
            "enum" => Self::Enum,
            "enum_member" => Self::EnumMember,
            _ => return None,
        })
    }
}

/// Kind of a cross-file reference (one directed edge in the file graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Import,
    ReExport,
    ExportAll,
    DynamicImport,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::ReExport => "re_export",
            Self::ExportAll => "export_all",
            Self::DynamicImport => "dynamic_import",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "import" => Self::Import,
            "re_export" => Self::ReExport,
            "export_all" => Self::ExportAll,
            "dynamic_import" => Self::DynamicImport,
            _ => return None,
        })
    }
}

/// Scope of a recorded decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionScope {
    Architecture,
    Pattern,
    Convention,
    Workaround,
}

impl DecisionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Architecture => "architecture",
            Self::Pattern => "pattern",
            Self::Convention => "convention",
            Self::Workaround => "workaround",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "architecture" => Self::Architecture,
            "pattern" => Self::Pattern,
            "convention" => Self::Convention,
            "workaround" => Self::Workaround,
            _ => return None,
        })
    }
}

/// Kind of a recorded insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Discovery,
    Failure,
    Workaround,
}

impl InsightKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Failure => "failure",
            Self::Workaround => "workaround",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "discovery" => Self::Discovery,
            "failure" => Self::Failure,
            "workaround" => Self::Workaround,
            _ => return None,
        })
    }
}

/// Phase key for stored workflow contexts.
///
/// The `pr` phase never stores a context; it only consumes the `build` one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Analysis,
    Plan,
    Build,
    Improve,
}

impl WorkflowPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Plan => "plan",
            Self::Build => "build",
            Self::Improve => "improve",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "analysis" => Self::Analysis,
            "plan" => Self::Plan,
            "build" => Self::Build,
            "improve" => Self::Improve,
            _ => return None,
        })
    }
}

/// Issue classification produced by the analysis phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Feature,
    Bug,
    Chore,
    Refactor,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Bug => "bug",
            Self::Chore => "chore",
            Self::Refactor => "refactor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.trim().to_ascii_lowercase().as_str() {
            "feature" => Self::Feature,
            "bug" => Self::Bug,
            "chore" => Self::Chore,
            "refactor" => Self::Refactor,
            _ => return None,
        })
    }
}

// --- Core entities ---

/// An indexed source repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: Id,
    /// `owner/name` for remote repos, `local/<dir>` otherwise. Unique.
    pub full_name: String,
    /// Absolute local path or clone URL; the canonical local fingerprint.
    pub git_url: String,
    pub created_at: DateTime<Utc>,
    /// Advanced on every successful full or incremental index; never regresses.
    pub last_indexed_at: Option<DateTime<Utc>>,
}

/// One indexed file within a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Id,
    pub repository_id: Id,
    /// Repository-relative, POSIX-normalized path.
    pub path: String,
    pub language: String,
    /// Hex SHA-256 of the raw file bytes; the incremental-change key.
    pub content_hash: String,
    pub size: u64,
    pub indexed_at: DateTime<Utc>,
    pub content: Option<String>,
}

/// A symbol extracted from a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: Id,
    pub file_id: Id,
    pub name: String,
    pub kind: SymbolKind,
    pub signature: Option<String>,
    pub documentation: Option<String>,
    /// 1-based inclusive line range.
    pub line_start: u32,
    pub line_end: u32,
    /// Structured extras, e.g. `{"is_exported": true}`.
    pub metadata: serde_json::Value,
}

/// One directed edge in the file-level dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub id: Id,
    /// Source file of the edge.
    pub file_id: Id,
    /// Resolved target path within the same repository; None when unresolved.
    pub target_file_path: Option<String>,
    pub target_symbol_name: Option<String>,
    pub reference_type: ReferenceKind,
    /// Carries at least `importSource`, the raw import specifier.
    pub metadata: serde_json::Value,
}

impl Reference {
    /// The raw import specifier as written in the source file.
    pub fn import_source(&self) -> Option<&str> {
        self.metadata.get("importSource").and_then(|v| v.as_str())
    }
}

/// A recorded architectural or tactical decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: Id,
    pub repository_id: Option<Id>,
    pub title: String,
    pub context: String,
    pub decision: String,
    pub scope: DecisionScope,
    pub rationale: Option<String>,
    pub alternatives: Vec<String>,
    pub related_files: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A recorded failed approach, kept so agents do not repeat it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub id: Id,
    pub repository_id: Option<Id>,
    pub title: String,
    pub problem: String,
    pub approach: String,
    pub failure_reason: String,
    pub related_files: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A reusable code pattern, unique by `pattern_type` (`"domain:name"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: Id,
    pub repository_id: Option<Id>,
    pub pattern_type: String,
    pub file_path: Option<String>,
    pub description: String,
    pub example: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A lightweight session observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: Id,
    pub session_id: Option<String>,
    pub content: String,
    pub insight_type: InsightKind,
    pub related_file: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Curated inter-phase context for one workflow, unique on `(workflow_id, phase)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub id: Id,
    pub workflow_id: String,
    pub phase: WorkflowPhase,
    /// Opaque JSON payload produced by the curator.
    pub context_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_generates_unique_values() {
        let id1 = Id::new();
        let id2 = Id::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn symbol_kind_round_trips() {
        for kind in [
            SymbolKind::Function,
            SymbolKind::EnumMember,
            SymbolKind::Namespace,
        ] {
            assert_eq!(SymbolKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SymbolKind::parse("struct"), None);
    }

    #[test]
    fn reference_kind_serializes_correctly() {
        assert_eq!(
            serde_json::to_string(&ReferenceKind::ReExport).unwrap(),
            "\"re_export\""
        );
        assert_eq!(
            serde_json::to_string(&ReferenceKind::DynamicImport).unwrap(),
            "\"dynamic_import\""
        );
    }

    #[test]
    fn workflow_phase_rejects_pr() {
        assert_eq!(WorkflowPhase::parse("pr"), None);
        assert_eq!(WorkflowPhase::parse("build"), Some(WorkflowPhase::Build));
    }

    #[test]
    fn issue_type_parse_is_case_insensitive() {
        assert_eq!(IssueType::parse(" Bug "), Some(IssueType::Bug));
        assert_eq!(IssueType::parse("enhancement"), None);
    }

    #[test]
    fn reference_import_source_reads_metadata() {
        let r = Reference {
            id: Id::new(),
            file_id: Id::new(),
            target_file_path: None,
            target_symbol_name: None,
            reference_type: ReferenceKind::Import,
            metadata: serde_json::json!({"importSource": "./b"}),
        };
        assert_eq!(r.import_source(), Some("./b"));
    }
}
