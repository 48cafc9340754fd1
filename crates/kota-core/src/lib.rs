//! kota-core - shared types for the code-intelligence engine and the
//! autonomous developer workflow orchestrator.

pub mod config;
pub mod error;
pub mod exit;
pub mod retry;
pub mod sections;
pub mod types;

pub use config::{AdwConfig, KotaConfig};
pub use error::ToolError;
pub use exit::AdwExit;
pub use retry::{is_transient, RetryPolicy};
pub use types::{
    Decision, DecisionScope, Failure, FileRecord, Id, Insight, InsightKind, IssueType, Pattern,
    Reference, ReferenceKind, Repository, Symbol, SymbolKind, WorkflowContext, WorkflowPhase,
};
