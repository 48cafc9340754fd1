//! Error taxonomy shared by the tool surface and the orchestrator.
//!
//! Tools convert internal errors into one of these kinds and return them as
//! structured responses; only `Fatal` terminates the process.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// Schema or validation failure at the tool surface or RPC layer.
    #[error("invalid params: {0}")]
    InvalidParams(String),
    /// The addressed entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Unique-key violation that cannot be resolved by upsert.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Retriable external failure (network, rate limit, overload).
    #[error("transient: {0}")]
    Transient(String),
    /// Unrecoverable failure: database open, migration, database-file I/O.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl ToolError {
    /// JSON-RPC error code for the wire response.
    pub fn code(&self) -> i64 {
        match self {
            Self::InvalidParams(_) => -32602,
            Self::NotFound(_) => -32001,
            Self::Conflict(_) => -32002,
            Self::Transient(_) => -32003,
            Self::Fatal(_) => -32603,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_params_uses_canonical_code() {
        assert_eq!(ToolError::invalid("depth must be 1..=5").code(), -32602);
    }

    #[test]
    fn kinds_map_to_distinct_codes() {
        let codes = [
            ToolError::InvalidParams(String::new()).code(),
            ToolError::NotFound(String::new()).code(),
            ToolError::Conflict(String::new()).code(),
            ToolError::Transient(String::new()).code(),
            ToolError::Fatal(String::new()).code(),
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }
}
