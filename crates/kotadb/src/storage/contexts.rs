//! Workflow context store: curated inter-phase summaries.
//!
//! One row per `(workflow_id, phase)` with upsert semantics. Contexts for
//! failed workflows are retained so a resume can re-inject them.

use kota_core::{Id, WorkflowContext, WorkflowPhase};

use super::{now_str, parse_ts, Result, Storage};

impl Storage {
    /// Upsert the context for one phase of a workflow.
    pub async fn store_context(
        &self,
        workflow_id: &str,
        phase: WorkflowPhase,
        context_data: &serde_json::Value,
    ) -> Result<WorkflowContext> {
        let now = now_str();
        sqlx::query(
            "INSERT INTO workflow_contexts (id, workflow_id, phase, context_data, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT (workflow_id, phase) DO UPDATE SET
                context_data = excluded.context_data,
                updated_at = excluded.updated_at",
        )
        .bind(Id::new().as_ref())
        .bind(workflow_id)
        .bind(phase.as_str())
        .bind(context_data.to_string())
        .bind(&now)
        .execute(self.pool())
        .await?;

        let row = sqlx::query_as::<_, ContextRow>(
            "SELECT id, workflow_id, phase, context_data, created_at, updated_at
             FROM workflow_contexts WHERE workflow_id = ?1 AND phase = ?2",
        )
        .bind(workflow_id)
        .bind(phase.as_str())
        .fetch_one(self.pool())
        .await?;
        Ok(row.into_context())
    }

    /// Fetch one phase's context, or all contexts of the workflow.
    pub async fn get_contexts(
        &self,
        workflow_id: &str,
        phase: Option<WorkflowPhase>,
    ) -> Result<Vec<WorkflowContext>> {
        let rows = match phase {
            Some(phase) => {
                sqlx::query_as::<_, ContextRow>(
                    "SELECT id, workflow_id, phase, context_data, created_at, updated_at
                     FROM workflow_contexts WHERE workflow_id = ?1 AND phase = ?2",
                )
                .bind(workflow_id)
                .bind(phase.as_str())
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, ContextRow>(
                    "SELECT id, workflow_id, phase, context_data, created_at, updated_at
                     FROM workflow_contexts WHERE workflow_id = ?1 ORDER BY phase",
                )
                .bind(workflow_id)
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(rows.into_iter().map(ContextRow::into_context).collect())
    }

    /// Delete all contexts of a workflow; returns the number removed.
    pub async fn clear_contexts(&self, workflow_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM workflow_contexts WHERE workflow_id = ?1")
            .bind(workflow_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct ContextRow {
    id: String,
    workflow_id: String,
    phase: String,
    context_data: String,
    created_at: String,
    updated_at: String,
}

impl ContextRow {
    fn into_context(self) -> WorkflowContext {
        WorkflowContext {
            id: Id::from_string(self.id),
            workflow_id: self.workflow_id,
            phase: WorkflowPhase::parse(&self.phase).unwrap_or(WorkflowPhase::Analysis),
            context_data: serde_json::from_str(&self.context_data).unwrap_or_default(),
            created_at: parse_ts(&self.created_at),
            updated_at: parse_ts(&self.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::create_test_storage;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn store_twice_keeps_one_row_with_latest_payload() {
        let ts = create_test_storage().await;
        let first = ts
            .storage
            .store_context("wf-1", WorkflowPhase::Plan, &json!({"summary": "v1"}))
            .await
            .unwrap();
        let second = ts
            .storage
            .store_context("wf-1", WorkflowPhase::Plan, &json!({"summary": "v2"}))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let rows = ts
            .storage
            .get_contexts("wf-1", Some(WorkflowPhase::Plan))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].context_data["summary"], "v2");
    }

    #[tokio::test]
    async fn clear_returns_exact_count_and_empties() {
        let ts = create_test_storage().await;
        for phase in [WorkflowPhase::Analysis, WorkflowPhase::Plan, WorkflowPhase::Build] {
            ts.storage
                .store_context("wf-2", phase, &json!({}))
                .await
                .unwrap();
        }
        ts.storage
            .store_context("wf-other", WorkflowPhase::Analysis, &json!({}))
            .await
            .unwrap();

        let cleared = ts.storage.clear_contexts("wf-2").await.unwrap();
        assert_eq!(cleared, 3);
        assert!(ts.storage.get_contexts("wf-2", None).await.unwrap().is_empty());
        // Other workflows are untouched.
        assert_eq!(ts.storage.get_contexts("wf-other", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_all_contexts_returns_each_phase() {
        let ts = create_test_storage().await;
        ts.storage
            .store_context("wf-3", WorkflowPhase::Analysis, &json!({"n": 1}))
            .await
            .unwrap();
        ts.storage
            .store_context("wf-3", WorkflowPhase::Build, &json!({"n": 2}))
            .await
            .unwrap();

        let all = ts.storage.get_contexts("wf-3", None).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
