//! Decisions, failures, patterns, and insights.
//!
//! Decisions and failures are searched through their FTS5 indexes; callers
//! receive `|bm25|` as relevance and may rely only on the ordering.

use kota_core::{Decision, DecisionScope, Failure, Id, Insight, InsightKind, Pattern};

use super::{now_str, parse_ts, Result, Storage};

/// A decision search hit with its FTS relevance.
#[derive(Debug, Clone)]
pub struct DecisionHit {
    pub decision: Decision,
    pub relevance: f64,
}

/// A failure search hit with its FTS relevance.
#[derive(Debug, Clone)]
pub struct FailureHit {
    pub failure: Failure,
    pub relevance: f64,
}

/// Fields for a new decision.
#[derive(Debug, Clone)]
pub struct DecisionInsert {
    pub repository_id: Option<Id>,
    pub title: String,
    pub context: String,
    pub decision: String,
    pub scope: DecisionScope,
    pub rationale: Option<String>,
    pub alternatives: Vec<String>,
    pub related_files: Vec<String>,
}

/// Fields for a new failure.
#[derive(Debug, Clone)]
pub struct FailureInsert {
    pub repository_id: Option<Id>,
    pub title: String,
    pub problem: String,
    pub approach: String,
    pub failure_reason: String,
    pub related_files: Vec<String>,
}

/// Fields for a pattern upsert (unique by `pattern_type`).
#[derive(Debug, Clone)]
pub struct PatternUpsert {
    pub repository_id: Option<Id>,
    pub pattern_type: String,
    pub file_path: Option<String>,
    pub description: String,
    pub example: Option<String>,
}

impl Storage {
    // --- Decisions ---

    pub async fn insert_decision(&self, insert: DecisionInsert) -> Result<Decision> {
        let id = Id::new();
        let now = now_str();
        sqlx::query(
            "INSERT INTO decisions (id, repository_id, title, context, decision, scope, rationale,
                                    alternatives, related_files, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        )
        .bind(id.as_ref())
        .bind(insert.repository_id.as_ref().map(|r| r.as_ref().to_string()))
        .bind(&insert.title)
        .bind(&insert.context)
        .bind(&insert.decision)
        .bind(insert.scope.as_str())
        .bind(&insert.rationale)
        .bind(serde_json::to_string(&insert.alternatives)?)
        .bind(serde_json::to_string(&insert.related_files)?)
        .bind(&now)
        .execute(self.pool())
        .await?;

        Ok(Decision {
            id,
            repository_id: insert.repository_id,
            title: insert.title,
            context: insert.context,
            decision: insert.decision,
            scope: insert.scope,
            rationale: insert.rationale,
            alternatives: insert.alternatives,
            related_files: insert.related_files,
            created_at: parse_ts(&now),
            updated_at: parse_ts(&now),
        })
    }

    /// BM25-ranked decision search; best matches first.
    pub async fn search_decisions(
        &self,
        query: &str,
        scope: Option<DecisionScope>,
        repository_id: Option<&Id>,
        limit: u32,
    ) -> Result<Vec<DecisionHit>> {
        let Some(fts) = fts_query(query) else {
            return Ok(Vec::new());
        };

        let mut sql = String::from(
            "SELECT d.id, d.repository_id, d.title, d.context, d.decision, d.scope, d.rationale,
                    d.alternatives, d.related_files, d.created_at, d.updated_at,
                    abs(bm25(decisions_fts)) AS relevance
             FROM decisions_fts
             JOIN decisions d ON d.rowid = decisions_fts.rowid
             WHERE decisions_fts MATCH ?1",
        );
        let mut bind_index = 2;
        if scope.is_some() {
            sql.push_str(&format!(" AND d.scope = ?{bind_index}"));
            bind_index += 1;
        }
        if repository_id.is_some() {
            sql.push_str(&format!(" AND d.repository_id = ?{bind_index}"));
        }
        sql.push_str(" ORDER BY bm25(decisions_fts) ASC LIMIT ");
        sql.push_str(&i64::from(limit).to_string());

        let mut query = sqlx::query_as::<_, DecisionHitRow>(&sql).bind(fts);
        if let Some(scope) = scope {
            query = query.bind(scope.as_str());
        }
        if let Some(repo) = repository_id {
            query = query.bind(repo.as_ref().to_string());
        }
        let rows = query.fetch_all(self.pool()).await?;
        Ok(rows.into_iter().map(DecisionHitRow::into_hit).collect())
    }

    // --- Failures ---

    pub async fn insert_failure(&self, insert: FailureInsert) -> Result<Failure> {
        let id = Id::new();
        let now = now_str();
        sqlx::query(
            "INSERT INTO failures (id, repository_id, title, problem, approach, failure_reason,
                                   related_files, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(id.as_ref())
        .bind(insert.repository_id.as_ref().map(|r| r.as_ref().to_string()))
        .bind(&insert.title)
        .bind(&insert.problem)
        .bind(&insert.approach)
        .bind(&insert.failure_reason)
        .bind(serde_json::to_string(&insert.related_files)?)
        .bind(&now)
        .execute(self.pool())
        .await?;

        Ok(Failure {
            id,
            repository_id: insert.repository_id,
            title: insert.title,
            problem: insert.problem,
            approach: insert.approach,
            failure_reason: insert.failure_reason,
            related_files: insert.related_files,
            created_at: parse_ts(&now),
        })
    }

    /// BM25-ranked failure search; best matches first.
    pub async fn search_failures(
        &self,
        query: &str,
        repository_id: Option<&Id>,
        limit: u32,
    ) -> Result<Vec<FailureHit>> {
        let Some(fts) = fts_query(query) else {
            return Ok(Vec::new());
        };

        let mut sql = String::from(
            "SELECT f.id, f.repository_id, f.title, f.problem, f.approach, f.failure_reason,
                    f.related_files, f.created_at,
                    abs(bm25(failures_fts)) AS relevance
             FROM failures_fts
             JOIN failures f ON f.rowid = failures_fts.rowid
             WHERE failures_fts MATCH ?1",
        );
        if repository_id.is_some() {
            sql.push_str(" AND f.repository_id = ?2");
        }
        sql.push_str(" ORDER BY bm25(failures_fts) ASC LIMIT ");
        sql.push_str(&i64::from(limit).to_string());

        let mut query = sqlx::query_as::<_, FailureHitRow>(&sql).bind(fts);
        if let Some(repo) = repository_id {
            query = query.bind(repo.as_ref().to_string());
        }
        let rows = query.fetch_all(self.pool()).await?;
        Ok(rows.into_iter().map(FailureHitRow::into_hit).collect())
    }

    // --- Patterns ---

    /// Insert or replace the pattern with the same `pattern_type`.
    pub async fn upsert_pattern(&self, upsert: PatternUpsert) -> Result<Pattern> {
        let now = now_str();
        sqlx::query(
            "INSERT INTO patterns (id, repository_id, pattern_type, file_path, description, example, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (pattern_type) DO UPDATE SET
                repository_id = excluded.repository_id,
                file_path = excluded.file_path,
                description = excluded.description,
                example = excluded.example,
                created_at = excluded.created_at",
        )
        .bind(Id::new().as_ref())
        .bind(upsert.repository_id.as_ref().map(|r| r.as_ref().to_string()))
        .bind(&upsert.pattern_type)
        .bind(&upsert.file_path)
        .bind(&upsert.description)
        .bind(&upsert.example)
        .bind(&now)
        .execute(self.pool())
        .await?;

        let row = sqlx::query_as::<_, PatternRow>(
            "SELECT id, repository_id, pattern_type, file_path, description, example, created_at
             FROM patterns WHERE pattern_type = ?1",
        )
        .bind(&upsert.pattern_type)
        .fetch_one(self.pool())
        .await?;
        Ok(row.into_pattern())
    }

    /// Pattern lookup, most recent first. No FTS; filters are exact or prefix.
    pub async fn search_patterns(
        &self,
        pattern_type: Option<&str>,
        file_path: Option<&str>,
        repository_id: Option<&Id>,
        limit: u32,
    ) -> Result<Vec<Pattern>> {
        let mut sql = String::from(
            "SELECT id, repository_id, pattern_type, file_path, description, example, created_at
             FROM patterns WHERE 1 = 1",
        );
        let mut bind_index = 1;
        if pattern_type.is_some() {
            sql.push_str(&format!(" AND pattern_type LIKE ?{bind_index} ESCAPE '\\'"));
            bind_index += 1;
        }
        if file_path.is_some() {
            sql.push_str(&format!(" AND file_path = ?{bind_index}"));
            bind_index += 1;
        }
        if repository_id.is_some() {
            sql.push_str(&format!(" AND repository_id = ?{bind_index}"));
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ");
        sql.push_str(&i64::from(limit).to_string());

        let mut query = sqlx::query_as::<_, PatternRow>(&sql);
        if let Some(pt) = pattern_type {
            query = query.bind(format!("{}%", super::repos::escape_like(pt)));
        }
        if let Some(fp) = file_path {
            query = query.bind(fp.to_string());
        }
        if let Some(repo) = repository_id {
            query = query.bind(repo.as_ref().to_string());
        }
        let rows = query.fetch_all(self.pool()).await?;
        Ok(rows.into_iter().map(PatternRow::into_pattern).collect())
    }

    pub async fn list_patterns(&self) -> Result<Vec<Pattern>> {
        self.search_patterns(None, None, None, u32::MAX.min(10_000))
            .await
    }

    /// Delete a pattern by type; used when its expertise document disappears.
    pub async fn delete_pattern(&self, pattern_type: &str) -> Result<bool> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT id FROM patterns WHERE pattern_type = ?1")
                .bind(pattern_type)
                .fetch_optional(self.pool())
                .await?;
        let Some((id,)) = row else {
            return Ok(false);
        };
        Self::record_deletion(self.pool(), "patterns", &id).await?;
        sqlx::query("DELETE FROM patterns WHERE id = ?1")
            .bind(&id)
            .execute(self.pool())
            .await?;
        Ok(true)
    }

    // --- Insights ---

    pub async fn insert_insight(
        &self,
        session_id: Option<String>,
        content: String,
        insight_type: InsightKind,
        related_file: Option<String>,
    ) -> Result<Insight> {
        let id = Id::new();
        let now = now_str();
        sqlx::query(
            "INSERT INTO insights (id, session_id, content, insight_type, related_file, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(id.as_ref())
        .bind(&session_id)
        .bind(&content)
        .bind(insight_type.as_str())
        .bind(&related_file)
        .bind(&now)
        .execute(self.pool())
        .await?;

        Ok(Insight {
            id,
            session_id,
            content,
            insight_type,
            related_file,
            created_at: parse_ts(&now),
        })
    }
}

/// Turn free text into an FTS5 MATCH expression.
///
/// Each alphanumeric token is quoted and OR-joined, which keeps FTS syntax
/// characters in user input inert. Returns None when no tokens survive.
fn fts_query(input: &str) -> Option<String> {
    let tokens: Vec<String> = input
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

fn parse_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

// --- Row types for SQLx ---

#[derive(sqlx::FromRow)]
struct DecisionHitRow {
    id: String,
    repository_id: Option<String>,
    title: String,
    context: String,
    decision: String,
    scope: String,
    rationale: Option<String>,
    alternatives: String,
    related_files: String,
    created_at: String,
    updated_at: String,
    relevance: f64,
}

impl DecisionHitRow {
    fn into_hit(self) -> DecisionHit {
        DecisionHit {
            decision: Decision {
                id: Id::from_string(self.id),
                repository_id: self.repository_id.map(Id::from_string),
                title: self.title,
                context: self.context,
                decision: self.decision,
                scope: DecisionScope::parse(&self.scope).unwrap_or(DecisionScope::Pattern),
                rationale: self.rationale,
                alternatives: parse_string_list(&self.alternatives),
                related_files: parse_string_list(&self.related_files),
                created_at: parse_ts(&self.created_at),
                updated_at: parse_ts(&self.updated_at),
            },
            relevance: self.relevance,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FailureHitRow {
    id: String,
    repository_id: Option<String>,
    title: String,
    problem: String,
    approach: String,
    failure_reason: String,
    related_files: String,
    created_at: String,
    relevance: f64,
}

impl FailureHitRow {
    fn into_hit(self) -> FailureHit {
        FailureHit {
            failure: Failure {
                id: Id::from_string(self.id),
                repository_id: self.repository_id.map(Id::from_string),
                title: self.title,
                problem: self.problem,
                approach: self.approach,
                failure_reason: self.failure_reason,
                related_files: parse_string_list(&self.related_files),
                created_at: parse_ts(&self.created_at),
            },
            relevance: self.relevance,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PatternRow {
    id: String,
    repository_id: Option<String>,
    pattern_type: String,
    file_path: Option<String>,
    description: String,
    example: Option<String>,
    created_at: String,
}

impl PatternRow {
    fn into_pattern(self) -> Pattern {
        Pattern {
            id: Id::from_string(self.id),
            repository_id: self.repository_id.map(Id::from_string),
            pattern_type: self.pattern_type,
            file_path: self.file_path,
            description: self.description,
            example: self.example,
            created_at: parse_ts(&self.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::create_test_storage;
    use super::*;

    fn decision(title: &str, body: &str) -> DecisionInsert {
        DecisionInsert {
            repository_id: None,
            title: title.to_string(),
            context: "context".to_string(),
            decision: body.to_string(),
            scope: DecisionScope::Architecture,
            rationale: Some("because".to_string()),
            alternatives: vec!["do nothing".to_string()],
            related_files: vec!["src/a.ts".to_string()],
        }
    }

    #[tokio::test]
    async fn decision_fts_finds_by_body_terms() {
        let ts = create_test_storage().await;
        ts.storage
            .insert_decision(decision("Use sqlite", "embed the database in process"))
            .await
            .unwrap();
        ts.storage
            .insert_decision(decision("Use worktrees", "isolate agent checkouts"))
            .await
            .unwrap();

        let hits = ts
            .storage
            .search_decisions("embed database", None, None, 10)
            .await
            .unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].decision.title, "Use sqlite");
        assert!(hits[0].relevance >= 0.0);
    }

    #[tokio::test]
    async fn decision_search_respects_scope_filter() {
        let ts = create_test_storage().await;
        ts.storage
            .insert_decision(decision("Use sqlite", "embed the database"))
            .await
            .unwrap();

        let hits = ts
            .storage
            .search_decisions("sqlite", Some(DecisionScope::Workaround), None, 10)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn fts_query_neutralizes_operators() {
        assert_eq!(fts_query("a AND b"), Some("\"a\" OR \"AND\" OR \"b\"".to_string()));
        assert_eq!(fts_query("\"*():"), None);
    }

    #[tokio::test]
    async fn failure_search_round_trips_related_files() {
        let ts = create_test_storage().await;
        ts.storage
            .insert_failure(FailureInsert {
                repository_id: None,
                title: "Mocked git".to_string(),
                problem: "tests were green but push failed".to_string(),
                approach: "stubbed subprocess".to_string(),
                failure_reason: "hid the real exit codes".to_string(),
                related_files: vec!["automation/pr.ts".to_string()],
            })
            .await
            .unwrap();

        let hits = ts.storage.search_failures("push", None, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].failure.related_files, vec!["automation/pr.ts"]);
    }

    #[tokio::test]
    async fn pattern_upsert_is_unique_by_type() {
        let ts = create_test_storage().await;
        let first = ts
            .storage
            .upsert_pattern(PatternUpsert {
                repository_id: None,
                pattern_type: "auth:session".to_string(),
                file_path: None,
                description: "v1".to_string(),
                example: None,
            })
            .await
            .unwrap();
        let second = ts
            .storage
            .upsert_pattern(PatternUpsert {
                repository_id: None,
                pattern_type: "auth:session".to_string(),
                file_path: Some("src/auth.ts".to_string()),
                description: "v2".to_string(),
                example: None,
            })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.description, "v2");

        let all = ts
            .storage
            .search_patterns(Some("auth:"), None, None, 10)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn insight_insert_persists() {
        let ts = create_test_storage().await;
        let insight = ts
            .storage
            .insert_insight(
                Some("sess-1".to_string()),
                "build cache misses dominate".to_string(),
                InsightKind::Discovery,
                None,
            )
            .await
            .unwrap();
        assert_eq!(insight.insight_type, InsightKind::Discovery);
    }
}
