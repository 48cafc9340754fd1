//! Repository, file, symbol, and reference persistence.
//!
//! All mutations for one file are applied inside a single transaction, so a
//! crashed index leaves either the old or the fully new state per file.

use chrono::{DateTime, Utc};
use kota_core::{FileRecord, Id, Reference, ReferenceKind, Repository, Symbol, SymbolKind};

use super::{format_ts, now_str, parse_ts, parse_ts_opt, Result, Storage, StorageError};

/// File columns selected by every file query.
const FILE_COLUMNS: &str =
    "id, repository_id, path, language, content_hash, size, indexed_at, content";

/// New or replacing content for one file.
#[derive(Debug, Clone)]
pub struct FileUpsert {
    pub path: String,
    pub language: String,
    pub content_hash: String,
    pub size: u64,
    pub content: Option<String>,
}

/// Extracted symbol, not yet bound to a file row.
#[derive(Debug, Clone)]
pub struct SymbolInsert {
    pub name: String,
    pub kind: SymbolKind,
    pub signature: Option<String>,
    pub documentation: Option<String>,
    pub line_start: u32,
    pub line_end: u32,
    pub metadata: serde_json::Value,
}

/// Extracted reference, not yet resolved to a target file.
#[derive(Debug, Clone)]
pub struct ReferenceInsert {
    pub target_symbol_name: Option<String>,
    pub reference_type: ReferenceKind,
    /// Must carry `importSource`.
    pub metadata: serde_json::Value,
}

/// A symbol search hit with its file location.
#[derive(Debug, Clone)]
pub struct SymbolHit {
    pub symbol: Symbol,
    pub file_path: String,
}

/// One resolved edge of the file dependency graph.
#[derive(Debug, Clone)]
pub struct Edge {
    pub source_path: String,
    pub target_path: String,
    pub reference_type: ReferenceKind,
}

/// An unresolved import surfaced alongside traversal results.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UnresolvedImport {
    pub source_path: String,
    pub import_source: String,
}

impl Storage {
    // --- Repositories ---

    /// Insert the repository if new, otherwise return the existing row.
    pub async fn upsert_repository(&self, full_name: &str, git_url: &str) -> Result<Repository> {
        if let Some(existing) = self.find_repository_by_name(full_name).await? {
            return Ok(existing);
        }

        let repo = Repository {
            id: Id::new(),
            full_name: full_name.to_string(),
            git_url: git_url.to_string(),
            created_at: Utc::now(),
            last_indexed_at: None,
        };
        sqlx::query(
            "INSERT INTO repositories (id, full_name, git_url, created_at, last_indexed_at)
             VALUES (?1, ?2, ?3, ?4, NULL)",
        )
        .bind(repo.id.as_ref())
        .bind(&repo.full_name)
        .bind(&repo.git_url)
        .bind(format_ts(repo.created_at))
        .execute(self.pool())
        .await?;

        Ok(repo)
    }

    pub async fn get_repository(&self, id: &Id) -> Result<Repository> {
        let row = sqlx::query_as::<_, RepositoryRow>(
            "SELECT id, full_name, git_url, created_at, last_indexed_at
             FROM repositories WHERE id = ?1",
        )
        .bind(id.as_ref())
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| StorageError::RepositoryNotFound(id.to_string()))?;
        Ok(row.into_repository())
    }

    pub async fn find_repository_by_name(&self, full_name: &str) -> Result<Option<Repository>> {
        let row = sqlx::query_as::<_, RepositoryRow>(
            "SELECT id, full_name, git_url, created_at, last_indexed_at
             FROM repositories WHERE full_name = ?1",
        )
        .bind(full_name)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(RepositoryRow::into_repository))
    }

    /// Look up the repository whose `git_url` fingerprints a local path.
    pub async fn find_repository_by_git_url(&self, git_url: &str) -> Result<Option<Repository>> {
        let row = sqlx::query_as::<_, RepositoryRow>(
            "SELECT id, full_name, git_url, created_at, last_indexed_at
             FROM repositories WHERE git_url = ?1",
        )
        .bind(git_url)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(RepositoryRow::into_repository))
    }

    pub async fn list_repositories(&self) -> Result<Vec<Repository>> {
        let rows = sqlx::query_as::<_, RepositoryRow>(
            "SELECT id, full_name, git_url, created_at, last_indexed_at
             FROM repositories ORDER BY created_at ASC",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(RepositoryRow::into_repository).collect())
    }

    /// Advance `last_indexed_at`. The guard keeps it non-decreasing.
    pub async fn advance_last_indexed(&self, id: &Id, at: DateTime<Utc>) -> Result<()> {
        let stamp = format_ts(at);
        let result = sqlx::query(
            "UPDATE repositories SET last_indexed_at = ?1
             WHERE id = ?2 AND (last_indexed_at IS NULL OR last_indexed_at <= ?1)",
        )
        .bind(&stamp)
        .bind(id.as_ref())
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            // Either unknown repository or a newer stamp already present.
            let exists: Option<(String,)> =
                sqlx::query_as("SELECT id FROM repositories WHERE id = ?1")
                    .bind(id.as_ref())
                    .fetch_optional(self.pool())
                    .await?;
            if exists.is_none() {
                return Err(StorageError::RepositoryNotFound(id.to_string()));
            }
        }
        Ok(())
    }

    // --- Files ---

    pub async fn get_file(&self, id: &Id) -> Result<FileRecord> {
        let query = format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1");
        let row = sqlx::query_as::<_, FileRow>(&query)
            .bind(id.as_ref())
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| StorageError::FileNotFound(id.to_string()))?;
        Ok(row.into_file())
    }

    pub async fn get_file_by_path(
        &self,
        repository_id: &Id,
        path: &str,
    ) -> Result<Option<FileRecord>> {
        let query =
            format!("SELECT {FILE_COLUMNS} FROM files WHERE repository_id = ?1 AND path = ?2");
        let row = sqlx::query_as::<_, FileRow>(&query)
            .bind(repository_id.as_ref())
            .bind(path)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(FileRow::into_file))
    }

    /// Resolve a repository-relative path to a file id.
    pub async fn resolve_file_path(&self, repository_id: &Id, path: &str) -> Result<Option<Id>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT id FROM files WHERE repository_id = ?1 AND path = ?2")
                .bind(repository_id.as_ref())
                .bind(path)
                .fetch_optional(self.pool())
                .await?;
        Ok(row.map(|(id,)| Id::from_string(id)))
    }

    /// Id, path, and language of every file in a repository.
    pub async fn list_file_meta(&self, repository_id: &Id) -> Result<Vec<(Id, String, String)>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT id, path, language FROM files WHERE repository_id = ?1 ORDER BY path",
        )
        .bind(repository_id.as_ref())
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, path, language)| (Id::from_string(id), path, language))
            .collect())
    }

    /// All indexed paths of a repository.
    pub async fn file_paths(&self, repository_id: &Id) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT path FROM files WHERE repository_id = ?1 ORDER BY path")
                .bind(repository_id.as_ref())
                .fetch_all(self.pool())
                .await?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }

    pub async fn count_files(&self, repository_id: &Id) -> Result<u64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files WHERE repository_id = ?1")
            .bind(repository_id.as_ref())
            .fetch_one(self.pool())
            .await?;
        Ok(count.0 as u64)
    }

    pub async fn list_recent_files(
        &self,
        repository_id: Option<&Id>,
        limit: u32,
    ) -> Result<Vec<FileRecord>> {
        let rows = match repository_id {
            Some(repo) => {
                let query = format!(
                    "SELECT {FILE_COLUMNS} FROM files WHERE repository_id = ?1
                     ORDER BY indexed_at DESC, path ASC LIMIT ?2"
                );
                sqlx::query_as::<_, FileRow>(&query)
                    .bind(repo.as_ref())
                    .bind(i64::from(limit))
                    .fetch_all(self.pool())
                    .await?
            }
            None => {
                let query = format!(
                    "SELECT {FILE_COLUMNS} FROM files
                     ORDER BY indexed_at DESC, path ASC LIMIT ?1"
                );
                sqlx::query_as::<_, FileRow>(&query)
                    .bind(i64::from(limit))
                    .fetch_all(self.pool())
                    .await?
            }
        };
        Ok(rows.into_iter().map(FileRow::into_file).collect())
    }

    /// Upsert one file with its freshly extracted symbols and references.
    ///
    /// Previous symbols and references of the file are replaced. The whole
    /// operation is one transaction.
    pub async fn index_file(
        &self,
        repository_id: &Id,
        file: &FileUpsert,
        symbols: &[SymbolInsert],
        references: &[ReferenceInsert],
    ) -> Result<Id> {
        let mut tx = self.pool().begin().await?;
        let now = now_str();

        sqlx::query(
            "INSERT INTO files (id, repository_id, path, language, content_hash, size, indexed_at, content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (repository_id, path) DO UPDATE SET
                language = excluded.language,
                content_hash = excluded.content_hash,
                size = excluded.size,
                indexed_at = excluded.indexed_at,
                content = excluded.content",
        )
        .bind(Id::new().as_ref())
        .bind(repository_id.as_ref())
        .bind(&file.path)
        .bind(&file.language)
        .bind(&file.content_hash)
        .bind(file.size as i64)
        .bind(&now)
        .bind(&file.content)
        .execute(&mut *tx)
        .await?;

        let (file_id,): (String,) =
            sqlx::query_as("SELECT id FROM files WHERE repository_id = ?1 AND path = ?2")
                .bind(repository_id.as_ref())
                .bind(&file.path)
                .fetch_one(&mut *tx)
                .await?;

        // Record replaced symbol/reference ids for the deletion manifest.
        let old_symbols: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM symbols WHERE file_id = ?1")
                .bind(&file_id)
                .fetch_all(&mut *tx)
                .await?;
        for (id,) in &old_symbols {
            Self::record_deletion(&mut *tx, "symbols", id).await?;
        }
        let old_refs: Vec<(String,)> = sqlx::query_as("SELECT id FROM refs WHERE file_id = ?1")
            .bind(&file_id)
            .fetch_all(&mut *tx)
            .await?;
        for (id,) in &old_refs {
            Self::record_deletion(&mut *tx, "refs", id).await?;
        }

        sqlx::query("DELETE FROM symbols WHERE file_id = ?1")
            .bind(&file_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM refs WHERE file_id = ?1")
            .bind(&file_id)
            .execute(&mut *tx)
            .await?;

        for symbol in symbols {
            sqlx::query(
                "INSERT INTO symbols (id, file_id, name, kind, signature, documentation, line_start, line_end, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .bind(Id::new().as_ref())
            .bind(&file_id)
            .bind(&symbol.name)
            .bind(symbol.kind.as_str())
            .bind(&symbol.signature)
            .bind(&symbol.documentation)
            .bind(i64::from(symbol.line_start))
            .bind(i64::from(symbol.line_end))
            .bind(symbol.metadata.to_string())
            .execute(&mut *tx)
            .await?;
        }

        for reference in references {
            sqlx::query(
                "INSERT INTO refs (id, file_id, target_file_path, target_symbol_name, reference_type, metadata)
                 VALUES (?1, ?2, NULL, ?3, ?4, ?5)",
            )
            .bind(Id::new().as_ref())
            .bind(&file_id)
            .bind(&reference.target_symbol_name)
            .bind(reference.reference_type.as_str())
            .bind(reference.metadata.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Id::from_string(file_id))
    }

    /// Delete one file; symbols and references cascade.
    ///
    /// Returns false when the path was not indexed.
    pub async fn delete_file(&self, repository_id: &Id, path: &str) -> Result<bool> {
        let mut tx = self.pool().begin().await?;

        let row: Option<(String,)> =
            sqlx::query_as("SELECT id FROM files WHERE repository_id = ?1 AND path = ?2")
                .bind(repository_id.as_ref())
                .bind(path)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((file_id,)) = row else {
            return Ok(false);
        };

        let symbols: Vec<(String,)> = sqlx::query_as("SELECT id FROM symbols WHERE file_id = ?1")
            .bind(&file_id)
            .fetch_all(&mut *tx)
            .await?;
        for (id,) in &symbols {
            Self::record_deletion(&mut *tx, "symbols", id).await?;
        }
        let refs: Vec<(String,)> = sqlx::query_as("SELECT id FROM refs WHERE file_id = ?1")
            .bind(&file_id)
            .fetch_all(&mut *tx)
            .await?;
        for (id,) in &refs {
            Self::record_deletion(&mut *tx, "refs", id).await?;
        }
        Self::record_deletion(&mut *tx, "files", &file_id).await?;

        sqlx::query("DELETE FROM files WHERE id = ?1")
            .bind(&file_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    // --- Symbols ---

    pub async fn symbols_for_file(&self, file_id: &Id) -> Result<Vec<Symbol>> {
        let rows = sqlx::query_as::<_, SymbolRow>(
            "SELECT id, file_id, name, kind, signature, documentation, line_start, line_end, metadata
             FROM symbols WHERE file_id = ?1 ORDER BY line_start ASC",
        )
        .bind(file_id.as_ref())
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(SymbolRow::into_symbol).collect())
    }

    pub async fn count_symbols(&self, repository_id: &Id) -> Result<u64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM symbols s JOIN files f ON f.id = s.file_id
             WHERE f.repository_id = ?1",
        )
        .bind(repository_id.as_ref())
        .fetch_one(self.pool())
        .await?;
        Ok(count.0 as u64)
    }

    /// Name-substring symbol search, ordered lexicographically by name.
    pub async fn search_symbols(
        &self,
        term: &str,
        kinds: &[SymbolKind],
        exported_only: bool,
        repository_id: Option<&Id>,
        limit: u32,
    ) -> Result<Vec<SymbolHit>> {
        let mut sql = String::from(
            "SELECT s.id, s.file_id, s.name, s.kind, s.signature, s.documentation,
                    s.line_start, s.line_end, s.metadata, f.path
             FROM symbols s JOIN files f ON f.id = s.file_id
             WHERE s.name LIKE ?1 ESCAPE '\\'",
        );
        if repository_id.is_some() {
            sql.push_str(" AND f.repository_id = ?2");
        }
        if !kinds.is_empty() {
            // Kind names come from a closed enum, never from the caller verbatim.
            let list = kinds
                .iter()
                .map(|k| format!("'{}'", k.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" AND s.kind IN ({list})"));
        }
        if exported_only {
            sql.push_str(" AND json_extract(s.metadata, '$.is_exported') = 1");
        }
        sql.push_str(" ORDER BY s.name ASC, f.path ASC LIMIT ");
        sql.push_str(&i64::from(limit).to_string());

        let pattern = format!("%{}%", escape_like(term));
        let mut query = sqlx::query_as::<_, SymbolHitRow>(&sql).bind(pattern);
        if let Some(repo) = repository_id {
            query = query.bind(repo.as_ref().to_string());
        }
        let rows = query.fetch_all(self.pool()).await?;
        Ok(rows.into_iter().map(SymbolHitRow::into_hit).collect())
    }

    // --- File search ---

    /// Path and content search. Path matches rank above pure content matches;
    /// ties break by `indexed_at` descending.
    pub async fn search_files(
        &self,
        term: &str,
        repository_id: Option<&Id>,
        limit: u32,
    ) -> Result<Vec<FileRecord>> {
        let mut sql = format!(
            "SELECT {FILE_COLUMNS} FROM files
             WHERE (path LIKE ?1 ESCAPE '\\' OR content LIKE ?1 ESCAPE '\\')"
        );
        if repository_id.is_some() {
            sql.push_str(" AND repository_id = ?2");
        }
        sql.push_str(
            " ORDER BY (path LIKE ?1 ESCAPE '\\') DESC, indexed_at DESC, path ASC LIMIT ",
        );
        sql.push_str(&i64::from(limit).to_string());

        let pattern = format!("%{}%", escape_like(term));
        let mut query = sqlx::query_as::<_, FileRow>(&sql).bind(pattern);
        if let Some(repo) = repository_id {
            query = query.bind(repo.as_ref().to_string());
        }
        let rows = query.fetch_all(self.pool()).await?;
        Ok(rows.into_iter().map(FileRow::into_file).collect())
    }

    // --- References ---

    pub async fn references_for_file(&self, file_id: &Id) -> Result<Vec<Reference>> {
        let rows = sqlx::query_as::<_, RefRow>(
            "SELECT id, file_id, target_file_path, target_symbol_name, reference_type, metadata
             FROM refs WHERE file_id = ?1",
        )
        .bind(file_id.as_ref())
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(RefRow::into_reference).collect())
    }

    pub async fn count_references(&self, repository_id: &Id) -> Result<u64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM refs r JOIN files f ON f.id = r.file_id
             WHERE f.repository_id = ?1",
        )
        .bind(repository_id.as_ref())
        .fetch_one(self.pool())
        .await?;
        Ok(count.0 as u64)
    }

    pub async fn update_reference_target(
        &self,
        reference_id: &Id,
        target_file_path: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE refs SET target_file_path = ?1 WHERE id = ?2")
            .bind(target_file_path)
            .bind(reference_id.as_ref())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Source files whose references currently resolve to `path`.
    pub async fn files_referencing_path(
        &self,
        repository_id: &Id,
        path: &str,
    ) -> Result<Vec<Id>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT f.id FROM refs r JOIN files f ON f.id = r.file_id
             WHERE f.repository_id = ?1 AND r.target_file_path = ?2",
        )
        .bind(repository_id.as_ref())
        .bind(path)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|(id,)| Id::from_string(id)).collect())
    }

    /// Every resolved edge of a repository's file graph.
    pub async fn edges(&self, repository_id: &Id) -> Result<Vec<Edge>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT f.path, r.target_file_path, r.reference_type
             FROM refs r JOIN files f ON f.id = r.file_id
             WHERE f.repository_id = ?1 AND r.target_file_path IS NOT NULL",
        )
        .bind(repository_id.as_ref())
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(source, target, kind)| {
                ReferenceKind::parse(&kind).map(|reference_type| Edge {
                    source_path: source,
                    target_path: target,
                    reference_type,
                })
            })
            .collect())
    }

    /// Unresolved imports of one file (or of the whole repository).
    pub async fn unresolved_imports(
        &self,
        repository_id: &Id,
        source_path: Option<&str>,
    ) -> Result<Vec<UnresolvedImport>> {
        let mut sql = String::from(
            "SELECT f.path, json_extract(r.metadata, '$.importSource')
             FROM refs r JOIN files f ON f.id = r.file_id
             WHERE f.repository_id = ?1 AND r.target_file_path IS NULL",
        );
        if source_path.is_some() {
            sql.push_str(" AND f.path = ?2");
        }
        sql.push_str(" ORDER BY f.path ASC");

        let mut query = sqlx::query_as::<_, (String, Option<String>)>(&sql)
            .bind(repository_id.as_ref());
        if let Some(path) = source_path {
            query = query.bind(path.to_string());
        }
        let rows = query.fetch_all(self.pool()).await?;
        Ok(rows
            .into_iter()
            .map(|(source, import)| UnresolvedImport {
                source_path: source,
                import_source: import.unwrap_or_default(),
            })
            .collect())
    }

    /// Inbound-dependent counts per file path, highest first.
    pub async fn inbound_counts(&self, repository_id: &Id) -> Result<Vec<(String, u64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT r.target_file_path, COUNT(DISTINCT f.id) AS n
             FROM refs r JOIN files f ON f.id = r.file_id
             WHERE f.repository_id = ?1 AND r.target_file_path IS NOT NULL
             GROUP BY r.target_file_path
             ORDER BY n DESC, r.target_file_path ASC",
        )
        .bind(repository_id.as_ref())
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|(p, n)| (p, n as u64)).collect())
    }
}

/// Escape `%`, `_`, and `\` for a LIKE pattern with `ESCAPE '\'`.
pub(crate) fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

// --- Row types for SQLx ---

#[derive(sqlx::FromRow)]
struct RepositoryRow {
    id: String,
    full_name: String,
    git_url: String,
    created_at: String,
    last_indexed_at: Option<String>,
}

impl RepositoryRow {
    fn into_repository(self) -> Repository {
        Repository {
            id: Id::from_string(self.id),
            full_name: self.full_name,
            git_url: self.git_url,
            created_at: parse_ts(&self.created_at),
            last_indexed_at: parse_ts_opt(self.last_indexed_at.as_deref()),
        }
    }
}

#[derive(sqlx::FromRow)]
struct FileRow {
    id: String,
    repository_id: String,
    path: String,
    language: String,
    content_hash: String,
    size: i64,
    indexed_at: String,
    content: Option<String>,
}

impl FileRow {
    fn into_file(self) -> FileRecord {
        FileRecord {
            id: Id::from_string(self.id),
            repository_id: Id::from_string(self.repository_id),
            path: self.path,
            language: self.language,
            content_hash: self.content_hash,
            size: self.size as u64,
            indexed_at: parse_ts(&self.indexed_at),
            content: self.content,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SymbolRow {
    id: String,
    file_id: String,
    name: String,
    kind: String,
    signature: Option<String>,
    documentation: Option<String>,
    line_start: i64,
    line_end: i64,
    metadata: String,
}

impl SymbolRow {
    fn into_symbol(self) -> Symbol {
        Symbol {
            id: Id::from_string(self.id),
            file_id: Id::from_string(self.file_id),
            name: self.name,
            kind: SymbolKind::parse(&self.kind).unwrap_or(SymbolKind::Variable),
            signature: self.signature,
            documentation: self.documentation,
            line_start: self.line_start as u32,
            line_end: self.line_end as u32,
            metadata: serde_json::from_str(&self.metadata).unwrap_or_default(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct SymbolHitRow {
    id: String,
    file_id: String,
    name: String,
    kind: String,
    signature: Option<String>,
    documentation: Option<String>,
    line_start: i64,
    line_end: i64,
    metadata: String,
    path: String,
}

impl SymbolHitRow {
    fn into_hit(self) -> SymbolHit {
        let symbol = SymbolRow {
            id: self.id,
            file_id: self.file_id,
            name: self.name,
            kind: self.kind,
            signature: self.signature,
            documentation: self.documentation,
            line_start: self.line_start,
            line_end: self.line_end,
            metadata: self.metadata,
        }
        .into_symbol();
        SymbolHit {
            symbol,
            file_path: self.path,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RefRow {
    id: String,
    file_id: String,
    target_file_path: Option<String>,
    target_symbol_name: Option<String>,
    reference_type: String,
    metadata: String,
}

impl RefRow {
    fn into_reference(self) -> Reference {
        Reference {
            id: Id::from_string(self.id),
            file_id: Id::from_string(self.file_id),
            target_file_path: self.target_file_path,
            target_symbol_name: self.target_symbol_name,
            reference_type: ReferenceKind::parse(&self.reference_type)
                .unwrap_or(ReferenceKind::Import),
            metadata: serde_json::from_str(&self.metadata).unwrap_or_default(),
        }
    }
}
