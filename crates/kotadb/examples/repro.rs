use kota_core::{DecisionScope, ReferenceKind, SymbolKind};
use kotadb::storage::{DecisionInsert, FileUpsert, ReferenceInsert, SymbolInsert};

#[tokio::main]
async fn main() {
    let source_dir = tempfile::TempDir::new().unwrap();
    let source_db = source_dir.path().join("test.db");
    let source = kotadb::storage::Storage::new(&source_db).await.unwrap();
    source.migrate_embedded().await.unwrap();

    let repo = source.upsert_repository("local/demo", "/repo/demo").await.unwrap();
    let file_a = source
        .index_file(FileUpsert {
            repository_id: repo.id.clone(),
            path: "a.ts".to_string(),
            language: "typescript".to_string(),
            content_hash: "h1".to_string(),
            size: 10,
            content: Some("export const a = 1;".to_string()),
        }, vec![], vec![])
        .await
        .unwrap();
    println!("file_a: {file_a:?}");

    let dir = tempfile::TempDir::new().unwrap();
    kotadb::sync::export(&source, dir.path(), true).await.unwrap();

    let target_dir = tempfile::TempDir::new().unwrap();
    let target_db = target_dir.path().join("test.db");
    let target = kotadb::storage::Storage::new(&target_db).await.unwrap();
    target.migrate_embedded().await.unwrap();

    let import_report = kotadb::sync::import(&target, dir.path()).await;
    println!("import report: {:?}", import_report);
}
