//! End-to-end scenarios across the indexer, query layer, tool surface, and
//! sync round-trip.

use kotadb::domains::DomainRules;
use kotadb::extract::ExtractOptions;
use kotadb::storage::Storage;
use kotadb::tools::{dispatch, ToolContext, Toolset};
use kotadb::{indexer, sync};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

async fn open_storage(dir: &Path) -> Storage {
    let storage = Storage::new(&dir.join("kota.db")).await.unwrap();
    storage.migrate_embedded().await.unwrap();
    storage
}

fn context(storage: Storage, worktree: &Path) -> ToolContext {
    ToolContext {
        storage: Arc::new(storage),
        config: kota_core::KotaConfig::for_dir(worktree.to_path_buf()),
        rules: DomainRules::default(),
    }
}

async fn call(ctx: &ToolContext, name: &str, args: Value) -> Value {
    dispatch(ctx, Toolset::Full, name, &args).await.unwrap()
}

/// Index a repo with `a.ts` importing `./b` and `b.ts` exporting `foo`,
/// then search symbols and walk dependencies.
#[tokio::test]
async fn index_and_search() {
    let work = TempDir::new().unwrap();
    let db = TempDir::new().unwrap();
    std::fs::write(work.path().join("a.ts"), "import { foo } from './b';\n").unwrap();
    std::fs::write(work.path().join("b.ts"), "export function foo() {}\n").unwrap();

    let ctx = context(open_storage(db.path()).await, work.path());

    let indexed = call(
        &ctx,
        "index_repository",
        json!({"repository": "demo", "localPath": work.path().to_str().unwrap()}),
    )
    .await;
    assert_eq!(indexed["status"], json!("completed"));
    assert_eq!(indexed["stats"]["files_indexed"], json!(2));

    let search = call(&ctx, "search", json!({"query": "foo", "scope": ["symbols"]})).await;
    let symbols = search["results"]["symbols"].as_array().unwrap();
    assert_eq!(symbols.len(), 1);
    assert_eq!(symbols[0]["name"], json!("foo"));
    assert_eq!(symbols[0]["kind"], json!("function"));
    assert_eq!(symbols[0]["location"]["file"], json!("b.ts"));

    let deps = call(
        &ctx,
        "search_dependencies",
        json!({"file_path": "a.ts", "direction": "dependencies", "depth": 1}),
    )
    .await;
    assert_eq!(deps["dependencies"]["direct"], json!(["b.ts"]));
    assert_eq!(deps["dependencies"]["cycles"], json!([]));
}

/// Mutual imports are reported as one ordered cycle.
#[tokio::test]
async fn cycle_detection() {
    let work = TempDir::new().unwrap();
    let db = TempDir::new().unwrap();
    std::fs::write(work.path().join("x.ts"), "import { y } from './y';\n").unwrap();
    std::fs::write(work.path().join("y.ts"), "import { x } from './x';\n").unwrap();

    let ctx = context(open_storage(db.path()).await, work.path());
    call(
        &ctx,
        "index_repository",
        json!({"repository": "demo", "localPath": work.path().to_str().unwrap()}),
    )
    .await;

    let deps = call(
        &ctx,
        "search_dependencies",
        json!({"file_path": "x.ts", "direction": "dependencies", "depth": 2}),
    )
    .await;
    assert_eq!(
        deps["dependencies"]["cycles"],
        json!([["x.ts", "y.ts", "x.ts"]])
    );
}

/// Incremental reindex: unchanged hash is a no-op; changed content replaces
/// the file's symbol table atomically.
#[tokio::test]
async fn incremental_reindex() {
    let work = TempDir::new().unwrap();
    let db = TempDir::new().unwrap();
    std::fs::write(
        work.path().join("a.ts"),
        "import { foo } from './b';\nexport const A = 1;\n",
    )
    .unwrap();
    std::fs::write(work.path().join("b.ts"), "export function foo() {}\n").unwrap();

    let storage = open_storage(db.path()).await;
    let outcome = indexer::index_full(
        &storage,
        work.path(),
        "local/demo",
        &ExtractOptions::default(),
    )
    .await
    .unwrap();
    let repo = storage.get_repository(&outcome.repository_id).await.unwrap();

    // Byte-identical content: files_indexed = 0.
    let unchanged = indexer::index_incremental(
        &storage,
        work.path(),
        &repo,
        &["a.ts".to_string()],
        &[],
        &ExtractOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(unchanged.stats.files_indexed, 0);

    // Changed content: files_indexed = 1 and the symbol table is replaced.
    std::fs::write(
        work.path().join("a.ts"),
        "import { foo } from './b';\nexport const CHANGED = 2;\n",
    )
    .unwrap();
    let changed = indexer::index_incremental(
        &storage,
        work.path(),
        &repo,
        &["a.ts".to_string()],
        &[],
        &ExtractOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(changed.stats.files_indexed, 1);

    let file_id = storage
        .resolve_file_path(&repo.id, "a.ts")
        .await
        .unwrap()
        .unwrap();
    let names: Vec<String> = storage
        .symbols_for_file(&file_id)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["CHANGED"]);
}

/// Forced export into a directory, import into a fresh database, and
/// row-level equality across files, symbols, and references.
#[tokio::test]
async fn export_import_round_trip() {
    let work = TempDir::new().unwrap();
    let db = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    std::fs::write(work.path().join("a.ts"), "import { foo } from './b';\n").unwrap();
    std::fs::write(work.path().join("b.ts"), "export function foo() {}\n").unwrap();

    let source = open_storage(db.path()).await;
    let outcome = indexer::index_full(
        &source,
        work.path(),
        "local/demo",
        &ExtractOptions::default(),
    )
    .await
    .unwrap();
    sync::export(&source, out.path(), true).await.unwrap();

    // "Wipe the DB": a brand-new database file.
    let fresh_dir = TempDir::new().unwrap();
    let target = open_storage(fresh_dir.path()).await;
    sync::import(&target, out.path()).await.unwrap();

    let repo_id = outcome.repository_id;
    assert_eq!(
        source.count_files(&repo_id).await.unwrap(),
        target.count_files(&repo_id).await.unwrap()
    );
    assert_eq!(
        source.count_symbols(&repo_id).await.unwrap(),
        target.count_symbols(&repo_id).await.unwrap()
    );
    assert_eq!(
        source.count_references(&repo_id).await.unwrap(),
        target.count_references(&repo_id).await.unwrap()
    );

    // Spot-check one row survived with identical content.
    let file_id = target
        .resolve_file_path(&repo_id, "b.ts")
        .await
        .unwrap()
        .unwrap();
    let symbols = target.symbols_for_file(&file_id).await.unwrap();
    assert_eq!(symbols.len(), 1);
    assert_eq!(symbols[0].name, "foo");
}

/// Depth bounds: 5 is honored, and results are not silently truncated.
#[tokio::test]
async fn depth_five_reaches_the_end_of_a_chain() {
    let work = TempDir::new().unwrap();
    let db = TempDir::new().unwrap();
    for (file, import) in [
        ("a.ts", Some("./b")),
        ("b.ts", Some("./c")),
        ("c.ts", Some("./d")),
        ("d.ts", Some("./e")),
        ("e.ts", Some("./f")),
        ("f.ts", None),
    ] {
        let content = match import {
            Some(target) => format!("import {{ x }} from '{target}';\n"),
            None => "export const x = 1;\n".to_string(),
        };
        std::fs::write(work.path().join(file), content).unwrap();
    }

    let ctx = context(open_storage(db.path()).await, work.path());
    call(
        &ctx,
        "index_repository",
        json!({"repository": "demo", "localPath": work.path().to_str().unwrap()}),
    )
    .await;

    let deps = call(
        &ctx,
        "search_dependencies",
        json!({"file_path": "a.ts", "direction": "dependencies", "depth": 5}),
    )
    .await;
    assert_eq!(deps["dependencies"]["direct"], json!(["b.ts"]));
    assert_eq!(deps["dependencies"]["indirect"]["5"], json!(["f.ts"]));
}

/// Unified search output contracts: paths mode returns bare strings,
/// snippet mode carries bounded context windows.
#[tokio::test]
async fn unified_search_output_modes() {
    let work = TempDir::new().unwrap();
    let db = TempDir::new().unwrap();
    std::fs::write(
        work.path().join("handler.ts"),
        "const before = 0;\nexport function handleLogin() {}\nconst after = 1;\n",
    )
    .unwrap();

    let ctx = context(open_storage(db.path()).await, work.path());
    call(
        &ctx,
        "index_repository",
        json!({"repository": "demo", "localPath": work.path().to_str().unwrap()}),
    )
    .await;

    let paths = call(
        &ctx,
        "search",
        json!({"query": "handleLogin", "scope": ["code"], "output": "paths"}),
    )
    .await;
    let rows = paths["results"]["code"].as_array().unwrap();
    assert!(rows.iter().all(Value::is_string));

    let snippets = call(
        &ctx,
        "search",
        json!({"query": "handleLogin", "scope": ["code"], "output": "snippet", "context_lines": 1}),
    )
    .await;
    let first = &snippets["results"]["code"][0]["matches"][0];
    assert_eq!(first["line"], json!(2));
    assert_eq!(
        first["text"],
        json!(["const before = 0;", "export function handleLogin() {}", "const after = 1;"])
    );
}
