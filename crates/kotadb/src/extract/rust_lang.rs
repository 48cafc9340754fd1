//! Lexical symbol and reference extraction for Rust.

use crate::storage::{ReferenceInsert, SymbolInsert};
use kota_core::{ReferenceKind, SymbolKind};
use regex::Regex;
use serde_json::json;
use std::collections::HashSet;
use std::sync::LazyLock;

static FN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<indent>\s*)(?P<vis>pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?(?:const\s+)?fn\s+(?P<name>[A-Za-z_]\w*)")
        .unwrap()
});
static STRUCT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<vis>pub(?:\([^)]*\))?\s+)?struct\s+(?P<name>[A-Za-z_]\w*)").unwrap()
});
static ENUM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<vis>pub(?:\([^)]*\))?\s+)?enum\s+(?P<name>[A-Za-z_]\w*)").unwrap()
});
static TRAIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<vis>pub(?:\([^)]*\))?\s+)?(?:unsafe\s+)?trait\s+(?P<name>[A-Za-z_]\w*)")
        .unwrap()
});
static TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<vis>pub(?:\([^)]*\))?\s+)?type\s+(?P<name>[A-Za-z_]\w*)").unwrap()
});
static CONST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<vis>pub(?:\([^)]*\))?\s+)?(?:const|static)\s+(?P<name>[A-Z_][A-Z0-9_]*)\s*:")
        .unwrap()
});
static MOD_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<vis>pub(?:\([^)]*\))?\s+)?mod\s+(?P<name>[A-Za-z_]\w*)\s*;").unwrap()
});
static MOD_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<vis>pub(?:\([^)]*\))?\s+)?mod\s+(?P<name>[A-Za-z_]\w*)\s*\{").unwrap()
});
static USE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<vis>pub(?:\([^)]*\))?\s+)?use\s+(?P<path>[^;]+);").unwrap()
});

pub fn extract(content: &str) -> (Vec<SymbolInsert>, Vec<ReferenceInsert>) {
    let lines: Vec<&str> = content.lines().collect();
    let mut symbols = Vec::new();
    let mut references = Vec::new();

    for (idx, raw) in lines.iter().enumerate() {
        let line_no = (idx + 1) as u32;

        if let Some(caps) = USE_RE.captures(raw) {
            let path = caps["path"].split_whitespace().collect::<Vec<_>>().join(" ");
            let is_pub = caps.name("vis").is_some();
            let kind = if is_pub && path.ends_with("::*") {
                ReferenceKind::ExportAll
            } else if is_pub {
                ReferenceKind::ReExport
            } else {
                ReferenceKind::Import
            };
            references.push(ReferenceInsert {
                target_symbol_name: use_leaf(&path),
                reference_type: kind,
                metadata: json!({"importSource": path}),
            });
            continue;
        }
        if let Some(caps) = MOD_DECL_RE.captures(raw) {
            references.push(ReferenceInsert {
                target_symbol_name: None,
                reference_type: ReferenceKind::Import,
                metadata: json!({"importSource": format!("mod {}", &caps["name"])}),
            });
            symbols.push(symbol(
                &caps["name"],
                SymbolKind::Module,
                raw,
                line_no,
                line_no,
                caps.name("vis").is_some(),
                doc_before(&lines, idx),
            ));
            continue;
        }

        if let Some(caps) = FN_RE.captures(raw) {
            let kind = if caps["indent"].is_empty() {
                SymbolKind::Function
            } else {
                // Indented fns sit inside impl or trait blocks.
                SymbolKind::Method
            };
            symbols.push(symbol(
                &caps["name"],
                kind,
                raw,
                line_no,
                super::typescript::block_end(&lines, idx) as u32,
                caps.name("vis").is_some(),
                doc_before(&lines, idx),
            ));
        } else if let Some(caps) = STRUCT_RE.captures(raw) {
            symbols.push(symbol(
                &caps["name"],
                SymbolKind::Class,
                raw,
                line_no,
                super::typescript::block_end(&lines, idx) as u32,
                caps.name("vis").is_some(),
                doc_before(&lines, idx),
            ));
        } else if let Some(caps) = ENUM_RE.captures(raw) {
            symbols.push(symbol(
                &caps["name"],
                SymbolKind::Enum,
                raw,
                line_no,
                super::typescript::block_end(&lines, idx) as u32,
                caps.name("vis").is_some(),
                doc_before(&lines, idx),
            ));
        } else if let Some(caps) = TRAIT_RE.captures(raw) {
            symbols.push(symbol(
                &caps["name"],
                SymbolKind::Interface,
                raw,
                line_no,
                super::typescript::block_end(&lines, idx) as u32,
                caps.name("vis").is_some(),
                doc_before(&lines, idx),
            ));
        } else if let Some(caps) = TYPE_RE.captures(raw) {
            symbols.push(symbol(
                &caps["name"],
                SymbolKind::Type,
                raw,
                line_no,
                line_no,
                caps.name("vis").is_some(),
                None,
            ));
        } else if let Some(caps) = CONST_RE.captures(raw) {
            symbols.push(symbol(
                &caps["name"],
                SymbolKind::Constant,
                raw,
                line_no,
                line_no,
                caps.name("vis").is_some(),
                None,
            ));
        } else if let Some(caps) = MOD_BLOCK_RE.captures(raw) {
            symbols.push(symbol(
                &caps["name"],
                SymbolKind::Module,
                raw,
                line_no,
                super::typescript::block_end(&lines, idx) as u32,
                caps.name("vis").is_some(),
                None,
            ));
        }
    }

    (symbols, references)
}

/// Resolve `mod name;` declarations and `crate::` paths to files.
pub fn resolve(source_path: &str, specifier: &str, files: &HashSet<String>) -> Option<String> {
    if let Some(name) = specifier.strip_prefix("mod ") {
        return resolve_mod(source_path, name.trim(), files);
    }

    // `use crate::a::b::Item` may address src/a/b.rs, src/a/b/mod.rs, or an
    // ancestor module file with Item declared inline; try the path forms.
    let path = specifier.strip_prefix("crate::")?;
    let crate_root = source_path
        .rsplit_once("src/")
        .map_or("src", |(prefix, _)| prefix)
        .trim_end_matches('/');
    let root = if source_path.contains("src/") {
        if crate_root.is_empty() {
            "src".to_string()
        } else {
            format!("{crate_root}/src")
        }
    } else {
        "src".to_string()
    };

    let mut segments: Vec<&str> = path.split("::").collect();
    while !segments.is_empty() {
        let joined = segments.join("/");
        for candidate in [
            format!("{root}/{joined}.rs"),
            format!("{root}/{joined}/mod.rs"),
        ] {
            if files.contains(&candidate) && candidate != source_path {
                return Some(candidate);
            }
        }
        segments.pop();
    }
    None
}

fn resolve_mod(source_path: &str, name: &str, files: &HashSet<String>) -> Option<String> {
    let dir = match source_path.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => String::new(),
    };
    let file_stem = source_path
        .rsplit_once('/')
        .map_or(source_path, |(_, f)| f)
        .trim_end_matches(".rs");

    let mut candidates = vec![
        join(&dir, &format!("{name}.rs")),
        join(&dir, &format!("{name}/mod.rs")),
    ];
    // Non-root module files own a subdirectory named after themselves.
    if !matches!(file_stem, "lib" | "main" | "mod") {
        candidates.push(join(&dir, &format!("{file_stem}/{name}.rs")));
        candidates.push(join(&dir, &format!("{file_stem}/{name}/mod.rs")));
    }
    candidates.into_iter().find(|c| files.contains(c))
}

fn join(dir: &str, tail: &str) -> String {
    if dir.is_empty() {
        tail.to_string()
    } else {
        format!("{dir}/{tail}")
    }
}

fn use_leaf(path: &str) -> Option<String> {
    let leaf = path.rsplit("::").next()?.trim();
    if leaf.is_empty()
        || leaf == "*"
        || leaf.contains('{')
        || leaf.contains(' ')
        || !leaf.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
    {
        None
    } else {
        Some(leaf.to_string())
    }
}

fn symbol(
    name: &str,
    kind: SymbolKind,
    decl_line: &str,
    line_start: u32,
    line_end: u32,
    is_exported: bool,
    documentation: Option<String>,
) -> SymbolInsert {
    SymbolInsert {
        name: name.to_string(),
        kind,
        signature: Some(decl_line.trim().trim_end_matches('{').trim().to_string()),
        documentation,
        line_start,
        line_end: line_end.max(line_start),
        metadata: json!({"is_exported": is_exported}),
    }
}

/// Contiguous `///` block immediately above a declaration.
fn doc_before(lines: &[&str], decl_idx: usize) -> Option<String> {
    let mut block = Vec::new();
    let mut idx = decl_idx;
    while idx > 0 {
        idx -= 1;
        let trimmed = lines[idx].trim();
        if let Some(doc) = trimmed.strip_prefix("///") {
            block.push(doc.trim());
        } else if trimmed.starts_with("#[") {
            // Attributes may sit between docs and the declaration.
            continue;
        } else {
            break;
        }
    }
    if block.is_empty() {
        return None;
    }
    block.reverse();
    Some(block.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_core_item_kinds() {
        let src = concat!(
            "/// Entry point.\n",
            "pub fn run() {\n}\n",
            "pub struct Engine {\n}\n",
            "pub trait Indexer {\n}\n",
            "pub enum Mode {\n}\n",
            "pub type Shared = u32;\n",
            "pub const MAX: usize = 4;\n",
        );
        let (symbols, _) = extract(src);
        let kinds: Vec<_> = symbols.iter().map(|s| (s.name.as_str(), s.kind)).collect();
        assert!(kinds.contains(&("run", SymbolKind::Function)));
        assert!(kinds.contains(&("Engine", SymbolKind::Class)));
        assert!(kinds.contains(&("Indexer", SymbolKind::Interface)));
        assert!(kinds.contains(&("Mode", SymbolKind::Enum)));
        assert!(kinds.contains(&("Shared", SymbolKind::Type)));
        assert!(kinds.contains(&("MAX", SymbolKind::Constant)));
        assert_eq!(symbols[0].documentation.as_deref(), Some("Entry point."));
    }

    #[test]
    fn indented_fn_is_method() {
        let src = "impl Engine {\n    pub fn start(&self) {\n    }\n}\n";
        let (symbols, _) = extract(src);
        let start = symbols.iter().find(|s| s.name == "start").unwrap();
        assert_eq!(start.kind, SymbolKind::Method);
    }

    #[test]
    fn use_statements_become_references() {
        let src = "use crate::storage::Storage;\npub use crate::types::Id;\npub use crate::types::*;\nmod indexer;\n";
        let (symbols, references) = extract(src);
        assert_eq!(references[0].reference_type, ReferenceKind::Import);
        assert_eq!(references[0].target_symbol_name.as_deref(), Some("Storage"));
        assert_eq!(references[1].reference_type, ReferenceKind::ReExport);
        assert_eq!(references[2].reference_type, ReferenceKind::ExportAll);
        assert_eq!(references[3].metadata["importSource"], "mod indexer");
        assert!(symbols.iter().any(|s| s.name == "indexer" && s.kind == SymbolKind::Module));
    }

    #[test]
    fn resolves_mod_declarations() {
        let files: HashSet<String> = ["src/indexer.rs", "src/query/mod.rs", "src/tools/tips.rs"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            resolve("src/lib.rs", "mod indexer", &files),
            Some("src/indexer.rs".to_string())
        );
        assert_eq!(
            resolve("src/lib.rs", "mod query", &files),
            Some("src/query/mod.rs".to_string())
        );
        assert_eq!(
            resolve("src/tools/mod.rs", "mod tips", &files),
            Some("src/tools/tips.rs".to_string())
        );
        assert_eq!(resolve("src/lib.rs", "mod missing", &files), None);
    }

    #[test]
    fn resolves_crate_paths() {
        let files: HashSet<String> = ["src/storage/mod.rs", "src/types.rs"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            resolve("src/lib.rs", "crate::storage::Storage", &files),
            Some("src/storage/mod.rs".to_string())
        );
        assert_eq!(
            resolve("src/lib.rs", "crate::types::Id", &files),
            Some("src/types.rs".to_string())
        );
        assert_eq!(resolve("src/lib.rs", "std::path::Path", &files), None);
    }
}
