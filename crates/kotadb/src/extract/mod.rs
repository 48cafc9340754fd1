//! Working-tree extraction: enumerate files, classify by language, hash
//! content, and pull out symbols and outbound references lexically.
//!
//! A parse failure on one file fails that file only; the walk continues.

mod python;
mod rust_lang;
mod typescript;

use crate::storage::{ReferenceInsert, SymbolInsert};
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("walk error: {0}")]
    Walk(#[from] ignore::Error),
}

pub type Result<T> = std::result::Result<T, ExtractError>;

/// Extraction output for one file.
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    /// Repository-relative POSIX path.
    pub path: String,
    pub language: String,
    pub content_hash: String,
    pub size: u64,
    /// None for oversized or binary files.
    pub content: Option<String>,
    pub symbols: Vec<SymbolInsert>,
    pub references: Vec<ReferenceInsert>,
}

/// Options for one extraction pass.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Extra ignore globs applied on top of `.gitignore`.
    pub ignore: Vec<String>,
    /// Files above this size keep path and hash only.
    pub max_file_size: u64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            ignore: Vec::new(),
            max_file_size: kota_core::KotaConfig::DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Directories that never contain indexable sources.
const JUNK_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    "coverage",
    ".next",
    "out",
    ".kotadb",
    ".worktrees",
    "__pycache__",
];

/// Hex SHA-256 of the raw file bytes; the incremental-change key.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Detect the indexing language from the file extension, falling back to a
/// shebang sniff for extensionless scripts. Unsupported files return None.
pub fn detect_language(path: &Path, head: &[u8]) -> Option<&'static str> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "ts" | "tsx" | "mts" | "cts" => return Some("typescript"),
        "js" | "jsx" | "mjs" | "cjs" => return Some("javascript"),
        "py" | "pyi" => return Some("python"),
        "rs" => return Some("rust"),
        _ => {}
    }

    // Magic prefix for extensionless executables.
    if head.starts_with(b"#!") {
        let first_line = head.split(|b| *b == b'\n').next().unwrap_or(head);
        let line = String::from_utf8_lossy(first_line);
        if line.contains("python") {
            return Some("python");
        }
        if line.contains("node") {
            return Some("javascript");
        }
    }
    None
}

/// Enumerate candidate files under `root`, honoring `.gitignore`, the junk
/// list, and any extra ignore globs. Returns `(absolute, relative)` pairs
/// sorted by relative path.
pub fn enumerate(root: &Path, options: &ExtractOptions) -> Result<Vec<(PathBuf, String)>> {
    let mut ob = OverrideBuilder::new(root);
    for dir in JUNK_DIRS {
        ob.add(&format!("!**/{dir}"))?;
        ob.add(&format!("!**/{dir}/**"))?;
    }
    for glob in &options.ignore {
        let trimmed = glob.trim().trim_matches('/');
        if trimmed.is_empty() {
            continue;
        }
        ob.add(&format!("!**/{trimmed}"))?;
        ob.add(&format!("!**/{trimmed}/**"))?;
    }
    let overrides = ob.build()?;

    let walker = WalkBuilder::new(root)
        .standard_filters(true)
        .overrides(overrides)
        .build();

    let mut entries = Vec::new();
    for item in walker {
        let dent = match item {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !dent.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let abs = dent.into_path();
        let Ok(rel) = abs.strip_prefix(root) else {
            continue;
        };
        let rel = posix_path(rel);
        entries.push((abs, rel));
    }
    entries.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(entries)
}

/// Forward-slash form of a relative path.
fn posix_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Extract one file. Returns None for unsupported languages.
pub fn extract_file(
    abs: &Path,
    rel: &str,
    max_file_size: u64,
) -> Result<Option<ExtractedFile>> {
    let bytes = std::fs::read(abs).map_err(|source| ExtractError::Io {
        path: rel.to_string(),
        source,
    })?;

    let head = &bytes[..bytes.len().min(256)];
    let Some(language) = detect_language(Path::new(rel), head) else {
        return Ok(None);
    };

    let hash = content_hash(&bytes);
    let size = bytes.len() as u64;

    // Oversized files are indexed for path and hash only.
    if size > max_file_size {
        return Ok(Some(ExtractedFile {
            path: rel.to_string(),
            language: language.to_string(),
            content_hash: hash,
            size,
            content: None,
            symbols: Vec::new(),
            references: Vec::new(),
        }));
    }

    let Ok(content) = String::from_utf8(bytes) else {
        // Binary data behind a source extension; keep path and hash.
        return Ok(Some(ExtractedFile {
            path: rel.to_string(),
            language: language.to_string(),
            content_hash: hash,
            size,
            content: None,
            symbols: Vec::new(),
            references: Vec::new(),
        }));
    };

    let (symbols, references) = extract_source(language, &content);
    Ok(Some(ExtractedFile {
        path: rel.to_string(),
        language: language.to_string(),
        content_hash: hash,
        size,
        content: Some(content),
        symbols,
        references,
    }))
}

/// Dispatch to the language-specific extractor.
pub fn extract_source(language: &str, content: &str) -> (Vec<SymbolInsert>, Vec<ReferenceInsert>) {
    match language {
        "typescript" | "javascript" => typescript::extract(content),
        "python" => python::extract(content),
        "rust" => rust_lang::extract(content),
        _ => (Vec::new(), Vec::new()),
    }
}

/// Resolve an import specifier against the repository's file set.
///
/// Rules are language-specific; unresolvable specifiers return None and the
/// reference is retained for diagnostics.
pub fn resolve_import(
    language: &str,
    source_path: &str,
    specifier: &str,
    files: &HashSet<String>,
) -> Option<String> {
    match language {
        "typescript" | "javascript" => typescript::resolve(source_path, specifier, files),
        "python" => python::resolve(source_path, specifier, files),
        "rust" => rust_lang::resolve(source_path, specifier, files),
        _ => None,
    }
}

/// Extract a whole working tree in parallel.
///
/// Per-file failures are logged and skipped; the rest of the tree indexes.
pub fn extract_tree(root: &Path, options: &ExtractOptions) -> Result<Vec<ExtractedFile>> {
    let entries = enumerate(root, options)?;
    let max = options.max_file_size;

    let mut files: Vec<ExtractedFile> = entries
        .par_iter()
        .filter_map(|(abs, rel)| match extract_file(abs, rel, max) {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!(file = %rel, error = %e, "extraction failed, skipping file");
                None
            }
        })
        .collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Resolve `.` and `..` segments of a joined relative path lexically.
/// Escapes above the root collapse to the root.
pub(crate) fn normalize_relative(base_dir: &str, tail: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in base_dir.split('/').chain(tail.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_hex_sha256() {
        let hash = content_hash(b"hello");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn detect_language_by_extension() {
        assert_eq!(detect_language(Path::new("a.ts"), b""), Some("typescript"));
        assert_eq!(detect_language(Path::new("a.jsx"), b""), Some("javascript"));
        assert_eq!(detect_language(Path::new("a.py"), b""), Some("python"));
        assert_eq!(detect_language(Path::new("a.rs"), b""), Some("rust"));
        assert_eq!(detect_language(Path::new("a.png"), b""), None);
    }

    #[test]
    fn detect_language_by_shebang() {
        assert_eq!(
            detect_language(Path::new("tool"), b"#!/usr/bin/env python3\n"),
            Some("python")
        );
        assert_eq!(detect_language(Path::new("tool"), b"#!/bin/sh\n"), None);
    }

    #[test]
    fn normalize_relative_handles_parent_segments() {
        assert_eq!(normalize_relative("src/app", "../lib/util"), "src/lib/util");
        assert_eq!(normalize_relative("", "./b"), "b");
        assert_eq!(normalize_relative("a", "../../outside"), "outside");
    }

    #[test]
    fn oversized_file_keeps_path_and_hash_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("big.ts");
        std::fs::write(&path, "x".repeat(128)).unwrap();

        let extracted = extract_file(&path, "big.ts", 16).unwrap().unwrap();
        assert!(extracted.content.is_none());
        assert!(extracted.symbols.is_empty());
        assert_eq!(extracted.size, 128);
    }

    #[test]
    fn enumerate_skips_junk_dirs_and_custom_ignores() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::create_dir_all(dir.path().join("gen")).unwrap();
        std::fs::write(dir.path().join("src/a.ts"), "export const A = 1;").unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/i.ts"), "x").unwrap();
        std::fs::write(dir.path().join("gen/g.ts"), "x").unwrap();

        let options = ExtractOptions {
            ignore: vec!["gen".to_string()],
            ..ExtractOptions::default()
        };
        let entries = enumerate(dir.path(), &options).unwrap();
        let rels: Vec<_> = entries.iter().map(|(_, r)| r.as_str()).collect();
        assert_eq!(rels, vec!["src/a.ts"]);
    }

    #[test]
    fn extract_tree_indexes_supported_files() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.ts"), "import { b } from './b';\n").unwrap();
        std::fs::write(dir.path().join("b.ts"), "export function foo() {}\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "# docs\n").unwrap();

        let files = extract_tree(dir.path(), &ExtractOptions::default()).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.ts", "b.ts"]);
    }
}
