//! Lexical symbol and reference extraction for Python.

use crate::storage::{ReferenceInsert, SymbolInsert};
use kota_core::{ReferenceKind, SymbolKind};
use regex::Regex;
use serde_json::json;
use std::collections::HashSet;
use std::sync::LazyLock;

static DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<indent>\s*)(?:async\s+)?def\s+(?P<name>[A-Za-z_]\w*)\s*\(").unwrap()
});
static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<indent>\s*)class\s+(?P<name>[A-Za-z_]\w*)\s*[(:]").unwrap()
});
static ASSIGN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<name>[A-Za-z_]\w*)\s*(?::[^=]+)?=[^=]").unwrap());
static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^import\s+(?P<module>[\w.]+)").unwrap());
static FROM_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^from\s+(?P<module>\.*[\w.]*)\s+import\s+(?P<names>.+)").unwrap()
});
static DYNAMIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"import_module\(\s*['"](?P<module>[\w.]+)['"]\s*\)"#).unwrap()
});

pub fn extract(content: &str) -> (Vec<SymbolInsert>, Vec<ReferenceInsert>) {
    let lines: Vec<&str> = content.lines().collect();
    let mut symbols = Vec::new();
    let mut references = Vec::new();
    let mut class_indents: Vec<usize> = Vec::new();

    for (idx, raw) in lines.iter().enumerate() {
        let line_no = (idx + 1) as u32;
        let trimmed = raw.trim_start();

        if let Some(caps) = IMPORT_RE.captures(trimmed) {
            if raw.starts_with("import") {
                references.push(reference(ReferenceKind::Import, &caps["module"], None));
            }
        } else if let Some(caps) = FROM_IMPORT_RE.captures(trimmed) {
            if raw.starts_with("from") {
                let names = &caps["names"];
                let single = single_name(names);
                let kind = if names.trim() == "*" {
                    ReferenceKind::ExportAll
                } else {
                    ReferenceKind::Import
                };
                references.push(reference(kind, &caps["module"], single));
            }
        }
        for caps in DYNAMIC_RE.captures_iter(raw) {
            references.push(reference(ReferenceKind::DynamicImport, &caps["module"], None));
        }

        if let Some(caps) = DEF_RE.captures(raw) {
            let indent = caps["indent"].len();
            let inside_class = class_indents.iter().any(|ci| indent > *ci);
            let kind = if inside_class {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            };
            let name = &caps["name"];
            symbols.push(SymbolInsert {
                name: name.to_string(),
                kind,
                signature: Some(raw.trim().trim_end_matches(':').to_string()),
                documentation: docstring_after(&lines, idx),
                line_start: line_no,
                line_end: indent_block_end(&lines, idx) as u32,
                metadata: json!({"is_exported": indent == 0 && !name.starts_with('_')}),
            });
        } else if let Some(caps) = CLASS_RE.captures(raw) {
            let indent = caps["indent"].len();
            class_indents.push(indent);
            let name = &caps["name"];
            symbols.push(SymbolInsert {
                name: name.to_string(),
                kind: SymbolKind::Class,
                signature: Some(raw.trim().trim_end_matches(':').to_string()),
                documentation: docstring_after(&lines, idx),
                line_start: line_no,
                line_end: indent_block_end(&lines, idx) as u32,
                metadata: json!({"is_exported": indent == 0 && !name.starts_with('_')}),
            });
        } else if let Some(caps) = ASSIGN_RE.captures(raw) {
            // Module-level bindings only; indented assignments are locals.
            let name = &caps["name"];
            let kind = if name.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
                SymbolKind::Constant
            } else {
                SymbolKind::Variable
            };
            symbols.push(SymbolInsert {
                name: name.to_string(),
                kind,
                signature: Some(raw.trim().to_string()),
                documentation: None,
                line_start: line_no,
                line_end: line_no,
                metadata: json!({"is_exported": !name.starts_with('_')}),
            });
        }
    }

    (symbols, references)
}

/// Resolve a module specifier (`pkg.mod`, `.sibling`, `..`) to a file path.
pub fn resolve(source_path: &str, specifier: &str, files: &HashSet<String>) -> Option<String> {
    let (base_dir, module) = if specifier.starts_with('.') {
        // Each leading dot climbs one package level, first dot is "here".
        let dots = specifier.chars().take_while(|c| *c == '.').count();
        let rest = &specifier[dots..];
        let mut dir = match source_path.rsplit_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => String::new(),
        };
        for _ in 1..dots {
            dir = match dir.rsplit_once('/') {
                Some((parent, _)) => parent.to_string(),
                None => String::new(),
            };
        }
        (dir, rest.to_string())
    } else {
        (String::new(), specifier.to_string())
    };

    let tail = module.replace('.', "/");
    let joined = if base_dir.is_empty() {
        tail.clone()
    } else if tail.is_empty() {
        base_dir.clone()
    } else {
        format!("{base_dir}/{tail}")
    };
    if joined.is_empty() {
        return None;
    }

    let module_file = format!("{joined}.py");
    if files.contains(&module_file) {
        return Some(module_file);
    }
    let package_init = format!("{joined}/__init__.py");
    if files.contains(&package_init) {
        return Some(package_init);
    }
    None
}

fn reference(
    kind: ReferenceKind,
    module: &str,
    symbol_name: Option<String>,
) -> ReferenceInsert {
    ReferenceInsert {
        target_symbol_name: symbol_name,
        reference_type: kind,
        metadata: json!({"importSource": module}),
    }
}

fn single_name(names: &str) -> Option<String> {
    let cleaned: Vec<&str> = names
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(|n| n.split_whitespace().next().unwrap_or(""))
        .filter(|n| !n.is_empty() && *n != "*")
        .collect();
    if cleaned.len() == 1 {
        Some(cleaned[0].to_string())
    } else {
        None
    }
}

/// Last line of an indentation-delimited block starting at `start`.
fn indent_block_end(lines: &[&str], start: usize) -> usize {
    let base_indent = lines[start].len() - lines[start].trim_start().len();
    let mut end = start + 1;
    for (offset, line) in lines[start + 1..].iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let indent = line.len() - line.trim_start().len();
        if indent <= base_indent {
            break;
        }
        end = start + 1 + offset + 1;
    }
    end.max(start + 1)
}

/// A `"""docstring"""` on the first body line.
fn docstring_after(lines: &[&str], decl_idx: usize) -> Option<String> {
    let body = lines.get(decl_idx + 1)?.trim();
    let inner = body
        .strip_prefix("\"\"\"")
        .or_else(|| body.strip_prefix("'''"))?;
    let doc = inner
        .trim_end_matches("\"\"\"")
        .trim_end_matches("'''")
        .trim();
    if doc.is_empty() {
        None
    } else {
        Some(doc.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_functions_and_methods() {
        let src = "def top():\n    pass\n\nclass Svc:\n    def handle(self):\n        pass\n";
        let (symbols, _) = extract(src);
        let kinds: Vec<_> = symbols.iter().map(|s| (s.name.as_str(), s.kind)).collect();
        assert!(kinds.contains(&("top", SymbolKind::Function)));
        assert!(kinds.contains(&("Svc", SymbolKind::Class)));
        assert!(kinds.contains(&("handle", SymbolKind::Method)));
    }

    #[test]
    fn upper_snake_assignment_is_constant() {
        let (symbols, _) = extract("MAX_RETRIES = 3\ncurrent = 0\n");
        assert_eq!(symbols[0].kind, SymbolKind::Constant);
        assert_eq!(symbols[1].kind, SymbolKind::Variable);
    }

    #[test]
    fn captures_docstring() {
        let src = "def f():\n    \"\"\"Does the thing.\"\"\"\n    pass\n";
        let (symbols, _) = extract(src);
        assert_eq!(symbols[0].documentation.as_deref(), Some("Does the thing."));
    }

    #[test]
    fn import_forms_are_classified() {
        let src = "import os.path\nfrom pkg.mod import thing\nfrom .sibling import *\n";
        let (_, references) = extract(src);
        assert_eq!(references[0].reference_type, ReferenceKind::Import);
        assert_eq!(references[0].metadata["importSource"], "os.path");
        assert_eq!(references[1].target_symbol_name.as_deref(), Some("thing"));
        assert_eq!(references[2].reference_type, ReferenceKind::ExportAll);
    }

    #[test]
    fn resolve_absolute_and_relative_modules() {
        let files: HashSet<String> = ["pkg/mod.py", "pkg/sub/__init__.py", "pkg/sibling.py"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            resolve("main.py", "pkg.mod", &files),
            Some("pkg/mod.py".to_string())
        );
        assert_eq!(
            resolve("main.py", "pkg.sub", &files),
            Some("pkg/sub/__init__.py".to_string())
        );
        assert_eq!(
            resolve("pkg/mod.py", ".sibling", &files),
            Some("pkg/sibling.py".to_string())
        );
        assert_eq!(
            resolve("pkg/sub/deep.py", "..sibling", &files),
            Some("pkg/sibling.py".to_string())
        );
        assert_eq!(resolve("main.py", "numpy", &files), None);
    }
}
