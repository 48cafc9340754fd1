//! Lexical symbol and reference extraction for TypeScript and JavaScript.

use crate::storage::{ReferenceInsert, SymbolInsert};
use kota_core::{ReferenceKind, SymbolKind};
use regex::Regex;
use serde_json::json;
use std::collections::HashSet;
use std::sync::LazyLock;

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<export>export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>[A-Za-z_$][\w$]*)")
        .unwrap()
});
static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<export>export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+(?P<name>[A-Za-z_$][\w$]*)")
        .unwrap()
});
static INTERFACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<export>export\s+)?interface\s+(?P<name>[A-Za-z_$][\w$]*)").unwrap()
});
static TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<export>export\s+)?type\s+(?P<name>[A-Za-z_$][\w$]*)\s*[<=]").unwrap()
});
static ENUM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<export>export\s+)?(?:const\s+)?enum\s+(?P<name>[A-Za-z_$][\w$]*)").unwrap()
});
static VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<export>export\s+)?(?P<decl>const|let|var)\s+(?P<name>[A-Za-z_$][\w$]*)\s*[:=]")
        .unwrap()
});
static NAMESPACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<export>export\s+)?namespace\s+(?P<name>[A-Za-z_$][\w$.]*)").unwrap()
});
static METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s+(?:public\s+|private\s+|protected\s+|static\s+|override\s+)*(?:async\s+)?(?:get\s+|set\s+)?(?P<name>[A-Za-z_$][\w$]*)\s*\([^;]*\)\s*(?::[^{;=]+)?\{",
    )
    .unwrap()
});

static IMPORT_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^import\s+(?:type\s+)?(?P<clause>[^'"]+?)\s+from\s+['"](?P<spec>[^'"]+)['"]"#)
        .unwrap()
});
static IMPORT_BARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^import\s+['"](?P<spec>[^'"]+)['"]"#).unwrap());
static REEXPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^export\s+(?:type\s+)?\{(?P<clause>[^}]*)\}\s+from\s+['"](?P<spec>[^'"]+)['"]"#)
        .unwrap()
});
static EXPORT_ALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^export\s+\*\s+(?:as\s+[\w$]+\s+)?from\s+['"](?P<spec>[^'"]+)['"]"#).unwrap()
});
static DYNAMIC_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"import\(\s*['"](?P<spec>[^'"]+)['"]\s*\)"#).unwrap());
static REQUIRE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"require\(\s*['"](?P<spec>[^'"]+)['"]\s*\)"#).unwrap());

/// Keywords that look like method names to the lexical scanner.
const NOT_METHODS: &[&str] = &["if", "for", "while", "switch", "catch", "return", "function"];

pub fn extract(content: &str) -> (Vec<SymbolInsert>, Vec<ReferenceInsert>) {
    let lines: Vec<&str> = content.lines().collect();
    let mut symbols = Vec::new();
    let mut references = Vec::new();
    // Line ranges of class bodies; methods are only reported inside them.
    let mut class_ranges: Vec<(usize, usize)> = Vec::new();

    for (idx, raw) in lines.iter().enumerate() {
        let line = raw.trim_end();
        let line_no = (idx + 1) as u32;

        // --- References ---
        if let Some(caps) = IMPORT_FROM_RE.captures(line.trim_start()) {
            references.push(reference(
                ReferenceKind::Import,
                &caps["spec"],
                single_named_import(&caps["clause"]),
            ));
        } else if let Some(caps) = IMPORT_BARE_RE.captures(line.trim_start()) {
            references.push(reference(ReferenceKind::Import, &caps["spec"], None));
        } else if let Some(caps) = REEXPORT_RE.captures(line.trim_start()) {
            references.push(reference(
                ReferenceKind::ReExport,
                &caps["spec"],
                single_named_import(&caps["clause"]),
            ));
        } else if let Some(caps) = EXPORT_ALL_RE.captures(line.trim_start()) {
            references.push(reference(ReferenceKind::ExportAll, &caps["spec"], None));
        } else {
            for caps in DYNAMIC_IMPORT_RE.captures_iter(line) {
                references.push(reference(ReferenceKind::DynamicImport, &caps["spec"], None));
            }
            for caps in REQUIRE_RE.captures_iter(line) {
                references.push(reference(ReferenceKind::Import, &caps["spec"], None));
            }
        }

        // --- Symbols ---
        if let Some(caps) = FUNCTION_RE.captures(line) {
            symbols.push(symbol(
                &caps["name"],
                SymbolKind::Function,
                line,
                line_no,
                block_end(&lines, idx) as u32,
                caps.name("export").is_some(),
                doc_before(&lines, idx),
            ));
        } else if let Some(caps) = CLASS_RE.captures(line) {
            // Range is (0-based decl line, 1-based closing-brace line).
            let end = block_end(&lines, idx);
            class_ranges.push((idx, end));
            symbols.push(symbol(
                &caps["name"],
                SymbolKind::Class,
                line,
                line_no,
                end as u32,
                caps.name("export").is_some(),
                doc_before(&lines, idx),
            ));
        } else if let Some(caps) = INTERFACE_RE.captures(line) {
            symbols.push(symbol(
                &caps["name"],
                SymbolKind::Interface,
                line,
                line_no,
                block_end(&lines, idx) as u32,
                caps.name("export").is_some(),
                doc_before(&lines, idx),
            ));
        } else if let Some(caps) = ENUM_RE.captures(line) {
            symbols.push(symbol(
                &caps["name"],
                SymbolKind::Enum,
                line,
                line_no,
                block_end(&lines, idx) as u32,
                caps.name("export").is_some(),
                doc_before(&lines, idx),
            ));
        } else if let Some(caps) = TYPE_RE.captures(line) {
            symbols.push(symbol(
                &caps["name"],
                SymbolKind::Type,
                line,
                line_no,
                line_no,
                caps.name("export").is_some(),
                doc_before(&lines, idx),
            ));
        } else if let Some(caps) = NAMESPACE_RE.captures(line) {
            symbols.push(symbol(
                &caps["name"],
                SymbolKind::Namespace,
                line,
                line_no,
                block_end(&lines, idx) as u32,
                caps.name("export").is_some(),
                None,
            ));
        } else if let Some(caps) = VAR_RE.captures(line) {
            let name = &caps["name"];
            let kind = if &caps["decl"] == "const" {
                SymbolKind::Constant
            } else {
                SymbolKind::Variable
            };
            symbols.push(symbol(
                name,
                kind,
                line,
                line_no,
                line_no,
                caps.name("export").is_some(),
                None,
            ));
        } else if let Some(caps) = METHOD_RE.captures(raw) {
            let name = &caps["name"];
            let inside_class = class_ranges
                .iter()
                .any(|(start, end)| idx > *start && idx + 1 < *end);
            if inside_class && name != "constructor" && !NOT_METHODS.contains(&name) {
                symbols.push(symbol(
                    name,
                    SymbolKind::Method,
                    line,
                    line_no,
                    block_end(&lines, idx) as u32,
                    false,
                    None,
                ));
            }
        }
    }

    (symbols, references)
}

/// Resolve a relative import specifier to an indexed path.
///
/// Bare package specifiers (no leading `.`) are left unresolved.
pub fn resolve(source_path: &str, specifier: &str, files: &HashSet<String>) -> Option<String> {
    if !specifier.starts_with('.') {
        return None;
    }
    let dir = match source_path.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => "",
    };
    let base = super::normalize_relative(dir, specifier);

    if files.contains(&base) {
        return Some(base);
    }
    const EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs"];
    // "./b.js" written against an on-disk "./b.ts" is the ESM-output idiom.
    let stem = EXTENSIONS
        .iter()
        .find_map(|ext| base.strip_suffix(ext))
        .unwrap_or(&base)
        .to_string();
    for ext in EXTENSIONS {
        let candidate = format!("{stem}{ext}");
        if files.contains(&candidate) {
            return Some(candidate);
        }
    }
    for ext in EXTENSIONS {
        let candidate = format!("{base}/index{ext}");
        if files.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn reference(
    kind: ReferenceKind,
    specifier: &str,
    symbol_name: Option<String>,
) -> ReferenceInsert {
    ReferenceInsert {
        target_symbol_name: symbol_name,
        reference_type: kind,
        metadata: json!({"importSource": specifier}),
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

/// When an import clause names exactly one binding, carry it on the reference.
fn single_named_import(clause: &str) -> Option<String> {
    let inner = clause
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .trim();
    let names: Vec<&str> = inner
        .split(',')
        .map(|n| n.split_whitespace().next().unwrap_or(""))
        .filter(|n| !n.is_empty() && *n != "*")
        .collect();
    if names.len() == 1 {
        Some(names[0].to_string())
    } else {
        None
    }
}

/// 1-based line of the matching closing brace for a block opened on `start`.
/// Falls back to the start line when no brace opens there.
pub(super) fn block_end(lines: &[&str], start: usize) -> usize {
    let mut depth = 0i32;
    let mut opened = false;
    for (offset, line) in lines[start..].iter().enumerate() {
        for c in line.chars() {
            match c {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return start + offset + 1;
        }
        // Declaration without a block on the first line (e.g. type alias).
        if !opened && offset > 0 {
            break;
        }
    }
    start + 1
}

/// JSDoc block immediately above a declaration, with markers stripped.
pub(super) fn doc_before(lines: &[&str], decl_idx: usize) -> Option<String> {
    if decl_idx == 0 {
        return None;
    }
    let mut idx = decl_idx - 1;
    if !lines[idx].trim().ends_with("*/") {
        return None;
    }
    let mut block = Vec::new();
    loop {
        let line = lines[idx].trim();
        block.push(line);
        if line.starts_with("/**") || line.starts_with("/*") {
            break;
        }
        if idx == 0 {
            return None;
        }
        idx -= 1;
    }
    block.reverse();
    let text = block
        .iter()
        .map(|l| {
            l.trim_start_matches("/**")
                .trim_start_matches("/*")
                .trim_end_matches("*/")
                .trim_start_matches('*')
                .trim()
        })
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_exported_function_with_doc() {
        let src = "/** Adds things. */\nexport function add(a: number, b: number): number {\n  return a + b;\n}\n";
        let (symbols, _) = extract(src);
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "add");
        assert_eq!(symbols[0].kind, SymbolKind::Function);
        assert_eq!(symbols[0].line_start, 2);
        assert_eq!(symbols[0].line_end, 4);
        assert_eq!(symbols[0].metadata["is_exported"], true);
        assert_eq!(symbols[0].documentation.as_deref(), Some("Adds things."));
    }

    #[test]
    fn extracts_class_with_methods() {
        let src = "export class Session {\n  refresh(): void {\n  }\n  private expire() {\n  }\n}\n";
        let (symbols, _) = extract(src);
        let names: Vec<_> = symbols.iter().map(|s| (s.name.as_str(), s.kind)).collect();
        assert!(names.contains(&("Session", SymbolKind::Class)));
        assert!(names.contains(&("refresh", SymbolKind::Method)));
        assert!(names.contains(&("expire", SymbolKind::Method)));
    }

    #[test]
    fn const_is_constant_let_is_variable() {
        let src = "export const LIMIT = 10;\nlet counter = 0;\n";
        let (symbols, _) = extract(src);
        assert_eq!(symbols[0].kind, SymbolKind::Constant);
        assert_eq!(symbols[0].metadata["is_exported"], true);
        assert_eq!(symbols[1].kind, SymbolKind::Variable);
    }

    #[test]
    fn classifies_reference_kinds() {
        let src = concat!(
            "import { foo } from './b';\n",
            "import './side-effect';\n",
            "export { bar } from './c';\n",
            "export * from './d';\n",
            "const m = await import('./lazy');\n",
            "const legacy = require('./old');\n",
        );
        let (_, references) = extract(src);
        let kinds: Vec<_> = references.iter().map(|r| r.reference_type).collect();
        assert_eq!(
            kinds,
            vec![
                ReferenceKind::Import,
                ReferenceKind::Import,
                ReferenceKind::ReExport,
                ReferenceKind::ExportAll,
                ReferenceKind::DynamicImport,
                ReferenceKind::Import,
            ]
        );
        assert_eq!(
            references[0].metadata["importSource"].as_str(),
            Some("./b")
        );
        assert_eq!(references[0].target_symbol_name.as_deref(), Some("foo"));
    }

    #[test]
    fn resolve_tries_extensions_and_index() {
        let files: HashSet<String> = ["src/b.ts", "src/lib/index.ts", "src/c.tsx"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            resolve("src/a.ts", "./b", &files),
            Some("src/b.ts".to_string())
        );
        assert_eq!(
            resolve("src/a.ts", "./lib", &files),
            Some("src/lib/index.ts".to_string())
        );
        assert_eq!(
            resolve("src/a.ts", "./c.js", &files),
            Some("src/c.tsx".to_string())
        );
        assert_eq!(resolve("src/a.ts", "lodash", &files), None);
        assert_eq!(resolve("src/a.ts", "./missing", &files), None);
    }

    #[test]
    fn resolve_handles_parent_dirs() {
        let files: HashSet<String> = ["lib/util.ts"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            resolve("src/deep/a.ts", "../../lib/util", &files),
            Some("lib/util.ts".to_string())
        );
    }

    #[test]
    fn self_import_resolves_to_source() {
        let files: HashSet<String> = ["x.ts"].iter().map(|s| s.to_string()).collect();
        assert_eq!(resolve("x.ts", "./x", &files), Some("x.ts".to_string()));
    }
}
