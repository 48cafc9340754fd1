//! Labeled-section extraction from agent output.
//!
//! Phase agents answer in loosely structured prose with `Label:` lines or
//! `## Label` headings. These helpers pull one section out without assuming
//! the rest of the output is well formed.

/// Extract the value of a labeled section.
///
/// Matches either an inline `Label: value` line or a `## Label` heading
/// followed by a block. Blocks end at the next heading or labeled line.
/// Labels are matched case-insensitively.
pub fn extract_section(text: &str, label: &str) -> Option<String> {
    let lower_label = label.to_ascii_lowercase();
    let lines: Vec<&str> = text.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();

        // Inline form: "Label: value".
        if let Some((head, rest)) = trimmed.split_once(':') {
            let head = head.trim_start_matches(['#', '*', '-', ' ']).trim();
            if head.eq_ignore_ascii_case(&lower_label) {
                let inline = rest.trim();
                if !inline.is_empty() {
                    return Some(inline.to_string());
                }
                return collect_block(&lines, i + 1);
            }
        }

        // Heading form: "## Label".
        let stripped = trimmed.trim_start_matches('#').trim();
        if trimmed.starts_with('#') && stripped.eq_ignore_ascii_case(&lower_label) {
            return collect_block(&lines, i + 1);
        }
    }
    None
}

/// Gather lines until the next heading or labeled line.
fn collect_block(lines: &[&str], start: usize) -> Option<String> {
    let mut block = Vec::new();
    for line in &lines[start..] {
        let trimmed = line.trim();
        if trimmed.starts_with('#') || looks_like_label(trimmed) {
            break;
        }
        block.push(*line);
    }
    let joined = block.join("\n").trim().to_string();
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// A short capitalized `Word:` or `Two Words:` prefix reads as a new label.
fn looks_like_label(line: &str) -> bool {
    let Some((head, _)) = line.split_once(':') else {
        return false;
    };
    let head = head.trim();
    !head.is_empty()
        && head.len() <= 32
        && head.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && head.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ')
}

/// Extract bullet items (`-` or `*`) from a labeled section.
pub fn extract_list_section(text: &str, label: &str) -> Vec<String> {
    let Some(block) = extract_section(text, label) else {
        return Vec::new();
    };
    block
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
                .map(|item| item.trim().to_string())
        })
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_inline_label() {
        let text = "Domain: auth\nIssue Type: bug\n";
        assert_eq!(extract_section(text, "domain").as_deref(), Some("auth"));
        assert_eq!(extract_section(text, "Issue Type").as_deref(), Some("bug"));
    }

    #[test]
    fn extracts_heading_block() {
        let text = "## Requirements\nAdd login retry.\nKeep the session alive.\n\n## Notes\nnone";
        let section = extract_section(text, "Requirements").unwrap();
        assert!(section.contains("login retry"));
        assert!(!section.contains("none"));
    }

    #[test]
    fn block_stops_at_next_label() {
        let text = "Requirements:\n- add retry\n- log failures\nDomain: auth";
        let section = extract_section(text, "requirements").unwrap();
        assert!(!section.contains("auth"));
    }

    #[test]
    fn missing_label_returns_none() {
        assert_eq!(extract_section("nothing here", "Domain"), None);
    }

    #[test]
    fn extracts_bullet_list() {
        let text = "Modified Files:\n- src/a.ts\n* src/b.ts\nnot a bullet\n";
        let items = extract_list_section(text, "Modified Files");
        assert_eq!(items, vec!["src/a.ts", "src/b.ts"]);
    }
}
