//! Contextual tips attached to unified-search responses.
//!
//! Produced by a static rule set over the query text, selected scopes, and
//! result counts. Tips never block a response and never change the data.

use std::collections::BTreeMap;

/// Inputs the tip rules look at.
#[derive(Debug, Clone, Default)]
pub struct TipInput<'a> {
    pub query: &'a str,
    pub scopes: &'a [String],
    pub counts: BTreeMap<String, usize>,
    pub has_repository_filter: bool,
    pub repository_count: usize,
}

const FAILURE_KEYWORDS: &[&str] = &["error", "fail", "bug", "broken", "crash"];
const DECISION_KEYWORDS: &[&str] = &["why", "decision", "chose", "architecture"];

pub fn tips_for(input: &TipInput<'_>) -> Vec<String> {
    let mut tips = Vec::new();
    let query = input.query.to_ascii_lowercase();
    let total: usize = input.counts.values().sum();
    let has_scope = |name: &str| input.scopes.iter().any(|s| s == name);

    if total == 0 {
        tips.push(
            "No matches. Try broader terms, or run index_repository if this tree was never indexed."
                .to_string(),
        );
    }

    if FAILURE_KEYWORDS.iter().any(|k| query.contains(k)) && !has_scope("failures") {
        tips.push(
            "The query mentions failures; add \"failures\" to scope to search recorded failed approaches."
                .to_string(),
        );
    }

    if DECISION_KEYWORDS.iter().any(|k| query.contains(k)) && !has_scope("decisions") {
        tips.push(
            "The query looks architectural; add \"decisions\" to scope to search recorded decisions."
                .to_string(),
        );
    }

    if input.counts.get("code").copied().unwrap_or(0) >= 50 {
        tips.push(
            "Many code matches; narrow the query or search the \"symbols\" scope for definitions."
                .to_string(),
        );
    }

    if !input.has_repository_filter && input.repository_count > 1 {
        tips.push(
            "Multiple repositories are indexed; set filters.repository to scope the search."
                .to_string(),
        );
    }

    tips
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scopes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_results_suggest_indexing() {
        let binding = scopes(&["code"]);
        let input = TipInput {
            query: "anything",
            scopes: &binding,
            ..TipInput::default()
        };
        let tips = tips_for(&input);
        assert!(tips.iter().any(|t| t.contains("index_repository")));
    }

    #[test]
    fn failure_keywords_suggest_failures_scope() {
        let binding = scopes(&["code"]);
        let mut counts = BTreeMap::new();
        counts.insert("code".to_string(), 3);
        let input = TipInput {
            query: "login error on refresh",
            scopes: &binding,
            counts,
            ..TipInput::default()
        };
        let tips = tips_for(&input);
        assert!(tips.iter().any(|t| t.contains("failures")));
    }

    #[test]
    fn no_tip_when_failures_scope_already_selected() {
        let binding = scopes(&["code", "failures"]);
        let mut counts = BTreeMap::new();
        counts.insert("code".to_string(), 1);
        let input = TipInput {
            query: "error handling",
            scopes: &binding,
            counts,
            ..TipInput::default()
        };
        let tips = tips_for(&input);
        assert!(!tips.iter().any(|t| t.contains("add \"failures\"")));
    }

    #[test]
    fn multi_repo_without_filter_suggests_filter() {
        let binding = scopes(&["code"]);
        let mut counts = BTreeMap::new();
        counts.insert("code".to_string(), 1);
        let input = TipInput {
            query: "handler",
            scopes: &binding,
            counts,
            has_repository_filter: false,
            repository_count: 3,
        };
        let tips = tips_for(&input);
        assert!(tips.iter().any(|t| t.contains("filters.repository")));
    }
}
