//! Query layer: dependency-graph traversal and key-file aggregation.
//!
//! Traversal is a BFS over the stored adjacency edges. Cycles are results of
//! the walk, never structure: an edge closing back onto the BFS path of its
//! node records the ordered cycle and prunes that branch.

use crate::domains::DomainRules;
use crate::storage::{Storage, StorageError, UnresolvedImport};
use kota_core::{Id, ReferenceKind};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("file not indexed: {0}")]
    FileNotIndexed(String),
}

pub type Result<T> = std::result::Result<T, QueryError>;

/// Traversal direction over the file dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Files that depend on the start file (inbound edges).
    Dependents,
    /// Files the start file depends on (outbound edges).
    Dependencies,
}

/// Result of one bounded traversal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Traversal {
    /// Depth-1 neighbors, lexicographic.
    pub direct: Vec<String>,
    /// Depth 2.. buckets, lexicographic within each bucket.
    pub indirect: BTreeMap<u32, Vec<String>>,
    /// Ordered cycles; first and last element are equal.
    pub cycles: Vec<Vec<String>>,
    /// Imports that never resolved to an indexed file, for diagnostics.
    pub unresolved_imports: Vec<UnresolvedImport>,
}

/// Substrings that mark a path as test code.
const TEST_MARKERS: &[&str] = &[".test.", ".spec.", "/tests/", "/__tests__/"];

/// Whether a path looks like test code.
pub fn is_test_path(path: &str) -> bool {
    TEST_MARKERS.iter().any(|marker| path.contains(marker))
        || path.starts_with("tests/")
        || path.starts_with("__tests__/")
}

/// Maximum supported traversal depth.
pub const MAX_DEPTH: u32 = 5;

/// BFS from `start_path`, bounded by `depth` hops.
///
/// `include_tests=false` filters test paths out of the reported buckets but
/// not out of the traversal frontier. `reference_types` restricts the edges
/// followed.
pub async fn traverse(
    storage: &Storage,
    repository_id: &Id,
    start_path: &str,
    direction: Direction,
    depth: u32,
    include_tests: bool,
    reference_types: Option<&[ReferenceKind]>,
) -> Result<Traversal> {
    if storage
        .resolve_file_path(repository_id, start_path)
        .await?
        .is_none()
    {
        return Err(QueryError::FileNotIndexed(start_path.to_string()));
    }

    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    for edge in storage.edges(repository_id).await? {
        if let Some(allowed) = reference_types {
            if !allowed.contains(&edge.reference_type) {
                continue;
            }
        }
        let (from, to) = match direction {
            Direction::Dependencies => (edge.source_path, edge.target_path),
            Direction::Dependents => (edge.target_path, edge.source_path),
        };
        adjacency.entry(from).or_default().push(to);
    }
    for targets in adjacency.values_mut() {
        targets.sort();
        targets.dedup();
    }

    let mut result = Traversal::default();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(start_path.to_string());
    let mut seen_cycles: HashSet<Vec<String>> = HashSet::new();

    // Queue holds (node, depth, path-from-start) so each node knows the
    // exact route that reached it.
    let mut queue: VecDeque<(String, u32, Vec<String>)> = VecDeque::new();
    queue.push_back((start_path.to_string(), 0, vec![start_path.to_string()]));

    let mut buckets: BTreeMap<u32, Vec<String>> = BTreeMap::new();

    while let Some((node, node_depth, path)) = queue.pop_front() {
        if node_depth >= depth {
            continue;
        }
        let Some(neighbors) = adjacency.get(&node) else {
            continue;
        };
        for neighbor in neighbors {
            if let Some(pos) = path.iter().position(|p| p == neighbor) {
                // Edge closes back onto this branch: record the cycle, prune.
                let mut cycle: Vec<String> = path[pos..].to_vec();
                cycle.push(neighbor.clone());
                if seen_cycles.insert(cycle.clone()) {
                    result.cycles.push(cycle);
                }
                continue;
            }
            if !visited.insert(neighbor.clone()) {
                continue;
            }
            let neighbor_depth = node_depth + 1;
            buckets.entry(neighbor_depth).or_default().push(neighbor.clone());
            let mut neighbor_path = path.clone();
            neighbor_path.push(neighbor.clone());
            queue.push_back((neighbor.clone(), neighbor_depth, neighbor_path));
        }
    }

    for (bucket_depth, mut paths) in buckets {
        if !include_tests {
            paths.retain(|p| !is_test_path(p));
        }
        paths.sort();
        if bucket_depth == 1 {
            result.direct = paths;
        } else if !paths.is_empty() {
            result.indirect.insert(bucket_depth, paths);
        }
    }

    result.unresolved_imports = storage
        .unresolved_imports(repository_id, Some(start_path))
        .await?;

    Ok(result)
}

/// A key file of a domain with its inbound-dependent count.
#[derive(Debug, Clone, Serialize)]
pub struct KeyFile {
    pub path: String,
    pub dependent_count: u64,
}

/// Files with the highest inbound-dependent count, filtered by the
/// domain-to-path rule set. An unknown domain yields repo-wide ranking.
pub async fn domain_key_files(
    storage: &Storage,
    repository_id: &Id,
    rules: &DomainRules,
    domain: &str,
    limit: u32,
) -> Result<(Vec<KeyFile>, bool)> {
    let prefixes = rules.prefixes_for(domain);
    let matched_domain = !prefixes.is_empty();
    let counts = storage.inbound_counts(repository_id).await?;

    let key_files = counts
        .into_iter()
        .filter(|(path, _)| {
            if !matched_domain {
                return true;
            }
            prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
        })
        .take(limit as usize)
        .map(|(path, dependent_count)| KeyFile {
            path,
            dependent_count,
        })
        .collect();

    Ok((key_files, matched_domain))
}
