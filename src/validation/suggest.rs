//! Fuzzy alternatives for unknown node types
//!
//! When a plan names a node type the registry does not know, the validator
//! offers up to five close matches so the planner's next attempt can pick a
//! real one. Typos in the trailing segment ("http.requst") are the common
//! case, so edit distance on that segment carries the biggest bonus.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::registry::NodeTypeRegistry;

const MAX_SUGGESTIONS: usize = 5;

/// Rank registry types against an unknown type name.
///
/// Scoring per candidate:
/// - 100 for an exact match on the trailing name segment
/// - 50 when the candidate name contains the target's trailing segment
/// - 30 when the full candidate string contains the full target string
/// - 20 per shared significant word fragment (length >= 3)
/// - (10 - d) * 10 when Levenshtein distance d on the trailing segment is <= 3
///
/// Returns the top five by descending score; ties keep registry order.
pub fn suggest_alternatives(target: &str, registry: &NodeTypeRegistry) -> Vec<String> {
    let target_lower = target.to_lowercase();
    let target_tail = trailing_segment(&target_lower);
    // Fragment the original casing so camelCase boundaries survive
    let target_fragments = fragments(target);

    let mut scored: Vec<(i64, usize, &str)> = Vec::new();

    for (order, entry) in registry.entries().iter().enumerate() {
        let candidate = entry.name.as_str();
        let candidate_lower = candidate.to_lowercase();
        let candidate_tail = trailing_segment(&candidate_lower);

        let mut score: i64 = 0;

        if candidate_tail == target_tail {
            score += 100;
        }
        if candidate_lower.contains(target_tail) {
            score += 50;
        }
        if candidate_lower.contains(&target_lower) {
            score += 30;
        }

        let candidate_fragments = fragments(candidate);
        score += 20 * candidate_fragments.intersection(&target_fragments).count() as i64;

        let distance = levenshtein(candidate_tail, target_tail);
        if distance <= 3 {
            score += (10 - distance as i64) * 10;
        }

        if score > 0 {
            scored.push((score, order, candidate));
        }
    }

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, _, name)| name.to_string())
        .collect()
}

/// The part after the last `.`, or the whole name
fn trailing_segment(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Significant word fragments split at non-alphanumeric and camelCase
/// boundaries, lowercased, length >= 3
fn fragments(name: &str) -> HashSet<String> {
    static WORD: OnceLock<Regex> = OnceLock::new();
    let word = WORD.get_or_init(|| Regex::new(r"[A-Z]?[a-z0-9]+|[A-Z]+").unwrap());

    word.find_iter(name)
        .map(|m| m.as_str().to_lowercase())
        .filter(|f| f.len() >= 3)
        .collect()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            current[j + 1] = (prev[j + 1] + 1).min(current[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut current);
    }

    prev[b.len()]
}
