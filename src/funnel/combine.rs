//! Merge the primary and secondary picks into the final list.

use crate::prefilter::CandidateDetail;

/// The final list is padded up to this length when the pool allows.
pub const MIN_RESULTS: usize = 5;

/// Source of each output slot: `(from_primary, rank)`.
///
/// Primary ranks 2 and 3 are skipped on purpose; the slots they would take go
/// to secondary picks.
const SLOTS: [(bool, usize); 5] = [(true, 0), (false, 0), (true, 3), (false, 1), (true, 4)];

/// Interleave `primary` (Stage 3, best first) with `secondary` (Stage 4).
/// A slot whose source list is too short is left out.
pub fn interleave(primary: &[String], secondary: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(SLOTS.len());
    for (from_primary, rank) in SLOTS {
        let source = if from_primary { primary } else { secondary };
        if let Some(id) = source.get(rank) {
            if !out.contains(id) {
                out.push(id.clone());
            }
        }
    }
    out
}

/// Append unchosen pool ids, in pool order, until `MIN_RESULTS` is reached.
pub fn pad_from_pool(mut list: Vec<String>, pool: &[CandidateDetail]) -> Vec<String> {
    for candidate in pool {
        if list.len() >= MIN_RESULTS {
            break;
        }
        if !list.contains(&candidate.item_id) {
            list.push(candidate.item_id.clone());
        }
    }
    list
}

pub fn combine(primary: &[String], secondary: &[String], pool: &[CandidateDetail]) -> Vec<String> {
    pad_from_pool(interleave(primary, secondary), pool)
}
