//! Repair oracle selections against the ids a stage was given.

use std::collections::HashSet;

use crate::prefilter::CandidateDetail;

/// How unselected pool entries are ordered when padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadOrder {
    /// Highest `avg_rating` first; ties keep pool order.
    RatingDesc,
    /// Pool order as given.
    AsGiven,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Validated<T> {
    pub items: Vec<T>,
    /// Proposed entries that were dropped (unknown id, repeat, or over target).
    pub rejected: usize,
    /// Entries appended from the pool.
    pub padded: usize,
}

impl<T> Validated<T> {
    pub fn accepted(&self) -> usize {
        self.items.len() - self.padded
    }
}

/// Pool entries sorted by rating, highest first. The sort is stable.
pub fn rank_by_rating<'a>(pool: &[&'a CandidateDetail]) -> Vec<&'a CandidateDetail> {
    let mut ranked = pool.to_vec();
    ranked.sort_by(|a, b| b.avg_rating.total_cmp(&a.avg_rating));
    ranked
}

/// Keep proposals whose id is in `pool` (first occurrence only, up to
/// `target`), then pad from the rest of the pool in `order` until `target`
/// entries exist or the pool runs out.
pub fn validate_and_pad<'a, T>(
    proposed: impl IntoIterator<Item = T>,
    pool: &[&'a CandidateDetail],
    target: usize,
    order: PadOrder,
    id_of: impl Fn(&T) -> &str,
    pad: impl Fn(&'a CandidateDetail) -> T,
) -> Validated<T> {
    let valid: HashSet<&str> = pool.iter().map(|c| c.item_id.as_str()).collect();
    let mut chosen: HashSet<String> = HashSet::new();
    let mut items = Vec::new();
    let mut rejected = 0;

    for entry in proposed {
        let id = id_of(&entry).to_string();
        if items.len() >= target || !valid.contains(id.as_str()) || chosen.contains(&id) {
            rejected += 1;
            continue;
        }
        chosen.insert(id);
        items.push(entry);
    }

    let fill = match order {
        PadOrder::RatingDesc => rank_by_rating(pool),
        PadOrder::AsGiven => pool.to_vec(),
    };
    let mut padded = 0;
    for candidate in fill {
        if items.len() >= target {
            break;
        }
        if chosen.insert(candidate.item_id.clone()) {
            items.push(pad(candidate));
            padded += 1;
        }
    }

    Validated {
        items,
        rejected,
        padded,
    }
}
