//! Candidate resolution and the low-rating cut.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::features::round_to;
use crate::store::{DataTool, Item, Review};

/// Venues averaging at or below this are dropped before any oracle call.
pub const MIN_AVG_RATING: f64 = 1.5;
/// Fewer survivors than this and the funnel is skipped entirely.
pub const MIN_CANDIDATES: usize = 5;
/// Sample reviews kept per candidate for prompt listings.
pub const SAMPLE_REVIEWS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateDetail {
    pub item_id: String,
    pub name: String,
    pub category: String,
    /// Rounded to one decimal.
    pub avg_rating: f64,
    /// All reviews of the venue, not just the sampled ones.
    pub review_count: usize,
    pub city: String,
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, Default)]
pub struct Prefiltered {
    /// Survivors, in input order.
    pub candidates: Vec<CandidateDetail>,
    pub dropped_low_rating: Vec<String>,
    pub unresolved: Vec<String>,
}

impl Prefiltered {
    /// Too few survivors to run the funnel.
    pub fn is_short(&self) -> bool {
        self.candidates.len() < MIN_CANDIDATES
    }

    pub fn ids(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.item_id.clone()).collect()
    }
}

/// The venue's declared rating, else the mean of its review ratings, else 0.
pub fn venue_average(item: &Item, reviews: &[Review]) -> f64 {
    if let Some(stars) = item.declared_stars() {
        return stars;
    }
    if reviews.is_empty() {
        return 0.0;
    }
    reviews.iter().map(|r| f64::from(r.stars)).sum::<f64>() / reviews.len() as f64
}

/// Resolve each candidate id and drop venues rated at or below
/// [`MIN_AVG_RATING`]. Unresolvable and repeated ids are skipped.
pub fn prefilter(candidate_ids: &[String], tool: &dyn DataTool) -> Prefiltered {
    let mut out = Prefiltered::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for id in candidate_ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        let Some(item) = tool.get_item(id) else {
            debug!(item_id = %id, "candidate not found; skipping");
            out.unresolved.push(id.clone());
            continue;
        };

        let mut reviews = tool.reviews_by_item(id);
        let avg = venue_average(&item, &reviews);
        if avg <= MIN_AVG_RATING {
            debug!(item_id = %id, avg, "candidate below rating floor; dropping");
            out.dropped_low_rating.push(id.clone());
            continue;
        }

        let review_count = reviews.len();
        reviews.truncate(SAMPLE_REVIEWS);
        out.candidates.push(CandidateDetail {
            item_id: id.clone(),
            category: item.main_category(),
            avg_rating: round_to(avg, 1),
            review_count,
            reviews,
            name: item.name,
            city: item.city,
        });
    }
    out
}
