//! User-side features derived from review history.
//!
//! Everything here is a pure function of the user's reviews plus venue
//! lookups. Nothing is cached across requests.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::store::{DataTool, Item, Review};

/// Review excerpts in prompts are cut to this many characters.
pub const EXCERPT_CHARS: usize = 120;

/// A user's review joined with the venue it is about (if the venue resolves).
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub review: Review,
    pub venue: Option<Item>,
}

impl HistoryEntry {
    pub fn category(&self) -> Option<String> {
        self.venue.as_ref().map(Item::main_category)
    }
}

/// The user's full review history, with venue lookups done once.
#[derive(Debug, Clone, Default)]
pub struct UserHistory {
    entries: Vec<HistoryEntry>,
}

impl UserHistory {
    pub fn load(user_id: &str, tool: &dyn DataTool) -> Self {
        Self::from_reviews(tool.reviews_by_user(user_id), tool)
    }

    pub fn from_reviews(reviews: Vec<Review>, tool: &dyn DataTool) -> Self {
        let entries = reviews
            .into_iter()
            .map(|review| {
                let venue = tool.get_item(&review.item_id);
                HistoryEntry { review, venue }
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStats {
    pub category: String,
    pub count: usize,
    pub avg_rating: f64,
}

/// Per-category visit counts, in first-visit order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryPreferences(Vec<CategoryStats>);

impl CategoryPreferences {
    fn from_history(history: &UserHistory) -> Self {
        let mut order: Vec<String> = Vec::new();
        let mut ratings: HashMap<String, Vec<u8>> = HashMap::new();

        for entry in history.entries() {
            let Some(category) = entry.category() else {
                continue;
            };
            let bucket = ratings.entry(category.clone()).or_insert_with(|| {
                order.push(category.clone());
                Vec::new()
            });
            bucket.push(entry.review.stars);
        }

        let stats = order
            .into_iter()
            .map(|category| {
                let stars = &ratings[&category];
                CategoryStats {
                    count: stars.len(),
                    avg_rating: round_to(mean_stars(stars), 1),
                    category,
                }
            })
            .collect();
        Self(stats)
    }

    pub fn get(&self, category: &str) -> Option<&CategoryStats> {
        self.0.iter().find(|s| s.category == category)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryStats> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total_visits(&self) -> usize {
        self.0.iter().map(|s| s.count).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserPreferenceProfile {
    pub avg_rating: f64,
    pub review_count: usize,
    /// Mean declared rating of the venues the user reviewed (0 if none known).
    pub visited_venues_avg_rating: f64,
    pub category_preferences: CategoryPreferences,
}

impl UserPreferenceProfile {
    /// Profile for a user with no history.
    pub fn empty() -> Self {
        Self {
            avg_rating: 3.0,
            review_count: 0,
            visited_venues_avg_rating: 0.0,
            category_preferences: CategoryPreferences::default(),
        }
    }

    pub fn from_history(history: &UserHistory) -> Self {
        if history.is_empty() {
            return Self::empty();
        }

        let stars: Vec<u8> = history.entries().iter().map(|e| e.review.stars).collect();
        let venue_ratings: Vec<f64> = history
            .entries()
            .iter()
            .filter_map(|e| e.venue.as_ref().and_then(Item::declared_stars))
            .collect();
        let visited_venues_avg_rating = if venue_ratings.is_empty() {
            0.0
        } else {
            round_to(venue_ratings.iter().sum::<f64>() / venue_ratings.len() as f64, 2)
        };

        Self {
            avg_rating: round_to(mean_stars(&stars), 1),
            review_count: stars.len(),
            visited_venues_avg_rating,
            category_preferences: CategoryPreferences::from_history(history),
        }
    }
}

/// Writing-style statistics used to imitate the user's voice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewStyleProfile {
    pub avg_rating: f64,
    pub review_count: usize,
    pub avg_text_length: usize,
    /// Share of reviews with 4 or 5 stars.
    pub positive_ratio: f64,
    pub category_preferences: CategoryPreferences,
}

impl ReviewStyleProfile {
    pub fn empty() -> Self {
        Self {
            avg_rating: 3.0,
            review_count: 0,
            avg_text_length: 50,
            positive_ratio: 0.0,
            category_preferences: CategoryPreferences::default(),
        }
    }

    pub fn from_history(history: &UserHistory) -> Self {
        if history.is_empty() {
            return Self::empty();
        }

        let n = history.len() as f64;
        let stars: Vec<u8> = history.entries().iter().map(|e| e.review.stars).collect();
        let total_chars: usize = history
            .entries()
            .iter()
            .map(|e| e.review.text.chars().count())
            .sum();
        let positive = stars.iter().filter(|&&s| s >= 4).count() as f64;

        Self {
            avg_rating: round_to(mean_stars(&stars), 1),
            review_count: stars.len(),
            avg_text_length: (total_chars as f64 / n).round() as usize,
            positive_ratio: round_to(positive / n, 2),
            category_preferences: CategoryPreferences::from_history(history),
        }
    }
}

/// Visit counts in the categories currently on offer, busiest first, with the
/// share of all visits they account for.
pub fn category_analysis(profile: &UserPreferenceProfile, candidate_categories: &[String]) -> String {
    let prefs = &profile.category_preferences;
    if prefs.is_empty() {
        return "The user has no rating history.".to_string();
    }

    let mut relevant: Vec<&CategoryStats> = prefs
        .iter()
        .filter(|s| candidate_categories.contains(&s.category))
        .collect();
    relevant.sort_by(|a, b| b.count.cmp(&a.count));

    let mut lines = vec!["User's visit history in the candidate categories:".to_string()];
    if relevant.is_empty() {
        lines.push("- No visits in any candidate category".to_string());
    }
    for stats in &relevant {
        lines.push(format!(
            "- {}: {} visits (avg {} stars)",
            stats.category, stats.count, stats.avg_rating
        ));
    }

    let total = prefs.total_visits();
    let relevant_visits: usize = relevant.iter().map(|s| s.count).sum();
    if total > 0 {
        lines.push(format!(
            "\nShare of visits in candidate categories: {relevant_visits}/{total} ({:.1}%)",
            relevant_visits as f64 * 100.0 / total as f64
        ));
    }
    lines.join("\n")
}

pub const NO_RELEVANT_REVIEWS: &str = "The user has no past reviews in related categories.";

/// Up to `limit` of the user's own reviews in `categories`, newest first (or
/// most useful first when dates are missing or unreadable).
pub fn relevant_review_digest(history: &UserHistory, categories: &[String], limit: usize) -> String {
    if history.is_empty() || categories.is_empty() || limit == 0 {
        return NO_RELEVANT_REVIEWS.to_string();
    }

    let mut relevant: Vec<(&HistoryEntry, String)> = history
        .entries()
        .iter()
        .filter_map(|e| {
            let category = e.category()?;
            categories.contains(&category).then_some((e, category))
        })
        .collect();
    if relevant.is_empty() {
        return NO_RELEVANT_REVIEWS.to_string();
    }

    let dates: Option<Vec<NaiveDateTime>> = relevant
        .iter()
        .map(|(e, _)| e.review.date.as_deref().and_then(parse_review_date))
        .collect();
    match dates {
        Some(dates) => {
            let mut keyed: Vec<_> = relevant.into_iter().zip(dates).collect();
            keyed.sort_by(|a, b| b.1.cmp(&a.1));
            relevant = keyed.into_iter().map(|(r, _)| r).collect();
        }
        None => relevant.sort_by(|a, b| b.0.review.useful.cmp(&a.0.review.useful)),
    }

    let mut lines = vec!["Examples of the user's past reviews in related categories:".to_string()];
    for (i, (entry, category)) in relevant.iter().take(limit).enumerate() {
        let review = &entry.review;
        let venue_name = entry.venue.as_ref().map(|v| v.name.as_str()).unwrap_or("Unknown");
        let useful = if review.useful > 0 {
            format!(" ({} useful)", review.useful)
        } else {
            String::new()
        };
        let date = review
            .date
            .as_deref()
            .filter(|d| !d.is_empty())
            .map(|d| format!(" {}", d.chars().take(10).collect::<String>()))
            .unwrap_or_default();
        lines.push(format!(
            "\n{}. [{} stars{useful}]{date} {venue_name} ({category})",
            i + 1,
            review.stars
        ));
        lines.push(format!("   \"{}\"", excerpt(&review.text, EXCERPT_CHARS)));
    }
    lines.join("\n")
}

/// First `max` characters of `text`, with "..." appended if anything was cut.
pub fn excerpt(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let mut cut: String = text.chars().take(max).collect();
        cut.push_str("...");
        cut
    } else {
        text.to_string()
    }
}

fn parse_review_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            let day = raw.get(..10)?;
            NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn mean_stars(stars: &[u8]) -> f64 {
    if stars.is_empty() {
        return 0.0;
    }
    stars.iter().map(|&s| f64::from(s)).sum::<f64>() / stars.len() as f64
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn item(id: &str, categories: &str, stars: f64) -> Item {
        Item {
            id: id.into(),
            name: format!("Venue {id}"),
            categories: Some(categories.into()),
            stars,
            city: "Tampa".into(),
        }
    }

    fn review(item_id: &str, stars: u8, text: &str, useful: u32, date: Option<&str>) -> Review {
        Review {
            item_id: item_id.into(),
            user_id: "u1".into(),
            stars,
            text: text.into(),
            useful,
            date: date.map(str::to_string),
        }
    }

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_item(item("nail1", "Nail Salons, Beauty & Spas", 4.0))
            .with_item(item("nail2", "Nail Salons", 5.0))
            .with_item(item("bar1", "Bars, Nightlife", 0.0))
    }

    #[test]
    fn empty_history_gives_default_profile() {
        let history = UserHistory::from_reviews(Vec::new(), &store());
        let profile = UserPreferenceProfile::from_history(&history);
        assert_eq!(profile, UserPreferenceProfile::empty());
        assert_eq!(
            category_analysis(&profile, &["Bars".to_string()]),
            "The user has no rating history."
        );
        assert_eq!(ReviewStyleProfile::from_history(&history).avg_text_length, 50);
    }

    #[test]
    fn profile_statistics() {
        let store = store();
        let history = UserHistory::from_reviews(
            vec![
                review("nail1", 5, "great", 0, None),
                review("nail2", 4, "good", 0, None),
                review("bar1", 2, "meh", 0, None),
                review("gone", 3, "venue vanished", 0, None),
            ],
            &store,
        );
        let profile = UserPreferenceProfile::from_history(&history);

        assert_eq!(profile.review_count, 4);
        assert_eq!(profile.avg_rating, 3.5);
        // bar1 declares 0 (unknown) and "gone" does not resolve.
        assert_eq!(profile.visited_venues_avg_rating, 4.5);

        let nails = profile.category_preferences.get("Nail Salons").unwrap();
        assert_eq!(nails.count, 2);
        assert_eq!(nails.avg_rating, 4.5);
        assert_eq!(profile.category_preferences.total_visits(), 3);
    }

    #[test]
    fn category_analysis_sorts_by_visits_and_reports_share() {
        let store = store();
        let history = UserHistory::from_reviews(
            vec![
                review("bar1", 2, "", 0, None),
                review("nail1", 5, "", 0, None),
                review("nail2", 4, "", 0, None),
            ],
            &store,
        );
        let profile = UserPreferenceProfile::from_history(&history);
        let text = category_analysis(&profile, &["Nail Salons".to_string(), "Bars".to_string()]);

        let nails = text.find("Nail Salons: 2 visits").unwrap();
        let bars = text.find("Bars: 1 visits").unwrap();
        assert!(nails < bars);
        assert!(text.contains("3/3 (100.0%)"));

        let none = category_analysis(&profile, &["Museums".to_string()]);
        assert!(none.contains("No visits in any candidate category"));
        assert!(none.contains("0/3 (0.0%)"));
    }

    #[test]
    fn digest_prefers_recent_reviews_and_truncates() {
        let store = store();
        let long = "x".repeat(200);
        let history = UserHistory::from_reviews(
            vec![
                review("nail1", 5, "older", 9, Some("2017-01-01 10:00:00")),
                review("nail2", 4, &long, 0, Some("2019-06-30 08:00:00")),
                review("bar1", 1, "not relevant", 0, Some("2020-01-01 00:00:00")),
            ],
            &store,
        );

        let digest = relevant_review_digest(&history, &["Nail Salons".to_string()], 6);
        let newer = digest.find("2019-06-30").unwrap();
        let older = digest.find("2017-01-01").unwrap();
        assert!(newer < older);
        assert!(digest.contains(&format!("\"{}...\"", "x".repeat(120))));
        assert!(digest.contains("(9 useful)"));
        assert!(!digest.contains("not relevant"));
    }

    #[test]
    fn digest_falls_back_to_usefulness_without_dates() {
        let store = store();
        let history = UserHistory::from_reviews(
            vec![
                review("nail1", 5, "less useful", 1, Some("2018-01-01")),
                review("nail2", 4, "most useful", 7, None),
            ],
            &store,
        );
        let digest = relevant_review_digest(&history, &["Nail Salons".to_string()], 1);
        assert!(digest.contains("most useful"));
        assert!(!digest.contains("less useful"));
    }

    #[test]
    fn digest_without_matches() {
        let history = UserHistory::from_reviews(vec![review("bar1", 3, "x", 0, None)], &store());
        assert_eq!(
            relevant_review_digest(&history, &["Nail Salons".to_string()], 5),
            NO_RELEVANT_REVIEWS
        );
    }

    #[test]
    fn style_profile() {
        let history = UserHistory::from_reviews(
            vec![
                review("nail1", 5, "abcd", 0, None),
                review("nail2", 4, "ab", 0, None),
                review("bar1", 1, "abcdef", 0, None),
            ],
            &store(),
        );
        let style = ReviewStyleProfile::from_history(&history);
        assert_eq!(style.avg_text_length, 4);
        assert_eq!(style.positive_ratio, 0.67);
        assert_eq!(style.avg_rating, 3.3);
    }
}
