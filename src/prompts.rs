//! Prompt templates for the funnel stages and review synthesis.
//!
//! Templates are plain text with `{name}` placeholders. Rendering is a single
//! pass over the template, so braces that appear inside substituted values
//! (review bodies, venue names) are never themselves substituted.

use std::collections::HashMap;

use crate::features::excerpt;
use crate::oracle::Message;
use crate::prefilter::CandidateDetail;
use crate::store::Review;

// =============================================================================
// Prompt templates
// =============================================================================

/// Rendered prompt ready for the oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptInstance {
    pub template_slug: &'static str,
    pub system: String,
    pub user: String,
}

impl PromptInstance {
    pub fn to_messages(&self) -> Vec<Message> {
        vec![Message::system(&self.system), Message::user(&self.user)]
    }

    /// Stable hash of the rendered text, for traces.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.system.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.user.as_bytes());
        hasher.finalize().to_hex().as_str()[..16].to_string()
    }
}

/// A prompt template with placeholders.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub slug: &'static str,
    pub system: &'static str,
    pub user: &'static str,
}

impl PromptTemplate {
    pub fn render(&self, vars: &[(&str, &str)]) -> PromptInstance {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        PromptInstance {
            template_slug: self.slug,
            system: fill(self.system, &vars).trim().to_string(),
            user: fill(self.user, &vars).trim().to_string(),
        }
    }
}

/// Replace each `{key}` whose key is in `vars`. Unknown keys and any other
/// braces are copied through untouched.
fn fill(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let key_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        let key = &after[..key_len];

        match vars.get(key) {
            Some(value) if key_len > 0 && after[key_len..].starts_with('}') => {
                out.push_str(value);
                rest = &after[key_len + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

// =============================================================================
// Listings
// =============================================================================

const LISTED_REVIEWS: usize = 3;

fn review_lines(reviews: &[Review], max_chars: usize) -> String {
    if reviews.is_empty() {
        return "\n   Representative reviews: none yet".to_string();
    }
    let mut out = String::from("\n   Representative reviews:");
    for (j, review) in reviews.iter().take(LISTED_REVIEWS).enumerate() {
        let useful = if review.useful > 0 {
            format!(" ({} useful)", review.useful)
        } else {
            String::new()
        };
        out.push_str(&format!(
            "\n     {}. [{} stars{useful}] \"{}\"",
            j + 1,
            review.stars,
            excerpt(&review.text, max_chars)
        ));
    }
    out
}

/// Numbered candidate listing used by screening and secondary selection.
pub fn format_venue_listing(venues: &[&CandidateDetail]) -> String {
    venues
        .iter()
        .enumerate()
        .map(|(i, v)| {
            format!(
                "{}. {} (ID: {})\n   Category: {} | Rating: {} stars ({} reviews){}",
                i + 1,
                v.name,
                v.item_id,
                v.category,
                v.avg_rating,
                v.review_count,
                review_lines(&v.reviews, 120)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Listing of screened venues with the screening reason attached.
pub fn format_shortlist(entries: &[(&CandidateDetail, &str)]) -> String {
    entries
        .iter()
        .enumerate()
        .map(|(i, (v, reason))| {
            format!(
                "{}. {} (ID: {})\n   Category: {} | Rating: {} stars ({} reviews)\n   Why it was shortlisted: {}{}",
                i + 1,
                v.name,
                v.item_id,
                v.category,
                v.avg_rating,
                v.review_count,
                reason,
                review_lines(&v.reviews, 100)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// =============================================================================
// Standard prompts
// =============================================================================

pub const INTENT_ANALYSIS: PromptTemplate = PromptTemplate {
    slug: "intent_analysis",
    system: "You are an expert in user behaviour analysis. Answer in exactly the requested format: \
1) a one-sentence user profile describing the user's traits and preferences; \
2) the primary need (the most central, specific need); \
3) the secondary need (important but not central); \
4) the potential need (something the user may like but has not expressed). \
Every item must be specific. Add nothing else.",
    user: r#"User information:
- Name: {user_name}
- Average rating given: {avg_rating} stars
- Reviews written: {review_count}
- Average rating of visited venues: {visited_avg} stars
- Category currently being recommended: {candidate_category}

{category_analysis}

{review_digest}

{mention_context}

Based on the user's past behaviour, describe the user and their layered needs.

Output format:
```json
{
    "user_profile": "User X is a ... who values ...",
    "primary_need": "a specific primary need, e.g. 'nail care'",
    "secondary_need": "a specific secondary need, e.g. 'hair styling'",
    "potential_need": "a specific potential need, e.g. 'skin care'"
}
```"#,
};

pub const PRIMARY_SCREENING: PromptTemplate = PromptTemplate {
    slug: "primary_screening",
    system: "You are the primary-need screening expert of a recommender system. \
From all candidate venues, pick the 10 that best satisfy the user's primary need.

Principles:
1. Stay focused on the primary need; prefer venues that serve it directly.
2. Venues that serve it indirectly may be considered.
3. Prefer venue quality that matches the user's rating habits.
4. Weigh the user's past behaviour and preferences.
5. Keep the selection varied.",
    user: r#"User profile: {user_profile}

Primary need: {primary_need}
Secondary need: {secondary_need}
Potential need: {potential_need}

User information:
- Name: {user_name}
- Average rating given: {avg_rating} stars
- Reviews written: {review_count}
- Average rating of visited venues: {visited_avg} stars

{review_digest}

All candidate venues:
{venues}

Select the 10 venues that best satisfy the primary need "{primary_need}".
Think carefully before answering.

Output format:
```json
{
    "selected_venues": [
        {
            "venue_id": "venue ID",
            "venue_name": "venue name",
            "selection_reason": "how it serves the primary need"
        }
    ]
}
```"#,
};

pub const FINAL_SELECTION: PromptTemplate = PromptTemplate {
    slug: "final_selection",
    system: "You make the final decision for a recommender system: choose 5 of the 10 shortlisted venues \
and order them by priority.

Principles:
1. Stay focused on the primary need.
2. The first pick matters most and should fit the user profile and primary need best.
3. Match venue quality to the user's rating habits.
4. Allow some variety without drifting from the primary need.
5. Use the reviews to understand what visiting each venue is really like.",
    user: r#"User profile: {user_profile}

Primary need: {primary_need}

User record:
- Average rating given: {avg_rating} stars
- Reviews written: {review_count}
- Average rating of visited venues: {visited_avg} stars

The 10 shortlisted venues:
{venues}

Choose 5 final recommendations from these venues, highest priority first.
Think carefully before answering.

Output format:
```json
{
    "final_recommendations": ["ID1", "ID2", "ID3", "ID4", "ID5"],
    "selection_rationale": "why these 5 and why in this order"
}
```"#,
};

pub const SECONDARY_SELECTION: PromptTemplate = PromptTemplate {
    slug: "secondary_selection",
    system: "You are the secondary-need expert of a recommender system. \
From the remaining venues, pick 3 that serve the user's secondary need first and potential need second.

Principles:
1. Prefer venues that serve the secondary need.
2. Include venues for the potential need where they open up something new the user may enjoy.
3. Respect the user profile and preferences.
4. Keep venue quality up to the user's standards.
5. Offer experiences different from the primary-need picks.",
    user: r#"User profile: {user_profile}

Secondary need: {secondary_need}
Potential need: {potential_need}

User information:
- Name: {user_name}
- Average rating given: {avg_rating} stars
- Reviews written: {review_count}
- Average rating of visited venues: {visited_avg} stars

Remaining venues (primary-need picks excluded):
{venues}

Select 3 of these venues that serve the secondary or potential need.
Think carefully before answering.

Output format:
```json
{
    "recommended_venues": [
        {
            "venue_id": "venue ID",
            "venue_name": "venue name",
            "need_type": "secondary or potential",
            "selection_reason": "which need it serves and how"
        }
    ]
}
```"#,
};

pub const REVIEW_WRITING: PromptTemplate = PromptTemplate {
    slug: "review_writing",
    system: "You write venue reviews in the voice of a specific user, based on their history.

Requirements:
1. The rating must match the user's rating habits and their taste for this kind of venue.
2. Imitate the user's writing style in 30-50 words.
3. Focus on the venue qualities the user has cared about before.",
    user: r#"User preferences:
{preference_summary}

{review_digest}

Target venue:
- Name: {venue_name}
- Category: {venue_category}
- Average rating: {venue_avg} stars

Write one review that fits this user's preferences.

Output format:
```json
{
    "stars": <integer 1-5>,
    "review": "<review in the user's style, 30-50 words>"
}
```"#,
};
