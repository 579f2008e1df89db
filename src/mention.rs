//! Detect the user's name inside other people's reviews of the candidates.
//!
//! A reply like "Thanks for the kind words, Ann!" says something about how
//! the user felt about a venue. The signal is only worth passing on when it is
//! rare; a common first name that shows up everywhere is a collision.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::store::{DataTool, UNKNOWN};

/// Names shorter than this (after trimming) are not searched for.
pub const MIN_NAME_CHARS: usize = 2;
/// Mentions at more venues than this are treated as a naming collision.
pub const MAX_MENTIONED_VENUES: usize = 3;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]+").expect("Invalid word regex"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MentionDetail {
    pub venue_id: String,
    pub venue_name: String,
    /// Full text of every review of the venue that contains the name.
    pub mentions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MentionInfo {
    pub mentioned_venues: BTreeSet<String>,
    pub mention_details: Vec<MentionDetail>,
}

impl MentionInfo {
    pub fn venue_count(&self) -> usize {
        self.mentioned_venues.len()
    }

    /// Whether the mentions are sparse enough to be worth telling the oracle.
    pub fn is_signal(&self) -> bool {
        (1..=MAX_MENTIONED_VENUES).contains(&self.venue_count())
    }

    /// Prompt section describing the mentions, or `""` when suppressed.
    pub fn context(&self) -> String {
        if !self.is_signal() {
            return String::new();
        }

        let mut parts = vec![
            "Reviews at the following venues mention the user's name; they may be replies to the user's own reviews:"
                .to_string(),
        ];
        for detail in &self.mention_details {
            parts.push(format!("\n[{}] reviews containing the user's name:", detail.venue_name));
            for (i, text) in detail.mentions.iter().enumerate() {
                parts.push(format!("{}. \"{}\"", i + 1, text));
            }
        }
        parts.push(
            "\nRead these carefully. A mention may instead refer to staff, another customer \
             or an unrelated person with the same name. If a review really is a reply to the \
             user, use it as evidence of the user's attitude toward that venue and of their \
             needs and habits."
                .to_string(),
        );
        parts.join("\n")
    }
}

/// Lowercase alphabetic tokens of `text`; anything else separates words.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    WORD.find_iter(text).map(|m| m.as_str().to_ascii_lowercase())
}

/// Scan every review of every candidate for `user_name` as a whole token.
pub fn detect_mentions(user_name: &str, candidate_ids: &[String], tool: &dyn DataTool) -> MentionInfo {
    let needle = user_name.trim().to_lowercase();
    if needle.chars().count() < MIN_NAME_CHARS {
        return MentionInfo::default();
    }

    let mut info = MentionInfo::default();
    for item_id in candidate_ids {
        let mentions: Vec<String> = tool
            .reviews_by_item(item_id)
            .into_iter()
            .filter(|r| tokenize(&r.text).any(|word| word == needle))
            .map(|r| r.text)
            .collect();
        if mentions.is_empty() {
            continue;
        }

        let venue_name = tool
            .get_item(item_id)
            .map(|item| item.name)
            .unwrap_or_else(|| UNKNOWN.to_string());
        info.mentioned_venues.insert(item_id.clone());
        info.mention_details.push(MentionDetail {
            venue_id: item_id.clone(),
            venue_name,
            mentions,
        });
    }
    info
}
