//! Entity records as the data tool hands them out.
//!
//! Source rows are loose (keys missing, nulls, floats where integers belong).
//! Every field is resolved to a concrete value here so the funnel never sees
//! a missing key:
//!
//! | Record | Field | Default |
//! |---|---|---|
//! | `User` | `name` | `""` |
//! | `Item` | `name`, `city` | `"Unknown"` |
//! | `Item` | `categories` | `None` |
//! | `Item` | `stars` | `0.0` (unknown) |
//! | `Review` | `stars` | required; rows without a 1-5 rating are rejected |
//! | `Review` | `text` | `""` |
//! | `Review` | `useful` | `0` |
//! | `Review` | `date` | `None` |

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "user_id")]
    pub id: String,
    #[serde(default, deserialize_with = "string_or_default")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(alias = "item_id", alias = "business_id")]
    pub id: String,
    #[serde(default = "unknown", deserialize_with = "string_or_unknown")]
    pub name: String,
    /// Comma-joined category list, most specific first.
    #[serde(default)]
    pub categories: Option<String>,
    /// Store-declared average; `0.0` means unknown.
    #[serde(default, deserialize_with = "f64_or_zero")]
    pub stars: f64,
    #[serde(default = "unknown", deserialize_with = "string_or_unknown")]
    pub city: String,
}

impl Item {
    /// Text before the first comma of `categories`, or `"Unknown"`.
    pub fn main_category(&self) -> String {
        main_category(self.categories.as_deref())
    }

    /// Declared average, if the store knows one.
    pub fn declared_stars(&self) -> Option<f64> {
        (self.stars > 0.0).then_some(self.stars)
    }
}

pub fn main_category(categories: Option<&str>) -> String {
    categories
        .and_then(|c| c.split(',').next())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(alias = "business_id")]
    pub item_id: String,
    pub user_id: String,
    /// 1-5. Fractional source values are rounded; anything that does not
    /// round into range fails the row.
    #[serde(deserialize_with = "stars_from_number")]
    pub stars: u8,
    #[serde(default, deserialize_with = "string_or_default")]
    pub text: String,
    #[serde(default, deserialize_with = "count_or_zero")]
    pub useful: u32,
    #[serde(default)]
    pub date: Option<String>,
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

fn string_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

fn string_or_unknown<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(unknown))
}

fn f64_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(d)?
        .filter(|v| v.is_finite())
        .unwrap_or(0.0))
}

fn stars_from_number<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    let raw = Option::<f64>::deserialize(d)?;
    match raw.map(f64::round) {
        Some(v) if (1.0..=5.0).contains(&v) => Ok(v as u8),
        _ => Err(D::Error::custom(format!("review stars out of range: {raw:?}"))),
    }
}

fn count_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    Ok(Option::<f64>::deserialize(d)?
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v as u32)
        .unwrap_or(0))
}
