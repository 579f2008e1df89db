//! Best-effort structured extraction from oracle text.
//!
//! Models wrap JSON in prose, fence it in markdown, leave `//` comments and
//! trailing commas behind. Extraction runs in three steps:
//!
//! 1. take the `json`-tagged fenced block if there is one, else the first
//!    untagged block, else the first block of any language, otherwise the
//!    whole text;
//! 2. strip line comments and trailing commas (outside string literals);
//! 3. parse, falling back to the first balanced `{...}` in the cleaned text.
//!
//! Any failure yields the empty object. Callers treat absent keys as
//! "the oracle said nothing" and apply their own defaults.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

pub type JsonObject = Map<String, Value>;

// Language tag is optional; the body runs to the next fence.
static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_-]+)?[ \t]*\r?\n?(.*?)```")
        .expect("Invalid fenced block regex")
});

/// Parse the oracle's text into a JSON object, or the empty object.
pub fn parse_object(raw: &str) -> JsonObject {
    match parse_value(raw) {
        Some(Value::Object(map)) => map,
        _ => JsonObject::new(),
    }
}

/// Parse the oracle's text into any JSON value.
pub fn parse_value(raw: &str) -> Option<Value> {
    let body = fenced_body(raw).unwrap_or(raw);
    let cleaned = strip_trailing_commas(&strip_line_comments(body));
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        return Some(value);
    }

    balanced_object(cleaned).and_then(|obj| serde_json::from_str::<Value>(obj).ok())
}

fn fenced_body(raw: &str) -> Option<&str> {
    let mut untagged = None;
    let mut any = None;
    for caps in FENCED_BLOCK.captures_iter(raw) {
        let Some(body) = caps.get(2).map(|m| m.as_str()) else {
            continue;
        };
        match caps.get(1).map(|m| m.as_str()) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => return Some(body),
            None => {
                untagged.get_or_insert(body);
            }
            Some(_) => {}
        }
        any.get_or_insert(body);
    }
    untagged.or(any)
}

/// Remove `// ...` up to end of line, leaving string literals alone so that
/// URLs inside values survive.
pub fn strip_line_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Drop commas that directly precede `}` or `]` (whitespace allowed between).
pub fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// First balanced `{...}` in `text`, string-literal aware.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let rest = &text[start..];
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in rest.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&rest[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Non-blank string at `key`, trimmed.
pub fn str_field<'a>(obj: &'a JsonObject, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Array at `key`, or nothing if the key is missing or not an array.
pub fn array_field<'a>(obj: &'a JsonObject, key: &str) -> &'a [Value] {
    obj.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Venue ids arrive as strings, occasionally as bare numbers.
pub fn id_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_block_with_comments_and_trailing_commas() {
        let raw = r#"Here is my analysis.
```json
{
    "primary_need": "nail care", // the main thing
    "ids": ["a", "b",],
}
```
Hope this helps."#;
        let obj = parse_object(raw);
        assert_eq!(str_field(&obj, "primary_need"), Some("nail care"));
        assert_eq!(array_field(&obj, "ids").len(), 2);
    }

    #[test]
    fn bare_json_without_fence() {
        let obj = parse_object(r#"{"stars": 4, "review": "Solid."}"#);
        assert_eq!(obj.get("stars").and_then(Value::as_i64), Some(4));
    }

    #[test]
    fn unlabelled_fence_is_accepted() {
        let obj = parse_object("```\n{\"a\": 1}\n```");
        assert_eq!(obj.get("a").and_then(Value::as_i64), Some(1));
    }

    #[test]
    fn json_fence_wins_over_earlier_reasoning_fence() {
        let raw = "Reasoning:\n```text\nv1 looks best\n```\nAnswer:\n```JSON\n{\"final_recommendations\": [\"v1\"]}\n```";
        let obj = parse_object(raw);
        assert_eq!(array_field(&obj, "final_recommendations").len(), 1);
    }

    #[test]
    fn untagged_fence_preferred_over_other_languages() {
        let raw = "```python\nprint(1)\n```\n```\n{\"a\": 2}\n```";
        let obj = parse_object(raw);
        assert_eq!(obj.get("a").and_then(Value::as_i64), Some(2));
    }

    #[test]
    fn urls_inside_strings_survive_comment_stripping() {
        let obj = parse_object(r#"{"site": "https://example.com/x", "n": 1}"#);
        assert_eq!(str_field(&obj, "site"), Some("https://example.com/x"));
    }

    #[test]
    fn commas_inside_strings_are_kept() {
        assert_eq!(strip_trailing_commas(r#"{"a": "x, }"}"#), r#"{"a": "x, }"}"#);
    }

    #[test]
    fn object_embedded_in_prose_is_found() {
        let obj = parse_object("Sure! {\"final_recommendations\": [\"x\"]} Done.");
        assert_eq!(array_field(&obj, "final_recommendations").len(), 1);
    }

    #[test]
    fn garbage_and_empty_yield_empty_object() {
        assert!(parse_object("").is_empty());
        assert!(parse_object("I could not decide, sorry.").is_empty());
        assert!(parse_object("```json\n{broken\n```").is_empty());
        assert!(parse_object("[1, 2, 3]").is_empty());
    }

    #[test]
    fn wrong_types_read_as_missing() {
        let obj = parse_object(r#"{"primary_need": 7, "selected_venues": "none", "blank": "  "}"#);
        assert_eq!(str_field(&obj, "primary_need"), None);
        assert_eq!(str_field(&obj, "blank"), None);
        assert!(array_field(&obj, "selected_venues").is_empty());
    }

    #[test]
    fn ids_from_strings_and_numbers() {
        assert_eq!(id_value(&Value::from(" abc ")), Some("abc".to_string()));
        assert_eq!(id_value(&Value::from(42)), Some("42".to_string()));
        assert_eq!(id_value(&Value::Null), None);
    }
}
