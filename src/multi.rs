//! Splitting of multi-select answers into tokens
//!
//! Form versions disagree on the encoding: the API stores select-multiple answers
//! as space-separated codes (`"a b c"`), display exports as comma-separated labels
//! (`"A, B, C"`), and a few hand-edited rows use semicolons. Lists are also accepted.

use serde_json::Value;

use crate::utils::value_text;

/// Split a raw multi-select value into ordered, trimmed, non-empty tokens.
pub fn split_multi(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect(),
        other => split_multi_str(&value_text(other)),
    }
}

/// Comma wins over semicolon, semicolon over whitespace.
pub fn split_multi_str(s: &str) -> Vec<String> {
    let s = s.trim();
    if s.is_empty() {
        return Vec::new();
    }

    let parts: Vec<&str> = if s.contains(',') {
        s.split(',').collect()
    } else if s.contains(';') {
        s.split(';').collect()
    } else {
        s.split_whitespace().collect()
    };

    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_space_separated_codes() {
        assert_eq!(split_multi(&json!("a b c")), vec!["a", "b", "c"]);
        assert_eq!(split_multi(&json!("  a \t b\n")), vec!["a", "b"]);
    }

    #[test]
    fn test_comma_separated_labels() {
        assert_eq!(split_multi(&json!("a, b, c")), vec!["a", "b", "c"]);
        // Spaces inside a comma-separated label are kept
        assert_eq!(
            split_multi(&json!("Femmes déplacées, Survivantes de VBG")),
            vec!["Femmes déplacées", "Survivantes de VBG"]
        );
        assert_eq!(split_multi(&json!("a,,b, ")), vec!["a", "b"]);
    }

    #[test]
    fn test_semicolon_separated() {
        assert_eq!(split_multi(&json!("x y; z")), vec!["x y", "z"]);
    }

    #[test]
    fn test_empty_values() {
        assert!(split_multi(&json!("")).is_empty());
        assert!(split_multi(&json!("   ")).is_empty());
        assert!(split_multi(&json!(null)).is_empty());
        assert!(split_multi(&json!([])).is_empty());
    }

    #[test]
    fn test_list_passthrough() {
        assert_eq!(split_multi(&json!(["a", "", "b"])), vec!["a", "b"]);
        assert_eq!(split_multi(&json!([1, " c ", null])), vec!["1", "c"]);
    }

    #[test]
    fn test_single_selection_is_one_token() {
        assert_eq!(split_multi(&json!("insecurite")), vec!["insecurite"]);
        assert_eq!(split_multi(&json!(7)), vec!["7"]);
    }
}
