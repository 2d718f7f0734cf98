use serde_json::Value;
use std::fs;
use std::path::Path;

/// Create an OSC8 file:// hyperlink for terminal output
pub fn osc8_file_link(path: &Path) -> String {
    let abs_path = fs::canonicalize(path)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| path.to_string_lossy().to_string());
    format!(
        "\x1b]8;;file://{}\x1b\\{}\x1b]8;;\x1b\\",
        abs_path,
        path.display()
    )
}

/// First `max` characters of `s`, with an ellipsis when cut
pub fn snippet(s: &str, max: usize) -> String {
    let mut out: String = s.chars().take(max).collect();
    if s.chars().nth(max).is_some() {
        out.push('…');
    }
    out
}

/// Display text for a JSON value: trimmed strings, numbers and bools as written, null as empty.
///
/// Lists are joined with ", " so a stray array in a text field stays readable.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_text() {
        assert_eq!(value_text(&json!(null)), "");
        assert_eq!(value_text(&json!("  wlo ")), "wlo");
        assert_eq!(value_text(&json!(42)), "42");
        assert_eq!(value_text(&json!(["a", "", "b"])), "a, b");
    }

    #[test]
    fn test_snippet() {
        assert_eq!(snippet("abc", 5), "abc");
        assert_eq!(snippet("abcdef", 3), "abc…");
        assert_eq!(snippet("éèàü", 2), "éè…");
    }
}
