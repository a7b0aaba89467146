/// String helpers shared across the worker crates.
pub struct StringUtil;

impl StringUtil {
    /// Convert a string to a boolean.
    ///
    /// True values: `"1"`, `"true"`, `"yes"`, `"on"` (case-insensitive).
    /// False values: `"0"`, `"false"`, `"no"`, `"off"` (case-insensitive).
    /// Returns `None` for anything else, including the empty string.
    pub fn convert_to_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }

    /// Return at most `max_chars` characters of `value`, appending `...` when
    /// anything was cut. Used to keep remote error bodies out of log floods.
    pub fn truncate_for_log(value: &str, max_chars: usize) -> String {
        match value.char_indices().nth(max_chars) {
            Some((idx, _)) => format!("{}...", &value[..idx]),
            None => value.to_string(),
        }
    }
}
