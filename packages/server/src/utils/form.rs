/// Parse a boolean sent as a form field by the workflow engine.
///
/// Accepts `true/false`, `1/0`, `yes/no` and `on/off`, case-insensitively.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse an optional positive id; empty strings and `null` count as absent.
pub fn parse_optional_id(raw: &str) -> Result<Option<i32>, String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
        return Ok(None);
    }
    match raw.parse::<i32>() {
        Ok(id) if id > 0 => Ok(Some(id)),
        _ => Err(format!("'{raw}' is not a valid id")),
    }
}

/// Slot position encoded in a step type such as `image_2`.
pub fn position_from_step_type(step_type: &str) -> Option<i32> {
    let n = step_type.trim().strip_prefix("image_")?.parse::<i32>().ok()?;
    (1..=3).contains(&n).then_some(n)
}
