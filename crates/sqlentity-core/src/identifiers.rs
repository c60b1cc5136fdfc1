//! SQL identifier validation and naming helpers.
//!
//! Identifiers are emitted unquoted, so every table, column and alias that
//! reaches SQL text must pass [`validate_identifier`].

use crate::error::{Error, Result};
use crate::pattern::matches_pattern;

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/// Longest identifier PostgreSQL accepts without truncation.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// True if `name` is a plain identifier safe to emit without quoting.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_IDENTIFIER_LEN && matches_pattern(name, IDENTIFIER_PATTERN)
}

/// Validate a declared identifier. `what` names the declaration slot for the
/// error message (e.g. "table", "column").
pub fn validate_identifier(name: &str, what: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(Error::configuration(format!(
            "invalid {what} identifier {name:?}: expected [A-Za-z_][A-Za-z0-9_]* (max {MAX_IDENTIFIER_LEN} chars)"
        )))
    }
}

/// Convert `CamelCase` or `camelCase` to `snake_case`.
///
/// Used to derive default foreign keys (`TeamMember` -> `team_member_id`).
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let chars: Vec<char> = name.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_ascii_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(char::is_ascii_lowercase);
            let prev_upper = i > 0 && chars[i - 1].is_ascii_uppercase();
            if i > 0 && (prev_lower || (prev_upper && next_lower)) && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
