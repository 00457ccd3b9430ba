//! Username normalization (spec §4.4 step 3, §8 invariant 7): lowercase,
//! strip everything outside `[a-z0-9_.-]`, collapse runs of `._-`, trim
//! leading/trailing `._-`, fall back to `"unknown"` on empty result.
//!
//! Idempotent by construction: every step operates on an already-reduced
//! character set, so a second pass is a no-op.

/// Normalizes a raw external username into the charset channel member ids
/// use for human participants (prefixed `human:` by the caller).
pub fn normalize_username(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let filtered: String = lowered
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    let mut collapsed = String::with_capacity(filtered.len());
    let mut last_was_sep = false;
    for c in filtered.chars() {
        let is_sep = matches!(c, '_' | '.' | '-');
        if is_sep && last_was_sep {
            continue;
        }
        collapsed.push(c);
        last_was_sep = is_sep;
    }

    let trimmed = collapsed.trim_matches(|c| matches!(c, '_' | '.' | '-'));
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_strips_unsupported_chars() {
        assert_eq!(normalize_username("Alice!"), "alice");
        assert_eq!(normalize_username("Bob Smith"), "bobsmith");
    }

    #[test]
    fn collapses_runs_of_separators() {
        assert_eq!(normalize_username("a..b--c__d"), "a.b-c_d");
    }

    #[test]
    fn trims_leading_and_trailing_separators() {
        assert_eq!(normalize_username("_.-alice-._"), "alice");
    }

    #[test]
    fn empty_result_falls_back_to_unknown() {
        assert_eq!(normalize_username("!!!"), "unknown");
        assert_eq!(normalize_username(""), "unknown");
        assert_eq!(normalize_username("___"), "unknown");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["Alice!", "Bob Smith", "_.-alice-._", "", "!!!", "a..b--c"] {
            let once = normalize_username(raw);
            let twice = normalize_username(&once);
            assert_eq!(once, twice, "not idempotent for {raw:?}");
        }
    }
}
