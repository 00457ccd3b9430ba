//! Mention extraction (spec §4.4 step 6, §8 invariant 8): `@agentID`,
//! case-insensitive, word-boundary, restricted to non-`human:*` channel
//! members.

use regex::Regex;
use std::sync::OnceLock;

fn mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"@([A-Za-z0-9_-]+)\b").expect("static pattern is valid"))
}

/// Returns the subset of `members` (excluding any `human:*` prefixed entry)
/// that `text` mentions via `@id`, case-insensitively, in first-seen order
/// with duplicates removed.
pub fn extract_mentions<'a>(text: &str, members: &'a [String]) -> Vec<&'a str> {
    let mentioned: Vec<String> = mention_pattern()
        .captures_iter(text)
        .map(|c| c[1].to_lowercase())
        .collect();

    let mut out = Vec::new();
    for member in members {
        if member.starts_with("human:") {
            continue;
        }
        if mentioned.iter().any(|m| m == &member.to_lowercase()) && !out.contains(&member.as_str()) {
            out.push(member.as_str());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_member_mentions_case_insensitively() {
        let members = vec!["bob".to_string(), "human:alice".to_string(), "carol".to_string()];
        let hits = extract_mentions("hi @Bob and @CAROL, cc @dave", &members);
        assert_eq!(hits, vec!["bob", "carol"]);
    }

    #[test]
    fn excludes_human_prefixed_members_even_if_mentioned() {
        let members = vec!["human:alice".to_string()];
        let hits = extract_mentions("hi @alice", &members);
        assert!(hits.is_empty());
    }

    #[test]
    fn ignores_mentions_of_non_members() {
        let members = vec!["bob".to_string()];
        let hits = extract_mentions("hi @stranger", &members);
        assert!(hits.is_empty());
    }

    #[test]
    fn respects_word_boundaries() {
        let members = vec!["bob".to_string()];
        let hits = extract_mentions("email me @bobsmith please", &members);
        assert!(hits.is_empty());
    }
}
