//! Tab-completion glue
//!
//! The editor knows nothing about what names exist; it hands the token
//! under the cursor to an [`Expander`] and splices whatever comes back into
//! the line through the takeover mechanism.

use unicode_width::UnicodeWidthStr;

use crate::cell::Takeover;

/// Produces candidate expansions for a token, typically by globbing
pub trait Expander {
    fn expand(&mut self, token: &str) -> Vec<String>;
}

/// What one completion attempt decided
#[derive(Debug, PartialEq, Eq)]
pub enum Completion {
    /// Nothing matched; ring the bell
    NoMatch,
    /// Replace the line, placing the cursor at `cursor_byte`
    Replace(Takeover),
    /// Several candidates: print the listing, then replace the line with
    /// the shared prefix spliced in
    Listing { rows: String, replace: Takeover },
}

/// Byte range of the whitespace-delimited token containing `cursor_byte`
fn token_bounds(line: &str, cursor_byte: usize) -> (usize, usize) {
    let cursor_byte = cursor_byte.min(line.len());
    let start = line[..cursor_byte]
        .rfind(|c: char| c.is_whitespace())
        .map(|i| i + line[i..].chars().next().map_or(1, char::len_utf8))
        .unwrap_or(0);
    let end = line[cursor_byte..]
        .find(|c: char| c.is_whitespace())
        .map(|i| cursor_byte + i)
        .unwrap_or(line.len());
    (start, end)
}

fn has_wildcard(token: &str) -> bool {
    token.contains(['*', '?', '['])
}

/// Quote a candidate that would otherwise split into several tokens
fn requote(candidate: &str, round_trip: bool) -> String {
    if !round_trip || !candidate.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'') {
        return candidate.to_string();
    }
    let mut quoted = String::with_capacity(candidate.len() + 2);
    quoted.push('"');
    for ch in candidate.chars() {
        if ch == '"' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Longest common prefix of the candidate set, on char boundaries
fn common_prefix(candidates: &[String]) -> String {
    let Some(first) = candidates.first() else {
        return String::new();
    };
    let mut prefix = first.as_str();
    for cand in &candidates[1..] {
        while !cand.starts_with(prefix) {
            let cut = prefix
                .char_indices()
                .last()
                .map(|(i, _)| i)
                .unwrap_or(0);
            prefix = &prefix[..cut];
            if prefix.is_empty() {
                return String::new();
            }
        }
    }
    prefix.to_string()
}

/// Lay candidates out in columns sized to the widest entry
fn columnize(candidates: &[String], screen_width: u16) -> String {
    let widest = candidates
        .iter()
        .map(|c| UnicodeWidthStr::width(c.as_str()))
        .max()
        .unwrap_or(0);
    let col = widest + 2;
    let per_row = ((screen_width as usize) / col).max(1);
    let mut out = String::new();
    for chunk in candidates.chunks(per_row) {
        for (i, cand) in chunk.iter().enumerate() {
            out.push_str(cand);
            if i + 1 < chunk.len() {
                for _ in UnicodeWidthStr::width(cand.as_str())..widest + 2 {
                    out.push(' ');
                }
            }
        }
        out.push_str("\r\n");
    }
    out
}

fn splice(line: &str, start: usize, end: usize, replacement: &str) -> Takeover {
    let mut text = String::with_capacity(line.len() + replacement.len());
    text.push_str(&line[..start]);
    text.push_str(replacement);
    let cursor = text.len();
    text.push_str(&line[end..]);
    Takeover {
        text,
        cursor_byte: Some(cursor),
    }
}

/// Run one completion attempt over the flattened line
pub fn complete(
    expander: &mut dyn Expander,
    line: &str,
    cursor_byte: usize,
    screen_width: u16,
    quote_round_trip: bool,
) -> Completion {
    let (start, end) = token_bounds(line, cursor_byte);
    let token = &line[start..end];

    let mut candidates = expander.expand(token);
    if candidates.is_empty() && !has_wildcard(token) {
        // Retry once as a glob of everything starting with the token
        let wildcarded = format!("{token}*");
        candidates = expander.expand(&wildcarded);
    }

    match candidates.len() {
        0 => Completion::NoMatch,
        1 => {
            let replacement = requote(&candidates[0], quote_round_trip);
            Completion::Replace(splice(line, start, end, &replacement))
        }
        _ => {
            candidates.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()));
            let prefix = common_prefix(&candidates);
            let replacement = if prefix.len() > token.len() {
                prefix
            } else {
                token.to_string()
            };
            Completion::Listing {
                rows: columnize(&candidates, screen_width),
                replace: splice(line, start, end, &replacement),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<&'static str>);

    impl Expander for Fixed {
        fn expand(&mut self, token: &str) -> Vec<String> {
            let bare = token.trim_end_matches('*');
            self.0
                .iter()
                .filter(|c| c.starts_with(bare))
                .map(|c| c.to_string())
                .collect()
        }
    }

    /// Expander that only answers wildcard queries, like a strict glob
    struct GlobOnly(Vec<&'static str>);

    impl Expander for GlobOnly {
        fn expand(&mut self, token: &str) -> Vec<String> {
            if !token.contains('*') {
                return Vec::new();
            }
            let bare = token.trim_end_matches('*');
            self.0
                .iter()
                .filter(|c| c.starts_with(bare))
                .map(|c| c.to_string())
                .collect()
        }
    }

    #[test]
    fn test_token_bounds_middle_of_line() {
        let line = "mail inbox/dra report";
        assert_eq!(token_bounds(line, 13), (5, 14));
        assert_eq!(token_bounds(line, 0), (0, 4));
        assert_eq!(token_bounds(line, line.len()), (15, line.len()));
    }

    #[test]
    fn test_single_candidate_replaces_token() {
        let mut e = Fixed(vec!["inbox/drafts"]);
        let got = complete(&mut e, "mail inbox/dra", 14, 80, true);
        match got {
            Completion::Replace(t) => {
                assert_eq!(t.text, "mail inbox/drafts");
                assert_eq!(t.cursor_byte, Some("mail inbox/drafts".len()));
            }
            other => panic!("expected replace, got {other:?}"),
        }
    }

    #[test]
    fn test_wildcard_retry() {
        let mut e = GlobOnly(vec!["report.txt"]);
        let got = complete(&mut e, "rep", 3, 80, true);
        assert!(matches!(got, Completion::Replace(_)), "got {got:?}");
    }

    #[test]
    fn test_no_match_after_retry() {
        let mut e = Fixed(vec![]);
        assert_eq!(complete(&mut e, "zzz", 3, 80, true), Completion::NoMatch);
    }

    #[test]
    fn test_candidate_with_spaces_is_requoted() {
        let mut e = Fixed(vec!["my folder/mail"]);
        let got = complete(&mut e, "my", 2, 80, true);
        match got {
            Completion::Replace(t) => assert_eq!(t.text, "\"my folder/mail\""),
            other => panic!("expected replace, got {other:?}"),
        }
    }

    #[test]
    fn test_requote_disabled() {
        let mut e = Fixed(vec!["my folder/mail"]);
        let got = complete(&mut e, "my", 2, 80, false);
        match got {
            Completion::Replace(t) => assert_eq!(t.text, "my folder/mail"),
            other => panic!("expected replace, got {other:?}"),
        }
    }

    #[test]
    fn test_multiple_candidates_extend_to_common_prefix() {
        let mut e = Fixed(vec!["inbox-old", "inbox-new"]);
        let got = complete(&mut e, "in", 2, 80, true);
        match got {
            Completion::Listing { rows, replace } => {
                assert!(rows.contains("inbox-new"));
                assert!(rows.contains("inbox-old"));
                assert_eq!(replace.text, "inbox-");
                assert_eq!(replace.cursor_byte, Some(6));
            }
            other => panic!("expected listing, got {other:?}"),
        }
    }

    #[test]
    fn test_listing_sorted_case_insensitively() {
        let mut e = Fixed(vec!["Beta", "alpha"]);
        let got = complete(&mut e, "", 0, 80, true);
        match got {
            Completion::Listing { rows, .. } => {
                let a = rows.find("alpha").unwrap();
                let b = rows.find("Beta").unwrap();
                assert!(a < b);
            }
            other => panic!("expected listing, got {other:?}"),
        }
    }

    #[test]
    fn test_columnize_wraps_rows() {
        let cands: Vec<String> = (0..6).map(|i| format!("item{i}")).collect();
        let rows = columnize(&cands, 24);
        // 7-wide entries, 3 per 24-column row
        assert_eq!(rows.matches("\r\n").count(), 2);
    }

    #[test]
    fn test_common_prefix_empty_when_divergent() {
        let cands = vec!["abc".to_string(), "xyz".to_string()];
        assert_eq!(common_prefix(&cands), "");
    }
}
