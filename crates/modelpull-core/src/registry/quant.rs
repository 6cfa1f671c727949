//! Quant tag matching against file paths.

use std::collections::BTreeSet;

const SEPARATORS: [char; 3] = ['/', '-', '.'];

/// How a tag matched a path token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchStrength {
    /// Tag is a `_`-boundary prefix of the token (`Q4` in `Q4_K_M`).
    Prefix,
    /// Tag equals the token.
    Exact,
}

/// Path tokens: split at `/`, `-` and `.`.
pub fn tokens(path: &str) -> impl Iterator<Item = &str> {
    spans(path).map(|(_, t)| t)
}

/// Tokens with their byte offset in `path`.
fn spans(path: &str) -> impl Iterator<Item = (usize, &str)> {
    path.split(SEPARATORS)
        .scan(0, |pos, token| {
            let start = *pos;
            *pos += token.len() + 1;
            Some((start, token))
        })
        .filter(|(_, t)| !t.is_empty())
}

/// Matches `tag` against one token, case-insensitively.
pub fn match_token(token: &str, tag: &str) -> Option<MatchStrength> {
    if token.eq_ignore_ascii_case(tag) {
        return Some(MatchStrength::Exact);
    }
    let (head, rest) = (token.get(..tag.len())?, &token[tag.len()..]);
    (head.eq_ignore_ascii_case(tag) && rest.starts_with('_')).then_some(MatchStrength::Prefix)
}

/// Quant families (matched path text, uppercased) of `path` at its
/// strongest match level, or `None` if the tag does not occur.
///
/// A tag spanning several tokens (`UD-Q4_K_XL`) must appear in the path
/// with the same separators; only its last token may match as a prefix.
pub fn families(path: &str, tag: &str) -> Option<(MatchStrength, BTreeSet<String>)> {
    let split = tag.rfind(SEPARATORS).map_or(0, |i| i + 1);
    let (lead, last) = tag.split_at(split);
    if last.is_empty() {
        return None;
    }
    let mut best: Option<(MatchStrength, BTreeSet<String>)> = None;
    for (at, token) in spans(path) {
        let Some(strength) = match_token(token, last) else {
            continue;
        };
        let Some(start) = at.checked_sub(lead.len()) else {
            continue;
        };
        let leads_in = path
            .get(start..at)
            .is_some_and(|text| text.eq_ignore_ascii_case(lead));
        if !leads_in || !at_token_start(path, start) {
            continue;
        }
        let family = path[start..at + token.len()].to_ascii_uppercase();
        match &mut best {
            Some((s, set)) if *s == strength => {
                set.insert(family);
            }
            Some((s, _)) if *s > strength => {}
            _ => best = Some((strength, BTreeSet::from([family]))),
        }
    }
    best
}

fn at_token_start(path: &str, at: usize) -> bool {
    at == 0 || matches!(path.as_bytes().get(at - 1), Some(b'/' | b'-' | b'.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(f: BTreeSet<String>) -> Vec<String> {
        f.into_iter().collect()
    }

    #[test]
    fn splits_on_separators() {
        let t: Vec<_> = tokens("UD-Q4_K_XL/GLM-4.7-Flash-UD-Q4_K_XL-00001-of-00002.gguf").collect();
        assert!(t.contains(&"Q4_K_XL"));
        assert!(t.contains(&"00001"));
        assert!(t.contains(&"gguf"));
        let s: Vec<_> = spans("a--bc.d").collect();
        assert_eq!(s, vec![(0, "a"), (3, "bc"), (6, "d")]);
    }

    #[test]
    fn prefix_only_at_underscore_boundary() {
        assert_eq!(match_token("Q4_K_M", "q4"), Some(MatchStrength::Prefix));
        assert_eq!(match_token("q4_k_m", "Q4_K_M"), Some(MatchStrength::Exact));
        assert_eq!(match_token("IQ4_XS", "Q4"), None);
        assert_eq!(match_token("Q40", "Q4"), None);
        assert_eq!(match_token("Q", "Q4"), None);
    }

    #[test]
    fn exact_beats_prefix_within_a_path() {
        let (s, f) = families("Q4/model-Q4_K_M.gguf", "Q4").unwrap();
        assert_eq!(s, MatchStrength::Exact);
        assert_eq!(names(f), vec!["Q4"]);
        let (s, f) = families("model-Q4_K_M.gguf", "q4").unwrap();
        assert_eq!(s, MatchStrength::Prefix);
        assert_eq!(names(f), vec!["Q4_K_M"]);
        assert!(families("model-IQ4_XS.gguf", "Q4").is_none());
    }

    #[test]
    fn hyphenated_tag_matches_consecutive_tokens() {
        let path = "UD-Q4_K_XL/GLM-4.7-Flash-UD-Q4_K_XL-00001-of-00002.gguf";
        let (s, f) = families(path, "ud-q4_k_xl").unwrap();
        assert_eq!(s, MatchStrength::Exact);
        assert_eq!(names(f), vec!["UD-Q4_K_XL"]);

        let (s, f) = families("GLM-4.7-Flash-UD-Q4_K_XL.gguf", "UD-Q4").unwrap();
        assert_eq!(s, MatchStrength::Prefix);
        assert_eq!(names(f), vec!["UD-Q4_K_XL"]);

        assert!(families("GLM-4.7-Flash-Q4_K_XL.gguf", "UD-Q4_K_XL").is_none());
        // Separators must agree, and the lead must start a token.
        assert!(families("UD/Q4_K_XL.gguf", "UD-Q4_K_XL").is_none());
        assert!(families("XUD-Q4_K_XL.gguf", "UD-Q4_K_XL").is_none());
        assert!(families("model.gguf", "Q4-").is_none());
    }
}
