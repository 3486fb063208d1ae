//! Message search: grouping hits by conversation and marking the matched
//! substrings for highlighting.

use crate::model::SearchHit;

/// Shorter terms are never sent; the relay ignores them anyway.
pub const MIN_TERM_LEN: usize = 2;

/// Matches shown per group before "view all".
pub const PREVIEW_LIMIT: usize = 3;

pub fn term_is_searchable(term: &str) -> bool {
    term.trim().chars().count() >= MIN_TERM_LEN
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchGroup {
    pub user_id: i64,
    pub name: String,
    pub hits: Vec<SearchHit>,
}

impl SearchGroup {
    pub fn total(&self) -> usize {
        self.hits.len()
    }

    pub fn preview(&self) -> &[SearchHit] {
        &self.hits[..self.hits.len().min(PREVIEW_LIMIT)]
    }

    pub fn has_more(&self) -> bool {
        self.hits.len() > PREVIEW_LIMIT
    }
}

/// Group hits by user id, keeping the order each user first appears in
/// (the relay returns newest first).
pub fn group_results(
    hits: Vec<SearchHit>,
    mut name_for: impl FnMut(&SearchHit) -> String,
) -> Vec<SearchGroup> {
    let mut groups: Vec<SearchGroup> = Vec::new();
    for hit in hits {
        match groups.iter_mut().find(|g| g.user_id == hit.user_id) {
            Some(group) => group.hits.push(hit),
            None => groups.push(SearchGroup {
                user_id: hit.user_id,
                name: name_for(&hit),
                hits: vec![hit],
            }),
        }
    }
    groups
}

/// A piece of a search result line, flagged if it matched the term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    pub text: &'a str,
    pub matched: bool,
}

/// Split `text` into matched / unmatched runs (case-insensitive).
pub fn highlight<'a>(text: &'a str, term: &str) -> Vec<Segment<'a>> {
    let term = term.trim();
    if term.is_empty() {
        return vec![Segment {
            text,
            matched: false,
        }];
    }
    let needle: Vec<char> = term.chars().flat_map(char::to_lowercase).collect();

    let mut segments = Vec::new();
    let mut plain_start = 0;
    let indices: Vec<(usize, char)> = text.char_indices().collect();
    let mut i = 0;
    while i < indices.len() {
        if let Some(len) = match_len_at(&indices[i..], &needle) {
            let start = indices[i].0;
            let end = indices.get(i + len).map(|(b, _)| *b).unwrap_or(text.len());
            if plain_start < start {
                segments.push(Segment {
                    text: &text[plain_start..start],
                    matched: false,
                });
            }
            segments.push(Segment {
                text: &text[start..end],
                matched: true,
            });
            plain_start = end;
            i += len;
        } else {
            i += 1;
        }
    }
    if plain_start < text.len() || segments.is_empty() {
        segments.push(Segment {
            text: &text[plain_start..],
            matched: false,
        });
    }
    segments
}

/// Number of chars of `hay` matching `needle` from its start, if it matches.
fn match_len_at(hay: &[(usize, char)], needle: &[char]) -> Option<usize> {
    let mut n = 0;
    let mut consumed = 0;
    for (_, c) in hay {
        if n == needle.len() {
            break;
        }
        for lc in c.to_lowercase() {
            if needle.get(n) != Some(&lc) {
                return None;
            }
            n += 1;
        }
        consumed += 1;
    }
    (n == needle.len()).then_some(consumed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Timestamp;

    fn hit(id: i64, user_id: i64, text: &str) -> SearchHit {
        SearchHit {
            id,
            user_id,
            first_name: None,
            message_text: Some(text.to_string()),
            reply_text: None,
            timestamp: Timestamp::parse("2024-03-05 10:00:00"),
            is_replied: false,
            alias: None,
        }
    }

    #[test]
    fn short_terms_rejected() {
        assert!(!term_is_searchable(""));
        assert!(!term_is_searchable(" a "));
        assert!(term_is_searchable("ab"));
        assert!(term_is_searchable("яб"));
    }

    #[test]
    fn groups_keep_first_seen_order() {
        let hits = vec![
            hit(10, 2, "refund please"),
            hit(9, 1, "refund?"),
            hit(8, 2, "about the refund"),
        ];
        let groups = group_results(hits, |h| format!("User {}", h.user_id));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].user_id, 2);
        assert_eq!(groups[0].total(), 2);
        assert_eq!(groups[0].name, "User 2");
        assert_eq!(groups[1].user_id, 1);
    }

    #[test]
    fn preview_is_capped() {
        let hits = (0..5).map(|i| hit(i, 1, "x")).collect();
        let groups = group_results(hits, |_| "U".into());
        assert_eq!(groups[0].preview().len(), PREVIEW_LIMIT);
        assert!(groups[0].has_more());
    }

    #[test]
    fn highlight_case_insensitive() {
        let segs = highlight("Need a Refund, refund now", "refund");
        let matched: Vec<&str> = segs.iter().filter(|s| s.matched).map(|s| s.text).collect();
        assert_eq!(matched, vec!["Refund", "refund"]);
        let joined: String = segs.iter().map(|s| s.text).collect();
        assert_eq!(joined, "Need a Refund, refund now");
    }

    #[test]
    fn highlight_no_match() {
        let segs = highlight("hello", "zz");
        assert_eq!(
            segs,
            vec![Segment {
                text: "hello",
                matched: false
            }]
        );
    }

    #[test]
    fn highlight_multibyte() {
        let segs = highlight("Привет мир", "МИР");
        assert_eq!(segs.last().unwrap().text, "мир");
        assert!(segs.last().unwrap().matched);
    }
}
