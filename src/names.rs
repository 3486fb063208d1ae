//! Display names for conversations.
//!
//! An operator-set alias always wins. Otherwise, with anonymization on, each
//! user gets a pseudonym like "Quinn (Visitor)" that is stable for a given id,
//! so the list does not reshuffle between polls or restarts.

use std::collections::HashMap;

use crate::model::ChatRow;

const FIRST_NAMES: &[&str] = &[
    "Alex", "Blake", "Casey", "Dana", "Ellis", "Fran", "Grey", "Harper", "Indigo", "Jordan",
    "Kelly", "Logan", "Morgan", "Noel", "Parker", "Quinn", "Reese", "Sage", "Taylor", "Val",
    "Winter", "Aiden", "Brynn", "Charlie", "Drew", "Emery", "Finley", "Harley", "Jules", "Kai",
    "Lane", "Max", "Nova", "Oakley", "Piper", "River", "Skyler", "Tatum", "Wren", "Zion",
];

const TITLES: &[&str] = &[
    "Client", "User", "Person", "Contact", "Guest", "Member", "Visitor", "Customer", "Inquirer",
    "Subscriber", "Patron", "Friend", "Associate",
];

pub struct NameBook {
    anonymize: bool,
    cache: HashMap<i64, String>,
}

impl NameBook {
    pub fn new(anonymize: bool) -> Self {
        Self {
            anonymize,
            cache: HashMap::new(),
        }
    }

    /// Name to show for a chat-list row.
    pub fn display_name(&mut self, row: &ChatRow) -> String {
        self.resolve(
            row.user_id,
            row.alias.as_deref(),
            row.first_name.as_deref(),
            row.username.as_deref(),
        )
    }

    /// Same rules for rows that carry only some of the name fields.
    pub fn resolve(
        &mut self,
        user_id: i64,
        alias: Option<&str>,
        first_name: Option<&str>,
        username: Option<&str>,
    ) -> String {
        if let Some(alias) = alias.filter(|a| !a.trim().is_empty()) {
            return alias.to_string();
        }
        if self.anonymize {
            return self.pseudonym(user_id).to_string();
        }
        first_name
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| username.map(|u| format!("@{}", u)))
            .unwrap_or_else(|| format!("User {}", user_id))
    }

    /// Cached pseudonym for `user_id`.
    pub fn pseudonym(&mut self, user_id: i64) -> &str {
        self.cache
            .entry(user_id)
            .or_insert_with(|| generate_pseudonym(user_id))
    }
}

fn generate_pseudonym(user_id: i64) -> String {
    let h = mix(user_id as u64);
    let first = FIRST_NAMES[(h % FIRST_NAMES.len() as u64) as usize];
    let title = TITLES[((h / FIRST_NAMES.len() as u64) % TITLES.len() as u64) as usize];
    format!("{} ({})", first, title)
}

/// splitmix64 finaliser: spreads sequential Telegram ids across the tables.
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Timestamp;

    fn row(user_id: i64, alias: Option<&str>) -> ChatRow {
        ChatRow {
            user_id,
            username: Some("kit_t".into()),
            first_name: Some("Kit".into()),
            last_message_text: None,
            last_message_time: Timestamp::default(),
            has_media: false,
            media_type: None,
            is_replied: false,
            reply_text: None,
            unread_count: 0,
            alias: alias.map(str::to_string),
        }
    }

    #[test]
    fn alias_wins() {
        let mut names = NameBook::new(true);
        assert_eq!(names.display_name(&row(5, Some("VIP"))), "VIP");
    }

    #[test]
    fn blank_alias_ignored() {
        let mut names = NameBook::new(false);
        assert_eq!(names.display_name(&row(5, Some("  "))), "Kit");
    }

    #[test]
    fn pseudonym_is_stable() {
        let mut a = NameBook::new(true);
        let mut b = NameBook::new(true);
        let first = a.display_name(&row(123456, None));
        assert_eq!(first, a.display_name(&row(123456, None)));
        assert_eq!(first, b.display_name(&row(123456, None)));
        assert!(first.ends_with(')'));
    }

    #[test]
    fn real_name_fallbacks() {
        let mut names = NameBook::new(false);
        let mut r = row(9, None);
        assert_eq!(names.display_name(&r), "Kit");
        r.first_name = None;
        assert_eq!(names.display_name(&r), "@kit_t");
        r.username = None;
        assert_eq!(names.display_name(&r), "User 9");
    }
}
