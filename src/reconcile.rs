//! Snapshot reconciliation for the chat list.
//!
//! Every poll returns the whole list. Most of the time nothing changed, and
//! redrawing anyway would reset the list under the operator's cursor, so the
//! reconciler compares against the last snapshot it accepted and only asks for
//! a rebuild on a real change.

use std::collections::HashMap;

use crate::model::ConversationSummary;

/// Which fields of an existing row differ from the previous snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangedFields {
    pub name: bool,
    pub preview: bool,
    pub time: bool,
    pub unread: bool,
    pub media: bool,
}

impl ChangedFields {
    fn between(old: &ConversationSummary, new: &ConversationSummary) -> Self {
        Self {
            name: old.display_name != new.display_name,
            preview: old.last_message_preview != new.last_message_preview,
            time: old.last_message_time != new.last_message_time,
            unread: old.unread_count != new.unread_count,
            media: old.has_media != new.has_media || old.media_kind != new.media_kind,
        }
    }

    fn any(&self) -> bool {
        self.name || self.preview || self.time || self.unread || self.media
    }

    /// Only the unread badge moved.
    pub fn badge_only(&self) -> bool {
        self.unread && !(self.name || self.preview || self.time || self.media)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowChange {
    Added(i64),
    Removed(i64),
    Updated { user_id: i64, fields: ChangedFields },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatListUpdate {
    pub rows: Vec<ConversationSummary>,
    /// Row to highlight: the selection, if it survived.
    pub highlight: Option<i64>,
    /// Selected conversation that vanished from the snapshot.
    pub selection_lost: Option<i64>,
    pub changes: Vec<RowChange>,
    /// Same rows, different order.
    pub reordered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatListPlan {
    Unchanged,
    Rebuild(ChatListUpdate),
}

impl ChatListPlan {
    pub fn is_noop(&self) -> bool {
        matches!(self, ChatListPlan::Unchanged)
    }
}

#[derive(Debug, Default)]
pub struct Reconciler {
    last_known: Vec<ConversationSummary>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_known(&self) -> &[ConversationSummary] {
        &self.last_known
    }

    pub fn get(&self, user_id: i64) -> Option<&ConversationSummary> {
        self.last_known.iter().find(|s| s.user_id == user_id)
    }

    pub fn reconcile(
        &mut self,
        summaries: Vec<ConversationSummary>,
        selected: Option<i64>,
    ) -> ChatListPlan {
        if summaries == self.last_known {
            return ChatListPlan::Unchanged;
        }

        let changes = diff(&self.last_known, &summaries);
        let reordered = changes.is_empty();
        let present = selected.filter(|id| summaries.iter().any(|s| s.user_id == *id));
        let selection_lost = match (selected, present) {
            (Some(id), None) => Some(id),
            _ => None,
        };

        self.last_known = summaries;
        ChatListPlan::Rebuild(ChatListUpdate {
            rows: self.last_known.clone(),
            highlight: present,
            selection_lost,
            changes,
            reordered,
        })
    }
}

fn diff(old: &[ConversationSummary], new: &[ConversationSummary]) -> Vec<RowChange> {
    let old_by_id: HashMap<i64, &ConversationSummary> =
        old.iter().map(|s| (s.user_id, s)).collect();
    let new_by_id: HashMap<i64, &ConversationSummary> =
        new.iter().map(|s| (s.user_id, s)).collect();

    let mut changes = Vec::new();
    for row in new {
        match old_by_id.get(&row.user_id) {
            None => changes.push(RowChange::Added(row.user_id)),
            Some(prev) => {
                let fields = ChangedFields::between(prev, row);
                if fields.any() {
                    changes.push(RowChange::Updated {
                        user_id: row.user_id,
                        fields,
                    });
                }
            }
        }
    }
    for row in old {
        if !new_by_id.contains_key(&row.user_id) {
            changes.push(RowChange::Removed(row.user_id));
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Timestamp;

    fn summary(user_id: i64, unread: u32) -> ConversationSummary {
        ConversationSummary {
            user_id,
            display_name: format!("User {}", user_id),
            last_message_preview: "hello".into(),
            last_message_time: Timestamp::parse("2024-03-05 10:00:00"),
            unread_count: unread,
            has_media: false,
            media_kind: None,
        }
    }

    #[test]
    fn identical_snapshot_is_noop() {
        let mut r = Reconciler::new();
        let snapshot = vec![summary(1, 0), summary(2, 1)];
        assert!(!r.reconcile(snapshot.clone(), None).is_noop());
        assert!(r.reconcile(snapshot, None).is_noop());
    }

    #[test]
    fn first_empty_snapshot_is_noop() {
        let mut r = Reconciler::new();
        assert!(r.reconcile(Vec::new(), None).is_noop());
    }

    #[test]
    fn badge_change_keeps_selection() {
        let mut r = Reconciler::new();
        r.reconcile(vec![summary(7, 0)], Some(7));
        let plan = r.reconcile(vec![summary(7, 3)], Some(7));
        let ChatListPlan::Rebuild(update) = plan else {
            panic!("expected rebuild");
        };
        assert_eq!(update.highlight, Some(7));
        assert_eq!(update.selection_lost, None);
        assert_eq!(update.changes.len(), 1);
        match &update.changes[0] {
            RowChange::Updated { user_id, fields } => {
                assert_eq!(*user_id, 7);
                assert!(fields.badge_only());
            }
            other => panic!("unexpected change {:?}", other),
        }
        assert_eq!(r.last_known()[0].unread_count, 3);
    }

    #[test]
    fn vanished_selection_is_cleared() {
        let mut r = Reconciler::new();
        r.reconcile(vec![summary(1, 0), summary(2, 0)], Some(2));
        let ChatListPlan::Rebuild(update) = r.reconcile(vec![summary(1, 0)], Some(2)) else {
            panic!("expected rebuild");
        };
        assert_eq!(update.highlight, None);
        assert_eq!(update.selection_lost, Some(2));
        assert_eq!(update.changes, vec![RowChange::Removed(2)]);
    }

    #[test]
    fn new_conversation_reported_as_added() {
        let mut r = Reconciler::new();
        r.reconcile(vec![summary(1, 0)], None);
        let ChatListPlan::Rebuild(update) = r.reconcile(vec![summary(3, 1), summary(1, 0)], None)
        else {
            panic!("expected rebuild");
        };
        assert_eq!(update.changes, vec![RowChange::Added(3)]);
        assert!(!update.reordered);
    }

    #[test]
    fn reorder_only() {
        let mut r = Reconciler::new();
        r.reconcile(vec![summary(1, 0), summary(2, 0)], None);
        let ChatListPlan::Rebuild(update) = r.reconcile(vec![summary(2, 0), summary(1, 0)], None)
        else {
            panic!("expected rebuild");
        };
        assert!(update.changes.is_empty());
        assert!(update.reordered);
    }
}
