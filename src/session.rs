//! The UI session: everything the chat screen remembers between events.
//!
//! `Session` is sans-IO. Each `on_*` entry point updates state and returns a
//! [`ShellUpdate`] describing what to redraw plus the [`Request`]s the shell
//! must run. Finished requests come back through [`Session::on_event`].
//! [`execute`] is the one place that turns a `Request` into HTTP calls.

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::composer::{Attachment, Composer, Finished, Payload, SendRequest, Ticket};
use crate::error::{ApiError, ComposeError, Invalid};
use crate::model::{
    ApiResponse, ChatRow, ConversationSummary, Message, MessageRow, NewMessages, SearchHit,
};
use crate::names::NameBook;
use crate::reconcile::{ChatListPlan, ChatListUpdate, Reconciler, RowChange};
use crate::render::{build_render_plan, MessagePlan};
use crate::search::{self, SearchGroup};

/// Work for the shell to perform against the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    FetchChats,
    FetchMessages { user_id: i64 },
    MarkRead { user_id: i64 },
    CheckNew,
    Send(SendRequest),
    DeleteMessage { message_id: i64, user_id: i64 },
    DeleteConversation { user_id: i64 },
    SetAlias { user_id: i64, alias: String },
    Search { term: String },
}

/// A finished request.
#[derive(Debug)]
pub enum ApiEvent {
    Chats(Result<Vec<ChatRow>, ApiError>),
    Messages {
        user_id: i64,
        result: Result<Vec<MessageRow>, ApiError>,
    },
    MarkedRead {
        user_id: i64,
        result: Result<ApiResponse, ApiError>,
    },
    NewMessages(Result<NewMessages, ApiError>),
    Sent {
        ticket: Ticket,
        result: Result<ApiResponse, ApiError>,
    },
    MessageDeleted {
        message_id: i64,
        user_id: i64,
        result: Result<ApiResponse, ApiError>,
    },
    ConversationDeleted {
        user_id: i64,
        result: Result<ApiResponse, ApiError>,
    },
    AliasSet {
        user_id: i64,
        result: Result<ApiResponse, ApiError>,
    },
    SearchResults {
        term: String,
        result: Result<Vec<SearchHit>, ApiError>,
    },
}

/// What the shell should apply after an event.
#[derive(Debug, Default)]
pub struct ShellUpdate {
    /// Rebuild the chat list from these rows.
    pub chat_list: Option<ChatListUpdate>,
    /// Replace the message view.
    pub messages: Option<MessagePlan>,
    /// The selected conversation is gone: clear header, messages and composer.
    pub clear_view: bool,
    /// Composer draft changed under the input widget; reload it from `Composer::draft`.
    pub reset_input: bool,
    pub search: Option<Vec<SearchGroup>>,
    /// Transient status-bar text.
    pub status: Option<String>,
    /// Something the operator should notice (rings the bell).
    pub notice: Option<String>,
    /// Submission refused before any request went out.
    pub rejected: Option<ComposeError>,
    /// A reply or upload is in flight; the composer ignores input.
    pub busy: bool,
    pub requests: Vec<Request>,
}

impl ShellUpdate {
    fn status(&mut self, msg: impl Into<String>) {
        self.status = Some(msg.into());
    }

    pub fn is_empty(&self) -> bool {
        self.chat_list.is_none()
            && self.messages.is_none()
            && !self.clear_view
            && !self.reset_input
            && self.search.is_none()
            && self.status.is_none()
            && self.notice.is_none()
            && self.rejected.is_none()
            && self.requests.is_empty()
    }
}

pub struct Session {
    selected: Option<i64>,
    reconciler: Reconciler,
    names: NameBook,
    composer: Composer,
    messages: MessagePlan,
    /// Conversation whose messages `messages` holds.
    loaded_for: Option<i64>,
    reply_target: Option<i64>,
    chats_in_flight: bool,
    /// A refresh was asked for while a poll was in flight.
    chats_dirty: bool,
    new_check_in_flight: bool,
    search_term: Option<String>,
    clock: fn() -> NaiveDateTime,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl Session {
    pub fn new(anonymize: bool) -> Self {
        Self {
            selected: None,
            reconciler: Reconciler::new(),
            names: NameBook::new(anonymize),
            composer: Composer::new(),
            messages: MessagePlan::default(),
            loaded_for: None,
            reply_target: None,
            chats_in_flight: false,
            chats_dirty: false,
            new_check_in_flight: false,
            search_term: None,
            clock: local_now,
        }
    }

    /// Replace the wall clock (day labels depend on "today").
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn selected(&self) -> Option<i64> {
        self.selected
    }

    pub fn selected_summary(&self) -> Option<&ConversationSummary> {
        self.selected.and_then(|id| self.reconciler.get(id))
    }

    pub fn summaries(&self) -> &[ConversationSummary] {
        self.reconciler.last_known()
    }

    pub fn messages(&self) -> &MessagePlan {
        &self.messages
    }

    /// True while the selected conversation's messages have not arrived yet.
    pub fn messages_loading(&self) -> bool {
        self.selected.is_some() && self.loaded_for != self.selected
    }

    pub fn reply_target(&self) -> Option<i64> {
        self.reply_target
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Mirror the input widget into the draft. Ignored while submitting.
    pub fn set_draft(&mut self, text: impl Into<String>) -> bool {
        self.composer.set_draft(text)
    }

    // ── Timers ──────────────────────────────────────────────────────

    pub fn on_poll_tick(&mut self) -> ShellUpdate {
        let mut update = self.update();
        if self.chats_in_flight {
            debug!("chat poll still in flight, skipping tick");
            return update;
        }
        self.request_chats(&mut update);
        update
    }

    pub fn on_new_message_tick(&mut self) -> ShellUpdate {
        let mut update = self.update();
        if self.new_check_in_flight {
            debug!("new-message check still in flight, skipping tick");
            return update;
        }
        self.new_check_in_flight = true;
        update.requests.push(Request::CheckNew);
        update
    }

    // ── Operator actions ────────────────────────────────────────────

    /// Select a conversation: load its messages and mark it read.
    pub fn on_conversation_selected(&mut self, user_id: i64) -> ShellUpdate {
        let mut update = self.update();
        if self.selected != Some(user_id) {
            self.composer.reset_for_conversation_change();
            self.messages = MessagePlan::default();
            self.loaded_for = None;
        }
        self.selected = Some(user_id);
        self.reply_target = None;
        debug!(user_id, "conversation selected");
        update.requests.push(Request::FetchMessages { user_id });
        update.requests.push(Request::MarkRead { user_id });
        update
    }

    pub fn on_reply_submit(&mut self) -> ShellUpdate {
        let result = self.composer.submit_reply(self.selected);
        self.submission(result, "Sending…")
    }

    pub fn on_attachment_selected(&mut self, file: Option<Attachment>) -> ShellUpdate {
        let mut update = self.update();
        let label = file
            .as_ref()
            .map(|f| format!("Attached {} ({} bytes)", f.file_name, f.size()));
        match self.composer.select_attachment(file) {
            Ok(()) => update.status = label,
            Err(e) => self.reject(&mut update, e),
        }
        update
    }

    pub fn on_attachment_removed(&mut self) -> ShellUpdate {
        let mut update = self.update();
        match self.composer.remove_attachment() {
            Ok(()) => update.status("Attachment removed"),
            Err(e) => self.reject(&mut update, e),
        }
        update
    }

    pub fn on_attachment_submit(&mut self) -> ShellUpdate {
        let result = self.composer.submit_attachment(self.selected);
        self.submission(result, "Uploading…")
    }

    /// A file pasted into the composer is uploaded immediately.
    pub fn on_attachment_pasted(&mut self, file: Attachment) -> ShellUpdate {
        let result = self.composer.submit_pasted(file, self.selected);
        self.submission(result, "Uploading pasted file…")
    }

    pub fn on_delete_message(&mut self, message_id: i64) -> ShellUpdate {
        let mut update = self.update();
        match self.selected {
            Some(user_id) => update
                .requests
                .push(Request::DeleteMessage { message_id, user_id }),
            None => self.reject(&mut update, Invalid::NoConversation.into()),
        }
        update
    }

    pub fn on_delete_conversation(&mut self) -> ShellUpdate {
        let mut update = self.update();
        match self.selected {
            Some(user_id) => update.requests.push(Request::DeleteConversation { user_id }),
            None => self.reject(&mut update, Invalid::NoConversation.into()),
        }
        update
    }

    /// Empty alias removes it.
    pub fn on_set_alias(&mut self, alias: &str) -> ShellUpdate {
        let mut update = self.update();
        match self.selected {
            Some(user_id) => update.requests.push(Request::SetAlias {
                user_id,
                alias: alias.trim().to_string(),
            }),
            None => self.reject(&mut update, Invalid::NoConversation.into()),
        }
        update
    }

    pub fn on_search(&mut self, term: &str) -> ShellUpdate {
        let mut update = self.update();
        if !search::term_is_searchable(term) {
            self.search_term = None;
            update.search = Some(Vec::new());
            return update;
        }
        let term = term.trim().to_string();
        self.search_term = Some(term.clone());
        update.requests.push(Request::Search { term });
        update
    }

    pub fn on_search_closed(&mut self) {
        self.search_term = None;
    }

    /// Manual refresh: reload the list and the open conversation.
    pub fn on_refresh(&mut self) -> ShellUpdate {
        let mut update = self.update();
        self.request_chats(&mut update);
        if let Some(user_id) = self.selected {
            update.requests.push(Request::FetchMessages { user_id });
        }
        update
    }

    // ── Completed requests ──────────────────────────────────────────

    pub fn on_event(&mut self, event: ApiEvent) -> ShellUpdate {
        let mut update = self.update();
        match event {
            ApiEvent::Chats(result) => self.chats_loaded(result, &mut update),
            ApiEvent::Messages { user_id, result } => {
                self.messages_loaded(user_id, result, &mut update)
            }
            ApiEvent::MarkedRead { user_id, result } => match result {
                Ok(resp) => {
                    debug!(user_id, updated = resp.updated.unwrap_or(0), "marked read");
                    if resp.updated != Some(0) {
                        self.request_chats(&mut update);
                    }
                }
                Err(e) => warn!(user_id, error = %e, "mark read failed"),
            },
            ApiEvent::NewMessages(result) => self.new_messages(result, &mut update),
            ApiEvent::Sent { ticket, result } => self.sent(ticket, result, &mut update),
            ApiEvent::MessageDeleted {
                message_id,
                user_id,
                result,
            } => match result {
                Ok(_) => {
                    info!(message_id, user_id, "message deleted");
                    update.status("Message deleted");
                    if self.selected == Some(user_id) {
                        update.requests.push(Request::FetchMessages { user_id });
                    }
                    self.request_chats(&mut update);
                }
                Err(e) => self.failed(&mut update, "Failed to delete message", &e),
            },
            ApiEvent::ConversationDeleted { user_id, result } => match result {
                Ok(_) => {
                    info!(user_id, "conversation deleted");
                    if self.selected == Some(user_id) {
                        self.drop_selection(&mut update);
                    }
                    update.status("Conversation deleted");
                    self.request_chats(&mut update);
                }
                Err(e) => self.failed(&mut update, "Failed to delete conversation", &e),
            },
            ApiEvent::AliasSet { user_id, result } => match result {
                Ok(_) => {
                    info!(user_id, "alias updated");
                    update.status("Alias updated");
                    self.request_chats(&mut update);
                    if self.selected == Some(user_id) {
                        update.requests.push(Request::FetchMessages { user_id });
                    }
                }
                Err(e) => self.failed(&mut update, "Failed to set alias", &e),
            },
            ApiEvent::SearchResults { term, result } => {
                if self.search_term.as_deref() != Some(term.as_str()) {
                    debug!(term, "discarding stale search results");
                    return update;
                }
                match result {
                    Ok(hits) => {
                        debug!(term, count = hits.len(), "search results");
                        let names = &mut self.names;
                        update.search = Some(search::group_results(hits, |h| {
                            names.resolve(h.user_id, h.alias.as_deref(), h.first_name.as_deref(), None)
                        }));
                    }
                    Err(e) => self.failed(&mut update, "Search failed", &e),
                }
            }
        }
        update.busy = self.composer.is_submitting();
        update
    }

    fn chats_loaded(&mut self, result: Result<Vec<ChatRow>, ApiError>, update: &mut ShellUpdate) {
        self.chats_in_flight = false;
        match result {
            Ok(rows) => {
                let summaries: Vec<ConversationSummary> = rows
                    .iter()
                    .map(|row| ConversationSummary::from_row(row, self.names.display_name(row)))
                    .collect();
                match self.reconciler.reconcile(summaries, self.selected) {
                    ChatListPlan::Unchanged => {
                        debug!("chats unchanged, skipping render");
                        if let Some(id) = self.selected.filter(|id| self.reconciler.get(*id).is_none()) {
                            info!(user_id = id, "selected conversation not in chat list");
                            self.drop_selection(update);
                        }
                    }
                    ChatListPlan::Rebuild(plan) => {
                        let badge_only = plan.changes.iter().all(|c| {
                            matches!(c, RowChange::Updated { fields, .. } if fields.badge_only())
                        });
                        debug!(
                            rows = plan.rows.len(),
                            changes = plan.changes.len(),
                            reordered = plan.reordered,
                            badge_only,
                            "chat list changed"
                        );
                        if let Some(lost) = plan.selection_lost {
                            info!(user_id = lost, "selected conversation disappeared");
                            self.drop_selection(update);
                        }
                        update.chat_list = Some(plan);
                    }
                }
            }
            Err(e) => self.failed(update, "Failed to load chats", &e),
        }
        if std::mem::take(&mut self.chats_dirty) {
            self.request_chats(update);
        }
    }

    fn messages_loaded(
        &mut self,
        user_id: i64,
        result: Result<Vec<MessageRow>, ApiError>,
        update: &mut ShellUpdate,
    ) {
        if self.selected != Some(user_id) {
            debug!(user_id, selected = ?self.selected, "discarding stale message response");
            return;
        }
        match result {
            Ok(rows) => {
                let messages: Vec<Message> = rows.into_iter().map(Message::from).collect();
                let plan = build_render_plan(&messages, self.now().date());
                debug!(
                    user_id,
                    count = messages.len(),
                    reply_target = ?plan.reply_target,
                    "messages loaded"
                );
                self.reply_target = plan.reply_target;
                self.loaded_for = Some(user_id);
                self.messages = plan.clone();
                update.messages = Some(plan);
            }
            Err(e) => self.failed(update, "Failed to load messages", &e),
        }
    }

    fn new_messages(&mut self, result: Result<NewMessages, ApiError>, update: &mut ShellUpdate) {
        self.new_check_in_flight = false;
        let news = match result {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "new-message check failed");
                return;
            }
        };
        if !news.has_new {
            return;
        }
        let count = news.user_ids.len();
        info!(count, "new messages");
        update.notice = Some(format!("New messages from {} conversations", count));
        self.request_chats(update);
        if let Some(user_id) = self.selected.filter(|id| news.user_ids.contains(id)) {
            update.requests.push(Request::FetchMessages { user_id });
            update.requests.push(Request::MarkRead { user_id });
        }
    }

    fn sent(&mut self, ticket: Ticket, result: Result<ApiResponse, ApiError>, update: &mut ShellUpdate) {
        let draft_before = self.composer.draft().to_string();
        let outcome = self
            .composer
            .finish(ticket, result.map(|_| ()).map_err(|e| e.to_string()));
        update.reset_input = self.composer.draft() != draft_before;
        match outcome {
            Finished::Sent(refresh) => {
                info!(user_id = refresh.user_id, "submission delivered");
                update.status("Sent");
                self.request_chats(update);
                if self.selected == Some(refresh.user_id) {
                    update.requests.push(Request::FetchMessages {
                        user_id: refresh.user_id,
                    });
                }
            }
            Finished::Failed { error } => {
                warn!(error, "submission failed");
                update.status(format!("Failed to send: {}", error));
            }
            Finished::Ignored => debug!("ignoring result for an old submission"),
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn update(&self) -> ShellUpdate {
        ShellUpdate {
            busy: self.composer.is_submitting(),
            ..ShellUpdate::default()
        }
    }

    fn submission(
        &mut self,
        result: Result<SendRequest, ComposeError>,
        status: &str,
    ) -> ShellUpdate {
        let mut update = self.update();
        match result {
            Ok(req) => {
                debug!(user_id = req.user_id, "submission accepted");
                update.status(status);
                update.requests.push(Request::Send(req));
            }
            Err(e) => self.reject(&mut update, e),
        }
        update.busy = self.composer.is_submitting();
        update
    }

    fn reject(&self, update: &mut ShellUpdate, e: ComposeError) {
        debug!(error = %e, "submission rejected");
        update.status(e.to_string());
        update.rejected = Some(e);
    }

    fn failed(&self, update: &mut ShellUpdate, what: &str, e: &ApiError) {
        warn!(error = %e, "{}", what);
        update.status(format!("{}: {}", what, e));
    }

    fn request_chats(&mut self, update: &mut ShellUpdate) {
        if self.chats_in_flight {
            self.chats_dirty = true;
            return;
        }
        self.chats_in_flight = true;
        update.requests.push(Request::FetchChats);
    }

    /// Full reset of everything tied to the selected conversation.
    fn drop_selection(&mut self, update: &mut ShellUpdate) {
        self.selected = None;
        self.reply_target = None;
        self.loaded_for = None;
        self.messages = MessagePlan::default();
        self.composer.reset_for_conversation_change();
        update.clear_view = true;
    }
}

/// Run one request against the relay.
pub async fn execute(api: &ApiClient, request: Request) -> ApiEvent {
    match request {
        Request::FetchChats => ApiEvent::Chats(api.list_chats().await),
        Request::FetchMessages { user_id } => ApiEvent::Messages {
            user_id,
            result: api.list_messages(user_id).await,
        },
        Request::MarkRead { user_id } => ApiEvent::MarkedRead {
            user_id,
            result: api.mark_read(user_id).await,
        },
        Request::CheckNew => ApiEvent::NewMessages(api.check_new().await),
        Request::Send(req) => {
            let result = match &req.payload {
                Payload::Text(text) => api.send_reply(req.user_id, text).await,
                Payload::File(file) => api.upload_file(req.user_id, file).await,
            };
            ApiEvent::Sent {
                ticket: req.ticket,
                result,
            }
        }
        Request::DeleteMessage {
            message_id,
            user_id,
        } => ApiEvent::MessageDeleted {
            message_id,
            user_id,
            result: api.delete_message(message_id).await,
        },
        Request::DeleteConversation { user_id } => ApiEvent::ConversationDeleted {
            user_id,
            result: api.delete_conversation(user_id).await,
        },
        Request::SetAlias { user_id, alias } => ApiEvent::AliasSet {
            user_id,
            result: api.set_alias(user_id, &alias).await,
        },
        Request::Search { term } => {
            let result = api.search(&term).await;
            ApiEvent::SearchResults { term, result }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Timestamp;
    use crate::reconcile::RowChange;
    use crate::render::RenderBlock;

    fn fixed_now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2024-03-05 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn session() -> Session {
        Session::new(false).with_clock(fixed_now)
    }

    fn chat(user_id: i64, unread: u32) -> ChatRow {
        ChatRow {
            user_id,
            username: None,
            first_name: Some(format!("User{}", user_id)),
            last_message_text: Some("hi".into()),
            last_message_time: Timestamp::parse("2024-03-05 10:00:00"),
            has_media: false,
            media_type: None,
            is_replied: false,
            reply_text: None,
            unread_count: unread,
            alias: None,
        }
    }

    fn row(id: i64, user_id: i64, replied: bool, text: &str, ts: &str) -> MessageRow {
        MessageRow {
            id,
            user_id,
            username: None,
            first_name: None,
            message_text: (!replied).then(|| text.to_string()),
            timestamp: Timestamp::parse(ts),
            is_read: true,
            is_replied: replied,
            reply_text: replied.then(|| text.to_string()),
            has_media: false,
            media_type: None,
            media_path: None,
            alias: None,
        }
    }

    fn ok() -> Result<ApiResponse, ApiError> {
        Ok(ApiResponse {
            success: true,
            ..Default::default()
        })
    }

    fn load_chats(s: &mut Session, rows: Vec<ChatRow>) -> ShellUpdate {
        s.on_poll_tick();
        s.on_event(ApiEvent::Chats(Ok(rows)))
    }

    fn send_ticket(update: &ShellUpdate) -> Ticket {
        update
            .requests
            .iter()
            .find_map(|r| match r {
                Request::Send(req) => Some(req.ticket),
                _ => None,
            })
            .expect("send request")
    }

    #[test]
    fn poll_ticks_never_overlap() {
        let mut s = session();
        assert_eq!(s.on_poll_tick().requests, vec![Request::FetchChats]);
        assert!(s.on_poll_tick().requests.is_empty());
        s.on_event(ApiEvent::Chats(Ok(vec![chat(1, 0)])));
        assert_eq!(s.on_poll_tick().requests, vec![Request::FetchChats]);
    }

    #[test]
    fn failed_poll_clears_in_flight_flag() {
        let mut s = session();
        s.on_poll_tick();
        let update = s.on_event(ApiEvent::Chats(Err(ApiError::Network("down".into()))));
        assert!(update.status.unwrap().contains("down"));
        assert_eq!(s.on_poll_tick().requests, vec![Request::FetchChats]);
    }

    #[test]
    fn unchanged_poll_renders_nothing() {
        let mut s = session();
        assert!(load_chats(&mut s, vec![chat(1, 0)]).chat_list.is_some());
        assert!(load_chats(&mut s, vec![chat(1, 0)]).chat_list.is_none());
    }

    #[test]
    fn failed_upload_after_switch_does_not_follow_to_new_conversation() {
        let mut s = session();
        load_chats(&mut s, vec![chat(1, 0), chat(2, 0)]);
        s.on_conversation_selected(1);
        s.on_attachment_selected(Some(Attachment::from_bytes("for_user1.pdf", vec![7])));
        let ticket = send_ticket(&s.on_attachment_submit());

        s.on_conversation_selected(2);
        let update = s.on_event(ApiEvent::Sent {
            ticket,
            result: Err(ApiError::Network("down".into())),
        });
        assert_eq!(update.status.as_deref(), Some("Failed to send: network error: down"));
        assert!(s.composer().attachment().is_none());

        let retry = s.on_attachment_submit();
        assert!(!retry.requests.iter().any(|r| matches!(r, Request::Send(_))));
        assert_eq!(
            retry.rejected,
            Some(ComposeError::Validation(Invalid::NoAttachment))
        );
    }

    #[test]
    fn selection_missing_from_unchanged_list_is_dropped() {
        let mut s = session();
        load_chats(&mut s, vec![chat(1, 0)]);
        // e.g. opened from a search hit for a user the list does not carry
        s.on_conversation_selected(9);
        let update = load_chats(&mut s, vec![chat(1, 0)]);
        assert!(update.chat_list.is_none());
        assert!(update.clear_view);
        assert_eq!(s.selected(), None);

        s.on_conversation_selected(1);
        let update = load_chats(&mut s, vec![chat(1, 0)]);
        assert!(!update.clear_view);
        assert_eq!(s.selected(), Some(1));
    }

    #[test]
    fn unread_badge_update_keeps_selection() {
        let mut s = session();
        load_chats(&mut s, vec![chat(7, 0)]);
        s.on_conversation_selected(7);
        let update = load_chats(&mut s, vec![chat(7, 3)]);
        let list = update.chat_list.expect("rebuild");
        assert_eq!(list.highlight, Some(7));
        assert!(matches!(
            list.changes.as_slice(),
            [RowChange::Updated { user_id: 7, fields }] if fields.badge_only()
        ));
        assert!(!update.clear_view);
        assert_eq!(s.selected(), Some(7));
    }

    #[test]
    fn selecting_fetches_and_marks_read() {
        let mut s = session();
        let update = s.on_conversation_selected(4);
        assert_eq!(
            update.requests,
            vec![
                Request::FetchMessages { user_id: 4 },
                Request::MarkRead { user_id: 4 }
            ]
        );
        assert!(s.messages_loading());
    }

    #[test]
    fn stale_message_response_is_dropped() {
        let mut s = session();
        s.on_conversation_selected(1);
        s.on_conversation_selected(2);
        let late = s.on_event(ApiEvent::Messages {
            user_id: 1,
            result: Ok(vec![row(10, 1, false, "old", "2024-03-05 09:00:00")]),
        });
        assert!(late.is_empty());
        assert!(s.messages().blocks.is_empty());

        let fresh = s.on_event(ApiEvent::Messages {
            user_id: 2,
            result: Ok(vec![row(20, 2, false, "new", "2024-03-05 09:00:00")]),
        });
        assert!(fresh.messages.is_some());
        assert_eq!(s.reply_target(), Some(20));
        assert!(!s.messages_loading());
    }

    #[test]
    fn messages_build_plan_and_reply_target() {
        let mut s = session();
        s.on_conversation_selected(7);
        let update = s.on_event(ApiEvent::Messages {
            user_id: 7,
            result: Ok(vec![
                row(1, 7, false, "hi", "2024-03-04 10:00:00"),
                row(2, 7, true, "hello", "2024-03-04 10:01:00"),
                row(3, 7, false, "there", "2024-03-05 09:00:00"),
            ]),
        });
        let plan = update.messages.unwrap();
        assert_eq!(plan.reply_target, Some(3));
        assert_eq!(
            plan.blocks[0],
            RenderBlock::DateSeparator {
                label: "Yesterday".into()
            }
        );
        assert_eq!(s.reply_target(), Some(3));
    }

    #[test]
    fn vanished_conversation_clears_view() {
        let mut s = session();
        load_chats(&mut s, vec![chat(1, 0), chat(2, 0)]);
        s.on_conversation_selected(2);
        s.on_event(ApiEvent::Messages {
            user_id: 2,
            result: Ok(vec![row(5, 2, false, "x", "2024-03-05 09:00:00")]),
        });
        let update = load_chats(&mut s, vec![chat(1, 0)]);
        assert!(update.clear_view);
        assert_eq!(s.selected(), None);
        assert_eq!(s.reply_target(), None);
        assert!(s.messages().blocks.is_empty());
    }

    #[test]
    fn reply_success_refreshes_both_views() {
        let mut s = session();
        s.on_conversation_selected(7);
        s.set_draft("thanks!");
        let update = s.on_reply_submit();
        let ticket = send_ticket(&update);

        let done = s.on_event(ApiEvent::Sent { ticket, result: ok() });
        assert!(done.reset_input);
        assert_eq!(s.composer().draft(), "");
        assert!(done.requests.contains(&Request::FetchChats));
        assert!(done.requests.contains(&Request::FetchMessages { user_id: 7 }));
    }

    #[test]
    fn busy_submit_issues_no_request() {
        let mut s = session();
        s.on_conversation_selected(7);
        s.set_draft("one");
        let first = s.on_reply_submit();
        assert_eq!(first.requests.len(), 1);

        let second = s.on_reply_submit();
        assert!(second.requests.is_empty());
        assert_eq!(second.rejected, Some(ComposeError::Busy));
        assert_eq!(second.status.as_deref(), Some("busy, try again"));

        let paste = s.on_attachment_pasted(Attachment::from_bytes("p.png", vec![1]));
        assert!(paste.requests.is_empty());
        assert_eq!(paste.rejected, Some(ComposeError::Busy));
    }

    #[test]
    fn failed_reply_keeps_text() {
        let mut s = session();
        s.on_conversation_selected(7);
        s.set_draft("important answer");
        let ticket = send_ticket(&s.on_reply_submit());
        let update = s.on_event(ApiEvent::Sent {
            ticket,
            result: Err(ApiError::Rejected("db locked".into())),
        });
        assert!(!update.reset_input);
        assert_eq!(update.status.as_deref(), Some("Failed to send: db locked"));
        assert_eq!(s.composer().draft(), "important answer");
        assert!(update.requests.is_empty());
        assert!(s.composer().accepts_input());
    }

    #[test]
    fn empty_reply_rejected_without_request() {
        let mut s = session();
        s.on_conversation_selected(7);
        let update = s.on_reply_submit();
        assert!(update.requests.is_empty());
        assert_eq!(
            update.rejected,
            Some(ComposeError::Validation(Invalid::EmptyReply))
        );
    }

    #[test]
    fn attachment_upload_flow() {
        let mut s = session();
        s.on_conversation_selected(3);
        let none = s.on_attachment_selected(None);
        assert_eq!(
            none.rejected,
            Some(ComposeError::Validation(Invalid::NoAttachment))
        );
        s.on_attachment_selected(Some(Attachment::from_bytes("a.pdf", vec![1, 2])));
        let update = s.on_attachment_submit();
        let ticket = send_ticket(&update);
        s.on_event(ApiEvent::Sent { ticket, result: ok() });
        assert!(s.composer().attachment().is_none());
    }

    #[test]
    fn refresh_during_poll_is_deferred() {
        let mut s = session();
        s.on_conversation_selected(7);
        s.on_poll_tick();
        s.set_draft("hi");
        let ticket = send_ticket(&s.on_reply_submit());
        let done = s.on_event(ApiEvent::Sent { ticket, result: ok() });
        // Poll already in flight: no duplicate request now...
        assert!(!done.requests.contains(&Request::FetchChats));
        // ...but one follows as soon as it lands.
        let after = s.on_event(ApiEvent::Chats(Ok(vec![chat(7, 0)])));
        assert_eq!(after.requests, vec![Request::FetchChats]);
    }

    #[test]
    fn new_messages_for_selected_conversation() {
        let mut s = session();
        s.on_conversation_selected(5);
        s.on_new_message_tick();
        assert!(s.on_new_message_tick().requests.is_empty());
        let update = s.on_event(ApiEvent::NewMessages(Ok(NewMessages {
            has_new: true,
            user_ids: vec![5, 9],
        })));
        assert_eq!(
            update.notice.as_deref(),
            Some("New messages from 2 conversations")
        );
        assert!(update.requests.contains(&Request::FetchChats));
        assert!(update.requests.contains(&Request::FetchMessages { user_id: 5 }));
        assert!(update.requests.contains(&Request::MarkRead { user_id: 5 }));
        assert_eq!(s.on_new_message_tick().requests, vec![Request::CheckNew]);
    }

    #[test]
    fn new_messages_elsewhere_only_refresh_list() {
        let mut s = session();
        s.on_conversation_selected(5);
        s.on_new_message_tick();
        let update = s.on_event(ApiEvent::NewMessages(Ok(NewMessages {
            has_new: true,
            user_ids: vec![9],
        })));
        assert_eq!(update.requests, vec![Request::FetchChats]);
    }

    #[test]
    fn deleting_selected_conversation_resets() {
        let mut s = session();
        s.on_conversation_selected(4);
        let update = s.on_delete_conversation();
        assert_eq!(
            update.requests,
            vec![Request::DeleteConversation { user_id: 4 }]
        );
        let done = s.on_event(ApiEvent::ConversationDeleted {
            user_id: 4,
            result: ok(),
        });
        assert!(done.clear_view);
        assert_eq!(s.selected(), None);
        assert!(done.requests.contains(&Request::FetchChats));
    }

    #[test]
    fn failed_delete_leaves_state() {
        let mut s = session();
        s.on_conversation_selected(4);
        let done = s.on_event(ApiEvent::ConversationDeleted {
            user_id: 4,
            result: Err(ApiError::Network("timeout".into())),
        });
        assert!(!done.clear_view);
        assert_eq!(s.selected(), Some(4));
        assert!(done.requests.is_empty());
    }

    #[test]
    fn delete_message_refreshes_conversation() {
        let mut s = session();
        s.on_conversation_selected(4);
        let update = s.on_delete_message(40);
        assert_eq!(
            update.requests,
            vec![Request::DeleteMessage {
                message_id: 40,
                user_id: 4
            }]
        );
        let done = s.on_event(ApiEvent::MessageDeleted {
            message_id: 40,
            user_id: 4,
            result: ok(),
        });
        assert!(done.requests.contains(&Request::FetchMessages { user_id: 4 }));
        assert!(done.requests.contains(&Request::FetchChats));
    }

    #[test]
    fn actions_need_a_selection() {
        let mut s = session();
        assert!(s.on_set_alias("VIP").requests.is_empty());
        assert!(s.on_delete_message(1).requests.is_empty());
        assert!(s.on_delete_conversation().requests.is_empty());
    }

    #[test]
    fn alias_is_trimmed() {
        let mut s = session();
        s.on_conversation_selected(4);
        assert_eq!(
            s.on_set_alias("  VIP ").requests,
            vec![Request::SetAlias {
                user_id: 4,
                alias: "VIP".into()
            }]
        );
    }

    #[test]
    fn short_search_terms_send_nothing() {
        let mut s = session();
        let update = s.on_search("a");
        assert!(update.requests.is_empty());
        assert_eq!(update.search, Some(Vec::new()));
    }

    #[test]
    fn stale_search_results_dropped() {
        let mut s = session();
        s.on_search("refund");
        s.on_search("invoice");
        let stale = s.on_event(ApiEvent::SearchResults {
            term: "refund".into(),
            result: Ok(Vec::new()),
        });
        assert!(stale.search.is_none());
        let fresh = s.on_event(ApiEvent::SearchResults {
            term: "invoice".into(),
            result: Ok(Vec::new()),
        });
        assert_eq!(fresh.search, Some(Vec::new()));
    }

    #[test]
    fn mark_read_with_updates_refreshes_list() {
        let mut s = session();
        let update = s.on_event(ApiEvent::MarkedRead {
            user_id: 1,
            result: Ok(ApiResponse {
                success: true,
                updated: Some(2),
                ..Default::default()
            }),
        });
        assert_eq!(update.requests, vec![Request::FetchChats]);

        let mut s = session();
        let update = s.on_event(ApiEvent::MarkedRead {
            user_id: 1,
            result: Ok(ApiResponse {
                success: true,
                updated: Some(0),
                ..Default::default()
            }),
        });
        assert!(update.requests.is_empty());
    }
}
