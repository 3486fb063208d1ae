pub mod chat_list;
pub mod help_overlay;
pub mod message_view;
pub mod search_panel;
pub mod status_bar;

use std::collections::HashSet;
use std::io::{self, Stdout, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use crossterm::{
    event::{DisableBracketedPaste, EnableBracketedPaste, Event, EventStream, KeyEventKind},
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use futures::StreamExt;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Paragraph},
    Frame, Terminal,
};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use tui_textarea::{CursorMove, TextArea};

use crate::api::ApiClient;
use crate::clipboard;
use crate::composer::{Attachment, ComposerStatus};
use crate::config::Config;
use crate::keymap::{Action, InputMode, KeyMapper};
use crate::render::MessageBlock;
use crate::search::SearchGroup;
use crate::session::{self, ApiEvent, Request, Session, ShellUpdate};

use self::chat_list::ChatList;
use self::help_overlay::HelpOverlay;
use self::message_view::{build_lines, MessageView};
use self::search_panel::{SearchPanel, SearchTarget};
use self::status_bar::{BottomBar, TopBar};

/// Typing pause before a search request goes out.
const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptKind {
    Alias,
    AttachPath,
}

impl PromptKind {
    fn label(self) -> &'static str {
        match self {
            PromptKind::Alias => "Alias (empty clears):",
            PromptKind::AttachPath => "Attach file:",
        }
    }
}

struct Prompt {
    kind: PromptKind,
    input: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Confirm {
    DeleteMessage(i64),
    DeleteConversation(i64),
}

pub struct App {
    session: Session,
    api: ApiClient,
    keymap: KeyMapper,
    config: Config,
    should_quit: bool,

    // Mode
    mode: InputMode,
    /// Mode to go back to when an overlay closes.
    return_mode: InputMode,

    // Chat list
    list_cursor: usize,
    list_offset: usize,
    /// Conversation under the cursor, so the cursor follows it when rows move.
    cursor_id: Option<i64>,
    page_height: usize,

    // Message pane
    msg_cursor: Option<usize>,
    msg_scroll: usize,
    msg_count: usize,
    /// Put the cursor on the newest message when the next load arrives.
    follow_bottom: bool,

    // Reply editor
    editor: TextArea<'static>,
    sending: bool,

    // Search
    search_input: String,
    search_groups: Vec<SearchGroup>,
    search_expanded: HashSet<i64>,
    search_selected: usize,
    searching: bool,
    search_due: Option<Instant>,

    // One-line prompts and confirmations
    prompt: Option<Prompt>,
    confirm: Option<Confirm>,

    // Help overlay
    help_scroll: u16,

    // Status message (temporary feedback)
    status_message: Option<String>,
    status_time: Option<Instant>,
    bell: bool,

    /// Requests dispatched and not answered yet.
    in_flight: usize,
    api_tx: UnboundedSender<ApiEvent>,
    // Taken by the run loop
    api_rx: Option<UnboundedReceiver<ApiEvent>>,
}

impl App {
    pub fn new(api: ApiClient, config: Config) -> Self {
        let mut keymap = KeyMapper::new();
        let problems = keymap.load_bindings(&config.bindings);
        for problem in &problems {
            warn!("bindings: {}", problem);
        }
        let (api_tx, api_rx) = mpsc::unbounded_channel();

        let mut app = Self {
            session: Session::new(config.names.anonymize),
            api,
            keymap,
            config,
            should_quit: false,
            mode: InputMode::List,
            return_mode: InputMode::List,
            list_cursor: 0,
            list_offset: 0,
            cursor_id: None,
            page_height: 20,
            msg_cursor: None,
            msg_scroll: 0,
            msg_count: 0,
            follow_bottom: true,
            editor: new_editor(""),
            sending: false,
            search_input: String::new(),
            search_groups: Vec::new(),
            search_expanded: HashSet::new(),
            search_selected: 0,
            searching: false,
            search_due: None,
            prompt: None,
            confirm: None,
            help_scroll: 0,
            status_message: None,
            status_time: None,
            bell: false,
            in_flight: 0,
            api_tx,
            api_rx: Some(api_rx),
        };
        if let Some(first) = problems.first() {
            app.set_status(format!("Config: {}", first));
        }
        app
    }

    fn set_status(&mut self, msg: impl Into<String>) {
        self.status_message = Some(msg.into());
        self.status_time = Some(Instant::now());
    }

    fn clear_stale_status(&mut self) {
        if let Some(t) = self.status_time {
            if t.elapsed() > Duration::from_secs(4) {
                self.status_message = None;
                self.status_time = None;
            }
        }
    }

    // ── Talking to the session ──────────────────────────────────────

    /// Run requests in the background; results come back on `api_tx`.
    fn dispatch(&mut self, requests: Vec<Request>) {
        for request in requests {
            debug!(?request, "dispatch");
            if matches!(request, Request::Search { .. }) {
                self.searching = true;
            }
            self.in_flight += 1;
            let api = self.api.clone();
            let tx = self.api_tx.clone();
            tokio::spawn(async move {
                let event = session::execute(&api, request).await;
                // Receiver gone means we are shutting down.
                let _ = tx.send(event);
            });
        }
    }

    fn apply(&mut self, update: ShellUpdate) {
        self.sending = update.busy;
        if let Some(plan) = &update.chat_list {
            if self.cursor_id.is_none() {
                self.cursor_id = plan.highlight;
            }
            self.sync_list_cursor();
        }
        if update.clear_view {
            self.msg_cursor = None;
            self.msg_scroll = 0;
            self.msg_count = 0;
            if self.mode == InputMode::Confirm {
                self.confirm = None;
                self.mode = self.return_mode;
            }
            if matches!(self.mode, InputMode::Messages | InputMode::Compose) {
                self.mode = InputMode::List;
            }
            if matches!(self.return_mode, InputMode::Messages | InputMode::Compose) {
                self.return_mode = InputMode::List;
            }
        }
        if update.messages.is_some() {
            self.sync_msg_cursor();
        }
        if update.reset_input {
            self.editor = new_editor(self.session.composer().draft());
        }
        if let Some(groups) = update.search {
            self.search_groups = groups;
            self.search_expanded.clear();
            self.search_selected = 0;
            self.searching = false;
        }
        if update.rejected.is_some() {
            self.bell = true;
        }
        if let Some(status) = update.status {
            self.set_status(status);
        }
        if let Some(notice) = update.notice {
            self.set_status(notice);
            self.bell = true;
        }
        self.dispatch(update.requests);
    }

    fn sync_list_cursor(&mut self) {
        let rows = self.session.summaries();
        match self
            .cursor_id
            .and_then(|id| rows.iter().position(|r| r.user_id == id))
        {
            Some(pos) => self.list_cursor = pos,
            None => self.list_cursor = self.list_cursor.min(rows.len().saturating_sub(1)),
        }
        self.cursor_id = rows.get(self.list_cursor).map(|r| r.user_id);
    }

    fn sync_msg_cursor(&mut self) {
        let count = self.session.messages().message_count();
        let at_end = self.msg_cursor.map_or(true, |i| i + 1 >= self.msg_count);
        self.msg_cursor = match self.msg_cursor {
            _ if count == 0 => None,
            Some(i) if !self.follow_bottom && !at_end => Some(i.min(count - 1)),
            _ => Some(count - 1),
        };
        self.msg_count = count;
        self.follow_bottom = false;
    }

    fn open_conversation(&mut self, user_id: i64) {
        if self.session.selected() != Some(user_id) {
            self.msg_cursor = None;
            self.msg_scroll = 0;
            self.msg_count = 0;
        }
        self.follow_bottom = true;
        let update = self.session.on_conversation_selected(user_id);
        self.apply(update);
        self.mode = InputMode::Messages;
    }

    /// Make sure a conversation is open, opening the one under the list cursor if needed.
    fn ensure_selection(&mut self) -> bool {
        if self.session.selected().is_some() {
            return true;
        }
        match self.cursor_id {
            Some(id) => {
                self.open_conversation(id);
                true
            }
            None => {
                self.set_status("No conversation selected");
                false
            }
        }
    }

    fn cursor_message(&self) -> Option<&MessageBlock> {
        self.msg_cursor
            .and_then(|i| self.session.messages().messages().nth(i))
    }

    fn run_search(&mut self) {
        self.search_due = None;
        let update = self.session.on_search(&self.search_input);
        self.apply(update);
    }

    fn schedule_search(&mut self) {
        self.search_due = Some(Instant::now() + SEARCH_DEBOUNCE);
    }

    fn close_search(&mut self) {
        self.session.on_search_closed();
        self.search_due = None;
        self.searching = false;
        self.search_groups.clear();
        self.search_expanded.clear();
        self.mode = self.return_mode;
    }

    fn enter_overlay(&mut self, mode: InputMode) {
        if matches!(
            self.mode,
            InputMode::List | InputMode::Messages | InputMode::Compose
        ) {
            self.return_mode = self.mode;
        }
        self.keymap.cancel_pending();
        self.mode = mode;
    }

    fn open_prompt(&mut self, kind: PromptKind) {
        self.prompt = Some(Prompt {
            kind,
            input: String::new(),
        });
        self.enter_overlay(InputMode::Prompt);
    }

    fn ask(&mut self, confirm: Confirm) {
        self.confirm = Some(confirm);
        self.enter_overlay(InputMode::Confirm);
    }

    fn confirm_question(&self, confirm: Confirm) -> String {
        match confirm {
            Confirm::DeleteMessage(_) => "Delete this message? (y/n)".to_string(),
            Confirm::DeleteConversation(user_id) => {
                let name = self
                    .session
                    .summaries()
                    .iter()
                    .find(|s| s.user_id == user_id)
                    .map(|s| s.display_name.clone())
                    .unwrap_or_else(|| format!("User {}", user_id));
                format!("Delete the whole conversation with {}? (y/n)", name)
            }
        }
    }

    // ── Movement ────────────────────────────────────────────────────

    fn move_list(&mut self, delta: isize) {
        let len = self.session.summaries().len();
        if len == 0 {
            return;
        }
        self.list_cursor = step(self.list_cursor, delta, len);
        self.cursor_id = self.session.summaries().get(self.list_cursor).map(|r| r.user_id);
    }

    fn move_messages(&mut self, delta: isize) {
        if self.msg_count == 0 {
            return;
        }
        let from = self.msg_cursor.unwrap_or(self.msg_count - 1);
        self.msg_cursor = Some(step(from, delta, self.msg_count));
    }

    fn move_cursor(&mut self, delta: isize) {
        if self.mode == InputMode::Messages {
            self.move_messages(delta);
        } else {
            self.move_list(delta);
        }
    }

    fn half_page(&self) -> isize {
        let rows = (self.page_height / 2).max(1);
        if self.mode == InputMode::Messages {
            // A message is a header, a body line and a gap at least.
            (rows / 3).max(1) as isize
        } else {
            rows as isize
        }
    }

    // ── Actions ─────────────────────────────────────────────────────

    fn handle_action(&mut self, action: Action) -> Result<()> {
        match self.mode {
            InputMode::Compose => return self.handle_compose(action),
            InputMode::Search => return self.handle_search(action),
            InputMode::Prompt => return self.handle_prompt(action),
            InputMode::Confirm => return self.handle_confirm(action),
            InputMode::Help => return self.handle_help(action),
            InputMode::List | InputMode::Messages => {}
        }

        match action {
            Action::MoveDown => self.move_cursor(1),
            Action::MoveUp => self.move_cursor(-1),
            Action::JumpTop => self.move_cursor(isize::MIN / 2),
            Action::JumpBottom => self.move_cursor(isize::MAX / 2),
            Action::HalfPageDown => self.move_cursor(self.half_page()),
            Action::HalfPageUp => self.move_cursor(-self.half_page()),
            Action::ScrollDown => self.move_messages(3),
            Action::ScrollUp => self.move_messages(-3),

            Action::OpenConversation => {
                if let Some(id) = self.cursor_id {
                    self.open_conversation(id);
                }
            }
            Action::FocusMessages => {
                if self.session.selected().is_some() {
                    self.mode = InputMode::Messages;
                } else if let Some(id) = self.cursor_id {
                    self.open_conversation(id);
                }
            }
            Action::FocusList => {
                self.mode = InputMode::List;
                if let Some(id) = self.session.selected() {
                    self.cursor_id = Some(id);
                    self.sync_list_cursor();
                }
            }

            Action::Compose => {
                if self.ensure_selection() {
                    self.mode = InputMode::Compose;
                }
            }
            Action::AttachFile => {
                if self.ensure_selection() {
                    self.open_prompt(PromptKind::AttachPath);
                }
            }
            Action::SendAttachment => {
                self.follow_bottom = true;
                let update = self.session.on_attachment_submit();
                self.apply(update);
            }
            Action::RemoveAttachment => {
                let update = self.session.on_attachment_removed();
                self.apply(update);
            }

            Action::DeleteMessage => match self.cursor_message().map(|m| m.delete_key) {
                Some(id) => self.ask(Confirm::DeleteMessage(id)),
                None => self.set_status("No message selected"),
            },
            Action::DeleteConversation => match self.session.selected() {
                Some(id) => self.ask(Confirm::DeleteConversation(id)),
                None => self.set_status("No conversation selected"),
            },
            Action::SetAlias => {
                if self.ensure_selection() {
                    self.open_prompt(PromptKind::Alias);
                }
            }
            Action::Refresh => {
                self.set_status("Refreshing\u{2026}");
                let update = self.session.on_refresh();
                self.apply(update);
            }

            Action::EnterSearch => {
                self.search_input.clear();
                self.search_groups.clear();
                self.search_expanded.clear();
                self.search_selected = 0;
                self.enter_overlay(InputMode::Search);
            }

            Action::YankMessage => self.yank()?,
            Action::OpenMedia => self.open_media()?,

            Action::ShowHelp => {
                self.help_scroll = 0;
                self.enter_overlay(InputMode::Help);
            }
            Action::Quit => self.should_quit = true,
            _ => {}
        }
        Ok(())
    }

    fn handle_compose(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Passthrough(key) => {
                if !self.session.composer().accepts_input() {
                    return Ok(());
                }
                self.editor.input(key);
                self.session.set_draft(editor_text(&self.editor));
            }
            Action::InputSubmit => {
                if !self.session.composer().accepts_input() {
                    return Ok(());
                }
                self.session.set_draft(editor_text(&self.editor));
                self.follow_bottom = true;
                let update = self.session.on_reply_submit();
                self.apply(update);
            }
            Action::InputCancel => self.mode = InputMode::Messages,
            Action::Quit => self.should_quit = true,
            _ => {}
        }
        Ok(())
    }

    fn handle_search(&mut self, action: Action) -> Result<()> {
        match action {
            Action::InputChar(c) => {
                self.search_input.push(c);
                self.schedule_search();
            }
            Action::InputBackspace => {
                self.search_input.pop();
                self.schedule_search();
            }
            Action::MoveDown => {
                let count = search_panel::targets(&self.search_groups, &self.search_expanded).len();
                if self.search_selected + 1 < count {
                    self.search_selected += 1;
                }
            }
            Action::MoveUp => self.search_selected = self.search_selected.saturating_sub(1),
            Action::InputSubmit => {
                let targets = search_panel::targets(&self.search_groups, &self.search_expanded);
                match targets.get(self.search_selected).copied() {
                    Some(SearchTarget::Open(id)) => {
                        self.close_search();
                        self.cursor_id = Some(id);
                        self.sync_list_cursor();
                        self.open_conversation(id);
                    }
                    Some(SearchTarget::Expand(id)) => {
                        self.search_expanded.insert(id);
                    }
                    None if self.search_due.is_some() => self.run_search(),
                    None => {}
                }
            }
            Action::InputCancel => self.close_search(),
            Action::Quit => self.should_quit = true,
            _ => {}
        }
        Ok(())
    }

    fn handle_prompt(&mut self, action: Action) -> Result<()> {
        match action {
            Action::InputChar(c) => {
                if let Some(prompt) = self.prompt.as_mut() {
                    prompt.input.push(c);
                }
            }
            Action::InputBackspace => {
                if let Some(prompt) = self.prompt.as_mut() {
                    prompt.input.pop();
                }
            }
            Action::InputSubmit => {
                self.mode = self.return_mode;
                if let Some(prompt) = self.prompt.take() {
                    self.submit_prompt(prompt);
                }
            }
            Action::InputCancel => {
                self.prompt = None;
                self.mode = self.return_mode;
            }
            Action::Quit => self.should_quit = true,
            _ => {}
        }
        Ok(())
    }

    fn submit_prompt(&mut self, prompt: Prompt) {
        match prompt.kind {
            PromptKind::Alias => {
                let update = self.session.on_set_alias(&prompt.input);
                self.apply(update);
            }
            PromptKind::AttachPath => {
                let path = prompt.input.trim();
                let update = if path.is_empty() {
                    self.session.on_attachment_selected(None)
                } else {
                    match Attachment::from_path(&expand_tilde(path), self.config.upload.max_bytes) {
                        Ok(file) => self.session.on_attachment_selected(Some(file)),
                        Err(e) => {
                            self.set_status(e.to_string());
                            return;
                        }
                    }
                };
                self.apply(update);
            }
        }
    }

    fn handle_confirm(&mut self, action: Action) -> Result<()> {
        match action {
            Action::ConfirmYes => {
                self.mode = self.return_mode;
                let update = match self.confirm.take() {
                    Some(Confirm::DeleteMessage(id)) => self.session.on_delete_message(id),
                    Some(Confirm::DeleteConversation(id)) if self.session.selected() == Some(id) => {
                        self.session.on_delete_conversation()
                    }
                    _ => return Ok(()),
                };
                self.apply(update);
            }
            Action::ConfirmNo => {
                self.confirm = None;
                self.mode = self.return_mode;
            }
            Action::Quit => self.should_quit = true,
            _ => {}
        }
        Ok(())
    }

    fn handle_help(&mut self, action: Action) -> Result<()> {
        match action {
            Action::ScrollDown => self.help_scroll = self.help_scroll.saturating_add(1),
            Action::ScrollUp => self.help_scroll = self.help_scroll.saturating_sub(1),
            Action::InputCancel => self.mode = self.return_mode,
            Action::Quit => self.should_quit = true,
            _ => {}
        }
        Ok(())
    }

    fn yank(&mut self) -> Result<()> {
        let Some(msg) = self.cursor_message() else {
            self.set_status("No message selected");
            return Ok(());
        };
        let text = match (&msg.text, &msg.media) {
            (Some(text), _) => text.clone(),
            (None, Some(media)) => self.api.media_url(media.path()),
            (None, None) => return Ok(()),
        };
        clipboard::copy_to_clipboard(&text)?;
        self.set_status("Copied to clipboard");
        Ok(())
    }

    fn open_media(&mut self) -> Result<()> {
        let path = self
            .cursor_message()
            .and_then(|m| m.media.as_ref())
            .map(|m| m.path().to_string());
        let Some(path) = path else {
            self.set_status("No media in this message");
            return Ok(());
        };
        let url = self.api.media_url(&path);
        info!(url, "opening media");
        clipboard::open_url(&url)?;
        self.set_status(format!("Opening {}", url));
        Ok(())
    }

    fn handle_paste(&mut self, text: String) {
        match self.mode {
            InputMode::Search => {
                self.search_input.push_str(first_line(&text));
                self.schedule_search();
            }
            InputMode::Prompt => {
                if let Some(prompt) = self.prompt.as_mut() {
                    prompt.input.push_str(first_line(&text).trim());
                }
            }
            InputMode::List | InputMode::Messages | InputMode::Compose => {
                if let Some(path) = clipboard::pasted_file_path(&text) {
                    self.upload_pasted(&path);
                } else if self.mode == InputMode::Compose && self.session.composer().accepts_input() {
                    self.editor.insert_str(&text);
                    self.session.set_draft(editor_text(&self.editor));
                }
            }
            InputMode::Confirm | InputMode::Help => {}
        }
    }

    fn upload_pasted(&mut self, path: &Path) {
        if self.session.selected().is_none() {
            self.set_status("Open a conversation before pasting a file");
            return;
        }
        match Attachment::from_path(path, self.config.upload.max_bytes) {
            Ok(file) => {
                info!(file = %file.file_name, size = file.size(), "uploading pasted file");
                self.follow_bottom = true;
                let update = self.session.on_attachment_pasted(file);
                self.apply(update);
            }
            Err(e) => self.set_status(e.to_string()),
        }
    }

    // ── Drawing ─────────────────────────────────────────────────────

    fn draw(&mut self, frame: &mut Frame) {
        let size = frame.area();
        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(3),
                Constraint::Length(1),
            ])
            .split(size);

        // Top bar
        let conversation = self
            .session
            .selected()
            .map(|id| match self.session.selected_summary() {
                Some(s) => s.display_name.clone(),
                None => format!("User {}", id),
            });
        let unread: u32 = self.session.summaries().iter().map(|s| s.unread_count).sum();
        frame.render_widget(
            TopBar {
                server: self.api.base_url(),
                conversation: conversation.as_deref(),
                unread_count: unread,
                total_count: self.session.summaries().len(),
                busy: self.in_flight > 0,
            },
            outer[0],
        );

        let panes = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
            .split(outer[1]);

        // Conversation list
        let now = self.session.now();
        let list_height = panes[0].height as usize;
        self.page_height = list_height;
        frame.render_widget(
            ChatList {
                rows: self.session.summaries(),
                cursor: self.list_cursor,
                offset: self.list_offset,
                open: self.session.selected(),
                focused: self.mode == InputMode::List,
                now,
            },
            panes[0],
        );
        let (start, _) = ChatList::visible_range(
            self.list_cursor,
            self.list_offset,
            list_height,
            self.session.summaries().len(),
        );
        self.list_offset = start;

        // Right pane: messages, pending attachment, reply editor
        let right_block = Block::default()
            .borders(Borders::LEFT)
            .border_style(Style::default().fg(Color::DarkGray));
        let right = right_block.inner(panes[1]);
        frame.render_widget(right_block, panes[1]);

        let attachment = self.session.composer().attachment().map(|f| {
            format!(
                " Attachment: {} ({})  A:send  X:remove",
                f.file_name,
                human_size(f.size() as u64)
            )
        });
        let editor_height = (self.editor.lines().len() as u16 + 1).clamp(3, 8);
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),
                Constraint::Length(u16::from(attachment.is_some())),
                Constraint::Length(editor_height),
            ])
            .split(right);

        let sender = conversation.as_deref().unwrap_or("");
        let lines = build_lines(self.session.messages(), sender, rows[0].width);
        let height = rows[0].height as usize;
        let on_last = self.msg_cursor.is_some_and(|i| i + 1 >= self.msg_count);
        self.msg_scroll = if on_last {
            MessageView::bottom(&lines, height)
        } else {
            MessageView::scroll_for(&lines, self.msg_cursor, self.msg_scroll, height)
        };
        let placeholder = if self.session.selected().is_none() {
            "Select a conversation"
        } else if self.session.messages_loading() {
            "Loading\u{2026}"
        } else {
            ""
        };
        frame.render_widget(
            MessageView {
                lines: &lines,
                cursor: self.msg_cursor,
                scroll: self.msg_scroll,
                placeholder,
                focused: self.mode == InputMode::Messages,
            },
            rows[0],
        );

        if let Some(text) = attachment {
            frame.render_widget(
                Paragraph::new(text).style(Style::default().fg(Color::Yellow)),
                rows[1],
            );
        }

        let composer = self.session.composer();
        let (title, title_style) = match (composer.status(), composer.last_error()) {
            (ComposerStatus::Submitting, _) => (
                " Sending\u{2026} ".to_string(),
                Style::default().fg(Color::Yellow),
            ),
            (_, Some(err)) => (format!(" Failed: {} ", err), Style::default().fg(Color::Red)),
            _ => (" Reply ".to_string(), Style::default().fg(Color::DarkGray)),
        };
        let composing = self.mode == InputMode::Compose;
        let border = if composing { Color::Blue } else { Color::DarkGray };
        self.editor.set_block(
            Block::default()
                .borders(Borders::TOP)
                .border_style(Style::default().fg(border))
                .title(title)
                .title_style(title_style),
        );
        self.editor.set_cursor_style(if composing && !self.sending {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default()
        });
        frame.render_widget(&self.editor, rows[2]);

        // Overlays
        match self.mode {
            InputMode::Search => frame.render_widget(
                SearchPanel {
                    term: &self.search_input,
                    groups: &self.search_groups,
                    expanded: &self.search_expanded,
                    selected: self.search_selected,
                    searching: self.searching || self.search_due.is_some(),
                    now,
                },
                size,
            ),
            InputMode::Help => frame.render_widget(
                HelpOverlay {
                    scroll: self.help_scroll,
                },
                size,
            ),
            _ => {}
        }

        // Bottom bar
        let question;
        let input = match (&self.prompt, self.confirm) {
            (Some(prompt), _) if self.mode == InputMode::Prompt => {
                Some((prompt.kind.label(), prompt.input.as_str()))
            }
            (_, Some(confirm)) if self.mode == InputMode::Confirm => {
                question = self.confirm_question(confirm);
                Some((question.as_str(), ""))
            }
            _ => None,
        };
        frame.render_widget(
            BottomBar {
                mode: self.mode,
                pending_key: self.keymap.pending_display(),
                input,
                status_message: self.status_message.as_deref(),
            },
            outer[2],
        );
    }
}

fn new_editor(text: &str) -> TextArea<'static> {
    let lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    let mut editor = TextArea::new(lines);
    editor.set_cursor_line_style(Style::default());
    editor.set_placeholder_text("r to reply, Enter sends, Alt+Enter for a new line");
    editor.move_cursor(CursorMove::Bottom);
    editor.move_cursor(CursorMove::End);
    editor
}

fn editor_text(editor: &TextArea) -> String {
    editor.lines().join("\n")
}

fn step(from: usize, delta: isize, len: usize) -> usize {
    let last = len.saturating_sub(1) as isize;
    (from as isize).saturating_add(delta).clamp(0, last) as usize
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

fn human_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

pub async fn run(mut app: App) -> Result<()> {
    let mut api_rx = app
        .api_rx
        .take()
        .ok_or_else(|| anyhow!("event loop already running"))?;

    terminal::enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    io::stdout().execute(EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = event_loop(&mut app, &mut terminal, &mut api_rx).await;

    io::stdout().execute(DisableBracketedPaste)?;
    terminal::disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;
    info!("terminal restored");
    result
}

async fn event_loop(
    app: &mut App,
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    api_rx: &mut UnboundedReceiver<ApiEvent>,
) -> Result<()> {
    let initial = app.session.on_refresh();
    app.apply(initial);

    let chats_every = Duration::from_secs(app.config.poll.chats_secs.max(1));
    let mut chats_tick = tokio::time::interval_at(Instant::now() + chats_every, chats_every);
    chats_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let news_every = Duration::from_secs(app.config.poll.new_messages_secs.max(1));
    let mut news_tick = tokio::time::interval_at(Instant::now() + news_every, news_every);
    news_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let sequence_timeout = Duration::from_millis(1000);
    let mut last_key_time = Instant::now();
    let mut event_stream = EventStream::new();

    loop {
        app.clear_stale_status();

        terminal.draw(|frame| app.draw(frame))?;

        if std::mem::take(&mut app.bell) {
            let mut out = io::stdout();
            out.write_all(b"\x07")?;
            out.flush()?;
        }

        if app.should_quit {
            break;
        }

        // Handle key sequence timeout
        if app.keymap.has_pending() && last_key_time.elapsed() > sequence_timeout {
            app.keymap.cancel_pending();
        }

        let timeout = if app.keymap.has_pending() {
            sequence_timeout
        } else {
            Duration::from_millis(250)
        };
        let search_due = app.search_due;

        let event = tokio::select! {
            ev = event_stream.next() => match ev {
                Some(Ok(ev)) => Some(ev),
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
            Some(event) = api_rx.recv() => {
                app.in_flight = app.in_flight.saturating_sub(1);
                let update = app.session.on_event(event);
                app.apply(update);
                continue;
            }
            _ = chats_tick.tick() => {
                let update = app.session.on_poll_tick();
                app.apply(update);
                continue;
            }
            _ = news_tick.tick() => {
                let update = app.session.on_new_message_tick();
                app.apply(update);
                continue;
            }
            _ = tokio::time::sleep_until(search_due.unwrap_or_else(Instant::now)), if search_due.is_some() => {
                app.run_search();
                continue;
            }
            _ = tokio::time::sleep(timeout) => None,
        };

        match event {
            Some(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                last_key_time = Instant::now();
                let action = app.keymap.handle(key, app.mode);
                if let Err(e) = app.handle_action(action) {
                    warn!(error = %e, "action failed");
                    app.set_status(format!("Error: {}", e));
                }
            }
            Some(Event::Paste(text)) => app.handle_paste(text),
            _ => {}
        }
    }
    Ok(())
}
