use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Widget,
};
use unicode_width::UnicodeWidthStr;

use crate::keymap::InputMode;

pub struct TopBar<'a> {
    /// Relay base URL.
    pub server: &'a str,
    /// Name of the open conversation.
    pub conversation: Option<&'a str>,
    pub unread_count: u32,
    pub total_count: usize,
    /// A request is outstanding.
    pub busy: bool,
}

impl<'a> Widget for TopBar<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let style = Style::default().bg(Color::DarkGray).fg(Color::White);
        buf.set_style(area, style);

        let left = format!(" {} ", self.server);
        let mut spans = vec![Span::styled(
            left,
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )];
        if let Some(name) = self.conversation {
            spans.push(Span::styled(format!(" {} ", name), style.add_modifier(Modifier::BOLD)));
        }
        buf.set_line(area.x, area.y, &Line::from(spans), area.width);

        let right = match (self.busy, self.unread_count) {
            (true, _) => " \u{27f3} ".to_string(),
            (false, 0) => format!(" {} conversations ", self.total_count),
            (false, n) => format!(" {} unread / {} conversations ", n, self.total_count),
        };
        let right_len = right.width() as u16;
        if area.width > right_len + 20 {
            let rx = area.x + area.width - right_len;
            buf.set_string(rx, area.y, &right, style);
        }
    }
}

pub struct BottomBar<'a> {
    pub mode: InputMode,
    pub pending_key: Option<&'a str>,
    /// `(label, text)` for one-line prompts and the search box.
    pub input: Option<(&'a str, &'a str)>,
    pub status_message: Option<&'a str>,
}

impl<'a> BottomBar<'a> {
    fn hints(mode: InputMode) -> &'static str {
        match mode {
            InputMode::List => "enter:open  r:reply  a:attach  n:alias  D:delete  /:search  ?:help  q:quit",
            InputMode::Messages => {
                "j/k:move  r:reply  d:delete  y:yank  o:open media  esc:list  ?:help"
            }
            InputMode::Compose => "enter:send  alt+enter:newline  esc:leave",
            InputMode::Search => "enter:open  up/down:select  esc:close",
            InputMode::Prompt => "enter:ok  esc:cancel",
            InputMode::Confirm => "y:yes  n:no",
            InputMode::Help => "j/k:scroll  esc:close",
        }
    }
}

impl<'a> Widget for BottomBar<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let style = Style::default().bg(Color::DarkGray).fg(Color::White);
        buf.set_style(area, style);

        if let Some((label, text)) = self.input {
            let line = Line::from(vec![
                Span::styled(format!(" {} ", label), style.fg(Color::Yellow)),
                Span::styled(text.to_string(), style),
                Span::styled(" ", Style::default().bg(Color::Gray)),
            ]);
            buf.set_line(area.x, area.y, &line, area.width);
            return;
        }

        let text = match (self.status_message, self.pending_key) {
            (Some(msg), _) => format!(" {}", msg),
            (None, Some(pending)) => format!(" {}\u{2026} | {}", pending, Self::hints(self.mode)),
            (None, None) => format!(" {}", Self::hints(self.mode)),
        };
        buf.set_stringn(area.x, area.y, &text, area.width as usize, style);
    }
}
