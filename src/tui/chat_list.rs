use chrono::NaiveDateTime;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::Widget,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::model::ConversationSummary;

pub struct ChatList<'a> {
    pub rows: &'a [ConversationSummary],
    /// Cursor row.
    pub cursor: usize,
    pub offset: usize,
    /// Conversation open in the message pane.
    pub open: Option<i64>,
    pub focused: bool,
    pub now: NaiveDateTime,
}

impl<'a> ChatList<'a> {
    /// Calculate the visible range for scrolling.
    pub fn visible_range(
        selected: usize,
        offset: usize,
        height: usize,
        total: usize,
    ) -> (usize, usize) {
        let mut off = offset;
        if selected < off {
            off = selected;
        }
        if selected >= off + height {
            off = selected + 1 - height;
        }
        let end = (off + height).min(total);
        (off, end)
    }
}

impl<'a> Widget for ChatList<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width == 0 {
            return;
        }
        if self.rows.is_empty() {
            let style = Style::default().fg(Color::DarkGray);
            buf.set_string(
                area.x + 2,
                area.y + area.height / 2,
                "No conversations",
                style,
            );
            return;
        }

        let height = area.height as usize;
        let (start, end) = Self::visible_range(self.cursor, self.offset, height, self.rows.len());

        for (i, chat) in self.rows[start..end].iter().enumerate() {
            let y = area.y + i as u16;
            let idx = start + i;
            let is_cursor = idx == self.cursor;
            let is_open = self.open == Some(chat.user_id);
            let is_unread = chat.unread_count > 0;

            let base_style = match (is_cursor, self.focused) {
                (true, true) => Style::default().bg(Color::Indexed(236)).fg(Color::White),
                (true, false) => Style::default().bg(Color::Indexed(234)),
                _ => Style::default(),
            };
            buf.set_style(Rect::new(area.x, y, area.width, 1), base_style);

            let w = area.width as usize;

            // Open-conversation marker
            let marker = if is_open { "▌" } else { " " };
            buf.set_string(area.x, y, marker, base_style.fg(Color::Blue));

            // Avatar initial
            let initial = chat.initial().to_string();
            buf.set_string(
                area.x + 1,
                y,
                &initial,
                base_style.fg(Color::Cyan).add_modifier(Modifier::BOLD),
            );

            // Right edge: unread badge, then date
            let badge = if is_unread {
                format!(" {} ", chat.unread_count.min(999))
            } else {
                String::new()
            };
            let date = chat.last_message_time.date_display(self.now);
            let right_width = badge.width() + date.width() + 1;
            let right_x = area.x + w.saturating_sub(right_width) as u16;
            if w > right_width + 4 {
                buf.set_string(right_x, y, &date, base_style.fg(Color::DarkGray));
                if !badge.is_empty() {
                    buf.set_string(
                        right_x + date.width() as u16 + 1,
                        y,
                        &badge,
                        Style::default()
                            .bg(Color::Blue)
                            .fg(Color::White)
                            .add_modifier(Modifier::BOLD),
                    );
                }
            }

            // Name (up to 18 columns)
            let name_x = area.x + 3;
            let name_width = 18.min(w.saturating_sub(3 + right_width + 1));
            let name = truncate_str(&chat.display_name, name_width);
            let name_style = if is_unread {
                base_style.add_modifier(Modifier::BOLD)
            } else {
                base_style
            };
            buf.set_string(name_x, y, &name, name_style);

            // Preview fills the middle
            let preview_start = name_x + name_width as u16 + 1;
            let preview_end = right_x.saturating_sub(1);
            if preview_start < preview_end {
                let preview_width = (preview_end - preview_start) as usize;
                let preview = truncate_str(&chat.last_message_preview, preview_width);
                let preview_style = if is_unread {
                    base_style
                } else {
                    base_style.fg(Color::Gray)
                };
                buf.set_string(preview_start, y, &preview, preview_style);
            }
        }
    }
}

/// Truncate a string to fit within `max_width` terminal columns, adding "…" if needed.
pub fn truncate_str(s: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    let line = s.lines().next().unwrap_or("");
    if line.width() <= max_width && line.len() == s.len() {
        return s.to_string();
    }
    if max_width <= 1 {
        return "\u{2026}".to_string();
    }
    let mut result = String::new();
    let mut used = 0;
    for c in line.chars() {
        let cw = c.width().unwrap_or(0);
        if used + cw > max_width - 1 {
            break;
        }
        used += cw;
        result.push(c);
    }
    result.push('\u{2026}');
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Timestamp;

    #[test]
    fn visible_range_follows_cursor() {
        assert_eq!(ChatList::visible_range(0, 0, 5, 20), (0, 5));
        assert_eq!(ChatList::visible_range(7, 0, 5, 20), (3, 8));
        assert_eq!(ChatList::visible_range(2, 3, 5, 20), (2, 7));
        assert_eq!(ChatList::visible_range(1, 0, 5, 3), (0, 3));
    }

    #[test]
    fn truncate_by_width() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 6), "hello…");
        assert_eq!(truncate_str("日本語テキスト", 5), "日本…");
        assert_eq!(truncate_str("two\nlines", 20), "two…");
        assert_eq!(truncate_str("x", 0), "");
    }

    #[test]
    fn renders_name_preview_and_badge() {
        let rows = vec![ConversationSummary {
            user_id: 1,
            display_name: "Quinn (Visitor)".into(),
            last_message_preview: "where is my order".into(),
            last_message_time: Timestamp::parse("2024-03-05 09:15:00"),
            unread_count: 3,
            has_media: false,
            media_kind: None,
        }];
        let now = NaiveDateTime::parse_from_str("2024-03-05 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let area = Rect::new(0, 0, 60, 2);
        let mut buf = Buffer::empty(area);
        ChatList {
            rows: &rows,
            cursor: 0,
            offset: 0,
            open: Some(1),
            focused: true,
            now,
        }
        .render(area, &mut buf);

        let line: String = (0..area.width)
            .map(|x| buf[(x, 0)].symbol().to_string())
            .collect();
        assert!(line.contains("Quinn (Visitor)"));
        assert!(line.contains("where is my order"));
        assert!(line.contains("09:15"));
        assert!(line.contains(" 3 "));
    }
}
