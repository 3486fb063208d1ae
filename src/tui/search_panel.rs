use chrono::NaiveDateTime;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Clear, Widget},
};
use std::collections::HashSet;
use unicode_width::UnicodeWidthStr;

use super::chat_list::truncate_str;
use crate::model::SearchHit;
use crate::search::{self, SearchGroup};

/// Compute a centered rectangle of the given width and height within `area`.
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect::new(x, y, w, h)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTarget {
    Open(i64),
    /// Show every hit for this user instead of the first few.
    Expand(i64),
}

#[derive(Debug, Clone, Copy)]
pub enum SearchRow<'a> {
    Header(&'a SearchGroup),
    Hit(&'a SearchHit),
    More { user_id: i64, hidden: usize },
}

impl<'a> SearchRow<'a> {
    pub fn target(&self) -> Option<SearchTarget> {
        match self {
            SearchRow::Header(_) => None,
            SearchRow::Hit(hit) => Some(SearchTarget::Open(hit.user_id)),
            SearchRow::More { user_id, .. } => Some(SearchTarget::Expand(*user_id)),
        }
    }
}

/// Flatten groups into display rows.
pub fn rows<'a>(groups: &'a [SearchGroup], expanded: &HashSet<i64>) -> Vec<SearchRow<'a>> {
    let mut out = Vec::new();
    for group in groups {
        out.push(SearchRow::Header(group));
        let open = expanded.contains(&group.user_id);
        let hits = if open { &group.hits[..] } else { group.preview() };
        out.extend(hits.iter().map(SearchRow::Hit));
        if !open && group.has_more() {
            out.push(SearchRow::More {
                user_id: group.user_id,
                hidden: group.total() - hits.len(),
            });
        }
    }
    out
}

/// Targets of the selectable rows, in display order.
pub fn targets(groups: &[SearchGroup], expanded: &HashSet<i64>) -> Vec<SearchTarget> {
    rows(groups, expanded)
        .iter()
        .filter_map(SearchRow::target)
        .collect()
}

pub struct SearchPanel<'a> {
    pub term: &'a str,
    pub groups: &'a [SearchGroup],
    pub expanded: &'a HashSet<i64>,
    /// Index among selectable rows.
    pub selected: usize,
    /// A search request is outstanding.
    pub searching: bool,
    pub now: NaiveDateTime,
}

impl<'a> Widget for SearchPanel<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let popup_width: u16 = area.width.saturating_sub(8).clamp(30, 80);
        let popup_height: u16 = area.height.saturating_sub(4).clamp(8, 30);
        let popup = centered_rect(popup_width, popup_height, area);

        Clear.render(popup, buf);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue))
            .title(" Search messages ")
            .title_style(
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            );
        block.render(popup, buf);

        let inner = Rect::new(
            popup.x + 1,
            popup.y + 1,
            popup.width.saturating_sub(2),
            popup.height.saturating_sub(2),
        );

        if inner.width == 0 || inner.height == 0 {
            return;
        }

        // Query input line with cursor
        let text_style = Style::default().fg(Color::White);
        buf.set_string(inner.x, inner.y, "> ", text_style);
        let shown = truncate_str(self.term, (inner.width as usize).saturating_sub(3));
        buf.set_string(inner.x + 2, inner.y, &shown, text_style);
        let cursor_x = inner.x + 2 + shown.width() as u16;
        if cursor_x < inner.x + inner.width {
            buf.set_string(cursor_x, inner.y, " ", Style::default().bg(Color::Gray));
        }

        if inner.height > 1 {
            let sep: String = "\u{2500}".repeat(inner.width as usize);
            buf.set_string(inner.x, inner.y + 1, &sep, Style::default().fg(Color::DarkGray));
        }

        let list_y = inner.y + 2;
        let list_height = inner.height.saturating_sub(2) as usize;
        if list_height == 0 {
            return;
        }

        let hint_style = Style::default().fg(Color::DarkGray);
        if !search::term_is_searchable(self.term) {
            buf.set_string(inner.x + 1, list_y, "Type at least 2 characters", hint_style);
            return;
        }
        if self.groups.is_empty() {
            let msg = if self.searching { "Searching\u{2026}" } else { "No results" };
            buf.set_string(inner.x + 1, list_y, msg, hint_style);
            return;
        }

        let all_rows = rows(self.groups, self.expanded);
        // Position of the selected row among all rows (headers included).
        let selected_row = all_rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.target().is_some())
            .nth(self.selected)
            .map(|(i, _)| i)
            .unwrap_or(0);
        let scroll_offset = (selected_row + 1).saturating_sub(list_height);

        for (i, row) in all_rows.iter().skip(scroll_offset).take(list_height).enumerate() {
            let y = list_y + i as u16;
            let is_selected = scroll_offset + i == selected_row;
            let base = if is_selected {
                Style::default().bg(Color::Blue).fg(Color::White)
            } else {
                Style::default()
            };
            if is_selected {
                buf.set_style(Rect::new(inner.x, y, inner.width, 1), base);
            }
            let width = inner.width as usize;

            match row {
                SearchRow::Header(group) => {
                    let count = if group.total() == 1 {
                        "1 match".to_string()
                    } else {
                        format!("{} matches", group.total())
                    };
                    let name = truncate_str(&group.name, width.saturating_sub(count.width() + 3));
                    buf.set_string(
                        inner.x,
                        y,
                        &name,
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    );
                    let cx = inner.x + name.width() as u16 + 2;
                    if cx < inner.x + inner.width {
                        buf.set_string(cx, y, &count, hint_style);
                    }
                }
                SearchRow::Hit(hit) => {
                    let date = hit.timestamp.date_display(self.now);
                    let date_x = inner.x + width.saturating_sub(date.width() + 1) as u16;
                    buf.set_string(date_x, y, &date, base.fg(Color::DarkGray));

                    let mut x = inner.x + 2;
                    let limit = date_x.saturating_sub(1);
                    let content = hit.content().lines().next().unwrap_or("");
                    let prefix = if hit.is_replied { "You: " } else { "" };
                    if !prefix.is_empty() && x < limit {
                        buf.set_string(x, y, prefix, base.fg(Color::Green));
                        x += prefix.width() as u16;
                    }
                    for seg in search::highlight(content, self.term) {
                        if x >= limit {
                            break;
                        }
                        let room = (limit - x) as usize;
                        let text = truncate_str(seg.text, room);
                        let style = if seg.matched {
                            base.fg(Color::Yellow).add_modifier(Modifier::BOLD)
                        } else {
                            base
                        };
                        buf.set_string(x, y, &text, style);
                        x += text.width() as u16;
                    }
                }
                SearchRow::More { hidden, .. } => {
                    let text = format!("  \u{2026} view all ({} more)", hidden);
                    buf.set_string(inner.x, y, &text, base.fg(Color::Blue).add_modifier(Modifier::ITALIC));
                }
            }
        }
    }
}
