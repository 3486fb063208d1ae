use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::Widget,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::chat_list::truncate_str;
use crate::model::Direction;
use crate::render::{MessagePlan, RenderBlock};

/// One pre-computed screen line of the conversation.
pub struct ViewLine {
    /// Spans to render: (text, style) pairs
    content: Vec<(String, Style)>,
    /// Which message (0-based, in plan order) this line belongs to.
    msg_index: Option<usize>,
    indent: u16,
}

impl ViewLine {
    fn chrome(text: String, style: Style, indent: u16) -> Self {
        Self {
            content: vec![(text, style)],
            msg_index: None,
            indent,
        }
    }
}

/// Lay out a render plan for a pane `width` columns wide.
pub fn build_lines(plan: &MessagePlan, sender: &str, width: u16) -> Vec<ViewLine> {
    let width = width.max(8);
    let mut lines = Vec::new();
    let mut msg_index = 0;

    for block in &plan.blocks {
        match block {
            RenderBlock::DateSeparator { label } => {
                let label = format!(" {} ", label);
                let side = (width as usize).saturating_sub(label.width() + 2) / 2;
                let rule = "\u{2500}".repeat(side);
                lines.push(ViewLine::chrome(
                    format!("{}{}{}", rule, label, rule),
                    Style::default().fg(Color::DarkGray),
                    1,
                ));
                lines.push(ViewLine::chrome(String::new(), Style::default(), 0));
            }
            RenderBlock::NoMessages => {
                lines.push(ViewLine::chrome(
                    "No messages yet".to_string(),
                    Style::default().fg(Color::DarkGray),
                    2,
                ));
            }
            RenderBlock::Message(msg) => {
                let outgoing = msg.direction == Direction::Outgoing;
                // Operator replies sit in the right-hand part of the pane.
                let indent = if outgoing { width / 4 } else { 1 };
                let body_width = (width - indent).saturating_sub(2).max(4) as usize;

                let (who, who_style) = if outgoing {
                    ("You".to_string(), Style::default().fg(Color::Green))
                } else {
                    (sender.to_string(), Style::default().fg(Color::Cyan))
                };
                let mut header = vec![
                    (who, who_style.add_modifier(Modifier::BOLD)),
                    (format!("  {}", msg.time), Style::default().fg(Color::DarkGray)),
                ];
                if plan.reply_target == Some(msg.id) {
                    header.push((
                        "  \u{21a9} awaiting reply".to_string(),
                        Style::default().fg(Color::Yellow),
                    ));
                }
                lines.push(ViewLine {
                    content: header,
                    msg_index: Some(msg_index),
                    indent,
                });

                if let Some(media) = &msg.media {
                    lines.push(ViewLine {
                        content: vec![(media.caption(), Style::default().fg(Color::Magenta))],
                        msg_index: Some(msg_index),
                        indent,
                    });
                }
                if let Some(text) = &msg.text {
                    for row in wrap(text, body_width) {
                        lines.push(ViewLine {
                            content: vec![(row, Style::default().fg(Color::White))],
                            msg_index: Some(msg_index),
                            indent,
                        });
                    }
                }
                lines.push(ViewLine::chrome(String::new(), Style::default(), 0));
                msg_index += 1;
            }
        }
    }
    lines
}

/// Greedy word wrap by display width; words wider than a line are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::new();
    for para in text.split('\n') {
        let mut line = String::new();
        let mut line_width = 0;
        for word in para.split(' ') {
            let ww = word.width();
            let sep = usize::from(!line.is_empty());
            if line_width + sep + ww <= width {
                if sep == 1 {
                    line.push(' ');
                }
                line.push_str(word);
                line_width += sep + ww;
                continue;
            }
            if !line.is_empty() {
                out.push(std::mem::take(&mut line));
                line_width = 0;
            }
            for c in word.chars() {
                let cw = c.width().unwrap_or(0);
                if line_width + cw > width {
                    out.push(std::mem::take(&mut line));
                    line_width = 0;
                }
                line.push(c);
                line_width += cw;
            }
        }
        out.push(line);
    }
    out
}

pub struct MessageView<'a> {
    pub lines: &'a [ViewLine],
    /// Message under the cursor (index in plan order).
    pub cursor: Option<usize>,
    pub scroll: usize,
    /// Shown when there are no lines.
    pub placeholder: &'a str,
    pub focused: bool,
}

impl<'a> MessageView<'a> {
    /// Scroll offset that keeps the cursor message on screen.
    ///
    /// With no cursor, clamp `scroll` so the pane is never scrolled past the end.
    pub fn scroll_for(lines: &[ViewLine], cursor: Option<usize>, scroll: usize, height: usize) -> usize {
        let max_scroll = lines.len().saturating_sub(height);
        let Some(cursor) = cursor else {
            return scroll.min(max_scroll);
        };
        let first = lines.iter().position(|l| l.msg_index == Some(cursor));
        let last = lines.iter().rposition(|l| l.msg_index == Some(cursor));
        let (Some(first), Some(last)) = (first, last) else {
            return scroll.min(max_scroll);
        };
        let mut off = scroll;
        if last + 1 > off + height {
            off = (last + 1).saturating_sub(height);
        }
        if first < off {
            off = first;
        }
        off.min(max_scroll.max(first))
    }

    /// Offset that shows the bottom of the conversation.
    pub fn bottom(lines: &[ViewLine], height: usize) -> usize {
        lines.len().saturating_sub(height)
    }
}

impl<'a> Widget for MessageView<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.height == 0 || area.width == 0 {
            return;
        }
        if self.lines.is_empty() {
            let style = Style::default().fg(Color::DarkGray);
            buf.set_string(area.x + 2, area.y + area.height / 2, self.placeholder, style);
            return;
        }

        let visible_height = area.height as usize;
        for (row, line) in self.lines.iter().skip(self.scroll).take(visible_height).enumerate() {
            let y = area.y + row as u16;

            // Highlight the cursor message
            if line.msg_index.is_some() && line.msg_index == self.cursor {
                let bg = if self.focused {
                    Color::Indexed(236)
                } else {
                    Color::Indexed(234)
                };
                buf.set_style(Rect::new(area.x, y, area.width, 1), Style::default().bg(bg));
            }

            let mut x = area.x + line.indent.min(area.width);
            for (text, style) in &line.content {
                let max_width = (area.x + area.width).saturating_sub(x) as usize;
                if max_width == 0 {
                    break;
                }
                let truncated = truncate_str(text, max_width);
                buf.set_string(x, y, &truncated, *style);
                x += truncated.width() as u16;
            }
        }
    }
}
