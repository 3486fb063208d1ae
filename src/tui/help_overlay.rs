use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Clear, Widget},
};

use super::search_panel::centered_rect;

struct HelpSection {
    title: &'static str,
    keys: &'static [(&'static str, &'static str)],
}

const SECTIONS: &[HelpSection] = &[
    HelpSection {
        title: "Navigation",
        keys: &[
            ("j / Down", "Move down"),
            ("k / Up", "Move up"),
            ("gg", "Jump to top"),
            ("G", "Jump to bottom"),
            ("Ctrl+d", "Half page down"),
            ("Ctrl+u", "Half page up"),
            ("Enter / l", "Open conversation"),
            ("Tab", "Switch pane"),
            ("Esc / h", "Back to list"),
        ],
    },
    HelpSection {
        title: "Replying",
        keys: &[
            ("r / i", "Write a reply"),
            ("Enter", "Send (while writing)"),
            ("Alt+Enter", "New line"),
            ("a", "Attach a file"),
            ("A", "Send attachment"),
            ("X", "Remove attachment"),
            ("paste path", "Upload pasted file"),
        ],
    },
    HelpSection {
        title: "Conversation",
        keys: &[
            ("n", "Set alias"),
            ("d", "Delete message"),
            ("D", "Delete conversation"),
            ("y", "Copy message text"),
            ("o", "Open media"),
        ],
    },
    HelpSection {
        title: "Other",
        keys: &[
            ("/", "Search messages"),
            ("Ctrl+r", "Refresh"),
            ("?", "This help"),
            ("q", "Quit"),
        ],
    },
];

pub struct HelpOverlay {
    pub scroll: u16,
}

impl Widget for HelpOverlay {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let popup_width: u16 = 48;
        let popup_height: u16 = area.height.min(30).max(10);
        let popup = centered_rect(popup_width, popup_height, area);

        Clear.render(popup, buf);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Keyboard Shortcuts ")
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

        let key_col_width = 14;
        let title_style = Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD);
        let key_style = Style::default().fg(Color::Cyan);
        let desc_style = Style::default().fg(Color::White);

        // (key, description); a section title has no description.
        let mut lines: Vec<(String, Option<&str>)> = Vec::new();
        for (si, section) in SECTIONS.iter().enumerate() {
            if si > 0 {
                lines.push((String::new(), None));
            }
            lines.push((format!(" {}", section.title), None));
            for (key, desc) in section.keys {
                lines.push((format!("  {:width$}", key, width = key_col_width), Some(*desc)));
            }
        }

        let scroll = self.scroll as usize;
        let max_scroll = lines.len().saturating_sub(inner.height as usize);
        let scroll = scroll.min(max_scroll);

        for (i, (key, desc)) in lines.iter().skip(scroll).enumerate() {
            if i as u16 >= inner.height {
                break;
            }
            let y = inner.y + i as u16;
            match desc {
                Some(desc) => {
                    buf.set_stringn(inner.x, y, key, inner.width as usize, key_style);
                    let dx = key.len() as u16;
                    if dx < inner.width {
                        buf.set_stringn(
                            inner.x + dx,
                            y,
                            desc,
                            (inner.width - dx) as usize,
                            desc_style,
                        );
                    }
                }
                None => {
                    buf.set_stringn(inner.x, y, key, inner.width as usize, title_style);
                }
            }
        }
    }
}
