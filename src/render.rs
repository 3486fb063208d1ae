//! Turns one conversation's messages into a render plan: day separators,
//! per-message blocks and the current reply target.
//!
//! Pure: `today` is passed in, so the same input always gives the same plan.

use chrono::{Duration, NaiveDate};

use crate::model::{Direction, MediaKind, Message};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaBlock {
    Photo { path: String },
    Video { path: String },
    /// Voice notes and audio files share a player; `voice` picks the label.
    Audio { path: String, voice: bool },
    Document { path: String },
    Sticker { path: String },
    Generic { path: String, label: String },
}

impl MediaBlock {
    fn new(kind: Option<&MediaKind>, path: &str) -> Self {
        let path = path.to_string();
        match kind {
            Some(MediaKind::Photo) => MediaBlock::Photo { path },
            Some(MediaKind::Video) => MediaBlock::Video { path },
            Some(MediaKind::Voice) => MediaBlock::Audio { path, voice: true },
            Some(MediaKind::Audio) => MediaBlock::Audio { path, voice: false },
            Some(MediaKind::Document) => MediaBlock::Document { path },
            Some(MediaKind::Sticker) => MediaBlock::Sticker { path },
            Some(other @ MediaKind::Other(_)) => MediaBlock::Generic {
                path,
                label: other.title(),
            },
            None => MediaBlock::Generic {
                path,
                label: "Media".to_string(),
            },
        }
    }

    pub fn path(&self) -> &str {
        match self {
            MediaBlock::Photo { path }
            | MediaBlock::Video { path }
            | MediaBlock::Audio { path, .. }
            | MediaBlock::Document { path }
            | MediaBlock::Sticker { path }
            | MediaBlock::Generic { path, .. } => path,
        }
    }

    /// One-line description for a terminal: there is no inline player.
    pub fn caption(&self) -> String {
        match self {
            MediaBlock::Photo { .. } => "[photo] press o to view".to_string(),
            MediaBlock::Video { .. } => "[video] press o to play".to_string(),
            MediaBlock::Audio { voice: true, .. } => "[voice message] press o to play".to_string(),
            MediaBlock::Audio { voice: false, .. } => "[audio] press o to play".to_string(),
            MediaBlock::Document { .. } => "[document] press o to download".to_string(),
            MediaBlock::Sticker { .. } => "[sticker]".to_string(),
            MediaBlock::Generic { label, .. } => format!("[{}]", label.to_lowercase()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBlock {
    pub id: i64,
    pub direction: Direction,
    pub media: Option<MediaBlock>,
    pub text: Option<String>,
    pub time: String,
    /// Message id the delete action targets.
    pub delete_key: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderBlock {
    DateSeparator { label: String },
    Message(MessageBlock),
    NoMessages,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessagePlan {
    pub blocks: Vec<RenderBlock>,
    /// Most recent incoming message not yet answered.
    pub reply_target: Option<i64>,
}

impl MessagePlan {
    pub fn messages(&self) -> impl Iterator<Item = &MessageBlock> {
        self.blocks.iter().filter_map(|b| match b {
            RenderBlock::Message(m) => Some(m),
            _ => None,
        })
    }

    pub fn message_count(&self) -> usize {
        self.messages().count()
    }
}

pub fn build_render_plan(messages: &[Message], today: NaiveDate) -> MessagePlan {
    if messages.is_empty() {
        return MessagePlan {
            blocks: vec![RenderBlock::NoMessages],
            reply_target: None,
        };
    }

    let mut blocks = Vec::with_capacity(messages.len() + 4);
    // Day bucket of the previous message. Outer None means "nothing yet";
    // Some(None) is the bucket of unparseable timestamps.
    let mut current_day: Option<Option<NaiveDate>> = None;

    for msg in messages {
        let day = msg.timestamp.date();
        if current_day != Some(day) {
            current_day = Some(day);
            let label = match day {
                Some(d) => day_label(d, today),
                None => msg.timestamp.raw().to_string(),
            };
            blocks.push(RenderBlock::DateSeparator { label });
        }

        let media = msg
            .media_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| MediaBlock::new(msg.media_kind.as_ref(), p));

        blocks.push(RenderBlock::Message(MessageBlock {
            id: msg.id,
            direction: msg.direction,
            media,
            text: msg.text.clone().filter(|t| !t.is_empty()),
            time: msg.timestamp.time_of_day(),
            delete_key: msg.id,
        }));
    }

    MessagePlan {
        blocks,
        reply_target: reply_target(messages),
    }
}

/// Last incoming message with no outgoing message after it.
pub fn reply_target(messages: &[Message]) -> Option<i64> {
    let mut target = None;
    for msg in messages {
        target = msg.is_incoming().then_some(msg.id);
    }
    target
}

/// "Today", "Yesterday", a weekday name within the last week, else the full date.
pub fn day_label(day: NaiveDate, today: NaiveDate) -> String {
    if day == today {
        return "Today".to_string();
    }
    if Some(day) == today.checked_sub_signed(Duration::days(1)) {
        return "Yesterday".to_string();
    }
    let age = (today - day).num_days();
    if (0..7).contains(&age) {
        day.format("%A").to_string()
    } else {
        day.format("%B %-d, %Y").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Timestamp;

    fn msg(id: i64, direction: Direction, text: &str, ts: &str) -> Message {
        Message {
            id,
            user_id: 7,
            direction,
            text: Some(text.to_string()),
            media_path: None,
            media_kind: None,
            timestamp: Timestamp::parse(ts),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_list_gives_placeholder() {
        let plan = build_render_plan(&[], date(2024, 3, 5));
        assert_eq!(plan.blocks, vec![RenderBlock::NoMessages]);
        assert_eq!(plan.reply_target, None);
    }

    #[test]
    fn two_day_conversation() {
        let messages = vec![
            msg(1, Direction::Incoming, "hi", "2024-03-04 10:00:00"),
            msg(2, Direction::Outgoing, "hello", "2024-03-04 10:01:00"),
            msg(3, Direction::Incoming, "there", "2024-03-05 09:00:00"),
        ];
        let plan = build_render_plan(&messages, date(2024, 3, 5));

        let kinds: Vec<String> = plan
            .blocks
            .iter()
            .map(|b| match b {
                RenderBlock::DateSeparator { label } => format!("sep:{}", label),
                RenderBlock::Message(m) => format!("msg:{}", m.id),
                RenderBlock::NoMessages => "empty".to_string(),
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["sep:Yesterday", "msg:1", "msg:2", "sep:Today", "msg:3"]
        );
        assert_eq!(plan.reply_target, Some(3));
    }

    #[test]
    fn plan_is_deterministic() {
        let messages = vec![
            msg(1, Direction::Incoming, "a", "2024-02-01 08:00:00"),
            msg(2, Direction::Incoming, "b", "2024-03-01 08:00:00"),
        ];
        let today = date(2024, 3, 5);
        assert_eq!(
            build_render_plan(&messages, today),
            build_render_plan(&messages, today)
        );
    }

    #[test]
    fn answered_conversation_has_no_target() {
        let messages = vec![
            msg(1, Direction::Incoming, "a", "2024-03-05 08:00:00"),
            msg(2, Direction::Incoming, "b", "2024-03-05 08:01:00"),
            msg(3, Direction::Outgoing, "c", "2024-03-05 08:02:00"),
        ];
        assert_eq!(reply_target(&messages), None);
    }

    #[test]
    fn day_labels() {
        let today = date(2024, 3, 5); // Tuesday
        assert_eq!(day_label(today, today), "Today");
        assert_eq!(day_label(date(2024, 3, 4), today), "Yesterday");
        assert_eq!(day_label(date(2024, 3, 1), today), "Friday");
        assert_eq!(day_label(date(2024, 2, 20), today), "February 20, 2024");
        assert_eq!(day_label(date(2024, 3, 9), today), "March 9, 2024");
    }

    #[test]
    fn media_blocks_per_kind() {
        let mut m = msg(1, Direction::Incoming, "", "2024-03-05 08:00:00");
        m.text = None;
        m.media_path = Some("/static/uploads/a.ogg".into());
        m.media_kind = Some(MediaKind::Voice);
        let plan = build_render_plan(&[m.clone()], date(2024, 3, 5));
        let block = plan.messages().next().unwrap();
        assert_eq!(
            block.media,
            Some(MediaBlock::Audio {
                path: "/static/uploads/a.ogg".into(),
                voice: true
            })
        );
        assert!(block.text.is_none());

        m.media_kind = None;
        let plan = build_render_plan(&[m], date(2024, 3, 5));
        assert!(matches!(
            plan.messages().next().unwrap().media,
            Some(MediaBlock::Generic { .. })
        ));
    }

    #[test]
    fn unparseable_timestamps_share_a_bucket() {
        let messages = vec![
            msg(1, Direction::Incoming, "a", "garbage"),
            msg(2, Direction::Incoming, "b", "garbage"),
        ];
        let plan = build_render_plan(&messages, date(2024, 3, 5));
        assert_eq!(
            plan.blocks[0],
            RenderBlock::DateSeparator {
                label: "garbage".into()
            }
        );
        assert_eq!(plan.blocks.len(), 3);
        assert_eq!(plan.messages().next().unwrap().time, "garbage");
    }
}
