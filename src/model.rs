use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use std::fmt;

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// A relay timestamp: server-local wall-clock time, kept alongside the raw
/// string so unparseable values can still be shown as-is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Timestamp {
    raw: String,
    parsed: Option<NaiveDateTime>,
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

impl Timestamp {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let parsed = TIMESTAMP_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
            .or_else(|| {
                chrono::DateTime::parse_from_rfc3339(trimmed)
                    .ok()
                    .map(|dt| dt.naive_local())
            });
        Self {
            raw: raw.to_string(),
            parsed,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn datetime(&self) -> Option<NaiveDateTime> {
        self.parsed
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.parsed.map(|dt| dt.date())
    }

    /// `HH:MM`, or the raw string when it could not be parsed.
    pub fn time_of_day(&self) -> String {
        match self.parsed {
            Some(dt) => dt.format("%H:%M").to_string(),
            None => self.raw.clone(),
        }
    }

    /// Compact form for the chat list's date column.
    pub fn date_display(&self, now: NaiveDateTime) -> String {
        let Some(date) = self.parsed else {
            return self.raw.clone();
        };
        if now.date() == date.date() {
            date.format("%H:%M").to_string()
        } else if (now - date).num_days() < 7 {
            date.format("%a").to_string()
        } else if now.year() == date.year() {
            date.format("%b %-d").to_string()
        } else {
            date.format("%b %-d, %Y").to_string()
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        Ok(Timestamp::parse(&raw))
    }
}

/// SQLite hands booleans back as 0/1; accept either form (or null).
fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrBool {
        Bool(bool),
        Int(i64),
    }
    Ok(match Option::<IntOrBool>::deserialize(d)? {
        Some(IntOrBool::Bool(b)) => b,
        Some(IntOrBool::Int(n)) => n != 0,
        None => false,
    })
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Voice,
    Audio,
    Document,
    Sticker,
    Other(String),
}

impl MediaKind {
    pub fn from_name(s: &str) -> Self {
        match s {
            "photo" => MediaKind::Photo,
            "video" => MediaKind::Video,
            "voice" => MediaKind::Voice,
            "audio" => MediaKind::Audio,
            "document" => MediaKind::Document,
            "sticker" => MediaKind::Sticker,
            other => MediaKind::Other(other.to_string()),
        }
    }

    /// Chat-list preview label.
    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Photo => "📷 Photo",
            MediaKind::Video => "🎥 Video",
            MediaKind::Document => "📄 Document",
            MediaKind::Voice => "🎤 Voice",
            MediaKind::Audio => "🎵 Audio",
            MediaKind::Sticker => "🏷️ Sticker",
            MediaKind::Other(_) => "📎 Media",
        }
    }

    /// Capitalised kind name ("Photo", "Voice", ...).
    pub fn title(&self) -> String {
        let name = match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Voice => "voice",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
            MediaKind::Sticker => "sticker",
            MediaKind::Other(s) if !s.is_empty() => s.as_str(),
            MediaKind::Other(_) => "media",
        };
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

fn media_kind(has_media: bool, media_type: Option<&str>) -> Option<MediaKind> {
    if !has_media {
        return None;
    }
    Some(MediaKind::from_name(media_type.unwrap_or("")))
}

// ---------------------------------------------------------------------------
// Wire rows
// ---------------------------------------------------------------------------

/// One row of `GET /api/chats`: the latest message per user plus counters.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChatRow {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_message_text: Option<String>,
    #[serde(default)]
    pub last_message_time: Timestamp,
    #[serde(default, deserialize_with = "flag")]
    pub has_media: bool,
    pub media_type: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub is_replied: bool,
    pub reply_text: Option<String>,
    #[serde(default)]
    pub unread_count: u32,
    pub alias: Option<String>,
}

/// One row of `GET /api/messages/<user_id>`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MessageRow {
    pub id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub message_text: Option<String>,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(default, deserialize_with = "flag")]
    pub is_read: bool,
    #[serde(default, deserialize_with = "flag")]
    pub is_replied: bool,
    pub reply_text: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub has_media: bool,
    pub media_type: Option<String>,
    pub media_path: Option<String>,
    pub alias: Option<String>,
}

/// One row of `GET /api/search`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: i64,
    pub user_id: i64,
    pub first_name: Option<String>,
    pub message_text: Option<String>,
    pub reply_text: Option<String>,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(default, deserialize_with = "flag")]
    pub is_replied: bool,
    pub alias: Option<String>,
}

impl SearchHit {
    pub fn content(&self) -> &str {
        self.message_text
            .as_deref()
            .or(self.reply_text.as_deref())
            .unwrap_or("")
    }
}

/// `GET /api/new-messages`.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct NewMessages {
    #[serde(default, deserialize_with = "flag")]
    pub has_new: bool,
    #[serde(default)]
    pub user_ids: Vec<i64>,
}

/// Generic `{success, error?}` envelope returned by every mutating endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct ApiResponse {
    #[serde(default, deserialize_with = "flag")]
    pub success: bool,
    pub error: Option<String>,
    pub message_id: Option<i64>,
    pub file_path: Option<String>,
    pub updated: Option<i64>,
}

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Per-user row of the chat list. Replaced wholesale on every poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub user_id: i64,
    pub display_name: String,
    pub last_message_preview: String,
    pub last_message_time: Timestamp,
    pub unread_count: u32,
    pub has_media: bool,
    pub media_kind: Option<MediaKind>,
}

impl ConversationSummary {
    pub fn from_row(row: &ChatRow, display_name: String) -> Self {
        let media_kind = media_kind(row.has_media, row.media_type.as_deref());
        let last_message_preview = match (&media_kind, &row.reply_text) {
            (Some(kind), _) => kind.label().to_string(),
            (None, Some(reply)) if row.is_replied && !reply.is_empty() => {
                format!("You: {}", reply)
            }
            _ => row.last_message_text.clone().unwrap_or_default(),
        };
        Self {
            user_id: row.user_id,
            display_name,
            last_message_preview,
            last_message_time: row.last_message_time.clone(),
            unread_count: row.unread_count,
            has_media: row.has_media,
            media_kind,
        }
    }

    /// First letter of the display name, for the avatar column.
    pub fn initial(&self) -> char {
        self.display_name
            .chars()
            .next()
            .map(|c| c.to_uppercase().next().unwrap_or(c))
            .unwrap_or('?')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent by the Telegram user to the bot.
    Incoming,
    /// Operator reply.
    Outgoing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub user_id: i64,
    pub direction: Direction,
    pub text: Option<String>,
    pub media_path: Option<String>,
    pub media_kind: Option<MediaKind>,
    pub timestamp: Timestamp,
}

impl Message {
    pub fn is_incoming(&self) -> bool {
        self.direction == Direction::Incoming
    }
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        let direction = if row.is_replied {
            Direction::Outgoing
        } else {
            Direction::Incoming
        };
        let text = match direction {
            Direction::Outgoing => row.reply_text,
            Direction::Incoming => row.message_text,
        };
        let media_kind = media_kind(row.has_media, row.media_type.as_deref());
        Self {
            id: row.id,
            user_id: row.user_id,
            direction,
            text: text.filter(|t| !t.is_empty()),
            media_path: if row.has_media { row.media_path } else { None },
            media_kind,
            timestamp: row.timestamp,
        }
    }
}
