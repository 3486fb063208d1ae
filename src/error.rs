//! Typed errors for the relay API and the reply composer.
//!
//! Everything else in the crate uses `anyhow`; these two enums exist because
//! the session state machine has to match on them.

use thiserror::Error;

/// Failure talking to the relay.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request never completed (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx HTTP status.
    #[error("server returned {status}: {reason}")]
    Status { status: u16, reason: String },

    /// Body was not the JSON shape we expected.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Server answered `{"success": false, "error": ...}`.
    #[error("{0}")]
    Rejected(String),

    /// The session cookie is missing or expired (we got the login page back).
    #[error("not logged in")]
    Unauthenticated,
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            ApiError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            }
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

/// Input that is rejected before any request goes out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Invalid {
    #[error("reply is empty")]
    EmptyReply,
    #[error("no conversation selected")]
    NoConversation,
    #[error("no attachment selected")]
    NoAttachment,
    #[error("attachment is {size} bytes (limit {limit})")]
    AttachmentTooLarge { size: u64, limit: u64 },
    #[error("cannot read {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    #[error(transparent)]
    Validation(#[from] Invalid),

    /// Another submission is still in flight. Not queued.
    #[error("busy, try again")]
    Busy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_message_is_user_facing() {
        assert_eq!(ComposeError::Busy.to_string(), "busy, try again");
    }

    #[test]
    fn validation_is_transparent() {
        let e: ComposeError = Invalid::EmptyReply.into();
        assert_eq!(e.to_string(), "reply is empty");
    }

    #[test]
    fn rejected_shows_server_text() {
        let e = ApiError::Rejected("Message not found".into());
        assert_eq!(e.to_string(), "Message not found");
    }
}
