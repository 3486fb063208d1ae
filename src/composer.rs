//! Reply composer: draft text, one optional pending attachment, and the
//! single-flight gate shared by text replies, attachment uploads and pasted
//! uploads.
//!
//! The composer never does I/O. Accepting a submission hands back a ticketed
//! [`SendRequest`]; the caller runs it and reports the outcome with
//! [`Composer::finish`].

use std::fmt;
use std::path::Path;

use crate::error::{ComposeError, Invalid};

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

impl Attachment {
    pub fn from_bytes(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .to_string();
        Self {
            file_name,
            mime_type,
            data,
        }
    }

    /// Read a file chosen by the operator, enforcing the upload size limit.
    pub fn from_path(path: &Path, max_bytes: u64) -> Result<Self, Invalid> {
        let unreadable = |reason: String| Invalid::Unreadable {
            path: path.display().to_string(),
            reason,
        };
        let meta = std::fs::metadata(path).map_err(|e| unreadable(e.to_string()))?;
        if !meta.is_file() {
            return Err(unreadable("not a regular file".to_string()));
        }
        if meta.len() > max_bytes {
            return Err(Invalid::AttachmentTooLarge {
                size: meta.len(),
                limit: max_bytes,
            });
        }
        let data = std::fs::read(path).map_err(|e| unreadable(e.to_string()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        Ok(Self::from_bytes(file_name, data))
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

// ---------------------------------------------------------------------------
// Submissions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    File(Attachment),
}

/// One accepted submission, to be sent exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub ticket: Ticket,
    pub user_id: i64,
    pub payload: Payload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Draft,
    PendingAttachment,
    Pasted,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    ticket: Ticket,
    source: Source,
    user_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposerStatus {
    Idle,
    Submitting,
    AttachmentPending,
}

/// Refetch both the chat list and this conversation's messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Refresh {
    pub user_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finished {
    Sent(Refresh),
    Failed { error: String },
    /// Ticket did not match the submission in flight.
    Ignored,
}

#[derive(Debug, Default)]
pub struct Composer {
    draft: String,
    attachment: Option<Attachment>,
    in_flight: Option<InFlight>,
    last_error: Option<String>,
    next_ticket: u64,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ComposerStatus {
        if self.in_flight.is_some() {
            ComposerStatus::Submitting
        } else if self.attachment.is_some() {
            ComposerStatus::AttachmentPending
        } else {
            ComposerStatus::Idle
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Input is disabled while a submission is in flight.
    pub fn accepts_input(&self) -> bool {
        !self.is_submitting()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Replace the draft text. Refused while submitting.
    pub fn set_draft(&mut self, text: impl Into<String>) -> bool {
        if !self.accepts_input() {
            return false;
        }
        self.draft = text.into();
        true
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn submit_reply(&mut self, target: Option<i64>) -> Result<SendRequest, ComposeError> {
        self.ensure_idle()?;
        let user_id = target.ok_or(Invalid::NoConversation)?;
        let text = self.draft.trim();
        if text.is_empty() {
            return Err(Invalid::EmptyReply.into());
        }
        let payload = Payload::Text(text.to_string());
        Ok(self.begin(Source::Draft, user_id, payload))
    }

    /// Queue a file, replacing any previous one.
    pub fn select_attachment(&mut self, file: Option<Attachment>) -> Result<(), ComposeError> {
        self.ensure_idle()?;
        let file = file.ok_or(Invalid::NoAttachment)?;
        self.attachment = Some(file);
        Ok(())
    }

    pub fn remove_attachment(&mut self) -> Result<(), ComposeError> {
        self.ensure_idle()?;
        self.attachment = None;
        Ok(())
    }

    pub fn submit_attachment(&mut self, target: Option<i64>) -> Result<SendRequest, ComposeError> {
        self.ensure_idle()?;
        let file = self.attachment.clone().ok_or(Invalid::NoAttachment)?;
        let user_id = target.ok_or(Invalid::NoConversation)?;
        Ok(self.begin(Source::PendingAttachment, user_id, Payload::File(file)))
    }

    /// Upload a pasted file straight away, leaving the pending slot alone.
    pub fn submit_pasted(
        &mut self,
        file: Attachment,
        target: Option<i64>,
    ) -> Result<SendRequest, ComposeError> {
        self.ensure_idle()?;
        let user_id = target.ok_or(Invalid::NoConversation)?;
        Ok(self.begin(Source::Pasted, user_id, Payload::File(file)))
    }

    pub fn finish(&mut self, ticket: Ticket, result: Result<(), String>) -> Finished {
        let Some(flight) = self.in_flight.filter(|f| f.ticket == ticket) else {
            return Finished::Ignored;
        };
        self.in_flight = None;
        match result {
            Ok(()) => {
                match flight.source {
                    Source::Draft => self.draft.clear(),
                    Source::PendingAttachment => self.attachment = None,
                    Source::Pasted => {}
                }
                self.last_error = None;
                Finished::Sent(Refresh {
                    user_id: flight.user_id,
                })
            }
            Err(error) => {
                self.last_error = Some(error.clone());
                Finished::Failed { error }
            }
        }
    }

    /// Drop the pending attachment and error after the conversation is gone.
    /// The draft survives: it is the operator's text. An upload already in
    /// flight carries its own copy of the file, so a failure after the switch
    /// cannot leave the old conversation's file queued for the new one.
    pub fn reset_for_conversation_change(&mut self) {
        self.attachment = None;
        self.last_error = None;
    }

    fn ensure_idle(&self) -> Result<(), ComposeError> {
        if self.is_submitting() {
            Err(ComposeError::Busy)
        } else {
            Ok(())
        }
    }

    fn begin(&mut self, source: Source, user_id: i64, payload: Payload) -> SendRequest {
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        self.in_flight = Some(InFlight {
            ticket,
            source,
            user_id,
        });
        self.last_error = None;
        SendRequest {
            ticket,
            user_id,
            payload,
        }
    }
}
