//! In-memory session store.
//!
//! The store owns every session and its message log. Each operation takes the
//! write lock once, so a read-modify-write is observed as a single step and
//! mutations never interleave. The store does not police concurrent requests;
//! that is the pipeline's job.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use proto::{Message, MessageId, MessageStatus, NewMessage, SessionError, SessionId};
use tracing::{debug, info};

const PREVIEW_CHARS: usize = 60;

/// State of one chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    /// Messages in chronological order.
    pub messages: Vec<Message>,
    /// True while a completion request is outstanding.
    pub is_loading: bool,
    /// Description of the last failure, if any.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    seq: u64,
    next_message_id: u64,
}

impl Session {
    fn new(id: SessionId, seq: u64) -> Self {
        Self {
            id,
            messages: Vec::new(),
            is_loading: false,
            error: None,
            created_at: Utc::now(),
            seq,
            next_message_id: 1,
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    fn push(&mut self, draft: NewMessage) -> Message {
        let message = Message::from_new(MessageId(self.next_message_id), draft);
        self.next_message_id += 1;
        self.messages.push(message.clone());
        message
    }
}

/// Row for the session list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub message_count: usize,
    pub last_message: Option<String>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<SessionId, Session>,
    next_seq: u64,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    inner: RwLock<Inner>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an empty session when `id` is unknown; otherwise does nothing.
    pub fn create_or_select(&self, id: &SessionId) {
        let mut inner = self.inner.write();
        if inner.sessions.contains_key(id) {
            return;
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.sessions.insert(id.clone(), Session::new(id.clone(), seq));
        info!(session = %id, "Session created");
    }

    /// Removes the session; absent ids are ignored.
    pub fn delete(&self, id: &SessionId) {
        if self.inner.write().sessions.remove(id).is_some() {
            info!(session = %id, "Session deleted");
        }
    }

    /// Empties the message log and resets both flags. No-op for unknown ids.
    ///
    /// Message ids keep counting up after a clear.
    pub fn clear(&self, id: &SessionId) {
        let mut inner = self.inner.write();
        if let Some(session) = inner.sessions.get_mut(id) {
            session.messages.clear();
            session.is_loading = false;
            session.error = None;
            debug!(session = %id, "Session cleared");
        }
    }

    /// Appends to the tail of the log and returns the stored message.
    pub fn append(&self, id: &SessionId, draft: NewMessage) -> Result<Message, SessionError> {
        let mut inner = self.inner.write();
        let session = inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::UnknownSession(id.clone()))?;
        let message = session.push(draft);
        debug!(
            session = %id,
            message = %message.id,
            sender = %message.sender,
            "Message appended"
        );
        Ok(message)
    }

    pub fn set_loading(&self, id: &SessionId, value: bool) -> Result<(), SessionError> {
        self.with_session(id, |session| session.is_loading = value)
    }

    pub fn set_error(&self, id: &SessionId, error: Option<String>) -> Result<(), SessionError> {
        self.with_session(id, |session| session.error = error)
    }

    /// Updates the delivery status of one message.
    pub fn set_message_status(
        &self,
        id: &SessionId,
        message: MessageId,
        status: MessageStatus,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.write();
        let session = inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::UnknownSession(id.clone()))?;
        let target = session
            .messages
            .iter_mut()
            .find(|m| m.id == message)
            .ok_or_else(|| SessionError::UnknownMessage {
                session: id.clone(),
                message,
            })?;
        target.status = status;
        Ok(())
    }

    /// Insertion number of the live session under `id`.
    ///
    /// Numbers are store-wide and never reused, so a session that is deleted
    /// and created again under the same id gets a new one.
    pub fn generation(&self, id: &SessionId) -> Option<u64> {
        self.inner.read().sessions.get(id).map(|s| s.seq)
    }

    /// Appends the user's message, raises `is_loading` and clears `error` in
    /// one write section.
    pub fn begin_request(
        &self,
        id: &SessionId,
        generation: u64,
        draft: NewMessage,
    ) -> Result<Message, SessionError> {
        let mut inner = self.inner.write();
        let session = live_session(&mut inner, id, generation)?;
        let message = session.push(draft);
        session.is_loading = true;
        session.error = None;
        debug!(session = %id, message = %message.id, "Request started");
        Ok(message)
    }

    /// Appends the reply, lowers `is_loading` and marks `user` delivered.
    ///
    /// Fails with `UnknownSession` when the session the request was started
    /// against is gone, even if a new one now uses the same id.
    pub fn complete_request(
        &self,
        id: &SessionId,
        generation: u64,
        user: MessageId,
        reply: NewMessage,
    ) -> Result<Message, SessionError> {
        let mut inner = self.inner.write();
        let session = live_session(&mut inner, id, generation)?;
        let message = session.push(reply);
        session.is_loading = false;
        // The user message is missing when the session was cleared mid-flight.
        if let Some(target) = session.messages.iter_mut().find(|m| m.id == user) {
            target.status = MessageStatus::Delivered;
        }
        Ok(message)
    }

    /// Lowers `is_loading` and records `error`, optionally marking `user` as
    /// failed. Same generation check as [`complete_request`](Self::complete_request).
    pub fn fail_request(
        &self,
        id: &SessionId,
        generation: u64,
        user: MessageId,
        error: String,
        mark_message: bool,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.write();
        let session = live_session(&mut inner, id, generation)?;
        session.is_loading = false;
        session.error = Some(error);
        if mark_message
            && let Some(target) = session.messages.iter_mut().find(|m| m.id == user)
        {
            target.status = MessageStatus::Error;
        }
        Ok(())
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.inner.read().sessions.contains_key(id)
    }

    /// Snapshot of one session.
    pub fn session(&self, id: &SessionId) -> Option<Session> {
        self.inner.read().sessions.get(id).cloned()
    }

    pub fn messages(&self, id: &SessionId) -> Option<Vec<Message>> {
        self.inner
            .read()
            .sessions
            .get(id)
            .map(|s| s.messages.clone())
    }

    /// All sessions, newest first.
    pub fn list(&self) -> Vec<SessionSummary> {
        let inner = self.inner.read();
        let mut sessions: Vec<&Session> = inner.sessions.values().collect();
        sessions.sort_by(|a, b| b.seq.cmp(&a.seq));
        sessions
            .into_iter()
            .map(|s| SessionSummary {
                id: s.id.clone(),
                message_count: s.messages.len(),
                last_message: s.last_message().map(|m| preview(&m.text)),
                is_loading: s.is_loading,
                error: s.error.clone(),
                created_at: s.created_at,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().sessions.is_empty()
    }

    fn with_session(
        &self,
        id: &SessionId,
        update: impl FnOnce(&mut Session),
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.write();
        let session = inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::UnknownSession(id.clone()))?;
        update(session);
        Ok(())
    }
}

fn live_session<'a>(
    inner: &'a mut Inner,
    id: &SessionId,
    generation: u64,
) -> Result<&'a mut Session, SessionError> {
    inner
        .sessions
        .get_mut(id)
        .filter(|s| s.seq == generation)
        .ok_or_else(|| SessionError::UnknownSession(id.clone()))
}

fn preview(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.chars().count() > PREVIEW_CHARS {
        let cut: String = first_line.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}…")
    } else {
        first_line.to_string()
    }
}
