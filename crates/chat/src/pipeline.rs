//! Completion request pipeline.
//!
//! Turns user input into one completion request per send and folds the outcome
//! back into the session store. Failures never escape as errors: they are
//! recorded on the session (`is_loading`, `error`) and reported through
//! [`SendOutcome`]. Only input that never reached the store is rejected with a
//! [`SessionError`].

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use proto::{CompletionError, Message, NewMessage, SessionError, SessionId};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::completion::{CompletionProvider, CompletionRequest};
use crate::credential::CredentialContext;
use crate::session::SessionStore;

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Move the user message to `error` when its request fails. When false the
    /// message stays `sending`.
    pub mark_failed_messages: bool,
}

/// Result of a send that made it into the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The assistant reply that was appended.
    Delivered(Message),
    /// The failure recorded on the session.
    Failed(CompletionError),
    /// The session was deleted before the outcome could be recorded.
    Discarded,
}

/// A send running on its own task.
pub struct PendingSend {
    pub handle: JoinHandle<Result<SendOutcome, SessionError>>,
    pub cancel: CancellationToken,
}

pub struct CompletionPipeline {
    store: Arc<SessionStore>,
    credentials: Arc<CredentialContext>,
    provider: Arc<dyn CompletionProvider>,
    in_flight: DashMap<SessionId, InFlight>,
    options: PipelineOptions,
}

/// Outstanding request of one session generation.
struct InFlight {
    generation: u64,
    cancel: CancellationToken,
}

impl CompletionPipeline {
    pub fn new(
        store: Arc<SessionStore>,
        credentials: Arc<CredentialContext>,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self {
            store,
            credentials,
            provider,
            in_flight: DashMap::new(),
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn credentials(&self) -> &Arc<CredentialContext> {
        &self.credentials
    }

    /// True while the live session under `id` has an outstanding request.
    pub fn is_in_flight(&self, id: &SessionId) -> bool {
        self.current(id, |_| ()).is_some()
    }

    /// Cancels the outstanding request of a session. Returns false when idle.
    pub fn cancel(&self, id: &SessionId) -> bool {
        self.current(id, |pending| pending.cancel.cancel()).is_some()
    }

    pub async fn send(&self, id: &SessionId, text: &str) -> Result<SendOutcome, SessionError> {
        self.send_with_cancel(id, text, CancellationToken::new())
            .await
    }

    /// Runs one send; cancelling `cancel` aborts the outbound request.
    pub async fn send_with_cancel(
        &self,
        id: &SessionId,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<SendOutcome, SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let generation = self
            .store
            .generation(id)
            .ok_or_else(|| SessionError::UnknownSession(id.clone()))?;
        let _slot = self.acquire(id, generation, cancel.clone())?;

        let user = self
            .store
            .begin_request(id, generation, NewMessage::user(text))?;
        let attempt = Attempt {
            id,
            generation,
            user: &user,
        };

        let credentials = self.credentials.get();
        if credentials.api_key.trim().is_empty() {
            return Ok(self.record_failure(&attempt, CompletionError::MissingCredential, false));
        }
        if credentials.model.trim().is_empty() {
            return Ok(self.record_failure(&attempt, CompletionError::MissingModel, false));
        }

        let request = CompletionRequest {
            api_key: credentials.api_key,
            model: credentials.model,
            prompt: user.text.clone(),
        };
        debug!(session = %id, message = %user.id, model = %request.model, "Dispatching completion");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CompletionError::Cancelled),
            result = self.provider.complete(request) => result,
        };

        Ok(match result {
            Ok(reply) => self.deliver(&attempt, reply),
            Err(err) => self.record_failure(&attempt, err, self.options.mark_failed_messages),
        })
    }

    /// Starts a send on a new task.
    pub fn spawn_send(self: &Arc<Self>, id: SessionId, text: impl Into<String>) -> PendingSend {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let pipeline = Arc::clone(self);
        let text = text.into();
        let handle =
            tokio::spawn(async move { pipeline.send_with_cancel(&id, &text, token).await });
        PendingSend { handle, cancel }
    }

    fn current<R>(&self, id: &SessionId, f: impl FnOnce(&InFlight) -> R) -> Option<R> {
        let generation = self.store.generation(id)?;
        let pending = self.in_flight.get(id)?;
        (pending.generation == generation).then(|| f(pending.value()))
    }

    fn acquire(
        &self,
        id: &SessionId,
        generation: u64,
        cancel: CancellationToken,
    ) -> Result<InFlightSlot<'_>, SessionError> {
        let pending = InFlight { generation, cancel };
        match self.in_flight.entry(id.clone()) {
            Entry::Occupied(mut slot) => {
                if slot.get().generation == generation {
                    debug!(session = %id, "Rejecting send while a request is in flight");
                    return Err(SessionError::RequestInFlight(id.clone()));
                }
                // Left behind by a deleted session that reused this id.
                slot.insert(pending);
            }
            Entry::Vacant(slot) => {
                slot.insert(pending);
            }
        }
        Ok(InFlightSlot {
            map: &self.in_flight,
            id: id.clone(),
            generation,
        })
    }

    fn deliver(&self, attempt: &Attempt<'_>, reply: String) -> SendOutcome {
        let id = attempt.id;
        match self.store.complete_request(
            id,
            attempt.generation,
            attempt.user.id,
            NewMessage::assistant(reply),
        ) {
            Ok(assistant) => {
                info!(session = %id, message = %assistant.id, "Completion delivered");
                SendOutcome::Delivered(assistant)
            }
            Err(err) => {
                warn!(session = %id, error = %err, "Discarding completion for missing session");
                SendOutcome::Discarded
            }
        }
    }

    fn record_failure(
        &self,
        attempt: &Attempt<'_>,
        err: CompletionError,
        mark_message: bool,
    ) -> SendOutcome {
        let id = attempt.id;
        if let Err(store_err) = self.store.fail_request(
            id,
            attempt.generation,
            attempt.user.id,
            err.to_string(),
            mark_message,
        ) {
            warn!(session = %id, error = %store_err, "Discarding failure for missing session");
            return SendOutcome::Discarded;
        }
        warn!(session = %id, error = %err, "Completion failed");
        SendOutcome::Failed(err)
    }
}

/// The session generation and user message a send is bound to.
struct Attempt<'a> {
    id: &'a SessionId,
    generation: u64,
    user: &'a Message,
}

/// Releases the per-session in-flight slot on drop, unless a newer session
/// generation has taken it over.
struct InFlightSlot<'a> {
    map: &'a DashMap<SessionId, InFlight>,
    id: SessionId,
    generation: u64,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.map
            .remove_if(&self.id, |_, pending| pending.generation == self.generation);
    }
}
