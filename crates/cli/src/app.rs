//! REPL presentation layer.
//!
//! Owns the chat core wired from [`Config`] and renders session state as plain
//! text lines. Every command writes its output to the supplied writer.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chat::catalog::filter_entries;
use chat::{
    CatalogSource, CompletionPipeline, CompletionProvider, CredentialContext, FileStore,
    KeyValueStore, ModelCatalog, OpenRouterClient, PendingSend, PipelineOptions, SendOutcome,
    SessionStore, SlotState,
};
use chrono::{Local, Utc};
use proto::{Message, Sender, SessionId};
use tracing::{debug, info};

use crate::command::{Command, HELP};
use crate::config::Config;

/// Whether the REPL keeps reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App {
    kv: Arc<dyn KeyValueStore>,
    pipeline: Arc<CompletionPipeline>,
    catalog: ModelCatalog,
    current: SessionId,
}

impl App {
    /// Builds the app against the configured endpoint and state file.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let path = config.storage.effective_path();
        debug!(path = %path.display(), "Opening state file");
        let kv: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(path));

        let mut client = OpenRouterClient::with_base_url(&config.api.base_url);
        if let Some(secs) = config.api.timeout_secs {
            client = client.with_timeout(Duration::from_secs(secs))?;
        }
        let client = Arc::new(client);
        Ok(Self::assemble(config, kv, client.clone(), client))
    }

    /// Wires the chat core from explicit collaborators.
    pub fn assemble(
        config: &Config,
        kv: Arc<dyn KeyValueStore>,
        provider: Arc<dyn CompletionProvider>,
        source: Arc<dyn CatalogSource>,
    ) -> Self {
        let credentials = Arc::new(CredentialContext::new(
            config.resolve_credentials(kv.as_ref()),
        ));
        let store = Arc::new(SessionStore::new());
        let options = PipelineOptions {
            mark_failed_messages: config.chat.mark_failed_messages,
        };
        let pipeline =
            Arc::new(CompletionPipeline::new(store, credentials, provider).with_options(options));
        let catalog = ModelCatalog::new(source).with_store(kv.clone());

        let current = SessionId::new();
        pipeline.store().create_or_select(&current);

        Self {
            kv,
            pipeline,
            catalog,
            current,
        }
    }

    pub fn current(&self) -> &SessionId {
        &self.current
    }

    pub fn pipeline(&self) -> &Arc<CompletionPipeline> {
        &self.pipeline
    }

    /// Makes `id` the current session, creating it when absent.
    pub fn switch_to(&mut self, id: SessionId) {
        self.pipeline.store().create_or_select(&id);
        self.current = id;
    }

    /// Drops the cached catalog for the current credential.
    pub fn refresh_models(&self) {
        self.catalog.invalidate(&self.pipeline.credentials().get().api_key);
    }

    pub async fn handle(&mut self, command: Command, out: &mut impl Write) -> anyhow::Result<Flow> {
        match command {
            Command::Send(text) => self.send(text, out).await?,
            Command::New(id) => {
                let id = id.map(SessionId::from).unwrap_or_default();
                self.switch_to(id);
                writeln!(out, "Session {}", self.current)?;
                self.render_session(out)?;
            }
            Command::Open(id) => {
                let id = SessionId::from(id);
                if self.pipeline.store().contains(&id) {
                    self.current = id;
                    writeln!(out, "Session {}", self.current)?;
                    self.render_session(out)?;
                } else {
                    writeln!(out, "Unknown session: {id}")?;
                }
            }
            Command::List => self.render_list(out)?,
            Command::Delete(id) => self.delete(id, out)?,
            Command::Clear => {
                self.pipeline.store().clear(&self.current);
                writeln!(out, "Cleared session {}", self.current)?;
            }
            Command::Models(query) => self.render_models(query.as_deref(), out).await?,
            Command::Model(id) => self.select_model(id, out)?,
            Command::Key(key) => {
                self.catalog.invalidate_all();
                self.pipeline.credentials().set_credential(key);
                writeln!(out, "API key updated. Use /save to persist it.")?;
            }
            Command::Save => self.save(out)?,
            Command::Status => self.render_status(out)?,
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Quit => return Ok(Flow::Quit),
            Command::Usage(usage) => writeln!(out, "{usage}")?,
            Command::Unknown(name) => writeln!(out, "Unknown command {name}. Type /help.")?,
        }
        Ok(Flow::Continue)
    }

    async fn send(&mut self, text: String, out: &mut impl Write) -> anyhow::Result<()> {
        writeln!(out, "assistant is typing...")?;
        out.flush()?;

        let PendingSend { mut handle, cancel } =
            self.pipeline.spawn_send(self.current.clone(), text);
        let joined = tokio::select! {
            joined = &mut handle => joined,
            Ok(()) = tokio::signal::ctrl_c() => {
                cancel.cancel();
                handle.await
            }
        };

        match joined? {
            Ok(SendOutcome::Delivered(reply)) => writeln!(out, "{}", render_message(&reply))?,
            Ok(SendOutcome::Failed(err)) => writeln!(out, "Error: {err}")?,
            Ok(SendOutcome::Discarded) => {
                writeln!(out, "Reply discarded: the session no longer exists.")?
            }
            Err(err) => writeln!(out, "Error: {err}")?,
        }
        Ok(())
    }

    fn delete(&mut self, id: Option<String>, out: &mut impl Write) -> anyhow::Result<()> {
        let target = id.map(SessionId::from).unwrap_or_else(|| self.current.clone());
        let store = self.pipeline.store();
        if !store.contains(&target) {
            writeln!(out, "Unknown session: {target}")?;
            return Ok(());
        }
        // An outstanding request keeps running; its reply is discarded.
        store.delete(&target);
        writeln!(out, "Deleted session {target}")?;

        if target == self.current {
            let next = store
                .list()
                .into_iter()
                .next()
                .map(|summary| summary.id)
                .unwrap_or_default();
            self.switch_to(next);
            writeln!(out, "Session {}", self.current)?;
        }
        Ok(())
    }

    fn select_model(&self, id: String, out: &mut impl Write) -> anyhow::Result<()> {
        let credentials = self.pipeline.credentials();
        let api_key = credentials.get().api_key;
        match self.catalog.select(&api_key, &id) {
            Some(entry) => writeln!(
                out,
                "Model set to {} ({})",
                entry.display_name(),
                entry.summary_line()
            )?,
            None if self.catalog.cached(&api_key).is_some() => {
                writeln!(out, "Model set to {id} (not in the loaded model list)")?
            }
            None => writeln!(out, "Model set to {id}")?,
        }
        credentials.set_model(id);
        Ok(())
    }

    fn save(&self, out: &mut impl Write) -> anyhow::Result<()> {
        let credentials = self.pipeline.credentials().get();
        if let Err(problems) = credentials.validate() {
            for problem in problems {
                writeln!(out, "Error: {problem}")?;
            }
            return Ok(());
        }
        match credentials.save_to(self.kv.as_ref()) {
            Ok(()) => {
                info!(model = %credentials.model, "Credentials saved");
                writeln!(out, "Settings saved.")?;
            }
            Err(err) => writeln!(out, "Error: failed to save settings: {err}")?,
        }
        Ok(())
    }

    fn render_session(&self, out: &mut impl Write) -> anyhow::Result<()> {
        let Some(session) = self.pipeline.store().session(&self.current) else {
            return Ok(());
        };
        for message in &session.messages {
            writeln!(out, "{}", render_message(message))?;
        }
        if session.is_loading {
            writeln!(out, "assistant is typing...")?;
        }
        if let Some(error) = &session.error {
            writeln!(out, "Error: {error}")?;
        }
        Ok(())
    }

    fn render_list(&self, out: &mut impl Write) -> anyhow::Result<()> {
        let sessions = self.pipeline.store().list();
        if sessions.is_empty() {
            writeln!(out, "No sessions.")?;
            return Ok(());
        }
        for summary in sessions {
            let marker = if summary.id == self.current { '*' } else { ' ' };
            let mut line = format!(
                "{marker} {} ({} messages, started {})",
                summary.id,
                summary.message_count,
                summary.created_at.with_timezone(&Local).format("%H:%M")
            );
            if let Some(preview) = &summary.last_message {
                line.push_str(&format!(" {preview}"));
            }
            if summary.is_loading {
                line.push_str(" [typing]");
            }
            if summary.error.is_some() {
                line.push_str(" [error]");
            }
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    async fn render_models(&self, query: Option<&str>, out: &mut impl Write) -> anyhow::Result<()> {
        let api_key = self.pipeline.credentials().get().api_key;
        let entries = match self.catalog.get(&api_key).await {
            Ok(entries) => entries,
            Err(err) => {
                writeln!(out, "Error: {err}")?;
                return Ok(());
            }
        };
        let entries = filter_entries(&entries, query.unwrap_or_default());
        if entries.is_empty() {
            writeln!(out, "No models found.")?;
            return Ok(());
        }
        let selected = self.pipeline.credentials().get().model;
        for entry in &entries {
            let marker = if entry.id == selected { '*' } else { ' ' };
            writeln!(out, "{marker} {}  {}", entry.id, entry.display_name())?;
            writeln!(out, "    {}", entry.summary_line())?;
        }
        writeln!(out, "{} models", entries.len())?;
        Ok(())
    }

    fn render_status(&self, out: &mut impl Write) -> anyhow::Result<()> {
        let credentials = self.pipeline.credentials().get();
        let store = self.pipeline.store();
        writeln!(out, "Session: {} ({} total)", self.current, store.len())?;
        if let Some(session) = store.session(&self.current) {
            writeln!(
                out,
                "Messages: {}  Loading: {}  Request in flight: {}",
                session.messages.len(),
                session.is_loading,
                self.pipeline.is_in_flight(&self.current)
            )?;
            if let Some(error) = &session.error {
                writeln!(out, "Last error: {error}")?;
            }
        }
        let key_state = if credentials.api_key.is_empty() {
            "not set"
        } else {
            "set"
        };
        writeln!(out, "API key: {key_state}")?;
        let model = if credentials.model.is_empty() {
            "(none)"
        } else {
            credentials.model.as_str()
        };
        writeln!(out, "Model: {model}")?;
        let catalog = match self.catalog.slot_state(&credentials.api_key, Utc::now()) {
            SlotState::Empty => "not loaded".to_string(),
            SlotState::Fetching => "loading".to_string(),
            SlotState::Fresh { fetched_at } => format!("fresh (fetched {fetched_at})"),
            SlotState::Stale { fetched_at } => format!("stale (fetched {fetched_at})"),
        };
        writeln!(out, "Model list: {catalog}")?;
        Ok(())
    }
}

/// One transcript line; delivery indicators are shown for user messages only.
pub fn render_message(message: &Message) -> String {
    match message.sender {
        Sender::User => format!(
            "[{}] you: {} {}",
            message.display_time(),
            message.text,
            message.status.indicator()
        ),
        Sender::Assistant => format!("[{}] assistant: {}", message.display_time(), message.text),
    }
}
