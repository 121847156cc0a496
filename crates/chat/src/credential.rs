//! Process-wide API credential and selected model.

use parking_lot::RwLock;
use proto::StorageError;
use tracing::debug;

use crate::storage::KeyValueStore;

/// Storage key holding the API credential.
pub const API_KEY_STORAGE_KEY: &str = "credential.api_key";
/// Storage key holding the selected model id.
pub const MODEL_STORAGE_KEY: &str = "credential.model";

/// Snapshot of the credential/model pairing.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub model: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Lists every missing setting, in display order.
    pub fn validate(&self) -> Result<(), Vec<&'static str>> {
        let mut errors = Vec::new();
        if self.api_key.trim().is_empty() {
            errors.push("API key is required");
        }
        if self.model.trim().is_empty() {
            errors.push("Model selection is required");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Reads persisted values; missing keys come back empty.
    pub fn load_from(store: &dyn KeyValueStore) -> Self {
        Self {
            api_key: store.get(API_KEY_STORAGE_KEY).unwrap_or_default(),
            model: store.get(MODEL_STORAGE_KEY).unwrap_or_default(),
        }
    }

    pub fn save_to(&self, store: &dyn KeyValueStore) -> Result<(), StorageError> {
        store.set(API_KEY_STORAGE_KEY, &self.api_key)?;
        store.set(MODEL_STORAGE_KEY, &self.model)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .finish()
    }
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        "<empty>".to_string()
    } else {
        "<redacted>".to_string()
    }
}

/// Holds the current credential and model.
///
/// Writers replace values under a single write lock, so readers never see a
/// half-updated pairing. Requests capture a snapshot with [`get`](Self::get)
/// and are unaffected by later updates.
#[derive(Debug, Default)]
pub struct CredentialContext {
    inner: RwLock<Credentials>,
}

impl CredentialContext {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            inner: RwLock::new(credentials),
        }
    }

    pub fn get(&self) -> Credentials {
        self.inner.read().clone()
    }

    /// Replaces both values atomically.
    pub fn set(&self, api_key: impl Into<String>, model: impl Into<String>) {
        let next = Credentials::new(api_key, model);
        debug!(model = %next.model, "Credential context replaced");
        *self.inner.write() = next;
    }

    pub fn set_credential(&self, api_key: impl Into<String>) {
        self.inner.write().api_key = api_key.into();
        debug!("Credential replaced");
    }

    pub fn set_model(&self, model: impl Into<String>) {
        let model = model.into();
        debug!(model = %model, "Model selection replaced");
        self.inner.write().model = model;
    }
}
